//! Routing primitives for portcullis.
//!
//! This crate provides the parts of the gateway that decide *where* a request
//! goes, independent of any HTTP framework:
//!
//! - **Rewrite engine**: suffix-based hostname rewriting with optional
//!   scheme/port targets and a strict mode
//! - **Allowlist**: hosts that bypass the authentication gate
//! - **Site registry**: known backend URLs used to warm the proxy cache
//! - **Document sources**: JSON documents fetched over HTTP(S) or from disk
//!
//! # Example
//!
//! ```
//! use portcullis_core::{RewriteEngine, RewriteTable};
//!
//! let table = RewriteTable::parse_csv("legacy.corp=https://modern.corp.example.com").unwrap();
//! let engine = RewriteEngine::new(table, false);
//!
//! let result = engine.resolve("app.legacy.corp");
//! assert_eq!(result.host, "app.modern.corp.example.com");
//! assert_eq!(result.scheme, "https");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod allowlist;
pub mod error;
pub mod rewrite;
pub mod sites;
pub mod source;

pub use allowlist::{strip_port, Allowlist, HostAllowlist};
pub use error::{CoreError, Result};
pub use rewrite::{RewriteEngine, RewriteResult, RewriteRule, RewriteTable};
pub use sites::{SiteRegistry, StaticSites};
pub use source::DocumentSource;
