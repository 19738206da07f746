//! Sessions and tokens for portcullis.
//!
//! This crate owns every value the gateway seals and every conversation it
//! has with an identity provider:
//!
//! - Signing keys parsed from hex or derived from shared secrets
//! - AES-256-GCM sealed values with names and max ages
//! - Session cookies for the login flow
//! - Federation access/secret tokens
//! - Wrapped Docker registry tokens
//! - Static basic-auth user tokens
//! - The `IdentityProvider` seam and an OIDC implementation
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐
//! │   Gateway        │────▶│ IdentityProvider │
//! │   (HTTP)         │     │ (trait)          │
//! └────────┬─────────┘     └────────┬─────────┘
//!          │                        │
//! ┌────────▼─────────┐     ┌────────▼─────────┐
//! │  SessionStore    │     │   OidcClient     │
//! │  FederationCodecs│     │   (impl)         │
//! │  docker tokens   │     └────────┬─────────┘
//! └────────┬─────────┘              │ HTTPS
//! ┌────────▼─────────┐     ┌────────▼─────────┐
//! │    CodecSet      │     │   OIDC issuer    │
//! └──────────────────┘     └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use portcullis_auth::{CodecSet, Session, SessionConfig, SessionStore, SigningKey};
//!
//! let key = SigningKey::generate().unwrap();
//! let store = SessionStore::new(
//!     SessionConfig::default(),
//!     CodecSet::from_key(&key, 3600).unwrap(),
//! );
//!
//! let mut session = Session::pending(Some("https://app.example.net/".into())).unwrap();
//! session.authenticate("cloud@user.com");
//!
//! let cookie = store.encode(&session).unwrap();
//! assert_eq!(store.decode(&cookie).unwrap().user(), Some("cloud@user.com"));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod codec;
pub mod docker;
pub mod error;
pub mod federation;
pub mod identity;
pub mod jwks;
pub mod keys;
pub mod oidc;
pub mod session;
pub mod tokens;

pub use codec::{CodecSet, SecureCodec};
pub use docker::{unwrap_token, wrap_token, TokenResponse};
pub use error::{AuthError, CodecError, Result};
pub use federation::{append_token, FederationCodecs};
pub use identity::IdentityProvider;
pub use jwks::JwksCache;
pub use keys::{random_hex32, SigningKey};
pub use oidc::{OidcClient, OidcConfig};
pub use session::{Session, SessionConfig, SessionStore};
pub use tokens::UserTokens;

#[cfg(any(test, feature = "test-utils"))]
pub use identity::MockIdentityProvider;
