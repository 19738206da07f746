//! Identity-aware reverse proxy gateway.
//!
//! This crate puts a login in front of internal web applications. It
//! handles:
//!
//! - Host rewriting and dispatch to learned or registered backends
//! - Session cookies and the OIDC login redirect
//! - Federated logins between gateways sharing a pair of secrets
//! - A Docker Registry v2 token gateway
//! - WebSocket tunnelling to backends
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Browsers                            │
//! │               (HTTP / WebSocket / docker CLI)               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    portcullis-gateway                       │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐    │
//! │  │  Host gate  │ │ Login and   │ │  Dispatch cache     │    │
//! │  │ (allowlist, │ │ federation  │ │  (HTTP proxies,     │    │
//! │  │  sessions)  │ │ handlers    │ │   WebSocket tunnels)│    │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┼──────────────┐
//!               ▼              ▼              ▼
//!        ┌──────────┐   ┌──────────┐   ┌──────────┐
//!        │ Identity │   │ Docker   │   │ Backend  │
//!        │ Provider │   │ Registry │   │ Apps     │
//!        └──────────┘   └──────────┘   └──────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use portcullis_auth::OidcClient;
//! use portcullis_gateway::{create_router, GatewayConfig, GatewayState};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GatewayConfig::default();
//! let idp = Arc::new(OidcClient::new(config.oidc_config(), Duration::from_secs(30))?);
//!
//! let state = GatewayState::from_config(config, idp)?;
//! state.refresh().await?;
//!
//! let app = create_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod cookies;
pub mod error;
pub mod handlers;
pub mod pages;
pub mod proxy;
pub mod routes;
pub mod state;

pub use config::GatewayConfig;
pub use error::{GateError, GatewayError};
pub use handlers::docker::DockerGateway;
pub use proxy::{DispatchCache, ProxyError, ProxyHandler};
pub use routes::create_router;
pub use state::GatewayState;
