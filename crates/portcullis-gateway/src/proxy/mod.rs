//! Reverse proxying to backends.
//!
//! The dispatch cache maps a backend host key to a ready [`ProxyHandler`].
//! Handlers are built from the site registry on rebuild, or learned on first
//! use when learning is enabled.

pub mod cache;
pub mod http;
pub mod learn;
pub mod ws;

use std::time::Duration;

use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderName};
use axum::response::Response;
use thiserror::Error;

pub use cache::DispatchCache;
pub use http::HttpProxy;
pub use learn::Learner;
pub use ws::WsTunnel;

/// Errors raised while building or running proxies.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// A backend URL could not be parsed.
    #[error("invalid backend url {url}: {reason}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// No handler is cached or learnable for the host.
    #[error("no backend for {0}")]
    Unconfigured(String),

    /// The backend could not be reached.
    #[error("{0}")]
    Transport(String),

    /// The outbound HTTP client could not be built.
    #[error("http client: {0}")]
    Client(String),
}

/// A ready-to-use handler for one backend.
#[derive(Debug)]
pub enum ProxyHandler {
    /// Plain HTTP(S) reverse proxy.
    Http(HttpProxy),
    /// WebSocket tunnel.
    WebSocket(WsTunnel),
}

impl ProxyHandler {
    /// Serve `req` through this handler.
    pub async fn handle(&self, req: Request) -> Response {
        match self {
            Self::Http(proxy) => proxy.handle(req).await,
            Self::WebSocket(tunnel) => tunnel.handle(req).await,
        }
    }
}

/// Headers that only apply to a single connection.
static HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Remove hop-by-hop headers, including those named in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

/// Returns `true` if the request asks for a WebSocket upgrade.
#[must_use]
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

/// Build the client used for backend traffic.
///
/// Redirects are passed through to the browser, never followed.
///
/// # Errors
///
/// Returns `ProxyError::Client` if the TLS backend cannot be initialized.
pub fn backend_client(timeout: Duration, insecure: bool) -> Result<reqwest::Client, ProxyError> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(timeout)
        .danger_accept_invalid_certs(insecure)
        .build()
        .map_err(|e| ProxyError::Client(e.to_string()))
}
