//! HTTP reverse proxy.

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderValue, Uri};
use axum::response::{IntoResponse, Response};
use url::Url;

use super::{strip_hop_by_hop, ProxyError};
use crate::error::GateError;

/// Forwards requests to a single backend base URL, streaming both bodies.
#[derive(Debug, Clone)]
pub struct HttpProxy {
    base: Url,
    client: reqwest::Client,
}

impl HttpProxy {
    /// Create a proxy for `base` (`scheme://host[:port][/path]`).
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::InvalidUrl` if `base` is not an absolute
    /// `http`/`https` URL with a host.
    pub fn new(base: &str, client: reqwest::Client) -> Result<Self, ProxyError> {
        let url = Url::parse(base).map_err(|e| ProxyError::InvalidUrl {
            url: base.to_string(),
            reason: e.to_string(),
        })?;
        Self::from_url(url, client)
    }

    /// Create a proxy from a parsed URL.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::InvalidUrl` for non-HTTP schemes or URLs without
    /// a host.
    pub fn from_url(base: Url, client: reqwest::Client) -> Result<Self, ProxyError> {
        if !matches!(base.scheme(), "http" | "https") || base.host_str().is_none() {
            return Err(ProxyError::InvalidUrl {
                url: base.to_string(),
                reason: "expected an http or https url with a host".to_string(),
            });
        }
        Ok(Self { base, client })
    }

    /// The backend base URL.
    #[must_use]
    pub const fn base(&self) -> &Url {
        &self.base
    }

    /// The backend URL for an inbound request URI.
    ///
    /// The base path, if any, is prepended to the request path.
    #[must_use]
    pub fn target_url(&self, uri: &Uri) -> String {
        let mut target = format!(
            "{}://{}",
            self.base.scheme(),
            self.base.host_str().unwrap_or_default()
        );
        if let Some(port) = self.base.port() {
            target.push(':');
            target.push_str(&port.to_string());
        }
        target.push_str(self.base.path().trim_end_matches('/'));
        target.push_str(uri.path_and_query().map_or("/", |pq| pq.as_str()));
        target
    }

    /// Proxy `req` to the backend.
    pub async fn handle(&self, req: Request) -> Response {
        let target = self.target_url(req.uri());
        match forward(&self.client, &target, req, &HeaderMap::new()).await {
            Ok(response) => response,
            Err(e) => GateError::from(e).into_response(),
        }
    }
}

/// Send `req` to `target` and stream the response back.
///
/// Hop-by-hop headers are dropped in both directions. `Host` is replaced by
/// the target's and the inbound host travels as `X-Forwarded-Host`. Entries
/// in `overrides` replace inbound headers of the same name.
///
/// # Errors
///
/// Returns `ProxyError::Transport` if the backend cannot be reached.
pub async fn forward(
    client: &reqwest::Client,
    target: &str,
    req: Request,
    overrides: &HeaderMap,
) -> Result<Response, ProxyError> {
    let (parts, body) = req.into_parts();

    let mut headers = parts.headers;
    let inbound_host = headers.remove(header::HOST);
    let has_body = headers.contains_key(header::CONTENT_LENGTH)
        || headers.contains_key(header::TRANSFER_ENCODING);
    strip_hop_by_hop(&mut headers);
    if let Some(host) = inbound_host {
        headers.insert("x-forwarded-host", host);
    }
    headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
    for (name, value) in overrides {
        headers.insert(name.clone(), value.clone());
    }

    let mut request = client.request(parts.method, target).headers(headers);
    if has_body {
        request = request.body(reqwest::Body::wrap_stream(body.into_data_stream()));
    }

    let upstream = request.send().await.map_err(|e| {
        tracing::debug!(url = %target, error = %e, "Backend request failed");
        ProxyError::Transport(e.to_string())
    })?;

    tracing::debug!(url = %target, status = %upstream.status(), "Backend responded");
    Ok(relay(upstream))
}

/// Convert a backend response into an axum response, streaming the body.
#[must_use]
pub fn relay(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    strip_hop_by_hop(&mut headers);

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
