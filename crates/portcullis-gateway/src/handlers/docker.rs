//! Docker Registry v2 token gateway.
//!
//! Registry clients authenticate against `/v2/auth` on the gateway. The
//! upstream token is sealed before it reaches the client and unsealed again
//! when the client presents it, so upstream credentials never leave the
//! gateway.

use std::collections::HashMap;

use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;

use portcullis_auth::{unwrap_token, wrap_token, CodecSet, TokenResponse};

use crate::error::GateError;
use crate::proxy::http::forward;
use crate::proxy::{HttpProxy, ProxyError};

/// Path of the token endpoint clients are pointed at.
pub const AUTH_PATH: &str = "/v2/auth";

/// Upstream registries keyed by `host[:port]`.
#[derive(Debug)]
pub struct DockerGateway {
    upstreams: HashMap<String, HttpProxy>,
    realm_scheme: String,
    token_path: String,
    client: reqwest::Client,
}

impl DockerGateway {
    /// Create a gateway for the given registry base URLs.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::InvalidUrl` for the first URL that does not
    /// parse.
    pub fn new(
        urls: &[String],
        realm_scheme: impl Into<String>,
        token_path: impl Into<String>,
        client: reqwest::Client,
    ) -> Result<Self, ProxyError> {
        let mut upstreams = HashMap::new();
        for raw in urls {
            let proxy = HttpProxy::new(raw, client.clone())?;
            let base = proxy.base();
            let key = match base.port() {
                Some(port) => format!("{}:{port}", base.host_str().unwrap_or_default()),
                None => base.host_str().unwrap_or_default().to_string(),
            };
            tracing::info!(registry = %key, url = %raw, "Docker registry configured");
            upstreams.insert(key, proxy);
        }

        Ok(Self {
            upstreams,
            realm_scheme: realm_scheme.into(),
            token_path: token_path.into(),
            client,
        })
    }

    /// Number of configured registries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.upstreams.len()
    }

    /// Returns `true` if no registry is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.upstreams.is_empty()
    }

    /// The upstream serving a registry request, if `host` is a registry and
    /// `path` is under `/v2`.
    #[must_use]
    pub fn upstream(&self, host: &str, path: &str) -> Option<&HttpProxy> {
        if path != "/v2" && !path.starts_with("/v2/") {
            return None;
        }
        self.upstreams.get(host)
    }

    /// The `WWW-Authenticate` challenge pointing clients at this gateway.
    #[must_use]
    pub fn challenge(&self, host: &str) -> String {
        format!(
            "Bearer realm=\"{}://{host}{AUTH_PATH}\",service=\"{host}\"",
            self.realm_scheme
        )
    }

    /// Serve a registry request for `host`.
    ///
    /// # Errors
    ///
    /// Returns `GateError::Codec` if a token cannot be sealed and
    /// `GateError::BadGateway` if the registry cannot be reached.
    pub async fn handle(
        &self,
        upstream: &HttpProxy,
        host: &str,
        codecs: &CodecSet,
        req: Request,
    ) -> Result<Response, GateError> {
        if req.uri().path() == AUTH_PATH {
            return self.token(upstream, host, codecs, req.uri(), req.headers()).await;
        }

        let raw = bearer(req.headers()).and_then(|wrapped| match unwrap_token(codecs, wrapped) {
            Ok(raw) => Some(raw),
            Err(e) => {
                tracing::debug!(registry = %host, error = %e, "Rejected registry token");
                None
            }
        });
        let Some(raw) = raw else {
            return Ok(self.unauthorized(host));
        };

        let mut overrides = HeaderMap::new();
        let value = HeaderValue::from_str(&format!("Bearer {raw}"))
            .map_err(|e| GateError::Internal(e.to_string()))?;
        overrides.insert(header::AUTHORIZATION, value);

        let target = upstream.target_url(req.uri());
        Ok(forward(&self.client, &target, req, &overrides).await?)
    }

    async fn token(
        &self,
        upstream: &HttpProxy,
        host: &str,
        codecs: &CodecSet,
        uri: &Uri,
        headers: &HeaderMap,
    ) -> Result<Response, GateError> {
        let path = match uri.query() {
            Some(query) => format!("{}?{query}", self.token_path),
            None => self.token_path.clone(),
        };
        let token_uri: Uri = path
            .parse()
            .map_err(|_| GateError::Internal(format!("invalid token path {path}")))?;
        let target = upstream.target_url(&token_uri);

        let mut request = self.client.get(&target);
        if let Some(auth) = headers.get(header::AUTHORIZATION) {
            request = request.header(header::AUTHORIZATION, auth.clone());
        }
        let response = request
            .send()
            .await
            .map_err(|e| GateError::BadGateway(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(registry = %host, status = %status, "Registry refused token request");
            if status == StatusCode::UNAUTHORIZED {
                return Ok(self.unauthorized(host));
            }
            return Ok(status.into_response());
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| GateError::BadGateway(e.to_string()))?;
        let upstream_token: TokenResponse = serde_json::from_slice(&body).map_err(|e| {
            tracing::warn!(registry = %host, error = %e, "Malformed registry token response");
            GateError::UpstreamMalformed
        })?;

        let token = wrap_token(codecs, &upstream_token.token)?;
        Ok((StatusCode::OK, Json(TokenResponse { token })).into_response())
    }

    fn unauthorized(&self, host: &str) -> Response {
        let mut response = StatusCode::UNAUTHORIZED.into_response();
        if let Ok(value) = HeaderValue::from_str(&self.challenge(host)) {
            response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
        }
        response
    }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway(urls: &[&str]) -> DockerGateway {
        let urls: Vec<String> = urls.iter().map(ToString::to_string).collect();
        DockerGateway::new(&urls, "https", AUTH_PATH, reqwest::Client::new()).unwrap()
    }

    #[test]
    fn registry_matching() {
        let gateway = gateway(&["https://registry.example.net", "http://mirror.internal:5000"]);
        assert_eq!(gateway.len(), 2);

        assert!(gateway.upstream("registry.example.net", "/v2/").is_some());
        assert!(gateway.upstream("registry.example.net", "/v2").is_some());
        assert!(gateway.upstream("registry.example.net", "/v2/library/alpine/manifests/3").is_some());
        assert!(gateway.upstream("mirror.internal:5000", "/v2/auth").is_some());

        assert!(gateway.upstream("registry.example.net", "/v20").is_none());
        assert!(gateway.upstream("registry.example.net", "/").is_none());
        assert!(gateway.upstream("mirror.internal", "/v2/").is_none());
        assert!(gateway.upstream("other.example.net", "/v2/").is_none());
    }

    #[test]
    fn invalid_upstream_is_fatal() {
        let urls = vec!["https://ok.example.net".to_string(), "nope".to_string()];
        assert!(DockerGateway::new(&urls, "https", AUTH_PATH, reqwest::Client::new()).is_err());
    }

    #[test]
    fn challenge_format() {
        let gateway = gateway(&["https://registry.example.net"]);
        assert_eq!(
            gateway.challenge("registry.example.net"),
            "Bearer realm=\"https://registry.example.net/v2/auth\",service=\"registry.example.net\""
        );
    }

    #[test]
    fn bearer_extraction() {
        let mut headers = HeaderMap::new();
        assert!(bearer(&headers).is_none());
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic Zm9v"));
        assert!(bearer(&headers).is_none());
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer(&headers), Some("abc"));
    }
}
