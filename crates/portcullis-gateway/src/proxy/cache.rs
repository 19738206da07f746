//! Dispatch cache for fast backend routing.
//!
//! Maps a backend key (`host[:port]`) to a ready [`ProxyHandler`], so the
//! request path never parses URLs or probes ports for a known host.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Request;
use axum::http::HeaderName;
use axum::response::Response;
use parking_lot::RwLock;
use url::Url;

use portcullis_core::{RewriteResult, SiteRegistry};

use super::{is_websocket_upgrade, HttpProxy, Learner, ProxyError, ProxyHandler, WsTunnel};

/// Backend handlers keyed by `host[:port]`.
#[derive(Debug)]
pub struct DispatchCache {
    entries: RwLock<HashMap<String, Arc<ProxyHandler>>>,
    client: reqwest::Client,
    learner: Option<Learner>,
    ws_connect_timeout: Duration,
    ws_headers: Vec<HeaderName>,
}

impl DispatchCache {
    /// Create an empty cache. Without a learner, only hosts loaded by
    /// [`DispatchCache::rebuild`] or [`DispatchCache::insert`] are served.
    #[must_use]
    pub fn new(client: reqwest::Client, learner: Option<Learner>, ws_connect_timeout: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            client,
            learner,
            ws_connect_timeout,
            ws_headers: Vec::new(),
        }
    }

    /// Copy `name` into the backend handshake of WebSocket tunnels, on top
    /// of the headers every tunnel forwards.
    #[must_use]
    pub fn with_ws_header(mut self, name: HeaderName) -> Self {
        self.ws_headers.push(name);
        self
    }

    /// The cache key for a resolved host.
    #[must_use]
    pub fn cache_key(result: &RewriteResult) -> String {
        if result.port.is_empty() {
            result.host.clone()
        } else {
            format!("{}:{}", result.host, result.port)
        }
    }

    /// Get the handler for `key`, if cached.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<ProxyHandler>> {
        self.entries.read().get(key).cloned()
    }

    /// Insert or replace the handler for `key`.
    pub fn insert(&self, key: impl Into<String>, handler: ProxyHandler) {
        self.entries.write().insert(key.into(), Arc::new(handler));
    }

    /// All cached keys, sorted.
    #[must_use]
    pub fn hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self.entries.read().keys().cloned().collect();
        hosts.sort();
        hosts
    }

    /// Number of cached handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Find the handler for a resolved host, learning one on a miss.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Unconfigured` when the host is not cached and
    /// cannot be learned, or `ProxyError::InvalidUrl` when the learned
    /// target is unusable.
    pub async fn lookup_or_learn(
        &self,
        result: &RewriteResult,
    ) -> Result<Arc<ProxyHandler>, ProxyError> {
        let key = Self::cache_key(result);
        if let Some(handler) = self.get(&key) {
            return Ok(handler);
        }

        let Some(learner) = &self.learner else {
            return Err(ProxyError::Unconfigured(key));
        };
        let Some(base) = learner.learn(result).await else {
            return Err(ProxyError::Unconfigured(key));
        };

        let handler = Arc::new(ProxyHandler::Http(HttpProxy::new(&base, self.client.clone())?));
        self.entries.write().insert(key.clone(), Arc::clone(&handler));

        tracing::info!(host = %key, backend = %base, "Learned nexthop");
        Ok(handler)
    }

    /// Serve `req` for a resolved host.
    ///
    /// WebSocket upgrades get a fresh tunnel to the host once it has passed
    /// the cache check; everything else goes through the cached handler.
    ///
    /// # Errors
    ///
    /// See [`DispatchCache::lookup_or_learn`].
    pub async fn dispatch(&self, req: Request, result: &RewriteResult) -> Result<Response, ProxyError> {
        let handler = self.lookup_or_learn(result).await?;

        if is_websocket_upgrade(req.headers()) {
            let target = WsTunnel::target_for(result, req.uri());
            let tunnel = ProxyHandler::WebSocket(
                WsTunnel::new(target, self.ws_connect_timeout)
                    .forward_headers(self.ws_headers.iter().cloned()),
            );
            return Ok(tunnel.handle(req).await);
        }

        Ok(handler.handle(req).await)
    }

    /// Replace the cache with one handler per registry URL.
    ///
    /// Returns the number of cached handlers. Unparsable URLs are skipped;
    /// the new generation is applied regardless and the last parse error is
    /// returned afterwards.
    ///
    /// # Errors
    ///
    /// Returns the last `ProxyError::InvalidUrl` seen during the rebuild.
    pub fn rebuild(&self, registry: &dyn SiteRegistry) -> Result<usize, ProxyError> {
        let mut generation: HashMap<String, Arc<ProxyHandler>> = HashMap::new();
        let mut last_error = None;

        for raw in registry.urls() {
            let built = Url::parse(&raw)
                .map_err(|e| ProxyError::InvalidUrl {
                    url: raw.clone(),
                    reason: e.to_string(),
                })
                .and_then(|url| {
                    let key = url_key(&url);
                    HttpProxy::from_url(url, self.client.clone()).map(|proxy| (key, proxy))
                });

            match built {
                Ok((key, proxy)) => {
                    generation.insert(key, Arc::new(ProxyHandler::Http(proxy)));
                }
                Err(e) => {
                    tracing::warn!(url = %raw, error = %e, "Skipping site url");
                    last_error = Some(e);
                }
            }
        }

        let count = {
            let mut entries = self.entries.write();
            entries.retain(|key, _| generation.contains_key(key));
            entries.extend(generation);
            entries.len()
        };

        tracing::info!(count, "Rebuilt dispatch cache");
        match last_error {
            Some(e) => Err(e),
            None => Ok(count),
        }
    }
}

fn url_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::body::Body;
    use axum::http::StatusCode;
    use portcullis_core::StaticSites;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn cache(learner: Option<Learner>) -> DispatchCache {
        DispatchCache::new(reqwest::Client::new(), learner, Duration::from_secs(1))
    }

    fn sites(urls: &[&str]) -> StaticSites {
        let mut map = HashMap::new();
        map.insert(
            "site".to_string(),
            urls.iter().map(ToString::to_string).collect(),
        );
        StaticSites::new(map)
    }

    #[test]
    fn cache_keys() {
        assert_eq!(
            DispatchCache::cache_key(&RewriteResult::unchanged("app.example.net")),
            "app.example.net"
        );
        let with_port = RewriteResult {
            host: "app.modern".to_string(),
            scheme: "https".to_string(),
            port: "8443".to_string(),
            full_url: "https://modern:8443".to_string(),
        };
        assert_eq!(DispatchCache::cache_key(&with_port), "app.modern:8443");
    }

    #[test]
    fn rebuild_replaces_generation() {
        let cache = cache(None);
        cache.insert(
            "stale.internal",
            ProxyHandler::Http(HttpProxy::new("http://stale.internal", reqwest::Client::new()).unwrap()),
        );

        let registry = sites(&["https://a.internal", "http://b.internal:8080/app", "https://a.internal/x"]);
        assert_eq!(cache.rebuild(&registry).unwrap(), 2);
        assert_eq!(cache.hosts(), vec!["a.internal", "b.internal:8080"]);

        registry.replace(HashMap::from([("other".to_string(), vec!["https://c.internal".to_string()])]));
        assert_eq!(cache.rebuild(&registry).unwrap(), 1);
        assert_eq!(cache.hosts(), vec!["c.internal"]);
    }

    #[test]
    fn rebuild_applies_despite_bad_urls() {
        let cache = cache(None);
        let registry = sites(&["https://a.internal", "::not a url::"]);

        let err = cache.rebuild(&registry).unwrap_err();
        assert!(matches!(err, ProxyError::InvalidUrl { .. }));
        assert_eq!(cache.hosts(), vec!["a.internal"]);
    }

    #[tokio::test]
    async fn miss_without_learning_is_unconfigured() {
        let cache = cache(None);
        let err = cache
            .lookup_or_learn(&RewriteResult::unchanged("nowhere.example.net"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::Unconfigured(host) if host == "nowhere.example.net"));
    }

    #[tokio::test]
    async fn learned_handlers_are_cached_and_used() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hello"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hi"))
            .mount(&server)
            .await;

        let authority = server.uri().trim_start_matches("http://").to_string();
        let learner = Learner::new(vec![], vec![], Duration::from_secs(1));
        let cache = cache(Some(learner));
        let result = RewriteResult::unchanged(&authority);

        let req = Request::builder().uri("/hello").body(Body::empty()).unwrap();
        let response = cache.dispatch(req, &result).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(cache.hosts(), vec![authority.clone()]);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"hi");
    }
}
