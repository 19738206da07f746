//! The site registry.
//!
//! Sites map a canonical backend name to the URLs it is reachable at. The
//! gateway only reads the registry to (re)build its proxy cache.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::Result;
use crate::source::DocumentSource;

/// A read-locked enumeration of backend URLs.
pub trait SiteRegistry: Send + Sync {
    /// Snapshot every known backend URL.
    fn urls(&self) -> Vec<String>;
}

/// An in-memory site registry, optionally refreshed from a JSON document of
/// the form `{"site": ["https://a.internal", ...]}`.
#[derive(Debug, Default)]
pub struct StaticSites {
    sites: RwLock<HashMap<String, Vec<String>>>,
    source: Option<DocumentSource>,
}

impl StaticSites {
    /// Create a registry with the given sites.
    #[must_use]
    pub fn new(sites: HashMap<String, Vec<String>>) -> Self {
        Self {
            sites: RwLock::new(sites),
            source: None,
        }
    }

    /// Attach a document source used by [`StaticSites::refresh`].
    #[must_use]
    pub fn with_source(mut self, source: DocumentSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Replace the whole registry.
    pub fn replace(&self, sites: HashMap<String, Vec<String>>) {
        *self.sites.write() = sites;
    }

    /// Add or replace one site.
    pub fn insert(&self, name: impl Into<String>, urls: Vec<String>) {
        self.sites.write().insert(name.into(), urls);
    }

    /// Number of sites.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sites.read().len()
    }

    /// Returns `true` if no sites are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sites.read().is_empty()
    }

    /// Reload the registry from its source. Without a source this does
    /// nothing. Returns the number of sites afterwards.
    ///
    /// # Errors
    ///
    /// Returns the fetch or decode error; the registry is left untouched.
    pub async fn refresh(&self) -> Result<usize> {
        let Some(source) = &self.source else {
            return Ok(self.len());
        };

        let sites: HashMap<String, Vec<String>> = source.fetch().await?;
        let count = sites.len();
        self.replace(sites);

        tracing::debug!(url = %source.url(), count, "Refreshed site registry");
        Ok(count)
    }
}

impl SiteRegistry for StaticSites {
    fn urls(&self) -> Vec<String> {
        self.sites.read().values().flatten().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn urls_are_flattened() {
        let sites = StaticSites::default();
        sites.insert("app", vec!["https://app.internal".into()]);
        sites.insert(
            "wiki",
            vec!["https://wiki.internal".into(), "http://wiki2.internal:8080".into()],
        );

        let mut urls = sites.urls();
        urls.sort();
        assert_eq!(
            urls,
            vec![
                "http://wiki2.internal:8080",
                "https://app.internal",
                "https://wiki.internal"
            ]
        );
    }

    #[tokio::test]
    async fn refresh_replaces_sites() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"grafana":["https://grafana.internal:3000"]}"#),
            )
            .mount(&server)
            .await;

        let source =
            DocumentSource::new(&format!("{}/sites.json", server.uri()), reqwest::Client::new())
                .unwrap();
        let sites = StaticSites::default().with_source(source);
        sites.insert("stale", vec!["https://stale.internal".into()]);

        assert_eq!(sites.refresh().await.unwrap(), 1);
        assert_eq!(sites.urls(), vec!["https://grafana.internal:3000"]);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_sites() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[1,2"))
            .mount(&server)
            .await;

        let source =
            DocumentSource::new(&format!("{}/sites.json", server.uri()), reqwest::Client::new())
                .unwrap();
        let sites = StaticSites::default().with_source(source);
        sites.insert("app", vec!["https://app.internal".into()]);

        assert!(sites.refresh().await.is_err());
        assert_eq!(sites.len(), 1);
    }
}
