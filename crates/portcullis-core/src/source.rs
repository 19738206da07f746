//! Remote JSON documents.
//!
//! Rule tables and site registries are published as small JSON documents,
//! either over HTTP(S) or as local files (`file://`). A `DocumentSource`
//! fetches and decodes one of them on demand; scheduling is up to the caller.

use std::time::Duration;

use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{CoreError, Result};

/// Default timeout for fetching a document over HTTP.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// A JSON document reachable by URL.
#[derive(Debug, Clone)]
pub struct DocumentSource {
    url: Url,
    client: reqwest::Client,
}

impl DocumentSource {
    /// Create a source for the given URL.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidSource` if the URL does not parse or uses a
    /// scheme other than `http`, `https` or `file`.
    pub fn new(url: &str, client: reqwest::Client) -> Result<Self> {
        let parsed = Url::parse(url).map_err(|e| CoreError::InvalidSource {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        match parsed.scheme() {
            "http" | "https" | "file" => Ok(Self {
                url: parsed,
                client,
            }),
            other => Err(CoreError::InvalidSource {
                url: url.to_string(),
                reason: format!("unsupported scheme {other}"),
            }),
        }
    }

    /// The URL this source reads from.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Fetch and decode the document.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Fetch` if the document cannot be read and
    /// `CoreError::Decode` if it is not valid JSON of the expected shape.
    pub async fn fetch<T: DeserializeOwned>(&self) -> Result<T> {
        let bytes = if self.url.scheme() == "file" {
            let path = self
                .url
                .to_file_path()
                .map_err(|()| CoreError::InvalidSource {
                    url: self.url.to_string(),
                    reason: "not a local path".to_string(),
                })?;
            tokio::fs::read(&path)
                .await
                .map_err(|e| CoreError::Fetch(format!("{}: {e}", path.display())))?
        } else {
            self.client
                .get(self.url.clone())
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(|e| CoreError::Fetch(e.to_string()))?
                .bytes()
                .await
                .map_err(|e| CoreError::Fetch(e.to_string()))?
                .to_vec()
        };

        tracing::debug!(url = %self.url, bytes = bytes.len(), "Fetched document");

        serde_json::from_slice(&bytes).map_err(|e| CoreError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn rejects_unknown_scheme() {
        let err = DocumentSource::new("ftp://example.com/hosts.json", reqwest::Client::new())
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidSource { .. }));
    }

    #[test]
    fn rejects_garbage() {
        assert!(DocumentSource::new("not a url", reqwest::Client::new()).is_err());
    }

    #[tokio::test]
    async fn fetch_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"a.example.com":"b.example.com"}}"#).unwrap();
        let url = Url::from_file_path(file.path()).unwrap();

        let source = DocumentSource::new(url.as_str(), reqwest::Client::new()).unwrap();
        let doc: HashMap<String, String> = source.fetch().await.unwrap();
        assert_eq!(doc["a.example.com"], "b.example.com");
    }

    #[tokio::test]
    async fn fetch_missing_file() {
        let source =
            DocumentSource::new("file:///nonexistent/hosts.json", reqwest::Client::new()).unwrap();
        let err = source.fetch::<HashMap<String, String>>().await.unwrap_err();
        assert!(matches!(err, CoreError::Fetch(_)));
    }

    #[tokio::test]
    async fn fetch_http_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hosts.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"broken\":"))
            .mount(&server)
            .await;

        let source = DocumentSource::new(
            &format!("{}/hosts.json", server.uri()),
            reqwest::Client::new(),
        )
        .unwrap();
        let err = source.fetch::<HashMap<String, String>>().await.unwrap_err();
        assert!(matches!(err, CoreError::Decode(_)));
    }

    #[tokio::test]
    async fn fetch_http_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let source =
            DocumentSource::new(&format!("{}/x", server.uri()), reqwest::Client::new()).unwrap();
        let err = source.fetch::<HashMap<String, String>>().await.unwrap_err();
        assert!(matches!(err, CoreError::Fetch(_)));
    }
}
