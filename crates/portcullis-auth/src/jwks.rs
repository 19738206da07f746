//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! The issuer's signing keys are fetched on first use, cached by key ID and
//! fetched again when a token names a key the cache does not hold.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::Jwk;
use jsonwebtoken::DecodingKey;
use parking_lot::RwLock;
use serde::Deserialize;

use crate::error::{AuthError, Result};

/// JWKS document. Keys are parsed one by one so unsupported entries can be
/// skipped.
#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<serde_json::Value>,
}

#[derive(Default)]
struct CachedKeys {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Option<Instant>,
}

/// Signing keys of one issuer.
pub struct JwksCache {
    url: String,
    client: reqwest::Client,
    max_age: Duration,
    cache: RwLock<CachedKeys>,
}

impl JwksCache {
    /// Create an empty cache for the JWKS at `url`. Cached keys are served
    /// for `max_age` before a lookup fetches the set again.
    #[must_use]
    pub fn new(url: impl Into<String>, client: reqwest::Client, max_age: Duration) -> Self {
        Self {
            url: url.into(),
            client,
            max_age,
            cache: RwLock::new(CachedKeys::default()),
        }
    }

    /// The JWKS URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Get a decoding key by key ID, fetching the set if necessary.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Exchange` if the set cannot be fetched or does not
    /// contain `kid`.
    pub async fn get_key(&self, kid: &str) -> Result<DecodingKey> {
        {
            let cache = self.cache.read();
            let fresh = cache
                .fetched_at
                .is_some_and(|at| at.elapsed() < self.max_age);
            if fresh {
                if let Some(key) = cache.keys.get(kid) {
                    return Ok(key.clone());
                }
            }
        }

        self.refresh().await?;

        self.cache
            .read()
            .keys
            .get(kid)
            .cloned()
            .ok_or_else(|| AuthError::Exchange(format!("oidc: unknown signing key {kid}")))
    }

    /// Fetch the key set and replace the cache. Returns the number of usable
    /// keys.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Exchange` if the request or decoding fails.
    pub async fn refresh(&self) -> Result<usize> {
        tracing::debug!(url = %self.url, "Fetching JWKS");

        let document: JwksDocument = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| AuthError::Exchange(format!("oidc: jwks request failed: {e}")))?
            .json()
            .await
            .map_err(|e| AuthError::Exchange(format!("oidc: invalid jwks: {e}")))?;

        let keys = Self::parse_keys(document.keys);
        let count = keys.len();
        tracing::debug!(count, "Cached JWKS keys");

        let mut cache = self.cache.write();
        cache.keys = keys;
        cache.fetched_at = Some(Instant::now());
        Ok(count)
    }

    fn parse_keys(raw: Vec<serde_json::Value>) -> HashMap<String, DecodingKey> {
        let mut keys = HashMap::new();
        for value in raw {
            let jwk: Jwk = match serde_json::from_value(value) {
                Ok(jwk) => jwk,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unsupported JWK");
                    continue;
                }
            };
            let Some(kid) = jwk.common.key_id.clone() else {
                tracing::debug!("Skipping JWK without kid");
                continue;
            };
            match DecodingKey::from_jwk(&jwk) {
                Ok(key) => {
                    keys.insert(kid, key);
                }
                Err(e) => tracing::warn!(kid = %kid, error = %e, "Skipping unusable JWK"),
            }
        }
        keys
    }
}
