//! OpenID Connect authorization-code client.
//!
//! Implements just enough of OIDC for the login flow: build the
//! authorization URL, exchange the returned code at the token endpoint and
//! take the user's email from the verified ID token, or from the userinfo
//! endpoint when no JWKS is configured or the token carries no email.

use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use serde::Deserialize;
use url::Url;

use crate::error::{AuthError, Result};
use crate::identity::IdentityProvider;
use crate::jwks::JwksCache;

/// Signature algorithms accepted on ID tokens.
const ID_TOKEN_ALGORITHMS: [Algorithm; 9] = [
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::EdDSA,
];

const JWKS_MAX_AGE: Duration = Duration::from_secs(3600);

/// OIDC endpoints and client credentials.
#[derive(Debug, Clone)]
pub struct OidcConfig {
    /// Authorization endpoint.
    pub auth_url: String,
    /// Token endpoint.
    pub token_url: String,
    /// Userinfo endpoint.
    pub userinfo_url: String,
    /// Expected `iss` of ID tokens. Empty skips the issuer check.
    pub issuer: String,
    /// Issuer key set. Empty skips ID token verification.
    pub jwks_url: String,
    /// OAuth2 client ID.
    pub client_id: String,
    /// OAuth2 client secret.
    pub client_secret: String,
    /// Callback URL registered with the provider (`https://<self>/oidc`).
    pub redirect_url: String,
    /// Requested scopes.
    pub scopes: Vec<String>,
}

impl OidcConfig {
    /// Default scopes for an email identity.
    #[must_use]
    pub fn default_scopes() -> Vec<String> {
        vec!["openid".to_string(), "email".to_string()]
    }
}

/// Successful token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
    #[serde(default)]
    id_token: Option<String>,
}

/// Error body defined by RFC 6749 section 5.2.
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    #[serde(default)]
    email: Option<String>,
}

/// ID token claims beyond those `jsonwebtoken` validates.
#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    #[serde(default)]
    email: Option<String>,
}

/// Identity provider backed by an OIDC issuer.
pub struct OidcClient {
    config: OidcConfig,
    auth_url: Url,
    client: reqwest::Client,
    jwks: Option<JwksCache>,
}

impl OidcClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidConfig` if an endpoint URL does not parse
    /// or the HTTP client cannot be built.
    pub fn new(config: OidcConfig, timeout: Duration) -> Result<Self> {
        let auth_url = Url::parse(&config.auth_url)
            .map_err(|e| AuthError::InvalidConfig(format!("auth url {}: {e}", config.auth_url)))?;
        for endpoint in [&config.token_url, &config.userinfo_url] {
            Url::parse(endpoint)
                .map_err(|e| AuthError::InvalidConfig(format!("endpoint {endpoint}: {e}")))?;
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::InvalidConfig(format!("http client: {e}")))?;

        let jwks = if config.jwks_url.is_empty() {
            tracing::warn!("No JWKS configured, ID tokens are not verified");
            None
        } else {
            Url::parse(&config.jwks_url).map_err(|e| {
                AuthError::InvalidConfig(format!("jwks url {}: {e}", config.jwks_url))
            })?;
            Some(JwksCache::new(&config.jwks_url, client.clone(), JWKS_MAX_AGE))
        };

        Ok(Self {
            config,
            auth_url,
            client,
            jwks,
        })
    }

    /// Exchange the code at the token endpoint.
    async fn token(&self, code: &str) -> Result<TokenGrant> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "authorization_code")
            .append_pair("code", code)
            .append_pair("redirect_uri", &self.config.redirect_url)
            .append_pair("client_id", &self.config.client_id)
            .append_pair("client_secret", &self.config.client_secret)
            .finish();

        let response = self
            .client
            .post(&self.config.token_url)
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(reqwest::header::ACCEPT, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| AuthError::Exchange(format!("oauth2: token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = match response.json::<TokenErrorResponse>().await {
                Ok(err) => match err.error_description {
                    Some(desc) => format!("\"{}\" \"{desc}\"", err.error),
                    None => format!("\"{}\"", err.error),
                },
                Err(_) => format!("HTTP {status}"),
            };
            return Err(AuthError::Exchange(format!(
                "oauth2: cannot fetch token: {detail}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::Exchange(format!("oauth2: invalid token response: {e}")))
    }

    /// Verify an ID token against the issuer's keys and return its email
    /// claim, if any.
    async fn verify_id_token(&self, jwks: &JwksCache, id_token: &str) -> Result<Option<String>> {
        let header = decode_header(id_token)
            .map_err(|e| AuthError::Exchange(format!("oidc: invalid id token: {e}")))?;
        if !ID_TOKEN_ALGORITHMS.contains(&header.alg) {
            return Err(AuthError::Exchange(format!(
                "oidc: unsupported id token algorithm {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| AuthError::Exchange("oidc: id token has no kid".to_string()))?;
        let key = jwks.get_key(&kid).await?;

        let mut validation = Validation::new(header.alg);
        validation.set_audience(&[&self.config.client_id]);
        if !self.config.issuer.is_empty() {
            validation.set_issuer(&[&self.config.issuer]);
        }

        let data = decode::<IdTokenClaims>(id_token, &key, &validation)
            .map_err(|e| AuthError::Exchange(format!("oidc: id token rejected: {e}")))?;
        Ok(data.claims.email.filter(|email| !email.is_empty()))
    }

    /// Look up the user's email.
    async fn userinfo(&self, access_token: &str) -> Result<String> {
        let response = self
            .client
            .get(&self.config.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::Exchange(format!("oidc: userinfo request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Exchange(format!("oidc: userinfo HTTP {status}")));
        }

        let info: UserInfo = response
            .json()
            .await
            .map_err(|e| AuthError::Exchange(format!("oidc: invalid userinfo response: {e}")))?;

        info.email
            .filter(|email| !email.is_empty())
            .ok_or_else(|| AuthError::Exchange("oidc: email claim missing".to_string()))
    }
}

#[async_trait]
impl IdentityProvider for OidcClient {
    fn authorization_url(&self, state: &str) -> String {
        let mut url = self.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_url)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("state", state);
        url.to_string()
    }

    async fn exchange(&self, code: &str, _state: &str) -> Result<String> {
        let grant = self.token(code).await?;

        let verified = match &self.jwks {
            Some(jwks) => {
                let id_token = grant.id_token.as_deref().ok_or_else(|| {
                    AuthError::Exchange("oidc: token response has no id_token".to_string())
                })?;
                self.verify_id_token(jwks, id_token).await?
            }
            None => None,
        };

        let user = match verified {
            Some(email) => email,
            None => self.userinfo(&grant.access_token).await?,
        };
        tracing::debug!(user = %user, "OIDC exchange completed");
        Ok(user)
    }
}
