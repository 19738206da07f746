//! Gateway configuration types.
//!
//! Every tunable of the gateway lives in [`GatewayConfig`]. The binary fills
//! it from command-line flags and `PORTCULLIS_*` environment variables; tests
//! build it directly or deserialize it.

use std::time::Duration;

use axum::http::StatusCode;
use serde::Deserialize;

use portcullis_auth::federation::DEFAULT_TOKEN_AGE_SECONDS;
use portcullis_auth::{OidcConfig, SessionConfig};

/// Configuration for the gateway service.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Listen address (e.g., "0.0.0.0:8080").
    #[serde(default = "GatewayConfig::default_listen_addr")]
    pub listen_addr: String,

    /// Hostname of the gateway itself.
    #[serde(default = "GatewayConfig::default_host")]
    pub host: String,

    /// Path of the health endpoint, answered on every host.
    #[serde(default = "GatewayConfig::default_health_path")]
    pub health_path: String,

    /// Response body of the health endpoint.
    #[serde(default = "GatewayConfig::default_health_reply")]
    pub health_reply: String,

    /// Session cookie name.
    #[serde(default = "GatewayConfig::default_cookie_name")]
    pub cookie_name: String,

    /// Session cookie domain.
    #[serde(default = "GatewayConfig::default_cookie_domain")]
    pub cookie_domain: String,

    /// Session cookie `Max-Age` in seconds.
    #[serde(default = "GatewayConfig::default_cookie_age")]
    pub cookie_age_seconds: i64,

    /// 64 hex characters. Empty generates a key per process start.
    #[serde(default)]
    pub cookie_key: String,

    /// Status answered when a user needs to log in.
    #[serde(default = "GatewayConfig::default_auth_required_code")]
    pub auth_required_code: u16,

    /// Message used when a backend is not configured or does not respond.
    #[serde(default = "GatewayConfig::default_not_found_message")]
    pub not_found_message: String,

    /// Contact address appended to error pages.
    #[serde(default)]
    pub error_email: String,

    /// Answer provider errors with the raw description instead of a page.
    #[serde(default)]
    pub error_plain: bool,

    /// Prefix of headers added to proxied requests (`<prefix>-User`).
    #[serde(default = "GatewayConfig::default_header_prefix")]
    pub header_prefix: String,

    /// Rewrite rules as `from1=to1,from2=to2`.
    #[serde(default)]
    pub hosts_csv: String,

    /// Remote rewrite rules (`http(s)://` or `file://` JSON object).
    #[serde(default)]
    pub hosts_url: String,

    /// Only serve hosts matching a rewrite rule.
    #[serde(default)]
    pub hosts_strict: bool,

    /// Hosts served without authentication; `.domain` entries match
    /// subdomains.
    #[serde(default)]
    pub allowlist: Vec<String>,

    /// Basic-auth tokens for non-browser clients, as `user=token`.
    #[serde(default)]
    pub user_tokens: Vec<String>,

    /// Site registry document (`{"site": ["https://..."]}`).
    #[serde(default)]
    pub sites_url: String,

    /// Build proxies for unknown hosts on first use.
    #[serde(default = "GatewayConfig::default_true")]
    pub learn_nexthops: bool,

    /// Ports probed over HTTPS when learning a bare host.
    #[serde(default = "GatewayConfig::default_learn_https_ports")]
    pub learn_https_ports: Vec<u16>,

    /// Ports probed over HTTP when learning a bare host.
    #[serde(default = "GatewayConfig::default_learn_http_ports")]
    pub learn_http_ports: Vec<u16>,

    /// Timeout of each learn probe in milliseconds.
    #[serde(default = "GatewayConfig::default_learn_dial_timeout")]
    pub learn_dial_timeout_ms: u64,

    /// Docker registry base URLs.
    #[serde(default)]
    pub docker_urls: Vec<String>,

    /// Scheme of the token realm advertised to Docker clients.
    #[serde(default = "GatewayConfig::default_docker_scheme")]
    pub docker_realm_scheme: String,

    /// Token endpoint path on the upstream registry.
    #[serde(default = "GatewayConfig::default_docker_token_path")]
    pub docker_token_path: String,

    /// 64-character shared secret sealing federation access tokens.
    #[serde(default)]
    pub federate_access_key: String,

    /// 64-character shared secret sealing federation secret tokens.
    #[serde(default)]
    pub federate_secret_key: String,

    /// Lifetime of federation tokens in seconds.
    #[serde(default = "GatewayConfig::default_federate_age")]
    pub federate_token_age_seconds: i64,

    /// Timeout of outbound HTTP requests in seconds.
    #[serde(default = "GatewayConfig::default_upstream_timeout")]
    pub upstream_timeout_seconds: u64,

    /// Request timeout in seconds.
    #[serde(default = "GatewayConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Interval between rule, site and proxy refreshes in seconds.
    #[serde(default = "GatewayConfig::default_refresh_interval")]
    pub refresh_interval_seconds: u64,

    /// Accept backend TLS certificates without verification.
    #[serde(default)]
    pub insecure_skip_verify: bool,

    /// OIDC authorization endpoint.
    #[serde(default)]
    pub oidc_auth_url: String,

    /// OIDC token endpoint.
    #[serde(default)]
    pub oidc_token_url: String,

    /// OIDC userinfo endpoint.
    #[serde(default)]
    pub oidc_userinfo_url: String,

    /// Expected issuer of ID tokens.
    #[serde(default)]
    pub oidc_issuer: String,

    /// Issuer key set used to verify ID tokens.
    #[serde(default)]
    pub oidc_jwks_url: String,

    /// OIDC client ID.
    #[serde(default)]
    pub oidc_client_id: String,

    /// OIDC client secret.
    #[serde(default)]
    pub oidc_client_secret: String,
}

impl GatewayConfig {
    fn default_listen_addr() -> String {
        "0.0.0.0:8080".to_string()
    }

    fn default_host() -> String {
        "portcullis.example.net".to_string()
    }

    fn default_health_path() -> String {
        "/healthz/ping".to_string()
    }

    fn default_health_reply() -> String {
        "ok".to_string()
    }

    fn default_cookie_name() -> String {
        "portcullis".to_string()
    }

    fn default_cookie_domain() -> String {
        ".example.net".to_string()
    }

    const fn default_cookie_age() -> i64 {
        6 * 60 * 60
    }

    const fn default_auth_required_code() -> u16 {
        418
    }

    fn default_not_found_message() -> String {
        "Please contact the application administrators to setup access.".to_string()
    }

    fn default_header_prefix() -> String {
        "Portcullis".to_string()
    }

    const fn default_true() -> bool {
        true
    }

    fn default_learn_https_ports() -> Vec<u16> {
        vec![443, 4443, 8443]
    }

    fn default_learn_http_ports() -> Vec<u16> {
        vec![80, 8080]
    }

    const fn default_learn_dial_timeout() -> u64 {
        5000
    }

    fn default_docker_scheme() -> String {
        "https".to_string()
    }

    fn default_docker_token_path() -> String {
        "/v2/auth".to_string()
    }

    const fn default_federate_age() -> i64 {
        DEFAULT_TOKEN_AGE_SECONDS
    }

    const fn default_upstream_timeout() -> u64 {
        60
    }

    const fn default_request_timeout() -> u64 {
        120
    }

    const fn default_refresh_interval() -> u64 {
        300
    }

    /// Status answered when a user needs to log in.
    ///
    /// Falls back to 401 for codes outside the valid range.
    #[must_use]
    pub fn auth_required_status(&self) -> StatusCode {
        StatusCode::from_u16(self.auth_required_code).unwrap_or(StatusCode::UNAUTHORIZED)
    }

    /// The contact line for error pages, if configured.
    #[must_use]
    pub fn contact(&self) -> Option<&str> {
        Some(self.error_email.as_str()).filter(|e| !e.is_empty())
    }

    /// Name of the identity header.
    #[must_use]
    pub fn user_header(&self) -> String {
        format!("{}-User", self.header_prefix)
    }

    /// Session cookie settings.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            cookie_name: self.cookie_name.clone(),
            cookie_domain: self.cookie_domain.clone(),
            max_age_seconds: self.cookie_age_seconds,
        }
    }

    /// OIDC settings, with `https://<host>/oidc` as the callback.
    #[must_use]
    pub fn oidc_config(&self) -> OidcConfig {
        OidcConfig {
            auth_url: self.oidc_auth_url.clone(),
            token_url: self.oidc_token_url.clone(),
            userinfo_url: self.oidc_userinfo_url.clone(),
            issuer: self.oidc_issuer.clone(),
            jwks_url: self.oidc_jwks_url.clone(),
            client_id: self.oidc_client_id.clone(),
            client_secret: self.oidc_client_secret.clone(),
            redirect_url: format!("https://{}/oidc", self.host),
            scopes: OidcConfig::default_scopes(),
        }
    }

    /// Get the learn probe timeout as a `Duration`.
    #[must_use]
    pub fn learn_dial_timeout(&self) -> Duration {
        Duration::from_millis(self.learn_dial_timeout_ms)
    }

    /// Get the outbound HTTP timeout as a `Duration`.
    #[must_use]
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_seconds)
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Get the refresh interval as a `Duration`.
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            host: Self::default_host(),
            health_path: Self::default_health_path(),
            health_reply: Self::default_health_reply(),
            cookie_name: Self::default_cookie_name(),
            cookie_domain: Self::default_cookie_domain(),
            cookie_age_seconds: Self::default_cookie_age(),
            cookie_key: String::new(),
            auth_required_code: Self::default_auth_required_code(),
            not_found_message: Self::default_not_found_message(),
            error_email: String::new(),
            error_plain: false,
            header_prefix: Self::default_header_prefix(),
            hosts_csv: String::new(),
            hosts_url: String::new(),
            hosts_strict: false,
            allowlist: Vec::new(),
            user_tokens: Vec::new(),
            sites_url: String::new(),
            learn_nexthops: true,
            learn_https_ports: Self::default_learn_https_ports(),
            learn_http_ports: Self::default_learn_http_ports(),
            learn_dial_timeout_ms: Self::default_learn_dial_timeout(),
            docker_urls: Vec::new(),
            docker_realm_scheme: Self::default_docker_scheme(),
            docker_token_path: Self::default_docker_token_path(),
            federate_access_key: String::new(),
            federate_secret_key: String::new(),
            federate_token_age_seconds: Self::default_federate_age(),
            upstream_timeout_seconds: Self::default_upstream_timeout(),
            request_timeout_seconds: Self::default_request_timeout(),
            refresh_interval_seconds: Self::default_refresh_interval(),
            insecure_skip_verify: false,
            oidc_auth_url: String::new(),
            oidc_token_url: String::new(),
            oidc_userinfo_url: String::new(),
            oidc_issuer: String::new(),
            oidc_jwks_url: String::new(),
            oidc_client_id: String::new(),
            oidc_client_secret: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.health_path, "/healthz/ping");
        assert_eq!(config.auth_required_code, 418);
        assert_eq!(config.cookie_age_seconds, 21600);
        assert_eq!(config.docker_token_path, "/v2/auth");
        assert_eq!(config.federate_token_age_seconds, 300);
        assert!(config.learn_nexthops);
    }

    #[test]
    fn deserialize_fills_defaults() {
        let config: GatewayConfig =
            serde_json::from_str(r#"{"host": "gate.corp.net", "hosts_strict": true}"#).unwrap();
        assert_eq!(config.host, "gate.corp.net");
        assert!(config.hosts_strict);
        assert_eq!(config.cookie_name, "portcullis");
        assert_eq!(config.learn_https_ports, vec![443, 4443, 8443]);
        assert_eq!(
            config.oidc_config().redirect_url,
            "https://gate.corp.net/oidc"
        );
    }

    #[test]
    fn derived_values() {
        let mut config = GatewayConfig::default();
        assert_eq!(config.user_header(), "Portcullis-User");
        assert_eq!(config.auth_required_status().as_u16(), 418);
        assert!(config.contact().is_none());

        config.auth_required_code = 42;
        assert_eq!(config.auth_required_status(), StatusCode::UNAUTHORIZED);
        config.error_email = "ops@example.net".to_string();
        assert_eq!(config.contact(), Some("ops@example.net"));
    }

    #[test]
    fn timeout_durations() {
        let config = GatewayConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(120));
        assert_eq!(config.learn_dial_timeout(), Duration::from_secs(5));
        assert_eq!(config.refresh_interval(), Duration::from_secs(300));
    }
}
