//! Portcullis - identity-aware reverse proxy.
//!
//! This is the entry point for the gateway service. Every setting can be
//! given as a flag or as a `PORTCULLIS_*` environment variable.
//!
//! # Dev Mode
//!
//! Build with `--features dev-mode` to use a mock identity provider that
//! doesn't require an OIDC provider. Log in by visiting
//! `/oidc?state=<state>&code=user:<email>` after `/launch`.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "dev-mode")]
use portcullis_auth::MockIdentityProvider;
#[cfg(not(feature = "dev-mode"))]
use portcullis_auth::OidcClient;
use portcullis_gateway::{create_router, GatewayConfig, GatewayState};

/// Portcullis - identity-aware reverse proxy.
#[derive(Parser, Debug)]
#[command(name = "portcullis")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Listen address.
    #[arg(long, env = "PORTCULLIS_LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    listen_addr: String,

    /// Hostname of the gateway itself.
    #[arg(long, env = "PORTCULLIS_HOST", default_value = "portcullis.example.net")]
    host: String,

    /// Path of the health endpoint.
    #[arg(long, env = "PORTCULLIS_HEALTH_PATH", default_value = "/healthz/ping")]
    health_path: String,

    /// Body of the health response.
    #[arg(long, env = "PORTCULLIS_HEALTH_REPLY", default_value = "ok")]
    health_reply: String,

    /// Session cookie name.
    #[arg(long, env = "PORTCULLIS_COOKIE_NAME", default_value = "portcullis")]
    cookie_name: String,

    /// Session cookie domain.
    #[arg(long, env = "PORTCULLIS_COOKIE_DOMAIN", default_value = ".example.net")]
    cookie_domain: String,

    /// Session cookie lifetime in seconds.
    #[arg(long, env = "PORTCULLIS_COOKIE_AGE", default_value_t = 21600)]
    cookie_age: i64,

    /// Cookie key, 64 hex characters. Unset generates one per start.
    #[arg(long, env = "PORTCULLIS_COOKIE_KEY", default_value = "", hide_env_values = true)]
    cookie_key: String,

    /// Status answered when a login is required.
    #[arg(long, env = "PORTCULLIS_AUTH_REQUIRED_CODE", default_value_t = 418)]
    auth_required_code: u16,

    /// Message shown for hosts without a backend.
    #[arg(
        long,
        env = "PORTCULLIS_NOT_FOUND_MESSAGE",
        default_value = "Please contact the application administrators to setup access."
    )]
    not_found_message: String,

    /// Contact address shown on error pages.
    #[arg(long, env = "PORTCULLIS_ERROR_EMAIL", default_value = "")]
    error_email: String,

    /// Show provider error descriptions instead of error pages.
    #[arg(long, env = "PORTCULLIS_ERROR_PLAIN")]
    error_plain: bool,

    /// Prefix of the identity header.
    #[arg(long, env = "PORTCULLIS_HEADER_PREFIX", default_value = "Portcullis")]
    header_prefix: String,

    /// Rewrite rules, `from1=to1,from2=to2`.
    #[arg(long, env = "PORTCULLIS_HOSTS", default_value = "")]
    hosts: String,

    /// URL of a JSON document with more rewrite rules.
    #[arg(long, env = "PORTCULLIS_HOSTS_URL", default_value = "")]
    hosts_url: String,

    /// Only serve hosts matching a rewrite rule.
    #[arg(long, env = "PORTCULLIS_HOSTS_STRICT")]
    hosts_strict: bool,

    /// Hosts served without login. `.domain` entries match subdomains.
    #[arg(long, env = "PORTCULLIS_ALLOWLIST", value_delimiter = ',')]
    allowlist: Vec<String>,

    /// Basic-auth tokens for scripts, `user1=token1,user2=token2`.
    #[arg(long, env = "PORTCULLIS_USER_TOKENS", value_delimiter = ',', hide_env_values = true)]
    user_tokens: Vec<String>,

    /// URL of the site registry document.
    #[arg(long, env = "PORTCULLIS_SITES_URL", default_value = "")]
    sites_url: String,

    /// Do not learn backends for unknown hosts.
    #[arg(long, env = "PORTCULLIS_NO_LEARN")]
    no_learn: bool,

    /// Ports probed over HTTPS when learning a host.
    #[arg(long, env = "PORTCULLIS_LEARN_HTTPS_PORTS", value_delimiter = ',', default_value = "443,4443,8443")]
    learn_https_ports: Vec<u16>,

    /// Ports probed over HTTP when learning a host.
    #[arg(long, env = "PORTCULLIS_LEARN_HTTP_PORTS", value_delimiter = ',', default_value = "80,8080")]
    learn_http_ports: Vec<u16>,

    /// Timeout of each learn probe in milliseconds.
    #[arg(long, env = "PORTCULLIS_LEARN_DIAL_TIMEOUT_MS", default_value_t = 5000)]
    learn_dial_timeout_ms: u64,

    /// Docker registry base URLs.
    #[arg(long, env = "PORTCULLIS_DOCKER_URLS", value_delimiter = ',')]
    docker_urls: Vec<String>,

    /// Scheme of the token realm advertised to Docker clients.
    #[arg(long, env = "PORTCULLIS_DOCKER_REALM_SCHEME", default_value = "https")]
    docker_realm_scheme: String,

    /// Token endpoint path on the upstream registries.
    #[arg(long, env = "PORTCULLIS_DOCKER_TOKEN_PATH", default_value = "/v2/auth")]
    docker_token_path: String,

    /// Federation access key (64 characters).
    #[arg(long, env = "PORTCULLIS_FEDERATE_ACCESS_KEY", default_value = "", hide_env_values = true)]
    federate_access_key: String,

    /// Federation secret key (64 characters).
    #[arg(long, env = "PORTCULLIS_FEDERATE_SECRET_KEY", default_value = "", hide_env_values = true)]
    federate_secret_key: String,

    /// Lifetime of federation tokens in seconds.
    #[arg(long, env = "PORTCULLIS_FEDERATE_TOKEN_AGE", default_value_t = 300)]
    federate_token_age: i64,

    /// Timeout of outbound HTTP requests in seconds.
    #[arg(long, env = "PORTCULLIS_UPSTREAM_TIMEOUT", default_value_t = 60)]
    upstream_timeout: u64,

    /// Request timeout in seconds.
    #[arg(long, env = "PORTCULLIS_REQUEST_TIMEOUT", default_value_t = 120)]
    request_timeout: u64,

    /// Seconds between refreshes of rules, sites and backends.
    #[arg(long, env = "PORTCULLIS_REFRESH_INTERVAL", default_value_t = 300)]
    refresh_interval: u64,

    /// Accept backend TLS certificates without verification.
    #[arg(long, env = "PORTCULLIS_INSECURE_SKIP_VERIFY")]
    insecure_skip_verify: bool,

    /// OIDC authorization endpoint.
    #[arg(long, env = "PORTCULLIS_OIDC_AUTH_URL", default_value = "")]
    oidc_auth_url: String,

    /// OIDC token endpoint.
    #[arg(long, env = "PORTCULLIS_OIDC_TOKEN_URL", default_value = "")]
    oidc_token_url: String,

    /// OIDC userinfo endpoint.
    #[arg(long, env = "PORTCULLIS_OIDC_USERINFO_URL", default_value = "")]
    oidc_userinfo_url: String,

    /// Expected issuer of ID tokens.
    #[arg(long, env = "PORTCULLIS_OIDC_ISSUER", default_value = "")]
    oidc_issuer: String,

    /// Issuer JWKS used to verify ID tokens.
    #[arg(long, env = "PORTCULLIS_OIDC_JWKS_URL", default_value = "")]
    oidc_jwks_url: String,

    /// OIDC client ID.
    #[arg(long, env = "PORTCULLIS_OIDC_CLIENT_ID", default_value = "")]
    oidc_client_id: String,

    /// OIDC client secret.
    #[arg(long, env = "PORTCULLIS_OIDC_CLIENT_SECRET", default_value = "", hide_env_values = true)]
    oidc_client_secret: String,
}

impl From<Args> for GatewayConfig {
    fn from(args: Args) -> Self {
        Self {
            listen_addr: args.listen_addr,
            host: args.host,
            health_path: args.health_path,
            health_reply: args.health_reply,
            cookie_name: args.cookie_name,
            cookie_domain: args.cookie_domain,
            cookie_age_seconds: args.cookie_age,
            cookie_key: args.cookie_key,
            auth_required_code: args.auth_required_code,
            not_found_message: args.not_found_message,
            error_email: args.error_email,
            error_plain: args.error_plain,
            header_prefix: args.header_prefix,
            hosts_csv: args.hosts,
            hosts_url: args.hosts_url,
            hosts_strict: args.hosts_strict,
            allowlist: args.allowlist,
            user_tokens: args.user_tokens,
            sites_url: args.sites_url,
            learn_nexthops: !args.no_learn,
            learn_https_ports: args.learn_https_ports,
            learn_http_ports: args.learn_http_ports,
            learn_dial_timeout_ms: args.learn_dial_timeout_ms,
            docker_urls: args.docker_urls,
            docker_realm_scheme: args.docker_realm_scheme,
            docker_token_path: args.docker_token_path,
            federate_access_key: args.federate_access_key,
            federate_secret_key: args.federate_secret_key,
            federate_token_age_seconds: args.federate_token_age,
            upstream_timeout_seconds: args.upstream_timeout,
            request_timeout_seconds: args.request_timeout,
            refresh_interval_seconds: args.refresh_interval,
            insecure_skip_verify: args.insecure_skip_verify,
            oidc_auth_url: args.oidc_auth_url,
            oidc_token_url: args.oidc_token_url,
            oidc_userinfo_url: args.oidc_userinfo_url,
            oidc_issuer: args.oidc_issuer,
            oidc_jwks_url: args.oidc_jwks_url,
            oidc_client_id: args.oidc_client_id,
            oidc_client_secret: args.oidc_client_secret,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,portcullis=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Portcullis");

    let config = GatewayConfig::from(Args::parse());
    let listen_addr = config.listen_addr.clone();
    let refresh_interval = config.refresh_interval();

    tracing::info!(
        listen_addr = %listen_addr,
        host = %config.host,
        strict = config.hosts_strict,
        learn = config.learn_nexthops,
        "Gateway configuration loaded"
    );

    // Initialize the identity provider
    #[cfg(feature = "dev-mode")]
    let idp = {
        tracing::warn!("DEV MODE ENABLED - using mock identity provider");
        tracing::warn!("Log in with codes in format: user:<email>");
        Arc::new(MockIdentityProvider::default())
    };

    #[cfg(not(feature = "dev-mode"))]
    let idp = Arc::new(OidcClient::new(
        config.oidc_config(),
        config.upstream_timeout(),
    )?);
    tracing::info!("Identity provider initialized");

    let state = GatewayState::from_config(config, idp)?;

    match state.refresh().await {
        Ok(backends) => tracing::info!(backends, "Initial refresh complete"),
        Err(e) => tracing::warn!(error = %e, "Initial refresh failed, continuing"),
    }

    // Periodic refresh of rules, sites and backends
    if !refresh_interval.is_zero() {
        let refresher = state.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(refresh_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = refresher.refresh().await {
                    tracing::warn!(error = %e, "Refresh failed, keeping previous state");
                }
            }
        });
    }

    let app = create_router(state);
    tracing::info!("Router configured");

    // Start HTTP server
    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
