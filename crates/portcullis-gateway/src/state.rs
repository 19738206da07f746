//! Gateway application state.
//!
//! This module defines the shared state that is available to all request handlers.

use std::sync::Arc;

use axum::http::HeaderName;

use portcullis_auth::{
    AuthError, CodecSet, FederationCodecs, IdentityProvider, SessionStore, SigningKey, UserTokens,
};
use portcullis_core::{DocumentSource, HostAllowlist, RewriteEngine, RewriteTable, StaticSites};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::handlers::docker::DockerGateway;
use crate::proxy::{backend_client, DispatchCache, Learner, ProxyError};

/// Shared application state for the gateway.
///
/// This struct holds references to all services needed by the HTTP handlers.
pub struct GatewayState<P>
where
    P: IdentityProvider,
{
    /// Gateway configuration.
    pub config: GatewayConfig,
    /// Host rewrite rules.
    pub rewrite: Arc<RewriteEngine>,
    /// Hosts served without authentication.
    pub allowlist: Arc<HostAllowlist>,
    /// Known backend URLs.
    pub sites: Arc<StaticSites>,
    /// Basic-auth tokens for non-browser clients.
    pub tokens: Arc<UserTokens>,
    /// Session cookie codecs.
    pub sessions: SessionStore,
    /// Federation token codecs.
    pub federation: FederationCodecs,
    /// Docker registry token gateway.
    pub docker: Arc<DockerGateway>,
    /// Backend handlers.
    pub dispatch: Arc<DispatchCache>,
    /// The identity provider used for logins.
    pub idp: Arc<P>,
    /// Name of the identity header added to authenticated requests.
    pub user_header: HeaderName,
}

impl<P> GatewayState<P>
where
    P: IdentityProvider,
{
    /// Build the gateway state from its configuration.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid keys, malformed rewrite rules, unusable
    /// source or registry URLs, or an invalid header prefix.
    pub fn from_config(config: GatewayConfig, idp: Arc<P>) -> Result<Self, GatewayError> {
        let key = if config.cookie_key.is_empty() {
            tracing::warn!("No cookie key configured, sessions will not survive a restart");
            SigningKey::generate()?
        } else {
            SigningKey::from_hex(&config.cookie_key)?
        };
        let codecs = CodecSet::from_key(&key, config.cookie_age_seconds).map_err(AuthError::from)?;
        let sessions = SessionStore::new(config.session_config(), codecs);

        let source_client = reqwest::Client::builder()
            .timeout(config.upstream_timeout())
            .build()
            .map_err(|e| ProxyError::Client(e.to_string()))?;

        let mut rewrite = RewriteEngine::new(RewriteTable::parse_csv(&config.hosts_csv)?, config.hosts_strict);
        if !config.hosts_url.is_empty() {
            rewrite = rewrite.with_source(DocumentSource::new(&config.hosts_url, source_client.clone())?);
        }

        let mut sites = StaticSites::default();
        if !config.sites_url.is_empty() {
            sites = sites.with_source(DocumentSource::new(&config.sites_url, source_client)?);
        }

        let allowlist = HostAllowlist::new(config.allowlist.iter().cloned());
        let tokens = UserTokens::parse(&config.user_tokens)?;

        let federation = FederationCodecs::new(
            &config.federate_access_key,
            &config.federate_secret_key,
            config.federate_token_age_seconds,
        )?;
        if federation.is_disabled() {
            tracing::info!("Federation keys not configured, federation disabled");
        }

        let backend = backend_client(config.upstream_timeout(), config.insecure_skip_verify)?;
        if config.insecure_skip_verify {
            tracing::warn!("Backend TLS certificates are not verified");
        }

        let docker = DockerGateway::new(
            &config.docker_urls,
            config.docker_realm_scheme.clone(),
            config.docker_token_path.clone(),
            backend.clone(),
        )?;

        let learner = config.learn_nexthops.then(|| {
            Learner::new(
                config.learn_https_ports.clone(),
                config.learn_http_ports.clone(),
                config.learn_dial_timeout(),
            )
        });
        let user_header = HeaderName::from_bytes(config.user_header().as_bytes()).map_err(|e| {
            GatewayError::InvalidConfig(format!("header prefix {}: {e}", config.header_prefix))
        })?;

        let dispatch = DispatchCache::new(backend, learner, config.upstream_timeout())
            .with_ws_header(user_header.clone());

        tracing::info!(
            host = %config.host,
            rules = rewrite.table().len(),
            strict = config.hosts_strict,
            allowlist = allowlist.len(),
            tokens = tokens.len(),
            registries = docker.len(),
            learn = config.learn_nexthops,
            "Gateway state initialized"
        );

        Ok(Self {
            config,
            rewrite: Arc::new(rewrite),
            allowlist: Arc::new(allowlist),
            tokens: Arc::new(tokens),
            sites: Arc::new(sites),
            sessions,
            federation,
            docker: Arc::new(docker),
            dispatch: Arc::new(dispatch),
            idp,
            user_header,
        })
    }

    /// Reload rewrite rules and sites from their sources, then rebuild the
    /// dispatch cache. Every step runs even if an earlier one fails.
    ///
    /// Returns the number of cached backends.
    ///
    /// # Errors
    ///
    /// Returns the last error seen; state touched by a failed step is left
    /// as it was.
    pub async fn refresh(&self) -> Result<usize, GatewayError> {
        let mut last_error: Option<GatewayError> = None;

        match self.rewrite.refresh().await {
            Ok(rules) => tracing::debug!(rules, "Rewrite rules refreshed"),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to refresh rewrite rules");
                last_error = Some(e.into());
            }
        }

        match self.sites.refresh().await {
            Ok(sites) => tracing::debug!(sites, "Site registry refreshed"),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to refresh site registry");
                last_error = Some(e.into());
            }
        }

        let cached = match self.dispatch.rebuild(self.sites.as_ref()) {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!(error = %e, "Dispatch cache rebuilt with errors");
                last_error = Some(e.into());
                self.dispatch.len()
            }
        };

        last_error.map_or(Ok(cached), Err)
    }
}

impl<P> Clone for GatewayState<P>
where
    P: IdentityProvider,
{
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            rewrite: Arc::clone(&self.rewrite),
            allowlist: Arc::clone(&self.allowlist),
            tokens: Arc::clone(&self.tokens),
            sites: Arc::clone(&self.sites),
            sessions: self.sessions.clone(),
            federation: self.federation.clone(),
            docker: Arc::clone(&self.docker),
            dispatch: Arc::clone(&self.dispatch),
            idp: Arc::clone(&self.idp),
            user_header: self.user_header.clone(),
        }
    }
}
