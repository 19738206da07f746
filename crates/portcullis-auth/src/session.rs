//! Browser sessions carried in a sealed cookie.
//!
//! A session moves through three states:
//!
//! ```text
//! Anonymous ──/launch──▶ PendingLogin { state, next } ──/oidc──▶ Authenticated { user, next }
//! ```
//!
//! The session store only seals and opens the cookie value; building the
//! `Set-Cookie` header is left to the HTTP layer.

use serde::{Deserialize, Serialize};

use crate::codec::CodecSet;
use crate::error::{CodecError, Result};
use crate::keys::random_hex32;

/// Payload name used when sealing session cookies.
pub const SESSION_VALUE_NAME: &str = "session";

/// The contents of a session cookie.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// CSRF nonce matched against the OIDC callback's `state` parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Where to send the browser after login.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    /// Verified identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl Session {
    /// Start a login: a fresh random state and the post-login destination.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Random` if the system RNG fails.
    pub fn pending(next: Option<String>) -> Result<Self> {
        Ok(Self {
            state: Some(random_hex32()?),
            next,
            user: None,
        })
    }

    /// Mark the session authenticated and consume the CSRF state.
    pub fn authenticate(&mut self, user: impl Into<String>) {
        self.user = Some(user.into());
        self.state = None;
    }

    /// The verified user, if any. Empty identities do not count.
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref().filter(|u| !u.is_empty())
    }

    /// Returns `true` once a user has been verified.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user().is_some()
    }
}

/// Session cookie attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Cookie name.
    pub cookie_name: String,
    /// Cookie `Domain` attribute.
    pub cookie_domain: String,
    /// Cookie `Max-Age` in seconds; also the sealed value's max age.
    pub max_age_seconds: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "portcullis".to_string(),
            cookie_domain: ".example.net".to_string(),
            max_age_seconds: 6 * 60 * 60,
        }
    }
}

/// Seals and opens session cookies.
#[derive(Debug, Clone)]
pub struct SessionStore {
    config: SessionConfig,
    codecs: CodecSet,
}

impl SessionStore {
    /// Create a store from cookie settings and the codecs that seal them.
    #[must_use]
    pub const fn new(config: SessionConfig, codecs: CodecSet) -> Self {
        Self { config, codecs }
    }

    /// Cookie settings.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The session codecs. Docker tokens are sealed with the same set.
    #[must_use]
    pub const fn codecs(&self) -> &CodecSet {
        &self.codecs
    }

    /// Seal a session into a cookie value.
    ///
    /// # Errors
    ///
    /// Returns the codec error if sealing fails.
    pub fn encode(&self, session: &Session) -> std::result::Result<String, CodecError> {
        self.codecs.encode(SESSION_VALUE_NAME, session)
    }

    /// Open a cookie value.
    ///
    /// # Errors
    ///
    /// Returns the codec error for tampered, foreign or expired cookies.
    pub fn decode(&self, value: &str) -> std::result::Result<Session, CodecError> {
        self.codecs.decode(SESSION_VALUE_NAME, value)
    }

    /// Open a cookie value if present, treating any failure as no session.
    #[must_use]
    pub fn load(&self, value: Option<&str>) -> Option<Session> {
        let value = value?;
        match self.decode(value) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring unreadable session cookie");
                None
            }
        }
    }
}
