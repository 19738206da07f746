//! Cross-instance login handoff.
//!
//! Two gateways that share a pair of secrets can hand a login from one to
//! the other:
//!
//! 1. The second gateway seals its callback URL with the *access* key and
//!    sends the browser to `https://<first>/federate?next=<access token>`.
//! 2. The first gateway opens it, and if the browser has a session, seals
//!    the user with the *secret* key and redirects to the callback with
//!    `token=<secret token>` appended.
//! 3. The second gateway asks `/federate/verify?token=` (or opens the
//!    secret token itself) to learn who the user is.
//!
//! The two keys are distinct and the payload names differ, so an access
//! token never opens as a secret token.

use crate::codec::CodecSet;
use crate::error::{AuthError, CodecError, Result};
use crate::keys::SigningKey;

/// Payload name of access tokens.
pub const ACCESS_TOKEN_NAME: &str = "next";

/// Payload name of secret tokens.
pub const SECRET_TOKEN_NAME: &str = "user";

/// Default lifetime of federation tokens in seconds.
pub const DEFAULT_TOKEN_AGE_SECONDS: i64 = 300;

/// Codecs for the two halves of the handoff.
#[derive(Debug, Clone, Default)]
pub struct FederationCodecs {
    access: CodecSet,
    secret: CodecSet,
}

impl FederationCodecs {
    /// Build codecs from the two shared secrets.
    ///
    /// An empty secret leaves the corresponding codec set empty, which
    /// disables that half of the handoff.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::FederationKeyLength` for a secret that is not 64
    /// characters and `AuthError::FederationKeyReuse` if both secrets are
    /// the same non-empty value.
    pub fn new(access_key: &str, secret_key: &str, token_age_seconds: i64) -> Result<Self> {
        if !access_key.is_empty() && access_key == secret_key {
            return Err(AuthError::FederationKeyReuse);
        }
        Ok(Self {
            access: Self::codecs_for(access_key, token_age_seconds)?,
            secret: Self::codecs_for(secret_key, token_age_seconds)?,
        })
    }

    /// Federation disabled.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Returns `true` if neither half of the handoff has a key.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.access.is_empty() && self.secret.is_empty()
    }

    fn codecs_for(secret: &str, token_age_seconds: i64) -> Result<CodecSet> {
        if secret.is_empty() {
            return Ok(CodecSet::empty());
        }
        let key = SigningKey::from_shared_secret(secret)?;
        Ok(CodecSet::from_key(&key, token_age_seconds)?)
    }

    /// Seal a redirect target into an access token.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::NoCodecs` when the access key is not configured.
    pub fn encode_access(&self, next: &str) -> std::result::Result<String, CodecError> {
        self.access.encode(ACCESS_TOKEN_NAME, next)
    }

    /// Open an access token.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::NoCodecs` when the access key is not configured,
    /// or the decode error.
    pub fn decode_access(&self, token: &str) -> std::result::Result<String, CodecError> {
        self.access.decode(ACCESS_TOKEN_NAME, token)
    }

    /// Seal a verified user into a secret token.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::NoCodecs` when the secret key is not configured.
    pub fn encode_secret(&self, user: &str) -> std::result::Result<String, CodecError> {
        self.secret.encode(SECRET_TOKEN_NAME, user)
    }

    /// Open a secret token.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::NoCodecs` when the secret key is not configured,
    /// or the decode error.
    pub fn decode_secret(&self, token: &str) -> std::result::Result<String, CodecError> {
        self.secret.decode(SECRET_TOKEN_NAME, token)
    }
}

/// Append a secret token to a federation callback URL.
///
/// A target ending in `=` is taken to be waiting for the value and gets the
/// token concatenated; otherwise `token=<token>` is added to the query.
#[must_use]
pub fn append_token(next: &str, token: &str) -> String {
    if next.ends_with('=') {
        return format!("{next}{token}");
    }
    let separator = if next.contains('?') {
        if next.ends_with('?') || next.ends_with('&') {
            ""
        } else {
            "&"
        }
    } else {
        "?"
    };
    format!("{next}{separator}token={token}")
}
