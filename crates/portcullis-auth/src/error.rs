//! Authentication error types.
//!
//! `CodecError` messages are part of the wire contract: some endpoints return
//! them verbatim to clients, so their text must not change.

use thiserror::Error;

/// A result type using `AuthError`.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors produced while sealing or opening signed values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The codec set is empty, usually because a key was not configured.
    #[error("securecookie: no codecs provided")]
    NoCodecs,

    /// The value was tampered with, truncated, sealed under another key or
    /// another name.
    #[error("securecookie: the value is not valid")]
    Invalid,

    /// The value was valid but is older than the codec's max age.
    #[error("securecookie: expired timestamp")]
    Expired,

    /// The value authenticated but its payload could not be deserialized.
    #[error("securecookie: the value could not be decoded")]
    Payload,

    /// Sealing failed.
    #[error("securecookie: error - caused by: {0}")]
    Encode(String),
}

/// Errors that can occur during authentication setup or login.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The cookie key does not have 64 characters.
    #[error("cookie key must be exactly 64 hex characters (32 bytes), got {0}")]
    KeyLength(usize),

    /// The cookie key is not hexadecimal.
    #[error("cookie key must be valid hex: {0}")]
    KeyFormat(String),

    /// A federation secret does not have 64 characters.
    #[error("federation key must be exactly 64 characters, got {0}")]
    FederationKeyLength(usize),

    /// Access and secret federation keys must differ.
    #[error("federation access and secret keys must be different")]
    FederationKeyReuse,

    /// A `user=token` entry is malformed.
    #[error("user token entry {0} must be user=token")]
    UserTokenFormat(usize),

    /// The system random number generator failed.
    #[error("failed to generate random key")]
    Random,

    /// The identity provider configuration is unusable.
    #[error("invalid identity provider configuration: {0}")]
    InvalidConfig(String),

    /// Exchanging an authorization code failed.
    #[error("{0}")]
    Exchange(String),

    /// Sealing or opening a value failed.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl AuthError {
    /// Returns `true` for errors that should abort startup.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::KeyLength(_)
                | Self::KeyFormat(_)
                | Self::FederationKeyLength(_)
                | Self::FederationKeyReuse
                | Self::UserTokenFormat(_)
                | Self::Random
                | Self::InvalidConfig(_)
        )
    }

    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::Exchange(_) => 401,
            Self::Codec(CodecError::NoCodecs) => 500,
            Self::Codec(_) => 403,
            _ => 500,
        }
    }
}
