//! Docker registry token wrapping.
//!
//! The gateway never hands an upstream registry token to a client. Tokens
//! are sealed with the session codecs, so a client can only present them
//! back to this gateway (or to instances sharing its cookie key).

use serde::{Deserialize, Serialize};

use crate::codec::CodecSet;
use crate::error::CodecError;

/// Payload name of wrapped registry tokens.
pub const DOCKER_TOKEN_NAME: &str = "token";

/// Body of a registry token response, `{"token": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Bearer token.
    pub token: String,
}

/// Seal an upstream token.
///
/// # Errors
///
/// Returns the codec error if sealing fails.
pub fn wrap_token(codecs: &CodecSet, raw: &str) -> Result<String, CodecError> {
    codecs.encode(DOCKER_TOKEN_NAME, raw)
}

/// Open a wrapped token and return the upstream token.
///
/// # Errors
///
/// Returns the codec error for tampered, truncated or foreign tokens.
pub fn unwrap_token(codecs: &CodecSet, wrapped: &str) -> Result<String, CodecError> {
    codecs.decode(DOCKER_TOKEN_NAME, wrapped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::SigningKey;
    use crate::session::SESSION_VALUE_NAME;

    fn codecs() -> CodecSet {
        CodecSet::from_key(&SigningKey::generate().unwrap(), 3600).unwrap()
    }

    #[test]
    fn wrap_and_unwrap() {
        let codecs = codecs();
        let wrapped = wrap_token(&codecs, "GOOD").unwrap();
        assert_ne!(wrapped, "GOOD");
        assert_eq!(unwrap_token(&codecs, &wrapped).unwrap(), "GOOD");
    }

    #[test]
    fn truncated_token_fails() {
        let codecs = codecs();
        let wrapped = wrap_token(&codecs, "GOOD").unwrap();
        assert!(unwrap_token(&codecs, &wrapped[..wrapped.len() - 4]).is_err());
    }

    #[test]
    fn session_cookie_is_not_a_token() {
        let codecs = codecs();
        let cookie = codecs.encode(SESSION_VALUE_NAME, "cloud@user.com").unwrap();
        assert_eq!(
            unwrap_token(&codecs, &cookie).unwrap_err(),
            CodecError::Invalid
        );
    }

    #[test]
    fn token_response_shape() {
        let body = serde_json::to_string(&TokenResponse {
            token: "abc".into(),
        })
        .unwrap();
        assert_eq!(body, r#"{"token":"abc"}"#);
        assert!(serde_json::from_str::<TokenResponse>(r#"{"token":"#).is_err());
    }
}
