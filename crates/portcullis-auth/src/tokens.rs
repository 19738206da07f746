//! Static user tokens for scripts and CLI clients.
//!
//! Clients that cannot follow the browser login send HTTP basic auth with a
//! token as the password, or as the username when the password is empty.
//! Only SHA-256 digests of the tokens are kept.

use std::collections::HashMap;

use base64::prelude::*;
use ring::digest;

use crate::error::{AuthError, Result};

/// Token digests mapped to the user they authenticate.
#[derive(Debug, Clone, Default)]
pub struct UserTokens {
    users: HashMap<String, String>,
}

impl UserTokens {
    /// Build from `(user, token)` pairs.
    #[must_use]
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let users = pairs
            .into_iter()
            .map(|(user, token)| (token_digest(&token), user))
            .collect();
        Self { users }
    }

    /// Parse `user=token` entries.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserTokenFormat` with the entry's position if it
    /// has no `=` or an empty side. The token itself is never echoed.
    pub fn parse(entries: &[String]) -> Result<Self> {
        let mut pairs = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let (user, token) = entry
                .split_once('=')
                .filter(|(user, token)| !user.is_empty() && !token.is_empty())
                .ok_or(AuthError::UserTokenFormat(index))?;
            pairs.push((user.to_string(), token.to_string()));
        }
        Ok(Self::from_pairs(pairs))
    }

    /// Number of configured tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Check if no tokens are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// The user a token belongs to.
    #[must_use]
    pub fn user(&self, token: &str) -> Option<&str> {
        self.users.get(&token_digest(token)).map(String::as_str)
    }

    /// The user authenticated by an `Authorization` header value.
    #[must_use]
    pub fn authenticate(&self, authorization: &str) -> Option<&str> {
        if self.is_empty() {
            return None;
        }
        basic_token(authorization).and_then(|token| self.user(&token))
    }
}

/// The token carried by a `Basic` credential: the password, or the username
/// when the password is empty.
#[must_use]
pub fn basic_token(authorization: &str) -> Option<String> {
    let (scheme, encoded) = authorization.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = BASE64_STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    let token = if password.is_empty() { user } else { password };
    Some(token.to_string()).filter(|t| !t.is_empty())
}

fn token_digest(token: &str) -> String {
    hex::encode(digest::digest(&digest::SHA256, token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "932928c0a4edf9878ee0257a1d8f4d06adaaffee";

    fn basic(user: &str, password: &str) -> String {
        format!("Basic {}", BASE64_STANDARD.encode(format!("{user}:{password}")))
    }

    #[test]
    fn parse_entries() {
        let tokens = UserTokens::parse(&[format!("user1={TOKEN}"), String::new()]).unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens.user(TOKEN), Some("user1"));
        assert_eq!(tokens.user("other"), None);
    }

    #[test]
    fn parse_rejects_malformed_entries() {
        let err = UserTokens::parse(&["user1=ok".to_string(), TOKEN.to_string()]).unwrap_err();
        assert!(matches!(err, AuthError::UserTokenFormat(1)));
        assert!(!err.to_string().contains(TOKEN));

        assert!(UserTokens::parse(&["=token".to_string()]).is_err());
        assert!(UserTokens::parse(&["user=".to_string()]).is_err());
    }

    #[test]
    fn basic_credentials() {
        assert_eq!(basic_token(&basic("", TOKEN)).as_deref(), Some(TOKEN));
        assert_eq!(basic_token(&basic(TOKEN, "")).as_deref(), Some(TOKEN));
        assert_eq!(basic_token(&basic("ignored", TOKEN)).as_deref(), Some(TOKEN));
        assert_eq!(basic_token(&basic("", "")), None);
        assert_eq!(basic_token("Bearer abc"), None);
        assert_eq!(basic_token("Basic !!!"), None);
    }

    #[test]
    fn authenticate_header() {
        let tokens = UserTokens::from_pairs([("user1".to_string(), TOKEN.to_string())]);
        assert_eq!(tokens.authenticate(&basic("", TOKEN)), Some("user1"));
        assert_eq!(tokens.authenticate(&basic("", "wrong")), None);
        assert_eq!(UserTokens::default().authenticate(&basic("", TOKEN)), None);
    }
}
