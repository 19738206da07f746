//! Signing keys and random nonces.

use std::fmt;

use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{AuthError, Result};

/// Length of a signing key in bytes.
pub const KEY_LEN: usize = 32;

/// Length of a federation shared secret in characters.
pub const SHARED_SECRET_LEN: usize = 64;

/// A 256-bit key used to authenticate and encrypt sealed values.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey([u8; KEY_LEN]);

impl SigningKey {
    /// Parse a key from 64 hex characters.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::KeyLength` if the input is not 64 characters long
    /// and `AuthError::KeyFormat` if it is not valid hex.
    pub fn from_hex(input: &str) -> Result<Self> {
        if input.len() != KEY_LEN * 2 {
            return Err(AuthError::KeyLength(input.len()));
        }
        let mut bytes = [0u8; KEY_LEN];
        hex::decode_to_slice(input, &mut bytes).map_err(|e| AuthError::KeyFormat(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Derive a key from a 64-character shared secret.
    ///
    /// Federated instances only share the secret text, so the key is its
    /// SHA-256 digest.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::FederationKeyLength` if the secret is not 64
    /// characters long.
    pub fn from_shared_secret(secret: &str) -> Result<Self> {
        if secret.len() != SHARED_SECRET_LEN {
            return Err(AuthError::FederationKeyLength(secret.len()));
        }
        let digest = digest::digest(&digest::SHA256, secret.as_bytes());
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(digest.as_ref());
        Ok(Self(bytes))
    }

    /// Generate a fresh random key.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Random` if the system RNG fails.
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; KEY_LEN];
        SystemRandom::new()
            .fill(&mut bytes)
            .map_err(|_| AuthError::Random)?;
        Ok(Self(bytes))
    }

    /// The raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Hex encoding of the key.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(..)")
    }
}

/// 32 random bytes as 64 hex characters.
///
/// # Errors
///
/// Returns `AuthError::Random` if the system RNG fails.
pub fn random_hex32() -> Result<String> {
    let mut bytes = [0u8; 32];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| AuthError::Random)?;
    Ok(hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "a8b91cde2e3eb7fcd544ece2bdf3ce6d0599fbbcbb1cfc144e1c2bf3cd7a13de";

    #[test]
    fn parse_hex_key() {
        let key = SigningKey::from_hex(KEY).unwrap();
        assert_eq!(key.to_hex(), KEY);
    }

    #[test]
    fn bad_key_length() {
        let err = SigningKey::from_hex("short").unwrap_err();
        assert!(err
            .to_string()
            .contains("cookie key must be exactly 64 hex characters"));
    }

    #[test]
    fn bad_key_format() {
        let err = SigningKey::from_hex(&"g".repeat(64)).unwrap_err();
        assert!(err.to_string().contains("cookie key must be valid hex"));
    }

    #[test]
    fn generated_keys_differ() {
        let a = SigningKey::generate().unwrap();
        let b = SigningKey::generate().unwrap();
        assert_eq!(a.to_hex().len(), 64);
        assert_ne!(a, b);
    }

    #[test]
    fn shared_secret_keys() {
        let secret = "9zcNzr9ObeWnNExMXYbeXxy9CxMMz6FS6ZhSfYRwzXHTNa3ZJo7uFQ2qsWZ5u1Id";
        let a = SigningKey::from_shared_secret(secret).unwrap();
        let b = SigningKey::from_shared_secret(secret).unwrap();
        assert_eq!(a, b);
        assert!(SigningKey::from_shared_secret("too-short").is_err());
    }

    #[test]
    fn debug_is_redacted() {
        let key = SigningKey::from_hex(KEY).unwrap();
        assert_eq!(format!("{key:?}"), "SigningKey(..)");
    }

    #[test]
    fn random_hex() {
        let h = random_hex32().unwrap();
        assert_eq!(h.len(), 64);
        assert!(h.bytes().all(|b| b.is_ascii_hexdigit()));
    }
}
