//! Authenticated, encrypted values.
//!
//! A `SecureCodec` seals a serializable value under a name with AES-256-GCM.
//! The name is bound as associated data, so a value sealed as `"next"` never
//! opens as `"user"` even under the same key. Every sealed value carries its
//! creation time and is rejected once older than the codec's max age.
//!
//! Wire format (URL-safe base64 without padding):
//!
//! ```text
//! nonce (12 bytes) || seal( timestamp (8 bytes, BE) || json payload ) || tag (16 bytes)
//! ```
//!
//! A `CodecSet` tries several codecs in order, which allows key rotation:
//! values are sealed with the first codec and opened by any of them.

use std::fmt;
use std::sync::Arc;

use base64::prelude::*;
use chrono::Utc;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecError;
use crate::keys::SigningKey;

const TIMESTAMP_LEN: usize = 8;

/// Seals and opens named values under one key.
pub struct SecureCodec {
    key: LessSafeKey,
    max_age_seconds: i64,
    rng: SystemRandom,
}

impl SecureCodec {
    /// Create a codec. A `max_age_seconds` of zero or less disables expiry.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Encode` if the key is rejected by the cipher.
    pub fn new(key: &SigningKey, max_age_seconds: i64) -> Result<Self, CodecError> {
        let unbound = UnboundKey::new(&AES_256_GCM, key.as_bytes())
            .map_err(|_| CodecError::Encode("invalid key".to_string()))?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            max_age_seconds,
            rng: SystemRandom::new(),
        })
    }

    /// The configured max age in seconds.
    #[must_use]
    pub const fn max_age_seconds(&self) -> i64 {
        self.max_age_seconds
    }

    /// Seal `value` under `name`.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Encode` if serialization or encryption fails.
    pub fn encode<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<String, CodecError> {
        self.encode_at(name, value, Utc::now().timestamp())
    }

    fn encode_at<T: Serialize + ?Sized>(
        &self,
        name: &str,
        value: &T,
        timestamp: i64,
    ) -> Result<String, CodecError> {
        let payload = serde_json::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))?;

        let mut nonce = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce)
            .map_err(|_| CodecError::Encode("random nonce".to_string()))?;

        let mut in_out = Vec::with_capacity(TIMESTAMP_LEN + payload.len() + AES_256_GCM.tag_len());
        in_out.extend_from_slice(&timestamp.to_be_bytes());
        in_out.extend_from_slice(&payload);

        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce),
                Aad::from(name.as_bytes()),
                &mut in_out,
            )
            .map_err(|_| CodecError::Encode("seal".to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + in_out.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&in_out);
        Ok(BASE64_URL_SAFE_NO_PAD.encode(sealed))
    }

    /// Open a value sealed under `name`.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Invalid` for anything that does not authenticate,
    /// `CodecError::Expired` for values older than the max age and
    /// `CodecError::Payload` if the payload is not a `T`.
    pub fn decode<T: DeserializeOwned>(&self, name: &str, value: &str) -> Result<T, CodecError> {
        let sealed = BASE64_URL_SAFE_NO_PAD
            .decode(value.trim())
            .map_err(|_| CodecError::Invalid)?;
        if sealed.len() < NONCE_LEN + TIMESTAMP_LEN + AES_256_GCM.tag_len() {
            return Err(CodecError::Invalid);
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce).map_err(|_| CodecError::Invalid)?;
        let mut in_out = ciphertext.to_vec();
        let plain = self
            .key
            .open_in_place(nonce, Aad::from(name.as_bytes()), &mut in_out)
            .map_err(|_| CodecError::Invalid)?;

        let (timestamp, payload) = plain.split_at(TIMESTAMP_LEN);
        let mut ts = [0u8; TIMESTAMP_LEN];
        ts.copy_from_slice(timestamp);
        let created = i64::from_be_bytes(ts);
        if self.max_age_seconds > 0 && created < Utc::now().timestamp() - self.max_age_seconds {
            return Err(CodecError::Expired);
        }

        serde_json::from_slice(payload).map_err(|_| CodecError::Payload)
    }
}

impl fmt::Debug for SecureCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureCodec")
            .field("max_age_seconds", &self.max_age_seconds)
            .finish_non_exhaustive()
    }
}

/// An ordered set of codecs.
///
/// Cloning is cheap; the codecs are shared.
#[derive(Debug, Clone, Default)]
pub struct CodecSet {
    codecs: Arc<[SecureCodec]>,
}

impl CodecSet {
    /// A set that can neither seal nor open anything.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a set from codecs; the first one seals.
    #[must_use]
    pub fn new(codecs: Vec<SecureCodec>) -> Self {
        Self {
            codecs: codecs.into(),
        }
    }

    /// A set with a single codec for `key`.
    ///
    /// # Errors
    ///
    /// Returns the codec construction error.
    pub fn from_key(key: &SigningKey, max_age_seconds: i64) -> Result<Self, CodecError> {
        Ok(Self::new(vec![SecureCodec::new(key, max_age_seconds)?]))
    }

    /// Number of codecs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    /// Returns `true` if the set has no codecs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }

    /// Seal `value` with the first codec.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::NoCodecs` for an empty set.
    pub fn encode<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<String, CodecError> {
        self.codecs
            .first()
            .ok_or(CodecError::NoCodecs)?
            .encode(name, value)
    }

    /// Open `value` with the first codec that accepts it.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::NoCodecs` for an empty set, otherwise the error
    /// from the first codec when none accepts the value.
    pub fn decode<T: DeserializeOwned>(&self, name: &str, value: &str) -> Result<T, CodecError> {
        let mut first_error = None;
        for codec in self.codecs.iter() {
            match codec.decode(name, value) {
                Ok(decoded) => return Ok(decoded),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        Err(first_error.unwrap_or(CodecError::NoCodecs))
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Payload {
        user: String,
        count: u32,
    }

    fn codec(hex: &str, max_age: i64) -> SecureCodec {
        SecureCodec::new(&SigningKey::from_hex(hex).unwrap(), max_age).unwrap()
    }

    const KEY_A: &str = "a8b91cde2e3eb7fcd544ece2bdf3ce6d0599fbbcbb1cfc144e1c2bf3cd7a13de";
    const KEY_B: &str = "0000000000000000000000000000000000000000000000000000000000000001";

    #[test]
    fn round_trip() {
        let codec = codec(KEY_A, 3600);
        let value = Payload {
            user: "cloud@user.com".into(),
            count: 3,
        };
        let sealed = codec.encode("session", &value).unwrap();
        let opened: Payload = codec.decode("session", &sealed).unwrap();
        assert_eq!(opened, value);
    }

    #[test]
    fn sealing_is_randomized() {
        let codec = codec(KEY_A, 3600);
        let a = codec.encode("token", "T").unwrap();
        let b = codec.encode("token", "T").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails() {
        let sealed = codec(KEY_A, 3600).encode("token", "T").unwrap();
        let err = codec(KEY_B, 3600)
            .decode::<String>("token", &sealed)
            .unwrap_err();
        assert_eq!(err, CodecError::Invalid);
    }

    #[test]
    fn wrong_name_fails() {
        let codec = codec(KEY_A, 3600);
        let sealed = codec.encode("next", "https://example.com").unwrap();
        assert_eq!(
            codec.decode::<String>("user", &sealed).unwrap_err(),
            CodecError::Invalid
        );
    }

    #[test]
    fn truncated_and_garbage_values_fail() {
        let codec = codec(KEY_A, 3600);
        let sealed = codec.encode("token", "T").unwrap();

        let truncated = &sealed[..sealed.len() / 2];
        assert_eq!(
            codec.decode::<String>("token", truncated).unwrap_err(),
            CodecError::Invalid
        );
        assert_eq!(
            codec.decode::<String>("token", "").unwrap_err(),
            CodecError::Invalid
        );
        assert_eq!(
            codec.decode::<String>("token", "%%%not base64%%%").unwrap_err(),
            CodecError::Invalid
        );
    }

    #[test]
    fn expired_values_fail() {
        let codec = codec(KEY_A, 60);
        let old = codec
            .encode_at("token", "T", Utc::now().timestamp() - 120)
            .unwrap();
        assert_eq!(
            codec.decode::<String>("token", &old).unwrap_err(),
            CodecError::Expired
        );

        let forever = self::codec(KEY_A, 0);
        let old = forever
            .encode_at("token", "T", Utc::now().timestamp() - 1_000_000)
            .unwrap();
        assert_eq!(forever.decode::<String>("token", &old).unwrap(), "T");
    }

    #[test]
    fn payload_type_mismatch() {
        let codec = codec(KEY_A, 3600);
        let sealed = codec.encode("token", "just a string").unwrap();
        assert_eq!(
            codec.decode::<Payload>("token", &sealed).unwrap_err(),
            CodecError::Payload
        );
    }

    #[test]
    fn empty_set() {
        let set = CodecSet::empty();
        assert!(set.is_empty());
        assert_eq!(set.encode("user", "x").unwrap_err(), CodecError::NoCodecs);
        assert_eq!(
            set.decode::<String>("user", "anything").unwrap_err(),
            CodecError::NoCodecs
        );
    }

    #[test]
    fn rotation() {
        let old = codec(KEY_B, 3600);
        let sealed_with_old = old.encode("session", "v1").unwrap();

        let set = CodecSet::new(vec![codec(KEY_A, 3600), old]);
        assert_eq!(set.len(), 2);
        assert_eq!(
            set.decode::<String>("session", &sealed_with_old).unwrap(),
            "v1"
        );

        let sealed_with_new = set.encode("session", "v2").unwrap();
        let only_a = CodecSet::from_key(&SigningKey::from_hex(KEY_A).unwrap(), 3600).unwrap();
        assert_eq!(
            only_a.decode::<String>("session", &sealed_with_new).unwrap(),
            "v2"
        );
    }
}
