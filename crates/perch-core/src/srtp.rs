//! SRTP cipher suites and per-stream key material.
//!
//! perch never originates cryptographic material — the controller chooses
//! key and salt during negotiation, and perch only range-checks, stores,
//! and hands them to the transcoder. Key material is wrapped in
//! `Zeroizing` so it is wiped from memory when a session is torn down.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

/// Key length (bytes) for AES_CM_128_HMAC_SHA1_80.
pub const SRTP_KEY_LEN: usize = 16;
/// Salt length (bytes) for AES_CM_128_HMAC_SHA1_80.
pub const SRTP_SALT_LEN: usize = 14;

// ── Cipher suites ─────────────────────────────────────────────────────────────

/// SRTP cipher suite declared by the controller for one media stream.
///
/// Only `AesCm128HmacSha1_80` is supported end-to-end (it is the one
/// suite the transcoder can apply). `None` is an explicit plaintext
/// mode for debugging. Anything else is rejected at negotiation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CryptoSuite {
    #[serde(rename = "aes_cm_128_hmac_sha1_80")]
    AesCm128HmacSha1_80,
    #[serde(rename = "aes_cm_256_hmac_sha1_80")]
    AesCm256HmacSha1_80,
    #[serde(rename = "none")]
    None,
}

impl CryptoSuite {
    /// Whether perch can carry sessions negotiated with this suite.
    pub fn is_supported(self) -> bool {
        !matches!(self, CryptoSuite::AesCm256HmacSha1_80)
    }

    /// The suite name the transcoder expects, or `None` for plaintext.
    pub fn transcoder_name(self) -> Option<&'static str> {
        match self {
            CryptoSuite::AesCm128HmacSha1_80 => Some("AES_CM_128_HMAC_SHA1_80"),
            _ => None,
        }
    }
}

impl std::fmt::Display for CryptoSuite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CryptoSuite::AesCm128HmacSha1_80 => write!(f, "AES_CM_128_HMAC_SHA1_80"),
            CryptoSuite::AesCm256HmacSha1_80 => write!(f, "AES_CM_256_HMAC_SHA1_80"),
            CryptoSuite::None => write!(f, "none"),
        }
    }
}

// ── Key material ──────────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SrtpError {
    #[error("srtp key must be {SRTP_KEY_LEN} bytes, got {0}")]
    BadKeyLength(usize),
    #[error("srtp salt must be {SRTP_SALT_LEN} bytes, got {0}")]
    BadSaltLength(usize),
}

/// Controller-chosen key and salt for one media stream.
///
/// Both halves are zeroized on drop. The Debug impl never prints the
/// bytes themselves.
pub struct SrtpMaterial {
    key: Zeroizing<Vec<u8>>,
    salt: Zeroizing<Vec<u8>>,
}

impl SrtpMaterial {
    /// Validate lengths and take ownership of the material.
    pub fn new(key: Vec<u8>, salt: Vec<u8>) -> Result<Self, SrtpError> {
        if key.len() != SRTP_KEY_LEN {
            return Err(SrtpError::BadKeyLength(key.len()));
        }
        if salt.len() != SRTP_SALT_LEN {
            return Err(SrtpError::BadSaltLength(salt.len()));
        }
        Ok(Self {
            key: Zeroizing::new(key),
            salt: Zeroizing::new(salt),
        })
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    /// Base64 of key‖salt — the form the transcoder's srtp_out_params
    /// argument takes.
    pub fn to_base64(&self) -> String {
        use base64::Engine;
        let mut joined = Zeroizing::new(Vec::with_capacity(self.key.len() + self.salt.len()));
        joined.extend_from_slice(&self.key);
        joined.extend_from_slice(&self.salt);
        base64::engine::general_purpose::STANDARD.encode(&*joined)
    }
}

impl std::fmt::Debug for SrtpMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SrtpMaterial")
            .field("key_len", &self.key.len())
            .field("salt_len", &self.salt.len())
            .finish()
    }
}

// ── Serde helper ──────────────────────────────────────────────────────────────

/// Base64 (de)serialization for raw byte fields carried in JSON.
pub mod b64_serde {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(de)?;
        base64::engine::general_purpose::STANDARD
            .decode(text.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_128_suite_encrypts() {
        assert!(CryptoSuite::AesCm128HmacSha1_80.transcoder_name().is_some());
        assert!(CryptoSuite::AesCm256HmacSha1_80.transcoder_name().is_none());
        assert!(CryptoSuite::None.transcoder_name().is_none());
    }

    #[test]
    fn the_256_suite_is_rejected() {
        assert!(CryptoSuite::AesCm128HmacSha1_80.is_supported());
        assert!(CryptoSuite::None.is_supported());
        assert!(!CryptoSuite::AesCm256HmacSha1_80.is_supported());
    }

    #[test]
    fn material_rejects_wrong_lengths() {
        assert!(matches!(
            SrtpMaterial::new(vec![0; 15], vec![0; SRTP_SALT_LEN]),
            Err(SrtpError::BadKeyLength(15))
        ));
        assert!(matches!(
            SrtpMaterial::new(vec![0; SRTP_KEY_LEN], vec![0; 2]),
            Err(SrtpError::BadSaltLength(2))
        ));
    }

    #[test]
    fn base64_is_key_then_salt() {
        use base64::Engine;
        let material = SrtpMaterial::new(vec![1; SRTP_KEY_LEN], vec![2; SRTP_SALT_LEN]).unwrap();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(material.to_base64())
            .unwrap();
        assert_eq!(&decoded[..SRTP_KEY_LEN], &[1; SRTP_KEY_LEN]);
        assert_eq!(&decoded[SRTP_KEY_LEN..], &[2; SRTP_SALT_LEN]);
    }

    #[test]
    fn suite_serde_names() {
        let json = serde_json::to_string(&CryptoSuite::AesCm128HmacSha1_80).unwrap();
        assert_eq!(json, "\"aes_cm_128_hmac_sha1_80\"");
        let back: CryptoSuite = serde_json::from_str("\"none\"").unwrap();
        assert_eq!(back, CryptoSuite::None);
    }
}
