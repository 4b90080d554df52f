//! Symmetric encryption for stored credential values

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

const NONCE_LEN: usize = 12;

#[derive(Debug, Clone, Error)]
pub enum CipherError {
    #[error("encryption key is empty")]
    EmptyKey,

    #[error("encryption key variable {0} is not set")]
    MissingKey(String),

    #[error("value is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("value is too short to contain a nonce")]
    Truncated,

    #[error("authentication failed (wrong key or tampered value)")]
    Authentication,

    #[error("decrypted value is not valid UTF-8")]
    NotUtf8,
}

/// AES-256-GCM cipher keyed by the SHA-256 of a passphrase
///
/// Encrypted values are `base64(nonce || ciphertext || tag)` with a fresh
/// random 96-bit nonce per value.
#[derive(Clone)]
pub struct Cipher {
    inner: Aes256Gcm,
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cipher { .. }")
    }
}

impl Cipher {
    pub fn from_passphrase(passphrase: &str) -> Result<Self, CipherError> {
        if passphrase.is_empty() {
            return Err(CipherError::EmptyKey);
        }
        let key = Sha256::digest(passphrase.as_bytes());
        Ok(Self {
            inner: Aes256Gcm::new(&key),
        })
    }

    /// Build a cipher from the passphrase held in an environment variable
    pub fn from_env(var: &str) -> Result<Self, CipherError> {
        let passphrase =
            std::env::var(var).map_err(|_| CipherError::MissingKey(var.to_string()))?;
        Self::from_passphrase(&passphrase)
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let nonce_bytes: [u8; NONCE_LEN] = rand::random();
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .inner
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CipherError::Authentication)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(out))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, CipherError> {
        let raw = STANDARD.decode(encoded.trim())?;
        if raw.len() <= NONCE_LEN {
            return Err(CipherError::Truncated);
        }
        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .inner
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CipherError::Authentication)?;
        String::from_utf8(plaintext).map_err(|_| CipherError::NotUtf8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let cipher = Cipher::from_passphrase("correct horse").unwrap();
        let sealed = cipher.encrypt("sk-test-123").unwrap();

        assert!(!sealed.contains("sk-test-123"));
        assert_eq!(cipher.decrypt(&sealed).unwrap(), "sk-test-123");
    }

    #[test]
    fn test_fresh_nonce_per_value() {
        let cipher = Cipher::from_passphrase("k").unwrap();
        assert_ne!(cipher.encrypt("same").unwrap(), cipher.encrypt("same").unwrap());
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = Cipher::from_passphrase("one").unwrap().encrypt("secret").unwrap();
        let err = Cipher::from_passphrase("two").unwrap().decrypt(&sealed).unwrap_err();
        assert!(matches!(err, CipherError::Authentication));
    }

    #[test]
    fn test_malformed_values() {
        let cipher = Cipher::from_passphrase("k").unwrap();
        assert!(matches!(cipher.decrypt("not base64!!"), Err(CipherError::Encoding(_))));
        assert!(matches!(cipher.decrypt("AAAA"), Err(CipherError::Truncated)));
    }

    #[test]
    fn test_empty_passphrase_rejected() {
        assert!(matches!(Cipher::from_passphrase(""), Err(CipherError::EmptyKey)));
    }

    #[test]
    fn test_missing_env_key() {
        let err = Cipher::from_env("NODEFLOW_TEST_KEY_THAT_IS_NEVER_SET").unwrap_err();
        assert!(matches!(err, CipherError::MissingKey(_)));
    }
}
