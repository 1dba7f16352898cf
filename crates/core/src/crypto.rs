//! Credential encryption at rest.
//!
//! Linked provider credentials and Git session secrets are stored
//! AES-256-GCM encrypted so they can be decrypted on demand (a refresh
//! token is needed in plaintext for every upstream call; a session
//! secret is revealed once in the remote URL). The cipher sits behind a
//! trait so tests can substitute a trivial implementation.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};

use crate::error::CoreError;
use crate::hashing::{from_hex, to_hex};

/// AES-GCM nonce size in bytes.
const NONCE_LEN: usize = 12;

/// Encrypts and decrypts stored secrets.
///
/// Implementations must never include plaintext or key material in
/// error values; failures surface as sanitized internal errors.
pub trait SecretCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String, CoreError>;
    fn decrypt(&self, ciphertext: &str) -> Result<String, CoreError>;
}

/// AES-256-GCM cipher keyed from server configuration.
///
/// Ciphertext wire format: lowercase hex of `nonce || ciphertext+tag`.
/// A fresh random nonce is drawn per encryption.
pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl AesGcmCipher {
    /// Build a cipher from a 64-character hex key (32 bytes).
    pub fn from_hex_key(hex_key: &str) -> Result<Self, CoreError> {
        let key_bytes = from_hex(hex_key)
            .ok_or_else(|| CoreError::Validation("credential key must be hex".into()))?;
        if key_bytes.len() != 32 {
            return Err(CoreError::Validation(
                "credential key must be 32 bytes (64 hex chars)".into(),
            ));
        }
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }
}

impl SecretCipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String, CoreError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CoreError::Internal("credential encryption failed".into()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(to_hex(&out))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, CoreError> {
        let bytes = from_hex(ciphertext)
            .ok_or_else(|| CoreError::Internal("credential decryption failed".into()))?;
        if bytes.len() <= NONCE_LEN {
            return Err(CoreError::Internal("credential decryption failed".into()));
        }
        let (nonce, sealed) = bytes.split_at(NONCE_LEN);
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CoreError::Internal("credential decryption failed".into()))?;
        String::from_utf8(plain)
            .map_err(|_| CoreError::Internal("credential decryption failed".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_A: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";
    const KEY_B: &str = "ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff";

    #[test]
    fn round_trip() {
        let cipher = AesGcmCipher::from_hex_key(KEY_A).unwrap();
        let sealed = cipher.encrypt("refresh-token-123").unwrap();
        assert_ne!(sealed, "refresh-token-123");
        assert_eq!(cipher.decrypt(&sealed).unwrap(), "refresh-token-123");
    }

    #[test]
    fn fresh_nonce_per_encryption() {
        let cipher = AesGcmCipher::from_hex_key(KEY_A).unwrap();
        let a = cipher.encrypt("same").unwrap();
        let b = cipher.encrypt("same").unwrap();
        assert_ne!(a, b, "each encryption must use a fresh nonce");
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let a = AesGcmCipher::from_hex_key(KEY_A).unwrap();
        let b = AesGcmCipher::from_hex_key(KEY_B).unwrap();
        let sealed = a.encrypt("secret").unwrap();
        assert!(b.decrypt(&sealed).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let cipher = AesGcmCipher::from_hex_key(KEY_A).unwrap();
        let mut sealed = cipher.encrypt("secret").unwrap();
        // Flip the last hex digit.
        let last = sealed.pop().unwrap();
        sealed.push(if last == '0' { '1' } else { '0' });
        assert!(cipher.decrypt(&sealed).is_err());
    }

    #[test]
    fn bad_key_rejected() {
        assert!(AesGcmCipher::from_hex_key("deadbeef").is_err());
        assert!(AesGcmCipher::from_hex_key("zz").is_err());
    }

    #[test]
    fn garbage_ciphertext_rejected() {
        let cipher = AesGcmCipher::from_hex_key(KEY_A).unwrap();
        assert!(cipher.decrypt("not-hex").is_err());
        assert!(cipher.decrypt("abcd").is_err());
    }

    #[test]
    fn error_values_do_not_leak_plaintext() {
        let cipher = AesGcmCipher::from_hex_key(KEY_A).unwrap();
        let err = cipher.decrypt("abcd").unwrap_err();
        assert!(!format!("{err}").contains("abcd"));
    }
}
