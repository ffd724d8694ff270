//! Password encryption and digests
//!
//! Passwords stashed while a form is pending are encrypted with AES-256-GCM
//! (`base64(nonce || ciphertext || tag)`); stored passwords and password
//! history only keep a SHA-256 digest.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Length of AES-256 key in bytes.
pub const KEY_LENGTH: usize = 32;

/// Length of GCM nonce in bytes.
const NONCE_LENGTH: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("encryption failed: {0}")]
    Encrypt(String),

    #[error("decryption failed: {0}")]
    Decrypt(String),
}

/// Symmetric cipher for passwords held across form submissions.
#[derive(Clone)]
pub struct PasswordCipher {
    key: [u8; KEY_LENGTH],
}

impl std::fmt::Debug for PasswordCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordCipher").finish_non_exhaustive()
    }
}

impl PasswordCipher {
    pub fn new(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Fresh random key. Stashed passwords do not survive a restart with it.
    pub fn random() -> Self {
        let mut key = [0u8; KEY_LENGTH];
        OsRng.fill_bytes(&mut key);
        Self::new(key)
    }

    pub fn from_base64(base64_key: &str) -> Result<Self, CryptoError> {
        let bytes = STANDARD
            .decode(base64_key.trim())
            .map_err(|e| CryptoError::InvalidKey(format!("invalid base64 key: {e}")))?;

        let key: [u8; KEY_LENGTH] = bytes.as_slice().try_into().map_err(|_| {
            CryptoError::InvalidKey(format!("key must be {} bytes, got {}", KEY_LENGTH, bytes.len()))
        })?;
        Ok(Self::new(key))
    }

    fn cipher(&self) -> Result<Aes256Gcm, CryptoError> {
        Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| CryptoError::InvalidKey(format!("failed to create cipher: {e}")))
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let cipher = self.cipher()?;

        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| CryptoError::Encrypt(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(out))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, CryptoError> {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| CryptoError::Decrypt(format!("invalid base64: {e}")))?;
        if bytes.len() <= NONCE_LENGTH {
            return Err(CryptoError::Decrypt("ciphertext too short".to_string()));
        }

        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_LENGTH);
        let plaintext = self
            .cipher()?
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| CryptoError::Decrypt(e.to_string()))?;

        String::from_utf8(plaintext).map_err(|e| CryptoError::Decrypt(e.to_string()))
    }
}

/// Hex SHA-256 of a clear password.
pub fn password_digest(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

pub fn verify_digest(password: &str, digest: &str) -> bool {
    password_digest(password) == digest
}

/// Random token for password reset requests.
pub fn random_token() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
