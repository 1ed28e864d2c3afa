//! # vmforge-crypto: credential encryption port
//!
//! vCenter credentials configured per tenant are encrypted at rest.
//! This crate defines the [`CredentialCipher`] trait the configuration
//! store depends on, and two implementations: [`AesGcmCipher`], a real
//! AES-256-GCM implementation, and [`PlaintextCipher`], a passthrough
//! for tests and local development.
//!
//! Credentials are encrypted independently of any append-only
//! sequence, so there's no stable position to derive a nonce from.
//! [`AesGcmCipher`] instead draws a fresh random nonce per call and
//! prepends it to the ciphertext, so the stored blob carries
//! everything [`CredentialCipher::decrypt`] needs.

use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use rand::RngCore;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Errors a [`CredentialCipher`] implementation can raise.
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("encryption key must be {KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("ciphertext is shorter than the {NONCE_LEN}-byte nonce prefix")]
    Truncated,
    #[error("authentication failed: ciphertext tampered or wrong key")]
    AuthenticationFailed,
}

/// Encrypts and decrypts vCenter credential material before it touches
/// the configuration store. Implementations must treat the returned
/// ciphertext as opaque — the associated data binds it to the tenant
/// and configuration record it was encrypted for, so a blob copied to
/// a different record fails to decrypt.
pub trait CredentialCipher: Send + Sync {
    /// Encrypts `plaintext`, binding it to `associated_data` (typically
    /// the tenant id and config record id serialized to bytes).
    ///
    /// # Errors
    ///
    /// Returns [`CipherError`] if the key configured for this cipher is
    /// malformed.
    fn encrypt(&self, plaintext: &[u8], associated_data: &[u8]) -> Result<Vec<u8>, CipherError>;

    /// Decrypts a blob previously returned by [`encrypt`](Self::encrypt).
    /// `associated_data` must match what was supplied at encryption
    /// time exactly, or authentication fails.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::AuthenticationFailed`] if `ciphertext` was
    /// tampered with, was encrypted under a different key, or
    /// `associated_data` does not match.
    fn decrypt(&self, ciphertext: &[u8], associated_data: &[u8]) -> Result<Vec<u8>, CipherError>;
}

/// AES-256-GCM credential cipher. The key is supplied once at
/// construction (from configuration) and reused for every call; each
/// call draws its own random nonce.
pub struct AesGcmCipher {
    key: [u8; KEY_LEN],
}

impl AesGcmCipher {
    /// Builds a cipher from a raw 32-byte key.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidKeyLength`] if `key` is not
    /// exactly 32 bytes.
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        let key: [u8; KEY_LEN] =
            key.try_into().map_err(|_| CipherError::InvalidKeyLength(key.len()))?;
        Ok(Self { key })
    }
}

impl CredentialCipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &[u8], associated_data: &[u8]) -> Result<Vec<u8>, CipherError> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|_| CipherError::InvalidKeyLength(self.key.len()))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let payload = Payload { msg: plaintext, aad: associated_data };
        let ciphertext = cipher
            .encrypt(nonce, payload)
            .map_err(|_| CipherError::AuthenticationFailed)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8], associated_data: &[u8]) -> Result<Vec<u8>, CipherError> {
        if ciphertext.len() < NONCE_LEN {
            return Err(CipherError::Truncated);
        }
        let (nonce_bytes, sealed) = ciphertext.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|_| CipherError::InvalidKeyLength(self.key.len()))?;
        let nonce = Nonce::from_slice(nonce_bytes);

        let payload = Payload { msg: sealed, aad: associated_data };
        cipher
            .decrypt(nonce, payload)
            .map_err(|_| CipherError::AuthenticationFailed)
    }
}

/// No-op cipher for tests and local development. Stores plaintext
/// verbatim; `associated_data` is ignored. Never construct this outside
/// `#[cfg(test)]` code or a development config profile.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaintextCipher;

impl CredentialCipher for PlaintextCipher {
    fn encrypt(&self, plaintext: &[u8], _associated_data: &[u8]) -> Result<Vec<u8>, CipherError> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, ciphertext: &[u8], _associated_data: &[u8]) -> Result<Vec<u8>, CipherError> {
        Ok(ciphertext.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> [u8; KEY_LEN] {
        let mut k = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut k);
        k
    }

    #[test]
    fn roundtrips_through_encrypt_and_decrypt() {
        let cipher = AesGcmCipher::new(&key()).unwrap();
        let plaintext = b"vcenter-service-account-password";
        let aad = b"tenant-42:config-7";

        let ciphertext = cipher.encrypt(plaintext, aad).unwrap();
        assert_ne!(ciphertext, plaintext);

        let decrypted = cipher.decrypt(&ciphertext, aad).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn two_encryptions_of_the_same_plaintext_produce_different_ciphertext() {
        let cipher = AesGcmCipher::new(&key()).unwrap();
        let a = cipher.encrypt(b"secret", b"aad").unwrap();
        let b = cipher.encrypt(b"secret", b"aad").unwrap();
        assert_ne!(a, b, "nonce must differ between calls");
    }

    #[test]
    fn tampering_with_the_ciphertext_is_detected() {
        let cipher = AesGcmCipher::new(&key()).unwrap();
        let mut ciphertext = cipher.encrypt(b"secret", b"aad").unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xFF;

        let err = cipher.decrypt(&ciphertext, b"aad").unwrap_err();
        assert!(matches!(err, CipherError::AuthenticationFailed));
    }

    #[test]
    fn mismatched_associated_data_is_detected() {
        let cipher = AesGcmCipher::new(&key()).unwrap();
        let ciphertext = cipher.encrypt(b"secret", b"tenant-1").unwrap();

        let err = cipher.decrypt(&ciphertext, b"tenant-2").unwrap_err();
        assert!(matches!(err, CipherError::AuthenticationFailed));
    }

    #[test]
    fn rejects_a_key_of_the_wrong_length() {
        let err = AesGcmCipher::new(&[0u8; 16]).unwrap_err();
        assert!(matches!(err, CipherError::InvalidKeyLength(16)));
    }

    #[test]
    fn plaintext_cipher_is_a_passthrough() {
        let cipher = PlaintextCipher;
        let ciphertext = cipher.encrypt(b"not secret", b"").unwrap();
        assert_eq!(ciphertext, b"not secret");
        assert_eq!(cipher.decrypt(&ciphertext, b"").unwrap(), b"not secret");
    }
}
