//! Asymmetric encryption of short secrets with RSA-OAEP.
//!
//! Root keys and latent seeds are wrapped under a peer's long-term public
//! key using OAEP with SHA-256 for both the padding mask (MGF1) and the
//! label hash. Only short secrets fit: a 2048-bit key can carry at most
//! 190 bytes per operation.

use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use thiserror::Error;

/// Output length of SHA-256 in bytes, used in the OAEP capacity formula.
const HASH_LEN: usize = 32;

/// Errors that can occur during asymmetric operations.
///
/// Decryption failures are deliberately a single cause-free value so that
/// callers (and remote peers observing caller behavior) cannot distinguish
/// a padding failure from any other failure.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Plaintext does not fit the key's OAEP capacity.
    #[error("plaintext too large for OAEP: {got} bytes, capacity {capacity}")]
    PlaintextTooLarge {
        /// Maximum plaintext length for this key.
        capacity: usize,
        /// Length of the rejected plaintext.
        got: usize,
    },

    /// Encryption failed inside the RSA engine.
    #[error("asymmetric encryption failed")]
    EncryptFailed,

    /// Decryption failed. Never carries a cause.
    #[error("asymmetric decryption failed")]
    DecryptFailed,
}

/// Maximum plaintext length encryptable under `key` with OAEP/SHA-256.
///
/// `key_size/8 - 2*hash_len - 2`, e.g. 190 bytes for a 2048-bit key.
pub fn oaep_capacity(key: &RsaPublicKey) -> usize {
    key.size().saturating_sub(2 * HASH_LEN + 2)
}

/// Encrypts a short secret under the recipient's public key.
///
/// Fails with [`CryptoError::PlaintextTooLarge`] if `plaintext` exceeds the
/// key's OAEP capacity. Pure function over the supplied key.
pub fn encrypt(plaintext: &[u8], recipient: &RsaPublicKey) -> Result<Vec<u8>, CryptoError> {
    let capacity = oaep_capacity(recipient);
    if plaintext.len() > capacity {
        return Err(CryptoError::PlaintextTooLarge {
            capacity,
            got: plaintext.len(),
        });
    }

    recipient
        .encrypt(&mut rand::rngs::OsRng, Oaep::new::<Sha256>(), plaintext)
        .map_err(|_| CryptoError::EncryptFailed)
}

/// Decrypts a secret with our private key.
///
/// Any failure (wrong key, corrupted ciphertext, padding mismatch) maps to
/// the same generic [`CryptoError::DecryptFailed`].
pub fn decrypt(ciphertext: &[u8], own: &RsaPrivateKey) -> Result<Vec<u8>, CryptoError> {
    own.decrypt(Oaep::new::<Sha256>(), ciphertext)
        .map_err(|_| CryptoError::DecryptFailed)
}
