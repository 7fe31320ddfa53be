//! Latent-tensor attachments.
//!
//! A tensor travels as additive-noise ciphertext keyed by a fresh random
//! seed string; the seed travels RSA-wrapped under the recipient's
//! long-term public key. The noise layer is confidentiality-only, but the
//! seed wrap means only the holder of the matching private key can replay
//! and subtract the noise.

use rand::distributions::Alphanumeric;
use rand::Rng;
use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::chat::config::{LATENT_ROUNDS, SEED_STRING_LEN};
use crate::chat::error::ChatError;
use crate::crypto::asymmetric;
use crate::crypto::latent::{self, Latent};

/// A sealed attachment ready for the wire.
#[derive(Debug, Clone)]
pub struct EncryptedLatent {
    /// Noise-ciphered tensor, serialized. Travels as the envelope's
    /// binary tail.
    pub cipher_bytes: Vec<u8>,
    /// The seed string, RSA-wrapped for the recipient.
    pub wrapped_seed: Vec<u8>,
}

/// Seals a tensor for `recipient` under a fresh random seed.
///
/// The seed is minted per attachment and discarded; it exists in the clear
/// only inside this function.
pub fn seal_latent(
    tensor: &Latent,
    recipient: &RsaPublicKey,
) -> Result<EncryptedLatent, ChatError> {
    let seed: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SEED_STRING_LEN)
        .map(char::from)
        .collect();

    let ciphered = latent::encrypt(tensor, &seed, LATENT_ROUNDS);
    let cipher_bytes = ciphered.to_bytes()?;
    let wrapped_seed = asymmetric::encrypt(seed.as_bytes(), recipient)?;

    Ok(EncryptedLatent {
        cipher_bytes,
        wrapped_seed,
    })
}

/// Opens a sealed attachment with our private key.
pub fn open_latent(
    cipher_bytes: &[u8],
    wrapped_seed: &[u8],
    own: &RsaPrivateKey,
) -> Result<Latent, ChatError> {
    let seed_bytes = asymmetric::decrypt(wrapped_seed, own)?;
    let seed = String::from_utf8(seed_bytes)
        .map_err(|_| ChatError::Serialization("attachment seed is not UTF-8".to_string()))?;

    let ciphered = Latent::from_bytes(cipher_bytes)?;
    Ok(latent::decrypt(&ciphered, &seed, LATENT_ROUNDS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::test_identity;

    fn sample_tensor() -> Latent {
        let data: Vec<f32> = (0..64).map(|i| (i as f32) * 0.25 - 4.0).collect();
        Latent::new(vec![4, 4, 4], data).unwrap()
    }

    #[test]
    fn test_seal_open_roundtrip_within_tolerance() {
        let bob = test_identity("bob");
        let tensor = sample_tensor();

        let sealed = seal_latent(&tensor, &bob.public).unwrap();
        let opened = open_latent(&sealed.cipher_bytes, &sealed.wrapped_seed, &bob.private).unwrap();

        assert_eq!(opened.shape, tensor.shape);
        for (a, b) in opened.data.iter().zip(tensor.data.iter()) {
            assert!((a - b).abs() < 1e-3, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_cipher_bytes_hide_the_tensor() {
        let bob = test_identity("bob");
        let tensor = sample_tensor();

        let sealed = seal_latent(&tensor, &bob.public).unwrap();
        let ciphered = Latent::from_bytes(&sealed.cipher_bytes).unwrap();

        // Eight rounds of unit-variance noise move every element
        let moved = ciphered
            .data
            .iter()
            .zip(tensor.data.iter())
            .filter(|(c, p)| (*c - *p).abs() > 0.5)
            .count();
        assert!(moved > tensor.len() / 2);
    }

    #[test]
    fn test_fresh_seed_per_attachment() {
        let bob = test_identity("bob");
        let tensor = sample_tensor();

        let s1 = seal_latent(&tensor, &bob.public).unwrap();
        let s2 = seal_latent(&tensor, &bob.public).unwrap();

        // Different seeds give different ciphertexts for the same tensor
        assert_ne!(s1.cipher_bytes, s2.cipher_bytes);
    }

    #[test]
    fn test_wrong_recipient_cannot_open() {
        let bob = test_identity("bob");
        let mallory = test_identity("mallory");
        let tensor = sample_tensor();

        let sealed = seal_latent(&tensor, &bob.public).unwrap();
        let err =
            open_latent(&sealed.cipher_bytes, &sealed.wrapped_seed, &mallory.private).unwrap_err();
        assert!(matches!(err, ChatError::Crypto(_)));
    }
}
