//! Seed-keyed additive noise cipher for image latents.
//!
//! A latent is a numeric tensor produced by an external image encoder. It is
//! obfuscated independently of the text ratchet so attachments can be
//! decrypted later, out of order, or re-derived from the seed alone: each
//! round derives a 32-bit seed from the passphrase, draws Gaussian noise of
//! the tensor's shape from a deterministic generator, and adds it
//! elementwise. Decryption replays the rounds in reverse and subtracts.
//!
//! This is a keyed additive stream over floating-point values, not a vetted
//! cryptographic primitive, and it carries **no integrity check**: a wrong
//! seed or corrupted ciphertext silently yields garbage. It is always
//! layered underneath an RSA-wrapped random seed (see
//! [`crate::chat::attachment`]), never used as the sole confidentiality
//! guarantee.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Default number of noise rounds.
pub const DEFAULT_ROUNDS: usize = 8;

/// A numeric tensor: row-major data plus its shape.
///
/// The image encode/decode step that produces and consumes latents is an
/// external collaborator; this crate treats the tensor as opaque numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Latent {
    /// Tensor dimensions, e.g. `[1, 4, 64, 64]`.
    pub shape: Vec<usize>,
    /// Row-major elements; `data.len() == shape.iter().product()`.
    pub data: Vec<f32>,
}

impl Latent {
    /// Creates a latent, checking that the element count matches the shape.
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Option<Self> {
        if shape.iter().product::<usize>() == data.len() {
            Some(Self { shape, data })
        } else {
            None
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the tensor has no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Serializes to compact bytes for the wire's binary tail.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserializes from wire bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

/// Derives the 32-bit generator seed for one round.
///
/// The low 32 bits of `SHA-256("{seed}_{round}")`, i.e. the big-endian tail
/// of the digest. Matches `int(hexdigest, 16) mod 2^32` of the original
/// wire peers, so the round keys are stable across implementations.
fn round_seed(seed: &str, round: usize) -> u32 {
    let digest = Sha256::digest(format!("{seed}_{round}").as_bytes());
    u32::from_be_bytes([digest[28], digest[29], digest[30], digest[31]])
}

/// Adds `sign * noise(round)` into `acc` for one round.
fn apply_round(acc: &mut [f32], seed: &str, round: usize, sign: f32) {
    let mut rng = ChaCha8Rng::seed_from_u64(u64::from(round_seed(seed, round)));
    for value in acc.iter_mut() {
        let noise: f32 = rng.sample(StandardNormal);
        *value += sign * noise;
    }
}

/// Encrypts a latent by accumulating `rounds` layers of seeded Gaussian
/// noise, round order `0..rounds`.
pub fn encrypt(latent: &Latent, seed: &str, rounds: usize) -> Latent {
    let mut encrypted = latent.clone();
    for i in 0..rounds {
        apply_round(&mut encrypted.data, seed, i, 1.0);
    }
    encrypted
}

/// Decrypts a latent by subtracting the same noise layers in reverse round
/// order. Must be called with the exact seed and round count used to
/// encrypt; there is no integrity check to catch a mismatch.
pub fn decrypt(encrypted: &Latent, seed: &str, rounds: usize) -> Latent {
    let mut decrypted = encrypted.clone();
    for i in (0..rounds).rev() {
        apply_round(&mut decrypted.data, seed, i, -1.0);
    }
    decrypted
}
