//! Cryptographic primitives for latchat.
//!
//! Three independent pieces live here:
//!
//! - [`keys`]: long-term RSA identities with PEM (de)serialization
//! - [`asymmetric`]: RSA-OAEP(SHA-256) wrap/unwrap of short secrets
//! - [`latent`]: the seed-keyed additive noise cipher for image latents

pub mod asymmetric;
pub mod keys;
pub mod latent;

pub use asymmetric::CryptoError;
pub use keys::{Identity, KeyError};
pub use latent::Latent;
