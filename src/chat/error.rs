//! Chat error taxonomy.

use thiserror::Error;

use crate::crypto::CryptoError;

/// Errors that can occur in the messaging core.
///
/// Crypto and authentication failures abort the single message or operation
/// and are surfaced to the caller; they are never retried automatically.
/// Transport failures on send are caller-retryable (re-sending an
/// already-encrypted envelope is safe, its nonce is fixed); transport
/// failures on receive abandon the in-progress frame.
#[derive(Error, Debug)]
pub enum ChatError {
    /// Asymmetric wrap/unwrap failure. Deliberately cause-free on decrypt.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// AEAD tag mismatch on ratchet decrypt: tampered or misordered
    /// ciphertext. Fatal for that message.
    #[error("authentication failed: ciphertext rejected")]
    Authentication,

    /// Ratchet epoch counters diverged. No recovery path; the session must
    /// be re-established with a fresh handshake.
    #[error("ratchet desynchronized: expected message {expected}, got {got}")]
    Desync {
        /// Message number the session expected next.
        expected: u32,
        /// Message number carried by the incoming header.
        got: u32,
    },

    /// Connection dropped mid-frame, stalled past the read timeout, or a
    /// frame declared an unacceptable length.
    #[error("transport error: {0}")]
    Transport(String),

    /// Session bootstrap failed; no session was created.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// Header or payload (de)serialization failed.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Unknown peer for a send or dispatch operation.
    #[error("unknown peer: {0}")]
    UnknownPeer(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Key encoding/decoding error.
    #[error(transparent)]
    Key(#[from] crate::crypto::KeyError),
}

impl From<serde_json::Error> for ChatError {
    fn from(e: serde_json::Error) -> Self {
        ChatError::Serialization(e.to_string())
    }
}

impl From<bincode::Error> for ChatError {
    fn from(e: bincode::Error) -> Self {
        ChatError::Serialization(e.to_string())
    }
}
