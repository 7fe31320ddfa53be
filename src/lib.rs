//! # Latchat - peer-to-peer encrypted messaging core
//!
//! Latchat implements the cryptographic and protocol core of a direct
//! peer-to-peer messenger whose image attachments travel as encrypted
//! latent tensors.
//!
//! ## Overview
//!
//! - Text messages are protected by a per-friend [`chat::RatchetSession`]:
//!   a chained HMAC-SHA256 key derivation with AES-256-GCM per message and
//!   a re-keying step every [`chat::config::RATCHET_INTERVAL`] messages.
//! - Sessions are bootstrapped by a two-message `request_friend` /
//!   `response_friend` handshake; the initial root key is RSA-OAEP wrapped
//!   under the requester's long-term public key and never crosses the wire
//!   in the clear.
//! - Image latents are obfuscated independently of the ratchet by a
//!   seed-keyed additive Gaussian noise cipher; the random per-attachment
//!   seed is RSA-wrapped for the recipient.
//! - Envelopes travel over a length-prefixed wire format: 4-byte big-endian
//!   length, UTF-8 JSON header, optional raw binary tail.
//!
//! ## Security model and known limitations
//!
//! - The ratchet's "DH" step derives public values by hashing, not by a
//!   real Diffie-Hellman exchange, and the epoch shared secret is computed
//!   from the two current public values. A passive observer who records the
//!   full wire transcript can reconstruct the hash input, so the re-keying
//!   step bounds the damage from a leaked *chain* key but does not provide
//!   forward secrecy against such an observer. This mirrors the deployed
//!   protocol and is kept for compatibility rather than silently replaced
//!   with real ECDH.
//! - Delivery must be strictly in order per direction. There is no skipped
//!   message key cache; a dropped or reordered message permanently
//!   desynchronizes the session ([`chat::ChatError::Desync`]) and requires
//!   a fresh handshake.
//! - The latent cipher is confidentiality-only obfuscation with no
//!   integrity check: a corrupted ciphertext decrypts to garbage pixels
//!   silently.
//!
//! ## Modules
//!
//! - [`crypto`]: RSA identities, OAEP wrap/unwrap, the latent noise cipher
//! - [`chat`]: ratchet sessions, handshake, wire codec, transport, node

pub mod chat;
pub mod crypto;

// Re-export commonly used types at the crate root
pub use chat::{
    ChatError, Config, EncryptedLatent, EncryptedMessage, Envelope, Event, LocalEndpoint, Message,
    Node, PeerInfo, PendingHandshake, RatchetSession, Receiver,
};
pub use crypto::{CryptoError, Identity, KeyError, Latent};
