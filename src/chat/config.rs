//! Protocol constants and runtime configuration.

use std::time::Duration;

/// Messages per ratchet epoch: both chains re-key after this many messages
/// in one direction.
pub const RATCHET_INTERVAL: u32 = 20;

/// Noise rounds for latent attachment encryption.
pub const LATENT_ROUNDS: usize = crate::crypto::latent::DEFAULT_ROUNDS;

/// Length in bytes of the random root key minted by the handshake
/// responder.
pub const ROOT_KEY_LEN: usize = 16;

/// Length of the random per-attachment seed string.
pub const SEED_STRING_LEN: usize = 16;

/// Maximum accepted JSON header size on the wire.
pub const MAX_HEADER_LEN: usize = 1024 * 1024;

/// Maximum accepted binary tail size on the wire (latent tensors).
pub const MAX_BINARY_LEN: usize = 64 * 1024 * 1024;

/// Fixed acknowledgement bytes sent after a fully received envelope.
pub const ACK: &[u8] = b"OK";

/// Default per-read timeout for inbound connections.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Runtime configuration for a node.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the receiver binds to, `ip:port`.
    pub bind_addr: String,
    /// Bound on each blocking read of an inbound frame. On expiry the
    /// partially read envelope is discarded and the connection torn down.
    pub read_timeout: Duration,
    /// Bound on an outbound connect-write-ack cycle.
    pub send_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5000".to_string(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            send_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl Config {
    /// Config bound to an ephemeral localhost port, as used in tests.
    pub fn localhost() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            ..Default::default()
        }
    }
}
