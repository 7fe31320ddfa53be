//! The messaging core: sessions, handshake, wire protocol, transport,
//! node.
//!
//! Layering, bottom up: [`ratchet`] and [`attachment`] produce and consume
//! ciphertext, [`protocol`] names the messages, [`wire`] frames them,
//! [`transport`] moves them over TCP, and [`node`] ties the layers to a
//! local identity and its friends.

pub mod attachment;
pub mod config;
pub mod error;
pub mod handshake;
pub mod node;
pub mod protocol;
pub mod ratchet;
pub mod transport;
pub mod wire;

pub use attachment::EncryptedLatent;
pub use config::Config;
pub use error::ChatError;
pub use handshake::{LocalEndpoint, PeerInfo, PendingHandshake};
pub use node::{Event, Node};
pub use protocol::{Envelope, Message};
pub use ratchet::{EncryptedMessage, MessageHeader, RatchetSession, RatchetSnapshot};
pub use transport::Receiver;

/// Serde adapter: raw bytes as base64 strings in JSON headers.
///
/// Works for `Vec<u8>` and fixed arrays alike via `TryFrom<Vec<u8>>`.
pub(crate) mod b64 {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S, T>(bytes: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: AsRef<[u8]>,
    {
        serializer.serialize_str(&BASE64.encode(bytes.as_ref()))
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: TryFrom<Vec<u8>>,
    {
        let encoded = String::deserialize(deserializer)?;
        let bytes = BASE64
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)?;
        T::try_from(bytes).map_err(|_| serde::de::Error::custom("unexpected byte length"))
    }
}
