//! Wire message types.
//!
//! Every frame carries one [`Message`], a tagged union keyed by `type` with
//! the payload under `data`. Duck typing stops at the codec boundary: a
//! frame either deserializes into a known variant or the whole envelope is
//! rejected.

use serde::{Deserialize, Serialize};

use crate::chat::b64;
use crate::chat::ratchet::EncryptedMessage;

/// A protocol message.
///
/// JSON shape: `{"type": "<snake_case variant>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Message {
    /// First half of the friend handshake, sent by the requester.
    RequestFriend {
        /// Requester's reachable address.
        ip: String,
        port: u16,
        user_id: String,
        /// Requester's long-term RSA public key, SPKI PEM.
        public_key: String,
        /// Optional base64 profile image, decoded by the embedding app.
        profile_base64: Option<String>,
        /// Requester's initial ratchet public key.
        #[serde(with = "b64")]
        dh_public: [u8; 32],
    },

    /// Second half of the handshake, sent by the responder.
    ResponseFriend {
        ip: String,
        port: u16,
        user_id: String,
        public_key: String,
        profile_base64: Option<String>,
        /// Responder's initial ratchet public key.
        #[serde(with = "b64")]
        dh_public: [u8; 32],
        /// Fresh session root key, RSA-wrapped under the requester's
        /// public key, base64.
        root_key: String,
    },

    /// A ratchet-encrypted text message.
    TextMessage {
        sender_id: String,
        dr_message: EncryptedMessage,
        /// Seconds since the Unix epoch, sender's clock.
        timestamp: f64,
    },

    /// A latent-tensor attachment. The ciphered tensor bytes travel in the
    /// envelope's binary tail, not in this header.
    LatentMessage {
        sender_id: String,
        /// Length of the binary tail in bytes.
        enc_latent_size: u64,
        /// Attachment seed, RSA-wrapped under the recipient's public key,
        /// base64.
        enc_seed_string: String,
        /// Always `None` on the wire; the clear seed never leaves the
        /// sender.
        seed_string: Option<String>,
        timestamp: f64,
    },
}

impl Message {
    /// Wire tag of this message, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::RequestFriend { .. } => "request_friend",
            Message::ResponseFriend { .. } => "response_friend",
            Message::TextMessage { .. } => "text_message",
            Message::LatentMessage { .. } => "latent_message",
        }
    }
}

/// One deliverable unit: a message header plus an optional binary tail.
///
/// The tail is `(bytes, type)` where the type is a short format hint such
/// as `"pt"` for serialized tensors.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub message: Message,
    pub binary: Option<(Vec<u8>, String)>,
}

impl Envelope {
    /// An envelope with no binary tail.
    pub fn new(message: Message) -> Self {
        Self {
            message,
            binary: None,
        }
    }

    /// An envelope carrying a binary tail.
    pub fn with_binary(message: Message, bytes: Vec<u8>, binary_type: impl Into<String>) -> Self {
        Self {
            message,
            binary: Some((bytes, binary_type.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_friend_wire_shape() {
        let msg = Message::RequestFriend {
            ip: "10.0.0.2".to_string(),
            port: 5000,
            user_id: "alice".to_string(),
            public_key: "-----BEGIN PUBLIC KEY-----".to_string(),
            profile_base64: None,
            dh_public: [0xAB; 32],
        };

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "request_friend");
        assert_eq!(json["data"]["user_id"], "alice");
        assert_eq!(json["data"]["port"], 5000);
        assert!(json["data"]["profile_base64"].is_null());
        assert!(json["data"]["dh_public"].is_string());

        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_response_friend_carries_wrapped_root_key() {
        let msg = Message::ResponseFriend {
            ip: "10.0.0.3".to_string(),
            port: 5001,
            user_id: "bob".to_string(),
            public_key: "pem".to_string(),
            profile_base64: Some("aGk=".to_string()),
            dh_public: [0x01; 32],
            root_key: "d3JhcHBlZA==".to_string(),
        };

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "response_friend");
        assert_eq!(json["data"]["root_key"], "d3JhcHBlZA==");
    }

    #[test]
    fn test_text_message_roundtrip() {
        let msg = Message::TextMessage {
            sender_id: "alice".to_string(),
            dr_message: crate::chat::ratchet::EncryptedMessage {
                ciphertext: vec![1, 2, 3],
                nonce: [7; 12],
                header: crate::chat::ratchet::MessageHeader {
                    dh_pub: [9; 32],
                    msg_num: 4,
                },
            },
            timestamp: 1724380000.5,
        };

        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_latent_message_seed_is_never_clear() {
        let msg = Message::LatentMessage {
            sender_id: "bob".to_string(),
            enc_latent_size: 4096,
            enc_seed_string: "c2VhbGVk".to_string(),
            seed_string: None,
            timestamp: 1724380001.0,
        };

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "latent_message");
        assert!(json["data"]["seed_string"].is_null());
        assert_eq!(json["data"]["enc_latent_size"], 4096);
    }

    #[test]
    fn test_unknown_type_rejected() {
        let raw = r#"{"type": "exfiltrate", "data": {}}"#;
        assert!(serde_json::from_str::<Message>(raw).is_err());
    }
}
