//! Chained key derivation and periodic re-keying for per-friend sessions.
//!
//! Each direction owns a chain key advanced by HMAC-SHA256 on every
//! message; each message is sealed with AES-256-GCM under a one-time key.
//! Every [`RATCHET_INTERVAL`] messages the sending side rotates its DH
//! keypair and folds a shared secret into the root key; the receiving side
//! mirrors the step off its own counter and the public key carried in the
//! message header.
//!
//! ## Inherited weakness, preserved deliberately
//!
//! The "DH" here is not a real Diffie-Hellman exchange: a public key is the
//! SHA-256 of the private bytes, and the epoch shared secret hashes the two
//! current public values (both of which appear on the wire). The re-keying
//! step therefore bounds the damage from a leaked chain key but gives no
//! forward secrecy against a passive observer holding the full transcript.
//! The handshake and wire peers are built around this exact derivation, so
//! it is preserved rather than silently upgraded to ECDH.
//!
//! ## Ordering
//!
//! Both ratchet triggers are keyed off counters modulo the interval, so
//! strict in-order delivery within an epoch is required. There is no
//! skipped-message-key cache: a dropped or reordered message surfaces as
//! [`ChatError::Desync`] and permanently desynchronizes the session.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::chat::b64;
use crate::chat::config::RATCHET_INTERVAL;
use crate::chat::error::ChatError;

type HmacSha256 = Hmac<Sha256>;

/// Domain separation labels for the chain KDF.
const LABEL_CHAIN: &[u8] = b"chain";
const LABEL_MESSAGE: &[u8] = b"msg";

/// Header sent alongside each ciphertext so the receiver can ratchet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    /// Sender's current DH public key.
    #[serde(with = "b64")]
    pub dh_pub: [u8; 32],
    /// Post-increment message number within the sender's current epoch.
    pub msg_num: u32,
}

/// One encrypted message as produced by [`RatchetSession::encrypt`].
///
/// Created fresh per plaintext and never reused: the nonce must never
/// repeat under the same message key. Serializes to JSON with base64 byte
/// fields, the exact shape carried in the `dr_message` envelope field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedMessage {
    /// AES-256-GCM ciphertext including the tag.
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
    /// Fresh random 96-bit nonce.
    #[serde(with = "b64")]
    pub nonce: [u8; 12],
    /// Ratcheting metadata.
    pub header: MessageHeader,
}

/// Serializable session state for persistence across process restarts.
///
/// Byte fields round-trip as base64 so the snapshot embeds cleanly in the
/// JSON friend store kept by the embedding application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatchetSnapshot {
    #[serde(with = "b64")]
    pub root_key: Vec<u8>,
    #[serde(with = "b64")]
    pub dh_priv: Vec<u8>,
    #[serde(with = "b64")]
    pub dh_pub: [u8; 32],
    #[serde(with = "b64")]
    pub dh_pub_remote: Vec<u8>,
    #[serde(with = "b64")]
    pub send_chain_key: Vec<u8>,
    #[serde(with = "b64")]
    pub recv_chain_key: Vec<u8>,
    pub send_count: u32,
    pub recv_count: u32,
}

/// Per-friend ratcheting session.
///
/// Owned by exactly one friend relationship, which is its sole mutator.
/// All key material is zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct RatchetSession {
    /// Evolves only via the ratchet step, never directly.
    root_key: Vec<u8>,
    /// Regenerated on every send-side ratchet step.
    dh_private: Vec<u8>,
    /// `SHA-256(dh_private)`. Not a DH scalar product; see module docs.
    dh_public: [u8; 32],
    /// Peer's current DH public key, adopted from incoming headers.
    remote_dh_public: Vec<u8>,
    send_chain_key: Vec<u8>,
    recv_chain_key: Vec<u8>,
    send_count: u32,
    recv_count: u32,
}

impl std::fmt::Debug for RatchetSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RatchetSession")
            .field("send_count", &self.send_count)
            .field("recv_count", &self.recv_count)
            .field("keys", &"[REDACTED]")
            .finish()
    }
}

/// SHA-256 over concatenated parts.
fn hash_parts(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Derives the public half of a DH keypair: a one-way hash of the private
/// bytes.
pub(crate) fn derive_dh_public(dh_private: &[u8]) -> [u8; 32] {
    hash_parts(&[dh_private])
}

/// Epoch shared secret: hash of the rotating party's new public key
/// followed by the other party's current public key. Both values appear on
/// the wire, which is exactly the weakness flagged in the module docs.
fn shared_secret(rotating_pub: &[u8], other_pub: &[u8]) -> [u8; 32] {
    hash_parts(&[rotating_pub, other_pub])
}

/// Advances a chain key and derives a one-time message key: two
/// independent HMAC-SHA256 calls with distinct context labels.
fn kdf_chain(chain_key: &[u8]) -> ([u8; 32], [u8; 32]) {
    let mut chain_mac =
        <HmacSha256 as Mac>::new_from_slice(chain_key).expect("HMAC accepts any key length");
    chain_mac.update(LABEL_CHAIN);
    let new_chain: [u8; 32] = chain_mac.finalize().into_bytes().into();

    let mut msg_mac =
        <HmacSha256 as Mac>::new_from_slice(chain_key).expect("HMAC accepts any key length");
    msg_mac.update(LABEL_MESSAGE);
    let message_key: [u8; 32] = msg_mac.finalize().into_bytes().into();

    (new_chain, message_key)
}

impl RatchetSession {
    /// Constructs a session from handshake output.
    ///
    /// Both chain keys start equal to the root key; counters start at zero.
    pub fn new(root_key: Vec<u8>, dh_private: Vec<u8>, remote_dh_public: Vec<u8>) -> Self {
        let dh_public = derive_dh_public(&dh_private);
        let send_chain_key = root_key.clone();
        let recv_chain_key = root_key.clone();
        Self {
            root_key,
            dh_private,
            dh_public,
            remote_dh_public,
            send_chain_key,
            recv_chain_key,
            send_count: 0,
            recv_count: 0,
        }
    }

    /// Our current DH public key, as carried in outgoing headers.
    pub fn dh_public(&self) -> [u8; 32] {
        self.dh_public
    }

    /// Messages sent in the current epoch.
    pub fn send_count(&self) -> u32 {
        self.send_count
    }

    /// Messages received in the current epoch.
    pub fn recv_count(&self) -> u32 {
        self.recv_count
    }

    /// Send-side ratchet step: fresh DH keypair, fold the shared secret
    /// into the root key, restart the sending chain and counter.
    fn ratchet_send(&mut self) {
        let mut fresh = vec![0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut fresh);
        self.dh_private.zeroize();
        self.dh_private = fresh;
        self.dh_public = derive_dh_public(&self.dh_private);

        let shared = shared_secret(&self.dh_public, &self.remote_dh_public);
        self.fold_root(&shared);
        self.send_chain_key.zeroize();
        self.send_chain_key = self.root_key.clone();
        self.send_count = 0;
    }

    /// Receive-side ratchet step: adopt the sender's rotated public key,
    /// fold the same shared secret, restart the receiving chain.
    fn ratchet_recv(&mut self, sender_pub: &[u8; 32]) {
        self.remote_dh_public.zeroize();
        self.remote_dh_public = sender_pub.to_vec();

        let shared = shared_secret(&self.remote_dh_public, &self.dh_public);
        self.fold_root(&shared);
        self.recv_chain_key.zeroize();
        self.recv_chain_key = self.root_key.clone();
        self.recv_count = 0;
    }

    fn fold_root(&mut self, shared: &[u8; 32]) {
        let folded = hash_parts(&[&self.root_key, shared]);
        self.root_key.zeroize();
        self.root_key = folded.to_vec();
    }

    /// Encrypts one plaintext, advancing the sending chain.
    ///
    /// Ratchets first when the epoch is full. The emitted header carries
    /// the current DH public key and the post-increment message number.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<EncryptedMessage, ChatError> {
        if self.send_count > 0 && self.send_count % RATCHET_INTERVAL == 0 {
            self.ratchet_send();
        }

        let (new_chain, message_key) = kdf_chain(&self.send_chain_key);
        self.send_chain_key.zeroize();
        self.send_chain_key = new_chain.to_vec();

        let mut nonce = [0u8; 12];
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&message_key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| ChatError::Serialization("AEAD seal failed".to_string()))?;

        self.send_count += 1;

        Ok(EncryptedMessage {
            ciphertext,
            nonce,
            header: MessageHeader {
                dh_pub: self.dh_public,
                msg_num: self.send_count,
            },
        })
    }

    /// Decrypts one message, advancing the receiving chain.
    ///
    /// Mirrors [`Self::encrypt`]: ratchets first when the epoch is full,
    /// then checks message-number continuity before touching the chain. An
    /// AEAD tag mismatch is fatal for that message only; a continuity gap
    /// is fatal for the session.
    pub fn decrypt(&mut self, message: &EncryptedMessage) -> Result<Vec<u8>, ChatError> {
        if self.recv_count > 0 && self.recv_count % RATCHET_INTERVAL == 0 {
            self.ratchet_recv(&message.header.dh_pub);
        }

        let expected = self.recv_count + 1;
        if message.header.msg_num != expected {
            return Err(ChatError::Desync {
                expected,
                got: message.header.msg_num,
            });
        }

        let (new_chain, message_key) = kdf_chain(&self.recv_chain_key);
        self.recv_chain_key.zeroize();
        self.recv_chain_key = new_chain.to_vec();

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&message_key));
        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(&message.nonce),
                message.ciphertext.as_slice(),
            )
            .map_err(|_| ChatError::Authentication)?;

        self.recv_count += 1;

        // Track the sender's latest public key so our next send-side
        // ratchet hashes the value the peer actually holds.
        self.remote_dh_public.zeroize();
        self.remote_dh_public = message.header.dh_pub.to_vec();

        Ok(plaintext)
    }

    /// Captures the complete session state.
    pub fn to_snapshot(&self) -> RatchetSnapshot {
        RatchetSnapshot {
            root_key: self.root_key.clone(),
            dh_priv: self.dh_private.clone(),
            dh_pub: self.dh_public,
            dh_pub_remote: self.remote_dh_public.clone(),
            send_chain_key: self.send_chain_key.clone(),
            recv_chain_key: self.recv_chain_key.clone(),
            send_count: self.send_count,
            recv_count: self.recv_count,
        }
    }

    /// Restores a session bit-for-bit from a snapshot.
    pub fn from_snapshot(snapshot: &RatchetSnapshot) -> Self {
        Self {
            root_key: snapshot.root_key.clone(),
            dh_private: snapshot.dh_priv.clone(),
            dh_public: snapshot.dh_pub,
            remote_dh_public: snapshot.dh_pub_remote.clone(),
            send_chain_key: snapshot.send_chain_key.clone(),
            recv_chain_key: snapshot.recv_chain_key.clone(),
            send_count: snapshot.send_count,
            recv_count: snapshot.recv_count,
        }
    }
}
