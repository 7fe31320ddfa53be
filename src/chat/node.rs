//! Process-wide messaging context.
//!
//! One [`Node`] per process: it owns the identity, the per-friend sessions,
//! and the in-flight handshakes, and is handed around explicitly rather
//! than reached through globals. Inbound envelopes are expected to arrive
//! from a single consumer of the receiver channel, which serializes
//! dispatch; sessions are additionally guarded by their own lock so the
//! embedding application may send from other tasks concurrently.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::chat::attachment;
use crate::chat::config::Config;
use crate::chat::error::ChatError;
use crate::chat::handshake::{self, LocalEndpoint, PeerInfo, PendingHandshake};
use crate::chat::protocol::{Envelope, Message};
use crate::chat::ratchet::RatchetSession;
use crate::chat::transport;
use crate::crypto::latent::Latent;
use crate::crypto::Identity;

/// Something that happened to the node, surfaced to the embedding
/// application.
#[derive(Debug)]
pub enum Event {
    /// A handshake completed in either role.
    FriendAdded { peer: PeerInfo },
    /// A decrypted text message.
    Text {
        sender_id: String,
        text: String,
        timestamp: f64,
    },
    /// A decrypted latent attachment.
    Latent {
        sender_id: String,
        latent: Latent,
        timestamp: f64,
    },
}

struct Peer {
    info: PeerInfo,
    session: Mutex<RatchetSession>,
}

/// The messaging core: identity, friends, sessions, in-flight handshakes.
pub struct Node {
    identity: Identity,
    local: LocalEndpoint,
    config: Config,
    peers: RwLock<HashMap<String, Peer>>,
    /// Outstanding friend requests, keyed by the address they were sent to.
    pending: Mutex<HashMap<String, PendingHandshake>>,
}

/// Seconds since the Unix epoch on the local clock.
fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

impl Node {
    /// Creates a node advertising `local` as its inbound address.
    ///
    /// The caller binds the [`transport::Receiver`] itself (the advertised
    /// port is only known after binding when using port 0) and feeds the
    /// resulting channel into [`Node::handle_envelope`].
    pub fn new(identity: Identity, local: LocalEndpoint, config: Config) -> Self {
        Self {
            identity,
            local,
            config,
            peers: RwLock::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn local(&self) -> &LocalEndpoint {
        &self.local
    }

    /// Info for one friend, if known.
    pub async fn peer_info(&self, peer_id: &str) -> Option<PeerInfo> {
        self.peers.read().await.get(peer_id).map(|p| p.info.clone())
    }

    /// User IDs of all known friends.
    pub async fn peer_ids(&self) -> Vec<String> {
        self.peers.read().await.keys().cloned().collect()
    }

    async fn add_peer(&self, info: PeerInfo, session: RatchetSession) {
        info!(peer = %info.user_id, addr = %info.addr(), "friend added");
        self.peers.write().await.insert(
            info.user_id.clone(),
            Peer {
                info,
                session: Mutex::new(session),
            },
        );
    }

    /// Sends a friend request to `ip:port` and remembers the pending
    /// handshake until the response arrives.
    pub async fn request_friend(&self, ip: &str, port: u16) -> Result<(), ChatError> {
        let (envelope, pending) = handshake::begin_request(&self.identity, &self.local)?;
        let addr = format!("{ip}:{port}");
        self.pending.lock().await.insert(addr.clone(), pending);

        transport::send_envelope(&addr, &envelope, self.config.send_timeout).await
    }

    /// Dispatches one inbound envelope.
    ///
    /// Must be driven by a single consumer per node: in-order delivery per
    /// sender is what the ratchet requires.
    pub async fn handle_envelope(&self, envelope: Envelope) -> Result<Event, ChatError> {
        debug!(kind = envelope.message.kind(), "dispatching envelope");

        match &envelope.message {
            Message::RequestFriend { .. } => {
                let (response, session, peer) =
                    handshake::handle_request(&self.identity, &self.local, &envelope.message)?;
                let addr = peer.addr();
                self.add_peer(peer.clone(), session).await;

                transport::send_envelope(&addr, &response, self.config.send_timeout).await?;
                Ok(Event::FriendAdded { peer })
            }

            Message::ResponseFriend { ip, port, .. } => {
                let addr = format!("{ip}:{port}");
                let pending = self
                    .pending
                    .lock()
                    .await
                    .remove(&addr)
                    .ok_or_else(|| {
                        ChatError::Handshake(format!("no pending handshake for {addr}"))
                    })?;

                let (session, peer) =
                    handshake::complete(pending, &self.identity, &envelope.message)?;
                self.add_peer(peer.clone(), session).await;
                Ok(Event::FriendAdded { peer })
            }

            Message::TextMessage {
                sender_id,
                dr_message,
                timestamp,
            } => {
                let peers = self.peers.read().await;
                let peer = peers
                    .get(sender_id)
                    .ok_or_else(|| ChatError::UnknownPeer(sender_id.clone()))?;

                let plaintext = peer.session.lock().await.decrypt(dr_message)?;
                let text = String::from_utf8(plaintext).map_err(|_| {
                    ChatError::Serialization("text message is not UTF-8".to_string())
                })?;

                Ok(Event::Text {
                    sender_id: sender_id.clone(),
                    text,
                    timestamp: *timestamp,
                })
            }

            Message::LatentMessage {
                sender_id,
                enc_seed_string,
                timestamp,
                ..
            } => {
                {
                    let peers = self.peers.read().await;
                    if !peers.contains_key(sender_id) {
                        return Err(ChatError::UnknownPeer(sender_id.clone()));
                    }
                }

                let Some((cipher_bytes, _)) = &envelope.binary else {
                    return Err(ChatError::Transport(
                        "latent message without binary tail".to_string(),
                    ));
                };
                let wrapped_seed = BASE64.decode(enc_seed_string).map_err(|e| {
                    ChatError::Serialization(format!("enc_seed_string is not base64: {e}"))
                })?;

                let latent =
                    attachment::open_latent(cipher_bytes, &wrapped_seed, &self.identity.private)?;

                Ok(Event::Latent {
                    sender_id: sender_id.clone(),
                    latent,
                    timestamp: *timestamp,
                })
            }
        }
    }

    /// Encrypts `text` for `peer_id` and returns the ready envelope.
    async fn encrypt_text(&self, peer_id: &str, text: &str) -> Result<Envelope, ChatError> {
        let peers = self.peers.read().await;
        let peer = peers
            .get(peer_id)
            .ok_or_else(|| ChatError::UnknownPeer(peer_id.to_string()))?;

        let dr_message = peer.session.lock().await.encrypt(text.as_bytes())?;

        Ok(Envelope::new(Message::TextMessage {
            sender_id: self.identity.user_id.clone(),
            dr_message,
            timestamp: unix_timestamp(),
        }))
    }

    /// Seals `tensor` for `peer_id` and returns the ready envelope.
    async fn seal_attachment(&self, peer_id: &str, tensor: &Latent) -> Result<Envelope, ChatError> {
        let peers = self.peers.read().await;
        let peer = peers
            .get(peer_id)
            .ok_or_else(|| ChatError::UnknownPeer(peer_id.to_string()))?;

        let sealed = attachment::seal_latent(tensor, &peer.info.public_key)?;

        let message = Message::LatentMessage {
            sender_id: self.identity.user_id.clone(),
            enc_latent_size: sealed.cipher_bytes.len() as u64,
            enc_seed_string: BASE64.encode(&sealed.wrapped_seed),
            seed_string: None,
            timestamp: unix_timestamp(),
        };
        Ok(Envelope::with_binary(message, sealed.cipher_bytes, "pt"))
    }

    /// Encrypts and delivers a text message to a friend.
    pub async fn send_text(&self, peer_id: &str, text: &str) -> Result<(), ChatError> {
        let envelope = self.encrypt_text(peer_id, text).await?;
        let addr = self.peer_addr(peer_id).await?;
        transport::send_envelope(&addr, &envelope, self.config.send_timeout).await
    }

    /// Seals and delivers a latent attachment to a friend.
    pub async fn send_latent(&self, peer_id: &str, tensor: &Latent) -> Result<(), ChatError> {
        let envelope = self.seal_attachment(peer_id, tensor).await?;
        let addr = self.peer_addr(peer_id).await?;
        transport::send_envelope(&addr, &envelope, self.config.send_timeout).await
    }

    async fn peer_addr(&self, peer_id: &str) -> Result<String, ChatError> {
        self.peers
            .read()
            .await
            .get(peer_id)
            .map(|p| p.info.addr())
            .ok_or_else(|| ChatError::UnknownPeer(peer_id.to_string()))
    }
}
