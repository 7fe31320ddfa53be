//! Friend handshake: session bootstrap over `request_friend` /
//! `response_friend`.
//!
//! The requester sends its identity and a fresh ratchet public key. The
//! responder mints a random root key, wraps it under the requester's RSA
//! public key, and replies with its own ratchet public key. Both sides end
//! up with synchronized [`RatchetSession`]s; the root key never crosses the
//! wire in the clear.
//!
//! Trust-on-first-use: neither message is signed, so the exchange
//! authenticates nothing beyond possession of the private key matching the
//! advertised public key. Verifying that key out of band is the embedding
//! application's job.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use rsa::RsaPublicKey;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::chat::config::ROOT_KEY_LEN;
use crate::chat::error::ChatError;
use crate::chat::protocol::{Envelope, Message};
use crate::chat::ratchet::{derive_dh_public, RatchetSession};
use crate::crypto::{asymmetric, keys, Identity};

/// What a node knows about a friend after a completed handshake.
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub user_id: String,
    /// Address the peer advertised for inbound envelopes.
    pub ip: String,
    pub port: u16,
    /// Peer's long-term RSA public key, used to wrap attachment seeds.
    pub public_key: RsaPublicKey,
    /// Opaque base64 profile image, if the peer sent one.
    pub profile_base64: Option<String>,
}

impl PeerInfo {
    /// `ip:port` dial string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

/// Requester-side state held between sending `request_friend` and
/// receiving `response_friend`.
///
/// Holds the private half of the ratchet keypair whose public half went
/// out in the request. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct PendingHandshake {
    dh_private: Vec<u8>,
}

/// Local identity fields advertised in handshake messages.
#[derive(Debug, Clone)]
pub struct LocalEndpoint {
    pub ip: String,
    pub port: u16,
    pub profile_base64: Option<String>,
}

fn fresh_dh_private() -> Vec<u8> {
    let mut bytes = vec![0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Builds a `request_friend` envelope and the pending state needed to
/// complete the handshake when the response arrives.
pub fn begin_request(
    identity: &Identity,
    local: &LocalEndpoint,
) -> Result<(Envelope, PendingHandshake), ChatError> {
    let dh_private = fresh_dh_private();
    let dh_public = derive_dh_public(&dh_private);

    let message = Message::RequestFriend {
        ip: local.ip.clone(),
        port: local.port,
        user_id: identity.user_id.clone(),
        public_key: identity.public_pem()?,
        profile_base64: local.profile_base64.clone(),
        dh_public,
    };

    Ok((Envelope::new(message), PendingHandshake { dh_private }))
}

/// Responder side: accepts a `request_friend`, mints and wraps a root key,
/// and returns the `response_friend` envelope together with the ready
/// session and the new friend's info.
pub fn handle_request(
    identity: &Identity,
    local: &LocalEndpoint,
    request: &Message,
) -> Result<(Envelope, RatchetSession, PeerInfo), ChatError> {
    let Message::RequestFriend {
        ip,
        port,
        user_id,
        public_key,
        profile_base64,
        dh_public: requester_dh_public,
    } = request
    else {
        return Err(ChatError::Handshake(format!(
            "expected request_friend, got {}",
            request.kind()
        )));
    };

    let requester_key = keys::public_key_from_pem(public_key)?;

    let mut root_key = vec![0u8; ROOT_KEY_LEN];
    rand::rngs::OsRng.fill_bytes(&mut root_key);
    let wrapped_root = asymmetric::encrypt(&root_key, &requester_key)?;

    let dh_private = fresh_dh_private();
    let dh_public = derive_dh_public(&dh_private);
    let session = RatchetSession::new(root_key, dh_private, requester_dh_public.to_vec());

    let response = Message::ResponseFriend {
        ip: local.ip.clone(),
        port: local.port,
        user_id: identity.user_id.clone(),
        public_key: identity.public_pem()?,
        profile_base64: local.profile_base64.clone(),
        dh_public,
        root_key: BASE64.encode(wrapped_root),
    };

    let peer = PeerInfo {
        user_id: user_id.clone(),
        ip: ip.clone(),
        port: *port,
        public_key: requester_key,
        profile_base64: profile_base64.clone(),
    };

    Ok((Envelope::new(response), session, peer))
}

/// Requester side: unwraps the root key from a `response_friend` and
/// builds the session.
///
/// Consumes the pending state either way: an unwrap failure aborts the
/// handshake with no session and no retry.
pub fn complete(
    pending: PendingHandshake,
    identity: &Identity,
    response: &Message,
) -> Result<(RatchetSession, PeerInfo), ChatError> {
    let Message::ResponseFriend {
        ip,
        port,
        user_id,
        public_key,
        profile_base64,
        dh_public: responder_dh_public,
        root_key,
    } = response
    else {
        return Err(ChatError::Handshake(format!(
            "expected response_friend, got {}",
            response.kind()
        )));
    };

    let responder_key = keys::public_key_from_pem(public_key)?;

    let wrapped = BASE64
        .decode(root_key)
        .map_err(|e| ChatError::Handshake(format!("root key is not valid base64: {e}")))?;
    let root_key = asymmetric::decrypt(&wrapped, &identity.private)
        .map_err(|_| ChatError::Handshake("root key unwrap failed".to_string()))?;

    let session = RatchetSession::new(
        root_key,
        pending.dh_private.clone(),
        responder_dh_public.to_vec(),
    );

    let peer = PeerInfo {
        user_id: user_id.clone(),
        ip: ip.clone(),
        port: *port,
        public_key: responder_key,
        profile_base64: profile_base64.clone(),
    };

    Ok((session, peer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::test_identity;

    fn endpoint(port: u16) -> LocalEndpoint {
        LocalEndpoint {
            ip: "127.0.0.1".to_string(),
            port,
            profile_base64: None,
        }
    }

    /// Runs the full handshake between two identities and returns
    /// (requester session, responder session).
    fn run_handshake(
        alice: &crate::crypto::Identity,
        bob: &crate::crypto::Identity,
    ) -> (RatchetSession, RatchetSession) {
        let (request, pending) = begin_request(alice, &endpoint(5000)).unwrap();
        let (response, bob_session, peer_at_bob) =
            handle_request(bob, &endpoint(5001), &request.message).unwrap();
        assert_eq!(peer_at_bob.user_id, "alice");

        let (alice_session, peer_at_alice) =
            complete(pending, alice, &response.message).unwrap();
        assert_eq!(peer_at_alice.user_id, "bob");
        assert_eq!(peer_at_alice.addr(), "127.0.0.1:5001");

        (alice_session, bob_session)
    }

    #[test]
    fn test_handshake_yields_interoperable_sessions() {
        let alice = test_identity("alice");
        let bob = test_identity("bob");

        let (mut alice_session, mut bob_session) = run_handshake(&alice, &bob);

        let msg = alice_session.encrypt(b"hi bob").unwrap();
        assert_eq!(bob_session.decrypt(&msg).unwrap(), b"hi bob");

        let reply = bob_session.encrypt(b"hi alice").unwrap();
        assert_eq!(alice_session.decrypt(&reply).unwrap(), b"hi alice");
    }

    #[test]
    fn test_sessions_survive_a_ratchet_boundary() {
        let alice = test_identity("alice");
        let bob = test_identity("bob");

        let (mut alice_session, mut bob_session) = run_handshake(&alice, &bob);

        for i in 0..25 {
            let text = format!("msg {}", i);
            let msg = alice_session.encrypt(text.as_bytes()).unwrap();
            assert_eq!(bob_session.decrypt(&msg).unwrap(), text.as_bytes());
        }
    }

    #[test]
    fn test_root_key_is_not_readable_from_the_wire() {
        let alice = test_identity("alice");
        let bob = test_identity("bob");

        let (request, _pending) = begin_request(&alice, &endpoint(5000)).unwrap();
        let (response, _, _) = handle_request(&bob, &endpoint(5001), &request.message).unwrap();

        // The wrapped root key is RSA-sized ciphertext, not 16 raw bytes
        let Message::ResponseFriend { root_key, .. } = &response.message else {
            panic!("wrong response variant");
        };
        let wrapped = BASE64.decode(root_key).unwrap();
        assert_eq!(wrapped.len(), 256);
    }

    #[test]
    fn test_complete_with_wrong_private_key_fails() {
        let alice = test_identity("alice");
        let bob = test_identity("bob");
        let mallory = test_identity("mallory");

        let (request, pending) = begin_request(&alice, &endpoint(5000)).unwrap();
        let (response, _, _) = handle_request(&bob, &endpoint(5001), &request.message).unwrap();

        // Mallory intercepts the response but cannot unwrap the root key
        let err = complete(pending, &mallory, &response.message).unwrap_err();
        assert!(matches!(err, ChatError::Handshake(_)));
    }

    #[test]
    fn test_wrong_message_variant_is_rejected() {
        let alice = test_identity("alice");
        let bob = test_identity("bob");

        let (request, pending) = begin_request(&alice, &endpoint(5000)).unwrap();

        // Feeding the request back as if it were a response
        let err = complete(pending, &alice, &request.message).unwrap_err();
        assert!(matches!(err, ChatError::Handshake(_)));

        let other = Message::TextMessage {
            sender_id: "x".to_string(),
            dr_message: crate::chat::ratchet::EncryptedMessage {
                ciphertext: vec![],
                nonce: [0; 12],
                header: crate::chat::ratchet::MessageHeader {
                    dh_pub: [0; 32],
                    msg_num: 1,
                },
            },
            timestamp: 0.0,
        };
        assert!(handle_request(&bob, &endpoint(5001), &other).is_err());
    }

    #[test]
    fn test_profile_is_carried_through() {
        let alice = test_identity("alice");
        let bob = test_identity("bob");

        let local = LocalEndpoint {
            ip: "127.0.0.1".to_string(),
            port: 5000,
            profile_base64: Some("cGZw".to_string()),
        };
        let (request, _) = begin_request(&alice, &local).unwrap();
        let (_, _, peer) = handle_request(&bob, &endpoint(5001), &request.message).unwrap();

        assert_eq!(peer.profile_base64.as_deref(), Some("cGZw"));
    }
}
