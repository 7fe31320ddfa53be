//! Length-prefixed framing codec.
//!
//! Frame layout: 4-byte big-endian header length, UTF-8 JSON header, then
//! an optional binary tail whose presence and length the header declares
//! in its top-level `has_binary` / `binary_length` / `binary_type` fields.
//! Generic over `AsyncRead`/`AsyncWrite`: the codec knows nothing about
//! sockets.

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::chat::config::{MAX_BINARY_LEN, MAX_HEADER_LEN};
use crate::chat::error::ChatError;
use crate::chat::protocol::Envelope;

/// Encodes an envelope into one complete frame.
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, ChatError> {
    let mut header = serde_json::to_value(&envelope.message)?;
    let Some(map) = header.as_object_mut() else {
        return Err(ChatError::Serialization(
            "message did not serialize to a JSON object".to_string(),
        ));
    };

    match &envelope.binary {
        Some((bytes, binary_type)) => {
            map.insert("has_binary".to_string(), Value::Bool(true));
            map.insert("binary_length".to_string(), Value::from(bytes.len()));
            map.insert(
                "binary_type".to_string(),
                Value::String(binary_type.clone()),
            );
        }
        None => {
            map.insert("has_binary".to_string(), Value::Bool(false));
        }
    }

    let header_bytes = serde_json::to_vec(&header)?;
    if header_bytes.len() > MAX_HEADER_LEN {
        return Err(ChatError::Serialization(format!(
            "header too large: {} bytes",
            header_bytes.len()
        )));
    }

    let binary_len = envelope.binary.as_ref().map_or(0, |(b, _)| b.len());
    let mut frame = Vec::with_capacity(4 + header_bytes.len() + binary_len);
    frame.extend_from_slice(&(header_bytes.len() as u32).to_be_bytes());
    frame.extend_from_slice(&header_bytes);
    if let Some((bytes, _)) = &envelope.binary {
        frame.extend_from_slice(bytes);
    }

    Ok(frame)
}

/// Writes one envelope as a single frame.
pub async fn write_envelope<W>(writer: &mut W, envelope: &Envelope) -> Result<(), ChatError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode(envelope)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Maps a short read to a transport error; no partial envelope escapes.
fn eof_as_transport(e: std::io::Error) -> ChatError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        ChatError::Transport("connection closed mid-frame".to_string())
    } else {
        ChatError::Io(e)
    }
}

/// Reads exactly one envelope from the stream.
///
/// Reads exactly 4 bytes, exactly the declared header length, and, iff the
/// header says so, exactly the declared binary length. Declared lengths
/// over the configured caps are rejected before any allocation.
pub async fn read_envelope<R>(reader: &mut R) -> Result<Envelope, ChatError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader
        .read_exact(&mut len_buf)
        .await
        .map_err(eof_as_transport)?;
    let header_len = u32::from_be_bytes(len_buf) as usize;
    if header_len == 0 || header_len > MAX_HEADER_LEN {
        return Err(ChatError::Transport(format!(
            "unacceptable header length: {header_len}"
        )));
    }

    let mut header_bytes = vec![0u8; header_len];
    reader
        .read_exact(&mut header_bytes)
        .await
        .map_err(eof_as_transport)?;

    let mut header: Value = serde_json::from_slice(&header_bytes)?;
    let Some(map) = header.as_object_mut() else {
        return Err(ChatError::Serialization(
            "frame header is not a JSON object".to_string(),
        ));
    };

    let has_binary = map
        .remove("has_binary")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let binary_length = map.remove("binary_length");
    let binary_type = map.remove("binary_type");

    let binary = if has_binary {
        let length = binary_length
            .and_then(|v| v.as_u64())
            .ok_or_else(|| ChatError::Transport("missing binary_length".to_string()))?
            as usize;
        if length > MAX_BINARY_LEN {
            return Err(ChatError::Transport(format!(
                "unacceptable binary length: {length}"
            )));
        }
        let kind = binary_type
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();

        let mut bytes = vec![0u8; length];
        reader
            .read_exact(&mut bytes)
            .await
            .map_err(eof_as_transport)?;
        Some((bytes, kind))
    } else {
        None
    };

    let message = serde_json::from_value(header)?;
    Ok(Envelope { message, binary })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::protocol::Message;
    use crate::chat::ratchet::{EncryptedMessage, MessageHeader};
    use std::io::Cursor;

    fn text_message() -> Message {
        Message::TextMessage {
            sender_id: "alice".to_string(),
            dr_message: EncryptedMessage {
                ciphertext: vec![0xDE, 0xAD],
                nonce: [3; 12],
                header: MessageHeader {
                    dh_pub: [5; 32],
                    msg_num: 1,
                },
            },
            timestamp: 1724380000.0,
        }
    }

    fn latent_message(size: u64) -> Message {
        Message::LatentMessage {
            sender_id: "bob".to_string(),
            enc_latent_size: size,
            enc_seed_string: "c2VhbGVk".to_string(),
            seed_string: None,
            timestamp: 1724380001.0,
        }
    }

    #[tokio::test]
    async fn test_roundtrip_without_binary() {
        let envelope = Envelope::new(text_message());
        let frame = encode(&envelope).unwrap();

        let mut cursor = Cursor::new(frame);
        let decoded = read_envelope(&mut cursor).await.unwrap();
        assert_eq!(decoded, envelope);
    }

    #[tokio::test]
    async fn test_roundtrip_with_binary() {
        let payload = vec![7u8; 4096];
        let envelope = Envelope::with_binary(latent_message(4096), payload.clone(), "pt");
        let frame = encode(&envelope).unwrap();

        let mut cursor = Cursor::new(frame);
        let decoded = read_envelope(&mut cursor).await.unwrap();
        assert_eq!(decoded.binary, Some((payload, "pt".to_string())));
        assert_eq!(decoded.message, envelope.message);
    }

    #[tokio::test]
    async fn test_roundtrip_with_zero_length_binary() {
        let envelope = Envelope::with_binary(latent_message(0), vec![], "pt");
        let frame = encode(&envelope).unwrap();

        let mut cursor = Cursor::new(frame);
        let decoded = read_envelope(&mut cursor).await.unwrap();
        assert_eq!(decoded.binary, Some((vec![], "pt".to_string())));
    }

    #[test]
    fn test_header_declares_binary_fields() {
        let envelope = Envelope::with_binary(latent_message(3), vec![1, 2, 3], "pt");
        let frame = encode(&envelope).unwrap();

        let header_len = u32::from_be_bytes(frame[..4].try_into().unwrap()) as usize;
        let header: Value = serde_json::from_slice(&frame[4..4 + header_len]).unwrap();
        assert_eq!(header["has_binary"], true);
        assert_eq!(header["binary_length"], 3);
        assert_eq!(header["binary_type"], "pt");
        assert_eq!(header["type"], "latent_message");

        // The binary tail follows the header exactly
        assert_eq!(&frame[4 + header_len..], &[1, 2, 3]);
    }

    #[test]
    fn test_header_without_binary() {
        let envelope = Envelope::new(text_message());
        let frame = encode(&envelope).unwrap();

        let header_len = u32::from_be_bytes(frame[..4].try_into().unwrap()) as usize;
        let header: Value = serde_json::from_slice(&frame[4..4 + header_len]).unwrap();
        assert_eq!(header["has_binary"], false);
        assert!(header.get("binary_length").is_none());
        assert_eq!(frame.len(), 4 + header_len);
    }

    #[tokio::test]
    async fn test_truncated_header_is_transport_error() {
        let envelope = Envelope::new(text_message());
        let mut frame = encode(&envelope).unwrap();
        frame.truncate(frame.len() / 2);

        let mut cursor = Cursor::new(frame);
        let err = read_envelope(&mut cursor).await.unwrap_err();
        assert!(matches!(err, ChatError::Transport(_)));
    }

    #[tokio::test]
    async fn test_truncated_binary_is_transport_error() {
        let envelope = Envelope::with_binary(latent_message(100), vec![9u8; 100], "pt");
        let mut frame = encode(&envelope).unwrap();
        frame.truncate(frame.len() - 40);

        let mut cursor = Cursor::new(frame);
        let err = read_envelope(&mut cursor).await.unwrap_err();
        assert!(matches!(err, ChatError::Transport(_)));
    }

    #[tokio::test]
    async fn test_absurd_header_length_rejected() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&u32::MAX.to_be_bytes());
        frame.extend_from_slice(b"junk");

        let mut cursor = Cursor::new(frame);
        let err = read_envelope(&mut cursor).await.unwrap_err();
        assert!(matches!(err, ChatError::Transport(_)));
    }

    #[tokio::test]
    async fn test_absurd_binary_length_rejected() {
        // Hand-build a header declaring a binary tail over the cap
        let mut header = serde_json::to_value(latent_message(0)).unwrap();
        let map = header.as_object_mut().unwrap();
        map.insert("has_binary".to_string(), Value::Bool(true));
        map.insert(
            "binary_length".to_string(),
            Value::from(MAX_BINARY_LEN as u64 + 1),
        );
        map.insert("binary_type".to_string(), Value::String("pt".to_string()));
        let header_bytes = serde_json::to_vec(&header).unwrap();

        let mut frame = Vec::new();
        frame.extend_from_slice(&(header_bytes.len() as u32).to_be_bytes());
        frame.extend_from_slice(&header_bytes);

        let mut cursor = Cursor::new(frame);
        let err = read_envelope(&mut cursor).await.unwrap_err();
        assert!(matches!(err, ChatError::Transport(_)));
    }
}
