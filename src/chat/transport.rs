//! TCP transport: one-shot sender and accept-loop receiver.
//!
//! Every envelope rides its own connection: connect, write one frame, read
//! the fixed acknowledgement, close. The receiver accepts sequentially and
//! forwards complete envelopes on an mpsc channel; the channel's single
//! consumer is what serializes dispatch per node.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use crate::chat::config::{Config, ACK};
use crate::chat::error::ChatError;
use crate::chat::protocol::Envelope;
use crate::chat::wire;

/// Sends one envelope to `addr` and waits for the acknowledgement.
///
/// The whole connect-write-ack cycle is bounded by `send_timeout`. Safe to
/// retry on failure: the envelope is already encrypted and its nonce fixed.
pub async fn send_envelope(
    addr: &str,
    envelope: &Envelope,
    send_timeout: Duration,
) -> Result<(), ChatError> {
    timeout(send_timeout, send_inner(addr, envelope))
        .await
        .map_err(|_| ChatError::Transport(format!("send to {addr} timed out")))?
}

async fn send_inner(addr: &str, envelope: &Envelope) -> Result<(), ChatError> {
    let mut stream = TcpStream::connect(addr).await?;
    wire::write_envelope(&mut stream, envelope).await?;

    let mut ack = [0u8; 2];
    stream
        .read_exact(&mut ack)
        .await
        .map_err(|_| ChatError::Transport(format!("no acknowledgement from {addr}")))?;
    if &ack[..] != ACK {
        return Err(ChatError::Transport(format!(
            "unexpected acknowledgement from {addr}"
        )));
    }

    debug!(%addr, kind = envelope.message.kind(), "envelope delivered");
    Ok(())
}

/// Inbound side: a bound listener whose accept loop feeds a channel.
pub struct Receiver {
    listener: TcpListener,
    read_timeout: Duration,
}

impl Receiver {
    /// Binds to the configured address.
    pub async fn bind(config: &Config) -> Result<Self, ChatError> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        Ok(Self {
            listener,
            read_timeout: config.read_timeout,
        })
    }

    /// The actual bound address, needed when binding to port 0.
    pub fn local_addr(&self) -> Result<SocketAddr, ChatError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept loop: one connection at a time, one envelope per connection.
    ///
    /// A connection that stalls past the read timeout or sends a malformed
    /// frame is dropped without acknowledgement; the loop moves on to the
    /// next connection. Returns when the channel's consumer goes away.
    pub async fn run(self, inbound: mpsc::Sender<Envelope>) {
        loop {
            let (stream, remote) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    continue;
                }
            };
            debug!(%remote, "inbound connection");

            match self.handle_connection(stream).await {
                Ok(envelope) => {
                    if inbound.send(envelope).await.is_err() {
                        debug!("inbound channel closed, stopping receiver");
                        return;
                    }
                }
                Err(e) => {
                    warn!(%remote, error = %e, "dropping inbound connection");
                }
            }
        }
    }

    async fn handle_connection(&self, mut stream: TcpStream) -> Result<Envelope, ChatError> {
        let envelope = timeout(self.read_timeout, wire::read_envelope(&mut stream))
            .await
            .map_err(|_| ChatError::Transport("inbound read timed out".to_string()))??;

        stream.write_all(ACK).await?;
        stream.flush().await?;
        Ok(envelope)
    }
}
