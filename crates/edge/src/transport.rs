//! Forward transport towards the fog node.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::{debug, info};

use crate::frame::ForwardEnvelope;
use crate::resolve::resolve;

/// Errors that can occur while forwarding an envelope.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Target address did not resolve
    #[error("Fog node address {0} did not resolve")]
    Unresolved(String),

    /// Envelope could not be encoded
    #[error("Envelope encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// Fog node refused the datagram
    #[error("Fog node {0} refused the connection")]
    Refused(SocketAddr),

    /// Datagram was only partially sent
    #[error("Short send: {sent} of {expected} bytes")]
    ShortSend {
        /// Bytes handed to the kernel
        sent: usize,
        /// Envelope length
        expected: usize,
    },

    /// Network I/O errors
    #[error("Network I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Delivery of forward envelopes to the fog node.
///
/// Delivery is best effort: implementations make one attempt and report the
/// failure; the dispatcher never retries.
#[async_trait]
pub trait FogTransport: Send + Sync {
    /// Send one envelope.
    async fn forward(&self, envelope: &ForwardEnvelope) -> Result<(), TransportError>;
}

/// Sends each envelope as one JSON datagram.
///
/// The socket is connected to the target so that ICMP port-unreachable
/// replies surface as [`TransportError::Refused`] on later sends.
#[derive(Debug)]
pub struct UdpFogTransport {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpFogTransport {
    /// Resolve `target`, preferring IPv4, and connect an ephemeral socket
    /// to it.
    pub async fn connect(target: &str) -> Result<Self, TransportError> {
        let target = resolve(target)
            .await?
            .ok_or_else(|| TransportError::Unresolved(target.to_string()))?;
        let local: SocketAddr = if target.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let socket = UdpSocket::bind(local).await?;
        socket.connect(target).await?;
        info!(fog_node = %target, local = %socket.local_addr()?, "Fog transport ready");

        Ok(Self { socket, target })
    }

    /// Resolved fog node address.
    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

#[async_trait]
impl FogTransport for UdpFogTransport {
    async fn forward(&self, envelope: &ForwardEnvelope) -> Result<(), TransportError> {
        let bytes = envelope.to_json()?;
        let sent = self.socket.send(&bytes).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::ConnectionRefused => TransportError::Refused(self.target),
            _ => TransportError::Io(e),
        })?;
        if sent != bytes.len() {
            return Err(TransportError::ShortSend {
                sent,
                expected: bytes.len(),
            });
        }
        debug!(fog_node = %self.target, bytes = sent, "Envelope forwarded");
        Ok(())
    }
}
