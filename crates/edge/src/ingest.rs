//! Datagram ingest loop.
//!
//! Listens on the camera-facing UDP socket, drops datagrams from unapproved
//! sources and hands each approved frame, together with a snapshot of the
//! tracked entities, to a fresh dispatch task. The loop never waits for a
//! dispatch task. A failed receive is fatal: the loop returns and the caller
//! is expected to release the socket and exit.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::{debug, error, info, warn};

use crate::allow_list::SourceAllowList;
use crate::dispatcher::FrameDispatcher;
use crate::frame::{RawFrame, MAX_FRAME_SIZE};
use crate::resolve::resolve;
use crate::tracked::TrackedEntityStore;

/// Errors that stop the ingest loop.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Ingest address could not be bound
    #[error("Failed to bind ingest socket on {addr}: {source}")]
    Bind {
        /// Requested address
        addr: String,
        /// Underlying error
        source: std::io::Error,
    },

    /// Receiving from the socket failed
    #[error("Ingest receive failed: {0}")]
    Receive(#[source] std::io::Error),
}

/// Owner of the ingest socket.
#[derive(Debug)]
pub struct IngestLoop {
    socket: UdpSocket,
    allow_list: Arc<SourceAllowList>,
    store: Arc<TrackedEntityStore>,
    dispatcher: Arc<FrameDispatcher>,
}

impl IngestLoop {
    /// Bind the ingest socket. Host names resolve to an IPv4 address when
    /// one exists.
    pub async fn bind(
        addr: &str,
        allow_list: Arc<SourceAllowList>,
        store: Arc<TrackedEntityStore>,
        dispatcher: Arc<FrameDispatcher>,
    ) -> Result<Self, IngestError> {
        let bind_error = |source: io::Error| IngestError::Bind {
            addr: addr.to_string(),
            source,
        };
        let local = resolve(addr).await.map_err(bind_error)?.ok_or_else(|| {
            bind_error(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                "address did not resolve",
            ))
        })?;
        let socket = UdpSocket::bind(local).await.map_err(bind_error)?;
        Ok(Self::from_socket(socket, allow_list, store, dispatcher))
    }

    /// Wrap an already bound socket.
    pub fn from_socket(
        socket: UdpSocket,
        allow_list: Arc<SourceAllowList>,
        store: Arc<TrackedEntityStore>,
        dispatcher: Arc<FrameDispatcher>,
    ) -> Self {
        Self {
            socket,
            allow_list,
            store,
            dispatcher,
        }
    }

    /// Address the socket is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receive until the socket fails.
    ///
    /// Only returns on a receive error, which callers treat as fatal. The
    /// socket is dropped with `self`.
    pub async fn run(self) -> Result<(), IngestError> {
        info!(addr = ?self.socket.local_addr().ok(), "Ingest loop listening");
        // One spare byte tells a full-size frame from a truncated one.
        let mut buf = vec![0u8; MAX_FRAME_SIZE + 1];

        loop {
            let (len, source) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    error!(error = %e, "Error with new request, stopping ingest");
                    return Err(IngestError::Receive(e));
                }
            };
            if len > MAX_FRAME_SIZE {
                warn!(%source, max = MAX_FRAME_SIZE, "Oversized datagram dropped");
                continue;
            }
            self.on_datagram(&buf[..len], source);
        }
    }

    /// Handle one received datagram. Returns `true` when a dispatch task was
    /// started for it.
    pub fn on_datagram(&self, payload: &[u8], source: SocketAddr) -> bool {
        if !self.allow_list.is_approved(&source) {
            warn!(%source, "Unapproved source tried to connect");
            return false;
        }

        debug!(
            %source,
            len = payload.len(),
            preview = %String::from_utf8_lossy(&payload[..payload.len().min(64)]),
            "Trying to send new message (might get filtered out)"
        );
        let frame = RawFrame::new(payload.to_vec(), source);
        self.dispatcher.spawn(frame, self.store.snapshot()).is_some()
    }
}
