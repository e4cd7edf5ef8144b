//! Frames received from sensors and the envelope forwarded to the fog node.

use std::net::SocketAddr;

use clienthog_core::current_timestamp_ms;
use serde::{Deserialize, Serialize};

use crate::identity::DeviceId;

/// Largest datagram accepted on the ingest channel.
pub const MAX_FRAME_SIZE: usize = 1500;

/// One datagram received from an approved source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    payload: Vec<u8>,
    source: SocketAddr,
    received_at_ms: u64,
}

impl RawFrame {
    /// Wrap a received payload, stamping the receive time.
    pub fn new(payload: Vec<u8>, source: SocketAddr) -> Self {
        Self {
            payload,
            source,
            received_at_ms: current_timestamp_ms(),
        }
    }

    /// Raw payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Originating address.
    pub fn source(&self) -> SocketAddr {
        self.source
    }

    /// Receive time in unix milliseconds.
    pub fn received_at_ms(&self) -> u64 {
        self.received_at_ms
    }

    /// Give up the payload bytes.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

/// Message sent to the fog node for every forwarded frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardEnvelope {
    /// Identity of this edge node
    pub device_id: DeviceId,
    /// Entity name extracted from the payload, if any
    pub entity: Option<String>,
    /// Source address the frame arrived from
    pub source: String,
    /// Receive time in unix milliseconds
    pub received_at_ms: u64,
    /// Raw frame bytes, base64 encoded on the wire
    #[serde(with = "payload_base64")]
    pub payload: Vec<u8>,
}

impl ForwardEnvelope {
    /// Tag a frame with the device identity and its extracted entity.
    pub fn new(device_id: DeviceId, entity: Option<String>, frame: RawFrame) -> Self {
        Self {
            device_id,
            entity,
            source: frame.source().to_string(),
            received_at_ms: frame.received_at_ms(),
            payload: frame.into_payload(),
        }
    }

    /// Encode as JSON bytes.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

mod payload_base64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(de::Error::custom)
    }
}
