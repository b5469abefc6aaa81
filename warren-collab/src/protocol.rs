//! Binary cell-diff protocol.
//!
//! Wire format (bincode-encoded):
//! ```text
//! ┌──────────┬───────────┬────────────┬──────────┬──────────┐
//! │ msg_type │ peer_id   │ session_id │ seq      │ payload  │
//! │ 1 byte   │ 16 bytes  │ 16 bytes   │ 8 bytes  │ variable │
//! └──────────┴───────────┴────────────┴──────────┴──────────┘
//! ```
//!
//! `seq` is a per-sender monotonic counter. The hub preserves per-sender
//! order and makes no ordering promise across senders: concurrent writes
//! to the same cell resolve last-write-wins by arrival. Delivery is
//! at-most-once with no replay — a reconnecting client resynchronizes with
//! `RequestSnapshot`. Every message is idempotent when replayed with an
//! identical payload, because cell snapshots are absolute.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warren_core::CellBatch;

/// Message types for the grid sync protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    /// Client enters a grid session (first message on a connection)
    Join = 1,
    /// Hub reply to Join: grid extent and current advisory state
    Welcome = 2,
    /// Upsert a batch of cell snapshots
    ApplyBatch = 3,
    /// Ask the hub for the full grid as one ApplyBatch (caller only)
    RequestSnapshot = 4,
    /// Advisory "an algorithm run is progressing" flag, no grid mutation
    GenerationActive = 5,
    /// Peer left notification
    PeerLeft = 6,
    /// Heartbeat ping
    Ping = 7,
    /// Heartbeat pong
    Pong = 8,
}

/// Client identity announced on join.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientInfo {
    pub peer_id: Uuid,
    pub name: String,
}

impl ClientInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            peer_id: Uuid::new_v4(),
            name: name.into(),
        }
    }

    /// Create with explicit peer_id (for testing)
    pub fn with_id(peer_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            peer_id,
            name: name.into(),
        }
    }
}

/// Session description sent to a joining client.
///
/// The extent lets the replica size itself before the snapshot arrives.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionInfo {
    pub width: u32,
    pub height: u32,
    pub generation_active: bool,
}

/// Top-level protocol message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridMessage {
    pub msg_type: MessageType,
    pub peer_id: Uuid,
    pub session_id: Uuid,
    /// Per-sender monotonic sequence number
    pub seq: u64,
    /// Message payload (varies by msg_type)
    pub payload: Vec<u8>,
}

impl GridMessage {
    /// Create a join message carrying the client's identity.
    pub fn join(info: &ClientInfo, session_id: Uuid) -> Result<Self, ProtocolError> {
        let payload = encode_payload(info)?;
        Ok(Self {
            msg_type: MessageType::Join,
            peer_id: info.peer_id,
            session_id,
            seq: 0,
            payload,
        })
    }

    /// Create a welcome reply (hub to client, peer id nil).
    pub fn welcome(session_id: Uuid, info: &SessionInfo) -> Result<Self, ProtocolError> {
        let payload = encode_payload(info)?;
        Ok(Self {
            msg_type: MessageType::Welcome,
            peer_id: Uuid::nil(),
            session_id,
            seq: 0,
            payload,
        })
    }

    /// Create a cell batch upsert message.
    pub fn apply_batch(
        peer_id: Uuid,
        session_id: Uuid,
        seq: u64,
        batch: &CellBatch,
    ) -> Result<Self, ProtocolError> {
        let payload = encode_payload(batch)?;
        Ok(Self {
            msg_type: MessageType::ApplyBatch,
            peer_id,
            session_id,
            seq,
            payload,
        })
    }

    /// Create a snapshot request (empty payload).
    pub fn request_snapshot(peer_id: Uuid, session_id: Uuid) -> Self {
        Self {
            msg_type: MessageType::RequestSnapshot,
            peer_id,
            session_id,
            seq: 0,
            payload: Vec::new(),
        }
    }

    /// Create an advisory generation-active message.
    pub fn generation_active(
        peer_id: Uuid,
        session_id: Uuid,
        active: bool,
    ) -> Result<Self, ProtocolError> {
        let payload = encode_payload(&active)?;
        Ok(Self {
            msg_type: MessageType::GenerationActive,
            peer_id,
            session_id,
            seq: 0,
            payload,
        })
    }

    /// Create a peer left notification.
    pub fn peer_left(peer_id: Uuid, session_id: Uuid) -> Self {
        Self {
            msg_type: MessageType::PeerLeft,
            peer_id,
            session_id,
            seq: 0,
            payload: Vec::new(),
        }
    }

    /// Create a ping message.
    pub fn ping(peer_id: Uuid) -> Self {
        Self {
            msg_type: MessageType::Ping,
            peer_id,
            session_id: Uuid::nil(),
            seq: 0,
            payload: Vec::new(),
        }
    }

    /// Create a pong message.
    pub fn pong(peer_id: Uuid) -> Self {
        Self {
            msg_type: MessageType::Pong,
            peer_id,
            session_id: Uuid::nil(),
            seq: 0,
            payload: Vec::new(),
        }
    }

    /// Serialize to binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::SerializationError(e.to_string()))
    }

    /// Deserialize from binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (msg, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
        Ok(msg)
    }

    /// Parse an ApplyBatch payload.
    pub fn batch(&self) -> Result<CellBatch, ProtocolError> {
        if self.msg_type != MessageType::ApplyBatch {
            return Err(ProtocolError::InvalidMessageType);
        }
        decode_payload(&self.payload)
    }

    /// Parse a Join payload.
    pub fn client_info(&self) -> Result<ClientInfo, ProtocolError> {
        if self.msg_type != MessageType::Join {
            return Err(ProtocolError::InvalidMessageType);
        }
        decode_payload(&self.payload)
    }

    /// Parse a Welcome payload.
    pub fn session_info(&self) -> Result<SessionInfo, ProtocolError> {
        if self.msg_type != MessageType::Welcome {
            return Err(ProtocolError::InvalidMessageType);
        }
        decode_payload(&self.payload)
    }

    /// Parse a GenerationActive payload.
    pub fn generation_flag(&self) -> Result<bool, ProtocolError> {
        if self.msg_type != MessageType::GenerationActive {
            return Err(ProtocolError::InvalidMessageType);
        }
        decode_payload(&self.payload)
    }
}

fn encode_payload<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| ProtocolError::SerializationError(e.to_string()))
}

fn decode_payload<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, ProtocolError> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
    Ok(value)
}

/// Protocol errors.
#[derive(Debug, Clone)]
pub enum ProtocolError {
    SerializationError(String),
    DeserializationError(String),
    InvalidMessageType,
    ConnectionClosed,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SerializationError(e) => write!(f, "Serialization error: {e}"),
            Self::DeserializationError(e) => write!(f, "Deserialization error: {e}"),
            Self::InvalidMessageType => write!(f, "Invalid message type"),
            Self::ConnectionClosed => write!(f, "Connection closed"),
        }
    }
}

impl std::error::Error for ProtocolError {}
