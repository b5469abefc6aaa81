//! # warren-collab — real-time grid synchronization
//!
//! WebSocket-based multi-client editing of a shared maze grid, with
//! last-write-wins cell semantics and durable cell storage.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     WebSocket       ┌─────────────┐
//! │ GridClient  │ ◄─────────────────► │ GridServer  │
//! │ (per user)  │    Binary Proto     │ (hub)       │
//! └──────┬──────┘                     └──────┬──────┘
//!        │                                   │
//!        ▼                                   ▼
//! ┌─────────────┐                     ┌─────────────┐
//! │ GridReplica │                     │ Grid        │
//! │ (mirror)    │                     │ (authority) │
//! └─────────────┘                     └──────┬──────┘
//!                                            │
//!                                 ┌──────────┴──────────┐
//!                                 │ BroadcastGroup      │
//!                                 │ (fan-out to others) │
//!                                 └──────────┬──────────┘
//!                                            │
//!                                    ┌───────┴───────┐
//!                                    │ CellStore     │
//!                                    │ (RocksDB)     │
//!                                    └───────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — binary wire protocol (bincode-encoded [`GridMessage`])
//! - [`broadcast`] — per-session fan-out with backpressure
//! - [`server`] — the synchronization hub
//! - [`client`] — WebSocket client with a pending-edit queue
//! - [`replica`] — the client-side grid mirror and its edit operations
//! - [`storage`] — durable `(session, x, y)` cell store

pub mod broadcast;
pub mod client;
pub mod protocol;
pub mod replica;
pub mod server;
pub mod storage;

// Re-exports for convenience
pub use broadcast::{BroadcastGroup, BroadcastStats};
pub use client::{ConnectionState, GridClient, GridEvent, PendingQueue};
pub use protocol::{ClientInfo, GridMessage, MessageType, ProtocolError, SessionInfo};
pub use replica::{CellEdit, GridReplica};
pub use server::{GridServer, ServerConfig, ServerStats};
pub use storage::{CellStore, SessionMeta, StoreConfig, StoreError};
