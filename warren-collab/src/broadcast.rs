//! Fan-out broadcast to the other peers of a grid session.
//!
//! Uses a tokio broadcast channel of pre-encoded frames for O(1) send to
//! all subscribers. Each peer gets an independent receiver buffering up to
//! `capacity` messages; a lagging peer drops messages rather than stalling
//! the session, and must resynchronize with a snapshot request. Per-sender
//! ordering is preserved because every frame passes through the one
//! channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::protocol::{ClientInfo, GridMessage, ProtocolError};

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Default)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    pub active_peers: usize,
}

/// A broadcast group for a single grid session.
///
/// All peers of the session share one channel. The sender's own frames are
/// filtered out by each connection task, not here.
pub struct BroadcastGroup {
    sender: broadcast::Sender<Arc<Vec<u8>>>,

    /// Connected peers in this session
    peers: Arc<RwLock<HashMap<Uuid, ClientInfo>>>,

    /// Channel capacity (messages buffered per receiver)
    capacity: usize,

    /// Lock-free send counter
    messages_sent: AtomicU64,
}

impl BroadcastGroup {
    /// Create a new broadcast group with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            peers: Arc::new(RwLock::new(HashMap::new())),
            capacity,
            messages_sent: AtomicU64::new(0),
        }
    }

    /// Add a peer; returns the receiver it consumes messages from.
    pub async fn add_peer(&self, info: ClientInfo) -> broadcast::Receiver<Arc<Vec<u8>>> {
        let mut peers = self.peers.write().await;
        peers.insert(info.peer_id, info);
        self.sender.subscribe()
    }

    /// Remove a peer from this broadcast group.
    pub async fn remove_peer(&self, peer_id: &Uuid) -> Option<ClientInfo> {
        let mut peers = self.peers.write().await;
        peers.remove(peer_id)
    }

    /// Broadcast a message to every subscriber.
    ///
    /// Returns the number of receivers the frame reached. The hot path is
    /// lock-free: one channel send plus an atomic counter.
    pub fn broadcast(&self, msg: &GridMessage) -> Result<usize, ProtocolError> {
        let encoded = msg.encode()?;
        Ok(self.broadcast_raw(Arc::new(encoded)))
    }

    /// Broadcast pre-encoded bytes directly (zero-copy fast path).
    pub fn broadcast_raw(&self, encoded: Arc<Vec<u8>>) -> usize {
        let count = self.sender.send(encoded).unwrap_or(0);
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        count
    }

    /// Get the current peer count.
    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    /// Get all connected peer infos.
    pub async fn peers(&self) -> Vec<ClientInfo> {
        self.peers.read().await.values().cloned().collect()
    }

    /// Check if a peer is connected.
    pub async fn has_peer(&self, peer_id: &Uuid) -> bool {
        self.peers.read().await.contains_key(peer_id)
    }

    /// Get broadcast statistics.
    pub async fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            active_peers: self.peers.read().await.len(),
        }
    }

    /// Get the channel capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Subscribe without registering a peer (raw receiver).
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Vec<u8>>> {
        self.sender.subscribe()
    }
}
