//! WebSocket client for the grid hub.
//!
//! Provides:
//! - Connection lifecycle (connect, disconnect, reconnect)
//! - Batch send/receive as [`GridEvent`]s for the application
//! - A pending queue for edits made while disconnected
//!
//! Delivery is at-most-once: batches broadcast while this client was away
//! are never replayed. Reconnecting re-joins the session, which pushes a
//! fresh full snapshot — that, or an explicit [`GridClient::request_snapshot`],
//! is the resynchronization path after a transport failure.

use std::collections::VecDeque;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{mpsc, Mutex, RwLock};
use uuid::Uuid;
use warren_core::CellBatch;

use crate::protocol::{ClientInfo, GridMessage, MessageType, ProtocolError, SessionInfo};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Events emitted by the grid client.
#[derive(Debug, Clone)]
pub enum GridEvent {
    /// Connection established
    Connected,
    /// Connection lost; resynchronize after reconnecting
    Disconnected,
    /// Session description received on join
    Welcome(SessionInfo),
    /// A cell batch from the hub (remote edit, run step or snapshot)
    RemoteBatch {
        peer_id: Uuid,
        seq: u64,
        batch: CellBatch,
    },
    /// Advisory run-in-progress flag from another client
    GenerationActive { peer_id: Uuid, active: bool },
    /// A peer joined the session
    PeerJoined(ClientInfo),
    /// A peer left the session
    PeerLeft(Uuid),
}

/// Queue for local edits made while disconnected.
///
/// Queued batches are replayed in order on reconnection.
pub struct PendingQueue {
    queue: VecDeque<(u64, CellBatch)>,
    max_size: usize,
}

impl PendingQueue {
    /// Create a new queue with max capacity.
    pub fn new(max_size: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(max_size.min(1024)),
            max_size,
        }
    }

    /// Queue a batch for later replay. Returns false when full.
    pub fn enqueue(&mut self, seq: u64, batch: CellBatch) -> bool {
        if self.queue.len() >= self.max_size {
            return false;
        }
        self.queue.push_back((seq, batch));
        true
    }

    /// Drain all queued batches for replay.
    pub fn drain(&mut self) -> Vec<(u64, CellBatch)> {
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Total cells queued across batches.
    pub fn total_cells(&self) -> usize {
        self.queue.iter().map(|(_, b)| b.len()).sum()
    }
}

/// The grid sync client.
///
/// Manages a WebSocket connection to the hub, surfaces remote mutations as
/// events and queues local edits while offline.
pub struct GridClient {
    /// Our identity
    info: ClientInfo,

    /// Session we are editing
    session_id: Uuid,

    /// Connection state
    state: Arc<RwLock<ConnectionState>>,

    /// Per-sender sequence counter
    seq: Arc<RwLock<u64>>,

    /// Pending queue for disconnected edits
    pending: Arc<Mutex<PendingQueue>>,

    /// Channel to the WebSocket writer task
    outgoing_tx: Option<mpsc::Sender<Vec<u8>>>,

    /// Event receiver for the application
    event_rx: Option<mpsc::Receiver<GridEvent>>,

    /// Event sender (held by the connection tasks)
    event_tx: mpsc::Sender<GridEvent>,

    /// Hub URL
    server_url: String,
}

impl GridClient {
    /// Create a new client.
    pub fn new(info: ClientInfo, session_id: Uuid, server_url: impl Into<String>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            info,
            session_id,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            seq: Arc::new(RwLock::new(0)),
            pending: Arc::new(Mutex::new(PendingQueue::new(10_000))),
            outgoing_tx: None,
            event_rx: Some(event_rx),
            event_tx,
            server_url: server_url.into(),
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<GridEvent>> {
        self.event_rx.take()
    }

    /// Connect to the hub and join the session.
    ///
    /// Spawns background tasks for reading/writing WebSocket messages.
    /// The hub answers the join with a Welcome and a full snapshot, so a
    /// reconnecting client is resynchronized by this call alone; queued
    /// offline edits are replayed first.
    pub async fn connect(&mut self) -> Result<(), ProtocolError> {
        *self.state.write().await = ConnectionState::Connecting;

        let url = format!("{}/{}", self.server_url, self.session_id);
        let ws_result = tokio_tungstenite::connect_async(&url).await;

        let (ws_stream, _) = match ws_result {
            Ok(ok) => ok,
            Err(_) => {
                *self.state.write().await = ConnectionState::Disconnected;
                return Err(ProtocolError::ConnectionClosed);
            }
        };
        let (ws_writer, mut ws_reader) = ws_stream.split();

        // Writer task: forward the outgoing channel to the WebSocket
        let (out_tx, mut out_rx) = mpsc::channel::<Vec<u8>>(256);
        self.outgoing_tx = Some(out_tx);
        tokio::spawn(async move {
            use futures_util::SinkExt;
            let mut writer = ws_writer;
            while let Some(data) = out_rx.recv().await {
                if writer
                    .send(tokio_tungstenite::tungstenite::Message::Binary(data.into()))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            // Channel closed (disconnect or client drop): tell the hub so
            // it can release the session instead of waiting on a dead TCP
            // connection.
            let _ = writer
                .send(tokio_tungstenite::tungstenite::Message::Close(None))
                .await;
        });

        // Join the session
        let join = GridMessage::join(&self.info, self.session_id)?;
        self.send_raw(join.encode()?).await?;

        *self.state.write().await = ConnectionState::Connected;
        let _ = self.event_tx.send(GridEvent::Connected).await;

        // Replay edits queued while offline
        {
            let mut pending = self.pending.lock().await;
            let queued = pending.drain();
            if !queued.is_empty() {
                log::info!("replaying {} queued batches", queued.len());
                for (seq, batch) in queued {
                    let msg =
                        GridMessage::apply_batch(self.info.peer_id, self.session_id, seq, &batch)?;
                    self.send_raw(msg.encode()?).await?;
                }
            }
        }

        // Reader task: surface hub messages as events
        let event_tx = self.event_tx.clone();
        let state = self.state.clone();
        let peer_id = self.info.peer_id;
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(tokio_tungstenite::tungstenite::Message::Binary(data)) => {
                        let bytes: Vec<u8> = data.into();
                        let Ok(grid_msg) = GridMessage::decode(&bytes) else {
                            log::warn!("failed to decode hub message");
                            continue;
                        };
                        // Skip our own rebroadcasts
                        if grid_msg.peer_id == peer_id {
                            continue;
                        }

                        let event = match grid_msg.msg_type {
                            MessageType::ApplyBatch => {
                                grid_msg.batch().ok().map(|batch| GridEvent::RemoteBatch {
                                    peer_id: grid_msg.peer_id,
                                    seq: grid_msg.seq,
                                    batch,
                                })
                            }
                            MessageType::Welcome => {
                                grid_msg.session_info().ok().map(GridEvent::Welcome)
                            }
                            MessageType::GenerationActive => {
                                grid_msg.generation_flag().ok().map(|active| {
                                    GridEvent::GenerationActive {
                                        peer_id: grid_msg.peer_id,
                                        active,
                                    }
                                })
                            }
                            MessageType::Join => {
                                grid_msg.client_info().ok().map(GridEvent::PeerJoined)
                            }
                            MessageType::PeerLeft => Some(GridEvent::PeerLeft(grid_msg.peer_id)),
                            _ => None,
                        };

                        if let Some(event) = event {
                            let _ = event_tx.send(event).await;
                        }
                    }
                    Ok(tokio_tungstenite::tungstenite::Message::Close(_)) | Err(_) => {
                        break;
                    }
                    _ => {}
                }
            }

            // Connection lost
            *state.write().await = ConnectionState::Disconnected;
            let _ = event_tx.send(GridEvent::Disconnected).await;
        });

        Ok(())
    }

    /// Close the connection.
    ///
    /// The hub sees a clean close and drops this peer from the session.
    /// Queued pending edits are kept for the next [`GridClient::connect`].
    pub async fn disconnect(&mut self) {
        self.outgoing_tx = None;
        *self.state.write().await = ConnectionState::Disconnected;
    }

    /// Send a cell batch to the hub.
    ///
    /// While disconnected the batch is queued for replay on reconnect.
    pub async fn send_batch(&self, batch: CellBatch) -> Result<(), ProtocolError> {
        let mut seq = self.seq.write().await;
        *seq += 1;
        let current_seq = *seq;
        drop(seq);

        let state = *self.state.read().await;
        if state != ConnectionState::Connected {
            let mut pending = self.pending.lock().await;
            if !pending.enqueue(current_seq, batch) {
                return Err(ProtocolError::ConnectionClosed);
            }
            return Ok(());
        }

        let msg = GridMessage::apply_batch(self.info.peer_id, self.session_id, current_seq, &batch)?;
        self.send_raw(msg.encode()?).await
    }

    /// Ask the hub for a full-grid snapshot (answered to this client only).
    pub async fn request_snapshot(&self) -> Result<(), ProtocolError> {
        let msg = GridMessage::request_snapshot(self.info.peer_id, self.session_id);
        self.send_raw(msg.encode()?).await
    }

    /// Publish the advisory run-in-progress flag.
    pub async fn set_generation_active(&self, active: bool) -> Result<(), ProtocolError> {
        let state = *self.state.read().await;
        if state != ConnectionState::Connected {
            return Ok(()); // advisory only — drop silently while offline
        }
        let msg = GridMessage::generation_active(self.info.peer_id, self.session_id, active)?;
        self.send_raw(msg.encode()?).await
    }

    /// Send a heartbeat ping.
    pub async fn send_ping(&self) -> Result<(), ProtocolError> {
        let msg = GridMessage::ping(self.info.peer_id);
        self.send_raw(msg.encode()?).await
    }

    async fn send_raw(&self, encoded: Vec<u8>) -> Result<(), ProtocolError> {
        match self.outgoing_tx {
            Some(ref tx) => tx
                .send(encoded)
                .await
                .map_err(|_| ProtocolError::ConnectionClosed),
            None => Err(ProtocolError::ConnectionClosed),
        }
    }

    /// Get the current connection state.
    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Get our identity.
    pub fn info(&self) -> &ClientInfo {
        &self.info
    }

    /// Get the session ID.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Get the hub URL.
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Get the current sequence counter.
    pub async fn seq(&self) -> u64 {
        *self.seq.read().await
    }

    /// Get the pending queue length.
    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warren_core::{Cell, Coord};

    fn one_cell_batch(x: u32, y: u32) -> CellBatch {
        CellBatch::single(Cell::new(Coord::new(x, y)))
    }

    #[test]
    fn test_client_creation() {
        let info = ClientInfo::new("Tester");
        let session = Uuid::new_v4();
        let client = GridClient::new(info.clone(), session, "ws://localhost:9090");

        assert_eq!(client.info().name, "Tester");
        assert_eq!(client.session_id(), session);
        assert_eq!(client.server_url(), "ws://localhost:9090");
    }

    #[tokio::test]
    async fn test_client_initial_state() {
        let client = GridClient::new(ClientInfo::new("Tester"), Uuid::new_v4(), "ws://x");

        assert_eq!(client.connection_state().await, ConnectionState::Disconnected);
        assert_eq!(client.seq().await, 0);
        assert_eq!(client.pending_len().await, 0);
    }

    #[tokio::test]
    async fn test_send_batch_offline_queues() {
        let client = GridClient::new(ClientInfo::new("Tester"), Uuid::new_v4(), "ws://x");

        client.send_batch(one_cell_batch(0, 0)).await.unwrap();
        assert_eq!(client.pending_len().await, 1);

        client.send_batch(one_cell_batch(1, 0)).await.unwrap();
        assert_eq!(client.pending_len().await, 2);

        // The sequence counter advanced even while offline.
        assert_eq!(client.seq().await, 2);
    }

    #[tokio::test]
    async fn test_generation_active_offline_noop() {
        let client = GridClient::new(ClientInfo::new("Tester"), Uuid::new_v4(), "ws://x");
        // Advisory flag is dropped, not queued, while offline.
        client.set_generation_active(true).await.unwrap();
        assert_eq!(client.pending_len().await, 0);
    }

    #[test]
    fn test_pending_queue() {
        let mut queue = PendingQueue::new(100);
        assert!(queue.is_empty());

        queue.enqueue(1, one_cell_batch(0, 0));
        let two = CellBatch::new(vec![
            Cell::new(Coord::new(1, 0)),
            Cell::new(Coord::new(2, 0)),
        ]);
        queue.enqueue(2, two);

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.total_cells(), 3);

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].0, 1);
        assert_eq!(drained[1].0, 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pending_queue_capacity() {
        let mut queue = PendingQueue::new(2);
        assert!(queue.enqueue(1, one_cell_batch(0, 0)));
        assert!(queue.enqueue(2, one_cell_batch(1, 0)));
        assert!(!queue.enqueue(3, one_cell_batch(2, 0)));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_pending_queue_clear() {
        let mut queue = PendingQueue::new(10);
        queue.enqueue(1, one_cell_batch(0, 0));
        queue.clear();
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_keeps_pending_edits() {
        let mut client = GridClient::new(ClientInfo::new("Tester"), Uuid::new_v4(), "ws://x");
        client.send_batch(one_cell_batch(0, 0)).await.unwrap();

        client.disconnect().await;
        assert_eq!(client.connection_state().await, ConnectionState::Disconnected);
        // Queued work survives the disconnect for the next connect.
        assert_eq!(client.pending_len().await, 1);
    }

    #[tokio::test]
    async fn test_take_event_rx_once() {
        let mut client = GridClient::new(ClientInfo::new("Tester"), Uuid::new_v4(), "ws://x");
        assert!(client.take_event_rx().is_some());
        assert!(client.take_event_rx().is_none());
    }
}
