//! The synchronization hub: WebSocket server with per-session grids.
//!
//! Architecture:
//! ```text
//! Client A ──┐
//!             ├── Session (session_id) ── Grid ── BroadcastGroup
//! Client B ──┘          │
//!                       ├── CellStore (RocksDB, optional)
//!                       │
//!            ┌──────────┼───────────┐
//!            ▼          ▼           ▼
//!         Client A   Client B    Client C
//! ```
//!
//! Each session owns the authoritative [`Grid`]. A mutation from one
//! client is applied to that grid (last-write-wins per cell by arrival
//! order), persisted, and rebroadcast to every *other* connected client.
//! Joining clients get the extent plus a full snapshot; `RequestSnapshot`
//! serves the caller only. The hub never reorders, merges or drops
//! in-order messages from a single sender.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;
use warren_core::Grid;

use crate::broadcast::BroadcastGroup;
use crate::protocol::{ClientInfo, GridMessage, MessageType, SessionInfo};
use crate::storage::{CellStore, SessionMeta, StoreConfig};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Extent of newly created session grids
    pub grid_width: u32,
    pub grid_height: u32,
    /// Broadcast channel capacity per session
    pub broadcast_capacity: usize,
    /// Persistent cell store path (None = in-memory only)
    pub storage_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            grid_width: 34,
            grid_height: 25,
            broadcast_capacity: 256,
            storage_path: None,
        }
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_messages: u64,
    pub total_bytes: u64,
    pub active_sessions: usize,
    pub cells_persisted: u64,
    pub snapshots_served: u64,
}

/// One grid session: authoritative grid + fan-out group.
struct GridSession {
    grid: Grid,
    broadcast: Arc<BroadcastGroup>,
    /// Advisory only — mirrors the last GenerationActive seen, never
    /// enforced.
    generation_active: bool,
}

impl GridSession {
    fn new(grid: Grid, broadcast_capacity: usize) -> Self {
        Self {
            grid,
            broadcast: Arc::new(BroadcastGroup::new(broadcast_capacity)),
            generation_active: false,
        }
    }
}

/// The grid hub server.
pub struct GridServer {
    config: ServerConfig,
    /// Grid sessions: session_id → (authoritative grid + broadcast)
    sessions: Arc<RwLock<HashMap<Uuid, GridSession>>>,
    stats: Arc<RwLock<ServerStats>>,
    /// Persistent cell store (optional)
    store: Option<Arc<CellStore>>,
}

impl GridServer {
    /// Create a new hub with the given configuration.
    pub fn new(config: ServerConfig) -> Self {
        let store = config.storage_path.as_ref().map(|path| {
            let store_config = StoreConfig {
                path: path.clone(),
                ..StoreConfig::default()
            };
            Arc::new(CellStore::open(store_config).expect("Failed to open cell store"))
        });

        Self {
            config,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(RwLock::new(ServerStats::default())),
            store,
        }
    }

    /// Create with default configuration (in-memory, no persistence).
    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }

    /// Create with persistence enabled at the given path.
    pub fn with_storage(bind_addr: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let config = ServerConfig {
            bind_addr: bind_addr.into(),
            storage_path: Some(path.into()),
            ..ServerConfig::default()
        };
        Self::new(config)
    }

    /// Start listening for WebSocket connections.
    ///
    /// This runs the server event loop. Call from an async runtime.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!("grid hub listening on {}", self.config.bind_addr);

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("new TCP connection from {addr}");

            let sessions = self.sessions.clone();
            let stats = self.stats.clone();
            let config = self.config.clone();
            let store = self.store.clone();

            tokio::spawn(async move {
                if let Err(e) =
                    Self::handle_connection(stream, addr, sessions, stats, config, store).await
                {
                    log::error!("connection error from {addr}: {e}");
                }
            });
        }
    }

    /// Build a session grid: seeded from the store when history exists,
    /// default cells otherwise (newly created state is persisted so the
    /// next cold start sees it).
    fn create_session(
        session_id: Uuid,
        config: &ServerConfig,
        store: &Option<Arc<CellStore>>,
    ) -> GridSession {
        if let Some(store) = store {
            match store.load_cells(session_id) {
                Ok(cells) if !cells.is_empty() => {
                    let (width, height) = match store.load_meta(session_id) {
                        Ok(meta) => (meta.width, meta.height),
                        Err(_) => (config.grid_width, config.grid_height),
                    };
                    let mut grid = Grid::new(width, height);
                    let batch = warren_core::CellBatch::new(cells);
                    grid.apply_batch(&batch);
                    log::info!("session {session_id} seeded from store ({width}x{height})");
                    return GridSession::new(grid, config.broadcast_capacity);
                }
                Ok(_) => {}
                Err(e) => log::error!("failed to seed session {session_id} from store: {e}"),
            }

            let grid = Grid::new(config.grid_width, config.grid_height);
            let meta = SessionMeta::new(session_id, grid.width(), grid.height());
            if let Err(e) = store
                .save_meta(&meta)
                .and_then(|_| store.put_cells(session_id, grid.cells()).map(|_| ()))
            {
                log::error!("failed to persist new session {session_id}: {e}");
            }
            return GridSession::new(grid, config.broadcast_capacity);
        }

        GridSession::new(
            Grid::new(config.grid_width, config.grid_height),
            config.broadcast_capacity,
        )
    }

    /// Handle a single WebSocket connection.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        sessions: Arc<RwLock<HashMap<Uuid, GridSession>>>,
        stats: Arc<RwLock<ServerStats>>,
        config: ServerConfig,
        store: Option<Arc<CellStore>>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        log::info!("WebSocket connection established from {addr}");

        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        // State for this connection
        let mut peer_id: Option<Uuid> = None;
        let mut session_id: Option<Uuid> = None;
        let mut broadcast_rx: Option<tokio::sync::broadcast::Receiver<Arc<Vec<u8>>>> = None;

        loop {
            tokio::select! {
                // Incoming WebSocket message
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Binary(data))) => {
                            let bytes: Vec<u8> = data.into();
                            let grid_msg = match GridMessage::decode(&bytes) {
                                Ok(m) => m,
                                Err(e) => {
                                    log::warn!("failed to decode message from {addr}: {e}");
                                    continue;
                                }
                            };

                            {
                                let mut s = stats.write().await;
                                s.total_messages += 1;
                                s.total_bytes += bytes.len() as u64;
                            }

                            match grid_msg.msg_type {
                                MessageType::Join => {
                                    // First message: peer enters a grid session
                                    peer_id = Some(grid_msg.peer_id);
                                    session_id = Some(grid_msg.session_id);

                                    let info = grid_msg.client_info().unwrap_or_else(|_| {
                                        ClientInfo::with_id(grid_msg.peer_id, "anonymous")
                                    });

                                    let mut sessions_w = sessions.write().await;
                                    let session = sessions_w
                                        .entry(grid_msg.session_id)
                                        .or_insert_with(|| {
                                            Self::create_session(grid_msg.session_id, &config, &store)
                                        });

                                    let rx = session.broadcast.add_peer(info.clone()).await;
                                    broadcast_rx = Some(rx);

                                    let session_info = SessionInfo {
                                        width: session.grid.width(),
                                        height: session.grid.height(),
                                        generation_active: session.generation_active,
                                    };
                                    let snapshot = session.grid.snapshot_batch();
                                    let broadcast_clone = session.broadcast.clone();
                                    let session_count = sessions_w.len();
                                    drop(sessions_w); // release lock before awaits

                                    let welcome =
                                        GridMessage::welcome(grid_msg.session_id, &session_info)?;
                                    ws_sender.send(Message::Binary(welcome.encode()?.into())).await?;

                                    // Full-grid push so the replica is current immediately
                                    let snapshot_msg = GridMessage::apply_batch(
                                        Uuid::nil(),
                                        grid_msg.session_id,
                                        0,
                                        &snapshot,
                                    )?;
                                    ws_sender
                                        .send(Message::Binary(snapshot_msg.encode()?.into()))
                                        .await?;

                                    // Announce the join to the other peers
                                    let _ = broadcast_clone.broadcast(&grid_msg);

                                    {
                                        let mut s = stats.write().await;
                                        s.active_sessions = session_count;
                                    }

                                    log::info!(
                                        "peer {} ({}) joined session {}",
                                        info.name,
                                        info.peer_id,
                                        grid_msg.session_id
                                    );
                                }

                                MessageType::ApplyBatch => {
                                    // Apply to the authoritative grid, persist, rebroadcast
                                    if let Some(sid) = session_id {
                                        let batch = match grid_msg.batch() {
                                            Ok(b) => b,
                                            Err(e) => {
                                                log::warn!("bad batch from {addr}: {e}");
                                                continue;
                                            }
                                        };

                                        let applied = {
                                            let mut sessions_w = sessions.write().await;
                                            match sessions_w.get_mut(&sid) {
                                                Some(session) => {
                                                    let applied = session.grid.apply_batch(&batch);
                                                    Some((session.broadcast.clone(), applied))
                                                }
                                                None => None,
                                            }
                                        };

                                        if let Some((bc, applied)) = applied {
                                            // Persist outside the session lock
                                            if let Some(ref s) = store {
                                                match s.put_cells(sid, &applied) {
                                                    Ok(written) => {
                                                        let mut st = stats.write().await;
                                                        st.cells_persisted += written as u64;
                                                    }
                                                    Err(e) => log::error!(
                                                        "failed to persist cells for session {sid}: {e}"
                                                    ),
                                                }
                                            }
                                            let _ = bc.broadcast(&grid_msg);
                                        }
                                    }
                                }

                                MessageType::RequestSnapshot => {
                                    // Full grid to the caller only
                                    if let Some(sid) = session_id {
                                        let snapshot = {
                                            let sessions_r = sessions.read().await;
                                            sessions_r.get(&sid).map(|s| s.grid.snapshot_batch())
                                        };
                                        if let Some(snapshot) = snapshot {
                                            let reply = GridMessage::apply_batch(
                                                Uuid::nil(),
                                                sid,
                                                0,
                                                &snapshot,
                                            )?;
                                            ws_sender
                                                .send(Message::Binary(reply.encode()?.into()))
                                                .await?;
                                            let mut st = stats.write().await;
                                            st.snapshots_served += 1;
                                        }
                                    }
                                }

                                MessageType::GenerationActive => {
                                    // Advisory flag: remember and relay, no grid mutation
                                    if let Some(sid) = session_id {
                                        let active = grid_msg.generation_flag().unwrap_or(false);
                                        let broadcast_clone = {
                                            let mut sessions_w = sessions.write().await;
                                            sessions_w.get_mut(&sid).map(|session| {
                                                session.generation_active = active;
                                                session.broadcast.clone()
                                            })
                                        };
                                        if let Some(bc) = broadcast_clone {
                                            let _ = bc.broadcast(&grid_msg);
                                        }
                                    }
                                }

                                MessageType::Ping => {
                                    if let Some(pid) = peer_id {
                                        let pong = GridMessage::pong(pid);
                                        ws_sender.send(Message::Binary(pong.encode()?.into())).await?;
                                    }
                                }

                                _ => {
                                    log::debug!("unhandled message type: {:?}", grid_msg.msg_type);
                                }
                            }
                        }

                        Some(Ok(Message::Close(_))) | None => {
                            log::info!("connection closed from {addr}");
                            break;
                        }

                        Some(Ok(Message::Ping(data))) => {
                            ws_sender.send(Message::Pong(data)).await?;
                        }

                        Some(Err(e)) => {
                            log::error!("WebSocket error from {addr}: {e}");
                            break;
                        }

                        _ => {}
                    }
                }

                // Outgoing broadcast frame
                frame = async {
                    match broadcast_rx {
                        Some(ref mut rx) => rx.recv().await,
                        // Not joined yet — wait forever
                        None => std::future::pending().await,
                    }
                } => {
                    match frame {
                        Ok(data) => {
                            // Don't echo the sender's own messages back
                            if let Ok(msg) = GridMessage::decode(&data) {
                                if Some(msg.peer_id) == peer_id {
                                    continue;
                                }
                            }
                            ws_sender.send(Message::Binary(data.to_vec().into())).await?;
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            log::warn!("peer {peer_id:?} lagged by {n} messages");
                        }
                        Err(_) => break,
                    }
                }
            }
        }

        // Cleanup: remove peer from the session
        if let (Some(pid), Some(sid)) = (peer_id, session_id) {
            let mut sessions_w = sessions.write().await;
            if let Some(session) = sessions_w.get_mut(&sid) {
                session.broadcast.remove_peer(&pid).await;

                let leave = GridMessage::peer_left(pid, sid);
                let _ = session.broadcast.broadcast(&leave);

                // Drop empty sessions, flushing their grid to the store
                if session.broadcast.peer_count().await == 0 {
                    if let Some(ref s) = store {
                        if let Err(e) = s.put_cells(sid, session.grid.cells()) {
                            log::error!("failed to flush session {sid} on close: {e}");
                        } else {
                            log::info!("flushed session {sid} to store (session closing)");
                        }
                    }
                    sessions_w.remove(&sid);
                    log::info!("session {sid} removed (empty)");
                }
            }

            let mut s = stats.write().await;
            s.active_sessions = sessions_w.len();
        }

        // The connection counted itself on accept, joined or not.
        {
            let mut s = stats.write().await;
            s.active_connections -= 1;
        }

        Ok(())
    }

    /// Get server statistics.
    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    /// Get the configured bind address.
    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    /// Get the persistent store (if configured).
    pub fn store(&self) -> Option<&Arc<CellStore>> {
        self.store.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warren_core::{Cell, CellBatch, Coord};

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:9090");
        assert_eq!(config.grid_width, 34);
        assert_eq!(config.grid_height, 25);
        assert_eq!(config.broadcast_capacity, 256);
        assert!(config.storage_path.is_none());
    }

    #[test]
    fn test_server_creation() {
        let server = GridServer::with_defaults();
        assert_eq!(server.bind_addr(), "127.0.0.1:9090");
        assert!(server.store.is_none());
    }

    #[tokio::test]
    async fn test_server_with_storage() {
        let dir = tempfile::tempdir().unwrap();
        let server = GridServer::with_storage("127.0.0.1:0", dir.path().join("db"));
        assert!(server.store.is_some());
    }

    #[tokio::test]
    async fn test_server_stats_initial() {
        let server = GridServer::with_defaults();
        let stats = server.stats().await;
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.total_messages, 0);
        assert_eq!(stats.active_sessions, 0);
        assert_eq!(stats.cells_persisted, 0);
        assert_eq!(stats.snapshots_served, 0);
    }

    #[test]
    fn test_create_session_default_extent() {
        let config = ServerConfig::default();
        let session = GridServer::create_session(Uuid::new_v4(), &config, &None);
        assert_eq!(session.grid.width(), 34);
        assert_eq!(session.grid.height(), 25);
        assert!(!session.generation_active);
    }

    #[tokio::test]
    async fn test_create_session_seeds_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            CellStore::open(StoreConfig::for_testing(dir.path().join("db"))).unwrap(),
        );
        let session_id = Uuid::new_v4();

        // Persist an 8x6 grid with one wall
        let mut grid = Grid::new(8, 6);
        grid.cell_at_mut(Coord::new(2, 3)).unwrap().is_wall = true;
        store
            .save_meta(&SessionMeta::new(session_id, 8, 6))
            .unwrap();
        store.put_cells(session_id, grid.cells()).unwrap();

        let config = ServerConfig::default();
        let session = GridServer::create_session(session_id, &config, &Some(store));
        assert_eq!(session.grid.width(), 8);
        assert_eq!(session.grid.height(), 6);
        assert!(session.grid.cell(2, 3).unwrap().is_wall);
    }

    #[tokio::test]
    async fn test_create_session_persists_fresh_grid() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            CellStore::open(StoreConfig::for_testing(dir.path().join("db"))).unwrap(),
        );
        let session_id = Uuid::new_v4();

        let config = ServerConfig {
            grid_width: 4,
            grid_height: 3,
            ..ServerConfig::default()
        };
        let _session = GridServer::create_session(session_id, &config, &Some(store.clone()));

        // Cold-start state landed in the store
        assert_eq!(store.load_cells(session_id).unwrap().len(), 12);
        assert_eq!(store.load_meta(session_id).unwrap().width, 4);
    }

    #[tokio::test]
    async fn test_session_apply_batch_is_lww() {
        let config = ServerConfig::default();
        let mut session = GridServer::create_session(Uuid::new_v4(), &config, &None);

        let mut first = Cell::new(Coord::new(1, 1));
        first.is_wall = true;
        let mut second = Cell::new(Coord::new(1, 1));
        second.is_wall = false;

        session.grid.apply_batch(&CellBatch::new(vec![first]));
        session.grid.apply_batch(&CellBatch::new(vec![second]));

        // Later arrival wins, no merging
        assert!(!session.grid.cell(1, 1).unwrap().is_wall);
    }
}
