//! RocksDB-backed cell store.
//!
//! Column families:
//! - `cells`    — one bincode-encoded cell per `(session, x, y)` key
//! - `sessions` — session metadata (extent, timestamps)
//!
//! Keys in `cells` are `session_id (16 bytes) ‖ x (4 bytes BE) ‖ y (4 bytes
//! BE)`, so one prefix scan yields a whole session's cells.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode,
    IteratorMode, Options, SingleThreaded, WriteBatch, WriteOptions,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warren_core::Cell;

const CF_CELLS: &str = "cells";
const CF_SESSIONS: &str = "sessions";

const COLUMN_FAMILIES: &[&str] = &[CF_CELLS, CF_SESSIONS];

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Block cache size in bytes
    pub block_cache_size: usize,
    /// Bloom filter bits per key
    pub bloom_filter_bits: i32,
    /// Enable fsync on every write
    pub sync_writes: bool,
    /// Max open files for RocksDB
    pub max_open_files: i32,
    /// Write buffer size per column family
    pub write_buffer_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("warren_data"),
            block_cache_size: 64 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 256,
            write_buffer_size: 16 * 1024 * 1024,
        }
    }
}

impl StoreConfig {
    /// Config for testing (small caches, temp directory).
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 4 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 64,
            write_buffer_size: 1024 * 1024,
        }
    }
}

/// Session metadata stored alongside its cells.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionMeta {
    pub session_id: Uuid,
    pub width: u32,
    pub height: u32,
    /// Creation timestamp (seconds since epoch)
    pub created_at: u64,
    /// Last modified timestamp (seconds since epoch)
    pub updated_at: u64,
}

impl SessionMeta {
    pub fn new(session_id: Uuid, width: u32, height: u32) -> Self {
        let now = unix_now();
        Self {
            session_id,
            width,
            height,
            created_at: now,
            updated_at: now,
        }
    }

    fn encode(&self) -> Result<Vec<u8>, StoreError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| StoreError::SerializationError(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        let (meta, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| StoreError::DeserializationError(e.to_string()))?;
        Ok(meta)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Storage errors.
#[derive(Debug, Clone)]
pub enum StoreError {
    /// RocksDB internal error
    DatabaseError(String),
    /// Session not found
    NotFound(Uuid),
    /// Serialization failed
    SerializationError(String),
    /// Deserialization failed
    DeserializationError(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::DatabaseError(e) => write!(f, "Database error: {e}"),
            StoreError::NotFound(id) => write!(f, "Session not found: {id}"),
            StoreError::SerializationError(e) => write!(f, "Serialization error: {e}"),
            StoreError::DeserializationError(e) => write!(f, "Deserialization error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::DatabaseError(e.to_string())
    }
}

/// RocksDB-backed cell store.
pub struct CellStore {
    /// RocksDB instance (single-threaded mode — concurrency via tokio)
    db: DBWithThreadMode<SingleThreaded>,
    config: StoreConfig,
}

impl CellStore {
    /// Open the store at the configured path, creating the database and
    /// column families as needed.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_keep_log_file_num(5);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(name, &config)))
            .collect();

        let db = DBWithThreadMode::<SingleThreaded>::open_cf_descriptors(
            &db_opts,
            &config.path,
            cf_descriptors,
        )?;

        Ok(Self { db, config })
    }

    fn cf_options(name: &str, config: &StoreConfig) -> Options {
        let mut opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        let cache = Cache::new_lru_cache(config.block_cache_size);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(config.bloom_filter_bits as f64, false);
        opts.set_block_based_table_factory(&block_opts);

        opts.set_compression_type(DBCompressionType::Lz4);
        opts.set_write_buffer_size(config.write_buffer_size);

        match name {
            CF_CELLS => {
                // Many small writes, prefix-scanned by session id
                opts.set_max_write_buffer_number(4);
                opts.set_prefix_extractor(rocksdb::SliceTransform::create_fixed_prefix(16));
            }
            CF_SESSIONS => {
                // Small values, point lookups
                opts.set_max_write_buffer_number(2);
                opts.optimize_for_point_lookup(config.block_cache_size as u64);
            }
            _ => {}
        }

        opts
    }

    // ─── Cells ────────────────────────────────────────────────────────

    /// Upsert a batch of cells for a session, atomically.
    ///
    /// Returns the number of cells written. Bumps the session's
    /// `updated_at` when metadata exists.
    pub fn put_cells(&self, session_id: Uuid, cells: &[Cell]) -> Result<usize, StoreError> {
        if cells.is_empty() {
            return Ok(0);
        }
        let cf_cells = self.cf(CF_CELLS)?;

        let mut batch = WriteBatch::default();
        for cell in cells {
            let key = Self::cell_key(session_id, cell.x, cell.y);
            let value = bincode::serde::encode_to_vec(cell, bincode::config::standard())
                .map_err(|e| StoreError::SerializationError(e.to_string()))?;
            batch.put_cf(&cf_cells, key, value);
        }

        if let Ok(mut meta) = self.load_meta(session_id) {
            meta.updated_at = unix_now();
            let cf_sessions = self.cf(CF_SESSIONS)?;
            batch.put_cf(&cf_sessions, session_id.as_bytes(), meta.encode()?);
        }

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        self.db.write_opt(batch, &write_opts)?;

        Ok(cells.len())
    }

    /// Load every stored cell of a session via one prefix scan.
    ///
    /// Returns an empty vector for an unknown session — cold start with no
    /// history is not an error.
    pub fn load_cells(&self, session_id: Uuid) -> Result<Vec<Cell>, StoreError> {
        let cf = self.cf(CF_CELLS)?;
        let start_key = Self::cell_key(session_id, 0, 0);

        let mut cells = Vec::new();
        let iter = self.db.iterator_cf(
            &cf,
            IteratorMode::From(&start_key, rocksdb::Direction::Forward),
        );

        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::DatabaseError(e.to_string()))?;
            if key.len() < 24 || &key[..16] != session_id.as_bytes() {
                break;
            }
            let (cell, _) =
                bincode::serde::decode_from_slice(&value, bincode::config::standard())
                    .map_err(|e| StoreError::DeserializationError(e.to_string()))?;
            cells.push(cell);
        }

        Ok(cells)
    }

    // ─── Session metadata ─────────────────────────────────────────────

    /// Save session metadata.
    pub fn save_meta(&self, meta: &SessionMeta) -> Result<(), StoreError> {
        let cf = self.cf(CF_SESSIONS)?;
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        self.db
            .put_cf_opt(&cf, meta.session_id.as_bytes(), meta.encode()?, &write_opts)?;
        Ok(())
    }

    /// Load session metadata.
    pub fn load_meta(&self, session_id: Uuid) -> Result<SessionMeta, StoreError> {
        let cf = self.cf(CF_SESSIONS)?;
        match self.db.get_cf(&cf, session_id.as_bytes())? {
            Some(bytes) => SessionMeta::decode(&bytes),
            None => Err(StoreError::NotFound(session_id)),
        }
    }

    /// Check if a session has stored metadata.
    pub fn session_exists(&self, session_id: Uuid) -> Result<bool, StoreError> {
        let cf = self.cf(CF_SESSIONS)?;
        Ok(self.db.get_cf(&cf, session_id.as_bytes())?.is_some())
    }

    /// List all session IDs in the store.
    pub fn list_sessions(&self) -> Result<Vec<Uuid>, StoreError> {
        let cf = self.cf(CF_SESSIONS)?;
        let mut ids = Vec::new();

        let iter = self.db.iterator_cf(&cf, IteratorMode::Start);
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::DatabaseError(e.to_string()))?;
            if key.len() == 16 {
                let id = Uuid::from_bytes(
                    key.as_ref()
                        .try_into()
                        .map_err(|_| StoreError::DeserializationError("Invalid UUID key".into()))?,
                );
                ids.push(id);
            }
        }

        Ok(ids)
    }

    /// Delete a session's metadata and all of its cells.
    pub fn delete_session(&self, session_id: Uuid) -> Result<(), StoreError> {
        let cf_sessions = self.cf(CF_SESSIONS)?;
        let cf_cells = self.cf(CF_CELLS)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(&cf_sessions, session_id.as_bytes());

        let start_key = Self::cell_key(session_id, 0, 0);
        let iter = self.db.iterator_cf(
            &cf_cells,
            IteratorMode::From(&start_key, rocksdb::Direction::Forward),
        );
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::DatabaseError(e.to_string()))?;
            if key.len() < 24 || &key[..16] != session_id.as_bytes() {
                break;
            }
            batch.delete_cf(&cf_cells, &key);
        }

        self.db.write(batch)?;
        Ok(())
    }

    /// Force a flush of memtables to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db
            .flush()
            .map_err(|e| StoreError::DatabaseError(e.to_string()))
    }

    /// Get the database path.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    // ─── Helpers ──────────────────────────────────────────────────────

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::DatabaseError(format!("Column family '{name}' not found")))
    }

    /// Build a cell key: session id (16 bytes) + x + y (4 bytes BE each).
    fn cell_key(session_id: Uuid, x: u32, y: u32) -> Vec<u8> {
        let mut key = Vec::with_capacity(24);
        key.extend_from_slice(session_id.as_bytes());
        key.extend_from_slice(&x.to_be_bytes());
        key.extend_from_slice(&y.to_be_bytes());
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warren_core::{Coord, Grid};

    fn open_temp() -> (CellStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = CellStore::open(StoreConfig::for_testing(dir.path().join("db"))).unwrap();
        (store, dir)
    }

    #[test]
    fn test_open_creates_database() {
        let (store, _dir) = open_temp();
        assert!(store.path().exists());
    }

    #[test]
    fn test_put_load_cells() {
        let (store, _dir) = open_temp();
        let session = Uuid::new_v4();

        let mut grid = Grid::new(4, 3);
        grid.cell_at_mut(Coord::new(1, 2)).unwrap().is_wall = true;

        let written = store.put_cells(session, grid.cells()).unwrap();
        assert_eq!(written, 12);

        let loaded = store.load_cells(session).unwrap();
        assert_eq!(loaded.len(), 12);
        let wall = loaded.iter().find(|c| c.x == 1 && c.y == 2).unwrap();
        assert!(wall.is_wall);
    }

    #[test]
    fn test_put_cells_upserts() {
        let (store, _dir) = open_temp();
        let session = Uuid::new_v4();

        let mut cell = warren_core::Cell::new(Coord::new(0, 0));
        store.put_cells(session, &[cell]).unwrap();

        cell.is_wall = true;
        store.put_cells(session, &[cell]).unwrap();

        let loaded = store.load_cells(session).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded[0].is_wall);
    }

    #[test]
    fn test_unknown_session_loads_empty() {
        let (store, _dir) = open_temp();
        assert!(store.load_cells(Uuid::new_v4()).unwrap().is_empty());
    }

    #[test]
    fn test_meta_roundtrip() {
        let (store, _dir) = open_temp();
        let session = Uuid::new_v4();

        assert!(!store.session_exists(session).unwrap());
        assert!(matches!(
            store.load_meta(session),
            Err(StoreError::NotFound(_))
        ));

        let meta = SessionMeta::new(session, 34, 25);
        store.save_meta(&meta).unwrap();

        assert!(store.session_exists(session).unwrap());
        let loaded = store.load_meta(session).unwrap();
        assert_eq!(loaded, meta);
    }

    #[test]
    fn test_sessions_are_isolated() {
        let (store, _dir) = open_temp();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let grid_a = Grid::new(2, 2);
        let grid_b = Grid::new(3, 1);
        store.put_cells(a, grid_a.cells()).unwrap();
        store.put_cells(b, grid_b.cells()).unwrap();

        assert_eq!(store.load_cells(a).unwrap().len(), 4);
        assert_eq!(store.load_cells(b).unwrap().len(), 3);
    }

    #[test]
    fn test_list_sessions() {
        let (store, _dir) = open_temp();
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            store.save_meta(&SessionMeta::new(*id, 8, 8)).unwrap();
        }

        let listed = store.list_sessions().unwrap();
        assert_eq!(listed.len(), 3);
        for id in &ids {
            assert!(listed.contains(id));
        }
    }

    #[test]
    fn test_delete_session() {
        let (store, _dir) = open_temp();
        let session = Uuid::new_v4();

        store.save_meta(&SessionMeta::new(session, 4, 4)).unwrap();
        store.put_cells(session, Grid::new(4, 4).cells()).unwrap();

        store.delete_session(session).unwrap();
        assert!(!store.session_exists(session).unwrap());
        assert!(store.load_cells(session).unwrap().is_empty());
    }

    #[test]
    fn test_cells_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db");
        let session = Uuid::new_v4();

        {
            let store = CellStore::open(StoreConfig::for_testing(&path)).unwrap();
            let mut grid = Grid::new(5, 5);
            grid.cell_at_mut(Coord::new(3, 3)).unwrap().is_wall = true;
            store.put_cells(session, grid.cells()).unwrap();
            store.save_meta(&SessionMeta::new(session, 5, 5)).unwrap();
            store.flush().unwrap();
        }

        let store = CellStore::open(StoreConfig::for_testing(&path)).unwrap();
        let loaded = store.load_cells(session).unwrap();
        assert_eq!(loaded.len(), 25);
        assert!(loaded.iter().any(|c| c.x == 3 && c.y == 3 && c.is_wall));
        assert_eq!(store.load_meta(session).unwrap().width, 5);
    }

    #[test]
    fn test_updated_at_bumped_by_writes() {
        let (store, _dir) = open_temp();
        let session = Uuid::new_v4();

        let mut meta = SessionMeta::new(session, 2, 2);
        meta.created_at = 100;
        meta.updated_at = 100;
        store.save_meta(&meta).unwrap();

        store.put_cells(session, Grid::new(2, 2).cells()).unwrap();
        let loaded = store.load_meta(session).unwrap();
        assert!(loaded.updated_at >= loaded.created_at);
        assert_eq!(loaded.created_at, 100);
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::NotFound(Uuid::nil());
        assert!(err.to_string().contains("not found"));

        let err = StoreError::DatabaseError("test".into());
        assert!(err.to_string().contains("Database error"));
    }
}
