//! Durable cell store for grid sessions.
//!
//! The sync layer treats this as a plain keyed map: one value per
//! `(session, x, y)`, used only to seed a session on cold start and to
//! durably record edits. There is no transactional coupling to the
//! protocol — a lost write is repaired by the next edit to that cell.
//!
//! ```text
//! ┌─────────────┐   put_cells     ┌──────────────┐
//! │ GridServer  │ ──────────────► │ CellStore    │
//! │ (in-memory) │                 │ (RocksDB)    │
//! └──────┬──────┘                 └──────┬───────┘
//!        │ on first join                 │ column families
//!        ▼                               ▼
//! ┌─────────────┐     ┌─────────────────────────────────────┐
//! │ Grid        │     │ CF "cells"    — session‖x‖y → Cell   │
//! │ (seeded)    │     │ CF "sessions" — session metadata     │
//! └─────────────┘     └─────────────────────────────────────┘
//! ```

pub mod rocks;

pub use rocks::{CellStore, SessionMeta, StoreConfig, StoreError};
