//! # warren-core — grid model for the collaborative maze engine
//!
//! The canonical 2-D cell grid and the operations every other layer builds
//! on. The authoritative copy of a [`Grid`] lives in the hub's server-side
//! session; clients hold best-effort replicas that mutate only through
//! received [`CellBatch`]es or local edits.
//!
//! ## Modules
//!
//! - [`cell`] — [`Coord`], [`Cell`] and [`CellBatch`] (the unit of
//!   transmission in the sync protocol)
//! - [`grid`] — [`Grid`], its access/reset/upsert operations and
//!   [`GridError`]

pub mod cell;
pub mod grid;

pub use cell::{Cell, CellBatch, Coord};
pub use grid::{Grid, GridError};
