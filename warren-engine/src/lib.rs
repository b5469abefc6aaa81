//! # warren-engine — maze generation and pathfinding runs
//!
//! Incremental, cancellable algorithms over a [`warren_core::Grid`],
//! structured as cooperative step machines and driven by an async run
//! layer.
//!
//! ## Architecture
//!
//! ```text
//! Engine::start_*()
//!       │  (single active run per grid; overlap rejected)
//!       ▼
//! spawned task ── step() ── Grid (write lock, one step at a time)
//!       │
//!       ▼  bounded mpsc (back-pressure + cancellation boundary)
//! RunHandle ── CellBatch stream ── local replica + hub broadcast
//!       │
//!       ▼
//! RunOutcome (Generated | PathFound | NoPath | Cancelled)
//! ```
//!
//! ## Modules
//!
//! - [`algorithm`] — the step contract ([`GridAlgorithm`], [`StepEvent`],
//!   [`RunOutcome`]) and [`EngineError`]
//! - [`generate`] — uniform-random walls and recursive division
//! - [`pathfind`] — BFS, DFS and A* with shared neighbor/parent machinery
//! - [`run`] — [`Engine`] and [`RunHandle`]

pub mod algorithm;
pub mod generate;
pub mod pathfind;
pub mod run;

pub use algorithm::{AlgorithmId, EngineError, GridAlgorithm, RunOutcome, StepEvent};
pub use generate::{
    RandomFill, RecursiveDivision, BALANCED_SKEW, HORIZONTAL_SKEW, VERTICAL_SKEW, WALL_PROBABILITY,
};
pub use pathfind::{AStar, Bfs, Dfs};
pub use run::{Engine, EngineConfig, GeneratorKind, PathfinderKind, RunHandle};
