//! The async run layer: one algorithm at a time, streamed over a channel.
//!
//! A run is a spawned task looping over the step contract: check the
//! cancellation flag, take the grid write lock for exactly one step, then
//! send the resulting batch. The bounded channel send is the cooperative
//! suspension point — a slow consumer back-pressures the algorithm
//! naturally. The engine never sleeps; display pacing belongs to the
//! presentation layer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use warren_core::{CellBatch, Grid};

use crate::algorithm::{AlgorithmId, EngineError, GridAlgorithm, RunOutcome, StepEvent};
use crate::generate::{RandomFill, RecursiveDivision};
use crate::pathfind::{AStar, Bfs, Dfs};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Batches buffered before the producing run awaits its consumer.
    pub batch_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_capacity: 256,
        }
    }
}

/// Generation variants exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GeneratorKind {
    RandomFill,
    RecursiveDivision { skew: f64 },
}

/// Pathfinding variants exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathfinderKind {
    Bfs,
    Dfs,
    AStar,
}

/// One in-flight run: its identity, cancellation flag and output stream.
///
/// Dropping the handle (or its batch stream) stops the run at the next
/// step boundary.
pub struct RunHandle {
    algorithm: AlgorithmId,
    cancelled: Arc<AtomicBool>,
    batches: mpsc::Receiver<CellBatch>,
    outcome: JoinHandle<RunOutcome>,
}

impl RunHandle {
    pub fn algorithm(&self) -> AlgorithmId {
        self.algorithm
    }

    /// Request cancellation; honored at the next step boundary, after
    /// which no further batches are emitted. A cancelled run leaves
    /// partial grid state behind — reset before starting another.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Next batch in emission order; `None` once the run has terminated.
    pub async fn recv_batch(&mut self) -> Option<CellBatch> {
        self.batches.recv().await
    }

    /// Await the terminal outcome, draining any batches still in flight.
    pub async fn outcome(mut self) -> RunOutcome {
        while self.batches.recv().await.is_some() {}
        self.outcome.await.unwrap_or(RunOutcome::Cancelled)
    }
}

/// Drives at most one algorithm run over a shared grid.
///
/// Starting a second run while one is active is rejected with
/// [`EngineError::RunInProgress`] rather than interleaving batches.
pub struct Engine {
    grid: Arc<RwLock<Grid>>,
    config: EngineConfig,
    active: Arc<AtomicBool>,
}

impl Engine {
    pub fn new(grid: Arc<RwLock<Grid>>) -> Self {
        Self::with_config(grid, EngineConfig::default())
    }

    pub fn with_config(grid: Arc<RwLock<Grid>>, config: EngineConfig) -> Self {
        Self {
            grid,
            config,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn grid(&self) -> Arc<RwLock<Grid>> {
        self.grid.clone()
    }

    /// Whether a run currently holds the grid.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Start a generation run.
    pub async fn start_generation(
        &self,
        kind: GeneratorKind,
        seed: u64,
    ) -> Result<RunHandle, EngineError> {
        self.claim()?;
        let algorithm: Box<dyn GridAlgorithm> = {
            let grid = self.grid.read().await;
            match kind {
                GeneratorKind::RandomFill => Box::new(RandomFill::new(&grid, seed)),
                GeneratorKind::RecursiveDivision { skew } => {
                    Box::new(RecursiveDivision::new(&grid, seed, skew))
                }
            }
        };
        Ok(self.spawn(algorithm))
    }

    /// Start a pathfinding run. Endpoint validation happens here,
    /// synchronously, before any step runs.
    pub async fn start_pathfinding(&self, kind: PathfinderKind) -> Result<RunHandle, EngineError> {
        self.claim()?;
        let algorithm: Result<Box<dyn GridAlgorithm>, EngineError> = {
            let mut grid = self.grid.write().await;
            match kind {
                PathfinderKind::Bfs => Bfs::new(&grid).map(|a| Box::new(a) as _),
                PathfinderKind::Dfs => Dfs::new(&grid).map(|a| Box::new(a) as _),
                PathfinderKind::AStar => AStar::new(&mut grid).map(|a| Box::new(a) as _),
            }
        };
        match algorithm {
            Ok(algorithm) => Ok(self.spawn(algorithm)),
            Err(e) => {
                self.active.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    fn claim(&self) -> Result<(), EngineError> {
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(EngineError::RunInProgress);
        }
        Ok(())
    }

    fn spawn(&self, mut algorithm: Box<dyn GridAlgorithm>) -> RunHandle {
        let (tx, rx) = mpsc::channel(self.config.batch_capacity);
        let cancelled = Arc::new(AtomicBool::new(false));
        let id = algorithm.id();
        let grid = self.grid.clone();
        let active = self.active.clone();
        let cancel_flag = cancelled.clone();

        let outcome = tokio::spawn(async move {
            let outcome = loop {
                if cancel_flag.load(Ordering::SeqCst) {
                    break RunOutcome::Cancelled;
                }
                let event = {
                    let mut grid = grid.write().await;
                    algorithm.step(&mut grid)
                };
                match event {
                    StepEvent::Batch(batch) => {
                        if tx.send(batch).await.is_err() {
                            // Consumer dropped the stream.
                            break RunOutcome::Cancelled;
                        }
                    }
                    StepEvent::Done(outcome) => break outcome,
                }
            };
            active.store(false, Ordering::SeqCst);
            log::debug!("{id} run finished: {outcome:?}");
            outcome
        });

        RunHandle {
            algorithm: id,
            cancelled,
            batches: rx,
            outcome,
        }
    }
}
