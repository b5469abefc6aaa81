//! The cooperative step contract shared by generators and pathfinders.

use warren_core::{CellBatch, Coord, Grid};

/// Identifies one algorithm variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgorithmId {
    RandomFill,
    RecursiveDivision,
    Bfs,
    Dfs,
    AStar,
}

impl AlgorithmId {
    pub fn as_str(self) -> &'static str {
        match self {
            AlgorithmId::RandomFill => "random-fill",
            AlgorithmId::RecursiveDivision => "recursive-division",
            AlgorithmId::Bfs => "bfs",
            AlgorithmId::Dfs => "dfs",
            AlgorithmId::AStar => "a-star",
        }
    }
}

impl std::fmt::Display for AlgorithmId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Generation finished; the grid holds the new maze.
    Generated,
    /// A route exists; coordinates run start to end.
    PathFound(Vec<Coord>),
    /// The frontier emptied before the end cell was reached. This is an
    /// expected outcome, not a failure.
    NoPath,
    /// The run stopped at a step boundary before completing. Grid state is
    /// partial; callers should reset before starting another run.
    Cancelled,
}

/// One cooperative step of an algorithm.
#[derive(Debug, Clone, PartialEq)]
pub enum StepEvent {
    /// A consistent snapshot of the cells this step changed.
    Batch(CellBatch),
    /// The run is complete; no further batches follow.
    Done(RunOutcome),
}

/// A maze generator or pathfinder, advanced one suspension-point step at a
/// time.
///
/// Each `step` performs one unit of work (one row decided, one division
/// line, one frontier pop) and either emits the cells it touched or reports
/// the terminal outcome. Mutation never spans a step boundary, so every
/// emitted batch reflects a consistent grid. Sequences are lazy, ordered,
/// finite and not restartable; calling `step` after `Done` yields `Done`
/// again.
pub trait GridAlgorithm: Send {
    fn id(&self) -> AlgorithmId;
    fn step(&mut self, grid: &mut Grid) -> StepEvent;
}

/// Engine-level failures. Absence of a path is not one of these — it is
/// reported as [`RunOutcome::NoPath`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    /// Pathfinding requested without both a start and an end cell set.
    MissingEndpoints,
    /// Another run is already active on this grid.
    RunInProgress,
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::MissingEndpoints => {
                write!(f, "start and end cells must be set before pathfinding")
            }
            EngineError::RunInProgress => write!(f, "a run is already active on this grid"),
        }
    }
}

impl std::error::Error for EngineError {}
