//! Uniform-random wall placement.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use warren_core::{CellBatch, Coord, Grid};

use crate::algorithm::{AlgorithmId, GridAlgorithm, RunOutcome, StepEvent};
use crate::generate::clear_endpoints;

/// Probability that any given cell becomes a wall.
pub const WALL_PROBABILITY: f64 = 0.3;

enum Phase {
    Rows,
    Finalize,
    Done,
}

/// Marks each cell a wall with fixed probability in a single row-major
/// pass.
///
/// Batch policy: one coalesced batch per row that produced at least one
/// wall — deterministic for a fixed seed, and rows that placed nothing emit
/// nothing. The final step force-opens the designated start/end cells.
///
/// No connectivity check is made or implied: the result may strand the end
/// cell from the start.
pub struct RandomFill {
    rng: ChaCha8Rng,
    probability: f64,
    start: Option<Coord>,
    end: Option<Coord>,
    row: u32,
    phase: Phase,
}

impl RandomFill {
    /// Seeded generator honoring the grid's designated endpoints.
    pub fn new(grid: &Grid, seed: u64) -> Self {
        Self::with_probability(grid, seed, WALL_PROBABILITY)
    }

    pub fn with_probability(grid: &Grid, seed: u64, probability: f64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            probability,
            start: grid.start(),
            end: grid.end(),
            row: 0,
            phase: Phase::Rows,
        }
    }
}

impl GridAlgorithm for RandomFill {
    fn id(&self) -> AlgorithmId {
        AlgorithmId::RandomFill
    }

    fn step(&mut self, grid: &mut Grid) -> StepEvent {
        loop {
            match self.phase {
                Phase::Rows => {
                    if self.row >= grid.height() {
                        self.phase = Phase::Finalize;
                        continue;
                    }
                    let y = self.row;
                    self.row += 1;

                    let mut walls = Vec::new();
                    for x in 0..grid.width() {
                        if self.rng.gen::<f64>() < self.probability {
                            let cell = grid
                                .cell_at_mut(Coord::new(x, y))
                                .expect("row scan stays inside the grid");
                            cell.is_wall = true;
                            walls.push(*cell);
                        }
                    }
                    if !walls.is_empty() {
                        return StepEvent::Batch(CellBatch::new(walls));
                    }
                    // Row placed no walls; keep scanning.
                }
                Phase::Finalize => {
                    self.phase = Phase::Done;
                    let cleared = clear_endpoints(grid, [self.start, self.end]);
                    if !cleared.is_empty() {
                        return StepEvent::Batch(CellBatch::new(cleared));
                    }
                }
                Phase::Done => return StepEvent::Done(RunOutcome::Generated),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::drive;

    #[test]
    fn test_same_seed_same_maze() {
        let mut a = Grid::new(10, 8);
        let mut b = Grid::new(10, 8);

        let mut alg_a = RandomFill::new(&a, 7);
        let mut alg_b = RandomFill::new(&b, 7);
        let (batches_a, outcome_a) = drive(&mut alg_a, &mut a);
        let (batches_b, outcome_b) = drive(&mut alg_b, &mut b);

        assert_eq!(outcome_a, RunOutcome::Generated);
        assert_eq!(outcome_b, RunOutcome::Generated);
        assert_eq!(batches_a, batches_b);
        assert_eq!(a, b);
    }

    #[test]
    fn test_probability_one_walls_everything() {
        let mut grid = Grid::new(6, 4);
        let mut alg = RandomFill::with_probability(&grid, 1, 1.5);
        let (batches, outcome) = drive(&mut alg, &mut grid);

        assert_eq!(outcome, RunOutcome::Generated);
        // One batch per row, each covering the full row.
        assert_eq!(batches.len(), 4);
        assert!(batches.iter().all(|b| b.len() == 6));
        assert!(grid.cells().iter().all(|c| c.is_wall));
    }

    #[test]
    fn test_probability_zero_emits_nothing() {
        let mut grid = Grid::new(6, 4);
        let mut alg = RandomFill::with_probability(&grid, 1, 0.0);
        let (batches, outcome) = drive(&mut alg, &mut grid);

        assert_eq!(outcome, RunOutcome::Generated);
        assert!(batches.is_empty());
        assert!(grid.cells().iter().all(|c| !c.is_wall));
    }

    #[test]
    fn test_endpoints_forced_open() {
        let mut grid = Grid::new(6, 6);
        grid.cell_at_mut(Coord::new(0, 0)).unwrap().is_start = true;
        grid.cell_at_mut(Coord::new(5, 5)).unwrap().is_end = true;

        let mut alg = RandomFill::with_probability(&grid, 3, 1.5);
        let (batches, _) = drive(&mut alg, &mut grid);

        assert!(!grid.cell(0, 0).unwrap().is_wall);
        assert!(!grid.cell(5, 5).unwrap().is_wall);
        // The corrective batch is the final one and carries both endpoints.
        let last = batches.last().unwrap();
        assert_eq!(last.len(), 2);
        assert!(last.iter().all(|c| !c.is_wall));
    }
}
