//! Depth-first search.

use warren_core::{CellBatch, Coord, Grid};

use crate::algorithm::{AlgorithmId, EngineError, GridAlgorithm, RunOutcome, StepEvent};
use crate::pathfind::{endpoints, neighbors, reconstruct, CoordSet, ParentMap};

/// LIFO-stack search.
///
/// Duplicates may exist on the stack; a cell already visited is skipped at
/// pop time. Finds *a* route if one exists, with no length guarantee — it
/// reports `NoPath` only on grids where BFS and A* do too.
#[derive(Debug)]
pub struct Dfs {
    end: Coord,
    stack: Vec<Coord>,
    visited: CoordSet,
    parents: ParentMap,
    finished: Option<RunOutcome>,
}

impl Dfs {
    /// Fails with `MissingEndpoints` unless both endpoints are designated.
    pub fn new(grid: &Grid) -> Result<Self, EngineError> {
        let (start, end) = endpoints(grid)?;
        Ok(Self {
            end,
            stack: vec![start],
            visited: CoordSet::new(grid),
            parents: ParentMap::new(grid),
            finished: None,
        })
    }
}

impl GridAlgorithm for Dfs {
    fn id(&self) -> AlgorithmId {
        AlgorithmId::Dfs
    }

    fn step(&mut self, grid: &mut Grid) -> StepEvent {
        if let Some(outcome) = &self.finished {
            return StepEvent::Done(outcome.clone());
        }
        loop {
            let Some(current) = self.stack.pop() else {
                self.finished = Some(RunOutcome::NoPath);
                return StepEvent::Done(RunOutcome::NoPath);
            };
            if self.visited.contains(current) {
                continue; // stale duplicate left on the stack
            }
            self.visited.insert(current);

            let snapshot = {
                let cell = grid
                    .cell_at_mut(current)
                    .expect("stack cells stay inside the grid");
                cell.is_visited = true;
                *cell
            };

            if current == self.end {
                let (batch, route) = reconstruct(grid, &self.parents, self.end);
                self.finished = Some(RunOutcome::PathFound(route));
                return StepEvent::Batch(batch);
            }

            for neighbor in neighbors(grid.width(), grid.height(), current) {
                if self.visited.contains(neighbor) {
                    continue;
                }
                let cell = grid
                    .cell_at(neighbor)
                    .expect("neighbors are pre-clipped to the grid");
                if cell.is_wall {
                    continue;
                }
                // Later pushes win the parent slot; the cell is unvisited,
                // so no established route is disturbed.
                self.parents.set(neighbor, current);
                self.stack.push(neighbor);
            }
            return StepEvent::Batch(CellBatch::single(snapshot));
        }
    }
}
