//! Breadth-first search.

use std::collections::VecDeque;

use warren_core::{CellBatch, Coord, Grid};

use crate::algorithm::{AlgorithmId, EngineError, GridAlgorithm, RunOutcome, StepEvent};
use crate::pathfind::{endpoints, neighbors, reconstruct, CoordSet, ParentMap};

/// FIFO-frontier search.
///
/// Explores in non-decreasing distance order, so the moment the end cell is
/// popped the reconstructed route is a shortest path in unweighted terms.
/// Cells are marked visited when discovered, never enqueued twice.
#[derive(Debug)]
pub struct Bfs {
    end: Coord,
    queue: VecDeque<Coord>,
    visited: CoordSet,
    parents: ParentMap,
    finished: Option<RunOutcome>,
}

impl Bfs {
    /// Fails with `MissingEndpoints` unless both endpoints are designated.
    pub fn new(grid: &Grid) -> Result<Self, EngineError> {
        let (start, end) = endpoints(grid)?;
        let mut visited = CoordSet::new(grid);
        visited.insert(start);
        let mut queue = VecDeque::new();
        queue.push_back(start);
        Ok(Self {
            end,
            queue,
            visited,
            parents: ParentMap::new(grid),
            finished: None,
        })
    }
}

impl GridAlgorithm for Bfs {
    fn id(&self) -> AlgorithmId {
        AlgorithmId::Bfs
    }

    fn step(&mut self, grid: &mut Grid) -> StepEvent {
        if let Some(outcome) = &self.finished {
            return StepEvent::Done(outcome.clone());
        }
        let Some(current) = self.queue.pop_front() else {
            self.finished = Some(RunOutcome::NoPath);
            return StepEvent::Done(RunOutcome::NoPath);
        };

        let snapshot = {
            let cell = grid
                .cell_at_mut(current)
                .expect("frontier cells stay inside the grid");
            cell.is_visited = true;
            *cell
        };

        if current == self.end {
            let (batch, route) = reconstruct(grid, &self.parents, self.end);
            self.finished = Some(RunOutcome::PathFound(route));
            return StepEvent::Batch(batch);
        }

        let mut batch = vec![snapshot];
        for neighbor in neighbors(grid.width(), grid.height(), current) {
            if self.visited.contains(neighbor) {
                continue;
            }
            let cell = *grid
                .cell_at(neighbor)
                .expect("neighbors are pre-clipped to the grid");
            if cell.is_wall {
                continue;
            }
            self.visited.insert(neighbor);
            self.parents.set(neighbor, current);
            self.queue.push_back(neighbor);
            batch.push(cell);
        }
        StepEvent::Batch(CellBatch::new(batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{drive, mark_endpoints, route_of};
    use warren_core::Cell;

    #[test]
    fn test_open_grid_shortest_path() {
        // 4x4 open grid, corner to corner: Manhattan-optimal 7 cells.
        let mut grid = Grid::new(4, 4);
        mark_endpoints(&mut grid, Coord::new(0, 0), Coord::new(3, 3));

        let mut bfs = Bfs::new(&grid).unwrap();
        let (batches, outcome) = drive(&mut bfs, &mut grid);

        let route = route_of(&outcome);
        assert_eq!(route.len(), 7);
        assert_eq!(route[0], Coord::new(0, 0));
        assert_eq!(route[6], Coord::new(3, 3));
        // A shortest route is a monotone staircase: every hop moves right
        // or down.
        for pair in route.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            assert!(
                (b.x == a.x + 1 && b.y == a.y) || (b.y == a.y + 1 && b.x == a.x),
                "non-monotone hop {a} -> {b}"
            );
        }
        // Exactly the route cells carry the path flag.
        let flagged: Vec<Coord> = grid
            .cells_matching(|c| c.is_path)
            .map(Cell::coord)
            .collect();
        assert_eq!(flagged.len(), 7);
        assert!(route.iter().all(|c| flagged.contains(c)));
        // The final batch is the reconstructed route.
        assert_eq!(batches.last().unwrap().len(), 7);
    }

    #[test]
    fn test_blocking_row_reports_no_path() {
        let mut grid = Grid::new(3, 3);
        for x in 0..3 {
            grid.cell_at_mut(Coord::new(x, 1)).unwrap().is_wall = true;
        }
        mark_endpoints(&mut grid, Coord::new(0, 0), Coord::new(2, 2));

        let mut bfs = Bfs::new(&grid).unwrap();
        let (_, outcome) = drive(&mut bfs, &mut grid);
        assert_eq!(outcome, RunOutcome::NoPath);
        assert!(grid.cells_matching(|c| c.is_path).next().is_none());
    }

    #[test]
    fn test_missing_endpoints_rejected() {
        let grid = Grid::new(3, 3);
        assert_eq!(Bfs::new(&grid).unwrap_err(), EngineError::MissingEndpoints);
    }

    #[test]
    fn test_walls_never_expanded() {
        let mut grid = Grid::new(3, 3);
        grid.cell_at_mut(Coord::new(1, 1)).unwrap().is_wall = true;
        mark_endpoints(&mut grid, Coord::new(0, 0), Coord::new(2, 2));

        let mut bfs = Bfs::new(&grid).unwrap();
        drive(&mut bfs, &mut grid);
        assert!(!grid.cell(1, 1).unwrap().is_visited);
    }

    #[test]
    fn test_batches_carry_pop_plus_discoveries() {
        let mut grid = Grid::new(3, 1);
        mark_endpoints(&mut grid, Coord::new(0, 0), Coord::new(2, 0));

        let mut bfs = Bfs::new(&grid).unwrap();
        let (batches, _) = drive(&mut bfs, &mut grid);

        // First pop: start plus its single discoverable neighbor.
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[0].cells()[0].coord(), Coord::new(0, 0));
        assert!(batches[0].cells()[0].is_visited);
    }

    #[test]
    fn test_step_after_done_stays_done() {
        let mut grid = Grid::new(2, 1);
        mark_endpoints(&mut grid, Coord::new(0, 0), Coord::new(1, 0));

        let mut bfs = Bfs::new(&grid).unwrap();
        let (_, outcome) = drive(&mut bfs, &mut grid);
        assert!(matches!(outcome, RunOutcome::PathFound(_)));
        assert!(matches!(
            bfs.step(&mut grid),
            StepEvent::Done(RunOutcome::PathFound(_))
        ));
    }
}
