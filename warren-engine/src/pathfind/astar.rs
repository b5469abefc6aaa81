//! A* search with the Manhattan heuristic.

use warren_core::{CellBatch, Coord, Grid};

use crate::algorithm::{AlgorithmId, EngineError, GridAlgorithm, RunOutcome, StepEvent};
use crate::pathfind::{endpoints, neighbors, reconstruct, CoordSet, ParentMap};

/// Best-first search ordered by `f = g + h`.
///
/// `h` is the Manhattan distance to the end cell — admissible on a
/// 4-connected unit-cost grid, so the first expansion of the end cell is
/// optimal. Costs are written into the cells' `g/h/f` fields as the run
/// progresses.
///
/// Tie-break: among equal `f_cost` entries the first minimum found by
/// linear scan in insertion order wins. This is observable — it selects
/// which of several equal-length routes gets reported.
#[derive(Debug)]
pub struct AStar {
    end: Coord,
    /// Open list in insertion order; minimum extracted by linear scan.
    open: Vec<Coord>,
    closed: CoordSet,
    parents: ParentMap,
    finished: Option<RunOutcome>,
}

impl AStar {
    /// Fails with `MissingEndpoints` unless both endpoints are designated.
    ///
    /// Seeds the start cell's costs, which is why the grid is borrowed
    /// mutably.
    pub fn new(grid: &mut Grid) -> Result<Self, EngineError> {
        let (start, end) = endpoints(grid)?;
        let h = start.manhattan(end);
        let cell = grid
            .cell_at_mut(start)
            .expect("designated endpoints lie inside the grid");
        cell.g_cost = 0;
        cell.h_cost = h;
        cell.f_cost = h;
        Ok(Self {
            end,
            open: vec![start],
            closed: CoordSet::new(grid),
            parents: ParentMap::new(grid),
            finished: None,
        })
    }

    fn pop_lowest_f(&mut self, grid: &Grid) -> Coord {
        let mut best = 0;
        let mut best_f = grid
            .cell_at(self.open[0])
            .expect("open list stays inside the grid")
            .f_cost;
        for (i, &coord) in self.open.iter().enumerate().skip(1) {
            let f = grid
                .cell_at(coord)
                .expect("open list stays inside the grid")
                .f_cost;
            if f < best_f {
                best = i;
                best_f = f;
            }
        }
        // Plain remove keeps insertion order, preserving the tie-break.
        self.open.remove(best)
    }
}

impl GridAlgorithm for AStar {
    fn id(&self) -> AlgorithmId {
        AlgorithmId::AStar
    }

    fn step(&mut self, grid: &mut Grid) -> StepEvent {
        if let Some(outcome) = &self.finished {
            return StepEvent::Done(outcome.clone());
        }
        if self.open.is_empty() {
            self.finished = Some(RunOutcome::NoPath);
            return StepEvent::Done(RunOutcome::NoPath);
        }

        let current = self.pop_lowest_f(grid);
        self.closed.insert(current);
        let snapshot = {
            let cell = grid
                .cell_at_mut(current)
                .expect("open list stays inside the grid");
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
            if self.closed.contains(neighbor) {
                continue;
            }
            let known = *grid
                .cell_at(neighbor)
                .expect("neighbors are pre-clipped to the grid");
            if known.is_wall {
                continue;
            }
            let tentative_g = snapshot.g_cost + 1;
            let in_open = self.open.contains(&neighbor);
            if !in_open || tentative_g < known.g_cost {
                let cell = grid
                    .cell_at_mut(neighbor)
                    .expect("neighbors are pre-clipped to the grid");
                cell.g_cost = tentative_g;
                cell.h_cost = neighbor.manhattan(self.end);
                cell.f_cost = cell.g_cost + cell.h_cost;
                self.parents.set(neighbor, current);
                if !in_open {
                    self.open.push(neighbor);
                }
                batch.push(*cell);
            }
        }
        StepEvent::Batch(CellBatch::new(batch))
    }
}
