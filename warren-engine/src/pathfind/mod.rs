//! Pathfinding algorithms and their shared machinery.
//!
//! All three searches share the same traversal rules: 4-connected
//! orthogonal neighbors probed left, right, up, down; wall cells are never
//! enqueued. Parents are tracked in an index arena keyed by packed
//! coordinates — no string keys, no object identity. Reconstruction walks
//! the arena from the end cell back to the start (the one cell with no
//! parent), marks the route and emits it as the final batch.

pub mod astar;
pub mod bfs;
pub mod dfs;

pub use astar::AStar;
pub use bfs::Bfs;
pub use dfs::Dfs;

use warren_core::{CellBatch, Coord, Grid};

use crate::algorithm::EngineError;

/// Orthogonal neighbor offsets, probed left, right, up, down.
const NEIGHBOR_OFFSETS: [(i64, i64); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

/// In-bounds 4-connected neighbors of `coord`, in probe order.
pub(crate) fn neighbors(width: u32, height: u32, coord: Coord) -> impl Iterator<Item = Coord> {
    NEIGHBOR_OFFSETS.into_iter().filter_map(move |(dx, dy)| {
        let x = coord.x as i64 + dx;
        let y = coord.y as i64 + dy;
        if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
            None
        } else {
            Some(Coord::new(x as u32, y as u32))
        }
    })
}

/// Resolve the grid's designated endpoints, rejecting a run without both.
pub(crate) fn endpoints(grid: &Grid) -> Result<(Coord, Coord), EngineError> {
    match (grid.start(), grid.end()) {
        (Some(start), Some(end)) => Ok((start, end)),
        _ => Err(EngineError::MissingEndpoints),
    }
}

/// Membership flags as an index arena (visited/closed sets).
#[derive(Debug)]
pub(crate) struct CoordSet {
    width: u32,
    slots: Vec<bool>,
}

impl CoordSet {
    pub fn new(grid: &Grid) -> Self {
        Self {
            width: grid.width(),
            slots: vec![false; grid.width() as usize * grid.height() as usize],
        }
    }

    pub fn insert(&mut self, coord: Coord) {
        self.slots[coord.index(self.width)] = true;
    }

    pub fn contains(&self, coord: Coord) -> bool {
        self.slots[coord.index(self.width)]
    }
}

/// Parent pointers as an index arena: one slot per cell, row-major.
///
/// The start cell keeps its initial `None`, terminating reconstruction.
#[derive(Debug)]
pub(crate) struct ParentMap {
    width: u32,
    slots: Vec<Option<Coord>>,
}

impl ParentMap {
    pub fn new(grid: &Grid) -> Self {
        Self {
            width: grid.width(),
            slots: vec![None; grid.width() as usize * grid.height() as usize],
        }
    }

    pub fn set(&mut self, child: Coord, parent: Coord) {
        self.slots[child.index(self.width)] = Some(parent);
    }

    pub fn get(&self, child: Coord) -> Option<Coord> {
        self.slots[child.index(self.width)]
    }
}

/// Walk the parent chain from `end` back to the start cell, marking each
/// route cell's `is_path` flag.
///
/// Returns the final batch (in end-to-start walk order) and the route in
/// start-to-end order.
pub(crate) fn reconstruct(
    grid: &mut Grid,
    parents: &ParentMap,
    end: Coord,
) -> (CellBatch, Vec<Coord>) {
    let mut cells = Vec::new();
    let mut route = Vec::new();
    let mut cursor = Some(end);
    while let Some(coord) = cursor {
        let cell = grid
            .cell_at_mut(coord)
            .expect("reconstructed route stays inside the grid");
        cell.is_path = true;
        cells.push(*cell);
        route.push(coord);
        cursor = parents.get(coord);
    }
    route.reverse();
    (CellBatch::new(cells), route)
}
