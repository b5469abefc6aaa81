//! The fixed-extent rectangular grid and its operations.

use serde::{Deserialize, Serialize};

use crate::cell::{Cell, CellBatch, Coord};

/// Grid access errors.
///
/// Out-of-bounds access is a programming error in local code paths and
/// fails the calling operation without touching grid state. Remote input
/// never reaches these: [`Grid::apply_batch`] filters it at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridError {
    /// Coordinate beyond the grid extent.
    OutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
}

impl std::fmt::Display for GridError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GridError::OutOfBounds {
                x,
                y,
                width,
                height,
            } => write!(f, "coordinate ({x},{y}) outside {width}x{height} grid"),
        }
    }
}

impl std::error::Error for GridError {}

/// Rectangular cell grid, fixed `width x height` for its lifetime.
///
/// Created with all cells open and unflagged. The hub session owns the
/// authoritative copy; client replicas mirror it best-effort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    width: u32,
    height: u32,
    cells: Vec<Cell>,
}

impl Grid {
    /// Create a grid of default open cells.
    pub fn new(width: u32, height: u32) -> Self {
        debug_assert!(width > 0 && height > 0, "grid extent must be non-zero");
        let mut cells = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                cells.push(Cell::new(Coord::new(x, y)));
            }
        }
        Self {
            width,
            height,
            cells,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn contains(&self, coord: Coord) -> bool {
        coord.x < self.width && coord.y < self.height
    }

    fn index_of(&self, x: u32, y: u32) -> Result<usize, GridError> {
        if x >= self.width || y >= self.height {
            return Err(GridError::OutOfBounds {
                x,
                y,
                width: self.width,
                height: self.height,
            });
        }
        Ok(Coord::new(x, y).index(self.width))
    }

    pub fn cell(&self, x: u32, y: u32) -> Result<&Cell, GridError> {
        let idx = self.index_of(x, y)?;
        Ok(&self.cells[idx])
    }

    pub fn cell_at(&self, coord: Coord) -> Result<&Cell, GridError> {
        self.cell(coord.x, coord.y)
    }

    pub fn cell_at_mut(&mut self, coord: Coord) -> Result<&mut Cell, GridError> {
        let idx = self.index_of(coord.x, coord.y)?;
        Ok(&mut self.cells[idx])
    }

    /// Replace the cell at the snapshot's own coordinate, returning the
    /// previous value.
    pub fn set_cell(&mut self, cell: Cell) -> Result<Cell, GridError> {
        let idx = self.index_of(cell.x, cell.y)?;
        let previous = self.cells[idx];
        self.cells[idx] = cell;
        Ok(previous)
    }

    /// All cells in row-major order.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Lazy row-major traversal of cells matching `predicate`.
    ///
    /// Restartable: each call starts a fresh pass.
    pub fn cells_matching<'a, P>(&'a self, predicate: P) -> impl Iterator<Item = &'a Cell>
    where
        P: Fn(&Cell) -> bool + 'a,
    {
        self.cells.iter().filter(move |cell| predicate(cell))
    }

    /// The unique start cell's coordinate, if one is set.
    pub fn start(&self) -> Option<Coord> {
        self.cells_matching(|c| c.is_start).next().map(Cell::coord)
    }

    /// The unique end cell's coordinate, if one is set.
    pub fn end(&self) -> Option<Coord> {
        self.cells_matching(|c| c.is_end).next().map(Cell::coord)
    }

    /// Clear transient run state across the grid.
    ///
    /// For every cell with `is_path || is_wall || is_visited` set:
    /// `is_path`/`is_visited` and the A* costs are always cleared,
    /// `is_wall` only when `clear_walls` is true. Returns exactly the
    /// cells that changed so callers broadcast real diffs only.
    pub fn reset_transient(&mut self, clear_walls: bool) -> Vec<Cell> {
        let mut changed = Vec::new();
        for cell in &mut self.cells {
            if !(cell.is_path || cell.is_wall || cell.is_visited) {
                continue;
            }
            let before = *cell;
            cell.clear_run_state();
            if clear_walls {
                cell.is_wall = false;
            }
            if *cell != before {
                changed.push(*cell);
            }
        }
        changed
    }

    /// Idempotent coordinate-keyed upsert of remote cell snapshots.
    ///
    /// Applies the endpoint invariant locally: an incoming start/end cell
    /// has its wall flag cleared. Cells beyond the extent are skipped with
    /// a warning — wire input must never corrupt local state. Returns the
    /// cells as actually written.
    pub fn apply_batch(&mut self, batch: &CellBatch) -> Vec<Cell> {
        let mut applied = Vec::with_capacity(batch.len());
        for cell in batch.iter() {
            let idx = match self.index_of(cell.x, cell.y) {
                Ok(idx) => idx,
                Err(e) => {
                    log::warn!("dropping out-of-extent cell in batch: {e}");
                    continue;
                }
            };
            let mut incoming = *cell;
            if incoming.is_start || incoming.is_end {
                incoming.is_wall = false;
            }
            self.cells[idx] = incoming;
            applied.push(incoming);
        }
        applied
    }

    /// The full grid as one batch, for snapshot service.
    pub fn snapshot_batch(&self) -> CellBatch {
        CellBatch::new(self.cells.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_grid_all_open() {
        let grid = Grid::new(4, 3);
        assert_eq!(grid.width(), 4);
        assert_eq!(grid.height(), 3);
        assert_eq!(grid.cells().len(), 12);
        assert!(grid.cells().iter().all(|c| !c.is_wall && !c.is_visited));
        assert_eq!(grid.cell(3, 2).unwrap().coord(), Coord::new(3, 2));
    }

    #[test]
    fn test_out_of_bounds_access() {
        let grid = Grid::new(4, 3);
        let err = grid.cell(4, 0).unwrap_err();
        assert_eq!(
            err,
            GridError::OutOfBounds {
                x: 4,
                y: 0,
                width: 4,
                height: 3
            }
        );
        assert!(grid.cell(0, 3).is_err());
        assert!(grid.cell(0, 2).is_ok());
    }

    #[test]
    fn test_set_cell_returns_previous() {
        let mut grid = Grid::new(4, 3);
        let mut wall = Cell::new(Coord::new(1, 1));
        wall.is_wall = true;

        let previous = grid.set_cell(wall).unwrap();
        assert!(!previous.is_wall);
        assert!(grid.cell(1, 1).unwrap().is_wall);

        let mut oob = Cell::new(Coord::new(9, 9));
        oob.is_wall = true;
        assert!(grid.set_cell(oob).is_err());
    }

    #[test]
    fn test_cells_matching_is_restartable() {
        let mut grid = Grid::new(3, 3);
        for x in 0..3 {
            grid.cell_at_mut(Coord::new(x, 1)).unwrap().is_wall = true;
        }

        let first: Vec<Coord> = grid.cells_matching(|c| c.is_wall).map(Cell::coord).collect();
        let second: Vec<Coord> = grid.cells_matching(|c| c.is_wall).map(Cell::coord).collect();
        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
        // Row-major order.
        assert_eq!(first, vec![Coord::new(0, 1), Coord::new(1, 1), Coord::new(2, 1)]);
    }

    #[test]
    fn test_reset_transient_keeps_walls() {
        let mut grid = Grid::new(3, 3);
        grid.cell_at_mut(Coord::new(0, 0)).unwrap().is_wall = true;
        let visited = grid.cell_at_mut(Coord::new(1, 0)).unwrap();
        visited.is_visited = true;
        visited.g_cost = 3;
        grid.cell_at_mut(Coord::new(2, 0)).unwrap().is_path = true;

        let changed = grid.reset_transient(false);

        // The wall-only cell did not change and is not reported.
        assert_eq!(changed.len(), 2);
        assert!(changed.iter().all(|c| c.y == 0 && (c.x == 1 || c.x == 2)));
        assert!(grid.cell(0, 0).unwrap().is_wall);
        assert!(!grid.cell(1, 0).unwrap().is_visited);
        assert_eq!(grid.cell(1, 0).unwrap().g_cost, 0);
        assert!(!grid.cell(2, 0).unwrap().is_path);
    }

    #[test]
    fn test_reset_transient_clearing_walls() {
        let mut grid = Grid::new(3, 3);
        grid.cell_at_mut(Coord::new(0, 0)).unwrap().is_wall = true;
        grid.cell_at_mut(Coord::new(1, 1)).unwrap().is_visited = true;

        let changed = grid.reset_transient(true);

        assert_eq!(changed.len(), 2);
        assert!(!grid.cell(0, 0).unwrap().is_wall);
        assert!(!grid.cell(1, 1).unwrap().is_visited);

        // Second reset finds nothing left to change.
        assert!(grid.reset_transient(true).is_empty());
    }

    #[test]
    fn test_apply_batch_is_idempotent() {
        let mut grid = Grid::new(3, 3);
        let mut wall = Cell::new(Coord::new(2, 2));
        wall.is_wall = true;
        let batch = CellBatch::new(vec![wall]);

        grid.apply_batch(&batch);
        let once = grid.clone();
        grid.apply_batch(&batch);

        assert_eq!(grid, once);
        assert!(grid.cell(2, 2).unwrap().is_wall);
    }

    #[test]
    fn test_apply_batch_skips_out_of_extent() {
        let mut grid = Grid::new(3, 3);
        let mut inside = Cell::new(Coord::new(0, 0));
        inside.is_wall = true;
        let outside = Cell::new(Coord::new(7, 7));

        let applied = grid.apply_batch(&CellBatch::new(vec![inside, outside]));
        assert_eq!(applied.len(), 1);
        assert!(grid.cell(0, 0).unwrap().is_wall);
    }

    #[test]
    fn test_apply_batch_clears_wall_on_endpoints() {
        let mut grid = Grid::new(3, 3);
        let mut start = Cell::new(Coord::new(1, 1));
        start.is_start = true;
        start.is_wall = true; // conflicting snapshot from a remote sender

        grid.apply_batch(&CellBatch::new(vec![start]));
        let cell = grid.cell(1, 1).unwrap();
        assert!(cell.is_start);
        assert!(!cell.is_wall);
    }

    #[test]
    fn test_start_end_scan() {
        let mut grid = Grid::new(4, 4);
        assert_eq!(grid.start(), None);
        assert_eq!(grid.end(), None);

        grid.cell_at_mut(Coord::new(0, 0)).unwrap().is_start = true;
        grid.cell_at_mut(Coord::new(3, 3)).unwrap().is_end = true;
        assert_eq!(grid.start(), Some(Coord::new(0, 0)));
        assert_eq!(grid.end(), Some(Coord::new(3, 3)));
    }

    #[test]
    fn test_snapshot_batch_covers_grid() {
        let grid = Grid::new(5, 2);
        let snapshot = grid.snapshot_batch();
        assert_eq!(snapshot.len(), 10);
        assert_eq!(snapshot.cells()[0].coord(), Coord::new(0, 0));
        assert_eq!(snapshot.cells()[9].coord(), Coord::new(4, 1));
    }
}
