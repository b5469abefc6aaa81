//! Client-side grid replica.
//!
//! A best-effort mirror of the authoritative grid. It mutates only in
//! response to received batches or the local edit operations below — never
//! speculatively — and it owns the endpoint bookkeeping: at most one start
//! and one end cell, neither ever a wall.
//!
//! The grid is held behind a shared lock so a local algorithm run (which
//! mutates the same grid step by step) can borrow it.

use std::sync::Arc;

use tokio::sync::RwLock;
use warren_core::{Cell, CellBatch, Coord, Grid, GridError};

/// Local edit operations a user can perform on a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellEdit {
    /// Flip the wall flag. A no-op on start/end cells, which are never
    /// walls.
    ToggleWall,
    /// Make this cell the start, demoting any previous start cell.
    SetStart,
    /// Make this cell the end, demoting any previous end cell.
    SetEnd,
}

/// The client's mirror of a session grid.
pub struct GridReplica {
    grid: Arc<RwLock<Grid>>,
    start: Option<Coord>,
    end: Option<Coord>,
}

impl GridReplica {
    /// Fresh replica at the extent announced by the hub's welcome.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            grid: Arc::new(RwLock::new(Grid::new(width, height))),
            start: None,
            end: None,
        }
    }

    /// Shared handle to the underlying grid (for engines and rendering).
    pub fn grid(&self) -> Arc<RwLock<Grid>> {
        self.grid.clone()
    }

    pub fn start(&self) -> Option<Coord> {
        self.start
    }

    pub fn end(&self) -> Option<Coord> {
        self.end
    }

    /// Apply one local edit.
    ///
    /// Returns the cells actually changed, in application order — exactly
    /// what the caller broadcasts. Assigning an endpoint also clears the
    /// grid's transient run state, so a stale route never survives an
    /// endpoint move; those cleared cells ride along in the same batch.
    pub async fn edit(&mut self, coord: Coord, edit: CellEdit) -> Result<Vec<Cell>, GridError> {
        let mut grid = self.grid.write().await;
        let mut changed = Vec::new();

        match edit {
            CellEdit::ToggleWall => {
                let cell = grid.cell_at_mut(coord)?;
                if cell.is_start || cell.is_end {
                    return Ok(changed);
                }
                cell.is_wall = !cell.is_wall;
                changed.push(*cell);
            }
            CellEdit::SetStart => {
                grid.cell_at(coord)?; // validate before demoting anything
                if let Some(prev) = self.start.take() {
                    if prev != coord {
                        if let Ok(cell) = grid.cell_at_mut(prev) {
                            cell.is_start = false;
                            changed.push(*cell);
                        }
                    }
                }
                let cell = grid
                    .cell_at_mut(coord)
                    .expect("coordinate validated above");
                cell.is_start = true;
                cell.is_wall = false;
                self.start = Some(coord);
                changed.push(*cell);
                changed.extend(grid.reset_transient(false));
            }
            CellEdit::SetEnd => {
                grid.cell_at(coord)?;
                if let Some(prev) = self.end.take() {
                    if prev != coord {
                        if let Ok(cell) = grid.cell_at_mut(prev) {
                            cell.is_end = false;
                            changed.push(*cell);
                        }
                    }
                }
                let cell = grid
                    .cell_at_mut(coord)
                    .expect("coordinate validated above");
                cell.is_end = true;
                cell.is_wall = false;
                self.end = Some(coord);
                changed.push(*cell);
                changed.extend(grid.reset_transient(false));
            }
        }

        Ok(changed)
    }

    /// Clear transient run state; with `clear_walls` the maze too.
    ///
    /// Returns the changed cells for broadcast.
    pub async fn reset(&mut self, clear_walls: bool) -> Vec<Cell> {
        self.grid.write().await.reset_transient(clear_walls)
    }

    /// Apply a batch received from the hub, tracking endpoint moves.
    pub async fn apply_remote(&mut self, batch: &CellBatch) -> Vec<Cell> {
        let applied = {
            let mut grid = self.grid.write().await;
            grid.apply_batch(batch)
        };
        for cell in &applied {
            let coord = cell.coord();
            if cell.is_start {
                self.start = Some(coord);
            } else if self.start == Some(coord) {
                self.start = None;
            }
            if cell.is_end {
                self.end = Some(coord);
            } else if self.end == Some(coord) {
                self.end = None;
            }
        }
        applied
    }
}
