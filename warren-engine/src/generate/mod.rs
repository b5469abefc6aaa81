//! Maze construction algorithms.
//!
//! Both generators mutate the grid through the step contract and finish
//! with a corrective batch that re-opens the designated start/end cells.
//! Only [`division::RecursiveDivision`] guarantees a connected maze;
//! [`random::RandomFill`] makes no such promise, and that asymmetry is part
//! of the contract.

pub mod division;
pub mod random;

pub use division::{RecursiveDivision, BALANCED_SKEW, HORIZONTAL_SKEW, VERTICAL_SKEW};
pub use random::{RandomFill, WALL_PROBABILITY};

use warren_core::{Cell, Coord, Grid};

/// Force-open the designated endpoints after generation.
///
/// Returns the cells actually changed, which become the final corrective
/// batch (nothing is retransmitted for endpoints that were already open).
fn clear_endpoints(grid: &mut Grid, endpoints: [Option<Coord>; 2]) -> Vec<Cell> {
    let mut cleared = Vec::new();
    for coord in endpoints.into_iter().flatten() {
        let cell = grid
            .cell_at_mut(coord)
            .expect("designated endpoints lie inside the grid");
        if cell.is_wall {
            cell.is_wall = false;
            cleared.push(*cell);
        }
    }
    cleared
}
