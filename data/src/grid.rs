//! Square process grid

use crate::ConfigError;

/// Rank of the process that owns the global matrix
pub const COORDINATOR: usize = 0;

/// Coordinates of a rank within the process grid
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct GridCell {
    /// Grid row
    pub row: usize,

    /// Grid column
    pub col: usize,
}
//
impl GridCell {
    /// Cell at the mirrored position across the grid diagonal
    pub fn mirrored(self) -> Self {
        Self {
            row: self.col,
            col: self.row,
        }
    }
}

/// What a given rank should do in the computation
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    /// The rank owns a grid cell and takes part in the transpose
    Participant(GridCell),

    /// The rank does not fit in the square grid and should shut down
    Surplus,
}

/// Square process grid built out of the available ranks
///
/// Only the first `side²` ranks take part in the computation. Rank `r` owns
/// the cell at `(r / side, r % side)`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct GridTopology {
    /// Total number of ranks that were launched
    num_tasks: usize,

    /// Number of grid cells along each axis
    side: usize,
}
//
impl GridTopology {
    /// Build the largest square grid that fits in `num_tasks` ranks
    pub fn new(num_tasks: usize) -> Result<Self, ConfigError> {
        let side = isqrt(num_tasks);
        if side == 0 {
            return Err(ConfigError::EmptyGrid { num_tasks });
        }
        Ok(Self { num_tasks, side })
    }

    /// Number of ranks that were launched
    pub fn num_tasks(&self) -> usize {
        self.num_tasks
    }

    /// Number of grid cells along each axis
    pub fn side(&self) -> usize {
        self.side
    }

    /// Number of ranks that take part in the computation
    pub fn num_participants(&self) -> usize {
        self.side * self.side
    }

    /// Role of a given rank
    pub fn role(&self, rank: usize) -> Role {
        self.cell(rank).map_or(Role::Surplus, Role::Participant)
    }

    /// Grid cell owned by a rank, if any
    pub fn cell(&self, rank: usize) -> Option<GridCell> {
        (rank < self.num_participants()).then(|| GridCell {
            row: rank / self.side,
            col: rank % self.side,
        })
    }

    /// Rank that owns a grid cell
    pub fn rank_of(&self, cell: GridCell) -> usize {
        debug_assert!(cell.row < self.side && cell.col < self.side);
        cell.row * self.side + cell.col
    }

    /// Iterate over grid cells in rank order
    pub fn cells(&self) -> impl Iterator<Item = GridCell> {
        let side = self.side;
        (0..side).flat_map(move |row| (0..side).map(move |col| GridCell { row, col }))
    }
}

/// Integer square root, rounded down
fn isqrt(n: usize) -> usize {
    // Floating-point estimate, then fix up any rounding error
    let mut root = (n as f64).sqrt() as usize;
    while root.checked_mul(root).map_or(true, |square| square > n) {
        root -= 1;
    }
    while (root + 1).checked_mul(root + 1).is_some_and(|square| square <= n) {
        root += 1;
    }
    root
}
