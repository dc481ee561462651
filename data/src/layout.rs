//! Decomposition of the padded global matrix into per-rank blocks

use crate::{
    grid::GridCell,
    strided::{DescriptorError, StridedLayout},
    ConfigError, SIZE_FOR_CACHE, SIZE_FOR_MULT,
};

/// Sizes of the padded global matrix and of the per-rank blocks
///
/// This is a pure function of the requested matrix size and of the process
/// grid side, so every rank can compute it on its own and all of them will
/// agree on the result.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct BlockLayout {
    /// Edge length of the meaningful region of the global matrix
    size_matrix: usize,

    /// Number of grid cells along each axis
    grid_side: usize,

    /// Edge length of each rank's block, a multiple of [`SIZE_FOR_MULT`]
    block_size: usize,

    /// Edge length of the padded global matrix
    padded_size: usize,
}
//
impl BlockLayout {
    /// Compute the block decomposition of a `size_matrix²` matrix over a
    /// `grid_side²` process grid
    pub fn new(size_matrix: usize, grid_side: usize) -> Result<Self, ConfigError> {
        if size_matrix == 0 {
            return Err(ConfigError::EmptyMatrix);
        }
        if grid_side == 0 {
            return Err(ConfigError::EmptyGrid {
                num_tasks: grid_side,
            });
        }
        let overflow = ConfigError::Overflow {
            size_matrix,
            grid_side,
        };
        let block_size = size_matrix
            .div_ceil(grid_side)
            .checked_next_multiple_of(SIZE_FOR_MULT)
            .ok_or(overflow)?;
        let padded_size = block_size.checked_mul(grid_side).ok_or(overflow)?;
        padded_size.checked_mul(padded_size).ok_or(overflow)?;
        Ok(Self {
            size_matrix,
            grid_side,
            block_size,
            padded_size,
        })
    }

    /// Edge length of the meaningful region of the global matrix
    pub fn size_matrix(&self) -> usize {
        self.size_matrix
    }

    /// Number of grid cells along each axis
    pub fn grid_side(&self) -> usize {
        self.grid_side
    }

    /// Edge length of each rank's block
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of elements in each rank's block
    pub fn block_len(&self) -> usize {
        self.block_size * self.block_size
    }

    /// Edge length of the padded global matrix
    pub fn padded_size(&self) -> usize {
        self.padded_size
    }

    /// Number of elements in the padded global matrix
    pub fn padded_len(&self) -> usize {
        self.padded_size * self.padded_size
    }

    /// Number of cache tiles along each axis of a block
    pub fn cache_blocks(&self) -> usize {
        (self.block_size / SIZE_FOR_MULT) * (SIZE_FOR_MULT / SIZE_FOR_CACHE)
    }

    /// Offset of a grid cell's block within the padded global matrix
    pub fn cell_offset(&self, cell: GridCell) -> usize {
        debug_assert!(cell.row < self.grid_side && cell.col < self.grid_side);
        cell.row * self.block_size * self.padded_size + cell.col * self.block_size
    }

    /// View of a grid cell's block within the padded global matrix
    pub fn row_block_at(&self, cell: GridCell) -> Result<StridedLayout, DescriptorError> {
        StridedLayout::row_block(self.block_size, self.block_size, self.padded_size)?
            .at(self.cell_offset(cell))
    }

    /// View of a whole block as a contiguous sequence
    pub fn contiguous_block(&self) -> Result<StridedLayout, DescriptorError> {
        StridedLayout::contiguous(self.block_len())
    }

    /// View of a whole block that exchanges its [`cache_blocks()`]² mirrored
    /// cache tiles
    ///
    /// [`cache_blocks()`]: Self::cache_blocks
    pub fn tile_mirror(&self) -> Result<StridedLayout, DescriptorError> {
        StridedLayout::tile_mirror(self.cache_blocks(), SIZE_FOR_CACHE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_size_is_rounded_up() {
        let layout = BlockLayout::new(10, 2).unwrap();
        assert_eq!(layout.block_size(), 32);
        assert_eq!(layout.padded_size(), 64);
        assert_eq!(layout.cache_blocks(), 4);
    }

    #[test]
    fn exact_fit_is_not_padded() {
        let layout = BlockLayout::new(128, 2).unwrap();
        assert_eq!(layout.block_size(), 64);
        assert_eq!(layout.padded_size(), 128);
        assert_eq!(layout.cache_blocks(), 8);
    }

    #[test]
    fn invariants_hold() {
        for size_matrix in 1..200 {
            for grid_side in 1..6 {
                let layout = BlockLayout::new(size_matrix, grid_side).unwrap();
                assert!(layout.padded_size() >= size_matrix);
                assert_eq!(layout.block_size() % SIZE_FOR_MULT, 0);
                assert_eq!(layout.padded_size(), layout.block_size() * grid_side);
                assert_eq!(layout.cache_blocks() * SIZE_FOR_CACHE, layout.block_size());
            }
        }
    }

    #[test]
    fn degenerate_configurations() {
        assert_eq!(BlockLayout::new(0, 2), Err(ConfigError::EmptyMatrix));
        assert!(matches!(
            BlockLayout::new(4, 0),
            Err(ConfigError::EmptyGrid { .. })
        ));
        assert_eq!(
            BlockLayout::new(usize::MAX, 1),
            Err(ConfigError::Overflow {
                size_matrix: usize::MAX,
                grid_side: 1
            })
        );
    }

    #[test]
    fn tile_mirror_covers_the_block_tile_by_tile() {
        let layout = BlockLayout::new(100, 2).unwrap();
        assert_eq!(layout.block_size(), 64);
        let mirror = layout.tile_mirror().unwrap();
        assert_eq!(mirror.len(), layout.block_len());
        assert_eq!(mirror.end(), layout.block_len());
        let extents = mirror.dims().iter().map(|dim| dim.extent).collect::<Vec<_>>();
        assert_eq!(
            extents,
            [
                layout.cache_blocks(),
                SIZE_FOR_CACHE,
                layout.cache_blocks(),
                SIZE_FOR_CACHE
            ]
        );
    }

    #[test]
    fn cell_offsets() {
        let layout = BlockLayout::new(64, 2).unwrap();
        assert_eq!(layout.cell_offset(GridCell { row: 0, col: 0 }), 0);
        assert_eq!(layout.cell_offset(GridCell { row: 0, col: 1 }), 32);
        assert_eq!(layout.cell_offset(GridCell { row: 1, col: 0 }), 32 * 64);
        assert_eq!(layout.cell_offset(GridCell { row: 1, col: 1 }), 32 * 64 + 32);
    }
}
