//! Cache tile kernels shared by the tiled backends
//!
//! A `side²` block is cut into `TILE²` tiles. Transposing the block amounts to
//! transposing each diagonal tile in place, and exchanging every other tile
//! with its mirror across the diagonal while transposing both. The kernels in
//! here process one such tile pair at a time, so that the working set of each
//! step is two tiles, which fit in L1 cache.

use data::{Precision, SIZE_FOR_CACHE};
use thiserror::Error;

/// Side of a cache tile
pub const TILE: usize = SIZE_FOR_CACHE;

/// Shape problems that prevent a block from being transposed
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum TileError {
    /// Block storage does not match the announced side
    #[error("a block of {len} elements is not a {side}x{side} square")]
    NotSquare { len: usize, side: usize },

    /// Block side is not a whole number of tiles
    #[error("block side {side} is not a multiple of the {TILE}-element tile side")]
    Misaligned { side: usize },
}

/// Check that a block is a `side²` square
pub fn check_square(block: &[Precision], side: usize) -> Result<(), TileError> {
    if side.checked_mul(side) != Some(block.len()) {
        return Err(TileError::NotSquare {
            len: block.len(),
            side,
        });
    }
    Ok(())
}

/// Check that a block can be processed tile by tile, and return the number of
/// tiles along each axis
pub fn check_tiled(block: &[Precision], side: usize) -> Result<usize, TileError> {
    check_square(block, side)?;
    if side % TILE != 0 {
        return Err(TileError::Misaligned { side });
    }
    Ok(side / TILE)
}

/// Pair of tiles that are each other's mirror across the block diagonal
///
/// Identified by the coordinates of the tile in the lower triangle, so
/// `row >= col`. Diagonal tiles are their own mirror.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TilePair {
    /// Tile row of the lower-triangle tile
    pub row: usize,

    /// Tile column of the lower-triangle tile
    pub col: usize,
}
//
impl TilePair {
    /// Truth that this is a diagonal tile
    pub fn is_diagonal(&self) -> bool {
        self.row == self.col
    }
}

/// Enumerate the tile pairs of a block with `num_tiles` tiles per axis
///
/// Each pair is independent from the others, so they can be processed in any
/// order or concurrently.
pub fn tile_pairs(num_tiles: usize) -> impl Iterator<Item = TilePair> + Clone {
    (0..num_tiles).flat_map(|row| (0..=row).map(move |col| TilePair { row, col }))
}

/// Transpose a whole block, tile pair by tile pair
pub fn transpose_by_tiles(block: &mut [Precision], side: usize) -> Result<(), TileError> {
    let num_tiles = check_tiled(block, side)?;
    for pair in tile_pairs(num_tiles) {
        // SAFETY: The block was checked to be side² and pairs are in bounds
        unsafe { exchange_tile_pair_raw(block.as_mut_ptr(), side, pair) };
    }
    Ok(())
}

/// Transpose every tile of a block in place, without moving tiles around
pub fn transpose_within_tiles(block: &mut [Precision], side: usize) -> Result<(), TileError> {
    check_tiled(block, side)?;
    for band in block.chunks_exact_mut(TILE * side) {
        transpose_tiles_of_band(band, side);
    }
    Ok(())
}

/// Transpose every tile of a band of `TILE` full rows in place
///
/// # Panics
///
/// If `band` is not made of `TILE` rows of `side` elements, with `side` a
/// multiple of `TILE`.
pub fn transpose_tiles_of_band(band: &mut [Precision], side: usize) {
    assert_eq!(band.len(), TILE * side);
    assert_eq!(side % TILE, 0);
    for tile_col in 0..side / TILE {
        let col0 = tile_col * TILE;
        for a in 1..TILE {
            for b in 0..a {
                band.swap(a * side + col0 + b, b * side + col0 + a);
            }
        }
    }
}

/// Transpose the two tiles of a pair and exchange them, or transpose a
/// diagonal tile in place
///
/// # Safety
///
/// `base` must point to a row-major `side²` block that is valid for reads and
/// writes, the tiles of `pair` must lie inside of that block, and no other
/// thread may access these tiles during the call.
pub unsafe fn exchange_tile_pair_raw(base: *mut Precision, side: usize, pair: TilePair) {
    let row0 = pair.row * TILE;
    let col0 = pair.col * TILE;
    for a in 0..TILE {
        let b_end = if pair.is_diagonal() { a } else { TILE };
        for b in 0..b_end {
            // SAFETY: Both elements are in the pair's tiles per the contract,
            //         and they are distinct since (a, b) is never on the
            //         diagonal of a diagonal tile.
            unsafe {
                let lower = base.add((row0 + a) * side + col0 + b);
                let upper = base.add((col0 + b) * side + row0 + a);
                std::ptr::swap_nonoverlapping(lower, upper, 1);
            }
        }
    }
}

/// Safe version of [`exchange_tile_pair_raw()`]
///
/// # Panics
///
/// If `block` is not `side²` or the pair is out of bounds.
pub fn exchange_tile_pair(block: &mut [Precision], side: usize, pair: TilePair) {
    assert_eq!(Some(block.len()), side.checked_mul(side));
    assert!(pair.col <= pair.row && (pair.row + 1) * TILE <= side);
    // SAFETY: Bounds are checked above and &mut guarantees exclusive access
    unsafe { exchange_tile_pair_raw(block.as_mut_ptr(), side, pair) }
}

/// Reference transpose, used to check the tiled implementations
pub fn naive_transpose(block: &mut [Precision], side: usize) -> Result<(), TileError> {
    check_square(block, side)?;
    for row in 1..side {
        for col in 0..row {
            block.swap(row * side + col, col * side + row);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indexed_block(side: usize) -> Vec<Precision> {
        (0..side * side).map(|idx| idx as Precision).collect()
    }

    fn expected_transpose(side: usize) -> Vec<Precision> {
        (0..side * side)
            .map(|idx| ((idx % side) * side + idx / side) as Precision)
            .collect()
    }

    #[test]
    fn tile_pairs_cover_the_lower_triangle() {
        let pairs = tile_pairs(4).collect::<Vec<_>>();
        assert_eq!(pairs.len(), 4 * 5 / 2);
        assert!(pairs.iter().all(|pair| pair.col <= pair.row && pair.row < 4));
        assert_eq!(pairs.iter().filter(|pair| pair.is_diagonal()).count(), 4);
    }

    #[test]
    fn naive_transpose_transposes() {
        for side in [1, 2, 5, 16] {
            let mut block = indexed_block(side);
            naive_transpose(&mut block, side).unwrap();
            assert_eq!(block, expected_transpose(side));
        }
    }

    #[test]
    fn tiled_transpose_matches_naive() {
        for side in [TILE, 2 * TILE, 4 * TILE, 12 * TILE] {
            let mut tiled = indexed_block(side);
            transpose_by_tiles(&mut tiled, side).unwrap();
            let mut naive = indexed_block(side);
            naive_transpose(&mut naive, side).unwrap();
            assert_eq!(tiled, naive);
        }
    }

    #[test]
    fn single_pair_exchange() {
        let side = 2 * TILE;
        let mut block = indexed_block(side);
        exchange_tile_pair(&mut block, side, TilePair { row: 1, col: 0 });
        for row in 0..side {
            for col in 0..side {
                let in_pair = (row / TILE) != (col / TILE);
                let expected = if in_pair { col * side + row } else { row * side + col };
                assert_eq!(block[row * side + col], expected as Precision);
            }
        }
    }

    #[test]
    fn within_tiles_keeps_tiles_in_place() {
        let side = 3 * TILE;
        let mut block = indexed_block(side);
        transpose_within_tiles(&mut block, side).unwrap();
        for row in 0..side {
            for col in 0..side {
                let (tile_row, tile_col) = (row / TILE * TILE, col / TILE * TILE);
                let (a, b) = (row % TILE, col % TILE);
                let source = (tile_row + b) * side + tile_col + a;
                assert_eq!(block[row * side + col], source as Precision);
            }
        }
    }

    #[test]
    fn shape_errors() {
        let mut block = vec![0.0; 10];
        assert_eq!(
            transpose_by_tiles(&mut block, 3),
            Err(TileError::NotSquare { len: 10, side: 3 })
        );
        let mut block = vec![0.0; 36];
        assert_eq!(
            transpose_within_tiles(&mut block, 6),
            Err(TileError::Misaligned { side: 6 })
        );
        assert_eq!(naive_transpose(&mut block, 6), Ok(()));
    }
}
