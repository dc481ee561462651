//! Cache blocking implementation of the local block transpose
//!
//! The naive version is memory bound, because walking down a column of a large
//! block misses the cache on every element. This version processes the block
//! tile pair by tile pair instead, so that both sides of each swap stay in L1
//! cache for the whole duration of the exchange.

use compute::{
    tile::{self, TileError},
    NoArgs, Transpose, TransposeBase, TransposeCreate,
};
use data::Precision;

/// Tiled local transpose
#[derive(Clone, Copy, Debug, Default)]
pub struct Transposer;
//
impl TransposeBase for Transposer {
    type CliArgs = NoArgs;

    type Error = TileError;
}
//
impl TransposeCreate for Transposer {
    fn new(_args: NoArgs) -> Result<Self, TileError> {
        Ok(Self)
    }
}
//
impl Transpose for Transposer {
    fn transpose_in_place(&self, block: &mut [Precision], side: usize) -> Result<(), TileError> {
        tile::transpose_by_tiles(block, side)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compute::tile::TILE;

    fn checked_against_naive(side: usize) {
        let block = (0..side * side)
            .map(|idx| (idx as Precision).sqrt())
            .collect::<Vec<_>>();
        let mut expected = block.clone();
        compute_naive::Transposer
            .transpose_in_place(&mut expected, side)
            .unwrap();
        let mut actual = block;
        Transposer::new(NoArgs)
            .unwrap()
            .transpose_in_place(&mut actual, side)
            .unwrap();
        assert_eq!(actual, expected);
    }

    #[test]
    fn matches_naive() {
        for num_tiles in [1, 2, 3, 4, 8] {
            checked_against_naive(num_tiles * TILE);
        }
    }

    #[test]
    fn rejects_partial_tiles() {
        let mut block = vec![0.0; (TILE + 1) * (TILE + 1)];
        assert_eq!(
            Transposer.transpose_in_place(&mut block, TILE + 1),
            Err(TileError::Misaligned { side: TILE + 1 })
        );
    }
}
