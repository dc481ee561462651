//! Naive implementation of the local block transpose
//!
//! This version swaps elements across the diagonal one by one, row after row.
//! Every swap of a large block touches a new cache line on the column side,
//! which makes it slow once blocks stop fitting in cache, but it works for any
//! block side.

use compute::{
    tile::{self, TileError},
    NoArgs, Transpose, TransposeBase, TransposeCreate,
};
use data::Precision;

/// Element-wise local transpose
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
        tile::naive_transpose(block, side)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn odd_sides_are_fine() {
        let transposer = Transposer::new(NoArgs).unwrap();
        let mut block = (0..9).map(Precision::from).collect::<Vec<_>>();
        transposer.transpose_in_place(&mut block, 3).unwrap();
        assert_eq!(block, [0., 3., 6., 1., 4., 7., 2., 5., 8.]);
    }

    #[test]
    fn transposing_twice_is_identity() {
        let transposer = Transposer::new(NoArgs).unwrap();
        let side = 17;
        let initial = (0..side * side)
            .map(|idx| idx as Precision * 0.5)
            .collect::<Vec<_>>();
        let mut block = initial.clone();
        transposer.transpose_in_place(&mut block, side).unwrap();
        assert_ne!(block, initial);
        transposer.transpose_in_place(&mut block, side).unwrap();
        assert_eq!(block, initial);
    }

    #[test]
    fn tile_transpose_needs_whole_tiles() {
        let transposer = Transposer::new(NoArgs).unwrap();
        let mut block = vec![0.0; 9];
        assert_eq!(
            transposer.transpose_tiles_in_place(&mut block, 3),
            Err(TileError::Misaligned { side: 3 })
        );
        assert_eq!(
            transposer.transpose_in_place(&mut block, 4),
            Err(TileError::NotSquare { len: 9, side: 4 })
        );
    }
}
