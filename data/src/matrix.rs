//! Padded global matrix, owned by the coordinator

use crate::{layout::BlockLayout, AllocError, Precision};
use ndarray::{s, Array2, ArrayView2, ArrayViewMut2};

/// Square matrix stored in a row-major buffer padded to the block layout
///
/// Only the top-left `size() x size()` region holds meaningful values. The
/// rest of the `padded_size() x padded_size()` storage starts zero-filled and
/// is carried around so that every rank gets a full block.
#[derive(Clone, Debug, PartialEq)]
pub struct GlobalMatrix {
    /// Edge length of the meaningful region
    size: usize,

    /// Padded storage
    storage: Array2<Precision>,
}
//
impl GlobalMatrix {
    /// Allocate a zero-filled matrix with the padding of `layout`
    pub fn zeros(layout: &BlockLayout) -> Result<Self, AllocError> {
        let len = layout.padded_len();
        let mut elements = Vec::new();
        elements
            .try_reserve_exact(len)
            .map_err(|source| AllocError::Reserve { len, source })?;
        elements.resize(len, 0.0);
        let padded_size = layout.padded_size();
        let storage = Array2::from_shape_vec((padded_size, padded_size), elements)
            .expect("Storage length matches the padded shape");
        Ok(Self {
            size: layout.size_matrix(),
            storage,
        })
    }

    /// Allocate a matrix and fill its meaningful region using a function of
    /// the `[row, col]` element index, leaving the padding at zero
    pub fn from_fn(
        layout: &BlockLayout,
        mut element: impl FnMut([usize; 2]) -> Precision,
    ) -> Result<Self, AllocError> {
        let mut result = Self::zeros(layout)?;
        for ((row, col), elem) in result.meaningful_mut().indexed_iter_mut() {
            *elem = element([row, col]);
        }
        Ok(result)
    }

    /// Edge length of the meaningful region
    pub fn size(&self) -> usize {
        self.size
    }

    /// Edge length of the padded storage
    pub fn padded_size(&self) -> usize {
        self.storage.nrows()
    }

    /// View of the meaningful region
    pub fn meaningful(&self) -> ArrayView2<'_, Precision> {
        self.storage.slice(s![..self.size, ..self.size])
    }

    /// Mutable view of the meaningful region
    pub fn meaningful_mut(&mut self) -> ArrayViewMut2<'_, Precision> {
        self.storage.slice_mut(s![..self.size, ..self.size])
    }

    /// View of the whole padded storage
    pub fn padded(&self) -> ArrayView2<'_, Precision> {
        self.storage.view()
    }

    /// Mutable view of the whole padded storage
    pub fn padded_mut(&mut self) -> ArrayViewMut2<'_, Precision> {
        self.storage.view_mut()
    }

    /// Padded storage as a flat row-major buffer
    pub fn as_slice(&self) -> &[Precision] {
        self.storage
            .as_slice()
            .expect("Padded storage is in standard layout")
    }

    /// Padded storage as a mutable flat row-major buffer
    pub fn as_mut_slice(&mut self) -> &mut [Precision] {
        self.storage
            .as_slice_mut()
            .expect("Padded storage is in standard layout")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_starts_at_zero() {
        let layout = BlockLayout::new(10, 2).unwrap();
        let matrix = GlobalMatrix::from_fn(&layout, |[row, col]| (row * 10 + col + 1) as Precision)
            .unwrap();
        assert_eq!(matrix.size(), 10);
        assert_eq!(matrix.padded_size(), 64);
        assert_eq!(matrix.as_slice().len(), 64 * 64);

        for ((row, col), &elem) in matrix.padded().indexed_iter() {
            if row < 10 && col < 10 {
                assert_eq!(elem, (row * 10 + col + 1) as Precision);
            } else {
                assert_eq!(elem, 0.0);
            }
        }
    }

    #[test]
    fn flat_buffer_is_row_major_with_padded_stride() {
        let layout = BlockLayout::new(3, 1).unwrap();
        let matrix = GlobalMatrix::from_fn(&layout, |[row, col]| (row * 3 + col) as Precision)
            .unwrap();
        let padded = matrix.padded_size();
        assert_eq!(matrix.as_slice()[padded + 2], 5.0);
        assert_eq!(matrix.as_slice()[2 * padded + 1], 7.0);
    }
}
