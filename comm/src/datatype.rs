//! Lowering of strided layouts into MPI derived datatypes
//!
//! A [`StridedLayout`] is a stack of (extent, stride) dimensions. Its
//! innermost dimension becomes an MPI vector of [`Precision`] elements, and
//! every outer dimension wraps the datatype built so far into a heterogeneous
//! vector whose stride is given in bytes. That keeps the strides of outer
//! dimensions independent of the extent of inner ones, which matters for
//! layouts like [`StridedLayout::tile_mirror()`] whose outermost stride is
//! smaller than the span of the dimensions nested inside of it.
//!
//! MPI then walks the buffer in layout order on its own, so blocks travel
//! straight from the global matrix to the wire without a packed copy.

use crate::Error;
use data::{strided::StridedLayout, Precision};
use mpi::{datatype::UserDatatype, traits::*, Address, Count};

/// One level of an MPI datatype built from a strided layout
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Level {
    /// `count` elements, `stride` elements apart
    Vector { count: Count, stride: Count },

    /// `count` copies of the inner level, `stride` bytes apart
    HVector { count: Count, stride: Address },
}

/// Describe the MPI datatype of a layout, innermost level first
pub fn levels(layout: &StridedLayout) -> Result<Vec<Level>, Error> {
    let mut dims = layout.dims().iter().rev();
    let Some(inner) = dims.next() else {
        return Ok(Vec::new());
    };
    let mut levels = vec![Level::Vector {
        count: count(inner.extent)?,
        stride: count(inner.stride)?,
    }];
    for dim in dims {
        let stride = dim
            .stride
            .checked_mul(std::mem::size_of::<Precision>())
            .ok_or(Error::Unrepresentable { value: dim.stride })?;
        levels.push(Level::HVector {
            count: count(dim.extent)?,
            stride: Address::try_from(stride)
                .map_err(|_| Error::Unrepresentable { value: stride })?,
        });
    }
    Ok(levels)
}

/// Build the committed MPI datatype of a layout
///
/// The datatype is relative to the layout's offset: its first element is the
/// first element of the buffer that it gets attached to.
pub fn lower(layout: &StridedLayout) -> Result<UserDatatype, Error> {
    let element = Precision::equivalent_datatype();
    let mut datatype = None;
    for level in levels(layout)? {
        datatype = Some(match (level, &datatype) {
            (Level::Vector { count, stride: 1 }, None) => {
                UserDatatype::contiguous(count, &element)
            }
            (Level::Vector { count, stride }, None) => {
                UserDatatype::vector(count, 1, stride, &element)
            }
            (Level::HVector { count, stride }, Some(inner)) => {
                UserDatatype::heterogeneous_vector(count, 1, stride, inner)
            }
            _ => unreachable!("Only the innermost level is a vector of elements"),
        });
    }
    Ok(datatype.expect("Strided layouts always have at least one dimension"))
}

/// Convert an element count to the MPI integer type
pub(crate) fn count(value: usize) -> Result<Count, Error> {
    Count::try_from(value).map_err(|_| Error::Unrepresentable { value })
}
