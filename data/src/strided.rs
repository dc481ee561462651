//! Strided views of row-major buffers
//!
//! A [`StridedLayout`] describes a set of elements inside of a larger buffer
//! as a stack of nested dimensions, each with an extent and a stride measured
//! in elements. Walking the dimensions like an odometer (outermost first)
//! produces the elements in the order in which they appear in a message
//! payload, so the same descriptor can be used to carve a region out of a
//! buffer on the sending side and to scatter a payload back into a buffer on
//! the receiving side.
//!
//! For example, the block of a 2x2 process grid that sits at the top right of
//! a 64x64 padded matrix is described as...
//!
//! ```
//! # use data::strided::StridedLayout;
//! let block = StridedLayout::builder()
//!     .dim(32, 64) // 32 rows, 64 elements apart
//!     .dim(32, 1) // 32 contiguous elements per row
//!     .build()
//!     .unwrap()
//!     .at(32)
//!     .unwrap();
//! assert_eq!(block.len(), 32 * 32);
//! assert_eq!(block.end(), 31 * 64 + 64);
//! ```
//!
//! Descriptors never copy nor mutate data themselves, only [`read()`] and
//! [`write()`] do.
//!
//! [`read()`]: StridedLayout::read
//! [`write()`]: StridedLayout::write

use thiserror::Error;

/// One level of a strided layout
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Dim {
    /// Number of steps along this dimension
    pub extent: usize,

    /// Distance between two consecutive steps, in elements
    pub stride: usize,
}

/// Description of a strided region of a buffer
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct StridedLayout {
    /// Position of the first element within the buffer
    offset: usize,

    /// Dimensions, outermost first
    dims: Box<[Dim]>,

    /// Number of elements covered by the layout
    len: usize,

    /// Distance between the first and last element, plus one
    span: usize,
}
//
impl StridedLayout {
    /// Start building a layout anchored at the start of the buffer
    pub fn builder() -> LayoutBuilder {
        LayoutBuilder::default()
    }

    /// `len` contiguous elements
    pub fn contiguous(len: usize) -> Result<Self, DescriptorError> {
        Self::builder().dim(len, 1).build()
    }

    /// `rows` rows of `cols` contiguous elements, with the start of two
    /// consecutive rows being `row_stride` elements apart
    ///
    /// Rows are not allowed to overlap.
    pub fn row_block(rows: usize, cols: usize, row_stride: usize) -> Result<Self, DescriptorError> {
        if row_stride < cols && rows > 1 {
            return Err(DescriptorError::OverlappingRows { cols, row_stride });
        }
        Self::builder().dim(rows, row_stride).dim(cols, 1).build()
    }

    /// Square block of `num_tiles²` tiles of `tile × tile` elements, read in
    /// the order that moves each tile to its mirrored position across the
    /// diagonal, without reordering the elements inside of a tile
    ///
    /// With `side = num_tiles · tile`, the element at row `bi·tile + r` and
    /// column `bj·tile + e` of the payload comes from row `bj·tile + r` and
    /// column `bi·tile + e` of the buffer.
    pub fn tile_mirror(num_tiles: usize, tile: usize) -> Result<Self, DescriptorError> {
        let side = num_tiles
            .checked_mul(tile)
            .ok_or(DescriptorError::Overflow)?;
        let tile_row_stride = tile
            .checked_mul(side)
            .ok_or(DescriptorError::Overflow)?;
        Self::builder()
            .dim(num_tiles, tile) // Payload tile row = buffer tile column
            .dim(tile, side) // Row within the tile
            .dim(num_tiles, tile_row_stride) // Payload tile column = buffer tile row
            .dim(tile, 1) // Contiguous elements within a tile row
            .build()
    }

    /// Move the layout to a different position in the buffer
    pub fn at(mut self, offset: usize) -> Result<Self, DescriptorError> {
        offset
            .checked_add(self.span)
            .ok_or(DescriptorError::Overflow)?;
        self.offset = offset;
        Ok(self)
    }

    /// Position of the first element within the buffer
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Dimensions of the layout, outermost first
    pub fn dims(&self) -> &[Dim] {
        &self.dims
    }

    /// Number of elements covered by the layout
    pub fn len(&self) -> usize {
        self.len
    }

    /// Truth that the layout covers no element (never true for valid layouts)
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Minimal length of a buffer that contains the whole layout
    pub fn end(&self) -> usize {
        self.offset + self.span
    }

    /// Check that a buffer of `buffer_len` elements contains the layout
    pub fn check_bounds(&self, buffer_len: usize) -> Result<(), DescriptorError> {
        if self.end() > buffer_len {
            return Err(DescriptorError::OutOfBounds {
                end: self.end(),
                buffer_len,
            });
        }
        Ok(())
    }

    /// Iterate over the contiguous runs of elements that make up the layout,
    /// in payload order, as `(start, length)` pairs
    pub fn runs(&self) -> Runs<'_> {
        let (outer, run_len) = match self.dims.split_last() {
            Some((inner, outer)) if inner.stride == 1 => (outer, inner.extent),
            _ => (&self.dims[..], 1),
        };
        Runs {
            outer,
            counters: vec![0; outer.len()],
            start: Some(self.offset),
            run_len,
        }
    }

    /// Extract the elements covered by the layout into a flat payload
    pub fn read<T: Copy>(&self, buffer: &[T]) -> Result<Vec<T>, DescriptorError> {
        self.check_bounds(buffer.len())?;
        let mut payload = Vec::with_capacity(self.len);
        for (start, len) in self.runs() {
            payload.extend_from_slice(&buffer[start..start + len]);
        }
        Ok(payload)
    }

    /// Write a flat payload into the elements covered by the layout
    ///
    /// The payload must have exactly as many elements as the layout covers.
    pub fn write<T: Copy>(&self, buffer: &mut [T], payload: &[T]) -> Result<(), DescriptorError> {
        self.check_bounds(buffer.len())?;
        if payload.len() != self.len {
            return Err(DescriptorError::LengthMismatch {
                expected: self.len,
                actual: payload.len(),
            });
        }
        let mut remaining = payload;
        for (start, len) in self.runs() {
            let (run, rest) = remaining.split_at(len);
            buffer[start..start + len].copy_from_slice(run);
            remaining = rest;
        }
        Ok(())
    }
}

/// Builder for [`StridedLayout`]
#[derive(Clone, Debug, Default)]
pub struct LayoutBuilder {
    /// Dimensions added so far, outermost first
    dims: Vec<Dim>,
}
//
impl LayoutBuilder {
    /// Add a dimension nested inside of all previously added ones
    pub fn dim(mut self, extent: usize, stride: usize) -> Self {
        self.dims.push(Dim { extent, stride });
        self
    }

    /// Validate the dimensions and build the layout
    pub fn build(self) -> Result<StridedLayout, DescriptorError> {
        if self.dims.is_empty() {
            return Err(DescriptorError::NoDimension);
        }
        let mut len = 1usize;
        let mut last_index = 0usize;
        for (index, dim) in self.dims.iter().enumerate() {
            if dim.extent == 0 {
                return Err(DescriptorError::EmptyDimension { index });
            }
            len = len
                .checked_mul(dim.extent)
                .ok_or(DescriptorError::Overflow)?;
            last_index = (dim.extent - 1)
                .checked_mul(dim.stride)
                .and_then(|reach| last_index.checked_add(reach))
                .ok_or(DescriptorError::Overflow)?;
        }
        Ok(StridedLayout {
            offset: 0,
            dims: self.dims.into_boxed_slice(),
            len,
            span: last_index.checked_add(1).ok_or(DescriptorError::Overflow)?,
        })
    }
}

/// Iterator over the contiguous runs of a [`StridedLayout`]
#[derive(Clone, Debug)]
pub struct Runs<'layout> {
    /// Dimensions that are walked one step at a time
    outer: &'layout [Dim],

    /// Current position along each outer dimension
    counters: Vec<usize>,

    /// Start of the next run, if any
    start: Option<usize>,

    /// Length of each run
    run_len: usize,
}
//
impl Iterator for Runs<'_> {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.start?;

        // Advance the odometer, innermost dimension first
        self.start = None;
        let mut next = current;
        for (dim, counter) in self.outer.iter().zip(&mut self.counters).rev() {
            *counter += 1;
            next += dim.stride;
            if *counter < dim.extent {
                self.start = Some(next);
                break;
            }
            next -= dim.stride * dim.extent;
            *counter = 0;
        }

        Some((current, self.run_len))
    }
}

/// Reasons why a strided descriptor cannot be used
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum DescriptorError {
    /// A layout needs at least one dimension
    #[error("strided layout has no dimension")]
    NoDimension,

    /// Dimensions with no element are not allowed
    #[error("dimension {index} of strided layout is empty")]
    EmptyDimension { index: usize },

    /// Element positions would not be addressable
    #[error("strided layout overflows the address space")]
    Overflow,

    /// Rows of a row block would overlap
    #[error("rows of {cols} elements cannot be {row_stride} elements apart")]
    OverlappingRows { cols: usize, row_stride: usize },

    /// The layout reaches beyond the end of the buffer
    #[error("strided layout ends at element {end}, but the buffer only has {buffer_len}")]
    OutOfBounds { end: usize, buffer_len: usize },

    /// A payload does not have the number of elements the layout covers
    #[error("expected a payload of {expected} elements, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}
