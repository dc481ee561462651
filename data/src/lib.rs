//! Data model of the distributed matrix transpose
//!
//! Everything in here is shared by all ranks and computed independently by
//! each of them, so that no negotiation message is needed before the actual
//! data exchange starts.

pub mod block;
pub mod grid;
pub mod layout;
pub mod matrix;
pub mod strided;

use std::collections::TryReserveError;
use thiserror::Error;

/// Computation precision
pub type Precision = f64;

/// Side of the square cache tiles used by the local transpose
///
/// A tile of 8x8 doubles is 512 bytes, so the two tiles of a mirrored pair
/// comfortably fit in L1 together.
pub const SIZE_FOR_CACHE: usize = 8;

/// Granularity to which per-rank block sides are rounded up
pub const SIZE_FOR_MULT: usize = 32;

/// Byte boundary on which per-rank local blocks start
pub const BLOCK_ALIGNMENT: usize = 256;

/// Things that make a transpose configuration unusable
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Not enough ranks to build even a 1x1 process grid
    #[error("cannot build a process grid out of {num_tasks} ranks")]
    EmptyGrid { num_tasks: usize },

    /// The requested matrix has no elements
    #[error("matrix size must be positive")]
    EmptyMatrix,

    /// The padded matrix would not be addressable
    #[error("a {size_matrix}x{size_matrix} matrix cannot be padded for a {grid_side}x{grid_side} process grid")]
    Overflow { size_matrix: usize, grid_side: usize },
}

/// Failure to acquire storage for a matrix or block
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum AllocError {
    /// The global allocator refused to provide the padded matrix storage
    #[error("failed to reserve storage for {len} matrix elements")]
    Reserve {
        len: usize,
        #[source]
        source: TryReserveError,
    },

    /// The requested block size cannot be expressed as a memory layout
    #[error("a block of {len} elements cannot be laid out with {BLOCK_ALIGNMENT}-byte alignment")]
    Layout { len: usize },

    /// Zero-sized blocks are not allowed
    #[error("cannot allocate an empty block")]
    Empty,

    /// The global allocator returned a null pointer
    #[error("out of memory while allocating a {bytes}-byte block")]
    OutOfMemory { bytes: usize },
}
