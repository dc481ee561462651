//! Per-rank local blocks

use crate::{AllocError, Precision, BLOCK_ALIGNMENT};
use log::debug;
use std::{
    alloc::{self, Layout},
    ops::{Deref, DerefMut},
    ptr::NonNull,
};

/// Square block of matrix elements owned by a single rank
///
/// The storage is zero-initialized and starts on a [`BLOCK_ALIGNMENT`]-byte
/// boundary, so that cache tiles never straddle more cache lines than needed.
pub struct LocalBlock {
    /// Start of the storage
    ptr: NonNull<Precision>,

    /// Number of elements along each axis
    side: usize,

    /// Memory layout that the storage was allocated with
    layout: Layout,
}
//
impl LocalBlock {
    /// Allocate a zero-filled `side²` block
    pub fn zeroed(side: usize) -> Result<Self, AllocError> {
        let len = side
            .checked_mul(side)
            .ok_or(AllocError::Layout { len: usize::MAX })?;
        if len == 0 {
            return Err(AllocError::Empty);
        }
        let layout = Layout::array::<Precision>(len)
            .and_then(|layout| layout.align_to(BLOCK_ALIGNMENT))
            .map_err(|_| AllocError::Layout { len })?;

        // SAFETY: layout has a nonzero size, as checked above
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw.cast::<Precision>()).ok_or(AllocError::OutOfMemory {
            bytes: layout.size(),
        })?;
        debug!("Allocated a {side}x{side} local block at {ptr:p}");
        Ok(Self { ptr, side, layout })
    }

    /// Number of elements along each axis
    pub fn side(&self) -> usize {
        self.side
    }
}
//
impl Deref for LocalBlock {
    type Target = [Precision];

    fn deref(&self) -> &[Precision] {
        // SAFETY: ptr points to side² zero-initialized elements that are
        //         owned by self and live as long as self.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.side * self.side) }
    }
}
//
impl DerefMut for LocalBlock {
    fn deref_mut(&mut self) -> &mut [Precision] {
        // SAFETY: Same as Deref, and &mut self guarantees exclusive access
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.side * self.side) }
    }
}
//
impl Drop for LocalBlock {
    fn drop(&mut self) {
        // SAFETY: ptr was allocated by the global allocator with this layout
        unsafe { alloc::dealloc(self.ptr.as_ptr().cast::<u8>(), self.layout) }
    }
}
//
impl std::fmt::Debug for LocalBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBlock")
            .field("side", &self.side)
            .field("ptr", &self.ptr)
            .finish_non_exhaustive()
    }
}
//
// SAFETY: LocalBlock uniquely owns its storage, like a Box<[Precision]>, so
//         moving it to another thread moves that ownership along.
unsafe impl Send for LocalBlock {}
//
// SAFETY: A shared &LocalBlock only gives access to a &[Precision], and
//         there is no interior mutability, so sharing it across threads can
//         only lead to concurrent reads.
unsafe impl Sync for LocalBlock {}
