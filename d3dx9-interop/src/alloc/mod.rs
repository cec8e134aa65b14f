//! Unmanaged memory primitives.
//!
//! Every byte handed to the native side lives in a [`NativeBlock`], which
//! owns exactly one allocation and returns it to its allocator when dropped.

use std::alloc::{self, Layout};
use std::fmt;
use std::ptr::{self, NonNull};
use std::sync::Arc;

use tracing::warn;

use crate::error::{InteropError, Result};

#[cfg(any(test, feature = "test-doubles"))]
mod tracking;

#[cfg(any(test, feature = "test-doubles"))]
pub use tracking::TrackingAllocator;

/// Source of memory the native side can read and write.
pub trait NativeAllocator: Send + Sync + fmt::Debug {
    /// Allocates zero-initialized memory. `layout` always has a non-zero size.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>>;

    /// # Safety
    /// `ptr` must come from `allocate` on this allocator with the same
    /// `layout` and must not have been released already.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// Allocator handle shared by arenas, blocks and the intern cache
pub type SharedAllocator = Arc<dyn NativeAllocator>;

/// Allocator backed by the global heap
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

impl HeapAllocator {
    /// The heap allocator behind a [`SharedAllocator`]
    pub fn shared() -> SharedAllocator {
        Arc::new(HeapAllocator)
    }
}

impl NativeAllocator for HeapAllocator {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>> {
        if layout.size() == 0 {
            return Err(InteropError::InvalidArgument(
                "zero-sized native allocation".to_string(),
            ));
        }
        // SAFETY: the layout has a non-zero size.
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        NonNull::new(ptr).ok_or_else(|| {
            warn!(
                name: "alloc.heap.out_of_memory",
                target: "d3dx9-interop",
                bytes = layout.size(),
                "Native allocation failed"
            );
            InteropError::OutOfMemory {
                bytes: layout.size(),
            }
        })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { alloc::dealloc(ptr.as_ptr(), layout) }
    }
}

/// Exclusive owner of one native allocation
pub struct NativeBlock {
    ptr: NonNull<u8>,
    layout: Layout,
    allocator: SharedAllocator,
}

// SAFETY: the block is the only owner of its allocation and hands out raw
// pointers only; the allocator itself is Send + Sync.
unsafe impl Send for NativeBlock {}
unsafe impl Sync for NativeBlock {}

impl NativeBlock {
    /// Allocates one zeroed block for `layout`
    pub fn allocate(allocator: &SharedAllocator, layout: Layout) -> Result<Self> {
        let ptr = allocator.allocate(layout)?;
        Ok(NativeBlock {
            ptr,
            layout,
            allocator: Arc::clone(allocator),
        })
    }

    /// Allocates room for `items` and copies them in verbatim.
    /// `items` must not be empty.
    pub fn from_slice<T: Copy>(allocator: &SharedAllocator, items: &[T]) -> Result<Self> {
        let layout = Layout::array::<T>(items.len())
            .map_err(|e| InteropError::InvalidArgument(format!("array layout: {e}")))?;
        let block = Self::allocate(allocator, layout)?;
        // SAFETY: the block is sized and aligned for `items.len()` values of T
        // and cannot overlap a live Rust slice.
        unsafe {
            ptr::copy_nonoverlapping(items.as_ptr(), block.cast::<T>(), items.len());
        }
        Ok(block)
    }

    /// Start of the block
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Start of the block as a `T` pointer
    pub fn cast<T>(&self) -> *mut T {
        self.ptr.as_ptr().cast()
    }

    /// Size in bytes
    pub fn size(&self) -> usize {
        self.layout.size()
    }
}

impl Drop for NativeBlock {
    fn drop(&mut self) {
        // SAFETY: allocated by `self.allocator` with `self.layout`; a block is
        // dropped once.
        unsafe { self.allocator.deallocate(self.ptr, self.layout) }
    }
}

impl fmt::Debug for NativeBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeBlock")
            .field("ptr", &self.ptr)
            .field("size", &self.layout.size())
            .finish()
    }
}
