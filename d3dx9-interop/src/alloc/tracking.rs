//! Leak and double-free detection for tests and stress runs.

use std::alloc::Layout;
use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::alloc::{HeapAllocator, NativeAllocator};
use crate::error::{InteropError, Result};

/// Allocation-tracking allocator for tests and stress runs.
///
/// Keeps every live block in a table so leaks, double frees and foreign
/// pointers are caught. It can also be armed to fail a specific allocation.
#[derive(Debug, Default)]
pub struct TrackingAllocator {
    live: Mutex<HashMap<usize, Layout>>,
    attempts: AtomicUsize,
    allocations: AtomicUsize,
    releases: AtomicUsize,
    fail_at: AtomicUsize,
    quarantine: Option<Mutex<Vec<(NonNull<u8>, Layout)>>>,
}

// SAFETY: quarantined pointers are only touched under their mutex and freed
// when the allocator itself is dropped.
unsafe impl Send for TrackingAllocator {}
unsafe impl Sync for TrackingAllocator {}

impl TrackingAllocator {
    /// A tracker that frees released blocks immediately
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Released blocks are kept until the allocator is dropped, so an address
    /// is never handed out twice.
    pub fn with_quarantine() -> Arc<Self> {
        let mut tracker = Self::default();
        tracker.quarantine = Some(Mutex::new(Vec::new()));
        Arc::new(tracker)
    }

    /// Makes the `nth` allocation attempt from now on (1-based) fail with
    /// `OutOfMemory`.
    pub fn fail_allocation(&self, nth: usize) {
        let base = self.attempts.load(Ordering::SeqCst);
        self.fail_at.store(base + nth, Ordering::SeqCst);
    }

    /// Successful allocations so far
    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::SeqCst)
    }

    /// Blocks released so far
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    /// Blocks allocated and not yet released
    pub fn live_allocations(&self) -> usize {
        self.live.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Total size of the live blocks
    pub fn live_bytes(&self) -> usize {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Layout::size)
            .sum()
    }
}

impl NativeAllocator for TrackingAllocator {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt == self.fail_at.load(Ordering::SeqCst) {
            return Err(InteropError::OutOfMemory {
                bytes: layout.size(),
            });
        }
        let ptr = HeapAllocator.allocate(layout)?;
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(ptr.as_ptr() as usize, layout);
        self.allocations.fetch_add(1, Ordering::SeqCst);
        Ok(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        let recorded = self
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(ptr.as_ptr() as usize));
        match recorded {
            Some(recorded) => {
                assert_eq!(recorded, layout, "block released with a different layout")
            }
            None => panic!("double free or foreign pointer {ptr:p}"),
        }
        self.releases.fetch_add(1, Ordering::SeqCst);
        match &self.quarantine {
            Some(quarantine) => quarantine
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((ptr, layout)),
            None => unsafe { HeapAllocator.deallocate(ptr, layout) },
        }
    }
}

impl Drop for TrackingAllocator {
    fn drop(&mut self) {
        if let Some(quarantine) = self.quarantine.take() {
            let blocks = quarantine.into_inner().unwrap_or_else(PoisonError::into_inner);
            for (ptr, layout) in blocks {
                // SAFETY: quarantined blocks were allocated by the heap and
                // are no longer referenced by their former owners.
                unsafe { HeapAllocator.deallocate(ptr, layout) }
            }
        }
    }
}
