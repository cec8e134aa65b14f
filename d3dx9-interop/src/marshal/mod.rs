//! Native struct marshaller.
//!
//! A caller-facing record implements [`ToNative`] and/or [`FromNative`]
//! against its `#[repr(C)]` counterpart. Variable-length fields (arrays,
//! strings, nested record arrays) are copied into unmanaged blocks owned by a
//! [`NativeArena`]; the arena lives inside the [`Marshalled`] guard handed to
//! the caller and every block is released when the guard goes away.

use std::ffi::{c_char, c_void};
use std::ptr;
use std::slice;

use bytemuck::Zeroable;
use tracing::debug;

use crate::alloc::{NativeBlock, SharedAllocator};
use crate::ansi;
use crate::error::{InteropError, Result};
use crate::hresult::HResult;

/// Associates a record with its native layout
pub trait NativeLayout {
    /// The `#[repr(C)]` counterpart
    type Native: Copy;
}

/// Managed to native conversion (ToNative)
pub trait ToNative: NativeLayout {
    /// Builds the native record. Every unmanaged allocation must go through
    /// `arena` so it is released together with the record.
    fn to_native(&self, arena: &mut NativeArena) -> Result<Self::Native>;
}

/// Native to managed conversion (FromNative)
pub trait FromNative: NativeLayout + Sized {
    /// # Safety
    /// Every non-null pointer in `native` must reference memory valid for the
    /// element count paired with it.
    unsafe fn from_native(native: &Self::Native) -> Result<Self>;
}

/// Owner of the unmanaged blocks created while converting one record
#[derive(Debug)]
pub struct NativeArena {
    allocator: SharedAllocator,
    blocks: Vec<NativeBlock>,
}

impl NativeArena {
    /// Empty arena allocating from `allocator`
    pub fn new(allocator: &SharedAllocator) -> Self {
        NativeArena {
            allocator: SharedAllocator::clone(allocator),
            blocks: Vec::new(),
        }
    }

    /// Copies `items` into a block sized exactly for them. Empty input
    /// yields a null pointer and a zero count, never a zero-length block.
    pub fn alloc_slice<T: Copy>(&mut self, items: &[T]) -> Result<(*mut T, u32)> {
        if items.is_empty() {
            return Ok((ptr::null_mut(), 0));
        }
        let count = u32::try_from(items.len()).map_err(|_| {
            InteropError::InvalidArgument(format!(
                "{} elements do not fit a 32-bit count",
                items.len()
            ))
        })?;
        let block = NativeBlock::from_slice(&self.allocator, items)?;
        let ptr = block.cast::<T>();
        self.blocks.push(block);
        Ok((ptr, count))
    }

    /// Raw bytes, as for [`NativeArena::alloc_slice`]
    pub fn alloc_bytes(&mut self, bytes: &[u8]) -> Result<(*mut c_void, u32)> {
        let (ptr, count) = self.alloc_slice(bytes)?;
        Ok((ptr.cast(), count))
    }

    /// Converts each record and stores the results contiguously
    pub fn alloc_records<R: ToNative>(&mut self, records: &[R]) -> Result<(*mut R::Native, u32)> {
        let natives = records
            .iter()
            .map(|record| record.to_native(self))
            .collect::<Result<Vec<_>>>()?;
        self.alloc_slice(&natives)
    }

    /// NUL terminated ANSI copy of `text`; absent or empty text is null
    pub fn alloc_ansi(&mut self, text: Option<&str>) -> Result<*mut c_char> {
        match text {
            Some(text) if !text.is_empty() => self.alloc_c_str(text),
            _ => Ok(ptr::null_mut()),
        }
    }

    /// NUL terminated ANSI copy of `text`. Always allocates, so `""` becomes
    /// a lone NUL rather than null.
    pub fn alloc_c_str(&mut self, text: &str) -> Result<*mut c_char> {
        let bytes = ansi::encode(text)?;
        let (ptr, _) = self.alloc_slice(&bytes)?;
        Ok(ptr.cast())
    }

    /// Blocks held so far
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Total size of the held blocks
    pub fn allocated_bytes(&self) -> usize {
        self.blocks.iter().map(NativeBlock::size).sum()
    }
}

/// A native record together with the memory its pointer fields reference.
///
/// Dropping the guard (or calling [`Marshalled::release`]) frees every block
/// exactly once. Pointers from [`Marshalled::as_ptr`] stay valid until then,
/// provided the guard is not moved.
#[must_use = "dropping the guard releases the native memory"]
#[derive(Debug)]
pub struct Marshalled<N> {
    native: N,
    arena: NativeArena,
}

impl<N> Marshalled<N> {
    /// The native record
    pub fn native(&self) -> &N {
        &self.native
    }

    /// The native record, for calls that write back into it
    pub fn native_mut(&mut self) -> &mut N {
        &mut self.native
    }

    /// Address of the native record, for passing to a native call
    pub fn as_ptr(&self) -> *const N {
        &self.native
    }

    /// Mutable address of the native record
    pub fn as_mut_ptr(&mut self) -> *mut N {
        &mut self.native
    }

    /// Blocks referenced by the record
    pub fn block_count(&self) -> usize {
        self.arena.block_count()
    }

    /// Bytes referenced by the record
    pub fn allocated_bytes(&self) -> usize {
        self.arena.allocated_bytes()
    }

    /// ReleaseNative. Consumes the guard, so a second release does not compile.
    pub fn release(self) {
        drop(self);
    }
}

/// Contiguous native array produced by [`to_native_slice`]
#[derive(Debug, Clone, Copy)]
pub struct NativeSlice<N> {
    /// First element, null when empty
    pub ptr: *mut N,
    /// Element count
    pub count: u32,
}

/// ToNative for a single record. On error every block allocated so far is
/// released before returning.
pub fn to_native<R>(record: &R, allocator: &SharedAllocator) -> Result<Marshalled<R::Native>>
where
    R: ToNative + ?Sized,
{
    let mut arena = NativeArena::new(allocator);
    let native = record.to_native(&mut arena)?;
    debug!(
        name: "marshal.to_native",
        target: "d3dx9-interop",
        record = std::any::type_name::<R>(),
        blocks = arena.block_count(),
        bytes = arena.allocated_bytes(),
        "Marshalled record to native layout"
    );
    Ok(Marshalled { native, arena })
}

/// ToNative for an array of records passed as pointer plus count
pub fn to_native_slice<R: ToNative>(
    records: &[R],
    allocator: &SharedAllocator,
) -> Result<Marshalled<NativeSlice<R::Native>>> {
    let mut arena = NativeArena::new(allocator);
    let (ptr, count) = arena.alloc_records(records)?;
    debug!(
        name: "marshal.to_native_slice",
        target: "d3dx9-interop",
        record = std::any::type_name::<R>(),
        count = count,
        blocks = arena.block_count(),
        "Marshalled record array to native layout"
    );
    Ok(Marshalled {
        native: NativeSlice { ptr, count },
        arena,
    })
}

/// Scoped acquisition around a native call: marshals `record`, hands the
/// native form to `call`, and releases the unmanaged memory on every exit
/// path (success, error return, unwinding) before passing the outcome on.
pub fn with_native<R, T, F>(record: &R, allocator: &SharedAllocator, call: F) -> Result<T>
where
    R: ToNative + ?Sized,
    F: FnOnce(&mut R::Native) -> Result<T>,
{
    let mut marshalled = to_native(record, allocator)?;
    let outcome = call(marshalled.native_mut());
    marshalled.release();
    outcome
}

/// FromNative for a single record
///
/// # Safety
/// See [`FromNative::from_native`].
pub unsafe fn from_native<R: FromNative>(native: &R::Native) -> Result<R> {
    unsafe { R::from_native(native) }
}

/// Reads `count` elements starting at `ptr`. A null pointer must come with a
/// zero count and yields an empty vector; any other pairing is rejected.
///
/// # Safety
/// A non-null `ptr` must be valid for reads of `count` elements.
pub unsafe fn read_slice<T: Copy>(
    ptr: *const T,
    count: u32,
    field: &'static str,
) -> Result<Vec<T>> {
    match (ptr.is_null(), count) {
        (true, 0) => Ok(Vec::new()),
        (true, count) => Err(InteropError::PointerCountMismatch {
            field,
            pointer: "null",
            count,
        }),
        (false, 0) => Err(InteropError::PointerCountMismatch {
            field,
            pointer: "non-null",
            count: 0,
        }),
        (false, count) => Ok(unsafe { slice::from_raw_parts(ptr, count as usize) }.to_vec()),
    }
}

/// [`read_slice`] followed by FromNative on every element
///
/// # Safety
/// As for [`read_slice`], and every element must satisfy
/// [`FromNative::from_native`].
pub unsafe fn read_records<R: FromNative>(
    ptr: *const R::Native,
    count: u32,
    field: &'static str,
) -> Result<Vec<R>> {
    let natives = unsafe { read_slice(ptr, count, field) }?;
    natives
        .iter()
        .map(|native| unsafe { R::from_native(native) })
        .collect()
}

/// Two-phase size discovery: `call` is first invoked with a null destination
/// to learn the element count, then with a buffer of exactly that many
/// zeroed elements.
pub fn read_two_phase<T, F>(what: &'static str, mut call: F) -> Result<Vec<T>>
where
    T: Zeroable + Copy,
    F: FnMut(*mut T, &mut u32) -> HResult,
{
    let mut required = 0u32;
    call(ptr::null_mut(), &mut required).check()?;
    debug!(
        name: "marshal.two_phase.size",
        target: "d3dx9-interop",
        what = what,
        required = required,
        "Discovered native buffer size"
    );
    if required == 0 {
        return Ok(Vec::new());
    }

    let mut items = vec![T::zeroed(); required as usize];
    let mut written = required;
    call(items.as_mut_ptr(), &mut written).check()?;
    if written > required {
        return Err(InteropError::InvalidArgument(format!(
            "{what}: native side reported {written} elements after sizing {required}"
        )));
    }
    items.truncate(written as usize);
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::TrackingAllocator;
    use crate::records::{EffectDefault, EffectInstance};
    use std::panic::{self, AssertUnwindSafe};

    fn instance() -> EffectInstance {
        EffectInstance {
            effect_filename: Some("skin.fx".to_string()),
            defaults: vec![
                EffectDefault::floats("g_vLightDir", &[0.0, -1.0, 0.0, 0.0]),
                EffectDefault::dword("g_nBones", 4),
            ],
        }
    }

    #[test]
    fn test_empty_input_is_null_and_zero() {
        let tracker = TrackingAllocator::new();
        let allocator: SharedAllocator = tracker.clone();
        let mut arena = NativeArena::new(&allocator);

        let (ptr, count) = arena.alloc_slice::<u32>(&[]).unwrap();
        assert!(ptr.is_null());
        assert_eq!(count, 0);
        assert!(arena.alloc_ansi(None).unwrap().is_null());
        assert!(arena.alloc_ansi(Some("")).unwrap().is_null());
        assert_eq!(arena.block_count(), 0);
        assert_eq!(tracker.allocations(), 0);
    }

    #[test]
    fn test_allocations_are_sized_exactly() {
        let allocator: SharedAllocator = TrackingAllocator::new();
        let mut arena = NativeArena::new(&allocator);

        let (_, count) = arena.alloc_slice(&[1u32, 2, 3]).unwrap();
        assert_eq!(count, 3);
        let name = arena.alloc_ansi(Some("tex")).unwrap();
        assert!(!name.is_null());
        assert_eq!(arena.allocated_bytes(), 12 + 4);
    }

    #[test]
    fn test_guard_releases_every_block_once() {
        let tracker = TrackingAllocator::new();
        let allocator: SharedAllocator = tracker.clone();

        let marshalled = to_native(&instance(), &allocator).unwrap();
        // filename, defaults array, two names, two values
        assert_eq!(marshalled.block_count(), 6);
        assert_eq!(tracker.live_allocations(), 6);

        marshalled.release();
        assert_eq!(tracker.live_allocations(), 0);
        assert_eq!(tracker.releases(), 6);
    }

    #[test]
    fn test_release_runs_when_native_call_fails() {
        let tracker = TrackingAllocator::new();
        let allocator: SharedAllocator = tracker.clone();

        let outcome: Result<()> = with_native(&instance(), &allocator, |native| {
            assert_eq!(native.num_defaults, 2);
            HResult::INVALID_CALL.check()
        });

        assert_eq!(outcome.unwrap_err().native_code(), Some(HResult::INVALID_CALL));
        assert_eq!(tracker.allocations(), 6);
        assert_eq!(tracker.releases(), 6);
        assert_eq!(tracker.live_allocations(), 0);
    }

    #[test]
    fn test_release_runs_when_native_call_panics() {
        let tracker = TrackingAllocator::new();
        let allocator: SharedAllocator = tracker.clone();

        let unwound = panic::catch_unwind(AssertUnwindSafe(|| {
            let _: Result<()> = with_native(&instance(), &allocator, |_| panic!("native fault"));
        }));

        assert!(unwound.is_err());
        assert_eq!(tracker.live_allocations(), 0);
    }

    #[test]
    fn test_partial_conversion_is_released_on_allocation_failure() {
        let tracker = TrackingAllocator::new();
        let allocator: SharedAllocator = tracker.clone();
        tracker.fail_allocation(4);

        let err = to_native(&instance(), &allocator).unwrap_err();
        assert!(matches!(err, InteropError::OutOfMemory { .. }));
        assert_eq!(tracker.allocations(), 3);
        assert_eq!(tracker.live_allocations(), 0);
    }

    #[test]
    fn test_read_slice_pairing_rules() {
        let values = [5u32, 6];
        assert_eq!(unsafe { read_slice(values.as_ptr(), 2, "values") }.unwrap(), vec![5, 6]);
        assert!(unsafe { read_slice::<u32>(ptr::null(), 0, "values") }.unwrap().is_empty());

        let err = unsafe { read_slice::<u32>(ptr::null(), 1, "values") }.unwrap_err();
        assert_eq!(
            err,
            InteropError::PointerCountMismatch {
                field: "values",
                pointer: "null",
                count: 1
            }
        );
        assert!(unsafe { read_slice(values.as_ptr(), 0, "values") }.is_err());
    }

    #[test]
    fn test_two_phase_discovery() {
        let table = [10u32, 20, 30];
        let mut calls = 0;
        let read = read_two_phase("table", |dest: *mut u32, count: &mut u32| {
            calls += 1;
            if dest.is_null() {
                *count = table.len() as u32;
            } else {
                assert_eq!(*count, 3);
                unsafe { ptr::copy_nonoverlapping(table.as_ptr(), dest, table.len()) };
            }
            HResult::OK
        })
        .unwrap();

        assert_eq!(read, vec![10, 20, 30]);
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_two_phase_stops_on_empty_or_failure() {
        let mut calls = 0;
        let read: Vec<u32> = read_two_phase("empty", |_, count: &mut u32| {
            calls += 1;
            *count = 0;
            HResult::OK
        })
        .unwrap();
        assert!(read.is_empty());
        assert_eq!(calls, 1);

        let err = read_two_phase::<u32, _>("failing", |_, _| HResult::INVALID_CALL).unwrap_err();
        assert_eq!(err.native_code(), Some(HResult::INVALID_CALL));
    }
}
