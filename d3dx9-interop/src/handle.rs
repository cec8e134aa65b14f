//! Parameter handles (`D3DXHANDLE`).
//!
//! The native API accepts either an opaque handle it returned earlier or a
//! pointer to the parameter's ANSI name. Named handles are normally interned
//! in an [`InternCache`] so repeated lookups of the same name share one
//! allocation; a private allocation is made instead when interning is off.

use std::collections::HashMap;
use std::ffi::c_char;
use std::fmt;
use std::mem;
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::alloc::{NativeBlock, SharedAllocator};
use crate::ansi;
use crate::config::InteropConfig;
use crate::error::Result;

/// The native handle type: an opaque token or a name pointer
pub type RawHandle = *const c_char;

/// Process-wide deduplication of parameter names.
///
/// Owned by the composition root and shared through an `Arc`. Every
/// interned name stays allocated until [`InternCache::clear`] or until the
/// cache is dropped.
pub struct InternCache {
    allocator: SharedAllocator,
    names: Mutex<HashMap<String, NativeBlock>>,
}

impl InternCache {
    /// Empty cache allocating from `allocator`
    pub fn new(allocator: &SharedAllocator) -> Self {
        InternCache {
            allocator: SharedAllocator::clone(allocator),
            names: Mutex::new(HashMap::new()),
        }
    }

    /// Allocator the names live in
    pub fn allocator(&self) -> &SharedAllocator {
        &self.allocator
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, NativeBlock>> {
        self.names.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the shared address for `name`, allocating it on first use.
    pub fn intern(&self, name: &str) -> Result<RawHandle> {
        let mut names = self.lock();
        if let Some(block) = names.get(name) {
            return Ok(block.cast::<c_char>().cast_const());
        }

        let block = NativeBlock::from_slice(&self.allocator, &ansi::encode(name)?)?;
        let raw = block.cast::<c_char>().cast_const();
        names.insert(name.to_string(), block);
        debug!(
            name: "intern_cache.insert",
            target: "d3dx9-interop",
            parameter = name,
            cached = names.len(),
            "Interned parameter name"
        );
        Ok(raw)
    }

    /// Number of interned names
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when nothing is interned
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Frees every interned name. Handles still holding one of these
    /// addresses are dangling afterwards; callers must not use them.
    pub fn clear(&self) -> usize {
        let mut names = self.lock();
        let released = names.len();
        names.clear();
        debug!(
            name: "intern_cache.clear",
            target: "d3dx9-interop",
            released = released,
            "Released interned parameter names"
        );
        released
    }
}

impl fmt::Debug for InternCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InternCache")
            .field("names", &self.len())
            .finish()
    }
}

enum Repr {
    /// Passed through unchanged, never owned
    Address(RawHandle),
    /// Shared name owned by an `InternCache`
    Interned(RawHandle),
    /// Name owned by this handle
    Owned(NativeBlock),
    Disposed,
}

/// A parameter identifier. Built only through the named constructors so the
/// origin of the address is always explicit.
pub struct EffectHandle {
    repr: Repr,
}

impl EffectHandle {
    /// The null handle, which the native side reads as "no parameter"
    pub fn null() -> Self {
        Self::from_address(ptr::null())
    }

    /// Wraps a handle the native side returned. No allocation, no ownership.
    pub fn from_address(raw: RawHandle) -> Self {
        EffectHandle {
            repr: Repr::Address(raw),
        }
    }

    /// Name handle backed by the shared cache
    pub fn interned(name: &str, cache: &InternCache) -> Result<Self> {
        Ok(EffectHandle {
            repr: Repr::Interned(cache.intern(name)?),
        })
    }

    /// Name handle owning its own copy of the name
    pub fn private(name: &str, allocator: &SharedAllocator) -> Result<Self> {
        let block = NativeBlock::from_slice(allocator, &ansi::encode(name)?)?;
        debug!(
            name: "effect_handle.private",
            target: "d3dx9-interop",
            parameter = name,
            "Allocated private parameter name"
        );
        Ok(EffectHandle {
            repr: Repr::Owned(block),
        })
    }

    /// Pointer to hand to the native call. Null once disposed.
    pub fn as_raw(&self) -> RawHandle {
        match &self.repr {
            Repr::Address(raw) | Repr::Interned(raw) => *raw,
            Repr::Owned(block) => block.cast::<c_char>().cast_const(),
            Repr::Disposed => ptr::null(),
        }
    }

    /// True when `as_raw` is null
    pub fn is_null(&self) -> bool {
        self.as_raw().is_null()
    }

    /// True for a private name that has not been disposed
    pub fn is_owned(&self) -> bool {
        matches!(self.repr, Repr::Owned(_))
    }

    /// True for a name shared through an [`InternCache`]
    pub fn is_interned(&self) -> bool {
        matches!(self.repr, Repr::Interned(_))
    }

    /// True after [`EffectHandle::dispose`] freed a private name
    pub fn is_disposed(&self) -> bool {
        matches!(self.repr, Repr::Disposed)
    }

    /// Frees a private name. Interned and raw-address handles are left as
    /// they are; calling this again is a no-op.
    pub fn dispose(&mut self) {
        if let Repr::Owned(_) = self.repr {
            drop(mem::replace(&mut self.repr, Repr::Disposed));
        }
    }
}

impl fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.repr {
            Repr::Address(_) => "address",
            Repr::Interned(_) => "interned",
            Repr::Owned(_) => "owned",
            Repr::Disposed => "disposed",
        };
        f.debug_struct("EffectHandle")
            .field("kind", &kind)
            .field("raw", &self.as_raw())
            .finish()
    }
}

/// Builds handles the way the configuration asks for
#[derive(Debug, Clone)]
pub struct HandleFactory {
    cache: Arc<InternCache>,
    intern_names: bool,
}

impl HandleFactory {
    /// Factory over `cache`, interning if `config.intern_names` is set
    pub fn new(cache: Arc<InternCache>, config: &InteropConfig) -> Self {
        HandleFactory {
            cache,
            intern_names: config.intern_names,
        }
    }

    /// Handle for a parameter name
    pub fn name(&self, name: &str) -> Result<EffectHandle> {
        if self.intern_names {
            EffectHandle::interned(name, &self.cache)
        } else {
            EffectHandle::private(name, self.cache.allocator())
        }
    }

    /// Handle for an address the native side returned
    pub fn address(&self, raw: RawHandle) -> EffectHandle {
        EffectHandle::from_address(raw)
    }

    /// The shared intern cache
    pub fn cache(&self) -> &Arc<InternCache> {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::TrackingAllocator;
    use std::ffi::CStr;
    use std::thread;

    fn cache() -> (Arc<TrackingAllocator>, Arc<InternCache>) {
        let tracker = TrackingAllocator::with_quarantine();
        let allocator: SharedAllocator = tracker.clone();
        (tracker, Arc::new(InternCache::new(&allocator)))
    }

    #[test]
    fn test_same_name_shares_address() {
        let (tracker, cache) = cache();
        let first = EffectHandle::interned("g_mWorld", &cache).unwrap();
        let second = EffectHandle::interned("g_mWorld", &cache).unwrap();
        let other = EffectHandle::interned("g_mView", &cache).unwrap();

        assert_eq!(first.as_raw(), second.as_raw());
        assert_ne!(first.as_raw(), other.as_raw());
        assert_eq!(cache.len(), 2);
        assert_eq!(tracker.allocations(), 2);

        let name = unsafe { CStr::from_ptr(first.as_raw()) };
        assert_eq!(name.to_bytes(), b"g_mWorld");
    }

    #[test]
    fn test_clear_yields_fresh_address() {
        let (tracker, cache) = cache();
        let before = EffectHandle::interned("g_fTime", &cache).unwrap().as_raw();

        assert_eq!(cache.clear(), 1);
        assert!(cache.is_empty());
        assert_eq!(tracker.live_allocations(), 0);

        let after = EffectHandle::interned("g_fTime", &cache).unwrap().as_raw();
        assert_ne!(before, after);
    }

    #[test]
    fn test_interned_dispose_is_noop() {
        let (tracker, cache) = cache();
        let mut handle = EffectHandle::interned("g_vEye", &cache).unwrap();
        let raw = handle.as_raw();

        handle.dispose();
        drop(handle);
        assert_eq!(tracker.releases(), 0);
        assert_eq!(EffectHandle::interned("g_vEye", &cache).unwrap().as_raw(), raw);
    }

    #[test]
    fn test_private_dispose_frees_once() {
        let tracker = TrackingAllocator::new();
        let allocator: SharedAllocator = tracker.clone();
        let mut handle = EffectHandle::private("g_mWorld", &allocator).unwrap();
        assert!(handle.is_owned());
        assert_eq!(tracker.live_allocations(), 1);

        handle.dispose();
        assert!(handle.is_disposed());
        assert!(handle.is_null());
        assert_eq!(tracker.releases(), 1);

        handle.dispose();
        drop(handle);
        assert_eq!(tracker.releases(), 1);
        assert_eq!(tracker.live_allocations(), 0);
    }

    #[test]
    fn test_private_handles_do_not_share() {
        let tracker = TrackingAllocator::new();
        let allocator: SharedAllocator = tracker.clone();
        let first = EffectHandle::private("g_mWorld", &allocator).unwrap();
        let second = EffectHandle::private("g_mWorld", &allocator).unwrap();
        assert_ne!(first.as_raw(), second.as_raw());

        drop((first, second));
        assert_eq!(tracker.live_allocations(), 0);
    }

    #[test]
    fn test_address_passes_through() {
        let (tracker, _cache) = cache();
        let token = 0x1000 as RawHandle;
        let mut handle = EffectHandle::from_address(token);
        assert_eq!(handle.as_raw(), token);

        handle.dispose();
        assert_eq!(handle.as_raw(), token);
        assert_eq!(tracker.allocations(), 0);
        assert!(EffectHandle::null().is_null());
    }

    #[test]
    fn test_factory_follows_config() {
        let (tracker, cache) = cache();
        let interning = HandleFactory::new(cache.clone(), &InteropConfig::default());
        let private = HandleFactory::new(
            cache.clone(),
            &InteropConfig::default().with_intern_names(false),
        );

        assert!(interning.name("g_fAlpha").unwrap().is_interned());
        let owned = private.name("g_fAlpha").unwrap();
        assert!(owned.is_owned());
        assert_eq!(cache.len(), 1);
        assert_eq!(tracker.live_allocations(), 2);

        drop(owned);
        assert_eq!(tracker.live_allocations(), 1);
    }

    #[test]
    fn test_concurrent_interning() {
        let (_tracker, cache) = cache();
        let names: Vec<String> = (0..16).map(|i| format!("g_param{i}")).collect();

        let results: Vec<Vec<usize>> = thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|_| {
                    let cache = &cache;
                    let names = &names;
                    scope.spawn(move || {
                        names
                            .iter()
                            .map(|name| cache.intern(name).unwrap() as usize)
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert_eq!(cache.len(), names.len());
        for addresses in &results[1..] {
            assert_eq!(addresses, &results[0]);
        }
    }

    #[test]
    fn test_dropping_cache_releases_names() {
        let (tracker, cache) = cache();
        EffectHandle::interned("a", &cache).unwrap();
        EffectHandle::interned("b", &cache).unwrap();
        drop(cache);
        assert_eq!(tracker.live_allocations(), 0);
        assert_eq!(tracker.releases(), 2);
    }
}
