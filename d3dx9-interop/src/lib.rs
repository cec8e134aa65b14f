//! Marshalling core for Direct3D 9 and D3DX9 bindings.
//!
//! Three pieces move data across the native boundary:
//!
//! - [`marshal`] converts caller-facing records in [`records`] to their
//!   bit-exact native layouts in [`abi`] and back. Memory allocated for a
//!   native call is owned by a [`marshal::Marshalled`] guard and released
//!   on every exit path.
//! - [`accessor`] reads and writes effect parameters and shader constants
//!   as typed values, and [`query`] reads asynchronous query results with
//!   their result types checked against the query kind.
//! - [`handle`] builds parameter handles from raw addresses or from names,
//!   deduplicating names through an explicitly shared [`handle::InternCache`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use d3dx9_interop::{EffectHandle, HeapAllocator, InternCache};
//!
//! let allocator = HeapAllocator::shared();
//! let cache = Arc::new(InternCache::new(&allocator));
//!
//! let first = EffectHandle::interned("g_mWorld", &cache).unwrap();
//! let second = EffectHandle::interned("g_mWorld", &cache).unwrap();
//! assert_eq!(first.as_raw(), second.as_raw());
//! ```

#![warn(missing_debug_implementations, missing_docs)]

pub mod abi;
pub mod accessor;
pub mod alloc;
pub mod ansi;
pub mod config;
pub mod error;
pub mod handle;
pub mod hresult;
pub mod marshal;
pub mod math;
pub mod query;
pub mod records;

#[cfg(any(test, feature = "test-doubles"))]
pub mod testing;

pub use accessor::{ParameterAccessor, ParameterBlock};
pub use alloc::{HeapAllocator, NativeAllocator, NativeBlock, SharedAllocator};
#[cfg(any(test, feature = "test-doubles"))]
pub use alloc::TrackingAllocator;
pub use config::{InteropConfig, ShapeValidation};
pub use error::{InteropError, Result};
pub use handle::{EffectHandle, HandleFactory, InternCache, RawHandle};
pub use hresult::{HResult, NativeBuffer};
pub use marshal::{from_native, to_native, with_native, FromNative, Marshalled, ToNative};
pub use math::{Bool32, Color4, Matrix, Vector4};
pub use query::{NativeQuery, QueryData, QueryKind, QueryReader};
