//! In-memory stand-ins for the native library, used by the unit tests, the
//! benches and the example.

use std::collections::HashMap;
use std::ffi::c_void;
use std::mem::size_of;
use std::ptr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytemuck::Pod;

use crate::accessor::ParameterBlock;
use crate::ansi;
use crate::handle::RawHandle;
use crate::hresult::{HResult, NativeBuffer};
use crate::math::{Bool32, Matrix, Vector4};
use crate::query::{NativeQuery, QueryKind};

/// One call received by [`MockEffect`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MockCall {
    /// Trait method that was called
    pub entry: &'static str,
    /// Parameter name the handle pointed at
    pub parameter: String,
    /// Bytes transferred
    pub bytes: u32,
}

#[derive(Debug, Default)]
struct EffectState {
    values: HashMap<String, Vec<u8>>,
    declared: HashMap<String, u32>,
    calls: Vec<MockCall>,
    skip_call_log: bool,
    fail_next: Option<HResult>,
}

/// Parameter store keyed by parameter name.
///
/// Handles must point at NUL-terminated names, as interned and private
/// handles do. Unknown parameters fail with `D3DERR_INVALIDCALL`.
#[derive(Debug, Default)]
pub struct MockEffect {
    state: Mutex<EffectState>,
}

impl MockEffect {
    /// Empty store with a call log
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps no call log, for long benchmark and stress loops
    pub fn without_call_log() -> Self {
        let effect = Self::default();
        effect.lock().skip_call_log = true;
        effect
    }

    fn lock(&self) -> MutexGuard<'_, EffectState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates a parameter holding `value` and reports its size to strict
    /// shape validation.
    pub fn declare<T: Pod>(&self, name: &str, value: &T) {
        let mut state = self.lock();
        state
            .values
            .insert(name.to_string(), bytemuck::bytes_of(value).to_vec());
        state
            .declared
            .insert(name.to_string(), size_of::<T>() as u32);
    }

    /// Current bytes of a parameter
    pub fn stored(&self, name: &str) -> Option<Vec<u8>> {
        self.lock().values.get(name).cloned()
    }

    /// Calls received so far, oldest first
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    /// The next call returns `code` without touching any parameter
    pub fn fail_next(&self, code: HResult) {
        self.lock().fail_next = Some(code);
    }

    fn begin(
        &self,
        entry: &'static str,
        handle: RawHandle,
        bytes: u32,
    ) -> Result<(MutexGuard<'_, EffectState>, String), HResult> {
        // SAFETY: handles given to the mock are name pointers.
        let Some(name) = (unsafe { ansi::read_c_str(handle) }) else {
            return Err(HResult::INVALID_ARG);
        };
        let mut state = self.lock();
        if !state.skip_call_log {
            state.calls.push(MockCall {
                entry,
                parameter: name.clone(),
                bytes,
            });
        }
        if let Some(code) = state.fail_next.take() {
            return Err(code);
        }
        Ok((state, name))
    }

    unsafe fn read(
        &self,
        entry: &'static str,
        handle: RawHandle,
        data: *mut u8,
        bytes: u32,
    ) -> HResult {
        let (state, name) = match self.begin(entry, handle, bytes) {
            Ok(begun) => begun,
            Err(code) => return code,
        };
        let Some(value) = state.values.get(&name) else {
            return HResult::INVALID_CALL;
        };
        let len = value.len().min(bytes as usize);
        unsafe { ptr::copy_nonoverlapping(value.as_ptr(), data, len) };
        HResult::OK
    }

    unsafe fn write(
        &self,
        entry: &'static str,
        handle: RawHandle,
        data: *const u8,
        bytes: u32,
    ) -> HResult {
        let (mut state, name) = match self.begin(entry, handle, bytes) {
            Ok(begun) => begun,
            Err(code) => return code,
        };
        let value = unsafe { std::slice::from_raw_parts(data, bytes as usize) }.to_vec();
        state.values.insert(name, value);
        HResult::OK
    }
}

macro_rules! typed_reads_and_array_writes {
    ($ty:ty, $get:ident, $get_array:ident, $set_array:ident) => {
        fn $get(&self, handle: RawHandle, value: &mut $ty) -> HResult {
            unsafe {
                self.read(
                    stringify!($get),
                    handle,
                    (value as *mut $ty).cast(),
                    size_of::<$ty>() as u32,
                )
            }
        }

        unsafe fn $get_array(&self, handle: RawHandle, values: *mut $ty, count: u32) -> HResult {
            let bytes = count * size_of::<$ty>() as u32;
            unsafe { self.read(stringify!($get_array), handle, values.cast(), bytes) }
        }

        unsafe fn $set_array(&self, handle: RawHandle, values: *const $ty, count: u32) -> HResult {
            let bytes = count * size_of::<$ty>() as u32;
            unsafe { self.write(stringify!($set_array), handle, values.cast(), bytes) }
        }
    };
}

impl ParameterBlock for MockEffect {
    unsafe fn get_value(&self, handle: RawHandle, data: *mut c_void, bytes: u32) -> HResult {
        unsafe { self.read("get_value", handle, data.cast(), bytes) }
    }

    unsafe fn set_value(&self, handle: RawHandle, data: *const c_void, bytes: u32) -> HResult {
        unsafe { self.write("set_value", handle, data.cast(), bytes) }
    }

    typed_reads_and_array_writes!(Bool32, get_bool, get_bool_array, set_bool_array);
    typed_reads_and_array_writes!(i32, get_int, get_int_array, set_int_array);
    typed_reads_and_array_writes!(f32, get_float, get_float_array, set_float_array);
    typed_reads_and_array_writes!(Vector4, get_vector, get_vector_array, set_vector_array);
    typed_reads_and_array_writes!(Matrix, get_matrix, get_matrix_array, set_matrix_array);

    fn set_bool(&self, handle: RawHandle, value: Bool32) -> HResult {
        unsafe { self.write("set_bool", handle, (&value as *const Bool32).cast(), 4) }
    }

    fn set_int(&self, handle: RawHandle, value: i32) -> HResult {
        unsafe { self.write("set_int", handle, (&value as *const i32).cast(), 4) }
    }

    fn set_float(&self, handle: RawHandle, value: f32) -> HResult {
        unsafe { self.write("set_float", handle, (&value as *const f32).cast(), 4) }
    }

    fn set_vector(&self, handle: RawHandle, value: &Vector4) -> HResult {
        unsafe { self.write("set_vector", handle, (value as *const Vector4).cast(), 16) }
    }

    fn set_matrix(&self, handle: RawHandle, value: &Matrix) -> HResult {
        unsafe { self.write("set_matrix", handle, (value as *const Matrix).cast(), 64) }
    }

    fn parameter_bytes(&self, handle: RawHandle) -> Option<u32> {
        let name = unsafe { ansi::read_c_str(handle) }?;
        self.lock().declared.get(&name).copied()
    }
}

#[derive(Debug, Default)]
struct QueryState {
    polls: u32,
    flags: Vec<u32>,
    issued: Vec<u32>,
}

/// Query that reports `S_FALSE` for its first `ready_after` polls
#[derive(Debug)]
pub struct MockQuery {
    kind: QueryKind,
    result: Vec<u8>,
    ready_after: u32,
    failure: Option<HResult>,
    state: Mutex<QueryState>,
}

impl MockQuery {
    /// Query of `kind` that completes with the bytes of `result`
    pub fn new<T: Pod>(kind: QueryKind, result: &T) -> Self {
        MockQuery {
            kind,
            result: bytemuck::bytes_of(result).to_vec(),
            ready_after: 0,
            failure: None,
            state: Mutex::new(QueryState::default()),
        }
    }

    /// Report `S_FALSE` for the first `polls` polls
    pub fn ready_after(mut self, polls: u32) -> Self {
        self.ready_after = polls;
        self
    }

    /// Every `get_data` call fails with `code`
    pub fn failing(mut self, code: HResult) -> Self {
        self.failure = Some(code);
        self
    }

    fn lock(&self) -> MutexGuard<'_, QueryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `get_data` calls so far
    pub fn polls(&self) -> u32 {
        self.lock().polls
    }

    /// Flags passed to each `get_data` call
    pub fn flags(&self) -> Vec<u32> {
        self.lock().flags.clone()
    }

    /// Flags passed to each `issue` call
    pub fn issued(&self) -> Vec<u32> {
        self.lock().issued.clone()
    }
}

impl NativeQuery for MockQuery {
    fn kind(&self) -> QueryKind {
        self.kind
    }

    fn data_size(&self) -> u32 {
        self.kind.result_size() as u32
    }

    fn issue(&self, flags: u32) -> HResult {
        self.lock().issued.push(flags);
        HResult::OK
    }

    unsafe fn get_data(&self, data: *mut c_void, size: u32, flags: u32) -> HResult {
        let mut state = self.lock();
        state.polls += 1;
        state.flags.push(flags);
        if let Some(code) = self.failure {
            return code;
        }
        if state.polls <= self.ready_after {
            return HResult::FALSE;
        }
        if !data.is_null() {
            let len = self.result.len().min(size as usize);
            unsafe { ptr::copy_nonoverlapping(self.result.as_ptr(), data.cast::<u8>(), len) };
        }
        HResult::OK
    }
}

/// Diagnostic buffer holding ANSI text
#[derive(Debug, Clone, Default)]
pub struct MockBuffer(pub Vec<u8>);

impl MockBuffer {
    /// Text plus a terminating NUL
    pub fn from_text(text: &str) -> Self {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        MockBuffer(bytes)
    }
}

unsafe impl NativeBuffer for MockBuffer {
    fn buffer_pointer(&self) -> *const c_void {
        if self.0.is_empty() {
            ptr::null()
        } else {
            self.0.as_ptr().cast()
        }
    }

    fn buffer_size(&self) -> u32 {
        self.0.len() as u32
    }
}
