//! Typed access to effect parameters and shader constants.
//!
//! The native side stores every parameter as untyped bytes. The generic path
//! sizes each transfer from the caller's type; the specialised overloads map
//! to the dedicated native entry points for the well-known shapes.

use std::any::type_name;
use std::ffi::c_void;
use std::mem::size_of;

use bytemuck::Pod;
use tracing::debug;

use crate::config::{InteropConfig, ShapeValidation};
use crate::error::{InteropError, Result};
use crate::handle::{EffectHandle, RawHandle};
use crate::hresult::HResult;
use crate::math::{Bool32, Matrix, Vector4};

/// Native parameter store, shaped like `ID3DXBaseEffect` and
/// `ID3DXConstantTable`.
pub trait ParameterBlock {
    /// `GetValue`
    ///
    /// # Safety
    /// `data` must be writable for `bytes` bytes.
    unsafe fn get_value(&self, handle: RawHandle, data: *mut c_void, bytes: u32) -> HResult;
    /// `SetValue`
    ///
    /// # Safety
    /// `data` must be readable for `bytes` bytes.
    unsafe fn set_value(&self, handle: RawHandle, data: *const c_void, bytes: u32) -> HResult;

    /// `GetBool`
    fn get_bool(&self, handle: RawHandle, value: &mut Bool32) -> HResult;
    /// `SetBool`
    fn set_bool(&self, handle: RawHandle, value: Bool32) -> HResult;
    /// `GetBoolArray`
    ///
    /// # Safety
    /// `values` must be writable for `count` elements.
    unsafe fn get_bool_array(&self, handle: RawHandle, values: *mut Bool32, count: u32) -> HResult;
    /// `SetBoolArray`
    ///
    /// # Safety
    /// `values` must be readable for `count` elements.
    unsafe fn set_bool_array(&self, handle: RawHandle, values: *const Bool32, count: u32)
        -> HResult;

    /// `GetInt`
    fn get_int(&self, handle: RawHandle, value: &mut i32) -> HResult;
    /// `SetInt`
    fn set_int(&self, handle: RawHandle, value: i32) -> HResult;
    /// `GetIntArray`
    ///
    /// # Safety
    /// `values` must be writable for `count` elements.
    unsafe fn get_int_array(&self, handle: RawHandle, values: *mut i32, count: u32) -> HResult;
    /// `SetIntArray`
    ///
    /// # Safety
    /// `values` must be readable for `count` elements.
    unsafe fn set_int_array(&self, handle: RawHandle, values: *const i32, count: u32) -> HResult;

    /// `GetFloat`
    fn get_float(&self, handle: RawHandle, value: &mut f32) -> HResult;
    /// `SetFloat`
    fn set_float(&self, handle: RawHandle, value: f32) -> HResult;
    /// `GetFloatArray`
    ///
    /// # Safety
    /// `values` must be writable for `count` elements.
    unsafe fn get_float_array(&self, handle: RawHandle, values: *mut f32, count: u32) -> HResult;
    /// `SetFloatArray`
    ///
    /// # Safety
    /// `values` must be readable for `count` elements.
    unsafe fn set_float_array(&self, handle: RawHandle, values: *const f32, count: u32)
        -> HResult;

    /// `GetVector`
    fn get_vector(&self, handle: RawHandle, value: &mut Vector4) -> HResult;
    /// `SetVector`
    fn set_vector(&self, handle: RawHandle, value: &Vector4) -> HResult;
    /// `GetVectorArray`
    ///
    /// # Safety
    /// `values` must be writable for `count` elements.
    unsafe fn get_vector_array(&self, handle: RawHandle, values: *mut Vector4, count: u32)
        -> HResult;
    /// `SetVectorArray`
    ///
    /// # Safety
    /// `values` must be readable for `count` elements.
    unsafe fn set_vector_array(
        &self,
        handle: RawHandle,
        values: *const Vector4,
        count: u32,
    ) -> HResult;

    /// `GetMatrix`
    fn get_matrix(&self, handle: RawHandle, value: &mut Matrix) -> HResult;
    /// `SetMatrix`
    fn set_matrix(&self, handle: RawHandle, value: &Matrix) -> HResult;
    /// `GetMatrixArray`
    ///
    /// # Safety
    /// `values` must be writable for `count` elements.
    unsafe fn get_matrix_array(&self, handle: RawHandle, values: *mut Matrix, count: u32)
        -> HResult;
    /// `SetMatrixArray`
    ///
    /// # Safety
    /// `values` must be readable for `count` elements.
    unsafe fn set_matrix_array(&self, handle: RawHandle, values: *const Matrix, count: u32)
        -> HResult;

    /// Size in bytes the native side declares for the parameter, when it can
    /// tell. Only consulted under [`ShapeValidation::Strict`].
    fn parameter_bytes(&self, _handle: RawHandle) -> Option<u32> {
        None
    }
}

fn transfer_bytes<T>(count: usize) -> Result<u32> {
    size_of::<T>()
        .checked_mul(count)
        .and_then(|bytes| u32::try_from(bytes).ok())
        .ok_or_else(|| {
            InteropError::InvalidArgument(format!(
                "{count} values of {} exceed the native size range",
                type_name::<T>()
            ))
        })
}

fn element_count(count: usize) -> Result<u32> {
    u32::try_from(count)
        .map_err(|_| InteropError::InvalidArgument(format!("array of {count} elements")))
}

/// Reads and writes parameters of a [`ParameterBlock`].
///
/// Matching `T` to the parameter's real shape is the caller's job unless
/// strict validation is configured and the block reports parameter sizes.
#[derive(Debug)]
pub struct ParameterAccessor<'a, P: ?Sized> {
    block: &'a P,
    validation: ShapeValidation,
}

impl<'a, P: ParameterBlock + ?Sized> ParameterAccessor<'a, P> {
    /// Accessor over `block`, validating shapes as `config` asks
    pub fn new(block: &'a P, config: &InteropConfig) -> Self {
        ParameterAccessor {
            block,
            validation: config.shape_validation,
        }
    }

    /// The underlying parameter store
    pub fn block(&self) -> &'a P {
        self.block
    }

    fn validate<T>(&self, handle: RawHandle, bytes: u32) -> Result<()> {
        if self.validation == ShapeValidation::Off {
            return Ok(());
        }
        match self.block.parameter_bytes(handle) {
            Some(expected) if expected != bytes => {
                debug!(
                    name: "accessor.shape_mismatch",
                    target: "d3dx9-interop",
                    value_type = type_name::<T>(),
                    expected = expected,
                    actual = bytes
                );
                Err(InteropError::ShapeMismatch {
                    type_name: type_name::<T>(),
                    expected,
                    actual: bytes,
                })
            }
            _ => Ok(()),
        }
    }

    /// Reads exactly `size_of::<T>()` bytes into a zeroed `T`.
    pub fn get<T: Pod>(&self, handle: &EffectHandle) -> Result<T> {
        let raw = handle.as_raw();
        let bytes = transfer_bytes::<T>(1)?;
        self.validate::<T>(raw, bytes)?;
        let mut value = T::zeroed();
        // SAFETY: `value` is a live T spanning `bytes` bytes, and any bit
        // pattern is a valid T.
        unsafe {
            self.block
                .get_value(raw, (&mut value as *mut T).cast(), bytes)
                .check()?;
        }
        Ok(value)
    }

    /// Reads `count` contiguous values. A zero count makes no native call.
    pub fn get_array<T: Pod>(&self, handle: &EffectHandle, count: usize) -> Result<Vec<T>> {
        let raw = handle.as_raw();
        let bytes = transfer_bytes::<T>(count)?;
        if count == 0 {
            return Ok(Vec::new());
        }
        self.validate::<T>(raw, bytes)?;
        let mut values = vec![T::zeroed(); count];
        // SAFETY: `values` holds `count` elements, `bytes` bytes in total.
        unsafe {
            self.block
                .get_value(raw, values.as_mut_ptr().cast(), bytes)
                .check()?;
        }
        Ok(values)
    }

    /// Writes exactly `size_of::<T>()` bytes.
    pub fn set<T: Pod>(&self, handle: &EffectHandle, value: &T) -> Result<()> {
        let raw = handle.as_raw();
        let bytes = transfer_bytes::<T>(1)?;
        self.validate::<T>(raw, bytes)?;
        // SAFETY: `value` is borrowed for the whole call.
        unsafe {
            self.block
                .set_value(raw, (value as *const T).cast(), bytes)
                .check()
        }
    }

    /// Writes the slice as one contiguous value. An empty slice makes no
    /// native call.
    pub fn set_array<T: Pod>(&self, handle: &EffectHandle, values: &[T]) -> Result<()> {
        let raw = handle.as_raw();
        let bytes = transfer_bytes::<T>(values.len())?;
        if values.is_empty() {
            return Ok(());
        }
        self.validate::<T>(raw, bytes)?;
        // SAFETY: the slice is borrowed for the whole call.
        unsafe {
            self.block
                .set_value(raw, values.as_ptr().cast(), bytes)
                .check()
        }
    }

    /// Reads a native `BOOL`
    pub fn get_bool(&self, handle: &EffectHandle) -> Result<bool> {
        let mut value = Bool32::FALSE;
        self.block.get_bool(handle.as_raw(), &mut value).check()?;
        Ok(value.get())
    }

    /// Writes a native `BOOL`
    pub fn set_bool(&self, handle: &EffectHandle, value: bool) -> Result<()> {
        self.block
            .set_bool(handle.as_raw(), Bool32::from(value))
            .check()
    }

    /// Reads `count` native `BOOL`s, narrowed to `bool`
    pub fn get_bools(&self, handle: &EffectHandle, count: usize) -> Result<Vec<bool>> {
        let natives = self.get_typed_array(handle, count, |raw, ptr, n| unsafe {
            self.block.get_bool_array(raw, ptr, n)
        })?;
        Ok(natives.into_iter().map(Bool32::get).collect())
    }

    /// Each element is widened to the four byte native `BOOL` first.
    pub fn set_bools(&self, handle: &EffectHandle, values: &[bool]) -> Result<()> {
        let natives: Vec<Bool32> = values.iter().copied().map(Bool32::from).collect();
        self.set_typed_array(handle, &natives, |raw, ptr, n| unsafe {
            self.block.set_bool_array(raw, ptr, n)
        })
    }

    /// Reads through `GetInt`
    pub fn get_int(&self, handle: &EffectHandle) -> Result<i32> {
        let mut value = 0;
        self.block.get_int(handle.as_raw(), &mut value).check()?;
        Ok(value)
    }

    /// Writes through `SetInt`
    pub fn set_int(&self, handle: &EffectHandle, value: i32) -> Result<()> {
        self.block.set_int(handle.as_raw(), value).check()
    }

    /// Reads through `GetIntArray`
    pub fn get_ints(&self, handle: &EffectHandle, count: usize) -> Result<Vec<i32>> {
        self.get_typed_array(handle, count, |raw, ptr, n| unsafe {
            self.block.get_int_array(raw, ptr, n)
        })
    }

    /// Writes through `SetIntArray`
    pub fn set_ints(&self, handle: &EffectHandle, values: &[i32]) -> Result<()> {
        self.set_typed_array(handle, values, |raw, ptr, n| unsafe {
            self.block.set_int_array(raw, ptr, n)
        })
    }

    /// Reads through `GetFloat`
    pub fn get_float(&self, handle: &EffectHandle) -> Result<f32> {
        let mut value = 0.0;
        self.block.get_float(handle.as_raw(), &mut value).check()?;
        Ok(value)
    }

    /// Writes through `SetFloat`
    pub fn set_float(&self, handle: &EffectHandle, value: f32) -> Result<()> {
        self.block.set_float(handle.as_raw(), value).check()
    }

    /// Reads through `GetFloatArray`
    pub fn get_floats(&self, handle: &EffectHandle, count: usize) -> Result<Vec<f32>> {
        self.get_typed_array(handle, count, |raw, ptr, n| unsafe {
            self.block.get_float_array(raw, ptr, n)
        })
    }

    /// Writes through `SetFloatArray`
    pub fn set_floats(&self, handle: &EffectHandle, values: &[f32]) -> Result<()> {
        self.set_typed_array(handle, values, |raw, ptr, n| unsafe {
            self.block.set_float_array(raw, ptr, n)
        })
    }

    /// Reads through `GetVector`
    pub fn get_vector(&self, handle: &EffectHandle) -> Result<Vector4> {
        let mut value = Vector4::default();
        self.block.get_vector(handle.as_raw(), &mut value).check()?;
        Ok(value)
    }

    /// Writes through `SetVector`
    pub fn set_vector(&self, handle: &EffectHandle, value: &Vector4) -> Result<()> {
        self.block.set_vector(handle.as_raw(), value).check()
    }

    /// Reads through `GetVectorArray`
    pub fn get_vectors(&self, handle: &EffectHandle, count: usize) -> Result<Vec<Vector4>> {
        self.get_typed_array(handle, count, |raw, ptr, n| unsafe {
            self.block.get_vector_array(raw, ptr, n)
        })
    }

    /// Writes through `SetVectorArray`
    pub fn set_vectors(&self, handle: &EffectHandle, values: &[Vector4]) -> Result<()> {
        self.set_typed_array(handle, values, |raw, ptr, n| unsafe {
            self.block.set_vector_array(raw, ptr, n)
        })
    }

    /// Reads through `GetMatrix`
    pub fn get_matrix(&self, handle: &EffectHandle) -> Result<Matrix> {
        let mut value = Matrix::IDENTITY;
        self.block.get_matrix(handle.as_raw(), &mut value).check()?;
        Ok(value)
    }

    /// Writes through `SetMatrix`
    pub fn set_matrix(&self, handle: &EffectHandle, value: &Matrix) -> Result<()> {
        self.block.set_matrix(handle.as_raw(), value).check()
    }

    /// Reads through `GetMatrixArray`
    pub fn get_matrices(&self, handle: &EffectHandle, count: usize) -> Result<Vec<Matrix>> {
        self.get_typed_array(handle, count, |raw, ptr, n| unsafe {
            self.block.get_matrix_array(raw, ptr, n)
        })
    }

    /// Writes through `SetMatrixArray`
    pub fn set_matrices(&self, handle: &EffectHandle, values: &[Matrix]) -> Result<()> {
        self.set_typed_array(handle, values, |raw, ptr, n| unsafe {
            self.block.set_matrix_array(raw, ptr, n)
        })
    }

    // `call` receives a pointer to `count` zeroed elements.
    fn get_typed_array<T, F>(&self, handle: &EffectHandle, count: usize, call: F) -> Result<Vec<T>>
    where
        T: Pod,
        F: FnOnce(RawHandle, *mut T, u32) -> HResult,
    {
        let n = element_count(count)?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut values = vec![T::zeroed(); count];
        call(handle.as_raw(), values.as_mut_ptr(), n).check()?;
        Ok(values)
    }

    fn set_typed_array<T, F>(&self, handle: &EffectHandle, values: &[T], call: F) -> Result<()>
    where
        T: Pod,
        F: FnOnce(RawHandle, *const T, u32) -> HResult,
    {
        let n = element_count(values.len())?;
        if values.is_empty() {
            return Ok(());
        }
        call(handle.as_raw(), values.as_ptr(), n).check()
    }
}
