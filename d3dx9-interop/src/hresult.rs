//! Native result codes and their translation into [`InteropError`]

use std::ffi::c_void;
use std::fmt;
use std::slice;

use crate::ansi;
use crate::error::{InteropError, Result};

/// A native status code. Negative values are failures, `S_FALSE` is the
/// "not ready" status returned by polling calls.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HResult(pub i32);

impl HResult {
    /// `S_OK`
    pub const OK: HResult = HResult(0);
    /// `S_FALSE`
    pub const FALSE: HResult = HResult(1);
    /// `E_FAIL`
    pub const FAIL: HResult = HResult(0x8000_4005_u32 as i32);
    /// `E_OUTOFMEMORY`
    pub const OUT_OF_MEMORY: HResult = HResult(0x8007_000E_u32 as i32);
    /// `E_INVALIDARG`
    pub const INVALID_ARG: HResult = HResult(0x8007_0057_u32 as i32);
    /// `D3DERR_INVALIDCALL`
    pub const INVALID_CALL: HResult = HResult(0x8876_086C_u32 as i32);
    /// `D3DERR_NOTAVAILABLE`
    pub const NOT_AVAILABLE: HResult = HResult(0x8876_086A_u32 as i32);
    /// `D3DERR_DEVICELOST`
    pub const DEVICE_LOST: HResult = HResult(0x8876_0868_u32 as i32);
    /// `D3DERR_WASSTILLDRAWING`
    pub const WAS_STILL_DRAWING: HResult = HResult(0x8876_021C_u32 as i32);
    /// `D3DXERR_INVALIDDATA`
    pub const INVALID_DATA: HResult = HResult(0x8876_0B59_u32 as i32);

    /// Non-negative, `S_FALSE` included
    pub fn is_success(self) -> bool {
        self.0 >= 0
    }

    /// Negative
    pub fn is_failure(self) -> bool {
        self.0 < 0
    }

    /// Symbolic name for the codes the binding layer commonly sees
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            HResult::OK => "S_OK",
            HResult::FALSE => "S_FALSE",
            HResult::FAIL => "E_FAIL",
            HResult::OUT_OF_MEMORY => "E_OUTOFMEMORY",
            HResult::INVALID_ARG => "E_INVALIDARG",
            HResult::INVALID_CALL => "D3DERR_INVALIDCALL",
            HResult::NOT_AVAILABLE => "D3DERR_NOTAVAILABLE",
            HResult::DEVICE_LOST => "D3DERR_DEVICELOST",
            HResult::WAS_STILL_DRAWING => "D3DERR_WASSTILLDRAWING",
            HResult::INVALID_DATA => "D3DXERR_INVALIDDATA",
            _ => return None,
        };
        Some(name)
    }

    /// Success codes (including `S_FALSE`) map to `Ok(())`
    pub fn check(self) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(InteropError::Native {
                code: self,
                message: None,
            })
        }
    }

    /// Polling form: `S_FALSE` means the data is not available yet and is
    /// reported as `Ok(false)` rather than an error.
    pub fn check_ready(self) -> Result<bool> {
        match self {
            HResult::FALSE => Ok(false),
            code if code.is_success() => Ok(true),
            code => Err(InteropError::Native {
                code,
                message: None,
            }),
        }
    }

    /// Like [`HResult::check`], attaching the text of the diagnostic buffer
    /// the native call filled in (compiler output and the like).
    pub fn check_with(self, diagnostics: Option<&dyn NativeBuffer>) -> Result<()> {
        if self.is_success() {
            return Ok(());
        }
        Err(InteropError::Native {
            code: self,
            message: diagnostics.and_then(buffer_text),
        })
    }
}

impl fmt::Display for HResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0 as u32)?;
        if let Some(name) = self.name() {
            write!(f, " ({name})")?;
        }
        Ok(())
    }
}

impl fmt::Debug for HResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HResult({self})")
    }
}

/// A blob owned by the native side, shaped like `ID3DXBuffer`.
///
/// # Safety
/// `buffer_pointer` must point to at least `buffer_size` readable bytes for
/// as long as the implementor is borrowed.
pub unsafe trait NativeBuffer {
    /// `GetBufferPointer`
    fn buffer_pointer(&self) -> *const c_void;
    /// `GetBufferSize`
    fn buffer_size(&self) -> u32;
}

/// Reads the ANSI text held by a diagnostic buffer, up to the first NUL.
/// Empty or whitespace-only buffers yield `None`.
pub fn buffer_text(buffer: &dyn NativeBuffer) -> Option<String> {
    let ptr = buffer.buffer_pointer();
    let size = buffer.buffer_size() as usize;
    if ptr.is_null() || size == 0 {
        return None;
    }
    // SAFETY: guaranteed by the `NativeBuffer` contract.
    let bytes = unsafe { slice::from_raw_parts(ptr.cast::<u8>(), size) };
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let text = ansi::decode(&bytes[..end]);
    let trimmed = text.trim_end();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Blob(Vec<u8>);

    unsafe impl NativeBuffer for Blob {
        fn buffer_pointer(&self) -> *const c_void {
            if self.0.is_empty() {
                std::ptr::null()
            } else {
                self.0.as_ptr().cast()
            }
        }

        fn buffer_size(&self) -> u32 {
            self.0.len() as u32
        }
    }

    #[test]
    fn test_success_codes() {
        assert!(HResult::OK.check().is_ok());
        assert!(HResult::FALSE.check().is_ok());
        assert!(HResult::OK.is_success());
        assert!(HResult::INVALID_CALL.is_failure());
    }

    #[test]
    fn test_failure_maps_to_native_error() {
        let err = HResult::INVALID_CALL.check().unwrap_err();
        assert_eq!(err.native_code(), Some(HResult::INVALID_CALL));
    }

    #[test]
    fn test_check_ready() {
        assert_eq!(HResult::OK.check_ready(), Ok(true));
        assert_eq!(HResult::FALSE.check_ready(), Ok(false));
        assert!(HResult::DEVICE_LOST.check_ready().is_err());
    }

    #[test]
    fn test_display_names_known_codes() {
        assert_eq!(HResult::OK.to_string(), "0x00000000 (S_OK)");
        assert_eq!(HResult(0x1234).to_string(), "0x00001234");
        assert_eq!(
            HResult::WAS_STILL_DRAWING.to_string(),
            "0x8876021C (D3DERR_WASSTILLDRAWING)"
        );
    }

    #[test]
    fn test_check_with_diagnostics() {
        let blob = Blob(b"shader.fx(3,1): error X3000: unexpected token\n\0junk".to_vec());
        let err = HResult::FAIL.check_with(Some(&blob)).unwrap_err();
        assert_eq!(
            err,
            InteropError::Native {
                code: HResult::FAIL,
                message: Some("shader.fx(3,1): error X3000: unexpected token".to_string()),
            }
        );

        // Success never reads the buffer
        assert!(HResult::OK.check_with(Some(&blob)).is_ok());
    }

    #[test]
    fn test_empty_diagnostics_are_dropped() {
        assert_eq!(buffer_text(&Blob(Vec::new())), None);
        assert_eq!(buffer_text(&Blob(b" \n\0".to_vec())), None);
        let err = HResult::FAIL.check_with(None).unwrap_err();
        assert_eq!(
            err,
            InteropError::Native {
                code: HResult::FAIL,
                message: None
            }
        );
    }
}
