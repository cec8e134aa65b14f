//! Single-byte string codec used for every string that crosses the boundary.
//!
//! Characters map one to one onto bytes (code points 0..=255), so encoding is
//! lossless for everything it accepts and decoding never fails.

use std::ffi::{c_char, CStr};

use crate::error::{InteropError, Result};

/// Encodes `text` as a NUL terminated byte string.
pub fn encode(text: &str) -> Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(text.len() + 1);
    for ch in text.chars() {
        match u32::from(ch) {
            0 => return Err(InteropError::InteriorNul),
            code @ 1..=0xFF => bytes.push(code as u8),
            _ => return Err(InteropError::NotAnsi(ch)),
        }
    }
    bytes.push(0);
    Ok(bytes)
}

/// Decodes bytes (without terminator) back into a string.
pub fn decode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Reads a NUL terminated string owned by the native side.
///
/// # Safety
/// `ptr` must be null or point to a readable NUL terminated byte string.
pub unsafe fn read_c_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    let bytes = unsafe { CStr::from_ptr(ptr) }.to_bytes();
    Some(decode(bytes))
}
