use std::ptr;
use std::slice;

use crate::abi::{RawConstantDesc, RawMacro};
use crate::ansi;
use crate::error::{InteropError, Result};
use crate::marshal::{FromNative, NativeArena, NativeLayout, ToNative};

/// A preprocessor definition passed to the shader and effect compilers.
///
/// `#define X` and `#define X ""` are distinct: a `None` definition is
/// passed as null, while `Some("")` is passed as an empty C string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderMacro {
    /// Macro name; must not be empty
    pub name: String,
    /// Replacement text, or `None` for a bare flag
    pub definition: Option<String>,
}

impl ShaderMacro {
    /// A macro with replacement text
    pub fn new(name: impl Into<String>, definition: impl Into<String>) -> Self {
        ShaderMacro {
            name: name.into(),
            definition: Some(definition.into()),
        }
    }

    /// A macro defined without replacement text
    pub fn flag(name: impl Into<String>) -> Self {
        ShaderMacro {
            name: name.into(),
            definition: None,
        }
    }
}

/// Macro list in the native form: an array closed by an all-null entry.
/// An empty list is passed as a null pointer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShaderMacros(pub Vec<ShaderMacro>);

impl NativeLayout for ShaderMacros {
    type Native = *const RawMacro;
}

impl ToNative for ShaderMacros {
    fn to_native(&self, arena: &mut NativeArena) -> Result<*const RawMacro> {
        if self.0.is_empty() {
            return Ok(ptr::null());
        }
        let mut natives = Vec::with_capacity(self.0.len() + 1);
        for shader_macro in &self.0 {
            // A null name would end the list early
            if shader_macro.name.is_empty() {
                return Err(InteropError::InvalidArgument(
                    "shader macro name must not be empty".to_string(),
                ));
            }
            natives.push(RawMacro {
                name: arena.alloc_ansi(Some(&shader_macro.name))?.cast_const(),
                definition: match shader_macro.definition.as_deref() {
                    Some(definition) => arena.alloc_c_str(definition)?.cast_const(),
                    None => ptr::null(),
                },
            });
        }
        natives.push(RawMacro {
            name: ptr::null(),
            definition: ptr::null(),
        });
        let (list, _) = arena.alloc_slice(&natives)?;
        Ok(list.cast_const())
    }
}

impl FromNative for ShaderMacros {
    unsafe fn from_native(native: &*const RawMacro) -> Result<Self> {
        let mut macros = Vec::new();
        let mut cursor = *native;
        if cursor.is_null() {
            return Ok(ShaderMacros(macros));
        }
        loop {
            let entry = unsafe { *cursor };
            let Some(name) = (unsafe { ansi::read_c_str(entry.name) }) else {
                break;
            };
            macros.push(ShaderMacro {
                name,
                definition: unsafe { ansi::read_c_str(entry.definition) },
            });
            cursor = unsafe { cursor.add(1) };
        }
        Ok(ShaderMacros(macros))
    }
}

/// `D3DXREGISTER_SET`
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterSet {
    /// Boolean registers
    Bool = 0,
    /// Integer vector registers
    Int4 = 1,
    /// Float vector registers
    Float4 = 2,
    /// Sampler registers
    Sampler = 3,
}

impl TryFrom<u32> for RegisterSet {
    type Error = InteropError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(RegisterSet::Bool),
            1 => Ok(RegisterSet::Int4),
            2 => Ok(RegisterSet::Float4),
            3 => Ok(RegisterSet::Sampler),
            other => Err(InteropError::InvalidArgument(format!(
                "unknown register set {other}"
            ))),
        }
    }
}

/// Description of one shader constant, read back from a constant table.
///
/// The native side owns the name and default value; both are copied out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstantDescription {
    /// Constant name
    pub name: Option<String>,
    /// Register bank the constant lives in
    pub register_set: RegisterSet,
    /// First register
    pub register_index: u32,
    /// Registers used
    pub register_count: u32,
    /// Raw `D3DXPARAMETER_CLASS`
    pub class: u32,
    /// Raw `D3DXPARAMETER_TYPE`
    pub kind: u32,
    /// Matrix rows, or 1
    pub rows: u32,
    /// Matrix columns, or vector width
    pub columns: u32,
    /// Array elements, 1 for a scalar constant
    pub elements: u32,
    /// Members, for a structure constant
    pub struct_members: u32,
    /// Size of the constant in bytes
    pub bytes: u32,
    /// Copy of the default value, when the table has one
    pub default_value: Option<Vec<u8>>,
}

impl NativeLayout for ConstantDescription {
    type Native = RawConstantDesc;
}

impl FromNative for ConstantDescription {
    unsafe fn from_native(native: &RawConstantDesc) -> Result<Self> {
        // `Bytes` is the size of the constant itself and is non-zero even
        // when there is no default value, so a null pointer here is "absent".
        let default_value = if native.default_value.is_null() || native.bytes == 0 {
            None
        } else {
            let bytes = unsafe {
                slice::from_raw_parts(native.default_value.cast::<u8>(), native.bytes as usize)
            };
            Some(bytes.to_vec())
        };
        Ok(ConstantDescription {
            name: unsafe { ansi::read_c_str(native.name) },
            register_set: RegisterSet::try_from(native.register_set)?,
            register_index: native.register_index,
            register_count: native.register_count,
            class: native.class,
            kind: native.kind,
            rows: native.rows,
            columns: native.columns,
            elements: native.elements,
            struct_members: native.struct_members,
            bytes: native.bytes,
            default_value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::{SharedAllocator, TrackingAllocator};
    use crate::marshal::{from_native, to_native};
    use std::ffi::CStr;

    #[test]
    fn test_macro_list_is_null_terminated() {
        let tracker = TrackingAllocator::new();
        let allocator: SharedAllocator = tracker.clone();
        let macros = ShaderMacros(vec![
            ShaderMacro::new("NUM_LIGHTS", "4"),
            ShaderMacro::flag("USE_FOG"),
        ]);

        let marshalled = to_native(&macros, &allocator).unwrap();
        let list = *marshalled.native();
        let entries = unsafe { std::slice::from_raw_parts(list, 3) };
        assert_eq!(unsafe { CStr::from_ptr(entries[0].name) }.to_bytes(), b"NUM_LIGHTS");
        assert_eq!(unsafe { CStr::from_ptr(entries[0].definition) }.to_bytes(), b"4");
        assert!(entries[1].definition.is_null());
        assert!(entries[2].name.is_null());
        assert!(entries[2].definition.is_null());

        let read: ShaderMacros = unsafe { from_native(marshalled.native()) }.unwrap();
        assert_eq!(read, macros);

        marshalled.release();
        assert_eq!(tracker.live_allocations(), 0);
    }

    #[test]
    fn test_empty_definition_is_not_null() {
        let tracker = TrackingAllocator::new();
        let allocator: SharedAllocator = tracker.clone();
        let macros = ShaderMacros(vec![
            ShaderMacro::new("EMPTY", ""),
            ShaderMacro::flag("BARE"),
        ]);

        let marshalled = to_native(&macros, &allocator).unwrap();
        let entries = unsafe { std::slice::from_raw_parts(*marshalled.native(), 3) };
        assert!(!entries[0].definition.is_null());
        assert_eq!(unsafe { CStr::from_ptr(entries[0].definition) }.to_bytes(), b"");
        assert!(entries[1].definition.is_null());

        let read: ShaderMacros = unsafe { from_native(marshalled.native()) }.unwrap();
        assert_eq!(read.0[0].definition.as_deref(), Some(""));
        assert_eq!(read.0[1].definition, None);
        assert_eq!(read, macros);

        marshalled.release();
        assert_eq!(tracker.live_allocations(), 0);
    }

    #[test]
    fn test_empty_macro_list_is_null() {
        let tracker = TrackingAllocator::new();
        let allocator: SharedAllocator = tracker.clone();
        let marshalled = to_native(&ShaderMacros::default(), &allocator).unwrap();
        assert!(marshalled.native().is_null());
        assert_eq!(tracker.allocations(), 0);

        let read: ShaderMacros = unsafe { from_native(marshalled.native()) }.unwrap();
        assert!(read.0.is_empty());
    }

    #[test]
    fn test_unnamed_macro_is_rejected() {
        let tracker = TrackingAllocator::new();
        let allocator: SharedAllocator = tracker.clone();
        let macros = ShaderMacros(vec![ShaderMacro::flag("A"), ShaderMacro::flag("")]);

        let err = to_native(&macros, &allocator).unwrap_err();
        assert!(matches!(err, InteropError::InvalidArgument(_)));
        assert_eq!(tracker.live_allocations(), 0);
    }

    #[test]
    fn test_constant_description_copies_native_data() {
        let name = b"g_mWorldViewProj\0";
        let default = [1.0f32, 0.0, 0.0, 0.0];
        let native = RawConstantDesc {
            name: name.as_ptr().cast(),
            register_set: 2,
            register_index: 4,
            register_count: 4,
            class: 3,
            kind: 3,
            rows: 4,
            columns: 4,
            elements: 1,
            struct_members: 0,
            bytes: 16,
            default_value: default.as_ptr().cast(),
        };

        let desc: ConstantDescription = unsafe { from_native(&native) }.unwrap();
        assert_eq!(desc.name.as_deref(), Some("g_mWorldViewProj"));
        assert_eq!(desc.register_set, RegisterSet::Float4);
        assert_eq!(desc.default_value.as_deref(), Some(bytemuck::cast_slice(&default[..])));

        let without_default = RawConstantDesc {
            default_value: std::ptr::null(),
            bytes: 64,
            ..native
        };
        let desc: ConstantDescription = unsafe { from_native(&without_default) }.unwrap();
        assert_eq!(desc.default_value, None);
        assert_eq!(desc.bytes, 64);
    }
}
