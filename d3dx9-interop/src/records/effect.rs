use crate::abi::{RawEffectDefault, RawEffectInstance};
use crate::ansi;
use crate::error::{InteropError, Result};
use crate::marshal::{read_records, read_slice, FromNative, NativeArena, NativeLayout, ToNative};

/// `D3DXEFFECTDEFAULTTYPE`
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EffectDefaultType {
    /// NUL terminated ANSI text
    String = 1,
    /// An array of `f32`
    Floats = 2,
    /// One 32-bit value
    Dword = 3,
}

impl TryFrom<u32> for EffectDefaultType {
    type Error = InteropError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            1 => Ok(EffectDefaultType::String),
            2 => Ok(EffectDefaultType::Floats),
            3 => Ok(EffectDefaultType::Dword),
            other => Err(InteropError::InvalidArgument(format!(
                "unknown effect default type {other}"
            ))),
        }
    }
}

/// Default value for one effect parameter, as stored in .x files
#[derive(Clone, Debug, PartialEq)]
pub struct EffectDefault {
    /// Parameter the default applies to
    pub param_name: Option<String>,
    /// How `value` is interpreted
    pub kind: EffectDefaultType,
    /// Raw value bytes
    pub value: Vec<u8>,
}

impl EffectDefault {
    /// A float array default
    pub fn floats(name: &str, values: &[f32]) -> Self {
        EffectDefault {
            param_name: Some(name.to_string()),
            kind: EffectDefaultType::Floats,
            value: bytemuck::cast_slice(values).to_vec(),
        }
    }

    /// A single DWORD default
    pub fn dword(name: &str, value: u32) -> Self {
        EffectDefault {
            param_name: Some(name.to_string()),
            kind: EffectDefaultType::Dword,
            value: value.to_ne_bytes().to_vec(),
        }
    }

    /// String defaults carry their terminator in the value bytes
    pub fn string(name: &str, value: &str) -> Result<Self> {
        Ok(EffectDefault {
            param_name: Some(name.to_string()),
            kind: EffectDefaultType::String,
            value: ansi::encode(value)?,
        })
    }

    /// The value as floats, for a well-formed `Floats` default
    pub fn as_floats(&self) -> Option<Vec<f32>> {
        if self.kind != EffectDefaultType::Floats || self.value.len() % 4 != 0 {
            return None;
        }
        Some(bytemuck::pod_collect_to_vec(&self.value))
    }

    /// The value as a DWORD, for a four byte `Dword` default
    pub fn as_dword(&self) -> Option<u32> {
        match (self.kind, <[u8; 4]>::try_from(self.value.as_slice())) {
            (EffectDefaultType::Dword, Ok(bytes)) => Some(u32::from_ne_bytes(bytes)),
            _ => None,
        }
    }

    /// The value up to its terminator, for a `String` default
    pub fn as_string(&self) -> Option<String> {
        if self.kind != EffectDefaultType::String {
            return None;
        }
        let end = self.value.iter().position(|&b| b == 0).unwrap_or(self.value.len());
        Some(ansi::decode(&self.value[..end]))
    }
}

impl NativeLayout for EffectDefault {
    type Native = RawEffectDefault;
}

impl ToNative for EffectDefault {
    fn to_native(&self, arena: &mut NativeArena) -> Result<RawEffectDefault> {
        let param_name = arena.alloc_ansi(self.param_name.as_deref())?;
        let (value, num_bytes) = arena.alloc_bytes(&self.value)?;
        Ok(RawEffectDefault {
            param_name,
            kind: self.kind as u32,
            num_bytes,
            value,
        })
    }
}

impl FromNative for EffectDefault {
    unsafe fn from_native(native: &RawEffectDefault) -> Result<Self> {
        let value = unsafe {
            read_slice(
                native.value.cast_const().cast::<u8>(),
                native.num_bytes,
                "pValue",
            )
        }?;
        Ok(EffectDefault {
            param_name: unsafe { ansi::read_c_str(native.param_name) },
            kind: EffectDefaultType::try_from(native.kind)?,
            value,
        })
    }
}

/// An effect file reference plus its parameter defaults
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EffectInstance {
    /// Effect file the instance refers to
    pub effect_filename: Option<String>,
    /// Parameter defaults
    pub defaults: Vec<EffectDefault>,
}

impl NativeLayout for EffectInstance {
    type Native = RawEffectInstance;
}

impl ToNative for EffectInstance {
    fn to_native(&self, arena: &mut NativeArena) -> Result<RawEffectInstance> {
        let effect_filename = arena.alloc_ansi(self.effect_filename.as_deref())?;
        let (defaults, num_defaults) = arena.alloc_records(&self.defaults)?;
        Ok(RawEffectInstance {
            effect_filename,
            num_defaults,
            defaults,
        })
    }
}

impl FromNative for EffectInstance {
    unsafe fn from_native(native: &RawEffectInstance) -> Result<Self> {
        Ok(EffectInstance {
            effect_filename: unsafe { ansi::read_c_str(native.effect_filename) },
            defaults: unsafe {
                read_records(native.defaults.cast_const(), native.num_defaults, "pDefaults")
            }?,
        })
    }
}
