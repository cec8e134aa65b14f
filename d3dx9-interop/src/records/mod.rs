//! Caller-facing records and their conversions to the native layouts in
//! [`crate::abi`].

mod effect;
mod mesh;
mod shader;

pub use effect::{EffectDefault, EffectDefaultType, EffectInstance};
pub use mesh::{AttributeRange, BoneCombination, Material};
pub use shader::{ConstantDescription, RegisterSet, ShaderMacro, ShaderMacros};

use crate::abi::RawDisplayMode;
use crate::error::Result;
use crate::marshal::{FromNative, NativeArena, NativeLayout, ToNative};

/// `D3DFORMAT`. Only the values display modes commonly report are named.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Format(pub u32);

impl Format {
    /// `D3DFMT_UNKNOWN`
    pub const UNKNOWN: Format = Format(0);
    /// `D3DFMT_A8R8G8B8`
    pub const A8R8G8B8: Format = Format(21);
    /// `D3DFMT_X8R8G8B8`
    pub const X8R8G8B8: Format = Format(22);
    /// `D3DFMT_R5G6B5`
    pub const R5G6B5: Format = Format(23);
    /// `D3DFMT_X1R5G5B5`
    pub const X1R5G5B5: Format = Format(24);
    /// `D3DFMT_A1R5G5B5`
    pub const A1R5G5B5: Format = Format(25);
    /// `D3DFMT_A2R10G10B10`
    pub const A2R10G10B10: Format = Format(35);
}

/// Resolution, refresh rate and surface format of an adapter mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DisplayMode {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Hertz, 0 for the adapter default
    pub refresh_rate: u32,
    /// Surface format
    pub format: Format,
}

impl DisplayMode {
    /// Width over height, 0 for a zero height
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f32 / self.height as f32
    }
}

impl NativeLayout for DisplayMode {
    type Native = RawDisplayMode;
}

impl ToNative for DisplayMode {
    fn to_native(&self, _arena: &mut NativeArena) -> Result<RawDisplayMode> {
        Ok(RawDisplayMode {
            width: self.width,
            height: self.height,
            refresh_rate: self.refresh_rate,
            format: self.format.0,
        })
    }
}

impl FromNative for DisplayMode {
    unsafe fn from_native(native: &RawDisplayMode) -> Result<Self> {
        Ok(DisplayMode {
            width: native.width,
            height: native.height,
            refresh_rate: native.refresh_rate,
            format: Format(native.format),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::{SharedAllocator, TrackingAllocator};
    use crate::marshal::{from_native, to_native};

    #[test]
    fn test_display_mode_is_copied_by_value() {
        let tracker = TrackingAllocator::new();
        let allocator: SharedAllocator = tracker.clone();
        let mode = DisplayMode {
            width: 1920,
            height: 1080,
            refresh_rate: 60,
            format: Format::X8R8G8B8,
        };

        let marshalled = to_native(&mode, &allocator).unwrap();
        assert_eq!(bytemuck::bytes_of(marshalled.native()).len(), 16);
        assert_eq!(marshalled.native().format, 22);
        assert_eq!(tracker.allocations(), 0);

        let read: DisplayMode = unsafe { from_native(marshalled.native()) }.unwrap();
        assert_eq!(read, mode);
        assert!((read.aspect_ratio() - 16.0 / 9.0).abs() < f32::EPSILON);
    }
}
