//! Bit-exact layouts of the D3D9/D3DX9 structures the marshaller fills in.
//!
//! Field order and widths follow `d3d9types.h`, `d3dx9mesh.h`,
//! `d3dx9effect.h` and `d3dx9shader.h`; enum-typed fields are 32 bits wide.

use std::ffi::{c_char, c_void};

use bytemuck::{Pod, Zeroable};

use crate::math::Color4;

/// `D3DXEFFECTDEFAULT`
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct RawEffectDefault {
    /// `pParamName`, ANSI name of the parameter
    pub param_name: *mut c_char,
    /// `Type`, a `D3DXEFFECTDEFAULTTYPE`
    pub kind: u32,
    /// `NumBytes`, size of `value`
    pub num_bytes: u32,
    /// `pValue`
    pub value: *mut c_void,
}

/// `D3DXEFFECTINSTANCE`
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct RawEffectInstance {
    /// `pEffectFilename`, may be null
    pub effect_filename: *mut c_char,
    /// `NumDefaults`
    pub num_defaults: u32,
    /// `pDefaults`, `num_defaults` entries
    pub defaults: *mut RawEffectDefault,
}

/// `D3DMATERIAL9`
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct RawMaterial9 {
    /// Diffuse color
    pub diffuse: Color4,
    /// Ambient color
    pub ambient: Color4,
    /// Specular highlight color
    pub specular: Color4,
    /// Emissive color
    pub emissive: Color4,
    /// Sharpness of the specular highlight
    pub power: f32,
}

/// `D3DXMATERIAL`
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct RawMaterial {
    /// `MatD3D`
    pub mat_d3d: RawMaterial9,
    /// `pTextureFilename`, null when untextured
    pub texture_filename: *mut c_char,
}

/// `D3DXBONECOMBINATION`. The length of `bone_id` is the palette size of
/// the mesh, it is not stored in the record.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct RawBoneCombination {
    /// `AttribId`
    pub attrib_id: u32,
    /// `FaceStart`
    pub face_start: u32,
    /// `FaceCount`
    pub face_count: u32,
    /// `VertexStart`
    pub vertex_start: u32,
    /// `VertexCount`
    pub vertex_count: u32,
    /// `BoneId`
    pub bone_id: *mut u32,
}

/// `D3DXATTRIBUTERANGE`
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct RawAttributeRange {
    /// `AttribId`
    pub attrib_id: u32,
    /// `FaceStart`
    pub face_start: u32,
    /// `FaceCount`
    pub face_count: u32,
    /// `VertexStart`
    pub vertex_start: u32,
    /// `VertexCount`
    pub vertex_count: u32,
}

/// `D3DDISPLAYMODE`
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct RawDisplayMode {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Refresh rate in hertz, 0 for the adapter default
    pub refresh_rate: u32,
    /// `D3DFORMAT` value
    pub format: u32,
}

/// `D3DXMACRO`. Arrays of macros end with an entry whose fields are both null.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct RawMacro {
    /// `Name`
    pub name: *const c_char,
    /// `Definition`
    pub definition: *const c_char,
}

/// `D3DXCONSTANT_DESC`
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct RawConstantDesc {
    /// `Name`
    pub name: *const c_char,
    /// `RegisterSet`, a `D3DXREGISTER_SET`
    pub register_set: u32,
    /// `RegisterIndex`
    pub register_index: u32,
    /// `RegisterCount`
    pub register_count: u32,
    /// `Class`, a `D3DXPARAMETER_CLASS`
    pub class: u32,
    /// `Type`, a `D3DXPARAMETER_TYPE`
    pub kind: u32,
    /// `Rows`
    pub rows: u32,
    /// `Columns`
    pub columns: u32,
    /// `Elements`
    pub elements: u32,
    /// `StructMembers`
    pub struct_members: u32,
    /// `Bytes`, size of the constant
    pub bytes: u32,
    /// `DefaultValue`, may be null
    pub default_value: *const c_void,
}

// SAFETY: every field is an integer, a float or a raw pointer, all of which
// are valid when zeroed (null pointers).
unsafe impl Zeroable for RawEffectDefault {}
unsafe impl Zeroable for RawEffectInstance {}
unsafe impl Zeroable for RawMaterial {}
unsafe impl Zeroable for RawBoneCombination {}
unsafe impl Zeroable for RawMacro {}
unsafe impl Zeroable for RawConstantDesc {}
