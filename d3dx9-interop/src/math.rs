//! Plain-data shapes shared with the native side

use bytemuck::{Pod, Zeroable};

/// Native `BOOL`: four bytes, 1 for true and 0 for false
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct Bool32(pub i32);

impl Bool32 {
    /// Native `TRUE`
    pub const TRUE: Bool32 = Bool32(1);
    /// Native `FALSE`
    pub const FALSE: Bool32 = Bool32(0);

    /// Any non-zero value reads as true, matching the native convention
    pub fn get(self) -> bool {
        self.0 != 0
    }
}

impl From<bool> for Bool32 {
    fn from(value: bool) -> Self {
        if value {
            Bool32::TRUE
        } else {
            Bool32::FALSE
        }
    }
}

impl From<Bool32> for bool {
    fn from(value: Bool32) -> Self {
        value.get()
    }
}

/// `D3DXVECTOR4`
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vector4 {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
    /// W component
    pub w: f32,
}

impl Vector4 {
    /// Builds a vector from its components
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Vector4 { x, y, z, w }
    }
}

/// `D3DXMATRIX`, row-major
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Matrix {
    /// Rows, each holding four columns
    pub m: [[f32; 4]; 4],
}

impl Matrix {
    /// The identity transform
    pub const IDENTITY: Matrix = Matrix {
        m: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    /// Translation by `(x, y, z)` in the fourth row
    pub fn translation(x: f32, y: f32, z: f32) -> Self {
        let mut matrix = Self::IDENTITY;
        matrix.m[3] = [x, y, z, 1.0];
        matrix
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// `D3DCOLORVALUE`
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Color4 {
    /// Red
    pub r: f32,
    /// Green
    pub g: f32,
    /// Blue
    pub b: f32,
    /// Alpha
    pub a: f32,
}

impl Color4 {
    /// Builds a color from its channels
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Color4 { r, g, b, a }
    }
}
