use crate::abi::{RawAttributeRange, RawBoneCombination, RawMaterial, RawMaterial9};
use crate::ansi;
use crate::error::Result;
use crate::marshal::{read_slice, FromNative, NativeArena, NativeLayout, ToNative};
use crate::math::Color4;

/// Material colours plus the texture it samples
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Material {
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
    /// Texture to sample, if any
    pub texture_filename: Option<String>,
}

impl NativeLayout for Material {
    type Native = RawMaterial;
}

impl ToNative for Material {
    fn to_native(&self, arena: &mut NativeArena) -> Result<RawMaterial> {
        Ok(RawMaterial {
            mat_d3d: RawMaterial9 {
                diffuse: self.diffuse,
                ambient: self.ambient,
                specular: self.specular,
                emissive: self.emissive,
                power: self.power,
            },
            texture_filename: arena.alloc_ansi(self.texture_filename.as_deref())?,
        })
    }
}

impl FromNative for Material {
    unsafe fn from_native(native: &RawMaterial) -> Result<Self> {
        let mat = &native.mat_d3d;
        Ok(Material {
            diffuse: mat.diffuse,
            ambient: mat.ambient,
            specular: mat.specular,
            emissive: mat.emissive,
            power: mat.power,
            texture_filename: unsafe { ansi::read_c_str(native.texture_filename) },
        })
    }
}

/// One subset of a skinned mesh and the bones that influence it
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BoneCombination {
    /// Attribute id of the subset
    pub attribute_id: u32,
    /// First face of the subset
    pub face_start: u32,
    /// Faces in the subset
    pub face_count: u32,
    /// First vertex of the subset
    pub vertex_start: u32,
    /// Vertices in the subset
    pub vertex_count: u32,
    /// One entry per palette slot; `u32::MAX` marks an unused slot
    pub bone_ids: Vec<u32>,
}

impl BoneCombination {
    /// The native record does not carry the length of its bone id array;
    /// it is the palette size the mesh was converted with.
    ///
    /// # Safety
    /// A non-null `bone_id` must point to `palette_size` readable ids.
    pub unsafe fn from_native_with_palette(
        native: &RawBoneCombination,
        palette_size: u32,
    ) -> Result<Self> {
        Ok(BoneCombination {
            attribute_id: native.attrib_id,
            face_start: native.face_start,
            face_count: native.face_count,
            vertex_start: native.vertex_start,
            vertex_count: native.vertex_count,
            bone_ids: unsafe { read_slice(native.bone_id.cast_const(), palette_size, "BoneId") }?,
        })
    }

    /// Reads the bone combination table returned by `ConvertToIndexedBlendedMesh`
    /// and friends.
    ///
    /// # Safety
    /// `table` must be null with `count == 0`, or point to `count` records
    /// each satisfying [`BoneCombination::from_native_with_palette`].
    pub unsafe fn read_table(
        table: *const RawBoneCombination,
        count: u32,
        palette_size: u32,
    ) -> Result<Vec<Self>> {
        let natives = unsafe { read_slice(table, count, "pBoneCombinations") }?;
        natives
            .iter()
            .map(|native| unsafe { Self::from_native_with_palette(native, palette_size) })
            .collect()
    }
}

impl NativeLayout for BoneCombination {
    type Native = RawBoneCombination;
}

impl ToNative for BoneCombination {
    fn to_native(&self, arena: &mut NativeArena) -> Result<RawBoneCombination> {
        let (bone_id, _) = arena.alloc_slice(&self.bone_ids)?;
        Ok(RawBoneCombination {
            attrib_id: self.attribute_id,
            face_start: self.face_start,
            face_count: self.face_count,
            vertex_start: self.vertex_start,
            vertex_count: self.vertex_count,
            bone_id,
        })
    }
}

/// `D3DXATTRIBUTERANGE` has no pointer fields, so the native record doubles
/// as the caller-facing one.
pub type AttributeRange = RawAttributeRange;

impl NativeLayout for RawAttributeRange {
    type Native = RawAttributeRange;
}

impl ToNative for RawAttributeRange {
    fn to_native(&self, _arena: &mut NativeArena) -> Result<RawAttributeRange> {
        Ok(*self)
    }
}

impl FromNative for RawAttributeRange {
    unsafe fn from_native(native: &RawAttributeRange) -> Result<Self> {
        Ok(*native)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::{SharedAllocator, TrackingAllocator};
    use crate::hresult::HResult;
    use crate::marshal::{from_native, read_two_phase, to_native, to_native_slice};
    use std::ptr;

    fn bone(attribute_id: u32, bone_ids: Vec<u32>) -> BoneCombination {
        BoneCombination {
            attribute_id,
            face_start: attribute_id * 10,
            face_count: 10,
            vertex_start: 0,
            vertex_count: 30,
            bone_ids,
        }
    }

    #[test]
    fn test_material_round_trip() {
        let allocator: SharedAllocator = TrackingAllocator::new();
        let material = Material {
            diffuse: Color4::new(1.0, 0.0, 0.0, 1.0),
            ambient: Color4::new(0.1, 0.1, 0.1, 1.0),
            specular: Color4::new(1.0, 1.0, 1.0, 1.0),
            emissive: Color4::default(),
            power: 32.0,
            texture_filename: Some("brick.dds".to_string()),
        };

        let marshalled = to_native(&material, &allocator).unwrap();
        assert_eq!(marshalled.native().mat_d3d.power, 32.0);
        let read: Material = unsafe { from_native(marshalled.native()) }.unwrap();
        assert_eq!(read, material);
    }

    #[test]
    fn test_material_array_round_trip() {
        let tracker = TrackingAllocator::new();
        let allocator: SharedAllocator = tracker.clone();
        let materials = vec![
            Material {
                texture_filename: Some("a.dds".to_string()),
                ..Material::default()
            },
            Material::default(),
        ];

        let marshalled = to_native_slice(&materials, &allocator).unwrap();
        let slice = *marshalled.native();
        assert_eq!(slice.count, 2);
        // one texture name plus the array itself
        assert_eq!(marshalled.block_count(), 2);

        let read: Vec<Material> = unsafe {
            crate::marshal::read_records(slice.ptr.cast_const(), slice.count, "materials")
        }
        .unwrap();
        assert_eq!(read, materials);

        drop(marshalled);
        assert_eq!(tracker.live_allocations(), 0);
    }

    #[test]
    fn test_bone_table_round_trip() {
        let tracker = TrackingAllocator::new();
        let allocator: SharedAllocator = tracker.clone();
        let table = vec![bone(0, vec![0, 1, 2, u32::MAX]), bone(1, vec![2, 3, 4, 5])];

        let marshalled = to_native_slice(&table, &allocator).unwrap();
        let slice = *marshalled.native();
        let read = unsafe { BoneCombination::read_table(slice.ptr.cast_const(), slice.count, 4) }
            .unwrap();
        assert_eq!(read, table);

        marshalled.release();
        assert_eq!(tracker.releases(), tracker.allocations());
    }

    #[test]
    fn test_bone_without_ids_is_null() {
        let allocator: SharedAllocator = TrackingAllocator::new();
        let marshalled = to_native(&bone(2, Vec::new()), &allocator).unwrap();
        assert!(marshalled.native().bone_id.is_null());

        let read =
            unsafe { BoneCombination::from_native_with_palette(marshalled.native(), 0) }.unwrap();
        assert!(read.bone_ids.is_empty());
        let mismatched =
            unsafe { BoneCombination::from_native_with_palette(marshalled.native(), 4) };
        assert!(mismatched.is_err());
    }

    #[test]
    fn test_attribute_table_two_phase() {
        let native_table = [
            AttributeRange {
                attrib_id: 0,
                face_start: 0,
                face_count: 12,
                vertex_start: 0,
                vertex_count: 24,
            },
            AttributeRange {
                attrib_id: 1,
                face_start: 12,
                face_count: 4,
                vertex_start: 24,
                vertex_count: 8,
            },
        ];

        // GetAttributeTable(pAttribTable, pAttribTableSize)
        let get_attribute_table = |dest: *mut AttributeRange, size: &mut u32| {
            if !dest.is_null() {
                unsafe {
                    ptr::copy_nonoverlapping(native_table.as_ptr(), dest, native_table.len())
                };
            }
            *size = native_table.len() as u32;
            HResult::OK
        };

        let table = read_two_phase("attribute table", get_attribute_table).unwrap();
        assert_eq!(table, native_table.to_vec());
    }
}
