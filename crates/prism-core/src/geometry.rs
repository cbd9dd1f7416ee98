//! Procedural geometry used by the bottom-level acceleration structures.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

use crate::constants::{CUBE_TRIANGLE_COUNT, CUBE_VERTEX_COUNT};
use crate::{Aabb, Error, Result};

/// Faces as (normal, tangent, bitangent) with `tangent x bitangent == normal`,
/// which makes every face counter-clockwise when seen from outside.
const FACES: [(Vec3, Vec3, Vec3); 6] = [
    (Vec3::X, Vec3::NEG_Z, Vec3::Y),
    (Vec3::NEG_X, Vec3::Z, Vec3::Y),
    (Vec3::Y, Vec3::X, Vec3::NEG_Z),
    (Vec3::NEG_Y, Vec3::X, Vec3::Z),
    (Vec3::Z, Vec3::X, Vec3::Y),
    (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
];

/// Corner offsets in (tangent, bitangent) space and their UVs.
const CORNERS: [(f32, f32, Vec2); 4] = [
    (-1.0, -1.0, Vec2::new(0.0, 1.0)),
    (1.0, -1.0, Vec2::new(1.0, 1.0)),
    (1.0, 1.0, Vec2::new(1.0, 0.0)),
    (-1.0, 1.0, Vec2::new(0.0, 0.0)),
];

/// Axis-aligned cube centered at the origin.
///
/// Faces do not share vertices so that every vertex carries the normal and UV
/// of its own face.
#[derive(Clone, Debug)]
pub struct CubeGeometry {
    /// Edge length
    pub size: f32,
    /// Vertex positions
    pub positions: Vec<Vec3>,
    /// Per-vertex normals
    pub normals: Vec<Vec3>,
    /// Per-vertex texture coordinates
    pub uvs: Vec<Vec2>,
    /// Triangle vertex indices
    pub triangles: Vec<[u32; 3]>,
}

impl CubeGeometry {
    /// Build a cube with the given edge length.
    pub fn new(size: f32) -> Result<Self> {
        if !size.is_finite() || size <= 0.0 {
            return Err(Error::InvalidData(format!("cube size must be positive, got {size}")));
        }

        let half = size * 0.5;
        let mut positions = Vec::with_capacity(CUBE_VERTEX_COUNT);
        let mut normals = Vec::with_capacity(CUBE_VERTEX_COUNT);
        let mut uvs = Vec::with_capacity(CUBE_VERTEX_COUNT);
        let mut triangles = Vec::with_capacity(CUBE_TRIANGLE_COUNT);

        for (normal, tangent, bitangent) in FACES {
            #[allow(clippy::cast_possible_truncation)]
            let base = positions.len() as u32;
            for (u, v, uv) in CORNERS {
                positions.push((normal + tangent * u + bitangent * v) * half);
                normals.push(normal);
                uvs.push(uv);
            }
            triangles.push([base, base + 1, base + 2]);
            triangles.push([base, base + 2, base + 3]);
        }

        Ok(Self {
            size,
            positions,
            normals,
            uvs,
            triangles,
        })
    }

    /// Positions packed as `x, y, z` for a vertex buffer.
    pub fn position_data(&self) -> Vec<[f32; 3]> {
        self.positions.iter().map(|p| p.to_array()).collect()
    }

    /// Flat index list for an index buffer.
    pub fn index_data(&self) -> Vec<u32> {
        self.triangles.iter().flatten().copied().collect()
    }

    /// Vertex count as the `u32` Vulkan expects.
    #[allow(clippy::cast_possible_truncation)]
    pub fn vertex_count(&self) -> u32 {
        self.positions.len() as u32
    }

    /// Triangle count as the `u32` Vulkan expects.
    #[allow(clippy::cast_possible_truncation)]
    pub fn triangle_count(&self) -> u32 {
        self.triangles.len() as u32
    }

    /// Shading attributes for the hit shaders.
    pub fn attribs(&self) -> CubeAttribs {
        let mut attribs = CubeAttribs::zeroed();
        for (i, (uv, normal)) in self.uvs.iter().zip(&self.normals).enumerate() {
            attribs.uvs[i] = [uv.x, uv.y, 0.0, 0.0];
            attribs.normals[i] = normal.extend(0.0).to_array();
        }
        for (i, [a, b, c]) in self.triangles.iter().enumerate() {
            attribs.primitives[i] = [*a, *b, *c, 0];
        }
        attribs
    }
}

/// Cube shading data in std140 layout.
///
/// Hit shaders only receive barycentrics, so they fetch the triangle's vertex
/// indices from `primitives` and interpolate `uvs` and `normals` themselves.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct CubeAttribs {
    /// UV per vertex, `zw` unused
    pub uvs: [[f32; 4]; CUBE_VERTEX_COUNT],
    /// Normal per vertex, `w` unused
    pub normals: [[f32; 4]; CUBE_VERTEX_COUNT],
    /// Vertex indices per triangle, `w` unused
    pub primitives: [[u32; 4]; CUBE_TRIANGLE_COUNT],
}

/// Bounding boxes of the procedural sphere.
///
/// Both are stored in the box buffer; the bottom-level structure is built
/// from the first one only.
pub fn procedural_sphere_boxes() -> [Aabb; 2] {
    [
        Aabb::from_half_extents(Vec3::splat(1.5)),
        Aabb::from_half_extents(Vec3::splat(0.5)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn cube_counts() {
        let cube = CubeGeometry::new(2.0).unwrap();
        assert_eq!(cube.vertex_count(), 24);
        assert_eq!(cube.triangle_count(), 12);
        assert_eq!(cube.index_data().len(), 36);
        assert!(cube.index_data().iter().all(|&i| i < 24));
    }

    #[test]
    fn vertices_lie_on_their_face() {
        let cube = CubeGeometry::new(0.5).unwrap();
        for (p, n) in cube.positions.iter().zip(&cube.normals) {
            assert_relative_eq!(p.dot(*n), 0.25);
            assert!(p.abs().max_element() <= 0.25 + f32::EPSILON);
        }
    }

    #[test]
    fn triangles_wind_outward() {
        let cube = CubeGeometry::new(2.0).unwrap();
        for [a, b, c] in &cube.triangles {
            let (pa, pb, pc) = (
                cube.positions[*a as usize],
                cube.positions[*b as usize],
                cube.positions[*c as usize],
            );
            let face_normal = (pb - pa).cross(pc - pa).normalize();
            assert_relative_eq!(face_normal.dot(cube.normals[*a as usize]), 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn invalid_size_rejected() {
        assert!(CubeGeometry::new(0.0).is_err());
        assert!(CubeGeometry::new(-1.0).is_err());
        assert!(CubeGeometry::new(f32::NAN).is_err());
    }

    #[test]
    fn attribs_layout() {
        assert_eq!(std::mem::size_of::<CubeAttribs>(), 24 * 16 * 2 + 12 * 16);

        let cube = CubeGeometry::new(2.0).unwrap();
        let attribs = cube.attribs();
        assert_eq!(attribs.primitives[1], [0, 2, 3, 0]);
        assert_eq!(attribs.normals[4], [-1.0, 0.0, 0.0, 0.0]);
        assert_eq!(attribs.uvs[2], [1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn sphere_boxes() {
        let [outer, inner] = procedural_sphere_boxes();
        assert_eq!(outer.half_extents(), Vec3::splat(1.5));
        assert_eq!(inner.half_extents(), Vec3::splat(0.5));
    }
}
