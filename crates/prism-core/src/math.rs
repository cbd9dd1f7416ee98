//! Math utilities and helpers.

use glam::{Affine3A, Mat3, Vec3};

/// Axis-Aligned Bounding Box.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Aabb {
    /// Create a new AABB from min and max corners
    #[inline]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at origin with given half-extents
    #[inline]
    pub fn from_half_extents(half_extents: Vec3) -> Self {
        Self {
            min: -half_extents,
            max: half_extents,
        }
    }

    /// Get the center of the AABB
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the half-extents of the AABB
    #[inline]
    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Check if a point is inside the AABB
    #[inline]
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Merge two AABBs
    #[inline]
    pub fn merge(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Flatten into `[min.x, min.y, min.z, max.x, max.y, max.z]`, the layout
    /// of `VkAabbPositionsKHR`.
    #[inline]
    pub fn to_array(&self) -> [f32; 6] {
        [
            self.min.x, self.min.y, self.min.z, self.max.x, self.max.y, self.max.z,
        ]
    }
}

/// Object-to-world transform of an acceleration structure instance.
///
/// Stored as a row-major 3x4 matrix: the upper 3x3 block holds rotation and
/// scale, the last column holds the translation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InstanceTransform {
    affine: Affine3A,
}

impl Default for InstanceTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl InstanceTransform {
    /// Identity transform
    pub const IDENTITY: Self = Self {
        affine: Affine3A::IDENTITY,
    };

    /// Pure translation.
    #[inline]
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            affine: Affine3A::from_translation(translation),
        }
    }

    /// Rotation (or any linear part) followed by a translation.
    #[inline]
    pub fn from_linear_translation(linear: Mat3, translation: Vec3) -> Self {
        Self {
            affine: Affine3A::from_mat3_translation(linear, translation),
        }
    }

    /// Non-uniform scale followed by a translation.
    #[inline]
    pub fn from_scale_translation(scale: Vec3, translation: Vec3) -> Self {
        Self::from_linear_translation(Mat3::from_diagonal(scale), translation)
    }

    /// Translation component.
    #[inline]
    pub fn translation(&self) -> Vec3 {
        self.affine.translation.into()
    }

    /// Apply the transform to a point.
    #[inline]
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.affine.transform_point3(point)
    }

    /// Row-major 3x4 matrix, the layout of `VkTransformMatrixKHR`.
    pub fn to_rows(&self) -> [f32; 12] {
        let m = self.affine.matrix3;
        let t = self.affine.translation;
        [
            m.x_axis.x, m.y_axis.x, m.z_axis.x, t.x, //
            m.x_axis.y, m.y_axis.y, m.z_axis.y, t.y, //
            m.x_axis.z, m.y_axis.z, m.z_axis.z, t.z,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn aabb_contains_point() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert!(aabb.contains_point(Vec3::splat(0.5)));
        assert!(aabb.contains_point(Vec3::ZERO));
        assert!(aabb.contains_point(Vec3::ONE));
        assert!(!aabb.contains_point(Vec3::new(2.0, 0.5, 0.5)));
    }

    #[test]
    fn aabb_half_extents_and_merge() {
        let small = Aabb::from_half_extents(Vec3::splat(0.5));
        let large = Aabb::from_half_extents(Vec3::splat(1.5));
        assert_eq!(small.center(), Vec3::ZERO);
        assert_eq!(large.half_extents(), Vec3::splat(1.5));
        assert_eq!(small.merge(&large), large);
        assert_eq!(small.to_array(), [-0.5, -0.5, -0.5, 0.5, 0.5, 0.5]);
    }

    #[test]
    fn translation_rows() {
        let t = InstanceTransform::from_translation(Vec3::new(-4.0, -4.5, 0.0));
        assert_eq!(
            t.to_rows(),
            [1.0, 0.0, 0.0, -4.0, 0.0, 1.0, 0.0, -4.5, 0.0, 0.0, 1.0, 0.0]
        );
    }

    #[test]
    fn scale_then_translate() {
        let t = InstanceTransform::from_scale_translation(
            Vec3::new(100.0, 0.1, 100.0),
            Vec3::new(0.0, -6.0, 0.0),
        );
        let rows = t.to_rows();
        assert_relative_eq!(rows[0], 100.0);
        assert_relative_eq!(rows[5], 0.1);
        assert_relative_eq!(rows[10], 100.0);
        assert_relative_eq!(rows[7], -6.0);

        let p = t.transform_point(Vec3::new(1.0, 1.0, 1.0));
        assert_relative_eq!(p.x, 100.0);
        assert_relative_eq!(p.y, -5.9, epsilon = 1e-6);
        assert_relative_eq!(p.z, 100.0);
    }

    #[test]
    fn rotation_rows_match_matrix() {
        let rot = Mat3::from_rotation_y(std::f32::consts::FRAC_PI_2);
        let t = InstanceTransform::from_linear_translation(rot, Vec3::ZERO);
        let rows = t.to_rows();
        // Row-major: element (r, c) lives at r * 4 + c.
        for r in 0..3 {
            for c in 0..3 {
                assert_relative_eq!(rows[r * 4 + c], rot.col(c)[r], epsilon = 1e-6);
            }
        }
    }
}
