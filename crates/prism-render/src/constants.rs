//! Shading constants uploaded once per frame.
//!
//! The layout matches the std140 `Constants` block in the shaders' common
//! include.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec4};

use crate::camera::Camera;

/// Recursion depth requested before clamping to the device limit.
pub const DEFAULT_MAX_RECURSION: u32 = 6;

/// Highest shadow PCF level exposed to the user.
pub const MAX_SHADOW_PCF: i32 = 4;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ShaderConstants {
    pub inv_view_proj: Mat4,
    pub camera_pos: Vec4,
    /// Near and far distances for traced rays
    pub clip_planes: Vec2,
    pub shadow_pcf: i32,
    pub max_recursion: u32,

    pub sphere_reflection_color_mask: Vec4,
    pub sphere_reflection_blur: f32,
    pub glass_absorption: f32,
    /// Index of refraction at both ends of the visible spectrum
    pub glass_index_of_refraction: Vec2,
    pub glass_reflection_color_mask: Vec4,
    pub glass_material_color: Vec4,
    pub glass_enable_dispersion: i32,
    pub dispersion_sample_count: u32,
    pub padding0: Vec2,
    /// RGB weight of a wavelength and its refraction interpolation factor
    pub dispersion_samples: [Vec4; 16],

    pub ambient_color: Vec4,
    pub light_pos: [Vec4; 2],
    pub light_color: [Vec4; 2],
    /// Soft shadow sample offsets, two per entry
    pub disc_points: [Vec4; 8],
}

const DISPERSION_SAMPLES: [[f32; 4]; 16] = [
    [0.140_000, 0.000_000, 0.266_667, 0.53],
    [0.130_031, 0.037_556, 0.612_267, 0.25],
    [0.100_123, 0.213_556, 0.785_067, 0.16],
    [0.050_277, 0.533_556, 0.785_067, 0.00],
    [0.000_000, 0.843_297, 0.619_682, 0.13],
    [0.000_000, 0.927_410, 0.431_834, 0.38],
    [0.000_000, 0.972_325, 0.270_893, 0.27],
    [0.000_000, 0.978_042, 0.136_858, 0.19],
    [0.324_000, 0.944_560, 0.029_730, 0.47],
    [0.777_600, 0.871_879, 0.000_000, 0.64],
    [0.972_000, 0.762_222, 0.000_000, 0.77],
    [0.971_835, 0.482_222, 0.000_000, 0.62],
    [0.886_744, 0.202_222, 0.000_000, 0.73],
    [0.715_967, 0.000_000, 0.000_000, 0.68],
    [0.459_920, 0.000_000, 0.000_000, 0.91],
    [0.218_000, 0.000_000, 0.000_000, 0.99],
];

const DISC_POINTS: [[f32; 4]; 8] = [
    [0.0, 0.0, 0.9, -0.9],
    [-0.8, 1.0, -1.1, -0.8],
    [1.5, 1.2, -2.1, 0.7],
    [0.1, -2.2, -0.2, 2.4],
    [2.4, -0.3, -3.0, 2.8],
    [2.0, -2.6, 0.7, 3.5],
    [-3.2, -1.6, 3.4, 2.2],
    [-1.8, -3.2, -1.1, 3.6],
];

impl ShaderConstants {
    /// Scene defaults with the recursion depth clamped to `device_max`.
    pub fn new(device_max_recursion: u32) -> Self {
        Self {
            inv_view_proj: Mat4::IDENTITY,
            camera_pos: Vec4::ZERO,
            clip_planes: Vec2::new(0.1, 100.0),
            shadow_pcf: 1,
            max_recursion: DEFAULT_MAX_RECURSION.min(device_max_recursion),

            sphere_reflection_color_mask: Vec4::new(0.81, 1.0, 0.45, 0.0),
            sphere_reflection_blur: 1.0,
            glass_absorption: 0.5,
            glass_index_of_refraction: Vec2::new(1.5, 1.02),
            glass_reflection_color_mask: Vec4::new(0.22, 0.83, 0.93, 0.0),
            glass_material_color: Vec4::new(0.33, 0.93, 0.29, 0.0),
            glass_enable_dispersion: 0,
            dispersion_sample_count: 4,
            padding0: Vec2::ZERO,
            dispersion_samples: DISPERSION_SAMPLES.map(Vec4::from_array),

            ambient_color: Vec4::new(0.5, 0.5, 0.5, 0.0) * 0.025,
            light_pos: [Vec4::new(8.0, 8.0, 0.0, 0.0), Vec4::new(0.0, 4.0, -5.0, 0.0)],
            light_color: [Vec4::new(1.0, 0.8, 0.8, 0.0), Vec4::new(0.85, 1.0, 0.85, 0.0)],
            disc_points: DISC_POINTS.map(Vec4::from_array),
        }
    }

    /// Refresh the camera-dependent fields.
    pub fn set_camera(&mut self, camera: &Camera) {
        self.inv_view_proj = camera.inverse_view_projection_matrix();
        self.camera_pos = camera.position.extend(1.0);
        self.clip_planes = Vec2::new(camera.near, camera.far);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn std140_layout() {
        assert_eq!(size_of::<ShaderConstants>(), 640);
        assert_eq!(offset_of!(ShaderConstants, camera_pos), 64);
        assert_eq!(offset_of!(ShaderConstants, clip_planes), 80);
        assert_eq!(offset_of!(ShaderConstants, shadow_pcf), 88);
        assert_eq!(offset_of!(ShaderConstants, max_recursion), 92);
        assert_eq!(offset_of!(ShaderConstants, sphere_reflection_blur), 112);
        assert_eq!(offset_of!(ShaderConstants, glass_index_of_refraction), 120);
        assert_eq!(offset_of!(ShaderConstants, glass_reflection_color_mask), 128);
        assert_eq!(offset_of!(ShaderConstants, glass_enable_dispersion), 160);
        assert_eq!(offset_of!(ShaderConstants, dispersion_samples), 176);
        assert_eq!(offset_of!(ShaderConstants, ambient_color), 432);
        assert_eq!(offset_of!(ShaderConstants, light_pos), 448);
        assert_eq!(offset_of!(ShaderConstants, light_color), 480);
        assert_eq!(offset_of!(ShaderConstants, disc_points), 512);
    }

    #[test]
    fn recursion_is_clamped_to_device() {
        assert_eq!(ShaderConstants::new(31).max_recursion, 6);
        assert_eq!(ShaderConstants::new(1).max_recursion, 1);
    }

    #[test]
    fn defaults() {
        let constants = ShaderConstants::new(31);
        assert_eq!(constants.shadow_pcf, 1);
        assert_eq!(constants.dispersion_sample_count, 4);
        assert_eq!(constants.glass_enable_dispersion, 0);
        assert!(constants
            .ambient_color
            .abs_diff_eq(Vec4::new(0.0125, 0.0125, 0.0125, 0.0), 1e-7));
        assert_eq!(constants.disc_points[7], Vec4::new(-1.8, -3.2, -1.1, 3.6));
        assert_eq!(constants.dispersion_samples[15].w, 0.99);
    }

    #[test]
    fn camera_fields() {
        let camera = Camera::default();
        let mut constants = ShaderConstants::new(31);
        constants.set_camera(&camera);
        assert_eq!(constants.camera_pos, Vec4::new(7.0, -0.5, -16.5, 1.0));
        assert_eq!(constants.clip_planes, Vec2::new(0.1, 100.0));
    }
}
