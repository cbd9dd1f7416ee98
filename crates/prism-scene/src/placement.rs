//! Deterministic instance placement: a spiral of spheres and a hollow
//! stepped pyramid of cubes.

use glam::{Mat3, Vec3};
use prism_core::InstanceTransform;

use crate::material::{material_for_cube_index, CubeMaterial};

/// Floor height the procedural instances start from.
pub const BASE_HEIGHT: f32 = -5.5;

const SPIRAL_START_RADIUS: f32 = 5.0;
const SPIRAL_RADIUS_STEP: f32 = 0.3;
const SPIRAL_ANGLE_STEP: f32 = 0.5;
const SPIRAL_HEIGHT_STEP: f32 = 0.05;

const PYRAMID_LAYERS: i32 = 5;
const PYRAMID_LAYER_HEIGHT: f32 = 1.5;
const PYRAMID_SPACING: f32 = 2.0;
const PYRAMID_YAW_STEP: f32 = 0.2;
const PYRAMID_PITCH_STEP: f32 = 0.15;

const FALLBACK_COLUMNS: usize = 10;
const FALLBACK_DROP: f32 = 2.0;

/// Position of sphere `i` on the Archimedean spiral.
pub fn spiral_position(i: usize) -> Vec3 {
    let i = i as f32;
    let radius = SPIRAL_RADIUS_STEP.mul_add(i, SPIRAL_START_RADIUS);
    let angle = SPIRAL_ANGLE_STEP * i;
    Vec3::new(
        radius * angle.cos(),
        SPIRAL_HEIGHT_STEP.mul_add(i, BASE_HEIGHT),
        radius * angle.sin(),
    )
}

/// Transforms of `count` spheres along the spiral.
pub fn sphere_spiral(count: usize) -> Vec<InstanceTransform> {
    (0..count)
        .map(|i| InstanceTransform::from_translation(spiral_position(i)))
        .collect()
}

/// A placed small cube.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CubePlacement {
    pub transform: InstanceTransform,
    pub material: CubeMaterial,
}

/// Outline cells `(i, j)` of pyramid layer `layer`, in placement order.
fn pyramid_ring(layer: i32) -> impl Iterator<Item = (i32, i32)> {
    let half = (PYRAMID_LAYERS - layer) / 2;
    (-half..=half).flat_map(move |i| {
        (-half..=half)
            .filter(move |&j| i.abs() == half || j.abs() == half)
            .map(move |j| (i, j))
    })
}

/// Number of cubes the pyramid holds before spilling onto the fallback grid.
pub fn pyramid_capacity() -> usize {
    (0..PYRAMID_LAYERS).map(|layer| pyramid_ring(layer).count()).sum()
}

/// Transforms and materials of `count` cubes.
///
/// Cubes fill the pyramid layer by layer. Any remainder goes on a flat grid
/// below the pyramid.
pub fn cube_pyramid(count: usize) -> Vec<CubePlacement> {
    let mut cubes = Vec::with_capacity(count);

    let cells = (0..PYRAMID_LAYERS)
        .flat_map(|layer| pyramid_ring(layer).map(move |cell| (layer, cell)));
    for (layer, (i, j)) in cells.take(count) {
        let index = cubes.len();
        let y = PYRAMID_LAYER_HEIGHT.mul_add(layer as f32, BASE_HEIGHT);
        let position = Vec3::new(i as f32 * PYRAMID_SPACING, y, j as f32 * PYRAMID_SPACING);
        let rotation = Mat3::from_rotation_x(layer as f32 * PYRAMID_PITCH_STEP)
            * Mat3::from_rotation_y(index as f32 * PYRAMID_YAW_STEP);

        cubes.push(CubePlacement {
            transform: InstanceTransform::from_linear_translation(rotation, position),
            material: material_for_cube_index(index, count),
        });
    }

    while cubes.len() < count {
        let index = cubes.len();
        #[allow(clippy::cast_possible_truncation)]
        let id = (index % 3) as u32;
        cubes.push(CubePlacement {
            transform: InstanceTransform::from_translation(fallback_position(index)),
            material: CubeMaterial::from_custom_id(id),
        });
    }

    cubes
}

fn fallback_position(index: usize) -> Vec3 {
    let column = (index % FALLBACK_COLUMNS) as f32;
    let row = (index / FALLBACK_COLUMNS) as f32;
    Vec3::new(
        column.mul_add(PYRAMID_SPACING, -10.0),
        BASE_HEIGHT - FALLBACK_DROP,
        row.mul_add(PYRAMID_SPACING, -10.0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn spiral_start() {
        assert_eq!(spiral_position(0), Vec3::new(5.0, -5.5, 0.0));

        let p1 = spiral_position(1);
        assert_relative_eq!(p1.x, 5.3 * 0.5f32.cos(), epsilon = 1e-5);
        assert_relative_eq!(p1.y, -5.45, epsilon = 1e-5);
        assert_relative_eq!(p1.z, 5.3 * 0.5f32.sin(), epsilon = 1e-5);
    }

    #[test]
    fn spiral_is_deterministic() {
        assert_eq!(sphere_spiral(64), sphere_spiral(64));
        let longer = sphere_spiral(100);
        assert_eq!(&longer[..64], &sphere_spiral(64)[..]);
    }

    #[test]
    fn pyramid_capacity_matches_rings() {
        // Layers with side 5 and 4 both span -2..=2; 3 and 2 span -1..=1.
        assert_eq!(pyramid_capacity(), 16 + 16 + 8 + 8 + 1);
    }

    #[test]
    fn pyramid_cells_are_outline_only() {
        for cube in cube_pyramid(pyramid_capacity()) {
            let t = cube.transform.translation();
            let extent = t.x.abs().max(t.z.abs());
            let layer = ((t.y - BASE_HEIGHT) / PYRAMID_LAYER_HEIGHT).round() as i32;
            let half = ((PYRAMID_LAYERS - layer) / 2) as f32 * PYRAMID_SPACING;
            assert_relative_eq!(extent, half, epsilon = 1e-5);
        }
    }

    #[test]
    fn unit_scene_cubes() {
        let cubes = cube_pyramid(4);
        let positions: Vec<_> = cubes.iter().map(|c| c.transform.translation()).collect();
        assert_eq!(
            positions,
            vec![
                Vec3::new(-4.0, -5.5, -4.0),
                Vec3::new(-4.0, -5.5, -2.0),
                Vec3::new(-4.0, -5.5, 0.0),
                Vec3::new(-4.0, -5.5, 2.0),
            ]
        );
        let materials: Vec<_> = cubes.iter().map(|c| c.material).collect();
        assert_eq!(
            materials,
            vec![
                CubeMaterial::Glass,
                CubeMaterial::Glass,
                CubeMaterial::Glass,
                CubeMaterial::Diffuse,
            ]
        );
    }

    #[test]
    fn overflow_goes_to_fallback_grid() {
        let capacity = pyramid_capacity();
        let cubes = cube_pyramid(64);
        assert_eq!(cubes.len(), 64);

        for (index, cube) in cubes.iter().enumerate().skip(capacity) {
            let t = cube.transform.translation();
            assert_relative_eq!(t.y, -7.5);
            assert_relative_eq!(t.x, (index % 10) as f32 * 2.0 - 10.0);
            assert_relative_eq!(t.z, (index / 10) as f32 * 2.0 - 10.0);
            assert_eq!(cube.material.custom_id(), (index % 3) as u32);
        }
    }

    #[test]
    fn pyramid_cubes_are_rotated() {
        let cubes = cube_pyramid(2);
        let rows = cubes[1].transform.to_rows();
        // Yaw of 0.2 rad on the second cube, no pitch on layer 0.
        assert_relative_eq!(rows[0], 0.2f32.cos(), epsilon = 1e-5);
        assert_relative_eq!(rows[5], 1.0, epsilon = 1e-5);
    }
}
