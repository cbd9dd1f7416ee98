//! Scene state: one-time placement plus per-frame visibility.

use bitflags::bitflags;
use glam::Vec3;
use prism_core::InstanceTransform;
use tracing::{debug, info};

use crate::config::{SceneConfig, STATIC_INSTANCE_COUNT};
use crate::material::CubeMaterial;
use crate::placement::{cube_pyramid, sphere_spiral, CubePlacement};

bitflags! {
    /// Ray visibility mask of an instance.
    ///
    /// Rays are traced with [`GeometryMask::OPAQUE`]; an empty mask hides the
    /// instance without removing it from the TLAS.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct GeometryMask: u8 {
        const OPAQUE = 0x01;
    }
}

/// Bottom-level structure an instance references.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlasKind {
    /// Triangle cube with edge 2.0
    Cube,
    /// Triangle cube with edge 0.5
    SmallCube,
    /// Procedural sphere bounded by boxes
    Sphere,
}

/// Role of an instance in the scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstanceKind {
    Ground,
    /// One of the three large cubes, numbered 1..=3
    LargeCube(u8),
    /// Spiral sphere with its index among spheres
    Sphere(usize),
    /// Pyramid cube with its index among small cubes
    SmallCube(usize),
}

/// One TLAS instance.
#[derive(Clone, Debug, PartialEq)]
pub struct Instance {
    pub name: String,
    pub kind: InstanceKind,
    pub blas: BlasKind,
    pub mask: GeometryMask,
    pub custom_id: u32,
    pub transform: InstanceTransform,
}

#[derive(Debug)]
struct Layout {
    spheres: Vec<InstanceTransform>,
    cubes: Vec<CubePlacement>,
}

#[derive(Debug)]
enum Placement {
    Uninitialized,
    Built(Layout),
}

/// Instance-name prefix for spheres and small cubes.
const SPHERE_PREFIX: &str = "Sphere Instance ";
const CUBE_PREFIX: &str = "Cube Instance ";

/// Explicit scene state owned by the frame driver.
///
/// Placement is computed once by [`SceneState::ensure_initialized`]. After
/// that only the active sphere and cube counts change, and they only affect
/// instance masks.
#[derive(Debug)]
pub struct SceneState {
    config: SceneConfig,
    placement: Placement,
    active_spheres: usize,
    active_cubes: usize,
}

impl SceneState {
    /// Create an unplaced scene. All procedural instances start active.
    pub fn new(config: SceneConfig) -> Self {
        Self {
            config,
            placement: Placement::Uninitialized,
            active_spheres: config.sphere_count(),
            active_cubes: config.cube_count(),
        }
    }

    /// Scene configuration.
    pub const fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Whether placement has run.
    pub const fn is_initialized(&self) -> bool {
        matches!(self.placement, Placement::Built(_))
    }

    /// Compute placement if it has not been computed yet.
    ///
    /// Returns `true` only on the call that performed the placement.
    pub fn ensure_initialized(&mut self) -> bool {
        if self.is_initialized() {
            return false;
        }

        let spheres = sphere_spiral(self.config.sphere_count());
        let cubes = cube_pyramid(self.config.cube_count());
        info!(
            spheres = spheres.len(),
            cubes = cubes.len(),
            instances = self.instance_count(),
            "Scene placement computed"
        );

        self.placement = Placement::Built(Layout { spheres, cubes });
        true
    }

    /// Total instance count. Never changes for a given scene.
    pub const fn instance_count(&self) -> usize {
        self.config.instance_count()
    }

    /// Number of spiral spheres.
    pub const fn sphere_count(&self) -> usize {
        self.config.sphere_count()
    }

    /// Number of pyramid cubes.
    pub const fn cube_count(&self) -> usize {
        self.config.cube_count()
    }

    /// Spheres currently visible.
    pub const fn active_spheres(&self) -> usize {
        self.active_spheres
    }

    /// Cubes currently visible.
    pub const fn active_cubes(&self) -> usize {
        self.active_cubes
    }

    /// Set the number of visible spheres, clamped to the sphere count.
    pub fn set_active_spheres(&mut self, count: usize) -> usize {
        self.active_spheres = count.min(self.sphere_count());
        debug!(active = self.active_spheres, "Active spheres changed");
        self.active_spheres
    }

    /// Set the number of visible cubes, clamped to the cube count.
    pub fn set_active_cubes(&mut self, count: usize) -> usize {
        self.active_cubes = count.min(self.cube_count());
        debug!(active = self.active_cubes, "Active cubes changed");
        self.active_cubes
    }

    /// TLAS index of the first sphere.
    pub const fn first_sphere_index() -> usize {
        STATIC_INSTANCE_COUNT
    }

    /// TLAS index of the first small cube.
    pub const fn first_cube_index(&self) -> usize {
        STATIC_INSTANCE_COUNT + self.sphere_count()
    }

    /// Name of the instance at TLAS index `index`.
    pub fn instance_name(&self, index: usize) -> String {
        match index {
            0 => "Ground Instance".to_owned(),
            1..=3 => format!("{CUBE_PREFIX}{index}"),
            i if i < self.first_cube_index() => format!("{SPHERE_PREFIX}{i}"),
            i => format!("{CUBE_PREFIX}{i}"),
        }
    }

    /// Names of the spiral spheres, in TLAS order.
    pub fn sphere_names(&self) -> impl Iterator<Item = String> + '_ {
        (0..self.sphere_count()).map(move |i| self.instance_name(Self::first_sphere_index() + i))
    }

    /// Names and materials of the small cubes, in TLAS order.
    pub fn cube_materials(&mut self) -> Vec<(String, CubeMaterial)> {
        self.ensure_initialized();
        let first = self.first_cube_index();
        self.layout()
            .cubes
            .iter()
            .enumerate()
            .map(|(i, cube)| (self.instance_name(first + i), cube.material))
            .collect()
    }

    fn layout(&self) -> &Layout {
        match &self.placement {
            Placement::Built(layout) => layout,
            Placement::Uninitialized => unreachable!("placement is built by ensure_initialized"),
        }
    }

    /// Full instance array with masks for the current active counts.
    ///
    /// Places the scene first if needed. The length always equals
    /// [`SceneState::instance_count`].
    pub fn instances(&mut self) -> Vec<Instance> {
        self.ensure_initialized();

        let mut instances = Vec::with_capacity(self.instance_count());
        instances.push(Instance {
            name: self.instance_name(0),
            kind: InstanceKind::Ground,
            blas: BlasKind::Cube,
            mask: GeometryMask::OPAQUE,
            custom_id: 0,
            transform: InstanceTransform::from_scale_translation(
                Vec3::new(100.0, 0.1, 100.0),
                Vec3::new(0.0, -6.0, 0.0),
            ),
        });

        let large_cubes = [
            Vec3::new(-4.0, -4.5, 0.0),
            Vec3::new(0.0, -4.5, -3.0),
            Vec3::new(4.0, -4.5, -6.0),
        ];
        for (number, position) in (1u8..).zip(large_cubes) {
            instances.push(Instance {
                name: self.instance_name(usize::from(number)),
                kind: InstanceKind::LargeCube(number),
                blas: BlasKind::Cube,
                mask: GeometryMask::OPAQUE,
                custom_id: u32::from(number - 1),
                transform: InstanceTransform::from_translation(position),
            });
        }

        let layout = self.layout();
        for (i, transform) in layout.spheres.iter().enumerate() {
            instances.push(Instance {
                name: self.instance_name(instances.len()),
                kind: InstanceKind::Sphere(i),
                blas: BlasKind::Sphere,
                mask: visible_if(i < self.active_spheres),
                custom_id: 1,
                transform: *transform,
            });
        }

        for (i, cube) in layout.cubes.iter().enumerate() {
            instances.push(Instance {
                name: self.instance_name(instances.len()),
                kind: InstanceKind::SmallCube(i),
                blas: BlasKind::SmallCube,
                mask: visible_if(i < self.active_cubes),
                custom_id: cube.material.custom_id(),
                transform: cube.transform,
            });
        }

        debug_assert_eq!(instances.len(), self.instance_count());
        instances
    }
}

fn visible_if(visible: bool) -> GeometryMask {
    if visible {
        GeometryMask::OPAQUE
    } else {
        GeometryMask::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_scene() -> SceneState {
        SceneState::new(SceneConfig::new(1, 1, 1, 1))
    }

    #[test]
    fn ensure_initialized_is_idempotent() {
        let mut scene = unit_scene();
        assert!(!scene.is_initialized());
        assert!(scene.ensure_initialized());
        assert!(scene.is_initialized());
        assert!(!scene.ensure_initialized());
    }

    #[test]
    fn instance_names() {
        let mut scene = unit_scene();
        let names: Vec<_> = scene.instances().into_iter().map(|i| i.name).collect();
        assert_eq!(names[0], "Ground Instance");
        assert_eq!(names[3], "Cube Instance 3");
        assert_eq!(names[4], "Sphere Instance 4");
        assert_eq!(names[7], "Sphere Instance 7");
        assert_eq!(names[8], "Cube Instance 8");
        assert_eq!(names[11], "Cube Instance 11");
        assert_eq!(scene.sphere_names().last().as_deref(), Some("Sphere Instance 7"));
    }

    #[test]
    fn static_instances() {
        let mut scene = unit_scene();
        let instances = scene.instances();
        assert_eq!(instances[0].kind, InstanceKind::Ground);
        assert_eq!(instances[0].transform.translation(), Vec3::new(0.0, -6.0, 0.0));
        let ids: Vec<_> = instances[1..4].iter().map(|i| i.custom_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert!(instances[..4].iter().all(|i| i.blas == BlasKind::Cube));
        assert!(instances[4..8].iter().all(|i| i.blas == BlasKind::Sphere && i.custom_id == 1));
        assert!(instances[8..].iter().all(|i| i.blas == BlasKind::SmallCube));
    }

    #[test]
    fn active_sphere_count_masks_tail() {
        let mut scene = SceneState::new(SceneConfig::new(2, 2, 1, 1));
        let before = scene.instances();
        scene.set_active_spheres(5);
        let after = scene.instances();

        assert_eq!(before.len(), after.len());
        let first = SceneState::first_sphere_index();
        for (k, instance) in after[first..first + scene.sphere_count()].iter().enumerate() {
            let expected = if k < 5 { GeometryMask::OPAQUE } else { GeometryMask::empty() };
            assert_eq!(instance.mask, expected, "sphere {k}");
        }
        // Transforms never move.
        for (a, b) in before.iter().zip(&after) {
            assert_eq!(a.transform, b.transform);
        }
    }

    #[test]
    fn active_counts_are_clamped() {
        let mut scene = unit_scene();
        assert_eq!(scene.set_active_spheres(100), 4);
        assert_eq!(scene.set_active_cubes(0), 0);
        let instances = scene.instances();
        assert!(instances[8..].iter().all(|i| i.mask.is_empty()));
        assert!(instances[4..8].iter().all(|i| i.mask == GeometryMask::OPAQUE));
    }

    #[test]
    fn cube_materials_follow_placement() {
        let mut scene = unit_scene();
        let materials = scene.cube_materials();
        assert_eq!(materials.len(), 4);
        assert_eq!(materials[0].0, "Cube Instance 8");
        assert_eq!(materials[3].1, CubeMaterial::Diffuse);
    }
}
