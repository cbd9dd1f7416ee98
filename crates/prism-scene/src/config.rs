//! Scene size configuration.

/// Instances that are always present: ground plus three large cubes.
pub const STATIC_INSTANCE_COUNT: usize = 4;

/// Grid factors for the procedural instances.
///
/// The spiral holds `(2a)(2b)` spheres and the pyramid `(2c)(2d)` cubes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SceneConfig {
    pub a: u32,
    pub b: u32,
    pub c: u32,
    pub d: u32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            a: 4,
            b: 4,
            c: 4,
            d: 4,
        }
    }
}

impl SceneConfig {
    /// Config with explicit grid factors.
    pub const fn new(a: u32, b: u32, c: u32, d: u32) -> Self {
        Self { a, b, c, d }
    }

    /// Number of small spheres.
    pub const fn sphere_count(&self) -> usize {
        (2 * self.a as usize) * (2 * self.b as usize)
    }

    /// Number of small cubes.
    pub const fn cube_count(&self) -> usize {
        (2 * self.c as usize) * (2 * self.d as usize)
    }

    /// Total TLAS instance count. Fixed for the lifetime of a scene.
    pub const fn instance_count(&self) -> usize {
        STATIC_INSTANCE_COUNT + self.sphere_count() + self.cube_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_follow_grid_factors() {
        for (a, b, c, d) in [(1, 1, 1, 1), (2, 3, 4, 5), (4, 4, 4, 4), (0, 1, 3, 0)] {
            let config = SceneConfig::new(a, b, c, d);
            assert_eq!(config.sphere_count(), (4 * a * b) as usize);
            assert_eq!(config.cube_count(), (4 * c * d) as usize);
            assert_eq!(
                config.instance_count(),
                4 + config.sphere_count() + config.cube_count()
            );
        }
    }

    #[test]
    fn unit_config_has_twelve_instances() {
        assert_eq!(SceneConfig::new(1, 1, 1, 1).instance_count(), 12);
    }
}
