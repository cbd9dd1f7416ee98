//! Material selection and the hit groups that implement each material.

use rand::Rng;

/// Named hit groups of the ray tracing pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HitGroup {
    /// Textured opaque cube
    CubePrimaryHit,
    /// Textured ground plane with shadows
    GroundHit,
    /// Refractive cube
    GlassPrimaryHit,
    /// Reflective procedural sphere
    SpherePrimaryHit,
    /// Lambertian procedural sphere
    SpherePrimaryDiffuseHit,
    /// Refractive procedural sphere
    SphereGlassHit,
    /// Intersection-only sphere group for shadow rays
    SphereShadowHit,
}

impl HitGroup {
    /// Every hit group, in pipeline order.
    pub const ALL: [Self; 7] = [
        Self::CubePrimaryHit,
        Self::GroundHit,
        Self::GlassPrimaryHit,
        Self::SpherePrimaryHit,
        Self::SpherePrimaryDiffuseHit,
        Self::SphereGlassHit,
        Self::SphereShadowHit,
    ];

    /// Group name used in the pipeline and binding table.
    pub const fn name(self) -> &'static str {
        match self {
            Self::CubePrimaryHit => "CubePrimaryHit",
            Self::GroundHit => "GroundHit",
            Self::GlassPrimaryHit => "GlassPrimaryHit",
            Self::SpherePrimaryHit => "SpherePrimaryHit",
            Self::SpherePrimaryDiffuseHit => "SpherePrimaryDiffuseHit",
            Self::SphereGlassHit => "SphereGlassHit",
            Self::SphereShadowHit => "SphereShadowHit",
        }
    }

    /// Whether the group uses the sphere intersection shader.
    pub const fn is_procedural(self) -> bool {
        matches!(
            self,
            Self::SpherePrimaryHit
                | Self::SpherePrimaryDiffuseHit
                | Self::SphereGlassHit
                | Self::SphereShadowHit
        )
    }
}

/// Material of a small cube, stored as the instance custom index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum CubeMaterial {
    Glass = 0,
    Diffuse = 1,
    Metal = 2,
}

impl CubeMaterial {
    /// Map an arbitrary id onto the three materials.
    pub const fn from_custom_id(id: u32) -> Self {
        match id % 3 {
            0 => Self::Glass,
            1 => Self::Diffuse,
            _ => Self::Metal,
        }
    }

    /// Instance custom index.
    pub const fn custom_id(self) -> u32 {
        self as u32
    }

    /// Hit group for primary rays. Only diffuse cubes use the opaque shader.
    pub const fn primary_hit_group(self) -> HitGroup {
        match self {
            Self::Diffuse => HitGroup::CubePrimaryHit,
            Self::Glass | Self::Metal => HitGroup::GlassPrimaryHit,
        }
    }
}

/// Material of a small sphere.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SphereMaterial {
    Metallic,
    Diffuse,
    Glass,
}

impl SphereMaterial {
    /// Map a selector in `[0, 1)` onto the 70/20/10 probability table.
    pub fn from_selector(selector: f32) -> Self {
        if selector < 0.7 {
            Self::Metallic
        } else if selector < 0.9 {
            Self::Diffuse
        } else {
            Self::Glass
        }
    }

    /// Hit group for primary rays.
    pub const fn primary_hit_group(self) -> HitGroup {
        match self {
            Self::Metallic => HitGroup::SpherePrimaryHit,
            Self::Diffuse => HitGroup::SpherePrimaryDiffuseHit,
            Self::Glass => HitGroup::SphereGlassHit,
        }
    }
}

/// Material of the cube at `index` out of `total`, by normalized position.
pub fn material_for_cube_index(index: usize, total: usize) -> CubeMaterial {
    if total == 0 {
        return CubeMaterial::Glass;
    }
    let selector = index as f32 / total as f32;
    if selector < 0.6 {
        CubeMaterial::Glass
    } else if selector < 0.85 {
        CubeMaterial::Diffuse
    } else {
        CubeMaterial::Metal
    }
}

/// Draw a sphere material from the given random source.
pub fn material_for_sphere_draw<R: Rng + ?Sized>(rng: &mut R) -> SphereMaterial {
    SphereMaterial::from_selector(rng.gen::<f32>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn cube_thresholds() {
        let materials: Vec<_> = (0..20).map(|i| material_for_cube_index(i, 20)).collect();
        assert!(materials[..12].iter().all(|m| *m == CubeMaterial::Glass));
        assert!(materials[12..17].iter().all(|m| *m == CubeMaterial::Diffuse));
        assert!(materials[17..].iter().all(|m| *m == CubeMaterial::Metal));
    }

    #[test]
    fn cube_material_is_deterministic() {
        for total in [1, 4, 49, 64] {
            for index in 0..total {
                assert_eq!(
                    material_for_cube_index(index, total),
                    material_for_cube_index(index, total)
                );
            }
        }
    }

    #[test]
    fn cube_hit_groups() {
        assert_eq!(CubeMaterial::Glass.primary_hit_group(), HitGroup::GlassPrimaryHit);
        assert_eq!(CubeMaterial::Diffuse.primary_hit_group(), HitGroup::CubePrimaryHit);
        assert_eq!(CubeMaterial::Metal.primary_hit_group(), HitGroup::GlassPrimaryHit);
        assert_eq!(CubeMaterial::from_custom_id(5), CubeMaterial::Metal);
    }

    #[test]
    fn sphere_selector_table() {
        assert_eq!(SphereMaterial::from_selector(0.0), SphereMaterial::Metallic);
        assert_eq!(SphereMaterial::from_selector(0.69), SphereMaterial::Metallic);
        assert_eq!(SphereMaterial::from_selector(0.7), SphereMaterial::Diffuse);
        assert_eq!(SphereMaterial::from_selector(0.89), SphereMaterial::Diffuse);
        assert_eq!(SphereMaterial::from_selector(0.9), SphereMaterial::Glass);
        assert_eq!(SphereMaterial::from_selector(0.999), SphereMaterial::Glass);
    }

    #[test]
    fn sphere_draw_reproducible_with_seed() {
        let draw = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..32).map(|_| material_for_sphere_draw(&mut rng)).collect::<Vec<_>>()
        };
        assert_eq!(draw(7), draw(7));
    }

    #[test]
    fn sphere_draw_distribution() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut counts = [0usize; 3];
        for _ in 0..10_000 {
            match material_for_sphere_draw(&mut rng) {
                SphereMaterial::Metallic => counts[0] += 1,
                SphereMaterial::Diffuse => counts[1] += 1,
                SphereMaterial::Glass => counts[2] += 1,
            }
        }
        assert!((6_500..7_500).contains(&counts[0]));
        assert!((1_600..2_400).contains(&counts[1]));
        assert!((600..1_400).contains(&counts[2]));
    }

    #[test]
    fn procedural_groups() {
        let procedural: Vec<_> = HitGroup::ALL.iter().filter(|g| g.is_procedural()).collect();
        assert_eq!(procedural.len(), 4);
        assert_eq!(HitGroup::SphereShadowHit.name(), "SphereShadowHit");
    }
}
