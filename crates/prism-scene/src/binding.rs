//! Hit-group bindings for the shader binding table.
//!
//! A [`BindingPlan`] is an ordered list of binding writes. Later writes
//! override earlier ones, so the TLAS-wide shadow default comes before the
//! per-sphere shadow groups.

use rand::Rng;
use tracing::debug;

use crate::material::{material_for_sphere_draw, HitGroup, SphereMaterial};
use crate::state::SceneState;

/// Hit records per instance, one per ray type.
pub const HIT_GROUP_STRIDE: u32 = 2;

/// Ray generation group name.
pub const RAY_GEN_GROUP: &str = "Main";

/// Ray types traced by the pipeline. The value is both the SBT record
/// offset and the miss index passed to `traceRayEXT`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum RayType {
    Primary = 0,
    Shadow = 1,
}

impl RayType {
    /// Index used for record offsets and miss slots.
    pub const fn index(self) -> u32 {
        self as u32
    }

    /// Miss group bound for this ray type.
    pub const fn miss_group(self) -> &'static str {
        match self {
            Self::Primary => "PrimaryMiss",
            Self::Shadow => "ShadowMiss",
        }
    }
}

/// One write into the binding table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BindingOp {
    RayGen(&'static str),
    Miss {
        ray: RayType,
        group: &'static str,
    },
    /// Bind every instance of the TLAS for one ray type. `None` writes an
    /// empty record.
    Tlas {
        ray: RayType,
        group: Option<HitGroup>,
    },
    Instance {
        instance: String,
        ray: RayType,
        group: HitGroup,
    },
}

/// Complete binding table contents for a scene.
#[derive(Clone, Debug)]
pub struct BindingPlan {
    pub ops: Vec<BindingOp>,
    /// Sphere materials in sphere order, as drawn for this plan
    pub sphere_materials: Vec<SphereMaterial>,
}

impl BindingPlan {
    /// Build the plan, drawing sphere materials from `rng`.
    ///
    /// Drawing happens here rather than at placement time, so rebuilding the
    /// plan with a new source re-rolls the sphere materials.
    pub fn build<R: Rng + ?Sized>(scene: &mut SceneState, rng: &mut R) -> Self {
        scene.ensure_initialized();

        let mut ops = vec![
            BindingOp::RayGen(RAY_GEN_GROUP),
            BindingOp::Miss {
                ray: RayType::Primary,
                group: RayType::Primary.miss_group(),
            },
            BindingOp::Miss {
                ray: RayType::Shadow,
                group: RayType::Shadow.miss_group(),
            },
        ];

        for number in 1..=3 {
            ops.push(BindingOp::Instance {
                instance: scene.instance_name(number),
                ray: RayType::Primary,
                group: HitGroup::GlassPrimaryHit,
            });
        }
        ops.push(BindingOp::Instance {
            instance: scene.instance_name(0),
            ray: RayType::Primary,
            group: HitGroup::GroundHit,
        });

        ops.push(BindingOp::Tlas {
            ray: RayType::Shadow,
            group: None,
        });

        let mut sphere_materials = Vec::with_capacity(scene.sphere_count());
        for name in scene.sphere_names() {
            let material = material_for_sphere_draw(rng);
            sphere_materials.push(material);
            ops.push(BindingOp::Instance {
                instance: name.clone(),
                ray: RayType::Primary,
                group: material.primary_hit_group(),
            });
            ops.push(BindingOp::Instance {
                instance: name,
                ray: RayType::Shadow,
                group: HitGroup::SphereShadowHit,
            });
        }

        for (name, material) in scene.cube_materials() {
            ops.push(BindingOp::Instance {
                instance: name,
                ray: RayType::Primary,
                group: material.primary_hit_group(),
            });
        }

        debug!(ops = ops.len(), spheres = sphere_materials.len(), "Binding plan built");
        Self {
            ops,
            sphere_materials,
        }
    }

    /// Group bound for `(instance, ray)` after applying every op in order.
    ///
    /// `None` means an empty record.
    pub fn resolve(&self, instance: &str, ray: RayType) -> Option<HitGroup> {
        self.ops.iter().fold(None, |bound, op| match op {
            BindingOp::Tlas { ray: r, group } if *r == ray => *group,
            BindingOp::Instance {
                instance: name,
                ray: r,
                group,
            } if *r == ray && name == instance => Some(*group),
            _ => bound,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SceneConfig;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn plan(config: SceneConfig, seed: u64) -> (SceneState, BindingPlan) {
        let mut scene = SceneState::new(config);
        let mut rng = StdRng::seed_from_u64(seed);
        let plan = BindingPlan::build(&mut scene, &mut rng);
        (scene, plan)
    }

    #[test]
    fn fixed_bindings() {
        let (_, plan) = plan(SceneConfig::new(1, 1, 1, 1), 1);
        assert_eq!(plan.ops[0], BindingOp::RayGen("Main"));
        assert_eq!(
            plan.resolve("Ground Instance", RayType::Primary),
            Some(HitGroup::GroundHit)
        );
        for n in 1..=3 {
            let name = format!("Cube Instance {n}");
            assert_eq!(
                plan.resolve(&name, RayType::Primary),
                Some(HitGroup::GlassPrimaryHit)
            );
            assert_eq!(plan.resolve(&name, RayType::Shadow), None);
        }
    }

    #[test]
    fn spheres_get_shadow_group_over_tlas_default() {
        let (scene, plan) = plan(SceneConfig::new(1, 1, 1, 1), 3);
        for (name, material) in scene.sphere_names().zip(&plan.sphere_materials) {
            assert_eq!(
                plan.resolve(&name, RayType::Shadow),
                Some(HitGroup::SphereShadowHit)
            );
            assert_eq!(
                plan.resolve(&name, RayType::Primary),
                Some(material.primary_hit_group())
            );
        }
    }

    #[test]
    fn small_cubes_follow_material() {
        let (_, plan) = plan(SceneConfig::new(1, 1, 1, 1), 5);
        assert_eq!(
            plan.resolve("Cube Instance 8", RayType::Primary),
            Some(HitGroup::GlassPrimaryHit)
        );
        assert_eq!(
            plan.resolve("Cube Instance 11", RayType::Primary),
            Some(HitGroup::CubePrimaryHit)
        );
        assert_eq!(plan.resolve("Cube Instance 11", RayType::Shadow), None);
    }

    #[test]
    fn same_seed_same_plan() {
        let (_, a) = plan(SceneConfig::default(), 99);
        let (_, b) = plan(SceneConfig::default(), 99);
        assert_eq!(a.ops, b.ops);
        assert_eq!(a.sphere_materials.len(), 64);
    }

    #[test]
    fn op_count() {
        let config = SceneConfig::new(1, 2, 2, 1);
        let (_, plan) = plan(config, 0);
        // raygen + 2 miss + 4 static + tlas shadow + 2 per sphere + 1 per cube
        assert_eq!(
            plan.ops.len(),
            3 + 4 + 1 + 2 * config.sphere_count() + config.cube_count()
        );
    }
}
