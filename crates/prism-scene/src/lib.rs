//! Scene composition for the ray-traced instance demo.
//!
//! Everything here is CPU-side and GPU-agnostic:
//! - [`SceneConfig`] sizes the sphere spiral and cube pyramid
//! - [`placement`] computes deterministic instance transforms
//! - [`material`] picks cube materials by index and sphere materials by draw
//! - [`SceneState`] owns the one-time placement and per-frame visibility masks
//! - [`BindingPlan`] lists the shader binding table writes for the scene

pub mod binding;
pub mod config;
pub mod material;
pub mod placement;
pub mod state;

pub use binding::{BindingOp, BindingPlan, RayType, HIT_GROUP_STRIDE};
pub use config::SceneConfig;
pub use material::{
    material_for_cube_index, material_for_sphere_draw, CubeMaterial, HitGroup, SphereMaterial,
};
pub use state::{BlasKind, GeometryMask, Instance, InstanceKind, SceneState};
