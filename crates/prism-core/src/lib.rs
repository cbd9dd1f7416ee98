//! Core types, math, and geometry for the Prism ray tracer.
//!
//! This crate provides the foundational types shared by the other crates:
//! - Bounding boxes and 3x4 instance transforms
//! - Cube geometry and the attribute block read by hit shaders
//! - Asset path resolution
//! - Common error types

pub mod assets;
pub mod error;
pub mod geometry;
pub mod math;

pub use assets::AssetDir;
pub use error::{Error, Result};
pub use geometry::{CubeAttribs, CubeGeometry};
pub use math::{Aabb, InstanceTransform};

/// Scene-wide constants
pub mod constants {
    /// Number of textures sampled by the cube hit shaders
    pub const NUM_CUBE_TEXTURES: usize = 4;
    /// Vertices in a cube (4 per face, faces do not share vertices)
    pub const CUBE_VERTEX_COUNT: usize = 24;
    /// Triangles in a cube
    pub const CUBE_TRIANGLE_COUNT: usize = 12;
}
