//! Rendering passes for the Prism ray tracer.
//!
//! This crate provides:
//! - The scene's ray tracing pass and its descriptors
//! - A full-screen blit to the swapchain
//! - The window-sized output image
//! - Fly camera and shading constants

pub mod blit;
pub mod camera;
pub mod constants;
pub mod target;
pub mod tracer;

pub use blit::BlitPass;
pub use camera::{Camera, CameraInput};
pub use constants::ShaderConstants;
pub use target::{resize_action, RenderTarget, ResizeAction};
pub use tracer::SceneTracer;
