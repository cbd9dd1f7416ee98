//! Application framework for the Prism ray tracer.
//!
//! This crate provides a trait-based application framework that handles:
//! - Window creation and management
//! - GPU context initialization, including the ray tracing requirement
//! - Swapchain creation and recreation
//! - Frame synchronization
//! - Event loop handling
//!
//! # Example
//!
//! ```no_run
//! use prism_app::{PrismApp, AppContext, FrameContext, AppConfig, run_app};
//!
//! struct MyApp;
//!
//! impl PrismApp for MyApp {
//!     fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
//!         Ok(MyApp)
//!     }
//!
//!     fn update(&mut self, ctx: &AppContext, dt: f32) {}
//!
//!     fn render(&mut self, ctx: &AppContext, frame: &mut FrameContext) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app::<MyApp>(AppConfig::new("Demo").with_ray_tracing(true))
//! }
//! ```

mod app;
mod context;
mod frame;
mod runner;

pub use app::PrismApp;
pub use context::AppContext;
pub use frame::FrameContext;
pub use runner::{is_unsupported, run_app, AppConfig};

// Re-export commonly used types for convenience
pub use prism_gpu::{GpuContext, GpuContextBuilder};
pub use winit::event::{DeviceEvent, DeviceId, ElementState, MouseButton, WindowEvent};
pub use winit::keyboard::{KeyCode, PhysicalKey};
