//! `PrismApp` trait definition.

use crate::context::AppContext;
use crate::frame::FrameContext;
use winit::event::{DeviceEvent, DeviceId, WindowEvent};

/// Trait for Prism applications.
///
/// The framework handles window creation, GPU initialization, swapchain
/// management and the event loop.
pub trait PrismApp: Sized {
    /// Initialize the application.
    ///
    /// Called once after the GPU context and window have been created. An
    /// error aborts the run.
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self>;

    /// Update application state.
    ///
    /// Called every frame before rendering with the delta time in seconds.
    fn update(&mut self, ctx: &AppContext, dt: f32);

    /// Record the frame into `frame.command_buffer`.
    ///
    /// The framework acquires the swapchain image, submits and presents. The
    /// application must leave the swapchain image in `PRESENT_SRC_KHR`.
    fn render(&mut self, ctx: &AppContext, frame: &mut FrameContext) -> anyhow::Result<()>;

    /// Handle window resize.
    ///
    /// Called after the swapchain was recreated for a non-zero size. The GPU
    /// is idle.
    #[allow(unused_variables)]
    fn on_resize(&mut self, ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        Ok(())
    }

    /// Handle window events. Return `true` to stop further processing.
    #[allow(unused_variables)]
    fn on_event(&mut self, ctx: &AppContext, event: &WindowEvent) -> bool {
        false
    }

    /// Handle device events (raw input).
    ///
    /// Useful for raw mouse motion while looking around.
    #[allow(unused_variables)]
    fn on_device_event(&mut self, device_id: DeviceId, event: &DeviceEvent) {}

    /// Release GPU resources. The GPU is idle when this is called.
    #[allow(unused_variables)]
    fn cleanup(&mut self, ctx: &mut AppContext) {}
}
