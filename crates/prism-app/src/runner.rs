//! Application runner and event loop.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ash::vk;
use prism_gpu::command::{begin_command_buffer, end_command_buffer, submit_command_buffers};
use prism_gpu::{GpuContextBuilder, GpuError};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{DeviceEvent, DeviceId, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::app::PrismApp;
use crate::context::AppContext;
use crate::frame::FrameContext;

/// Application configuration.
#[derive(Clone)]
pub struct AppConfig {
    /// Window title.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Target frames per second (None for unlimited).
    pub target_fps: Option<u32>,
    /// Enable vsync.
    pub vsync: bool,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
    /// Refuse devices without hardware ray tracing.
    pub require_ray_tracing: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Prism".to_string(),
            width: 1280,
            height: 720,
            target_fps: None,
            vsync: false,
            validation: cfg!(debug_assertions),
            require_ray_tracing: false,
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    #[must_use]
    pub const fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the target FPS.
    #[must_use]
    pub const fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = Some(fps);
        self
    }

    /// Enable or disable vsync.
    #[must_use]
    pub const fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Enable or disable validation layers.
    #[must_use]
    pub const fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Declare a hard dependency on hardware ray tracing.
    #[must_use]
    pub const fn with_ray_tracing(mut self, require: bool) -> Self {
        self.require_ray_tracing = require;
        self
    }
}

/// Whether an error means the device cannot run the application at all.
pub fn is_unsupported(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<GpuError>(),
            Some(GpuError::ExtensionNotSupported(_))
        )
    })
}

/// Run a `PrismApp` with the given configuration.
///
/// Initializes logging, creates the window and GPU context, and runs the
/// event loop until the application exits. A device without the required
/// features is logged and ends the run with `Ok`; any other initialization
/// or frame error is returned.
pub fn run_app<A: PrismApp + 'static>(config: AppConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("{} starting...", config.title);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner::<A> {
        config,
        state: None,
        failure: None,
    };

    event_loop.run_app(&mut runner)?;

    match runner.failure {
        Some(e) if is_unsupported(&e) => {
            warn!("Unsupported device: {e:#}");
            Ok(())
        }
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Internal application runner that implements winit's `ApplicationHandler`.
struct AppRunner<A: PrismApp> {
    config: AppConfig,
    state: Option<AppState<A>>,
    /// Error that ended the run
    failure: Option<anyhow::Error>,
}

/// Internal application state.
struct AppState<A: PrismApp> {
    ctx: AppContext,
    app: A,
    target_frame_time: Option<Duration>,
    // FPS tracking
    min_fps: f64,
    max_fps: f64,
    fps_sum: f64,
}

impl<A: PrismApp + 'static> AppRunner<A> {
    fn fail(&mut self, event_loop: &ActiveEventLoop, e: anyhow::Error) {
        if !is_unsupported(&e) {
            error!("{e:#}");
        }
        if let Some(mut state) = self.state.take() {
            state.cleanup();
        }
        self.failure.get_or_insert(e);
        event_loop.exit();
    }
}

impl<A: PrismApp + 'static> ApplicationHandler for AppRunner<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() || self.failure.is_some() {
            return;
        }

        info!("Creating application state...");

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Application ready!");
            }
            Err(e) => self.fail(event_loop, e.context("Failed to initialize application")),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        // Let the app handle the event first
        if let Some(state) = &mut self.state {
            if state.app.on_event(&state.ctx, &event) {
                return;
            }
        }

        let result = match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                if let Some(mut state) = self.state.take() {
                    state.cleanup();
                }
                event_loop.exit();
                Ok(())
            }
            WindowEvent::RedrawRequested => self.state.as_mut().map_or(Ok(()), |state| {
                let result = state.render_frame();
                state.ctx.window.request_redraw();
                result.map_err(|e| e.context("Render error"))
            }),
            WindowEvent::Resized(size) => self.state.as_mut().map_or(Ok(()), |state| {
                state
                    .handle_resize(size.width, size.height)
                    .map_err(|e| e.context("Resize error"))
            }),
            _ => Ok(()),
        };

        if let Err(e) = result {
            self.fail(event_loop, e);
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        device_id: DeviceId,
        event: DeviceEvent,
    ) {
        if let Some(state) = &mut self.state {
            state.app.on_device_event(device_id, &event);
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.ctx.window.request_redraw();
        }
    }
}

impl<A: PrismApp + 'static> AppRunner<A> {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState<A>> {
        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));

        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let gpu = GpuContextBuilder::new()
            .app_name(&self.config.title)
            .validation(self.config.validation)
            .require_ray_tracing(self.config.require_ray_tracing)
            .build()?;

        info!("GPU: {}", gpu.capabilities().summary());

        // SAFETY: The window was just created and has valid handles
        let mut ctx = unsafe { AppContext::new(window, gpu, self.config.vsync)? };

        let app = match A::init(&mut ctx) {
            Ok(app) => app,
            Err(e) => {
                // SAFETY: Nothing was submitted by a failed init that is
                // still pending once the device is idle
                unsafe {
                    ctx.gpu.wait_idle()?;
                    ctx.cleanup();
                }
                return Err(e);
            }
        };

        let target_frame_time = self
            .config
            .target_fps
            .map(|fps| Duration::from_nanos(1_000_000_000 / u64::from(fps.max(1))));

        Ok(AppState {
            ctx,
            app,
            target_frame_time,
            min_fps: f64::MAX,
            max_fps: 0.0,
            fps_sum: 0.0,
        })
    }
}

impl<A: PrismApp> AppState<A> {
    fn render_frame(&mut self) -> anyhow::Result<()> {
        let frame_start = Instant::now();

        let now = Instant::now();
        let dt = now.duration_since(self.ctx.last_frame_time).as_secs_f32();
        self.ctx.last_frame_time = now;

        if dt > 0.0 {
            let fps = 1.0 / f64::from(dt);
            self.min_fps = self.min_fps.min(fps);
            self.max_fps = self.max_fps.max(fps);
            self.fps_sum += fps;
        }

        self.app.update(&self.ctx, dt);

        let device = self.ctx.gpu.device();
        let frame = &self.ctx.frames[self.ctx.current_frame_index];

        // SAFETY: Frame resources belong to this device
        let acquired = unsafe {
            frame.wait(device)?;
            self.ctx.swapchain.acquire_next_image(
                &self.ctx.surface.swapchain_loader,
                frame.image_available,
                u64::MAX,
            )
        };
        let image_index = match acquired {
            Ok((index, _suboptimal)) => index,
            Err(GpuError::Vulkan(vk::Result::ERROR_OUT_OF_DATE_KHR)) => {
                let size = self.ctx.window.inner_size();
                return self.handle_resize(size.width, size.height);
            }
            Err(e) => return Err(e.into()),
        };

        // Reset the fence only once a submission is guaranteed
        // SAFETY: The fence is signaled and not in use
        unsafe { frame.reset(device)? };

        let cmd = frame.command_buffer;
        let image = image_index as usize;
        let mut frame_ctx = FrameContext {
            command_buffer: cmd,
            image_index,
            swapchain_image: self.ctx.swapchain.images[image],
            swapchain_view: self.ctx.swapchain.image_views[image],
            extent: self.ctx.swapchain.extent,
            dt,
            frame_number: self.ctx.frame_count,
        };

        // SAFETY: The command buffer's previous submission has completed
        unsafe {
            device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
            begin_command_buffer(device, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        }
        self.app.render(&self.ctx, &mut frame_ctx)?;
        // SAFETY: Recording started above
        unsafe { end_command_buffer(device, cmd)? };

        let render_finished = self.ctx.render_finished[image];
        // SAFETY: All handles are valid; the blit writes color attachments
        // after the image is acquired
        unsafe {
            submit_command_buffers(
                device,
                self.ctx.gpu.graphics_queue(),
                &[cmd],
                &[frame.image_available],
                &[vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
                &[render_finished],
                frame.in_flight,
            )?;

            self.ctx.swapchain.present(
                &self.ctx.surface.swapchain_loader,
                self.ctx.gpu.graphics_queue(),
                image_index,
                &[render_finished],
            )?;
        }

        self.ctx.current_frame_index = (self.ctx.current_frame_index + 1) % self.ctx.frames.len();
        self.ctx.frame_count += 1;

        // Frame pacing
        if let Some(target) = self.target_frame_time {
            let elapsed = frame_start.elapsed();
            if elapsed < target {
                thread::sleep(target - elapsed);
            }
        }

        Ok(())
    }

    fn handle_resize(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        if width == 0 || height == 0 {
            return Ok(());
        }

        // SAFETY: The device is idle before the swapchain is replaced
        unsafe {
            self.ctx.gpu.wait_idle()?;
            self.ctx.recreate_swapchain(width, height)?;
        }

        self.app.on_resize(&mut self.ctx, width, height)?;

        info!("Resized to {}x{}", width, height);
        Ok(())
    }

    fn cleanup(&mut self) {
        if self.ctx.frame_count > 0 {
            let avg_fps = self.fps_sum / self.ctx.frame_count as f64;
            info!("FPS Statistics:");
            info!("  Min: {:.1}", self.min_fps);
            info!("  Max: {:.1}", self.max_fps);
            info!("  Avg: {:.1}", avg_fps);
            info!("  Total frames: {}", self.ctx.frame_count);
        }

        info!("Starting cleanup...");
        if let Err(e) = self.ctx.gpu.wait_idle() {
            error!("Failed to wait idle: {e}");
        }

        self.app.cleanup(&mut self.ctx);

        // SAFETY: The GPU is idle
        unsafe { self.ctx.cleanup() };

        info!("Cleanup complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_is_found_through_context() {
        let e = anyhow::Error::new(GpuError::ExtensionNotSupported("VK_KHR_ray_query".into()))
            .context("Failed to initialize application");
        assert!(is_unsupported(&e));
    }

    #[test]
    fn other_errors_are_failures() {
        let e = anyhow::Error::new(GpuError::NoSuitableDevice);
        assert!(!is_unsupported(&e));
        assert!(!is_unsupported(&anyhow::anyhow!("texture missing")));
    }

    #[test]
    fn config_builder() {
        let config = AppConfig::new("Test")
            .with_size(640, 480)
            .with_vsync(true)
            .with_ray_tracing(true);
        assert_eq!(config.title, "Test");
        assert_eq!((config.width, config.height), (640, 480));
        assert!(config.vsync);
        assert!(config.require_ray_tracing);
        assert!(!AppConfig::default().require_ray_tracing);
    }
}
