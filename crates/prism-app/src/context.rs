//! Application context.

use std::sync::Arc;
use std::time::Instant;

use ash::vk;
use prism_gpu::swapchain::Swapchain;
use prism_gpu::sync::create_semaphore;
use prism_gpu::{CommandPool, FrameSync, GpuContext, SurfaceContext};
use winit::window::Window;

/// Application context shared across all app methods.
///
/// Provides access to the GPU context, window, swapchain, and other
/// resources needed for rendering.
pub struct AppContext {
    /// The window handle.
    pub window: Arc<Window>,
    /// GPU context with device and queues.
    pub gpu: GpuContext,
    /// Surface context for windowed rendering.
    pub surface: SurfaceContext,
    /// Current swapchain.
    pub swapchain: Swapchain,
    /// Graphics command pool, also usable for one-time uploads.
    pub command_pool: CommandPool,
    /// Per-frame synchronization data.
    pub(crate) frames: Vec<FrameSync>,
    /// Per-swapchain-image render finished semaphores.
    pub(crate) render_finished: Vec<vk::Semaphore>,
    /// Current frame index (into frames array).
    pub(crate) current_frame_index: usize,
    /// Total frames rendered.
    pub frame_count: u64,
    /// Time of last frame (for delta time calculation).
    pub(crate) last_frame_time: Instant,
    /// Whether vsync is enabled.
    pub vsync: bool,
}

impl AppContext {
    /// Create a new application context.
    ///
    /// # Safety
    /// The window must have valid handles.
    pub(crate) unsafe fn new(
        window: Arc<Window>,
        gpu: GpuContext,
        vsync: bool,
    ) -> anyhow::Result<Self> {
        // SAFETY: Caller guarantees window has valid handles
        let surface = unsafe { SurfaceContext::from_window(&gpu, window.as_ref())? };

        let size = window.inner_size();
        let width = size.width.max(1);
        let height = size.height.max(1);

        // SAFETY: GPU context is valid
        let swapchain = unsafe { surface.create_swapchain(&gpu, width, height, vsync, None)? };

        tracing::info!(
            "Swapchain created: {}x{} ({} images)",
            swapchain.extent.width,
            swapchain.extent.height,
            swapchain.images.len()
        );

        let device = gpu.device();
        // SAFETY: Device is valid
        let command_pool = unsafe {
            CommandPool::new(
                device,
                gpu.graphics_queue_family(),
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            )?
        };

        let frames_in_flight = swapchain.images.len();
        // SAFETY: Device and command pool are valid
        let command_buffers = unsafe {
            command_pool.allocate_command_buffers(
                device,
                vk::CommandBufferLevel::PRIMARY,
                u32::try_from(frames_in_flight)?,
            )?
        };
        let frames = command_buffers
            .into_iter()
            // SAFETY: Device is valid
            .map(|cmd| unsafe { FrameSync::new(device, cmd) })
            .collect::<prism_gpu::Result<Vec<_>>>()?;

        let render_finished = (0..swapchain.images.len())
            // SAFETY: Device is valid
            .map(|_| unsafe { create_semaphore(device) })
            .collect::<prism_gpu::Result<Vec<_>>>()?;

        Ok(Self {
            window,
            gpu,
            surface,
            swapchain,
            command_pool,
            frames,
            render_finished,
            current_frame_index: 0,
            frame_count: 0,
            last_frame_time: Instant::now(),
            vsync,
        })
    }

    /// Get the current swapchain extent.
    pub const fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    /// Get the aspect ratio (width / height).
    pub fn aspect_ratio(&self) -> f32 {
        self.swapchain.extent.width as f32 / self.swapchain.extent.height.max(1) as f32
    }

    /// Get the number of frames in flight.
    pub fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    /// Recreate the swapchain (e.g., after resize).
    ///
    /// # Safety
    /// The GPU must be idle.
    pub(crate) unsafe fn recreate_swapchain(
        &mut self,
        width: u32,
        height: u32,
    ) -> anyhow::Result<()> {
        // SAFETY: Caller guarantees GPU is idle
        unsafe {
            self.swapchain
                .destroy(self.gpu.device(), &self.surface.swapchain_loader);
        }

        // SAFETY: GPU context and surface are valid
        self.swapchain = unsafe {
            self.surface
                .create_swapchain(&self.gpu, width, height, self.vsync, None)?
        };

        // Render-finished semaphores are per image; the count may change
        let device = self.gpu.device();
        let image_count = self.swapchain.images.len();
        if self.render_finished.len() != image_count {
            // SAFETY: Caller guarantees GPU is idle
            unsafe {
                for semaphore in self.render_finished.drain(..) {
                    device.destroy_semaphore(semaphore, None);
                }
                self.render_finished = (0..image_count)
                    .map(|_| create_semaphore(device))
                    .collect::<prism_gpu::Result<Vec<_>>>()?;
            }
        }

        tracing::info!(
            "Swapchain recreated: {}x{} ({} images)",
            self.swapchain.extent.width,
            self.swapchain.extent.height,
            image_count
        );

        Ok(())
    }

    /// Cleanup all resources.
    ///
    /// # Safety
    /// The GPU must be idle and all resources must not be in use.
    pub(crate) unsafe fn cleanup(&mut self) {
        let device = self.gpu.device();

        // SAFETY: Caller guarantees GPU is idle and resources are not in use
        unsafe {
            for frame in self.frames.drain(..) {
                frame.destroy(device);
            }
            for semaphore in self.render_finished.drain(..) {
                device.destroy_semaphore(semaphore, None);
            }
            self.command_pool.destroy(device);

            self.swapchain
                .destroy(device, &self.surface.swapchain_loader);
            self.surface.destroy();
        }
    }
}
