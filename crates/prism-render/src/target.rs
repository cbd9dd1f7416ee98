//! Window-sized image the ray tracer writes and the blit pass samples.

use ash::vk;
use gpu_allocator::MemoryLocation;
use prism_gpu::command::{transition_image, ImageAccess};
use prism_gpu::texture::create_view;
use prism_gpu::{GpuContext, GpuImage, Result};

/// Output image format.
pub const FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// What a window resize requires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResizeAction {
    /// Zero-sized window; nothing changes
    Ignore,
    /// Same size; only the projection is refreshed
    ProjectionOnly,
    /// New size; the projection and the output image are rebuilt
    Recreate,
}

/// Decide how to handle a resize to `width` x `height`.
pub const fn resize_action(current: vk::Extent2D, width: u32, height: u32) -> ResizeAction {
    if width == 0 || height == 0 {
        ResizeAction::Ignore
    } else if current.width == width && current.height == height {
        ResizeAction::ProjectionOnly
    } else {
        ResizeAction::Recreate
    }
}

pub struct RenderTarget {
    image: GpuImage,
    view: vk::ImageView,
    extent: vk::Extent2D,
}

impl RenderTarget {
    pub fn new(gpu: &GpuContext, extent: vk::Extent2D) -> Result<Self> {
        let (image, view) = create_image(gpu, extent)?;
        tracing::debug!(width = extent.width, height = extent.height, "Render target created");
        Ok(Self {
            image,
            view,
            extent,
        })
    }

    pub const fn view(&self) -> vk::ImageView {
        self.view
    }

    pub const fn image(&self) -> vk::Image {
        self.image.image
    }

    pub const fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Replace the image with one of a new size.
    ///
    /// # Safety
    /// The GPU must be idle. Descriptors referencing the old view must be
    /// rewritten before the next frame.
    pub unsafe fn recreate(&mut self, gpu: &GpuContext, extent: vk::Extent2D) -> Result<()> {
        let (image, view) = create_image(gpu, extent)?;
        let mut old = std::mem::replace(&mut self.image, image);
        let old_view = std::mem::replace(&mut self.view, view);
        self.extent = extent;

        gpu.device().destroy_image_view(old_view, None);
        gpu.allocator().lock().free_image(&mut old)?;

        tracing::info!(width = extent.width, height = extent.height, "Render target recreated");
        Ok(())
    }

    /// Make the image writable by ray tracing shaders. The previous contents
    /// are discarded once the last frame's blit has read them.
    ///
    /// # Safety
    /// The command buffer must be recording.
    pub unsafe fn begin_trace(&self, device: &ash::Device, cmd: vk::CommandBuffer) {
        transition_image(
            device,
            cmd,
            self.image.image,
            ImageAccess::new(
                vk::PipelineStageFlags2::FRAGMENT_SHADER,
                vk::AccessFlags2::NONE,
                vk::ImageLayout::UNDEFINED,
            ),
            ImageAccess::new(
                vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR,
                vk::AccessFlags2::SHADER_STORAGE_WRITE,
                vk::ImageLayout::GENERAL,
            ),
        );
    }

    /// Make the traced image readable by the blit pass.
    ///
    /// # Safety
    /// The command buffer must be recording.
    pub unsafe fn end_trace(&self, device: &ash::Device, cmd: vk::CommandBuffer) {
        transition_image(
            device,
            cmd,
            self.image.image,
            ImageAccess::new(
                vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR,
                vk::AccessFlags2::SHADER_STORAGE_WRITE,
                vk::ImageLayout::GENERAL,
            ),
            ImageAccess::new(
                vk::PipelineStageFlags2::FRAGMENT_SHADER,
                vk::AccessFlags2::SHADER_SAMPLED_READ,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            ),
        );
    }

    /// # Safety
    /// The image must not be in use.
    pub unsafe fn destroy(&mut self, gpu: &GpuContext) -> Result<()> {
        gpu.device().destroy_image_view(self.view, None);
        self.view = vk::ImageView::null();
        gpu.allocator().lock().free_image(&mut self.image)
    }
}

fn create_image(gpu: &GpuContext, extent: vk::Extent2D) -> Result<(GpuImage, vk::ImageView)> {
    let image_info = vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(FORMAT)
        .extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::SAMPLED)
        .initial_layout(vk::ImageLayout::UNDEFINED);

    let mut image = gpu
        .allocator()
        .lock()
        .create_image(&image_info, MemoryLocation::GpuOnly, "Color buffer")?;

    match unsafe { create_view(gpu.device(), image.image, FORMAT) } {
        Ok(view) => Ok((image, view)),
        Err(e) => {
            gpu.allocator().lock().free_image(&mut image)?;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 1280,
        height: 720,
    };

    #[test]
    fn zero_sizes_are_ignored() {
        assert_eq!(resize_action(EXTENT, 0, 720), ResizeAction::Ignore);
        assert_eq!(resize_action(EXTENT, 1280, 0), ResizeAction::Ignore);
    }

    #[test]
    fn same_size_keeps_the_image() {
        assert_eq!(resize_action(EXTENT, 1280, 720), ResizeAction::ProjectionOnly);
    }

    #[test]
    fn new_size_recreates() {
        assert_eq!(resize_action(EXTENT, 1920, 1080), ResizeAction::Recreate);
        assert_eq!(resize_action(EXTENT, 1280, 721), ResizeAction::Recreate);
    }
}
