//! Sampled 2D textures uploaded through a staging buffer.

use std::path::Path;

use ash::vk;
use gpu_allocator::MemoryLocation;

use crate::command::{
    color_subresource_range, execute_single_time_commands, transition_image, CommandPool,
    ImageAccess,
};
use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::memory::GpuImage;

/// An RGBA8 image with a view, ready for sampling in
/// `SHADER_READ_ONLY_OPTIMAL` layout.
pub struct Texture {
    pub image: GpuImage,
    pub view: vk::ImageView,
    name: String,
}

impl Texture {
    /// Decode an image file and upload it.
    ///
    /// `srgb` selects `R8G8B8A8_SRGB` so the sampler linearizes the texels.
    pub fn load(gpu: &GpuContext, pool: &CommandPool, path: &Path, srgb: bool) -> Result<Self> {
        let decoded = image::open(path)
            .map_err(|e| GpuError::Texture(format!("{}: {e}", path.display())))?
            .into_rgba8();
        let (width, height) = decoded.dimensions();
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());

        tracing::debug!(%name, width, height, srgb, "Texture decoded");
        Self::from_rgba8(gpu, pool, &name, width, height, decoded.as_raw(), srgb)
    }

    /// Upload tightly packed RGBA8 pixels.
    pub fn from_rgba8(
        gpu: &GpuContext,
        pool: &CommandPool,
        name: &str,
        width: u32,
        height: u32,
        pixels: &[u8],
        srgb: bool,
    ) -> Result<Self> {
        let expected = rgba8_size(width, height);
        if width == 0 || height == 0 || pixels.len() as u64 != expected {
            return Err(GpuError::Texture(format!(
                "{name}: {} bytes for {width}x{height} RGBA8 (expected {expected})",
                pixels.len()
            )));
        }

        let device = gpu.device();
        let format = if srgb {
            vk::Format::R8G8B8A8_SRGB
        } else {
            vk::Format::R8G8B8A8_UNORM
        };

        let mut staging = gpu.allocator().lock().create_buffer(
            expected,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
            &format!("{name} staging"),
        )?;

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let upload = staging.write(pixels).and_then(|()| {
            gpu.allocator()
                .lock()
                .create_image(&image_info, MemoryLocation::GpuOnly, name)
        });
        let mut image = match upload {
            Ok(image) => image,
            Err(e) => {
                gpu.allocator().lock().free_buffer(&mut staging)?;
                return Err(e);
            }
        };

        let copied = unsafe {
            execute_single_time_commands(device, pool, gpu.graphics_queue(), |cmd| {
                record_upload(device, cmd, staging.buffer, image.image, width, height);
                Ok(())
            })
        };
        gpu.allocator().lock().free_buffer(&mut staging)?;

        let view = copied.and_then(|()| unsafe { create_view(device, image.image, format) });
        let view = match view {
            Ok(view) => view,
            Err(e) => {
                gpu.allocator().lock().free_image(&mut image)?;
                return Err(e);
            }
        };

        tracing::debug!(name, width, height, "Texture uploaded");
        Ok(Self {
            image,
            view,
            name: name.to_owned(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Release the view and image memory.
    ///
    /// # Safety
    /// The texture must not be in use by the GPU.
    pub unsafe fn destroy(&mut self, gpu: &GpuContext) -> Result<()> {
        gpu.device().destroy_image_view(self.view, None);
        self.view = vk::ImageView::null();
        gpu.allocator().lock().free_image(&mut self.image)
    }
}

/// Byte size of an RGBA8 image.
pub const fn rgba8_size(width: u32, height: u32) -> u64 {
    width as u64 * height as u64 * 4
}

unsafe fn record_upload(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    staging: vk::Buffer,
    image: vk::Image,
    width: u32,
    height: u32,
) {
    transition_image(
        device,
        cmd,
        image,
        ImageAccess::UNDEFINED,
        ImageAccess::new(
            vk::PipelineStageFlags2::COPY,
            vk::AccessFlags2::TRANSFER_WRITE,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ),
    );

    let region = vk::BufferImageCopy::default()
        .image_subresource(
            vk::ImageSubresourceLayers::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .layer_count(1),
        )
        .image_extent(vk::Extent3D {
            width,
            height,
            depth: 1,
        });
    device.cmd_copy_buffer_to_image(
        cmd,
        staging,
        image,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        &[region],
    );

    transition_image(
        device,
        cmd,
        image,
        ImageAccess::new(
            vk::PipelineStageFlags2::COPY,
            vk::AccessFlags2::TRANSFER_WRITE,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ),
        ImageAccess::new(
            vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR
                | vk::PipelineStageFlags2::FRAGMENT_SHADER,
            vk::AccessFlags2::SHADER_SAMPLED_READ,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ),
    );
}

/// Create a 2D color view of the first mip and layer.
///
/// # Safety
/// The device and image must be valid.
pub unsafe fn create_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
) -> Result<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(color_subresource_range());
    Ok(device.create_image_view(&view_info, None)?)
}

/// Trilinear, repeating sampler shared by every texture.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_linear_sampler(device: &ash::Device) -> Result<vk::Sampler> {
    let info = vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .max_lod(vk::LOD_CLAMP_NONE);
    Ok(device.create_sampler(&info, None)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgba8_size_does_not_overflow() {
        assert_eq!(rgba8_size(256, 256), 262_144);
        assert_eq!(rgba8_size(u32::MAX, 2), u64::from(u32::MAX) * 8);
    }
}
