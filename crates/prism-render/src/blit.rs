//! Full-screen pass copying the traced image to the swapchain.

use ash::vk;
use prism_gpu::command::{transition_image, ImageAccess};
use prism_gpu::{
    create_linear_sampler, DescriptorPool, DescriptorSetLayoutBuilder, DescriptorWriter,
    GraphicsPipeline, GraphicsPipelineConfig, Result,
};

pub struct BlitPass {
    pipeline: GraphicsPipeline,
    set_layout: vk::DescriptorSetLayout,
    descriptor_pool: DescriptorPool,
    descriptor_set: vk::DescriptorSet,
    sampler: vk::Sampler,
}

impl BlitPass {
    /// Create the pass for swapchain images of `color_format`.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device, color_format: vk::Format) -> Result<Self> {
        let set_layout = DescriptorSetLayoutBuilder::new()
            .sampled_images(0, 1, vk::ShaderStageFlags::FRAGMENT)
            .build(device)?;

        let config = GraphicsPipelineConfig::fullscreen(
            prism_shaders::blit_vertex().to_vec(),
            prism_shaders::blit_fragment().to_vec(),
            color_format,
        );
        let pipeline = GraphicsPipeline::new(device, &config, &[set_layout], &[])?;

        let pool_sizes = [vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(1)];
        let descriptor_pool = DescriptorPool::new(device, 1, &pool_sizes)?;
        let descriptor_set = descriptor_pool.allocate_one(device, set_layout)?;
        let sampler = create_linear_sampler(device)?;

        Ok(Self {
            pipeline,
            set_layout,
            descriptor_pool,
            descriptor_set,
            sampler,
        })
    }

    /// Point the pass at the traced image.
    ///
    /// # Safety
    /// The descriptor set must not be in use by pending commands.
    pub unsafe fn bind_source(&self, device: &ash::Device, view: vk::ImageView) {
        DescriptorWriter::new()
            .sampled_images(
                0,
                &[(view, self.sampler)],
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )
            .update(device, self.descriptor_set);
    }

    /// Draw into `target` and leave it ready for presentation.
    ///
    /// # Safety
    /// The command buffer must be recording outside rendering.
    pub unsafe fn record(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        target: vk::Image,
        target_view: vk::ImageView,
        extent: vk::Extent2D,
    ) {
        let attachment = ImageAccess::new(
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        );
        transition_image(
            device,
            cmd,
            target,
            ImageAccess::new(
                vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                vk::AccessFlags2::NONE,
                vk::ImageLayout::UNDEFINED,
            ),
            attachment,
        );

        let color_attachments = [vk::RenderingAttachmentInfo::default()
            .image_view(target_view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::DONT_CARE)
            .store_op(vk::AttachmentStoreOp::STORE)];
        let area = vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent,
        };
        let rendering_info = vk::RenderingInfo::default()
            .render_area(area)
            .layer_count(1)
            .color_attachments(&color_attachments);

        device.cmd_begin_rendering(cmd, &rendering_info);
        device.cmd_set_viewport(
            cmd,
            0,
            &[vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            }],
        );
        device.cmd_set_scissor(cmd, 0, &[area]);
        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.pipeline);
        device.cmd_bind_descriptor_sets(
            cmd,
            vk::PipelineBindPoint::GRAPHICS,
            self.pipeline.layout,
            0,
            &[self.descriptor_set],
            &[],
        );
        device.cmd_draw(cmd, 3, 1, 0, 0);
        device.cmd_end_rendering(cmd);

        transition_image(
            device,
            cmd,
            target,
            attachment,
            ImageAccess::new(
                vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
                vk::AccessFlags2::NONE,
                vk::ImageLayout::PRESENT_SRC_KHR,
            ),
        );
    }

    /// # Safety
    /// The pass must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_sampler(self.sampler, None);
        self.descriptor_pool.destroy(device);
        self.pipeline.destroy(device);
        device.destroy_descriptor_set_layout(self.set_layout, None);
    }
}
