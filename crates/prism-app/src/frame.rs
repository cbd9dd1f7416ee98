//! Per-frame context for rendering.

use ash::vk;

/// Context for the current frame being rendered.
///
/// Provides access to the command buffer and swapchain image for this frame.
pub struct FrameContext {
    /// Command buffer for recording rendering commands.
    pub command_buffer: vk::CommandBuffer,
    /// Index of the acquired swapchain image.
    pub image_index: u32,
    /// The swapchain image for this frame.
    pub swapchain_image: vk::Image,
    /// View of the swapchain image, for use as a color attachment.
    pub swapchain_view: vk::ImageView,
    /// Swapchain extent.
    pub extent: vk::Extent2D,
    /// Delta time since last frame in seconds.
    pub dt: f32,
    /// Current frame number.
    pub frame_number: u64,
}
