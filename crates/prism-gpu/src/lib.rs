//! Vulkan abstraction layer for the Prism ray tracer.
//!
//! This crate provides:
//! - Vulkan instance and device management
//! - GPU and ray tracing capability detection
//! - Memory allocation via gpu-allocator
//! - Command buffer, barrier and descriptor helpers
//! - Swapchain handling
//! - Texture upload

pub mod capabilities;
pub mod command;
pub mod context;
pub mod descriptors;
pub mod error;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod texture;

pub use capabilities::{GpuCapabilities, GpuVendor, RayTracingCapabilities};
pub use command::CommandPool;
pub use context::{GpuContext, GpuContextBuilder};
pub use descriptors::{DescriptorPool, DescriptorSetLayoutBuilder, DescriptorWriter};
pub use error::{GpuError, Result};
pub use memory::{GpuAllocator, GpuBuffer, GpuImage};
pub use pipeline::{GraphicsPipeline, GraphicsPipelineConfig};
pub use surface::{SurfaceCapabilities, SurfaceContext};
pub use sync::FrameSync;
pub use texture::{create_linear_sampler, Texture};
