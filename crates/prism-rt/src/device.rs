//! Ray tracing extension loaders.

use prism_gpu::{GpuContext, GpuError, RayTracingCapabilities};

use crate::error::Result;

/// Extension function tables and limits for a ray tracing capable device.
pub struct RtDevice {
    pub acceleration_structure: ash::khr::acceleration_structure::Device,
    pub ray_tracing_pipeline: ash::khr::ray_tracing_pipeline::Device,
    capabilities: RayTracingCapabilities,
}

impl RtDevice {
    /// Load the extension entry points.
    ///
    /// Fails with [`GpuError::ExtensionNotSupported`] when the context was
    /// created without ray tracing.
    pub fn new(gpu: &GpuContext) -> Result<Self> {
        if !gpu.ray_tracing_enabled() {
            let reason = gpu
                .ray_tracing()
                .unsupported_reason()
                .unwrap_or_else(|| "ray tracing not enabled on device".to_string());
            return Err(GpuError::ExtensionNotSupported(reason).into());
        }

        let capabilities = gpu.ray_tracing().clone();
        tracing::debug!(
            max_recursion = capabilities.max_ray_recursion_depth,
            handle_size = capabilities.shader_group_handle_size,
            "Ray tracing loaders created"
        );

        Ok(Self {
            acceleration_structure: ash::khr::acceleration_structure::Device::new(
                gpu.instance(),
                gpu.device(),
            ),
            ray_tracing_pipeline: ash::khr::ray_tracing_pipeline::Device::new(
                gpu.instance(),
                gpu.device(),
            ),
            capabilities,
        })
    }

    /// Hardware limits queried at device selection.
    pub const fn capabilities(&self) -> &RayTracingCapabilities {
        &self.capabilities
    }

    /// Scratch buffer alignment for acceleration structure builds.
    pub fn scratch_alignment(&self) -> u64 {
        u64::from(self.capabilities.min_scratch_offset_alignment.max(1))
    }
}
