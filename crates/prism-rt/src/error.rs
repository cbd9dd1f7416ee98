//! Ray tracing error types.

use ash::vk;
use prism_gpu::GpuError;
use thiserror::Error;

/// Ray tracing errors.
#[derive(Error, Debug)]
pub enum RtError {
    /// Underlying GPU failure. Kept as the error source so callers can
    /// downcast through the chain.
    #[error("GPU error")]
    Gpu(#[from] GpuError),

    /// No shader group with this name exists in the pipeline.
    #[error("Unknown shader group: {0}")]
    UnknownShaderGroup(String),

    /// No TLAS instance with this name exists.
    #[error("Unknown instance: {0}")]
    UnknownInstance(String),

    /// A TLAS update was given a different instance count than the build.
    #[error("TLAS instance count changed from {expected} to {actual}")]
    InstanceCountChanged { expected: usize, actual: usize },

    /// The TLAS was used before its first build.
    #[error("TLAS has not been built")]
    TlasNotBuilt,

    /// A binding table slot is out of range.
    #[error("Binding table slot out of range: {0}")]
    SlotOutOfRange(String),
}

impl From<vk::Result> for RtError {
    fn from(e: vk::Result) -> Self {
        Self::Gpu(GpuError::Vulkan(e))
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, RtError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn gpu_errors_stay_in_the_source_chain() {
        let err = RtError::from(GpuError::ExtensionNotSupported("VK_KHR_ray_tracing_pipeline".into()));
        let source = err.source().and_then(|s| s.downcast_ref::<GpuError>());
        assert!(matches!(source, Some(GpuError::ExtensionNotSupported(_))));
    }
}
