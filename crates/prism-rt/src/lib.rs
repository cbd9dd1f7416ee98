//! Hardware ray tracing for the Prism renderer.
//!
//! Built on `VK_KHR_acceleration_structure` and `VK_KHR_ray_tracing_pipeline`:
//! - [`Blas`]: triangle and procedural bottom-level structures
//! - [`Tlas`]: the top-level structure, built once and updated every frame
//! - [`RayTracingPipeline`]: named shader groups
//! - [`ShaderBindingTable`]: name-based record binding with an explicit sync
//!
//! # Example
//!
//! ```ignore
//! let rt = RtDevice::new(&gpu)?;
//! let pipeline = RayTracingPipeline::new(gpu.device(), &rt, &desc)?;
//! let mut sbt = ShaderBindingTable::new(&gpu, &rt, &pipeline, 2, instance_count, 2)?;
//! sbt.bind_ray_gen("Main")?;
//! sbt.bind_hit_group_for_instance(&tlas, "Ground Instance", 0, "GroundHit")?;
//! unsafe { sbt.sync(gpu.device(), cmd)? };
//! ```

pub mod blas;
pub mod device;
pub mod error;
pub mod pipeline;
pub mod sbt;
pub mod tlas;

pub use blas::{build_blases, Blas};
pub use device::RtDevice;
pub use error::{Result, RtError};
pub use pipeline::{
    RayTracingPipeline, RayTracingPipelineDesc, ShaderGroupDesc, ShaderStage, ShaderStageDesc,
};
pub use sbt::{SbtData, SbtLayout, ShaderBindingTable};
pub use tlas::{BuildMode, InstanceRecord, Tlas, TlasInstance, TlasState};
