//! Ray tracing pipeline built from named shader groups.

use ash::vk;
use hashbrown::HashMap;
use prism_gpu::pipeline::create_shader_module;
use prism_gpu::GpuError;

use crate::device::RtDevice;
use crate::error::{Result, RtError};

/// Ray tracing shader stage kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderStage {
    RayGen,
    Miss,
    ClosestHit,
    Intersection,
}

impl ShaderStage {
    pub const fn flags(self) -> vk::ShaderStageFlags {
        match self {
            Self::RayGen => vk::ShaderStageFlags::RAYGEN_KHR,
            Self::Miss => vk::ShaderStageFlags::MISS_KHR,
            Self::ClosestHit => vk::ShaderStageFlags::CLOSEST_HIT_KHR,
            Self::Intersection => vk::ShaderStageFlags::INTERSECTION_KHR,
        }
    }
}

/// A named SPIR-V stage.
#[derive(Clone, Copy, Debug)]
pub struct ShaderStageDesc<'a> {
    pub name: &'a str,
    pub stage: ShaderStage,
    pub code: &'a [u32],
}

/// A shader group referencing stages by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderGroupDesc<'a> {
    /// Ray generation or miss
    General { name: &'a str, shader: &'a str },
    TriangleHit {
        name: &'a str,
        closest_hit: &'a str,
    },
    /// Intersection shader with an optional closest hit
    ProceduralHit {
        name: &'a str,
        intersection: &'a str,
        closest_hit: Option<&'a str>,
    },
}

impl<'a> ShaderGroupDesc<'a> {
    pub const fn name(&self) -> &'a str {
        match *self {
            Self::General { name, .. }
            | Self::TriangleHit { name, .. }
            | Self::ProceduralHit { name, .. } => name,
        }
    }
}

/// Everything needed to create a [`RayTracingPipeline`].
#[derive(Clone, Debug)]
pub struct RayTracingPipelineDesc<'a> {
    pub stages: Vec<ShaderStageDesc<'a>>,
    pub groups: Vec<ShaderGroupDesc<'a>>,
    /// Requested recursion depth, clamped to the device limit
    pub max_recursion_depth: u32,
    pub set_layouts: Vec<vk::DescriptorSetLayout>,
}

impl RayTracingPipelineDesc<'_> {
    /// Translate named groups into Vulkan group infos.
    pub fn group_infos(&self) -> Result<Vec<vk::RayTracingShaderGroupCreateInfoKHR<'static>>> {
        let stage_index = |name: &str| -> Result<u32> {
            self.stages
                .iter()
                .position(|s| s.name == name)
                .and_then(|i| u32::try_from(i).ok())
                .ok_or_else(|| RtError::UnknownShaderGroup(format!("stage {name}")))
        };
        let unused = vk::RayTracingShaderGroupCreateInfoKHR::default()
            .general_shader(vk::SHADER_UNUSED_KHR)
            .closest_hit_shader(vk::SHADER_UNUSED_KHR)
            .any_hit_shader(vk::SHADER_UNUSED_KHR)
            .intersection_shader(vk::SHADER_UNUSED_KHR);

        self.groups
            .iter()
            .map(|group| {
                Ok(match *group {
                    ShaderGroupDesc::General { shader, .. } => unused
                        .ty(vk::RayTracingShaderGroupTypeKHR::GENERAL)
                        .general_shader(stage_index(shader)?),
                    ShaderGroupDesc::TriangleHit { closest_hit, .. } => unused
                        .ty(vk::RayTracingShaderGroupTypeKHR::TRIANGLES_HIT_GROUP)
                        .closest_hit_shader(stage_index(closest_hit)?),
                    ShaderGroupDesc::ProceduralHit {
                        intersection,
                        closest_hit,
                        ..
                    } => {
                        let info = unused
                            .ty(vk::RayTracingShaderGroupTypeKHR::PROCEDURAL_HIT_GROUP)
                            .intersection_shader(stage_index(intersection)?);
                        match closest_hit {
                            Some(closest_hit) => {
                                info.closest_hit_shader(stage_index(closest_hit)?)
                            }
                            None => info,
                        }
                    }
                })
            })
            .collect()
    }
}

/// A ray tracing pipeline and its group names in handle order.
pub struct RayTracingPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    group_names: Vec<String>,
    max_recursion_depth: u32,
}

impl RayTracingPipeline {
    /// Compile stages and create the pipeline.
    ///
    /// # Safety
    /// The device must be valid and every stage must hold valid SPIR-V.
    pub unsafe fn new(
        device: &ash::Device,
        rt: &RtDevice,
        desc: &RayTracingPipelineDesc<'_>,
    ) -> Result<Self> {
        let groups = desc.group_infos()?;
        let max_recursion_depth = rt
            .capabilities()
            .clamp_recursion_depth(desc.max_recursion_depth)
            .max(1);

        let mut modules = Vec::with_capacity(desc.stages.len());
        for stage in &desc.stages {
            match create_shader_module(device, stage.code, stage.name) {
                Ok(module) => modules.push(module),
                Err(e) => {
                    destroy_modules(device, &modules);
                    return Err(e.into());
                }
            }
        }

        let stages: Vec<_> = desc
            .stages
            .iter()
            .zip(&modules)
            .map(|(stage, &module)| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(stage.stage.flags())
                    .module(module)
                    .name(c"main")
            })
            .collect();

        let layout_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&desc.set_layouts);
        let layout = match device.create_pipeline_layout(&layout_info, None) {
            Ok(layout) => layout,
            Err(e) => {
                destroy_modules(device, &modules);
                return Err(GpuError::PipelineCreation(e.to_string()).into());
            }
        };

        let pipeline_info = vk::RayTracingPipelineCreateInfoKHR::default()
            .stages(&stages)
            .groups(&groups)
            .max_pipeline_ray_recursion_depth(max_recursion_depth)
            .layout(layout);

        let created = rt.ray_tracing_pipeline.create_ray_tracing_pipelines(
            vk::DeferredOperationKHR::null(),
            vk::PipelineCache::null(),
            &[pipeline_info],
            None,
        );
        destroy_modules(device, &modules);

        let pipeline = created
            .map_err(|(_, e)| GpuError::PipelineCreation(format!("Ray tracing pipeline: {e}")))
            .and_then(|p| {
                p.into_iter()
                    .next()
                    .ok_or_else(|| GpuError::PipelineCreation("No pipeline returned".to_string()))
            });
        let pipeline = match pipeline {
            Ok(pipeline) => pipeline,
            Err(e) => {
                device.destroy_pipeline_layout(layout, None);
                return Err(e.into());
            }
        };

        tracing::info!(
            stages = desc.stages.len(),
            groups = desc.groups.len(),
            max_recursion_depth,
            "Ray tracing pipeline created"
        );

        Ok(Self {
            pipeline,
            layout,
            group_names: desc.groups.iter().map(|g| g.name().to_owned()).collect(),
            max_recursion_depth,
        })
    }

    /// Recursion depth the pipeline was created with.
    pub const fn max_recursion_depth(&self) -> u32 {
        self.max_recursion_depth
    }

    /// Opaque group handles keyed by group name.
    pub fn group_handles(&self, rt: &RtDevice, handle_size: u32) -> Result<HashMap<String, Vec<u8>>> {
        let count = u32::try_from(self.group_names.len())
            .map_err(|_| RtError::SlotOutOfRange("shader group count".to_string()))?;
        let size = handle_size as usize;
        let data = unsafe {
            rt.ray_tracing_pipeline.get_ray_tracing_shader_group_handles(
                self.pipeline,
                0,
                count,
                size * self.group_names.len(),
            )?
        };
        Ok(split_handles(&self.group_names, &data, size))
    }

    /// Bind the pipeline and descriptor set, then trace one ray per pixel.
    ///
    /// # Safety
    /// The command buffer must be recording and the table synced.
    pub unsafe fn cmd_trace(
        &self,
        device: &ash::Device,
        rt: &RtDevice,
        cmd: vk::CommandBuffer,
        descriptor_set: vk::DescriptorSet,
        regions: &[vk::StridedDeviceAddressRegionKHR; 4],
        extent: vk::Extent2D,
    ) {
        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::RAY_TRACING_KHR, self.pipeline);
        device.cmd_bind_descriptor_sets(
            cmd,
            vk::PipelineBindPoint::RAY_TRACING_KHR,
            self.layout,
            0,
            &[descriptor_set],
            &[],
        );
        let [raygen, miss, hit, callable] = regions;
        rt.ray_tracing_pipeline.cmd_trace_rays(
            cmd,
            raygen,
            miss,
            hit,
            callable,
            extent.width,
            extent.height,
            1,
        );
    }

    /// Destroy the pipeline.
    ///
    /// # Safety
    /// The pipeline must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_pipeline(self.pipeline, None);
        device.destroy_pipeline_layout(self.layout, None);
    }
}

fn split_handles(names: &[String], data: &[u8], handle_size: usize) -> HashMap<String, Vec<u8>> {
    names
        .iter()
        .cloned()
        .zip(data.chunks_exact(handle_size).map(<[u8]>::to_vec))
        .collect()
}

unsafe fn destroy_modules(device: &ash::Device, modules: &[vk::ShaderModule]) {
    for &module in modules {
        device.destroy_shader_module(module, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CODE: [u32; 1] = [0x0723_0203];

    fn desc() -> RayTracingPipelineDesc<'static> {
        let stage = |name, stage| ShaderStageDesc {
            name,
            stage,
            code: &CODE,
        };
        RayTracingPipelineDesc {
            stages: vec![
                stage("RayGen", ShaderStage::RayGen),
                stage("Miss", ShaderStage::Miss),
                stage("Hit", ShaderStage::ClosestHit),
                stage("Sphere", ShaderStage::Intersection),
            ],
            groups: vec![
                ShaderGroupDesc::General {
                    name: "Main",
                    shader: "RayGen",
                },
                ShaderGroupDesc::General {
                    name: "PrimaryMiss",
                    shader: "Miss",
                },
                ShaderGroupDesc::TriangleHit {
                    name: "CubeHit",
                    closest_hit: "Hit",
                },
                ShaderGroupDesc::ProceduralHit {
                    name: "SphereShadowHit",
                    intersection: "Sphere",
                    closest_hit: None,
                },
            ],
            max_recursion_depth: 6,
            set_layouts: Vec::new(),
        }
    }

    #[test]
    fn groups_resolve_stage_indices() {
        let infos = desc().group_infos().unwrap();
        assert_eq!(infos.len(), 4);
        assert_eq!(infos[0].ty, vk::RayTracingShaderGroupTypeKHR::GENERAL);
        assert_eq!(infos[1].general_shader, 1);
        assert_eq!(infos[2].ty, vk::RayTracingShaderGroupTypeKHR::TRIANGLES_HIT_GROUP);
        assert_eq!(infos[2].closest_hit_shader, 2);
        assert_eq!(infos[2].general_shader, vk::SHADER_UNUSED_KHR);
        assert_eq!(infos[3].ty, vk::RayTracingShaderGroupTypeKHR::PROCEDURAL_HIT_GROUP);
        assert_eq!(infos[3].intersection_shader, 3);
        assert_eq!(infos[3].closest_hit_shader, vk::SHADER_UNUSED_KHR);
    }

    #[test]
    fn unknown_stage_is_an_error() {
        let mut desc = desc();
        desc.groups.push(ShaderGroupDesc::TriangleHit {
            name: "Broken",
            closest_hit: "Nope",
        });
        assert!(matches!(desc.group_infos(), Err(RtError::UnknownShaderGroup(_))));
    }

    #[test]
    fn handles_split_by_group() {
        let names: Vec<String> = ["Main", "PrimaryMiss"].iter().map(|s| (*s).to_string()).collect();
        let data: Vec<u8> = (0..8).collect();
        let handles = split_handles(&names, &data, 4);
        assert_eq!(handles["Main"], vec![0, 1, 2, 3]);
        assert_eq!(handles["PrimaryMiss"], vec![4, 5, 6, 7]);
    }
}
