//! The scene's ray tracing pass: shader groups, descriptors, textures and
//! the per-frame trace.

use ash::vk;
use gpu_allocator::MemoryLocation;
use prism_core::constants::NUM_CUBE_TEXTURES;
use prism_core::{AssetDir, CubeAttribs};
use prism_gpu::command::{cmd_update_buffer_chunked, memory_barrier};
use prism_gpu::{
    create_linear_sampler, CommandPool, DescriptorPool, DescriptorSetLayoutBuilder,
    DescriptorWriter, GpuBuffer, GpuContext, GpuError, Texture,
};
use prism_rt::{
    RayTracingPipeline, RayTracingPipelineDesc, RtDevice, Result, ShaderBindingTable,
    ShaderGroupDesc, ShaderStage, ShaderStageDesc,
};
use prism_scene::HitGroup;

use crate::constants::ShaderConstants;

/// Descriptor bindings of the tracing set.
pub mod bindings {
    pub const TLAS: u32 = 0;
    pub const OUTPUT: u32 = 1;
    pub const CONSTANTS: u32 = 2;
    pub const CUBE_ATTRIBS: u32 = 3;
    pub const SPHERE_BOXES: u32 = 4;
    pub const CUBE_TEXTURES: u32 = 5;
    pub const GROUND_TEXTURE: u32 = 6;
}

/// Miss slots: primary then shadow.
pub const MISS_COUNT: u32 = 2;

pub const CUBE_TEXTURE_FILES: [&str; NUM_CUBE_TEXTURES] =
    ["DGLogo0.png", "DGLogo1.png", "DGLogo2.png", "DGLogo3.png"];
pub const GROUND_TEXTURE_FILE: &str = "Ground.png";

/// Every stage of the pipeline, referenced by name from the groups.
pub fn shader_stages() -> Vec<ShaderStageDesc<'static>> {
    let stage = |name, stage, code| ShaderStageDesc { name, stage, code };
    vec![
        stage("Ray gen", ShaderStage::RayGen, prism_shaders::main_rgen()),
        stage("Primary miss", ShaderStage::Miss, prism_shaders::primary_miss()),
        stage("Shadow miss", ShaderStage::Miss, prism_shaders::shadow_miss()),
        stage(
            "Cube primary hit",
            ShaderStage::ClosestHit,
            prism_shaders::cube_primary_hit(),
        ),
        stage("Ground hit", ShaderStage::ClosestHit, prism_shaders::ground_hit()),
        stage(
            "Glass primary hit",
            ShaderStage::ClosestHit,
            prism_shaders::glass_primary_hit(),
        ),
        stage(
            "Sphere primary hit",
            ShaderStage::ClosestHit,
            prism_shaders::sphere_primary_hit(),
        ),
        stage(
            "Sphere diffuse hit",
            ShaderStage::ClosestHit,
            prism_shaders::sphere_diffuse_hit(),
        ),
        stage(
            "Sphere glass hit",
            ShaderStage::ClosestHit,
            prism_shaders::sphere_glass_hit(),
        ),
        stage(
            "Sphere intersection",
            ShaderStage::Intersection,
            prism_shaders::sphere_intersection(),
        ),
    ]
}

/// Closest hit stage behind a hit group, `None` for intersection-only.
const fn closest_hit_stage(group: HitGroup) -> Option<&'static str> {
    match group {
        HitGroup::CubePrimaryHit => Some("Cube primary hit"),
        HitGroup::GroundHit => Some("Ground hit"),
        HitGroup::GlassPrimaryHit => Some("Glass primary hit"),
        HitGroup::SpherePrimaryHit => Some("Sphere primary hit"),
        HitGroup::SpherePrimaryDiffuseHit => Some("Sphere diffuse hit"),
        HitGroup::SphereGlassHit => Some("Sphere glass hit"),
        HitGroup::SphereShadowHit => None,
    }
}

/// Named shader groups: ray generation, the two misses, then every hit group.
pub fn shader_groups() -> Vec<ShaderGroupDesc<'static>> {
    let mut groups = vec![
        ShaderGroupDesc::General {
            name: prism_scene::binding::RAY_GEN_GROUP,
            shader: "Ray gen",
        },
        ShaderGroupDesc::General {
            name: prism_scene::RayType::Primary.miss_group(),
            shader: "Primary miss",
        },
        ShaderGroupDesc::General {
            name: prism_scene::RayType::Shadow.miss_group(),
            shader: "Shadow miss",
        },
    ];

    groups.extend(HitGroup::ALL.iter().map(|&group| {
        let closest_hit = closest_hit_stage(group);
        if group.is_procedural() {
            ShaderGroupDesc::ProceduralHit {
                name: group.name(),
                intersection: "Sphere intersection",
                closest_hit,
            }
        } else {
            ShaderGroupDesc::TriangleHit {
                name: group.name(),
                closest_hit: closest_hit.unwrap_or_default(),
            }
        }
    }));
    groups
}

/// Pipeline description for the scene with the requested recursion depth.
pub fn pipeline_desc(
    max_recursion_depth: u32,
    set_layout: vk::DescriptorSetLayout,
) -> RayTracingPipelineDesc<'static> {
    RayTracingPipelineDesc {
        stages: shader_stages(),
        groups: shader_groups(),
        max_recursion_depth,
        set_layouts: vec![set_layout],
    }
}

/// Ray tracing pass of the scene.
pub struct SceneTracer {
    pipeline: RayTracingPipeline,
    set_layout: vk::DescriptorSetLayout,
    descriptor_pool: DescriptorPool,
    descriptor_set: vk::DescriptorSet,
    constants: GpuBuffer,
    cube_attribs: GpuBuffer,
    cube_textures: Vec<Texture>,
    ground_texture: Texture,
    sampler: vk::Sampler,
}

impl SceneTracer {
    /// Create the pipeline and upload the static resources.
    ///
    /// A missing texture file fails initialization.
    pub fn new(
        gpu: &GpuContext,
        rt: &RtDevice,
        pool: &CommandPool,
        assets: &AssetDir,
        cube_attribs: &CubeAttribs,
        max_recursion_depth: u32,
    ) -> Result<Self> {
        let device = gpu.device();
        let rt_stages = vk::ShaderStageFlags::RAYGEN_KHR
            | vk::ShaderStageFlags::MISS_KHR
            | vk::ShaderStageFlags::CLOSEST_HIT_KHR
            | vk::ShaderStageFlags::INTERSECTION_KHR;
        let hit_stages = vk::ShaderStageFlags::CLOSEST_HIT_KHR;

        let set_layout = unsafe {
            DescriptorSetLayoutBuilder::new()
                .acceleration_structure(bindings::TLAS, rt_stages)
                .storage_image(bindings::OUTPUT, vk::ShaderStageFlags::RAYGEN_KHR)
                .uniform_buffer(bindings::CONSTANTS, rt_stages)
                .uniform_buffer(bindings::CUBE_ATTRIBS, hit_stages)
                .storage_buffer(bindings::SPHERE_BOXES, vk::ShaderStageFlags::INTERSECTION_KHR)
                .sampled_images(bindings::CUBE_TEXTURES, NUM_CUBE_TEXTURES as u32, hit_stages)
                .sampled_images(bindings::GROUND_TEXTURE, 1, hit_stages)
                .build(device)?
        };

        let pipeline = unsafe {
            RayTracingPipeline::new(device, rt, &pipeline_desc(max_recursion_depth, set_layout))?
        };

        let pool_sizes = [
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::ACCELERATION_STRUCTURE_KHR)
                .descriptor_count(1),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::STORAGE_IMAGE)
                .descriptor_count(1),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(2),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::STORAGE_BUFFER)
                .descriptor_count(1),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(NUM_CUBE_TEXTURES as u32 + 1),
        ];
        let descriptor_pool = unsafe { DescriptorPool::new(device, 1, &pool_sizes)? };
        let descriptor_set = unsafe { descriptor_pool.allocate_one(device, set_layout)? };

        let (constants, attribs_buffer) = {
            let mut allocator = gpu.allocator().lock();
            let constants = allocator.create_buffer(
                std::mem::size_of::<ShaderConstants>() as u64,
                vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
                MemoryLocation::GpuOnly,
                "Constants",
            )?;
            let attribs_buffer = allocator.create_buffer(
                std::mem::size_of::<CubeAttribs>() as u64,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                MemoryLocation::CpuToGpu,
                "Cube attributes",
            )?;
            (constants, attribs_buffer)
        };
        attribs_buffer.write(std::slice::from_ref(cube_attribs))?;

        let load = |name: &str| -> Result<Texture> {
            let path = assets.resolve(name).map_err(GpuError::from)?;
            Ok(Texture::load(gpu, pool, &path, true)?)
        };
        let cube_textures = CUBE_TEXTURE_FILES
            .iter()
            .map(|name| load(name))
            .collect::<Result<Vec<_>>>()?;
        let ground_texture = load(GROUND_TEXTURE_FILE)?;
        let sampler = unsafe { create_linear_sampler(device)? };

        let tracer = Self {
            pipeline,
            set_layout,
            descriptor_pool,
            descriptor_set,
            constants,
            cube_attribs: attribs_buffer,
            cube_textures,
            ground_texture,
            sampler,
        };
        unsafe { tracer.write_static_descriptors(device) };

        tracing::info!(
            textures = tracer.cube_textures.len() + 1,
            max_recursion = tracer.pipeline.max_recursion_depth(),
            "Scene tracer ready"
        );
        Ok(tracer)
    }

    unsafe fn write_static_descriptors(&self, device: &ash::Device) {
        let cube_images: Vec<_> = self
            .cube_textures
            .iter()
            .map(|texture| (texture.view, self.sampler))
            .collect();
        DescriptorWriter::new()
            .uniform_buffer(
                bindings::CONSTANTS,
                self.constants.buffer,
                std::mem::size_of::<ShaderConstants>() as u64,
            )
            .uniform_buffer(
                bindings::CUBE_ATTRIBS,
                self.cube_attribs.buffer,
                std::mem::size_of::<CubeAttribs>() as u64,
            )
            .sampled_images(
                bindings::CUBE_TEXTURES,
                &cube_images,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )
            .sampled_images(
                bindings::GROUND_TEXTURE,
                &[(self.ground_texture.view, self.sampler)],
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )
            .update(device, self.descriptor_set);
    }

    pub const fn pipeline(&self) -> &RayTracingPipeline {
        &self.pipeline
    }

    /// Bind the scene TLAS and the sphere bounding boxes.
    ///
    /// # Safety
    /// The descriptor set must not be in use by pending commands.
    pub unsafe fn bind_scene(
        &self,
        device: &ash::Device,
        tlas: vk::AccelerationStructureKHR,
        sphere_boxes: &GpuBuffer,
    ) {
        DescriptorWriter::new()
            .acceleration_structure(bindings::TLAS, tlas)
            .storage_buffer(bindings::SPHERE_BOXES, sphere_boxes.buffer, sphere_boxes.size)
            .update(device, self.descriptor_set);
    }

    /// Bind the image the ray generation shader writes.
    ///
    /// # Safety
    /// The descriptor set must not be in use by pending commands.
    pub unsafe fn bind_output(&self, device: &ash::Device, view: vk::ImageView) {
        DescriptorWriter::new()
            .storage_image(bindings::OUTPUT, view)
            .update(device, self.descriptor_set);
    }

    /// Upload the constants and trace one ray per pixel of `extent`.
    ///
    /// # Safety
    /// The command buffer must be recording outside rendering and the output
    /// image must be in `GENERAL` layout.
    pub unsafe fn record(
        &self,
        device: &ash::Device,
        rt: &RtDevice,
        cmd: vk::CommandBuffer,
        constants: &ShaderConstants,
        sbt: &ShaderBindingTable,
        extent: vk::Extent2D,
    ) -> Result<()> {
        let regions = sbt.regions()?;

        memory_barrier(
            device,
            cmd,
            vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR,
            vk::AccessFlags2::UNIFORM_READ,
            vk::PipelineStageFlags2::TRANSFER,
            vk::AccessFlags2::TRANSFER_WRITE,
        );
        cmd_update_buffer_chunked(
            device,
            cmd,
            self.constants.buffer,
            0,
            bytemuck::bytes_of(constants),
        )?;
        memory_barrier(
            device,
            cmd,
            vk::PipelineStageFlags2::TRANSFER,
            vk::AccessFlags2::TRANSFER_WRITE,
            vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR,
            vk::AccessFlags2::UNIFORM_READ,
        );

        self.pipeline
            .cmd_trace(device, rt, cmd, self.descriptor_set, &regions, extent);
        Ok(())
    }

    /// # Safety
    /// The tracer must not be in use.
    pub unsafe fn destroy(mut self, gpu: &GpuContext) -> Result<()> {
        let device = gpu.device();
        for texture in &mut self.cube_textures {
            texture.destroy(gpu)?;
        }
        self.ground_texture.destroy(gpu)?;
        device.destroy_sampler(self.sampler, None);
        {
            let mut allocator = gpu.allocator().lock();
            allocator.free_buffer(&mut self.constants)?;
            allocator.free_buffer(&mut self.cube_attribs)?;
        }
        self.descriptor_pool.destroy(device);
        self.pipeline.destroy(device);
        device.destroy_descriptor_set_layout(self.set_layout, None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_hit_group_is_in_the_pipeline() {
        let groups = shader_groups();
        let names: Vec<_> = groups.iter().map(ShaderGroupDesc::name).collect();
        assert_eq!(&names[..3], &["Main", "PrimaryMiss", "ShadowMiss"]);
        for group in HitGroup::ALL {
            assert!(names.contains(&group.name()), "{} missing", group.name());
        }
        assert_eq!(names.len(), 3 + HitGroup::ALL.len());
    }

    #[test]
    fn group_kinds() {
        let groups = shader_groups();
        let find = |name: &str| {
            groups
                .iter()
                .copied()
                .find(|g| g.name() == name)
                .unwrap()
        };
        assert!(matches!(
            find("GroundHit"),
            ShaderGroupDesc::TriangleHit { closest_hit: "Ground hit", .. }
        ));
        assert!(matches!(
            find("SphereShadowHit"),
            ShaderGroupDesc::ProceduralHit {
                closest_hit: None,
                intersection: "Sphere intersection",
                ..
            }
        ));
        assert!(matches!(
            find("SphereGlassHit"),
            ShaderGroupDesc::ProceduralHit {
                closest_hit: Some("Sphere glass hit"),
                ..
            }
        ));
    }

    #[test]
    fn groups_resolve_against_stages() {
        let desc = pipeline_desc(6, vk::DescriptorSetLayout::null());
        let infos = desc.group_infos().unwrap();
        assert_eq!(infos.len(), desc.groups.len());
    }

    #[test]
    fn texture_names() {
        assert_eq!(CUBE_TEXTURE_FILES.len(), NUM_CUBE_TEXTURES);
        assert!(CUBE_TEXTURE_FILES.iter().all(|f| f.starts_with("DGLogo")));
    }
}
