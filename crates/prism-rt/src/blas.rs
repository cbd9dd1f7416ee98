//! Bottom-level acceleration structures.
//!
//! Creation and building are separate phases: [`Blas::triangles`] and
//! [`Blas::procedural`] query build sizes and create the empty structure,
//! [`Blas::record_build`] records the single build command.

use ash::vk;
use gpu_allocator::MemoryLocation;
use prism_core::{Aabb, CubeGeometry};
use prism_gpu::command::{execute_single_time_commands, memory_barrier};
use prism_gpu::{CommandPool, GpuAllocator, GpuBuffer, GpuContext};

use crate::device::RtDevice;
use crate::error::Result;

const POSITION_STRIDE: u64 = std::mem::size_of::<[f32; 3]>() as u64;
const AABB_STRIDE: u64 = std::mem::size_of::<vk::AabbPositionsKHR>() as u64;

#[derive(Clone, Copy, Debug)]
enum Geometry {
    Triangles {
        vertices: vk::DeviceAddress,
        indices: vk::DeviceAddress,
        max_vertex: u32,
        triangle_count: u32,
    },
    Aabbs {
        boxes: vk::DeviceAddress,
        count: u32,
    },
}

impl Geometry {
    fn describe(self) -> vk::AccelerationStructureGeometryKHR<'static> {
        let base =
            vk::AccelerationStructureGeometryKHR::default().flags(vk::GeometryFlagsKHR::OPAQUE);
        match self {
            Self::Triangles {
                vertices,
                indices,
                max_vertex,
                ..
            } => base
                .geometry_type(vk::GeometryTypeKHR::TRIANGLES)
                .geometry(vk::AccelerationStructureGeometryDataKHR {
                    triangles: vk::AccelerationStructureGeometryTrianglesDataKHR::default()
                        .vertex_format(vk::Format::R32G32B32_SFLOAT)
                        .vertex_data(vk::DeviceOrHostAddressConstKHR {
                            device_address: vertices,
                        })
                        .vertex_stride(POSITION_STRIDE)
                        .max_vertex(max_vertex)
                        .index_type(vk::IndexType::UINT32)
                        .index_data(vk::DeviceOrHostAddressConstKHR {
                            device_address: indices,
                        }),
                }),
            Self::Aabbs { boxes, .. } => base
                .geometry_type(vk::GeometryTypeKHR::AABBS)
                .geometry(vk::AccelerationStructureGeometryDataKHR {
                    aabbs: vk::AccelerationStructureGeometryAabbsDataKHR::default()
                        .data(vk::DeviceOrHostAddressConstKHR {
                            device_address: boxes,
                        })
                        .stride(AABB_STRIDE),
                }),
        }
    }

    const fn primitive_count(self) -> u32 {
        match self {
            Self::Triangles { triangle_count, .. } => triangle_count,
            Self::Aabbs { count, .. } => count,
        }
    }
}

/// A bottom-level acceleration structure and the buffers it was built from.
pub struct Blas {
    name: String,
    pub acceleration_structure: vk::AccelerationStructureKHR,
    /// Backing storage of the structure
    pub buffer: GpuBuffer,
    /// Build inputs: vertices and indices, or the box array
    inputs: Vec<GpuBuffer>,
    geometry: Geometry,
    /// Address referenced by TLAS instances
    pub device_address: vk::DeviceAddress,
    build_scratch_size: u64,
}

impl Blas {
    /// Create a triangle BLAS for a cube.
    ///
    /// # Safety
    /// The device, allocator and loaders must be valid.
    pub unsafe fn triangles(
        device: &ash::Device,
        rt: &RtDevice,
        allocator: &mut GpuAllocator,
        name: &str,
        cube: &CubeGeometry,
    ) -> Result<Self> {
        let positions = cube.position_data();
        let indices = cube.index_data();

        let vertex_buffer = create_input_buffer(
            allocator,
            std::mem::size_of_val(positions.as_slice()) as u64,
            vk::BufferUsageFlags::empty(),
            &format!("{name} vertices"),
        )?;
        vertex_buffer.write(&positions)?;

        let index_buffer = create_input_buffer(
            allocator,
            std::mem::size_of_val(indices.as_slice()) as u64,
            vk::BufferUsageFlags::empty(),
            &format!("{name} indices"),
        )?;
        index_buffer.write(&indices)?;

        let geometry = Geometry::Triangles {
            vertices: vertex_buffer.device_address(device),
            indices: index_buffer.device_address(device),
            max_vertex: cube.vertex_count().saturating_sub(1),
            triangle_count: cube.triangle_count(),
        };

        Self::create(
            rt,
            allocator,
            name,
            geometry,
            vec![vertex_buffer, index_buffer],
        )
    }

    /// Create a procedural BLAS from bounding boxes.
    ///
    /// Every box is uploaded, but only the first `primitive_count` become
    /// primitives. The box buffer is also usable as a storage buffer, so
    /// intersection shaders can read the boxes back by primitive index.
    ///
    /// # Safety
    /// The device, allocator and loaders must be valid.
    pub unsafe fn procedural(
        device: &ash::Device,
        rt: &RtDevice,
        allocator: &mut GpuAllocator,
        name: &str,
        boxes: &[Aabb],
        primitive_count: u32,
    ) -> Result<Self> {
        let data: Vec<[f32; 6]> = boxes.iter().map(Aabb::to_array).collect();
        let box_buffer = create_input_buffer(
            allocator,
            std::mem::size_of_val(data.as_slice()) as u64,
            vk::BufferUsageFlags::STORAGE_BUFFER,
            &format!("{name} boxes"),
        )?;
        box_buffer.write(&data)?;

        let geometry = Geometry::Aabbs {
            boxes: box_buffer.device_address(device),
            count: u32::try_from(boxes.len())
                .unwrap_or(u32::MAX)
                .min(primitive_count),
        };

        Self::create(rt, allocator, name, geometry, vec![box_buffer])
    }

    unsafe fn create(
        rt: &RtDevice,
        allocator: &mut GpuAllocator,
        name: &str,
        geometry: Geometry,
        mut inputs: Vec<GpuBuffer>,
    ) -> Result<Self> {
        let geometries = [geometry.describe()];
        let build_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL)
            .flags(vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .geometries(&geometries);

        let mut build_sizes = vk::AccelerationStructureBuildSizesInfoKHR::default();
        rt.acceleration_structure.get_acceleration_structure_build_sizes(
            vk::AccelerationStructureBuildTypeKHR::DEVICE,
            &build_info,
            &[geometry.primitive_count()],
            &mut build_sizes,
        );

        let created = create_structure(
            rt,
            allocator,
            name,
            vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL,
            build_sizes.acceleration_structure_size,
        );
        let (acceleration_structure, buffer, device_address) = match created {
            Ok(created) => created,
            Err(e) => {
                for input in &mut inputs {
                    allocator.free_buffer(input)?;
                }
                return Err(e);
            }
        };

        tracing::info!(
            name,
            primitives = geometry.primitive_count(),
            size = build_sizes.acceleration_structure_size,
            scratch = build_sizes.build_scratch_size,
            "BLAS created"
        );

        Ok(Self {
            name: name.to_owned(),
            acceleration_structure,
            buffer,
            inputs,
            geometry,
            device_address,
            build_scratch_size: build_sizes.build_scratch_size,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Scratch size reported for the build.
    pub const fn build_scratch_size(&self) -> u64 {
        self.build_scratch_size
    }

    /// Number of triangles or boxes.
    pub const fn primitive_count(&self) -> u32 {
        self.geometry.primitive_count()
    }

    /// The box buffer of a procedural BLAS.
    pub fn box_buffer(&self) -> Option<&GpuBuffer> {
        match self.geometry {
            Geometry::Aabbs { .. } => self.inputs.first(),
            Geometry::Triangles { .. } => None,
        }
    }

    /// Record the build command.
    ///
    /// # Safety
    /// The command buffer must be recording and `scratch` must hold at least
    /// [`Blas::build_scratch_size`] bytes at a suitably aligned address.
    pub unsafe fn record_build(
        &self,
        device: &ash::Device,
        rt: &RtDevice,
        cmd: vk::CommandBuffer,
        scratch: &GpuBuffer,
    ) {
        let geometries = [self.geometry.describe()];
        let build_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL)
            .flags(vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .dst_acceleration_structure(self.acceleration_structure)
            .geometries(&geometries)
            .scratch_data(vk::DeviceOrHostAddressKHR {
                device_address: scratch.device_address(device),
            });

        let build_range = vk::AccelerationStructureBuildRangeInfoKHR::default()
            .primitive_count(self.geometry.primitive_count());

        rt.acceleration_structure.cmd_build_acceleration_structures(
            cmd,
            &[build_info],
            &[std::slice::from_ref(&build_range)],
        );
    }

    /// Destroy the BLAS and free its buffers.
    ///
    /// # Safety
    /// The BLAS must not be in use.
    pub unsafe fn destroy(mut self, rt: &RtDevice, allocator: &mut GpuAllocator) -> Result<()> {
        rt.acceleration_structure
            .destroy_acceleration_structure(self.acceleration_structure, None);
        allocator.free_buffer(&mut self.buffer)?;
        for input in &mut self.inputs {
            allocator.free_buffer(input)?;
        }
        Ok(())
    }
}

/// Build every BLAS in one submission and wait for it.
///
/// Each structure gets its own scratch buffer of exactly its reported size,
/// freed once the builds complete.
pub fn build_blases(
    gpu: &GpuContext,
    rt: &RtDevice,
    pool: &CommandPool,
    blases: &[&Blas],
) -> Result<()> {
    let device = gpu.device();
    let mut scratch = Vec::with_capacity(blases.len());
    for blas in blases {
        let buffer = gpu.allocator().lock().create_buffer_aligned(
            blas.build_scratch_size().max(1),
            vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            MemoryLocation::GpuOnly,
            &format!("{} scratch", blas.name()),
            rt.scratch_alignment(),
        );
        match buffer {
            Ok(buffer) => scratch.push(buffer),
            Err(e) => {
                free_all(gpu, &mut scratch)?;
                return Err(e.into());
            }
        }
    }

    let built = unsafe {
        execute_single_time_commands(device, pool, gpu.graphics_queue(), |cmd| {
            for (blas, scratch) in blases.iter().zip(&scratch) {
                blas.record_build(device, rt, cmd, scratch);
            }
            // Geometry must be complete before any TLAS references it
            memory_barrier(
                device,
                cmd,
                vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR,
                vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR,
                vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR
                    | vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR,
                vk::AccessFlags2::ACCELERATION_STRUCTURE_READ_KHR,
            );
            Ok(())
        })
    };

    free_all(gpu, &mut scratch)?;
    built?;
    tracing::info!(count = blases.len(), "BLAS builds complete");
    Ok(())
}

fn free_all(gpu: &GpuContext, buffers: &mut [GpuBuffer]) -> Result<()> {
    let mut allocator = gpu.allocator().lock();
    for buffer in buffers {
        allocator.free_buffer(buffer)?;
    }
    Ok(())
}

fn create_input_buffer(
    allocator: &mut GpuAllocator,
    size: u64,
    extra_usage: vk::BufferUsageFlags,
    name: &str,
) -> Result<GpuBuffer> {
    Ok(allocator.create_buffer(
        size,
        vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR
            | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
            | extra_usage,
        MemoryLocation::CpuToGpu,
        name,
    )?)
}

/// Create an empty acceleration structure on a new buffer.
///
/// # Safety
/// The allocator and loaders must be valid.
pub(crate) unsafe fn create_structure(
    rt: &RtDevice,
    allocator: &mut GpuAllocator,
    name: &str,
    ty: vk::AccelerationStructureTypeKHR,
    size: u64,
) -> Result<(vk::AccelerationStructureKHR, GpuBuffer, vk::DeviceAddress)> {
    let mut buffer = allocator.create_buffer(
        size,
        vk::BufferUsageFlags::ACCELERATION_STRUCTURE_STORAGE_KHR
            | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
        MemoryLocation::GpuOnly,
        name,
    )?;

    let create_info = vk::AccelerationStructureCreateInfoKHR::default()
        .buffer(buffer.buffer)
        .offset(0)
        .size(size)
        .ty(ty);

    let structure = match rt
        .acceleration_structure
        .create_acceleration_structure(&create_info, None)
    {
        Ok(structure) => structure,
        Err(e) => {
            allocator.free_buffer(&mut buffer)?;
            return Err(e.into());
        }
    };

    let address_info =
        vk::AccelerationStructureDeviceAddressInfoKHR::default().acceleration_structure(structure);
    let address = rt
        .acceleration_structure
        .get_acceleration_structure_device_address(&address_info);

    Ok((structure, buffer, address))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strides_match_vulkan_layouts() {
        assert_eq!(POSITION_STRIDE, 12);
        assert_eq!(AABB_STRIDE, 24);
        assert_eq!(
            std::mem::size_of::<[f32; 6]>() as u64,
            AABB_STRIDE,
            "Aabb::to_array must match VkAabbPositionsKHR"
        );
    }

    #[test]
    fn primitive_counts() {
        let triangles = Geometry::Triangles {
            vertices: 0,
            indices: 0,
            max_vertex: 23,
            triangle_count: 12,
        };
        assert_eq!(triangles.primitive_count(), 12);
        assert_eq!(Geometry::Aabbs { boxes: 0, count: 2 }.primitive_count(), 2);
    }

    #[test]
    fn geometry_types() {
        let described = Geometry::Aabbs { boxes: 0, count: 2 }.describe();
        assert_eq!(described.geometry_type, vk::GeometryTypeKHR::AABBS);
        assert_eq!(described.flags, vk::GeometryFlagsKHR::OPAQUE);
    }
}
