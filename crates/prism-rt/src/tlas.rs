//! Top-level acceleration structure.
//!
//! The TLAS is fully built on its first use and incrementally updated after
//! that. Its instance count is fixed by the first build; hidden instances keep
//! their slot with an empty mask.

use ash::vk;
use gpu_allocator::MemoryLocation;
use hashbrown::HashMap;
use prism_gpu::command::{cmd_update_buffer_chunked, memory_barrier};
use prism_gpu::{GpuAllocator, GpuBuffer};

use crate::blas::create_structure;
use crate::device::RtDevice;
use crate::error::{Result, RtError};

/// Whether a TLAS record call builds from scratch or refits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildMode {
    Build,
    Update,
}

impl BuildMode {
    const fn vk(self) -> vk::BuildAccelerationStructureModeKHR {
        match self {
            Self::Build => vk::BuildAccelerationStructureModeKHR::BUILD,
            Self::Update => vk::BuildAccelerationStructureModeKHR::UPDATE,
        }
    }
}

/// Lifecycle of the TLAS: `Uninitialized -> Built -> Updated -> Updated ...`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TlasState {
    Uninitialized,
    Built { instance_count: usize },
    Updated { instance_count: usize },
}

impl TlasState {
    /// Advance for a record call with `instance_count` instances.
    ///
    /// The first call builds; later calls update and must pass the same
    /// count.
    pub fn advance(&mut self, instance_count: usize) -> Result<BuildMode> {
        match *self {
            Self::Uninitialized => {
                *self = Self::Built { instance_count };
                Ok(BuildMode::Build)
            }
            Self::Built {
                instance_count: expected,
            }
            | Self::Updated {
                instance_count: expected,
            } => {
                if expected != instance_count {
                    return Err(RtError::InstanceCountChanged {
                        expected,
                        actual: instance_count,
                    });
                }
                *self = Self::Updated { instance_count };
                Ok(BuildMode::Update)
            }
        }
    }

    /// Instance count fixed by the first build.
    pub const fn instance_count(self) -> Option<usize> {
        match self {
            Self::Uninitialized => None,
            Self::Built { instance_count } | Self::Updated { instance_count } => {
                Some(instance_count)
            }
        }
    }
}

/// One instance as described by the scene.
#[derive(Clone, Debug)]
pub struct TlasInstance {
    pub name: String,
    /// Device address of the referenced BLAS
    pub blas: vk::DeviceAddress,
    /// Visibility mask; 0 hides the instance from every ray
    pub mask: u8,
    /// Value of `gl_InstanceCustomIndexEXT`
    pub custom_id: u32,
    /// Row-major 3x4 object-to-world transform
    pub transform: [f32; 12],
}

/// GPU layout of `VkAccelerationStructureInstanceKHR`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceRecord {
    pub transform: [f32; 12],
    /// Custom index in the low 24 bits, mask in the high 8
    pub custom_index_and_mask: u32,
    /// SBT record offset in the low 24 bits, instance flags in the high 8
    pub sbt_offset_and_flags: u32,
    pub blas_address: u64,
}

impl InstanceRecord {
    const LOW_24: u32 = 0x00FF_FFFF;

    /// Pack an instance. Its hit records start at `index * hit_group_stride`.
    pub fn new(instance: &TlasInstance, index: u32, hit_group_stride: u32) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let flags = vk::GeometryInstanceFlagsKHR::TRIANGLE_FACING_CULL_DISABLE.as_raw() as u8;
        Self {
            transform: instance.transform,
            custom_index_and_mask: pack_24_8(instance.custom_id, instance.mask),
            sbt_offset_and_flags: pack_24_8(index * hit_group_stride, flags),
            blas_address: instance.blas,
        }
    }

    pub const fn custom_index(&self) -> u32 {
        self.custom_index_and_mask & Self::LOW_24
    }

    pub const fn mask(&self) -> u8 {
        (self.custom_index_and_mask >> 24) as u8
    }

    pub const fn sbt_offset(&self) -> u32 {
        self.sbt_offset_and_flags & Self::LOW_24
    }
}

const fn pack_24_8(low: u32, high: u8) -> u32 {
    (low & InstanceRecord::LOW_24) | ((high as u32) << 24)
}

const INSTANCE_SIZE: u64 = std::mem::size_of::<InstanceRecord>() as u64;
const TLAS_FLAGS: vk::BuildAccelerationStructureFlagsKHR =
    vk::BuildAccelerationStructureFlagsKHR::from_raw(
        vk::BuildAccelerationStructureFlagsKHR::ALLOW_UPDATE.as_raw()
            | vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE.as_raw(),
    );

struct Resources {
    structure: vk::AccelerationStructureKHR,
    buffer: GpuBuffer,
    instance_buffer: GpuBuffer,
    scratch_buffer: GpuBuffer,
}

/// The scene's top-level acceleration structure.
pub struct Tlas {
    state: TlasState,
    resources: Option<Resources>,
    names: HashMap<String, u32>,
    hit_group_stride: u32,
}

impl Tlas {
    /// Create an unbuilt TLAS. Each instance owns `hit_group_stride`
    /// consecutive hit records.
    pub fn new(hit_group_stride: u32) -> Self {
        Self {
            state: TlasState::Uninitialized,
            resources: None,
            names: HashMap::new(),
            hit_group_stride,
        }
    }

    pub const fn state(&self) -> TlasState {
        self.state
    }

    pub const fn hit_group_stride(&self) -> u32 {
        self.hit_group_stride
    }

    /// Instance count fixed by the first build.
    pub const fn instance_count(&self) -> Option<usize> {
        self.state.instance_count()
    }

    /// Raw handle for descriptor writes.
    pub fn handle(&self) -> Result<vk::AccelerationStructureKHR> {
        self.resources
            .as_ref()
            .map(|r| r.structure)
            .ok_or(RtError::TlasNotBuilt)
    }

    /// Index of the named instance.
    pub fn index_of(&self, name: &str) -> Result<u32> {
        if self.resources.is_none() {
            return Err(RtError::TlasNotBuilt);
        }
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| RtError::UnknownInstance(name.to_owned()))
    }

    /// Record a build or update with the full instance array.
    ///
    /// Instance data goes through the command stream, so the previous
    /// frame's trace may still be reading the old contents when this is
    /// recorded.
    ///
    /// # Safety
    /// The command buffer must be recording outside a render pass, and every
    /// referenced BLAS must be built.
    pub unsafe fn record(
        &mut self,
        device: &ash::Device,
        rt: &RtDevice,
        allocator: &mut GpuAllocator,
        cmd: vk::CommandBuffer,
        instances: &[TlasInstance],
    ) -> Result<BuildMode> {
        let count = u32::try_from(instances.len()).map_err(|_| {
            RtError::SlotOutOfRange(format!("{} TLAS instances", instances.len()))
        })?;

        let mut next_state = self.state;
        let mode = next_state.advance(instances.len())?;

        if self.resources.is_none() {
            self.resources = Some(Self::allocate(rt, allocator, count)?);
        }
        self.state = next_state;

        self.names.clear();
        let mut records = Vec::with_capacity(instances.len());
        for (index, instance) in (0u32..).zip(instances) {
            self.names.insert(instance.name.clone(), index);
            records.push(InstanceRecord::new(instance, index, self.hit_group_stride));
        }

        let resources = self.resources.as_ref().ok_or(RtError::TlasNotBuilt)?;

        // Previous trace is done reading the structure before it is rewritten
        memory_barrier(
            device,
            cmd,
            vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR,
            vk::AccessFlags2::ACCELERATION_STRUCTURE_READ_KHR,
            vk::PipelineStageFlags2::TRANSFER
                | vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR,
            vk::AccessFlags2::TRANSFER_WRITE | vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR,
        );

        cmd_update_buffer_chunked(
            device,
            cmd,
            resources.instance_buffer.buffer,
            0,
            bytemuck::cast_slice(&records),
        )?;

        memory_barrier(
            device,
            cmd,
            vk::PipelineStageFlags2::TRANSFER,
            vk::AccessFlags2::TRANSFER_WRITE,
            vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR,
            vk::AccessFlags2::ACCELERATION_STRUCTURE_READ_KHR | vk::AccessFlags2::SHADER_READ,
        );

        let geometries = [instances_geometry(
            resources.instance_buffer.device_address(device),
        )];
        let mut build_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(vk::AccelerationStructureTypeKHR::TOP_LEVEL)
            .flags(TLAS_FLAGS)
            .mode(mode.vk())
            .dst_acceleration_structure(resources.structure)
            .geometries(&geometries)
            .scratch_data(vk::DeviceOrHostAddressKHR {
                device_address: resources.scratch_buffer.device_address(device),
            });
        if mode == BuildMode::Update {
            build_info = build_info.src_acceleration_structure(resources.structure);
        }

        let build_range = vk::AccelerationStructureBuildRangeInfoKHR::default()
            .primitive_count(count);
        rt.acceleration_structure.cmd_build_acceleration_structures(
            cmd,
            &[build_info],
            &[std::slice::from_ref(&build_range)],
        );

        memory_barrier(
            device,
            cmd,
            vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR,
            vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR,
            vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR,
            vk::AccessFlags2::ACCELERATION_STRUCTURE_READ_KHR,
        );

        if mode == BuildMode::Build {
            tracing::info!(instances = count, "TLAS built");
        } else {
            tracing::trace!(instances = count, "TLAS updated");
        }
        Ok(mode)
    }

    unsafe fn allocate(rt: &RtDevice, allocator: &mut GpuAllocator, count: u32) -> Result<Resources> {
        let geometries = [instances_geometry(0)];
        let build_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(vk::AccelerationStructureTypeKHR::TOP_LEVEL)
            .flags(TLAS_FLAGS)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .geometries(&geometries);

        let mut sizes = vk::AccelerationStructureBuildSizesInfoKHR::default();
        rt.acceleration_structure.get_acceleration_structure_build_sizes(
            vk::AccelerationStructureBuildTypeKHR::DEVICE,
            &build_info,
            &[count],
            &mut sizes,
        );
        let scratch_size = sizes.build_scratch_size.max(sizes.update_scratch_size).max(1);

        let (structure, buffer, _) = create_structure(
            rt,
            allocator,
            "TLAS",
            vk::AccelerationStructureTypeKHR::TOP_LEVEL,
            sizes.acceleration_structure_size,
        )?;

        let instance_buffer = allocator.create_buffer(
            (INSTANCE_SIZE * u64::from(count)).max(INSTANCE_SIZE),
            vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR
                | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
                | vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuOnly,
            "TLAS instances",
        )?;

        let scratch_buffer = allocator.create_buffer_aligned(
            scratch_size,
            vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            MemoryLocation::GpuOnly,
            "TLAS scratch",
            rt.scratch_alignment(),
        )?;

        tracing::info!(
            instances = count,
            size = sizes.acceleration_structure_size,
            scratch = scratch_size,
            "TLAS allocated"
        );

        Ok(Resources {
            structure,
            buffer,
            instance_buffer,
            scratch_buffer,
        })
    }

    /// Destroy the structure and its buffers.
    ///
    /// # Safety
    /// The TLAS must not be in use.
    pub unsafe fn destroy(&mut self, rt: &RtDevice, allocator: &mut GpuAllocator) -> Result<()> {
        if let Some(mut resources) = self.resources.take() {
            rt.acceleration_structure
                .destroy_acceleration_structure(resources.structure, None);
            allocator.free_buffer(&mut resources.buffer)?;
            allocator.free_buffer(&mut resources.instance_buffer)?;
            allocator.free_buffer(&mut resources.scratch_buffer)?;
        }
        self.state = TlasState::Uninitialized;
        self.names.clear();
        Ok(())
    }
}

fn instances_geometry(address: vk::DeviceAddress) -> vk::AccelerationStructureGeometryKHR<'static> {
    vk::AccelerationStructureGeometryKHR::default()
        .geometry_type(vk::GeometryTypeKHR::INSTANCES)
        .flags(vk::GeometryFlagsKHR::OPAQUE)
        .geometry(vk::AccelerationStructureGeometryDataKHR {
            instances: vk::AccelerationStructureGeometryInstancesDataKHR::default()
                .array_of_pointers(false)
                .data(vk::DeviceOrHostAddressConstKHR {
                    device_address: address,
                }),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(custom_id: u32, mask: u8) -> TlasInstance {
        TlasInstance {
            name: "Cube Instance 1".to_string(),
            blas: 0xDEAD_BEEF_0000,
            mask,
            custom_id,
            transform: [1.0, 0.0, 0.0, 4.0, 0.0, 1.0, 0.0, -4.5, 0.0, 0.0, 1.0, 0.0],
        }
    }

    #[test]
    fn record_matches_vulkan_instance_layout() {
        assert_eq!(
            std::mem::size_of::<InstanceRecord>(),
            std::mem::size_of::<vk::AccelerationStructureInstanceKHR>()
        );
        assert_eq!(INSTANCE_SIZE, 64);
    }

    #[test]
    fn record_packing() {
        let record = InstanceRecord::new(&instance(2, 0x01), 5, 2);
        assert_eq!(record.custom_index(), 2);
        assert_eq!(record.mask(), 0x01);
        assert_eq!(record.sbt_offset(), 10);
        assert_eq!(
            record.sbt_offset_and_flags >> 24,
            vk::GeometryInstanceFlagsKHR::TRIANGLE_FACING_CULL_DISABLE.as_raw()
        );
        assert_eq!(record.blas_address, 0xDEAD_BEEF_0000);
        assert_eq!(record.transform[3], 4.0);

        let hidden = InstanceRecord::new(&instance(2, 0), 5, 2);
        assert_eq!(hidden.mask(), 0);
        assert_eq!(hidden.custom_index(), 2);
    }

    #[test]
    fn record_bytes_match_ash_packing() {
        let record = InstanceRecord::new(&instance(7, 0xFF), 3, 2);
        let packed = vk::Packed24_8::new(7, 0xFF);
        assert_eq!(record.custom_index(), packed.low_24());
        assert_eq!(record.mask(), packed.high_8());
        let bytes = bytemuck::bytes_of(&record);
        assert_eq!(&bytes[48..52], &((0xFF << 24) | 7u32).to_ne_bytes());
    }

    #[test]
    fn first_record_builds_then_updates() {
        let mut state = TlasState::Uninitialized;
        assert_eq!(state.instance_count(), None);
        assert_eq!(state.advance(12).ok(), Some(BuildMode::Build));
        assert_eq!(state, TlasState::Built { instance_count: 12 });
        assert_eq!(state.advance(12).ok(), Some(BuildMode::Update));
        assert_eq!(state, TlasState::Updated { instance_count: 12 });
        assert_eq!(state.advance(12).ok(), Some(BuildMode::Update));
        assert_eq!(state.instance_count(), Some(12));
    }

    #[test]
    fn changed_count_is_rejected() {
        let mut state = TlasState::Uninitialized;
        state.advance(12).ok();
        let err = state.advance(13);
        assert!(matches!(
            err,
            Err(RtError::InstanceCountChanged {
                expected: 12,
                actual: 13
            })
        ));
        // A rejected update leaves the state untouched
        assert_eq!(state, TlasState::Built { instance_count: 12 });
    }

    #[test]
    fn unbuilt_tlas_has_no_handle() {
        let tlas = Tlas::new(2);
        assert!(matches!(tlas.handle(), Err(RtError::TlasNotBuilt)));
        assert!(matches!(
            tlas.index_of("Ground Instance"),
            Err(RtError::TlasNotBuilt)
        ));
        assert_eq!(tlas.hit_group_stride(), 2);
    }

    #[test]
    fn tlas_flags_allow_update() {
        assert!(TLAS_FLAGS.contains(vk::BuildAccelerationStructureFlagsKHR::ALLOW_UPDATE));
        assert!(TLAS_FLAGS.contains(vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE));
        assert_eq!(BuildMode::Update.vk(), vk::BuildAccelerationStructureModeKHR::UPDATE);
    }
}
