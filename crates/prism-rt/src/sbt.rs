//! Shader binding table.
//!
//! The table is edited on the host by group name and pushed to the device by
//! an explicit [`ShaderBindingTable::sync`]. Layout:
//! - ray generation: one record
//! - miss: one record per ray type
//! - hit groups: `hit_group_stride` records per TLAS instance, indexed by
//!   `instance * stride + ray_offset`
//!
//! A zeroed hit record is an empty group: the hit is accepted with no shader
//! invoked.

use ash::vk;
use gpu_allocator::MemoryLocation;
use hashbrown::HashMap;
use prism_gpu::command::{cmd_update_buffer_chunked, memory_barrier};
use prism_gpu::{GpuAllocator, GpuBuffer, GpuContext, GpuError};

use crate::device::RtDevice;
use crate::error::{Result, RtError};
use crate::pipeline::RayTracingPipeline;
use crate::tlas::Tlas;

/// Align a value up to a power-of-two alignment.
pub const fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}

/// Byte offsets and strides of the table regions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SbtLayout {
    pub handle_size: u64,
    /// Record stride: the handle size rounded up to the handle alignment
    pub stride: u64,
    pub miss_offset: u64,
    pub miss_count: u64,
    pub hit_offset: u64,
    pub hit_count: u64,
    pub total_size: u64,
}

impl SbtLayout {
    pub fn new(
        handle_size: u32,
        handle_alignment: u32,
        base_alignment: u32,
        miss_count: u32,
        hit_count: u32,
    ) -> Self {
        let handle_size = u64::from(handle_size);
        let base = u64::from(base_alignment.max(1));
        let stride = align_up(handle_size, u64::from(handle_alignment.max(1)));
        let miss_count = u64::from(miss_count);
        let hit_count = u64::from(hit_count);

        let miss_offset = align_up(stride, base);
        let hit_offset = miss_offset + align_up(stride * miss_count, base);
        let total_size = hit_offset + align_up(stride * hit_count, base);

        Self {
            handle_size,
            stride,
            miss_offset,
            miss_count,
            hit_offset,
            hit_count,
            total_size,
        }
    }

    /// Regions for `vkCmdTraceRaysKHR` given the buffer address: raygen,
    /// miss, hit and an empty callable region.
    pub const fn regions(&self, base: vk::DeviceAddress) -> [vk::StridedDeviceAddressRegionKHR; 4] {
        [
            // Raygen size must equal its stride
            vk::StridedDeviceAddressRegionKHR {
                device_address: base,
                stride: self.stride,
                size: self.stride,
            },
            vk::StridedDeviceAddressRegionKHR {
                device_address: base + self.miss_offset,
                stride: self.stride,
                size: self.stride * self.miss_count,
            },
            vk::StridedDeviceAddressRegionKHR {
                device_address: base + self.hit_offset,
                stride: self.stride,
                size: self.stride * self.hit_count,
            },
            vk::StridedDeviceAddressRegionKHR {
                device_address: 0,
                stride: 0,
                size: 0,
            },
        ]
    }
}

/// Host copy of the table with name-based binding.
#[derive(Clone, Debug)]
pub struct SbtData {
    layout: SbtLayout,
    handles: HashMap<String, Vec<u8>>,
    bytes: Vec<u8>,
    hit_group_stride: u32,
    dirty: bool,
}

impl SbtData {
    /// Create an all-empty table. `handles` maps group names to their
    /// opaque handles, each `layout.handle_size` bytes long.
    pub fn new(layout: SbtLayout, handles: HashMap<String, Vec<u8>>, hit_group_stride: u32) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let size = layout.total_size as usize;
        Self {
            layout,
            handles,
            bytes: vec![0; size],
            hit_group_stride,
            dirty: true,
        }
    }

    pub const fn layout(&self) -> &SbtLayout {
        &self.layout
    }

    /// Whether host edits have not been synced yet.
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn mark_synced(&mut self) {
        self.dirty = false;
    }

    fn write_record(&mut self, offset: u64, group: Option<&str>) -> Result<()> {
        #[allow(clippy::cast_possible_truncation)]
        let (start, len) = (offset as usize, self.layout.handle_size as usize);
        let record = &mut self.bytes[start..start + len];
        match group {
            Some(name) => {
                let handle = self
                    .handles
                    .get(name)
                    .ok_or_else(|| RtError::UnknownShaderGroup(name.to_owned()))?;
                record.copy_from_slice(handle);
            }
            None => record.fill(0),
        }
        self.dirty = true;
        Ok(())
    }

    /// Bind the ray generation group.
    pub fn bind_ray_gen(&mut self, group: &str) -> Result<()> {
        self.write_record(0, Some(group))
    }

    /// Bind the miss group used for `missIndex == index`.
    pub fn bind_miss(&mut self, index: u32, group: &str) -> Result<()> {
        let index = u64::from(index);
        if index >= self.layout.miss_count {
            return Err(RtError::SlotOutOfRange(format!("miss {index}")));
        }
        self.write_record(self.layout.miss_offset + index * self.layout.stride, Some(group))
    }

    fn hit_offset(&self, instance: u32, ray_offset: u32) -> Result<u64> {
        if ray_offset >= self.hit_group_stride {
            return Err(RtError::SlotOutOfRange(format!("ray offset {ray_offset}")));
        }
        let record = u64::from(instance) * u64::from(self.hit_group_stride) + u64::from(ray_offset);
        if record >= self.layout.hit_count {
            return Err(RtError::SlotOutOfRange(format!("hit record {record}")));
        }
        Ok(self.layout.hit_offset + record * self.layout.stride)
    }

    /// Bind one instance's record for a ray type. `None` makes it empty.
    pub fn bind_hit_group(&mut self, instance: u32, ray_offset: u32, group: Option<&str>) -> Result<()> {
        let offset = self.hit_offset(instance, ray_offset)?;
        self.write_record(offset, group)
    }

    /// Bind the same group for one ray type on every instance.
    pub fn bind_hit_group_for_all(&mut self, ray_offset: u32, group: Option<&str>) -> Result<()> {
        let instances = self.instance_count();
        for instance in 0..instances {
            self.bind_hit_group(instance, ray_offset, group)?;
        }
        Ok(())
    }

    /// Number of instances the hit region holds.
    pub fn instance_count(&self) -> u32 {
        let count = self.layout.hit_count / u64::from(self.hit_group_stride.max(1));
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// Bytes of the hit record for `(instance, ray_offset)`.
    pub fn hit_record(&self, instance: u32, ray_offset: u32) -> Result<&[u8]> {
        let offset = self.hit_offset(instance, ray_offset)?;
        #[allow(clippy::cast_possible_truncation)]
        let (start, len) = (offset as usize, self.layout.handle_size as usize);
        Ok(&self.bytes[start..start + len])
    }

    /// Trace regions. Fails while host edits are unsynced.
    pub fn regions(
        &self,
        base: vk::DeviceAddress,
    ) -> Result<[vk::StridedDeviceAddressRegionKHR; 4]> {
        if self.dirty {
            return Err(GpuError::InvalidState("shader binding table not synced".to_string()).into());
        }
        Ok(self.layout.regions(base))
    }
}

/// Device-resident shader binding table.
pub struct ShaderBindingTable {
    data: SbtData,
    buffer: GpuBuffer,
    address: vk::DeviceAddress,
}

impl ShaderBindingTable {
    /// Create an empty table for `instance_count` instances.
    pub fn new(
        gpu: &GpuContext,
        rt: &RtDevice,
        pipeline: &RayTracingPipeline,
        miss_count: u32,
        instance_count: u32,
        hit_group_stride: u32,
    ) -> Result<Self> {
        let caps = rt.capabilities();
        let layout = SbtLayout::new(
            caps.shader_group_handle_size,
            caps.shader_group_handle_alignment,
            caps.shader_group_base_alignment,
            miss_count,
            instance_count * hit_group_stride,
        );

        let handles = pipeline.group_handles(rt, caps.shader_group_handle_size)?;

        let buffer = gpu.allocator().lock().create_buffer_aligned(
            layout.total_size,
            vk::BufferUsageFlags::SHADER_BINDING_TABLE_KHR
                | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
                | vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuOnly,
            "shader binding table",
            u64::from(caps.shader_group_base_alignment.max(1)),
        )?;
        let address = buffer.device_address(gpu.device());

        tracing::info!(
            stride = layout.stride,
            miss = layout.miss_count,
            hit = layout.hit_count,
            size = layout.total_size,
            "Shader binding table created"
        );

        Ok(Self {
            data: SbtData::new(layout, handles, hit_group_stride),
            buffer,
            address,
        })
    }

    pub const fn data(&self) -> &SbtData {
        &self.data
    }

    pub fn bind_ray_gen(&mut self, group: &str) -> Result<()> {
        self.data.bind_ray_gen(group)
    }

    pub fn bind_miss(&mut self, index: u32, group: &str) -> Result<()> {
        self.data.bind_miss(index, group)
    }

    /// Bind `group` for `ray_offset` on every instance of `tlas`.
    pub fn bind_hit_group_for_tlas(
        &mut self,
        tlas: &Tlas,
        ray_offset: u32,
        group: Option<&str>,
    ) -> Result<()> {
        tlas.handle()?;
        self.data.bind_hit_group_for_all(ray_offset, group)
    }

    /// Bind `group` for `ray_offset` on the named instance.
    pub fn bind_hit_group_for_instance(
        &mut self,
        tlas: &Tlas,
        instance: &str,
        ray_offset: u32,
        group: &str,
    ) -> Result<()> {
        let index = tlas.index_of(instance)?;
        self.data.bind_hit_group(index, ray_offset, Some(group))
    }

    /// Push host edits to the device. Does nothing when already in sync.
    ///
    /// # Safety
    /// The command buffer must be recording outside a render pass.
    pub unsafe fn sync(&mut self, device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
        if !self.data.is_dirty() {
            return Ok(());
        }

        memory_barrier(
            device,
            cmd,
            vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR,
            vk::AccessFlags2::SHADER_BINDING_TABLE_READ_KHR,
            vk::PipelineStageFlags2::TRANSFER,
            vk::AccessFlags2::TRANSFER_WRITE,
        );
        cmd_update_buffer_chunked(device, cmd, self.buffer.buffer, 0, self.data.bytes())?;
        memory_barrier(
            device,
            cmd,
            vk::PipelineStageFlags2::TRANSFER,
            vk::AccessFlags2::TRANSFER_WRITE,
            vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR,
            vk::AccessFlags2::SHADER_BINDING_TABLE_READ_KHR,
        );

        self.data.mark_synced();
        tracing::debug!(bytes = self.data.bytes().len(), "Shader binding table synced");
        Ok(())
    }

    /// Regions for `vkCmdTraceRaysKHR`.
    pub fn regions(&self) -> Result<[vk::StridedDeviceAddressRegionKHR; 4]> {
        self.data.regions(self.address)
    }

    /// Free the table buffer.
    ///
    /// # Safety
    /// The table must not be in use.
    pub unsafe fn destroy(mut self, allocator: &mut GpuAllocator) -> Result<()> {
        allocator.free_buffer(&mut self.buffer)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HANDLE: u32 = 32;

    fn data(instances: u32) -> SbtData {
        let layout = SbtLayout::new(HANDLE, 32, 64, 2, instances * 2);
        let handles = ["Main", "PrimaryMiss", "ShadowMiss", "GroundHit", "SphereShadowHit"]
            .iter()
            .zip(1u8..)
            .map(|(name, fill)| ((*name).to_string(), vec![fill; HANDLE as usize]))
            .collect();
        SbtData::new(layout, handles, 2)
    }

    #[test]
    fn align_up_rounds_to_power_of_two() {
        assert_eq!(align_up(32, 64), 64);
        assert_eq!(align_up(64, 64), 64);
        assert_eq!(align_up(65, 64), 128);
        assert_eq!(align_up(1, 4), 4);
        assert_eq!(align_up(0, 4), 0);
    }

    #[test]
    fn layout_offsets() {
        let layout = SbtLayout::new(32, 32, 64, 2, 24);
        assert_eq!(layout.stride, 32);
        assert_eq!(layout.miss_offset, 64);
        assert_eq!(layout.hit_offset, 128);
        assert_eq!(layout.total_size, 128 + 24 * 32);

        let [raygen, miss, hit, callable] = layout.regions(0x1000);
        assert_eq!(raygen.size, raygen.stride);
        assert_eq!(miss.device_address, 0x1040);
        assert_eq!(miss.size, 64);
        assert_eq!(hit.device_address, 0x1080);
        assert_eq!(hit.size, 24 * 32);
        assert_eq!(callable.size, 0);
    }

    #[test]
    fn handle_smaller_than_alignment() {
        let layout = SbtLayout::new(32, 64, 64, 2, 4);
        assert_eq!(layout.stride, 64);
        assert_eq!(layout.hit_offset, 64 + 128);
    }

    #[test]
    fn binding_writes_handles() {
        let mut sbt = data(12);
        sbt.bind_ray_gen("Main").unwrap();
        sbt.bind_miss(1, "ShadowMiss").unwrap();
        sbt.bind_hit_group(0, 0, Some("GroundHit")).unwrap();

        assert!(sbt.bytes()[..32].iter().all(|&b| b == 1));
        assert!(sbt.bytes()[96..128].iter().all(|&b| b == 3));
        assert!(sbt.hit_record(0, 0).unwrap().iter().all(|&b| b == 4));
        assert!(sbt.hit_record(0, 1).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn instance_binding_overrides_tlas_default() {
        let mut sbt = data(12);
        sbt.bind_hit_group_for_all(1, Some("GroundHit")).unwrap();
        sbt.bind_hit_group_for_all(1, None).unwrap();
        sbt.bind_hit_group(5, 1, Some("SphereShadowHit")).unwrap();

        assert!(sbt.hit_record(4, 1).unwrap().iter().all(|&b| b == 0));
        assert!(sbt.hit_record(5, 1).unwrap().iter().all(|&b| b == 5));
        assert_eq!(sbt.instance_count(), 12);
    }

    #[test]
    fn invalid_slots_and_names() {
        let mut sbt = data(12);
        assert!(matches!(
            sbt.bind_ray_gen("Missing"),
            Err(RtError::UnknownShaderGroup(name)) if name == "Missing"
        ));
        assert!(matches!(sbt.bind_miss(2, "PrimaryMiss"), Err(RtError::SlotOutOfRange(_))));
        assert!(matches!(sbt.bind_hit_group(12, 0, None), Err(RtError::SlotOutOfRange(_))));
        assert!(matches!(sbt.bind_hit_group(0, 2, None), Err(RtError::SlotOutOfRange(_))));
    }

    #[test]
    fn regions_require_sync() {
        let mut sbt = data(1);
        assert!(sbt.regions(0).is_err());
        sbt.mark_synced();
        assert!(sbt.regions(0).is_ok());
        sbt.bind_miss(0, "PrimaryMiss").unwrap();
        assert!(sbt.is_dirty());
        assert!(sbt.regions(0).is_err());
    }
}
