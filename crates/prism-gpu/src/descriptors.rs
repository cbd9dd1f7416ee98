//! Descriptor set management.

use crate::error::{GpuError, Result};
use ash::vk;

/// Descriptor set layout builder.
pub struct DescriptorSetLayoutBuilder<'a> {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'a>>,
}

impl<'a> DescriptorSetLayoutBuilder<'a> {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    /// Add a binding.
    pub fn binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        count: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(count)
                .stage_flags(stage_flags),
        );
        self
    }

    /// Add a storage buffer binding.
    pub fn storage_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(binding, vk::DescriptorType::STORAGE_BUFFER, 1, stage_flags)
    }

    /// Add a uniform buffer binding.
    pub fn uniform_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(binding, vk::DescriptorType::UNIFORM_BUFFER, 1, stage_flags)
    }

    /// Add a storage image binding.
    pub fn storage_image(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(binding, vk::DescriptorType::STORAGE_IMAGE, 1, stage_flags)
    }

    /// Add a combined image sampler binding holding `count` descriptors.
    pub fn sampled_images(
        self,
        binding: u32,
        count: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.binding(
            binding,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            count,
            stage_flags,
        )
    }

    /// Add an acceleration structure binding (for ray tracing).
    pub fn acceleration_structure(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(
            binding,
            vk::DescriptorType::ACCELERATION_STRUCTURE_KHR,
            1,
            stage_flags,
        )
    }

    /// Build the descriptor set layout.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn build(self, device: &ash::Device) -> Result<vk::DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&self.bindings);

        let layout = device.create_descriptor_set_layout(&layout_info, None)?;
        Ok(layout)
    }
}

impl Default for DescriptorSetLayoutBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Descriptor pool for allocating descriptor sets.
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    /// Create a new descriptor pool.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(
        device: &ash::Device,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> Result<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes)
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET);

        let pool = device.create_descriptor_pool(&create_info, None)?;
        Ok(Self { pool })
    }

    /// Get the raw pool handle.
    pub const fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    /// Allocate one descriptor set.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate_one(
        &self,
        device: &ash::Device,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet> {
        self.allocate(device, &[layout])?
            .pop()
            .ok_or_else(|| GpuError::InvalidState("No descriptor set allocated".to_string()))
    }

    /// Allocate descriptor sets.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate(
        &self,
        device: &ash::Device,
        layouts: &[vk::DescriptorSetLayout],
    ) -> Result<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        let sets = device.allocate_descriptor_sets(&alloc_info)?;
        Ok(sets)
    }

    /// Destroy the pool.
    ///
    /// # Safety
    /// The device must be valid and the pool must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_descriptor_pool(self.pool, None);
    }
}

enum Resource {
    Buffer(vk::DescriptorBufferInfo),
    Images(Vec<vk::DescriptorImageInfo>),
}

struct Entry {
    binding: u32,
    descriptor_type: vk::DescriptorType,
    resource: Resource,
}

/// Batches descriptor writes for one set and applies them in a single
/// `vkUpdateDescriptorSets` call.
#[derive(Default)]
pub struct DescriptorWriter {
    entries: Vec<Entry>,
    acceleration_structures: Vec<(u32, [vk::AccelerationStructureKHR; 1])>,
}

impl DescriptorWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn buffer(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        buffer: vk::Buffer,
        range: u64,
    ) -> Self {
        self.entries.push(Entry {
            binding,
            descriptor_type,
            resource: Resource::Buffer(
                vk::DescriptorBufferInfo::default()
                    .buffer(buffer)
                    .offset(0)
                    .range(range),
            ),
        });
        self
    }

    /// Write a uniform buffer descriptor.
    pub fn uniform_buffer(self, binding: u32, buffer: vk::Buffer, range: u64) -> Self {
        self.buffer(binding, vk::DescriptorType::UNIFORM_BUFFER, buffer, range)
    }

    /// Write a storage buffer descriptor.
    pub fn storage_buffer(self, binding: u32, buffer: vk::Buffer, range: u64) -> Self {
        self.buffer(binding, vk::DescriptorType::STORAGE_BUFFER, buffer, range)
    }

    /// Write a storage image descriptor in `GENERAL` layout.
    pub fn storage_image(mut self, binding: u32, view: vk::ImageView) -> Self {
        self.entries.push(Entry {
            binding,
            descriptor_type: vk::DescriptorType::STORAGE_IMAGE,
            resource: Resource::Images(vec![vk::DescriptorImageInfo::default()
                .image_view(view)
                .image_layout(vk::ImageLayout::GENERAL)]),
        });
        self
    }

    /// Write consecutive combined image sampler descriptors starting at
    /// array element 0.
    pub fn sampled_images(
        mut self,
        binding: u32,
        images: &[(vk::ImageView, vk::Sampler)],
        layout: vk::ImageLayout,
    ) -> Self {
        let infos = images
            .iter()
            .map(|&(view, sampler)| {
                vk::DescriptorImageInfo::default()
                    .image_view(view)
                    .sampler(sampler)
                    .image_layout(layout)
            })
            .collect();
        self.entries.push(Entry {
            binding,
            descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            resource: Resource::Images(infos),
        });
        self
    }

    /// Write a top-level acceleration structure descriptor.
    pub fn acceleration_structure(
        mut self,
        binding: u32,
        structure: vk::AccelerationStructureKHR,
    ) -> Self {
        self.acceleration_structures.push((binding, [structure]));
        self
    }

    /// Number of descriptor writes batched so far.
    pub fn len(&self) -> usize {
        self.entries.len() + self.acceleration_structures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply every batched write to `set`.
    ///
    /// # Safety
    /// The device, set and every referenced resource must be valid.
    pub unsafe fn update(&self, device: &ash::Device, set: vk::DescriptorSet) {
        let mut as_infos: Vec<_> = self
            .acceleration_structures
            .iter()
            .map(|(_, structure)| {
                vk::WriteDescriptorSetAccelerationStructureKHR::default()
                    .acceleration_structures(structure)
            })
            .collect();

        let mut writes: Vec<_> = self
            .entries
            .iter()
            .map(|entry| {
                let write = vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(entry.binding)
                    .descriptor_type(entry.descriptor_type);
                match &entry.resource {
                    Resource::Buffer(info) => write.buffer_info(std::slice::from_ref(info)),
                    Resource::Images(infos) => write.image_info(infos),
                }
            })
            .collect();

        // The acceleration structure travels in the pNext chain, so the count
        // is not derived from any info slice.
        writes.extend(self.acceleration_structures.iter().zip(as_infos.iter_mut()).map(
            |((binding, _), info)| {
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(*binding)
                    .descriptor_type(vk::DescriptorType::ACCELERATION_STRUCTURE_KHR)
                    .descriptor_count(1)
                    .push_next(info)
            },
        ));

        device.update_descriptor_sets(&writes, &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_batches_all_kinds() {
        let writer = DescriptorWriter::new()
            .acceleration_structure(0, vk::AccelerationStructureKHR::null())
            .storage_image(1, vk::ImageView::null())
            .uniform_buffer(2, vk::Buffer::null(), 256)
            .sampled_images(
                5,
                &[(vk::ImageView::null(), vk::Sampler::null()); 4],
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );
        assert_eq!(writer.len(), 4);
        assert!(!writer.is_empty());
        assert!(DescriptorWriter::new().is_empty());
    }

    #[test]
    fn layout_builder_records_counts() {
        let builder = DescriptorSetLayoutBuilder::new()
            .acceleration_structure(0, vk::ShaderStageFlags::RAYGEN_KHR)
            .sampled_images(5, 4, vk::ShaderStageFlags::CLOSEST_HIT_KHR);
        assert_eq!(builder.bindings.len(), 2);
        assert_eq!(builder.bindings[1].descriptor_count, 4);
        assert_eq!(
            builder.bindings[0].descriptor_type,
            vk::DescriptorType::ACCELERATION_STRUCTURE_KHR
        );
    }
}
