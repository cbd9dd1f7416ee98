//! GPU capability detection.

use ash::vk;
use std::collections::HashSet;
use std::ffi::CStr;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub const fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Device extensions needed for hardware ray tracing.
pub fn ray_tracing_extensions() -> [&'static CStr; 3] {
    [
        ash::khr::acceleration_structure::NAME,
        ash::khr::ray_tracing_pipeline::NAME,
        ash::khr::deferred_host_operations::NAME,
    ]
}

/// Hardware ray tracing limits.
///
/// `supported` is false when any extension or feature is missing; the limits
/// are zero in that case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RayTracingCapabilities {
    pub supported: bool,
    /// Extensions from [`ray_tracing_extensions`] the device lacks
    pub missing_extensions: Vec<String>,
    pub max_ray_recursion_depth: u32,
    pub shader_group_handle_size: u32,
    pub shader_group_handle_alignment: u32,
    pub shader_group_base_alignment: u32,
    pub min_scratch_offset_alignment: u32,
}

impl RayTracingCapabilities {
    /// Query ray tracing support.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        available_extensions: &HashSet<String>,
    ) -> Self {
        let missing_extensions = Self::missing_from(available_extensions);
        if !missing_extensions.is_empty() {
            return Self {
                missing_extensions,
                ..Self::default()
            };
        }

        let mut as_features = vk::PhysicalDeviceAccelerationStructureFeaturesKHR::default();
        let mut pipeline_features = vk::PhysicalDeviceRayTracingPipelineFeaturesKHR::default();
        let mut features2 = vk::PhysicalDeviceFeatures2::default()
            .push_next(&mut as_features)
            .push_next(&mut pipeline_features);
        instance.get_physical_device_features2(physical_device, &mut features2);

        let mut pipeline_props = vk::PhysicalDeviceRayTracingPipelinePropertiesKHR::default();
        let mut as_props = vk::PhysicalDeviceAccelerationStructurePropertiesKHR::default();
        let mut props2 = vk::PhysicalDeviceProperties2::default()
            .push_next(&mut pipeline_props)
            .push_next(&mut as_props);
        instance.get_physical_device_properties2(physical_device, &mut props2);

        Self {
            supported: as_features.acceleration_structure == vk::TRUE
                && pipeline_features.ray_tracing_pipeline == vk::TRUE,
            missing_extensions,
            max_ray_recursion_depth: pipeline_props.max_ray_recursion_depth,
            shader_group_handle_size: pipeline_props.shader_group_handle_size,
            shader_group_handle_alignment: pipeline_props.shader_group_handle_alignment,
            shader_group_base_alignment: pipeline_props.shader_group_base_alignment,
            min_scratch_offset_alignment: as_props
                .min_acceleration_structure_scratch_offset_alignment,
        }
    }

    /// Ray tracing extensions absent from `available`.
    pub fn missing_from(available: &HashSet<String>) -> Vec<String> {
        ray_tracing_extensions()
            .iter()
            .map(|ext| ext.to_string_lossy().into_owned())
            .filter(|name| !available.contains(name))
            .collect()
    }

    /// Clamp a requested recursion depth to the hardware limit.
    pub fn clamp_recursion_depth(&self, requested: u32) -> u32 {
        requested.min(self.max_ray_recursion_depth)
    }

    /// Why ray tracing is unavailable, for diagnostics.
    pub fn unsupported_reason(&self) -> Option<String> {
        if self.supported {
            None
        } else if self.missing_extensions.is_empty() {
            Some("ray tracing features not enabled by driver".to_string())
        } else {
            Some(format!("missing {}", self.missing_extensions.join(", ")))
        }
    }
}

/// Detected GPU capabilities.
#[derive(Debug, Clone)]
pub struct GpuCapabilities {
    /// GPU vendor
    pub vendor: GpuVendor,
    /// Device name
    pub device_name: String,
    /// Vulkan API version
    pub api_version: u32,
    /// Driver version
    pub driver_version: u32,

    /// Buffer device address support
    pub supports_buffer_device_address: bool,

    /// Device-local memory in MB
    pub device_local_memory_mb: u64,

    /// Hardware ray tracing
    pub ray_tracing: RayTracingCapabilities,

    /// Available device extensions
    pub available_extensions: HashSet<String>,
}

impl GpuCapabilities {
    /// Query capabilities from a physical device.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let properties = instance.get_physical_device_properties(physical_device);
        let memory_properties = instance.get_physical_device_memory_properties(physical_device);

        let available_extensions = device_extension_names(instance, physical_device);

        let vendor = GpuVendor::from_vendor_id(properties.vendor_id);
        let device_name = CStr::from_ptr(properties.device_name.as_ptr())
            .to_string_lossy()
            .into_owned();

        let device_local_memory_mb: u64 = memory_properties
            .memory_heaps
            .iter()
            .take(memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size / (1024 * 1024))
            .sum();

        let api_version = properties.api_version;
        let ray_tracing =
            RayTracingCapabilities::query(instance, physical_device, &available_extensions);

        Self {
            vendor,
            device_name,
            api_version,
            driver_version: properties.driver_version,
            // Core since Vulkan 1.2
            supports_buffer_device_address: is_vulkan_1_3(api_version)
                || available_extensions.contains("VK_KHR_buffer_device_address"),
            device_local_memory_mb,
            ray_tracing,
            available_extensions,
        }
    }

    /// Check if the GPU meets the baseline requirements (Vulkan 1.3 with
    /// buffer device address). Ray tracing is checked separately.
    pub fn meets_requirements(&self) -> bool {
        is_vulkan_1_3(self.api_version) && self.supports_buffer_device_address
    }

    /// Get a human-readable summary of capabilities.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}) - Vulkan {}.{}.{} - {} MB VRAM - ray tracing: {}",
            self.device_name,
            self.vendor,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.device_local_memory_mb,
            if self.ray_tracing.supported { "yes" } else { "no" },
        )
    }
}

pub(crate) const fn is_vulkan_1_3(api_version: u32) -> bool {
    let major = vk::api_version_major(api_version);
    major > 1 || (major == 1 && vk::api_version_minor(api_version) >= 3)
}

/// Names of all extensions the device exposes.
///
/// # Safety
/// The instance and physical device must be valid.
pub(crate) unsafe fn device_extension_names(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> HashSet<String> {
    instance
        .enumerate_device_extension_properties(physical_device)
        .unwrap_or_default()
        .iter()
        .filter_map(|ext| {
            CStr::from_ptr(ext.extension_name.as_ptr())
                .to_str()
                .ok()
                .map(String::from)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
        assert_eq!(GpuVendor::from_vendor_id(0x1234), GpuVendor::Other(0x1234));
    }

    #[test]
    fn missing_ray_tracing_extensions() {
        let mut available: HashSet<String> = ["VK_KHR_swapchain", "VK_KHR_acceleration_structure"]
            .into_iter()
            .map(String::from)
            .collect();
        let missing = RayTracingCapabilities::missing_from(&available);
        assert_eq!(
            missing,
            vec![
                "VK_KHR_ray_tracing_pipeline".to_string(),
                "VK_KHR_deferred_host_operations".to_string()
            ]
        );

        available.extend(missing);
        assert!(RayTracingCapabilities::missing_from(&available).is_empty());
    }

    #[test]
    fn recursion_depth_clamped_to_hardware() {
        let caps = RayTracingCapabilities {
            supported: true,
            max_ray_recursion_depth: 31,
            ..RayTracingCapabilities::default()
        };
        assert_eq!(caps.clamp_recursion_depth(6), 6);
        assert_eq!(caps.clamp_recursion_depth(64), 31);
        assert_eq!(caps.unsupported_reason(), None);
    }

    #[test]
    fn unsupported_reason_lists_extensions() {
        let caps = RayTracingCapabilities {
            missing_extensions: vec!["VK_KHR_ray_tracing_pipeline".to_string()],
            ..RayTracingCapabilities::default()
        };
        assert_eq!(
            caps.unsupported_reason().as_deref(),
            Some("missing VK_KHR_ray_tracing_pipeline")
        );
    }

    #[test]
    fn api_version_check() {
        assert!(is_vulkan_1_3(vk::make_api_version(0, 1, 3, 0)));
        assert!(is_vulkan_1_3(vk::make_api_version(0, 1, 4, 0)));
        assert!(!is_vulkan_1_3(vk::make_api_version(0, 1, 2, 198)));
    }
}
