//! Physical device (GPU) selection.
//!
//! Selection for a headless frame ring:
//! 1. Enumerate all GPUs
//! 2. Require Vulkan 1.2 with the `timelineSemaphore` feature
//! 3. Require a queue family that supports graphics or compute work
//! 4. Prefer discrete GPUs, then more device-local memory

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult};

/// The queue family a frame ring submits to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueSelection {
    /// Family index.
    pub family_index: u32,
    /// Whether the family supports graphics (otherwise compute only).
    pub graphics: bool,
}

/// Information about a selected physical device.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, type, limits).
    pub properties: vk::PhysicalDeviceProperties,
    /// Memory heaps and types.
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Queue family used for submissions and fence signals.
    pub queue: QueueSelection,
}

impl PhysicalDeviceInfo {
    /// Device name as reported by the driver.
    pub fn device_name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("Unknown Device")
    }

    /// Human-readable device type.
    pub fn device_type_name(&self) -> &'static str {
        device_type_name(self.properties.device_type)
    }

    /// Required alignment of uniform buffer offsets.
    pub fn uniform_offset_alignment(&self) -> u64 {
        self.properties
            .limits
            .min_uniform_buffer_offset_alignment
            .max(1)
    }

    /// Total size of device-local heaps in bytes.
    pub fn device_local_memory(&self) -> u64 {
        self.memory_properties
            .memory_heaps
            .iter()
            .take(self.memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let version = self.properties.api_version;
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field(
                "api_version",
                &format!(
                    "{}.{}.{}",
                    vk::api_version_major(version),
                    vk::api_version_minor(version),
                    vk::api_version_patch(version)
                ),
            )
            .field("queue", &self.queue)
            .finish()
    }
}

/// Selects the most suitable GPU for headless submission.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] when no device passes the checks.
pub fn select_physical_device(instance: &ash::Instance) -> RhiResult<PhysicalDeviceInfo> {
    let devices = unsafe { instance.enumerate_physical_devices()? };
    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableGpu);
    }

    info!("Found {} GPU(s)", devices.len());

    let best = devices
        .into_iter()
        .filter_map(|device| check_device(instance, device))
        .map(|info| {
            let score = rate_device(&info);
            debug!(
                "GPU '{}' ({}) - Score: {}",
                info.device_name(),
                info.device_type_name(),
                score
            );
            (info, score)
        })
        .max_by_key(|(_, score)| *score);

    match best {
        Some((info, score)) => {
            info!(
                "Selected GPU: '{}' ({}), queue family {}, score {}",
                info.device_name(),
                info.device_type_name(),
                info.queue.family_index,
                score
            );
            Ok(info)
        }
        None => {
            warn!("No GPU supports timeline semaphores on a usable queue");
            Err(RhiError::NoSuitableGpu)
        }
    }
}

fn check_device(instance: &ash::Instance, device: vk::PhysicalDevice) -> Option<PhysicalDeviceInfo> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let name = properties
        .device_name_as_c_str()
        .unwrap_or(c"Unknown")
        .to_owned();

    if properties.api_version < vk::API_VERSION_1_2 {
        debug!("GPU {:?} skipped: Vulkan 1.2 not supported", name);
        return None;
    }

    let mut features_1_2 = vk::PhysicalDeviceVulkan12Features::default();
    let mut features = vk::PhysicalDeviceFeatures2::default().push_next(&mut features_1_2);
    unsafe { instance.get_physical_device_features2(device, &mut features) };
    if features_1_2.timeline_semaphore == vk::FALSE {
        debug!("GPU {:?} skipped: timelineSemaphore not supported", name);
        return None;
    }

    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    let Some(queue) = find_queue(&families) else {
        debug!("GPU {:?} skipped: no graphics or compute queue", name);
        return None;
    };

    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

    Some(PhysicalDeviceInfo {
        device,
        properties,
        memory_properties,
        queue,
    })
}

/// Picks the first graphics family, falling back to the first compute family.
fn find_queue(families: &[vk::QueueFamilyProperties]) -> Option<QueueSelection> {
    let usable = |flags: vk::QueueFlags| {
        families
            .iter()
            .position(|family| family.queue_count > 0 && family.queue_flags.contains(flags))
    };

    usable(vk::QueueFlags::GRAPHICS)
        .map(|i| QueueSelection {
            family_index: i as u32,
            graphics: true,
        })
        .or_else(|| {
            usable(vk::QueueFlags::COMPUTE).map(|i| QueueSelection {
                family_index: i as u32,
                graphics: false,
            })
        })
}

fn rate_device(info: &PhysicalDeviceInfo) -> u64 {
    let type_score = match info.properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 10_000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1_000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 100,
        vk::PhysicalDeviceType::CPU => 10,
        _ => 1,
    };
    // VRAM in MB, capped at 16 GB
    let vram_mb = (info.device_local_memory() / (1024 * 1024)).min(16_000);
    type_score + vram_mb
}

fn device_type_name(device_type: vk::PhysicalDeviceType) -> &'static str {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
        vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
        vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
        vk::PhysicalDeviceType::CPU => "CPU",
        _ => "Other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: count,
            ..Default::default()
        }
    }

    #[test]
    fn test_find_queue_prefers_graphics() {
        let families = [
            family(vk::QueueFlags::COMPUTE, 1),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, 1),
        ];
        assert_eq!(
            find_queue(&families),
            Some(QueueSelection {
                family_index: 1,
                graphics: true
            })
        );
    }

    #[test]
    fn test_find_queue_falls_back_to_compute() {
        let families = [
            family(vk::QueueFlags::TRANSFER, 1),
            family(vk::QueueFlags::COMPUTE, 2),
        ];
        assert_eq!(
            find_queue(&families),
            Some(QueueSelection {
                family_index: 1,
                graphics: false
            })
        );
    }

    #[test]
    fn test_find_queue_skips_empty_families() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, 0),
            family(vk::QueueFlags::TRANSFER, 1),
        ];
        assert_eq!(find_queue(&families), None);
    }

    #[test]
    fn test_device_type_names() {
        assert_eq!(
            device_type_name(vk::PhysicalDeviceType::DISCRETE_GPU),
            "Discrete GPU"
        );
        assert_eq!(device_type_name(vk::PhysicalDeviceType::CPU), "CPU");
        assert_eq!(device_type_name(vk::PhysicalDeviceType::OTHER), "Other");
    }
}
