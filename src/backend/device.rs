// Vulkan Device - logical device and queues
//
// Responsibilities:
// - One queue per distinct queue family (graphics, present)
// - Fixed device-extension list, decided per platform at compile time

use super::error::{creation, SetupError};
use super::probe::{find_queue_families, DeviceQuery};
use ash::{khr, vk};
use std::ffi::{c_char, CStr};

/// Device extensions every platform needs, plus the portability subset on MoltenVK
#[cfg(any(target_os = "macos", target_os = "ios"))]
pub const DEVICE_EXTENSIONS: &[&CStr] = &[khr::swapchain::NAME, khr::portability_subset::NAME];
#[cfg(not(any(target_os = "macos", target_os = "ios")))]
pub const DEVICE_EXTENSIONS: &[&CStr] = &[khr::swapchain::NAME];

/// Logical device wrapper, destroys the device on drop
pub struct VulkanDevice {
    pub device: ash::Device,

    // Queue handles
    pub graphics_queue: vk::Queue,
    pub graphics_queue_family: u32,
    pub present_queue: vk::Queue,
    pub present_queue_family: u32,
}

impl VulkanDevice {
    /// Create the logical device for `physical_device`
    ///
    /// Queue families are re-derived here, so a fallback device that lacks
    /// either role fails with `SetupError::Unqualified` instead of a bogus index.
    pub fn new(
        instance: &ash::Instance,
        query: &impl DeviceQuery,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self, SetupError> {
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        log::info!("Selected GPU: {}", device_name(&properties));
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );

        let (graphics_queue_family, present_queue_family) =
            find_queue_families(query, physical_device)?
                .complete()
                .ok_or(SetupError::Unqualified {
                    reason: "no queue family for graphics or presentation",
                })?;
        log::info!(
            "Queue families: graphics={}, present={}",
            graphics_queue_family,
            present_queue_family
        );

        let queue_priorities = [1.0];
        let families = unique_queue_families(graphics_queue_family, present_queue_family);
        let queue_create_infos: Vec<_> = families
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        let extensions: Vec<*const c_char> = DEVICE_EXTENSIONS.iter().map(|e| e.as_ptr()).collect();
        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }
            .map_err(creation("logical device"))?;

        let graphics_queue = unsafe { device.get_device_queue(graphics_queue_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_queue_family, 0) };

        Ok(Self {
            device,
            graphics_queue,
            graphics_queue_family,
            present_queue,
            present_queue_family,
        })
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<(), vk::Result> {
        unsafe { self.device.device_wait_idle() }
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");
        if let Err(e) = self.wait_idle() {
            log::warn!("device_wait_idle failed during teardown: {}", e);
        }
        unsafe { self.device.destroy_device(None) };
    }
}

/// One entry per distinct family; Vulkan rejects duplicate queue create infos
pub fn unique_queue_families(graphics: u32, present: u32) -> Vec<u32> {
    if graphics == present {
        vec![graphics]
    } else {
        vec![graphics, present]
    }
}

pub fn device_name(properties: &vk::PhysicalDeviceProperties) -> String {
    properties
        .device_name_as_c_str()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "<unnamed>".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_family_is_requested_once() {
        assert_eq!(unique_queue_families(0, 0), vec![0]);
        assert_eq!(unique_queue_families(0, 2), vec![0, 2]);
    }

    #[test]
    fn swapchain_extension_is_always_required() {
        assert_eq!(DEVICE_EXTENSIONS[0], khr::swapchain::NAME);
        if cfg!(any(target_os = "macos", target_os = "ios")) {
            assert!(DEVICE_EXTENSIONS.contains(&khr::portability_subset::NAME));
        } else {
            assert_eq!(DEVICE_EXTENSIONS.len(), 1);
        }
    }

    #[test]
    fn device_name_reads_the_fixed_buffer() {
        let mut properties = vk::PhysicalDeviceProperties::default();
        for (dst, &src) in properties.device_name.iter_mut().zip(b"Test GPU\0") {
            *dst = src as c_char;
        }
        assert_eq!(device_name(&properties), "Test GPU");
    }
}
