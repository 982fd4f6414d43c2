// Capability probing - what a physical device can do for a surface
//
// Pure read/derive step: queue family roles and swapchain support. The
// driver queries sit behind `DeviceQuery` so selection can be tested
// without a GPU.

use super::error::{enumeration, SetupError};
use ash::{khr, vk};

/// Queue family indices for the two roles we need
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Both indices, if the device can fill both roles
    pub fn complete(&self) -> Option<(u32, u32)> {
        Some((self.graphics?, self.present?))
    }
}

/// Surface capabilities plus the format and present-mode lists, in driver order
#[derive(Debug, Clone, Default)]
pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// A swapchain needs at least one format and one present mode
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Driver queries needed to judge a physical device against a surface
pub trait DeviceQuery {
    fn queue_families(&self, device: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties>;

    fn supports_present(
        &self,
        device: vk::PhysicalDevice,
        queue_family: u32,
    ) -> Result<bool, SetupError>;

    fn surface_capabilities(
        &self,
        device: vk::PhysicalDevice,
    ) -> Result<vk::SurfaceCapabilitiesKHR, SetupError>;

    fn surface_formats(
        &self,
        device: vk::PhysicalDevice,
    ) -> Result<Vec<vk::SurfaceFormatKHR>, SetupError>;

    fn present_modes(&self, device: vk::PhysicalDevice)
        -> Result<Vec<vk::PresentModeKHR>, SetupError>;
}

/// `DeviceQuery` backed by a live instance and surface
pub struct SurfaceProbe<'a> {
    pub instance: &'a ash::Instance,
    pub surface_loader: &'a khr::surface::Instance,
    pub surface: vk::SurfaceKHR,
}

// ash sizes each list with the count query and then fills it
impl DeviceQuery for SurfaceProbe<'_> {
    fn queue_families(&self, device: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties> {
        unsafe { self.instance.get_physical_device_queue_family_properties(device) }
    }

    fn supports_present(
        &self,
        device: vk::PhysicalDevice,
        queue_family: u32,
    ) -> Result<bool, SetupError> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_support(device, queue_family, self.surface)
        }
        .map_err(enumeration("surface support"))
    }

    fn surface_capabilities(
        &self,
        device: vk::PhysicalDevice,
    ) -> Result<vk::SurfaceCapabilitiesKHR, SetupError> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(device, self.surface)
        }
        .map_err(enumeration("surface capabilities"))
    }

    fn surface_formats(
        &self,
        device: vk::PhysicalDevice,
    ) -> Result<Vec<vk::SurfaceFormatKHR>, SetupError> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(device, self.surface)
        }
        .map_err(enumeration("surface formats"))
    }

    fn present_modes(
        &self,
        device: vk::PhysicalDevice,
    ) -> Result<Vec<vk::PresentModeKHR>, SetupError> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(device, self.surface)
        }
        .map_err(enumeration("present modes"))
    }
}

/// Scan every queue family for the graphics and present roles
///
/// The two checks are independent and a later matching family overwrites an
/// earlier one, so the last qualifying index wins for each role.
pub fn find_queue_families(
    query: &impl DeviceQuery,
    device: vk::PhysicalDevice,
) -> Result<QueueFamilyIndices, SetupError> {
    let mut indices = QueueFamilyIndices::default();

    for (index, family) in query.queue_families(device).iter().enumerate() {
        let index = index as u32;

        if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            indices.graphics = Some(index);
        }
        if query.supports_present(device, index)? {
            indices.present = Some(index);
        }
    }

    Ok(indices)
}

pub fn query_swapchain_support(
    query: &impl DeviceQuery,
    device: vk::PhysicalDevice,
) -> Result<SwapchainSupportDetails, SetupError> {
    Ok(SwapchainSupportDetails {
        capabilities: query.surface_capabilities(device)?,
        formats: query.surface_formats(device)?,
        present_modes: query.present_modes(device)?,
    })
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory `DeviceQuery` for tests

    use super::*;
    use ash::vk::Handle;
    use std::collections::HashMap;

    #[derive(Clone, Default)]
    pub struct FakeDevice {
        /// (flags, can present) per queue family
        pub families: Vec<(vk::QueueFlags, bool)>,
        pub capabilities: vk::SurfaceCapabilitiesKHR,
        pub formats: Vec<vk::SurfaceFormatKHR>,
        pub present_modes: Vec<vk::PresentModeKHR>,
        pub fail_formats: bool,
    }

    impl FakeDevice {
        /// One family doing graphics and present, one sRGB format, FIFO
        pub fn capable() -> Self {
            Self {
                families: vec![(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, true)],
                capabilities: vk::SurfaceCapabilitiesKHR {
                    min_image_count: 2,
                    max_image_count: 8,
                    current_extent: vk::Extent2D {
                        width: u32::MAX,
                        height: u32::MAX,
                    },
                    min_image_extent: vk::Extent2D {
                        width: 100,
                        height: 100,
                    },
                    max_image_extent: vk::Extent2D {
                        width: 4096,
                        height: 4096,
                    },
                    ..Default::default()
                },
                formats: vec![vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                }],
                present_modes: vec![vk::PresentModeKHR::FIFO],
                fail_formats: false,
            }
        }
    }

    pub fn handle(raw: u64) -> vk::PhysicalDevice {
        vk::PhysicalDevice::from_raw(raw)
    }

    #[derive(Default)]
    pub struct FakeQuery {
        pub devices: HashMap<u64, FakeDevice>,
    }

    impl FakeQuery {
        pub fn with(mut self, raw: u64, device: FakeDevice) -> Self {
            self.devices.insert(raw, device);
            self
        }

        fn get(&self, device: vk::PhysicalDevice) -> &FakeDevice {
            &self.devices[&device.as_raw()]
        }
    }

    impl DeviceQuery for FakeQuery {
        fn queue_families(&self, device: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties> {
            self.get(device)
                .families
                .iter()
                .map(|&(queue_flags, _)| vk::QueueFamilyProperties {
                    queue_flags,
                    queue_count: 1,
                    ..Default::default()
                })
                .collect()
        }

        fn supports_present(
            &self,
            device: vk::PhysicalDevice,
            queue_family: u32,
        ) -> Result<bool, SetupError> {
            Ok(self.get(device).families[queue_family as usize].1)
        }

        fn surface_capabilities(
            &self,
            device: vk::PhysicalDevice,
        ) -> Result<vk::SurfaceCapabilitiesKHR, SetupError> {
            Ok(self.get(device).capabilities)
        }

        fn surface_formats(
            &self,
            device: vk::PhysicalDevice,
        ) -> Result<Vec<vk::SurfaceFormatKHR>, SetupError> {
            let fake = self.get(device);
            if fake.fail_formats {
                return Err(enumeration("surface formats")(vk::Result::ERROR_SURFACE_LOST_KHR));
            }
            Ok(fake.formats.clone())
        }

        fn present_modes(
            &self,
            device: vk::PhysicalDevice,
        ) -> Result<Vec<vk::PresentModeKHR>, SetupError> {
            Ok(self.get(device).present_modes.clone())
        }
    }
}
