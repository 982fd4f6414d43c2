// Physical device selection
//
// First device in enumeration order that can both render and present to the
// surface with a usable swapchain. When none qualifies the first device is
// handed back as a tagged fallback; the caller decides whether to continue.

use super::error::SetupError;
use super::probe::{find_queue_families, query_swapchain_support, DeviceQuery};
use ash::vk;

/// Outcome of device selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSelection {
    /// A device that passed every capability check
    Selected(vk::PhysicalDevice),
    /// No device passed; this is the first enumerated one, capabilities unknown
    NoneQualified { fallback: vk::PhysicalDevice },
}

impl DeviceSelection {
    /// The device to use, qualified or not
    pub fn device(self) -> vk::PhysicalDevice {
        match self {
            DeviceSelection::Selected(device) => device,
            DeviceSelection::NoneQualified { fallback } => fallback,
        }
    }

    /// Refuse the fallback
    pub fn require_qualified(self) -> Result<vk::PhysicalDevice, SetupError> {
        match self {
            DeviceSelection::Selected(device) => Ok(device),
            DeviceSelection::NoneQualified { .. } => Err(SetupError::Unqualified {
                reason: "no GPU supports both rendering and presenting to this window",
            }),
        }
    }
}

/// Whether `device` has both queue roles and a non-empty format and present-mode list
pub fn is_device_suitable(
    query: &impl DeviceQuery,
    device: vk::PhysicalDevice,
) -> Result<bool, SetupError> {
    let indices = find_queue_families(query, device)?;
    if !indices.is_complete() {
        return Ok(false);
    }

    let support = query_swapchain_support(query, device)?;
    Ok(support.is_adequate())
}

pub fn select_physical_device(
    query: &impl DeviceQuery,
    devices: &[vk::PhysicalDevice],
) -> Result<DeviceSelection, SetupError> {
    let first = *devices.first().ok_or(SetupError::NoPhysicalDevices)?;

    for &device in devices {
        if is_device_suitable(query, device)? {
            return Ok(DeviceSelection::Selected(device));
        }
    }

    Ok(DeviceSelection::NoneQualified { fallback: first })
}
