// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// Negotiation is pure (`SwapchainConfig::negotiate`); creation turns the
// config into a swapchain and one image view per image the driver returns.

use super::error::{creation, enumeration, SetupError};
use super::probe::SwapchainSupportDetails;
use ash::{khr, vk};

/// Marker in `current_extent` meaning "the swapchain decides the size"
pub const UNDEFINED_EXTENT: u32 = u32::MAX;

/// How swapchain images are shared between queue families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSharing {
    Exclusive,
    Concurrent { graphics: u32, present: u32 },
}

impl ImageSharing {
    pub fn for_queues(graphics: u32, present: u32) -> Self {
        if graphics == present {
            ImageSharing::Exclusive
        } else {
            ImageSharing::Concurrent { graphics, present }
        }
    }

    pub fn mode(&self) -> vk::SharingMode {
        match self {
            ImageSharing::Exclusive => vk::SharingMode::EXCLUSIVE,
            ImageSharing::Concurrent { .. } => vk::SharingMode::CONCURRENT,
        }
    }

    pub fn queue_family_indices(&self) -> Vec<u32> {
        match *self {
            ImageSharing::Exclusive => Vec::new(),
            ImageSharing::Concurrent { graphics, present } => vec![graphics, present],
        }
    }
}

/// Everything the swapchain create call needs, derived from device support
#[derive(Debug, Clone, Copy)]
pub struct SwapchainConfig {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub sharing: ImageSharing,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainConfig {
    /// Derive the configuration from device support and the window's pixel size
    ///
    /// Returns `None` when the device reported no surface formats.
    pub fn negotiate(
        support: &SwapchainSupportDetails,
        graphics_queue_family: u32,
        present_queue_family: u32,
        window_size: vk::Extent2D,
    ) -> Option<Self> {
        let caps = &support.capabilities;
        Some(Self {
            surface_format: choose_surface_format(&support.formats)?,
            present_mode: choose_present_mode(&support.present_modes),
            extent: choose_extent(caps, window_size),
            image_count: choose_image_count(caps),
            sharing: ImageSharing::for_queues(graphics_queue_family, present_queue_family),
            pre_transform: caps.current_transform,
        })
    }
}

/// BGRA8 sRGB in the non-linear sRGB color space, else the first format
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

/// MAILBOX anywhere in the list, else FIFO (always supported)
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    present_modes
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, window_size: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != UNDEFINED_EXTENT {
        return caps.current_extent;
    }

    vk::Extent2D {
        width: window_size
            .width
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: window_size
            .height
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// One more than the minimum, capped by a non-zero maximum (zero means unbounded)
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let image_count = caps.min_image_count + 1;
    if caps.max_image_count > 0 && image_count > caps.max_image_count {
        caps.max_image_count
    } else {
        image_count
    }
}

/// Swapchain plus its image views, destroyed on drop (views first)
pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: khr::swapchain::Device,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    device: ash::Device,
}

impl Swapchain {
    pub fn new(
        instance: &ash::Instance,
        device: &ash::Device,
        surface: vk::SurfaceKHR,
        config: &SwapchainConfig,
    ) -> Result<Self, SetupError> {
        log::info!(
            "Creating swapchain: {}x{}, {:?} / {:?}, {:?}, {} images requested, {:?}",
            config.extent.width,
            config.extent.height,
            config.surface_format.format,
            config.surface_format.color_space,
            config.present_mode,
            config.image_count,
            config.sharing
        );

        let swapchain_loader = khr::swapchain::Device::new(instance, device);

        let queue_family_indices = config.sharing.queue_family_indices();
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(config.image_count)
            .image_format(config.surface_format.format)
            .image_color_space(config.surface_format.color_space)
            .image_extent(config.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(config.sharing.mode())
            .queue_family_indices(&queue_family_indices)
            .pre_transform(config.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(config.present_mode)
            .clipped(true);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(creation("swapchain"))?;

        let mut this = Self {
            swapchain,
            swapchain_loader,
            images: Vec::new(),
            image_views: Vec::new(),
            format: config.surface_format.format,
            extent: config.extent,
            device: device.clone(),
        };

        // The driver may hand back more images than we asked for
        this.images = unsafe { this.swapchain_loader.get_swapchain_images(swapchain) }
            .map_err(enumeration("swapchain images"))?;
        if this.images.len() != config.image_count as usize {
            log::debug!(
                "Swapchain returned {} images ({} requested)",
                this.images.len(),
                config.image_count
            );
        }

        // Views are pushed one by one so a failure still destroys the earlier ones
        this.image_views.reserve(this.images.len());
        for &image in &this.images {
            let view = create_image_view(device, image, this.format)?;
            this.image_views.push(view);
        }

        log::info!("Created swapchain with {} images", this.images.len());

        Ok(this)
    }

    /// Acquire the next image, `None` when the swapchain is out of date
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<Option<u32>, vk::Result> {
        let result = unsafe {
            self.swapchain_loader
                .acquire_next_image(self.swapchain, u64::MAX, semaphore, vk::Fence::null())
        };

        match result {
            Ok((index, _suboptimal)) => Ok(Some(index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Present rendered image to screen
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<(), vk::Result> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.swapchain_loader.queue_present(queue, &present_info) } {
            Ok(_) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
) -> Result<vk::ImageView, SetupError> {
    let create_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe { device.create_image_view(&create_info, None) }.map_err(creation("image view"))
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::probe::fake::{handle, FakeDevice, FakeQuery};
    use crate::backend::probe::{find_queue_families, query_swapchain_support};
    use crate::backend::select::select_physical_device;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    /// Compare choices as plain (format, color space) pairs
    fn key(format: Option<vk::SurfaceFormatKHR>) -> Option<(vk::Format, vk::ColorSpaceKHR)> {
        format.map(|f| (f.format, f.color_space))
    }

    fn bounded_caps(min_image_count: u32, max_image_count: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count,
            max_image_count,
            current_extent: vk::Extent2D {
                width: UNDEFINED_EXTENT,
                height: UNDEFINED_EXTENT,
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
        }
    }

    fn size(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn prefers_bgra_srgb_nonlinear_even_when_later() {
        let preferred = format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT),
            preferred,
        ];
        assert_eq!(key(choose_surface_format(&formats)), key(Some(preferred)));
    }

    #[test]
    fn srgb_format_in_wrong_color_space_is_not_preferred() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
        ];
        assert_eq!(key(choose_surface_format(&formats)), key(Some(formats[0])));
    }

    #[test]
    fn no_formats_means_no_choice() {
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn mailbox_is_found_anywhere_in_the_list() {
        let modes = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
        ];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn fifo_without_mailbox() {
        let modes = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO_RELAXED];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::FIFO);
        assert_eq!(choose_present_mode(&[]), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn undefined_extent_follows_the_window() {
        let caps = bounded_caps(2, 0);
        assert_eq!(choose_extent(&caps, size(800, 600)), size(800, 600));
    }

    #[test]
    fn undefined_extent_is_clamped_per_axis() {
        let caps = bounded_caps(2, 0);
        assert_eq!(choose_extent(&caps, size(10, 10)), size(100, 100));
        assert_eq!(choose_extent(&caps, size(10, 5000)), size(100, 4096));
    }

    #[test]
    fn fixed_extent_is_used_verbatim() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: size(1920, 1080),
            ..bounded_caps(2, 0)
        };
        assert_eq!(choose_extent(&caps, size(800, 600)), size(1920, 1080));
    }

    #[test]
    fn image_count_is_min_plus_one_clamped_to_max() {
        assert_eq!(choose_image_count(&bounded_caps(2, 0)), 3);
        assert_eq!(choose_image_count(&bounded_caps(2, 2)), 2);
        assert_eq!(choose_image_count(&bounded_caps(2, 8)), 3);
    }

    #[test]
    fn sharing_depends_on_queue_families() {
        let exclusive = ImageSharing::for_queues(1, 1);
        assert_eq!(exclusive.mode(), vk::SharingMode::EXCLUSIVE);
        assert!(exclusive.queue_family_indices().is_empty());

        let concurrent = ImageSharing::for_queues(0, 2);
        assert_eq!(concurrent.mode(), vk::SharingMode::CONCURRENT);
        assert_eq!(concurrent.queue_family_indices(), vec![0, 2]);
    }

    #[test]
    fn capable_device_flows_into_swapchain_config() {
        let split = FakeDevice {
            families: vec![
                (vk::QueueFlags::GRAPHICS, false),
                (vk::QueueFlags::COMPUTE, true),
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
            ..FakeDevice::capable()
        };
        let incapable = FakeDevice {
            formats: vec![],
            ..FakeDevice::capable()
        };
        let query = FakeQuery::default().with(1, incapable).with(2, split);

        let device = select_physical_device(&query, &[handle(1), handle(2)])
            .unwrap()
            .require_qualified()
            .unwrap();
        assert_eq!(device, handle(2));

        let (graphics, present) = find_queue_families(&query, device)
            .unwrap()
            .complete()
            .unwrap();
        let support = query_swapchain_support(&query, device).unwrap();
        let config =
            SwapchainConfig::negotiate(&support, graphics, present, size(800, 600)).unwrap();

        assert_eq!(config.surface_format.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(config.surface_format.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        assert_eq!(config.present_mode, vk::PresentModeKHR::MAILBOX);
        assert_eq!(config.extent, size(800, 600));
        assert_eq!(config.image_count, 3);
        assert_eq!(
            config.sharing,
            ImageSharing::Concurrent {
                graphics: 0,
                present: 1
            }
        );
    }
}
