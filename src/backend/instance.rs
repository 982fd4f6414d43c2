// Vulkan Instance - loader, instance, debug messenger and window surface
//
// Responsibilities:
// - Load the Vulkan library and report the loader version
// - Merge the window system's required extensions with our own
// - Request the validation layer when it is installed
// - Create the presentation surface for a window

use super::error::{creation, enumeration, SetupError};
use ash::{ext, khr, vk, Entry};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::{c_char, CStr, CString};

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

const ENGINE_NAME: &CStr = c"clear-renderer";

/// Instance-level extension needed to see portability (MoltenVK) drivers
#[cfg(any(target_os = "macos", target_os = "ios"))]
const PORTABILITY_EXTENSIONS: &[&CStr] = &[khr::portability_enumeration::NAME];
#[cfg(not(any(target_os = "macos", target_os = "ios")))]
const PORTABILITY_EXTENSIONS: &[&CStr] = &[];

/// Vulkan instance wrapper, destroys the messenger and instance on drop
pub struct VulkanInstance {
    pub entry: Entry,
    pub instance: ash::Instance,
    pub surface_loader: khr::surface::Instance,
    debug_utils: Option<(ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    /// Create the instance for a window living on `display`
    ///
    /// `enable_validation` asks for the validation layer; a missing layer
    /// degrades to a warning.
    pub fn new(
        app_name: &str,
        display: RawDisplayHandle,
        enable_validation: bool,
    ) -> Result<Self, SetupError> {
        let entry = unsafe { Entry::load() }?;

        log_loader_version(&entry);

        let validation = enable_validation && validation_layer_available(&entry);

        // The window system tells us which surface extensions it needs
        let platform_extensions = ash_window::enumerate_required_extensions(display)
            .map_err(enumeration("required surface extensions"))?
            .iter()
            .map(|&ptr| unsafe { CStr::from_ptr(ptr) })
            .collect::<Vec<_>>();

        let extensions = merge_instance_extensions(&platform_extensions, validation);
        for ext in &extensions {
            log::debug!("Instance extension: {}", ext.to_string_lossy());
        }
        let extension_ptrs: Vec<*const c_char> = extensions.iter().map(|e| e.as_ptr()).collect();

        let layer_ptrs: Vec<*const c_char> = if validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let app_name_cstr = CString::new(app_name).unwrap_or_else(|_| CString::from(ENGINE_NAME));
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(ENGINE_NAME)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_0);

        let flags = if PORTABILITY_EXTENSIONS.is_empty() {
            vk::InstanceCreateFlags::empty()
        } else {
            vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR
        };

        let create_info = vk::InstanceCreateInfo::default()
            .flags(flags)
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .map_err(creation("Vulkan instance"))?;

        let surface_loader = khr::surface::Instance::new(&entry, &instance);

        let mut this = Self {
            entry,
            instance,
            surface_loader,
            debug_utils: None,
        };

        if validation {
            this.debug_utils = diagnostic(this.setup_debug_messenger());
        }

        Ok(this)
    }

    fn setup_debug_messenger(
        &self,
    ) -> Result<(ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT), SetupError> {
        let debug_utils = ext::debug_utils::Instance::new(&self.entry, &self.instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .map_err(creation("debug messenger"))?;

        Ok((debug_utils, messenger))
    }

    /// Create a presentation surface for a native window
    pub fn create_surface(
        &self,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> Result<Surface, SetupError> {
        let handle = unsafe {
            ash_window::create_surface(&self.entry, &self.instance, display, window, None)
        }
        .map_err(creation("window surface"))?;

        Ok(Surface {
            handle,
            loader: self.surface_loader.clone(),
        })
    }

    /// All physical devices in driver enumeration order
    pub fn physical_devices(&self) -> Result<Vec<vk::PhysicalDevice>, SetupError> {
        unsafe { self.instance.enumerate_physical_devices() }
            .map_err(enumeration("physical devices"))
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Window surface, destroyed on drop (must go before the instance)
pub struct Surface {
    pub handle: vk::SurfaceKHR,
    loader: khr::surface::Instance,
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_surface(self.handle, None) };
    }
}

/// Validation output is diagnostic only: a failure to set it up is logged, not fatal
fn diagnostic<T>(result: Result<T, SetupError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("{}, continuing without validation output", e);
            None
        }
    }
}

/// Window-system extensions, our portability extension and debug utils, without duplicates
pub fn merge_instance_extensions(
    platform: &[&'static CStr],
    debug_utils: bool,
) -> Vec<&'static CStr> {
    let debug: &[&'static CStr] = if debug_utils {
        &[ext::debug_utils::NAME]
    } else {
        &[]
    };

    let mut merged: Vec<&'static CStr> = Vec::with_capacity(platform.len() + 2);
    for &name in platform.iter().chain(PORTABILITY_EXTENSIONS).chain(debug) {
        if !merged.contains(&name) {
            merged.push(name);
        }
    }
    merged
}

fn log_loader_version(entry: &Entry) {
    match unsafe { entry.try_enumerate_instance_version() } {
        Ok(version) => {
            // A 1.0 loader has no vkEnumerateInstanceVersion
            let version = version.unwrap_or(vk::API_VERSION_1_0);
            log::info!(
                "Vulkan loader version: {}.{}.{}",
                vk::api_version_major(version),
                vk::api_version_minor(version),
                vk::api_version_patch(version)
            );
        }
        Err(e) => log::warn!("Failed to query Vulkan version: {}", e),
    }
}

fn validation_layer_available(entry: &Entry) -> bool {
    let available = unsafe { entry.enumerate_instance_layer_properties() }
        .map(|layers| {
            layers
                .iter()
                .any(|layer| layer.layer_name_as_c_str() == Ok(VALIDATION_LAYER))
        })
        .unwrap_or(false);

    if !available {
        log::warn!(
            "{} unavailable, continuing without validation",
            VALIDATION_LAYER.to_string_lossy()
        );
    }
    available
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}
