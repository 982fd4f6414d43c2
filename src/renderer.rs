// Renderer - owns every Vulkan object created during setup
//
// IMPORTANT: Field order matters for Drop! Rust drops fields top to bottom,
// so they are declared in reverse creation order.

use crate::backend::pipeline::{GraphicsPipeline, PipelineDescriptor};
use crate::backend::probe::{query_swapchain_support, SurfaceProbe};
use crate::backend::select::{select_physical_device, DeviceSelection};
use crate::backend::shader::{ShaderBytecode, ShaderStage};
use crate::backend::swapchain::SwapchainConfig;
use crate::backend::{SetupError, Surface, Swapchain, VulkanDevice, VulkanInstance};
use crate::config::Config;
use crate::frame::{self, FrameLoop};
use anyhow::{Context, Result};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::time::Instant;
use winit::window::Window;

pub struct Renderer {
    frame: FrameLoop,
    pipeline: GraphicsPipeline,
    swapchain: Swapchain,
    device: VulkanDevice,
    _surface: Surface,
    _instance: VulkanInstance,
    started: Instant,
}

impl Renderer {
    /// Run the whole setup chain for `window`
    ///
    /// Any failure unwinds whatever was already created, in reverse order.
    pub fn new(config: &Config, window: &Window) -> Result<Self> {
        log::info!("Initializing Vulkan...");

        let display = window.display_handle().map_err(SetupError::from)?.as_raw();
        let window_handle = window.window_handle().map_err(SetupError::from)?.as_raw();

        // ─────────────────────────────────────────────────────────────────────
        // STEP 1: Instance and surface
        // ─────────────────────────────────────────────────────────────────────
        let instance =
            VulkanInstance::new(&config.window.title, display, config.validation_enabled())
                .context("Failed to create Vulkan instance")?;
        let surface = instance
            .create_surface(display, window_handle)
            .context("Failed to create window surface")?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 2: Pick a GPU that can render and present to this surface
        // ─────────────────────────────────────────────────────────────────────
        let probe = SurfaceProbe {
            instance: &instance.instance,
            surface_loader: &instance.surface_loader,
            surface: surface.handle,
        };

        let devices = instance.physical_devices()?;
        let selection = select_physical_device(&probe, &devices)?;
        let physical_device = match selection {
            DeviceSelection::Selected(device) => device,
            DeviceSelection::NoneQualified { .. } if config.graphics.require_capable_device => {
                selection.require_qualified()?
            }
            DeviceSelection::NoneQualified { .. } => {
                log::warn!(
                    "No GPU fully supports this window, falling back to the first of {}",
                    devices.len()
                );
                selection.device()
            }
        };

        // ─────────────────────────────────────────────────────────────────────
        // STEP 3: Logical device
        // ─────────────────────────────────────────────────────────────────────
        let device = VulkanDevice::new(&instance.instance, &probe, physical_device)
            .context("Failed to create logical device")?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 4: Swapchain
        // ─────────────────────────────────────────────────────────────────────
        let support = query_swapchain_support(&probe, physical_device)?;
        let size = window.inner_size();
        let swapchain_config = SwapchainConfig::negotiate(
            &support,
            device.graphics_queue_family,
            device.present_queue_family,
            vk::Extent2D {
                width: size.width,
                height: size.height,
            },
        )
        .ok_or(SetupError::Unqualified {
            reason: "surface reports no formats",
        })?;

        let swapchain = Swapchain::new(
            &instance.instance,
            &device.device,
            surface.handle,
            &swapchain_config,
        )
        .context("Failed to create swapchain")?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 5: Graphics pipeline
        // ─────────────────────────────────────────────────────────────────────
        let vertex = ShaderBytecode::load(&config.shaders.vertex, ShaderStage::Vertex)?;
        let fragment = ShaderBytecode::load(&config.shaders.fragment, ShaderStage::Fragment)?;

        let pipeline = GraphicsPipeline::new(
            &device.device,
            swapchain.format,
            &vertex,
            &fragment,
            &PipelineDescriptor::default(),
        )
        .context("Failed to assemble graphics pipeline")?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 6: Per-frame resources
        // ─────────────────────────────────────────────────────────────────────
        let frame = FrameLoop::new(&device, &swapchain, &pipeline)
            .context("Failed to create frame resources")?;

        log::info!("Vulkan initialized successfully!");

        Ok(Self {
            frame,
            pipeline,
            swapchain,
            device,
            _surface: surface,
            _instance: instance,
            started: Instant::now(),
        })
    }

    /// Clear to the color for the current time and present
    pub fn render(&mut self) -> Result<bool> {
        let color = frame::clear_color(self.started.elapsed().as_secs_f64());
        self.frame
            .draw(&self.device, &self.swapchain, &self.pipeline, color)
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        // Nothing may still be executing when the fields start dropping
        if let Err(e) = self.device.wait_idle() {
            log::warn!("device_wait_idle failed: {}", e);
        }
    }
}
