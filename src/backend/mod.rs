// Backend module - Vulkan setup chain
//
// instance -> surface -> probe/select -> device -> swapchain -> pipeline.
// Each stage only consumes what the previous ones produced.

pub mod device;
pub mod error;
pub mod instance;
pub mod pipeline;
pub mod probe;
pub mod select;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use device::VulkanDevice;
pub use error::SetupError;
pub use instance::{Surface, VulkanInstance};
pub use swapchain::Swapchain;
