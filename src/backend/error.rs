// Setup error taxonomy
//
// Every backend stage returns one of these. Nothing here is retried: the
// first error aborts setup and is reported upward as a fatal status.

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("failed to load the Vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),

    /// A count or list query returned an error status
    #[error("failed to enumerate {what}: {result}")]
    Enumeration {
        what: &'static str,
        #[source]
        result: vk::Result,
    },

    #[error("no Vulkan-capable GPU found")]
    NoPhysicalDevices,

    /// The selected device cannot do what setup needs (usually the fallback device)
    #[error("selected GPU is unusable: {reason}")]
    Unqualified { reason: &'static str },

    #[error("failed to create {what}: {result}")]
    Creation {
        what: &'static str,
        #[source]
        result: vk::Result,
    },

    #[error("failed to read shader file {}", .path.display())]
    ShaderRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "shader file {} holds {len} bytes, SPIR-V needs a non-zero multiple of 4",
        .path.display()
    )]
    InvalidBytecode { path: PathBuf, len: usize },

    #[error("window handle unavailable: {0}")]
    WindowHandle(#[from] raw_window_handle::HandleError),
}

/// Adapter for `map_err` on enumeration queries
pub(crate) fn enumeration(what: &'static str) -> impl FnOnce(vk::Result) -> SetupError {
    move |result| SetupError::Enumeration { what, result }
}

/// Adapter for `map_err` on object creation calls
pub(crate) fn creation(what: &'static str) -> impl FnOnce(vk::Result) -> SetupError {
    move |result| SetupError::Creation { what, result }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creation_errors_name_the_object() {
        let err = creation("render pass")(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        assert!(matches!(err, SetupError::Creation { what: "render pass", .. }));
        assert!(err.to_string().starts_with("failed to create render pass"));
    }

    #[test]
    fn shader_read_errors_carry_the_path() {
        let err = SetupError::ShaderRead {
            path: PathBuf::from("shaders/missing.vert.spv"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.to_string().contains("shaders/missing.vert.spv"));
    }
}
