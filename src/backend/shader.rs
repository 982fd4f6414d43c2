// Shader module loading and management
//
// Vulkan uses SPIR-V bytecode for shaders. This module reads compiled
// shaders from disk, checks the byte length, and creates shader modules
// that are destroyed as soon as the pipeline holding them has been built.

use super::error::{creation, SetupError};
use ash::vk;
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Pipeline stage a shader file feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    /// Guess the stage from a file name ("triangle.vert.spv" -> Vertex)
    pub fn infer(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        if name.contains("vert") {
            Some(ShaderStage::Vertex)
        } else if name.contains("frag") {
            Some(ShaderStage::Fragment)
        } else {
            None
        }
    }

    pub fn flags(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }
}

/// SPIR-V words read from a file, with the path kept for error reporting
///
/// Only `from_bytes` builds one, so the word list is never empty.
#[derive(Debug, Clone)]
pub struct ShaderBytecode {
    path: PathBuf,
    stage: ShaderStage,
    words: Vec<u32>,
}

impl ShaderBytecode {
    /// Read a compiled shader for `stage` from disk
    pub fn load(path: impl AsRef<Path>, stage: ShaderStage) -> Result<Self, SetupError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| SetupError::ShaderRead {
            path: path.to_path_buf(),
            source,
        })?;

        log::debug!("Read {} bytes of {:?} shader from {}", bytes.len(), stage, path.display());
        Self::from_bytes(path, stage, &bytes)
    }

    /// Validate and convert raw bytes; the length must be a non-zero multiple of 4
    pub fn from_bytes(path: &Path, stage: ShaderStage, bytes: &[u8]) -> Result<Self, SetupError> {
        if let Some(inferred) = ShaderStage::infer(path) {
            if inferred != stage {
                log::warn!(
                    "{} looks like a {:?} shader but is used as {:?}",
                    path.display(),
                    inferred,
                    stage
                );
            }
        }

        let invalid = || SetupError::InvalidBytecode {
            path: path.to_path_buf(),
            len: bytes.len(),
        };

        if bytes.is_empty() {
            return Err(invalid());
        }
        // read_spv rejects lengths that are not whole words and fixes alignment
        let words = ash::util::read_spv(&mut Cursor::new(bytes)).map_err(|_| invalid())?;

        Ok(Self {
            path: path.to_path_buf(),
            stage,
            words,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn byte_len(&self) -> usize {
        self.words.len() * std::mem::size_of::<u32>()
    }

    /// Bytecode that skipped `from_bytes`, for exercising the empty-code guard
    #[cfg(test)]
    pub(crate) fn empty(path: &Path, stage: ShaderStage) -> Self {
        Self {
            path: path.to_path_buf(),
            stage,
            words: Vec::new(),
        }
    }

    /// Words to hand to `vkCreateShaderModule`, which rejects a zero code size
    pub fn code(&self) -> Result<&[u32], SetupError> {
        if self.words.is_empty() {
            return Err(SetupError::InvalidBytecode {
                path: self.path.clone(),
                len: 0,
            });
        }
        Ok(&self.words)
    }
}

/// Shader module that destroys itself on drop
pub struct ShaderModule {
    pub module: vk::ShaderModule,
    pub stage: ShaderStage,
    device: ash::Device,
}

impl ShaderModule {
    pub fn new(device: &ash::Device, bytecode: &ShaderBytecode) -> Result<Self, SetupError> {
        let create_info = vk::ShaderModuleCreateInfo::default().code(bytecode.code()?);

        let module = unsafe { device.create_shader_module(&create_info, None) }
            .map_err(creation("shader module"))?;

        log::debug!(
            "Created {:?} shader module from {} ({} bytes)",
            bytecode.stage(),
            bytecode.path().display(),
            bytecode.byte_len()
        );

        Ok(Self {
            module,
            stage: bytecode.stage(),
            device: device.clone(),
        })
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe { self.device.destroy_shader_module(self.module, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // SPIR-V magic number, little endian, followed by a version word
    const HEADER: [u8; 8] = [0x03, 0x02, 0x23, 0x07, 0x00, 0x00, 0x01, 0x00];

    #[test]
    fn stage_is_inferred_from_the_file_name() {
        assert_eq!(
            ShaderStage::infer(Path::new("shaders/triangle.vert.spv")),
            Some(ShaderStage::Vertex)
        );
        assert_eq!(
            ShaderStage::infer(Path::new("PositionColor.frag")),
            Some(ShaderStage::Fragment)
        );
        assert_eq!(ShaderStage::infer(Path::new("shaders/compute.spv")), None);
    }

    #[test]
    fn zero_length_bytecode_is_rejected() {
        let err = ShaderBytecode::from_bytes(Path::new("empty.vert.spv"), ShaderStage::Vertex, &[])
            .unwrap_err();
        assert!(matches!(err, SetupError::InvalidBytecode { len: 0, .. }));
    }

    #[test]
    fn truncated_bytecode_is_rejected() {
        let err = ShaderBytecode::from_bytes(
            Path::new("cut.frag.spv"),
            ShaderStage::Fragment,
            &HEADER[..6],
        )
        .unwrap_err();
        match err {
            SetupError::InvalidBytecode { path, len } => {
                assert_eq!(path, PathBuf::from("cut.frag.spv"));
                assert_eq!(len, 6);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn whole_words_are_accepted() {
        let bytecode =
            ShaderBytecode::from_bytes(Path::new("ok.vert.spv"), ShaderStage::Vertex, &HEADER)
                .unwrap();
        assert_eq!(bytecode.code().unwrap(), &[0x0723_0203, 0x0001_0000]);
        assert_eq!(bytecode.byte_len(), HEADER.len());
        assert_eq!(bytecode.stage(), ShaderStage::Vertex);
    }

    #[test]
    fn empty_word_list_never_reaches_module_creation() {
        let bytecode = ShaderBytecode::empty(Path::new("hollow.frag.spv"), ShaderStage::Fragment);
        match bytecode.code().unwrap_err() {
            SetupError::InvalidBytecode { path, len } => {
                assert_eq!(path, PathBuf::from("hollow.frag.spv"));
                assert_eq!(len, 0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_file_reports_the_path() {
        let err = ShaderBytecode::load("no/such/shader.vert.spv", ShaderStage::Vertex).unwrap_err();
        match err {
            SetupError::ShaderRead { path, source } => {
                assert_eq!(path, PathBuf::from("no/such/shader.vert.spv"));
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
