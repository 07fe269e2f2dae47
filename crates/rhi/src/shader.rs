//! SPIR-V shader modules.
//!
//! Shaders are compiled offline; at runtime a [`Shader`] is created from a
//! `.spv` file under the configured shader directory. A missing or malformed
//! file is a fatal [`RhiError::ShaderError`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::path::Path;
//! use kiln_rhi::device::Device;
//! use kiln_rhi::shader::{Shader, ShaderStage};
//!
//! # fn example(device: Arc<Device>) -> kiln_rhi::RhiResult<()> {
//! let vert = Shader::load(device, Path::new("shaders/spirv"), "forward.vert", ShaderStage::Vertex)?;
//! let _stage = vert.stage_create_info();
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Pipeline stage a shader module is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Path of the compiled module for `name` (e.g. `forward.vert`) in `dir`.
pub fn spirv_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.spv"))
}

/// Decodes little-endian SPIR-V words.
pub fn spirv_words(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    const MAGIC: u32 = 0x0723_0203;

    if bytes.is_empty() || !bytes.len().is_multiple_of(4) {
        return Err(RhiError::ShaderError(format!(
            "SPIR-V length must be a non-zero multiple of 4, got {} bytes",
            bytes.len()
        )));
    }
    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    if words[0] != MAGIC {
        return Err(RhiError::ShaderError(format!(
            "bad SPIR-V magic number {:#010x}",
            words[0]
        )));
    }
    Ok(words)
}

/// Shader module with its stage. The entry point is always `main`.
pub struct Shader {
    device: Arc<Device>,
    module: vk::ShaderModule,
    stage: ShaderStage,
}

impl Shader {
    /// Loads `<dir>/<name>.spv`.
    pub fn load(device: Arc<Device>, dir: &Path, name: &str, stage: ShaderStage) -> RhiResult<Self> {
        let path = spirv_path(dir, name);
        let bytes = std::fs::read(&path).map_err(|e| {
            RhiError::ShaderError(format!("failed to read shader {}: {}", path.display(), e))
        })?;
        Self::from_spirv_bytes(device, &bytes, stage).map_err(|e| match e {
            RhiError::ShaderError(msg) => {
                RhiError::ShaderError(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn from_spirv_bytes(device: Arc<Device>, bytes: &[u8], stage: ShaderStage) -> RhiResult<Self> {
        let code = spirv_words(bytes)?;
        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
        // SAFETY: `code` holds validated SPIR-V words.
        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };
        debug!("Created {} shader module ({} words)", stage, code.len());
        Ok(Self {
            device,
            module,
            stage,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.module)
            .name(c"main")
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        // SAFETY: modules are only needed during pipeline creation.
        unsafe { self.device.handle().destroy_shader_module(self.module, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_stage_to_vk_stage() {
        assert_eq!(ShaderStage::Vertex.to_vk_stage(), vk::ShaderStageFlags::VERTEX);
        assert_eq!(
            ShaderStage::Fragment.to_vk_stage(),
            vk::ShaderStageFlags::FRAGMENT
        );
        assert_eq!(format!("{}", ShaderStage::Fragment), "fragment");
    }

    #[test]
    fn test_spirv_path_appends_extension() {
        let path = spirv_path(Path::new("shaders/spirv"), "composite.frag");
        assert_eq!(path, Path::new("shaders/spirv/composite.frag.spv"));
    }

    #[test]
    fn test_spirv_words_rejects_misaligned_input() {
        assert!(matches!(spirv_words(&[0u8; 5]), Err(RhiError::ShaderError(_))));
        assert!(spirv_words(&[]).is_err());
    }

    #[test]
    fn test_spirv_words_checks_magic() {
        let mut bytes = 0x0723_0203u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0, 0, 1, 0]);
        let words = spirv_words(&bytes).unwrap();
        assert_eq!(words.len(), 2);

        assert!(spirv_words(&[1, 2, 3, 4]).is_err());
    }
}
