//! SPIR-V loading and named shader modules

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::error::{VulkanError, VulkanResult};
use crate::wrapper::{Device, ShaderModule, ShaderModuleBuilder};

/// Source language the SPIR-V was compiled from
///
/// Selects the `glsl/spirv/` or `hlsl/spirv/` subdirectory under the shader root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShaderBaseType {
    /// GLSL sources
    #[default]
    Glsl,
    /// HLSL sources
    Hlsl,
}

impl ShaderBaseType {
    /// Output directory relative to the shader root
    pub fn spirv_dir(self) -> &'static str {
        match self {
            Self::Glsl => "glsl/spirv",
            Self::Hlsl => "hlsl/spirv",
        }
    }
}

/// Source of SPIR-V words by file name
pub trait ShaderLoader {
    /// Load `file_name` as SPIR-V words
    fn load_spirv(&self, file_name: &str) -> VulkanResult<Vec<u32>>;
}

/// Reads SPIR-V binaries from `<root>/<glsl|hlsl>/spirv/`
#[derive(Debug, Clone)]
pub struct SpirvFileLoader {
    base_path: PathBuf,
}

impl SpirvFileLoader {
    /// Loader rooted at `root` for `shader_type` output
    pub fn new(root: impl AsRef<Path>, shader_type: ShaderBaseType) -> Self {
        Self {
            base_path: root.as_ref().join(shader_type.spirv_dir()),
        }
    }

    /// Directory binaries are read from
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

impl ShaderLoader for SpirvFileLoader {
    fn load_spirv(&self, file_name: &str) -> VulkanResult<Vec<u32>> {
        let path = self.base_path.join(file_name);
        let shader_error = |reason: String| VulkanError::ShaderLoad {
            path: path.clone(),
            reason,
        };
        let mut file = File::open(&path).map_err(|e| shader_error(e.to_string()))?;
        let words = ash::util::read_spv(&mut file).map_err(|e| shader_error(e.to_string()))?;
        log::trace!("Loaded {} SPIR-V words from {}", words.len(), path.display());
        Ok(words)
    }
}

/// One shader module to load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderModuleInfo {
    /// Registry key
    pub name: String,
    /// File name under the loader's directory
    pub file_name: String,
}

/// Shader modules to load from one directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderModulesCreateInfo {
    /// Shader root; the language subdirectory is appended
    pub base_path: PathBuf,
    /// Which compiler output to read
    pub shader_type: ShaderBaseType,
    /// Modules to create
    pub modules: Vec<ShaderModuleInfo>,
}

impl ShaderModulesCreateInfo {
    /// Add a module
    pub fn with_module(mut self, name: impl Into<String>, file_name: impl Into<String>) -> Self {
        self.modules.push(ShaderModuleInfo {
            name: name.into(),
            file_name: file_name.into(),
        });
        self
    }
}

/// Shader modules keyed by name
#[derive(Default)]
pub struct ShaderResource {
    modules: HashMap<String, ShaderModule>,
}

impl ShaderResource {
    /// Empty set of modules
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every module in `info` from disk
    pub fn create_shaders(&mut self, device: &Rc<Device>, info: &ShaderModulesCreateInfo) -> VulkanResult<()> {
        let loader = SpirvFileLoader::new(&info.base_path, info.shader_type);
        self.create_shaders_with(device, info, &loader)
    }

    /// Load every module in `info` through `loader`
    ///
    /// Modules created before a failure stay registered.
    pub fn create_shaders_with(
        &mut self,
        device: &Rc<Device>,
        info: &ShaderModulesCreateInfo,
        loader: &dyn ShaderLoader,
    ) -> VulkanResult<()> {
        for module in &info.modules {
            let code = loader.load_spirv(&module.file_name)?;
            let shader = ShaderModuleBuilder::new()
                .set_code(&code)
                .build(device)
                .ok_or(VulkanError::BuildFailed { object: "shader module" })?;
            log::debug!("Created shader module '{}' from {}", module.name, module.file_name);
            self.modules.insert(module.name.clone(), shader);
        }
        Ok(())
    }

    /// Module registered under `name`
    pub fn shader_module(&self, name: &str) -> VulkanResult<&ShaderModule> {
        self.modules
            .get(name)
            .ok_or_else(|| VulkanError::not_found("shader module", name))
    }

    /// Drop the module registered under `name`
    pub fn delete_shader_module(&mut self, name: &str) -> VulkanResult<()> {
        self.modules
            .remove(name)
            .map(drop)
            .ok_or_else(|| VulkanError::not_found("shader module", name))
    }

    /// Number of registered modules
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether no module is registered
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
