//! Shader modules

use ash::vk;
use std::rc::Rc;

use super::device::Device;
use super::object::GpuObject;

/// Compiled SPIR-V module
pub struct ShaderModule {
    object: GpuObject<Device, vk::ShaderModule>,
}

impl ShaderModule {
    /// Native handle
    pub fn handle(&self) -> vk::ShaderModule {
        self.object.handle()
    }

    /// Whether the native handle is non-null
    pub fn is_valid(&self) -> bool {
        self.object.is_valid()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        self.object.release_with(|device, handle| unsafe {
            device.raw().destroy_shader_module(handle, None);
        });
    }
}

/// Builder for [`ShaderModule`]
#[derive(Debug, Clone, Default)]
pub struct ShaderModuleBuilder {
    flags: vk::ShaderModuleCreateFlags,
    code: Vec<u32>,
}

impl ShaderModuleBuilder {
    /// Empty module
    pub fn new() -> Self {
        Self::default()
    }

    /// Creation flags
    pub fn set_flags(&mut self, flags: vk::ShaderModuleCreateFlags) -> &mut Self {
        self.flags = flags;
        self
    }

    /// SPIR-V words, copied into the builder
    pub fn set_code(&mut self, code: &[u32]) -> &mut Self {
        self.code = code.to_vec();
        self
    }

    /// Create the module on `device`
    pub fn build(&self, device: &Rc<Device>) -> Option<ShaderModule> {
        if self.code.is_empty() {
            log::error!("Refusing to create a shader module without code");
            return None;
        }
        let create_info = vk::ShaderModuleCreateInfo::builder()
            .flags(self.flags)
            .code(&self.code);

        match unsafe { device.raw().create_shader_module(&create_info, None) } {
            Ok(handle) => Some(ShaderModule {
                object: GpuObject::new(device, handle),
            }),
            Err(result) => {
                log::error!("Failed to create shader module ({} words): {result}", self.code.len());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wrapper::test_support::headless;

    #[test]
    fn test_set_code_copies_words() {
        let words = [0x0723_0203_u32, 0x0001_0000];
        let mut builder = ShaderModuleBuilder::new();
        builder.set_code(&words);
        assert_eq!(builder.code, words);
    }

    #[test]
    fn test_empty_code_is_rejected() {
        let Some(gpu) = headless() else {
            return;
        };
        assert!(ShaderModuleBuilder::new().build(&gpu.device).is_none());
    }
}
