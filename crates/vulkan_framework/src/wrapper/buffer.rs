//! Buffers and their builder

use ash::vk;
use std::rc::Rc;

use super::device::Device;
use super::memory::DeviceMemory;
use super::object::GpuObject;
use crate::error::{VulkanError, VulkanResult};

/// Buffer object without bound memory
///
/// Memory is bound separately through [`Buffer::bind_memory`]; see
/// `framework::BufferResource` for the combined path.
pub struct Buffer {
    object: GpuObject<Device, vk::Buffer>,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
}

impl Buffer {
    /// Native handle
    pub fn handle(&self) -> vk::Buffer {
        self.object.handle()
    }

    /// Whether the native handle is non-null
    pub fn is_valid(&self) -> bool {
        self.object.is_valid()
    }

    /// Size requested at creation
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Usage flags requested at creation
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    /// Size, alignment and acceptable memory types
    pub fn memory_requirements(&self) -> VulkanResult<vk::MemoryRequirements> {
        let device = self.object.require_parent()?;
        Ok(unsafe { device.raw().get_buffer_memory_requirements(self.handle()) })
    }

    /// Bind `memory` at `offset`
    pub fn bind_memory(&self, memory: &DeviceMemory, offset: vk::DeviceSize) -> VulkanResult<()> {
        let device = self.object.require_parent()?;
        unsafe {
            device
                .raw()
                .bind_buffer_memory(self.handle(), memory.handle(), offset)
                .map_err(VulkanError::api("vkBindBufferMemory"))
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.object.release_with(|device, handle| unsafe {
            device.raw().destroy_buffer(handle, None);
        });
    }
}

/// Builder for [`Buffer`]
///
/// Defaults: size 0, no usage, exclusive sharing.
#[derive(Debug, Clone)]
pub struct BufferBuilder {
    flags: vk::BufferCreateFlags,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    sharing_mode: vk::SharingMode,
    queue_family_indices: Vec<u32>,
}

impl Default for BufferBuilder {
    fn default() -> Self {
        Self {
            flags: vk::BufferCreateFlags::empty(),
            size: 0,
            usage: vk::BufferUsageFlags::empty(),
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            queue_family_indices: Vec::new(),
        }
    }
}

impl BufferBuilder {
    /// Start from the defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Creation flags
    pub fn set_flags(&mut self, flags: vk::BufferCreateFlags) -> &mut Self {
        self.flags = flags;
        self
    }

    /// Size in bytes
    pub fn set_size(&mut self, size: vk::DeviceSize) -> &mut Self {
        self.size = size;
        self
    }

    /// Usage flags
    pub fn set_usage(&mut self, usage: vk::BufferUsageFlags) -> &mut Self {
        self.usage = usage;
        self
    }

    /// Sharing mode; concurrent sharing also needs queue family indices
    pub fn set_sharing_mode(&mut self, sharing_mode: vk::SharingMode) -> &mut Self {
        self.sharing_mode = sharing_mode;
        self
    }

    /// Queue families sharing the buffer in concurrent mode
    pub fn set_queue_family_indices(&mut self, indices: &[u32]) -> &mut Self {
        self.queue_family_indices = indices.to_vec();
        self
    }

    /// Create the buffer on `device`
    pub fn build(&self, device: &Rc<Device>) -> Option<Buffer> {
        let create_info = vk::BufferCreateInfo::builder()
            .flags(self.flags)
            .size(self.size)
            .usage(self.usage)
            .sharing_mode(self.sharing_mode)
            .queue_family_indices(&self.queue_family_indices);

        match unsafe { device.raw().create_buffer(&create_info, None) } {
            Ok(handle) => Some(Buffer {
                object: GpuObject::new(device, handle),
                size: self.size,
                usage: self.usage,
            }),
            Err(result) => {
                log::error!("Failed to create buffer of {} bytes: {result}", self.size);
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
    fn test_builder_defaults() {
        let builder = BufferBuilder::new();
        assert_eq!(builder.sharing_mode, vk::SharingMode::EXCLUSIVE);
        assert_eq!(builder.size, 0);
        assert!(builder.queue_family_indices.is_empty());
    }

    #[test]
    fn test_buffer_requirements_cover_size() {
        let Some(gpu) = headless() else {
            return;
        };
        let buffer = BufferBuilder::new()
            .set_size(256)
            .set_usage(vk::BufferUsageFlags::UNIFORM_BUFFER)
            .build(&gpu.device)
            .unwrap();
        let requirements = buffer.memory_requirements().unwrap();
        assert!(requirements.size >= 256);
        assert_ne!(requirements.memory_type_bits, 0);
    }
}
