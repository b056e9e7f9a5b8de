//! Declarative resources on top of the wrappers
//!
//! The façades here turn a create-info record into a ready-to-use object:
//! [`BufferResource`] and [`ImageResource`] allocate and bind their own memory,
//! [`DescriptorRegistry`] builds a pool with named layouts and sets, and
//! [`DescriptorUpdater`] batches descriptor writes into a single native call.
//! [`ResourceManager`] ties them together behind name-keyed lookups.
//!
//! Every operation either succeeds completely or returns a [`VulkanError`];
//! nothing is rolled back when a multi-step creation fails half way.
//!
//! [`VulkanError`]: crate::error::VulkanError

use ash::vk;
use std::rc::Rc;

use crate::error::{VulkanError, VulkanResult};
use crate::wrapper::{Device, DeviceMemory, PhysicalDevice};

pub mod buffer_resource;
pub mod descriptor_registry;
pub mod descriptor_updater;
pub mod image_resource;
pub mod resource_manager;
pub mod sampler_resource;
pub mod shader_resource;
pub mod texture;

pub use buffer_resource::{BufferResource, BufferResourceCreateInfo};
pub use descriptor_registry::{
    DescriptorLayoutInfo, DescriptorRegistry, DescriptorResourceCreateInfo, DescriptorSetInfo, DescriptorSetLookup,
};
pub use descriptor_updater::{
    BufferWriteRequest, CopySetRequest, DescriptorUpdateInfo, DescriptorUpdateSink, DescriptorUpdater,
    ImageWriteRequest, TexelBufferWriteRequest,
};
pub use image_resource::{
    layout_transition, submit_one_shot, ImageResource, ImageResourceCreateInfo, ImageViewCreateInfo,
    LayoutTransition,
};
pub use resource_manager::{ResourceDescriptor, ResourceManager};
pub use sampler_resource::{
    SamplerAddressing, SamplerComparison, SamplerFiltering, SamplerLod, SamplerResource, SamplerResourceCreateInfo,
};
pub use shader_resource::{
    ShaderBaseType, ShaderLoader, ShaderModuleInfo, ShaderModulesCreateInfo, ShaderResource, SpirvFileLoader,
};
pub use texture::TextureData;

/// Pick a memory type for `requirements`, allocate it and return the allocation
///
/// Selection takes the lowest compatible index and never relaxes `properties`.
pub(crate) fn allocate_bound_memory(
    physical_device: &PhysicalDevice,
    device: &Rc<Device>,
    requirements: &vk::MemoryRequirements,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<DeviceMemory> {
    let memory_type_index = physical_device.find_memory_type(requirements.memory_type_bits, properties)?;
    log::trace!(
        "Allocating {} bytes from memory type {memory_type_index} ({properties:?})",
        requirements.size
    );
    device
        .allocate_memory(requirements.size, memory_type_index)
        .ok_or(VulkanError::BuildFailed { object: "device memory" })
}

/// Bind `memory` to `object` with `bind`, handing both back on success
///
/// On failure the object is released before the memory it was being bound to.
pub(crate) fn bind_or_release<T, M>(
    object: T,
    memory: M,
    bind: impl FnOnce(&T, &M) -> VulkanResult<()>,
) -> VulkanResult<(T, M)> {
    match bind(&object, &memory) {
        Ok(()) => Ok((object, memory)),
        Err(e) => {
            drop(object);
            drop(memory);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    type DropLog = Rc<RefCell<Vec<&'static str>>>;

    struct Tracked(&'static str, DropLog);

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.1.borrow_mut().push(self.0);
        }
    }

    #[test]
    fn test_failed_bind_releases_object_before_memory() {
        let log = DropLog::default();
        let result = bind_or_release(Tracked("buffer", log.clone()), Tracked("memory", log.clone()), |_, _| {
            Err(VulkanError::api("vkBindBufferMemory")(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY))
        });

        assert!(matches!(result, Err(VulkanError::Api { .. })));
        assert_eq!(*log.borrow(), vec!["buffer", "memory"]);
    }

    #[test]
    fn test_successful_bind_keeps_both() {
        let log = DropLog::default();
        let (object, memory) =
            bind_or_release(Tracked("image", log.clone()), Tracked("memory", log.clone()), |_, _| Ok(())).unwrap();
        assert!(log.borrow().is_empty());

        assert_eq!((object.0, memory.0), ("image", "memory"));
    }
}
