//! Descriptor pools, set layouts and sets

use ash::vk;
use std::rc::Rc;

use super::device::Device;
use super::object::GpuObject;
use crate::error::{VulkanError, VulkanResult};

/// Descriptor set layout
pub struct DescriptorSetLayout {
    object: GpuObject<Device, vk::DescriptorSetLayout>,
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayout {
    /// Native handle
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.object.handle()
    }

    /// Whether the native handle is non-null
    pub fn is_valid(&self) -> bool {
        self.object.is_valid()
    }

    /// Bindings the layout was created with
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        self.object.release_with(|device, handle| unsafe {
            device.raw().destroy_descriptor_set_layout(handle, None);
        });
    }
}

/// Builder for [`DescriptorSetLayout`]
#[derive(Debug, Clone, Default)]
pub struct DescriptorSetLayoutBuilder {
    flags: vk::DescriptorSetLayoutCreateFlags,
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayoutBuilder {
    /// Empty layout
    pub fn new() -> Self {
        Self::default()
    }

    /// Creation flags
    pub fn set_flags(&mut self, flags: vk::DescriptorSetLayoutCreateFlags) -> &mut Self {
        self.flags = flags;
        self
    }

    /// Add a binding of `count` descriptors of `descriptor_type`
    pub fn add_binding(
        &mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        count: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> &mut Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(count)
                .stage_flags(stage_flags)
                .build(),
        );
        self
    }

    /// Add prepared bindings
    pub fn add_bindings<I>(&mut self, bindings: I) -> &mut Self
    where
        I: IntoIterator<Item = vk::DescriptorSetLayoutBinding>,
    {
        self.bindings.extend(bindings);
        self
    }

    /// Add a single uniform buffer binding
    pub fn add_uniform_buffer(&mut self, binding: u32, stage_flags: vk::ShaderStageFlags) -> &mut Self {
        self.add_binding(binding, vk::DescriptorType::UNIFORM_BUFFER, 1, stage_flags)
    }

    /// Add a single combined image sampler binding
    pub fn add_combined_image_sampler(&mut self, binding: u32, stage_flags: vk::ShaderStageFlags) -> &mut Self {
        self.add_binding(binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1, stage_flags)
    }

    /// Add a single storage buffer binding
    pub fn add_storage_buffer(&mut self, binding: u32, stage_flags: vk::ShaderStageFlags) -> &mut Self {
        self.add_binding(binding, vk::DescriptorType::STORAGE_BUFFER, 1, stage_flags)
    }

    /// Create the layout on `device`
    pub fn build(&self, device: &Rc<Device>) -> Option<DescriptorSetLayout> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::builder()
            .flags(self.flags)
            .bindings(&self.bindings);

        match unsafe { device.raw().create_descriptor_set_layout(&create_info, None) } {
            Ok(handle) => Some(DescriptorSetLayout {
                object: GpuObject::new(device, handle),
                bindings: self.bindings.clone(),
            }),
            Err(result) => {
                log::error!("Failed to create descriptor set layout: {result}");
                None
            }
        }
    }
}

/// Pool that descriptor sets are allocated from
pub struct DescriptorPool {
    object: GpuObject<Device, vk::DescriptorPool>,
    flags: vk::DescriptorPoolCreateFlags,
}

impl DescriptorPool {
    /// Native handle
    pub fn handle(&self) -> vk::DescriptorPool {
        self.object.handle()
    }

    /// Whether the native handle is non-null
    pub fn is_valid(&self) -> bool {
        self.object.is_valid()
    }

    /// Owning device, `None` if dropped
    pub fn device(&self) -> Option<Rc<Device>> {
        self.object.parent()
    }

    /// Whether sets may be returned to the pool one by one
    pub fn frees_individual_sets(&self) -> bool {
        self.flags
            .contains(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
    }

    /// Allocate one set per entry of `layouts`
    pub fn create_descriptor_sets(
        self: &Rc<Self>,
        layouts: &[vk::DescriptorSetLayout],
    ) -> VulkanResult<Vec<DescriptorSet>> {
        let device = self.object.require_parent()?;
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.handle())
            .set_layouts(layouts);

        let handles = unsafe {
            device
                .raw()
                .allocate_descriptor_sets(&alloc_info)
                .map_err(VulkanError::api("vkAllocateDescriptorSets"))?
        };
        Ok(handles
            .into_iter()
            .map(|handle| DescriptorSet {
                object: GpuObject::new(self, handle),
            })
            .collect())
    }

    /// Return every set allocated from this pool
    ///
    /// Any [`DescriptorSet`] wrappers still alive hold stale handles afterwards.
    pub fn reset(&self) -> VulkanResult<()> {
        let device = self.object.require_parent()?;
        unsafe {
            device
                .raw()
                .reset_descriptor_pool(self.handle(), vk::DescriptorPoolResetFlags::empty())
                .map_err(VulkanError::api("vkResetDescriptorPool"))
        }
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        self.object.release_with(|device, handle| unsafe {
            device.raw().destroy_descriptor_pool(handle, None);
        });
    }
}

/// Builder for [`DescriptorPool`]
///
/// Defaults: one set, no pool sizes, `FREE_DESCRIPTOR_SET` so individual sets
/// can be released.
#[derive(Debug, Clone)]
pub struct DescriptorPoolBuilder {
    flags: vk::DescriptorPoolCreateFlags,
    max_sets: u32,
    pool_sizes: Vec<vk::DescriptorPoolSize>,
}

impl Default for DescriptorPoolBuilder {
    fn default() -> Self {
        Self {
            flags: vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET,
            max_sets: 1,
            pool_sizes: Vec::new(),
        }
    }
}

impl DescriptorPoolBuilder {
    /// Start from the defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Creation flags
    pub fn set_flags(&mut self, flags: vk::DescriptorPoolCreateFlags) -> &mut Self {
        self.flags = flags;
        self
    }

    /// Maximum number of sets allocated at once
    pub fn set_max_sets(&mut self, max_sets: u32) -> &mut Self {
        self.max_sets = max_sets;
        self
    }

    /// Reserve `count` descriptors of `descriptor_type`
    pub fn add_pool_size(&mut self, descriptor_type: vk::DescriptorType, count: u32) -> &mut Self {
        self.pool_sizes.push(vk::DescriptorPoolSize {
            ty: descriptor_type,
            descriptor_count: count,
        });
        self
    }

    /// Reserve several descriptor types at once
    pub fn add_pool_sizes<I>(&mut self, sizes: I) -> &mut Self
    where
        I: IntoIterator<Item = vk::DescriptorPoolSize>,
    {
        self.pool_sizes.extend(sizes);
        self
    }

    /// Create the pool on `device`
    pub fn build(&self, device: &Rc<Device>) -> Option<Rc<DescriptorPool>> {
        let create_info = vk::DescriptorPoolCreateInfo::builder()
            .flags(self.flags)
            .max_sets(self.max_sets)
            .pool_sizes(&self.pool_sizes);

        match unsafe { device.raw().create_descriptor_pool(&create_info, None) } {
            Ok(handle) => Some(Rc::new(DescriptorPool {
                object: GpuObject::new(device, handle),
                flags: self.flags,
            })),
            Err(result) => {
                log::error!("Failed to create descriptor pool for {} sets: {result}", self.max_sets);
                None
            }
        }
    }
}

/// Descriptor set allocated from a [`DescriptorPool`]
///
/// Dropping waits for the device to go idle, then returns the set to its pool
/// if the pool allows freeing individual sets.
pub struct DescriptorSet {
    object: GpuObject<DescriptorPool, vk::DescriptorSet>,
}

impl DescriptorSet {
    /// Native handle
    pub fn handle(&self) -> vk::DescriptorSet {
        self.object.handle()
    }

    /// Whether the native handle is non-null
    pub fn is_valid(&self) -> bool {
        self.object.is_valid()
    }

    /// Pool the set came from, `None` if dropped
    pub fn pool(&self) -> Option<Rc<DescriptorPool>> {
        self.object.parent()
    }
}

impl Drop for DescriptorSet {
    fn drop(&mut self) {
        self.object.release_with(|pool, handle| {
            let Some(device) = pool.device() else {
                return;
            };
            unsafe {
                let _ = device.raw().device_wait_idle();
                if pool.frees_individual_sets() {
                    if let Err(result) = device.raw().free_descriptor_sets(pool.handle(), &[handle]) {
                        log::warn!("Failed to free descriptor set: {result}");
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wrapper::test_support::headless;

    #[test]
    fn test_pool_builder_defaults_allow_free() {
        let builder = DescriptorPoolBuilder::new();
        assert!(builder
            .flags
            .contains(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET));
        assert_eq!(builder.max_sets, 1);
    }

    #[test]
    fn test_layout_builder_helpers() {
        let mut builder = DescriptorSetLayoutBuilder::new();
        builder
            .add_uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .add_combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT)
            .add_binding(2, vk::DescriptorType::STORAGE_IMAGE, 4, vk::ShaderStageFlags::COMPUTE);
        assert_eq!(builder.bindings.len(), 3);
        assert_eq!(builder.bindings[1].descriptor_type, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(builder.bindings[2].descriptor_count, 4);
    }

    #[test]
    fn test_sets_allocate_and_free() {
        let Some(gpu) = headless() else {
            return;
        };
        let pool = DescriptorPoolBuilder::new()
            .set_max_sets(2)
            .add_pool_size(vk::DescriptorType::UNIFORM_BUFFER, 2)
            .build(&gpu.device)
            .unwrap();
        let layout = DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .build(&gpu.device)
            .unwrap();
        let sets = pool
            .create_descriptor_sets(&[layout.handle(), layout.handle()])
            .unwrap();
        assert_eq!(sets.len(), 2);
        assert!(sets.iter().all(DescriptorSet::is_valid));
        assert!(sets[0].pool().is_some());
        drop(sets);
        // Both slots are free again
        assert_eq!(
            pool.create_descriptor_sets(&[layout.handle(), layout.handle()])
                .unwrap()
                .len(),
            2
        );
    }
}
