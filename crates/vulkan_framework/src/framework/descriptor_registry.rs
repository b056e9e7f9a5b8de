//! Named descriptor set layouts and sets allocated from one pool

use ash::vk;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{VulkanError, VulkanResult};
use crate::wrapper::{
    DescriptorPool, DescriptorPoolBuilder, DescriptorSet, DescriptorSetLayout, DescriptorSetLayoutBuilder, Device,
};

/// A named set layout
#[derive(Debug, Clone, Default)]
pub struct DescriptorLayoutInfo {
    /// Registry key
    pub name: String,
    /// Bindings of the layout
    pub bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

/// A named set allocated with a named layout
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorSetInfo {
    /// Registry key of the set
    pub name: String,
    /// Registry key of its layout
    pub layout_name: String,
}

/// Pool, layouts and sets to create in one go
#[derive(Debug, Clone, Default)]
pub struct DescriptorResourceCreateInfo {
    /// Maximum sets allocated from the pool
    pub max_sets: u32,
    /// Descriptors reserved per type
    pub pool_sizes: Vec<vk::DescriptorPoolSize>,
    /// Layouts, created in order
    pub layouts: Vec<DescriptorLayoutInfo>,
    /// Sets, allocated in order after every layout exists
    pub descriptor_sets: Vec<DescriptorSetInfo>,
}

/// Resolves a descriptor set name to its native handle
pub trait DescriptorSetLookup {
    /// Handle of the set registered under `name`
    fn descriptor_set_handle(&self, name: &str) -> VulkanResult<vk::DescriptorSet>;
}

/// Descriptor set layouts and sets keyed by name
///
/// Sets are declared before layouts and layouts before the pool so that
/// dropping the registry releases them in that order.
pub struct DescriptorRegistry {
    sets: HashMap<String, DescriptorSet>,
    layouts: HashMap<String, DescriptorSetLayout>,
    pool: Option<Rc<DescriptorPool>>,
    device: Rc<Device>,
}

impl DescriptorRegistry {
    /// Empty registry on `device`
    pub fn new(device: &Rc<Device>) -> Self {
        Self {
            sets: HashMap::new(),
            layouts: HashMap::new(),
            pool: None,
            device: Rc::clone(device),
        }
    }

    /// Create the pool, then every layout, then every set
    pub fn create_descriptors(&mut self, info: &DescriptorResourceCreateInfo) -> VulkanResult<()> {
        self.create_pool(
            info.max_sets,
            &info.pool_sizes,
            vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET,
        )?;
        for layout in &info.layouts {
            self.create_layout(&layout.name, &layout.bindings)?;
        }
        for set in &info.descriptor_sets {
            self.create_set(&set.name, &set.layout_name)?;
        }
        log::debug!(
            "Created descriptor registry with {} layouts and {} sets",
            self.layouts.len(),
            self.sets.len()
        );
        Ok(())
    }

    /// Create the pool sets are allocated from
    pub fn create_pool(
        &mut self,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
        flags: vk::DescriptorPoolCreateFlags,
    ) -> VulkanResult<&mut Self> {
        let pool = DescriptorPoolBuilder::new()
            .set_flags(flags)
            .set_max_sets(max_sets)
            .add_pool_sizes(pool_sizes.iter().copied())
            .build(&self.device)
            .ok_or(VulkanError::BuildFailed { object: "descriptor pool" })?;
        self.pool = Some(pool);
        Ok(self)
    }

    /// Create a set layout and register it as `name`
    pub fn create_layout(
        &mut self,
        name: &str,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> VulkanResult<&mut Self> {
        let layout = DescriptorSetLayoutBuilder::new()
            .add_bindings(bindings.iter().copied())
            .build(&self.device)
            .ok_or(VulkanError::BuildFailed { object: "descriptor set layout" })?;
        log::trace!("Registered descriptor layout '{name}' ({} bindings)", bindings.len());
        self.layouts.insert(name.to_string(), layout);
        Ok(self)
    }

    /// Allocate a set with layout `layout_name` and register it as `name`
    pub fn create_set(&mut self, name: &str, layout_name: &str) -> VulkanResult<&mut Self> {
        let layout = self.descriptor_layout(layout_name)?.handle();
        let pool = self.pool.as_ref().ok_or_else(|| VulkanError::InvalidOperation {
            reason: format!("descriptor set '{name}' requested before the pool was created"),
        })?;
        let set = pool
            .create_descriptor_sets(&[layout])?
            .pop()
            .ok_or(VulkanError::BuildFailed { object: "descriptor set" })?;
        log::trace!("Registered descriptor set '{name}' with layout '{layout_name}'");
        self.sets.insert(name.to_string(), set);
        Ok(self)
    }

    /// Layout registered under `name`
    pub fn descriptor_layout(&self, name: &str) -> VulkanResult<&DescriptorSetLayout> {
        self.layouts
            .get(name)
            .ok_or_else(|| VulkanError::not_found("descriptor set layout", name))
    }

    /// Set registered under `name`
    pub fn descriptor_set(&self, name: &str) -> VulkanResult<&DescriptorSet> {
        self.sets
            .get(name)
            .ok_or_else(|| VulkanError::not_found("descriptor set", name))
    }

    /// Unregister and destroy the layout `name`
    pub fn delete_descriptor_layout(&mut self, name: &str) -> VulkanResult<()> {
        self.layouts
            .remove(name)
            .map(drop)
            .ok_or_else(|| VulkanError::not_found("descriptor set layout", name))
    }

    /// Unregister the set `name`, returning it to the pool
    pub fn delete_descriptor_set(&mut self, name: &str) -> VulkanResult<()> {
        self.sets
            .remove(name)
            .map(drop)
            .ok_or_else(|| VulkanError::not_found("descriptor set", name))
    }

    /// The pool, once created
    pub fn pool(&self) -> Option<&Rc<DescriptorPool>> {
        self.pool.as_ref()
    }
}

impl DescriptorSetLookup for DescriptorRegistry {
    fn descriptor_set_handle(&self, name: &str) -> VulkanResult<vk::DescriptorSet> {
        self.descriptor_set(name).map(DescriptorSet::handle)
    }
}
