//! Logical device and its builder

use ash::vk::{self, Handle};
use std::ffi::CString;
use std::rc::Rc;

use super::descriptor::{DescriptorPool, DescriptorPoolBuilder, DescriptorSetLayout, DescriptorSetLayoutBuilder};
use super::memory::DeviceMemory;
use super::object::GpuObject;
use super::physical_device::PhysicalDevice;
use super::pipeline::{PipelineLayout, PipelineLayoutBuilder};
use super::queue::Queue;
use super::shader::{ShaderModule, ShaderModuleBuilder};
use super::sync::{Fence, Semaphore};
use crate::error::{VulkanError, VulkanResult};

/// Logical device created from a physical device
///
/// Parent of almost every other wrapper. Destroying it waits for the GPU to go
/// idle first.
pub struct Device {
    object: GpuObject<PhysicalDevice, vk::Device>,
    raw: ash::Device,
    instance: ash::Instance,
}

impl Device {
    /// Native handle
    pub fn handle(&self) -> vk::Device {
        self.object.handle()
    }

    /// Whether the native handle is non-null
    pub fn is_valid(&self) -> bool {
        self.object.is_valid()
    }

    /// Device function table
    pub fn raw(&self) -> &ash::Device {
        &self.raw
    }

    /// Instance function table the device was created through
    pub fn instance_raw(&self) -> &ash::Instance {
        &self.instance
    }

    /// Physical device this device was created from, `None` if dropped
    pub fn physical_device(&self) -> Option<Rc<PhysicalDevice>> {
        self.object.parent()
    }

    /// Physical device, or an error if it was dropped
    pub fn require_physical_device(&self) -> VulkanResult<Rc<PhysicalDevice>> {
        self.object.require_parent()
    }

    /// Block until all queues are idle
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe {
            self.raw
                .device_wait_idle()
                .map_err(VulkanError::api("vkDeviceWaitIdle"))
        }
    }

    /// Queue `index` of family `family_index`
    pub fn queue(self: &Rc<Self>, family_index: u32, index: u32) -> Queue {
        let handle = unsafe { self.raw.get_device_queue(family_index, index) };
        Queue::new(self, handle, family_index)
    }

    /// Binary semaphore
    pub fn create_semaphore(self: &Rc<Self>) -> Option<Semaphore> {
        Semaphore::new(self)
    }

    /// Fence, created signaled when `flags` contains `SIGNALED`
    pub fn create_fence(self: &Rc<Self>, flags: vk::FenceCreateFlags) -> Option<Fence> {
        Fence::new(self, flags)
    }

    /// Descriptor pool for `max_sets` sets drawn from `pool_sizes`
    pub fn create_descriptor_pool(
        self: &Rc<Self>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
        flags: vk::DescriptorPoolCreateFlags,
    ) -> Option<Rc<DescriptorPool>> {
        DescriptorPoolBuilder::new()
            .set_flags(flags)
            .set_max_sets(max_sets)
            .add_pool_sizes(pool_sizes.iter().copied())
            .build(self)
    }

    /// Descriptor set layout from a list of bindings
    pub fn create_descriptor_set_layout(
        self: &Rc<Self>,
        bindings: &[vk::DescriptorSetLayoutBinding],
        flags: vk::DescriptorSetLayoutCreateFlags,
    ) -> Option<DescriptorSetLayout> {
        DescriptorSetLayoutBuilder::new()
            .set_flags(flags)
            .add_bindings(bindings.iter().copied())
            .build(self)
    }

    /// Shader module from SPIR-V words
    pub fn create_shader_module(self: &Rc<Self>, code: &[u32]) -> Option<ShaderModule> {
        ShaderModuleBuilder::new().set_code(code).build(self)
    }

    /// Pipeline layout from set layouts and push-constant ranges
    pub fn create_pipeline_layout(
        self: &Rc<Self>,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Option<PipelineLayout> {
        PipelineLayoutBuilder::new()
            .add_set_layouts(set_layouts.iter().copied())
            .add_push_constant_ranges(push_constant_ranges.iter().copied())
            .build(self)
    }

    /// Allocate `size` bytes from memory type `memory_type_index`
    pub fn allocate_memory(
        self: &Rc<Self>,
        size: vk::DeviceSize,
        memory_type_index: u32,
    ) -> Option<DeviceMemory> {
        DeviceMemory::allocate(self, size, memory_type_index)
    }

    /// Apply descriptor writes and copies in one native call
    pub fn update_descriptor_sets(
        &self,
        writes: &[vk::WriteDescriptorSet],
        copies: &[vk::CopyDescriptorSet],
    ) {
        unsafe { self.raw.update_descriptor_sets(writes, copies) };
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        let raw = &self.raw;
        self.object.release_with(|physical_device, handle| {
            // The instance has to outlive the destroy call
            let Some(_instance) = physical_device.instance() else {
                log::warn!("Device {:#x} released after its instance, skipping native destroy", handle.as_raw());
                return;
            };
            unsafe {
                let _ = raw.device_wait_idle();
                raw.destroy_device(None);
            }
        });
    }
}

#[derive(Debug, Clone)]
struct QueueRequest {
    family_index: u32,
    priorities: Vec<f32>,
}

/// Builder for [`Device`]
///
/// Queue requests, layer and extension names are kept in owned storage until
/// `build` turns them into the native create info.
#[derive(Debug, Clone, Default)]
pub struct DeviceBuilder {
    queues: Vec<QueueRequest>,
    layers: Vec<String>,
    extensions: Vec<String>,
    features: vk::PhysicalDeviceFeatures,
}

impl DeviceBuilder {
    /// Builder with no queues, layers, extensions or features
    pub fn new() -> Self {
        Self::default()
    }

    /// Request one queue per priority from `family_index`
    pub fn add_queue_info(&mut self, family_index: u32, priorities: &[f32]) -> &mut Self {
        self.queues.push(QueueRequest {
            family_index,
            priorities: priorities.to_vec(),
        });
        self
    }

    /// Enable a device layer (ignored by modern loaders, kept for old drivers)
    pub fn add_layer(&mut self, name: impl Into<String>) -> &mut Self {
        self.layers.push(name.into());
        self
    }

    /// Enable several device layers
    pub fn add_layers<I, S>(&mut self, names: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.layers.extend(names.into_iter().map(Into::into));
        self
    }

    /// Enable a device extension
    pub fn add_extension(&mut self, name: impl Into<String>) -> &mut Self {
        self.extensions.push(name.into());
        self
    }

    /// Enable several device extensions
    pub fn add_extensions<I, S>(&mut self, names: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions.extend(names.into_iter().map(Into::into));
        self
    }

    /// Core features to enable
    pub fn set_device_features(&mut self, features: vk::PhysicalDeviceFeatures) -> &mut Self {
        self.features = features;
        self
    }

    /// Create the device on `physical_device`
    pub fn build(&self, physical_device: &Rc<PhysicalDevice>) -> Option<Rc<Device>> {
        let instance = physical_device.instance()?;

        let to_cstrings = |names: &[String]| {
            names
                .iter()
                .map(|name| CString::new(name.as_str()).ok())
                .collect::<Option<Vec<_>>>()
        };
        let Some(layers) = to_cstrings(&self.layers) else {
            log::error!("Device layer name contains a NUL byte");
            return None;
        };
        let Some(extensions) = to_cstrings(&self.extensions) else {
            log::error!("Device extension name contains a NUL byte");
            return None;
        };
        let layer_ptrs: Vec<_> = layers.iter().map(|name| name.as_ptr()).collect();
        let extension_ptrs: Vec<_> = extensions.iter().map(|name| name.as_ptr()).collect();

        let queue_infos: Vec<_> = self
            .queues
            .iter()
            .map(|request| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(request.family_index)
                    .queue_priorities(&request.priorities)
                    .build()
            })
            .collect();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_layer_names(&layer_ptrs)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&self.features);

        let raw = match unsafe {
            instance
                .raw()
                .create_device(physical_device.handle(), &create_info, None)
        } {
            Ok(raw) => raw,
            Err(result) => {
                log::error!("Failed to create logical device: {result}");
                return None;
            }
        };

        log::debug!(
            "Created logical device with {} queue families and {} extensions",
            self.queues.len(),
            self.extensions.len()
        );

        Some(Rc::new(Device {
            object: GpuObject::new(physical_device, raw.handle()),
            raw,
            instance: instance.raw().clone(),
        }))
    }
}
