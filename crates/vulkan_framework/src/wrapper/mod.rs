//! Owning wrappers around Vulkan objects
//!
//! Every wrapper pairs a native handle with a weak reference to the object it
//! was created from (see [`GpuObject`]). Objects that others are created from
//! are handed out as `Rc`s: [`Instance`], [`PhysicalDevice`], [`Device`],
//! [`CommandPool`] and [`DescriptorPool`]. Leaves are plain owned values.
//!
//! Dropping a child after its parent is harmless: the destroy call is skipped
//! and a warning is logged.

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod framebuffer;
pub mod image;
pub mod instance;
pub mod memory;
pub mod object;
pub mod physical_device;
pub mod pipeline;
pub mod queue;
pub mod render_pass;
pub mod sampler;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

#[cfg(test)]
pub(crate) mod test_support;

pub use buffer::{Buffer, BufferBuilder};
pub use command::{CommandBuffer, CommandPool, CommandPoolBuilder, CommandRecorder};
pub use descriptor::{
    DescriptorPool, DescriptorPoolBuilder, DescriptorSet, DescriptorSetLayout, DescriptorSetLayoutBuilder,
};
pub use device::{Device, DeviceBuilder};
pub use framebuffer::{Framebuffer, FramebufferBuilder};
pub use image::{color_subresource_range, Image, ImageBuilder, ImageView, ImageViewBuilder};
pub use instance::{Instance, InstanceBuilder};
pub use memory::{DeviceMemory, MappedRange};
pub use object::GpuObject;
pub use physical_device::{PhysicalDevice, PhysicalDeviceSelector};
pub use pipeline::{GraphicsPipelineBuilder, Pipeline, PipelineLayout, PipelineLayoutBuilder};
pub use queue::Queue;
pub use render_pass::{RenderPass, RenderPassBuilder, SubpassInfo};
pub use sampler::{Sampler, SamplerBuilder};
pub use shader::{ShaderModule, ShaderModuleBuilder};
pub use surface::Surface;
pub use swapchain::{SwapChain, SwapChainBuilder};
pub use sync::{Fence, Semaphore};
