//! # Vulkan Framework
//!
//! Ownership-safe wrappers around Vulkan objects and a declarative resource
//! layer built on top of them.
//!
//! ## Layers
//!
//! - **wrapper**: one type per device object, each holding a weak link to the
//!   object that created it and destroying its handle on drop. Creation goes
//!   through fluent builders that return `None` on failure.
//! - **framework**: buffers and images that own their memory, named descriptor
//!   layouts and sets, batched descriptor updates and a [`ResourceManager`]
//!   that looks everything up by name.
//! - **application**: a [`VulkanApplication`] trait and its run loop.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::rc::Rc;
//! use vulkan_framework::prelude::*;
//!
//! struct Blank {
//!     frames: u32,
//! }
//!
//! impl VulkanApplication for Blank {
//!     fn init(&mut self, _instance: &Rc<Instance>, _config: &ApplicationCreateConfig) -> Result<(), AppError> {
//!         Ok(())
//!     }
//!
//!     fn draw_frame(&mut self) -> Result<(), AppError> {
//!         self.frames += 1;
//!         Ok(())
//!     }
//!
//!     fn should_close(&self) -> bool {
//!         self.frames == 60
//!     }
//!
//!     fn cleanup(&mut self) {}
//! }
//!
//! fn main() -> Result<(), AppError> {
//!     vulkan_framework::foundation::logging::init();
//!     Blank { frames: 0 }.run(&ApplicationCreateConfig::new("blank"))
//! }
//! ```
//!
//! [`ResourceManager`]: framework::ResourceManager
//! [`VulkanApplication`]: application::VulkanApplication

pub mod application;
pub mod config;
pub mod error;
pub mod foundation;
pub mod framework;
pub mod wrapper;

pub use error::{VulkanError, VulkanResult};

/// Common imports for framework users
pub mod prelude {
    pub use crate::{
        application::{AppError, VulkanApplication},
        config::{ApplicationCreateConfig, Config, ConfigError, WindowConfig},
        error::{VulkanError, VulkanResult},
        framework::{
            BufferResource, BufferResourceCreateInfo, DescriptorResourceCreateInfo, DescriptorUpdateInfo,
            ImageResource, ImageResourceCreateInfo, ResourceDescriptor, ResourceManager, SamplerResourceCreateInfo,
            ShaderModulesCreateInfo,
        },
        wrapper::{
            CommandBuffer, CommandPool, CommandPoolBuilder, Device, DeviceBuilder, Fence, Instance, InstanceBuilder,
            PhysicalDevice, PhysicalDeviceSelector, Queue, RenderPass, RenderPassBuilder, Semaphore, Surface,
            SwapChain, SwapChainBuilder,
        },
    };
    pub use ash::vk;
}
