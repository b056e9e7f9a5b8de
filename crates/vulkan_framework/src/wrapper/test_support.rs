//! Headless device for tests that need a real driver

use ash::vk;
use std::rc::Rc;

use super::command::{CommandPool, CommandPoolBuilder};
use super::device::{Device, DeviceBuilder};
use super::instance::{Instance, InstanceBuilder};
use super::physical_device::{PhysicalDevice, PhysicalDeviceSelector};
use super::queue::Queue;

pub struct Headless {
    pub device: Rc<Device>,
    pub physical_device: Rc<PhysicalDevice>,
    pub instance: Rc<Instance>,
    pub queue_family: u32,
}

impl Headless {
    pub fn queue(&self) -> Queue {
        self.device.queue(self.queue_family, 0)
    }

    pub fn command_pool(&self) -> Rc<CommandPool> {
        CommandPoolBuilder::new()
            .set_flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .set_queue_family_index(self.queue_family)
            .build(&self.device)
            .expect("command pool")
    }
}

/// Instance + device on the first graphics-capable GPU, or `None` without a driver
pub fn headless() -> Option<Headless> {
    let Some(instance) = InstanceBuilder::new()
        .set_application_name("vulkan_framework tests")
        .build()
    else {
        eprintln!("Vulkan not available, skipping");
        return None;
    };
    let physical_device = PhysicalDeviceSelector::new()
        .filter_by_queue_types(vk::QueueFlags::GRAPHICS)
        .select(&instance)
        .into_iter()
        .next();
    let Some(physical_device) = physical_device else {
        eprintln!("No graphics-capable GPU, skipping");
        return None;
    };
    let queue_family = physical_device
        .queue_family_properties()
        .ok()?
        .iter()
        .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))?;
    let queue_family = u32::try_from(queue_family).ok()?;
    let device = DeviceBuilder::new()
        .add_queue_info(queue_family, &[1.0])
        .build(&physical_device)?;
    Some(Headless {
        device,
        physical_device,
        instance,
        queue_family,
    })
}
