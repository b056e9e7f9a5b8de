//! Semaphores and fences
//!
//! Both may still be referenced by in-flight GPU work when their owner lets go
//! of them, so their `Drop` impls wait for the device to go idle before
//! destroying the handle.

use ash::vk;
use std::rc::Rc;

use super::device::Device;
use super::object::GpuObject;
use crate::error::{VulkanError, VulkanResult};

/// GPU-GPU synchronization primitive
///
/// Signaled by one submission or acquire and waited on by another, without
/// involving the CPU.
pub struct Semaphore {
    object: GpuObject<Device, vk::Semaphore>,
}

impl Semaphore {
    /// Create a binary semaphore
    pub fn new(device: &Rc<Device>) -> Option<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        match unsafe { device.raw().create_semaphore(&create_info, None) } {
            Ok(handle) => Some(Self {
                object: GpuObject::new(device, handle),
            }),
            Err(result) => {
                log::error!("Failed to create semaphore: {result}");
                None
            }
        }
    }

    /// Native handle
    pub fn handle(&self) -> vk::Semaphore {
        self.object.handle()
    }

    /// Whether the native handle is non-null
    pub fn is_valid(&self) -> bool {
        self.object.is_valid()
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        self.object.release_with(|device, handle| unsafe {
            let _ = device.raw().device_wait_idle();
            device.raw().destroy_semaphore(handle, None);
        });
    }
}

/// CPU-GPU synchronization primitive
pub struct Fence {
    object: GpuObject<Device, vk::Fence>,
}

impl Fence {
    /// Create a fence; pass `SIGNALED` to start in the signaled state
    pub fn new(device: &Rc<Device>, flags: vk::FenceCreateFlags) -> Option<Self> {
        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        match unsafe { device.raw().create_fence(&create_info, None) } {
            Ok(handle) => Some(Self {
                object: GpuObject::new(device, handle),
            }),
            Err(result) => {
                log::error!("Failed to create fence: {result}");
                None
            }
        }
    }

    /// Native handle
    pub fn handle(&self) -> vk::Fence {
        self.object.handle()
    }

    /// Whether the native handle is non-null
    pub fn is_valid(&self) -> bool {
        self.object.is_valid()
    }

    /// Wait up to `timeout` nanoseconds for the fence
    ///
    /// Returns `Ok(false)` on timeout.
    pub fn wait(&self, wait_all: bool, timeout: u64) -> VulkanResult<bool> {
        let device = self.object.require_parent()?;
        match unsafe { device.raw().wait_for_fences(&[self.handle()], wait_all, timeout) } {
            Ok(()) => Ok(true),
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(result) => Err(VulkanError::Api {
                operation: "vkWaitForFences",
                result,
            }),
        }
    }

    /// Return the fence to the unsignaled state
    pub fn reset(&self) -> VulkanResult<()> {
        let device = self.object.require_parent()?;
        unsafe {
            device
                .raw()
                .reset_fences(&[self.handle()])
                .map_err(VulkanError::api("vkResetFences"))
        }
    }

    /// Whether the fence is currently signaled
    pub fn is_signaled(&self) -> VulkanResult<bool> {
        let device = self.object.require_parent()?;
        unsafe {
            device
                .raw()
                .get_fence_status(self.handle())
                .map_err(VulkanError::api("vkGetFenceStatus"))
        }
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        self.object.release_with(|device, handle| unsafe {
            let _ = device.raw().device_wait_idle();
            device.raw().destroy_fence(handle, None);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wrapper::test_support::headless;

    #[test]
    fn test_fence_signal_state() {
        let Some(gpu) = headless() else {
            return;
        };
        let fence = gpu
            .device
            .create_fence(vk::FenceCreateFlags::SIGNALED)
            .unwrap();
        assert!(fence.is_signaled().unwrap());
        assert!(fence.wait(true, u64::MAX).unwrap());
        fence.reset().unwrap();
        assert!(!fence.is_signaled().unwrap());
        assert!(!fence.wait(true, 0).unwrap());
    }

    #[test]
    fn test_semaphore_outliving_device_does_not_crash() {
        let Some(gpu) = headless() else {
            return;
        };
        let semaphore = gpu.device.create_semaphore().unwrap();
        assert!(semaphore.is_valid());
        drop(gpu);
        drop(semaphore);
    }
}
