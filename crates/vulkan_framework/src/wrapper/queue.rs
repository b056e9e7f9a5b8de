//! Device queue: submission and presentation

use ash::extensions::khr;
use ash::vk;
use std::cell::Cell;
use std::rc::Rc;

use super::command::CommandBuffer;
use super::device::Device;
use super::object::GpuObject;
use super::swapchain::SwapChain;
use super::sync::{Fence, Semaphore};
use crate::error::{VulkanError, VulkanResult};

/// Queue retrieved from a device
///
/// Queues are owned by the device and never destroyed individually.
pub struct Queue {
    object: GpuObject<Device, vk::Queue>,
    family_index: u32,
    last_present_result: Cell<vk::Result>,
}

impl Queue {
    pub(crate) fn new(device: &Rc<Device>, handle: vk::Queue, family_index: u32) -> Self {
        Self {
            object: GpuObject::new(device, handle),
            family_index,
            last_present_result: Cell::new(vk::Result::SUCCESS),
        }
    }

    /// Native handle
    pub fn handle(&self) -> vk::Queue {
        self.object.handle()
    }

    /// Whether the native handle is non-null
    pub fn is_valid(&self) -> bool {
        self.object.is_valid()
    }

    /// Family this queue belongs to
    pub fn family_index(&self) -> u32 {
        self.family_index
    }

    /// Result of the most recent [`Queue::present`]
    ///
    /// `SUBOPTIMAL_KHR` and `ERROR_OUT_OF_DATE_KHR` land here instead of being
    /// raised, so the caller can decide when to recreate the swap chain.
    pub fn last_present_result(&self) -> vk::Result {
        self.last_present_result.get()
    }

    /// Submit command buffers
    ///
    /// `wait_semaphores` pairs each semaphore with the stage that waits on it.
    pub fn submit(
        &self,
        command_buffers: &[&CommandBuffer],
        wait_semaphores: &[(&Semaphore, vk::PipelineStageFlags)],
        signal_semaphores: &[&Semaphore],
        fence: Option<&Fence>,
    ) -> VulkanResult<()> {
        let device = self.object.require_parent()?;
        let buffers: Vec<_> = command_buffers.iter().map(|cb| cb.handle()).collect();
        let waits: Vec<_> = wait_semaphores.iter().map(|(s, _)| s.handle()).collect();
        let stages: Vec<_> = wait_semaphores.iter().map(|(_, stage)| *stage).collect();
        let signals: Vec<_> = signal_semaphores.iter().map(|s| s.handle()).collect();

        let submit_info = vk::SubmitInfo::builder()
            .command_buffers(&buffers)
            .wait_semaphores(&waits)
            .wait_dst_stage_mask(&stages)
            .signal_semaphores(&signals)
            .build();

        unsafe {
            device
                .raw()
                .queue_submit(
                    self.handle(),
                    &[submit_info],
                    fence.map_or(vk::Fence::null(), Fence::handle),
                )
                .map_err(VulkanError::api("vkQueueSubmit"))
        }
    }

    /// Present `image_index` of `swapchain` after `wait_semaphores` signal
    ///
    /// Returns `true` when the swap chain is suboptimal or out of date.
    pub fn present(
        &self,
        swapchain: &SwapChain,
        image_index: u32,
        wait_semaphores: &[&Semaphore],
    ) -> VulkanResult<bool> {
        self.present_with(swapchain.loader(), swapchain.handle(), image_index, wait_semaphores)
    }

    fn present_with(
        &self,
        loader: &khr::Swapchain,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphores: &[&Semaphore],
    ) -> VulkanResult<bool> {
        let waits: Vec<_> = wait_semaphores.iter().map(|s| s.handle()).collect();
        let swapchains = [swapchain];
        let indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&waits)
            .swapchains(&swapchains)
            .image_indices(&indices);

        let result = unsafe { loader.queue_present(self.handle(), &present_info) };
        match result {
            Ok(false) => {
                self.last_present_result.set(vk::Result::SUCCESS);
                Ok(false)
            }
            Ok(true) => {
                self.last_present_result.set(vk::Result::SUBOPTIMAL_KHR);
                Ok(true)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.last_present_result.set(vk::Result::ERROR_OUT_OF_DATE_KHR);
                Ok(true)
            }
            Err(result) => {
                self.last_present_result.set(result);
                Err(VulkanError::Api {
                    operation: "vkQueuePresentKHR",
                    result,
                })
            }
        }
    }

    /// Block until this queue has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        let device = self.object.require_parent()?;
        unsafe {
            device
                .raw()
                .queue_wait_idle(self.handle())
                .map_err(VulkanError::api("vkQueueWaitIdle"))
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::wrapper::test_support::headless;

    #[test]
    fn test_empty_submit_and_wait() {
        let Some(gpu) = headless() else {
            return;
        };
        let queue = gpu.queue();
        assert_eq!(queue.family_index(), gpu.queue_family);
        assert!(queue.submit(&[], &[], &[], None).is_ok());
        assert!(queue.wait_idle().is_ok());
    }
}
