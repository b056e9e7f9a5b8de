//! Presentation surface

use ash::extensions::khr;
use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::rc::Rc;

use super::instance::Instance;
use super::object::GpuObject;
use crate::error::{VulkanError, VulkanResult};

/// Window surface owned by an instance
pub struct Surface {
    object: GpuObject<Instance, vk::SurfaceKHR>,
    loader: khr::Surface,
}

impl Surface {
    /// Create a surface for a native window
    ///
    /// The instance must have been built with the platform surface extensions
    /// (`ash_window::enumerate_required_extensions` lists them).
    pub fn new(
        instance: &Rc<Instance>,
        display_handle: RawDisplayHandle,
        window_handle: RawWindowHandle,
    ) -> VulkanResult<Self> {
        let handle = unsafe {
            ash_window::create_surface(
                instance.entry(),
                instance.raw(),
                display_handle,
                window_handle,
                None,
            )
            .map_err(VulkanError::api("vkCreateSurfaceKHR"))?
        };
        Ok(Self::from_raw(instance, handle))
    }

    /// Take ownership of a surface created elsewhere (e.g. by the windowing library)
    pub fn from_raw(instance: &Rc<Instance>, handle: vk::SurfaceKHR) -> Self {
        Self {
            object: GpuObject::new(instance, handle),
            loader: khr::Surface::new(instance.entry(), instance.raw()),
        }
    }

    /// Native handle
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.object.handle()
    }

    /// Whether the native handle is non-null
    pub fn is_valid(&self) -> bool {
        self.object.is_valid()
    }

    /// Surface extension function table
    pub fn loader(&self) -> &khr::Surface {
        &self.loader
    }

    /// Whether `queue_family_index` on `physical_device` can present here
    pub fn supports_present(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
    ) -> VulkanResult<bool> {
        unsafe {
            self.loader
                .get_physical_device_surface_support(physical_device, queue_family_index, self.handle())
                .map_err(VulkanError::api("vkGetPhysicalDeviceSurfaceSupportKHR"))
        }
    }

    /// Capabilities of this surface on `physical_device`
    pub fn capabilities(&self, physical_device: vk::PhysicalDevice) -> VulkanResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.loader
                .get_physical_device_surface_capabilities(physical_device, self.handle())
                .map_err(VulkanError::api("vkGetPhysicalDeviceSurfaceCapabilitiesKHR"))
        }
    }

    /// Formats this surface supports on `physical_device`
    pub fn formats(&self, physical_device: vk::PhysicalDevice) -> VulkanResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.loader
                .get_physical_device_surface_formats(physical_device, self.handle())
                .map_err(VulkanError::api("vkGetPhysicalDeviceSurfaceFormatsKHR"))
        }
    }

    /// Present modes this surface supports on `physical_device`
    pub fn present_modes(&self, physical_device: vk::PhysicalDevice) -> VulkanResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.loader
                .get_physical_device_surface_present_modes(physical_device, self.handle())
                .map_err(VulkanError::api("vkGetPhysicalDeviceSurfacePresentModesKHR"))
        }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        let loader = &self.loader;
        self.object.release_with(|_, handle| unsafe {
            loader.destroy_surface(handle, None);
        });
    }
}
