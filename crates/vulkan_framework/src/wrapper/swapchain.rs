//! Swap chain and its per-image views

use ash::extensions::khr;
use ash::vk;
use std::rc::Rc;

use super::device::Device;
use super::image::{ImageView, ImageViewBuilder};
use super::object::GpuObject;
use super::surface::Surface;
use super::sync::{Fence, Semaphore};
use crate::error::{VulkanError, VulkanResult};

/// Swap chain owning one colour view per presentable image
pub struct SwapChain {
    views: Vec<ImageView>,
    images: Vec<vk::Image>,
    object: GpuObject<Device, vk::SwapchainKHR>,
    loader: khr::Swapchain,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl SwapChain {
    /// Native handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.object.handle()
    }

    /// Whether the native handle is non-null
    pub fn is_valid(&self) -> bool {
        self.object.is_valid()
    }

    /// `VK_KHR_swapchain` function table
    pub fn loader(&self) -> &khr::Swapchain {
        &self.loader
    }

    /// Presentable images, owned by the swap chain
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    /// One colour view per image, same order as [`SwapChain::images`]
    pub fn views(&self) -> &[ImageView] {
        &self.views
    }

    /// Image format
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Image extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Acquire the next image index
    ///
    /// Returns the index and whether the swap chain is suboptimal. Out-of-date
    /// swap chains surface as [`VulkanError::Api`] with
    /// `ERROR_OUT_OF_DATE_KHR`.
    pub fn acquire_next_image(
        &self,
        semaphore: Option<&Semaphore>,
        fence: Option<&Fence>,
        timeout: u64,
    ) -> VulkanResult<(u32, bool)> {
        unsafe {
            self.loader
                .acquire_next_image(
                    self.handle(),
                    timeout,
                    semaphore.map_or(vk::Semaphore::null(), Semaphore::handle),
                    fence.map_or(vk::Fence::null(), Fence::handle),
                )
                .map_err(VulkanError::api("vkAcquireNextImageKHR"))
        }
    }
}

impl Drop for SwapChain {
    fn drop(&mut self) {
        self.views.clear();
        let loader = self.loader.clone();
        self.object.release_with(|_, handle| unsafe {
            loader.destroy_swapchain(handle, None);
        });
    }
}

/// Builder for [`SwapChain`]
///
/// Defaults: one image, `B8G8R8A8_SRGB` in `SRGB_NONLINEAR`, single layer,
/// colour-attachment and transfer-source usage, exclusive sharing, identity
/// transform, opaque alpha, FIFO presentation, clipped.
#[derive(Debug, Clone)]
pub struct SwapChainBuilder {
    flags: vk::SwapchainCreateFlagsKHR,
    min_image_count: u32,
    format: vk::Format,
    color_space: vk::ColorSpaceKHR,
    extent: vk::Extent2D,
    array_layers: u32,
    usage: vk::ImageUsageFlags,
    sharing_mode: vk::SharingMode,
    queue_family_indices: Vec<u32>,
    pre_transform: vk::SurfaceTransformFlagsKHR,
    composite_alpha: vk::CompositeAlphaFlagsKHR,
    present_mode: vk::PresentModeKHR,
    clipped: bool,
    old_swapchain: vk::SwapchainKHR,
}

impl Default for SwapChainBuilder {
    fn default() -> Self {
        Self {
            flags: vk::SwapchainCreateFlagsKHR::empty(),
            min_image_count: 1,
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            extent: vk::Extent2D::default(),
            array_layers: 1,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            queue_family_indices: Vec::new(),
            pre_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode: vk::PresentModeKHR::FIFO,
            clipped: true,
            old_swapchain: vk::SwapchainKHR::null(),
        }
    }
}

impl SwapChainBuilder {
    /// Start from the defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Creation flags
    pub fn set_flags(&mut self, flags: vk::SwapchainCreateFlagsKHR) -> &mut Self {
        self.flags = flags;
        self
    }

    /// Minimum number of presentable images
    pub fn set_min_image_count(&mut self, count: u32) -> &mut Self {
        self.min_image_count = count;
        self
    }

    /// Image format and colour space
    pub fn set_surface_format(&mut self, format: vk::SurfaceFormatKHR) -> &mut Self {
        self.format = format.format;
        self.color_space = format.color_space;
        self
    }

    /// Image extent
    pub fn set_extent(&mut self, width: u32, height: u32) -> &mut Self {
        self.extent = vk::Extent2D { width, height };
        self
    }

    /// Layers per image
    pub fn set_array_layers(&mut self, layers: u32) -> &mut Self {
        self.array_layers = layers;
        self
    }

    /// Image usage flags
    pub fn set_usage(&mut self, usage: vk::ImageUsageFlags) -> &mut Self {
        self.usage = usage;
        self
    }

    /// Share images between queue families; empty means exclusive
    pub fn set_queue_family_indices(&mut self, indices: &[u32]) -> &mut Self {
        self.queue_family_indices = indices.to_vec();
        self.sharing_mode = if indices.len() > 1 {
            vk::SharingMode::CONCURRENT
        } else {
            vk::SharingMode::EXCLUSIVE
        };
        self
    }

    /// Transform applied before presentation
    pub fn set_pre_transform(&mut self, transform: vk::SurfaceTransformFlagsKHR) -> &mut Self {
        self.pre_transform = transform;
        self
    }

    /// Alpha compositing mode
    pub fn set_composite_alpha(&mut self, alpha: vk::CompositeAlphaFlagsKHR) -> &mut Self {
        self.composite_alpha = alpha;
        self
    }

    /// Presentation mode
    pub fn set_present_mode(&mut self, mode: vk::PresentModeKHR) -> &mut Self {
        self.present_mode = mode;
        self
    }

    /// Whether obscured pixels may be discarded
    pub fn set_clipped(&mut self, clipped: bool) -> &mut Self {
        self.clipped = clipped;
        self
    }

    /// Swap chain being replaced
    pub fn set_old_swapchain(&mut self, old: vk::SwapchainKHR) -> &mut Self {
        self.old_swapchain = old;
        self
    }

    /// Fill extent, image count and transform from `capabilities`
    ///
    /// Uses the surface's current extent when it is fixed, otherwise clamps
    /// `fallback` into the supported range.
    pub fn fit_capabilities(
        &mut self,
        capabilities: &vk::SurfaceCapabilitiesKHR,
        fallback: vk::Extent2D,
    ) -> &mut Self {
        self.extent = if capabilities.current_extent.width == u32::MAX {
            vk::Extent2D {
                width: fallback.width.clamp(
                    capabilities.min_image_extent.width,
                    capabilities.max_image_extent.width,
                ),
                height: fallback.height.clamp(
                    capabilities.min_image_extent.height,
                    capabilities.max_image_extent.height,
                ),
            }
        } else {
            capabilities.current_extent
        };
        let mut count = capabilities.min_image_count + 1;
        if capabilities.max_image_count > 0 {
            count = count.min(capabilities.max_image_count);
        }
        self.min_image_count = count;
        self.pre_transform = capabilities.current_transform;
        self
    }

    /// Create the swap chain for `surface` and a view per image
    pub fn build(&self, device: &Rc<Device>, surface: &Surface) -> Option<SwapChain> {
        let loader = khr::Swapchain::new(device.instance_raw(), device.raw());
        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .flags(self.flags)
            .surface(surface.handle())
            .min_image_count(self.min_image_count)
            .image_format(self.format)
            .image_color_space(self.color_space)
            .image_extent(self.extent)
            .image_array_layers(self.array_layers)
            .image_usage(self.usage)
            .image_sharing_mode(self.sharing_mode)
            .queue_family_indices(&self.queue_family_indices)
            .pre_transform(self.pre_transform)
            .composite_alpha(self.composite_alpha)
            .present_mode(self.present_mode)
            .clipped(self.clipped)
            .old_swapchain(self.old_swapchain);

        let handle = match unsafe { loader.create_swapchain(&create_info, None) } {
            Ok(handle) => handle,
            Err(result) => {
                log::error!(
                    "Failed to create {}x{} swap chain: {result}",
                    self.extent.width,
                    self.extent.height
                );
                return None;
            }
        };
        // Owns the handle from here on so failures below still destroy it
        let mut swapchain = SwapChain {
            views: Vec::new(),
            images: Vec::new(),
            object: GpuObject::new(device, handle),
            loader,
            format: self.format,
            extent: self.extent,
        };

        swapchain.images = match unsafe { swapchain.loader.get_swapchain_images(handle) } {
            Ok(images) => images,
            Err(result) => {
                log::error!("Failed to get swap chain images: {result}");
                return None;
            }
        };

        let mut view_builder = ImageViewBuilder::new();
        view_builder.set_format(self.format);
        for &image in &swapchain.images {
            swapchain.views.push(view_builder.build(device, image)?);
        }
        log::debug!(
            "Created swap chain with {} images ({:?}, {}x{})",
            swapchain.images.len(),
            self.format,
            self.extent.width,
            self.extent.height
        );
        Some(swapchain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = SwapChainBuilder::new();
        assert_eq!(builder.min_image_count, 1);
        assert_eq!(builder.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        assert_eq!(
            builder.usage,
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC
        );
        assert_eq!(builder.present_mode, vk::PresentModeKHR::FIFO);
        assert!(builder.clipped);
    }

    #[test]
    fn test_fit_capabilities_clamps_free_extent() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 1024,
                height: 768,
            },
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        };
        let mut builder = SwapChainBuilder::new();
        builder.fit_capabilities(&capabilities, vk::Extent2D {
            width: 4096,
            height: 600,
        });
        assert_eq!(builder.extent, vk::Extent2D { width: 1024, height: 600 });
        assert_eq!(builder.min_image_count, 2);
    }

    #[test]
    fn test_fit_capabilities_uses_fixed_extent() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            current_extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            current_transform: vk::SurfaceTransformFlagsKHR::ROTATE_90,
            ..Default::default()
        };
        let mut builder = SwapChainBuilder::new();
        builder.fit_capabilities(&capabilities, vk::Extent2D::default());
        assert_eq!(builder.extent.width, 800);
        assert_eq!(builder.min_image_count, 3);
        assert_eq!(builder.pre_transform, vk::SurfaceTransformFlagsKHR::ROTATE_90);
    }

    #[test]
    fn test_concurrent_sharing_from_indices() {
        let mut builder = SwapChainBuilder::new();
        builder.set_queue_family_indices(&[0, 1]);
        assert_eq!(builder.sharing_mode, vk::SharingMode::CONCURRENT);
        builder.set_queue_family_indices(&[0]);
        assert_eq!(builder.sharing_mode, vk::SharingMode::EXCLUSIVE);
    }
}
