//! Images, image views and their builders

use ash::vk;
use std::rc::Rc;

use super::device::Device;
use super::memory::DeviceMemory;
use super::object::GpuObject;
use crate::error::{VulkanError, VulkanResult};

/// Colour aspect, first mip level, first array layer
pub fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// Image object without bound memory
pub struct Image {
    object: GpuObject<Device, vk::Image>,
    format: vk::Format,
    extent: vk::Extent3D,
}

impl Image {
    /// Native handle
    pub fn handle(&self) -> vk::Image {
        self.object.handle()
    }

    /// Whether the native handle is non-null
    pub fn is_valid(&self) -> bool {
        self.object.is_valid()
    }

    /// Format requested at creation
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Extent requested at creation
    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }

    /// Size, alignment and acceptable memory types
    pub fn memory_requirements(&self) -> VulkanResult<vk::MemoryRequirements> {
        let device = self.object.require_parent()?;
        Ok(unsafe { device.raw().get_image_memory_requirements(self.handle()) })
    }

    /// Bind `memory` at `offset`
    pub fn bind_memory(&self, memory: &DeviceMemory, offset: vk::DeviceSize) -> VulkanResult<()> {
        let device = self.object.require_parent()?;
        unsafe {
            device
                .raw()
                .bind_image_memory(self.handle(), memory.handle(), offset)
                .map_err(VulkanError::api("vkBindImageMemory"))
        }
    }

    /// Barrier moving the colour subresource from `old_layout` to `new_layout`
    pub fn create_memory_barrier(
        &self,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        src_access: vk::AccessFlags,
        dst_access: vk::AccessFlags,
    ) -> vk::ImageMemoryBarrier {
        self.create_memory_barrier_for(
            old_layout,
            new_layout,
            src_access,
            dst_access,
            color_subresource_range(),
        )
    }

    /// Barrier over an explicit subresource range, no queue family transfer
    pub fn create_memory_barrier_for(
        &self,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        src_access: vk::AccessFlags,
        dst_access: vk::AccessFlags,
        subresource_range: vk::ImageSubresourceRange,
    ) -> vk::ImageMemoryBarrier {
        vk::ImageMemoryBarrier::builder()
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_access_mask(src_access)
            .dst_access_mask(dst_access)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.handle())
            .subresource_range(subresource_range)
            .build()
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        self.object.release_with(|device, handle| unsafe {
            device.raw().destroy_image(handle, None);
        });
    }
}

/// Builder for [`Image`]
///
/// Defaults: 2D, undefined format, 1x1x1, one mip level and layer, one sample,
/// optimal tiling, `TRANSFER_DST | SAMPLED`, exclusive, undefined initial layout.
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    flags: vk::ImageCreateFlags,
    image_type: vk::ImageType,
    format: vk::Format,
    extent: vk::Extent3D,
    mip_levels: u32,
    array_layers: u32,
    samples: vk::SampleCountFlags,
    tiling: vk::ImageTiling,
    usage: vk::ImageUsageFlags,
    sharing_mode: vk::SharingMode,
    queue_family_indices: Vec<u32>,
    initial_layout: vk::ImageLayout,
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self {
            flags: vk::ImageCreateFlags::empty(),
            image_type: vk::ImageType::TYPE_2D,
            format: vk::Format::UNDEFINED,
            extent: vk::Extent3D {
                width: 1,
                height: 1,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            queue_family_indices: Vec::new(),
            initial_layout: vk::ImageLayout::UNDEFINED,
        }
    }
}

impl ImageBuilder {
    /// Start from the defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Creation flags
    pub fn set_flags(&mut self, flags: vk::ImageCreateFlags) -> &mut Self {
        self.flags = flags;
        self
    }

    /// 1D, 2D or 3D
    pub fn set_image_type(&mut self, image_type: vk::ImageType) -> &mut Self {
        self.image_type = image_type;
        self
    }

    /// Texel format
    pub fn set_format(&mut self, format: vk::Format) -> &mut Self {
        self.format = format;
        self
    }

    /// Width, height and depth
    pub fn set_dimensions(&mut self, width: u32, height: u32, depth: u32) -> &mut Self {
        self.extent = vk::Extent3D { width, height, depth };
        self
    }

    /// Number of mip levels
    pub fn set_mip_levels(&mut self, mip_levels: u32) -> &mut Self {
        self.mip_levels = mip_levels;
        self
    }

    /// Number of array layers
    pub fn set_array_layers(&mut self, array_layers: u32) -> &mut Self {
        self.array_layers = array_layers;
        self
    }

    /// Samples per texel
    pub fn set_samples(&mut self, samples: vk::SampleCountFlags) -> &mut Self {
        self.samples = samples;
        self
    }

    /// Optimal or linear tiling
    pub fn set_tiling(&mut self, tiling: vk::ImageTiling) -> &mut Self {
        self.tiling = tiling;
        self
    }

    /// Usage flags
    pub fn set_usage(&mut self, usage: vk::ImageUsageFlags) -> &mut Self {
        self.usage = usage;
        self
    }

    /// Sharing mode
    pub fn set_sharing_mode(&mut self, sharing_mode: vk::SharingMode) -> &mut Self {
        self.sharing_mode = sharing_mode;
        self
    }

    /// Queue families sharing the image in concurrent mode
    pub fn set_queue_family_indices(&mut self, indices: &[u32]) -> &mut Self {
        self.queue_family_indices = indices.to_vec();
        self
    }

    /// Layout the image starts in
    pub fn set_initial_layout(&mut self, layout: vk::ImageLayout) -> &mut Self {
        self.initial_layout = layout;
        self
    }

    /// Create the image on `device`
    pub fn build(&self, device: &Rc<Device>) -> Option<Image> {
        let create_info = vk::ImageCreateInfo::builder()
            .flags(self.flags)
            .image_type(self.image_type)
            .format(self.format)
            .extent(self.extent)
            .mip_levels(self.mip_levels)
            .array_layers(self.array_layers)
            .samples(self.samples)
            .tiling(self.tiling)
            .usage(self.usage)
            .sharing_mode(self.sharing_mode)
            .queue_family_indices(&self.queue_family_indices)
            .initial_layout(self.initial_layout);

        match unsafe { device.raw().create_image(&create_info, None) } {
            Ok(handle) => Some(Image {
                object: GpuObject::new(device, handle),
                format: self.format,
                extent: self.extent,
            }),
            Err(result) => {
                log::error!(
                    "Failed to create {:?} image {}x{}: {result}",
                    self.format,
                    self.extent.width,
                    self.extent.height
                );
                None
            }
        }
    }
}

/// View onto an image
pub struct ImageView {
    object: GpuObject<Device, vk::ImageView>,
}

impl ImageView {
    /// Native handle
    pub fn handle(&self) -> vk::ImageView {
        self.object.handle()
    }

    /// Whether the native handle is non-null
    pub fn is_valid(&self) -> bool {
        self.object.is_valid()
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        self.object.release_with(|device, handle| unsafe {
            device.raw().destroy_image_view(handle, None);
        });
    }
}

/// Builder for [`ImageView`]
///
/// Defaults: 2D view, undefined format, identity swizzle, colour aspect over
/// the first mip level and layer. The target image is supplied to `build`.
#[derive(Debug, Clone, Copy)]
pub struct ImageViewBuilder {
    flags: vk::ImageViewCreateFlags,
    view_type: vk::ImageViewType,
    format: vk::Format,
    components: vk::ComponentMapping,
    subresource_range: vk::ImageSubresourceRange,
}

impl Default for ImageViewBuilder {
    fn default() -> Self {
        Self {
            flags: vk::ImageViewCreateFlags::empty(),
            view_type: vk::ImageViewType::TYPE_2D,
            format: vk::Format::UNDEFINED,
            components: vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            },
            subresource_range: color_subresource_range(),
        }
    }
}

impl ImageViewBuilder {
    /// Start from the defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Creation flags
    pub fn set_flags(&mut self, flags: vk::ImageViewCreateFlags) -> &mut Self {
        self.flags = flags;
        self
    }

    /// View dimensionality
    pub fn set_view_type(&mut self, view_type: vk::ImageViewType) -> &mut Self {
        self.view_type = view_type;
        self
    }

    /// View format
    pub fn set_format(&mut self, format: vk::Format) -> &mut Self {
        self.format = format;
        self
    }

    /// Channel swizzle
    pub fn set_components(&mut self, components: vk::ComponentMapping) -> &mut Self {
        self.components = components;
        self
    }

    /// Visible aspect, mip levels and layers
    pub fn set_subresource_range(&mut self, range: vk::ImageSubresourceRange) -> &mut Self {
        self.subresource_range = range;
        self
    }

    /// Create a view of `image` on `device`
    pub fn build(&self, device: &Rc<Device>, image: vk::Image) -> Option<ImageView> {
        let create_info = vk::ImageViewCreateInfo::builder()
            .flags(self.flags)
            .image(image)
            .view_type(self.view_type)
            .format(self.format)
            .components(self.components)
            .subresource_range(self.subresource_range);

        match unsafe { device.raw().create_image_view(&create_info, None) } {
            Ok(handle) => Some(ImageView {
                object: GpuObject::new(device, handle),
            }),
            Err(result) => {
                log::error!("Failed to create {:?} image view: {result}", self.format);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wrapper::test_support::headless;

    #[test]
    fn test_image_builder_defaults() {
        let builder = ImageBuilder::new();
        assert_eq!(builder.image_type, vk::ImageType::TYPE_2D);
        assert_eq!(builder.extent.depth, 1);
        assert_eq!(
            builder.usage,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED
        );
        assert_eq!(builder.initial_layout, vk::ImageLayout::UNDEFINED);
    }

    #[test]
    fn test_view_builder_defaults() {
        let builder = ImageViewBuilder::new();
        assert_eq!(builder.components.r, vk::ComponentSwizzle::IDENTITY);
        assert_eq!(builder.subresource_range.aspect_mask, vk::ImageAspectFlags::COLOR);
        assert_eq!(builder.subresource_range.level_count, 1);
    }

    #[test]
    fn test_barrier_targets_image() {
        let Some(gpu) = headless() else {
            return;
        };
        let image = ImageBuilder::new()
            .set_format(vk::Format::R8G8B8A8_UNORM)
            .set_dimensions(4, 4, 1)
            .build(&gpu.device)
            .unwrap();
        let barrier = image.create_memory_barrier(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
        );
        assert_eq!(barrier.image, image.handle());
        assert_eq!(barrier.src_queue_family_index, vk::QUEUE_FAMILY_IGNORED);
        assert_eq!(barrier.subresource_range.layer_count, 1);
    }
}
