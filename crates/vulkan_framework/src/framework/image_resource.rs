//! Image plus bound memory and named views, with synchronous upload helpers

use ash::vk;
use std::collections::HashMap;
use std::rc::Rc;

use super::{allocate_bound_memory, bind_or_release};
use crate::error::{VulkanError, VulkanResult};
use crate::wrapper::{
    color_subresource_range, Buffer, CommandPool, CommandRecorder, Device, DeviceMemory, Image, ImageBuilder,
    ImageView, ImageViewBuilder, PhysicalDevice, Queue,
};

/// One view created alongside an [`ImageResource`]
#[derive(Debug, Clone)]
pub struct ImageViewCreateInfo {
    /// Lookup key within the image
    pub name: String,
    /// View creation flags
    pub flags: vk::ImageViewCreateFlags,
    /// View dimensionality
    pub view_type: vk::ImageViewType,
    /// View format
    pub format: vk::Format,
    /// Channel swizzle
    pub components: vk::ComponentMapping,
    /// Visible subresources
    pub subresource_range: vk::ImageSubresourceRange,
}

impl Default for ImageViewCreateInfo {
    fn default() -> Self {
        Self {
            name: String::new(),
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

/// What to create for an [`ImageResource`]
#[derive(Debug, Clone)]
pub struct ImageResourceCreateInfo {
    /// Registry key
    pub name: String,
    /// Required memory properties
    pub memory_properties: vk::MemoryPropertyFlags,
    /// Image creation flags
    pub flags: vk::ImageCreateFlags,
    /// Image dimensionality
    pub image_type: vk::ImageType,
    /// Texel format
    pub format: vk::Format,
    /// Width, height, depth
    pub dimensions: vk::Extent3D,
    /// Mip level count
    pub mip_levels: u32,
    /// Array layer count
    pub array_layers: u32,
    /// Sample count
    pub samples: vk::SampleCountFlags,
    /// Texel tiling
    pub tiling: vk::ImageTiling,
    /// Image usage
    pub usage: vk::ImageUsageFlags,
    /// Layout at creation
    pub initial_layout: vk::ImageLayout,
    /// Views created right after the memory is bound
    pub views: Vec<ImageViewCreateInfo>,
}

impl Default for ImageResourceCreateInfo {
    fn default() -> Self {
        Self {
            name: String::new(),
            memory_properties: vk::MemoryPropertyFlags::empty(),
            flags: vk::ImageCreateFlags::empty(),
            image_type: vk::ImageType::TYPE_2D,
            format: vk::Format::UNDEFINED,
            dimensions: vk::Extent3D::default(),
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            initial_layout: vk::ImageLayout::UNDEFINED,
            views: Vec::new(),
        }
    }
}

/// Access masks and pipeline stages for one layout change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTransition {
    /// Accesses that must complete before the transition
    pub src_access: vk::AccessFlags,
    /// Accesses that wait for the transition
    pub dst_access: vk::AccessFlags,
    /// Stage the source accesses happen in
    pub src_stage: vk::PipelineStageFlags,
    /// Stage the destination accesses happen in
    pub dst_stage: vk::PipelineStageFlags,
}

/// Masks for the upload transitions
///
/// Only `UNDEFINED -> TRANSFER_DST_OPTIMAL` and
/// `TRANSFER_DST_OPTIMAL -> SHADER_READ_ONLY_OPTIMAL` are known; anything else
/// is [`VulkanError::UnsupportedLayoutTransition`].
pub fn layout_transition(old: vk::ImageLayout, new: vk::ImageLayout) -> VulkanResult<LayoutTransition> {
    match (old, new) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Ok(LayoutTransition {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        }),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => Ok(LayoutTransition {
            src_access: vk::AccessFlags::TRANSFER_WRITE,
            dst_access: vk::AccessFlags::SHADER_READ,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
        }),
        _ => Err(VulkanError::UnsupportedLayoutTransition { old, new }),
    }
}

/// Record with `record` into a fresh primary buffer from `pool`, submit to `queue` and wait
///
/// The queue is idle when this returns; the command buffer is freed on return.
pub fn submit_one_shot<F>(pool: &Rc<CommandPool>, queue: &Queue, record: F) -> VulkanResult<()>
where
    F: FnOnce(&mut CommandRecorder<'_>),
{
    let command_buffer = pool
        .create_command_buffers(1, vk::CommandBufferLevel::PRIMARY)?
        .pop()
        .ok_or(VulkanError::BuildFailed { object: "command buffer" })?;

    let mut recorder = command_buffer.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
    record(&mut recorder);
    recorder.end()?;

    queue.submit(&[&command_buffer], &[], &[], None)?;
    queue.wait_idle()
}

/// Image with its own memory allocation and named views
///
/// Fields drop in declaration order: views, then the image, then its memory.
pub struct ImageResource {
    name: String,
    format: vk::Format,
    extent: vk::Extent3D,
    views: HashMap<String, ImageView>,
    image: Image,
    memory: DeviceMemory,
}

impl ImageResource {
    /// Create the image, bind fresh memory at offset 0 and create every view
    pub fn create(
        physical_device: &PhysicalDevice,
        device: &Rc<Device>,
        info: &ImageResourceCreateInfo,
    ) -> VulkanResult<Self> {
        let image = ImageBuilder::new()
            .set_flags(info.flags)
            .set_image_type(info.image_type)
            .set_format(info.format)
            .set_dimensions(info.dimensions.width, info.dimensions.height, info.dimensions.depth)
            .set_mip_levels(info.mip_levels)
            .set_array_layers(info.array_layers)
            .set_samples(info.samples)
            .set_tiling(info.tiling)
            .set_usage(info.usage)
            .set_initial_layout(info.initial_layout)
            .build(device)
            .ok_or(VulkanError::BuildFailed { object: "image" })?;

        let requirements = image.memory_requirements()?;
        let memory = allocate_bound_memory(physical_device, device, &requirements, info.memory_properties)?;
        let (image, memory) = bind_or_release(image, memory, |image, memory| image.bind_memory(memory, 0))?;

        // Views go straight into the resource so a failed view releases everything in order
        let mut resource = Self {
            name: info.name.clone(),
            format: info.format,
            extent: info.dimensions,
            views: HashMap::with_capacity(info.views.len()),
            image,
            memory,
        };
        for view_info in &info.views {
            let view = ImageViewBuilder::new()
                .set_flags(view_info.flags)
                .set_view_type(view_info.view_type)
                .set_format(view_info.format)
                .set_components(view_info.components)
                .set_subresource_range(view_info.subresource_range)
                .build(device, resource.image.handle())
                .ok_or(VulkanError::BuildFailed { object: "image view" })?;
            resource.views.insert(view_info.name.clone(), view);
        }

        log::debug!(
            "Created image '{}' ({:?}, {}x{}x{}, {} views)",
            info.name,
            info.format,
            info.dimensions.width,
            info.dimensions.height,
            info.dimensions.depth,
            resource.views.len()
        );
        Ok(resource)
    }

    /// Registry key
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Texel format the image was created with
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Width, height and depth of mip 0
    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }

    /// The image object
    pub fn image(&self) -> &Image {
        &self.image
    }

    /// The backing allocation
    pub fn memory(&self) -> &DeviceMemory {
        &self.memory
    }

    /// View registered under `name`
    pub fn image_view(&self, name: &str) -> VulkanResult<&ImageView> {
        self.views
            .get(name)
            .ok_or_else(|| VulkanError::not_found("image view", name))
    }

    /// Names of all views
    pub fn view_names(&self) -> impl Iterator<Item = &str> {
        self.views.keys().map(String::as_str)
    }

    /// Move the colour subresource from `old` to `new`, blocking until done
    pub fn change_image_layout(
        &self,
        pool: &Rc<CommandPool>,
        queue: &Queue,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    ) -> VulkanResult<()> {
        let transition = layout_transition(old, new)?;
        let barrier = self
            .image
            .create_memory_barrier(old, new, transition.src_access, transition.dst_access);
        log::trace!("Transitioning image '{}' {old:?} -> {new:?}", self.name);
        submit_one_shot(pool, queue, |recorder| {
            recorder.pipeline_barrier(
                transition.src_stage,
                transition.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        })
    }

    /// Copy `region` of `staging` into the image, which must be in `TRANSFER_DST_OPTIMAL`
    pub fn copy_data_from_buffer(
        &self,
        pool: &Rc<CommandPool>,
        queue: &Queue,
        staging: &Buffer,
        region: vk::BufferImageCopy,
    ) -> VulkanResult<()> {
        log::trace!("Copying buffer into image '{}'", self.name);
        submit_one_shot(pool, queue, |recorder| {
            recorder.copy_buffer_to_image(
                staging.handle(),
                self.image.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        })
    }
}

/// Tightly packed colour copy of mip 0, layer 0 covering `extent`
pub(crate) fn full_copy_region(extent: vk::Extent3D) -> vk::BufferImageCopy {
    vk::BufferImageCopy {
        buffer_offset: 0,
        buffer_row_length: 0,
        buffer_image_height: 0,
        image_subresource: vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        },
        image_offset: vk::Offset3D::default(),
        image_extent: extent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::{BufferResource, BufferResourceCreateInfo};
    use crate::wrapper::test_support::headless;

    #[test]
    fn test_upload_transitions_are_known() {
        let to_dst = layout_transition(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL).unwrap();
        assert_eq!(to_dst.src_access, vk::AccessFlags::empty());
        assert_eq!(to_dst.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(to_dst.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(to_dst.dst_stage, vk::PipelineStageFlags::TRANSFER);

        let to_read = layout_transition(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(to_read.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(to_read.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(to_read.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn test_other_transitions_are_rejected() {
        let pairs = [
            (vk::ImageLayout::UNDEFINED, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            (vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
            (vk::ImageLayout::UNDEFINED, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
        ];
        for (old, new) in pairs {
            match layout_transition(old, new) {
                Err(VulkanError::UnsupportedLayoutTransition { old: o, new: n }) => {
                    assert_eq!((o, n), (old, new));
                }
                other => panic!("expected rejection for {old:?} -> {new:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_default_create_info() {
        let info = ImageResourceCreateInfo::default();
        assert_eq!(info.image_type, vk::ImageType::TYPE_2D);
        assert_eq!(info.mip_levels, 1);
        assert_eq!(info.tiling, vk::ImageTiling::OPTIMAL);
        assert_eq!(info.usage, vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED);
        let view = ImageViewCreateInfo::default();
        assert_eq!(view.subresource_range.aspect_mask, vk::ImageAspectFlags::COLOR);
        assert_eq!(view.components.r, vk::ComponentSwizzle::IDENTITY);
    }

    #[test]
    fn test_create_upload_and_lookup_views() {
        let Some(gpu) = headless() else {
            return;
        };
        let format = vk::Format::R8G8B8A8_UNORM;
        let info = ImageResourceCreateInfo {
            name: "checker".into(),
            memory_properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            format,
            dimensions: vk::Extent3D {
                width: 4,
                height: 4,
                depth: 1,
            },
            views: vec![ImageViewCreateInfo {
                name: "color".into(),
                format,
                ..Default::default()
            }],
            ..Default::default()
        };
        let image = ImageResource::create(&gpu.physical_device, &gpu.device, &info).unwrap();
        assert_eq!(image.format(), format);
        assert_eq!(image.extent(), info.dimensions);
        assert!(image.image_view("color").unwrap().is_valid());
        assert!(matches!(
            image.image_view("depth"),
            Err(VulkanError::NotFound { .. })
        ));

        let mut staging = BufferResource::create(
            &gpu.physical_device,
            &gpu.device,
            &BufferResourceCreateInfo::new(
                "staging",
                64,
                vk::BufferUsageFlags::TRANSFER_SRC,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            ),
        )
        .unwrap();
        staging.map_memory(vk::WHOLE_SIZE, 0).unwrap();
        staging.flush_data(&[0xff; 64]).unwrap();
        staging.unmap_memory().unwrap();

        let pool = gpu.command_pool();
        let queue = gpu.queue();
        image
            .change_image_layout(
                &pool,
                &queue,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )
            .unwrap();
        image
            .copy_data_from_buffer(&pool, &queue, staging.buffer(), full_copy_region(info.dimensions))
            .unwrap();
        image
            .change_image_layout(
                &pool,
                &queue,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )
            .unwrap();
        assert!(image
            .change_image_layout(
                &pool,
                &queue,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )
            .is_err());
    }
}
