//! Render passes and their builder

use ash::vk;
use std::rc::Rc;

use super::device::Device;
use super::object::GpuObject;
use crate::error::{VulkanError, VulkanResult};

/// Render pass
pub struct RenderPass {
    object: GpuObject<Device, vk::RenderPass>,
    attachment_count: u32,
}

impl RenderPass {
    /// Native handle
    pub fn handle(&self) -> vk::RenderPass {
        self.object.handle()
    }

    /// Whether the native handle is non-null
    pub fn is_valid(&self) -> bool {
        self.object.is_valid()
    }

    /// Number of attachments a compatible framebuffer must provide
    pub fn attachment_count(&self) -> u32 {
        self.attachment_count
    }

    /// Optimal render-area granularity
    pub fn render_area_granularity(&self) -> VulkanResult<vk::Extent2D> {
        let device = self.object.require_parent()?;
        Ok(unsafe { device.raw().get_render_area_granularity(self.handle()) })
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        self.object.release_with(|device, handle| unsafe {
            device.raw().destroy_render_pass(handle, None);
        });
    }
}

/// Attachment references used by one subpass
///
/// Owned so the native description can point into it during build.
#[derive(Debug, Clone, Default)]
pub struct SubpassInfo {
    /// Input attachments
    pub input_attachments: Vec<vk::AttachmentReference>,
    /// Colour attachments
    pub color_attachments: Vec<vk::AttachmentReference>,
    /// Resolve targets, empty or one per colour attachment
    pub resolve_attachments: Vec<vk::AttachmentReference>,
    /// Depth/stencil attachment
    pub depth_stencil_attachment: Option<vk::AttachmentReference>,
    /// Attachments whose contents must survive this subpass
    pub preserve_attachments: Vec<u32>,
}

impl SubpassInfo {
    /// Subpass writing colour attachment 0
    pub fn single_color() -> Self {
        Self {
            color_attachments: vec![vk::AttachmentReference {
                attachment: 0,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            }],
            ..Self::default()
        }
    }
}

/// Colour attachment cleared on load, stored, and left ready for presentation
pub fn present_color_attachment(format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription::builder()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .build()
}

/// External-to-first-subpass dependency on colour attachment output
pub fn external_color_dependency() -> vk::SubpassDependency {
    vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
        .build()
}

/// Builder for [`RenderPass`]
///
/// With nothing added, builds a single-subpass pass over one
/// `B8G8R8A8_SRGB` colour attachment (see [`present_color_attachment`]) with
/// an external colour-output dependency.
#[derive(Debug, Clone, Default)]
pub struct RenderPassBuilder {
    flags: vk::RenderPassCreateFlags,
    attachments: Vec<vk::AttachmentDescription>,
    subpasses: Vec<SubpassInfo>,
    dependencies: Vec<vk::SubpassDependency>,
}

impl RenderPassBuilder {
    /// Empty builder; defaults apply to whatever stays empty
    pub fn new() -> Self {
        Self::default()
    }

    /// Creation flags
    pub fn set_flags(&mut self, flags: vk::RenderPassCreateFlags) -> &mut Self {
        self.flags = flags;
        self
    }

    /// Add an attachment description
    pub fn add_attachment(&mut self, attachment: vk::AttachmentDescription) -> &mut Self {
        self.attachments.push(attachment);
        self
    }

    /// Add a graphics subpass
    pub fn add_subpass(&mut self, subpass: SubpassInfo) -> &mut Self {
        self.subpasses.push(subpass);
        self
    }

    /// Add a dependency between subpasses
    pub fn add_dependency(&mut self, dependency: vk::SubpassDependency) -> &mut Self {
        self.dependencies.push(dependency);
        self
    }

    fn resolved(&self) -> (Vec<vk::AttachmentDescription>, Vec<SubpassInfo>, Vec<vk::SubpassDependency>) {
        let attachments = if self.attachments.is_empty() {
            vec![present_color_attachment(vk::Format::B8G8R8A8_SRGB)]
        } else {
            self.attachments.clone()
        };
        let subpasses = if self.subpasses.is_empty() {
            vec![SubpassInfo::single_color()]
        } else {
            self.subpasses.clone()
        };
        let dependencies = if self.dependencies.is_empty() {
            vec![external_color_dependency()]
        } else {
            self.dependencies.clone()
        };
        (attachments, subpasses, dependencies)
    }

    /// Create the render pass on `device`
    pub fn build(&self, device: &Rc<Device>) -> Option<RenderPass> {
        let (attachments, subpasses, dependencies) = self.resolved();
        let descriptions: Vec<_> = subpasses
            .iter()
            .map(|subpass| {
                let mut description = vk::SubpassDescription::builder()
                    .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                    .input_attachments(&subpass.input_attachments)
                    .color_attachments(&subpass.color_attachments)
                    .preserve_attachments(&subpass.preserve_attachments);
                if !subpass.resolve_attachments.is_empty() {
                    description = description.resolve_attachments(&subpass.resolve_attachments);
                }
                if let Some(depth) = subpass.depth_stencil_attachment.as_ref() {
                    description = description.depth_stencil_attachment(depth);
                }
                description.build()
            })
            .collect();

        let create_info = vk::RenderPassCreateInfo::builder()
            .flags(self.flags)
            .attachments(&attachments)
            .subpasses(&descriptions)
            .dependencies(&dependencies);

        match unsafe { device.raw().create_render_pass(&create_info, None) } {
            Ok(handle) => Some(RenderPass {
                object: GpuObject::new(device, handle),
                attachment_count: u32::try_from(attachments.len()).unwrap_or(u32::MAX),
            }),
            Err(result) => {
                log::error!("Failed to create render pass: {result}");
                None
            }
        }
    }

    /// Like [`RenderPassBuilder::build`] but reporting failure as an error
    pub fn try_build(&self, device: &Rc<Device>) -> VulkanResult<RenderPass> {
        self.build(device)
            .ok_or(VulkanError::BuildFailed { object: "render pass" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wrapper::test_support::headless;

    #[test]
    fn test_empty_builder_resolves_to_present_pass() {
        let (attachments, subpasses, dependencies) = RenderPassBuilder::new().resolved();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(attachments[0].load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(attachments[0].store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(attachments[0].initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(attachments[0].final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(subpasses[0].color_attachments.len(), 1);
        assert_eq!(dependencies[0].src_subpass, vk::SUBPASS_EXTERNAL);
    }

    #[test]
    fn test_added_attachments_replace_default() {
        let mut builder = RenderPassBuilder::new();
        builder
            .add_attachment(present_color_attachment(vk::Format::R8G8B8A8_UNORM))
            .add_attachment(present_color_attachment(vk::Format::D32_SFLOAT));
        let (attachments, subpasses, _) = builder.resolved();
        assert_eq!(attachments.len(), 2);
        assert_eq!(attachments[0].format, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(subpasses.len(), 1);
    }

    #[test]
    fn test_default_pass_granularity() {
        let Some(gpu) = headless() else {
            return;
        };
        let render_pass = RenderPassBuilder::new().try_build(&gpu.device).unwrap();
        assert_eq!(render_pass.attachment_count(), 1);
        let granularity = render_pass.render_area_granularity().unwrap();
        assert!(granularity.width >= 1 && granularity.height >= 1);
    }
}
