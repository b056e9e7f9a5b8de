//! Framebuffers

use ash::vk;
use std::rc::Rc;

use super::device::Device;
use super::object::GpuObject;
use super::render_pass::RenderPass;

/// Framebuffer binding image views to a render pass's attachments
pub struct Framebuffer {
    object: GpuObject<Device, vk::Framebuffer>,
    extent: vk::Extent2D,
}

impl Framebuffer {
    /// Native handle
    pub fn handle(&self) -> vk::Framebuffer {
        self.object.handle()
    }

    /// Whether the native handle is non-null
    pub fn is_valid(&self) -> bool {
        self.object.is_valid()
    }

    /// Width and height
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        self.object.release_with(|device, handle| unsafe {
            device.raw().destroy_framebuffer(handle, None);
        });
    }
}

/// Builder for [`Framebuffer`]
#[derive(Debug, Clone)]
pub struct FramebufferBuilder {
    flags: vk::FramebufferCreateFlags,
    attachments: Vec<vk::ImageView>,
    width: u32,
    height: u32,
    layers: u32,
}

impl Default for FramebufferBuilder {
    fn default() -> Self {
        Self {
            flags: vk::FramebufferCreateFlags::empty(),
            attachments: Vec::new(),
            width: 0,
            height: 0,
            layers: 1,
        }
    }
}

impl FramebufferBuilder {
    /// Zero-sized single-layer framebuffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Creation flags
    pub fn set_flags(&mut self, flags: vk::FramebufferCreateFlags) -> &mut Self {
        self.flags = flags;
        self
    }

    /// Width, height and layer count
    pub fn set_dimensions(&mut self, width: u32, height: u32, layers: u32) -> &mut Self {
        self.width = width;
        self.height = height;
        self.layers = layers;
        self
    }

    /// Append an attachment view, in render-pass attachment order
    pub fn add_attachment(&mut self, view: vk::ImageView) -> &mut Self {
        self.attachments.push(view);
        self
    }

    /// Create the framebuffer on `device` for `render_pass`
    pub fn build(&self, device: &Rc<Device>, render_pass: &RenderPass) -> Option<Framebuffer> {
        let create_info = vk::FramebufferCreateInfo::builder()
            .flags(self.flags)
            .render_pass(render_pass.handle())
            .attachments(&self.attachments)
            .width(self.width)
            .height(self.height)
            .layers(self.layers);

        match unsafe { device.raw().create_framebuffer(&create_info, None) } {
            Ok(handle) => Some(Framebuffer {
                object: GpuObject::new(device, handle),
                extent: vk::Extent2D {
                    width: self.width,
                    height: self.height,
                },
            }),
            Err(result) => {
                log::error!(
                    "Failed to create {}x{} framebuffer: {result}",
                    self.width,
                    self.height
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wrapper::image::{ImageBuilder, ImageViewBuilder};
    use crate::wrapper::render_pass::{present_color_attachment, RenderPassBuilder};
    use crate::wrapper::test_support::headless;

    #[test]
    fn test_single_layer_default() {
        let mut builder = FramebufferBuilder::new();
        assert_eq!(builder.layers, 1);
        builder.set_dimensions(640, 480, 2);
        assert_eq!((builder.width, builder.height, builder.layers), (640, 480, 2));
    }

    #[test]
    fn test_framebuffer_over_offscreen_image() {
        let Some(gpu) = headless() else {
            return;
        };
        let format = vk::Format::R8G8B8A8_UNORM;
        let mut attachment = present_color_attachment(format);
        attachment.final_layout = vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL;
        let render_pass = RenderPassBuilder::new()
            .add_attachment(attachment)
            .build(&gpu.device)
            .unwrap();

        let image = ImageBuilder::new()
            .set_format(format)
            .set_dimensions(64, 64, 1)
            .set_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .build(&gpu.device)
            .unwrap();
        let requirements = image.memory_requirements().unwrap();
        let index = gpu
            .physical_device
            .find_memory_type(requirements.memory_type_bits, vk::MemoryPropertyFlags::DEVICE_LOCAL)
            .unwrap();
        let memory = gpu.device.allocate_memory(requirements.size, index).unwrap();
        image.bind_memory(&memory, 0).unwrap();
        let view = ImageViewBuilder::new()
            .set_format(format)
            .build(&gpu.device, image.handle())
            .unwrap();

        let framebuffer = FramebufferBuilder::new()
            .set_dimensions(64, 64, 1)
            .add_attachment(view.handle())
            .build(&gpu.device, &render_pass)
            .unwrap();
        assert_eq!(framebuffer.extent().width, 64);
    }
}
