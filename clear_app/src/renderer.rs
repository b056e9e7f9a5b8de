//! Swap chain, clear pass and per-frame synchronization

use ash::extensions::khr;
use ash::vk;
use std::rc::Rc;
use vulkan_framework::framework::{
    BufferResourceCreateInfo, BufferWriteRequest, DescriptorLayoutInfo, DescriptorResourceCreateInfo,
    DescriptorSetInfo, DescriptorUpdateInfo, ResourceDescriptor, ResourceManager,
};
use vulkan_framework::wrapper::render_pass::{external_color_dependency, present_color_attachment};
use vulkan_framework::wrapper::{
    CommandBuffer, CommandPool, CommandPoolBuilder, Device, DeviceBuilder, Fence, Framebuffer, FramebufferBuilder,
    Instance, PhysicalDevice, PhysicalDeviceSelector, Queue, RenderPass, RenderPassBuilder, Semaphore, SubpassInfo,
    Surface, SwapChain, SwapChainBuilder,
};
use vulkan_framework::{VulkanError, VulkanResult};

const FRAMES_IN_FLIGHT: usize = 2;
const FRAME_BUFFER: &str = "frame";

/// Per-frame parameters published through the "frame" descriptor set
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct FrameUniform {
    clear_color: [f32; 4],
    frame_index: u32,
    _padding: [u32; 3],
}

struct FrameSync {
    in_flight: Fence,
    image_available: Semaphore,
    render_finished: Semaphore,
}

impl FrameSync {
    fn new(device: &Rc<Device>) -> VulkanResult<Self> {
        let semaphore = || Semaphore::new(device).ok_or(VulkanError::BuildFailed { object: "semaphore" });
        Ok(Self {
            in_flight: Fence::new(device, vk::FenceCreateFlags::SIGNALED)
                .ok_or(VulkanError::BuildFailed { object: "fence" })?,
            image_available: semaphore()?,
            render_finished: semaphore()?,
        })
    }
}

/// Clears every swap chain image to a slowly cycling color
///
/// Fields are ordered so that dropping the renderer releases frame objects
/// before the swap chain, and the swap chain before its surface.
pub struct Renderer {
    frames: Vec<FrameSync>,
    command_buffers: Vec<CommandBuffer>,
    framebuffers: Vec<Framebuffer>,
    render_pass: RenderPass,
    swapchain: SwapChain,
    resources: ResourceManager,
    command_pool: Rc<CommandPool>,
    queue: Queue,
    surface: Surface,
    device: Rc<Device>,
    physical_device: Rc<PhysicalDevice>,
    current_frame: usize,
    frame_count: u64,
}

impl Renderer {
    pub fn new(instance: &Rc<Instance>, surface: Surface, extent: vk::Extent2D) -> VulkanResult<Self> {
        let physical_device = PhysicalDeviceSelector::new()
            .filter_by_queue_types(vk::QueueFlags::GRAPHICS)
            .filter_by_surface_support(&surface)
            .select(instance)
            .into_iter()
            .next()
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: "no GPU can present to the window".to_string(),
            })?;
        if let Ok(properties) = physical_device.properties() {
            // SAFETY: the driver fills device_name with a NUL-terminated string
            let name = unsafe { std::ffi::CStr::from_ptr(properties.device_name.as_ptr()) };
            log::info!("Using {}", name.to_string_lossy());
        }

        let queue_family = physical_device
            .surface_supported_queue_family_index(&surface)?
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: "no graphics queue family can present".to_string(),
            })?;
        let device = DeviceBuilder::new()
            .add_queue_info(queue_family, &[1.0])
            .add_extension(khr::Swapchain::name().to_string_lossy())
            .build(&physical_device)
            .ok_or(VulkanError::BuildFailed { object: "device" })?;
        let queue = device.queue(queue_family, 0);

        let swapchain = build_swapchain(&physical_device, &device, &surface, extent, vk::SwapchainKHR::null())?;
        let render_pass = build_render_pass(&device, swapchain.format())?;
        let framebuffers = build_framebuffers(&device, &render_pass, &swapchain)?;

        let command_pool = CommandPoolBuilder::new()
            .set_flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .set_queue_family_index(queue_family)
            .build(&device)
            .ok_or(VulkanError::BuildFailed { object: "command pool" })?;
        let command_buffers =
            command_pool.create_command_buffers(FRAMES_IN_FLIGHT as u32, vk::CommandBufferLevel::PRIMARY)?;
        let frames = (0..FRAMES_IN_FLIGHT)
            .map(|_| FrameSync::new(&device))
            .collect::<VulkanResult<Vec<_>>>()?;

        let mut resources = ResourceManager::new(&physical_device, &device);
        create_frame_resources(&mut resources)?;

        log::info!(
            "Renderer ready: {} swap chain images at {}x{}",
            swapchain.images().len(),
            swapchain.extent().width,
            swapchain.extent().height
        );

        Ok(Self {
            frames,
            command_buffers,
            framebuffers,
            render_pass,
            swapchain,
            resources,
            command_pool,
            queue,
            surface,
            device,
            physical_device,
            current_frame: 0,
            frame_count: 0,
        })
    }

    /// Record, submit and present one frame
    ///
    /// `window_extent` is used when the swap chain has to be rebuilt.
    pub fn draw_frame(&mut self, window_extent: vk::Extent2D, resized: bool) -> VulkanResult<()> {
        let sync = &self.frames[self.current_frame];
        sync.in_flight.wait(true, u64::MAX)?;

        let image_index = match self
            .swapchain
            .acquire_next_image(Some(&sync.image_available), None, u64::MAX)
        {
            Ok((index, _)) => index,
            Err(VulkanError::Api {
                result: vk::Result::ERROR_OUT_OF_DATE_KHR,
                ..
            }) => return self.recreate_swapchain(window_extent),
            Err(e) => return Err(e),
        };
        sync.in_flight.reset()?;

        let clear_color = cycle_color(self.frame_count);
        self.resources.set_buffer(
            FRAME_BUFFER,
            &[FrameUniform {
                clear_color,
                frame_index: u32::try_from(self.frame_count % u64::from(u32::MAX)).unwrap_or(0),
                _padding: [0; 3],
            }],
        )?;

        let command_buffer = &self.command_buffers[self.current_frame];
        command_buffer.reset(vk::CommandBufferResetFlags::empty())?;
        let mut recorder = command_buffer.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        recorder
            .begin_render_pass(
                self.render_pass.handle(),
                self.framebuffers[image_index as usize].handle(),
                vk::Rect2D {
                    offset: vk::Offset2D::default(),
                    extent: self.swapchain.extent(),
                },
                &[vk::ClearValue {
                    color: vk::ClearColorValue { float32: clear_color },
                }],
                vk::SubpassContents::INLINE,
            )
            .end_render_pass();
        recorder.end()?;

        self.queue.submit(
            &[command_buffer],
            &[(&sync.image_available, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)],
            &[&sync.render_finished],
            Some(&sync.in_flight),
        )?;
        let stale = self
            .queue
            .present(&self.swapchain, image_index, &[&sync.render_finished])?;

        self.current_frame = (self.current_frame + 1) % FRAMES_IN_FLIGHT;
        self.frame_count += 1;

        if stale || resized {
            self.recreate_swapchain(window_extent)?;
        }
        Ok(())
    }

    /// Frames presented so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Block until the GPU has finished every submitted frame
    pub fn wait_idle(&self) -> VulkanResult<()> {
        self.device.wait_idle()
    }

    fn recreate_swapchain(&mut self, extent: vk::Extent2D) -> VulkanResult<()> {
        // Minimized
        if extent.width == 0 || extent.height == 0 {
            return Ok(());
        }
        self.device.wait_idle()?;
        self.framebuffers.clear();

        let swapchain = build_swapchain(
            &self.physical_device,
            &self.device,
            &self.surface,
            extent,
            self.swapchain.handle(),
        )?;
        if swapchain.format() != self.swapchain.format() {
            self.render_pass = build_render_pass(&self.device, swapchain.format())?;
        }
        self.swapchain = swapchain;
        self.framebuffers = build_framebuffers(&self.device, &self.render_pass, &self.swapchain)?;
        log::debug!(
            "Recreated swap chain at {}x{}",
            self.swapchain.extent().width,
            self.swapchain.extent().height
        );
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            log::warn!("Device did not go idle before teardown: {e}");
        }
        log::debug!(
            "Releasing renderer ({} command buffers from pool {:?})",
            self.command_buffers.len(),
            self.command_pool.handle()
        );
    }
}

fn build_swapchain(
    physical_device: &PhysicalDevice,
    device: &Rc<Device>,
    surface: &Surface,
    extent: vk::Extent2D,
    old: vk::SwapchainKHR,
) -> VulkanResult<SwapChain> {
    let capabilities = physical_device.surface_capabilities(surface)?;
    let format = physical_device.surface_format(surface)?;
    let present_modes = physical_device.surface_present_modes(surface)?;

    let mut builder = SwapChainBuilder::new();
    builder
        .fit_capabilities(&capabilities, extent)
        .set_surface_format(format)
        .set_old_swapchain(old);
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        builder.set_present_mode(vk::PresentModeKHR::MAILBOX);
    }
    builder
        .build(device, surface)
        .ok_or(VulkanError::BuildFailed { object: "swap chain" })
}

fn build_render_pass(device: &Rc<Device>, format: vk::Format) -> VulkanResult<RenderPass> {
    RenderPassBuilder::new()
        .add_attachment(present_color_attachment(format))
        .add_subpass(SubpassInfo::single_color())
        .add_dependency(external_color_dependency())
        .try_build(device)
}

fn build_framebuffers(
    device: &Rc<Device>,
    render_pass: &RenderPass,
    swapchain: &SwapChain,
) -> VulkanResult<Vec<Framebuffer>> {
    let extent = swapchain.extent();
    swapchain
        .views()
        .iter()
        .map(|view| {
            FramebufferBuilder::new()
                .set_dimensions(extent.width, extent.height, 1)
                .add_attachment(view.handle())
                .build(device, render_pass)
                .ok_or(VulkanError::BuildFailed { object: "framebuffer" })
        })
        .collect()
}

/// Uniform buffer plus a descriptor set pointing at it
fn create_frame_resources(resources: &mut ResourceManager) -> VulkanResult<()> {
    resources.create_resources(&ResourceDescriptor {
        buffers: Some(vec![BufferResourceCreateInfo::new(
            FRAME_BUFFER,
            std::mem::size_of::<FrameUniform>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )]),
        descriptors: Some(DescriptorResourceCreateInfo {
            max_sets: 1,
            pool_sizes: vec![vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: 1,
            }],
            layouts: vec![DescriptorLayoutInfo {
                name: FRAME_BUFFER.to_string(),
                bindings: vec![vk::DescriptorSetLayoutBinding::builder()
                    .binding(0)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::FRAGMENT)
                    .build()],
            }],
            descriptor_sets: vec![DescriptorSetInfo {
                name: FRAME_BUFFER.to_string(),
                layout_name: FRAME_BUFFER.to_string(),
            }],
        }),
        ..Default::default()
    })?;

    let buffer = resources.buffer(FRAME_BUFFER)?.handle();
    resources.update_descriptor_set(&DescriptorUpdateInfo {
        buffer_writes: vec![BufferWriteRequest {
            set_name: FRAME_BUFFER.to_string(),
            binding: 0,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            buffers: vec![vk::DescriptorBufferInfo {
                buffer,
                offset: 0,
                range: vk::WHOLE_SIZE,
            }],
            array_element: 0,
        }],
        ..Default::default()
    })?;
    Ok(())
}

/// Color for frame `frame`, one hue cycle every 600 frames
fn cycle_color(frame: u64) -> [f32; 4] {
    let phase = (frame % 600) as f32 / 600.0 * std::f32::consts::TAU;
    let channel = |offset: f32| 0.5 + 0.5 * (phase + offset).sin();
    [
        channel(0.0),
        channel(2.0 * std::f32::consts::FRAC_PI_3),
        channel(4.0 * std::f32::consts::FRAC_PI_3),
        1.0,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_color_stays_in_range() {
        for frame in [0, 1, 150, 300, 599, 600, 12_345] {
            let color = cycle_color(frame);
            assert!(color.iter().all(|c| (0.0..=1.0).contains(c)));
            assert_eq!(color[3], 1.0);
        }
        assert_eq!(cycle_color(0), cycle_color(600));
    }

    #[test]
    fn test_frame_uniform_layout() {
        assert_eq!(std::mem::size_of::<FrameUniform>(), 32);
    }
}
