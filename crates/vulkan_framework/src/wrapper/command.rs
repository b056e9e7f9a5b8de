//! Command pools, command buffers and recording

use ash::vk;
use std::rc::Rc;

use super::device::Device;
use super::object::GpuObject;
use crate::error::{VulkanError, VulkanResult};

/// Command pool bound to one queue family
pub struct CommandPool {
    object: GpuObject<Device, vk::CommandPool>,
    queue_family_index: u32,
}

impl CommandPool {
    /// Native handle
    pub fn handle(&self) -> vk::CommandPool {
        self.object.handle()
    }

    /// Whether the native handle is non-null
    pub fn is_valid(&self) -> bool {
        self.object.is_valid()
    }

    /// Queue family the pool's buffers may be submitted to
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    /// Owning device, `None` if dropped
    pub fn device(&self) -> Option<Rc<Device>> {
        self.object.parent()
    }

    /// Allocate `count` command buffers at `level`
    pub fn create_command_buffers(
        self: &Rc<Self>,
        count: u32,
        level: vk::CommandBufferLevel,
    ) -> VulkanResult<Vec<CommandBuffer>> {
        let device = self.object.require_parent()?;
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.handle())
            .level(level)
            .command_buffer_count(count);

        let handles = unsafe {
            device
                .raw()
                .allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::api("vkAllocateCommandBuffers"))?
        };
        Ok(handles
            .into_iter()
            .map(|handle| CommandBuffer {
                object: GpuObject::new(self, handle),
            })
            .collect())
    }

    /// Reset every command buffer allocated from this pool
    pub fn reset(&self, flags: vk::CommandPoolResetFlags) -> VulkanResult<()> {
        let device = self.object.require_parent()?;
        unsafe {
            device
                .raw()
                .reset_command_pool(self.handle(), flags)
                .map_err(VulkanError::api("vkResetCommandPool"))
        }
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        self.object.release_with(|device, handle| unsafe {
            let _ = device.raw().device_wait_idle();
            device.raw().destroy_command_pool(handle, None);
        });
    }
}

/// Builder for [`CommandPool`]
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandPoolBuilder {
    flags: vk::CommandPoolCreateFlags,
    queue_family_index: u32,
}

impl CommandPoolBuilder {
    /// No flags, queue family 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Creation flags, e.g. `RESET_COMMAND_BUFFER` or `TRANSIENT`
    pub fn set_flags(&mut self, flags: vk::CommandPoolCreateFlags) -> &mut Self {
        self.flags = flags;
        self
    }

    /// Queue family the pool serves
    pub fn set_queue_family_index(&mut self, index: u32) -> &mut Self {
        self.queue_family_index = index;
        self
    }

    /// Create the pool on `device`
    pub fn build(&self, device: &Rc<Device>) -> Option<Rc<CommandPool>> {
        let create_info = vk::CommandPoolCreateInfo::builder()
            .flags(self.flags)
            .queue_family_index(self.queue_family_index);

        match unsafe { device.raw().create_command_pool(&create_info, None) } {
            Ok(handle) => Some(Rc::new(CommandPool {
                object: GpuObject::new(device, handle),
                queue_family_index: self.queue_family_index,
            })),
            Err(result) => {
                log::error!(
                    "Failed to create command pool for queue family {}: {result}",
                    self.queue_family_index
                );
                None
            }
        }
    }
}

/// Command buffer allocated from a [`CommandPool`]
///
/// Dropping waits for the device to go idle, then frees the buffer back to
/// its pool.
pub struct CommandBuffer {
    object: GpuObject<CommandPool, vk::CommandBuffer>,
}

impl CommandBuffer {
    /// Native handle
    pub fn handle(&self) -> vk::CommandBuffer {
        self.object.handle()
    }

    /// Whether the native handle is non-null
    pub fn is_valid(&self) -> bool {
        self.object.is_valid()
    }

    fn device(&self) -> VulkanResult<Rc<Device>> {
        let pool = self.object.require_parent()?;
        pool.object.require_parent()
    }

    /// Start recording; the returned recorder ends the buffer with [`CommandRecorder::end`]
    pub fn begin(&self, flags: vk::CommandBufferUsageFlags) -> VulkanResult<CommandRecorder<'_>> {
        let device = self.device()?;
        let begin_info = vk::CommandBufferBeginInfo::builder().flags(flags);
        unsafe {
            device
                .raw()
                .begin_command_buffer(self.handle(), &begin_info)
                .map_err(VulkanError::api("vkBeginCommandBuffer"))?;
        }
        Ok(CommandRecorder { buffer: self, device })
    }

    /// Return the buffer to the initial state
    pub fn reset(&self, flags: vk::CommandBufferResetFlags) -> VulkanResult<()> {
        let device = self.device()?;
        unsafe {
            device
                .raw()
                .reset_command_buffer(self.handle(), flags)
                .map_err(VulkanError::api("vkResetCommandBuffer"))
        }
    }
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        self.object.release_with(|pool, handle| {
            let Some(device) = pool.device() else {
                return;
            };
            unsafe {
                let _ = device.raw().device_wait_idle();
                device.raw().free_command_buffers(pool.handle(), &[handle]);
            }
        });
    }
}

/// Records commands into a [`CommandBuffer`] between begin and end
///
/// Holds the device for the duration of recording so individual commands
/// cannot fail.
pub struct CommandRecorder<'a> {
    buffer: &'a CommandBuffer,
    device: Rc<Device>,
}

impl CommandRecorder<'_> {
    fn raw(&self) -> &ash::Device {
        self.device.raw()
    }

    fn cb(&self) -> vk::CommandBuffer {
        self.buffer.handle()
    }

    /// Finish recording
    pub fn end(self) -> VulkanResult<()> {
        unsafe {
            self.raw()
                .end_command_buffer(self.cb())
                .map_err(VulkanError::api("vkEndCommandBuffer"))
        }
    }

    /// Begin a render pass instance
    pub fn begin_render_pass(
        &mut self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
        contents: vk::SubpassContents,
    ) -> &mut Self {
        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(clear_values);
        unsafe { self.raw().cmd_begin_render_pass(self.cb(), &begin_info, contents) };
        self
    }

    /// Advance to the next subpass
    pub fn next_subpass(&mut self, contents: vk::SubpassContents) -> &mut Self {
        unsafe { self.raw().cmd_next_subpass(self.cb(), contents) };
        self
    }

    /// End the current render pass instance
    pub fn end_render_pass(&mut self) -> &mut Self {
        unsafe { self.raw().cmd_end_render_pass(self.cb()) };
        self
    }

    /// Bind a pipeline
    pub fn bind_pipeline(&mut self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) -> &mut Self {
        unsafe { self.raw().cmd_bind_pipeline(self.cb(), bind_point, pipeline) };
        self
    }

    /// Bind descriptor sets starting at `first_set`
    pub fn bind_descriptor_sets(
        &mut self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) -> &mut Self {
        unsafe {
            self.raw()
                .cmd_bind_descriptor_sets(self.cb(), bind_point, layout, first_set, sets, dynamic_offsets);
        }
        self
    }

    /// Bind vertex buffers starting at `first_binding`
    pub fn bind_vertex_buffers(
        &mut self,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    ) -> &mut Self {
        unsafe {
            self.raw()
                .cmd_bind_vertex_buffers(self.cb(), first_binding, buffers, offsets);
        }
        self
    }

    /// Bind an index buffer
    pub fn bind_index_buffer(
        &mut self,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    ) -> &mut Self {
        unsafe {
            self.raw()
                .cmd_bind_index_buffer(self.cb(), buffer, offset, index_type);
        }
        self
    }

    /// Non-indexed draw
    pub fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> &mut Self {
        unsafe {
            self.raw()
                .cmd_draw(self.cb(), vertex_count, instance_count, first_vertex, first_instance);
        }
        self
    }

    /// Indexed draw
    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> &mut Self {
        unsafe {
            self.raw().cmd_draw_indexed(
                self.cb(),
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        }
        self
    }

    /// Copy regions between buffers
    pub fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) -> &mut Self {
        unsafe { self.raw().cmd_copy_buffer(self.cb(), src, dst, regions) };
        self
    }

    /// Copy buffer regions into an image in `layout`
    pub fn copy_buffer_to_image(
        &mut self,
        src: vk::Buffer,
        dst: vk::Image,
        layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) -> &mut Self {
        unsafe { self.raw().cmd_copy_buffer_to_image(self.cb(), src, dst, layout, regions) };
        self
    }

    /// Insert an execution and memory dependency
    pub fn pipeline_barrier(
        &mut self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        dependency_flags: vk::DependencyFlags,
        memory_barriers: &[vk::MemoryBarrier],
        buffer_barriers: &[vk::BufferMemoryBarrier],
        image_barriers: &[vk::ImageMemoryBarrier],
    ) -> &mut Self {
        unsafe {
            self.raw().cmd_pipeline_barrier(
                self.cb(),
                src_stage,
                dst_stage,
                dependency_flags,
                memory_barriers,
                buffer_barriers,
                image_barriers,
            );
        }
        self
    }

    /// Update push constants
    pub fn push_constants(
        &mut self,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) -> &mut Self {
        unsafe { self.raw().cmd_push_constants(self.cb(), layout, stages, offset, data) };
        self
    }

    /// Dynamic blend constants
    pub fn set_blend_constants(&mut self, constants: [f32; 4]) -> &mut Self {
        unsafe { self.raw().cmd_set_blend_constants(self.cb(), &constants) };
        self
    }

    /// Dynamic line width
    pub fn set_line_width(&mut self, width: f32) -> &mut Self {
        unsafe { self.raw().cmd_set_line_width(self.cb(), width) };
        self
    }

    /// Dynamic viewports starting at `first`
    pub fn set_viewports(&mut self, first: u32, viewports: &[vk::Viewport]) -> &mut Self {
        unsafe { self.raw().cmd_set_viewport(self.cb(), first, viewports) };
        self
    }

    /// Dynamic scissors starting at `first`
    pub fn set_scissors(&mut self, first: u32, scissors: &[vk::Rect2D]) -> &mut Self {
        unsafe { self.raw().cmd_set_scissor(self.cb(), first, scissors) };
        self
    }

    /// Clear regions of attachments inside a render pass
    pub fn clear_attachments(&mut self, attachments: &[vk::ClearAttachment], rects: &[vk::ClearRect]) -> &mut Self {
        unsafe { self.raw().cmd_clear_attachments(self.cb(), attachments, rects) };
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wrapper::test_support::headless;

    #[test]
    fn test_record_and_submit_empty_buffer() {
        let Some(gpu) = headless() else {
            return;
        };
        let queue = gpu.queue();
        let pool = gpu.command_pool();
        assert_eq!(pool.queue_family_index(), gpu.queue_family);
        let buffers = pool
            .create_command_buffers(2, vk::CommandBufferLevel::PRIMARY)
            .unwrap();
        assert_eq!(buffers.len(), 2);

        let recorder = buffers[0]
            .begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
            .unwrap();
        recorder.end().unwrap();
        queue.submit(&[&buffers[0]], &[], &[], None).unwrap();
        queue.wait_idle().unwrap();
        buffers[0].reset(vk::CommandBufferResetFlags::empty()).unwrap();
        pool.reset(vk::CommandPoolResetFlags::empty()).unwrap();
    }

    #[test]
    fn test_buffer_outliving_pool_skips_free() {
        let Some(gpu) = headless() else {
            return;
        };
        let pool = gpu.command_pool();
        let mut buffers = pool
            .create_command_buffers(1, vk::CommandBufferLevel::PRIMARY)
            .unwrap();
        drop(pool);
        // The pool freed it implicitly; dropping must not touch the dead pool
        let buffer = buffers.pop().unwrap();
        assert!(buffer.begin(vk::CommandBufferUsageFlags::empty()).is_err());
    }
}
