//! Pipeline layouts and graphics pipelines

use ash::vk;
use std::ffi::CString;
use std::rc::Rc;

use super::device::Device;
use super::object::GpuObject;
use super::render_pass::RenderPass;

/// Set layouts and push-constant ranges visible to a pipeline
pub struct PipelineLayout {
    object: GpuObject<Device, vk::PipelineLayout>,
}

impl PipelineLayout {
    /// Native handle
    pub fn handle(&self) -> vk::PipelineLayout {
        self.object.handle()
    }

    /// Whether the native handle is non-null
    pub fn is_valid(&self) -> bool {
        self.object.is_valid()
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        self.object.release_with(|device, handle| unsafe {
            device.raw().destroy_pipeline_layout(handle, None);
        });
    }
}

/// Builder for [`PipelineLayout`]
#[derive(Debug, Clone, Default)]
pub struct PipelineLayoutBuilder {
    flags: vk::PipelineLayoutCreateFlags,
    set_layouts: Vec<vk::DescriptorSetLayout>,
    push_constant_ranges: Vec<vk::PushConstantRange>,
}

impl PipelineLayoutBuilder {
    /// Layout without sets or push constants
    pub fn new() -> Self {
        Self::default()
    }

    /// Creation flags
    pub fn set_flags(&mut self, flags: vk::PipelineLayoutCreateFlags) -> &mut Self {
        self.flags = flags;
        self
    }

    /// Append one set layout; its position is its set number
    pub fn add_set_layout(&mut self, layout: vk::DescriptorSetLayout) -> &mut Self {
        self.set_layouts.push(layout);
        self
    }

    /// Append set layouts in set-number order
    pub fn add_set_layouts<I>(&mut self, layouts: I) -> &mut Self
    where
        I: IntoIterator<Item = vk::DescriptorSetLayout>,
    {
        self.set_layouts.extend(layouts);
        self
    }

    /// Append a push-constant range
    pub fn add_push_constant_range(
        &mut self,
        stage_flags: vk::ShaderStageFlags,
        offset: u32,
        size: u32,
    ) -> &mut Self {
        self.push_constant_ranges.push(vk::PushConstantRange {
            stage_flags,
            offset,
            size,
        });
        self
    }

    /// Append prepared push-constant ranges
    pub fn add_push_constant_ranges<I>(&mut self, ranges: I) -> &mut Self
    where
        I: IntoIterator<Item = vk::PushConstantRange>,
    {
        self.push_constant_ranges.extend(ranges);
        self
    }

    /// Create the layout on `device`
    pub fn build(&self, device: &Rc<Device>) -> Option<PipelineLayout> {
        let create_info = vk::PipelineLayoutCreateInfo::builder()
            .flags(self.flags)
            .set_layouts(&self.set_layouts)
            .push_constant_ranges(&self.push_constant_ranges);

        match unsafe { device.raw().create_pipeline_layout(&create_info, None) } {
            Ok(handle) => Some(PipelineLayout {
                object: GpuObject::new(device, handle),
            }),
            Err(result) => {
                log::error!("Failed to create pipeline layout: {result}");
                None
            }
        }
    }
}

/// Graphics or compute pipeline
pub struct Pipeline {
    object: GpuObject<Device, vk::Pipeline>,
    bind_point: vk::PipelineBindPoint,
}

impl Pipeline {
    /// Native handle
    pub fn handle(&self) -> vk::Pipeline {
        self.object.handle()
    }

    /// Whether the native handle is non-null
    pub fn is_valid(&self) -> bool {
        self.object.is_valid()
    }

    /// Where the pipeline binds in a command buffer
    pub fn bind_point(&self) -> vk::PipelineBindPoint {
        self.bind_point
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.object.release_with(|device, handle| unsafe {
            device.raw().destroy_pipeline(handle, None);
        });
    }
}

#[derive(Debug, Clone)]
struct ShaderStage {
    stage: vk::ShaderStageFlags,
    module: vk::ShaderModule,
    entry_point: CString,
}

/// Builder for a graphics [`Pipeline`]
///
/// Defaults: triangle list, fill mode, back-face culling with
/// counter-clockwise front faces, line width 1, single sample, depth and
/// stencil tests off, no blending, subpass 0. Viewports and scissors default
/// to one each so they can be supplied as dynamic state.
#[derive(Debug, Clone)]
pub struct GraphicsPipelineBuilder {
    flags: vk::PipelineCreateFlags,
    stages: Vec<ShaderStage>,
    vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    topology: vk::PrimitiveTopology,
    primitive_restart: bool,
    patch_control_points: u32,
    viewports: Vec<vk::Viewport>,
    scissors: Vec<vk::Rect2D>,
    viewport_count: u32,
    scissor_count: u32,
    depth_clamp: bool,
    rasterizer_discard: bool,
    polygon_mode: vk::PolygonMode,
    cull_mode: vk::CullModeFlags,
    front_face: vk::FrontFace,
    depth_bias: Option<(f32, f32, f32)>,
    line_width: f32,
    samples: vk::SampleCountFlags,
    sample_shading: Option<f32>,
    alpha_to_coverage: bool,
    alpha_to_one: bool,
    depth_test: bool,
    depth_write: bool,
    depth_compare_op: vk::CompareOp,
    depth_bounds: Option<(f32, f32)>,
    stencil: Option<(vk::StencilOpState, vk::StencilOpState)>,
    logic_op: Option<vk::LogicOp>,
    color_blend_attachments: Vec<vk::PipelineColorBlendAttachmentState>,
    blend_constants: [f32; 4],
    dynamic_states: Vec<vk::DynamicState>,
    subpass: u32,
    base_pipeline: vk::Pipeline,
    base_pipeline_index: i32,
}

impl Default for GraphicsPipelineBuilder {
    fn default() -> Self {
        Self {
            flags: vk::PipelineCreateFlags::empty(),
            stages: Vec::new(),
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            primitive_restart: false,
            patch_control_points: 0,
            viewports: Vec::new(),
            scissors: Vec::new(),
            viewport_count: 1,
            scissor_count: 1,
            depth_clamp: false,
            rasterizer_discard: false,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_bias: None,
            line_width: 1.0,
            samples: vk::SampleCountFlags::TYPE_1,
            sample_shading: None,
            alpha_to_coverage: false,
            alpha_to_one: false,
            depth_test: false,
            depth_write: false,
            depth_compare_op: vk::CompareOp::LESS,
            depth_bounds: None,
            stencil: None,
            logic_op: None,
            color_blend_attachments: Vec::new(),
            blend_constants: [0.0; 4],
            dynamic_states: Vec::new(),
            subpass: 0,
            base_pipeline: vk::Pipeline::null(),
            base_pipeline_index: -1,
        }
    }
}

/// Colour attachment state writing RGBA with blending off
pub fn opaque_color_blend_attachment() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::builder()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(false)
        .build()
}

/// Colour attachment state for premultiplied-free alpha blending
pub fn alpha_color_blend_attachment() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::builder()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(true)
        .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
        .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(vk::BlendFactor::ONE)
        .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
        .alpha_blend_op(vk::BlendOp::ADD)
        .build()
}

impl GraphicsPipelineBuilder {
    /// Start from the defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Creation flags
    pub fn set_flags(&mut self, flags: vk::PipelineCreateFlags) -> &mut Self {
        self.flags = flags;
        self
    }

    /// Add a shader stage; the entry point name is copied
    ///
    /// Entry names containing a NUL byte fall back to `main`.
    pub fn add_shader_stage(
        &mut self,
        stage: vk::ShaderStageFlags,
        module: vk::ShaderModule,
        entry_point: &str,
    ) -> &mut Self {
        let entry_point = CString::new(entry_point).unwrap_or_else(|_| {
            log::warn!("Invalid shader entry point {entry_point:?}, using main");
            CString::from(c"main")
        });
        self.stages.push(ShaderStage {
            stage,
            module,
            entry_point,
        });
        self
    }

    /// Add a vertex buffer binding
    pub fn add_vertex_binding(
        &mut self,
        binding: u32,
        stride: u32,
        input_rate: vk::VertexInputRate,
    ) -> &mut Self {
        self.vertex_bindings.push(vk::VertexInputBindingDescription {
            binding,
            stride,
            input_rate,
        });
        self
    }

    /// Add a vertex attribute read from `binding` at `offset`
    pub fn add_vertex_attribute(
        &mut self,
        location: u32,
        binding: u32,
        format: vk::Format,
        offset: u32,
    ) -> &mut Self {
        self.vertex_attributes.push(vk::VertexInputAttributeDescription {
            location,
            binding,
            format,
            offset,
        });
        self
    }

    /// Primitive topology and whether a special index restarts strips
    pub fn set_input_assembly(&mut self, topology: vk::PrimitiveTopology, primitive_restart: bool) -> &mut Self {
        self.topology = topology;
        self.primitive_restart = primitive_restart;
        self
    }

    /// Enable tessellation with `count` control points per patch
    pub fn set_patch_control_points(&mut self, count: u32) -> &mut Self {
        self.patch_control_points = count;
        self
    }

    /// Add a static viewport
    pub fn add_viewport(&mut self, viewport: vk::Viewport) -> &mut Self {
        self.viewports.push(viewport);
        self.viewport_count = self.viewport_count.max(len_u32(&self.viewports));
        self
    }

    /// Add a static scissor rectangle
    pub fn add_scissor(&mut self, scissor: vk::Rect2D) -> &mut Self {
        self.scissors.push(scissor);
        self.scissor_count = self.scissor_count.max(len_u32(&self.scissors));
        self
    }

    /// Viewport and scissor counts when both come from dynamic state
    pub fn set_viewport_count(&mut self, viewports: u32, scissors: u32) -> &mut Self {
        self.viewport_count = viewports;
        self.scissor_count = scissors;
        self
    }

    /// Polygon mode, culling and winding order
    pub fn set_rasterization(
        &mut self,
        polygon_mode: vk::PolygonMode,
        cull_mode: vk::CullModeFlags,
        front_face: vk::FrontFace,
    ) -> &mut Self {
        self.polygon_mode = polygon_mode;
        self.cull_mode = cull_mode;
        self.front_face = front_face;
        self
    }

    /// Clamp fragment depth instead of clipping
    pub fn enable_depth_clamp(&mut self, enable: bool) -> &mut Self {
        self.depth_clamp = enable;
        self
    }

    /// Discard every primitive before rasterization
    pub fn enable_rasterizer_discard(&mut self, enable: bool) -> &mut Self {
        self.rasterizer_discard = enable;
        self
    }

    /// Depth bias as (constant factor, clamp, slope factor)
    pub fn set_depth_bias(&mut self, constant: f32, clamp: f32, slope: f32) -> &mut Self {
        self.depth_bias = Some((constant, clamp, slope));
        self
    }

    /// Rasterized line width
    pub fn set_line_width(&mut self, width: f32) -> &mut Self {
        self.line_width = width;
        self
    }

    /// Rasterization sample count
    pub fn set_samples(&mut self, samples: vk::SampleCountFlags) -> &mut Self {
        self.samples = samples;
        self
    }

    /// Enable sample shading with the given minimum fraction
    pub fn set_sample_shading(&mut self, min_sample_shading: f32) -> &mut Self {
        self.sample_shading = Some(min_sample_shading);
        self
    }

    /// Alpha-to-coverage and alpha-to-one
    pub fn set_alpha_multisample(&mut self, to_coverage: bool, to_one: bool) -> &mut Self {
        self.alpha_to_coverage = to_coverage;
        self.alpha_to_one = to_one;
        self
    }

    /// Depth test, depth writes and the comparison used
    pub fn set_depth_test(&mut self, test: bool, write: bool, compare_op: vk::CompareOp) -> &mut Self {
        self.depth_test = test;
        self.depth_write = write;
        self.depth_compare_op = compare_op;
        self
    }

    /// Enable the depth bounds test over `[min, max]`
    pub fn set_depth_bounds(&mut self, min: f32, max: f32) -> &mut Self {
        self.depth_bounds = Some((min, max));
        self
    }

    /// Enable the stencil test with per-face state
    pub fn set_stencil(&mut self, front: vk::StencilOpState, back: vk::StencilOpState) -> &mut Self {
        self.stencil = Some((front, back));
        self
    }

    /// Enable a framebuffer logic op, replacing blending
    pub fn set_logic_op(&mut self, op: vk::LogicOp) -> &mut Self {
        self.logic_op = Some(op);
        self
    }

    /// Add blend state for the next colour attachment
    pub fn add_color_blend_attachment(&mut self, state: vk::PipelineColorBlendAttachmentState) -> &mut Self {
        self.color_blend_attachments.push(state);
        self
    }

    /// Constant colour used by `CONSTANT_*` blend factors
    pub fn set_blend_constants(&mut self, constants: [f32; 4]) -> &mut Self {
        self.blend_constants = constants;
        self
    }

    /// Add a state supplied at record time
    pub fn add_dynamic_state(&mut self, state: vk::DynamicState) -> &mut Self {
        if !self.dynamic_states.contains(&state) {
            self.dynamic_states.push(state);
        }
        self
    }

    /// Subpass of the render pass the pipeline is used in
    pub fn set_subpass(&mut self, subpass: u32) -> &mut Self {
        self.subpass = subpass;
        self
    }

    /// Derive from an existing pipeline
    pub fn set_base_pipeline(&mut self, pipeline: vk::Pipeline) -> &mut Self {
        self.flags |= vk::PipelineCreateFlags::DERIVATIVE;
        self.base_pipeline = pipeline;
        self.base_pipeline_index = -1;
        self
    }

    /// Create the pipeline on `device` for `layout` and `render_pass`
    pub fn build(
        &self,
        device: &Rc<Device>,
        layout: vk::PipelineLayout,
        render_pass: &RenderPass,
    ) -> Option<Pipeline> {
        if self.stages.is_empty() {
            log::error!("Refusing to create a graphics pipeline without shader stages");
            return None;
        }

        let stages: Vec<_> = self
            .stages
            .iter()
            .map(|stage| {
                vk::PipelineShaderStageCreateInfo::builder()
                    .stage(stage.stage)
                    .module(stage.module)
                    .name(&stage.entry_point)
                    .build()
            })
            .collect();

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&self.vertex_bindings)
            .vertex_attribute_descriptions(&self.vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(self.topology)
            .primitive_restart_enable(self.primitive_restart);

        let tessellation = vk::PipelineTessellationStateCreateInfo::builder()
            .patch_control_points(self.patch_control_points);

        let mut viewport = vk::PipelineViewportStateCreateInfo::builder();
        if self.viewports.is_empty() {
            viewport.viewport_count = self.viewport_count;
        } else {
            viewport = viewport.viewports(&self.viewports);
        }
        if self.scissors.is_empty() {
            viewport.scissor_count = self.scissor_count;
        } else {
            viewport = viewport.scissors(&self.scissors);
        }

        let (bias_constant, bias_clamp, bias_slope) = self.depth_bias.unwrap_or_default();
        let rasterization = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(self.depth_clamp)
            .rasterizer_discard_enable(self.rasterizer_discard)
            .polygon_mode(self.polygon_mode)
            .cull_mode(self.cull_mode)
            .front_face(self.front_face)
            .depth_bias_enable(self.depth_bias.is_some())
            .depth_bias_constant_factor(bias_constant)
            .depth_bias_clamp(bias_clamp)
            .depth_bias_slope_factor(bias_slope)
            .line_width(self.line_width);

        let multisample = vk::PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(self.samples)
            .sample_shading_enable(self.sample_shading.is_some())
            .min_sample_shading(self.sample_shading.unwrap_or(1.0))
            .alpha_to_coverage_enable(self.alpha_to_coverage)
            .alpha_to_one_enable(self.alpha_to_one);

        let (min_bounds, max_bounds) = self.depth_bounds.unwrap_or((0.0, 1.0));
        let (front, back) = self.stencil.unwrap_or_default();
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(self.depth_test)
            .depth_write_enable(self.depth_write)
            .depth_compare_op(self.depth_compare_op)
            .depth_bounds_test_enable(self.depth_bounds.is_some())
            .min_depth_bounds(min_bounds)
            .max_depth_bounds(max_bounds)
            .stencil_test_enable(self.stencil.is_some())
            .front(front)
            .back(back);

        let color_blend = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(self.logic_op.is_some())
            .logic_op(self.logic_op.unwrap_or(vk::LogicOp::COPY))
            .attachments(&self.color_blend_attachments)
            .blend_constants(self.blend_constants);

        let dynamic = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&self.dynamic_states);

        let mut create_info = vk::GraphicsPipelineCreateInfo::builder()
            .flags(self.flags)
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic)
            .layout(layout)
            .render_pass(render_pass.handle())
            .subpass(self.subpass)
            .base_pipeline_handle(self.base_pipeline)
            .base_pipeline_index(self.base_pipeline_index);
        if self.patch_control_points > 0 {
            create_info = create_info.tessellation_state(&tessellation);
        }

        let result = unsafe {
            device
                .raw()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info.build()], None)
        };
        match result {
            Ok(pipelines) => pipelines.into_iter().next().map(|handle| Pipeline {
                object: GpuObject::new(device, handle),
                bind_point: vk::PipelineBindPoint::GRAPHICS,
            }),
            Err((_, result)) => {
                log::error!("Failed to create graphics pipeline: {result}");
                None
            }
        }
    }
}

fn len_u32<T>(items: &[T]) -> u32 {
    u32::try_from(items.len()).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wrapper::test_support::headless;

    #[test]
    fn test_graphics_defaults() {
        let builder = GraphicsPipelineBuilder::new();
        assert_eq!(builder.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(builder.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(builder.samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!((builder.viewport_count, builder.scissor_count), (1, 1));
        assert_eq!(builder.base_pipeline_index, -1);
    }

    #[test]
    fn test_stage_entry_points_are_owned() {
        let mut builder = GraphicsPipelineBuilder::new();
        builder
            .add_shader_stage(vk::ShaderStageFlags::VERTEX, vk::ShaderModule::null(), "main")
            .add_shader_stage(vk::ShaderStageFlags::FRAGMENT, vk::ShaderModule::null(), "bad\0name");
        assert_eq!(builder.stages[0].entry_point.as_bytes(), b"main");
        assert_eq!(builder.stages[1].entry_point.as_bytes(), b"main");
    }

    #[test]
    fn test_dynamic_states_are_deduplicated() {
        let mut builder = GraphicsPipelineBuilder::new();
        builder
            .add_dynamic_state(vk::DynamicState::VIEWPORT)
            .add_dynamic_state(vk::DynamicState::SCISSOR)
            .add_dynamic_state(vk::DynamicState::VIEWPORT);
        assert_eq!(builder.dynamic_states.len(), 2);
    }

    #[test]
    fn test_static_viewports_raise_count() {
        let mut builder = GraphicsPipelineBuilder::new();
        let viewport = vk::Viewport {
            width: 800.0,
            height: 600.0,
            max_depth: 1.0,
            ..Default::default()
        };
        builder.add_viewport(viewport).add_viewport(viewport);
        assert_eq!(builder.viewport_count, 2);
    }

    #[test]
    fn test_layout_with_push_constants() {
        let Some(gpu) = headless() else {
            return;
        };
        let layout = PipelineLayoutBuilder::new()
            .add_push_constant_range(vk::ShaderStageFlags::VERTEX, 0, 64)
            .build(&gpu.device)
            .unwrap();
        assert!(layout.is_valid());
    }
}
