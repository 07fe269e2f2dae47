//! Graphics pipelines and pipeline layouts.
//!
//! Every mesh pipeline shares the same layout shape: descriptor set layouts
//! for the scene's sets plus one push-constant range visible to the vertex
//! and fragment stages, sized for a model matrix and a normal matrix.
//!
//! Pipelines are built against a [`RenderPass`]; the builder emits one
//! colour blend state per colour attachment of that pass.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use kiln_rhi::device::Device;
//! use kiln_rhi::pipeline::{GraphicsPipelineBuilder, PipelineLayout, PUSH_CONSTANT_SIZE};
//! use kiln_rhi::render_pass::RenderPass;
//! use kiln_rhi::shader::Shader;
//!
//! # fn example(device: Arc<Device>, pass: &RenderPass, vert: &Shader, frag: &Shader)
//! #     -> kiln_rhi::RhiResult<()> {
//! let layout = PipelineLayout::new(device.clone(), &[], PUSH_CONSTANT_SIZE)?;
//! let pipeline = GraphicsPipelineBuilder::new(pass)
//!     .vertex_shader(vert)
//!     .fragment_shader(frag)
//!     .build(device, &layout)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::render_pass::RenderPass;
use crate::shader::Shader;
use crate::vertex::Vertex;

/// Size of the per-draw push-constant block: two 4x4 f32 matrices.
pub const PUSH_CONSTANT_SIZE: u32 = 128;

/// Stages that read the per-draw push constants.
pub const PUSH_CONSTANT_STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::from_raw(
    vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw(),
);

/// The push-constant range for a layout, or `None` when `size` is 0.
pub fn push_constant_range(size: u32) -> Option<vk::PushConstantRange> {
    (size > 0).then_some(vk::PushConstantRange {
        stage_flags: PUSH_CONSTANT_STAGES,
        offset: 0,
        size,
    })
}

/// Pipeline layout wrapper.
pub struct PipelineLayout {
    device: Arc<Device>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Creates a layout over `set_layouts` (set 0 first) with a push-constant
    /// block of `push_constant_size` bytes, or none when it is 0.
    pub fn new(
        device: Arc<Device>,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_size: u32,
    ) -> RhiResult<Self> {
        let ranges: Vec<vk::PushConstantRange> =
            push_constant_range(push_constant_size).into_iter().collect();
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts)
            .push_constant_ranges(&ranges);

        // SAFETY: set layouts are live for the duration of the call.
        let layout = unsafe { device.handle().create_pipeline_layout(&create_info, None)? };
        debug!(
            "Created pipeline layout: {} set layout(s), {} push-constant bytes",
            set_layouts.len(),
            push_constant_size
        );
        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        // SAFETY: pipelines using the layout are idle.
        unsafe { self.device.handle().destroy_pipeline_layout(self.layout, None) };
    }
}

/// Graphics pipeline wrapper.
pub struct Pipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
}

impl Pipeline {
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        // SAFETY: no pending command buffer references the pipeline.
        unsafe { self.device.handle().destroy_pipeline(self.pipeline, None) };
        debug!("Graphics pipeline destroyed");
    }
}

/// Face culling mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

impl CullMode {
    pub fn to_vk(self) -> vk::CullModeFlags {
        match self {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::Front => vk::CullModeFlags::FRONT,
            CullMode::Back => vk::CullModeFlags::BACK,
        }
    }
}

/// Depth comparison.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompareOp {
    #[default]
    Less,
    /// Lets the skybox, drawn at the far plane, pass against a cleared buffer.
    LessOrEqual,
    Always,
}

impl CompareOp {
    pub fn to_vk(self) -> vk::CompareOp {
        match self {
            CompareOp::Less => vk::CompareOp::LESS,
            CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
            CompareOp::Always => vk::CompareOp::ALWAYS,
        }
    }
}

/// Colour blend state for one attachment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorBlend {
    Opaque,
    /// `src * src_alpha + dst * (1 - src_alpha)`.
    Alpha,
    /// `src * src_alpha + dst`, for light-marker glows.
    Additive,
}

impl ColorBlend {
    pub fn to_vk(self) -> vk::PipelineColorBlendAttachmentState {
        let state = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .color_blend_op(vk::BlendOp::ADD)
            .alpha_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO);
        match self {
            ColorBlend::Opaque => state
                .blend_enable(false)
                .src_color_blend_factor(vk::BlendFactor::ONE)
                .dst_color_blend_factor(vk::BlendFactor::ZERO),
            ColorBlend::Alpha => state
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA),
            ColorBlend::Additive => state
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE),
        }
    }
}

/// One blend state per colour attachment: `blend` repeated, since every
/// pipeline in the engine blends all of its targets alike.
pub fn blend_states(color_count: usize, blend: ColorBlend) -> Vec<vk::PipelineColorBlendAttachmentState> {
    vec![blend.to_vk(); color_count]
}

/// Builder for graphics pipelines targeting one subpass of a render pass.
///
/// Defaults: triangle list, fill, back-face culling, counter-clockwise front
/// face, depth test and write with `LESS`, opaque blending, the [`Vertex`]
/// layout, dynamic viewport and scissor.
pub struct GraphicsPipelineBuilder<'a> {
    render_pass: &'a RenderPass,
    subpass: u32,
    vertex_shader: Option<&'a Shader>,
    fragment_shader: Option<&'a Shader>,
    vertex_input: bool,
    cull_mode: CullMode,
    depth_test: bool,
    depth_write: bool,
    depth_compare: CompareOp,
    blend: ColorBlend,
}

impl<'a> GraphicsPipelineBuilder<'a> {
    pub fn new(render_pass: &'a RenderPass) -> Self {
        Self {
            render_pass,
            subpass: 0,
            vertex_shader: None,
            fragment_shader: None,
            vertex_input: true,
            cull_mode: CullMode::Back,
            depth_test: true,
            depth_write: true,
            depth_compare: CompareOp::Less,
            blend: ColorBlend::Opaque,
        }
    }

    pub fn vertex_shader(mut self, shader: &'a Shader) -> Self {
        self.vertex_shader = Some(shader);
        self
    }

    pub fn fragment_shader(mut self, shader: &'a Shader) -> Self {
        self.fragment_shader = Some(shader);
        self
    }

    /// Drops the vertex input bindings, for shaders that generate their
    /// vertices from `gl_VertexIndex` (fullscreen triangles).
    pub fn without_vertex_input(mut self) -> Self {
        self.vertex_input = false;
        self
    }

    pub fn cull_mode(mut self, mode: CullMode) -> Self {
        self.cull_mode = mode;
        self
    }

    pub fn depth(mut self, test: bool, write: bool, compare: CompareOp) -> Self {
        self.depth_test = test;
        self.depth_write = write;
        self.depth_compare = compare;
        self
    }

    pub fn blend(mut self, blend: ColorBlend) -> Self {
        self.blend = blend;
        self
    }

    /// # Errors
    ///
    /// [`RhiError::PipelineError`] when a shader stage is missing, otherwise
    /// any driver failure.
    pub fn build(self, device: Arc<Device>, layout: &PipelineLayout) -> RhiResult<Pipeline> {
        let vertex_shader = self
            .vertex_shader
            .ok_or_else(|| RhiError::PipelineError("vertex shader is required".to_string()))?;
        let fragment_shader = self
            .fragment_shader
            .ok_or_else(|| RhiError::PipelineError("fragment shader is required".to_string()))?;

        let stages = [
            vertex_shader.stage_create_info(),
            fragment_shader.stage_create_info(),
        ];

        let bindings = [Vertex::binding_description()];
        let attributes = Vertex::attribute_descriptions();
        let vertex_input_state = if self.vertex_input {
            vk::PipelineVertexInputStateCreateInfo::default()
                .vertex_binding_descriptions(&bindings)
                .vertex_attribute_descriptions(&attributes)
        } else {
            vk::PipelineVertexInputStateCreateInfo::default()
        };

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST);
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);
        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(self.cull_mode.to_vk())
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE);
        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);
        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(self.depth_test)
            .depth_write_enable(self.depth_write)
            .depth_compare_op(self.depth_compare.to_vk())
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0);

        let attachments = blend_states(self.render_pass.desc().color_count(), self.blend);
        let color_blend_state =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(layout.handle())
            .render_pass(self.render_pass.handle())
            .subpass(self.subpass);

        // SAFETY: every state struct above outlives the call.
        let pipelines = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, result)| {
                    RhiError::PipelineError(format!("graphics pipeline creation failed: {:?}", result))
                })?
        };
        let pipeline = pipelines
            .into_iter()
            .next()
            .ok_or_else(|| RhiError::PipelineError("driver returned no pipeline".to_string()))?;

        debug!(
            "Created graphics pipeline: {} colour target(s), {:?} blend, cull {:?}",
            attachments.len(),
            self.blend,
            self.cull_mode
        );
        Ok(Pipeline { device, pipeline })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_constant_range_covers_two_matrices() {
        let range = push_constant_range(PUSH_CONSTANT_SIZE).unwrap();
        assert_eq!(range.size as usize, 2 * std::mem::size_of::<[[f32; 4]; 4]>());
        assert!(range.stage_flags.contains(vk::ShaderStageFlags::VERTEX));
        assert!(range.stage_flags.contains(vk::ShaderStageFlags::FRAGMENT));
        assert!(push_constant_range(0).is_none());
    }

    #[test]
    fn test_blend_states_match_attachment_count() {
        let states = blend_states(3, ColorBlend::Opaque);
        assert_eq!(states.len(), 3);
        assert!(states.iter().all(|s| s.blend_enable == vk::FALSE));
    }

    #[test]
    fn test_additive_blend_keeps_destination() {
        let state = ColorBlend::Additive.to_vk();
        assert_eq!(state.blend_enable, vk::TRUE);
        assert_eq!(state.dst_color_blend_factor, vk::BlendFactor::ONE);

        let alpha = ColorBlend::Alpha.to_vk();
        assert_eq!(alpha.dst_color_blend_factor, vk::BlendFactor::ONE_MINUS_SRC_ALPHA);
    }

    #[test]
    fn test_enum_conversions() {
        assert_eq!(CullMode::None.to_vk(), vk::CullModeFlags::NONE);
        assert_eq!(CullMode::default().to_vk(), vk::CullModeFlags::BACK);
        assert_eq!(CompareOp::LessOrEqual.to_vk(), vk::CompareOp::LESS_OR_EQUAL);
    }
}
