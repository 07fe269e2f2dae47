//! Lights the geometry buffer with a fullscreen triangle.

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use kiln_rhi::RhiResult;
use kiln_rhi::command::CommandBuffer;
use kiln_rhi::descriptor::DescriptorSetLayout;
use kiln_rhi::device::Device;
use kiln_rhi::pipeline::{
    CompareOp, CullMode, GraphicsPipelineBuilder, Pipeline, PipelineLayout,
};
use kiln_rhi::render_pass::RenderPass;
use tracing::debug;

use super::{RenderSystem, load_shader_pair};
use crate::frame::FrameContext;

pub struct CompositeSystem {
    device: Arc<Device>,
    pipeline: Pipeline,
    layout: PipelineLayout,
    /// Set 1: position, normal and albedo samplers.
    gbuffer_set: vk::DescriptorSet,
}

impl CompositeSystem {
    pub fn new(
        device: Arc<Device>,
        render_pass: &RenderPass,
        global_layout: &DescriptorSetLayout,
        gbuffer_layout: &DescriptorSetLayout,
        gbuffer_set: vk::DescriptorSet,
        shader_dir: &Path,
    ) -> RhiResult<Self> {
        let layout = PipelineLayout::new(
            device.clone(),
            &[global_layout.handle(), gbuffer_layout.handle()],
            0,
        )?;
        let (vert, frag) = load_shader_pair(&device, shader_dir, "composite", "composite")?;
        let pipeline = GraphicsPipelineBuilder::new(render_pass)
            .vertex_shader(&vert)
            .fragment_shader(&frag)
            .without_vertex_input()
            .cull_mode(CullMode::None)
            .depth(false, false, CompareOp::Always)
            .build(device.clone(), &layout)?;

        debug!("Composite system ready");
        Ok(Self {
            device,
            pipeline,
            layout,
            gbuffer_set,
        })
    }
}

impl RenderSystem for CompositeSystem {
    fn name(&self) -> &str {
        "composite"
    }

    fn render(&self, ctx: &FrameContext<'_>) {
        let cmd = CommandBuffer::from_handle(self.device.clone(), ctx.command_buffer);
        cmd.set_viewport_and_scissor(ctx.extent);
        cmd.bind_graphics_pipeline(self.pipeline.handle());
        cmd.bind_descriptor_sets(
            self.layout.handle(),
            0,
            &[ctx.descriptor_set, self.gbuffer_set],
            ctx.dynamic_offsets(),
        );
        cmd.draw(3, 1, 0, 0);
    }
}
