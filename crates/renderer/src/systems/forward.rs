//! Lit meshes, light markers and the skybox, drawn straight into the
//! swapchain pass.

use std::path::Path;
use std::sync::Arc;

use kiln_rhi::RhiResult;
use kiln_rhi::descriptor::DescriptorSetLayout;
use kiln_rhi::device::Device;
use kiln_rhi::pipeline::{
    ColorBlend, CompareOp, CullMode, GraphicsPipelineBuilder, PUSH_CONSTANT_SIZE, Pipeline,
    PipelineLayout,
};
use kiln_rhi::render_pass::RenderPass;
use kiln_scene::ObjectKind;
use tracing::debug;

use super::{RenderSystem, load_shader_pair, plan_draws, record_draws};
use crate::frame::FrameContext;

/// Pipelines of the forward system, in draw order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ForwardPipeline {
    Lit,
    Marker,
    /// Last, so it only fills pixels nothing else covered.
    Skybox,
}

pub struct ForwardSystem {
    device: Arc<Device>,
    lit: Pipeline,
    marker: Pipeline,
    skybox: Pipeline,
    layout: PipelineLayout,
}

impl ForwardSystem {
    /// Builds the pipelines against `render_pass`. Set 0 is the global
    /// world/lights/skybox set.
    pub fn new(
        device: Arc<Device>,
        render_pass: &RenderPass,
        global_layout: &DescriptorSetLayout,
        shader_dir: &Path,
    ) -> RhiResult<Self> {
        let layout = PipelineLayout::new(
            device.clone(),
            &[global_layout.handle()],
            PUSH_CONSTANT_SIZE,
        )?;

        let (vert, frag) = load_shader_pair(&device, shader_dir, "forward", "forward")?;
        let lit = GraphicsPipelineBuilder::new(render_pass)
            .vertex_shader(&vert)
            .fragment_shader(&frag)
            .cull_mode(CullMode::Back)
            .build(device.clone(), &layout)?;

        let (vert, frag) = load_shader_pair(&device, shader_dir, "forward", "marker")?;
        let marker = GraphicsPipelineBuilder::new(render_pass)
            .vertex_shader(&vert)
            .fragment_shader(&frag)
            .cull_mode(CullMode::Back)
            .blend(ColorBlend::Additive)
            .build(device.clone(), &layout)?;

        let (vert, frag) = load_shader_pair(&device, shader_dir, "skybox", "skybox")?;
        let skybox = GraphicsPipelineBuilder::new(render_pass)
            .vertex_shader(&vert)
            .fragment_shader(&frag)
            .cull_mode(CullMode::None)
            .depth(true, false, CompareOp::LessOrEqual)
            .build(device.clone(), &layout)?;

        debug!("Forward system ready");
        Ok(Self {
            device,
            lit,
            marker,
            skybox,
            layout,
        })
    }

    /// Reflective objects belong to the reflective system.
    pub fn route(kind: &ObjectKind) -> Option<ForwardPipeline> {
        match kind {
            ObjectKind::Standard => Some(ForwardPipeline::Lit),
            ObjectKind::LightMarker(_) => Some(ForwardPipeline::Marker),
            ObjectKind::Skybox => Some(ForwardPipeline::Skybox),
            ObjectKind::Reflective => None,
        }
    }
}

impl RenderSystem for ForwardSystem {
    fn name(&self) -> &str {
        "forward"
    }

    fn render(&self, ctx: &FrameContext<'_>) {
        let draws = plan_draws(ctx.objects, Self::route);
        record_draws(
            &self.device,
            ctx,
            &self.layout,
            &[ctx.descriptor_set],
            &draws,
            |pipeline| match pipeline {
                ForwardPipeline::Lit => self.lit.handle(),
                ForwardPipeline::Marker => self.marker.handle(),
                ForwardPipeline::Skybox => self.skybox.handle(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_scene::PointLight;

    #[test]
    fn test_routes() {
        assert_eq!(ForwardSystem::route(&ObjectKind::Standard), Some(ForwardPipeline::Lit));
        assert_eq!(
            ForwardSystem::route(&ObjectKind::LightMarker(PointLight::default())),
            Some(ForwardPipeline::Marker)
        );
        assert_eq!(ForwardSystem::route(&ObjectKind::Reflective), None);
    }

    #[test]
    fn test_skybox_sorts_last() {
        assert!(ForwardPipeline::Skybox > ForwardPipeline::Lit);
        assert!(ForwardPipeline::Skybox > ForwardPipeline::Marker);
    }
}
