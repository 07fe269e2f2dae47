//! Renders the scene into one face of the environment capture.
//!
//! One system serves all six capture passes; the face is selected by the
//! dynamic offset into the capture uniform buffer that the pass graph
//! supplies per pass.

use std::path::Path;
use std::sync::Arc;

use kiln_rhi::RhiResult;
use kiln_rhi::descriptor::DescriptorSetLayout;
use kiln_rhi::device::Device;
use kiln_rhi::pipeline::{
    CompareOp, CullMode, GraphicsPipelineBuilder, PUSH_CONSTANT_SIZE, Pipeline, PipelineLayout,
};
use kiln_rhi::render_pass::RenderPass;
use kiln_scene::ObjectKind;
use tracing::debug;

use super::{RenderSystem, load_shader_pair, plan_draws, record_draws};
use crate::frame::FrameContext;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum CapturePipeline {
    Lit,
    Skybox,
}

pub struct CaptureSystem {
    device: Arc<Device>,
    lit: Pipeline,
    skybox: Pipeline,
    layout: PipelineLayout,
}

impl CaptureSystem {
    /// `capture_layout` is set 0: the dynamic capture block, the lights and
    /// the skybox.
    pub fn new(
        device: Arc<Device>,
        render_pass: &RenderPass,
        capture_layout: &DescriptorSetLayout,
        shader_dir: &Path,
    ) -> RhiResult<Self> {
        let layout = PipelineLayout::new(
            device.clone(),
            &[capture_layout.handle()],
            PUSH_CONSTANT_SIZE,
        )?;

        // Face projections are not Y-flipped, which reverses winding.
        let (vert, frag) = load_shader_pair(&device, shader_dir, "capture", "capture")?;
        let lit = GraphicsPipelineBuilder::new(render_pass)
            .vertex_shader(&vert)
            .fragment_shader(&frag)
            .cull_mode(CullMode::None)
            .build(device.clone(), &layout)?;

        let (vert, frag) = load_shader_pair(&device, shader_dir, "capture_skybox", "skybox")?;
        let skybox = GraphicsPipelineBuilder::new(render_pass)
            .vertex_shader(&vert)
            .fragment_shader(&frag)
            .cull_mode(CullMode::None)
            .depth(true, false, CompareOp::LessOrEqual)
            .build(device.clone(), &layout)?;

        debug!("Capture system ready");
        Ok(Self {
            device,
            lit,
            skybox,
            layout,
        })
    }

    /// The reflective object never appears in its own capture.
    pub fn route(kind: &ObjectKind) -> Option<CapturePipeline> {
        match kind {
            ObjectKind::Standard | ObjectKind::LightMarker(_) => Some(CapturePipeline::Lit),
            ObjectKind::Skybox => Some(CapturePipeline::Skybox),
            ObjectKind::Reflective => None,
        }
    }
}

impl RenderSystem for CaptureSystem {
    fn name(&self) -> &str {
        "capture"
    }

    fn render(&self, ctx: &FrameContext<'_>) {
        debug_assert!(
            ctx.dynamic_offset.is_some(),
            "capture passes bind the capture block with a dynamic offset"
        );
        let draws = plan_draws(ctx.objects, Self::route);
        record_draws(
            &self.device,
            ctx,
            &self.layout,
            &[ctx.descriptor_set],
            &draws,
            |pipeline| match pipeline {
                CapturePipeline::Lit => self.lit.handle(),
                CapturePipeline::Skybox => self.skybox.handle(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_scene::PointLight;

    #[test]
    fn test_reflective_excluded_from_capture() {
        assert_eq!(CaptureSystem::route(&ObjectKind::Reflective), None);
        assert_eq!(
            CaptureSystem::route(&ObjectKind::LightMarker(PointLight::default())),
            Some(CapturePipeline::Lit)
        );
        assert_eq!(
            CaptureSystem::route(&ObjectKind::Skybox),
            Some(CapturePipeline::Skybox)
        );
    }
}
