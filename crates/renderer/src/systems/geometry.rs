//! Fills the geometry buffer: world position, normal and albedo.

use std::path::Path;
use std::sync::Arc;

use kiln_rhi::RhiResult;
use kiln_rhi::descriptor::DescriptorSetLayout;
use kiln_rhi::device::Device;
use kiln_rhi::pipeline::{GraphicsPipelineBuilder, PUSH_CONSTANT_SIZE, Pipeline, PipelineLayout};
use kiln_rhi::render_pass::RenderPass;
use kiln_scene::ObjectKind;
use tracing::debug;

use super::{RenderSystem, load_shader_pair, plan_draws, record_draws};
use crate::frame::FrameContext;

pub struct GeometrySystem {
    device: Arc<Device>,
    pipeline: Pipeline,
    layout: PipelineLayout,
}

impl GeometrySystem {
    /// `render_pass` must be the geometry-buffer pass; the pipeline gets one
    /// opaque blend state per colour attachment.
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
        let (vert, frag) = load_shader_pair(&device, shader_dir, "gbuffer", "gbuffer")?;
        let pipeline = GraphicsPipelineBuilder::new(render_pass)
            .vertex_shader(&vert)
            .fragment_shader(&frag)
            .build(device.clone(), &layout)?;

        debug!(
            "Geometry system ready ({} attachments)",
            render_pass.desc().color_count()
        );
        Ok(Self {
            device,
            pipeline,
            layout,
        })
    }

    /// Markers go into the buffer too; their cleared lit flag is stored in
    /// albedo alpha so the composite pass leaves them unshaded.
    pub fn route(kind: &ObjectKind) -> Option<()> {
        matches!(kind, ObjectKind::Standard | ObjectKind::LightMarker(_)).then_some(())
    }
}

impl RenderSystem for GeometrySystem {
    fn name(&self) -> &str {
        "geometry"
    }

    fn render(&self, ctx: &FrameContext<'_>) {
        let draws = plan_draws(ctx.objects, Self::route);
        record_draws(
            &self.device,
            ctx,
            &self.layout,
            &[ctx.descriptor_set],
            &draws,
            |()| self.pipeline.handle(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_scene::PointLight;

    #[test]
    fn test_geometry_routes_opaque_meshes() {
        assert!(GeometrySystem::route(&ObjectKind::Standard).is_some());
        assert!(GeometrySystem::route(&ObjectKind::LightMarker(PointLight::default())).is_some());
        assert!(GeometrySystem::route(&ObjectKind::Skybox).is_none());
        assert!(GeometrySystem::route(&ObjectKind::Reflective).is_none());
    }
}
