//! Draws reflective objects by sampling the six captured faces.

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use kiln_rhi::RhiResult;
use kiln_rhi::descriptor::DescriptorSetLayout;
use kiln_rhi::device::Device;
use kiln_rhi::pipeline::{GraphicsPipelineBuilder, PUSH_CONSTANT_SIZE, Pipeline, PipelineLayout};
use kiln_rhi::render_pass::RenderPass;
use kiln_scene::ObjectKind;
use tracing::debug;

use super::{RenderSystem, load_shader_pair, plan_draws, record_draws};
use crate::frame::FrameContext;

pub struct ReflectiveSystem {
    device: Arc<Device>,
    pipeline: Pipeline,
    layout: PipelineLayout,
    /// Set 1: the six capture faces, written once.
    faces_set: vk::DescriptorSet,
}

impl ReflectiveSystem {
    pub fn new(
        device: Arc<Device>,
        render_pass: &RenderPass,
        global_layout: &DescriptorSetLayout,
        faces_layout: &DescriptorSetLayout,
        faces_set: vk::DescriptorSet,
        shader_dir: &Path,
    ) -> RhiResult<Self> {
        let layout = PipelineLayout::new(
            device.clone(),
            &[global_layout.handle(), faces_layout.handle()],
            PUSH_CONSTANT_SIZE,
        )?;
        let (vert, frag) = load_shader_pair(&device, shader_dir, "forward", "reflective")?;
        let pipeline = GraphicsPipelineBuilder::new(render_pass)
            .vertex_shader(&vert)
            .fragment_shader(&frag)
            .build(device.clone(), &layout)?;

        debug!("Reflective system ready");
        Ok(Self {
            device,
            pipeline,
            layout,
            faces_set,
        })
    }

    pub fn route(kind: &ObjectKind) -> Option<()> {
        matches!(kind, ObjectKind::Reflective).then_some(())
    }
}

impl RenderSystem for ReflectiveSystem {
    fn name(&self) -> &str {
        "reflective"
    }

    fn render(&self, ctx: &FrameContext<'_>) {
        let draws = plan_draws(ctx.objects, Self::route);
        record_draws(
            &self.device,
            ctx,
            &self.layout,
            &[ctx.descriptor_set, self.faces_set],
            &draws,
            |()| self.pipeline.handle(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_reflective_objects_routed() {
        assert_eq!(ReflectiveSystem::route(&ObjectKind::Reflective), Some(()));
        assert_eq!(ReflectiveSystem::route(&ObjectKind::Standard), None);
        assert_eq!(ReflectiveSystem::route(&ObjectKind::Skybox), None);
    }
}
