//! The scene contract and scene selection.

use std::sync::Arc;

use ash::vk;
use kiln_core::{EngineConfig, SceneChoice};
use kiln_rhi::RhiResult;
use kiln_rhi::device::Device;
use kiln_rhi::render_pass::RenderPass;
use kiln_rhi::swapchain::PresentationSurface;
use kiln_scene::InputContext;

use crate::error::RenderResult;
use crate::orchestrator::{FrameOrchestrator, FrameToken};
use crate::overlay::Overlay;
use crate::scenes::{DeferredScene, ForwardScene, ReflectionScene};

/// What a scene needs to build its GPU resources.
pub struct SceneContext<'a> {
    pub device: Arc<Device>,
    /// Pipelines drawing into the swapchain pass are built against this.
    pub swapchain_pass: &'a RenderPass,
    pub extent: vk::Extent2D,
    pub config: &'a EngineConfig,
}

/// A self-contained demo: objects, meshes, targets and a pass graph.
///
/// Per frame the renderer calls [`pre_update`](Scene::pre_update) with the
/// input snapshot, then [`update`](Scene::update) once the frame slot is
/// known, then [`render`](Scene::render) inside the started frame.
pub trait Scene {
    fn init(ctx: &SceneContext<'_>) -> RenderResult<Self>
    where
        Self: Sized;

    fn name(&self) -> &'static str;

    /// Camera and animation step. No GPU access.
    fn pre_update(&mut self, input: &InputContext, dt: f32);

    /// Writes the uniform data of `frame_index`.
    fn update(&mut self, frame_index: usize, aspect: f32, time: f32) -> RhiResult<()>;

    fn render(
        &self,
        orchestrator: &mut FrameOrchestrator<PresentationSurface>,
        frame: &FrameToken,
        frame_time: f32,
        overlay: &mut dyn Overlay,
    );

    /// Called with the device idle once the swapchain was recreated at
    /// `extent`.
    fn resize(&mut self, _extent: vk::Extent2D) -> RenderResult<()> {
        Ok(())
    }
}

/// Scenes in the order the number keys select them.
pub const SCENE_ORDER: [SceneChoice; 3] = [
    SceneChoice::Forward,
    SceneChoice::Reflection,
    SceneChoice::Deferred,
];

/// Scene bound to number key `index + 1`.
pub fn scene_for_index(index: usize) -> Option<SceneChoice> {
    SCENE_ORDER.get(index).copied()
}

pub fn create_scene(choice: SceneChoice, ctx: &SceneContext<'_>) -> RenderResult<Box<dyn Scene>> {
    Ok(match choice {
        SceneChoice::Forward => Box::new(ForwardScene::init(ctx)?),
        SceneChoice::Reflection => Box::new(ReflectionScene::init(ctx)?),
        SceneChoice::Deferred => Box::new(DeferredScene::init(ctx)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_keys() {
        assert_eq!(scene_for_index(0), Some(SceneChoice::Forward));
        assert_eq!(scene_for_index(2), Some(SceneChoice::Deferred));
        assert_eq!(scene_for_index(3), None);
    }
}
