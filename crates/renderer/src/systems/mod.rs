//! Render systems: units that know how to draw one class of objects.
//!
//! A system is built once against the render pass it will record into and
//! is then invoked every frame with a [`FrameContext`]. Which objects it
//! draws, and with which pipeline, is decided by a pure routing function so
//! draw planning can be tested without a device.

mod capture;
mod composite;
mod forward;
mod geometry;
mod reflective;

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use kiln_resources::ubo::ObjectPushConstants;
use kiln_rhi::RhiResult;
use kiln_rhi::command::CommandBuffer;
use kiln_rhi::device::Device;
use kiln_rhi::pipeline::{PUSH_CONSTANT_STAGES, PipelineLayout};
use kiln_rhi::shader::{Shader, ShaderStage};
use kiln_scene::{MeshHandle, ObjectKind, ObjectSet, RenderableObject};

use crate::frame::FrameContext;

pub use capture::{CapturePipeline, CaptureSystem};
pub use composite::CompositeSystem;
pub use forward::{ForwardPipeline, ForwardSystem};
pub use geometry::GeometrySystem;
pub use reflective::ReflectiveSystem;

/// Something that records draws into an already-open render pass.
pub trait RenderSystem {
    fn name(&self) -> &str;

    /// Records this system's draws. The pass is open, and set 0 for the
    /// frame slot is in `ctx.descriptor_set`.
    fn render(&self, ctx: &FrameContext<'_>);
}

/// One draw decided by [`plan_draws`].
#[derive(Clone, Copy, Debug)]
pub struct PlannedDraw<P> {
    pub pipeline: P,
    pub mesh: MeshHandle,
    pub push: ObjectPushConstants,
}

/// Plans the draws for `objects`.
///
/// Objects that are switched off or carry no mesh are skipped, as are those
/// `route` declines. The result is grouped by pipeline, keeping creation
/// order within a group, so each pipeline is bound once.
pub fn plan_draws<P, F>(objects: &ObjectSet, route: F) -> Vec<PlannedDraw<P>>
where
    P: Copy + Ord,
    F: Fn(&ObjectKind) -> Option<P>,
{
    let mut draws: Vec<PlannedDraw<P>> = objects
        .iter()
        .filter(|object| object.is_drawable())
        .filter_map(|object| {
            let pipeline = route(&object.kind)?;
            let mesh = object.mesh?;
            Some(PlannedDraw {
                pipeline,
                mesh,
                push: push_constants_for(object),
            })
        })
        .collect();
    draws.sort_by_key(|draw| draw.pipeline);
    draws
}

/// Light markers are drawn in their own colour, everything else is shaded.
pub fn push_constants_for(object: &RenderableObject) -> ObjectPushConstants {
    let model = object.transform.model_matrix();
    let normal = object.transform.normal_matrix();
    match object.kind {
        ObjectKind::LightMarker(light) => {
            ObjectPushConstants::unlit(model, normal, object.color * light.color)
        }
        _ => ObjectPushConstants::new(model, normal, object.color),
    }
}

/// Records planned draws, binding each pipeline once.
///
/// `sets` are bound from set 0 before the first draw together with the
/// context's dynamic offset.
fn record_draws<P: Copy + PartialEq>(
    device: &Arc<Device>,
    ctx: &FrameContext<'_>,
    layout: &PipelineLayout,
    sets: &[vk::DescriptorSet],
    draws: &[PlannedDraw<P>],
    pipeline_for: impl Fn(P) -> vk::Pipeline,
) {
    if draws.is_empty() {
        return;
    }
    let cmd = CommandBuffer::from_handle(device.clone(), ctx.command_buffer);
    cmd.set_viewport_and_scissor(ctx.extent);
    cmd.bind_descriptor_sets(layout.handle(), 0, sets, ctx.dynamic_offsets());

    let mut bound = None;
    for draw in draws {
        let Some(mesh) = ctx.meshes.get(draw.mesh) else {
            continue;
        };
        if bound != Some(draw.pipeline) {
            cmd.bind_graphics_pipeline(pipeline_for(draw.pipeline));
            bound = Some(draw.pipeline);
        }
        cmd.push_constants(layout.handle(), PUSH_CONSTANT_STAGES, 0, &draw.push);
        mesh.bind(&cmd);
        mesh.draw(&cmd);
    }
}

/// Loads `{vertex}.vert.spv` and `{fragment}.frag.spv` from `dir`.
fn load_shader_pair(
    device: &Arc<Device>,
    dir: &Path,
    vertex: &str,
    fragment: &str,
) -> RhiResult<(Shader, Shader)> {
    let vert = Shader::load(
        device.clone(),
        dir,
        &format!("{}.vert", vertex),
        ShaderStage::Vertex,
    )?;
    let frag = Shader::load(
        device.clone(),
        dir,
        &format!("{}.frag", fragment),
        ShaderStage::Fragment,
    )?;
    Ok((vert, frag))
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use kiln_scene::{ObjectFactory, PointLight, Transform};

    #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
    enum Route {
        First,
        Second,
    }

    fn route(kind: &ObjectKind) -> Option<Route> {
        match kind {
            ObjectKind::Standard => Some(Route::Second),
            ObjectKind::LightMarker(_) => Some(Route::First),
            _ => None,
        }
    }

    fn populated() -> ObjectSet {
        let mut factory = ObjectFactory::new();
        let mut objects = ObjectSet::new();
        let mesh = MeshHandle::from_index(0);
        objects.insert(factory.create("vase", ObjectKind::Standard).with_mesh(mesh));
        objects.insert(
            factory
                .create("light", ObjectKind::LightMarker(PointLight::default()))
                .with_mesh(mesh),
        );
        objects.insert(factory.create("floor", ObjectKind::Standard).with_mesh(mesh));
        objects.insert(factory.create("sky", ObjectKind::Skybox).with_mesh(mesh));
        objects
    }

    #[test]
    fn test_plan_groups_by_pipeline_in_creation_order() {
        let objects = populated();
        let draws = plan_draws(&objects, route);
        let pipelines: Vec<Route> = draws.iter().map(|d| d.pipeline).collect();
        assert_eq!(pipelines, vec![Route::First, Route::Second, Route::Second]);
    }

    #[test]
    fn test_plan_skips_switched_off_objects() {
        let mut objects = populated();
        for object in objects.iter_mut() {
            if object.name == "vase" {
                object.render = false;
            }
        }
        let draws = plan_draws(&objects, route);
        assert_eq!(draws.len(), 2);
    }

    #[test]
    fn test_plan_skips_objects_without_mesh() {
        let mut factory = ObjectFactory::new();
        let mut objects = ObjectSet::new();
        objects.insert(factory.create("empty", ObjectKind::Standard));
        assert!(plan_draws(&objects, route).is_empty());
    }

    #[test]
    fn test_markers_are_unlit_in_light_colour() {
        let mut factory = ObjectFactory::new();
        let marker = factory
            .create(
                "light",
                ObjectKind::LightMarker(PointLight::with_color(Vec3::new(1.0, 0.0, 0.0))),
            )
            .with_transform(Transform::new().with_translation(Vec3::new(1.0, 2.0, 3.0)));
        let push = push_constants_for(&marker);
        assert!(!push.is_lit());
        assert_eq!(push.color(), Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(push.model.w_axis.truncate(), Vec3::new(1.0, 2.0, 3.0));
    }
}
