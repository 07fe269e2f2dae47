//! Draw planning and pass-graph assembly through the public API, without a
//! device.

use ash::vk;
use glam::Vec3;
use kiln_renderer::systems::{
    CapturePipeline, CaptureSystem, ForwardPipeline, ForwardSystem, GeometrySystem,
    ReflectiveSystem, plan_draws,
};
use kiln_renderer::{FrameContext, PassGraph, RenderError, RenderSystem, SystemBinding};
use kiln_scene::{MeshHandle, ObjectFactory, ObjectKind, ObjectSet, PointLight};

struct Noop;

impl RenderSystem for Noop {
    fn name(&self) -> &str {
        "noop"
    }

    fn render(&self, _ctx: &FrameContext<'_>) {}
}

/// Floor, mirror sphere, two light markers, a skybox and a mesh-less
/// placeholder.
fn mixed_scene() -> ObjectSet {
    let mut factory = ObjectFactory::new();
    let mut objects = ObjectSet::new();
    let mesh = MeshHandle::from_index(0);

    objects.insert(factory.create("sky", ObjectKind::Skybox).with_mesh(mesh));
    objects.insert(
        factory
            .create("light_0", ObjectKind::LightMarker(PointLight::default()))
            .with_mesh(mesh),
    );
    objects.insert(factory.create("floor", ObjectKind::Standard).with_mesh(mesh));
    objects.insert(factory.create("mirror", ObjectKind::Reflective).with_mesh(mesh));
    objects.insert(factory.create("placeholder", ObjectKind::Standard));

    let mut off = factory
        .create("light_1", ObjectKind::LightMarker(PointLight::with_color(Vec3::X)))
        .with_mesh(mesh);
    off.render = false;
    objects.insert(off);
    objects
}

#[test]
fn test_forward_plan_skips_reflective_and_meshless() {
    let draws = plan_draws(&mixed_scene(), ForwardSystem::route);
    let pipelines: Vec<_> = draws.iter().map(|d| d.pipeline).collect();
    assert_eq!(
        pipelines,
        vec![
            ForwardPipeline::Lit,
            ForwardPipeline::Marker,
            ForwardPipeline::Skybox
        ]
    );
}

#[test]
fn test_capture_plan_draws_markers_lit_pipeline() {
    let draws = plan_draws(&mixed_scene(), CaptureSystem::route);
    let pipelines: Vec<_> = draws.iter().map(|d| d.pipeline).collect();
    assert_eq!(
        pipelines,
        vec![
            CapturePipeline::Lit,
            CapturePipeline::Lit,
            CapturePipeline::Skybox
        ]
    );
    // The marker keeps its unlit flag even in the lit capture pipeline.
    assert!(draws.iter().any(|d| !d.push.is_lit()));
}

#[test]
fn test_reflective_and_geometry_plans_are_disjoint() {
    let objects = mixed_scene();
    assert_eq!(plan_draws(&objects, ReflectiveSystem::route).len(), 1);
    assert_eq!(plan_draws(&objects, GeometrySystem::route).len(), 2);
}

#[test]
fn test_graph_orders_swapchain_last() {
    let mut builder = PassGraph::builder();
    let noop = builder.add_system(Box::new(Noop));
    builder.swapchain(vec![SystemBinding::new(noop, vec![vk::DescriptorSet::null()])]);
    let graph = builder.build("empty").expect("graph builds");
    assert_eq!(graph.pass_names(), vec!["swapchain"]);
}

#[test]
fn test_graph_without_swapchain_pass_is_rejected() {
    let mut builder = PassGraph::builder();
    builder.add_system(Box::new(Noop));
    assert!(matches!(
        builder.build("headless"),
        Err(RenderError::MissingSwapchainPass(name)) if name == "headless"
    ));
}
