//! A model lit by orbiting point lights, in front of a skybox. One
//! swapchain pass.

use glam::Vec3;
use kiln_resources::MeshData;
use kiln_rhi::RhiResult;
use kiln_rhi::descriptor::DescriptorPool;
use kiln_rhi::swapchain::PresentationSurface;
use kiln_rhi::sync::MAX_FRAMES_IN_FLIGHT;
use kiln_rhi::texture::Texture;
use kiln_scene::{InputContext, ObjectFactory, ObjectKind, ObjectSet, Transform};
use tracing::info;

use super::common::{
    GlobalBindings, LightRing, Viewpoint, build_pool, collect_lights, global_pool_sizes,
    load_model_or, load_skybox, world_ubo,
};
use crate::error::RenderResult;
use crate::mesh::MeshArena;
use crate::orchestrator::{FrameOrchestrator, FrameToken};
use crate::overlay::Overlay;
use crate::pass_graph::{PassGraph, SystemBinding};
use crate::scene::{Scene, SceneContext};
use crate::systems::ForwardSystem;

pub struct ForwardScene {
    graph: PassGraph,
    globals: GlobalBindings,
    // Referenced by the descriptor sets above.
    _pool: DescriptorPool,
    _skybox: Texture,
    meshes: MeshArena,
    objects: ObjectSet,
    lights: LightRing,
    view: Viewpoint,
}

impl Scene for ForwardScene {
    fn init(ctx: &SceneContext<'_>) -> RenderResult<Self> {
        let device = ctx.device.clone();
        let assets = &ctx.config.assets;

        let mut meshes = MeshArena::new();
        let mut factory = ObjectFactory::new();
        let mut objects = ObjectSet::new();

        let model = load_model_or(
            device.clone(),
            &mut meshes,
            &assets.model_dir,
            "smooth_vase.obj",
            || MeshData::uv_sphere(48, 24, Vec3::splat(0.9)),
        )?;
        objects.insert(
            factory
                .create("model", ObjectKind::Standard)
                .with_mesh(model)
                .with_transform(Transform::new().with_scale(Vec3::splat(2.0))),
        );

        let floor = meshes.upload(device.clone(), "floor", &MeshData::quad(Vec3::splat(0.6)))?;
        objects.insert(
            factory
                .create("floor", ObjectKind::Standard)
                .with_mesh(floor)
                .with_transform(
                    Transform::new()
                        .with_translation(Vec3::new(0.0, -0.5, 0.0))
                        .with_scale(Vec3::splat(8.0)),
                ),
        );

        let sky = meshes.upload(device.clone(), "skybox", &MeshData::skybox_cube())?;
        objects.insert(factory.create("skybox", ObjectKind::Skybox).with_mesh(sky));

        let marker = meshes.upload(device.clone(), "marker", &MeshData::uv_sphere(12, 8, Vec3::ONE))?;
        let lights = LightRing::default();
        lights.spawn(
            &mut factory,
            &mut objects,
            marker,
            ctx.config.renderer.max_lights as usize,
        );

        let skybox = load_skybox(device.clone(), &assets.texture_dir)?;
        let pool = build_pool(
            device.clone(),
            &global_pool_sizes(),
            MAX_FRAMES_IN_FLIGHT as u32,
        )?;
        let globals = GlobalBindings::new(device.clone(), &pool, &skybox)?;

        let mut builder = PassGraph::builder();
        let forward = builder.add_system(Box::new(ForwardSystem::new(
            device,
            ctx.swapchain_pass,
            globals.layout(),
            &assets.shader_dir,
        )?));
        builder.swapchain(vec![SystemBinding::new(forward, globals.sets())]);
        let graph = builder.build("forward")?;

        info!("Forward scene ready: {} objects", objects.len());
        Ok(Self {
            graph,
            globals,
            _pool: pool,
            _skybox: skybox,
            meshes,
            objects,
            lights,
            view: Viewpoint::looking_at(Vec3::new(0.0, 1.5, 6.0), Vec3::new(0.0, 0.5, 0.0)),
        })
    }

    fn name(&self) -> &'static str {
        "forward"
    }

    fn pre_update(&mut self, input: &InputContext, dt: f32) {
        self.view.update(input, dt);
    }

    fn update(&mut self, frame_index: usize, aspect: f32, time: f32) -> RhiResult<()> {
        self.view.camera.set_aspect(aspect);
        self.lights.animate(&mut self.objects, time);
        self.globals.write(
            frame_index,
            &world_ubo(&self.view.camera),
            &collect_lights(&self.objects),
        )
    }

    fn render(
        &self,
        orchestrator: &mut FrameOrchestrator<PresentationSurface>,
        frame: &FrameToken,
        frame_time: f32,
        overlay: &mut dyn Overlay,
    ) {
        self.graph.execute(
            orchestrator,
            frame,
            frame_time,
            &self.objects,
            &self.meshes,
            overlay,
        );
    }
}
