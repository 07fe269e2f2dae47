//! Deferred shading: a geometry-buffer pass, then a fullscreen composite
//! that lights every pixel once.

use std::sync::Arc;

use ash::vk;
use glam::Vec3;
use kiln_resources::MeshData;
use kiln_rhi::RhiResult;
use kiln_rhi::descriptor::{DescriptorPool, DescriptorSetLayout, DescriptorWriter};
use kiln_rhi::device::Device;
use kiln_rhi::swapchain::PresentationSurface;
use kiln_rhi::sync::MAX_FRAMES_IN_FLIGHT;
use kiln_rhi::texture::Texture;
use kiln_scene::{InputContext, ObjectFactory, ObjectKind, ObjectSet, Transform};
use tracing::info;

use super::common::{
    GlobalBindings, LightRing, Viewpoint, build_pool, collect_lights, global_pool_sizes,
    load_skybox, world_ubo,
};
use crate::error::RenderResult;
use crate::mesh::MeshArena;
use crate::orchestrator::{FrameOrchestrator, FrameToken};
use crate::overlay::Overlay;
use crate::pass_graph::{AuxiliaryPass, PassGraph, SystemBinding};
use crate::pass_registry::{GBUFFER_FORMATS, RenderPassRegistry, RenderPassTarget};
use crate::scene::{Scene, SceneContext};
use crate::systems::{CompositeSystem, GeometrySystem};

pub const GBUFFER_PASS: &str = "gbuffer";

const GRID: i32 = 3;

pub struct DeferredScene {
    graph: PassGraph,
    globals: GlobalBindings,
    gbuffer_layout: Arc<DescriptorSetLayout>,
    gbuffer_set: vk::DescriptorSet,
    pool: DescriptorPool,
    // Sampled by the composite pass for the background.
    _skybox: Texture,
    meshes: MeshArena,
    objects: ObjectSet,
    registry: RenderPassRegistry,
    extent: vk::Extent2D,
    lights: LightRing,
    view: Viewpoint,
}

fn gbuffer_layout(device: Arc<Device>) -> RhiResult<Arc<DescriptorSetLayout>> {
    (0..GBUFFER_FORMATS.len() as u32)
        .try_fold(DescriptorSetLayout::builder(device), |builder, binding| {
            builder.add_binding(
                binding,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                vk::ShaderStageFlags::FRAGMENT,
                1,
            )
        })?
        .build()
}

/// Stages one image write per geometry-buffer attachment.
fn gbuffer_writes<'a>(
    layout: &'a DescriptorSetLayout,
    pool: &'a DescriptorPool,
    target: &RenderPassTarget,
) -> RhiResult<DescriptorWriter<'a>> {
    target
        .descriptors()
        .into_iter()
        .enumerate()
        .try_fold(DescriptorWriter::new(layout, pool), |writer, (binding, descriptor)| {
            writer.write_image(binding as u32, descriptor.into())
        })
}

impl Scene for DeferredScene {
    fn init(ctx: &SceneContext<'_>) -> RenderResult<Self> {
        let device = ctx.device.clone();
        let assets = &ctx.config.assets;
        let slots = MAX_FRAMES_IN_FLIGHT as u32;

        let mut meshes = MeshArena::new();
        let mut factory = ObjectFactory::new();
        let mut objects = ObjectSet::new();

        let cube = meshes.upload(device.clone(), "cube", &MeshData::cube(Vec3::ONE))?;
        let sphere = meshes.upload(device.clone(), "sphere", &MeshData::uv_sphere(32, 16, Vec3::ONE))?;
        for x in -GRID..=GRID {
            for z in -GRID..=GRID {
                let (mesh, label) = if (x + z) % 2 == 0 {
                    (cube, "cube")
                } else {
                    (sphere, "sphere")
                };
                let color = Vec3::new(
                    0.5 + x as f32 / (2 * GRID) as f32,
                    0.6,
                    0.5 + z as f32 / (2 * GRID) as f32,
                );
                objects.insert(
                    factory
                        .create(format!("{}_{}_{}", label, x, z), ObjectKind::Standard)
                        .with_mesh(mesh)
                        .with_color(color)
                        .with_transform(
                            Transform::new()
                                .with_translation(Vec3::new(x as f32 * 1.5, 0.0, z as f32 * 1.5))
                                .with_scale(Vec3::splat(0.7)),
                        ),
                );
            }
        }

        let floor = meshes.upload(device.clone(), "floor", &MeshData::quad(Vec3::splat(0.5)))?;
        objects.insert(
            factory
                .create("floor", ObjectKind::Standard)
                .with_mesh(floor)
                .with_transform(
                    Transform::new()
                        .with_translation(Vec3::new(0.0, -0.35, 0.0))
                        .with_scale(Vec3::splat(12.0)),
                ),
        );

        let marker = meshes.upload(device.clone(), "marker", &MeshData::uv_sphere(12, 8, Vec3::ONE))?;
        let lights = LightRing {
            radius: 4.0,
            height: 0.8,
            speed: 0.4,
        };
        lights.spawn(
            &mut factory,
            &mut objects,
            marker,
            ctx.config.renderer.max_lights as usize,
        );

        let mut registry = RenderPassRegistry::new(device.clone())?;
        registry.create_deferred_pass(GBUFFER_PASS, ctx.extent)?;
        let target = registry.require(GBUFFER_PASS)?;

        let skybox = load_skybox(device.clone(), &assets.texture_dir)?;
        let mut sizes = global_pool_sizes().to_vec();
        sizes.push((
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            GBUFFER_FORMATS.len() as u32,
        ));
        let pool = build_pool(device.clone(), &sizes, slots + 1)?;
        let globals = GlobalBindings::new(device.clone(), &pool, &skybox)?;

        let gbuffer_layout = gbuffer_layout(device.clone())?;
        let gbuffer_set = gbuffer_writes(&gbuffer_layout, &pool, target)?.build()?;

        let mut builder = PassGraph::builder();
        let geometry = builder.add_system(Box::new(GeometrySystem::new(
            device.clone(),
            target.render_pass(),
            globals.layout(),
            &assets.shader_dir,
        )?));
        let composite = builder.add_system(Box::new(CompositeSystem::new(
            device,
            ctx.swapchain_pass,
            globals.layout(),
            &gbuffer_layout,
            gbuffer_set,
            &assets.shader_dir,
        )?));
        builder.auxiliary(
            AuxiliaryPass::from_target(target),
            vec![SystemBinding::new(geometry, globals.sets())],
        );
        builder.swapchain(vec![SystemBinding::new(composite, globals.sets())]);
        let graph = builder.build("deferred")?;

        info!(
            "Deferred scene ready: {} objects, geometry buffer {}x{}",
            objects.len(),
            ctx.extent.width,
            ctx.extent.height
        );
        Ok(Self {
            graph,
            globals,
            gbuffer_layout,
            gbuffer_set,
            pool,
            _skybox: skybox,
            meshes,
            objects,
            registry,
            extent: ctx.extent,
            lights,
            view: Viewpoint::looking_at(Vec3::new(0.0, 5.0, 9.0), Vec3::ZERO),
        })
    }

    fn name(&self) -> &'static str {
        "deferred"
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

    /// Rebuilds the geometry buffer at the new size and points the existing
    /// composite set at it.
    fn resize(&mut self, extent: vk::Extent2D) -> RenderResult<()> {
        if extent == self.extent || extent.width == 0 || extent.height == 0 {
            return Ok(());
        }
        let target = self.registry.recreate(GBUFFER_PASS, extent)?;
        gbuffer_writes(&self.gbuffer_layout, &self.pool, target)?.overwrite(self.gbuffer_set);
        self.graph
            .replace_auxiliary(AuxiliaryPass::from_target(target))?;
        self.extent = extent;
        Ok(())
    }
}
