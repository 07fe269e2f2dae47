//! A mirrored sphere among coloured cubes.
//!
//! Each frame the scene is rendered six times, once per cube face, into
//! square offscreen targets around the sphere. The swapchain pass then draws
//! the scene normally and the sphere samples the six faces.

use std::sync::Arc;

use ash::vk;
use glam::{Mat4, Quat, Vec3};
use kiln_core::EngineConfig;
use kiln_resources::MeshData;
use kiln_resources::ubo::CaptureUbo;
use kiln_rhi::RhiResult;
use kiln_rhi::buffer::GpuBuffer;
use kiln_rhi::descriptor::{DescriptorPool, DescriptorSetLayout, DescriptorWriter};
use kiln_rhi::device::Device;
use kiln_rhi::swapchain::PresentationSurface;
use kiln_rhi::sync::MAX_FRAMES_IN_FLIGHT;
use kiln_rhi::texture::Texture;
use kiln_scene::{
    InputContext, ObjectFactory, ObjectId, ObjectKind, ObjectSet, Transform,
    cube_face_view_projections,
};
use tracing::info;

use super::common::{
    GlobalBindings, LIGHTS_BINDING, LightRing, SKYBOX_BINDING, Viewpoint, build_pool,
    collect_lights, global_pool_sizes, load_skybox, world_ubo,
};
use crate::error::RenderResult;
use crate::mesh::MeshArena;
use crate::orchestrator::{FrameOrchestrator, FrameToken};
use crate::overlay::Overlay;
use crate::pass_graph::{AuxiliaryPass, DynamicIndex, PassGraph, SystemBinding};
use crate::pass_registry::RenderPassRegistry;
use crate::scene::{Scene, SceneContext};
use crate::systems::{CaptureSystem, ForwardSystem, ReflectiveSystem};

/// Capture passes in cube-face order.
pub const CAPTURE_PASSES: [&str; 6] = [
    "capture_px",
    "capture_nx",
    "capture_py",
    "capture_ny",
    "capture_pz",
    "capture_nz",
];

const FACE_COUNT: u32 = CAPTURE_PASSES.len() as u32;
const CAPTURE_BINDING: u32 = 0;
const CAPTURE_NEAR: f32 = 0.05;
const CAPTURE_FAR: f32 = 50.0;

/// Set 0 of the capture passes. The capture block holds one element per
/// face per frame slot and is bound with a dynamic offset.
struct CaptureBindings {
    layout: Arc<DescriptorSetLayout>,
    sets: Vec<vk::DescriptorSet>,
    buffer: GpuBuffer,
}

impl CaptureBindings {
    fn new(
        device: Arc<Device>,
        pool: &DescriptorPool,
        lights: &GpuBuffer,
        skybox: &Texture,
    ) -> RhiResult<Self> {
        let layout = DescriptorSetLayout::builder(device.clone())
            .add_binding(
                CAPTURE_BINDING,
                vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                1,
            )?
            .add_binding(
                LIGHTS_BINDING,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::ShaderStageFlags::FRAGMENT,
                1,
            )?
            .add_binding(
                SKYBOX_BINDING,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                vk::ShaderStageFlags::FRAGMENT,
                1,
            )?
            .build()?;

        let slots = MAX_FRAMES_IN_FLIGHT as u32;
        let buffer = GpuBuffer::uniform(
            device,
            "capture",
            CaptureUbo::size() as vk::DeviceSize,
            FACE_COUNT * slots,
        )?;
        let sets = (0..slots)
            .map(|slot| {
                DescriptorWriter::new(&layout, pool)
                    .write_buffer(CAPTURE_BINDING, buffer.dynamic_descriptor_info())?
                    .write_buffer(LIGHTS_BINDING, lights.descriptor_info_for_index(slot))?
                    .write_image(SKYBOX_BINDING, skybox.descriptor_info())?
                    .build()
            })
            .collect::<RhiResult<Vec<_>>>()?;

        Ok(Self {
            layout,
            sets,
            buffer,
        })
    }

    fn write(&mut self, frame_index: usize, eye: Vec3, faces: &[Mat4; 6]) -> RhiResult<()> {
        for (face, view_projection) in faces.iter().enumerate() {
            let index = capture_index(frame_index, face);
            self.buffer
                .write_value(&CaptureUbo::new(*view_projection, eye), index)?;
            self.buffer.flush_index(index)?;
        }
        Ok(())
    }

    fn dynamic_index(&self, face: u32) -> DynamicIndex {
        DynamicIndex {
            stride: self.buffer.dynamic_offset(1),
            per_frame: FACE_COUNT,
            index: face,
        }
    }
}

fn capture_index(frame_index: usize, face: usize) -> u32 {
    frame_index as u32 * FACE_COUNT + face as u32
}

pub struct ReflectionScene {
    graph: PassGraph,
    capture: CaptureBindings,
    globals: GlobalBindings,
    // Referenced by the descriptor sets above.
    _faces_layout: Arc<DescriptorSetLayout>,
    _pool: DescriptorPool,
    _skybox: Texture,
    meshes: MeshArena,
    objects: ObjectSet,
    _registry: RenderPassRegistry,
    mirror: ObjectId,
    lights: LightRing,
    view: Viewpoint,
}

impl ReflectionScene {
    fn populate(
        device: &Arc<Device>,
        config: &EngineConfig,
        meshes: &mut MeshArena,
        objects: &mut ObjectSet,
        lights: &LightRing,
    ) -> RenderResult<ObjectId> {
        let mut factory = ObjectFactory::new();

        let sphere = meshes.upload(
            device.clone(),
            "mirror",
            &MeshData::uv_sphere(64, 32, Vec3::ONE),
        )?;
        let mirror = objects.insert(
            factory
                .create("mirror", ObjectKind::Reflective)
                .with_mesh(sphere)
                .with_transform(Transform::new().with_scale(Vec3::splat(1.6))),
        );

        let cube = meshes.upload(device.clone(), "cube", &MeshData::cube(Vec3::ONE))?;
        let palette = [
            Vec3::new(0.9, 0.2, 0.2),
            Vec3::new(0.2, 0.8, 0.3),
            Vec3::new(0.2, 0.4, 0.9),
            Vec3::new(0.9, 0.8, 0.2),
            Vec3::new(0.8, 0.3, 0.8),
            Vec3::new(0.2, 0.8, 0.8),
        ];
        for (i, color) in palette.into_iter().enumerate() {
            let angle = i as f32 / palette.len() as f32 * std::f32::consts::TAU;
            let position = Quat::from_rotation_y(angle) * Vec3::new(3.5, 0.0, 0.0);
            objects.insert(
                factory
                    .create(format!("cube_{}", i), ObjectKind::Standard)
                    .with_mesh(cube)
                    .with_color(color)
                    .with_transform(
                        Transform::new()
                            .with_translation(position)
                            .with_rotation(Quat::from_rotation_y(angle * 2.0))
                            .with_scale(Vec3::splat(0.8)),
                    ),
            );
        }

        let sky = meshes.upload(device.clone(), "skybox", &MeshData::skybox_cube())?;
        objects.insert(factory.create("skybox", ObjectKind::Skybox).with_mesh(sky));

        let marker = meshes.upload(device.clone(), "marker", &MeshData::uv_sphere(12, 8, Vec3::ONE))?;
        lights.spawn(
            &mut factory,
            objects,
            marker,
            config.renderer.max_lights as usize,
        );
        Ok(mirror)
    }
}

impl Scene for ReflectionScene {
    fn init(ctx: &SceneContext<'_>) -> RenderResult<Self> {
        let device = ctx.device.clone();
        let assets = &ctx.config.assets;
        let slots = MAX_FRAMES_IN_FLIGHT as u32;

        let mut meshes = MeshArena::new();
        let mut objects = ObjectSet::new();
        let lights = LightRing {
            radius: 2.4,
            ..LightRing::default()
        };
        let mirror = Self::populate(&device, ctx.config, &mut meshes, &mut objects, &lights)?;

        let size = ctx.config.renderer.capture_extent;
        let extent = vk::Extent2D {
            width: size,
            height: size,
        };
        let mut registry = RenderPassRegistry::new(device.clone())?;
        for name in CAPTURE_PASSES {
            registry.create_render_pass(name, extent)?;
        }

        let skybox = load_skybox(device.clone(), &assets.texture_dir)?;
        let mut sizes = global_pool_sizes().to_vec();
        sizes.extend([
            (vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, slots),
            (vk::DescriptorType::UNIFORM_BUFFER, slots),
            (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, slots + FACE_COUNT),
        ]);
        let pool = build_pool(device.clone(), &sizes, 2 * slots + 1)?;
        let globals = GlobalBindings::new(device.clone(), &pool, &skybox)?;
        let capture = CaptureBindings::new(device.clone(), &pool, globals.lights(), &skybox)?;

        let faces_layout = DescriptorSetLayout::builder(device.clone())
            .add_binding(
                0,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                vk::ShaderStageFlags::FRAGMENT,
                FACE_COUNT,
            )?
            .build()?;
        let face_images: Vec<vk::DescriptorImageInfo> = registry
            .iter()
            .filter_map(|target| target.descriptor(0))
            .map(Into::into)
            .collect();
        let faces_set = DescriptorWriter::new(&faces_layout, &pool)
            .write_images(0, &face_images)?
            .build()?;

        let first_face = registry.require(CAPTURE_PASSES[0])?;
        let mut builder = PassGraph::builder();
        let capture_system = builder.add_system(Box::new(CaptureSystem::new(
            device.clone(),
            first_face.render_pass(),
            &capture.layout,
            &assets.shader_dir,
        )?));
        let forward = builder.add_system(Box::new(ForwardSystem::new(
            device.clone(),
            ctx.swapchain_pass,
            globals.layout(),
            &assets.shader_dir,
        )?));
        let reflective = builder.add_system(Box::new(ReflectiveSystem::new(
            device,
            ctx.swapchain_pass,
            globals.layout(),
            &faces_layout,
            faces_set,
            &assets.shader_dir,
        )?));

        for (face, target) in registry.iter().enumerate() {
            builder.auxiliary(
                AuxiliaryPass::from_target(target),
                vec![
                    SystemBinding::new(capture_system, capture.sets.clone())
                        .with_dynamic(capture.dynamic_index(face as u32)),
                ],
            );
        }
        builder.swapchain(vec![
            SystemBinding::new(forward, globals.sets()),
            SystemBinding::new(reflective, globals.sets()),
        ]);
        let graph = builder.build("reflection")?;

        info!(
            "Reflection scene ready: {} capture passes of {}x{}",
            registry.len(),
            size,
            size
        );
        Ok(Self {
            graph,
            capture,
            globals,
            _faces_layout: faces_layout,
            _pool: pool,
            _skybox: skybox,
            meshes,
            objects,
            _registry: registry,
            mirror,
            lights,
            view: Viewpoint::looking_at(Vec3::new(0.0, 2.0, 7.0), Vec3::ZERO),
        })
    }

    fn name(&self) -> &'static str {
        "reflection"
    }

    fn pre_update(&mut self, input: &InputContext, dt: f32) {
        self.view.update(input, dt);
    }

    fn update(&mut self, frame_index: usize, aspect: f32, time: f32) -> RhiResult<()> {
        self.view.camera.set_aspect(aspect);
        self.lights.animate(&mut self.objects, time);

        let eye = self
            .objects
            .get(self.mirror)
            .map(|mirror| mirror.transform.translation())
            .unwrap_or(Vec3::ZERO);
        let faces = cube_face_view_projections(eye, CAPTURE_NEAR, CAPTURE_FAR);
        self.capture.write(frame_index, eye, &faces)?;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_elements_do_not_overlap_between_slots() {
        let slot0: Vec<u32> = (0..6).map(|face| capture_index(0, face)).collect();
        let slot1: Vec<u32> = (0..6).map(|face| capture_index(1, face)).collect();
        assert_eq!(slot0, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(slot1[0], 6);
        assert!(slot0.iter().all(|i| !slot1.contains(i)));
    }

    #[test]
    fn test_capture_index_matches_dynamic_index() {
        let index = DynamicIndex {
            stride: 256,
            per_frame: FACE_COUNT,
            index: 4,
        };
        assert_eq!(index.offset(1), capture_index(1, 4) * 256);
    }

    #[test]
    fn test_capture_pass_names_unique() {
        for (i, name) in CAPTURE_PASSES.iter().enumerate() {
            assert!(!CAPTURE_PASSES[..i].contains(name));
        }
    }
}
