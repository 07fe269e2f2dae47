//! Pieces every scene shares: the global descriptor set, the skybox, light
//! markers and mesh loading.

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use glam::{Quat, Vec3, Vec4};
use kiln_resources::image_data::{load_cube_faces, solid_cube_faces};
use kiln_resources::obj::load_obj;
use kiln_resources::ubo::{LightUbo, LightsUbo, MAX_LIGHTS, WorldUbo};
use kiln_resources::{ImageData, MeshData};
use kiln_rhi::RhiResult;
use kiln_rhi::buffer::GpuBuffer;
use kiln_rhi::descriptor::{DescriptorPool, DescriptorSetLayout, DescriptorWriter};
use kiln_rhi::device::Device;
use kiln_rhi::sync::MAX_FRAMES_IN_FLIGHT;
use kiln_rhi::texture::Texture;
use kiln_scene::{
    Camera, FlyController, InputContext, MeshHandle, ObjectFactory, ObjectKind, ObjectSet,
    PointLight, Transform,
};
use tracing::{info, warn};

use crate::error::RenderResult;
use crate::mesh::MeshArena;

pub const WORLD_BINDING: u32 = 0;
pub const LIGHTS_BINDING: u32 = 1;
pub const SKYBOX_BINDING: u32 = 2;

const SKYBOX_FALLBACK: [u8; 4] = [40, 60, 90, 255];
const SKYBOX_FALLBACK_SIZE: u32 = 4;
const GLOBAL_AMBIENT: Vec4 = Vec4::new(1.0, 1.0, 1.0, 0.03);

/// Set 0 of the swapchain passes: world and lights blocks per frame slot,
/// plus the skybox cubemap.
pub struct GlobalBindings {
    layout: Arc<DescriptorSetLayout>,
    sets: Vec<vk::DescriptorSet>,
    world: GpuBuffer,
    lights: GpuBuffer,
}

impl GlobalBindings {
    pub fn new(device: Arc<Device>, pool: &DescriptorPool, skybox: &Texture) -> RhiResult<Self> {
        let layout = DescriptorSetLayout::builder(device.clone())
            .add_binding(
                WORLD_BINDING,
                vk::DescriptorType::UNIFORM_BUFFER,
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
        let world = GpuBuffer::uniform(
            device.clone(),
            "world",
            WorldUbo::size() as vk::DeviceSize,
            slots,
        )?;
        let lights = GpuBuffer::uniform(
            device,
            "lights",
            LightsUbo::size() as vk::DeviceSize,
            slots,
        )?;

        let sets = (0..slots)
            .map(|slot| {
                DescriptorWriter::new(&layout, pool)
                    .write_buffer(WORLD_BINDING, world.descriptor_info_for_index(slot))?
                    .write_buffer(LIGHTS_BINDING, lights.descriptor_info_for_index(slot))?
                    .write_image(SKYBOX_BINDING, skybox.descriptor_info())?
                    .build()
            })
            .collect::<RhiResult<Vec<_>>>()?;

        Ok(Self {
            layout,
            sets,
            world,
            lights,
        })
    }

    /// Writes and flushes the blocks of `frame_index`. The slot's previous
    /// submission has completed by the time a scene updates it.
    pub fn write(
        &mut self,
        frame_index: usize,
        world: &WorldUbo,
        lights: &LightsUbo,
    ) -> RhiResult<()> {
        let slot = frame_index as u32;
        self.world.write_value(world, slot)?;
        self.world.flush_index(slot)?;
        self.lights.write_value(lights, slot)?;
        self.lights.flush_index(slot)
    }

    #[inline]
    pub fn layout(&self) -> &Arc<DescriptorSetLayout> {
        &self.layout
    }

    /// One set per frame slot.
    pub fn sets(&self) -> Vec<vk::DescriptorSet> {
        self.sets.clone()
    }

    #[inline]
    pub fn lights(&self) -> &GpuBuffer {
        &self.lights
    }
}

/// Pool sizes for [`GlobalBindings`]; scenes add their own on top.
pub fn global_pool_sizes() -> [(vk::DescriptorType, u32); 2] {
    let slots = MAX_FRAMES_IN_FLIGHT as u32;
    [
        (vk::DescriptorType::UNIFORM_BUFFER, 2 * slots),
        (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, slots),
    ]
}

/// Descriptor pool holding exactly `sizes`.
pub fn build_pool(
    device: Arc<Device>,
    sizes: &[(vk::DescriptorType, u32)],
    max_sets: u32,
) -> RhiResult<DescriptorPool> {
    sizes
        .iter()
        .fold(DescriptorPool::builder(device), |builder, &(ty, count)| {
            builder.add_pool_size(ty, count)
        })
        .max_sets(max_sets)
        .build()
}

/// Camera plus the controller steering it.
#[derive(Clone, Debug)]
pub struct Viewpoint {
    pub camera: Camera,
    pub controller: FlyController,
}

impl Viewpoint {
    /// Places the camera at `position` facing `target`.
    pub fn looking_at(position: Vec3, target: Vec3) -> Self {
        let mut camera = Camera::new();
        camera.position = position;
        let mut controller = FlyController::default();
        let dir = (target - position).normalize_or_zero();
        if dir != Vec3::ZERO {
            controller.yaw = (-dir.x).atan2(-dir.z);
            controller.pitch = dir.y.clamp(-1.0, 1.0).asin();
        }
        camera.rotation =
            Quat::from_rotation_y(controller.yaw) * Quat::from_rotation_x(controller.pitch);
        Self { camera, controller }
    }

    pub fn update(&mut self, input: &InputContext, dt: f32) {
        self.controller.update(&mut self.camera, input, dt);
    }
}

pub fn world_ubo(camera: &Camera) -> WorldUbo {
    WorldUbo::new(
        camera.projection_matrix(),
        camera.view_matrix(),
        camera.near,
        camera.far,
    )
}

/// Packs every rendering light marker, up to the block's capacity.
pub fn collect_lights(objects: &ObjectSet) -> LightsUbo {
    let mut block = LightsUbo::with_ambient(GLOBAL_AMBIENT);
    for object in objects.iter().filter(|object| object.render) {
        if let ObjectKind::LightMarker(light) = object.kind {
            let ubo = LightUbo::new(
                object.transform.translation(),
                light.color,
                light.ambient,
                light.diffuse,
                light.specular,
                light.attenuation,
            );
            if !block.push(ubo) {
                break;
            }
        }
    }
    block
}

/// Uploads the skybox faces found in `texture_dir/skybox`, or a flat
/// colour cube when they are missing.
pub fn load_skybox(device: Arc<Device>, texture_dir: &Path) -> RenderResult<Texture> {
    let dir = texture_dir.join("skybox");
    let faces = if dir.is_dir() {
        load_cube_faces(&dir)?
    } else {
        warn!(
            "No skybox at {}, using a flat colour",
            dir.display()
        );
        solid_cube_faces(SKYBOX_FALLBACK_SIZE, SKYBOX_FALLBACK)
    };
    upload_cube(device, &faces)
}

fn upload_cube(device: Arc<Device>, faces: &[ImageData; 6]) -> RenderResult<Texture> {
    let size = faces[0].width;
    let pixels = faces.each_ref().map(|face| face.pixels.as_slice());
    Ok(Texture::cube_from_faces(device, "skybox", size, pixels)?)
}

/// Loads `model_dir/file`, falling back to `fallback` when it is absent.
pub fn load_model_or(
    device: Arc<Device>,
    meshes: &mut MeshArena,
    model_dir: &Path,
    file: &str,
    fallback: impl FnOnce() -> MeshData,
) -> RenderResult<MeshHandle> {
    let path = model_dir.join(file);
    let data = if path.is_file() {
        load_obj(&path)?
    } else {
        info!("{} not found, using a procedural mesh", path.display());
        fallback()
    };
    Ok(meshes.upload(device, file, &data)?)
}

const LIGHT_PALETTE: [Vec3; 4] = [
    Vec3::new(1.0, 0.3, 0.3),
    Vec3::new(0.3, 1.0, 0.3),
    Vec3::new(0.3, 0.5, 1.0),
    Vec3::new(1.0, 0.9, 0.4),
];

/// Light markers orbiting the origin.
#[derive(Clone, Debug)]
pub struct LightRing {
    pub radius: f32,
    pub height: f32,
    /// Radians per second.
    pub speed: f32,
}

impl Default for LightRing {
    fn default() -> Self {
        Self {
            radius: 2.5,
            height: 1.0,
            speed: 0.6,
        }
    }
}

impl LightRing {
    /// Spawns one marker per light slot. Markers at or beyond `max_active`
    /// are kept but flagged non-rendering.
    pub fn spawn(
        &self,
        factory: &mut ObjectFactory,
        objects: &mut ObjectSet,
        mesh: MeshHandle,
        max_active: usize,
    ) {
        for i in 0..MAX_LIGHTS {
            let color = LIGHT_PALETTE[i % LIGHT_PALETTE.len()];
            let marker = factory
                .create(
                    format!("light_{}", i),
                    ObjectKind::LightMarker(PointLight::with_color(color)),
                )
                .with_mesh(mesh)
                .with_transform(
                    Transform::new()
                        .with_translation(self.position(i, 0.0))
                        .with_scale(Vec3::splat(0.08)),
                );
            objects.insert(marker);
        }
        apply_light_limit(objects, max_active);
    }

    /// Advances every marker around the ring to time `t`.
    pub fn animate(&self, objects: &mut ObjectSet, t: f32) {
        let markers = objects
            .iter_mut()
            .filter(|object| matches!(object.kind, ObjectKind::LightMarker(_)));
        for (i, marker) in markers.enumerate() {
            marker.transform.set_translation(self.position(i, t));
        }
    }

    fn position(&self, index: usize, t: f32) -> Vec3 {
        let angle = index as f32 / MAX_LIGHTS as f32 * std::f32::consts::TAU + t * self.speed;
        let bob = (angle * 3.0).sin() * 0.25;
        Quat::from_rotation_y(angle) * Vec3::new(self.radius, 0.0, 0.0)
            + Vec3::new(0.0, self.height + bob, 0.0)
    }
}

/// Keeps the first `max_active` markers rendering and switches the rest off.
pub fn apply_light_limit(objects: &mut ObjectSet, max_active: usize) {
    let markers = objects
        .iter_mut()
        .filter(|object| matches!(object.kind, ObjectKind::LightMarker(_)));
    for (i, marker) in markers.enumerate() {
        marker.render = i < max_active;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(max_active: usize) -> ObjectSet {
        let mut factory = ObjectFactory::new();
        let mut objects = ObjectSet::new();
        objects.insert(factory.create("model", ObjectKind::Standard));
        LightRing::default().spawn(
            &mut factory,
            &mut objects,
            MeshHandle::from_index(0),
            max_active,
        );
        objects
    }

    #[test]
    fn test_markers_beyond_limit_do_not_render() {
        let objects = ring(3);
        let rendering: Vec<bool> = objects
            .iter()
            .filter(|o| matches!(o.kind, ObjectKind::LightMarker(_)))
            .map(|o| o.render)
            .collect();
        assert_eq!(rendering.len(), MAX_LIGHTS);
        assert_eq!(rendering.iter().filter(|r| **r).count(), 3);
        assert!(rendering[..3].iter().all(|r| *r));
    }

    #[test]
    fn test_collect_lights_only_counts_rendering_markers() {
        let objects = ring(5);
        let lights = collect_lights(&objects);
        assert_eq!(lights.active().len(), 5);
    }

    #[test]
    fn test_limit_can_be_raised_again() {
        let mut objects = ring(2);
        apply_light_limit(&mut objects, MAX_LIGHTS);
        assert_eq!(collect_lights(&objects).active().len(), MAX_LIGHTS);
    }

    #[test]
    fn test_viewpoint_faces_target() {
        let target = Vec3::new(0.0, 0.5, 0.0);
        let mut view = Viewpoint::looking_at(Vec3::new(3.0, 2.0, 4.0), target);
        view.update(&InputContext::default(), 0.016);
        let expected = (target - view.camera.position).normalize();
        assert!(view.camera.forward().abs_diff_eq(expected, 1e-4));
    }

    #[test]
    fn test_animation_moves_markers_on_ring() {
        let mut objects = ring(MAX_LIGHTS);
        let light = LightRing::default();
        let before: Vec<Vec3> = objects.iter().map(|o| o.transform.translation()).collect();
        light.animate(&mut objects, 1.0);
        let after: Vec<Vec3> = objects.iter().map(|o| o.transform.translation()).collect();

        // The model is untouched; markers move but keep their radius.
        assert_eq!(before[0], after[0]);
        assert_ne!(before[1], after[1]);
        let flat = Vec3::new(after[1].x, 0.0, after[1].z);
        assert!((flat.length() - light.radius).abs() < 1e-4);
    }
}
