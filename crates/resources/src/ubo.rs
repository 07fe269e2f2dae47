//! GPU-side data blocks shared with the shaders.
//!
//! Every type here is `#[repr(C)]`, [`Pod`] and laid out for std140, so a
//! value can be written into a uniform buffer with `bytemuck::bytes_of`.
//!
//! - [`WorldUbo`] camera matrices, bound once per frame at set 0
//! - [`LightsUbo`] up to [`MAX_LIGHTS`] point lights
//! - [`CaptureUbo`] one instance per cubemap face, selected by dynamic offset
//! - [`ObjectPushConstants`] per-draw model and normal matrices
//!
//! # GPU Memory Layout
//!
//! - `Mat4` is 64 bytes
//! - `Vec4` is 16 bytes; `Vec3` data is widened to `Vec4` to avoid the
//!   std140 vec3 alignment trap
//! - Scalars trailing a block are padded up to 16 bytes
//!
//! ```
//! use kiln_resources::ubo::WorldUbo;
//! use glam::{Mat4, Vec3};
//!
//! let world = WorldUbo::new(Mat4::IDENTITY, Mat4::IDENTITY, 0.1, 100.0);
//! assert_eq!(bytemuck::bytes_of(&world).len(), WorldUbo::size());
//! ```

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

/// Capacity of the light array in [`LightsUbo`]. Mirrors `MAX_LIGHTS` in
/// the shaders.
pub const MAX_LIGHTS: usize = 16;

/// Per-frame camera block.
///
/// # Memory Layout (std140)
///
/// | Offset | Size | Field |
/// |--------|------|-------|
/// | 0      | 64   | projection |
/// | 64     | 64   | view |
/// | 128    | 64   | inverse_view |
/// | 192    | 4    | near |
/// | 196    | 4    | far |
/// | 200    | 8    | _padding |
///
/// Total size: 208 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct WorldUbo {
    pub projection: Mat4,
    pub view: Mat4,
    /// Camera-to-world; its translation column is the eye position.
    pub inverse_view: Mat4,
    pub near: f32,
    pub far: f32,
    pub _padding: [f32; 2],
}

impl WorldUbo {
    #[inline]
    pub fn new(projection: Mat4, view: Mat4, near: f32, far: f32) -> Self {
        Self {
            projection,
            view,
            inverse_view: view.inverse(),
            near,
            far,
            _padding: [0.0; 2],
        }
    }

    #[inline]
    pub fn camera_position(&self) -> Vec3 {
        self.inverse_view.w_axis.truncate()
    }

    #[inline]
    pub const fn size() -> usize {
        std::mem::size_of::<Self>()
    }
}

/// One point light.
///
/// # Memory Layout (std140)
///
/// | Offset | Size | Field |
/// |--------|------|-------|
/// | 0      | 16   | position (w unused) |
/// | 16     | 16   | color (w unused) |
/// | 32     | 16   | terms: ambient, diffuse, specular, unused |
/// | 48     | 16   | attenuation: constant, linear, quadratic, unused |
///
/// Total size: 64 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct LightUbo {
    pub position: Vec4,
    pub color: Vec4,
    pub terms: Vec4,
    pub attenuation: Vec4,
}

impl LightUbo {
    pub fn new(
        position: Vec3,
        color: Vec3,
        ambient: f32,
        diffuse: f32,
        specular: f32,
        attenuation: Vec3,
    ) -> Self {
        Self {
            position: position.extend(1.0),
            color: color.extend(1.0),
            terms: Vec4::new(ambient, diffuse, specular, 0.0),
            attenuation: attenuation.extend(0.0),
        }
    }
}

/// Light array block.
///
/// # Memory Layout (std140)
///
/// | Offset | Size | Field |
/// |--------|------|-------|
/// | 0      | 1024 | lights[16] |
/// | 1024   | 16   | ambient (rgb, w = intensity) |
/// | 1040   | 4    | count |
/// | 1044   | 12   | _padding |
///
/// Total size: 1056 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct LightsUbo {
    pub lights: [LightUbo; MAX_LIGHTS],
    pub ambient: Vec4,
    pub count: u32,
    pub _padding: [u32; 3],
}

impl Default for LightsUbo {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl LightsUbo {
    pub fn with_ambient(ambient: Vec4) -> Self {
        Self {
            ambient,
            ..Self::default()
        }
    }

    /// Appends a light. Returns `false` once the array is full.
    pub fn push(&mut self, light: LightUbo) -> bool {
        let index = self.count as usize;
        if index >= MAX_LIGHTS {
            return false;
        }
        self.lights[index] = light;
        self.count += 1;
        true
    }

    pub fn clear(&mut self) {
        self.count = 0;
    }

    pub fn active(&self) -> &[LightUbo] {
        &self.lights[..self.count as usize]
    }

    #[inline]
    pub const fn size() -> usize {
        std::mem::size_of::<Self>()
    }
}

/// One cubemap face of an environment capture.
///
/// The capture buffer holds six instances, each padded to the device's
/// uniform offset alignment and selected with a dynamic offset.
///
/// # Memory Layout (std140)
///
/// | Offset | Size | Field |
/// |--------|------|-------|
/// | 0      | 64   | view_projection |
/// | 64     | 16   | eye (w unused) |
///
/// Total size: 80 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct CaptureUbo {
    pub view_projection: Mat4,
    pub eye: Vec4,
}

impl CaptureUbo {
    #[inline]
    pub fn new(view_projection: Mat4, eye: Vec3) -> Self {
        Self {
            view_projection,
            eye: eye.extend(1.0),
        }
    }

    #[inline]
    pub const fn size() -> usize {
        std::mem::size_of::<Self>()
    }
}

/// Per-draw push constants, exactly the 128 bytes every device guarantees.
///
/// The shaders read `mat3(normal)`; the otherwise unused fourth column of
/// `normal` carries the object's base colour.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct ObjectPushConstants {
    pub model: Mat4,
    pub normal: Mat4,
}

impl ObjectPushConstants {
    pub fn new(model: Mat4, normal: Mat4, color: Vec3) -> Self {
        let mut normal = normal;
        normal.w_axis = color.extend(1.0);
        Self { model, normal }
    }

    /// Same layout with the lit flag cleared; the shaders output the colour
    /// unshaded.
    pub fn unlit(model: Mat4, normal: Mat4, color: Vec3) -> Self {
        let mut constants = Self::new(model, normal, color);
        constants.normal.w_axis.w = 0.0;
        constants
    }

    #[inline]
    pub fn color(&self) -> Vec3 {
        self.normal.w_axis.truncate()
    }

    #[inline]
    pub fn is_lit(&self) -> bool {
        self.normal.w_axis.w > 0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn test_world_ubo_layout() {
        assert_eq!(size_of::<WorldUbo>(), 208);
        assert_eq!(offset_of!(WorldUbo, inverse_view), 128);
        assert_eq!(offset_of!(WorldUbo, near), 192);
        assert_eq!(size_of::<WorldUbo>() % 16, 0);
    }

    #[test]
    fn test_world_ubo_camera_position() {
        let eye = Vec3::new(1.0, 2.0, 3.0);
        let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
        let world = WorldUbo::new(Mat4::IDENTITY, view, 0.1, 100.0);
        assert!((world.camera_position() - eye).length() < 1e-4);
    }

    #[test]
    fn test_lights_ubo_layout() {
        assert_eq!(size_of::<LightUbo>(), 64);
        assert_eq!(size_of::<LightsUbo>(), 1056);
        assert_eq!(offset_of!(LightsUbo, ambient), 64 * MAX_LIGHTS);
        assert_eq!(offset_of!(LightsUbo, count), 64 * MAX_LIGHTS + 16);
    }

    #[test]
    fn test_lights_ubo_caps_at_capacity() {
        let mut lights = LightsUbo::default();
        let light = LightUbo::new(Vec3::ZERO, Vec3::ONE, 0.1, 0.8, 1.0, Vec3::X);
        for _ in 0..MAX_LIGHTS {
            assert!(lights.push(light));
        }
        assert!(!lights.push(light));
        assert_eq!(lights.active().len(), MAX_LIGHTS);

        lights.clear();
        assert!(lights.active().is_empty());
    }

    #[test]
    fn test_capture_ubo_layout() {
        assert_eq!(size_of::<CaptureUbo>(), 80);
        assert_eq!(offset_of!(CaptureUbo, eye), 64);
    }

    #[test]
    fn test_push_constants_fit_guaranteed_range() {
        assert_eq!(size_of::<ObjectPushConstants>(), 128);
        let push = ObjectPushConstants::new(Mat4::IDENTITY, Mat4::IDENTITY, Vec3::new(0.2, 0.4, 0.6));
        assert_eq!(push.color(), Vec3::new(0.2, 0.4, 0.6));
        assert_eq!(push.normal.x_axis, Vec4::X);
    }

    #[test]
    fn test_unlit_flag_keeps_color() {
        let color = Vec3::new(1.0, 0.5, 0.0);
        let lit = ObjectPushConstants::new(Mat4::IDENTITY, Mat4::IDENTITY, color);
        let unlit = ObjectPushConstants::unlit(Mat4::IDENTITY, Mat4::IDENTITY, color);
        assert!(lit.is_lit());
        assert!(!unlit.is_lit());
        assert_eq!(unlit.color(), color);
    }
}
