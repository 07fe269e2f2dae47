//! Perspective camera, fly controller and cubemap capture views.

use glam::{Mat4, Quat, Vec3};

use crate::input::InputContext;

/// Perspective camera. Projections carry the Vulkan Y flip.
#[derive(Clone, Debug)]
pub struct Camera {
    pub position: Vec3,
    pub rotation: Quat,
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            rotation: Quat::IDENTITY,
            fov_y: 50.0_f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        if aspect.is_finite() && aspect > 0.0 {
            self.aspect = aspect;
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward(), Vec3::Y)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        vulkan_perspective(self.fov_y, self.aspect, self.near, self.far)
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    pub fn look_at(&mut self, target: Vec3) {
        let direction = target - self.position;
        if direction.length_squared() > 0.0 {
            self.rotation = Quat::from_rotation_arc(Vec3::NEG_Z, direction.normalize());
        }
    }
}

/// Right-handed perspective with Y flipped for Vulkan clip space.
pub fn vulkan_perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    let mut proj = Mat4::perspective_rh(fov_y, aspect, near, far);
    proj.y_axis.y *= -1.0;
    proj
}

/// View-projection for each cubemap face seen from `center`, in +X, -X,
/// +Y, -Y, +Z, -Z order, with a 90 degree square frustum.
pub fn cube_face_view_projections(center: Vec3, near: f32, far: f32) -> [Mat4; 6] {
    let faces = [
        (Vec3::X, Vec3::NEG_Y),
        (Vec3::NEG_X, Vec3::NEG_Y),
        (Vec3::Y, Vec3::Z),
        (Vec3::NEG_Y, Vec3::NEG_Z),
        (Vec3::Z, Vec3::NEG_Y),
        (Vec3::NEG_Z, Vec3::NEG_Y),
    ];
    // Cubemap sampling expects unflipped faces, so no Vulkan Y flip here.
    let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, near, far);
    faces.map(|(dir, up)| proj * Mat4::look_to_rh(center, dir, up))
}

/// Yaw/pitch fly camera driven by an [`InputContext`].
#[derive(Clone, Debug)]
pub struct FlyController {
    pub yaw: f32,
    pub pitch: f32,
    /// Units per second.
    pub speed: f32,
    /// Radians per pixel of cursor motion.
    pub sensitivity: f32,
}

impl Default for FlyController {
    fn default() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            speed: 3.0,
            sensitivity: 0.003,
        }
    }
}

impl FlyController {
    const PITCH_LIMIT: f32 = 89.0 * std::f32::consts::PI / 180.0;
    const BOOST: f32 = 4.0;

    pub fn update(&mut self, camera: &mut Camera, input: &InputContext, dt: f32) {
        if input.look_active {
            self.yaw -= input.look_delta.x * self.sensitivity;
            self.pitch = (self.pitch - input.look_delta.y * self.sensitivity)
                .clamp(-Self::PITCH_LIMIT, Self::PITCH_LIMIT);
        }
        camera.rotation = Quat::from_rotation_y(self.yaw) * Quat::from_rotation_x(self.pitch);

        let movement = input.movement;
        if movement.length_squared() > 0.0 {
            let speed = if input.boost {
                self.speed * Self::BOOST
            } else {
                self.speed
            };
            let direction =
                camera.right() * movement.x + Vec3::Y * movement.y + camera.forward() * movement.z;
            camera.position += direction.normalize_or_zero() * speed * dt;
        }
    }
}
