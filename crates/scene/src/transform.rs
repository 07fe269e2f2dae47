//! Translation, rotation and scale with cached matrices.
//!
//! ```
//! use kiln_scene::Transform;
//! use glam::Vec3;
//!
//! let mut t = Transform::new().with_translation(Vec3::new(1.0, 0.0, 0.0));
//! t.set_scale(Vec3::splat(2.0));
//! let p = t.model_matrix().transform_point3(Vec3::ONE);
//! assert!((p - Vec3::new(3.0, 2.0, 2.0)).length() < 1e-5);
//! ```

use glam::{Mat4, Quat, Vec3};

/// Object placement. The model and normal matrices are recomputed on every
/// setter call so draws can read them without work.
#[derive(Clone, Debug, PartialEq)]
pub struct Transform {
    translation: Vec3,
    rotation: Quat,
    scale: Vec3,
    model: Mat4,
    normal: Mat4,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            model: Mat4::IDENTITY,
            normal: Mat4::IDENTITY,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_translation(mut self, translation: Vec3) -> Self {
        self.set_translation(translation);
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.set_rotation(rotation);
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.set_scale(scale);
        self
    }

    pub fn set_translation(&mut self, translation: Vec3) {
        self.translation = translation;
        self.recompute();
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
        self.recompute();
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
        self.recompute();
    }

    #[inline]
    pub fn translation(&self) -> Vec3 {
        self.translation
    }

    #[inline]
    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    #[inline]
    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    #[inline]
    pub fn model_matrix(&self) -> Mat4 {
        self.model
    }

    /// Inverse transpose of the model matrix, or identity when the model
    /// matrix is singular (zero scale).
    #[inline]
    pub fn normal_matrix(&self) -> Mat4 {
        self.normal
    }

    fn recompute(&mut self) {
        const EPSILON: f32 = 1e-6;

        self.model =
            Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation);
        self.normal = if self.model.determinant().abs() < EPSILON {
            Mat4::IDENTITY
        } else {
            self.model.inverse().transpose()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-5;

    fn approx_eq_vec3(a: Vec3, b: Vec3) -> bool {
        (a - b).abs().max_element() < EPSILON
    }

    #[test]
    fn test_transform_default() {
        let t = Transform::default();
        assert_eq!(t.translation(), Vec3::ZERO);
        assert_eq!(t.rotation(), Quat::IDENTITY);
        assert_eq!(t.scale(), Vec3::ONE);
        assert_eq!(t.model_matrix(), Mat4::IDENTITY);
        assert_eq!(t.normal_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn test_cached_model_follows_setters() {
        let mut t = Transform::new().with_translation(Vec3::new(0.0, 0.0, -2.0));
        t.set_rotation(Quat::from_rotation_y(std::f32::consts::FRAC_PI_2));
        let p = t.model_matrix().transform_point3(Vec3::X);
        assert!(approx_eq_vec3(p, Vec3::new(0.0, 0.0, -3.0)));
    }

    #[test]
    fn test_normal_matrix_with_scale() {
        let t = Transform::new().with_scale(Vec3::new(1.0, 2.0, 1.0));
        let expected = t.model_matrix().inverse().transpose();
        assert_eq!(t.normal_matrix(), expected);

        // A Y-facing normal stays Y-facing after non-uniform Y scale.
        let n = t.normal_matrix().transform_vector3(Vec3::Y).normalize();
        assert!(approx_eq_vec3(n, Vec3::Y));
    }

    #[test]
    fn test_normal_matrix_non_invertible() {
        let t = Transform::new().with_scale(Vec3::ZERO);
        let normal = t.normal_matrix();
        assert_eq!(normal, Mat4::IDENTITY);
        assert!(normal.is_finite());
    }
}
