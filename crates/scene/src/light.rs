//! Point-light parameters carried by light-marker objects.

use glam::Vec3;

/// Phong point light. Its position is the owning object's translation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointLight {
    pub color: Vec3,
    pub ambient: f32,
    pub diffuse: f32,
    pub specular: f32,
    /// Constant, linear and quadratic attenuation terms.
    pub attenuation: Vec3,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            ambient: 0.05,
            diffuse: 0.8,
            specular: 1.0,
            attenuation: Vec3::new(1.0, 0.09, 0.032),
        }
    }
}

impl PointLight {
    pub fn with_color(color: Vec3) -> Self {
        Self {
            color,
            ..Self::default()
        }
    }

    /// Attenuation factor at `distance`.
    pub fn falloff(&self, distance: f32) -> f32 {
        let [k, l, q] = self.attenuation.to_array();
        1.0 / (k + l * distance + q * distance * distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_falloff_is_one_at_source() {
        let light = PointLight::default();
        assert!((light.falloff(0.0) - 1.0).abs() < 1e-6);
        assert!(light.falloff(10.0) < light.falloff(1.0));
    }
}
