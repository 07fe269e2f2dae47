//! Vertex layout shared by every mesh pipeline.

use std::hash::{Hash, Hasher};

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Interleaved vertex: position, colour, normal, uv.
///
/// Equality and hashing are bitwise over all attributes so that mesh
/// builders can deduplicate vertices by exact attribute equality.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub color: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

impl Vertex {
    #[inline]
    pub const fn new(position: Vec3, color: Vec3, normal: Vec3, uv: Vec2) -> Self {
        Self {
            position,
            color,
            normal,
            uv,
        }
    }

    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 4] {
        let attribute = |location, format, offset| vk::VertexInputAttributeDescription {
            binding: 0,
            location,
            format,
            offset,
        };
        [
            attribute(0, vk::Format::R32G32B32_SFLOAT, 0),
            attribute(1, vk::Format::R32G32B32_SFLOAT, 12),
            attribute(2, vk::Format::R32G32B32_SFLOAT, 24),
            attribute(3, vk::Format::R32G32_SFLOAT, 36),
        ]
    }
}

impl PartialEq for Vertex {
    fn eq(&self, other: &Self) -> bool {
        bytemuck::bytes_of(self) == bytemuck::bytes_of(other)
    }
}

impl Eq for Vertex {}

impl Hash for Vertex {
    fn hash<H: Hasher>(&self, state: &mut H) {
        bytemuck::bytes_of(self).hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_vertex_size_matches_stride() {
        assert_eq!(std::mem::size_of::<Vertex>(), 44);
        assert_eq!(Vertex::binding_description().stride, 44);
    }

    #[test]
    fn test_attribute_offsets_match_fields() {
        let attributes = Vertex::attribute_descriptions();
        assert_eq!(attributes[1].offset as usize, std::mem::offset_of!(Vertex, color));
        assert_eq!(attributes[2].offset as usize, std::mem::offset_of!(Vertex, normal));
        assert_eq!(attributes[3].offset as usize, std::mem::offset_of!(Vertex, uv));
        assert!(
            attributes
                .iter()
                .enumerate()
                .all(|(i, a)| a.location == i as u32)
        );
    }

    #[test]
    fn test_equal_vertices_hash_together() {
        let a = Vertex::new(Vec3::X, Vec3::ONE, Vec3::Y, Vec2::ZERO);
        let b = a;
        let c = Vertex::new(Vec3::X, Vec3::ONE, Vec3::Y, Vec2::new(0.0, 1.0));

        let set: HashSet<Vertex> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
