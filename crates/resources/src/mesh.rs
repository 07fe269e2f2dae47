//! Host-side mesh data, vertex deduplication and procedural primitives.

use std::collections::HashMap;

use glam::{Vec2, Vec3};
use kiln_rhi::vertex::Vertex;

/// Flat vertex array with an optional index array.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    /// Empty for meshes drawn without an index buffer.
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Non-indexed mesh; every three vertices form a triangle.
    pub fn from_vertices(vertices: Vec<Vertex>) -> Self {
        Self {
            vertices,
            indices: Vec::new(),
        }
    }

    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    #[inline]
    pub fn is_indexed(&self) -> bool {
        !self.indices.is_empty()
    }

    /// Unit cube centred at the origin with per-face normals.
    pub fn cube(color: Vec3) -> Self {
        // (normal, tangent u, tangent v) per face.
        let faces = [
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        ];
        let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

        let mut builder = MeshBuilder::new();
        for (normal, u, v) in faces {
            let quad = corners.map(|(a, b)| {
                let position = (normal + u * a + v * b) * 0.5;
                let uv = Vec2::new((a + 1.0) * 0.5, 1.0 - (b + 1.0) * 0.5);
                builder.push(Vertex::new(position, color, normal, uv))
            });
            builder.push_triangle_indices([quad[0], quad[1], quad[2]]);
            builder.push_triangle_indices([quad[2], quad[3], quad[0]]);
        }
        builder.build()
    }

    /// Inward-facing cube for the skybox, positions only, non-indexed.
    pub fn skybox_cube() -> Self {
        let cube = Self::cube(Vec3::ONE);
        let vertices = cube
            .indices
            .iter()
            .map(|&i| {
                let v = cube.vertices[i as usize];
                Vertex::new(v.position, Vec3::ONE, -v.normal, Vec2::ZERO)
            })
            .collect();
        Self::from_vertices(vertices)
    }

    /// UV sphere of radius 0.5. `segments` around, `rings` pole to pole.
    pub fn uv_sphere(segments: u32, rings: u32, color: Vec3) -> Self {
        use std::f32::consts::{PI, TAU};

        let segments = segments.max(3);
        let rings = rings.max(2);
        let mut builder = MeshBuilder::new();
        let mut grid = Vec::with_capacity(((segments + 1) * (rings + 1)) as usize);

        for ring in 0..=rings {
            let v = ring as f32 / rings as f32;
            let theta = v * PI;
            for segment in 0..=segments {
                let u = segment as f32 / segments as f32;
                let phi = u * TAU;
                let normal = Vec3::new(theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin());
                grid.push(builder.push(Vertex::new(normal * 0.5, color, normal, Vec2::new(u, v))));
            }
        }

        let stride = segments + 1;
        for ring in 0..rings {
            for segment in 0..segments {
                let a = grid[(ring * stride + segment) as usize];
                let b = grid[((ring + 1) * stride + segment) as usize];
                let c = grid[((ring + 1) * stride + segment + 1) as usize];
                let d = grid[(ring * stride + segment + 1) as usize];
                if ring != 0 {
                    builder.push_triangle_indices([a, d, b]);
                }
                if ring != rings - 1 {
                    builder.push_triangle_indices([b, d, c]);
                }
            }
        }
        builder.build()
    }

    /// Unit quad in the XZ plane facing +Y.
    pub fn quad(color: Vec3) -> Self {
        let mut builder = MeshBuilder::new();
        let corners = [(-0.5, 0.5), (0.5, 0.5), (0.5, -0.5), (-0.5, -0.5)];
        let quad = corners.map(|(x, z)| {
            builder.push(Vertex::new(
                Vec3::new(x, 0.0, z),
                color,
                Vec3::Y,
                Vec2::new(x + 0.5, z + 0.5),
            ))
        });
        builder.push_triangle_indices([quad[0], quad[1], quad[2]]);
        builder.push_triangle_indices([quad[2], quad[3], quad[0]]);
        builder.build()
    }
}

/// Accumulates vertices, merging exact duplicates.
///
/// The first occurrence of a vertex fixes its index, so feeding the same
/// sequence twice yields identical buffers.
#[derive(Debug, Default)]
pub struct MeshBuilder {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    lookup: HashMap<Vertex, u32>,
}

impl MeshBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index of `vertex` without emitting it into the index
    /// list.
    pub fn push(&mut self, vertex: Vertex) -> u32 {
        *self.lookup.entry(vertex).or_insert_with(|| {
            self.vertices.push(vertex);
            (self.vertices.len() - 1) as u32
        })
    }

    /// Deduplicates `vertex` and appends its index.
    pub fn push_indexed(&mut self, vertex: Vertex) {
        let index = self.push(vertex);
        self.indices.push(index);
    }

    pub fn push_triangle_indices(&mut self, triangle: [u32; 3]) {
        self.indices.extend_from_slice(&triangle);
    }

    pub fn unique_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn build(self) -> MeshData {
        MeshData {
            vertices: self.vertices,
            indices: self.indices,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(x: f32) -> Vertex {
        Vertex::new(Vec3::new(x, 0.0, 0.0), Vec3::ONE, Vec3::Y, Vec2::ZERO)
    }

    #[test]
    fn test_builder_merges_exact_duplicates() {
        let mut builder = MeshBuilder::new();
        for x in [0.0, 1.0, 0.0, 2.0, 1.0] {
            builder.push_indexed(vertex(x));
        }
        let mesh = builder.build();
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.indices, vec![0, 1, 0, 2, 1]);
    }

    #[test]
    fn test_builder_keeps_near_duplicates_apart() {
        let mut builder = MeshBuilder::new();
        builder.push_indexed(vertex(0.0));
        builder.push_indexed(vertex(f32::EPSILON));
        assert_eq!(builder.unique_vertices(), 2);
    }

    #[test]
    fn test_dedup_is_deterministic() {
        let sequence = [3.0, 1.0, 3.0, 2.0, 1.0, 2.0];
        let build = || {
            let mut builder = MeshBuilder::new();
            sequence.iter().for_each(|&x| builder.push_indexed(vertex(x)));
            builder.build()
        };
        let first = build();
        let second = build();
        assert_eq!(first, second);
        assert_eq!(first.vertices[0].position.x, 3.0);
    }

    #[test]
    fn test_cube_shape() {
        let cube = MeshData::cube(Vec3::ONE);
        assert_eq!(cube.vertex_count(), 24);
        assert_eq!(cube.index_count(), 36);
        assert!(cube.vertices.iter().all(|v| v.position.abs().max_element() <= 0.5));
    }

    #[test]
    fn test_skybox_is_non_indexed_and_inward() {
        let sky = MeshData::skybox_cube();
        assert!(!sky.is_indexed());
        assert_eq!(sky.vertex_count(), 36);
        assert!(sky.vertices.iter().all(|v| v.normal.dot(v.position) < 0.0));
    }

    #[test]
    fn test_sphere_vertices_on_surface() {
        let sphere = MeshData::uv_sphere(16, 8, Vec3::ONE);
        assert!(sphere.is_indexed());
        assert_eq!(sphere.index_count() % 3, 0);
        assert!(
            sphere
                .vertices
                .iter()
                .all(|v| (v.position.length() - 0.5).abs() < 1e-5)
        );
        assert!(sphere.indices.iter().all(|&i| i < sphere.vertex_count()));
    }

    #[test]
    fn test_quad_faces_up() {
        let quad = MeshData::quad(Vec3::ONE);
        assert_eq!(quad.vertex_count(), 4);
        assert_eq!(quad.index_count(), 6);
        assert!(quad.vertices.iter().all(|v| v.normal == Vec3::Y));
    }
}
