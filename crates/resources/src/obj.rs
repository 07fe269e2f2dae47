//! Wavefront OBJ loading.
//!
//! Every model in the file is merged into one [`MeshData`]. Faces are
//! triangulated and corners with identical position, colour, normal and uv
//! collapse into one vertex.

use std::io::BufRead;
use std::path::Path;

use glam::{Vec2, Vec3};
use kiln_rhi::vertex::Vertex;
use tracing::{debug, info};

use crate::error::{ResourceError, ResourceResult};
use crate::mesh::{MeshBuilder, MeshData};

fn load_options() -> tobj::LoadOptions {
    tobj::LoadOptions {
        triangulate: true,
        single_index: false,
        ignore_points: true,
        ignore_lines: true,
        ..Default::default()
    }
}

/// Loads an OBJ file. Materials are ignored.
pub fn load_obj(path: impl AsRef<Path>) -> ResourceResult<MeshData> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ResourceError::FileNotFound(path.to_path_buf()));
    }

    let (models, _materials) =
        tobj::load_obj(path, &load_options()).map_err(|source| ResourceError::Obj {
            path: path.to_path_buf(),
            source,
        })?;

    let mesh = build_mesh(&models)?;
    if mesh.vertices.is_empty() {
        return Err(ResourceError::EmptyMesh(path.to_path_buf()));
    }

    info!(
        "Loaded OBJ '{}': {} models, {} unique vertices, {} indices",
        path.display(),
        models.len(),
        mesh.vertex_count(),
        mesh.index_count()
    );
    Ok(mesh)
}

/// Parses OBJ text from a reader. `mtllib` statements are skipped.
pub fn parse_obj<R: BufRead>(reader: &mut R) -> ResourceResult<MeshData> {
    let (models, _materials) = tobj::load_obj_buf(reader, &load_options(), |_| {
        Err(tobj::LoadError::OpenFileFailed)
    })
    .map_err(|source| ResourceError::Obj {
        path: "<buffer>".into(),
        source,
    })?;
    build_mesh(&models)
}

fn build_mesh(models: &[tobj::Model]) -> ResourceResult<MeshData> {
    let mut builder = MeshBuilder::new();
    let mut corners = 0usize;

    for model in models {
        let mesh = &model.mesh;
        debug!(
            "OBJ model '{}': {} corners, normals: {}, uvs: {}",
            model.name,
            mesh.indices.len(),
            !mesh.normal_indices.is_empty(),
            !mesh.texcoord_indices.is_empty()
        );

        for (corner, &position_index) in mesh.indices.iter().enumerate() {
            let position = vec3_at(&mesh.positions, position_index, "position")?;
            let color = if mesh.vertex_color.is_empty() {
                Vec3::ONE
            } else {
                vec3_at(&mesh.vertex_color, position_index, "color")?
            };
            let normal = match mesh.normal_indices.get(corner) {
                Some(&i) => vec3_at(&mesh.normals, i, "normal")?,
                None => Vec3::ZERO,
            };
            let uv = match mesh.texcoord_indices.get(corner) {
                // OBJ puts v = 0 at the bottom; Vulkan samples top-down.
                Some(&i) => {
                    let uv = vec2_at(&mesh.texcoords, i, "uv")?;
                    Vec2::new(uv.x, 1.0 - uv.y)
                }
                None => Vec2::ZERO,
            };
            builder.push_indexed(Vertex::new(position, color, normal, uv));
        }
        corners += mesh.indices.len();
    }

    debug!(
        "Deduplicated {} corners into {} vertices",
        corners,
        builder.unique_vertices()
    );
    Ok(builder.build())
}

fn vec3_at(data: &[f32], index: u32, attribute: &'static str) -> ResourceResult<Vec3> {
    let start = index as usize * 3;
    data.get(start..start + 3)
        .map(Vec3::from_slice)
        .ok_or(ResourceError::IndexOutOfRange {
            attribute,
            index,
            len: data.len() / 3,
        })
}

fn vec2_at(data: &[f32], index: u32, attribute: &'static str) -> ResourceResult<Vec2> {
    let start = index as usize * 2;
    data.get(start..start + 2)
        .map(Vec2::from_slice)
        .ok_or(ResourceError::IndexOutOfRange {
            attribute,
            index,
            len: data.len() / 2,
        })
}
