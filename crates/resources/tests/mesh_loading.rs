//! Integration tests for OBJ loading and vertex deduplication.

use std::path::{Path, PathBuf};

use kiln_resources::obj::load_obj;
use kiln_resources::{MeshData, ResourceError};

const CUBE_OBJ: &str = "\
o cube
v -0.5 -0.5  0.5
v  0.5 -0.5  0.5
v  0.5  0.5  0.5
v -0.5  0.5  0.5
v -0.5 -0.5 -0.5
v  0.5 -0.5 -0.5
v  0.5  0.5 -0.5
v -0.5  0.5 -0.5
vn 0 0 1
vn 0 0 -1
vn 1 0 0
vn -1 0 0
vn 0 1 0
vn 0 -1 0
f 1//1 2//1 3//1 4//1
f 6//2 5//2 8//2 7//2
f 2//3 6//3 7//3 3//3
f 5//4 1//4 4//4 8//4
f 4//5 3//5 7//5 8//5
f 5//6 6//6 2//6 1//6
";

fn write_fixture(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("kiln-{}-{}", std::process::id(), name));
    std::fs::write(&path, contents).expect("Failed to write OBJ fixture");
    path
}

#[test]
fn test_load_same_obj_twice_is_identical() {
    let path = write_fixture("cube.obj", CUBE_OBJ);

    let first = load_obj(&path).expect("Failed to load OBJ");
    let second = load_obj(&path).expect("Failed to load OBJ");
    std::fs::remove_file(&path).ok();

    assert_eq!(first.vertex_count(), second.vertex_count());
    assert_eq!(first.indices, second.indices);
    assert_eq!(first, second);
}

#[test]
fn test_obj_cube_dedups_shared_corners() {
    let path = write_fixture("dedup.obj", CUBE_OBJ);
    let mesh = load_obj(&path).expect("Failed to load OBJ");
    std::fs::remove_file(&path).ok();

    // Six faces of four corners, each corner unique per face normal.
    assert_eq!(mesh.vertex_count(), 24);
    assert_eq!(mesh.index_count(), 36);
    assert!(mesh.indices.iter().all(|&i| i < mesh.vertex_count()));
}

#[test]
fn test_obj_matches_procedural_cube_counts() {
    let path = write_fixture("counts.obj", CUBE_OBJ);
    let loaded = load_obj(&path).expect("Failed to load OBJ");
    std::fs::remove_file(&path).ok();

    let procedural = MeshData::cube(glam::Vec3::ONE);
    assert_eq!(loaded.vertex_count(), procedural.vertex_count());
    assert_eq!(loaded.index_count(), procedural.index_count());
}

#[test]
fn test_empty_obj_is_rejected() {
    let path = write_fixture("empty.obj", "# nothing here\n");
    let result = load_obj(&path);
    std::fs::remove_file(&path).ok();

    assert!(matches!(
        result,
        Err(ResourceError::EmptyMesh(_)) | Err(ResourceError::Obj { .. })
    ));
}

#[test]
fn test_load_bundled_model() {
    let model_path = Path::new("../../assets/models/smooth_vase.obj");

    // Asset checkouts are optional.
    if !model_path.exists() {
        println!("Skipping test: model file not found at {:?}", model_path);
        return;
    }

    let first = load_obj(model_path).expect("Failed to load model");
    let second = load_obj(model_path).expect("Failed to load model");
    assert!(first.is_indexed());
    assert_eq!(first.indices, second.indices);
    assert!(first.vertex_count() as usize <= first.indices.len());
}
