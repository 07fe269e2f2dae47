//! Error types for asset loading.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("Failed to load OBJ '{path}': {source}")]
    Obj {
        path: PathBuf,
        #[source]
        source: tobj::LoadError,
    },

    #[error("OBJ '{0}' contains no geometry")]
    EmptyMesh(PathBuf),

    /// An OBJ face references a position, normal or uv that does not exist.
    #[error("Index {index} out of range for {attribute} ({len} entries)")]
    IndexOutOfRange {
        attribute: &'static str,
        index: u32,
        len: usize,
    },

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Cubemap face '{path}' is {width}x{height}, expected {expected}x{expected}")]
    CubeFaceMismatch {
        path: PathBuf,
        width: u32,
        height: u32,
        expected: u32,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
}

pub type ResourceResult<T> = Result<T, ResourceError>;
