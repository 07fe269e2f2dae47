//! Decoded RGBA8 images for textures and cubemaps.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{ResourceError, ResourceResult};

/// Tightly packed RGBA8 pixels, row-major, top row first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl ImageData {
    /// Decodes any format the `image` crate understands and converts it to
    /// RGBA8.
    pub fn load(path: impl AsRef<Path>) -> ResourceResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ResourceError::FileNotFound(path.to_path_buf()));
        }
        let rgba = image::open(path)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        info!("Loaded image '{}' ({}x{})", path.display(), width, height);
        Ok(Self {
            width,
            height,
            pixels: rgba.into_raw(),
        })
    }

    /// A `size` x `size` image filled with one colour.
    pub fn solid(size: u32, rgba: [u8; 4]) -> Self {
        let size = size.max(1);
        Self {
            width: size,
            height: size,
            pixels: rgba.repeat((size * size) as usize),
        }
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

/// File names of the six faces in +X, -X, +Y, -Y, +Z, -Z order.
pub const CUBE_FACE_NAMES: [&str; 6] = [
    "posx.jpg", "negx.jpg", "posy.jpg", "negy.jpg", "posz.jpg", "negz.jpg",
];

pub fn cube_face_paths(dir: &Path) -> [PathBuf; 6] {
    CUBE_FACE_NAMES.map(|name| dir.join(name))
}

/// Loads six square faces of equal size.
pub fn load_cube_faces(dir: impl AsRef<Path>) -> ResourceResult<[ImageData; 6]> {
    let paths = cube_face_paths(dir.as_ref());
    let [px, nx, py, ny, pz, nz] = paths.each_ref().map(ImageData::load);
    let faces = [px?, nx?, py?, ny?, pz?, nz?];
    check_cube_faces(&faces, &paths)?;
    Ok(faces)
}

fn check_cube_faces(faces: &[ImageData], paths: &[PathBuf]) -> ResourceResult<()> {
    let expected = faces.first().map(|f| f.width).unwrap_or(0);
    for (face, path) in faces.iter().zip(paths) {
        if face.width != expected || face.height != expected {
            return Err(ResourceError::CubeFaceMismatch {
                path: path.clone(),
                width: face.width,
                height: face.height,
                expected,
            });
        }
    }
    Ok(())
}

/// Six solid faces, used when no skybox directory is configured.
pub fn solid_cube_faces(size: u32, rgba: [u8; 4]) -> [ImageData; 6] {
    std::array::from_fn(|_| ImageData::solid(size, rgba))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_image() {
        let image = ImageData::solid(4, [10, 20, 30, 255]);
        assert_eq!(image.byte_len(), 4 * 4 * 4);
        assert_eq!(&image.pixels[4..8], &[10, 20, 30, 255]);
    }

    #[test]
    fn test_solid_image_never_empty() {
        let image = ImageData::solid(0, [0; 4]);
        assert_eq!((image.width, image.height), (1, 1));
    }

    #[test]
    fn test_cube_face_order() {
        let paths = cube_face_paths(Path::new("sky"));
        assert!(paths[0].ends_with("posx.jpg"));
        assert!(paths[5].ends_with("negz.jpg"));
    }

    #[test]
    fn test_mismatched_face_rejected() {
        let mut faces = solid_cube_faces(8, [0; 4]).to_vec();
        faces[3] = ImageData::solid(4, [0; 4]);
        let paths = cube_face_paths(Path::new("sky"));
        let err = check_cube_faces(&faces, &paths).unwrap_err();
        assert!(matches!(
            err,
            ResourceError::CubeFaceMismatch { expected: 8, width: 4, .. }
        ));
    }

    #[test]
    fn test_load_missing_image() {
        let err = ImageData::load("no/such/image.png").unwrap_err();
        assert!(matches!(err, ResourceError::FileNotFound(_)));
    }
}
