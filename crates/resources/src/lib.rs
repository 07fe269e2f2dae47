//! CPU-side asset data for the kiln renderer.
//!
//! - [`MeshData`] and the deduplicating [`MeshBuilder`], plus procedural
//!   primitives
//! - Wavefront OBJ loading via [`obj::load_obj`]
//! - RGBA8 [`ImageData`] for textures and cubemap faces
//! - std140 uniform blocks and push constants in [`ubo`]

pub mod error;
pub mod image_data;
pub mod mesh;
pub mod obj;
pub mod ubo;

pub use error::{ResourceError, ResourceResult};
pub use image_data::ImageData;
pub use mesh::{MeshBuilder, MeshData};
