//! Scene-side data for the kiln renderer.
//!
//! - [`RenderableObject`]s created by an [`ObjectFactory`] and owned by an
//!   [`ObjectSet`]
//! - [`Transform`] with cached model and normal matrices
//! - [`Camera`] and the [`FlyController`] driven by an [`InputContext`]

pub mod camera;
pub mod input;
pub mod light;
pub mod object;
pub mod transform;

pub use camera::{Camera, FlyController, cube_face_view_projections, vulkan_perspective};
pub use input::InputContext;
pub use light::PointLight;
pub use object::{MeshHandle, ObjectFactory, ObjectId, ObjectKind, ObjectSet, RenderableObject};
pub use transform::Transform;
