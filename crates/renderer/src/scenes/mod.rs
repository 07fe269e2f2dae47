//! The three demo scenes.

mod common;
mod deferred;
mod forward;
mod reflection;

pub use common::{LightRing, Viewpoint, apply_light_limit, collect_lights};
pub use deferred::{DeferredScene, GBUFFER_PASS};
pub use forward::ForwardScene;
pub use reflection::{CAPTURE_PASSES, ReflectionScene};
