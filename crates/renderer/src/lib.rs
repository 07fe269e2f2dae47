//! Frame orchestration and scene rendering.
//!
//! This crate sits on top of the RHI:
//! - [`FrameOrchestrator`] drives acquire, record, submit and present
//! - [`RenderPassRegistry`] owns named offscreen targets
//! - [`PassGraph`] orders auxiliary passes before the swapchain pass and
//!   dispatches [`RenderSystem`]s inside them
//! - [`Renderer`] ties the device, the surface and the active [`Scene`]
//!   together

pub mod error;
pub mod frame;
pub mod input;
pub mod mesh;
pub mod orchestrator;
pub mod overlay;
pub mod pass_graph;
pub mod pass_registry;
pub mod renderer;
pub mod scene;
pub mod scenes;
pub mod systems;

#[cfg(test)]
mod testing;

pub use error::{RenderError, RenderResult};
pub use frame::{FrameBackend, FrameContext, PassBegin};
pub use input::input_context;
pub use mesh::{Mesh, MeshArena};
pub use orchestrator::{FrameOrchestrator, FrameToken};
pub use overlay::{FrameStats, FrameStatsOverlay, NoOverlay, Overlay};
pub use pass_graph::{
    AuxiliaryPass, DynamicIndex, PassGraph, PassGraphBuilder, SystemBinding, SystemId,
};
pub use pass_registry::{RenderPassRegistry, RenderPassTarget, TargetDescriptor, TargetKind};
pub use renderer::Renderer;
pub use scene::{Scene, SceneContext, create_scene, scene_for_index};
pub use systems::RenderSystem;
