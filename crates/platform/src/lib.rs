//! Windowing collaborator for the kiln renderer.
//!
//! - [`Window`]: winit window with a resize flag
//! - [`Surface`]: Vulkan surface created from the window
//! - [`InputState`]: raw key, button and cursor state

mod input;
mod window;

pub use input::{InputState, KeyCode};
pub use window::{Surface, Window, required_extensions};

pub use winit::event::{MouseButton, WindowEvent};
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
