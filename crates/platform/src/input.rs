//! Raw keyboard and mouse state accumulated from window events.

use std::collections::HashSet;

use glam::Vec2;
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::keyboard::PhysicalKey;

pub use winit::keyboard::KeyCode;

/// Held keys and buttons, edge-triggered presses and cursor motion.
///
/// Events are fed in through [`InputState::handle_event`]; the per-frame
/// edges and deltas are cleared by [`InputState::end_frame`] after the frame
/// has consumed them.
#[derive(Debug, Default)]
pub struct InputState {
    held_keys: HashSet<KeyCode>,
    pressed_keys: HashSet<KeyCode>,
    held_buttons: HashSet<MouseButton>,

    cursor: Option<Vec2>,
    cursor_delta: Vec2,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one window event into the state. Returns `true` if the event was
    /// an input event.
    pub fn handle_event(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    match event.state {
                        ElementState::Pressed => self.on_key_pressed(code),
                        ElementState::Released => self.on_key_released(code),
                    }
                }
                true
            }
            WindowEvent::MouseInput { state, button, .. } => {
                match state {
                    ElementState::Pressed => self.held_buttons.insert(*button),
                    ElementState::Released => self.held_buttons.remove(button),
                };
                true
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.on_cursor_moved(Vec2::new(position.x as f32, position.y as f32));
                true
            }
            WindowEvent::CursorLeft { .. } => {
                self.cursor = None;
                true
            }
            WindowEvent::Focused(false) => {
                self.held_keys.clear();
                self.held_buttons.clear();
                true
            }
            _ => false,
        }
    }

    pub fn on_key_pressed(&mut self, key: KeyCode) {
        // Auto-repeat arrives as repeated presses; only the first is an edge.
        if self.held_keys.insert(key) {
            self.pressed_keys.insert(key);
        }
    }

    pub fn on_key_released(&mut self, key: KeyCode) {
        self.held_keys.remove(&key);
    }

    pub fn on_cursor_moved(&mut self, position: Vec2) {
        if let Some(previous) = self.cursor {
            self.cursor_delta += position - previous;
        }
        self.cursor = Some(position);
    }

    /// Clears edges and deltas. Call once per frame after reading.
    pub fn end_frame(&mut self) {
        self.pressed_keys.clear();
        self.cursor_delta = Vec2::ZERO;
    }

    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.held_keys.contains(&key)
    }

    /// True only on the frame the key went down.
    pub fn was_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    pub fn is_button_down(&self, button: MouseButton) -> bool {
        self.held_buttons.contains(&button)
    }

    /// `+1` while only `positive` is held, `-1` while only `negative` is.
    pub fn axis(&self, negative: KeyCode, positive: KeyCode) -> f32 {
        let mut value = 0.0;
        if self.is_key_down(positive) {
            value += 1.0;
        }
        if self.is_key_down(negative) {
            value -= 1.0;
        }
        value
    }

    pub fn cursor_delta(&self) -> Vec2 {
        self.cursor_delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_press_is_edge_triggered() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::Digit1);
        assert!(input.was_key_pressed(KeyCode::Digit1));

        input.end_frame();
        input.on_key_pressed(KeyCode::Digit1);
        assert!(!input.was_key_pressed(KeyCode::Digit1));
        assert!(input.is_key_down(KeyCode::Digit1));

        input.on_key_released(KeyCode::Digit1);
        input.on_key_pressed(KeyCode::Digit1);
        assert!(input.was_key_pressed(KeyCode::Digit1));
    }

    #[test]
    fn test_axis_cancels_opposing_keys() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyD);
        assert_eq!(input.axis(KeyCode::KeyA, KeyCode::KeyD), 1.0);
        input.on_key_pressed(KeyCode::KeyA);
        assert_eq!(input.axis(KeyCode::KeyA, KeyCode::KeyD), 0.0);
        input.on_key_released(KeyCode::KeyD);
        assert_eq!(input.axis(KeyCode::KeyA, KeyCode::KeyD), -1.0);
    }

    #[test]
    fn test_cursor_delta_accumulates_until_end_frame() {
        let mut input = InputState::new();
        input.on_cursor_moved(Vec2::new(10.0, 10.0));
        assert_eq!(input.cursor_delta(), Vec2::ZERO);

        input.on_cursor_moved(Vec2::new(12.0, 9.0));
        input.on_cursor_moved(Vec2::new(15.0, 9.0));
        assert_eq!(input.cursor_delta(), Vec2::new(5.0, -1.0));

        input.end_frame();
        assert_eq!(input.cursor_delta(), Vec2::ZERO);
    }
}
