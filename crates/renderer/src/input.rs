//! Maps raw window input onto the scene-facing [`InputContext`].

use glam::Vec3;
use kiln_platform::{InputState, KeyCode, MouseButton};
use kiln_scene::InputContext;

const SCENE_KEYS: [KeyCode; 3] = [KeyCode::Digit1, KeyCode::Digit2, KeyCode::Digit3];

/// WASD moves, Space and Left Ctrl rise and sink, the right mouse button
/// looks around, Left Shift speeds up and the number keys pick a scene.
pub fn input_context(input: &InputState) -> InputContext {
    let movement = Vec3::new(
        input.axis(KeyCode::KeyA, KeyCode::KeyD),
        input.axis(KeyCode::ControlLeft, KeyCode::Space),
        input.axis(KeyCode::KeyS, KeyCode::KeyW),
    );

    InputContext {
        movement,
        look_delta: input.cursor_delta(),
        look_active: input.is_button_down(MouseButton::Right),
        scene_request: SCENE_KEYS.iter().position(|&key| input.was_key_pressed(key)),
        boost: input.is_key_down(KeyCode::ShiftLeft),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_input() {
        let ctx = input_context(&InputState::new());
        assert!(ctx.is_idle());
        assert_eq!(ctx.scene_request, None);
        assert!(!ctx.boost);
    }

    #[test]
    fn test_movement_axes() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyW);
        input.on_key_pressed(KeyCode::KeyA);
        input.on_key_pressed(KeyCode::Space);

        let ctx = input_context(&input);
        assert_eq!(ctx.movement, Vec3::new(-1.0, 1.0, 1.0));
    }

    #[test]
    fn test_number_key_requests_scene_once() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::Digit3);
        assert_eq!(input_context(&input).scene_request, Some(2));

        input.end_frame();
        assert_eq!(input_context(&input).scene_request, None);
    }
}
