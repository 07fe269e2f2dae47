//! Per-frame input snapshot passed explicitly to scene updates.

use glam::{Vec2, Vec3};

/// What the user asked for this frame, independent of the windowing layer.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct InputContext {
    /// Movement intent: x right, y up, z forward. Components in -1..=1.
    pub movement: Vec3,
    /// Cursor motion in pixels since the previous frame.
    pub look_delta: Vec2,
    /// True while the look button is held.
    pub look_active: bool,
    /// Scene index requested by an edge-triggered key press.
    pub scene_request: Option<usize>,
    /// Fast movement modifier.
    pub boost: bool,
}

impl InputContext {
    pub fn is_idle(&self) -> bool {
        self.movement == Vec3::ZERO && (!self.look_active || self.look_delta == Vec2::ZERO)
    }
}
