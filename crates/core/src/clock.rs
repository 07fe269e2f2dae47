//! Frame timing.

use std::time::{Duration, Instant};

/// Longest delta handed to the simulation; longer stalls (debugger, window drag)
/// are clamped so animations do not jump.
const MAX_DELTA: Duration = Duration::from_millis(250);

/// Measures per-frame deltas and keeps a running average for reporting.
#[derive(Debug)]
pub struct FrameClock {
    start: Instant,
    last_tick: Instant,
    frames: u64,
    window_frames: u32,
    window_time: Duration,
    average: Duration,
}

impl FrameClock {
    /// Frames accumulated before the running average is refreshed.
    pub const AVERAGE_WINDOW: u32 = 60;

    /// Start a clock at the current instant.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            frames: 0,
            window_frames: 0,
            window_time: Duration::ZERO,
            average: Duration::ZERO,
        }
    }

    /// Advance one frame and return the clamped delta in seconds.
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        self.record(delta)
    }

    fn record(&mut self, delta: Duration) -> f32 {
        let delta = delta.min(MAX_DELTA);
        self.frames += 1;
        self.window_frames += 1;
        self.window_time += delta;
        if self.window_frames >= Self::AVERAGE_WINDOW {
            self.average = self.window_time / self.window_frames;
            self.window_frames = 0;
            self.window_time = Duration::ZERO;
        }
        delta.as_secs_f32()
    }

    /// Total frames ticked since creation.
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Seconds since the clock was created.
    pub fn elapsed_secs(&self) -> f32 {
        self.start.elapsed().as_secs_f32()
    }

    /// Average frame time over the last complete window, or zero before the
    /// first window fills.
    pub fn average_frame_time(&self) -> Duration {
        self.average
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_is_clamped() {
        let mut clock = FrameClock::new();
        let dt = clock.record(Duration::from_secs(3));
        assert!((dt - MAX_DELTA.as_secs_f32()).abs() < f32::EPSILON);
    }

    #[test]
    fn test_average_refreshes_after_window() {
        let mut clock = FrameClock::new();
        for _ in 0..FrameClock::AVERAGE_WINDOW - 1 {
            clock.record(Duration::from_millis(10));
        }
        assert_eq!(clock.average_frame_time(), Duration::ZERO);

        clock.record(Duration::from_millis(10));
        assert_eq!(clock.average_frame_time(), Duration::from_millis(10));
        assert_eq!(clock.frame_count(), u64::from(FrameClock::AVERAGE_WINDOW));
    }
}
