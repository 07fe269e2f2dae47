//! Hook for content recorded on top of the final image.

use ash::vk;
use tracing::{info, trace};

/// Recorded last inside the swapchain pass, after every render system.
pub trait Overlay {
    /// Called once per frame before recording starts.
    fn new_frame(&mut self, frame_time: f32);

    fn record(&mut self, cmd: vk::CommandBuffer, extent: vk::Extent2D);
}

/// Draws nothing.
#[derive(Debug, Default)]
pub struct NoOverlay;

impl Overlay for NoOverlay {
    fn new_frame(&mut self, _frame_time: f32) {}

    fn record(&mut self, _cmd: vk::CommandBuffer, _extent: vk::Extent2D) {}
}

/// Frame-time statistics over one reporting window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameStats {
    pub frames: u32,
    pub total: f32,
    pub min: f32,
    pub max: f32,
}

impl Default for FrameStats {
    fn default() -> Self {
        Self {
            frames: 0,
            total: 0.0,
            min: f32::MAX,
            max: 0.0,
        }
    }
}

impl FrameStats {
    pub fn push(&mut self, frame_time: f32) {
        self.frames += 1;
        self.total += frame_time;
        self.min = self.min.min(frame_time);
        self.max = self.max.max(frame_time);
    }

    pub fn average(&self) -> Option<f32> {
        (self.frames > 0).then(|| self.total / self.frames as f32)
    }

    pub fn fps(&self) -> Option<f32> {
        self.average().filter(|avg| *avg > 0.0).map(|avg| 1.0 / avg)
    }
}

/// Reports frame statistics through `tracing` once per interval.
#[derive(Debug)]
pub struct FrameStatsOverlay {
    interval: f32,
    stats: FrameStats,
    last_report: Option<FrameStats>,
}

impl FrameStatsOverlay {
    pub const DEFAULT_INTERVAL: f32 = 2.0;

    pub fn new(interval: f32) -> Self {
        Self {
            interval,
            stats: FrameStats::default(),
            last_report: None,
        }
    }

    /// Statistics of the last completed window.
    pub fn last_report(&self) -> Option<FrameStats> {
        self.last_report
    }
}

impl Default for FrameStatsOverlay {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INTERVAL)
    }
}

impl Overlay for FrameStatsOverlay {
    fn new_frame(&mut self, frame_time: f32) {
        self.stats.push(frame_time);
        if self.stats.total < self.interval {
            return;
        }
        if let (Some(avg), Some(fps)) = (self.stats.average(), self.stats.fps()) {
            info!(
                "{:.1} fps, {:.2} ms avg ({:.2}..{:.2} ms)",
                fps,
                avg * 1000.0,
                self.stats.min * 1000.0,
                self.stats.max * 1000.0
            );
        }
        self.last_report = Some(std::mem::take(&mut self.stats));
    }

    fn record(&mut self, _cmd: vk::CommandBuffer, extent: vk::Extent2D) {
        trace!("Overlay pass at {}x{}", extent.width, extent.height);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_average_and_bounds() {
        let mut stats = FrameStats::default();
        assert_eq!(stats.average(), None);
        for dt in [0.010, 0.020, 0.030] {
            stats.push(dt);
        }
        assert!((stats.average().unwrap() - 0.020).abs() < 1e-6);
        assert_eq!(stats.min, 0.010);
        assert_eq!(stats.max, 0.030);
    }

    #[test]
    fn test_overlay_reports_once_per_interval() {
        let mut overlay = FrameStatsOverlay::new(0.05);
        for _ in 0..4 {
            overlay.new_frame(0.01);
        }
        assert!(overlay.last_report().is_none());

        overlay.new_frame(0.02);
        let report = overlay.last_report().unwrap();
        assert_eq!(report.frames, 5);
        assert!((report.fps().unwrap() - 1.0 / 0.012).abs() < 0.1);
    }
}
