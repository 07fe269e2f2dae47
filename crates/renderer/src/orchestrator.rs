//! The per-frame state machine.
//!
//! ```text
//! Idle --begin_frame--> FrameStarted --begin_pass--> PassStarted
//!   ^                        |  ^                        |
//!   |                        |  +--------end_pass--------+
//!   +--------end_frame-------+
//! ```
//!
//! Auxiliary passes may only begin before the swapchain pass of the same
//! frame. Their colour targets are sampled by the swapchain pass, and the
//! render-pass dependencies only order them correctly in that direction.
//!
//! Calling an operation from the wrong state is a programming error and
//! panics. Out-of-date and suboptimal surfaces are not errors: the
//! orchestrator recreates the swapchain and the caller skips the frame.

use ash::vk;
use kiln_rhi::RhiResult;
use kiln_rhi::swapchain::SurfaceStatus;
use kiln_rhi::sync::next_slot;
use tracing::{debug, info};

use crate::frame::{FrameBackend, PassBegin};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FrameState {
    Idle,
    FrameStarted,
    PassStarted,
}

/// Handle for a frame between `begin_frame` and `end_frame`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameToken {
    pub frame_index: usize,
    pub image_index: u32,
    pub command_buffer: vk::CommandBuffer,
}

/// Drives acquire, record, submit and present over a [`FrameBackend`].
pub struct FrameOrchestrator<B: FrameBackend> {
    backend: B,
    state: FrameState,
    frame_index: usize,
    current: Option<FrameToken>,
    swapchain_pass_recorded: bool,
    swapchain_pass_open: bool,
    resized: bool,
    target_extent: vk::Extent2D,
    clear_color: [f32; 4],
    frames_submitted: u64,
}

impl<B: FrameBackend> FrameOrchestrator<B> {
    pub fn new(backend: B, clear_color: [f32; 4]) -> Self {
        let target_extent = backend.extent();
        Self {
            backend,
            state: FrameState::Idle,
            frame_index: 0,
            current: None,
            swapchain_pass_recorded: false,
            swapchain_pass_open: false,
            resized: false,
            target_extent,
            clear_color,
            frames_submitted: 0,
        }
    }

    /// Waits for the current slot, acquires an image and begins recording.
    ///
    /// Returns `None` when the surface was out of date. The swapchain has
    /// then been recreated and the caller must skip this tick.
    ///
    /// # Panics
    ///
    /// If a frame is already started.
    pub fn begin_frame(&mut self) -> RhiResult<Option<FrameToken>> {
        assert_eq!(
            self.state,
            FrameState::Idle,
            "begin_frame called while a frame is already in progress"
        );

        let slot = self.frame_index;
        self.backend.wait_for_slot(slot)?;

        let acquired = self.backend.acquire(slot)?;
        let image_index = match acquired.image_index {
            Some(index) if acquired.status != SurfaceStatus::OutOfDate => index,
            _ => {
                debug!("Surface out of date on acquire, skipping frame");
                self.recreate()?;
                return Ok(None);
            }
        };
        if acquired.status == SurfaceStatus::Suboptimal {
            // Still presentable; recreate once this frame is out.
            self.resized = true;
        }

        let command_buffer = self.backend.begin_commands(slot)?;
        let token = FrameToken {
            frame_index: slot,
            image_index,
            command_buffer,
        };
        self.current = Some(token);
        self.swapchain_pass_recorded = false;
        self.state = FrameState::FrameStarted;
        Ok(Some(token))
    }

    /// Begins an auxiliary pass.
    ///
    /// # Panics
    ///
    /// Outside a started frame, inside another pass, or after the swapchain
    /// pass of this frame.
    pub fn begin_pass(&mut self, pass: &PassBegin<'_>) {
        let token = self.expect_frame_started("begin_pass");
        assert!(
            !self.swapchain_pass_recorded,
            "auxiliary pass '{}' begun after the swapchain pass",
            pass.name
        );
        self.backend.begin_pass(token.command_buffer, pass);
        self.swapchain_pass_open = false;
        self.state = FrameState::PassStarted;
    }

    /// Begins the swapchain pass on the acquired image.
    ///
    /// # Panics
    ///
    /// Outside a started frame, inside another pass, or if the swapchain pass
    /// was already recorded this frame.
    pub fn begin_swapchain_pass(&mut self) {
        let token = self.expect_frame_started("begin_swapchain_pass");
        assert!(
            !self.swapchain_pass_recorded,
            "swapchain pass begun twice in one frame"
        );
        self.backend
            .begin_swapchain_pass(token.command_buffer, token.image_index, self.clear_color);
        self.swapchain_pass_recorded = true;
        self.swapchain_pass_open = true;
        self.state = FrameState::PassStarted;
    }

    /// # Panics
    ///
    /// If no pass is open.
    pub fn end_pass(&mut self) {
        assert_eq!(
            self.state,
            FrameState::PassStarted,
            "end_pass called without an open pass"
        );
        if let Some(token) = self.current {
            self.backend.end_pass(token.command_buffer);
        }
        self.swapchain_pass_open = false;
        self.state = FrameState::FrameStarted;
    }

    /// Finishes recording, submits and presents, then advances the slot.
    ///
    /// The swapchain is recreated afterwards if presentation reported an
    /// out-of-date or suboptimal surface, or if the window was resized.
    ///
    /// # Panics
    ///
    /// If no frame is started, a pass is still open, or the swapchain pass
    /// was never recorded.
    pub fn end_frame(&mut self) -> RhiResult<()> {
        let token = self.expect_frame_started("end_frame");
        assert!(
            self.swapchain_pass_recorded,
            "end_frame called before the swapchain pass was recorded"
        );

        self.state = FrameState::Idle;
        self.current = None;
        let slot = token.frame_index;
        self.frame_index = next_slot(slot);

        self.backend.end_commands(slot)?;
        let status = self.backend.submit(slot, token.image_index)?;
        self.frames_submitted += 1;

        let resized = std::mem::take(&mut self.resized);
        if status != SurfaceStatus::Ready || resized {
            debug!("Recreating after present (status {:?}, resized {})", status, resized);
            self.recreate()?;
        }
        Ok(())
    }

    /// Schedules a swapchain rebuild to `extent` after the next present.
    pub fn notify_resized(&mut self, extent: vk::Extent2D) {
        self.target_extent = extent;
        self.resized = true;
    }

    fn recreate(&mut self) -> RhiResult<()> {
        self.backend.recreate(self.target_extent)?;
        self.resized = false;
        info!(
            "Swapchain recreated at {}x{}",
            self.target_extent.width, self.target_extent.height
        );
        Ok(())
    }

    fn expect_frame_started(&self, operation: &str) -> FrameToken {
        assert_eq!(
            self.state,
            FrameState::FrameStarted,
            "{} requires a started frame with no open pass",
            operation
        );
        self.current
            .unwrap_or_else(|| panic!("{} called without a frame token", operation))
    }

    // ===== Accessors =====

    #[inline]
    pub fn is_frame_started(&self) -> bool {
        self.state != FrameState::Idle
    }

    /// True while the swapchain pass is open, which is where overlays record.
    #[inline]
    pub fn in_swapchain_pass(&self) -> bool {
        self.swapchain_pass_open
    }

    #[inline]
    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.backend.extent()
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Event, RecordingBackend};
    use kiln_rhi::swapchain::Acquired;
    use kiln_rhi::sync::MAX_FRAMES_IN_FLIGHT;

    fn aux(name: &str) -> PassBegin<'_> {
        PassBegin {
            name,
            render_pass: vk::RenderPass::null(),
            framebuffer: vk::Framebuffer::null(),
            extent: vk::Extent2D {
                width: 64,
                height: 64,
            },
            clear_values: &[],
        }
    }

    fn run_frame(orchestrator: &mut FrameOrchestrator<RecordingBackend>) -> bool {
        match orchestrator.begin_frame().unwrap() {
            Some(_) => {
                orchestrator.begin_swapchain_pass();
                orchestrator.end_pass();
                orchestrator.end_frame().unwrap();
                true
            }
            None => false,
        }
    }

    #[test]
    fn test_slots_are_waited_before_reuse() {
        let mut orchestrator = FrameOrchestrator::new(RecordingBackend::new(3), [0.0; 4]);
        for _ in 0..7 {
            assert!(run_frame(&mut orchestrator));
        }

        // Every BeginCommands(slot) is preceded by a Wait(slot) issued after
        // that slot's previous Submit.
        let events = &orchestrator.backend().events;
        for (i, event) in events.iter().enumerate() {
            if let Event::BeginCommands(slot) = *event {
                let last_submit = events[..i]
                    .iter()
                    .rposition(|e| matches!(e, Event::Submit(s, _) if *s == slot));
                let last_wait = events[..i]
                    .iter()
                    .rposition(|e| *e == Event::Wait(slot))
                    .expect("slot recorded without a wait");
                if let Some(submit) = last_submit {
                    assert!(last_wait > submit, "slot {} reused before its fence", slot);
                }
            }
        }
    }

    #[test]
    fn test_slots_cycle_round_robin() {
        let mut orchestrator = FrameOrchestrator::new(RecordingBackend::new(3), [0.0; 4]);
        let mut slots = Vec::new();
        for _ in 0..4 {
            let token = orchestrator.begin_frame().unwrap().unwrap();
            slots.push(token.frame_index);
            orchestrator.begin_swapchain_pass();
            orchestrator.end_pass();
            orchestrator.end_frame().unwrap();
        }
        let expected: Vec<usize> = (0..4).map(|i| i % MAX_FRAMES_IN_FLIGHT).collect();
        assert_eq!(slots, expected);
        assert_eq!(orchestrator.frames_submitted(), 4);
    }

    #[test]
    fn test_out_of_date_acquire_skips_frame() {
        let mut backend = RecordingBackend::new(3);
        backend.acquire_results.push_back(Acquired {
            status: SurfaceStatus::OutOfDate,
            image_index: None,
        });
        let mut orchestrator = FrameOrchestrator::new(backend, [0.0; 4]);

        assert!(orchestrator.begin_frame().unwrap().is_none());
        assert!(!orchestrator.is_frame_started());

        let events = &orchestrator.backend().events;
        assert!(events.contains(&Event::Recreate));
        assert!(!events.iter().any(|e| matches!(e, Event::BeginCommands(_))));

        // The next tick renders normally on the same slot.
        let token = orchestrator.begin_frame().unwrap().unwrap();
        assert_eq!(token.frame_index, 0);
    }

    #[test]
    fn test_suboptimal_present_recreates() {
        let mut backend = RecordingBackend::new(3);
        backend.submit_results.push_back(SurfaceStatus::Suboptimal);
        let mut orchestrator = FrameOrchestrator::new(backend, [0.0; 4]);
        assert!(run_frame(&mut orchestrator));
        assert_eq!(orchestrator.backend().events.last(), Some(&Event::Recreate));
    }

    #[test]
    fn test_resize_recreates_after_present() {
        let mut orchestrator = FrameOrchestrator::new(RecordingBackend::new(3), [0.0; 4]);
        let extent = vk::Extent2D {
            width: 300,
            height: 200,
        };
        orchestrator.notify_resized(extent);
        assert!(run_frame(&mut orchestrator));

        let backend = orchestrator.backend();
        assert_eq!(backend.events.last(), Some(&Event::Recreate));
        assert_eq!(backend.extent, extent);

        // Resize flag is consumed.
        assert!(run_frame(&mut orchestrator));
        assert_ne!(orchestrator.backend().events.last(), Some(&Event::Recreate));
    }

    #[test]
    fn test_auxiliary_passes_precede_swapchain_pass() {
        let mut orchestrator = FrameOrchestrator::new(RecordingBackend::new(3), [0.0; 4]);
        orchestrator.begin_frame().unwrap().unwrap();
        for name in ["a", "b", "c"] {
            orchestrator.begin_pass(&aux(name));
            orchestrator.end_pass();
        }
        orchestrator.begin_swapchain_pass();
        assert!(orchestrator.in_swapchain_pass());
        orchestrator.end_pass();
        orchestrator.end_frame().unwrap();

        assert_eq!(
            orchestrator.backend().events,
            vec![
                Event::Wait(0),
                Event::Acquire(0),
                Event::BeginCommands(0),
                Event::BeginPass("a".into()),
                Event::EndPass,
                Event::BeginPass("b".into()),
                Event::EndPass,
                Event::BeginPass("c".into()),
                Event::EndPass,
                Event::BeginSwapchainPass(0),
                Event::EndPass,
                Event::EndCommands(0),
                Event::Submit(0, 0),
            ]
        );
    }

    #[test]
    #[should_panic(expected = "already in progress")]
    fn test_begin_frame_twice_panics() {
        let mut orchestrator = FrameOrchestrator::new(RecordingBackend::new(3), [0.0; 4]);
        orchestrator.begin_frame().unwrap();
        let _ = orchestrator.begin_frame();
    }

    #[test]
    #[should_panic(expected = "requires a started frame")]
    fn test_end_frame_when_idle_panics() {
        let mut orchestrator = FrameOrchestrator::new(RecordingBackend::new(3), [0.0; 4]);
        let _ = orchestrator.end_frame();
    }

    #[test]
    #[should_panic(expected = "after the swapchain pass")]
    fn test_auxiliary_pass_after_swapchain_pass_panics() {
        let mut orchestrator = FrameOrchestrator::new(RecordingBackend::new(3), [0.0; 4]);
        orchestrator.begin_frame().unwrap();
        orchestrator.begin_swapchain_pass();
        orchestrator.end_pass();
        orchestrator.begin_pass(&aux("late"));
    }

    #[test]
    #[should_panic(expected = "requires a started frame")]
    fn test_nested_pass_panics() {
        let mut orchestrator = FrameOrchestrator::new(RecordingBackend::new(3), [0.0; 4]);
        orchestrator.begin_frame().unwrap();
        orchestrator.begin_pass(&aux("outer"));
        orchestrator.begin_pass(&aux("inner"));
    }
}
