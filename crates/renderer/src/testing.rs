//! Device-free [`FrameBackend`] that records what the orchestrator asked
//! for.

use std::collections::VecDeque;

use ash::vk;
use kiln_rhi::RhiResult;
use kiln_rhi::swapchain::{Acquired, SurfaceStatus};
use kiln_rhi::sync::MAX_FRAMES_IN_FLIGHT;

use crate::frame::{FrameBackend, PassBegin};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Wait(usize),
    Acquire(usize),
    BeginCommands(usize),
    EndCommands(usize),
    Submit(usize, u32),
    Recreate,
    BeginPass(String),
    BeginSwapchainPass(u32),
    EndPass,
}

pub struct RecordingBackend {
    pub events: Vec<Event>,
    /// Scripted acquire results; `Ready` on the next image once empty.
    pub acquire_results: VecDeque<Acquired>,
    /// Scripted present results; `Ready` once empty.
    pub submit_results: VecDeque<SurfaceStatus>,
    pub extent: vk::Extent2D,
    image_count: u32,
    next_image: u32,
    in_flight: [bool; MAX_FRAMES_IN_FLIGHT],
}

impl RecordingBackend {
    pub fn new(image_count: u32) -> Self {
        Self {
            events: Vec::new(),
            acquire_results: VecDeque::new(),
            submit_results: VecDeque::new(),
            extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            image_count,
            next_image: 0,
            in_flight: [false; MAX_FRAMES_IN_FLIGHT],
        }
    }
}

impl FrameBackend for RecordingBackend {
    fn wait_for_slot(&mut self, slot: usize) -> RhiResult<()> {
        self.events.push(Event::Wait(slot));
        self.in_flight[slot] = false;
        Ok(())
    }

    fn acquire(&mut self, slot: usize) -> RhiResult<Acquired> {
        self.events.push(Event::Acquire(slot));
        Ok(self.acquire_results.pop_front().unwrap_or_else(|| {
            let image_index = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count;
            Acquired {
                status: SurfaceStatus::Ready,
                image_index: Some(image_index),
            }
        }))
    }

    fn begin_commands(&mut self, slot: usize) -> RhiResult<vk::CommandBuffer> {
        assert!(!self.in_flight[slot], "slot {} recorded while in flight", slot);
        self.events.push(Event::BeginCommands(slot));
        Ok(vk::CommandBuffer::null())
    }

    fn end_commands(&mut self, slot: usize) -> RhiResult<()> {
        self.events.push(Event::EndCommands(slot));
        Ok(())
    }

    fn submit(&mut self, slot: usize, image_index: u32) -> RhiResult<SurfaceStatus> {
        self.events.push(Event::Submit(slot, image_index));
        self.in_flight[slot] = true;
        Ok(self.submit_results.pop_front().unwrap_or(SurfaceStatus::Ready))
    }

    fn recreate(&mut self, extent: vk::Extent2D) -> RhiResult<()> {
        self.events.push(Event::Recreate);
        self.extent = extent;
        Ok(())
    }

    fn begin_pass(&mut self, _cmd: vk::CommandBuffer, pass: &PassBegin<'_>) {
        self.events.push(Event::BeginPass(pass.name.to_string()));
    }

    fn begin_swapchain_pass(&mut self, _cmd: vk::CommandBuffer, image_index: u32, _clear: [f32; 4]) {
        self.events.push(Event::BeginSwapchainPass(image_index));
    }

    fn end_pass(&mut self, _cmd: vk::CommandBuffer) {
        self.events.push(Event::EndPass);
    }

    fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}
