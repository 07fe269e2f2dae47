//! Per-frame context handed to render systems, and the presentation
//! backend the orchestrator drives.

use std::fmt;

use ash::vk;
use kiln_rhi::RhiResult;
use kiln_rhi::command::CommandBuffer;
use kiln_rhi::swapchain::{Acquired, PresentationSurface, SurfaceStatus};
use kiln_scene::ObjectSet;

use crate::mesh::MeshArena;

/// Everything a render system needs to record its draws for one pass.
pub struct FrameContext<'a> {
    /// Frame slot index, `0..MAX_FRAMES_IN_FLIGHT`.
    pub frame_index: usize,
    /// Seconds since the previous frame.
    pub frame_time: f32,
    pub command_buffer: vk::CommandBuffer,
    /// Extent of the pass being recorded.
    pub extent: vk::Extent2D,
    /// Set 0 for this pass and frame slot.
    pub descriptor_set: vk::DescriptorSet,
    /// Byte offset into the dynamic uniform bound at set 0, if any.
    pub dynamic_offset: Option<u32>,
    pub objects: &'a ObjectSet,
    pub meshes: &'a MeshArena,
}

impl FrameContext<'_> {
    /// Dynamic offsets to pass along with set 0.
    pub fn dynamic_offsets(&self) -> &[u32] {
        self.dynamic_offset.as_slice()
    }
}

/// Begin parameters of an auxiliary render pass.
#[derive(Clone, Copy)]
pub struct PassBegin<'a> {
    pub name: &'a str,
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub clear_values: &'a [vk::ClearValue],
}

// `vk::ClearValue` is a union; only the count is printed.
impl fmt::Debug for PassBegin<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassBegin")
            .field("name", &self.name)
            .field("render_pass", &self.render_pass)
            .field("framebuffer", &self.framebuffer)
            .field("extent", &self.extent)
            .field("clear_values", &self.clear_values.len())
            .finish()
    }
}

/// The presentation and recording operations the frame orchestrator needs.
///
/// [`PresentationSurface`] is the real implementation; tests substitute a
/// recorder.
pub trait FrameBackend {
    /// Blocks until `slot`'s previous submission has completed.
    fn wait_for_slot(&mut self, slot: usize) -> RhiResult<()>;

    fn acquire(&mut self, slot: usize) -> RhiResult<Acquired>;

    /// Resets and begins `slot`'s command buffer.
    fn begin_commands(&mut self, slot: usize) -> RhiResult<vk::CommandBuffer>;

    fn end_commands(&mut self, slot: usize) -> RhiResult<()>;

    /// Submits `slot`'s commands and presents `image_index`.
    fn submit(&mut self, slot: usize, image_index: u32) -> RhiResult<SurfaceStatus>;

    fn recreate(&mut self, extent: vk::Extent2D) -> RhiResult<()>;

    fn begin_pass(&mut self, cmd: vk::CommandBuffer, pass: &PassBegin<'_>);

    fn begin_swapchain_pass(&mut self, cmd: vk::CommandBuffer, image_index: u32, clear_color: [f32; 4]);

    fn end_pass(&mut self, cmd: vk::CommandBuffer);

    /// Extent of the presentable images.
    fn extent(&self) -> vk::Extent2D;
}

impl FrameBackend for PresentationSurface {
    fn wait_for_slot(&mut self, slot: usize) -> RhiResult<()> {
        PresentationSurface::wait_for_slot(self, slot)
    }

    fn acquire(&mut self, slot: usize) -> RhiResult<Acquired> {
        self.acquire_next_image(slot)
    }

    fn begin_commands(&mut self, slot: usize) -> RhiResult<vk::CommandBuffer> {
        PresentationSurface::begin_commands(self, slot)
    }

    fn end_commands(&mut self, slot: usize) -> RhiResult<()> {
        PresentationSurface::end_commands(self, slot)
    }

    fn submit(&mut self, slot: usize, image_index: u32) -> RhiResult<SurfaceStatus> {
        self.submit_command_buffers(slot, image_index)
    }

    fn recreate(&mut self, extent: vk::Extent2D) -> RhiResult<()> {
        PresentationSurface::recreate(self, extent)
    }

    fn begin_pass(&mut self, cmd: vk::CommandBuffer, pass: &PassBegin<'_>) {
        CommandBuffer::from_handle(self.device().clone(), cmd).begin_render_pass(
            pass.render_pass,
            pass.framebuffer,
            pass.extent,
            pass.clear_values,
        );
    }

    fn begin_swapchain_pass(&mut self, cmd: vk::CommandBuffer, image_index: u32, clear_color: [f32; 4]) {
        PresentationSurface::begin_swapchain_pass(self, cmd, image_index, clear_color);
    }

    fn end_pass(&mut self, cmd: vk::CommandBuffer) {
        CommandBuffer::from_handle(self.device().clone(), cmd).end_render_pass();
    }

    fn extent(&self) -> vk::Extent2D {
        PresentationSurface::extent(self)
    }
}
