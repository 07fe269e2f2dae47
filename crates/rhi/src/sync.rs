//! Semaphores, fences and per-frame slots.
//!
//! A [`FrameSlot`] bundles everything one in-flight frame records and
//! signals: its primary command buffer, the image-available and
//! render-finished semaphores, and the fence the CPU waits on before
//! touching the slot again.
//!
//! ```text
//! wait(in_flight_fence) -> acquire (signals image_available)
//!   -> record command_buffer -> reset(in_flight_fence)
//!   -> submit (waits image_available, signals render_finished + fence)
//!   -> present (waits render_finished)
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Number of frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Vulkan semaphore wrapper.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        // SAFETY: plain creation on a live device.
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };
        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        // SAFETY: the owner waits for the device before dropping slots.
        unsafe { self.device.handle().destroy_semaphore(self.semaphore, None) };
    }
}

/// Vulkan fence wrapper.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a fence, optionally already signaled so the first wait on it
    /// returns immediately.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);
        // SAFETY: plain creation on a live device.
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };
        Ok(Self { device, fence })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until signaled or `timeout` nanoseconds elapse.
    pub fn wait(&self, timeout: u64) -> RhiResult<()> {
        // SAFETY: fence belongs to this device.
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&[self.fence], true, timeout)?
        };
        Ok(())
    }

    /// Returns the fence to the unsignaled state. It must not be pending.
    pub fn reset(&self) -> RhiResult<()> {
        // SAFETY: callers reset only after a completed wait.
        unsafe { self.device.handle().reset_fences(&[self.fence])? };
        Ok(())
    }

    pub fn is_signaled(&self) -> bool {
        // SAFETY: status query on a live fence.
        matches!(
            unsafe { self.device.handle().get_fence_status(self.fence) },
            Ok(true)
        )
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        // SAFETY: see Semaphore::drop.
        unsafe { self.device.handle().destroy_fence(self.fence, None) };
    }
}

/// One concurrently recordable frame context.
pub struct FrameSlot {
    command_buffer: vk::CommandBuffer,
    image_available: Semaphore,
    render_finished: Semaphore,
    in_flight: Fence,
}

impl FrameSlot {
    /// Creates the slot's sync objects around an already allocated command
    /// buffer. The fence starts signaled.
    pub fn new(device: Arc<Device>, command_buffer: vk::CommandBuffer) -> RhiResult<Self> {
        let slot = Self {
            command_buffer,
            image_available: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
            in_flight: Fence::new(device, true)?,
        };
        debug!("Created frame slot");
        Ok(slot)
    }

    #[inline]
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    #[inline]
    pub fn image_available(&self) -> vk::Semaphore {
        self.image_available.handle()
    }

    #[inline]
    pub fn render_finished(&self) -> vk::Semaphore {
        self.render_finished.handle()
    }

    #[inline]
    pub fn in_flight_fence(&self) -> &Fence {
        &self.in_flight
    }
}

/// Slot used by the frame after `current`.
#[inline]
pub fn next_slot(current: usize) -> usize {
    (current + 1) % MAX_FRAMES_IN_FLIGHT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_frames_in_flight_constant() {
        assert!((1..=3).contains(&MAX_FRAMES_IN_FLIGHT));
    }

    #[test]
    fn test_slots_cycle_round_robin() {
        let mut slot = 0;
        let mut visited = Vec::new();
        for _ in 0..MAX_FRAMES_IN_FLIGHT * 2 {
            visited.push(slot);
            slot = next_slot(slot);
        }
        assert_eq!(&visited[..MAX_FRAMES_IN_FLIGHT], &visited[MAX_FRAMES_IN_FLIGHT..]);
        assert_eq!(slot, 0);
    }

    #[test]
    fn test_sync_types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
        assert_send_sync::<Fence>();
        assert_send_sync::<FrameSlot>();
    }
}
