//! Presentation surface: swapchain, default render pass and frame slots.
//!
//! [`PresentationSurface`] owns every object whose lifetime follows the
//! swapchain:
//!
//! - the presentable images with their views, depth images and framebuffers
//! - the swapchain render pass (colour ends in `PRESENT_SRC_KHR`)
//! - the [`FrameSlot`]s and the command pool their buffers come from
//!
//! Acquire and present results are classified into [`SurfaceStatus`] values.
//! `OUT_OF_DATE` and suboptimal results are recoverable and reported as
//! statuses; every other failure is returned as an error.
//!
//! # Example
//!
//! ```no_run
//! use kiln_rhi::swapchain::{PresentationSurface, SurfaceStatus};
//! # fn example(surface: &mut PresentationSurface) -> kiln_rhi::RhiResult<()> {
//! let slot = 0;
//! surface.wait_for_slot(slot)?;
//! let acquired = surface.acquire_next_image(slot)?;
//! if let Some(image_index) = acquired.image_index {
//!     // ... record surface.frame_slot(slot).command_buffer() ...
//!     if surface.submit_command_buffers(slot, image_index)? != SurfaceStatus::Ready {
//!         surface.recreate(surface.extent())?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::command::CommandPool;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{Image, ImageDesc};
use crate::instance::Instance;
use crate::render_pass::{Framebuffer, RenderPass, RenderPassDesc};
use crate::sync::{FrameSlot, MAX_FRAMES_IN_FLIGHT};

/// Outcome of an acquire or present call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceStatus {
    Ready,
    /// Usable this frame, but the swapchain should be recreated.
    Suboptimal,
    /// Unusable; the swapchain must be recreated before rendering.
    OutOfDate,
}

/// Result of [`PresentationSurface::acquire_next_image`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Acquired {
    pub status: SurfaceStatus,
    /// `None` exactly when `status` is [`SurfaceStatus::OutOfDate`].
    pub image_index: Option<u32>,
}

/// Maps the raw result of `vkAcquireNextImageKHR`.
pub fn classify_acquire(result: Result<(u32, bool), vk::Result>) -> RhiResult<Acquired> {
    match result {
        Ok((index, false)) => Ok(Acquired {
            status: SurfaceStatus::Ready,
            image_index: Some(index),
        }),
        Ok((index, true)) => Ok(Acquired {
            status: SurfaceStatus::Suboptimal,
            image_index: Some(index),
        }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquired {
            status: SurfaceStatus::OutOfDate,
            image_index: None,
        }),
        Err(e) => Err(RhiError::SwapchainError(format!(
            "failed to acquire swapchain image: {:?}",
            e
        ))),
    }
}

/// Maps the raw result of `vkQueuePresentKHR`.
pub fn classify_present(result: Result<bool, vk::Result>) -> RhiResult<SurfaceStatus> {
    match result {
        Ok(false) => Ok(SurfaceStatus::Ready),
        Ok(true) | Err(vk::Result::SUBOPTIMAL_KHR) => Ok(SurfaceStatus::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SurfaceStatus::OutOfDate),
        Err(e) => Err(RhiError::SwapchainError(format!(
            "failed to present swapchain image: {:?}",
            e
        ))),
    }
}

/// Surface capabilities, formats and present modes for one physical device.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        // SAFETY: both handles are live for the duration of the queries.
        let (capabilities, formats, present_modes) = unsafe {
            (
                surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?,
                surface_loader.get_physical_device_surface_formats(physical_device, surface)?,
                surface_loader
                    .get_physical_device_surface_present_modes(physical_device, surface)?,
            )
        };

        debug!(
            "Surface support: {} formats, {} present modes, images {}..{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            capabilities.max_image_count
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Swapchain handle plus the images it hands out.
struct Chain {
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    format: vk::Format,
    extent: vk::Extent2D,
}

/// The chain of presentable images and everything sized to it.
pub struct PresentationSurface {
    device: Arc<Device>,
    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
    preferred_present_mode: vk::PresentModeKHR,

    chain: Chain,
    depth_format: vk::Format,
    depth_images: Vec<Image>,
    render_pass: RenderPass,
    framebuffers: Vec<Framebuffer>,

    frame_slots: Vec<FrameSlot>,
    /// Fence of the slot that last rendered to each image, or null.
    images_in_flight: Vec<vk::Fence>,
    // Dropped after the slots; destroying the pool frees their buffers.
    command_pool: CommandPool,
}

impl PresentationSurface {
    /// Builds the swapchain and everything sized to it.
    ///
    /// `preferred_present_mode` is used when the surface supports it;
    /// otherwise FIFO, which every surface supports.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        extent: vk::Extent2D,
        preferred_present_mode: vk::PresentModeKHR,
    ) -> RhiResult<Self> {
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
        let swapchain_loader =
            ash::khr::swapchain::Device::new(instance.handle(), device.handle());

        let chain = create_chain(
            &device,
            &surface_loader,
            &swapchain_loader,
            surface,
            extent,
            preferred_present_mode,
            vk::SwapchainKHR::null(),
        )?;

        let depth_format = device.find_depth_format()?;
        let render_pass = RenderPass::new(
            device.clone(),
            RenderPassDesc::presentable(chain.format, depth_format),
        )?;
        let (depth_images, framebuffers) =
            create_framebuffers(&device, &render_pass, &chain, depth_format)?;

        let graphics_family = device.queue_families().graphics_family.ok_or_else(|| {
            RhiError::SwapchainError("device has no graphics queue family".to_string())
        })?;
        let command_pool = CommandPool::new(device.clone(), graphics_family)?;
        let frame_slots = command_pool
            .allocate_command_buffers(MAX_FRAMES_IN_FLIGHT as u32)?
            .into_iter()
            .map(|cmd| FrameSlot::new(device.clone(), cmd))
            .collect::<RhiResult<Vec<_>>>()?;

        let images_in_flight = vec![vk::Fence::null(); chain.images.len()];

        info!(
            "Presentation surface ready: {}x{}, {} images, {} frame slots",
            chain.extent.width,
            chain.extent.height,
            chain.images.len(),
            frame_slots.len()
        );

        Ok(Self {
            device,
            surface,
            surface_loader,
            swapchain_loader,
            preferred_present_mode,
            chain,
            depth_format,
            depth_images,
            render_pass,
            framebuffers,
            frame_slots,
            images_in_flight,
            command_pool,
        })
    }

    // ===== Frame protocol =====

    /// Blocks until the GPU has finished the last submission from `slot`.
    pub fn wait_for_slot(&self, slot: usize) -> RhiResult<()> {
        self.frame_slots[slot].in_flight_fence().wait(u64::MAX)
    }

    /// Acquires the next image, signalling `slot`'s image-available
    /// semaphore.
    pub fn acquire_next_image(&self, slot: usize) -> RhiResult<Acquired> {
        // SAFETY: the semaphore is unsignaled: its previous signal was
        // consumed by the submission guarded by the slot fence.
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.chain.swapchain,
                u64::MAX,
                self.frame_slots[slot].image_available(),
                vk::Fence::null(),
            )
        };
        let acquired = classify_acquire(result)?;
        if acquired.status != SurfaceStatus::Ready {
            warn!("Acquire reported {:?}", acquired.status);
        }
        Ok(acquired)
    }

    /// Submits `slot`'s command buffer and presents `image_index`.
    ///
    /// Waits first for any earlier frame still rendering to the same image,
    /// since the swapchain may hand out images out of order.
    pub fn submit_command_buffers(&mut self, slot: usize, image_index: u32) -> RhiResult<SurfaceStatus> {
        let device = self.device.handle();
        let frame = &self.frame_slots[slot];
        let image = image_index as usize;

        let previous = self.images_in_flight[image];
        if previous != vk::Fence::null() {
            // SAFETY: the fence belongs to one of our slots.
            unsafe { device.wait_for_fences(&[previous], true, u64::MAX)? };
        }
        self.images_in_flight[image] = frame.in_flight_fence().handle();

        let wait_semaphores = [frame.image_available()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [frame.command_buffer()];
        let signal_semaphores = [frame.render_finished()];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        frame.in_flight_fence().reset()?;
        // SAFETY: the command buffer has finished recording and the slot fence
        // was just reset.
        unsafe {
            device.queue_submit(
                self.device.graphics_queue(),
                &[submit_info],
                frame.in_flight_fence().handle(),
            )?
        };

        let swapchains = [self.chain.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        // SAFETY: the image was acquired this frame and is released here.
        let result = unsafe {
            self.swapchain_loader
                .queue_present(self.device.present_queue(), &present_info)
        };
        classify_present(result)
    }

    /// Rebuilds the swapchain and everything sized to it.
    ///
    /// # Errors
    ///
    /// [`RhiError::FormatMismatch`] when the colour or depth format changes,
    /// since pipelines built against the old formats would be invalid.
    pub fn recreate(&mut self, extent: vk::Extent2D) -> RhiResult<()> {
        self.device.wait_idle()?;
        info!(
            "Recreating presentation surface for {}x{}",
            extent.width, extent.height
        );

        let chain = create_chain(
            &self.device,
            &self.surface_loader,
            &self.swapchain_loader,
            self.surface,
            extent,
            self.preferred_present_mode,
            self.chain.swapchain,
        )?;
        let old = std::mem::replace(&mut self.chain, chain);
        self.framebuffers.clear();
        self.depth_images.clear();
        destroy_chain(&self.device, &self.swapchain_loader, old);

        let depth_format = self.device.find_depth_format()?;
        check_format("colour", self.render_pass.desc().color_formats()[0], self.chain.format)?;
        check_format("depth", self.depth_format, depth_format)?;

        let (depth_images, framebuffers) =
            create_framebuffers(&self.device, &self.render_pass, &self.chain, depth_format)?;
        self.depth_images = depth_images;
        self.framebuffers = framebuffers;
        self.images_in_flight = vec![vk::Fence::null(); self.chain.images.len()];
        Ok(())
    }

    // ===== Recording helpers =====

    /// Resets and begins `slot`'s command buffer.
    pub fn begin_commands(&self, slot: usize) -> RhiResult<vk::CommandBuffer> {
        let cmd = self.frame_slots[slot].command_buffer();
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        // SAFETY: the slot fence has been waited on, so the buffer is idle.
        unsafe {
            self.device
                .handle()
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
            self.device.handle().begin_command_buffer(cmd, &begin_info)?;
        }
        Ok(cmd)
    }

    pub fn end_commands(&self, slot: usize) -> RhiResult<()> {
        // SAFETY: the buffer is recording.
        unsafe {
            self.device
                .handle()
                .end_command_buffer(self.frame_slots[slot].command_buffer())?
        };
        Ok(())
    }

    /// Begins the swapchain render pass on `image_index`'s framebuffer.
    pub fn begin_swapchain_pass(
        &self,
        cmd: vk::CommandBuffer,
        image_index: u32,
        clear_color: [f32; 4],
    ) {
        let clear_values = self.render_pass.desc().clear_values(clear_color);
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass.handle())
            .framebuffer(self.framebuffers[image_index as usize].handle())
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: self.chain.extent,
            })
            .clear_values(&clear_values);
        // SAFETY: `cmd` is recording outside any render pass.
        unsafe {
            self.device.handle().cmd_begin_render_pass(
                cmd,
                &begin_info,
                vk::SubpassContents::INLINE,
            )
        };
    }

    // ===== Accessors =====

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    #[inline]
    pub fn frame_slot(&self, slot: usize) -> &FrameSlot {
        &self.frame_slots[slot]
    }

    #[inline]
    pub fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    #[inline]
    pub fn image_format(&self) -> vk::Format {
        self.chain.format
    }

    #[inline]
    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.chain.extent
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.chain.images.len()
    }

    #[inline]
    pub fn aspect_ratio(&self) -> f32 {
        self.chain.extent.width as f32 / self.chain.extent.height.max(1) as f32
    }
}

impl Drop for PresentationSurface {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            warn!("wait_idle failed during surface teardown: {}", e);
        }
        self.framebuffers.clear();
        self.depth_images.clear();
        let chain = std::mem::replace(
            &mut self.chain,
            Chain {
                swapchain: vk::SwapchainKHR::null(),
                images: Vec::new(),
                views: Vec::new(),
                format: vk::Format::UNDEFINED,
                extent: vk::Extent2D::default(),
            },
        );
        destroy_chain(&self.device, &self.swapchain_loader, chain);
        info!("Presentation surface destroyed");
        // Render pass, slots and the command pool drop in field order.
    }
}

fn check_format(what: &'static str, old: vk::Format, new: vk::Format) -> RhiResult<()> {
    if old != new {
        return Err(RhiError::FormatMismatch { what, old, new });
    }
    Ok(())
}

fn create_chain(
    device: &Device,
    surface_loader: &ash::khr::surface::Instance,
    swapchain_loader: &ash::khr::swapchain::Device,
    surface: vk::SurfaceKHR,
    extent: vk::Extent2D,
    preferred_present_mode: vk::PresentModeKHR,
    old_swapchain: vk::SwapchainKHR,
) -> RhiResult<Chain> {
    let support = SwapchainSupportDetails::query(device.physical_device(), surface, surface_loader)?;
    if !support.is_adequate() {
        return Err(RhiError::SwapchainError(
            "surface offers no formats or present modes".to_string(),
        ));
    }

    let surface_format = choose_surface_format(&support.formats);
    let present_mode = choose_present_mode(&support.present_modes, preferred_present_mode);
    let extent = choose_extent(&support.capabilities, extent.width, extent.height);
    let image_count = determine_image_count(&support.capabilities);

    let families = device.queue_families();
    let (Some(graphics), Some(present)) = (families.graphics_family, families.present_family)
    else {
        return Err(RhiError::SwapchainError(
            "queue families are incomplete".to_string(),
        ));
    };
    let family_indices = [graphics, present];
    let (sharing_mode, indices): (_, &[u32]) = if graphics != present {
        (vk::SharingMode::CONCURRENT, &family_indices)
    } else {
        (vk::SharingMode::EXCLUSIVE, &[])
    };

    let create_info = vk::SwapchainCreateInfoKHR::default()
        .surface(surface)
        .min_image_count(image_count)
        .image_format(surface_format.format)
        .image_color_space(surface_format.color_space)
        .image_extent(extent)
        .image_array_layers(1)
        .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
        .image_sharing_mode(sharing_mode)
        .queue_family_indices(indices)
        .pre_transform(support.capabilities.current_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(present_mode)
        .clipped(true)
        .old_swapchain(old_swapchain);

    // SAFETY: the surface is live; the old swapchain, if any, is retired
    // by this call and destroyed by the caller.
    let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None)? };
    // SAFETY: freshly created swapchain.
    let images = unsafe { swapchain_loader.get_swapchain_images(swapchain)? };

    let mut views = Vec::with_capacity(images.len());
    for &image in &images {
        match device.create_image_view(
            image,
            surface_format.format,
            vk::ImageAspectFlags::COLOR,
            vk::ImageViewType::TYPE_2D,
            1,
        ) {
            Ok(view) => views.push(view),
            Err(e) => {
                destroy_chain(
                    device,
                    swapchain_loader,
                    Chain {
                        swapchain,
                        images,
                        views,
                        format: surface_format.format,
                        extent,
                    },
                );
                return Err(e);
            }
        }
    }

    info!(
        "Swapchain created: {}x{}, {:?}, {:?}, {} images",
        extent.width,
        extent.height,
        surface_format.format,
        present_mode,
        images.len()
    );

    Ok(Chain {
        swapchain,
        images,
        views,
        format: surface_format.format,
        extent,
    })
}

fn destroy_chain(device: &Device, swapchain_loader: &ash::khr::swapchain::Device, chain: Chain) {
    // SAFETY: the device is idle; views go before the swapchain that owns
    // their images.
    unsafe {
        for view in chain.views {
            device.handle().destroy_image_view(view, None);
        }
        if chain.swapchain != vk::SwapchainKHR::null() {
            swapchain_loader.destroy_swapchain(chain.swapchain, None);
        }
    }
    debug!("Destroyed swapchain with {} images", chain.images.len());
}

fn create_framebuffers(
    device: &Arc<Device>,
    render_pass: &RenderPass,
    chain: &Chain,
    depth_format: vk::Format,
) -> RhiResult<(Vec<Image>, Vec<Framebuffer>)> {
    let mut depth_images = Vec::with_capacity(chain.views.len());
    let mut framebuffers = Vec::with_capacity(chain.views.len());
    for &view in &chain.views {
        let depth = Image::new(
            device.clone(),
            &ImageDesc::depth_attachment("swapchain depth", chain.extent, depth_format),
        )?;
        framebuffers.push(Framebuffer::new(
            device.clone(),
            render_pass,
            &[view, depth.view()],
            chain.extent,
        )?);
        depth_images.push(depth);
    }
    Ok((depth_images, framebuffers))
}

/// Prefers B8G8R8A8_SRGB, then B8G8R8A8_UNORM, both in SRGB_NONLINEAR;
/// otherwise the first format offered.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    let find = |format: vk::Format| {
        formats.iter().copied().find(|f| {
            f.format == format && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
    };

    if let Some(format) = find(vk::Format::B8G8R8A8_SRGB) {
        return format;
    }
    if let Some(format) = find(vk::Format::B8G8R8A8_UNORM) {
        warn!("Using fallback surface format B8G8R8A8_UNORM");
        return format;
    }
    warn!("Using first available surface format {:?}", formats[0].format);
    formats[0]
}

/// `preferred` when offered, else FIFO.
fn choose_present_mode(
    present_modes: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if present_modes.contains(&preferred) {
        return preferred;
    }
    debug!("{:?} unavailable, falling back to FIFO", preferred);
    vk::PresentModeKHR::FIFO
}

/// The surface's current extent, or the request clamped to its limits when
/// the surface leaves the extent to the swapchain (`u32::MAX`).
fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more than the minimum, capped by the maximum (0 means unbounded).
fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn srgb(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn test_acquire_out_of_date_yields_no_image() {
        let acquired = classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap();
        assert_eq!(acquired.status, SurfaceStatus::OutOfDate);
        assert_eq!(acquired.image_index, None);
    }

    #[test]
    fn test_acquire_suboptimal_still_returns_image() {
        let acquired = classify_acquire(Ok((2, true))).unwrap();
        assert_eq!(acquired.status, SurfaceStatus::Suboptimal);
        assert_eq!(acquired.image_index, Some(2));

        let ready = classify_acquire(Ok((0, false))).unwrap();
        assert_eq!(ready.status, SurfaceStatus::Ready);
    }

    #[test]
    fn test_acquire_other_errors_are_fatal() {
        assert!(matches!(
            classify_acquire(Err(vk::Result::ERROR_DEVICE_LOST)),
            Err(RhiError::SwapchainError(_))
        ));
    }

    #[test]
    fn test_present_classification() {
        assert_eq!(classify_present(Ok(false)).unwrap(), SurfaceStatus::Ready);
        assert_eq!(classify_present(Ok(true)).unwrap(), SurfaceStatus::Suboptimal);
        assert_eq!(
            classify_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            SurfaceStatus::OutOfDate
        );
        assert!(classify_present(Err(vk::Result::ERROR_SURFACE_LOST_KHR)).is_err());
    }

    #[test]
    fn test_format_change_is_rejected() {
        assert!(check_format("depth", vk::Format::D32_SFLOAT, vk::Format::D32_SFLOAT).is_ok());
        let err = check_format("colour", vk::Format::B8G8R8A8_SRGB, vk::Format::B8G8R8A8_UNORM)
            .unwrap_err();
        assert!(matches!(err, RhiError::FormatMismatch { what: "colour", .. }));
    }

    #[test]
    fn test_choose_surface_format_prefers_srgb() {
        let formats = [
            srgb(vk::Format::R8G8B8A8_UNORM),
            srgb(vk::Format::B8G8R8A8_UNORM),
            srgb(vk::Format::B8G8R8A8_SRGB),
        ];
        assert_eq!(choose_surface_format(&formats).format, vk::Format::B8G8R8A8_SRGB);

        let fallback = [srgb(vk::Format::R8G8B8A8_UNORM), srgb(vk::Format::B8G8R8A8_UNORM)];
        assert_eq!(choose_surface_format(&fallback).format, vk::Format::B8G8R8A8_UNORM);

        let first = [srgb(vk::Format::R8G8B8A8_UNORM)];
        assert_eq!(choose_surface_format(&first).format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn test_choose_present_mode_honours_preference() {
        let modes = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::IMMEDIATE),
            vk::PresentModeKHR::IMMEDIATE
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO], vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_choose_extent() {
        let mut capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 2000,
                height: 2000,
            },
            ..Default::default()
        };
        assert_eq!(choose_extent(&capabilities, 800, 600).width, 1920);

        capabilities.current_extent = vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        };
        let clamped = choose_extent(&capabilities, 3000, 50);
        assert_eq!((clamped.width, clamped.height), (2000, 100));
        let inside = choose_extent(&capabilities, 800, 600);
        assert_eq!((inside.width, inside.height), (800, 600));
    }

    #[test]
    fn test_determine_image_count() {
        let capped = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capped), 2);

        let unbounded = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&unbounded), 3);
    }

    #[test]
    fn test_support_adequacy() {
        let mut details = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR::default()],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(details.is_adequate());
        details.present_modes.clear();
        assert!(!details.is_adequate());
    }
}
