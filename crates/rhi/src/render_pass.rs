//! Render passes and framebuffers.
//!
//! A [`RenderPassDesc`] is a device-free description of a single-subpass
//! render pass: its colour attachments, its depth attachment and its
//! external subpass dependencies. Two shapes are used by the engine:
//!
//! - [`RenderPassDesc::presentable`]: one colour attachment that ends in
//!   `PRESENT_SRC_KHR`, for the swapchain.
//! - [`RenderPassDesc::sampled`]: any number of colour attachments that end
//!   in `SHADER_READ_ONLY_OPTIMAL`, bracketed by two dependencies so that a
//!   later pass can sample them without an explicit barrier.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Attachment layout and dependency description of a one-subpass pass.
#[derive(Clone, Debug)]
pub struct RenderPassDesc {
    color_formats: Vec<vk::Format>,
    depth_format: vk::Format,
    color_final_layout: vk::ImageLayout,
    dependencies: Vec<vk::SubpassDependency>,
}

impl RenderPassDesc {
    /// Swapchain pass: one colour attachment presented after the pass.
    pub fn presentable(color_format: vk::Format, depth_format: vk::Format) -> Self {
        let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
        let dependency = vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(stages)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(stages)
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            );

        Self {
            color_formats: vec![color_format],
            depth_format,
            color_final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            dependencies: vec![dependency],
        }
    }

    /// Offscreen pass whose colour attachments are sampled afterwards.
    ///
    /// The entry dependency waits for earlier fragment-shader reads of the
    /// colour attachments and for the previous use of the shared depth
    /// attachment before either is cleared; the exit dependency makes the
    /// colour writes visible to later fragment-shader reads.
    pub fn sampled(color_formats: &[vk::Format], depth_format: vk::Format) -> Self {
        let depth_stages = vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
            | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
        let entry = vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER | depth_stages)
            .src_access_mask(
                vk::AccessFlags::SHADER_READ | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | depth_stages)
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )
            .dependency_flags(vk::DependencyFlags::BY_REGION);
        let exit = vk::SubpassDependency::default()
            .src_subpass(0)
            .dst_subpass(vk::SUBPASS_EXTERNAL)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
            .dst_access_mask(vk::AccessFlags::SHADER_READ)
            .dependency_flags(vk::DependencyFlags::BY_REGION);

        Self {
            color_formats: color_formats.to_vec(),
            depth_format,
            color_final_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            dependencies: vec![entry, exit],
        }
    }

    #[inline]
    pub fn color_count(&self) -> usize {
        self.color_formats.len()
    }

    #[inline]
    pub fn color_formats(&self) -> &[vk::Format] {
        &self.color_formats
    }

    #[inline]
    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    #[inline]
    pub fn color_final_layout(&self) -> vk::ImageLayout {
        self.color_final_layout
    }

    #[inline]
    pub fn dependencies(&self) -> &[vk::SubpassDependency] {
        &self.dependencies
    }

    /// Colour attachments first, depth last.
    pub fn attachments(&self) -> Vec<vk::AttachmentDescription> {
        let mut attachments: Vec<vk::AttachmentDescription> = self
            .color_formats
            .iter()
            .map(|&format| {
                vk::AttachmentDescription::default()
                    .format(format)
                    .samples(vk::SampleCountFlags::TYPE_1)
                    .load_op(vk::AttachmentLoadOp::CLEAR)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(vk::ImageLayout::UNDEFINED)
                    .final_layout(self.color_final_layout)
            })
            .collect();

        attachments.push(
            vk::AttachmentDescription::default()
                .format(self.depth_format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
        );
        attachments
    }

    fn color_refs(&self) -> Vec<vk::AttachmentReference> {
        (0..self.color_formats.len() as u32)
            .map(|attachment| vk::AttachmentReference {
                attachment,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            })
            .collect()
    }

    fn depth_ref(&self) -> vk::AttachmentReference {
        vk::AttachmentReference {
            attachment: self.color_formats.len() as u32,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        }
    }

    /// Clear values matching [`attachments`](Self::attachments): `color` for
    /// every colour attachment, depth 1.0.
    pub fn clear_values(&self, color: [f32; 4]) -> Vec<vk::ClearValue> {
        let mut values = vec![
            vk::ClearValue {
                color: vk::ClearColorValue { float32: color },
            };
            self.color_formats.len()
        ];
        values.push(vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        });
        values
    }
}

/// RAII render pass remembering its description.
pub struct RenderPass {
    device: Arc<Device>,
    render_pass: vk::RenderPass,
    desc: RenderPassDesc,
}

impl RenderPass {
    pub fn new(device: Arc<Device>, desc: RenderPassDesc) -> RhiResult<Self> {
        if desc.color_count() == 0 {
            return Err(RhiError::InvalidHandle(
                "render pass needs at least one colour attachment".to_string(),
            ));
        }

        let attachments = desc.attachments();
        let color_refs = desc.color_refs();
        let depth_ref = desc.depth_ref();
        let subpasses = [vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .depth_stencil_attachment(&depth_ref)];

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(desc.dependencies());

        // SAFETY: all referenced arrays outlive the call.
        let render_pass = unsafe { device.handle().create_render_pass(&create_info, None)? };
        debug!(
            "Created render pass: {} colour attachment(s), final layout {:?}",
            desc.color_count(),
            desc.color_final_layout()
        );

        Ok(Self {
            device,
            render_pass,
            desc,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    #[inline]
    pub fn desc(&self) -> &RenderPassDesc {
        &self.desc
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        // SAFETY: framebuffers and pipelines built against this pass are
        // idle by the time their owner drops it.
        unsafe { self.device.handle().destroy_render_pass(self.render_pass, None) };
        debug!("Destroyed render pass");
    }
}

/// RAII framebuffer.
pub struct Framebuffer {
    device: Arc<Device>,
    framebuffer: vk::Framebuffer,
    extent: vk::Extent2D,
}

impl Framebuffer {
    /// `views` must follow the attachment order of `render_pass`.
    pub fn new(
        device: Arc<Device>,
        render_pass: &RenderPass,
        views: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        let expected = render_pass.desc().color_count() + 1;
        if views.len() != expected {
            return Err(RhiError::InvalidHandle(format!(
                "framebuffer needs {} attachment view(s), got {}",
                expected,
                views.len()
            )));
        }

        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass.handle())
            .attachments(views)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        // SAFETY: views and render pass belong to this device.
        let framebuffer = unsafe { device.handle().create_framebuffer(&create_info, None)? };

        Ok(Self {
            device,
            framebuffer,
            extent,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        // SAFETY: not referenced by any pending command buffer.
        unsafe { self.device.handle().destroy_framebuffer(self.framebuffer, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEPTH: vk::Format = vk::Format::D32_SFLOAT;

    #[test]
    fn test_presentable_pass_ends_in_present_layout() {
        let desc = RenderPassDesc::presentable(vk::Format::B8G8R8A8_SRGB, DEPTH);
        let attachments = desc.attachments();
        assert_eq!(attachments.len(), 2);
        assert_eq!(attachments[0].final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(
            attachments[1].final_layout,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
        assert_eq!(desc.dependencies().len(), 1);
    }

    #[test]
    fn test_sampled_pass_round_trips_through_shader_read() {
        let desc = RenderPassDesc::sampled(&[vk::Format::R8G8B8A8_UNORM], DEPTH);
        let [entry, exit] = desc.dependencies() else {
            panic!("expected two dependencies");
        };

        assert_eq!(entry.src_subpass, vk::SUBPASS_EXTERNAL);
        assert!(entry.src_access_mask.contains(vk::AccessFlags::SHADER_READ));
        assert!(entry.dst_access_mask.contains(vk::AccessFlags::COLOR_ATTACHMENT_WRITE));

        assert_eq!(exit.dst_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(exit.src_access_mask, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
        assert_eq!(exit.dst_access_mask, vk::AccessFlags::SHADER_READ);
        assert_eq!(exit.dst_stage_mask, vk::PipelineStageFlags::FRAGMENT_SHADER);

        assert_eq!(
            desc.attachments()[0].final_layout,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        );
    }

    #[test]
    fn test_sampled_pass_orders_depth_reuse() {
        let desc = RenderPassDesc::sampled(&[vk::Format::R8G8B8A8_UNORM], DEPTH);
        let entry = &desc.dependencies()[0];

        // The previous frame's depth writes finish before this frame clears.
        assert!(entry
            .src_stage_mask
            .contains(vk::PipelineStageFlags::LATE_FRAGMENT_TESTS));
        assert!(entry
            .src_access_mask
            .contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE));
        assert!(entry.dst_stage_mask.contains(
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS
        ));
        assert!(entry
            .dst_access_mask
            .contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE));
    }

    #[test]
    fn test_geometry_pass_places_depth_last() {
        let formats = [
            vk::Format::R16G16B16A16_SFLOAT,
            vk::Format::R16G16B16A16_SFLOAT,
            vk::Format::R8G8B8A8_UNORM,
        ];
        let desc = RenderPassDesc::sampled(&formats, DEPTH);
        assert_eq!(desc.color_count(), 3);
        assert_eq!(desc.depth_ref().attachment, 3);
        assert_eq!(desc.color_refs().len(), 3);

        let attachments = desc.attachments();
        assert_eq!(attachments.len(), 4);
        assert!(
            attachments[..3]
                .iter()
                .all(|a| a.store_op == vk::AttachmentStoreOp::STORE)
        );
        assert_eq!(attachments[3].format, DEPTH);
    }

    #[test]
    fn test_clear_values_cover_every_attachment() {
        let desc = RenderPassDesc::sampled(
            &[vk::Format::R8G8B8A8_UNORM, vk::Format::R8G8B8A8_UNORM],
            DEPTH,
        );
        let values = desc.clear_values([0.1, 0.2, 0.3, 1.0]);
        assert_eq!(values.len(), 3);
        // SAFETY: the union was written through the depth_stencil field.
        let depth = unsafe { values[2].depth_stencil };
        assert_eq!(depth.depth, 1.0);
    }
}
