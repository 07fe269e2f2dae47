//! Auxiliary render targets, keyed by name.
//!
//! Each target is self-contained: colour attachments and a depth attachment,
//! a render pass whose two subpass dependencies hand the colour attachments
//! over to later fragment-shader reads, a framebuffer and a sampler. Later
//! passes bind the colour attachments through [`TargetDescriptor`]s.

use std::sync::Arc;

use ash::vk;
use kiln_rhi::device::Device;
use kiln_rhi::image::{Image, ImageDesc};
use kiln_rhi::render_pass::{Framebuffer, RenderPass, RenderPassDesc};
use kiln_rhi::sampler::{Sampler, SamplerAddress};
use tracing::{debug, info};

use crate::error::{RenderError, RenderResult};
use crate::frame::PassBegin;

/// Colour format of a plain offscreen target.
pub const OFFSCREEN_COLOR_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Geometry-buffer attachments in binding order: position, normal, albedo.
pub const GBUFFER_FORMATS: [vk::Format; 3] = [
    vk::Format::R16G16B16A16_SFLOAT,
    vk::Format::R16G16B16A16_SFLOAT,
    vk::Format::R8G8B8A8_UNORM,
];

const OFFSCREEN_CLEAR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetKind {
    /// One colour attachment plus depth.
    Offscreen,
    /// Position, normal and albedo attachments plus depth.
    Deferred,
}

impl TargetKind {
    pub fn color_formats(self) -> &'static [vk::Format] {
        match self {
            TargetKind::Offscreen => std::slice::from_ref(&OFFSCREEN_COLOR_FORMAT),
            TargetKind::Deferred => &GBUFFER_FORMATS,
        }
    }

    pub fn attachment_names(self) -> &'static [&'static str] {
        match self {
            TargetKind::Offscreen => &["color"],
            TargetKind::Deferred => &["position", "normal", "albedo"],
        }
    }
}

/// Sampler, view and layout for reading one attachment as a texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetDescriptor {
    pub sampler: vk::Sampler,
    pub view: vk::ImageView,
    pub layout: vk::ImageLayout,
}

impl From<TargetDescriptor> for vk::DescriptorImageInfo {
    fn from(descriptor: TargetDescriptor) -> Self {
        vk::DescriptorImageInfo {
            sampler: descriptor.sampler,
            image_view: descriptor.view,
            image_layout: descriptor.layout,
        }
    }
}

/// One auxiliary render target.
///
/// Fields drop in declaration order: every attachment (view, image, memory),
/// then the render pass, the sampler and the framebuffer.
pub struct RenderPassTarget {
    name: String,
    kind: TargetKind,
    extent: vk::Extent2D,
    clear_values: Vec<vk::ClearValue>,

    colors: Vec<Image>,
    depth: Image,
    render_pass: RenderPass,
    sampler: Sampler,
    framebuffer: Framebuffer,
}

impl RenderPassTarget {
    pub fn new(
        device: Arc<Device>,
        name: &str,
        kind: TargetKind,
        extent: vk::Extent2D,
        depth_format: vk::Format,
    ) -> RenderResult<Self> {
        let formats = kind.color_formats();
        let colors = formats
            .iter()
            .zip(kind.attachment_names())
            .map(|(&format, attachment)| {
                let label = format!("{}.{}", name, attachment);
                Image::new(
                    device.clone(),
                    &ImageDesc::color_attachment(&label, extent, format),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        let depth = Image::new(
            device.clone(),
            &ImageDesc::depth_attachment(&format!("{}.depth", name), extent, depth_format),
        )?;

        let desc = RenderPassDesc::sampled(formats, depth_format);
        let clear_values = desc.clear_values(OFFSCREEN_CLEAR);
        let render_pass = RenderPass::new(device.clone(), desc)?;

        let views: Vec<vk::ImageView> = colors
            .iter()
            .map(Image::view)
            .chain(std::iter::once(depth.view()))
            .collect();
        let framebuffer = Framebuffer::new(device.clone(), &render_pass, &views, extent)?;
        let sampler = Sampler::linear(device, SamplerAddress::ClampToEdge)?;

        debug!(
            "Created {:?} target '{}' ({}x{}, {} colour attachment(s))",
            kind,
            name,
            extent.width,
            extent.height,
            colors.len()
        );

        Ok(Self {
            name: name.to_string(),
            kind,
            extent,
            clear_values,
            colors,
            depth,
            render_pass,
            sampler,
            framebuffer,
        })
    }

    /// Begin parameters for the orchestrator.
    pub fn pass_begin(&self) -> PassBegin<'_> {
        PassBegin {
            name: &self.name,
            render_pass: self.render_pass.handle(),
            framebuffer: self.framebuffer.handle(),
            extent: self.extent,
            clear_values: &self.clear_values,
        }
    }

    /// Texture view of colour attachment `index`, valid once the pass has
    /// ended.
    pub fn descriptor(&self, index: usize) -> Option<TargetDescriptor> {
        self.colors.get(index).map(|image| TargetDescriptor {
            sampler: self.sampler.handle(),
            view: image.view(),
            layout: self.render_pass.desc().color_final_layout(),
        })
    }

    /// Descriptors of every colour attachment in binding order.
    pub fn descriptors(&self) -> Vec<TargetDescriptor> {
        (0..self.colors.len())
            .filter_map(|index| self.descriptor(index))
            .collect()
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    #[inline]
    pub fn color_count(&self) -> usize {
        self.colors.len()
    }

    #[inline]
    pub fn depth_format(&self) -> vk::Format {
        self.depth.format()
    }
}

/// Named auxiliary targets in creation order.
pub struct RenderPassRegistry {
    device: Arc<Device>,
    depth_format: vk::Format,
    targets: Vec<RenderPassTarget>,
}

impl RenderPassRegistry {
    pub fn new(device: Arc<Device>) -> RenderResult<Self> {
        let depth_format = device.find_depth_format()?;
        Ok(Self {
            device,
            depth_format,
            targets: Vec::new(),
        })
    }

    /// Creates an offscreen colour + depth target.
    pub fn create_render_pass(
        &mut self,
        name: &str,
        extent: vk::Extent2D,
    ) -> RenderResult<&RenderPassTarget> {
        self.create(name, TargetKind::Offscreen, extent)
    }

    /// Creates a geometry-buffer target.
    pub fn create_deferred_pass(
        &mut self,
        name: &str,
        extent: vk::Extent2D,
    ) -> RenderResult<&RenderPassTarget> {
        self.create(name, TargetKind::Deferred, extent)
    }

    fn create(
        &mut self,
        name: &str,
        kind: TargetKind,
        extent: vk::Extent2D,
    ) -> RenderResult<&RenderPassTarget> {
        ensure_unique(self.names(), name)?;
        let target =
            RenderPassTarget::new(self.device.clone(), name, kind, extent, self.depth_format)?;
        info!("Registered render pass '{}'", name);
        self.targets.push(target);
        Ok(&self.targets[self.targets.len() - 1])
    }

    /// Rebuilds `name` at `extent`, keeping its kind and position. The old
    /// attachments are destroyed, so the device must be idle.
    pub fn recreate(
        &mut self,
        name: &str,
        extent: vk::Extent2D,
    ) -> RenderResult<&RenderPassTarget> {
        let index = self
            .targets
            .iter()
            .position(|target| target.name == name)
            .ok_or_else(|| RenderError::UnknownPass(name.to_string()))?;
        let kind = self.targets[index].kind;
        self.targets[index] =
            RenderPassTarget::new(self.device.clone(), name, kind, extent, self.depth_format)?;
        info!(
            "Recreated render pass '{}' at {}x{}",
            name, extent.width, extent.height
        );
        Ok(&self.targets[index])
    }

    pub fn get(&self, name: &str) -> Option<&RenderPassTarget> {
        self.targets.iter().find(|target| target.name == name)
    }

    pub fn require(&self, name: &str) -> RenderResult<&RenderPassTarget> {
        self.get(name)
            .ok_or_else(|| RenderError::UnknownPass(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().map(|target| target.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &RenderPassTarget> {
        self.targets.iter()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl Drop for RenderPassRegistry {
    fn drop(&mut self) {
        // Reverse of creation.
        while let Some(target) = self.targets.pop() {
            debug!("Destroying render pass '{}'", target.name);
        }
    }
}

fn ensure_unique<'a>(mut existing: impl Iterator<Item = &'a str>, name: &str) -> RenderResult<()> {
    if existing.any(|n| n == name) {
        return Err(RenderError::DuplicatePass(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offscreen_kind_has_one_color() {
        let kind = TargetKind::Offscreen;
        assert_eq!(kind.color_formats(), &[OFFSCREEN_COLOR_FORMAT]);
        assert_eq!(kind.attachment_names().len(), 1);
    }

    #[test]
    fn test_deferred_kind_layout() {
        let kind = TargetKind::Deferred;
        assert_eq!(kind.color_formats().len(), 3);
        assert_eq!(kind.attachment_names(), &["position", "normal", "albedo"]);
        // Position and normal need signed, high-precision storage.
        assert_eq!(kind.color_formats()[0], vk::Format::R16G16B16A16_SFLOAT);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let names = ["capture_px", "capture_nx"];
        assert!(ensure_unique(names.iter().copied(), "gbuffer").is_ok());
        let err = ensure_unique(names.iter().copied(), "capture_nx").unwrap_err();
        assert!(matches!(err, RenderError::DuplicatePass(name) if name == "capture_nx"));
    }

    #[test]
    fn test_target_descriptor_into_image_info() {
        let descriptor = TargetDescriptor {
            sampler: vk::Sampler::null(),
            view: vk::ImageView::null(),
            layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        };
        let info: vk::DescriptorImageInfo = descriptor.into();
        assert_eq!(info.image_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn test_sampled_pass_description_matches_kind() {
        let desc = RenderPassDesc::sampled(
            TargetKind::Deferred.color_formats(),
            vk::Format::D32_SFLOAT,
        );
        assert_eq!(desc.color_count(), 3);
        assert_eq!(desc.dependencies().len(), 2);
        assert!(desc.dependencies()[0]
            .dst_stage_mask
            .contains(vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS));
        assert_eq!(
            desc.color_final_layout(),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        );
    }
}
