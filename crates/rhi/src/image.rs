//! Device-local images with a single view.
//!
//! Used for depth buffers, offscreen colour attachments and uploaded
//! textures. Teardown order is view, image, then memory.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::Allocation;
use tracing::debug;

use crate::device::{Device, depth_aspect};
use crate::error::{RhiError, RhiResult};

/// Construction parameters for an [`Image`].
#[derive(Clone, Copy, Debug)]
pub struct ImageDesc<'a> {
    pub name: &'a str,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
    /// 1 for plain 2D images, 6 for cubemaps.
    pub layers: u32,
    pub cube: bool,
}

impl<'a> ImageDesc<'a> {
    /// Colour attachment that later passes sample.
    pub fn color_attachment(name: &'a str, extent: vk::Extent2D, format: vk::Format) -> Self {
        Self {
            name,
            extent,
            format,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            aspect: vk::ImageAspectFlags::COLOR,
            layers: 1,
            cube: false,
        }
    }

    pub fn depth_attachment(name: &'a str, extent: vk::Extent2D, format: vk::Format) -> Self {
        Self {
            name,
            extent,
            format,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            aspect: depth_aspect(format),
            layers: 1,
            cube: false,
        }
    }

    /// Upload destination sampled by shaders.
    pub fn sampled(name: &'a str, extent: vk::Extent2D, format: vk::Format) -> Self {
        Self {
            name,
            extent,
            format,
            usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            aspect: vk::ImageAspectFlags::COLOR,
            layers: 1,
            cube: false,
        }
    }

    /// Six-layer cube-compatible upload destination.
    pub fn cube(name: &'a str, extent: vk::Extent2D, format: vk::Format) -> Self {
        Self {
            layers: 6,
            cube: true,
            ..Self::sampled(name, extent, format)
        }
    }

    fn view_type(&self) -> vk::ImageViewType {
        if self.cube {
            vk::ImageViewType::CUBE
        } else {
            vk::ImageViewType::TYPE_2D
        }
    }
}

/// An image, its memory and one view over all of its layers.
pub struct Image {
    device: Arc<Device>,
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<Allocation>,
    format: vk::Format,
    extent: vk::Extent2D,
    layers: u32,
}

impl Image {
    /// # Errors
    ///
    /// Fails for a zero extent or when the device rejects the image.
    pub fn new(device: Arc<Device>, desc: &ImageDesc<'_>) -> RhiResult<Self> {
        if desc.extent.width == 0 || desc.extent.height == 0 {
            return Err(RhiError::InvalidHandle(format!(
                "image '{}' has zero extent",
                desc.name
            )));
        }

        let flags = if desc.cube {
            vk::ImageCreateFlags::CUBE_COMPATIBLE
        } else {
            vk::ImageCreateFlags::empty()
        };
        let info = vk::ImageCreateInfo::default()
            .flags(flags)
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(desc.layers)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let (image, allocation) = device.create_image(&info, MemoryLocation::GpuOnly, desc.name)?;

        let view = match device.create_image_view(
            image,
            desc.format,
            desc.aspect,
            desc.view_type(),
            desc.layers,
        ) {
            Ok(view) => view,
            Err(e) => {
                // SAFETY: nothing references the image yet.
                unsafe { device.handle().destroy_image(image, None) };
                device.free_allocation(allocation);
                return Err(e);
            }
        };

        debug!(
            "Created image '{}': {}x{} {:?} ({} layer(s))",
            desc.name, desc.extent.width, desc.extent.height, desc.format, desc.layers
        );

        Ok(Self {
            device,
            image,
            view,
            allocation: Some(allocation),
            format: desc.format,
            extent: desc.extent,
            layers: desc.layers,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn layers(&self) -> u32 {
        self.layers
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        // SAFETY: owners drop images after the GPU has finished with them.
        unsafe {
            self.device.handle().destroy_image_view(self.view, None);
            self.device.handle().destroy_image(self.image, None);
        }
        if let Some(allocation) = self.allocation.take() {
            self.device.free_allocation(allocation);
        }
        debug!(
            "Destroyed image {}x{} {:?}",
            self.extent.width, self.extent.height, self.format
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 512,
        height: 512,
    };

    #[test]
    fn test_color_attachment_is_sampleable() {
        let desc = ImageDesc::color_attachment("gbuffer", EXTENT, vk::Format::R16G16B16A16_SFLOAT);
        assert!(desc.usage.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT));
        assert!(desc.usage.contains(vk::ImageUsageFlags::SAMPLED));
        assert_eq!(desc.view_type(), vk::ImageViewType::TYPE_2D);
    }

    #[test]
    fn test_depth_attachment_aspect_follows_format() {
        let depth = ImageDesc::depth_attachment("depth", EXTENT, vk::Format::D32_SFLOAT);
        assert_eq!(depth.aspect, vk::ImageAspectFlags::DEPTH);
        let stencil = ImageDesc::depth_attachment("depth", EXTENT, vk::Format::D24_UNORM_S8_UINT);
        assert!(stencil.aspect.contains(vk::ImageAspectFlags::STENCIL));
    }

    #[test]
    fn test_cube_has_six_layers() {
        let desc = ImageDesc::cube("sky", EXTENT, vk::Format::R8G8B8A8_SRGB);
        assert_eq!(desc.layers, 6);
        assert_eq!(desc.view_type(), vk::ImageViewType::CUBE);
        assert!(desc.usage.contains(vk::ImageUsageFlags::TRANSFER_DST));
    }
}
