//! Sampled textures uploaded from host pixels.
//!
//! Upload path: staging buffer, transition to `TRANSFER_DST_OPTIMAL`,
//! buffer-to-image copy, transition to `SHADER_READ_ONLY_OPTIMAL`. The
//! staging buffer is dropped once the copy has completed.

use std::sync::Arc;

use ash::vk;
use tracing::info;

use crate::buffer::GpuBuffer;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{Image, ImageDesc};
use crate::sampler::{Sampler, SamplerAddress};

/// Format of every uploaded texture: 8-bit RGBA, sRGB encoded.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// A shader-readable image and its sampler.
pub struct Texture {
    image: Image,
    sampler: Sampler,
}

impl Texture {
    /// Uploads a 2D RGBA8 texture.
    ///
    /// # Errors
    ///
    /// [`RhiError::BufferError`] when `pixels` is not `width * height * 4`
    /// bytes long, otherwise any device failure.
    pub fn from_rgba8(
        device: Arc<Device>,
        name: &str,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> RhiResult<Self> {
        check_len(name, width, height, 1, pixels.len())?;
        let extent = vk::Extent2D { width, height };
        let image = Image::new(
            device.clone(),
            &ImageDesc::sampled(name, extent, TEXTURE_FORMAT),
        )?;
        upload(&device, name, &image, pixels)?;
        let sampler = Sampler::linear(device, SamplerAddress::Repeat)?;
        info!("Uploaded texture '{}' ({}x{})", name, width, height);
        Ok(Self { image, sampler })
    }

    /// Uploads a cubemap from six square faces in +X, -X, +Y, -Y, +Z, -Z
    /// order.
    pub fn cube_from_faces(
        device: Arc<Device>,
        name: &str,
        size: u32,
        faces: [&[u8]; 6],
    ) -> RhiResult<Self> {
        let mut pixels = Vec::with_capacity(faces.iter().map(|face| face.len()).sum());
        for face in faces {
            check_len(name, size, size, 1, face.len())?;
            pixels.extend_from_slice(face);
        }
        let extent = vk::Extent2D {
            width: size,
            height: size,
        };
        let image = Image::new(device.clone(), &ImageDesc::cube(name, extent, TEXTURE_FORMAT))?;
        upload(&device, name, &image, &pixels)?;
        let sampler = Sampler::linear(device, SamplerAddress::ClampToEdge)?;
        info!("Uploaded cubemap '{}' ({}x{} per face)", name, size, size);
        Ok(Self { image, sampler })
    }

    /// 1x1 texture of a single colour, used when an asset is missing.
    pub fn solid(device: Arc<Device>, name: &str, rgba: [u8; 4]) -> RhiResult<Self> {
        Self::from_rgba8(device, name, 1, 1, &rgba)
    }

    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler.handle(),
            image_view: self.image.view(),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }

    #[inline]
    pub fn image(&self) -> &Image {
        &self.image
    }
}

fn check_len(name: &str, width: u32, height: u32, layers: u32, len: usize) -> RhiResult<()> {
    let expected = width as usize * height as usize * 4 * layers as usize;
    if expected == 0 || len != expected {
        return Err(RhiError::BufferError(format!(
            "texture '{}': expected {} bytes of RGBA8 for {}x{}, got {}",
            name, expected, width, height, len
        )));
    }
    Ok(())
}

fn upload(device: &Arc<Device>, name: &str, image: &Image, pixels: &[u8]) -> RhiResult<()> {
    let staging = GpuBuffer::staging(device.clone(), name, pixels)?;
    let extent = image.extent();
    device.transition_image_layout(
        image.handle(),
        image.format(),
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        image.layers(),
    )?;
    device.copy_buffer_to_image(
        staging.handle(),
        image.handle(),
        extent.width,
        extent.height,
        image.layers(),
    )?;
    device.transition_image_layout(
        image.handle(),
        image.format(),
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        image.layers(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_length_must_match_extent() {
        assert!(check_len("t", 2, 2, 1, 16).is_ok());
        assert!(check_len("t", 2, 2, 1, 15).is_err());
        assert!(check_len("t", 0, 2, 1, 0).is_err());
        assert!(check_len("t", 4, 4, 6, 4 * 4 * 4 * 6).is_ok());
    }
}
