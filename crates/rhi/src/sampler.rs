//! Texture samplers.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Addressing behaviour at texture edges.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SamplerAddress {
    /// For render targets and cubemaps, where wrapping would bleed edges.
    ClampToEdge,
    Repeat,
}

impl SamplerAddress {
    fn to_vk(self) -> vk::SamplerAddressMode {
        match self {
            SamplerAddress::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
            SamplerAddress::Repeat => vk::SamplerAddressMode::REPEAT,
        }
    }
}

/// Linear-filtered sampler wrapper.
pub struct Sampler {
    device: Arc<Device>,
    sampler: vk::Sampler,
}

impl Sampler {
    /// Creates a linear sampler using `address` on all three axes.
    /// Anisotropy is enabled at the device maximum when supported.
    pub fn linear(device: Arc<Device>, address: SamplerAddress) -> RhiResult<Self> {
        let mode = address.to_vk();
        let anisotropy = device.max_sampler_anisotropy();
        let info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(mode)
            .address_mode_v(mode)
            .address_mode_w(mode)
            .anisotropy_enable(anisotropy.is_some())
            .max_anisotropy(anisotropy.unwrap_or(1.0))
            .border_color(vk::BorderColor::FLOAT_OPAQUE_WHITE)
            .compare_op(vk::CompareOp::NEVER)
            .min_lod(0.0)
            .max_lod(1.0);

        // SAFETY: plain creation on a live device.
        let sampler = unsafe { device.handle().create_sampler(&info, None)? };
        debug!("Created {:?} sampler", address);
        Ok(Self { device, sampler })
    }

    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        // SAFETY: descriptor sets referencing the sampler are no longer in use.
        unsafe { self.device.handle().destroy_sampler(self.sampler, None) };
    }
}
