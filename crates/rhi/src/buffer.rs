//! GPU buffers with element-strided layout.
//!
//! A [`GpuBuffer`] holds `instance_count` elements of `instance_size` bytes,
//! each starting on a multiple of the requested minimum offset alignment.
//! Uniform arrays indexed through dynamic descriptor offsets rely on that
//! spacing: element `i` lives at [`BufferLayout::index_offset`]`(i)`.
//!
//! Host writes go through [`GpuBuffer::map`] / [`GpuBuffer::write_to_buffer`]
//! and become visible to the GPU after [`GpuBuffer::flush`], which is a no-op
//! on host-coherent memory. Device-local destinations are filled through a
//! staging buffer with [`GpuBuffer::device_local_with_data`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use kiln_rhi::buffer::GpuBuffer;
//! use kiln_rhi::device::Device;
//!
//! # fn example(device: Arc<Device>) -> kiln_rhi::RhiResult<()> {
//! // Six 64-byte camera transforms, one per cubemap face.
//! let mut faces = GpuBuffer::uniform(device, "capture faces", 64, 6)?;
//! faces.write_to_index(&[0u8; 64], 3)?;
//! faces.flush_index(3)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::Allocation;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Rounds `instance_size` up to a multiple of `min_offset_alignment`.
///
/// An alignment of zero or one leaves the size unchanged. Vulkan guarantees
/// the device limit is a power of two.
pub fn aligned_size(
    instance_size: vk::DeviceSize,
    min_offset_alignment: vk::DeviceSize,
) -> vk::DeviceSize {
    if min_offset_alignment > 1 {
        (instance_size + min_offset_alignment - 1) & !(min_offset_alignment - 1)
    } else {
        instance_size
    }
}

/// Element layout of a buffer: stride, count and total size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferLayout {
    instance_size: vk::DeviceSize,
    instance_count: u32,
    alignment_size: vk::DeviceSize,
}

impl BufferLayout {
    pub fn new(
        instance_size: vk::DeviceSize,
        instance_count: u32,
        min_offset_alignment: vk::DeviceSize,
    ) -> Self {
        Self {
            instance_size,
            instance_count,
            alignment_size: aligned_size(instance_size, min_offset_alignment),
        }
    }

    #[inline]
    pub fn instance_size(&self) -> vk::DeviceSize {
        self.instance_size
    }

    #[inline]
    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    /// Distance between consecutive elements.
    #[inline]
    pub fn alignment_size(&self) -> vk::DeviceSize {
        self.alignment_size
    }

    #[inline]
    pub fn buffer_size(&self) -> vk::DeviceSize {
        self.alignment_size * self.instance_count as vk::DeviceSize
    }

    /// Byte offset of element `index`.
    #[inline]
    pub fn index_offset(&self, index: u32) -> vk::DeviceSize {
        index as vk::DeviceSize * self.alignment_size
    }
}

/// Copies `data` into `mapped` at `offset`, rejecting writes past the end.
pub fn copy_into(mapped: &mut [u8], data: &[u8], offset: vk::DeviceSize) -> RhiResult<()> {
    let start = usize::try_from(offset)
        .map_err(|_| RhiError::BufferError(format!("offset {offset} overflows usize")))?;
    let end = start
        .checked_add(data.len())
        .filter(|&end| end <= mapped.len())
        .ok_or_else(|| {
            RhiError::BufferError(format!(
                "write of {} bytes at offset {} exceeds buffer of {} bytes",
                data.len(),
                offset,
                mapped.len()
            ))
        })?;
    mapped[start..end].copy_from_slice(data);
    Ok(())
}

/// Expands a flush range to the non-coherent atom size. Returns `(offset,
/// size)` relative to the device memory object.
///
/// A rounded range that would run past the allocation becomes
/// `vk::WHOLE_SIZE`: the memory block's size is unknown here, and a
/// non-atom-multiple size is only valid when it ends exactly at the block's
/// end.
pub fn flush_range(
    allocation_offset: vk::DeviceSize,
    allocation_size: vk::DeviceSize,
    offset: vk::DeviceSize,
    size: vk::DeviceSize,
    atom_size: vk::DeviceSize,
) -> (vk::DeviceSize, vk::DeviceSize) {
    let atom = atom_size.max(1);
    let size = if size == vk::WHOLE_SIZE {
        allocation_size.saturating_sub(offset)
    } else {
        size
    };
    let allocation_end = allocation_offset + allocation_size;
    let start = allocation_offset + offset;
    let end = (start + size).min(allocation_end);
    let aligned_start = start / atom * atom;
    let aligned_end = end.div_ceil(atom) * atom;
    if aligned_end > allocation_end {
        return (aligned_start, vk::WHOLE_SIZE);
    }
    (aligned_start, aligned_end - aligned_start)
}

/// Construction parameters for a [`GpuBuffer`].
#[derive(Clone, Copy, Debug)]
pub struct BufferDesc<'a> {
    pub name: &'a str,
    pub instance_size: vk::DeviceSize,
    pub instance_count: u32,
    pub usage: vk::BufferUsageFlags,
    pub location: MemoryLocation,
    /// Minimum spacing between elements; 1 for tightly packed buffers.
    pub min_offset_alignment: vk::DeviceSize,
}

impl<'a> BufferDesc<'a> {
    pub fn new(
        name: &'a str,
        instance_size: vk::DeviceSize,
        instance_count: u32,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> Self {
        Self {
            name,
            instance_size,
            instance_count,
            usage,
            location,
            min_offset_alignment: 1,
        }
    }

    pub fn with_alignment(mut self, min_offset_alignment: vk::DeviceSize) -> Self {
        self.min_offset_alignment = min_offset_alignment;
        self
    }
}

/// A buffer, its memory, and an optional host mapping.
pub struct GpuBuffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    layout: BufferLayout,
    usage: vk::BufferUsageFlags,
    location: MemoryLocation,
    mapped: bool,
    name: String,
}

impl GpuBuffer {
    /// Creates an unmapped buffer described by `desc`.
    ///
    /// # Errors
    ///
    /// [`RhiError::BufferError`] for an empty layout, otherwise whatever
    /// [`Device::create_buffer`] reports.
    pub fn new(device: Arc<Device>, desc: &BufferDesc<'_>) -> RhiResult<Self> {
        let layout = BufferLayout::new(
            desc.instance_size,
            desc.instance_count,
            desc.min_offset_alignment,
        );
        if layout.buffer_size() == 0 {
            return Err(RhiError::BufferError(format!(
                "'{}' has zero size ({} x {} bytes)",
                desc.name, desc.instance_count, desc.instance_size
            )));
        }

        let info = vk::BufferCreateInfo::default()
            .size(layout.buffer_size())
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let (buffer, allocation) = device.create_buffer(&info, desc.location, desc.name)?;

        debug!(
            "Created buffer '{}': {} x {} bytes (stride {})",
            desc.name,
            layout.instance_count(),
            layout.instance_size(),
            layout.alignment_size()
        );

        Ok(Self {
            device,
            buffer,
            allocation: Some(allocation),
            layout,
            usage: desc.usage,
            location: desc.location,
            mapped: false,
            name: desc.name.to_string(),
        })
    }

    /// Host-visible uniform buffer of `count` elements spaced for dynamic
    /// offsets, already mapped.
    pub fn uniform(
        device: Arc<Device>,
        name: &str,
        instance_size: vk::DeviceSize,
        count: u32,
    ) -> RhiResult<Self> {
        let alignment = device.min_uniform_buffer_offset_alignment();
        let desc = BufferDesc::new(
            name,
            instance_size,
            count,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            MemoryLocation::CpuToGpu,
        )
        .with_alignment(alignment);
        let mut buffer = Self::new(device, &desc)?;
        buffer.map()?;
        Ok(buffer)
    }

    /// Mapped transfer-source buffer holding `data`.
    pub fn staging(device: Arc<Device>, name: &str, data: &[u8]) -> RhiResult<Self> {
        let desc = BufferDesc::new(
            name,
            data.len() as vk::DeviceSize,
            1,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
        );
        let mut staging = Self::new(device, &desc)?;
        staging.map()?;
        staging.write_to_buffer(data, 0)?;
        staging.flush(vk::WHOLE_SIZE, 0)?;
        staging.unmap();
        Ok(staging)
    }

    /// Device-local buffer filled through a temporary staging buffer.
    ///
    /// `usage` gains `TRANSFER_DST` automatically. The staging buffer is
    /// released once the copy has completed.
    pub fn device_local_with_data(
        device: Arc<Device>,
        name: &str,
        usage: vk::BufferUsageFlags,
        instance_size: vk::DeviceSize,
        data: &[u8],
    ) -> RhiResult<Self> {
        if instance_size == 0 || data.len() as vk::DeviceSize % instance_size != 0 {
            return Err(RhiError::BufferError(format!(
                "'{}': {} bytes is not a whole number of {}-byte elements",
                name,
                data.len(),
                instance_size
            )));
        }
        let count = (data.len() as vk::DeviceSize / instance_size) as u32;

        let staging = Self::staging(device.clone(), name, data)?;
        let desc = BufferDesc::new(
            name,
            instance_size,
            count,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuOnly,
        );
        let buffer = Self::new(device.clone(), &desc)?;
        device.copy_buffer(staging.handle(), buffer.handle(), buffer.size())?;
        Ok(buffer)
    }

    /// Enables host writes.
    ///
    /// # Errors
    ///
    /// [`RhiError::BufferError`] when the memory is not host-visible.
    pub fn map(&mut self) -> RhiResult<()> {
        let visible = self
            .allocation
            .as_ref()
            .is_some_and(|allocation| allocation.mapped_ptr().is_some());
        if !visible {
            return Err(RhiError::BufferError(format!(
                "'{}' lives in {:?} memory and cannot be mapped",
                self.name, self.location
            )));
        }
        self.mapped = true;
        Ok(())
    }

    /// Ends host access. Writes after this point fail until the next `map`.
    pub fn unmap(&mut self) {
        self.mapped = false;
    }

    #[inline]
    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    /// Copies `data` into the mapped region at `offset`.
    pub fn write_to_buffer(&mut self, data: &[u8], offset: vk::DeviceSize) -> RhiResult<()> {
        if !self.mapped {
            return Err(RhiError::BufferError(format!(
                "'{}' written while unmapped",
                self.name
            )));
        }
        let slice = self
            .allocation
            .as_mut()
            .and_then(Allocation::mapped_slice_mut)
            .ok_or_else(|| RhiError::BufferError("mapping lost".to_string()))?;
        let len = (self.layout.buffer_size() as usize).min(slice.len());
        copy_into(&mut slice[..len], data, offset)
    }

    /// Writes one element at the aligned position of `index`.
    pub fn write_to_index(&mut self, data: &[u8], index: u32) -> RhiResult<()> {
        self.check_index(index)?;
        if data.len() as vk::DeviceSize > self.layout.instance_size() {
            return Err(RhiError::BufferError(format!(
                "'{}': {} bytes exceed element size {}",
                self.name,
                data.len(),
                self.layout.instance_size()
            )));
        }
        self.write_to_buffer(data, self.layout.index_offset(index))
    }

    /// Writes a plain-old-data value at `index`.
    pub fn write_value<T: bytemuck::Pod>(&mut self, value: &T, index: u32) -> RhiResult<()> {
        self.write_to_index(bytemuck::bytes_of(value), index)
    }

    /// Makes host writes in `[offset, offset + size)` visible to the device.
    /// Pass `vk::WHOLE_SIZE` to flush everything from `offset`.
    pub fn flush(&self, size: vk::DeviceSize, offset: vk::DeviceSize) -> RhiResult<()> {
        let Some(allocation) = self.allocation.as_ref() else {
            return Ok(());
        };
        if allocation
            .memory_properties()
            .contains(vk::MemoryPropertyFlags::HOST_COHERENT)
        {
            return Ok(());
        }

        let (offset, size) = flush_range(
            allocation.offset(),
            allocation.size(),
            offset,
            size,
            self.device.non_coherent_atom_size(),
        );
        // SAFETY: the handle is only used to name the range; the allocation
        // stays alive for the duration of the call.
        let memory = unsafe { allocation.memory() };
        let range = vk::MappedMemoryRange::default()
            .memory(memory)
            .offset(offset)
            .size(size);
        // SAFETY: the memory is host-mapped by the allocator for the
        // lifetime of the allocation.
        unsafe { self.device.handle().flush_mapped_memory_ranges(&[range])? };
        Ok(())
    }

    pub fn flush_index(&self, index: u32) -> RhiResult<()> {
        self.check_index(index)?;
        self.flush(self.layout.alignment_size(), self.layout.index_offset(index))
    }

    /// Descriptor covering `size` bytes from `offset`.
    pub fn descriptor_info(
        &self,
        size: vk::DeviceSize,
        offset: vk::DeviceSize,
    ) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.buffer,
            offset,
            range: size,
        }
    }

    /// Descriptor covering element `index`.
    pub fn descriptor_info_for_index(&self, index: u32) -> vk::DescriptorBufferInfo {
        self.descriptor_info(self.layout.alignment_size(), self.layout.index_offset(index))
    }

    /// Descriptor for a dynamic uniform binding: one element wide at offset
    /// zero, with the element chosen per draw by the dynamic offset.
    pub fn dynamic_descriptor_info(&self) -> vk::DescriptorBufferInfo {
        self.descriptor_info(self.layout.instance_size(), 0)
    }

    /// Dynamic offset selecting element `index`.
    pub fn dynamic_offset(&self, index: u32) -> u32 {
        self.layout.index_offset(index) as u32
    }

    #[inline]
    pub fn index_offset(&self, index: u32) -> vk::DeviceSize {
        self.layout.index_offset(index)
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    #[inline]
    pub fn layout(&self) -> &BufferLayout {
        &self.layout
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.layout.buffer_size()
    }

    #[inline]
    pub fn instance_count(&self) -> u32 {
        self.layout.instance_count()
    }

    #[inline]
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    fn check_index(&self, index: u32) -> RhiResult<()> {
        if index >= self.layout.instance_count() {
            return Err(RhiError::BufferError(format!(
                "'{}': index {} out of range ({} elements)",
                self.name,
                index,
                self.layout.instance_count()
            )));
        }
        Ok(())
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        // SAFETY: owners drop buffers only once the GPU no longer uses them
        // (after the frame fence or a device-wide wait).
        unsafe { self.device.handle().destroy_buffer(self.buffer, None) };
        if let Some(allocation) = self.allocation.take() {
            self.device.free_allocation(allocation);
        }
        debug!("Destroyed buffer '{}'", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_element_starts_at_alignment() {
        let layout = BufferLayout::new(64, 2, 256);
        assert_eq!(layout.alignment_size(), 256);
        assert_eq!(layout.index_offset(1), 256);
        assert_eq!(layout.buffer_size(), 512);
    }

    #[test]
    fn test_unaligned_layout_is_tightly_packed() {
        let layout = BufferLayout::new(64, 3, 1);
        assert_eq!(layout.index_offset(2), 128);
        assert_eq!(layout.buffer_size(), 192);
        assert_eq!(aligned_size(48, 0), 48);
    }

    #[test]
    fn test_aligned_size_rounds_up() {
        assert_eq!(aligned_size(1, 256), 256);
        assert_eq!(aligned_size(256, 256), 256);
        assert_eq!(aligned_size(257, 256), 512);
        assert_eq!(aligned_size(200, 64), 256);
    }

    #[test]
    fn test_write_at_aligned_offset_reads_back() {
        let layout = BufferLayout::new(64, 4, 256);
        let mut backing = vec![0u8; layout.buffer_size() as usize];
        let payload: Vec<u8> = (0..64).collect();

        for index in 0..4 {
            let offset = layout.index_offset(index);
            copy_into(&mut backing, &payload, offset).unwrap();
            let start = offset as usize;
            assert_eq!(&backing[start..start + 64], payload.as_slice());
        }
        // Padding between elements is untouched.
        assert!(backing[64..256].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_write_past_end_is_rejected() {
        let mut backing = vec![0u8; 128];
        let err = copy_into(&mut backing, &[1u8; 64], 100).unwrap_err();
        assert!(matches!(err, RhiError::BufferError(_)));
        assert!(backing.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_flush_range_rounds_to_atom() {
        // Allocation at 1024, 512 bytes; flush 10 bytes at 70 with 64-byte atoms.
        let (offset, size) = flush_range(1024, 512, 70, 10, 64);
        assert_eq!(offset, 1088);
        assert_eq!(size, 64);
        assert_eq!(offset % 64, 0);
    }

    #[test]
    fn test_flush_range_never_rounds_past_allocation() {
        // 300 bytes rounded to 256-byte atoms would end at 512.
        let (offset, size) = flush_range(0, 300, 0, vk::WHOLE_SIZE, 256);
        assert_eq!(offset, 0);
        assert_eq!(size, vk::WHOLE_SIZE);

        // Tail element of a suballocation that is not atom-aligned.
        let (offset, size) = flush_range(4096, 320, 256, 64, 256);
        assert_eq!((offset, size), (4352, vk::WHOLE_SIZE));

        let (offset, size) = flush_range(256, 256, 128, vk::WHOLE_SIZE, 1);
        assert_eq!((offset, size), (384, 128));
    }

    #[test]
    fn test_flush_range_inside_allocation_is_atom_multiple() {
        let (offset, size) = flush_range(0, 1024, 300, 100, 256);
        assert_eq!((offset, size), (256, 256));
        assert_eq!(size % 256, 0);
    }
}
