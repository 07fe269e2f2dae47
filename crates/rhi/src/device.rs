//! Vulkan logical device, memory allocation and one-shot command submission.
//!
//! [`Device`] is the leaf of the GPU layer. Every buffer and image elsewhere
//! in the engine gets its memory through [`Device::create_buffer`] or
//! [`Device::create_image`], and every staging copy or layout transition that
//! happens outside the frame loop goes through a [`OneShotCommands`] guard,
//! which is submitted and waited on synchronously.
//!
//! # Example
//!
//! ```no_run
//! use kiln_rhi::device::Device;
//! use kiln_rhi::vk;
//!
//! # fn example(device: &Device, staging: vk::Buffer, image: vk::Image) -> kiln_rhi::RhiResult<()> {
//! device.transition_image_layout(
//!     image,
//!     vk::Format::R8G8B8A8_SRGB,
//!     vk::ImageLayout::UNDEFINED,
//!     vk::ImageLayout::TRANSFER_DST_OPTIMAL,
//!     1,
//! )?;
//! device.copy_buffer_to_image(staging, image, 256, 256, 1)?;
//! # Ok(())
//! # }
//! ```

use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use tracing::{debug, error, info};

use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::physical_device::{PhysicalDeviceInfo, QueueFamilyIndices};

const DEVICE_EXTENSIONS: &[&std::ffi::CStr] = &[ash::khr::swapchain::NAME];

/// Depth formats tried in order of preference.
const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Vulkan logical device wrapper.
///
/// Shared as `Arc<Device>` by every RAII wrapper in the crate. The allocator
/// and the one-shot command pool sit behind mutexes so the device can be
/// `Send + Sync`; the renderer itself only ever touches them from one thread.
pub struct Device {
    device: ash::Device,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    anisotropy_enabled: bool,
    /// Dropped explicitly before `vkDestroyDevice`.
    allocator: ManuallyDrop<Mutex<Allocator>>,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    queue_families: QueueFamilyIndices,
    one_shot_pool: Mutex<vk::CommandPool>,
}

impl Device {
    /// Creates the logical device, its queues, the allocator and the
    /// one-shot command pool.
    ///
    /// # Errors
    ///
    /// Any failure here is fatal: there is no fallback device.
    pub fn new(instance: &Instance, info: &PhysicalDeviceInfo) -> RhiResult<Arc<Self>> {
        let queue_families = info.queue_families;
        let (Some(graphics_family), Some(present_family)) =
            (queue_families.graphics_family, queue_families.present_family)
        else {
            return Err(RhiError::NoSuitableGpu);
        };

        let priorities = [1.0f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = queue_families
            .unique_families()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
            })
            .collect();

        let anisotropy_enabled = info.features.sampler_anisotropy == vk::TRUE;
        let features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(anisotropy_enabled);
        let extension_names: Vec<*const std::ffi::c_char> =
            DEVICE_EXTENSIONS.iter().map(|ext| ext.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features);

        // SAFETY: info.device was enumerated from this instance and every
        // pointer in create_info outlives the call.
        let device = unsafe {
            instance
                .handle()
                .create_device(info.device, &create_info, None)?
        };
        info!("Logical device created on '{}'", info.device_name());

        // SAFETY: both families were requested in queue_infos.
        let (graphics_queue, present_queue) = unsafe {
            (
                device.get_device_queue(graphics_family, 0),
                device.get_device_queue(present_family, 0),
            )
        };

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: info.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(graphics_family)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);
        // SAFETY: device was created above.
        let one_shot_pool = unsafe { device.create_command_pool(&pool_info, None)? };

        // SAFETY: plain property query.
        let memory_properties = unsafe {
            instance
                .handle()
                .get_physical_device_memory_properties(info.device)
        };

        debug!(
            "Device ready: graphics family {}, present family {}, anisotropy {}",
            graphics_family, present_family, anisotropy_enabled
        );

        Ok(Arc::new(Self {
            device,
            instance: instance.handle().clone(),
            physical_device: info.device,
            properties: info.properties,
            memory_properties,
            anisotropy_enabled,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            graphics_queue,
            present_queue,
            queue_families,
            one_shot_pool: Mutex::new(one_shot_pool),
        }))
    }

    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    #[inline]
    pub fn queue_families(&self) -> &QueueFamilyIndices {
        &self.queue_families
    }

    #[inline]
    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    /// Alignment required between dynamic uniform-buffer offsets.
    #[inline]
    pub fn min_uniform_buffer_offset_alignment(&self) -> vk::DeviceSize {
        self.properties.limits.min_uniform_buffer_offset_alignment
    }

    /// Granularity of flush ranges on non-coherent memory.
    #[inline]
    pub fn non_coherent_atom_size(&self) -> vk::DeviceSize {
        self.properties.limits.non_coherent_atom_size
    }

    /// Maximum sampler anisotropy, or `None` when the feature is disabled.
    pub fn max_sampler_anisotropy(&self) -> Option<f32> {
        self.anisotropy_enabled
            .then_some(self.properties.limits.max_sampler_anisotropy)
    }

    /// Locks the allocator. A poisoned lock is recovered since the allocator
    /// state itself stays consistent across a panicking caller.
    pub fn allocator(&self) -> MutexGuard<'_, Allocator> {
        self.allocator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until every queue is idle.
    pub fn wait_idle(&self) -> RhiResult<()> {
        // SAFETY: the device is alive for &self.
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    // ===== Memory =====

    /// Creates a buffer and binds freshly allocated memory to it.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::NoSuitableMemoryType`] when no memory type matches
    /// `location`, or the underlying Vulkan/allocator error.
    pub fn create_buffer(
        &self,
        info: &vk::BufferCreateInfo<'_>,
        location: MemoryLocation,
        name: &str,
    ) -> RhiResult<(vk::Buffer, Allocation)> {
        // SAFETY: info is a valid create info supplied by the caller.
        let buffer = unsafe { self.device.create_buffer(info, None)? };
        // SAFETY: buffer was just created on this device.
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let allocation = self
            .allocate(requirements, location, true, name)
            .inspect_err(|_| {
                // SAFETY: no memory is bound yet.
                unsafe { self.device.destroy_buffer(buffer, None) };
            })?;

        // SAFETY: allocation satisfies requirements and is not bound elsewhere.
        unsafe {
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())?;
        }
        Ok((buffer, allocation))
    }

    /// Creates an image and binds freshly allocated memory to it.
    pub fn create_image(
        &self,
        info: &vk::ImageCreateInfo<'_>,
        location: MemoryLocation,
        name: &str,
    ) -> RhiResult<(vk::Image, Allocation)> {
        // SAFETY: info is a valid create info supplied by the caller.
        let image = unsafe { self.device.create_image(info, None)? };
        // SAFETY: image was just created on this device.
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let linear = info.tiling == vk::ImageTiling::LINEAR;
        let allocation = self
            .allocate(requirements, location, linear, name)
            .inspect_err(|_| {
                // SAFETY: no memory is bound yet.
                unsafe { self.device.destroy_image(image, None) };
            })?;

        // SAFETY: allocation satisfies requirements and is not bound elsewhere.
        unsafe {
            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())?;
        }
        Ok((image, allocation))
    }

    /// Returns memory obtained from [`Device::create_buffer`] or
    /// [`Device::create_image`] to the allocator.
    pub fn free_allocation(&self, allocation: Allocation) {
        if let Err(e) = self.allocator().free(allocation) {
            error!("Failed to free allocation: {:?}", e);
        }
    }

    fn allocate(
        &self,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
        name: &str,
    ) -> RhiResult<Allocation> {
        let required = required_memory_properties(location);
        if find_memory_type(&self.memory_properties, requirements.memory_type_bits, required)
            .is_none()
        {
            return Err(RhiError::NoSuitableMemoryType(format!(
                "'{}' needs {:?} within type bits {:#b}",
                name, required, requirements.memory_type_bits
            )));
        }

        let allocation = self.allocator().allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;
        Ok(allocation)
    }

    /// Creates a view over `layer_count` layers of `image`.
    pub fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
        view_type: vk::ImageViewType,
        layer_count: u32,
    ) -> RhiResult<vk::ImageView> {
        let info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(view_type)
            .format(format)
            .subresource_range(subresource_range(aspect, layer_count));
        // SAFETY: image belongs to this device.
        Ok(unsafe { self.device.create_image_view(&info, None)? })
    }

    // ===== Format queries =====

    /// First candidate whose `tiling` features include `features`.
    ///
    /// # Errors
    ///
    /// [`RhiError::UnsupportedFormat`] if no candidate qualifies.
    pub fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> RhiResult<vk::Format> {
        candidates
            .iter()
            .copied()
            .find(|&format| {
                // SAFETY: plain property query.
                let props = unsafe {
                    self.instance
                        .get_physical_device_format_properties(self.physical_device, format)
                };
                let supported = match tiling {
                    vk::ImageTiling::LINEAR => props.linear_tiling_features,
                    _ => props.optimal_tiling_features,
                };
                supported.contains(features)
            })
            .ok_or_else(|| RhiError::UnsupportedFormat(candidates.to_vec()))
    }

    pub fn find_depth_format(&self) -> RhiResult<vk::Format> {
        self.find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        )
    }

    // ===== One-shot commands =====

    /// Allocates and begins a one-shot command buffer.
    ///
    /// The returned guard holds the pool lock until it is submitted or
    /// dropped. Dropping without [`OneShotCommands::submit`] discards the
    /// recorded commands.
    pub fn begin_single_time_commands(&self) -> RhiResult<OneShotCommands<'_>> {
        let pool = self
            .one_shot_pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(*pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        // SAFETY: pool belongs to this device and is locked.
        let command_buffer = unsafe { self.device.allocate_command_buffers(&alloc_info)?[0] };

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        // SAFETY: freshly allocated buffer in the initial state.
        if let Err(e) = unsafe { self.device.begin_command_buffer(command_buffer, &begin_info) } {
            // SAFETY: never submitted.
            unsafe { self.device.free_command_buffers(*pool, &[command_buffer]) };
            return Err(e.into());
        }

        Ok(OneShotCommands {
            device: self,
            pool,
            command_buffer: Some(command_buffer),
        })
    }

    /// Records `record` into a one-shot command buffer, then submits and
    /// waits for it.
    pub fn execute_one_shot<F>(&self, record: F) -> RhiResult<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer),
    {
        let commands = self.begin_single_time_commands()?;
        record(&self.device, commands.handle());
        commands.submit()
    }

    /// Copies `size` bytes from the start of `src` to the start of `dst`.
    pub fn copy_buffer(
        &self,
        src: vk::Buffer,
        dst: vk::Buffer,
        size: vk::DeviceSize,
    ) -> RhiResult<()> {
        self.execute_one_shot(|device, cmd| {
            let region = vk::BufferCopy::default().size(size);
            // SAFETY: cmd is recording; both buffers are live.
            unsafe { device.cmd_copy_buffer(cmd, src, dst, &[region]) };
        })
    }

    /// Copies tightly packed texels into `layer_count` layers of `image`,
    /// which must be in `TRANSFER_DST_OPTIMAL`.
    pub fn copy_buffer_to_image(
        &self,
        buffer: vk::Buffer,
        image: vk::Image,
        width: u32,
        height: u32,
        layer_count: u32,
    ) -> RhiResult<()> {
        self.execute_one_shot(|device, cmd| {
            let region = vk::BufferImageCopy::default()
                .image_subresource(
                    vk::ImageSubresourceLayers::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .layer_count(layer_count),
                )
                .image_extent(vk::Extent3D {
                    width,
                    height,
                    depth: 1,
                });
            // SAFETY: cmd is recording; image is in TRANSFER_DST_OPTIMAL.
            unsafe {
                device.cmd_copy_buffer_to_image(
                    cmd,
                    buffer,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                )
            };
        })
    }

    /// Transitions every mip 0 layer of `image` from `old` to `new` and waits.
    ///
    /// # Errors
    ///
    /// [`RhiError::UnsupportedTransition`] for layout pairs outside the
    /// table in [`transition_masks`].
    pub fn transition_image_layout(
        &self,
        image: vk::Image,
        format: vk::Format,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
        layer_count: u32,
    ) -> RhiResult<()> {
        let masks = transition_masks(old, new)?;
        self.execute_one_shot(|device, cmd| {
            record_layout_barrier(device, cmd, image, format, old, new, layer_count, masks);
        })
    }
}

/// Records an image layout barrier.
#[allow(clippy::too_many_arguments)]
fn record_layout_barrier(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    format: vk::Format,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
    layer_count: u32,
    masks: TransitionMasks,
) {
    let aspect = if new == vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL {
        depth_aspect(format)
    } else {
        vk::ImageAspectFlags::COLOR
    };
    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old)
        .new_layout(new)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(subresource_range(aspect, layer_count))
        .src_access_mask(masks.src_access)
        .dst_access_mask(masks.dst_access);
    // SAFETY: cmd is in the recording state.
    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            masks.src_stage,
            masks.dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        // SAFETY: every resource created from this device has been dropped
        // (they hold Arc<Device>), so only the pool and allocator remain.
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                error!("Failed to wait for device idle during drop: {:?}", e);
            }
            let pool = *self
                .one_shot_pool
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner);
            self.device.destroy_command_pool(pool, None);
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("physical_device", &self.physical_device)
            .field("queue_families", &self.queue_families)
            .finish_non_exhaustive()
    }
}

/// Scoped one-shot command buffer.
///
/// Obtained from [`Device::begin_single_time_commands`]; [`submit`](Self::submit)
/// ends recording, submits to the graphics queue and blocks until the queue
/// is idle.
pub struct OneShotCommands<'a> {
    device: &'a Device,
    pool: MutexGuard<'a, vk::CommandPool>,
    command_buffer: Option<vk::CommandBuffer>,
}

impl OneShotCommands<'_> {
    /// The command buffer being recorded.
    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.command_buffer.unwrap_or_default()
    }

    /// Ends, submits and waits. The command buffer is freed either way.
    pub fn submit(mut self) -> RhiResult<()> {
        let Some(cmd) = self.command_buffer.take() else {
            return Ok(());
        };
        let device = &self.device.device;
        let result = (|| -> RhiResult<()> {
            // SAFETY: cmd is recording and owned by this guard.
            unsafe {
                device.end_command_buffer(cmd)?;
                let buffers = [cmd];
                let submit = vk::SubmitInfo::default().command_buffers(&buffers);
                device.queue_submit(self.device.graphics_queue, &[submit], vk::Fence::null())?;
                device.queue_wait_idle(self.device.graphics_queue)?;
            }
            Ok(())
        })();
        // SAFETY: the queue is idle (or the submit never happened).
        unsafe { device.free_command_buffers(*self.pool, &[cmd]) };
        result
    }
}

impl Drop for OneShotCommands<'_> {
    fn drop(&mut self) {
        if let Some(cmd) = self.command_buffer.take() {
            debug!("Discarding unsubmitted one-shot command buffer");
            // SAFETY: never submitted, so not in use by the GPU.
            unsafe { self.device.device.free_command_buffers(*self.pool, &[cmd]) };
        }
    }
}

// ===== Pure helpers =====

/// Access and stage masks for one layout transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionMasks {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// Barrier masks for the transitions the engine performs outside render
/// passes.
pub fn transition_masks(
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> RhiResult<TransitionMasks> {
    use vk::{AccessFlags as A, ImageLayout as L, PipelineStageFlags as S};

    let (src_access, dst_access, src_stage, dst_stage) = match (old, new) {
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => {
            (A::empty(), A::TRANSFER_WRITE, S::TOP_OF_PIPE, S::TRANSFER)
        }
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => (
            A::TRANSFER_WRITE,
            A::SHADER_READ,
            S::TRANSFER,
            S::FRAGMENT_SHADER,
        ),
        (L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => (
            A::empty(),
            A::DEPTH_STENCIL_ATTACHMENT_READ | A::DEPTH_STENCIL_ATTACHMENT_WRITE,
            S::TOP_OF_PIPE,
            S::EARLY_FRAGMENT_TESTS,
        ),
        (L::UNDEFINED, L::COLOR_ATTACHMENT_OPTIMAL) => (
            A::empty(),
            A::COLOR_ATTACHMENT_WRITE,
            S::TOP_OF_PIPE,
            S::COLOR_ATTACHMENT_OUTPUT,
        ),
        (L::COLOR_ATTACHMENT_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => (
            A::COLOR_ATTACHMENT_WRITE,
            A::SHADER_READ,
            S::COLOR_ATTACHMENT_OUTPUT,
            S::FRAGMENT_SHADER,
        ),
        _ => return Err(RhiError::UnsupportedTransition { old, new }),
    };

    Ok(TransitionMasks {
        src_access,
        dst_access,
        src_stage,
        dst_stage,
    })
}

/// Depth aspect, plus stencil for combined formats.
pub fn depth_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    if has_stencil_component(format) {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else {
        vk::ImageAspectFlags::DEPTH
    }
}

pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D16_UNORM_S8_UINT
    )
}

fn subresource_range(aspect: vk::ImageAspectFlags, layer_count: u32) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(aspect)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(layer_count)
}

/// Property flags a memory type must carry to serve `location`.
pub fn required_memory_properties(location: MemoryLocation) -> vk::MemoryPropertyFlags {
    match location {
        MemoryLocation::GpuOnly => vk::MemoryPropertyFlags::DEVICE_LOCAL,
        MemoryLocation::CpuToGpu | MemoryLocation::GpuToCpu => {
            vk::MemoryPropertyFlags::HOST_VISIBLE
        }
        _ => vk::MemoryPropertyFlags::empty(),
    }
}

/// Index of the first memory type allowed by `type_bits` that carries every
/// flag in `required`.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Option<u32> {
    memory_properties
        .memory_types
        .iter()
        .take(memory_properties.memory_type_count as usize)
        .enumerate()
        .find(|(i, memory_type)| {
            type_bits & (1 << i) != 0 && memory_type.property_flags.contains(required)
        })
        .map(|(i, _)| i as u32)
}

// SAFETY: ash handles are plain integers; the allocator and pool are behind
// mutexes.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (slot, flags) in props.memory_types.iter_mut().zip(types) {
            slot.property_flags = *flags;
        }
        props
    }

    #[test]
    fn test_device_extensions_defined() {
        assert_eq!(DEVICE_EXTENSIONS, &[ash::khr::swapchain::NAME]);
    }

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }

    #[test]
    fn test_find_memory_type_respects_type_bits() {
        use vk::MemoryPropertyFlags as M;
        let props = memory_properties(&[
            M::DEVICE_LOCAL,
            M::HOST_VISIBLE | M::HOST_COHERENT,
            M::HOST_VISIBLE | M::HOST_CACHED,
        ]);

        assert_eq!(find_memory_type(&props, 0b111, M::HOST_VISIBLE), Some(1));
        assert_eq!(find_memory_type(&props, 0b100, M::HOST_VISIBLE), Some(2));
        assert_eq!(find_memory_type(&props, 0b111, M::DEVICE_LOCAL), Some(0));
    }

    #[test]
    fn test_find_memory_type_reports_no_match() {
        use vk::MemoryPropertyFlags as M;
        let props = memory_properties(&[M::DEVICE_LOCAL]);
        assert_eq!(find_memory_type(&props, 0b1, M::HOST_VISIBLE), None);
        // Types beyond memory_type_count are ignored.
        assert_eq!(find_memory_type(&props, 0b10, M::empty()), None);
    }

    #[test]
    fn test_required_properties_by_location() {
        assert_eq!(
            required_memory_properties(MemoryLocation::GpuOnly),
            vk::MemoryPropertyFlags::DEVICE_LOCAL
        );
        assert_eq!(
            required_memory_properties(MemoryLocation::CpuToGpu),
            vk::MemoryPropertyFlags::HOST_VISIBLE
        );
    }

    #[test]
    fn test_upload_transitions() {
        let to_dst = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();
        assert_eq!(to_dst.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(to_dst.dst_access, vk::AccessFlags::TRANSFER_WRITE);

        let to_read = transition_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(to_read.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(to_read.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn test_depth_transition_targets_early_fragment_tests() {
        let masks = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        )
        .unwrap();
        assert_eq!(masks.dst_stage, vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS);
    }

    #[test]
    fn test_unknown_transition_is_rejected() {
        let err = transition_masks(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        )
        .unwrap_err();
        assert!(matches!(err, RhiError::UnsupportedTransition { .. }));
    }

    #[test]
    fn test_depth_aspect_includes_stencil_when_present() {
        assert_eq!(
            depth_aspect(vk::Format::D32_SFLOAT),
            vk::ImageAspectFlags::DEPTH
        );
        assert!(
            depth_aspect(vk::Format::D24_UNORM_S8_UINT).contains(vk::ImageAspectFlags::STENCIL)
        );
    }
}
