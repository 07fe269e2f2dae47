//! Descriptor set layouts, pools and validated writes.
//!
//! - [`DescriptorSetLayout`] is built from a [`BindingTable`] that refuses
//!   duplicate slots.
//! - [`DescriptorPool`] is a fixed-capacity allocator; running out of
//!   capacity is reported as [`RhiError::PoolExhausted`].
//! - [`DescriptorWriter`] stages buffer and image writes, checking each one
//!   against the layout's declared type and count for that slot, then either
//!   allocates a new set ([`DescriptorWriter::build`]) or re-targets an
//!   existing one ([`DescriptorWriter::overwrite`]).
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use kiln_rhi::descriptor::{DescriptorPool, DescriptorSetLayout, DescriptorWriter};
//! use kiln_rhi::device::Device;
//! use kiln_rhi::vk;
//!
//! # fn example(device: Arc<Device>, ubo: vk::DescriptorBufferInfo) -> kiln_rhi::RhiResult<()> {
//! let layout = DescriptorSetLayout::builder(device.clone())
//!     .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::ALL_GRAPHICS, 1)?
//!     .build()?;
//! let pool = DescriptorPool::builder(device)
//!     .max_sets(4)
//!     .add_pool_size(vk::DescriptorType::UNIFORM_BUFFER, 4)
//!     .build()?;
//! let set = DescriptorWriter::new(&layout, &pool)
//!     .write_buffer(0, ubo)?
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Default `maxSets` when a pool builder does not set one.
pub const DEFAULT_MAX_SETS: u32 = 1000;

/// Whether a descriptor type is written from buffer or image infos.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DescriptorClass {
    Buffer,
    Image,
}

impl DescriptorClass {
    pub fn of(ty: vk::DescriptorType) -> Option<Self> {
        match ty {
            vk::DescriptorType::UNIFORM_BUFFER
            | vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
            | vk::DescriptorType::STORAGE_BUFFER
            | vk::DescriptorType::STORAGE_BUFFER_DYNAMIC => Some(Self::Buffer),
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
            | vk::DescriptorType::SAMPLED_IMAGE
            | vk::DescriptorType::STORAGE_IMAGE
            | vk::DescriptorType::SAMPLER
            | vk::DescriptorType::INPUT_ATTACHMENT => Some(Self::Image),
            _ => None,
        }
    }
}

/// One declared binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BindingDecl {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub stage_flags: vk::ShaderStageFlags,
    pub count: u32,
}

/// The binding declarations of one set layout, keyed by slot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BindingTable {
    bindings: BTreeMap<u32, BindingDecl>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a slot. Reusing a slot is an error.
    pub fn add(&mut self, decl: BindingDecl) -> RhiResult<()> {
        if decl.count == 0 {
            return Err(RhiError::DescriptorError(format!(
                "binding {} declared with zero descriptors",
                decl.binding
            )));
        }
        if DescriptorClass::of(decl.descriptor_type).is_none() {
            return Err(RhiError::DescriptorError(format!(
                "binding {} uses unsupported type {:?}",
                decl.binding, decl.descriptor_type
            )));
        }
        if self.bindings.contains_key(&decl.binding) {
            return Err(RhiError::DescriptorError(format!(
                "binding {} already declared",
                decl.binding
            )));
        }
        self.bindings.insert(decl.binding, decl);
        Ok(())
    }

    pub fn get(&self, binding: u32) -> Option<&BindingDecl> {
        self.bindings.get(&binding)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BindingDecl> {
        self.bindings.values()
    }

    /// Checks that writing `count` descriptors of class `class` to `binding`
    /// matches the declaration exactly, and returns the declared type.
    pub fn validate_write(
        &self,
        binding: u32,
        class: DescriptorClass,
        count: usize,
    ) -> RhiResult<vk::DescriptorType> {
        let decl = self.get(binding).ok_or_else(|| {
            RhiError::DescriptorError(format!("binding {binding} is not declared in the layout"))
        })?;
        if DescriptorClass::of(decl.descriptor_type) != Some(class) {
            return Err(RhiError::DescriptorError(format!(
                "binding {} is {:?}; cannot write {:?} descriptors to it",
                binding, decl.descriptor_type, class
            )));
        }
        if decl.count as usize != count {
            return Err(RhiError::DescriptorError(format!(
                "binding {} expects {} descriptor(s), got {}",
                binding, decl.count, count
            )));
        }
        Ok(decl.descriptor_type)
    }
}

/// Descriptor set layout plus the table it was built from.
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
    table: BindingTable,
}

impl DescriptorSetLayout {
    pub fn builder(device: Arc<Device>) -> DescriptorSetLayoutBuilder {
        DescriptorSetLayoutBuilder {
            device,
            table: BindingTable::new(),
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    #[inline]
    pub fn bindings(&self) -> &BindingTable {
        &self.table
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        // SAFETY: pipelines and sets using this layout are dropped first.
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
        debug!("Destroyed descriptor set layout");
    }
}

/// Accumulates bindings for a [`DescriptorSetLayout`].
pub struct DescriptorSetLayoutBuilder {
    device: Arc<Device>,
    table: BindingTable,
}

impl DescriptorSetLayoutBuilder {
    /// Declares `count` descriptors of `descriptor_type` at `binding`.
    ///
    /// # Errors
    ///
    /// [`RhiError::DescriptorError`] if the slot is already declared.
    pub fn add_binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
        count: u32,
    ) -> RhiResult<Self> {
        self.table.add(BindingDecl {
            binding,
            descriptor_type,
            stage_flags,
            count,
        })?;
        Ok(self)
    }

    pub fn build(self) -> RhiResult<Arc<DescriptorSetLayout>> {
        let bindings: Vec<vk::DescriptorSetLayoutBinding> = self
            .table
            .iter()
            .map(|decl| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(decl.binding)
                    .descriptor_type(decl.descriptor_type)
                    .descriptor_count(decl.count)
                    .stage_flags(decl.stage_flags)
            })
            .collect();
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);

        // SAFETY: bindings outlive the call.
        let layout = unsafe {
            self.device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };
        debug!(
            "Created descriptor set layout with {} binding(s)",
            bindings.len()
        );

        Ok(Arc::new(DescriptorSetLayout {
            device: self.device,
            layout,
            table: self.table,
        }))
    }
}

/// Fixed-capacity descriptor set allocator.
///
/// The pool owns the memory of every set allocated from it and must outlive
/// them; dropping the pool frees them all.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
    max_sets: u32,
}

impl DescriptorPool {
    pub fn builder(device: Arc<Device>) -> DescriptorPoolBuilder {
        DescriptorPoolBuilder {
            device,
            pool_sizes: Vec::new(),
            max_sets: DEFAULT_MAX_SETS,
        }
    }

    /// Allocates one set with `layout`.
    ///
    /// # Errors
    ///
    /// [`RhiError::PoolExhausted`] when the pool's declared capacity is used
    /// up. The caller may create another pool.
    pub fn allocate(&self, layout: &DescriptorSetLayout) -> RhiResult<vk::DescriptorSet> {
        let layouts = [layout.handle()];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        // SAFETY: pool and layout belong to the same device.
        match unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info) } {
            Ok(sets) => Ok(sets[0]),
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL) => {
                warn!("Descriptor pool exhausted (max_sets = {})", self.max_sets);
                Err(RhiError::PoolExhausted)
            }
            Err(e) => Err(e.into()),
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    #[inline]
    pub(crate) fn device(&self) -> &Device {
        &self.device
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        // SAFETY: no set from this pool is in use once the owner drops it.
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
        debug!("Destroyed descriptor pool");
    }
}

/// Accumulates capacity declarations for a [`DescriptorPool`].
pub struct DescriptorPoolBuilder {
    device: Arc<Device>,
    pool_sizes: Vec<vk::DescriptorPoolSize>,
    max_sets: u32,
}

impl DescriptorPoolBuilder {
    pub fn add_pool_size(mut self, ty: vk::DescriptorType, count: u32) -> Self {
        self.pool_sizes.push(
            vk::DescriptorPoolSize::default()
                .ty(ty)
                .descriptor_count(count),
        );
        self
    }

    pub fn max_sets(mut self, max_sets: u32) -> Self {
        self.max_sets = max_sets;
        self
    }

    pub fn build(self) -> RhiResult<DescriptorPool> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(self.max_sets)
            .pool_sizes(&self.pool_sizes);
        // SAFETY: pool_sizes outlive the call.
        let pool = unsafe {
            self.device
                .handle()
                .create_descriptor_pool(&create_info, None)?
        };
        debug!(
            "Created descriptor pool: max_sets={}, {} pool size(s)",
            self.max_sets,
            self.pool_sizes.len()
        );
        Ok(DescriptorPool {
            device: self.device,
            pool,
            max_sets: self.max_sets,
        })
    }
}

#[derive(Clone, Debug)]
enum StagedInfos {
    Buffers(Vec<vk::DescriptorBufferInfo>),
    Images(Vec<vk::DescriptorImageInfo>),
}

#[derive(Clone, Debug)]
struct StagedWrite {
    binding: u32,
    descriptor_type: vk::DescriptorType,
    infos: StagedInfos,
}

/// Writes validated against a binding table, waiting to be applied.
#[derive(Clone, Debug, Default)]
pub struct StagedWrites {
    writes: Vec<StagedWrite>,
}

impl StagedWrites {
    /// Stages buffer descriptors for `binding`; nothing is staged on error.
    pub fn stage_buffers(
        &mut self,
        table: &BindingTable,
        binding: u32,
        infos: &[vk::DescriptorBufferInfo],
    ) -> RhiResult<()> {
        let descriptor_type = table.validate_write(binding, DescriptorClass::Buffer, infos.len())?;
        self.writes.push(StagedWrite {
            binding,
            descriptor_type,
            infos: StagedInfos::Buffers(infos.to_vec()),
        });
        Ok(())
    }

    /// Stages image descriptors for `binding`; nothing is staged on error.
    pub fn stage_images(
        &mut self,
        table: &BindingTable,
        binding: u32,
        infos: &[vk::DescriptorImageInfo],
    ) -> RhiResult<()> {
        let descriptor_type = table.validate_write(binding, DescriptorClass::Image, infos.len())?;
        self.writes.push(StagedWrite {
            binding,
            descriptor_type,
            infos: StagedInfos::Images(infos.to_vec()),
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Slots written, in staging order.
    pub fn bindings(&self) -> impl Iterator<Item = u32> + '_ {
        self.writes.iter().map(|write| write.binding)
    }

    fn to_vk(&self, set: vk::DescriptorSet) -> Vec<vk::WriteDescriptorSet<'_>> {
        self.writes
            .iter()
            .map(|staged| {
                let write = vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(staged.binding)
                    .dst_array_element(0)
                    .descriptor_type(staged.descriptor_type);
                match &staged.infos {
                    StagedInfos::Buffers(infos) => write.buffer_info(infos),
                    StagedInfos::Images(infos) => write.image_info(infos),
                }
            })
            .collect()
    }
}

/// Stages writes for one layout/pool pair.
pub struct DescriptorWriter<'a> {
    layout: &'a DescriptorSetLayout,
    pool: &'a DescriptorPool,
    staged: StagedWrites,
}

impl<'a> DescriptorWriter<'a> {
    pub fn new(layout: &'a DescriptorSetLayout, pool: &'a DescriptorPool) -> Self {
        Self {
            layout,
            pool,
            staged: StagedWrites::default(),
        }
    }

    /// Stages one buffer descriptor.
    ///
    /// # Errors
    ///
    /// [`RhiError::DescriptorError`] if `binding` is undeclared, is not a
    /// buffer binding, or declares more than one descriptor.
    pub fn write_buffer(mut self, binding: u32, info: vk::DescriptorBufferInfo) -> RhiResult<Self> {
        self.staged
            .stage_buffers(self.layout.bindings(), binding, &[info])?;
        Ok(self)
    }

    /// Stages one image descriptor.
    pub fn write_image(mut self, binding: u32, info: vk::DescriptorImageInfo) -> RhiResult<Self> {
        self.staged
            .stage_images(self.layout.bindings(), binding, &[info])?;
        Ok(self)
    }

    /// Stages an array of image descriptors; the length must equal the
    /// declared count.
    pub fn write_images(
        mut self,
        binding: u32,
        infos: &[vk::DescriptorImageInfo],
    ) -> RhiResult<Self> {
        self.staged
            .stage_images(self.layout.bindings(), binding, infos)?;
        Ok(self)
    }

    /// Allocates a set and applies every staged write to it.
    pub fn build(&self) -> RhiResult<vk::DescriptorSet> {
        let set = self.pool.allocate(self.layout)?;
        self.overwrite(set);
        Ok(set)
    }

    /// Applies the staged writes to an existing set.
    pub fn overwrite(&self, set: vk::DescriptorSet) {
        let writes = self.staged.to_vk(set);
        // SAFETY: every info was validated against the set's layout and the
        // set is not in use by a pending submission.
        unsafe { self.pool.device().handle().update_descriptor_sets(&writes, &[]) };
        debug!("Applied {} descriptor write(s)", writes.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl(binding: u32, descriptor_type: vk::DescriptorType, count: u32) -> BindingDecl {
        BindingDecl {
            binding,
            descriptor_type,
            stage_flags: vk::ShaderStageFlags::ALL_GRAPHICS,
            count,
        }
    }

    fn ubo_table() -> BindingTable {
        let mut table = BindingTable::new();
        table
            .add(decl(0, vk::DescriptorType::UNIFORM_BUFFER, 1))
            .unwrap();
        table
    }

    #[test]
    fn test_duplicate_slot_is_rejected() {
        let mut table = ubo_table();
        let err = table
            .add(decl(0, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1))
            .unwrap_err();
        assert!(matches!(err, RhiError::DescriptorError(_)));
        assert_eq!(
            table.get(0).unwrap().descriptor_type,
            vk::DescriptorType::UNIFORM_BUFFER
        );
    }

    #[test]
    fn test_image_write_to_uniform_slot_fails() {
        let table = ubo_table();
        let mut staged = StagedWrites::default();
        let err = staged
            .stage_images(&table, 0, &[vk::DescriptorImageInfo::default()])
            .unwrap_err();
        assert!(matches!(err, RhiError::DescriptorError(_)));
        assert!(staged.is_empty());
    }

    #[test]
    fn test_undeclared_slot_fails_without_touching_other_writes() {
        let table = ubo_table();
        let mut staged = StagedWrites::default();
        staged
            .stage_buffers(&table, 0, &[vk::DescriptorBufferInfo::default()])
            .unwrap();

        assert!(
            staged
                .stage_buffers(&table, 3, &[vk::DescriptorBufferInfo::default()])
                .is_err()
        );
        assert_eq!(staged.bindings().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_count_mismatch_fails() {
        let mut table = BindingTable::new();
        table
            .add(decl(1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 6))
            .unwrap();
        let mut staged = StagedWrites::default();

        let five = [vk::DescriptorImageInfo::default(); 5];
        assert!(staged.stage_images(&table, 1, &five).is_err());

        let six = [vk::DescriptorImageInfo::default(); 6];
        staged.stage_images(&table, 1, &six).unwrap();
        assert_eq!(staged.len(), 1);
    }

    #[test]
    fn test_dynamic_uniform_accepts_buffer_write() {
        let mut table = BindingTable::new();
        table
            .add(decl(0, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, 1))
            .unwrap();
        assert_eq!(
            table
                .validate_write(0, DescriptorClass::Buffer, 1)
                .unwrap(),
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
        );
    }

    #[test]
    fn test_zero_count_binding_is_rejected() {
        let mut table = BindingTable::new();
        assert!(
            table
                .add(decl(0, vk::DescriptorType::UNIFORM_BUFFER, 0))
                .is_err()
        );
        assert!(table.is_empty());
    }

    #[test]
    fn test_staged_writes_carry_declared_type() {
        let mut table = ubo_table();
        table
            .add(decl(2, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1))
            .unwrap();
        let mut staged = StagedWrites::default();
        staged
            .stage_buffers(&table, 0, &[vk::DescriptorBufferInfo::default()])
            .unwrap();
        staged
            .stage_images(&table, 2, &[vk::DescriptorImageInfo::default()])
            .unwrap();

        let writes = staged.to_vk(vk::DescriptorSet::null());
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(writes[0].descriptor_count, 1);
        assert_eq!(
            writes[1].descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
        assert_eq!(writes[1].dst_binding, 2);
    }
}
