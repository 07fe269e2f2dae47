//! Immutable GPU meshes and the arena that owns them.

use std::sync::Arc;

use ash::vk;
use kiln_resources::MeshData;
use kiln_rhi::RhiResult;
use kiln_rhi::buffer::GpuBuffer;
use kiln_rhi::command::CommandBuffer;
use kiln_rhi::device::Device;
use kiln_rhi::vertex::Vertex;
use kiln_scene::MeshHandle;
use tracing::debug;

/// Device-local vertex buffer plus an optional index buffer.
pub struct Mesh {
    name: String,
    vertex_buffer: GpuBuffer,
    index_buffer: Option<GpuBuffer>,
    vertex_count: u32,
    index_count: u32,
}

impl Mesh {
    /// Uploads `data` through staging buffers. Meshes without indices are
    /// drawn non-indexed.
    pub fn upload(device: Arc<Device>, name: &str, data: &MeshData) -> RhiResult<Self> {
        let vertex_buffer = GpuBuffer::device_local_with_data(
            device.clone(),
            name,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            std::mem::size_of::<Vertex>() as vk::DeviceSize,
            bytemuck::cast_slice(&data.vertices),
        )?;
        let index_buffer = if data.is_indexed() {
            Some(GpuBuffer::device_local_with_data(
                device,
                name,
                vk::BufferUsageFlags::INDEX_BUFFER,
                std::mem::size_of::<u32>() as vk::DeviceSize,
                bytemuck::cast_slice(&data.indices),
            )?)
        } else {
            None
        };

        debug!(
            "Uploaded mesh '{}': {} vertices, {} indices",
            name,
            data.vertex_count(),
            data.index_count()
        );
        Ok(Self {
            name: name.to_string(),
            vertex_buffer,
            index_buffer,
            vertex_count: data.vertex_count(),
            index_count: data.index_count(),
        })
    }

    pub fn bind(&self, cmd: &CommandBuffer) {
        cmd.bind_vertex_buffer(self.vertex_buffer.handle());
        if let Some(index_buffer) = &self.index_buffer {
            cmd.bind_index_buffer(index_buffer.handle(), vk::IndexType::UINT32);
        }
    }

    pub fn draw(&self, cmd: &CommandBuffer) {
        if self.index_buffer.is_some() {
            cmd.draw_indexed(self.index_count, 1);
        } else {
            cmd.draw(self.vertex_count, 1, 0, 0);
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    #[inline]
    pub fn is_indexed(&self) -> bool {
        self.index_buffer.is_some()
    }
}

/// Owns every mesh of a scene. Objects refer to meshes by [`MeshHandle`];
/// the arena outlives them all.
#[derive(Default)]
pub struct MeshArena {
    meshes: Vec<Mesh>,
}

impl MeshArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, mesh: Mesh) -> MeshHandle {
        let handle = MeshHandle::from_index(self.meshes.len());
        self.meshes.push(mesh);
        handle
    }

    /// Uploads `data` and stores the result.
    pub fn upload(&mut self, device: Arc<Device>, name: &str, data: &MeshData) -> RhiResult<MeshHandle> {
        Ok(self.insert(Mesh::upload(device, name, data)?))
    }

    pub fn get(&self, handle: MeshHandle) -> Option<&Mesh> {
        self.meshes.get(handle.index())
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}
