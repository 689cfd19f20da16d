// SPDX-License-Identifier: CEPL-1.0
//! Device buffers: memory-type selection, staging uploads, mapped uniforms.
use std::ptr::NonNull;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use tracing::debug;

use crate::command::{BufferSlice, CommandPool};
use crate::context::{DeviceHandle, GpuContext};
use crate::owned::Owned;

/// Per-frame transform block at set 0, binding 0.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct UniformBufferObject {
    pub model: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
}

impl Default for UniformBufferObject {
    fn default() -> Self {
        const IDENTITY: [[f32; 4]; 4] = [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        Self {
            model: IDENTITY,
            view: IDENTITY,
            proj: IDENTITY,
        }
    }
}

/// First memory type allowed by `type_bits` that has every flag in `required`.
pub fn find_memory_type(
    mem: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..mem.memory_type_count).find(|&i| {
        (type_bits & (1 << i)) != 0
            && mem.memory_types[i as usize].property_flags.contains(required)
    })
}

/// A buffer bound to its own allocation. Field order frees the buffer first.
pub struct GpuBuffer {
    buffer: Owned<vk::Buffer>,
    memory: Owned<vk::DeviceMemory>,
    size: vk::DeviceSize,
}

impl GpuBuffer {
    pub fn new(
        device: &Arc<DeviceHandle>,
        mem_props: &vk::PhysicalDeviceMemoryProperties,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        props: vk::MemoryPropertyFlags,
    ) -> Result<Self> {
        let info = vk::BufferCreateInfo {
            s_type: vk::StructureType::BUFFER_CREATE_INFO,
            size,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        let buffer = Owned::new(
            device,
            unsafe { device.create_buffer(&info, None) }.context("create_buffer")?,
        );
        let req = unsafe { device.get_buffer_memory_requirements(buffer.raw()) };
        let memory_type_index = find_memory_type(mem_props, req.memory_type_bits, props)
            .ok_or_else(|| anyhow!("no memory type with {props:?} (type bits {:#b})", req.memory_type_bits))?;
        let alloc = vk::MemoryAllocateInfo {
            s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
            allocation_size: req.size,
            memory_type_index,
            ..Default::default()
        };
        let memory = Owned::new(
            device,
            unsafe { device.allocate_memory(&alloc, None) }.context("allocate_memory")?,
        );
        unsafe { device.bind_buffer_memory(buffer.raw(), memory.raw(), 0) }
            .context("bind_buffer_memory")?;
        Ok(Self {
            buffer,
            memory,
            size,
        })
    }

    /// Host-visible, coherent buffer filled with `data`.
    pub fn host_visible_with<T: Pod>(
        device: &Arc<DeviceHandle>,
        mem_props: &vk::PhysicalDeviceMemoryProperties,
        usage: vk::BufferUsageFlags,
        data: &[T],
    ) -> Result<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let buf = Self::new(
            device,
            mem_props,
            bytes.len() as vk::DeviceSize,
            usage,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        unsafe {
            let ptr = device
                .map_memory(buf.memory.raw(), 0, buf.size, vk::MemoryMapFlags::empty())
                .context("map_memory")?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
            device.unmap_memory(buf.memory.raw());
        }
        Ok(buf)
    }

    /// Device-local buffer filled through a temporary staging buffer. Blocks
    /// until the copy has completed.
    pub fn device_local_with<T: Pod>(
        ctx: &GpuContext,
        pool: &CommandPool,
        usage: vk::BufferUsageFlags,
        data: &[T],
    ) -> Result<Self> {
        let device = ctx.device();
        let mem_props = ctx.memory_properties();
        let staging =
            Self::host_visible_with(device, &mem_props, vk::BufferUsageFlags::TRANSFER_SRC, data)?;
        let dst = Self::new(
            device,
            &mem_props,
            staging.size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size: staging.size,
        };
        pool.one_shot(|d, cmd| unsafe {
            d.cmd_copy_buffer(cmd, staging.raw(), dst.raw(), std::slice::from_ref(&region));
        })?;
        debug!("vk: uploaded {} bytes via staging", staging.size);
        Ok(dst)
    }

    #[inline]
    pub fn raw(&self) -> vk::Buffer {
        self.buffer.raw()
    }

    pub fn memory(&self) -> vk::DeviceMemory {
        self.memory.raw()
    }

    pub fn slice(&self, count: u32) -> BufferSlice {
        BufferSlice {
            buffer: self.raw(),
            count,
        }
    }
}

/// Vertex buffer plus optional 16-bit index buffer, both device local.
pub struct Mesh {
    vertices: GpuBuffer,
    indices: Option<GpuBuffer>,
    vertex_count: u32,
    index_count: u32,
}

impl Mesh {
    pub fn upload<V: Pod>(
        ctx: &GpuContext,
        pool: &CommandPool,
        vertices: &[V],
        indices: Option<&[u16]>,
    ) -> Result<Self> {
        let vbuf = GpuBuffer::device_local_with(ctx, pool, vk::BufferUsageFlags::VERTEX_BUFFER, vertices)?;
        let ibuf = indices
            .map(|idx| GpuBuffer::device_local_with(ctx, pool, vk::BufferUsageFlags::INDEX_BUFFER, idx))
            .transpose()?;
        Ok(Self {
            vertices: vbuf,
            indices: ibuf,
            vertex_count: vertices.len() as u32,
            index_count: indices.map_or(0, |i| i.len() as u32),
        })
    }

    pub fn vertex_slice(&self) -> BufferSlice {
        self.vertices.slice(self.vertex_count)
    }

    pub fn index_slice(&self) -> Option<BufferSlice> {
        self.indices.as_ref().map(|b| b.slice(self.index_count))
    }
}

/// One persistently mapped uniform buffer per frame slot.
pub struct UniformBuffers<T: Pod, const N: usize> {
    mapped: [NonNull<T>; N],
    buffers: Vec<GpuBuffer>,
}

impl<T: Pod, const N: usize> UniformBuffers<T, N> {
    pub fn new(device: &Arc<DeviceHandle>, mem_props: &vk::PhysicalDeviceMemoryProperties) -> Result<Self> {
        let size = std::mem::size_of::<T>() as vk::DeviceSize;
        let mut buffers = Vec::with_capacity(N);
        let mut mapped = Vec::with_capacity(N);
        for _ in 0..N {
            let buf = GpuBuffer::new(
                device,
                mem_props,
                size,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            )?;
            let ptr = unsafe { device.map_memory(buf.memory(), 0, size, vk::MemoryMapFlags::empty()) }
                .context("map_memory")?;
            mapped.push(NonNull::new(ptr.cast::<T>()).ok_or_else(|| anyhow!("map_memory returned null"))?);
            buffers.push(buf);
        }
        let mapped = mapped
            .try_into()
            .map_err(|_| anyhow!("uniform buffer count mismatch"))?;
        Ok(Self { mapped, buffers })
    }

    /// Overwrites the slot's block. The slot's fence must have been waited on.
    pub fn write(&mut self, slot: usize, value: &T) {
        unsafe { self.mapped[slot].as_ptr().write_unaligned(*value) };
    }

    pub fn buffer(&self, slot: usize) -> vk::Buffer {
        self.buffers[slot].raw()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut mem = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (i, &f) in flags.iter().enumerate() {
            mem.memory_types[i].property_flags = f;
        }
        mem
    }

    const HOST: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
        vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
    );

    #[test]
    fn picks_first_matching_type() {
        let mem = props(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            HOST,
            HOST | vk::MemoryPropertyFlags::HOST_CACHED,
        ]);
        assert_eq!(find_memory_type(&mem, 0b111, HOST), Some(1));
        assert_eq!(find_memory_type(&mem, 0b100, HOST), Some(2));
    }

    #[test]
    fn respects_type_bits() {
        let mem = props(&[vk::MemoryPropertyFlags::DEVICE_LOCAL, HOST]);
        assert_eq!(find_memory_type(&mem, 0b01, HOST), None);
        assert_eq!(
            find_memory_type(&mem, 0b01, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            Some(0)
        );
    }

    #[test]
    fn no_match_is_none_not_panic() {
        let mem = props(&[]);
        assert_eq!(find_memory_type(&mem, u32::MAX, HOST), None);
    }

    #[test]
    fn ubo_is_three_mat4() {
        assert_eq!(std::mem::size_of::<UniformBufferObject>(), 3 * 64);
        let ubo = UniformBufferObject::default();
        assert_eq!(ubo.model[3][3], 1.0);
    }
}
