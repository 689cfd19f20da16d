// SPDX-License-Identifier: CEPL-1.0
//! Command pool, per-frame recording and draw encoding.
use std::sync::Arc;

use ash::vk;
use vesuv_render::MAX_FRAMES_IN_FLIGHT;

use crate::context::DeviceHandle;
use crate::error::{RenderError, Result};
use crate::owned::Owned;

/// A buffer plus how many elements of it to draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferSlice {
    pub buffer: vk::Buffer,
    pub count: u32,
}

/// Descriptor set bound for a draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DescriptorBinding {
    Shared(vk::DescriptorSet),
    /// One set per frame slot, so host writes never race the GPU.
    PerFrame([vk::DescriptorSet; MAX_FRAMES_IN_FLIGHT]),
}

impl DescriptorBinding {
    pub fn for_slot(&self, slot: usize) -> vk::DescriptorSet {
        match self {
            Self::Shared(set) => *set,
            Self::PerFrame(sets) => sets[slot % MAX_FRAMES_IN_FLIGHT],
        }
    }
}

/// One mesh to draw. Without indices the vertex count is used directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawItem {
    pub vertices: BufferSlice,
    pub indices: Option<BufferSlice>,
    pub descriptors: Option<DescriptorBinding>,
}

impl DrawItem {
    pub fn new(vertices: BufferSlice) -> Self {
        Self {
            vertices,
            indices: None,
            descriptors: None,
        }
    }

    pub fn indexed(mut self, indices: BufferSlice) -> Self {
        self.indices = Some(indices);
        self
    }

    pub fn with_descriptors(mut self, descriptors: DescriptorBinding) -> Self {
        self.descriptors = Some(descriptors);
        self
    }
}

/// Pipeline and the layout its descriptor sets bind against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineRef {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

/// The subset of `vkCmd*` the draw encoder emits.
pub trait CommandSink {
    fn bind_pipeline(&mut self, pipeline: vk::Pipeline);
    fn set_viewport_scissor(&mut self, extent: vk::Extent2D);
    fn bind_vertex_buffer(&mut self, buffer: vk::Buffer);
    fn bind_descriptor_set(&mut self, layout: vk::PipelineLayout, set: vk::DescriptorSet);
    fn bind_index_buffer(&mut self, buffer: vk::Buffer);
    fn draw(&mut self, vertex_count: u32);
    fn draw_indexed(&mut self, index_count: u32);
}

/// Binds the pipeline once, sets the full-extent viewport and scissor, then
/// emits each draw in order.
pub fn encode_draws<S: CommandSink + ?Sized>(
    sink: &mut S,
    pipeline: &PipelineRef,
    extent: vk::Extent2D,
    draws: &[DrawItem],
    slot: usize,
) {
    sink.bind_pipeline(pipeline.pipeline);
    sink.set_viewport_scissor(extent);
    for draw in draws {
        sink.bind_vertex_buffer(draw.vertices.buffer);
        if let Some(descriptors) = &draw.descriptors {
            sink.bind_descriptor_set(pipeline.layout, descriptors.for_slot(slot));
        }
        match draw.indices {
            Some(indices) => {
                sink.bind_index_buffer(indices.buffer);
                sink.draw_indexed(indices.count);
            }
            None => sink.draw(draw.vertices.count),
        }
    }
}

/// Writes straight into a command buffer in the recording state.
pub struct VkCommandSink<'a> {
    device: &'a ash::Device,
    cmd: vk::CommandBuffer,
}

impl<'a> VkCommandSink<'a> {
    pub fn new(device: &'a ash::Device, cmd: vk::CommandBuffer) -> Self {
        Self { device, cmd }
    }
}

impl CommandSink for VkCommandSink<'_> {
    fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .cmd_bind_pipeline(self.cmd, vk::PipelineBindPoint::GRAPHICS, pipeline)
        };
    }

    fn set_viewport_scissor(&mut self, extent: vk::Extent2D) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        unsafe {
            self.device.cmd_set_viewport(self.cmd, 0, &[viewport]);
            self.device.cmd_set_scissor(self.cmd, 0, &[scissor]);
        }
    }

    fn bind_vertex_buffer(&mut self, buffer: vk::Buffer) {
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(self.cmd, 0, &[buffer], &[0])
        };
    }

    fn bind_descriptor_set(&mut self, layout: vk::PipelineLayout, set: vk::DescriptorSet) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.cmd,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                &[set],
                &[],
            )
        };
    }

    fn bind_index_buffer(&mut self, buffer: vk::Buffer) {
        unsafe {
            self.device
                .cmd_bind_index_buffer(self.cmd, buffer, 0, vk::IndexType::UINT16)
        };
    }

    fn draw(&mut self, vertex_count: u32) {
        unsafe { self.device.cmd_draw(self.cmd, vertex_count, 1, 0, 0) };
    }

    fn draw_indexed(&mut self, index_count: u32) {
        unsafe {
            self.device
                .cmd_draw_indexed(self.cmd, index_count, 1, 0, 0, 0)
        };
    }
}

/// Everything needed to record one frame's command buffer.
pub struct FrameRecording<'a> {
    pub cmd: vk::CommandBuffer,
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub pipeline: &'a PipelineRef,
    pub draws: &'a [DrawItem],
    pub slot: usize,
}

/// Resets and re-records `rec.cmd`: one render pass clearing to opaque black
/// over the whole framebuffer, then the draws.
pub fn record_frame(device: &ash::Device, rec: &FrameRecording<'_>) -> Result<()> {
    unsafe {
        device
            .reset_command_buffer(rec.cmd, vk::CommandBufferResetFlags::empty())
            .map_err(RenderError::record("reset_command_buffer"))?;

        let begin = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            ..Default::default()
        };
        device
            .begin_command_buffer(rec.cmd, &begin)
            .map_err(RenderError::record("begin_command_buffer"))?;

        let clear = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [0.0, 0.0, 0.0, 1.0],
            },
        }];
        let rp_begin = vk::RenderPassBeginInfo {
            s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
            render_pass: rec.render_pass,
            framebuffer: rec.framebuffer,
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: rec.extent,
            },
            clear_value_count: clear.len() as u32,
            p_clear_values: clear.as_ptr(),
            ..Default::default()
        };
        device.cmd_begin_render_pass(rec.cmd, &rp_begin, vk::SubpassContents::INLINE);

        let mut sink = VkCommandSink::new(device, rec.cmd);
        encode_draws(&mut sink, rec.pipeline, rec.extent, rec.draws, rec.slot);

        device.cmd_end_render_pass(rec.cmd);
        device
            .end_command_buffer(rec.cmd)
            .map_err(RenderError::record("end_command_buffer"))
    }
}

/// Graphics-queue command pool whose buffers can be reset individually.
pub struct CommandPool {
    pool: Owned<vk::CommandPool>,
    queue: vk::Queue,
}

impl CommandPool {
    pub fn new(device: &Arc<DeviceHandle>, family: u32, queue: vk::Queue) -> Result<Self> {
        let info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            queue_family_index: family,
            ..Default::default()
        };
        let pool = unsafe { device.create_command_pool(&info, None) }
            .map_err(RenderError::device("create_command_pool"))?;
        Ok(Self {
            pool: Owned::new(device, pool),
            queue,
        })
    }

    pub fn raw(&self) -> vk::CommandPool {
        self.pool.raw()
    }

    /// One primary command buffer per frame slot. Freed with the pool.
    pub fn allocate<const N: usize>(&self) -> Result<[vk::CommandBuffer; N]> {
        let info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: self.pool.raw(),
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: N as u32,
            ..Default::default()
        };
        let bufs = unsafe { self.pool.device().allocate_command_buffers(&info) }
            .map_err(RenderError::device("allocate_command_buffers"))?;
        bufs.try_into()
            .map_err(|_| RenderError::Unsupported("command buffer count"))
    }

    /// Records with `f` into a throwaway buffer, submits it and waits for the
    /// queue to drain. For uploads at setup time only.
    pub fn one_shot<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer),
    {
        let device = self.pool.device();
        let info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: self.pool.raw(),
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: 1,
            ..Default::default()
        };
        unsafe {
            let bufs = device
                .allocate_command_buffers(&info)
                .map_err(RenderError::device("allocate_command_buffers"))?;
            let result = self.run_one_shot(device, bufs[0], f);
            device.free_command_buffers(self.pool.raw(), &bufs);
            result
        }
    }

    unsafe fn run_one_shot<F>(&self, device: &ash::Device, cmd: vk::CommandBuffer, f: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer),
    {
        let begin = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        device
            .begin_command_buffer(cmd, &begin)
            .map_err(RenderError::record("begin_command_buffer"))?;
        f(device, cmd);
        device
            .end_command_buffer(cmd)
            .map_err(RenderError::record("end_command_buffer"))?;

        let cmds = [cmd];
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            command_buffer_count: cmds.len() as u32,
            p_command_buffers: cmds.as_ptr(),
            ..Default::default()
        };
        device
            .queue_submit(self.queue, &[submit], vk::Fence::null())
            .map_err(RenderError::Submission)?;
        device
            .queue_wait_idle(self.queue)
            .map_err(RenderError::sync("queue_wait_idle"))
    }
}
