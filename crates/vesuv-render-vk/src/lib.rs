// SPDX-License-Identifier: CEPL-1.0
//! Vulkan backend: device bootstrap, swapchain lifecycle and the
//! [`FrameBackend`](vesuv_render::FrameBackend) that drives presentation.
pub mod buffer;
pub mod command;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod owned;
pub mod pipeline;
pub mod presenter;
pub mod swapchain;
pub mod sync;
pub mod texture;

pub use ash::vk;

pub use buffer::{find_memory_type, GpuBuffer, Mesh, UniformBufferObject, UniformBuffers};
pub use command::{encode_draws, BufferSlice, CommandPool, CommandSink, DescriptorBinding, DrawItem, PipelineRef};
pub use context::{ContextOptions, GpuContext, QueueFamilies};
pub use descriptor::FrameDescriptors;
pub use error::RenderError;
pub use pipeline::{GraphicsPipeline, Vertex};
pub use presenter::{PresenterOptions, VkPresenter};
pub use swapchain::{
    choose_extent, choose_image_count, choose_present_mode, choose_surface_format, ImageChain,
    Swapchain,
};
pub use texture::{decode as decode_texture, Texture};
