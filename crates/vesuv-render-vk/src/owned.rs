// SPDX-License-Identifier: CEPL-1.0
//! RAII wrappers for device-level handles.
use std::fmt;
use std::sync::Arc;

use ash::khr::swapchain;
use ash::vk::{self, Handle};

use crate::context::{DeviceHandle, SurfaceHandle};

/// A handle destroyed through `ash::Device`.
pub trait DeviceObject: Copy + Handle {
    /// # Safety
    /// The handle must belong to `device` and no longer be in use by the GPU.
    unsafe fn destroy(self, device: &ash::Device);
}

macro_rules! device_object {
    ($($ty:ident => $destroy:ident),* $(,)?) => {
        $(
            impl DeviceObject for vk::$ty {
                unsafe fn destroy(self, device: &ash::Device) {
                    device.$destroy(self, None);
                }
            }
        )*
    };
}

device_object! {
    Image => destroy_image,
    ImageView => destroy_image_view,
    Sampler => destroy_sampler,
    Framebuffer => destroy_framebuffer,
    Semaphore => destroy_semaphore,
    Fence => destroy_fence,
    RenderPass => destroy_render_pass,
    CommandPool => destroy_command_pool,
    Pipeline => destroy_pipeline,
    PipelineLayout => destroy_pipeline_layout,
    DescriptorSetLayout => destroy_descriptor_set_layout,
    DescriptorPool => destroy_descriptor_pool,
    ShaderModule => destroy_shader_module,
    Buffer => destroy_buffer,
    DeviceMemory => free_memory,
}

/// Owns one device object and destroys it on drop. Keeps the device alive.
pub struct Owned<T: DeviceObject> {
    device: Arc<DeviceHandle>,
    handle: T,
}

impl<T: DeviceObject> Owned<T> {
    /// Takes ownership of `handle`, which must have been created on `device`.
    pub fn new(device: &Arc<DeviceHandle>, handle: T) -> Self {
        Self {
            device: device.clone(),
            handle,
        }
    }

    #[inline]
    pub fn raw(&self) -> T {
        self.handle
    }

    pub fn device(&self) -> &Arc<DeviceHandle> {
        &self.device
    }
}

impl<T: DeviceObject> Drop for Owned<T> {
    fn drop(&mut self) {
        if self.handle.as_raw() != 0 {
            unsafe { self.handle.destroy(&self.device) };
        }
    }
}

impl<T: DeviceObject + fmt::Debug> fmt::Debug for Owned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Owned").field(&self.handle).finish()
    }
}

/// A swapchain plus the loader that destroys it. Holds the surface alive.
pub struct OwnedSwapchain {
    handle: vk::SwapchainKHR,
    loader: swapchain::Device,
    _device: Arc<DeviceHandle>,
    _surface: Arc<SurfaceHandle>,
}

impl OwnedSwapchain {
    pub fn new(
        device: &Arc<DeviceHandle>,
        surface: &Arc<SurfaceHandle>,
        loader: swapchain::Device,
        handle: vk::SwapchainKHR,
    ) -> Self {
        Self {
            handle,
            loader,
            _device: device.clone(),
            _surface: surface.clone(),
        }
    }

    #[inline]
    pub fn raw(&self) -> vk::SwapchainKHR {
        self.handle
    }
}

impl Drop for OwnedSwapchain {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_swapchain(self.handle, None) };
    }
}
