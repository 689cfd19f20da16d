// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use ash::vk;

use crate::context::DeviceHandle;
use crate::error::{RenderError, Result};
use crate::owned::Owned;

/// Semaphores and fence guarding one frame slot.
pub struct FrameSync {
    pub image_available: Owned<vk::Semaphore>,
    pub render_finished: Owned<vk::Semaphore>,
    pub in_flight: Owned<vk::Fence>,
}

impl FrameSync {
    /// The fence starts signaled so the first wait on a fresh slot returns.
    pub fn new(device: &Arc<DeviceHandle>) -> Result<Self> {
        let sem_info = vk::SemaphoreCreateInfo {
            s_type: vk::StructureType::SEMAPHORE_CREATE_INFO,
            ..Default::default()
        };
        let fence_info = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: vk::FenceCreateFlags::SIGNALED,
            ..Default::default()
        };
        unsafe {
            let image_available = Owned::new(
                device,
                device
                    .create_semaphore(&sem_info, None)
                    .map_err(RenderError::device("create_semaphore"))?,
            );
            let render_finished = Owned::new(
                device,
                device
                    .create_semaphore(&sem_info, None)
                    .map_err(RenderError::device("create_semaphore"))?,
            );
            let in_flight = Owned::new(
                device,
                device
                    .create_fence(&fence_info, None)
                    .map_err(RenderError::device("create_fence"))?,
            );
            Ok(Self {
                image_available,
                render_finished,
                in_flight,
            })
        }
    }
}

/// One [`FrameSync`] per frame in flight.
pub struct SyncSet<const N: usize> {
    frames: [FrameSync; N],
    device: Arc<DeviceHandle>,
}

impl<const N: usize> SyncSet<N> {
    pub fn new(device: &Arc<DeviceHandle>) -> Result<Self> {
        let frames: Vec<FrameSync> = (0..N)
            .map(|_| FrameSync::new(device))
            .collect::<Result<_>>()?;
        let frames: [FrameSync; N] = frames
            .try_into()
            .map_err(|_| RenderError::Unsupported("frame sync count"))?;
        Ok(Self {
            frames,
            device: device.clone(),
        })
    }

    pub fn slot(&self, slot: usize) -> &FrameSync {
        &self.frames[slot]
    }

    /// Blocks until the slot's previous submission has retired.
    pub fn wait(&self, slot: usize) -> Result<()> {
        let fences = [self.frames[slot].in_flight.raw()];
        unsafe { self.device.wait_for_fences(&fences, true, u64::MAX) }
            .map_err(RenderError::sync("wait_for_fences"))
    }

    /// Unsignals the slot's fence. Only call when a submit will follow.
    pub fn reset(&self, slot: usize) -> Result<()> {
        let fences = [self.frames[slot].in_flight.raw()];
        unsafe { self.device.reset_fences(&fences) }.map_err(RenderError::sync("reset_fences"))
    }
}
