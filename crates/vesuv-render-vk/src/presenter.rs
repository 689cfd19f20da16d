// SPDX-License-Identifier: CEPL-1.0
//! Vulkan implementation of [`FrameBackend`].
use anyhow::{Context, Result as AnyResult};
use ash::vk;
use tracing::info;
use vesuv_render::{
    AcquireOutcome, FrameBackend, FramebufferSource, PresentOutcome, RecreateOutcome,
    RenderWindow, MAX_FRAMES_IN_FLIGHT,
};

use crate::command::{record_frame, CommandPool, DrawItem, FrameRecording, PipelineRef};
use crate::context::{ContextOptions, GpuContext};
use crate::error::{RenderError, Result};
use crate::owned::Owned;
use crate::pipeline::create_render_pass;
use crate::swapchain::Swapchain;
use crate::sync::SyncSet;

#[derive(Clone, Debug, Default)]
pub struct PresenterOptions {
    pub context: ContextOptions,
    /// Use MAILBOX when the surface offers it; FIFO otherwise.
    pub prefer_mailbox: bool,
}

/// Owns the device, the swapchain and all per-frame objects for one window.
///
/// Field order is teardown order. `Drop` drains the device first.
pub struct VkPresenter<W: FramebufferSource> {
    swapchain: Swapchain,
    sync: SyncSet<MAX_FRAMES_IN_FLIGHT>,
    command_buffers: [vk::CommandBuffer; MAX_FRAMES_IN_FLIGHT],
    command_pool: CommandPool,
    render_pass: Owned<vk::RenderPass>,
    ctx: GpuContext,
    window: W,
    prefer_mailbox: bool,
}

impl<W: RenderWindow> VkPresenter<W> {
    pub fn new(window: W, opts: &PresenterOptions) -> AnyResult<Self> {
        let ctx = GpuContext::new(&window, &opts.context).context("device setup")?;
        let device = ctx.device().clone();

        let size = window.framebuffer_size();
        // Render pass needs the format, swapchain framebuffers need the pass.
        let mut swapchain = Swapchain::create(&ctx, size, opts.prefer_mailbox)?;
        let render_pass = create_render_pass(&device, swapchain.format())?;
        swapchain.create_image_views(&ctx)?;
        swapchain.create_framebuffers(&ctx, render_pass.raw())?;

        let families = ctx.queue_families();
        let command_pool = CommandPool::new(&device, families.graphics, ctx.graphics_queue())?;
        let command_buffers = command_pool.allocate::<MAX_FRAMES_IN_FLIGHT>()?;
        let sync = SyncSet::new(&device)?;

        info!(
            "vk: presenter ready, {} swapchain images, {MAX_FRAMES_IN_FLIGHT} frames in flight",
            swapchain.image_count()
        );

        Ok(Self {
            swapchain,
            sync,
            command_buffers,
            command_pool,
            render_pass,
            ctx,
            window,
            prefer_mailbox: opts.prefer_mailbox,
        })
    }
}

impl<W: FramebufferSource> VkPresenter<W> {
    pub fn context(&self) -> &GpuContext {
        &self.ctx
    }

    pub fn window(&self) -> &W {
        &self.window
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.raw()
    }

    pub fn command_pool(&self) -> &CommandPool {
        &self.command_pool
    }

    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }
}

impl<W: FramebufferSource> Drop for VkPresenter<W> {
    fn drop(&mut self) {
        unsafe { self.ctx.device().device_wait_idle() }.ok();
    }
}

impl<W: FramebufferSource> FrameBackend for VkPresenter<W> {
    type Draw = DrawItem;
    type Pipeline = PipelineRef;
    type Error = RenderError;

    const SLOTS: usize = MAX_FRAMES_IN_FLIGHT;

    fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
        self.sync.wait(slot)
    }

    fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome> {
        let acquired = unsafe {
            self.ctx.swapchain_loader().acquire_next_image(
                self.swapchain.raw(),
                u64::MAX,
                self.sync.slot(slot).image_available.raw(),
                vk::Fence::null(),
            )
        };
        match acquired {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(RenderError::presentation("acquire_next_image")(e)),
        }
    }

    fn reset_slot(&mut self, slot: usize) -> Result<()> {
        self.sync.reset(slot)
    }

    fn record(
        &mut self,
        slot: usize,
        image_index: u32,
        pipeline: &PipelineRef,
        draws: &[DrawItem],
    ) -> Result<()> {
        let framebuffer = self
            .swapchain
            .framebuffer(image_index)
            .ok_or(RenderError::Unsupported("acquired image has no framebuffer"))?;
        record_frame(
            self.ctx.device(),
            &FrameRecording {
                cmd: self.command_buffers[slot],
                render_pass: self.render_pass.raw(),
                framebuffer,
                extent: self.swapchain.extent(),
                pipeline,
                draws,
                slot,
            },
        )
    }

    fn submit(&mut self, slot: usize) -> Result<()> {
        let sync = self.sync.slot(slot);
        let wait = [sync.image_available.raw()];
        let stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal = [sync.render_finished.raw()];
        let cmds = [self.command_buffers[slot]];
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: wait.len() as u32,
            p_wait_semaphores: wait.as_ptr(),
            p_wait_dst_stage_mask: stages.as_ptr(),
            command_buffer_count: cmds.len() as u32,
            p_command_buffers: cmds.as_ptr(),
            signal_semaphore_count: signal.len() as u32,
            p_signal_semaphores: signal.as_ptr(),
            ..Default::default()
        };
        unsafe {
            self.ctx.device().queue_submit(
                self.ctx.graphics_queue(),
                std::slice::from_ref(&submit),
                sync.in_flight.raw(),
            )
        }
        .map_err(RenderError::Submission)
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome> {
        let wait = [self.sync.slot(slot).render_finished.raw()];
        let swapchains = [self.swapchain.raw()];
        let indices = [image_index];
        let info = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: wait.len() as u32,
            p_wait_semaphores: wait.as_ptr(),
            swapchain_count: swapchains.len() as u32,
            p_swapchains: swapchains.as_ptr(),
            p_image_indices: indices.as_ptr(),
            ..Default::default()
        };
        let presented = unsafe {
            self.ctx
                .swapchain_loader()
                .queue_present(self.ctx.present_queue(), &info)
        };
        match presented {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::Stale),
            Err(e) => Err(RenderError::presentation("queue_present")(e)),
        }
    }

    fn recreate_swapchain(&mut self) -> Result<RecreateOutcome> {
        self.swapchain.recreate(
            &self.ctx,
            &self.window,
            self.render_pass.raw(),
            self.prefer_mailbox,
        )
    }

    fn wait_idle(&mut self) -> Result<()> {
        unsafe { self.ctx.device().device_wait_idle() }.map_err(RenderError::sync("device_wait_idle"))
    }
}
