// SPDX-License-Identifier: CEPL-1.0
//! Per-frame state machine: acquire → wait → record → submit → present → advance.
//!
//! The controller owns no GPU objects. Everything device-facing goes through
//! [`FrameBackend`], which keeps the ordering rules here testable without a GPU.
//!
//! Per slot `i` the backend must observe, in order:
//!
//! 1. `wait_for_slot(i)`: block on the in-flight fence of slot `i`
//! 2. `acquire_image(i)`: gated by the image-available semaphore of slot `i`
//! 3. `reset_slot(i)`: only after the wait and only if the frame will be submitted
//! 4. `record(i, ..)`
//! 5. `submit(i)`: signals render-finished `i` and the fence of slot `i`
//! 6. `present(i, ..)`: waits on render-finished `i`
use tracing::{debug, info, trace};

use crate::MAX_FRAMES_IN_FLIGHT;

/// Result of asking the presentation engine for the next image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired { image_index: u32, suboptimal: bool },
    /// The swapchain no longer matches the surface; no image was acquired.
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// Out of date or suboptimal. The image was still consumed.
    Stale,
}

/// Result of a swapchain rebuild request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecreateOutcome {
    Rebuilt,
    /// The window has no area yet. Nothing was torn down; retry later.
    Deferred,
}

/// What happened during one `draw_frame` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Presented,
    /// Presented, then rebuilt the swapchain (stale surface or resize).
    Recreated,
    /// Presented, but the rebuild had to wait for the window to regain its
    /// size. The resize stays pending.
    Deferred,
    /// Acquisition hit an out-of-date swapchain; nothing was drawn.
    Skipped,
}

/// Backend call in progress. Left in place when a frame fails, so the caller
/// can tell which step broke.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FramePhase {
    #[default]
    Idle,
    Acquiring,
    Recording,
    Submitting,
    Presenting,
    Recreating,
}

/// Device-facing half of the frame loop.
pub trait FrameBackend {
    /// One unit of geometry handed to the recorder.
    type Draw;
    /// Pipeline object bound once per recorded frame.
    type Pipeline: ?Sized;
    type Error;

    /// Number of synchronisation slots the backend owns.
    const SLOTS: usize;

    fn wait_for_slot(&mut self, slot: usize) -> Result<(), Self::Error>;

    fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome, Self::Error>;

    fn reset_slot(&mut self, slot: usize) -> Result<(), Self::Error>;

    fn record(
        &mut self,
        slot: usize,
        image_index: u32,
        pipeline: &Self::Pipeline,
        draws: &[Self::Draw],
    ) -> Result<(), Self::Error>;

    fn submit(&mut self, slot: usize) -> Result<(), Self::Error>;

    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome, Self::Error>;

    fn recreate_swapchain(&mut self) -> Result<RecreateOutcome, Self::Error>;

    fn wait_idle(&mut self) -> Result<(), Self::Error>;
}

/// Index of the current frame slot, always in `[0, N)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameCursor<const N: usize> {
    index: usize,
}

impl<const N: usize> FrameCursor<N> {
    pub const fn new() -> Self {
        assert!(N > 0, "a frame cursor needs at least one slot");
        Self { index: 0 }
    }

    #[inline]
    pub const fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn advance(&mut self) {
        self.index = (self.index + 1) % N;
    }
}

impl<const N: usize> Default for FrameCursor<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Mutable per-window loop state: the slot cursor and the pending-resize flag.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameLoopContext<const N: usize> {
    cursor: FrameCursor<N>,
    resized: bool,
    phase: FramePhase,
}

impl<const N: usize> FrameLoopContext<N> {
    pub fn current_frame(&self) -> usize {
        self.cursor.index()
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    pub fn resize_pending(&self) -> bool {
        self.resized
    }
}

/// Drives frames through a [`FrameBackend`] with `N` frames in flight.
pub struct FrameLoop<B: FrameBackend, const N: usize = MAX_FRAMES_IN_FLIGHT> {
    backend: B,
    ctx: FrameLoopContext<N>,
}

impl<B: FrameBackend, const N: usize> FrameLoop<B, N> {
    /// The backend must own exactly `N` slots; a mismatch fails to build.
    ///
    /// ```compile_fail
    /// use vesuv_render::{AcquireOutcome, FrameBackend, FrameLoop, PresentOutcome, RecreateOutcome};
    ///
    /// struct OneSlot;
    ///
    /// impl FrameBackend for OneSlot {
    ///     type Draw = ();
    ///     type Pipeline = ();
    ///     type Error = ();
    ///     const SLOTS: usize = 1;
    ///
    ///     fn wait_for_slot(&mut self, _: usize) -> Result<(), ()> { Ok(()) }
    ///     fn acquire_image(&mut self, _: usize) -> Result<AcquireOutcome, ()> { Err(()) }
    ///     fn reset_slot(&mut self, _: usize) -> Result<(), ()> { Ok(()) }
    ///     fn record(&mut self, _: usize, _: u32, _: &(), _: &[()]) -> Result<(), ()> { Ok(()) }
    ///     fn submit(&mut self, _: usize) -> Result<(), ()> { Ok(()) }
    ///     fn present(&mut self, _: usize, _: u32) -> Result<PresentOutcome, ()> { Err(()) }
    ///     fn recreate_swapchain(&mut self) -> Result<RecreateOutcome, ()> { Err(()) }
    ///     fn wait_idle(&mut self) -> Result<(), ()> { Ok(()) }
    /// }
    ///
    /// let _ = FrameLoop::<OneSlot, 2>::new(OneSlot);
    /// ```
    pub fn new(backend: B) -> Self {
        const {
            assert!(
                B::SLOTS == N,
                "backend slot count must match frames in flight"
            )
        };
        Self {
            backend,
            ctx: FrameLoopContext::default(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn context(&self) -> &FrameLoopContext<N> {
        &self.ctx
    }

    pub fn current_frame(&self) -> usize {
        self.ctx.current_frame()
    }

    /// Called by the windowing layer when the framebuffer changed size. Consulted
    /// after the next present; cleared only by this controller.
    pub fn notify_resized(&mut self) {
        self.ctx.resized = true;
    }

    pub fn draw_frame(
        &mut self,
        draws: &[B::Draw],
        pipeline: &B::Pipeline,
    ) -> Result<FrameStatus, B::Error> {
        self.draw_frame_with(draws, pipeline, |_| {})
    }

    /// Like [`draw_frame`](Self::draw_frame), calling `before_submit` with the
    /// slot index once the slot's previous GPU work has retired. Per-slot host
    /// data (uniforms) may be written there.
    pub fn draw_frame_with<F>(
        &mut self,
        draws: &[B::Draw],
        pipeline: &B::Pipeline,
        before_submit: F,
    ) -> Result<FrameStatus, B::Error>
    where
        F: FnOnce(usize),
    {
        let status = self.run_frame(draws, pipeline, before_submit)?;
        self.ctx.phase = FramePhase::Idle;
        Ok(status)
    }

    fn run_frame<F>(
        &mut self,
        draws: &[B::Draw],
        pipeline: &B::Pipeline,
        before_submit: F,
    ) -> Result<FrameStatus, B::Error>
    where
        F: FnOnce(usize),
    {
        let slot = self.ctx.cursor.index();
        trace!(slot, "frame begin");

        self.ctx.phase = FramePhase::Acquiring;
        self.backend.wait_for_slot(slot)?;

        let image_index = match self.backend.acquire_image(slot)? {
            AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            } => {
                if suboptimal {
                    debug!(slot, image_index, "acquired suboptimal image");
                }
                image_index
            }
            AcquireOutcome::OutOfDate => {
                // Fence untouched and cursor unchanged: the retry proceeds at once.
                info!(slot, "swapchain out of date on acquire; recreating");
                if self.recreate()? == RecreateOutcome::Deferred {
                    self.ctx.resized = true;
                }
                return Ok(FrameStatus::Skipped);
            }
        };

        self.ctx.phase = FramePhase::Recording;
        self.backend.reset_slot(slot)?;
        self.backend.record(slot, image_index, pipeline, draws)?;
        before_submit(slot);

        self.ctx.phase = FramePhase::Submitting;
        self.backend.submit(slot)?;

        self.ctx.phase = FramePhase::Presenting;
        let presented = self.backend.present(slot, image_index)?;
        let status = if presented == PresentOutcome::Stale || self.ctx.resized {
            info!(
                slot,
                stale = presented == PresentOutcome::Stale,
                resized = self.ctx.resized,
                "recreating swapchain after present"
            );
            self.ctx.resized = false;
            match self.recreate()? {
                RecreateOutcome::Rebuilt => FrameStatus::Recreated,
                RecreateOutcome::Deferred => {
                    self.ctx.resized = true;
                    FrameStatus::Deferred
                }
            }
        } else {
            FrameStatus::Presented
        };

        self.ctx.cursor.advance();
        trace!(slot, image_index, ?status, "frame end");
        Ok(status)
    }

    fn recreate(&mut self) -> Result<RecreateOutcome, B::Error> {
        self.ctx.phase = FramePhase::Recreating;
        let outcome = self.backend.recreate_swapchain()?;
        if outcome == RecreateOutcome::Deferred {
            debug!("swapchain rebuild deferred until the window has area");
        }
        Ok(outcome)
    }

    /// Waits for the device to go idle, then drops the backend, which releases
    /// its objects in dependency order.
    pub fn cleanup(mut self) -> Result<(), B::Error> {
        self.backend.wait_idle()?;
        drop(self.backend);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_wraps_after_n_advances() {
        let mut cursor = FrameCursor::<2>::new();
        assert_eq!(cursor.index(), 0);
        cursor.advance();
        assert_eq!(cursor.index(), 1);
        cursor.advance();
        assert_eq!(cursor.index(), 0);
    }

    #[test]
    fn cursor_stays_in_range() {
        let mut cursor = FrameCursor::<3>::default();
        for _ in 0..100 {
            cursor.advance();
            assert!(cursor.index() < 3);
        }
        assert_eq!(cursor.index(), 100 % 3);
    }

    #[test]
    fn context_starts_idle_without_resize() {
        let ctx = FrameLoopContext::<MAX_FRAMES_IN_FLIGHT>::default();
        assert_eq!(ctx.current_frame(), 0);
        assert_eq!(ctx.phase(), FramePhase::Idle);
        assert!(!ctx.resize_pending());
    }
}
