// SPDX-License-Identifier: CEPL-1.0
//! Backend-agnostic half of the frame-presentation engine.
//!
//! [`FrameLoop`] drives one frame at a time through a [`FrameBackend`]; the
//! Vulkan implementation lives in `vesuv-render-vk`.
#![deny(unsafe_op_in_unsafe_fn)]

pub mod frame;
pub mod surface;

pub use frame::{
    AcquireOutcome, FrameBackend, FrameCursor, FrameLoop, FrameLoopContext, FramePhase,
    FrameStatus, PresentOutcome, RecreateOutcome,
};
pub use surface::{wait_for_nonzero_size, FramebufferSource, RenderWindow};

/// How many frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A minimised window reports a zero-area framebuffer.
    pub const fn is_zero_area(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for RenderSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
