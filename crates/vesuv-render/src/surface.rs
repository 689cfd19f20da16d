// SPDX-License-Identifier: CEPL-1.0
//! What the presentation engine needs from the windowing layer.
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info};

use crate::RenderSize;

/// Live framebuffer size of a window, queried at swapchain (re)creation time.
pub trait FramebufferSource {
    /// Current framebuffer size in physical pixels.
    fn framebuffer_size(&self) -> RenderSize;

    /// Yields to the window system while the framebuffer is zero-sized.
    ///
    /// Returns `false` when the source cannot observe a restore from inside
    /// the caller, e.g. a window whose events are only delivered to a running
    /// event loop. Waiting is then abandoned.
    fn wait_events(&self) -> bool;
}

impl<T: FramebufferSource + ?Sized> FramebufferSource for std::sync::Arc<T> {
    fn framebuffer_size(&self) -> RenderSize {
        (**self).framebuffer_size()
    }

    fn wait_events(&self) -> bool {
        (**self).wait_events()
    }
}

/// A window a Vulkan surface can be created for.
pub trait RenderWindow: HasWindowHandle + HasDisplayHandle + FramebufferSource {}

impl<T: HasWindowHandle + HasDisplayHandle + FramebufferSource + ?Sized> RenderWindow for T {}

/// Blocks until the window reports a non-zero framebuffer. A zero-extent
/// swapchain is invalid, so recreation cannot proceed while minimised.
///
/// `None` when the source gave up waiting; the caller should retry once the
/// window reports a usable size.
pub fn wait_for_nonzero_size<S: FramebufferSource + ?Sized>(source: &S) -> Option<RenderSize> {
    let mut size = source.framebuffer_size();
    if !size.is_zero_area() {
        return Some(size);
    }

    info!("framebuffer is {size}; waiting for the window to be restored");
    let mut polls = 0u32;
    while size.is_zero_area() {
        if !source.wait_events() {
            debug!(polls, "window source cannot wait here; deferring");
            return None;
        }
        size = source.framebuffer_size();
        polls = polls.saturating_add(1);
    }
    debug!(polls, "framebuffer restored to {size}");
    Some(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    struct ScriptedWindow {
        sizes: RefCell<VecDeque<RenderSize>>,
        last: Cell<RenderSize>,
        waits: Cell<u32>,
        can_wait: bool,
    }

    impl ScriptedWindow {
        fn new(sizes: &[RenderSize]) -> Self {
            Self {
                sizes: RefCell::new(sizes.iter().copied().collect()),
                last: Cell::new(RenderSize::default()),
                waits: Cell::new(0),
                can_wait: true,
            }
        }
    }

    impl FramebufferSource for ScriptedWindow {
        fn framebuffer_size(&self) -> RenderSize {
            if let Some(next) = self.sizes.borrow_mut().pop_front() {
                self.last.set(next);
            }
            self.last.get()
        }

        fn wait_events(&self) -> bool {
            self.waits.set(self.waits.get() + 1);
            self.can_wait
        }
    }

    #[test]
    fn returns_immediately_when_visible() {
        let window = ScriptedWindow::new(&[RenderSize::new(800, 600)]);
        assert_eq!(wait_for_nonzero_size(&window), Some(RenderSize::new(800, 600)));
        assert_eq!(window.waits.get(), 0);
    }

    #[test]
    fn spins_while_minimised() {
        let window = ScriptedWindow::new(&[
            RenderSize::new(0, 0),
            RenderSize::new(0, 0),
            RenderSize::new(0, 600),
            RenderSize::new(800, 600),
        ]);
        assert_eq!(wait_for_nonzero_size(&window), Some(RenderSize::new(800, 600)));
        assert_eq!(window.waits.get(), 3);
    }

    #[test]
    fn gives_up_when_the_source_cannot_wait() {
        let mut window = ScriptedWindow::new(&[RenderSize::new(0, 0), RenderSize::new(800, 600)]);
        window.can_wait = false;
        assert_eq!(wait_for_nonzero_size(&window), None);
        assert_eq!(window.waits.get(), 1);
        // The restored size is still there for the retry.
        assert_eq!(wait_for_nonzero_size(&window), Some(RenderSize::new(800, 600)));
    }

    #[test]
    fn works_through_arc() {
        let window = std::sync::Arc::new(ScriptedWindow::new(&[RenderSize::new(640, 480)]));
        assert_eq!(wait_for_nonzero_size(&window), Some(RenderSize::new(640, 480)));
    }
}
