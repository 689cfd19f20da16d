// SPDX-License-Identifier: CEPL-1.0
//! Windowing glue: a winit window the presentation engine can render into.
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use vesuv_render::{FramebufferSource, RenderSize};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
};
use winit::window::Window;

pub use winit;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowSpec {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowSpec {
    fn default() -> Self {
        Self {
            title: "vesuv".to_owned(),
            width: 800,
            height: 600,
        }
    }
}

/// Shared handle to a winit window, usable as a render target.
#[derive(Clone, Debug)]
pub struct PlatformWindow {
    inner: Arc<Window>,
}

impl PlatformWindow {
    pub fn create(event_loop: &ActiveEventLoop, spec: &WindowSpec) -> Result<Self> {
        let attrs = Window::default_attributes()
            .with_title(spec.title.as_str())
            .with_inner_size(PhysicalSize::new(spec.width, spec.height));
        let window = event_loop.create_window(attrs).context("create_window")?;
        let size = window.inner_size();
        info!("window '{}' created at {}x{}", spec.title, size.width, size.height);
        Ok(Self {
            inner: Arc::new(window),
        })
    }

    pub fn winit(&self) -> &Window {
        &self.inner
    }

    pub fn request_redraw(&self) {
        self.inner.request_redraw();
    }
}

impl FramebufferSource for PlatformWindow {
    fn framebuffer_size(&self) -> RenderSize {
        let size = self.inner.inner_size();
        RenderSize::new(size.width, size.height)
    }

    /// winit delivers events only to the running loop, and a handler that
    /// blocks here would never see the restore. The rebuild is deferred
    /// instead and retried on the next `Resized`.
    fn wait_events(&self) -> bool {
        false
    }
}

impl HasWindowHandle for PlatformWindow {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        self.inner.window_handle()
    }
}

impl HasDisplayHandle for PlatformWindow {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        self.inner.display_handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_spec_is_800_by_600() {
        let spec = WindowSpec::default();
        assert_eq!((spec.width, spec.height), (800, 600));
        assert_eq!(spec.title, "vesuv");
    }
}
