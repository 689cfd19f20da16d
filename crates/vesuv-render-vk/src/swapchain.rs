// SPDX-License-Identifier: CEPL-1.0
//! Swapchain selection, creation and rebuild.
//!
//! The selection helpers are pure so they can be checked without a device.
use ash::vk;
use tracing::{debug, info, warn};
use vesuv_render::{wait_for_nonzero_size, FramebufferSource, RecreateOutcome, RenderSize};

use crate::context::GpuContext;
use crate::error::{RenderError, Result};
use crate::owned::{Owned, OwnedSwapchain};

/// Formats, present modes and capabilities a surface offers on a device.
#[derive(Clone, Debug, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    pub fn query(ctx: &GpuContext) -> Result<Self> {
        let loader = ctx.surface().loader();
        let surface = ctx.surface().raw();
        let phys = ctx.physical_device();
        unsafe {
            Ok(Self {
                capabilities: loader
                    .get_physical_device_surface_capabilities(phys, surface)
                    .map_err(RenderError::device("get_physical_device_surface_capabilities"))?,
                formats: loader
                    .get_physical_device_surface_formats(phys, surface)
                    .map_err(RenderError::device("get_physical_device_surface_formats"))?,
                present_modes: loader
                    .get_physical_device_surface_present_modes(phys, surface)
                    .map_err(RenderError::device("get_physical_device_surface_present_modes"))?,
            })
        }
    }
}

/// Prefers 8-bit BGRA then RGBA sRGB in the sRGB non-linear space, else the
/// first format offered.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    const PREFERRED: [vk::Format; 2] = [vk::Format::B8G8R8A8_SRGB, vk::Format::R8G8B8A8_SRGB];
    PREFERRED
        .iter()
        .find_map(|&want| {
            formats.iter().copied().find(|f| {
                f.format == want && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
        })
        .or_else(|| formats.first().copied())
}

/// MAILBOX when offered and wanted, otherwise FIFO (always available).
pub fn choose_present_mode(modes: &[vk::PresentModeKHR], prefer_mailbox: bool) -> vk::PresentModeKHR {
    if prefer_mailbox && modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// The surface's current extent, unless it reports the `u32::MAX` sentinel,
/// in which case the window size is clamped into the supported range.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, window: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: window
            .width
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: window
            .height
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// One more than the minimum, capped by the maximum (0 means unbounded).
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let want = caps.min_image_count + 1;
    if caps.max_image_count == 0 {
        want
    } else {
        want.min(caps.max_image_count)
    }
}

/// Per-image objects derived from the swapchain images.
///
/// Views and framebuffers are built all or nothing: a failure part way drops
/// what was already made, so the lengths never disagree with a partial set.
/// Field order is teardown order.
#[derive(Debug)]
pub struct ImageChain<I, V, F> {
    framebuffers: Vec<F>,
    views: Vec<V>,
    images: Vec<I>,
}

impl<I, V, F> Default for ImageChain<I, V, F> {
    fn default() -> Self {
        Self {
            framebuffers: Vec::new(),
            views: Vec::new(),
            images: Vec::new(),
        }
    }
}

impl<I: Copy, V, F> ImageChain<I, V, F> {
    pub fn new(images: Vec<I>) -> Self {
        Self {
            images,
            ..Self::default()
        }
    }

    /// One view per image. Replaces any earlier views and drops the
    /// framebuffers that referenced them.
    pub fn build_views<E>(&mut self, mut make: impl FnMut(I) -> std::result::Result<V, E>) -> std::result::Result<(), E> {
        self.framebuffers.clear();
        self.views.clear();
        self.views = self.images.iter().map(|&image| make(image)).collect::<std::result::Result<_, E>>()?;
        Ok(())
    }

    /// One framebuffer per view.
    pub fn build_framebuffers<E>(&mut self, make: impl FnMut(&V) -> std::result::Result<F, E>) -> std::result::Result<(), E> {
        self.framebuffers.clear();
        self.framebuffers = self.views.iter().map(make).collect::<std::result::Result<_, E>>()?;
        Ok(())
    }

    /// Framebuffers, then views, then the images themselves.
    pub fn clear(&mut self) {
        self.framebuffers.clear();
        self.views.clear();
        self.images.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.views.is_empty() && self.framebuffers.is_empty()
    }

    /// Images, views and framebuffers line up one to one.
    pub fn is_consistent(&self) -> bool {
        self.images.len() == self.views.len() && self.views.len() == self.framebuffers.len()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn framebuffer(&self, index: usize) -> Option<&F> {
        self.framebuffers.get(index)
    }
}

type SwapchainImages = ImageChain<vk::Image, Owned<vk::ImageView>, Owned<vk::Framebuffer>>;

/// Swapchain plus its per-image views and framebuffers.
///
/// Field order is teardown order: framebuffers, views, then the swapchain.
#[derive(Default)]
pub struct Swapchain {
    chain: SwapchainImages,
    handle: Option<OwnedSwapchain>,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Creates the swapchain object alone; views and framebuffers come later.
    pub fn create(ctx: &GpuContext, window: RenderSize, prefer_mailbox: bool) -> Result<Self> {
        let support = SurfaceSupport::query(ctx)?;
        let surface_format = choose_surface_format(&support.formats)
            .ok_or(RenderError::Unsupported("surface reports no formats"))?;
        let present_mode = choose_present_mode(&support.present_modes, prefer_mailbox);
        let extent = choose_extent(&support.capabilities, window);
        let image_count = choose_image_count(&support.capabilities);

        let families = ctx.queue_families();
        let indices = families.unique();
        let (sharing_mode, index_count, index_ptr) = if families.is_shared() {
            (vk::SharingMode::EXCLUSIVE, 0, std::ptr::null())
        } else {
            (vk::SharingMode::CONCURRENT, indices.len() as u32, indices.as_ptr())
        };

        let info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: ctx.surface().raw(),
            min_image_count: image_count,
            image_format: surface_format.format,
            image_color_space: surface_format.color_space,
            image_extent: extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: sharing_mode,
            queue_family_index_count: index_count,
            p_queue_family_indices: index_ptr,
            pre_transform: support.capabilities.current_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode,
            clipped: vk::TRUE,
            old_swapchain: vk::SwapchainKHR::null(),
            ..Default::default()
        };

        let loader = ctx.swapchain_loader();
        let raw = unsafe { loader.create_swapchain(&info, None) }
            .map_err(RenderError::device("create_swapchain"))?;
        let handle = OwnedSwapchain::new(ctx.device(), ctx.surface(), loader.clone(), raw);
        let images = unsafe { loader.get_swapchain_images(raw) }
            .map_err(RenderError::device("get_swapchain_images"))?;

        info!(
            "vk: swapchain {}x{} {:?} {:?}, {} images (asked {image_count})",
            extent.width,
            extent.height,
            surface_format.format,
            present_mode,
            images.len()
        );

        Ok(Self {
            chain: ImageChain::new(images),
            handle: Some(handle),
            format: surface_format.format,
            extent,
        })
    }

    /// One 2D colour view per swapchain image, identity swizzle.
    pub fn create_image_views(&mut self, ctx: &GpuContext) -> Result<()> {
        let device = ctx.device();
        let format = self.format;
        self.chain.build_views(|image| {
            let info = vk::ImageViewCreateInfo {
                s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
                image,
                view_type: vk::ImageViewType::TYPE_2D,
                format,
                components: vk::ComponentMapping::default(),
                subresource_range: vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                ..Default::default()
            };
            let view = unsafe { device.create_image_view(&info, None) }
                .map_err(RenderError::device("create_image_view"))?;
            Ok(Owned::new(device, view))
        })
    }

    /// One framebuffer per image view, sized to the swapchain extent.
    pub fn create_framebuffers(&mut self, ctx: &GpuContext, render_pass: vk::RenderPass) -> Result<()> {
        let device = ctx.device();
        let extent = self.extent;
        self.chain.build_framebuffers(|view| {
            let attachments = [view.raw()];
            let info = vk::FramebufferCreateInfo {
                s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
                render_pass,
                attachment_count: attachments.len() as u32,
                p_attachments: attachments.as_ptr(),
                width: extent.width,
                height: extent.height,
                layers: 1,
                ..Default::default()
            };
            let fb = unsafe { device.create_framebuffer(&info, None) }
                .map_err(RenderError::device("create_framebuffer"))?;
            Ok(Owned::new(device, fb))
        })?;
        debug_assert!(self.chain.is_consistent());
        Ok(())
    }

    /// Releases framebuffers, views and the swapchain. The caller must have
    /// waited for the device to go idle. A no-op on an empty swapchain.
    pub fn destroy(&mut self) {
        if self.handle.is_none() && self.chain.is_empty() {
            return;
        }
        // STRICT ORDER: framebuffers → image views → swapchain.
        self.chain.clear();
        self.handle = None;
        debug!("vk: swapchain resources released");
    }

    /// Rebuilds everything that depends on the surface size, after draining
    /// the device.
    ///
    /// While the window is minimised and `window` cannot wait for a restore,
    /// nothing is touched and [`RecreateOutcome::Deferred`] is returned.
    pub fn recreate<W>(
        &mut self,
        ctx: &GpuContext,
        window: &W,
        render_pass: vk::RenderPass,
        prefer_mailbox: bool,
    ) -> Result<RecreateOutcome>
    where
        W: FramebufferSource + ?Sized,
    {
        let Some(size) = wait_for_nonzero_size(window) else {
            return Ok(RecreateOutcome::Deferred);
        };
        unsafe { ctx.device().device_wait_idle() }
            .map_err(RenderError::sync("device_wait_idle"))?;

        let old_format = self.format;
        self.destroy();

        let mut fresh = Self::create(ctx, size, prefer_mailbox)?;
        if old_format != vk::Format::UNDEFINED && fresh.format != old_format {
            warn!(
                "vk: surface format changed {old_format:?} → {:?}; render pass was built for the old one",
                fresh.format
            );
        }
        fresh.create_image_views(ctx)?;
        fresh.create_framebuffers(ctx, render_pass)?;
        *self = fresh;
        info!("vk: swapchain recreated at {size}");
        Ok(RecreateOutcome::Rebuilt)
    }

    pub fn is_consistent(&self) -> bool {
        self.chain.is_consistent()
    }

    pub fn raw(&self) -> vk::SwapchainKHR {
        self.handle
            .as_ref()
            .map_or(vk::SwapchainKHR::null(), OwnedSwapchain::raw)
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn image_count(&self) -> usize {
        self.chain.len()
    }

    pub fn framebuffer(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.chain.framebuffer(image_index as usize).map(Owned::raw)
    }
}
