// SPDX-License-Identifier: CEPL-1.0
//! One-shot device bootstrap: instance, surface, physical/logical device, queues.
//!
//! Each Vulkan parent object is reference counted and destroyed by its own
//! `Drop`, so children (which hold an `Arc` to their parent) always go first.
use std::ffi::{c_char, CStr, CString};
use std::ops::Deref;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use ash::ext::debug_utils;
use ash::khr::{surface, swapchain};
use ash::{vk, Entry};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};
use tracing::{debug, error, info, trace, warn};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

#[derive(Clone, Debug)]
pub struct ContextOptions {
    pub app_name: String,
    /// Enable `VK_LAYER_KHRONOS_validation` and route its output into `tracing`.
    pub validation: bool,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            app_name: "vesuv".to_owned(),
            validation: cfg!(debug_assertions),
        }
    }
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if data.is_null() || (*data).p_message.is_null() {
        return vk::FALSE;
    }
    let msg = CStr::from_ptr((*data).p_message).to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(target: "vulkan", "{msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!(target: "vulkan", "{msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        debug!(target: "vulkan", "{msg}");
    } else {
        trace!(target: "vulkan", "{msg}");
    }
    vk::FALSE
}

struct DebugMessenger {
    loader: debug_utils::Instance,
    handle: vk::DebugUtilsMessengerEXT,
}

/// Owns the `VkInstance` (and the debug messenger attached to it).
pub struct InstanceHandle {
    debug: Option<DebugMessenger>,
    raw: ash::Instance,
    /// Keeps the loader library mapped until the instance is gone.
    _entry: Entry,
}

impl Deref for InstanceHandle {
    type Target = ash::Instance;

    fn deref(&self) -> &ash::Instance {
        &self.raw
    }
}

impl Drop for InstanceHandle {
    fn drop(&mut self) {
        unsafe {
            if let Some(dbg) = self.debug.take() {
                dbg.loader.destroy_debug_utils_messenger(dbg.handle, None);
            }
            self.raw.destroy_instance(None);
        }
        debug!("vk: instance destroyed");
    }
}

/// Owns the window surface. Must outlive every swapchain created on it.
pub struct SurfaceHandle {
    loader: surface::Instance,
    raw: vk::SurfaceKHR,
    _instance: Arc<InstanceHandle>,
}

impl SurfaceHandle {
    pub fn loader(&self) -> &surface::Instance {
        &self.loader
    }

    pub fn raw(&self) -> vk::SurfaceKHR {
        self.raw
    }
}

impl Drop for SurfaceHandle {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_surface(self.raw, None) };
        debug!("vk: surface destroyed");
    }
}

/// Owns the logical device. Every device-level object holds an `Arc` to this.
pub struct DeviceHandle {
    raw: ash::Device,
    _instance: Arc<InstanceHandle>,
}

impl Deref for DeviceHandle {
    type Target = ash::Device;

    fn deref(&self) -> &ash::Device {
        &self.raw
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        unsafe {
            self.raw.device_wait_idle().ok();
            self.raw.destroy_device(None);
        }
        debug!("vk: device destroyed");
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    /// Graphics and present work land on the same family.
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// Everything the presentation engine consumes from device setup.
pub struct GpuContext {
    swapchain_loader: swapchain::Device,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    families: QueueFamilies,
    physical: vk::PhysicalDevice,
    device: Arc<DeviceHandle>,
    surface: Arc<SurfaceHandle>,
    instance: Arc<InstanceHandle>,
}

impl GpuContext {
    pub fn new<W>(window: &W, opts: &ContextOptions) -> Result<Self>
    where
        W: HasWindowHandle + HasDisplayHandle + ?Sized,
    {
        unsafe { build_context(window, opts) }
    }

    pub fn surface(&self) -> &Arc<SurfaceHandle> {
        &self.surface
    }

    pub fn device(&self) -> &Arc<DeviceHandle> {
        &self.device
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical
    }

    pub fn swapchain_loader(&self) -> &swapchain::Device {
        &self.swapchain_loader
    }

    pub fn queue_families(&self) -> QueueFamilies {
        self.families
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    pub fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties {
        unsafe {
            self.instance
                .get_physical_device_memory_properties(self.physical)
        }
    }
}

unsafe fn create_instance(
    entry: &Entry,
    display_raw: RawDisplayHandle,
    opts: &ContextOptions,
) -> Result<InstanceHandle> {
    let app_name = CString::new(opts.app_name.as_str()).context("app name contains NUL")?;
    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: app_name.as_ptr(),
        application_version: 0,
        p_engine_name: app_name.as_ptr(),
        engine_version: 0,
        api_version: vk::API_VERSION_1_0,
        ..Default::default()
    };

    let mut extensions: Vec<*const c_char> =
        ash_window::enumerate_required_extensions(display_raw)
            .context("enumerate_required_extensions")?
            .to_vec();

    let validation = opts.validation && validation_layer_present(entry);
    if opts.validation && !validation {
        warn!("vk: validation requested but {VALIDATION_LAYER:?} is not installed");
    }
    let layers: Vec<*const c_char> = if validation {
        extensions.push(debug_utils::NAME.as_ptr());
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        Vec::new()
    };

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: extensions.len() as u32,
        pp_enabled_extension_names: extensions.as_ptr(),
        enabled_layer_count: layers.len() as u32,
        pp_enabled_layer_names: layers.as_ptr(),
        ..Default::default()
    };
    let raw = entry
        .create_instance(&create_info, None)
        .context("create_instance")?;

    let debug = if validation {
        let loader = debug_utils::Instance::new(entry, &raw);
        let ci = vk::DebugUtilsMessengerCreateInfoEXT {
            s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
            message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            pfn_user_callback: Some(debug_callback),
            ..Default::default()
        };
        match loader.create_debug_utils_messenger(&ci, None) {
            Ok(handle) => Some(DebugMessenger { loader, handle }),
            Err(e) => {
                warn!("vk: debug messenger unavailable: {e}");
                None
            }
        }
    } else {
        None
    };

    let validation_enabled = debug.is_some();
    info!("vk: instance created (validation={validation_enabled})");
    Ok(InstanceHandle {
        debug,
        raw,
        _entry: entry.clone(),
    })
}

unsafe fn validation_layer_present(entry: &Entry) -> bool {
    entry
        .enumerate_instance_layer_properties()
        .unwrap_or_default()
        .iter()
        .any(|l| CStr::from_ptr(l.layer_name.as_ptr()) == VALIDATION_LAYER)
}

/// Queue families able to do graphics and to present to `surface`.
unsafe fn find_queue_families(
    instance: &ash::Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
    phys: vk::PhysicalDevice,
) -> Option<QueueFamilies> {
    let props = instance.get_physical_device_queue_family_properties(phys);
    let mut graphics = None;
    let mut present = None;
    for (i, q) in props.iter().enumerate() {
        let i = i as u32;
        let can_present = surface_loader
            .get_physical_device_surface_support(phys, i, surface)
            .unwrap_or(false);
        let can_draw = q.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        // A family that does both is preferred.
        if can_draw && can_present {
            return Some(QueueFamilies {
                graphics: i,
                present: i,
            });
        }
        if can_draw && graphics.is_none() {
            graphics = Some(i);
        }
        if can_present && present.is_none() {
            present = Some(i);
        }
    }
    Some(QueueFamilies {
        graphics: graphics?,
        present: present?,
    })
}

unsafe fn is_device_suitable(
    instance: &ash::Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
    phys: vk::PhysicalDevice,
) -> Option<QueueFamilies> {
    let families = find_queue_families(instance, surface_loader, surface, phys)?;

    let has_swapchain = instance
        .enumerate_device_extension_properties(phys)
        .unwrap_or_default()
        .iter()
        .any(|e| CStr::from_ptr(e.extension_name.as_ptr()) == swapchain::NAME);
    if !has_swapchain {
        return None;
    }

    let formats = surface_loader
        .get_physical_device_surface_formats(phys, surface)
        .unwrap_or_default();
    let modes = surface_loader
        .get_physical_device_surface_present_modes(phys, surface)
        .unwrap_or_default();
    if formats.is_empty() || modes.is_empty() {
        return None;
    }
    Some(families)
}

unsafe fn pick_physical_device(
    instance: &ash::Instance,
    surface: &SurfaceHandle,
) -> Result<(vk::PhysicalDevice, QueueFamilies)> {
    for phys in instance
        .enumerate_physical_devices()
        .context("enumerate_physical_devices")?
    {
        if let Some(families) = is_device_suitable(instance, surface.loader(), surface.raw(), phys)
        {
            let props = instance.get_physical_device_properties(phys);
            let name = CStr::from_ptr(props.device_name.as_ptr()).to_string_lossy();
            info!(
                "vk: using {name} (graphics family {}, present family {})",
                families.graphics, families.present
            );
            return Ok((phys, families));
        }
    }
    Err(anyhow!("no physical device can draw and present to this surface"))
}

unsafe fn build_context<W>(window: &W, opts: &ContextOptions) -> Result<GpuContext>
where
    W: HasWindowHandle + HasDisplayHandle + ?Sized,
{
    // STRICT ORDER: instance → surface → device picked against that surface.
    let entry = Entry::load().context("load Vulkan loader")?;
    let display_raw = window
        .display_handle()
        .map_err(|e| anyhow!("display_handle: {e}"))?
        .as_raw();
    let instance = Arc::new(create_instance(&entry, display_raw, opts)?);

    let window_raw = window
        .window_handle()
        .map_err(|e| anyhow!("window_handle: {e}"))?
        .as_raw();
    let raw_surface = ash_window::create_surface(&entry, &instance, display_raw, window_raw, None)
        .context("ash_window::create_surface")?;
    let surface = Arc::new(SurfaceHandle {
        loader: surface::Instance::new(&entry, &instance),
        raw: raw_surface,
        _instance: instance.clone(),
    });

    let (physical, families) = pick_physical_device(&instance, &surface)?;

    let priorities = [1.0_f32];
    let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
        .unique()
        .into_iter()
        .map(|family| vk::DeviceQueueCreateInfo {
            s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
            queue_family_index: family,
            queue_count: 1,
            p_queue_priorities: priorities.as_ptr(),
            ..Default::default()
        })
        .collect();

    let device_exts = [swapchain::NAME.as_ptr()];
    let features = vk::PhysicalDeviceFeatures::default();
    let device_info = vk::DeviceCreateInfo {
        s_type: vk::StructureType::DEVICE_CREATE_INFO,
        queue_create_info_count: queue_infos.len() as u32,
        p_queue_create_infos: queue_infos.as_ptr(),
        enabled_extension_count: device_exts.len() as u32,
        pp_enabled_extension_names: device_exts.as_ptr(),
        p_enabled_features: &features,
        ..Default::default()
    };
    let raw_device = instance
        .create_device(physical, &device_info, None)
        .context("create_device")?;

    let graphics_queue = raw_device.get_device_queue(families.graphics, 0);
    let present_queue = raw_device.get_device_queue(families.present, 0);
    let swapchain_loader = swapchain::Device::new(&instance, &raw_device);

    let device = Arc::new(DeviceHandle {
        raw: raw_device,
        _instance: instance.clone(),
    });

    Ok(GpuContext {
        swapchain_loader,
        graphics_queue,
        present_queue,
        families,
        physical,
        device,
        surface,
        instance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_family_is_listed_once() {
        let families = QueueFamilies {
            graphics: 0,
            present: 0,
        };
        assert!(families.is_shared());
        assert_eq!(families.unique(), vec![0]);
    }

    #[test]
    fn split_families_list_graphics_first() {
        let families = QueueFamilies {
            graphics: 2,
            present: 1,
        };
        assert!(!families.is_shared());
        assert_eq!(families.unique(), vec![2, 1]);
    }

    #[test]
    fn validation_follows_build_profile_by_default() {
        assert_eq!(ContextOptions::default().validation, cfg!(debug_assertions));
    }
}
