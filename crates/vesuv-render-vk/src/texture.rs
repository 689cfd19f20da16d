// SPDX-License-Identifier: CEPL-1.0
//! Sampled 2D textures: decoding, staged upload and the sampler that reads them.
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use ash::vk;
use image::RgbaImage;
use tracing::{debug, info};

use crate::buffer::{find_memory_type, GpuBuffer};
use crate::command::CommandPool;
use crate::context::{DeviceHandle, GpuContext};
use crate::owned::Owned;

/// Texels are uploaded as 8-bit sRGB RGBA.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Reads an image file and converts it to RGBA8.
pub fn decode(path: &Path) -> Result<RgbaImage> {
    let img = image::open(path).with_context(|| format!("decode {}", path.display()))?;
    Ok(img.to_rgba8())
}

/// Barrier parameters for one image layout change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutTransition {
    pub old: vk::ImageLayout,
    pub new: vk::ImageLayout,
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

impl LayoutTransition {
    /// The two transitions an upload needs; anything else is `None`.
    pub fn between(old: vk::ImageLayout, new: vk::ImageLayout) -> Option<Self> {
        use vk::ImageLayout as L;
        let (src_access, dst_access, src_stage, dst_stage) = match (old, new) {
            (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => (
                vk::AccessFlags::empty(),
                vk::AccessFlags::TRANSFER_WRITE,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
            ),
            (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => (
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::SHADER_READ,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
            ),
            _ => return None,
        };
        Some(Self {
            old,
            new,
            src_access,
            dst_access,
            src_stage,
            dst_stage,
        })
    }

    fn barrier(&self, image: vk::Image) -> vk::ImageMemoryBarrier<'static> {
        vk::ImageMemoryBarrier {
            s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
            src_access_mask: self.src_access,
            dst_access_mask: self.dst_access,
            old_layout: self.old,
            new_layout: self.new,
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            image,
            subresource_range: COLOR_RANGE,
            ..Default::default()
        }
    }

    unsafe fn record(&self, device: &ash::Device, cmd: vk::CommandBuffer, image: vk::Image) {
        let barrier = self.barrier(image);
        device.cmd_pipeline_barrier(
            cmd,
            self.src_stage,
            self.dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            std::slice::from_ref(&barrier),
        );
    }
}

const COLOR_RANGE: vk::ImageSubresourceRange = vk::ImageSubresourceRange {
    aspect_mask: vk::ImageAspectFlags::COLOR,
    base_mip_level: 0,
    level_count: 1,
    base_array_layer: 0,
    layer_count: 1,
};

/// Linear filtering, the same address mode on all three axes, no mips and no
/// anisotropy.
pub fn create_sampler(
    device: &Arc<DeviceHandle>,
    filter: vk::Filter,
    address_mode: vk::SamplerAddressMode,
) -> Result<Owned<vk::Sampler>> {
    let info = vk::SamplerCreateInfo {
        s_type: vk::StructureType::SAMPLER_CREATE_INFO,
        mag_filter: filter,
        min_filter: filter,
        mipmap_mode: vk::SamplerMipmapMode::LINEAR,
        address_mode_u: address_mode,
        address_mode_v: address_mode,
        address_mode_w: address_mode,
        anisotropy_enable: vk::FALSE,
        compare_enable: vk::FALSE,
        compare_op: vk::CompareOp::ALWAYS,
        border_color: vk::BorderColor::INT_OPAQUE_BLACK,
        unnormalized_coordinates: vk::FALSE,
        ..Default::default()
    };
    let sampler = unsafe { device.create_sampler(&info, None) }.context("create_sampler")?;
    Ok(Owned::new(device, sampler))
}

/// A device-local, shader-readable image with its view and sampler.
///
/// Field order is teardown order; the memory goes last.
pub struct Texture {
    sampler: Owned<vk::Sampler>,
    view: Owned<vk::ImageView>,
    image: Owned<vk::Image>,
    memory: Owned<vk::DeviceMemory>,
}

impl Texture {
    /// Copies `pixels` into a new optimal-tiling image through a staging
    /// buffer and leaves it in `SHADER_READ_ONLY_OPTIMAL`. Blocks until done.
    pub fn upload(ctx: &GpuContext, pool: &CommandPool, pixels: &RgbaImage) -> Result<Self> {
        let (width, height) = pixels.dimensions();
        if width == 0 || height == 0 {
            bail!("texture has no texels ({width}x{height})");
        }
        let device = ctx.device();
        let mem_props = ctx.memory_properties();

        let staging = GpuBuffer::host_visible_with(
            device,
            &mem_props,
            vk::BufferUsageFlags::TRANSFER_SRC,
            pixels.as_raw().as_slice(),
        )?;

        let info = vk::ImageCreateInfo {
            s_type: vk::StructureType::IMAGE_CREATE_INFO,
            image_type: vk::ImageType::TYPE_2D,
            format: TEXTURE_FORMAT,
            extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };
        let image = Owned::new(
            device,
            unsafe { device.create_image(&info, None) }.context("create_image")?,
        );
        let req = unsafe { device.get_image_memory_requirements(image.raw()) };
        let memory_type_index = find_memory_type(
            &mem_props,
            req.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )
        .ok_or_else(|| anyhow!("no device-local memory for texture (type bits {:#b})", req.memory_type_bits))?;
        let alloc = vk::MemoryAllocateInfo {
            s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
            allocation_size: req.size,
            memory_type_index,
            ..Default::default()
        };
        let memory = Owned::new(
            device,
            unsafe { device.allocate_memory(&alloc, None) }.context("allocate_memory")?,
        );
        unsafe { device.bind_image_memory(image.raw(), memory.raw(), 0) }
            .context("bind_image_memory")?;

        let to_transfer =
            LayoutTransition::between(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .ok_or_else(|| anyhow!("no upload transition"))?;
        let to_shader = LayoutTransition::between(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .ok_or_else(|| anyhow!("no sampling transition"))?;
        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D::default(),
            image_extent: info.extent,
        };
        pool.one_shot(|d, cmd| unsafe {
            to_transfer.record(d, cmd, image.raw());
            d.cmd_copy_buffer_to_image(
                cmd,
                staging.raw(),
                image.raw(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                std::slice::from_ref(&region),
            );
            to_shader.record(d, cmd, image.raw());
        })?;
        debug!("vk: texture texels staged and copied");

        let view_info = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            image: image.raw(),
            view_type: vk::ImageViewType::TYPE_2D,
            format: TEXTURE_FORMAT,
            components: vk::ComponentMapping::default(),
            subresource_range: COLOR_RANGE,
            ..Default::default()
        };
        let view = Owned::new(
            device,
            unsafe { device.create_image_view(&view_info, None) }.context("create_image_view")?,
        );
        let sampler = create_sampler(device, vk::Filter::LINEAR, vk::SamplerAddressMode::REPEAT)?;

        info!("vk: texture {width}x{height} uploaded");
        Ok(Self {
            sampler,
            view,
            image,
            memory,
        })
    }

    /// What a `COMBINED_IMAGE_SAMPLER` write points at.
    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler.raw(),
            image_view: self.view.raw(),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn upload_transitions_are_ordered_through_transfer() {
        let first =
            LayoutTransition::between(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .unwrap();
        assert_eq!(first.src_access, vk::AccessFlags::empty());
        assert_eq!(first.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(first.dst_stage, vk::PipelineStageFlags::TRANSFER);

        let second = LayoutTransition::between(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        // The copy's writes must be visible before the fragment stage samples.
        assert_eq!(second.src_access, first.dst_access);
        assert_eq!(second.src_stage, first.dst_stage);
        assert_eq!(second.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(second.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn other_transitions_are_rejected() {
        assert_eq!(
            LayoutTransition::between(
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL
            ),
            None
        );
        assert_eq!(
            LayoutTransition::between(vk::ImageLayout::UNDEFINED, vk::ImageLayout::PRESENT_SRC_KHR),
            None
        );
    }

    #[test]
    fn barrier_covers_the_single_colour_level() {
        let t = LayoutTransition::between(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .unwrap();
        let b = t.barrier(vk::Image::null());
        assert_eq!(b.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(b.new_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert_eq!(b.subresource_range.level_count, 1);
        assert_eq!(b.subresource_range.aspect_mask, vk::ImageAspectFlags::COLOR);
        assert_eq!(b.src_queue_family_index, vk::QUEUE_FAMILY_IGNORED);
    }

    #[test]
    fn decode_reads_png_as_rgba8() {
        let path = std::env::temp_dir().join(format!("vesuv-decode-{}.png", std::process::id()));
        let src = RgbaImage::from_fn(3, 2, |x, y| image::Rgba([x as u8 * 80, y as u8 * 200, 7, 255]));
        src.save(&path).unwrap();

        let decoded = decode(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.get_pixel(2, 1).0, [160, 200, 7, 255]);
    }

    #[test]
    fn decode_reports_missing_files() {
        let err = decode(Path::new("does/not/exist.png")).unwrap_err();
        assert!(format!("{err:#}").contains("exist.png"));
    }
}
