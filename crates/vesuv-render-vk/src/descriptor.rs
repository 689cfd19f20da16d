// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use ash::vk;
use bytemuck::Pod;
use vesuv_render::MAX_FRAMES_IN_FLIGHT;

use crate::buffer::UniformBuffers;
use crate::command::DescriptorBinding;
use crate::context::DeviceHandle;
use crate::owned::Owned;
use crate::pipeline::set_layout_bindings;
use crate::texture::Texture;

/// Pool capacity for `sets` copies of the set-0 layout.
pub fn pool_sizes(sets: u32) -> Vec<vk::DescriptorPoolSize> {
    set_layout_bindings()
        .iter()
        .map(|b| vk::DescriptorPoolSize {
            ty: b.descriptor_type,
            descriptor_count: b.descriptor_count * sets,
        })
        .collect()
}

/// One descriptor set per frame slot, from a dedicated pool. Slot `i` sees
/// uniform buffer `i` and the shared texture.
pub struct FrameDescriptors {
    sets: [vk::DescriptorSet; MAX_FRAMES_IN_FLIGHT],
    pool: Owned<vk::DescriptorPool>,
}

impl FrameDescriptors {
    pub fn new<T: Pod>(
        device: &Arc<DeviceHandle>,
        layout: vk::DescriptorSetLayout,
        uniforms: &UniformBuffers<T, MAX_FRAMES_IN_FLIGHT>,
        texture: &Texture,
    ) -> Result<Self> {
        let sizes = pool_sizes(MAX_FRAMES_IN_FLIGHT as u32);
        let pool_info = vk::DescriptorPoolCreateInfo {
            s_type: vk::StructureType::DESCRIPTOR_POOL_CREATE_INFO,
            max_sets: MAX_FRAMES_IN_FLIGHT as u32,
            pool_size_count: sizes.len() as u32,
            p_pool_sizes: sizes.as_ptr(),
            ..Default::default()
        };
        let pool = Owned::new(
            device,
            unsafe { device.create_descriptor_pool(&pool_info, None) }
                .context("create_descriptor_pool")?,
        );

        let layouts = [layout; MAX_FRAMES_IN_FLIGHT];
        let alloc = vk::DescriptorSetAllocateInfo {
            s_type: vk::StructureType::DESCRIPTOR_SET_ALLOCATE_INFO,
            descriptor_pool: pool.raw(),
            descriptor_set_count: layouts.len() as u32,
            p_set_layouts: layouts.as_ptr(),
            ..Default::default()
        };
        let sets = unsafe { device.allocate_descriptor_sets(&alloc) }
            .context("allocate_descriptor_sets")?;
        let sets: [vk::DescriptorSet; MAX_FRAMES_IN_FLIGHT] = sets
            .try_into()
            .map_err(|_| anyhow!("descriptor set count mismatch"))?;

        let range = std::mem::size_of::<T>() as vk::DeviceSize;
        let image_info = texture.descriptor_info();
        for (slot, &set) in sets.iter().enumerate() {
            let buffer_info = vk::DescriptorBufferInfo {
                buffer: uniforms.buffer(slot),
                offset: 0,
                range,
            };
            let writes = [
                vk::WriteDescriptorSet {
                    s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
                    dst_set: set,
                    dst_binding: 0,
                    dst_array_element: 0,
                    descriptor_count: 1,
                    descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
                    p_buffer_info: &buffer_info,
                    ..Default::default()
                },
                vk::WriteDescriptorSet {
                    s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
                    dst_set: set,
                    dst_binding: 1,
                    dst_array_element: 0,
                    descriptor_count: 1,
                    descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                    p_image_info: &image_info,
                    ..Default::default()
                },
            ];
            unsafe { device.update_descriptor_sets(&writes, &[]) };
        }

        Ok(Self { sets, pool })
    }

    pub fn binding(&self) -> DescriptorBinding {
        DescriptorBinding::PerFrame(self.sets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_holds_every_binding_for_every_slot() {
        let sizes = pool_sizes(MAX_FRAMES_IN_FLIGHT as u32);
        assert_eq!(sizes.len(), 2);
        for (size, binding) in sizes.iter().zip(set_layout_bindings()) {
            assert_eq!(size.ty, binding.descriptor_type);
            assert_eq!(size.descriptor_count, MAX_FRAMES_IN_FLIGHT as u32);
        }
        assert!(sizes
            .iter()
            .any(|s| s.ty == vk::DescriptorType::COMBINED_IMAGE_SAMPLER));
    }
}
