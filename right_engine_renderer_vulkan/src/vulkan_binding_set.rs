/// VulkanBindingSet - Vulkan implementation of the BindingSet trait

use right_engine::right::{Error, Result};
use right_engine::right::render::{BindingSet, BindingWrite};
use ash::vk;
use rustc_hash::FxHashMap;
use std::any::Any;
use std::sync::{Arc, Mutex};

use crate::vulkan_buffer::VulkanBuffer;
use crate::vulkan_context::GpuContext;
use crate::vulkan_sampler::VulkanSampler;
use crate::vulkan_texture::VulkanTexture;

/// Vulkan binding set implementation
///
/// Wraps one VkDescriptorSet allocated against a pipeline's set layout.
/// Written resources are retained per slot so the GPU never reads a
/// destroyed image or buffer.
pub struct VulkanBindingSet {
    ctx: Arc<GpuContext>,
    pool: vk::DescriptorPool,
    pub(crate) descriptor_set: vk::DescriptorSet,
    /// Used by textures without a sampler of their own
    default_sampler: Arc<VulkanSampler>,
    /// Slots in the layout
    layout_slots: Vec<u32>,
    resources: Mutex<FxHashMap<u32, BindingWrite>>,
}

impl VulkanBindingSet {
    pub(crate) fn create(
        ctx: &Arc<GpuContext>,
        set_layout: vk::DescriptorSetLayout,
        layout_slots: Vec<u32>,
        default_sampler: Arc<VulkanSampler>,
    ) -> Result<Arc<Self>> {
        let (pool, descriptor_set) = ctx.allocate_descriptor_set(set_layout)?;
        Ok(Arc::new(Self {
            ctx: Arc::clone(ctx),
            pool,
            descriptor_set,
            default_sampler,
            layout_slots,
            resources: Mutex::new(FxHashMap::default()),
        }))
    }
}

impl BindingSet for VulkanBindingSet {
    fn write(&self, writes: &[BindingWrite]) -> Result<()> {
        // Resolve every write before touching the set
        let mut image_infos: Vec<(u32, vk::DescriptorImageInfo)> = Vec::new();
        let mut buffer_infos: Vec<(u32, vk::DescriptorBufferInfo)> = Vec::new();

        for write in writes {
            if !self.layout_slots.contains(&write.slot()) {
                return Err(Error::InvalidResource(format!("slot {} is not in the layout", write.slot())));
            }
            match write {
                BindingWrite::Texture { slot, texture } => {
                    let vk_texture = texture
                        .as_any()
                        .downcast_ref::<VulkanTexture>()
                        .ok_or_else(|| Error::InvalidResource("texture is not a Vulkan texture".to_string()))?;
                    let sampler = match texture.sampler() {
                        Some(sampler) => sampler
                            .as_any()
                            .downcast_ref::<VulkanSampler>()
                            .map(|s| s.sampler)
                            .ok_or_else(|| Error::InvalidResource("sampler is not a Vulkan sampler".to_string()))?,
                        None => self.default_sampler.sampler,
                    };
                    image_infos.push((*slot, vk::DescriptorImageInfo {
                        sampler,
                        image_view: vk_texture.view,
                        image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    }));
                }
                BindingWrite::Buffer { slot, buffer, offset, range } => {
                    let vk_buffer = buffer
                        .as_any()
                        .downcast_ref::<VulkanBuffer>()
                        .ok_or_else(|| Error::InvalidResource("buffer is not a Vulkan buffer".to_string()))?;
                    buffer_infos.push((*slot, vk::DescriptorBufferInfo {
                        buffer: vk_buffer.buffer,
                        offset: *offset,
                        range: *range,
                    }));
                }
            }
        }

        let mut descriptor_writes: Vec<vk::WriteDescriptorSet> = Vec::with_capacity(writes.len());
        for (slot, info) in &image_infos {
            descriptor_writes.push(
                vk::WriteDescriptorSet::default()
                    .dst_set(self.descriptor_set)
                    .dst_binding(*slot)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(std::slice::from_ref(info)),
            );
        }
        for (slot, info) in &buffer_infos {
            descriptor_writes.push(
                vk::WriteDescriptorSet::default()
                    .dst_set(self.descriptor_set)
                    .dst_binding(*slot)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(std::slice::from_ref(info)),
            );
        }

        unsafe {
            self.ctx.device.update_descriptor_sets(&descriptor_writes, &[]);
        }

        if let Ok(mut resources) = self.resources.lock() {
            for write in writes {
                resources.insert(write.slot(), write.clone());
            }
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanBindingSet {
    fn drop(&mut self) {
        self.ctx.free_descriptor_set(self.pool, self.descriptor_set);
    }
}
