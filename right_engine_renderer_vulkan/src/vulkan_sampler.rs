/// VulkanSampler and SamplerCache
///
/// Samplers are immutable, so identical descriptors share one VkSampler.
/// Typical scenes only need a handful of them.

use right_engine::right::Result;
use right_engine::right::render::{AddressMode, Sampler, SamplerDesc};
use right_engine::engine_err;
use ash::vk;
use rustc_hash::FxHashMap;
use std::any::Any;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{address_mode_to_vk, filter_to_vk, mipmap_mode_to_vk};

/// Vulkan sampler implementation
pub struct VulkanSampler {
    ctx: Arc<GpuContext>,
    desc: SamplerDesc,
    pub(crate) sampler: vk::Sampler,
}

impl VulkanSampler {
    fn create(ctx: &Arc<GpuContext>, desc: &SamplerDesc, max_anisotropy: f32) -> Result<Self> {
        let border = if desc.address_mode_u == AddressMode::ClampToBorder {
            vk::BorderColor::FLOAT_OPAQUE_WHITE
        } else {
            vk::BorderColor::FLOAT_OPAQUE_BLACK
        };
        let max_lod = if desc.is_mip_mapped { desc.max_lod } else { 0.0 };

        let mut create_info = vk::SamplerCreateInfo::default()
            .mag_filter(filter_to_vk(desc.mag_filter))
            .min_filter(filter_to_vk(desc.min_filter))
            .mipmap_mode(mipmap_mode_to_vk(desc.mip_filter))
            .address_mode_u(address_mode_to_vk(desc.address_mode_u))
            .address_mode_v(address_mode_to_vk(desc.address_mode_v))
            .address_mode_w(address_mode_to_vk(desc.address_mode_w))
            .mip_lod_bias(0.0)
            .min_lod(desc.min_lod)
            .max_lod(max_lod.max(desc.min_lod))
            .border_color(border)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .unnormalized_coordinates(false);

        if max_anisotropy > 1.0 {
            create_info = create_info
                .anisotropy_enable(true)
                .max_anisotropy(max_anisotropy);
        } else {
            create_info = create_info
                .anisotropy_enable(false)
                .max_anisotropy(1.0);
        }

        let sampler = unsafe {
            ctx.device.create_sampler(&create_info, None)
                .map_err(|e| engine_err!("right::vulkan", "Failed to create sampler: {:?}", e))?
        };

        Ok(Self { ctx: Arc::clone(ctx), desc: *desc, sampler })
    }
}

impl Sampler for VulkanSampler {
    fn desc(&self) -> &SamplerDesc {
        &self.desc
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanSampler {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_sampler(self.sampler, None);
        }
    }
}

/// Hashable identity of a sampler descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SamplerKey {
    filters: [u8; 3],
    address_modes: [u8; 3],
    is_mip_mapped: bool,
    min_lod: u32,
    max_lod: u32,
}

impl From<&SamplerDesc> for SamplerKey {
    fn from(desc: &SamplerDesc) -> Self {
        Self {
            filters: [desc.min_filter as u8, desc.mag_filter as u8, desc.mip_filter as u8],
            address_modes: [
                desc.address_mode_u as u8,
                desc.address_mode_v as u8,
                desc.address_mode_w as u8,
            ],
            is_mip_mapped: desc.is_mip_mapped,
            min_lod: desc.min_lod.to_bits(),
            max_lod: desc.max_lod.to_bits(),
        }
    }
}

/// Sampler cache, creates a VkSampler on first use of a descriptor
pub(crate) struct SamplerCache {
    ctx: Arc<GpuContext>,
    max_anisotropy: f32,
    cache: FxHashMap<SamplerKey, Arc<VulkanSampler>>,
}

impl SamplerCache {
    pub(crate) fn new(ctx: Arc<GpuContext>, max_anisotropy: f32) -> Self {
        Self {
            ctx,
            max_anisotropy,
            cache: FxHashMap::default(),
        }
    }

    /// Get or create the sampler for `desc`
    pub(crate) fn get(&mut self, desc: &SamplerDesc) -> Result<Arc<VulkanSampler>> {
        let key = SamplerKey::from(desc);
        if let Some(sampler) = self.cache.get(&key) {
            return Ok(Arc::clone(sampler));
        }

        let sampler = Arc::new(VulkanSampler::create(&self.ctx, desc, self.max_anisotropy)?);
        self.cache.insert(key, Arc::clone(&sampler));
        Ok(sampler)
    }

    pub(crate) fn len(&self) -> usize {
        self.cache.len()
    }
}
