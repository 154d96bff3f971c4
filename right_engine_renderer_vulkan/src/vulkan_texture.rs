/// VulkanTexture - Vulkan implementation of the Texture trait
///
/// Every texture rests in SHADER_READ_ONLY_OPTIMAL between operations:
/// uploads, copies and render passes all transition back to it.

use right_engine::right::{Error, Result};
use right_engine::right::render::{
    check_copy_region, Buffer, BufferDesc, BufferType, MemoryType, Sampler, Texture, TextureCopy,
    TextureDesc, TextureType,
};
use right_engine::{engine_err, engine_error};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use std::any::Any;
use std::sync::{Arc, RwLock};

use crate::vulkan_buffer::VulkanBuffer;
use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{full_aspect, sampled_aspect, texture_format_to_vk, texture_usage_to_layout};

/// Vulkan texture implementation
pub struct VulkanTexture {
    /// Shared GPU context
    ctx: Arc<GpuContext>,
    /// Descriptor the texture was created with
    desc: TextureDesc,
    /// Vulkan image
    pub(crate) image: vk::Image,
    /// View over every mip and layer, used for sampling
    pub(crate) view: vk::ImageView,
    /// View over mip 0 / layer 0 with every aspect, used as attachment
    pub(crate) attachment_view: vk::ImageView,
    /// GPU memory allocation
    allocation: Option<Allocation>,
    /// Sampler used when bound
    sampler: RwLock<Option<Arc<dyn Sampler>>>,
}

impl VulkanTexture {
    /// Create a texture and upload `data` (mip 0 of every layer)
    ///
    /// Depth formats skip the upload. Without data the image is only
    /// transitioned to shader-read-only, so render targets can be loaded
    /// by a later pass.
    pub(crate) fn create(ctx: &Arc<GpuContext>, desc: &TextureDesc, data: &[u8]) -> Result<Arc<Self>> {
        if desc.width == 0 || desc.height == 0 || desc.mip_levels == 0 {
            return Err(engine_err!("right::vulkan",
                "Invalid texture size {}x{} with {} mips", desc.width, desc.height, desc.mip_levels));
        }

        let texture = Self::allocate(ctx, desc)?;

        let upload = !data.is_empty() && !desc.format.is_depth();
        if upload {
            if (data.len() as u64) < desc.size_bytes() {
                return Err(Error::OutOfBounds(format!(
                    "texture data is {} bytes but a {}x{} {:?} needs {}",
                    data.len(), desc.width, desc.height, desc.texture_type, desc.size_bytes()
                )));
            }
            texture.upload(data)?;
        } else {
            let range = texture.range(0, desc.mip_levels, 0, desc.texture_type.layer_count());
            ctx.one_shot(|device, cb| {
                cmd_transition(device, cb, texture.image, range,
                    vk::ImageLayout::UNDEFINED, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
                Ok(())
            })?;
        }

        Ok(Arc::new(texture))
    }

    fn allocate(ctx: &Arc<GpuContext>, desc: &TextureDesc) -> Result<Self> {
        let format = texture_format_to_vk(desc.format);
        let array_layers = desc.texture_type.layer_count();
        let is_cubemap = desc.texture_type == TextureType::Cubemap;

        let attachment_usage = if desc.format.is_depth() {
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
        } else {
            vk::ImageUsageFlags::COLOR_ATTACHMENT
        };
        let usage_flags = vk::ImageUsageFlags::SAMPLED
            | vk::ImageUsageFlags::TRANSFER_SRC
            | vk::ImageUsageFlags::TRANSFER_DST
            | attachment_usage;

        let create_flags = if is_cubemap {
            vk::ImageCreateFlags::CUBE_COMPATIBLE
        } else {
            vk::ImageCreateFlags::empty()
        };

        unsafe {
            let image_create_info = vk::ImageCreateInfo::default()
                .flags(create_flags)
                .image_type(vk::ImageType::TYPE_2D)
                .format(format)
                .extent(vk::Extent3D { width: desc.width, height: desc.height, depth: 1 })
                .mip_levels(desc.mip_levels)
                .array_layers(array_layers)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(usage_flags)
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);

            let image = ctx.device.create_image(&image_create_info, None)
                .map_err(|e| engine_err!("right::vulkan", "Failed to create texture image: {:?}", e))?;

            let requirements = ctx.device.get_image_memory_requirements(image);

            let allocation = ctx.allocator.lock()
                .map_err(|_| engine_err!("right::vulkan", "Allocator mutex poisoned"))
                .and_then(|mut allocator| {
                    allocator.allocate(&AllocationCreateDesc {
                        name: "texture",
                        requirements,
                        location: gpu_allocator::MemoryLocation::GpuOnly,
                        linear: false,
                        allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                    })
                    .map_err(|_e| {
                        let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                        engine_error!("right::vulkan", "Out of GPU memory for texture (size: {}x{}, layers: {}, {:.2} MB)",
                            desc.width, desc.height, array_layers, size_mb);
                        Error::OutOfMemory
                    })
                });

            let allocation = match allocation {
                Ok(allocation) => allocation,
                Err(e) => {
                    ctx.device.destroy_image(image, None);
                    return Err(e);
                }
            };

            // From here on Drop releases whatever was created
            let mut texture = Self {
                ctx: Arc::clone(ctx),
                desc: *desc,
                image,
                view: vk::ImageView::null(),
                attachment_view: vk::ImageView::null(),
                allocation: Some(allocation),
                sampler: RwLock::new(None),
            };

            if let Some(allocation) = &texture.allocation {
                ctx.device.bind_image_memory(image, allocation.memory(), allocation.offset())
                    .map_err(|e| engine_err!("right::vulkan", "Failed to bind texture image memory: {:?}", e))?;
            }

            let view_type = if is_cubemap { vk::ImageViewType::CUBE } else { vk::ImageViewType::TYPE_2D };
            let view_create_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(view_type)
                .format(format)
                .components(vk::ComponentMapping::default())
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: sampled_aspect(desc.format),
                    base_mip_level: 0,
                    level_count: desc.mip_levels,
                    base_array_layer: 0,
                    layer_count: array_layers,
                });
            texture.view = ctx.device.create_image_view(&view_create_info, None)
                .map_err(|e| engine_err!("right::vulkan", "Failed to create texture image view: {:?}", e))?;

            let attachment_view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format)
                .components(vk::ComponentMapping::default())
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: full_aspect(desc.format),
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            texture.attachment_view = ctx.device.create_image_view(&attachment_view_info, None)
                .map_err(|e| engine_err!("right::vulkan", "Failed to create attachment image view: {:?}", e))?;

            Ok(texture)
        }
    }

    /// Subresource range over every aspect of this texture
    fn range(&self, base_mip: u32, mip_count: u32, base_layer: u32, layer_count: u32) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: full_aspect(self.desc.format),
            base_mip_level: base_mip,
            level_count: mip_count,
            base_array_layer: base_layer,
            layer_count,
        }
    }

    /// Copy mip 0 of every layer from one staging buffer
    fn upload(&self, data: &[u8]) -> Result<()> {
        let layer_count = self.desc.texture_type.layer_count();
        let layer_size = self.desc.size_bytes() / layer_count as u64;
        let staging = VulkanBuffer::create(
            &self.ctx,
            &BufferDesc {
                size: self.desc.size_bytes(),
                buffer_type: BufferType::TransferSrc,
                memory_type: MemoryType::CpuGpu,
            },
            Some(&data[..self.desc.size_bytes() as usize]),
        )?;

        let full_range = self.range(0, self.desc.mip_levels, 0, layer_count);
        let regions: Vec<vk::BufferImageCopy> = (0..layer_count)
            .map(|layer| {
                vk::BufferImageCopy::default()
                    .buffer_offset(layer as u64 * layer_size)
                    .buffer_row_length(0)
                    .buffer_image_height(0)
                    .image_subresource(vk::ImageSubresourceLayers {
                        aspect_mask: sampled_aspect(self.desc.format),
                        mip_level: 0,
                        base_array_layer: layer,
                        layer_count: 1,
                    })
                    .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
                    .image_extent(vk::Extent3D { width: self.desc.width, height: self.desc.height, depth: 1 })
            })
            .collect();

        self.ctx.one_shot(|device, cb| {
            cmd_transition(device, cb, self.image, full_range,
                vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
            unsafe {
                device.cmd_copy_buffer_to_image(cb, staging.buffer, self.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL, &regions);
            }
            cmd_transition(device, cb, self.image, full_range,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
            Ok(())
        })
    }
}

impl Texture for VulkanTexture {
    fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    fn sampler(&self) -> Option<Arc<dyn Sampler>> {
        self.sampler.read().ok().and_then(|s| s.clone())
    }

    fn set_sampler(&self, sampler: Option<Arc<dyn Sampler>>) {
        if let Ok(mut slot) = self.sampler.write() {
            *slot = sampler;
        }
    }

    fn copy_from(&self, src: &dyn Texture, src_copy: &TextureCopy, dst_copy: &TextureCopy) -> Result<()> {
        let vk_src = src
            .as_any()
            .downcast_ref::<VulkanTexture>()
            .ok_or_else(|| Error::InvalidResource("copy source is not a Vulkan texture".to_string()))?;

        check_copy_region(src.desc(), src_copy)?;
        check_copy_region(&self.desc, dst_copy)?;

        let (width, height) = src.desc().mip_extent(src_copy.mip_level);
        let (dst_width, dst_height) = self.desc.mip_extent(dst_copy.mip_level);
        if width > dst_width || height > dst_height {
            return Err(Error::OutOfBounds(format!(
                "copy of {}x{} does not fit destination mip {} ({}x{})",
                width, height, dst_copy.mip_level, dst_width, dst_height
            )));
        }

        let src_range = vk_src.range(src_copy.mip_level, 1, src_copy.layer, 1);
        let dst_range = self.range(dst_copy.mip_level, 1, dst_copy.layer, 1);
        let src_layout = resting_layout(texture_usage_to_layout(src_copy.usage));
        let dst_layout = texture_usage_to_layout(dst_copy.usage);

        let region = vk::ImageCopy::default()
            .src_subresource(vk::ImageSubresourceLayers {
                aspect_mask: sampled_aspect(src.desc().format),
                mip_level: src_copy.mip_level,
                base_array_layer: src_copy.layer,
                layer_count: 1,
            })
            .dst_subresource(vk::ImageSubresourceLayers {
                aspect_mask: sampled_aspect(self.desc.format),
                mip_level: dst_copy.mip_level,
                base_array_layer: dst_copy.layer,
                layer_count: 1,
            })
            .extent(vk::Extent3D { width, height, depth: 1 });

        self.ctx.one_shot(|device, cb| {
            cmd_transition(device, cb, vk_src.image, src_range, src_layout, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
            cmd_transition(device, cb, self.image, dst_range, dst_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
            unsafe {
                device.cmd_copy_image(
                    cb,
                    vk_src.image,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    self.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
            }
            cmd_transition(device, cb, vk_src.image, src_range, vk::ImageLayout::TRANSFER_SRC_OPTIMAL, src_layout);
            cmd_transition(device, cb, self.image, dst_range, vk::ImageLayout::TRANSFER_DST_OPTIMAL, resting_layout(dst_layout));
            Ok(())
        })
    }

    fn data(&self) -> Result<Arc<dyn Buffer>> {
        // Depth readback returns the depth aspect only, 4 bytes per texel
        let texel_size = if self.desc.format.is_depth() { 4 } else { self.desc.format.bytes_per_pixel() as u64 };
        let size = self.desc.width as u64 * self.desc.height as u64 * texel_size;

        let readback = VulkanBuffer::create(
            &self.ctx,
            &BufferDesc { size, buffer_type: BufferType::TransferDst, memory_type: MemoryType::CpuOnly },
            None,
        )?;

        let range = self.range(0, 1, 0, 1);
        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: sampled_aspect(self.desc.format),
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(vk::Extent3D { width: self.desc.width, height: self.desc.height, depth: 1 });

        self.ctx.one_shot(|device, cb| {
            cmd_transition(device, cb, self.image, range,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
            unsafe {
                device.cmd_copy_image_to_buffer(cb, self.image, vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    readback.buffer, &[region]);
            }
            cmd_transition(device, cb, self.image, range,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
            Ok(())
        })?;

        Ok(readback)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanTexture {
    fn drop(&mut self) {
        unsafe {
            if self.attachment_view != vk::ImageView::null() {
                self.ctx.device.destroy_image_view(self.attachment_view, None);
            }
            if self.view != vk::ImageView::null() {
                self.ctx.device.destroy_image_view(self.view, None);
            }
            self.ctx.device.destroy_image(self.image, None);

            if let Some(allocation) = self.allocation.take() {
                if let Ok(mut allocator) = self.ctx.allocator.lock() {
                    allocator.free(allocation).ok();
                }
            }
        }
    }
}

/// A copy never leaves an image in UNDEFINED layout
fn resting_layout(layout: vk::ImageLayout) -> vk::ImageLayout {
    if layout == vk::ImageLayout::UNDEFINED {
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
    } else {
        layout
    }
}

/// Access mask and pipeline stage touching an image in `layout`
fn layout_access(layout: vk::ImageLayout) -> (vk::AccessFlags, vk::PipelineStageFlags) {
    match layout {
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => (vk::AccessFlags::TRANSFER_WRITE, vk::PipelineStageFlags::TRANSFER),
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => (vk::AccessFlags::TRANSFER_READ, vk::PipelineStageFlags::TRANSFER),
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => (vk::AccessFlags::SHADER_READ, vk::PipelineStageFlags::FRAGMENT_SHADER),
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => (
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ),
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => (
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        ),
        vk::ImageLayout::PRESENT_SRC_KHR => (vk::AccessFlags::empty(), vk::PipelineStageFlags::BOTTOM_OF_PIPE),
        _ => (vk::AccessFlags::empty(), vk::PipelineStageFlags::TOP_OF_PIPE),
    }
}

/// Record a layout transition of `range`
pub(crate) fn cmd_transition(
    device: &ash::Device,
    cb: vk::CommandBuffer,
    image: vk::Image,
    range: vk::ImageSubresourceRange,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) {
    let (src_access, src_stage) = layout_access(old_layout);
    let (dst_access, dst_stage) = layout_access(new_layout);

    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(range)
        .src_access_mask(src_access)
        .dst_access_mask(dst_access);

    unsafe {
        device.cmd_pipeline_barrier(
            cb,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
}

/// Subresource range of mip 0 / layer 0 of a color image
pub(crate) fn color_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}
