/// VulkanSwapchain - presentation surface of a window-backed device
///
/// The final pass renders offscreen; `end_frame` blits its first color
/// attachment into the acquired swapchain image and presents it.

use right_engine::right::{Error, Result};
use right_engine::right::render::{Texture, TextureFormat};
use right_engine::{engine_bail, engine_debug, engine_err, engine_error};
use ash::vk;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;
use crate::vulkan_format::vk_to_texture_format;
use crate::vulkan_texture::{cmd_transition, color_range, VulkanTexture};

/// Outcome of an acquire or present call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SwapchainStatus {
    Ok,
    /// The surface changed, the swapchain must be recreated
    OutOfDate,
}

/// Vulkan swapchain
pub(crate) struct VulkanSwapchain {
    ctx: Arc<GpuContext>,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    /// Signaled by acquire, waited on by the frame submission
    image_available: vk::Semaphore,
    /// One per swapchain image, signaled by the frame submission
    render_finished: Vec<vk::Semaphore>,
}

impl VulkanSwapchain {
    /// Create a swapchain over `surface`
    ///
    /// Takes ownership of the surface, destroyed with the swapchain.
    pub(crate) fn new(
        ctx: &Arc<GpuContext>,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: ash::khr::surface::Instance,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        unsafe {
            let supported = surface_loader
                .get_physical_device_surface_support(physical_device, ctx.graphics_queue_family, surface)
                .unwrap_or(false);
            if !supported {
                surface_loader.destroy_surface(surface, None);
                engine_bail!("right::vulkan", "Graphics queue family {} cannot present to the surface",
                    ctx.graphics_queue_family);
            }

            let formats = match surface_loader.get_physical_device_surface_formats(physical_device, surface) {
                Ok(formats) if !formats.is_empty() => formats,
                other => {
                    surface_loader.destroy_surface(surface, None);
                    return Err(Error::InitializationFailed(format!("No usable surface format: {:?}", other.err())));
                }
            };
            let format = formats
                .iter()
                .copied()
                .find(|f| f.format == vk::Format::B8G8R8A8_UNORM)
                .unwrap_or(formats[0]);

            let swapchain_loader = ash::khr::swapchain::Device::new(&ctx.instance, &ctx.device);

            let semaphore_info = vk::SemaphoreCreateInfo::default();
            let image_available = ctx.device.create_semaphore(&semaphore_info, None)
                .map_err(|e| engine_err!("right::vulkan", "Failed to create image-available semaphore: {:?}", e))?;

            let mut swapchain = Self {
                ctx: Arc::clone(ctx),
                physical_device,
                surface,
                surface_loader,
                swapchain_loader,
                swapchain: vk::SwapchainKHR::null(),
                images: Vec::new(),
                format,
                extent: vk::Extent2D { width, height },
                image_available,
                render_finished: Vec::new(),
            };
            swapchain.build(width, height)?;

            engine_debug!("right::vulkan", "Created swapchain {}x{} ({:?}, {} images)",
                swapchain.extent.width, swapchain.extent.height, format.format, swapchain.images.len());
            Ok(swapchain)
        }
    }

    /// (Re)create the VkSwapchainKHR, retiring the previous one
    fn build(&mut self, width: u32, height: u32) -> Result<()> {
        let device = &self.ctx.device;
        unsafe {
            let capabilities = self.surface_loader
                .get_physical_device_surface_capabilities(self.physical_device, self.surface)
                .map_err(|e| {
                    engine_error!("right::vulkan", "Failed to get surface capabilities: {:?}", e);
                    Error::InitializationFailed(format!("Failed to get surface capabilities: {:?}", e))
                })?;

            let extent = if capabilities.current_extent.width != u32::MAX {
                capabilities.current_extent
            } else {
                vk::Extent2D {
                    width: width.clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width),
                    height: height.clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height),
                }
            };

            let image_count = if capabilities.max_image_count > 0 {
                (capabilities.min_image_count + 1).min(capabilities.max_image_count)
            } else {
                capabilities.min_image_count + 1
            };

            let old_swapchain = self.swapchain;
            let create_info = vk::SwapchainCreateInfoKHR::default()
                .surface(self.surface)
                .min_image_count(image_count)
                .image_format(self.format.format)
                .image_color_space(self.format.color_space)
                .image_extent(extent)
                .image_array_layers(1)
                .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
                .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
                .pre_transform(capabilities.current_transform)
                .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
                .present_mode(vk::PresentModeKHR::FIFO)
                .clipped(true)
                .old_swapchain(old_swapchain);

            let swapchain = self.swapchain_loader.create_swapchain(&create_info, None)
                .map_err(|e| {
                    engine_error!("right::vulkan", "Failed to create swapchain: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create swapchain: {:?}", e))
                })?;
            if old_swapchain != vk::SwapchainKHR::null() {
                self.swapchain_loader.destroy_swapchain(old_swapchain, None);
            }
            self.swapchain = swapchain;
            self.extent = extent;

            self.images = self.swapchain_loader.get_swapchain_images(swapchain)
                .map_err(|e| engine_err!("right::vulkan", "Failed to get swapchain images: {:?}", e))?;

            // Image count may change across recreation
            let semaphore_info = vk::SemaphoreCreateInfo::default();
            while self.render_finished.len() < self.images.len() {
                let semaphore = device.create_semaphore(&semaphore_info, None)
                    .map_err(|e| engine_err!("right::vulkan", "Failed to create render-finished semaphore: {:?}", e))?;
                self.render_finished.push(semaphore);
            }
        }
        Ok(())
    }

    /// Recreate at a new window size
    pub(crate) fn recreate(&mut self, width: u32, height: u32) -> Result<()> {
        unsafe {
            self.ctx.device.device_wait_idle()
                .map_err(|e| engine_err!("right::vulkan", "Failed to wait idle before swapchain recreate: {:?}", e))?;
        }
        self.build(width, height)?;
        engine_debug!("right::vulkan", "Recreated swapchain {}x{}", self.extent.width, self.extent.height);
        Ok(())
    }

    /// Acquire the next image, signaling `image_available`
    pub(crate) fn acquire(&self) -> Result<(SwapchainStatus, u32)> {
        unsafe {
            match self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                self.image_available,
                vk::Fence::null(),
            ) {
                Ok((image_index, _suboptimal)) => Ok((SwapchainStatus::Ok, image_index)),
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok((SwapchainStatus::OutOfDate, 0)),
                Err(e) => Err(engine_err!("right::vulkan", "Failed to acquire next swapchain image: {:?}", e)),
            }
        }
    }

    /// Semaphores of the frame submission presenting `image_index`
    pub(crate) fn sync_info(&self, image_index: u32) -> (vk::Semaphore, vk::Semaphore) {
        (self.image_available, self.render_finished[image_index as usize])
    }

    /// Record a blit of `src` (mip 0, layer 0) into swapchain image `image_index`
    ///
    /// `src` rests in SHADER_READ_ONLY_OPTIMAL and is returned to it.
    pub(crate) fn record_blit(&self, cb: vk::CommandBuffer, src: &VulkanTexture, image_index: u32) -> Result<()> {
        let Some(&dst_image) = self.images.get(image_index as usize) else {
            engine_bail!("right::vulkan", "Swapchain image index {} out of range (count: {})",
                image_index, self.images.len());
        };
        let device = &self.ctx.device;
        let src_desc = src.desc();

        cmd_transition(device, cb, src.image, color_range(),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
        cmd_transition(device, cb, dst_image, color_range(),
            vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL);

        let layers = vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        };
        let region = vk::ImageBlit {
            src_subresource: layers,
            src_offsets: [
                vk::Offset3D { x: 0, y: 0, z: 0 },
                vk::Offset3D { x: src_desc.width as i32, y: src_desc.height as i32, z: 1 },
            ],
            dst_subresource: layers,
            dst_offsets: [
                vk::Offset3D { x: 0, y: 0, z: 0 },
                vk::Offset3D { x: self.extent.width as i32, y: self.extent.height as i32, z: 1 },
            ],
        };

        unsafe {
            device.cmd_blit_image(
                cb,
                src.image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst_image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
                vk::Filter::LINEAR,
            );
        }

        cmd_transition(device, cb, src.image, color_range(),
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        cmd_transition(device, cb, dst_image, color_range(),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::PRESENT_SRC_KHR);
        Ok(())
    }

    /// Queue `image_index` for presentation
    pub(crate) fn present(&self, image_index: u32) -> Result<SwapchainStatus> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [self.render_finished[image_index as usize]];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let queue = self.ctx.graphics_queue.lock()
            .map_err(|_| engine_err!("right::vulkan", "Graphics queue mutex poisoned"))?;
        unsafe {
            match self.swapchain_loader.queue_present(*queue, &present_info) {
                Ok(false) => Ok(SwapchainStatus::Ok),
                Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SwapchainStatus::OutOfDate),
                Err(e) => Err(engine_err!("right::vulkan", "Failed to present swapchain image: {:?}", e)),
            }
        }
    }

    pub(crate) fn extent(&self) -> (u32, u32) {
        (self.extent.width, self.extent.height)
    }

    /// Engine format of the swapchain images
    pub(crate) fn format(&self) -> Option<TextureFormat> {
        vk_to_texture_format(self.format.format)
    }
}

impl Drop for VulkanSwapchain {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.device_wait_idle().ok();
            self.ctx.device.destroy_semaphore(self.image_available, None);
            for &semaphore in &self.render_finished {
                self.ctx.device.destroy_semaphore(semaphore, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}
