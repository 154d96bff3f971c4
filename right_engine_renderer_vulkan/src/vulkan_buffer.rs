/// VulkanBuffer - Vulkan implementation of the Buffer trait

use right_engine::right::{Error, Result};
use right_engine::right::render::{Buffer, BufferDesc, BufferType, MemoryType};
use right_engine::{engine_err, engine_error};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use std::any::Any;
use std::sync::{Arc, Mutex};

use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{buffer_usage_to_vk, memory_type_to_location};

/// Vulkan buffer implementation
pub struct VulkanBuffer {
    /// Shared GPU context (device, allocator, queue, command pool)
    ctx: Arc<GpuContext>,
    /// Descriptor the buffer was created with
    desc: BufferDesc,
    /// Vulkan buffer
    pub(crate) buffer: vk::Buffer,
    /// GPU memory allocation, locked while mapped
    allocation: Mutex<Option<Allocation>>,
}

impl VulkanBuffer {
    /// Create a buffer and upload `data` when given
    ///
    /// Host-visible memory is written through its persistent mapping.
    /// `GpuOnly` memory is filled through a staging buffer on the one-shot
    /// command path.
    pub(crate) fn create(ctx: &Arc<GpuContext>, desc: &BufferDesc, data: Option<&[u8]>) -> Result<Arc<Self>> {
        if desc.size == 0 {
            return Err(engine_err!("right::vulkan", "Cannot create a buffer of size 0"));
        }

        let buffer = Arc::new(Self::allocate(ctx, desc)?);

        if let Some(data) = data {
            if desc.memory_type.is_host_visible() {
                buffer.set_data(data, 0)?;
            } else {
                buffer.upload_through_staging(data)?;
            }
        }

        Ok(buffer)
    }

    fn allocate(ctx: &Arc<GpuContext>, desc: &BufferDesc) -> Result<Self> {
        unsafe {
            let buffer_create_info = vk::BufferCreateInfo::default()
                .size(desc.size)
                .usage(buffer_usage_to_vk(desc.buffer_type, desc.memory_type))
                .sharing_mode(vk::SharingMode::EXCLUSIVE);

            let buffer = ctx.device.create_buffer(&buffer_create_info, None)
                .map_err(|e| engine_err!("right::vulkan", "Failed to create buffer of size {} bytes: {:?}", desc.size, e))?;

            let requirements = ctx.device.get_buffer_memory_requirements(buffer);

            let allocation = ctx.allocator.lock()
                .map_err(|_| engine_err!("right::vulkan", "Allocator mutex poisoned"))
                .and_then(|mut allocator| {
                    allocator.allocate(&AllocationCreateDesc {
                        name: "buffer",
                        requirements,
                        location: memory_type_to_location(desc.memory_type),
                        linear: true,
                        allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                    })
                    .map_err(|_e| {
                        let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                        engine_error!("right::vulkan", "Out of GPU memory for buffer (required: {:.2} MB)", size_mb);
                        Error::OutOfMemory
                    })
                });

            let allocation = match allocation {
                Ok(allocation) => allocation,
                Err(e) => {
                    ctx.device.destroy_buffer(buffer, None);
                    return Err(e);
                }
            };

            if let Err(e) = ctx.device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) {
                if let Ok(mut allocator) = ctx.allocator.lock() {
                    allocator.free(allocation).ok();
                }
                ctx.device.destroy_buffer(buffer, None);
                return Err(engine_err!("right::vulkan", "Failed to bind buffer memory: {:?}", e));
            }

            Ok(Self {
                ctx: Arc::clone(ctx),
                desc: desc.clone(),
                buffer,
                allocation: Mutex::new(Some(allocation)),
            })
        }
    }

    fn upload_through_staging(&self, data: &[u8]) -> Result<()> {
        let size = data.len() as u64;
        if size > self.desc.size {
            return Err(Error::OutOfBounds(format!(
                "initial data of {} bytes exceeds buffer size {}",
                size, self.desc.size
            )));
        }

        let staging = Self::create(
            &self.ctx,
            &BufferDesc { size, buffer_type: BufferType::TransferSrc, memory_type: MemoryType::CpuGpu },
            Some(data),
        )?;

        self.ctx.one_shot(|device, cb| {
            let region = vk::BufferCopy::default().src_offset(0).dst_offset(0).size(size);
            unsafe {
                device.cmd_copy_buffer(cb, staging.buffer, self.buffer, &[region]);
            }
            Ok(())
        })
    }
}

impl Buffer for VulkanBuffer {
    fn desc(&self) -> &BufferDesc {
        &self.desc
    }

    fn with_mapped(&self, f: &mut dyn FnMut(&mut [u8])) -> Result<()> {
        if !self.desc.memory_type.is_host_visible() {
            return Err(Error::InvalidResource("GpuOnly buffer cannot be mapped".to_string()));
        }

        let mut guard = self.allocation.lock()
            .map_err(|_| engine_err!("right::vulkan", "Buffer allocation mutex poisoned"))?;
        let size = self.desc.size as usize;
        let mapped = guard
            .as_mut()
            .and_then(|allocation| allocation.mapped_slice_mut())
            .ok_or_else(|| engine_err!("right::vulkan", "Buffer is not CPU-accessible"))?;

        f(&mut mapped[..size]);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        unsafe {
            if let Some(allocation) = self.allocation.get_mut().ok().and_then(|a| a.take()) {
                // Don't panic if lock fails - we still need to destroy the buffer
                if let Ok(mut allocator) = self.ctx.allocator.lock() {
                    allocator.free(allocation).ok();
                }
            }
            self.ctx.device.destroy_buffer(self.buffer, None);
        }
    }
}
