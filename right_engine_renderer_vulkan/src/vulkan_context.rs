/// GpuContext - Vulkan objects shared by every resource of one device
///
/// Buffers, textures, samplers, pipelines and binding sets each hold an
/// `Arc<GpuContext>`, so the logical device, the allocator and the instance
/// are destroyed only once the last resource is gone.

use ash::vk;
use gpu_allocator::vulkan::Allocator;
use right_engine::right::Result;
use right_engine::{engine_err, engine_info};
use std::mem::ManuallyDrop;
use std::sync::Mutex;

/// Shared GPU context
pub struct GpuContext {
    /// Vulkan logical device
    pub device: ash::Device,

    /// GPU memory allocator
    /// Dropped manually, BEFORE the device is destroyed
    pub allocator: ManuallyDrop<Mutex<Allocator>>,

    /// Graphics + present queue, externally synchronized
    pub graphics_queue: Mutex<vk::Queue>,

    /// Graphics queue family index
    pub graphics_queue_family: u32,

    /// Reusable pool for one-shot upload and copy commands
    /// (TRANSIENT + RESET_COMMAND_BUFFER)
    pub upload_command_pool: Mutex<vk::CommandPool>,

    /// Descriptor pools for binding sets (grows when exhausted)
    pub descriptor_pools: Mutex<Vec<vk::DescriptorPool>>,

    /// Vulkan instance
    pub instance: ash::Instance,

    /// Keeps the loader library alive until the instance is destroyed
    _entry: ash::Entry,

    /// Debug utils loader (validation only)
    pub(crate) debug_utils_loader: Option<ash::ext::debug_utils::Instance>,

    /// Debug messenger handle (validation only)
    pub(crate) debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl GpuContext {
    /// Create a new GPU context
    ///
    /// # Arguments
    ///
    /// * `entry` - Loaded Vulkan entry points
    /// * `instance` - Vulkan instance
    /// * `device` - Vulkan logical device
    /// * `allocator` - GPU memory allocator
    /// * `graphics_queue` - Queue used for submission and presentation
    /// * `graphics_queue_family` - Family of `graphics_queue`
    /// * `upload_command_pool` - Pool for one-shot commands
    /// * `debug` - Debug utils loader and messenger, if validation is on
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        entry: ash::Entry,
        instance: ash::Instance,
        device: ash::Device,
        allocator: Allocator,
        graphics_queue: vk::Queue,
        graphics_queue_family: u32,
        upload_command_pool: vk::CommandPool,
        debug: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    ) -> Self {
        let (debug_utils_loader, debug_messenger) = match debug {
            Some((loader, messenger)) => (Some(loader), Some(messenger)),
            None => (None, None),
        };
        Self {
            device,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            graphics_queue: Mutex::new(graphics_queue),
            graphics_queue_family,
            upload_command_pool: Mutex::new(upload_command_pool),
            descriptor_pools: Mutex::new(Vec::new()),
            instance,
            _entry: entry,
            debug_utils_loader,
            debug_messenger,
        }
    }

    /// Record `record` into a transient command buffer, submit it and wait
    ///
    /// The upload pool and the queue are locked for the whole call, so
    /// uploads from worker threads serialize here.
    pub fn one_shot<F>(&self, record: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer) -> Result<()>,
    {
        let pool = self.upload_command_pool.lock()
            .map_err(|_| engine_err!("right::vulkan", "Upload command pool mutex poisoned"))?;

        unsafe {
            let allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(*pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);

            let command_buffer = self.device.allocate_command_buffers(&allocate_info)
                .map_err(|e| engine_err!("right::vulkan", "Failed to allocate one-shot command buffer: {:?}", e))?[0];

            let result = self.submit_one_shot(command_buffer, record);
            self.device.free_command_buffers(*pool, &[command_buffer]);
            result
        }
    }

    unsafe fn submit_one_shot<F>(&self, command_buffer: vk::CommandBuffer, record: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer) -> Result<()>,
    {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        self.device.begin_command_buffer(command_buffer, &begin_info)
            .map_err(|e| engine_err!("right::vulkan", "Failed to begin one-shot command buffer: {:?}", e))?;

        record(&self.device, command_buffer)?;

        self.device.end_command_buffer(command_buffer)
            .map_err(|e| engine_err!("right::vulkan", "Failed to end one-shot command buffer: {:?}", e))?;

        let fence = self.device.create_fence(&vk::FenceCreateInfo::default(), None)
            .map_err(|e| engine_err!("right::vulkan", "Failed to create one-shot fence: {:?}", e))?;

        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);

        let submitted = match self.graphics_queue.lock() {
            Ok(queue) => self.device.queue_submit(*queue, &[submit_info], fence)
                .map_err(|e| engine_err!("right::vulkan", "Failed to submit one-shot commands: {:?}", e)),
            Err(_) => Err(engine_err!("right::vulkan", "Graphics queue mutex poisoned")),
        };

        let waited = submitted.and_then(|_| {
            self.device.wait_for_fences(&[fence], true, u64::MAX)
                .map_err(|e| engine_err!("right::vulkan", "Failed to wait for one-shot fence: {:?}", e))
        });

        self.device.destroy_fence(fence, None);
        waited
    }

    /// Submit an already recorded command buffer and wait on `fence`
    ///
    /// # Arguments
    ///
    /// * `command_buffer` - Ended native command buffer
    /// * `fence` - Unsignaled fence, signaled on completion
    /// * `wait` - Optional semaphore and the stage waiting on it
    /// * `signal` - Optional semaphore signaled on completion
    pub fn submit_and_wait(
        &self,
        command_buffer: vk::CommandBuffer,
        fence: vk::Fence,
        wait: Option<(vk::Semaphore, vk::PipelineStageFlags)>,
        signal: Option<vk::Semaphore>,
    ) -> Result<()> {
        let command_buffers = [command_buffer];
        let wait_semaphores: Vec<vk::Semaphore> = wait.iter().map(|(s, _)| *s).collect();
        let wait_stages: Vec<vk::PipelineStageFlags> = wait.iter().map(|(_, stage)| *stage).collect();
        let signal_semaphores: Vec<vk::Semaphore> = signal.into_iter().collect();

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            {
                let queue = self.graphics_queue.lock()
                    .map_err(|_| engine_err!("right::vulkan", "Graphics queue mutex poisoned"))?;
                self.device.queue_submit(*queue, &[submit_info], fence)
                    .map_err(|e| engine_err!("right::vulkan", "Failed to submit commands to GPU queue: {:?}", e))?;
            }
            self.device.wait_for_fences(&[fence], true, u64::MAX)
                .map_err(|e| engine_err!("right::vulkan", "Failed to wait for submit fence: {:?}", e))
        }
    }

    /// Allocate one descriptor set, growing the pool list when exhausted
    ///
    /// Returns the owning pool alongside the set, for `free_descriptor_set`.
    pub fn allocate_descriptor_set(&self, layout: vk::DescriptorSetLayout) -> Result<(vk::DescriptorPool, vk::DescriptorSet)> {
        let mut pools = self.descriptor_pools.lock()
            .map_err(|_| engine_err!("right::vulkan", "Descriptor pool mutex poisoned"))?;

        let layouts = [layout];
        unsafe {
            if let Some(&pool) = pools.last() {
                let allocate_info = vk::DescriptorSetAllocateInfo::default()
                    .descriptor_pool(pool)
                    .set_layouts(&layouts);
                match self.device.allocate_descriptor_sets(&allocate_info) {
                    Ok(sets) => return Ok((pool, sets[0])),
                    Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) | Err(vk::Result::ERROR_FRAGMENTED_POOL) => {}
                    Err(e) => return Err(engine_err!("right::vulkan", "Failed to allocate descriptor set: {:?}", e)),
                }
            }

            let new_pool = create_descriptor_pool(&self.device)?;
            pools.push(new_pool);
            engine_info!("right::vulkan", "Created descriptor pool (total: {})", pools.len());

            let allocate_info = vk::DescriptorSetAllocateInfo::default()
                .descriptor_pool(new_pool)
                .set_layouts(&layouts);
            self.device.allocate_descriptor_sets(&allocate_info)
                .map(|sets| (new_pool, sets[0]))
                .map_err(|e| engine_err!("right::vulkan", "Failed to allocate descriptor set after pool growth: {:?}", e))
        }
    }

    /// Return a descriptor set to the pool it came from
    pub fn free_descriptor_set(&self, pool: vk::DescriptorPool, set: vk::DescriptorSet) {
        if let Ok(_pools) = self.descriptor_pools.lock() {
            unsafe {
                self.device.free_descriptor_sets(pool, &[set]).ok();
            }
        }
    }
}

/// Create a descriptor pool with fixed capacity (1024 sets)
fn create_descriptor_pool(device: &ash::Device) -> Result<vk::DescriptorPool> {
    let pool_sizes = [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: 8192,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 4096,
        },
    ];
    let info = vk::DescriptorPoolCreateInfo::default()
        .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
        .pool_sizes(&pool_sizes)
        .max_sets(1024);

    unsafe {
        device.create_descriptor_pool(&info, None)
            .map_err(|e| engine_err!("right::vulkan", "Failed to create descriptor pool: {:?}", e))
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();

            if let Ok(pools) = self.descriptor_pools.get_mut() {
                for &pool in pools.iter() {
                    self.device.destroy_descriptor_pool(pool, None);
                }
            }
            if let Ok(pool) = self.upload_command_pool.get_mut() {
                self.device.destroy_command_pool(*pool, None);
            }

            // Free VkDeviceMemory pages before the device goes away
            ManuallyDrop::drop(&mut self.allocator);

            // No callbacks during destruction
            crate::debug::cleanup_debug_config();
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils_loader, self.debug_messenger) {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}
