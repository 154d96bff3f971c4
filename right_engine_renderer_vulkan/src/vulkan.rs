/// VulkanGraphicsDevice - Vulkan implementation of the GraphicsDevice trait

use right_engine::right::{Error, Result};
use right_engine::right::render::{
    BindingSet, Buffer, BufferDesc, Command, CommandBuffer, Config, DebugSeverity, DeviceLimits,
    GraphicsDevice, GraphicsPipeline, GraphicsPipelineDesc, Rect2D, RenderPassDesc, Sampler, SamplerDesc,
    Shader, ShaderProgramDesc, Texture, TextureDesc, Viewport,
};
use right_engine::{engine_debug, engine_err, engine_error, engine_info, engine_warn};
use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::{CStr, CString};
use std::sync::{Arc, Mutex};

use crate::vulkan_binding_set::VulkanBindingSet;
use crate::vulkan_buffer::VulkanBuffer;
use crate::vulkan_command_buffer::VulkanCommandBuffer;
use crate::vulkan_context::GpuContext;
use crate::vulkan_pipeline::VulkanGraphicsPipeline;
use crate::vulkan_sampler::{SamplerCache, VulkanSampler};
use crate::vulkan_shader::VulkanShader;
use crate::vulkan_swapchain::{SwapchainStatus, VulkanSwapchain};
use crate::vulkan_texture::VulkanTexture;

/// Vulkan graphics device
///
/// Owns the swapchain of one window. Every resource it creates shares the
/// device through `GpuContext`, so resources may outlive this object.
pub struct VulkanGraphicsDevice {
    ctx: Arc<GpuContext>,
    limits: DeviceLimits,
    sampler_cache: Mutex<SamplerCache>,
    /// Bound for textures without a sampler of their own
    default_sampler: Arc<VulkanSampler>,
    swapchain: Mutex<VulkanSwapchain>,
}

impl VulkanGraphicsDevice {
    /// Create a device presenting to `window`
    ///
    /// # Arguments
    ///
    /// * `window` - Window providing the display and window handles
    /// * `size` - Initial drawable size in pixels
    /// * `config` - Validation and application settings
    pub fn new<W: HasDisplayHandle + HasWindowHandle>(
        window: &W,
        size: (u32, u32),
        config: &Config,
    ) -> Result<Self> {
        let validation = config.enable_validation && cfg!(feature = "vulkan-validation");
        if config.enable_validation && !validation {
            engine_warn!("right::vulkan",
                "Validation requested but the 'vulkan-validation' feature is disabled");
        }

        unsafe {
            let entry = ash::Entry::load()
                .map_err(|e| {
                    engine_error!("right::vulkan", "Failed to load Vulkan library: {:?}", e);
                    Error::InitializationFailed(format!("Failed to load Vulkan library: {:?}", e))
                })?;

            let app_name = CString::new(config.app_name.as_str())
                .map_err(|_| Error::InitializationFailed("application name contains a NUL byte".to_string()))?;
            let (major, minor, patch) = config.app_version;
            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(0, major, minor, patch))
                .engine_name(c"RightEngine")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_2);

            let display_handle = window.display_handle()
                .map_err(|e| {
                    engine_error!("right::vulkan", "Failed to get display handle: {}", e);
                    Error::InitializationFailed(format!("Failed to get display handle: {}", e))
                })?;
            let mut extension_names = ash_window::enumerate_required_extensions(display_handle.as_raw())
                .map_err(|e| {
                    engine_error!("right::vulkan", "Failed to get required extensions: {}", e);
                    Error::InitializationFailed(format!("Failed to get required extensions: {}", e))
                })?
                .to_vec();
            if validation {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
            }

            let layer_names = if validation {
                vec![c"VK_LAYER_KHRONOS_validation".as_ptr()]
            } else {
                vec![]
            };

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);

            let instance = entry.create_instance(&create_info, None)
                .map_err(|e| {
                    engine_error!("right::vulkan", "Failed to create Vulkan instance: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create instance: {:?}", e))
                })?;

            let debug = if validation {
                Some(create_debug_messenger(&entry, &instance, config)?)
            } else {
                None
            };

            let window_handle = window.window_handle()
                .map_err(|e| {
                    engine_error!("right::vulkan", "Failed to get window handle: {}", e);
                    Error::InitializationFailed(format!("Failed to get window handle: {}", e))
                })?;
            let surface = ash_window::create_surface(
                &entry,
                &instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| {
                engine_error!("right::vulkan", "Failed to create surface: {:?}", e);
                Error::InitializationFailed(format!("Failed to create surface: {:?}", e))
            })?;
            let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

            let (physical_device, queue_family) = pick_physical_device(&instance, &surface_loader, surface)?;
            let properties = instance.get_physical_device_properties(physical_device);
            let features = instance.get_physical_device_features(physical_device);
            engine_info!("right::vulkan", "Using GPU '{}'",
                CStr::from_ptr(properties.device_name.as_ptr()).to_string_lossy());

            let queue_priorities = [1.0];
            let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
                .queue_family_index(queue_family)
                .queue_priorities(&queue_priorities)];
            let device_extension_names = [ash::khr::swapchain::NAME.as_ptr()];
            let anisotropy = features.sampler_anisotropy == vk::TRUE;
            let device_features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(anisotropy);

            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .enabled_extension_names(&device_extension_names)
                .enabled_features(&device_features);

            let device = instance.create_device(physical_device, &device_create_info, None)
                .map_err(|e| {
                    engine_error!("right::vulkan", "Failed to create logical device: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create device: {:?}", e))
                })?;
            let graphics_queue = device.get_device_queue(queue_family, 0);

            let allocator = Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            })
            .map_err(|e| {
                engine_error!("right::vulkan", "Failed to create GPU allocator: {:?}", e);
                Error::InitializationFailed(format!("Failed to create allocator: {:?}", e))
            })?;

            let upload_pool_create_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(queue_family)
                .flags(vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
            let upload_command_pool = device.create_command_pool(&upload_pool_create_info, None)
                .map_err(|e| {
                    engine_error!("right::vulkan", "Failed to create upload command pool: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create upload command pool: {:?}", e))
                })?;

            // From here on GpuContext owns device and instance destruction
            let ctx = Arc::new(GpuContext::new(
                entry,
                instance,
                device,
                allocator,
                graphics_queue,
                queue_family,
                upload_command_pool,
                debug,
            ));

            let limits = DeviceLimits {
                min_uniform_buffer_offset_alignment: properties.limits.min_uniform_buffer_offset_alignment,
                max_push_constants_size: properties.limits.max_push_constants_size,
            };

            let max_anisotropy = if anisotropy {
                properties.limits.max_sampler_anisotropy.min(16.0)
            } else {
                1.0
            };
            let mut sampler_cache = SamplerCache::new(Arc::clone(&ctx), max_anisotropy);
            let default_sampler = sampler_cache.get(&SamplerDesc::default())?;

            let swapchain = VulkanSwapchain::new(&ctx, physical_device, surface, surface_loader, size.0, size.1)?;
            engine_debug!("right::vulkan", "Swapchain format {:?}", swapchain.format());

            Ok(Self {
                ctx,
                limits,
                sampler_cache: Mutex::new(sampler_cache),
                default_sampler,
                swapchain: Mutex::new(swapchain),
            })
        }
    }

    /// Create a device presenting to a winit window at its current inner size
    pub fn from_window(window: &winit::window::Window, config: &Config) -> Result<Self> {
        let size = window.inner_size();
        Self::new(window, (size.width, size.height), config)
    }

    /// Current swapchain extent
    pub fn swapchain_extent(&self) -> Result<(u32, u32)> {
        let swapchain = self.swapchain.lock()
            .map_err(|_| engine_err!("right::vulkan", "Swapchain mutex poisoned"))?;
        Ok(swapchain.extent())
    }

    /// Submit a presenting frame: blit, signal, present
    fn present_frame(&self, cmd: &mut VulkanCommandBuffer, pipeline: &Arc<dyn GraphicsPipeline>) -> Result<()> {
        let source = pipeline.color_attachment(0).ok_or_else(|| {
            Error::InvalidResource(format!("present pipeline '{}' has no color attachment", pipeline.name()))
        })?;
        let vk_source = source
            .as_any()
            .downcast_ref::<VulkanTexture>()
            .ok_or_else(|| Error::InvalidResource("present source is not a Vulkan texture".to_string()))?;

        let mut swapchain = self.swapchain.lock()
            .map_err(|_| engine_err!("right::vulkan", "Swapchain mutex poisoned"))?;

        let (status, image_index) = swapchain.acquire()?;
        if status == SwapchainStatus::OutOfDate {
            engine_warn!("right::vulkan", "Swapchain out of date, frame rendered without present");
            cmd.record_pending()?;
            cmd.submit(None, None)?;
            let (width, height) = swapchain.extent();
            return swapchain.recreate(width, height);
        }

        cmd.record_pending()?;
        swapchain.record_blit(cmd.command_buffer, vk_source, image_index)?;
        let (image_available, render_finished) = swapchain.sync_info(image_index);
        cmd.submit(Some((image_available, vk::PipelineStageFlags::TRANSFER)), Some(render_finished))?;

        if swapchain.present(image_index)? == SwapchainStatus::OutOfDate {
            let (width, height) = swapchain.extent();
            swapchain.recreate(width, height)?;
        }
        Ok(())
    }
}

impl GraphicsDevice for VulkanGraphicsDevice {
    fn create_buffer(&self, desc: &BufferDesc, data: Option<&[u8]>) -> Result<Arc<dyn Buffer>> {
        Ok(VulkanBuffer::create(&self.ctx, desc, data)?)
    }

    fn create_texture(&self, desc: &TextureDesc, data: &[u8]) -> Result<Arc<dyn Texture>> {
        Ok(VulkanTexture::create(&self.ctx, desc, data)?)
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<Arc<dyn Sampler>> {
        let mut cache = self.sampler_cache.lock()
            .map_err(|_| engine_err!("right::vulkan", "Sampler cache mutex poisoned"))?;
        let sampler = cache.get(desc)?;
        engine_debug!("right::vulkan", "Sampler cache holds {} sampler(s)", cache.len());
        Ok(sampler)
    }

    fn create_shader(&self, desc: &ShaderProgramDesc) -> Result<Arc<dyn Shader>> {
        Ok(VulkanShader::create(&self.ctx, desc)?)
    }

    fn create_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDesc,
        render_pass: &RenderPassDesc,
    ) -> Result<Arc<dyn GraphicsPipeline>> {
        Ok(VulkanGraphicsPipeline::create(&self.ctx, desc, render_pass)?)
    }

    fn create_command_buffer(&self) -> Result<Box<dyn CommandBuffer>> {
        Ok(Box::new(VulkanCommandBuffer::create(&self.ctx)?))
    }

    fn create_binding_set(&self, pipeline: &Arc<dyn GraphicsPipeline>) -> Result<Arc<dyn BindingSet>> {
        let vk_pipeline = pipeline
            .as_any()
            .downcast_ref::<VulkanGraphicsPipeline>()
            .ok_or_else(|| Error::InvalidResource(format!("pipeline '{}' is not a Vulkan pipeline", pipeline.name())))?;
        let set_layout = vk_pipeline
            .set_layout
            .ok_or_else(|| Error::InvalidResource(format!("pipeline '{}' has no bindings", pipeline.name())))?;

        let mut layout_slots: Vec<u32> = Vec::new();
        if let Some(shader) = &pipeline.desc().shader {
            let reflection = shader.reflection();
            layout_slots.extend(reflection.bound_buffers().iter().map(|(r, _)| r.slot));
            layout_slots.extend(reflection.textures.iter().map(|t| t.slot));
        }

        Ok(VulkanBindingSet::create(&self.ctx, set_layout, layout_slots, Arc::clone(&self.default_sampler))?)
    }

    fn begin_frame(&self, cmd: &mut dyn CommandBuffer, pipeline: &Arc<dyn GraphicsPipeline>) -> Result<()> {
        cmd.begin()?;
        let extent = pipeline.extent();
        cmd.enqueue(Command::BeginRenderPass { pipeline: pipeline.clone() });
        if pipeline.desc().shader.is_some() {
            cmd.enqueue(Command::BindPipeline { pipeline: pipeline.clone() });
        }
        cmd.enqueue(Command::SetViewport(Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.x as f32,
            height: extent.y as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }));
        cmd.enqueue(Command::SetScissor(Rect2D { x: 0, y: 0, width: extent.x, height: extent.y }));
        Ok(())
    }

    fn end_frame(&self, cmd: &mut dyn CommandBuffer, pipeline: &Arc<dyn GraphicsPipeline>) -> Result<()> {
        cmd.enqueue(Command::EndRenderPass);
        let vk_cmd = cmd
            .as_any_mut()
            .downcast_mut::<VulkanCommandBuffer>()
            .ok_or_else(|| Error::InvalidResource("command buffer is not a Vulkan command buffer".to_string()))?;

        if pipeline.is_offscreen() {
            vk_cmd.execute()
        } else {
            self.present_frame(vk_cmd, pipeline)
        }
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.ctx.device.device_wait_idle()
                .map_err(|e| engine_err!("right::vulkan", "Failed to wait for device idle: {:?}", e))
        }
    }

    fn resize_swapchain(&self, width: u32, height: u32) -> Result<()> {
        let mut swapchain = self.swapchain.lock()
            .map_err(|_| engine_err!("right::vulkan", "Swapchain mutex poisoned"))?;
        swapchain.recreate(width, height)
    }
}

/// Install the messenger configuration and register the callback
unsafe fn create_debug_messenger(
    entry: &ash::Entry,
    instance: &ash::Instance,
    config: &Config,
) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
    let debug_utils = ash::ext::debug_utils::Instance::new(entry, instance);
    crate::debug::init_debug_config(crate::debug::DebugConfig::from(config));

    let severity_flags = match config.debug_severity {
        DebugSeverity::ErrorsOnly => vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        DebugSeverity::ErrorsAndWarnings => {
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
        }
        DebugSeverity::All => {
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
        }
    };

    let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(severity_flags)
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(crate::debug::vulkan_debug_callback));

    let messenger = debug_utils.create_debug_utils_messenger(&debug_info, None)
        .map_err(|e| {
            engine_error!("right::vulkan", "Failed to create debug messenger: {:?}", e);
            Error::InitializationFailed(format!("Failed to create debug messenger: {:?}", e))
        })?;
    Ok((debug_utils, messenger))
}

/// First GPU with a queue family that both renders and presents, discrete GPUs first
unsafe fn pick_physical_device(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<(vk::PhysicalDevice, u32)> {
    let physical_devices = instance.enumerate_physical_devices()
        .map_err(|e| {
            engine_error!("right::vulkan", "Failed to enumerate physical devices: {:?}", e);
            Error::InitializationFailed(format!("Failed to enumerate physical devices: {:?}", e))
        })?;

    let mut candidates: Vec<(vk::PhysicalDevice, u32, bool)> = physical_devices
        .into_iter()
        .filter_map(|physical_device| {
            let queue_families = instance.get_physical_device_queue_family_properties(physical_device);
            let family = queue_families.iter().enumerate().find(|(i, qf)| {
                qf.queue_flags.contains(vk::QueueFlags::GRAPHICS)
                    && surface_loader
                        .get_physical_device_surface_support(physical_device, *i as u32, surface)
                        .unwrap_or(false)
            })?;
            let discrete = instance.get_physical_device_properties(physical_device).device_type
                == vk::PhysicalDeviceType::DISCRETE_GPU;
            Some((physical_device, family.0 as u32, discrete))
        })
        .collect();

    candidates.sort_by_key(|(_, _, discrete)| !discrete);
    candidates
        .first()
        .map(|(physical_device, family, _)| (*physical_device, *family))
        .ok_or_else(|| {
            engine_error!("right::vulkan", "No GPU with a graphics queue able to present");
            Error::InitializationFailed("No suitable Vulkan GPU found".to_string())
        })
}
