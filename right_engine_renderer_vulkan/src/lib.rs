/*!
# RightEngine - Vulkan Backend

Vulkan implementation of the RightEngine `GraphicsDevice` abstraction.

Built on `ash` for the Vulkan bindings and `gpu-allocator` for memory
management. Shaders are SPIR-V; their bindings are reflected with `spirq`
when the caller does not provide them.

```no_run
use right_engine::right::render::{Config, GraphicsDevice};
use right_engine_renderer_vulkan::VulkanGraphicsDevice;
# fn run(window: &winit::window::Window) -> right_engine::right::Result<()> {
let device = VulkanGraphicsDevice::from_window(window, &Config::default())?;
let limits = device.limits();
# let _ = limits;
# Ok(())
# }
```
*/

mod vulkan;
mod vulkan_context;
mod vulkan_format;
mod vulkan_buffer;
mod vulkan_texture;
mod vulkan_sampler;
mod vulkan_shader;
mod vulkan_pipeline;
mod vulkan_binding_set;
mod vulkan_command_buffer;
mod vulkan_swapchain;
mod debug;

pub use vulkan::VulkanGraphicsDevice;

/// Namespaced re-exports, mirroring `right_engine::right`
pub mod right {
    pub use crate::vulkan::VulkanGraphicsDevice;
}

// Validation reporting
pub use debug::{get_validation_stats, print_validation_stats_report};
