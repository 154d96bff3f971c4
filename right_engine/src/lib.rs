/*!
# RightEngine

Core traits and types for the RightEngine real-time renderer.

This crate is backend-agnostic. It defines the render hardware interface
(RHI) that a GPU backend implements, a thin per-frame `Renderer` façade,
and the `SceneRenderer` that sequences the frame's passes. The Vulkan
backend lives in the `right_engine_renderer_vulkan` crate.

## Architecture

- **GraphicsDevice**: Factory trait for every GPU resource, held as `Arc<dyn GraphicsDevice>`
- **Buffer / Texture / Sampler / Shader**: Resource traits
- **GraphicsPipeline**: Shader + render pass + framebuffer, resizable in place
- **CommandBuffer**: Deferred list of `Command` values executed in order
- **RendererState**: Per-draw bindings with dirty-slot tracking
- **SceneRenderer**: Shadow → PBR → skybox → postprocess → UI → present, plus color-ID picking
*/

// Internal modules
mod error;
mod engine;
pub mod log;
pub mod graphics_device;
pub mod renderer;
pub mod scene_renderer;

// Main right namespace module
pub mod right {
    // Error types
    pub use crate::error::{Error, Result};

    // Logger registry
    pub use crate::engine::Engine;

    // Logging sub-module (types only, macros are exported at the crate root)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
    }

    // Render sub-module: RHI traits and the per-frame façade
    pub mod render {
        pub use crate::graphics_device::*;
        pub use crate::renderer::*;
    }

    // Scene sub-module
    pub mod scene {
        pub use crate::scene_renderer::*;
    }
}

// Re-export math library at crate root
pub use glam;
