/// GraphicsDevice trait - main resource factory interface

use std::sync::Arc;
use crate::error::Result;
use crate::graphics_device::{
    BindingSet, Buffer, BufferDesc, CommandBuffer, GraphicsPipeline, GraphicsPipelineDesc,
    RenderPassDesc, Sampler, SamplerDesc, Shader, ShaderProgramDesc, Texture, TextureDesc,
};

/// Frames the CPU may record ahead of the GPU
///
/// Every `end_frame` waits on its fence, so uniform buffers are written in
/// place without versioning. Raising this requires N-buffered uniform
/// allocations and one command buffer + fence per frame slot.
pub const MAX_FRAMES_IN_FLIGHT: usize = 1;

// ============================================================================
// Configuration
// ============================================================================

/// Validation message severity filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugSeverity {
    ErrorsOnly,
    ErrorsAndWarnings,
    All,
}

/// Destination of validation messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugOutput {
    Console,
    File(String),
    Both(String),
}

/// Validation message category filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugMessageFilter {
    pub show_general: bool,
    pub show_validation: bool,
    pub show_performance: bool,
}

impl Default for DebugMessageFilter {
    fn default() -> Self {
        Self {
            show_general: false,
            show_validation: true,
            show_performance: true,
        }
    }
}

/// Validation message counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationStats {
    pub errors: u32,
    pub warnings: u32,
    pub info: u32,
    pub verbose: u32,
}

impl ValidationStats {
    pub fn total(&self) -> u32 {
        self.errors + self.warnings + self.info + self.verbose
    }
}

/// Device configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Enable validation/debug layers
    pub enable_validation: bool,
    /// Application name
    pub app_name: String,
    /// Application version (major, minor, patch)
    pub app_version: (u32, u32, u32),
    /// Validation severity filter
    pub debug_severity: DebugSeverity,
    /// Validation output
    pub debug_output: DebugOutput,
    /// Validation category filter
    pub debug_message_filter: DebugMessageFilter,
    /// Abort the process on a validation error
    pub break_on_validation_error: bool,
    /// Panic on a validation error
    pub panic_on_error: bool,
    /// Count validation messages
    pub enable_validation_stats: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enable_validation: cfg!(debug_assertions),
            app_name: "RightEngine Application".to_string(),
            app_version: (1, 0, 0),
            debug_severity: DebugSeverity::ErrorsAndWarnings,
            debug_output: DebugOutput::Console,
            debug_message_filter: DebugMessageFilter::default(),
            break_on_validation_error: false,
            panic_on_error: false,
            enable_validation_stats: false,
        }
    }
}

/// Physical device limits the core depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Required alignment of dynamic uniform offsets
    pub min_uniform_buffer_offset_alignment: u64,
    /// Largest push-constant block
    pub max_push_constants_size: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            min_uniform_buffer_offset_alignment: 256,
            max_push_constants_size: 128,
        }
    }
}

/// Round `size` up to the next multiple of `alignment`
///
/// Identity for exact multiples. An alignment of 0 leaves `size` unchanged.
pub fn align_up(size: u64, alignment: u64) -> u64 {
    if alignment == 0 || size % alignment == 0 {
        size
    } else {
        (size / alignment + 1) * alignment
    }
}

// ============================================================================
// GraphicsDevice trait
// ============================================================================

/// Main device trait
///
/// Sole factory for GPU resources. Implemented by backend devices
/// (e.g., VulkanGraphicsDevice) and shared as `Arc<dyn GraphicsDevice>`.
pub trait GraphicsDevice: Send + Sync {
    /// Create a buffer
    ///
    /// # Arguments
    ///
    /// * `desc` - Buffer descriptor
    /// * `data` - Optional initial content, uploaded synchronously
    ///
    /// # Returns
    ///
    /// A shared pointer to the created buffer
    fn create_buffer(&self, desc: &BufferDesc, data: Option<&[u8]>) -> Result<Arc<dyn Buffer>>;

    /// Create a texture
    ///
    /// # Arguments
    ///
    /// * `desc` - Texture descriptor
    /// * `data` - Pixel data (mip 0 of every layer), empty for render targets
    ///
    /// # Returns
    ///
    /// A shared pointer to the created texture, in shader-read-only layout
    fn create_texture(&self, desc: &TextureDesc, data: &[u8]) -> Result<Arc<dyn Texture>>;

    /// Create a sampler
    fn create_sampler(&self, desc: &SamplerDesc) -> Result<Arc<dyn Sampler>>;

    /// Create a shader program and merge the reflection of its stages
    ///
    /// # Errors
    ///
    /// Returns `Error::ShaderReflection` when stages disagree on bindings.
    fn create_shader(&self, desc: &ShaderProgramDesc) -> Result<Arc<dyn Shader>>;

    /// Create a graphics pipeline with its render pass and framebuffer
    ///
    /// # Arguments
    ///
    /// * `desc` - Shader and fixed-function state
    /// * `render_pass` - Attachments and extent
    fn create_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDesc,
        render_pass: &RenderPassDesc,
    ) -> Result<Arc<dyn GraphicsPipeline>>;

    /// Create a command buffer with its own fence
    fn create_command_buffer(&self) -> Result<Box<dyn CommandBuffer>>;

    /// Allocate a binding set from a pipeline's layout
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidResource` when the pipeline has no bindings.
    fn create_binding_set(&self, pipeline: &Arc<dyn GraphicsPipeline>) -> Result<Arc<dyn BindingSet>>;

    /// Begin recording a frame for `pipeline`
    ///
    /// Resets the fence, begins the render pass with the pipeline's clear
    /// values, binds the pipeline-state object when there is one and sets
    /// viewport and scissor to the render pass extent.
    fn begin_frame(&self, cmd: &mut dyn CommandBuffer, pipeline: &Arc<dyn GraphicsPipeline>) -> Result<()>;

    /// Finish the frame started by `begin_frame`
    ///
    /// Ends the render pass, submits and waits on the fence. For
    /// non-offscreen pipelines, copies the first color attachment into a
    /// swapchain image and presents it.
    fn end_frame(&self, cmd: &mut dyn CommandBuffer, pipeline: &Arc<dyn GraphicsPipeline>) -> Result<()>;

    /// Device limits
    fn limits(&self) -> DeviceLimits;

    /// Wait for all GPU operations to complete
    fn wait_idle(&self) -> Result<()>;

    /// Notify the device that the window has been resized
    fn resize_swapchain(&self, width: u32, height: u32) -> Result<()>;

    /// Round `size` up to the uniform-buffer offset alignment
    ///
    /// Used whenever several draws share one uniform buffer at different
    /// offsets.
    fn aligned_gpu_data_size(&self, size: u64) -> u64 {
        align_up(size, self.limits().min_uniform_buffer_offset_alignment)
    }
}

#[cfg(test)]
#[path = "graphics_device_tests.rs"]
mod tests;
