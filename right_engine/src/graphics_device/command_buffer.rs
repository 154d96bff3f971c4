/// Deferred command recording
///
/// Passes enqueue tagged `Command` values; the backend replays them in FIFO
/// order on the native command buffer when `execute()` is called. Every
/// command owns the `Arc` handles it touches, so recorded work never
/// outlives its resources.

use std::any::Any;
use std::sync::Arc;
use crate::error::Result;
use crate::graphics_device::{BindingSet, Buffer, GraphicsPipeline, ShaderStageFlags};

/// Viewport rectangle in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

/// Scissor rectangle in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// One recorded command
#[derive(Clone)]
pub enum Command {
    /// Begin the pipeline's render pass with its clear values
    BeginRenderPass { pipeline: Arc<dyn GraphicsPipeline> },
    /// Bind the pipeline-state object
    BindPipeline { pipeline: Arc<dyn GraphicsPipeline> },
    SetViewport(Viewport),
    SetScissor(Rect2D),
    /// Bind a vertex buffer at binding 0
    BindVertexBuffer { buffer: Arc<dyn Buffer>, offset: u64 },
    /// Bind a 32-bit index buffer
    BindIndexBuffer { buffer: Arc<dyn Buffer>, offset: u64 },
    /// Bind a binding set against the pipeline layout
    BindBindingSet { pipeline: Arc<dyn GraphicsPipeline>, binding_set: Arc<dyn BindingSet> },
    /// Inline push-constant bytes
    PushConstants {
        pipeline: Arc<dyn GraphicsPipeline>,
        stages: ShaderStageFlags,
        offset: u32,
        data: Vec<u8>,
    },
    Draw { vertex_count: u32, instance_count: u32 },
    DrawIndexed { index_count: u32, instance_count: u32 },
    EndRenderPass,
}

impl Command {
    /// Short name, used in logs and tests
    pub fn name(&self) -> &'static str {
        match self {
            Command::BeginRenderPass { .. } => "begin_render_pass",
            Command::BindPipeline { .. } => "bind_pipeline",
            Command::SetViewport(_) => "set_viewport",
            Command::SetScissor(_) => "set_scissor",
            Command::BindVertexBuffer { .. } => "bind_vertex_buffer",
            Command::BindIndexBuffer { .. } => "bind_index_buffer",
            Command::BindBindingSet { .. } => "bind_binding_set",
            Command::PushConstants { .. } => "push_constants",
            Command::Draw { .. } => "draw",
            Command::DrawIndexed { .. } => "draw_indexed",
            Command::EndRenderPass => "end_render_pass",
        }
    }
}

/// Command buffer trait
///
/// Owns the native command buffer and the fence used to pace frames.
pub trait CommandBuffer: Send {
    /// Start native recording
    ///
    /// Drops any commands queued by a frame that was never executed, so a
    /// frame abandoned on an error path does not leak into the next one.
    fn begin(&mut self) -> Result<()>;

    /// Append a command
    fn enqueue(&mut self, command: Command);

    /// Commands recorded since the last execute
    fn pending(&self) -> &[Command];

    /// Replay the queue in order, submit, wait for completion and clear
    fn execute(&mut self) -> Result<()>;

    /// Backend downcast hook
    fn as_any(&self) -> &dyn Any;

    /// Mutable backend downcast hook, used by `end_frame`
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
