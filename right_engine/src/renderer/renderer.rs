/// Renderer - thin per-frame façade over a device and one command buffer
///
/// Passes drive a `Renderer` like this:
///
/// 1. `set_pipeline` then `begin_frame`
/// 2. for each draw, `encode_state` then `draw` / `draw_mesh`
/// 3. `end_frame`, which submits, waits and (for the swapchain pipeline) presents

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::graphics_device::{
    Buffer, Command, CommandBuffer, GraphicsDevice, GraphicsPipeline, ShaderStageFlags,
    MAX_PUSH_CONSTANT_SIZE,
};
use crate::renderer::RendererState;
use crate::engine_err;

/// Geometry of one drawable
#[derive(Clone)]
pub struct Mesh {
    pub vertex_buffer: Arc<dyn Buffer>,
    /// 32-bit indices
    pub index_buffer: Option<Arc<dyn Buffer>>,
}

impl Mesh {
    pub fn new(vertex_buffer: Arc<dyn Buffer>, index_buffer: Option<Arc<dyn Buffer>>) -> Self {
        Self { vertex_buffer, index_buffer }
    }
}

pub struct Renderer {
    device: Arc<dyn GraphicsDevice>,
    command_buffer: Box<dyn CommandBuffer>,
    pipeline: Option<Arc<dyn GraphicsPipeline>>,
}

impl Renderer {
    pub fn new(device: Arc<dyn GraphicsDevice>) -> Result<Self> {
        let command_buffer = device.create_command_buffer()?;
        Ok(Self { device, command_buffer, pipeline: None })
    }

    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.device
    }

    pub fn set_pipeline(&mut self, pipeline: Arc<dyn GraphicsPipeline>) {
        self.pipeline = Some(pipeline);
    }

    pub fn active_pipeline(&self) -> Option<&Arc<dyn GraphicsPipeline>> {
        self.pipeline.as_ref()
    }

    fn require_pipeline(&self) -> Result<Arc<dyn GraphicsPipeline>> {
        self.pipeline
            .clone()
            .ok_or_else(|| Error::InvalidResource("no active pipeline".to_string()))
    }

    /// Reset the fence, begin the render pass, bind the PSO and set viewport/scissor
    pub fn begin_frame(&mut self) -> Result<()> {
        let pipeline = self.require_pipeline()?;
        self.device.begin_frame(self.command_buffer.as_mut(), &pipeline)
    }

    /// End the render pass, submit and wait; presents for the swapchain pipeline
    pub fn end_frame(&mut self) -> Result<()> {
        let pipeline = self.require_pipeline()?;
        self.device.end_frame(self.command_buffer.as_mut(), &pipeline)
    }

    /// Draw a vertex buffer, indexed when `index_buffer` is given
    ///
    /// Indices are 32-bit. Without indices the vertex count is derived from
    /// the active pipeline's vertex stride.
    pub fn draw(&mut self, vertex_buffer: &Arc<dyn Buffer>, index_buffer: Option<&Arc<dyn Buffer>>) -> Result<()> {
        self.command_buffer.enqueue(Command::BindVertexBuffer { buffer: vertex_buffer.clone(), offset: 0 });

        match index_buffer {
            Some(index_buffer) => {
                self.command_buffer.enqueue(Command::BindIndexBuffer { buffer: index_buffer.clone(), offset: 0 });
                self.command_buffer.enqueue(Command::DrawIndexed {
                    index_count: (index_buffer.size() / 4) as u32,
                    instance_count: 1,
                });
            }
            None => {
                let stride = self.require_pipeline()?.vertex_stride();
                if stride == 0 {
                    return Err(Error::InvalidResource(
                        "active pipeline has no vertex layout".to_string(),
                    ));
                }
                self.command_buffer.enqueue(Command::Draw {
                    vertex_count: (vertex_buffer.size() / stride as u64) as u32,
                    instance_count: 1,
                });
            }
        }
        Ok(())
    }

    pub fn draw_mesh(&mut self, mesh: &Mesh) -> Result<()> {
        self.draw(&mesh.vertex_buffer, mesh.index_buffer.as_ref())
    }

    /// Flush `state` and record its push constants and binding set
    pub fn encode_state(&mut self, state: &mut RendererState) -> Result<()> {
        let pipeline = self.require_pipeline()?;
        state.on_update(self.device.as_ref(), &pipeline)?;

        if let Some(constant) = state.constant_buffer() {
            let data = constant.read_data()?;
            if data.len() > MAX_PUSH_CONSTANT_SIZE as usize {
                return Err(engine_err!(
                    "right::Renderer",
                    "Constant buffer is {} bytes, push constants are limited to {}",
                    data.len(),
                    MAX_PUSH_CONSTANT_SIZE
                ));
            }
            self.command_buffer.enqueue(Command::PushConstants {
                pipeline: pipeline.clone(),
                stages: ShaderStageFlags::VERTEX,
                offset: 0,
                data,
            });
        }

        if let Some(binding_set) = state.binding_set() {
            self.command_buffer.enqueue(Command::BindBindingSet {
                pipeline,
                binding_set: binding_set.clone(),
            });
        }
        Ok(())
    }

    /// Raw access for code recording its own commands (UI composition)
    pub fn command_buffer(&mut self) -> &mut dyn CommandBuffer {
        self.command_buffer.as_mut()
    }
}

#[cfg(test)]
#[path = "renderer_tests.rs"]
mod tests;
