/// VulkanCommandBuffer - Vulkan implementation of the CommandBuffer trait
///
/// Commands are queued as `Command` values and replayed onto a native
/// command buffer at execution time. Submission is synchronous: the
/// buffer's fence is waited on before `execute` returns, so `begin` never
/// blocks, even after a frame abandoned mid-recording.

use right_engine::right::{Error, Result};
use right_engine::right::render::{Command, CommandBuffer, GraphicsPipeline};
use right_engine::engine_err;
use ash::vk;
use std::any::Any;
use std::sync::Arc;

use crate::vulkan_binding_set::VulkanBindingSet;
use crate::vulkan_buffer::VulkanBuffer;
use crate::vulkan_context::GpuContext;
use crate::vulkan_format::stage_flags_to_vk;
use crate::vulkan_pipeline::VulkanGraphicsPipeline;

/// Vulkan command buffer implementation
pub struct VulkanCommandBuffer {
    ctx: Arc<GpuContext>,
    /// Pool owned by this command buffer only
    pool: vk::CommandPool,
    pub(crate) command_buffer: vk::CommandBuffer,
    /// Reset right before each submission, signaled when it completes
    fence: vk::Fence,
    /// Commands queued since `begin`
    commands: Vec<Command>,
    recording: bool,
}

impl VulkanCommandBuffer {
    pub(crate) fn create(ctx: &Arc<GpuContext>) -> Result<Self> {
        unsafe {
            let pool_create_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(ctx.graphics_queue_family)
                .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

            let pool = ctx.device.create_command_pool(&pool_create_info, None)
                .map_err(|e| engine_err!("right::vulkan", "Failed to create command pool: {:?}", e))?;

            let allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);

            let command_buffer = match ctx.device.allocate_command_buffers(&allocate_info) {
                Ok(buffers) => buffers[0],
                Err(e) => {
                    ctx.device.destroy_command_pool(pool, None);
                    return Err(engine_err!("right::vulkan", "Failed to allocate command buffer: {:?}", e));
                }
            };

            let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
            let fence = match ctx.device.create_fence(&fence_info, None) {
                Ok(fence) => fence,
                Err(e) => {
                    ctx.device.destroy_command_pool(pool, None);
                    return Err(engine_err!("right::vulkan", "Failed to create command buffer fence: {:?}", e));
                }
            };

            Ok(Self {
                ctx: Arc::clone(ctx),
                pool,
                command_buffer,
                fence,
                commands: Vec::new(),
                recording: false,
            })
        }
    }

    /// Replay the queued commands onto the native command buffer
    pub(crate) fn record_pending(&mut self) -> Result<()> {
        if !self.recording {
            return Err(Error::BackendError("Command buffer not recording".to_string()));
        }

        let device = &self.ctx.device;
        let cb = self.command_buffer;

        for command in &self.commands {
            unsafe {
                match command {
                    Command::BeginRenderPass { pipeline } => {
                        let vk_pipeline = downcast_pipeline(pipeline)?;
                        let (render_pass, framebuffer, extent, clear_values) = vk_pipeline.begin_info();
                        let begin_info = vk::RenderPassBeginInfo::default()
                            .render_pass(render_pass)
                            .framebuffer(framebuffer)
                            .render_area(vk::Rect2D { offset: vk::Offset2D { x: 0, y: 0 }, extent })
                            .clear_values(&clear_values);
                        device.cmd_begin_render_pass(cb, &begin_info, vk::SubpassContents::INLINE);
                    }
                    Command::BindPipeline { pipeline } => {
                        let vk_pipeline = downcast_pipeline(pipeline)?;
                        let pso = vk_pipeline.pipeline.ok_or_else(|| {
                            Error::InvalidResource(format!("pipeline '{}' has no shader", pipeline.name()))
                        })?;
                        device.cmd_bind_pipeline(cb, vk::PipelineBindPoint::GRAPHICS, pso);
                    }
                    Command::SetViewport(viewport) => {
                        let vk_viewport = vk::Viewport {
                            x: viewport.x,
                            y: viewport.y,
                            width: viewport.width,
                            height: viewport.height,
                            min_depth: viewport.min_depth,
                            max_depth: viewport.max_depth,
                        };
                        device.cmd_set_viewport(cb, 0, &[vk_viewport]);
                    }
                    Command::SetScissor(rect) => {
                        let vk_rect = vk::Rect2D {
                            offset: vk::Offset2D { x: rect.x, y: rect.y },
                            extent: vk::Extent2D { width: rect.width, height: rect.height },
                        };
                        device.cmd_set_scissor(cb, 0, &[vk_rect]);
                    }
                    Command::BindVertexBuffer { buffer, offset } => {
                        let vk_buffer = downcast_buffer(buffer.as_any())?;
                        device.cmd_bind_vertex_buffers(cb, 0, &[vk_buffer.buffer], &[*offset]);
                    }
                    Command::BindIndexBuffer { buffer, offset } => {
                        let vk_buffer = downcast_buffer(buffer.as_any())?;
                        device.cmd_bind_index_buffer(cb, vk_buffer.buffer, *offset, vk::IndexType::UINT32);
                    }
                    Command::BindBindingSet { pipeline, binding_set } => {
                        let vk_pipeline = downcast_pipeline(pipeline)?;
                        let vk_set = binding_set
                            .as_any()
                            .downcast_ref::<VulkanBindingSet>()
                            .ok_or_else(|| Error::InvalidResource("binding set is not a Vulkan binding set".to_string()))?;
                        device.cmd_bind_descriptor_sets(
                            cb,
                            vk::PipelineBindPoint::GRAPHICS,
                            vk_pipeline.layout,
                            0,
                            &[vk_set.descriptor_set],
                            &[],
                        );
                    }
                    Command::PushConstants { pipeline, stages, offset, data } => {
                        let vk_pipeline = downcast_pipeline(pipeline)?;
                        device.cmd_push_constants(cb, vk_pipeline.layout, stage_flags_to_vk(*stages), *offset, data);
                    }
                    Command::Draw { vertex_count, instance_count } => {
                        device.cmd_draw(cb, *vertex_count, *instance_count, 0, 0);
                    }
                    Command::DrawIndexed { index_count, instance_count } => {
                        device.cmd_draw_indexed(cb, *index_count, *instance_count, 0, 0, 0);
                    }
                    Command::EndRenderPass => {
                        device.cmd_end_render_pass(cb);
                    }
                }
            }
        }

        Ok(())
    }

    /// End recording, submit and wait for completion
    ///
    /// Queued commands are dropped once the GPU is done with them.
    pub(crate) fn submit(
        &mut self,
        wait: Option<(vk::Semaphore, vk::PipelineStageFlags)>,
        signal: Option<vk::Semaphore>,
    ) -> Result<()> {
        unsafe {
            self.ctx.device.end_command_buffer(self.command_buffer)
                .map_err(|e| engine_err!("right::vulkan", "Failed to end command buffer: {:?}", e))?;
            // Reset at submission so a frame failing mid-recording leaves it signaled
            self.ctx.device.reset_fences(&[self.fence])
                .map_err(|e| engine_err!("right::vulkan", "Failed to reset command buffer fence: {:?}", e))?;
        }
        let result = self.ctx.submit_and_wait(self.command_buffer, self.fence, wait, signal);
        self.commands.clear();
        self.recording = false;
        result
    }
}

impl CommandBuffer for VulkanCommandBuffer {
    fn begin(&mut self) -> Result<()> {
        unsafe {
            // The fence needs no wait here: submit() returns only once it
            // signaled. Resetting also discards a recording abandoned
            // before submission.
            self.ctx.device.reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(|e| engine_err!("right::vulkan", "Failed to reset command buffer: {:?}", e))?;

            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.ctx.device.begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(|e| engine_err!("right::vulkan", "Failed to begin command buffer: {:?}", e))?;
        }
        self.commands.clear();
        self.recording = true;
        Ok(())
    }

    fn enqueue(&mut self, command: Command) {
        self.commands.push(command);
    }

    fn pending(&self) -> &[Command] {
        &self.commands
    }

    fn execute(&mut self) -> Result<()> {
        self.record_pending()?;
        self.submit(None, None)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Drop for VulkanCommandBuffer {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_fence(self.fence, None);
            // Frees the command buffer with it
            self.ctx.device.destroy_command_pool(self.pool, None);
        }
    }
}

fn downcast_pipeline(pipeline: &Arc<dyn GraphicsPipeline>) -> Result<&VulkanGraphicsPipeline> {
    pipeline
        .as_any()
        .downcast_ref::<VulkanGraphicsPipeline>()
        .ok_or_else(|| Error::InvalidResource(format!("pipeline '{}' is not a Vulkan pipeline", pipeline.name())))
}

fn downcast_buffer(buffer: &dyn Any) -> Result<&VulkanBuffer> {
    buffer
        .downcast_ref::<VulkanBuffer>()
        .ok_or_else(|| Error::InvalidResource("buffer is not a Vulkan buffer".to_string()))
}
