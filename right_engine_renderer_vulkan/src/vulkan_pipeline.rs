/// VulkanGraphicsPipeline - Vulkan implementation of the GraphicsPipeline trait
///
/// Owns the VkRenderPass, the VkFramebuffer over the current attachments,
/// and (when a shader is given) the descriptor set layout, pipeline layout
/// and pipeline-state object.

use right_engine::right::{Error, Result};
use right_engine::right::render::{
    GraphicsPipeline, GraphicsPipelineDesc, RenderPassDesc, Shader, Texture, MAX_PUSH_CONSTANT_SIZE,
};
use right_engine::{engine_debug, engine_err, engine_error, engine_warn};
use ash::vk;
use std::any::Any;
use std::sync::{Arc, PoisonError, RwLock};

use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{
    buffer_format_to_vk, clear_value_to_vk, compare_op_to_vk, cull_mode_to_vk, initial_layout,
    load_op_to_vk, stage_flags_to_vk, store_op_to_vk, texture_format_to_vk,
};
use crate::vulkan_shader::VulkanShader;
use crate::vulkan_texture::VulkanTexture;

/// Attachments and the framebuffer built over them
struct PassTargets {
    desc: RenderPassDesc,
    framebuffer: vk::Framebuffer,
}

/// Vulkan graphics pipeline implementation
pub struct VulkanGraphicsPipeline {
    ctx: Arc<GpuContext>,
    desc: GraphicsPipelineDesc,
    pub(crate) render_pass: vk::RenderPass,
    /// Null for presentation-only pipelines
    pub(crate) layout: vk::PipelineLayout,
    /// Present only when the shader declares bindings
    pub(crate) set_layout: Option<vk::DescriptorSetLayout>,
    pub(crate) pipeline: Option<vk::Pipeline>,
    targets: RwLock<PassTargets>,
}

impl VulkanGraphicsPipeline {
    pub(crate) fn create(
        ctx: &Arc<GpuContext>,
        desc: &GraphicsPipelineDesc,
        render_pass_desc: &RenderPassDesc,
    ) -> Result<Arc<Self>> {
        render_pass_desc.validate().map_err(|e| {
            engine_error!("right::vulkan", "{}", e);
            e
        })?;

        let render_pass = create_render_pass(&ctx.device, render_pass_desc)?;

        // From here on Drop releases whatever was created
        let mut pipeline = Self {
            ctx: Arc::clone(ctx),
            desc: desc.clone(),
            render_pass,
            layout: vk::PipelineLayout::null(),
            set_layout: None,
            pipeline: None,
            targets: RwLock::new(PassTargets {
                desc: render_pass_desc.clone(),
                framebuffer: vk::Framebuffer::null(),
            }),
        };

        let framebuffer = create_framebuffer(&ctx.device, render_pass, render_pass_desc)?;
        pipeline.targets.get_mut().unwrap_or_else(PoisonError::into_inner).framebuffer = framebuffer;

        if let Some(shader) = &desc.shader {
            let vk_shader = shader
                .as_any()
                .downcast_ref::<VulkanShader>()
                .ok_or_else(|| Error::InvalidResource("pipeline shader is not a Vulkan shader".to_string()))?;
            pipeline.build_pipeline_state(vk_shader, render_pass_desc)?;
        }

        engine_debug!("right::vulkan", "Created pipeline '{}' ({}x{})",
            render_pass_desc.name, render_pass_desc.extent.x, render_pass_desc.extent.y);

        Ok(Arc::new(pipeline))
    }

    fn build_pipeline_state(&mut self, shader: &VulkanShader, render_pass_desc: &RenderPassDesc) -> Result<()> {
        let device = &self.ctx.device;
        let reflection = shader.reflection();

        unsafe {
            // Binding layout, skipped when the shader binds nothing
            if reflection.has_bindings() {
                let mut bindings: Vec<vk::DescriptorSetLayoutBinding> = reflection
                    .bound_buffers()
                    .into_iter()
                    .map(|(buffer_ref, _)| {
                        vk::DescriptorSetLayoutBinding::default()
                            .binding(buffer_ref.slot)
                            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                            .descriptor_count(1)
                            .stage_flags(stage_flags_to_vk(buffer_ref.stage.into()))
                    })
                    .collect();
                bindings.extend(reflection.textures.iter().map(|texture| {
                    vk::DescriptorSetLayoutBinding::default()
                        .binding(texture.slot)
                        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                        .descriptor_count(1)
                        .stage_flags(stage_flags_to_vk(texture.stages))
                }));

                let layout_create = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
                self.set_layout = Some(device.create_descriptor_set_layout(&layout_create, None)
                    .map_err(|e| engine_err!("right::vulkan", "Failed to create descriptor set layout: {:?}", e))?);
            }

            let set_layouts: Vec<vk::DescriptorSetLayout> = self.set_layout.into_iter().collect();
            let push_constant_ranges: Vec<vk::PushConstantRange> = reflection
                .constant_buffer()
                .map(|_| vk::PushConstantRange {
                    stage_flags: vk::ShaderStageFlags::VERTEX,
                    offset: 0,
                    size: MAX_PUSH_CONSTANT_SIZE,
                })
                .into_iter()
                .collect();

            let layout_create_info = vk::PipelineLayoutCreateInfo::default()
                .set_layouts(&set_layouts)
                .push_constant_ranges(&push_constant_ranges);
            self.layout = device.create_pipeline_layout(&layout_create_info, None)
                .map_err(|e| engine_err!("right::vulkan", "Failed to create pipeline layout: {:?}", e))?;

            let shader_stages: Vec<vk::PipelineShaderStageCreateInfo> = shader
                .stages
                .iter()
                .map(|stage| {
                    vk::PipelineShaderStageCreateInfo::default()
                        .stage(stage.stage)
                        .module(stage.module)
                        .name(&stage.entry_point)
                })
                .collect();

            // Vertex input: binding 0, attributes in layout order
            let vertex_layout = &reflection.layout;
            let vertex_bindings: Vec<vk::VertexInputBindingDescription> = if vertex_layout.is_empty() {
                Vec::new()
            } else {
                vec![vk::VertexInputBindingDescription {
                    binding: 0,
                    stride: vertex_layout.stride(),
                    input_rate: vk::VertexInputRate::VERTEX,
                }]
            };
            let vertex_attributes: Vec<vk::VertexInputAttributeDescription> = vertex_layout
                .elements()
                .iter()
                .zip(vertex_layout.offsets())
                .enumerate()
                .map(|(location, (format, offset))| vk::VertexInputAttributeDescription {
                    location: location as u32,
                    binding: 0,
                    format: buffer_format_to_vk(*format),
                    offset,
                })
                .collect();

            let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
                .vertex_binding_descriptions(&vertex_bindings)
                .vertex_attribute_descriptions(&vertex_attributes);

            let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
                .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
                .primitive_restart_enable(false);

            // Viewport state (dynamic)
            let viewports = [vk::Viewport::default()];
            let scissors = [vk::Rect2D::default()];
            let viewport_state = vk::PipelineViewportStateCreateInfo::default()
                .viewports(&viewports)
                .scissors(&scissors);

            let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
                .depth_clamp_enable(false)
                .rasterizer_discard_enable(false)
                .polygon_mode(vk::PolygonMode::FILL)
                .line_width(1.0)
                .cull_mode(cull_mode_to_vk(self.desc.cull_mode))
                .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
                .depth_bias_enable(false);

            let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
                .depth_test_enable(true)
                .depth_write_enable(true)
                .depth_compare_op(compare_op_to_vk(self.desc.depth_compare_op))
                .depth_bounds_test_enable(false)
                .stencil_test_enable(false);

            let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
                .sample_shading_enable(false)
                .rasterization_samples(vk::SampleCountFlags::TYPE_1);

            let color_blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = render_pass_desc
                .color_attachments
                .iter()
                .map(|_| {
                    vk::PipelineColorBlendAttachmentState::default()
                        .color_write_mask(vk::ColorComponentFlags::RGBA)
                        .blend_enable(false)
                })
                .collect();
            let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
                .logic_op_enable(false)
                .attachments(&color_blend_attachments);

            let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
            let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

            let pipeline_create_info = vk::GraphicsPipelineCreateInfo::default()
                .stages(&shader_stages)
                .vertex_input_state(&vertex_input_state)
                .input_assembly_state(&input_assembly_state)
                .viewport_state(&viewport_state)
                .rasterization_state(&rasterization_state)
                .depth_stencil_state(&depth_stencil_state)
                .multisample_state(&multisample_state)
                .color_blend_state(&color_blend_state)
                .dynamic_state(&dynamic_state)
                .layout(self.layout)
                .render_pass(self.render_pass)
                .subpass(0);

            let pipelines = device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_create_info], None)
                .map_err(|e| engine_err!("right::vulkan", "Failed to create graphics pipeline '{}': {:?}",
                    render_pass_desc.name, e.1))?;
            self.pipeline = pipelines.first().copied();
        }

        Ok(())
    }

    /// Everything `vkCmdBeginRenderPass` needs for the current attachments
    pub(crate) fn begin_info(&self) -> (vk::RenderPass, vk::Framebuffer, vk::Extent2D, Vec<vk::ClearValue>) {
        let targets = self.targets.read().unwrap_or_else(PoisonError::into_inner);
        let extent = vk::Extent2D { width: targets.desc.extent.x, height: targets.desc.extent.y };
        let clear_values = targets
            .desc
            .attachments()
            .map(|a| clear_value_to_vk(&a.clear_value, a.texture.desc().format))
            .collect();
        (self.render_pass, targets.framebuffer, extent, clear_values)
    }
}

impl GraphicsPipeline for VulkanGraphicsPipeline {
    fn desc(&self) -> &GraphicsPipelineDesc {
        &self.desc
    }

    fn render_pass_desc(&self) -> RenderPassDesc {
        self.targets.read().unwrap_or_else(PoisonError::into_inner).desc.clone()
    }

    fn resize(&self, width: u32, height: u32) -> Result<()> {
        let mut targets = self.targets.write().unwrap_or_else(PoisonError::into_inner);
        if targets.desc.extent.x == width && targets.desc.extent.y == height {
            engine_warn!("right::vulkan", "Trying to resize render pass {} to same size!", targets.desc.name);
            return Ok(());
        }

        unsafe {
            self.ctx.device.device_wait_idle()
                .map_err(|e| engine_err!("right::vulkan", "Failed to wait idle before resize: {:?}", e))?;
        }

        let ctx = &self.ctx;
        let resized = targets.desc.resized(width, height, &mut |texture_desc| {
            VulkanTexture::create(ctx, texture_desc, &[]).map(|t| t as Arc<dyn Texture>)
        })?;
        let framebuffer = create_framebuffer(&ctx.device, self.render_pass, &resized)?;

        unsafe {
            ctx.device.destroy_framebuffer(targets.framebuffer, None);
        }
        engine_debug!("right::vulkan", "Resized render pass {} to {}x{}", resized.name, width, height);
        *targets = PassTargets { desc: resized, framebuffer };
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanGraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            let device = &self.ctx.device;
            let targets = self.targets.get_mut().unwrap_or_else(PoisonError::into_inner);
            if targets.framebuffer != vk::Framebuffer::null() {
                device.destroy_framebuffer(targets.framebuffer, None);
            }
            if let Some(pipeline) = self.pipeline {
                device.destroy_pipeline(pipeline, None);
            }
            if self.layout != vk::PipelineLayout::null() {
                device.destroy_pipeline_layout(self.layout, None);
            }
            if let Some(set_layout) = self.set_layout {
                device.destroy_descriptor_set_layout(set_layout, None);
            }
            device.destroy_render_pass(self.render_pass, None);
        }
    }
}

/// Build a one-subpass render pass over the attachments of `desc`
fn create_render_pass(device: &ash::Device, desc: &RenderPassDesc) -> Result<vk::RenderPass> {
    let attachments: Vec<vk::AttachmentDescription> = desc
        .attachments()
        .map(|attachment| {
            let format = attachment.texture.desc().format;
            let (stencil_load, stencil_store) = if format.has_stencil() {
                (load_op_to_vk(attachment.load_op), store_op_to_vk(attachment.store_op))
            } else {
                (vk::AttachmentLoadOp::DONT_CARE, vk::AttachmentStoreOp::DONT_CARE)
            };
            vk::AttachmentDescription::default()
                .format(texture_format_to_vk(format))
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(load_op_to_vk(attachment.load_op))
                .store_op(store_op_to_vk(attachment.store_op))
                .stencil_load_op(stencil_load)
                .stencil_store_op(stencil_store)
                .initial_layout(initial_layout(attachment.load_op))
                .final_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
        })
        .collect();

    let color_attachment_refs: Vec<vk::AttachmentReference> = (0..desc.color_attachments.len())
        .map(|i| {
            vk::AttachmentReference::default()
                .attachment(i as u32)
                .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        })
        .collect();

    let depth_attachment_ref = desc.depth_stencil_attachment.as_ref().map(|_| {
        vk::AttachmentReference::default()
            .attachment(desc.color_attachments.len() as u32)
            .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
    });

    let mut subpass = vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_attachment_refs);
    if let Some(depth_ref) = &depth_attachment_ref {
        subpass = subpass.depth_stencil_attachment(depth_ref);
    }

    let attachment_stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
        | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
    let attachment_writes = vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
    let consumer_stages = vk::PipelineStageFlags::FRAGMENT_SHADER | vk::PipelineStageFlags::TRANSFER;

    // Attachments are sampled or copied by later passes
    let dependencies = [
        vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(attachment_stages | consumer_stages)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(attachment_stages)
            .dst_access_mask(attachment_writes),
        vk::SubpassDependency::default()
            .src_subpass(0)
            .dst_subpass(vk::SUBPASS_EXTERNAL)
            .src_stage_mask(attachment_stages)
            .src_access_mask(attachment_writes)
            .dst_stage_mask(consumer_stages)
            .dst_access_mask(vk::AccessFlags::SHADER_READ | vk::AccessFlags::TRANSFER_READ),
    ];

    let render_pass_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(std::slice::from_ref(&subpass))
        .dependencies(&dependencies);

    unsafe {
        device.create_render_pass(&render_pass_info, None)
            .map_err(|e| engine_err!("right::vulkan", "Failed to create render pass '{}': {:?}", desc.name, e))
    }
}

/// Bind the attachment views of `desc` at its extent
fn create_framebuffer(device: &ash::Device, render_pass: vk::RenderPass, desc: &RenderPassDesc) -> Result<vk::Framebuffer> {
    let views = desc
        .attachments()
        .map(|attachment| {
            attachment
                .texture
                .as_any()
                .downcast_ref::<VulkanTexture>()
                .map(|t| t.attachment_view)
                .ok_or_else(|| Error::InvalidResource(format!(
                    "render pass '{}': attachment is not a Vulkan texture", desc.name
                )))
        })
        .collect::<Result<Vec<vk::ImageView>>>()?;

    let framebuffer_info = vk::FramebufferCreateInfo::default()
        .render_pass(render_pass)
        .attachments(&views)
        .width(desc.extent.x)
        .height(desc.extent.y)
        .layers(1);

    unsafe {
        device.create_framebuffer(&framebuffer_info, None)
            .map_err(|e| engine_err!("right::vulkan", "Failed to create framebuffer '{}': {:?}", desc.name, e))
    }
}
