/// Shader programs and render passes owned by the SceneRenderer

use std::sync::Arc;
use glam::UVec2;

use crate::error::Result;
use crate::graphics_device::{
    AddressMode, AttachmentDesc, BufferFormat, BufferType, CompareOp, CullMode, GraphicsDevice,
    GraphicsPipeline, GraphicsPipelineDesc, LoadOp, RenderPassDesc, Sampler, SamplerDesc, Shader,
    ShaderProgramDesc, ShaderStage, ShaderStageDesc, StageReflection, Texture, TextureDesc,
    TextureFormat, VertexBufferLayout, CONSTANT_BUFFER_SLOT,
};

/// Color format of every offscreen target
pub const COLOR_FORMAT: TextureFormat = TextureFormat::B8G8R8A8_UNORM;
/// Depth format of the viewport-sized targets
pub const DEPTH_FORMAT: TextureFormat = TextureFormat::D32_FLOAT_S8_UINT;
/// Format of the shadow map
pub const SHADOW_FORMAT: TextureFormat = TextureFormat::D32_FLOAT;

/// Pass selector for `SceneRenderer::get_pass`
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassType {
    Shadow,
    PBR,
    Skybox,
    Postprocess,
    UI,
    Present,
    Picking,
}

/// Compiled SPIR-V of one program
#[derive(Debug, Clone, Default)]
pub struct ShaderBinary {
    pub vertex: Vec<u8>,
    pub fragment: Vec<u8>,
}

/// Programs used by the scene passes
#[derive(Debug, Clone, Default)]
pub struct SceneShaders {
    pub pbr: ShaderBinary,
    pub skybox: ShaderBinary,
    pub postprocess: ShaderBinary,
    pub picking: ShaderBinary,
    pub shadow: ShaderBinary,
}

/// Mesh vertex: position, normal, uv, tangent, bitangent
pub fn mesh_layout() -> VertexBufferLayout {
    VertexBufferLayout::new(vec![
        BufferFormat::R32G32B32_SFLOAT,
        BufferFormat::R32G32B32_SFLOAT,
        BufferFormat::R32G32_SFLOAT,
        BufferFormat::R32G32B32_SFLOAT,
        BufferFormat::R32G32B32_SFLOAT,
    ])
}

fn uniforms(slots: &[u32]) -> Vec<(u32, BufferType)> {
    slots.iter().map(|slot| (*slot, BufferType::Uniform)).collect()
}

fn program(
    name: &str,
    binary: &ShaderBinary,
    vertex: StageReflection,
    fragment: StageReflection,
) -> ShaderProgramDesc {
    ShaderProgramDesc {
        name: name.to_string(),
        stages: vec![
            ShaderStageDesc::new(ShaderStage::Vertex, binary.vertex.clone(), vertex),
            ShaderStageDesc::new(ShaderStage::Fragment, binary.fragment.clone(), fragment),
        ],
    }
}

/// Program descriptors with the bindings each scene shader declares
pub fn pbr_program(binary: &ShaderBinary) -> ShaderProgramDesc {
    program(
        "pbr",
        binary,
        StageReflection { buffers: uniforms(&[0, 1]), textures: Vec::new(), vertex_layout: Some(mesh_layout()) },
        StageReflection {
            buffers: uniforms(&[2, 11, 12]),
            textures: vec![3, 4, 5, 6, 7, 8, 9, 10, 13],
            vertex_layout: None,
        },
    )
}

pub fn skybox_program(binary: &ShaderBinary) -> ShaderProgramDesc {
    program(
        "skybox",
        binary,
        StageReflection {
            buffers: uniforms(&[1]),
            textures: Vec::new(),
            vertex_layout: Some(VertexBufferLayout::new(vec![BufferFormat::R32G32B32_SFLOAT])),
        },
        StageReflection { textures: vec![3], ..Default::default() },
    )
}

pub fn postprocess_program(binary: &ShaderBinary) -> ShaderProgramDesc {
    program(
        "postprocess",
        binary,
        StageReflection {
            vertex_layout: Some(VertexBufferLayout::new(vec![
                BufferFormat::R32G32_SFLOAT,
                BufferFormat::R32G32_SFLOAT,
            ])),
            ..Default::default()
        },
        StageReflection { buffers: uniforms(&[12]), textures: vec![3], vertex_layout: None },
    )
}

pub fn picking_program(binary: &ShaderBinary) -> ShaderProgramDesc {
    program(
        "picking",
        binary,
        StageReflection { buffers: uniforms(&[0, 1]), textures: Vec::new(), vertex_layout: Some(mesh_layout()) },
        StageReflection { buffers: uniforms(&[13]), ..Default::default() },
    )
}

pub fn shadow_program(binary: &ShaderBinary) -> ShaderProgramDesc {
    program(
        "shadow",
        binary,
        StageReflection {
            buffers: vec![(0, BufferType::Uniform), (CONSTANT_BUFFER_SLOT, BufferType::Constant)],
            textures: Vec::new(),
            vertex_layout: Some(mesh_layout()),
        },
        StageReflection::default(),
    )
}

/// Compiled scene programs
pub struct PassShaders {
    pub pbr: Arc<dyn Shader>,
    pub skybox: Arc<dyn Shader>,
    pub postprocess: Arc<dyn Shader>,
    pub picking: Arc<dyn Shader>,
    pub shadow: Arc<dyn Shader>,
}

impl PassShaders {
    pub fn create(device: &dyn GraphicsDevice, shaders: &SceneShaders) -> Result<Self> {
        Ok(Self {
            pbr: device.create_shader(&pbr_program(&shaders.pbr))?,
            skybox: device.create_shader(&skybox_program(&shaders.skybox))?,
            postprocess: device.create_shader(&postprocess_program(&shaders.postprocess))?,
            picking: device.create_shader(&picking_program(&shaders.picking))?,
            shadow: device.create_shader(&shadow_program(&shaders.shadow))?,
        })
    }
}

fn color_target(device: &dyn GraphicsDevice, extent: UVec2, sampler: &Arc<dyn Sampler>) -> Result<Arc<dyn Texture>> {
    let texture = device.create_texture(&TextureDesc::texture_2d(extent.x, extent.y, COLOR_FORMAT), &[])?;
    texture.set_sampler(Some(sampler.clone()));
    Ok(texture)
}

fn depth_target(device: &dyn GraphicsDevice, extent: UVec2, format: TextureFormat) -> Result<Arc<dyn Texture>> {
    device.create_texture(&TextureDesc::texture_2d(extent.x, extent.y, format), &[])
}

fn with_shader(shader: &Arc<dyn Shader>) -> GraphicsPipelineDesc {
    GraphicsPipelineDesc { shader: Some(shader.clone()), ..Default::default() }
}

/// Passes sized to the viewport, recreated on `resize`
pub struct OffscreenPasses {
    pub pbr: Arc<dyn GraphicsPipeline>,
    pub skybox: Arc<dyn GraphicsPipeline>,
    pub postprocess: Arc<dyn GraphicsPipeline>,
    pub picking: Arc<dyn GraphicsPipeline>,
}

impl OffscreenPasses {
    pub fn create(
        device: &dyn GraphicsDevice,
        shaders: &PassShaders,
        viewport: UVec2,
        sampler: &Arc<dyn Sampler>,
    ) -> Result<Self> {
        // PBR renders into fresh targets
        let pbr_color = color_target(device, viewport, sampler)?;
        let pbr_depth = depth_target(device, viewport, DEPTH_FORMAT)?;
        let mut pbr_pass = RenderPassDesc::new("PBR_main", viewport);
        pbr_pass.color_attachments.push(AttachmentDesc::new(pbr_color.clone(), LoadOp::Clear));
        pbr_pass.depth_stencil_attachment = Some(AttachmentDesc::new(pbr_depth.clone(), LoadOp::Clear));
        let pbr = device.create_graphics_pipeline(&with_shader(&shaders.pbr), &pbr_pass)?;

        // Skybox draws on top of the PBR result
        let mut skybox_pass = RenderPassDesc::new("Skybox", viewport);
        skybox_pass.color_attachments.push(AttachmentDesc::new(pbr_color, LoadOp::Load));
        skybox_pass.depth_stencil_attachment = Some(AttachmentDesc::new(pbr_depth, LoadOp::Load));
        let skybox = device.create_graphics_pipeline(
            &GraphicsPipelineDesc {
                shader: Some(shaders.skybox.clone()),
                cull_mode: CullMode::Front,
                depth_compare_op: CompareOp::LessOrEqual,
            },
            &skybox_pass,
        )?;

        let mut postprocess_pass = RenderPassDesc::new("Postprocess", viewport);
        postprocess_pass
            .color_attachments
            .push(AttachmentDesc::new(color_target(device, viewport, sampler)?, LoadOp::Clear));
        postprocess_pass.depth_stencil_attachment =
            Some(AttachmentDesc::new(depth_target(device, viewport, DEPTH_FORMAT)?, LoadOp::Clear));
        let postprocess = device.create_graphics_pipeline(&with_shader(&shaders.postprocess), &postprocess_pass)?;

        let mut picking_pass = RenderPassDesc::new("Picking", viewport);
        picking_pass
            .color_attachments
            .push(AttachmentDesc::new(color_target(device, viewport, sampler)?, LoadOp::Clear));
        picking_pass.depth_stencil_attachment =
            Some(AttachmentDesc::new(depth_target(device, viewport, DEPTH_FORMAT)?, LoadOp::Clear));
        let picking = device.create_graphics_pipeline(&with_shader(&shaders.picking), &picking_pass)?;

        Ok(Self { pbr, skybox, postprocess, picking })
    }
}

/// Depth-only shadow map pass
pub fn create_shadow_pass(
    device: &dyn GraphicsDevice,
    shader: &Arc<dyn Shader>,
    size: u32,
) -> Result<Arc<dyn GraphicsPipeline>> {
    let extent = UVec2::splat(size);
    let depth = depth_target(device, extent, SHADOW_FORMAT)?;
    let sampler_desc = SamplerDesc { max_lod: 9.0, ..SamplerDesc::default().with_address_mode(AddressMode::ClampToEdge) };
    depth.set_sampler(Some(device.create_sampler(&sampler_desc)?));

    let mut pass = RenderPassDesc::new("Shadow", extent);
    pass.depth_stencil_attachment = Some(AttachmentDesc::new(depth, LoadOp::Clear));
    device.create_graphics_pipeline(
        &GraphicsPipelineDesc { shader: Some(shader.clone()), cull_mode: CullMode::Front, ..Default::default() },
        &pass,
    )
}

/// Swapchain pass: no shader, copies its attachment to the acquired image
pub fn create_present_pass(
    device: &dyn GraphicsDevice,
    window_size: UVec2,
    sampler: &Arc<dyn Sampler>,
) -> Result<Arc<dyn GraphicsPipeline>> {
    let mut pass = RenderPassDesc::new("Present", window_size);
    pass.offscreen = false;
    pass.color_attachments.push(AttachmentDesc::new(color_target(device, window_size, sampler)?, LoadOp::Load));
    device.create_graphics_pipeline(&GraphicsPipelineDesc::default(), &pass)
}

/// UI composition pass rendering into the present attachment
pub fn create_ui_pass(
    device: &dyn GraphicsDevice,
    present: &Arc<dyn GraphicsPipeline>,
) -> Result<Arc<dyn GraphicsPipeline>> {
    let present_pass = present.render_pass_desc();
    let mut pass = RenderPassDesc::new("UI", present_pass.extent);
    for attachment in &present_pass.color_attachments {
        pass.color_attachments.push(AttachmentDesc::new(attachment.texture.clone(), LoadOp::Clear));
    }
    device.create_graphics_pipeline(&GraphicsPipelineDesc::default(), &pass)
}

#[cfg(test)]
#[path = "passes_tests.rs"]
mod tests;
