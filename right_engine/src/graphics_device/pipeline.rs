/// Graphics pipeline trait, render pass descriptor, and attachment types

use std::any::Any;
use std::sync::Arc;
use glam::{UVec2, Vec4};
use crate::error::{Error, Result};
use crate::graphics_device::{Shader, Texture, TextureDesc};

/// Face culling mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    /// No culling
    None,
    /// Cull front faces
    Front,
    /// Cull back faces
    Back,
    /// Cull everything
    FrontAndBack,
}

/// Depth comparison operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

/// Attachment load operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadOp {
    /// Previous content is irrelevant
    Undefined,
    /// Keep the shader-readable content written by an earlier pass
    Load,
    /// Clear to the attachment's clear value
    Clear,
}

/// Attachment store operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// Content may be discarded
    Undefined,
    /// Keep the rendered content
    Store,
}

/// Clear value of an attachment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearValue {
    /// Color for color attachments
    pub color: Vec4,
    /// Depth for depth attachments
    pub depth: f32,
    /// Stencil for depth/stencil attachments
    pub stencil: u32,
}

impl Default for ClearValue {
    fn default() -> Self {
        Self {
            color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            depth: 1.0,
            stencil: 0,
        }
    }
}

/// Fixed-function state of a pipeline
#[derive(Clone)]
pub struct GraphicsPipelineDesc {
    /// Program; `None` builds a presentation-only pipeline
    pub shader: Option<Arc<dyn Shader>>,
    /// Face culling
    pub cull_mode: CullMode,
    /// Depth test comparison
    pub depth_compare_op: CompareOp,
}

impl Default for GraphicsPipelineDesc {
    fn default() -> Self {
        Self {
            shader: None,
            cull_mode: CullMode::Back,
            depth_compare_op: CompareOp::Less,
        }
    }
}

/// One attachment of a render pass
#[derive(Clone)]
pub struct AttachmentDesc {
    /// Image rendered into
    pub texture: Arc<dyn Texture>,
    /// Clear value used with `LoadOp::Clear`
    pub clear_value: ClearValue,
    /// Load operation
    pub load_op: LoadOp,
    /// Store operation
    pub store_op: StoreOp,
}

impl AttachmentDesc {
    /// Attachment storing its result
    pub fn new(texture: Arc<dyn Texture>, load_op: LoadOp) -> Self {
        Self {
            texture,
            clear_value: ClearValue::default(),
            load_op,
            store_op: StoreOp::Store,
        }
    }
}

/// Attachments and extent of a render pass
#[derive(Clone)]
pub struct RenderPassDesc {
    /// Framebuffer size
    pub extent: UVec2,
    /// Color attachments in location order
    pub color_attachments: Vec<AttachmentDesc>,
    /// Optional depth/stencil attachment
    pub depth_stencil_attachment: Option<AttachmentDesc>,
    /// False for the pass presenting to the swapchain
    pub offscreen: bool,
    /// Debug name
    pub name: String,
}

impl RenderPassDesc {
    /// Offscreen pass of the given size with no attachments yet
    pub fn new(name: &str, extent: UVec2) -> Self {
        Self {
            extent,
            color_attachments: Vec::new(),
            depth_stencil_attachment: None,
            offscreen: true,
            name: name.to_string(),
        }
    }

    /// All attachments, colors first
    pub fn attachments(&self) -> impl Iterator<Item = &AttachmentDesc> {
        self.color_attachments.iter().chain(self.depth_stencil_attachment.iter())
    }

    /// Clear values in attachment order
    pub fn clear_values(&self) -> Vec<ClearValue> {
        self.attachments().map(|a| a.clear_value).collect()
    }

    /// Check that every attachment matches the extent and its role
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidResource` when the pass has no attachment,
    /// when an attachment size differs from the extent, or when a depth
    /// format is used as color (or the other way around).
    pub fn validate(&self) -> Result<()> {
        if self.color_attachments.is_empty() && self.depth_stencil_attachment.is_none() {
            return Err(Error::InvalidResource(format!("render pass '{}' has no attachment", self.name)));
        }
        for attachment in self.attachments() {
            let desc = attachment.texture.desc();
            if desc.width != self.extent.x || desc.height != self.extent.y {
                return Err(Error::InvalidResource(format!(
                    "render pass '{}': attachment is {}x{} but extent is {}x{}",
                    self.name, desc.width, desc.height, self.extent.x, self.extent.y
                )));
            }
        }
        if self.color_attachments.iter().any(|a| a.texture.desc().format.is_depth()) {
            return Err(Error::InvalidResource(format!(
                "render pass '{}': depth format used as color attachment",
                self.name
            )));
        }
        if let Some(depth) = &self.depth_stencil_attachment {
            if !depth.texture.desc().format.is_depth() {
                return Err(Error::InvalidResource(format!(
                    "render pass '{}': depth attachment has color format {:?}",
                    self.name,
                    depth.texture.desc().format
                )));
            }
        }
        Ok(())
    }

    /// Copy of this pass with every attachment recreated at a new size
    ///
    /// Each texture is rebuilt from its own descriptor with the new
    /// dimensions and keeps its sampler. Load/store ops and clear values
    /// are unchanged.
    ///
    /// # Arguments
    ///
    /// * `width` - New width
    /// * `height` - New height
    /// * `create_texture` - Backend texture factory
    pub fn resized(
        &self,
        width: u32,
        height: u32,
        create_texture: &mut dyn FnMut(&TextureDesc) -> Result<Arc<dyn Texture>>,
    ) -> Result<RenderPassDesc> {
        let mut resize = |attachment: &AttachmentDesc| -> Result<AttachmentDesc> {
            let texture = create_texture(&attachment.texture.desc().with_size(width, height))?;
            texture.set_sampler(attachment.texture.sampler());
            Ok(AttachmentDesc { texture, ..attachment.clone() })
        };

        let color_attachments = self
            .color_attachments
            .iter()
            .map(&mut resize)
            .collect::<Result<Vec<_>>>()?;
        let depth_stencil_attachment = self.depth_stencil_attachment.as_ref().map(&mut resize).transpose()?;

        Ok(RenderPassDesc {
            extent: UVec2::new(width, height),
            color_attachments,
            depth_stencil_attachment,
            offscreen: self.offscreen,
            name: self.name.clone(),
        })
    }
}

/// Graphics pipeline trait
///
/// Owns the backend render pass, framebuffer, pipeline-state object and
/// binding layout built from a `GraphicsPipelineDesc` and `RenderPassDesc`.
pub trait GraphicsPipeline: Send + Sync {
    /// Fixed-function state and shader
    fn desc(&self) -> &GraphicsPipelineDesc;

    /// Current attachments (replaced on resize)
    fn render_pass_desc(&self) -> RenderPassDesc;

    /// Recreate every attachment at a new size
    ///
    /// Resizing to the current extent logs a warning and keeps every
    /// texture. The render pass and pipeline-state object are reused.
    ///
    /// # Errors
    ///
    /// Propagates texture or framebuffer creation failures.
    fn resize(&self, width: u32, height: u32) -> Result<()>;

    /// Backend downcast hook
    fn as_any(&self) -> &dyn Any;

    /// Debug name of the pass
    fn name(&self) -> String {
        self.render_pass_desc().name
    }

    /// Current framebuffer size
    fn extent(&self) -> UVec2 {
        self.render_pass_desc().extent
    }

    /// False for the swapchain-presenting pipeline
    fn is_offscreen(&self) -> bool {
        self.render_pass_desc().offscreen
    }

    /// Color attachment texture at `index`
    fn color_attachment(&self, index: usize) -> Option<Arc<dyn Texture>> {
        self.render_pass_desc().color_attachments.get(index).map(|a| a.texture.clone())
    }

    /// Depth attachment texture
    fn depth_attachment(&self) -> Option<Arc<dyn Texture>> {
        self.render_pass_desc().depth_stencil_attachment.map(|a| a.texture)
    }

    /// Vertex stride of the bound shader, 0 without shader
    fn vertex_stride(&self) -> u32 {
        self.desc().shader.as_ref().map_or(0, |s| s.reflection().layout.stride())
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
