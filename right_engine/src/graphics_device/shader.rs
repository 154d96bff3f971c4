/// Shader trait, program descriptor, and binding reflection
///
/// Every stage carries a `StageReflection` (filled by hand or reflected from
/// SPIR-V by the backend). `merge_stage_reflections` folds the stages of a
/// program into one `ShaderReflection`, which drives the binding layout,
/// the push-constant range and the vertex input state of every pipeline
/// built from the shader.

use std::any::Any;
use bitflags::bitflags;
use rustc_hash::FxHashMap;
use crate::error::{Error, Result};
use crate::graphics_device::{BufferFormat, BufferType};

/// Slot reserved for the push-constant buffer
pub const CONSTANT_BUFFER_SLOT: u32 = u32::MAX;

/// Maximum push-constant payload in bytes
pub const MAX_PUSH_CONSTANT_SIZE: u32 = 128;

/// Shader stage type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

bitflags! {
    /// Set of stages a binding is visible to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
    }
}

impl From<ShaderStage> for ShaderStageFlags {
    fn from(stage: ShaderStage) -> Self {
        match stage {
            ShaderStage::Vertex => ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => ShaderStageFlags::FRAGMENT,
        }
    }
}

// ===== VERTEX LAYOUT =====

/// Interleaved vertex layout of binding 0
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VertexBufferLayout {
    elements: Vec<BufferFormat>,
}

impl VertexBufferLayout {
    /// Build a layout from its elements in location order
    pub fn new(elements: Vec<BufferFormat>) -> Self {
        Self { elements }
    }

    /// Append an element at the next location
    pub fn push(&mut self, format: BufferFormat) -> &mut Self {
        self.elements.push(format);
        self
    }

    /// Elements in location order
    pub fn elements(&self) -> &[BufferFormat] {
        &self.elements
    }

    /// Byte offset of every element
    pub fn offsets(&self) -> Vec<u32> {
        self.elements
            .iter()
            .scan(0u32, |offset, format| {
                let current = *offset;
                *offset += format.size_bytes();
                Some(current)
            })
            .collect()
    }

    /// Size in bytes of one vertex
    pub fn stride(&self) -> u32 {
        self.elements.iter().map(|f| f.size_bytes()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

// ===== REFLECTION =====

/// Bindings declared by a single stage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageReflection {
    /// Buffer slots and their type
    pub buffers: Vec<(u32, BufferType)>,
    /// Combined image sampler slots
    pub textures: Vec<u32>,
    /// Vertex input layout (vertex stage only)
    pub vertex_layout: Option<VertexBufferLayout>,
}

impl StageReflection {
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty() && self.textures.is_empty() && self.vertex_layout.is_none()
    }
}

/// A buffer binding claimed by one stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferRef {
    pub slot: u32,
    pub stage: ShaderStage,
}

/// A texture binding and the stages sampling it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureBinding {
    pub slot: u32,
    pub stages: ShaderStageFlags,
}

/// Merged bindings of a whole shader program
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShaderReflection {
    /// Buffer bindings keyed by (slot, stage)
    pub buffers: FxHashMap<BufferRef, BufferType>,
    /// Texture bindings sorted by slot
    pub textures: Vec<TextureBinding>,
    /// Vertex input layout
    pub layout: VertexBufferLayout,
}

impl ShaderReflection {
    /// The push-constant buffer, if the program declares one
    pub fn constant_buffer(&self) -> Option<BufferRef> {
        self.buffers
            .iter()
            .find(|(_, ty)| **ty == BufferType::Constant)
            .map(|(r, _)| *r)
    }

    /// Descriptor-bound buffers sorted by slot
    pub fn bound_buffers(&self) -> Vec<(BufferRef, BufferType)> {
        let mut buffers: Vec<_> = self
            .buffers
            .iter()
            .filter(|(_, ty)| **ty != BufferType::Constant)
            .map(|(r, ty)| (*r, *ty))
            .collect();
        buffers.sort_by_key(|(r, _)| r.slot);
        buffers
    }

    /// Number of entries a binding set needs
    pub fn binding_count(&self) -> usize {
        self.bound_buffers().len() + self.textures.len()
    }

    /// True when the program needs a binding set at all
    pub fn has_bindings(&self) -> bool {
        self.binding_count() > 0
    }

    /// Stage owning a buffer slot
    pub fn buffer_stage(&self, slot: u32) -> Option<ShaderStage> {
        self.buffers.keys().find(|r| r.slot == slot).map(|r| r.stage)
    }
}

/// Fold per-stage reflections into one program reflection
///
/// # Errors
///
/// Returns `Error::ShaderReflection` when:
/// - two stages (or one stage twice) claim the same buffer slot
/// - a texture slot collides with a buffer slot
/// - more than one stage contributes a vertex input layout
/// - more than one constant buffer is declared
pub fn merge_stage_reflections(stages: &[(ShaderStage, StageReflection)]) -> Result<ShaderReflection> {
    let mut merged = ShaderReflection::default();
    let mut layout_stage: Option<ShaderStage> = None;
    let mut textures: FxHashMap<u32, ShaderStageFlags> = FxHashMap::default();

    for (stage, reflection) in stages {
        for &(slot, buffer_type) in &reflection.buffers {
            if let Some(owner) = merged.buffer_stage(slot) {
                return Err(Error::ShaderReflection(format!(
                    "buffer slot {} is claimed by both {:?} and {:?} stages",
                    slot, owner, stage
                )));
            }
            if buffer_type == BufferType::Constant && merged.constant_buffer().is_some() {
                return Err(Error::ShaderReflection(
                    "more than one constant buffer declared".to_string(),
                ));
            }
            merged.buffers.insert(BufferRef { slot, stage: *stage }, buffer_type);
        }

        for &slot in &reflection.textures {
            *textures.entry(slot).or_insert(ShaderStageFlags::empty()) |= ShaderStageFlags::from(*stage);
        }

        if let Some(layout) = &reflection.vertex_layout {
            if let Some(previous) = layout_stage {
                return Err(Error::ShaderReflection(format!(
                    "vertex input layout contributed by both {:?} and {:?} stages",
                    previous, stage
                )));
            }
            layout_stage = Some(*stage);
            merged.layout = layout.clone();
        }
    }

    if let Some(slot) = textures.keys().find(|slot| merged.buffer_stage(**slot).is_some()) {
        return Err(Error::ShaderReflection(format!(
            "slot {} is bound both as texture and as buffer",
            slot
        )));
    }

    merged.textures = textures
        .into_iter()
        .map(|(slot, stages)| TextureBinding { slot, stages })
        .collect();
    merged.textures.sort_by_key(|t| t.slot);

    Ok(merged)
}

// ===== PROGRAM DESCRIPTOR =====

/// One compiled stage of a program
#[derive(Debug, Clone)]
pub struct ShaderStageDesc {
    /// Pipeline stage
    pub stage: ShaderStage,
    /// SPIR-V bytecode
    pub code: Vec<u8>,
    /// Entry point name
    pub entry_point: String,
    /// Declared bindings; backends reflect the bytecode when empty
    pub reflection: StageReflection,
}

impl ShaderStageDesc {
    /// Stage with entry point "main"
    pub fn new(stage: ShaderStage, code: Vec<u8>, reflection: StageReflection) -> Self {
        Self { stage, code, entry_point: "main".to_string(), reflection }
    }
}

/// Descriptor for creating a shader program
#[derive(Debug, Clone)]
pub struct ShaderProgramDesc {
    /// Debug name
    pub name: String,
    /// Stages in pipeline order
    pub stages: Vec<ShaderStageDesc>,
}

/// Shader program trait
///
/// Implemented by backend-specific shader types (e.g., VulkanShader).
pub trait Shader: Send + Sync {
    /// Debug name of the program
    fn name(&self) -> &str;

    /// Merged bindings of all stages
    fn reflection(&self) -> &ShaderReflection;

    /// Backend downcast hook
    fn as_any(&self) -> &dyn Any;
}

#[cfg(test)]
#[path = "shader_tests.rs"]
mod tests;
