/// RendererState - per-draw resource bindings
///
/// A state records which texture or buffer range sits in which slot. The
/// backend binding set is created lazily from the pipeline layout on the
/// first `on_update`; afterwards only slots that changed since the last
/// update are rewritten.

use std::sync::Arc;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::Result;
use crate::graphics_device::{
    BindingSet, BindingWrite, Buffer, BufferRef, GraphicsDevice, GraphicsPipeline, ShaderStage,
    Texture,
};

/// Key of one recorded binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKey {
    Texture(u32),
    Buffer(BufferRef),
}

impl BindingKey {
    pub fn slot(&self) -> u32 {
        match self {
            BindingKey::Texture(slot) => *slot,
            BindingKey::Buffer(r) => r.slot,
        }
    }
}

/// A uniform buffer range bound to a slot
#[derive(Clone)]
pub struct BufferBinding {
    pub buffer: Arc<dyn Buffer>,
    /// Byte offset of the range
    pub offset: u64,
    /// Range size, 0 for "rest of the buffer"
    pub stride: u64,
}

impl BufferBinding {
    /// Size of the bound range
    pub fn range(&self) -> u64 {
        if self.stride > 0 {
            self.stride
        } else {
            self.buffer.size().saturating_sub(self.offset)
        }
    }

    fn same_as(&self, other: &BufferBinding) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
            && self.offset == other.offset
            && self.stride == other.stride
    }
}

/// Bindings of one draw
#[derive(Default)]
pub struct RendererState {
    textures: FxHashMap<u32, Arc<dyn Texture>>,
    buffers: FxHashMap<BufferRef, BufferBinding>,
    constant_buffer: Option<Arc<dyn Buffer>>,
    dirty: FxHashSet<BindingKey>,
    binding_set: Option<Arc<dyn BindingSet>>,
    /// Pipeline whose layout `binding_set` was allocated from
    pipeline: Option<Arc<dyn GraphicsPipeline>>,
}

impl RendererState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `texture` at `slot`
    pub fn set_texture(&mut self, texture: Arc<dyn Texture>, slot: u32) {
        if let Some(current) = self.textures.get(&slot) {
            if Arc::ptr_eq(current, &texture) {
                return;
            }
        }
        self.textures.insert(slot, texture);
        self.dirty.insert(BindingKey::Texture(slot));
    }

    /// Bind a vertex-stage uniform range at `slot`
    pub fn set_vertex_buffer(&mut self, buffer: Arc<dyn Buffer>, slot: u32, offset: u64, stride: u64) {
        self.set_buffer(BufferRef { slot, stage: ShaderStage::Vertex }, BufferBinding { buffer, offset, stride });
    }

    /// Bind a fragment-stage uniform range at `slot`
    pub fn set_fragment_buffer(&mut self, buffer: Arc<dyn Buffer>, slot: u32, offset: u64, stride: u64) {
        self.set_buffer(BufferRef { slot, stage: ShaderStage::Fragment }, BufferBinding { buffer, offset, stride });
    }

    /// Buffer pushed as push constants instead of being bound
    pub fn set_constant_buffer(&mut self, buffer: Arc<dyn Buffer>) {
        self.constant_buffer = Some(buffer);
    }

    fn set_buffer(&mut self, key: BufferRef, binding: BufferBinding) {
        if let Some(current) = self.buffers.get(&key) {
            if current.same_as(&binding) {
                return;
            }
        }
        self.buffers.insert(key, binding);
        self.dirty.insert(BindingKey::Buffer(key));
    }

    pub fn constant_buffer(&self) -> Option<&Arc<dyn Buffer>> {
        self.constant_buffer.as_ref()
    }

    pub fn texture(&self, slot: u32) -> Option<&Arc<dyn Texture>> {
        self.textures.get(&slot)
    }

    /// Buffer bound at `slot`, whatever its stage
    pub fn buffer(&self, slot: u32) -> Option<&BufferBinding> {
        self.buffers.iter().find(|(r, _)| r.slot == slot).map(|(_, b)| b)
    }

    /// Slots changed since the last update, sorted
    pub fn dirty_slots(&self) -> Vec<u32> {
        let mut slots: Vec<u32> = self.dirty.iter().map(|k| k.slot()).collect();
        slots.sort_unstable();
        slots
    }

    /// The backend binding set, once created
    pub fn binding_set(&self) -> Option<&Arc<dyn BindingSet>> {
        self.binding_set.as_ref()
    }

    /// True when nothing but (at most) a constant buffer was recorded
    pub fn is_empty(&self) -> bool {
        self.textures.is_empty() && self.buffers.is_empty()
    }

    /// Flush recorded bindings into the backend binding set
    ///
    /// The first call allocates the set from `pipeline` and writes every
    /// binding. Later calls write the dirty slots only, unless `pipeline`
    /// changed: the set is then reallocated from the new layout and fully
    /// rewritten. The constant buffer never goes through the binding set.
    pub fn on_update(&mut self, device: &dyn GraphicsDevice, pipeline: &Arc<dyn GraphicsPipeline>) -> Result<()> {
        if self.is_empty() {
            self.dirty.clear();
            return Ok(());
        }

        let same_pipeline = self
            .pipeline
            .as_ref()
            .is_some_and(|current| std::ptr::addr_eq(Arc::as_ptr(current), Arc::as_ptr(pipeline)));

        let keys: Vec<BindingKey> = if self.binding_set.is_none() || !same_pipeline {
            self.binding_set = Some(device.create_binding_set(pipeline)?);
            self.pipeline = Some(pipeline.clone());
            self.textures
                .keys()
                .map(|slot| BindingKey::Texture(*slot))
                .chain(self.buffers.keys().map(|r| BindingKey::Buffer(*r)))
                .collect()
        } else {
            self.dirty.iter().copied().collect()
        };

        let mut writes: Vec<BindingWrite> = keys
            .into_iter()
            .filter_map(|key| match key {
                BindingKey::Texture(slot) => self
                    .textures
                    .get(&slot)
                    .map(|texture| BindingWrite::Texture { slot, texture: texture.clone() }),
                BindingKey::Buffer(r) => self.buffers.get(&r).map(|b| BindingWrite::Buffer {
                    slot: r.slot,
                    buffer: b.buffer.clone(),
                    offset: b.offset,
                    range: b.range(),
                }),
            })
            .collect();
        writes.sort_by_key(|w| w.slot());

        if let Some(set) = &self.binding_set {
            if !writes.is_empty() {
                set.write(&writes)?;
            }
        }
        self.dirty.clear();
        Ok(())
    }
}

#[cfg(test)]
#[path = "renderer_state_tests.rs"]
mod tests;
