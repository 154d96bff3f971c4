/// Uniform buffers keyed by binding slot

use std::sync::Arc;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::graphics_device::{Buffer, BufferDesc, GraphicsDevice};

/// One host-visible uniform buffer per slot
///
/// Per-draw data (transforms, materials, picking colors) is packed into
/// the same buffer at aligned offsets, see `GraphicsDevice::aligned_gpu_data_size`.
#[derive(Default)]
pub struct UniformBufferSet {
    buffers: FxHashMap<u32, Arc<dyn Buffer>>,
}

impl UniformBufferSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a `size`-byte uniform buffer for `slot`, replacing any previous one
    pub fn create(&mut self, device: &dyn GraphicsDevice, size: u64, slot: u32) -> Result<()> {
        let buffer = device.create_buffer(&BufferDesc::uniform(size), None)?;
        self.buffers.insert(slot, buffer);
        Ok(())
    }

    pub fn get(&self, slot: u32) -> Result<Arc<dyn Buffer>> {
        self.buffers
            .get(&slot)
            .cloned()
            .ok_or_else(|| Error::InvalidResource(format!("no uniform buffer at slot {}", slot)))
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}
