/// Binding set trait (descriptor set)

use std::any::Any;
use std::sync::Arc;
use crate::error::Result;
use crate::graphics_device::{Buffer, Texture};

/// One binding update
#[derive(Clone)]
pub enum BindingWrite {
    /// Combined image sampler at `slot`
    Texture { slot: u32, texture: Arc<dyn Texture> },
    /// Uniform buffer range at `slot`
    Buffer { slot: u32, buffer: Arc<dyn Buffer>, offset: u64, range: u64 },
}

impl BindingWrite {
    pub fn slot(&self) -> u32 {
        match self {
            BindingWrite::Texture { slot, .. } | BindingWrite::Buffer { slot, .. } => *slot,
        }
    }
}

/// Backend binding set allocated from a pipeline's layout
///
/// Keeps the written resources alive until they are overwritten.
pub trait BindingSet: Send + Sync {
    /// Update the given slots, leaving every other slot untouched
    fn write(&self, writes: &[BindingWrite]) -> Result<()>;

    /// Backend downcast hook
    fn as_any(&self) -> &dyn Any;
}
