/// Buffer trait, buffer descriptor, and vertex element formats

use std::any::Any;
use crate::error::{Error, Result};

/// What a buffer holds and how it may be bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferType {
    /// Vertex buffer
    Vertex,
    /// Index buffer (32-bit indices)
    Index,
    /// Uniform buffer, bound through a binding set
    Uniform,
    /// Push-constant data, never bound through a binding set
    Constant,
    /// Source of a transfer (staging, readback)
    TransferSrc,
    /// Destination of a transfer
    TransferDst,
}

/// Memory visibility class of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryType {
    /// Host memory only, used for readback
    CpuOnly,
    /// Host-visible and device-readable, used for per-frame uploads
    CpuGpu,
    /// Device-local, filled through a staging copy
    GpuOnly,
}

impl MemoryType {
    /// True when the host can map this memory
    pub fn is_host_visible(&self) -> bool {
        !matches!(self, MemoryType::GpuOnly)
    }
}

/// Descriptor for creating a buffer
#[derive(Debug, Clone, PartialEq)]
pub struct BufferDesc {
    /// Size in bytes
    pub size: u64,
    /// Buffer type
    pub buffer_type: BufferType,
    /// Memory visibility
    pub memory_type: MemoryType,
}

impl BufferDesc {
    /// Host-visible uniform buffer of `size` bytes
    pub fn uniform(size: u64) -> Self {
        Self { size, buffer_type: BufferType::Uniform, memory_type: MemoryType::CpuGpu }
    }

    /// Host-visible vertex buffer of `size` bytes
    pub fn vertex(size: u64) -> Self {
        Self { size, buffer_type: BufferType::Vertex, memory_type: MemoryType::CpuGpu }
    }

    /// Host-visible push-constant buffer of `size` bytes
    pub fn constant(size: u64) -> Self {
        Self { size, buffer_type: BufferType::Constant, memory_type: MemoryType::CpuGpu }
    }
}

/// Vertex element format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum BufferFormat {
    R32_SFLOAT,          // float (4 bytes)
    R32G32_SFLOAT,       // vec2 (8 bytes)
    R32G32B32_SFLOAT,    // vec3 (12 bytes)
    R32G32B32A32_SFLOAT, // vec4 (16 bytes)

    R32_SINT,
    R32G32_SINT,
    R32G32B32_SINT,
    R32G32B32A32_SINT,

    R32_UINT,
    R32G32_UINT,
    R32G32B32_UINT,
    R32G32B32A32_UINT,
}

impl BufferFormat {
    /// Returns size in bytes for this format
    pub fn size_bytes(&self) -> u32 {
        match self {
            BufferFormat::R32_SFLOAT | BufferFormat::R32_SINT | BufferFormat::R32_UINT => 4,
            BufferFormat::R32G32_SFLOAT | BufferFormat::R32G32_SINT | BufferFormat::R32G32_UINT => 8,
            BufferFormat::R32G32B32_SFLOAT | BufferFormat::R32G32B32_SINT | BufferFormat::R32G32B32_UINT => 12,
            BufferFormat::R32G32B32A32_SFLOAT | BufferFormat::R32G32B32A32_SINT | BufferFormat::R32G32B32A32_UINT => 16,
        }
    }
}

/// Check that `len` bytes at `offset` fit in a buffer of `size` bytes
pub fn check_range(size: u64, offset: u64, len: u64) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(Error::OutOfBounds(format!(
            "write of {} bytes at offset {} exceeds buffer size {}",
            len, offset, size
        ))),
    }
}

/// Buffer resource trait
///
/// Implemented by backend-specific buffer types (e.g., VulkanBuffer).
/// The buffer is automatically destroyed when dropped.
pub trait Buffer: Send + Sync {
    /// Get the descriptor this buffer was created with
    fn desc(&self) -> &BufferDesc;

    /// Map the buffer memory for the duration of `f`
    ///
    /// The slice covers the whole buffer and cannot outlive the call,
    /// which is the scoped equivalent of a map/unmap pair.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidResource` for `GpuOnly` buffers.
    fn with_mapped(&self, f: &mut dyn FnMut(&mut [u8])) -> Result<()>;

    /// Backend downcast hook
    fn as_any(&self) -> &dyn Any;

    /// Size in bytes
    fn size(&self) -> u64 {
        self.desc().size
    }

    /// Copy `data` into the buffer at `offset`
    ///
    /// # Arguments
    ///
    /// * `data` - Bytes to write
    /// * `offset` - Byte offset into the buffer
    ///
    /// # Errors
    ///
    /// Returns `Error::OutOfBounds` when the write does not fit.
    fn set_data(&self, data: &[u8], offset: u64) -> Result<()> {
        check_range(self.size(), offset, data.len() as u64)?;
        let start = offset as usize;
        self.with_mapped(&mut |mapped| {
            mapped[start..start + data.len()].copy_from_slice(data);
        })
    }

    /// Copy the whole buffer content out
    fn read_data(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.with_mapped(&mut |mapped| out.extend_from_slice(mapped))?;
        Ok(out)
    }
}

#[cfg(test)]
#[path = "buffer_tests.rs"]
mod tests;
