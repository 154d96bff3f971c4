/// Texture trait, texture descriptor, and copy regions

use std::any::Any;
use std::sync::Arc;
use crate::error::Result;
use crate::graphics_device::{Buffer, Sampler};

/// Texture pixel format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum TextureFormat {
    R8_UNORM,
    R8G8B8A8_UNORM,
    R8G8B8A8_SRGB,
    B8G8R8A8_UNORM,
    B8G8R8A8_SRGB,
    R16G16_SFLOAT,
    R16G16B16A16_SFLOAT,
    R32G32B32A32_SFLOAT,
    D32_FLOAT,
    D24_UNORM_S8_UINT,
    D32_FLOAT_S8_UINT,
}

impl TextureFormat {
    /// Size in bytes of one texel
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::R8_UNORM => 1,
            TextureFormat::R8G8B8A8_UNORM
            | TextureFormat::R8G8B8A8_SRGB
            | TextureFormat::B8G8R8A8_UNORM
            | TextureFormat::B8G8R8A8_SRGB
            | TextureFormat::R16G16_SFLOAT
            | TextureFormat::D32_FLOAT
            | TextureFormat::D24_UNORM_S8_UINT => 4,
            TextureFormat::R16G16B16A16_SFLOAT | TextureFormat::D32_FLOAT_S8_UINT => 8,
            TextureFormat::R32G32B32A32_SFLOAT => 16,
        }
    }

    /// True for depth and depth/stencil formats
    pub fn is_depth(&self) -> bool {
        matches!(
            self,
            TextureFormat::D32_FLOAT | TextureFormat::D24_UNORM_S8_UINT | TextureFormat::D32_FLOAT_S8_UINT
        )
    }

    /// True for formats carrying a stencil aspect
    pub fn has_stencil(&self) -> bool {
        matches!(self, TextureFormat::D24_UNORM_S8_UINT | TextureFormat::D32_FLOAT_S8_UINT)
    }
}

/// Texture dimensionality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureType {
    /// Single 2D image
    Texture2D,
    /// Six 2D faces
    Cubemap,
}

impl TextureType {
    /// Number of array layers backing this type
    pub fn layer_count(&self) -> u32 {
        match self {
            TextureType::Texture2D => 1,
            TextureType::Cubemap => 6,
        }
    }
}

/// Descriptor for creating a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Number of channels of the source data
    pub component_amount: u32,
    /// Number of mip levels
    pub mip_levels: u32,
    /// 2D or cubemap
    pub texture_type: TextureType,
    /// Pixel format
    pub format: TextureFormat,
}

impl Default for TextureDesc {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            component_amount: 4,
            mip_levels: 1,
            texture_type: TextureType::Texture2D,
            format: TextureFormat::R8G8B8A8_UNORM,
        }
    }
}

impl TextureDesc {
    /// Single-mip 2D texture
    pub fn texture_2d(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            width,
            height,
            component_amount: if format.is_depth() { 1 } else { 4 },
            format,
            ..Default::default()
        }
    }

    /// Same texture with another size
    pub fn with_size(&self, width: u32, height: u32) -> Self {
        Self { width, height, ..*self }
    }

    /// Byte size of mip 0 across all layers
    pub fn size_bytes(&self) -> u64 {
        self.width as u64
            * self.height as u64
            * self.format.bytes_per_pixel() as u64
            * self.texture_type.layer_count() as u64
    }

    /// Dimensions of a mip level, clamped to 1
    pub fn mip_extent(&self, mip_level: u32) -> (u32, u32) {
        ((self.width >> mip_level).max(1), (self.height >> mip_level).max(1))
    }
}

/// Layout a texture is in around a copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureUsage {
    /// Freshly created, content undefined
    Undefined,
    /// Sampled by shaders
    ShaderReadOnly,
    /// Bound as color attachment
    ColorAttachment,
    /// Bound as depth/stencil attachment
    DepthStencilAttachment,
    /// Source of a transfer
    TransferSrc,
    /// Destination of a transfer
    TransferDst,
}

/// One mip/layer of a texture taking part in a copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureCopy {
    /// Array layer (cubemap face)
    pub layer: u32,
    /// Mip level
    pub mip_level: u32,
    /// Layout before and after the copy
    pub usage: TextureUsage,
}

impl Default for TextureCopy {
    fn default() -> Self {
        Self { layer: 0, mip_level: 0, usage: TextureUsage::ShaderReadOnly }
    }
}

/// Texture resource trait
///
/// Implemented by backend-specific texture types (e.g., VulkanTexture).
/// Format and size never change; a resized render target is a new texture.
pub trait Texture: Send + Sync {
    /// Get the descriptor this texture was created with
    fn desc(&self) -> &TextureDesc;

    /// Sampler used when this texture is bound
    fn sampler(&self) -> Option<Arc<dyn Sampler>>;

    /// Replace the sampler used when this texture is bound
    fn set_sampler(&self, sampler: Option<Arc<dyn Sampler>>);

    /// Copy one mip/layer of `src` into one mip/layer of this texture
    ///
    /// # Arguments
    ///
    /// * `src` - Texture to read from (same backend)
    /// * `src_copy` - Source mip/layer and its layout around the copy
    /// * `dst_copy` - Destination mip/layer and its layout around the copy
    ///
    /// # Errors
    ///
    /// Returns `Error::OutOfBounds` for a mip/layer the texture does not have.
    fn copy_from(&self, src: &dyn Texture, src_copy: &TextureCopy, dst_copy: &TextureCopy) -> Result<()>;

    /// Read mip 0 / layer 0 back into a CPU-readable buffer
    fn data(&self) -> Result<Arc<dyn Buffer>>;

    /// Backend downcast hook
    fn as_any(&self) -> &dyn Any;
}

/// Validate a copy region against a texture descriptor
pub fn check_copy_region(desc: &TextureDesc, copy: &TextureCopy) -> Result<()> {
    if copy.mip_level >= desc.mip_levels || copy.layer >= desc.texture_type.layer_count() {
        return Err(crate::error::Error::OutOfBounds(format!(
            "mip {} / layer {} not present in a {:?} with {} mips",
            copy.mip_level, copy.layer, desc.texture_type, desc.mip_levels
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "texture_tests.rs"]
mod tests;
