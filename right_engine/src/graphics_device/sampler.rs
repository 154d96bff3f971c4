/// Sampler trait and sampler descriptor

use std::any::Any;

/// Texel filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    Nearest,
    Linear,
}

/// Addressing outside the [0, 1] range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Repeat,
    ClampToEdge,
    ClampToBorder,
}

/// Descriptor for creating a sampler
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    pub min_filter: Filter,
    pub mag_filter: Filter,
    pub mip_filter: Filter,
    pub address_mode_u: AddressMode,
    pub address_mode_v: AddressMode,
    pub address_mode_w: AddressMode,
    pub is_mip_mapped: bool,
    pub min_lod: f32,
    pub max_lod: f32,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            min_filter: Filter::Linear,
            mag_filter: Filter::Linear,
            mip_filter: Filter::Linear,
            address_mode_u: AddressMode::Repeat,
            address_mode_v: AddressMode::Repeat,
            address_mode_w: AddressMode::Repeat,
            is_mip_mapped: false,
            min_lod: 0.0,
            max_lod: 1.0,
        }
    }
}

impl SamplerDesc {
    /// Same sampler with one address mode on all three axes
    pub fn with_address_mode(self, mode: AddressMode) -> Self {
        Self {
            address_mode_u: mode,
            address_mode_v: mode,
            address_mode_w: mode,
            ..self
        }
    }
}

/// Sampler resource trait
///
/// Immutable and shared by reference across textures.
pub trait Sampler: Send + Sync {
    /// Get the descriptor this sampler was created with
    fn desc(&self) -> &SamplerDesc;

    /// Backend downcast hook
    fn as_any(&self) -> &dyn Any;
}
