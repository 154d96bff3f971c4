/// Render hardware interface - backend-agnostic GPU abstractions

pub mod graphics_device;
pub mod buffer;
pub mod texture;
pub mod sampler;
pub mod shader;
pub mod pipeline;
pub mod command_buffer;
pub mod binding_set;

#[cfg(test)]
pub mod mock_graphics_device;

pub use graphics_device::*;
pub use buffer::*;
pub use texture::*;
pub use sampler::*;
pub use shader::*;
pub use pipeline::*;
pub use command_buffer::*;
pub use binding_set::*;
