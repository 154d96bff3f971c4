/// Per-frame drawing layer on top of the graphics device

pub mod renderer;
pub mod renderer_state;

pub use renderer::*;
pub use renderer_state::*;
