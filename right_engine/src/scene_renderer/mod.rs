/// Multi-pass scene rendering and color-ID picking

pub mod uniforms;
pub mod draw_list;
pub mod picking;
pub mod primitives;
pub mod uniform_buffer_set;
pub mod passes;
pub mod scene_renderer;

pub use uniforms::*;
pub use draw_list::*;
pub use picking::*;
pub use primitives::*;
pub use uniform_buffer_set::*;
pub use passes::*;
pub use scene_renderer::*;
