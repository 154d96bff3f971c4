/// Color-ID picking helpers
///
/// Each pickable entity is drawn with a flat color encoding its id. The
/// picked pixel is read back from a BGRA8 target and decoded again. Id 0
/// is the cleared background, so entity ids start at 1.

use std::sync::Arc;
use glam::{Mat4, Vec4};

use crate::scene_renderer::{CameraData, MeshNode, UBColorId};

/// Largest id representable in 24 bits
pub const MAX_COLOR_ID: u32 = 0x00FF_FFFF;

/// Id returned when nothing was hit
pub const BACKGROUND_ID: u32 = 0;

/// Split an id into `[r, g, b]`, red holding the high byte
pub fn id_to_color(id: u32) -> [u8; 3] {
    [((id >> 16) & 0xFF) as u8, ((id >> 8) & 0xFF) as u8, (id & 0xFF) as u8]
}

/// Inverse of `id_to_color`
pub fn color_to_id(r: u8, g: u8, b: u8) -> u32 {
    b as u32 + g as u32 * 256 + r as u32 * 256 * 256
}

/// Decode one BGRA8 texel
pub fn bgra_to_id(texel: &[u8]) -> u32 {
    color_to_id(texel[2], texel[1], texel[0])
}

/// Normalized picking color of `id`
pub fn color_id_uniform(id: u32) -> UBColorId {
    let [r, g, b] = id_to_color(id);
    UBColorId { color: Vec4::new(r as f32, g as f32, b as f32, 255.0) / 255.0 }
}

/// Something drawable in the picking pass
#[derive(Clone)]
pub struct PickEntity {
    /// 1-based 24-bit id
    pub color_id: u32,
    pub mesh_node: Arc<MeshNode>,
    pub transform: Mat4,
}

/// Scene queried by `SceneRenderer::pick`
pub trait RenderScene: Send + Sync {
    /// Camera the viewport is rendered from
    fn primary_camera(&self) -> Option<CameraData>;

    /// Every entity with a mesh
    fn pickable_entities(&self) -> Vec<PickEntity>;
}

#[cfg(test)]
#[path = "picking_tests.rs"]
mod tests;
