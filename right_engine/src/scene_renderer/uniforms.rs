/// GPU-visible uniform layouts
///
/// Every struct here is `#[repr(C)]` and `Pod` so it can be uploaded with
/// `bytemuck::bytes_of`. Field order and padding follow std140.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

/// Maximum number of lights in `UBLightData`
pub const MAX_LIGHTS: usize = 30;

/// Size of the push-constant block used by the shadow pass
pub const SHADOW_CONSTANTS_SIZE: usize = 128;

/// Per-draw model matrix (slot 0)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct UBTransformData {
    pub transform: Mat4,
}

/// Camera uniform (slot 1)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct UBCameraData {
    pub view_projection: Mat4,
    pub position: Vec4,
}

impl UBCameraData {
    /// Build from a camera, flipping Y for Vulkan clip space
    pub fn new(position: Vec3, view: Mat4, projection: Mat4) -> Self {
        Self {
            view_projection: flip_y(projection) * view,
            position: position.extend(1.0),
        }
    }

    /// Rotation-only variant used to draw the skybox around the camera
    pub fn skybox(view: Mat4, projection: Mat4) -> Self {
        let rotation = Mat4::from_mat3(glam::Mat3::from_mat4(view));
        Self {
            view_projection: flip_y(projection) * rotation,
            position: Vec4::ZERO,
        }
    }
}

/// Negate `[1][1]` of a projection matrix
pub fn flip_y(projection: Mat4) -> Mat4 {
    let mut flipped = projection;
    flipped.y_axis.y = -flipped.y_axis.y;
    flipped
}

/// Orthographic volume of a directional light's shadow map
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowProjection {
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
    pub top: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for ShadowProjection {
    fn default() -> Self {
        Self { left: -10.0, right: 10.0, bottom: -10.0, top: 10.0, near: 1.0, far: 50.0 }
    }
}

/// One light as seen by the shaders (128 bytes)
///
/// `light_type` 0 is directional; only directional lights cast shadows.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightData {
    pub color: Vec4,
    pub position: Vec4,
    pub rotation: Vec4,
    pub intensity: f32,
    pub light_type: i32,
    pub radius_inner: f32,
    pub radius_outer: f32,
    pub light_space: Mat4,
}

impl LightData {
    pub const DIRECTIONAL: i32 = 0;
    pub const POINT: i32 = 1;
    pub const SPOT: i32 = 2;

    pub fn is_directional(&self) -> bool {
        self.light_type == Self::DIRECTIONAL
    }

    /// Light-space matrix of a directional light looking at the origin
    pub fn directional_light_space(position: Vec3, projection: ShadowProjection) -> Mat4 {
        let ortho = Mat4::orthographic_rh(
            projection.left,
            projection.right,
            projection.bottom,
            projection.top,
            projection.near,
            projection.far,
        );
        ortho * Mat4::look_at_rh(position, Vec3::ZERO, Vec3::Y)
    }
}

/// All lights of the frame (slot 11)
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct UBLightData {
    pub lights: [LightData; MAX_LIGHTS],
    pub lights_amount: i32,
    pub padding: [f32; 3],
}

impl Default for UBLightData {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Picking color of one entity (slot 13 of the picking shader)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct UBColorId {
    pub color: Vec4,
}

/// Scalar material parameters (slot 2)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialData {
    pub albedo: Vec4,
    pub metallic: f32,
    pub roughness: f32,
    pub ao: f32,
    pub padding: f32,
}

impl Default for MaterialData {
    fn default() -> Self {
        Self { albedo: Vec4::ONE, metallic: 0.0, roughness: 1.0, ao: 1.0, padding: 0.0 }
    }
}

/// Push constants of the shadow pass
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ShadowConstants {
    pub light_space: Mat4,
    pub padding: Mat4,
}

impl ShadowConstants {
    pub fn new(light_space: Mat4) -> Self {
        Self { light_space, padding: Mat4::IDENTITY }
    }
}

/// Postprocess settings (slot 12)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SceneRendererSettings {
    pub gamma: f32,
}

impl Default for SceneRendererSettings {
    fn default() -> Self {
        Self { gamma: 2.2 }
    }
}

#[cfg(test)]
#[path = "uniforms_tests.rs"]
mod tests;
