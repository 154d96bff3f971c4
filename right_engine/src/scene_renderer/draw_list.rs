/// Scene data handed to the SceneRenderer each frame

use std::sync::Arc;
use glam::{Mat4, Vec3};

use crate::graphics_device::Texture;
use crate::renderer::Mesh;
use crate::scene_renderer::MaterialData;

/// Hierarchy of meshes sharing one material
#[derive(Clone, Default)]
pub struct MeshNode {
    pub meshes: Vec<Mesh>,
    pub children: Vec<Arc<MeshNode>>,
}

impl MeshNode {
    pub fn new(meshes: Vec<Mesh>) -> Self {
        Self { meshes, children: Vec::new() }
    }

    pub fn with_child(mut self, child: Arc<MeshNode>) -> Self {
        self.children.push(child);
        self
    }

    /// Meshes of this node and all descendants, depth first
    pub fn flatten(&self) -> Vec<Mesh> {
        let mut meshes = Vec::new();
        self.collect(&mut meshes);
        meshes
    }

    fn collect(&self, out: &mut Vec<Mesh>) {
        out.extend(self.meshes.iter().cloned());
        for child in &self.children {
            child.collect(out);
        }
    }
}

/// Textures sampled by the PBR shader (slots 3 to 7)
#[derive(Clone, Default)]
pub struct MaterialTextures {
    pub albedo: Option<Arc<dyn Texture>>,
    pub normal: Option<Arc<dyn Texture>>,
    pub metallic: Option<Arc<dyn Texture>>,
    pub roughness: Option<Arc<dyn Texture>>,
    pub ao: Option<Arc<dyn Texture>>,
}

impl MaterialTextures {
    /// Textures in slot order, or `None` if any is missing
    pub fn complete(&self) -> Option<[Arc<dyn Texture>; 5]> {
        Some([
            self.albedo.clone()?,
            self.normal.clone()?,
            self.metallic.clone()?,
            self.roughness.clone()?,
            self.ao.clone()?,
        ])
    }
}

#[derive(Clone, Default)]
pub struct Material {
    pub name: String,
    pub data: MaterialData,
    pub textures: MaterialTextures,
}

/// One entry of the per-frame draw list
#[derive(Clone)]
pub struct DrawCommand {
    pub mesh: Mesh,
    pub material: Arc<Material>,
    pub transform: Mat4,
}

/// Image-based lighting inputs of the scene
#[derive(Clone)]
pub struct EnvironmentContext {
    pub name: String,
    /// Cubemap drawn by the skybox pass
    pub env_map: Arc<dyn Texture>,
    pub irradiance_map: Arc<dyn Texture>,
    pub prefilter_map: Arc<dyn Texture>,
    pub brdf_lut: Arc<dyn Texture>,
    /// Source image the cubemaps were baked from
    pub equirectangular: Option<Arc<dyn Texture>>,
}

/// Primary camera of the frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraData {
    pub position: Vec3,
    pub view: Mat4,
    pub projection: Mat4,
}

impl Default for CameraData {
    fn default() -> Self {
        Self { position: Vec3::ZERO, view: Mat4::IDENTITY, projection: Mat4::IDENTITY }
    }
}

impl CameraData {
    /// Camera at `position` looking at `target`
    pub fn look_at(position: Vec3, target: Vec3, projection: Mat4) -> Self {
        Self { position, view: Mat4::look_at_rh(position, target, Vec3::Y), projection }
    }
}
