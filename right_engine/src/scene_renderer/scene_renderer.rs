/// SceneRenderer - sequences the passes of a frame
///
/// Per frame the host calls `begin_scene`, submits meshes, then calls
/// `end_scene`, which runs shadow → PBR → skybox → postprocess → UI →
/// present. Each pass records into the same command buffer and waits for
/// the GPU before the next one starts, so shared uniform buffers are never
/// written while still in use.

use std::sync::Arc;
use std::time::Instant;
use glam::{Mat4, UVec2};

use crate::error::{Error, Result};
use crate::graphics_device::{
    Buffer, BufferDesc, CommandBuffer, GraphicsDevice, GraphicsPipeline, Sampler, SamplerDesc,
    Texture,
};
use crate::renderer::{Mesh, Renderer, RendererState};
use crate::scene_renderer::{
    bgra_to_id, color_id_uniform, create_present_pass, create_shadow_pass, create_ui_pass,
    CameraData, DrawCommand, EnvironmentContext, LightData, Material, MeshNode, OffscreenPasses,
    PassShaders, PassType, RenderScene, SceneRendererSettings, SceneShaders, ShadowConstants,
    UBCameraData, UBColorId, UBLightData, UBTransformData, UniformBufferSet, MaterialData,
    MAX_LIGHTS, QUAD_VERTICES, SKYBOX_VERTICES,
};
use crate::{engine_debug, engine_info, engine_warn};

const SOURCE: &str = "right::SceneRenderer";

/// Size of a buffer packing one aligned `T` per draw, for `max_draws` draws
fn per_draw_buffer_size<T>(device: &dyn GraphicsDevice, max_draws: usize) -> u64 {
    device.aligned_gpu_data_size(std::mem::size_of::<T>() as u64) * max_draws.max(1) as u64
}

fn check_draw_capacity(count: usize, max_draws: usize) -> Result<()> {
    if count > max_draws {
        return Err(Error::OutOfBounds(format!("{} draws exceed the capacity of {}", count, max_draws)));
    }
    Ok(())
}

/// Host hook recording the UI into the UI pass
pub type UiPassCallback = Box<dyn FnMut(&mut dyn CommandBuffer) -> Result<()> + Send>;

/// Wall-clock time spent in one pass
#[derive(Debug, Clone, PartialEq)]
pub struct PassInfo {
    pub name: String,
    pub milliseconds: f32,
}

#[derive(Debug, Clone)]
pub struct SceneRendererConfig {
    /// Size of the offscreen targets
    pub viewport: UVec2,
    /// Size of the swapchain
    pub window_size: UVec2,
    pub shadow_map_size: u32,
    /// Most draws per frame (and per pick), sizes the per-draw uniform buffers
    pub max_draws: usize,
    pub shaders: SceneShaders,
}

impl Default for SceneRendererConfig {
    fn default() -> Self {
        Self {
            viewport: UVec2::new(1280, 720),
            window_size: UVec2::new(1280, 720),
            shadow_map_size: 1024,
            max_draws: 512,
            shaders: SceneShaders::default(),
        }
    }
}

/// Everything created by `init`
struct SceneResources {
    renderer: Renderer,
    uniforms: UniformBufferSet,
    skybox_vertices: Arc<dyn Buffer>,
    quad_vertices: Arc<dyn Buffer>,
    default_sampler: Arc<dyn Sampler>,
    shaders: PassShaders,
    offscreen: OffscreenPasses,
    shadow: Arc<dyn GraphicsPipeline>,
    present: Arc<dyn GraphicsPipeline>,
    ui: Arc<dyn GraphicsPipeline>,
}

pub struct SceneRenderer {
    device: Arc<dyn GraphicsDevice>,
    config: SceneRendererConfig,
    resources: Option<SceneResources>,
    draw_list: Vec<DrawCommand>,
    camera: CameraData,
    lights: Box<UBLightData>,
    environment: Option<Arc<EnvironmentContext>>,
    ui_callback: Option<UiPassCallback>,
    scene: Option<Arc<dyn RenderScene>>,
    pass_info: Vec<PassInfo>,
}

impl SceneRenderer {
    pub fn new(device: Arc<dyn GraphicsDevice>, config: SceneRendererConfig) -> Self {
        let draw_list = Vec::with_capacity(config.max_draws);
        Self {
            device,
            config,
            resources: None,
            draw_list,
            camera: CameraData::default(),
            lights: Box::default(),
            environment: None,
            ui_callback: None,
            scene: None,
            pass_info: Vec::new(),
        }
    }

    /// Create buffers, shaders and passes
    ///
    /// # Errors
    ///
    /// `Error::AlreadyInitialized` on a second call, or any device error.
    pub fn init(&mut self) -> Result<()> {
        if self.resources.is_some() {
            return Err(Error::AlreadyInitialized("SceneRenderer".to_string()));
        }
        let device = self.device.as_ref();

        let mut uniforms = UniformBufferSet::new();
        let max_draws = self.config.max_draws;
        uniforms.create(device, per_draw_buffer_size::<UBTransformData>(device, max_draws), 0)?;
        uniforms.create(device, std::mem::size_of::<UBCameraData>() as u64, 1)?;
        uniforms.create(device, per_draw_buffer_size::<MaterialData>(device, max_draws), 2)?;
        uniforms.create(device, std::mem::size_of::<UBLightData>() as u64, 11)?;
        uniforms.create(device, std::mem::size_of::<SceneRendererSettings>() as u64, 12)?;
        uniforms.create(device, per_draw_buffer_size::<UBColorId>(device, max_draws), 13)?;

        let skybox_bytes: &[u8] = bytemuck::cast_slice(&SKYBOX_VERTICES);
        let skybox_vertices = device.create_buffer(&BufferDesc::vertex(skybox_bytes.len() as u64), Some(skybox_bytes))?;
        let quad_bytes: &[u8] = bytemuck::cast_slice(&QUAD_VERTICES);
        let quad_vertices = device.create_buffer(&BufferDesc::vertex(quad_bytes.len() as u64), Some(quad_bytes))?;

        let default_sampler = device.create_sampler(&SamplerDesc::default())?;
        let shaders = PassShaders::create(device, &self.config.shaders)?;
        let offscreen = OffscreenPasses::create(device, &shaders, self.config.viewport, &default_sampler)?;
        let shadow = create_shadow_pass(device, &shaders.shadow, self.config.shadow_map_size)?;
        let present = create_present_pass(device, self.config.window_size, &default_sampler)?;
        let ui = create_ui_pass(device, &present)?;

        self.resources = Some(SceneResources {
            renderer: Renderer::new(self.device.clone())?,
            uniforms,
            skybox_vertices,
            quad_vertices,
            default_sampler,
            shaders,
            offscreen,
            shadow,
            present,
            ui,
        });

        engine_info!(
            SOURCE,
            "Initialized (viewport {}x{}, window {}x{})",
            self.config.viewport.x,
            self.config.viewport.y,
            self.config.window_size.x,
            self.config.window_size.y
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.resources.is_some()
    }

    fn resources(&self) -> Result<&SceneResources> {
        self.resources
            .as_ref()
            .ok_or_else(|| Error::InvalidResource("SceneRenderer is not initialized".to_string()))
    }

    // ===== FRAME =====

    /// Stage camera, lights and settings for the frame
    ///
    /// # Errors
    ///
    /// `Error::LightCapExceeded` for more than `MAX_LIGHTS` lights.
    pub fn begin_scene(
        &mut self,
        camera: &CameraData,
        environment: Arc<EnvironmentContext>,
        lights: &[LightData],
        settings: &SceneRendererSettings,
    ) -> Result<()> {
        if lights.len() > MAX_LIGHTS {
            return Err(Error::LightCapExceeded { count: lights.len(), max: MAX_LIGHTS });
        }
        let resources = self.resources()?;

        let mut light_data = UBLightData::default();
        light_data.lights[..lights.len()].copy_from_slice(lights);
        light_data.lights_amount = lights.len() as i32;

        let camera_data = UBCameraData::new(camera.position, camera.view, camera.projection);
        resources.uniforms.get(1)?.set_data(bytemuck::bytes_of(&camera_data), 0)?;
        resources.uniforms.get(11)?.set_data(bytemuck::bytes_of(&light_data), 0)?;
        resources.uniforms.get(12)?.set_data(bytemuck::bytes_of(settings), 0)?;

        self.camera = *camera;
        *self.lights = light_data;
        self.environment = Some(environment);
        Ok(())
    }

    /// Submit every mesh of `node` and its descendants
    pub fn submit_mesh_node(&mut self, node: &MeshNode, material: &Arc<Material>, transform: Mat4) {
        for mesh in &node.meshes {
            self.submit_mesh(mesh, material, transform);
        }
        for child in &node.children {
            self.submit_mesh_node(child, material, transform);
        }
    }

    pub fn submit_mesh(&mut self, mesh: &Mesh, material: &Arc<Material>, transform: Mat4) {
        self.draw_list.push(DrawCommand { mesh: mesh.clone(), material: material.clone(), transform });
    }

    pub fn draw_list(&self) -> &[DrawCommand] {
        &self.draw_list
    }

    /// Run every pass of the frame and clear the draw list
    pub fn end_scene(&mut self) -> Result<()> {
        let result = self.run_passes();
        self.clear();
        result
    }

    fn run_passes(&mut self) -> Result<()> {
        let environment = self
            .environment
            .clone()
            .ok_or_else(|| Error::InvalidResource("end_scene called before begin_scene".to_string()))?;
        if self.ui_callback.is_none() {
            return Err(Error::MissingCallback("UI pass callback is not set".to_string()));
        }
        // Per-draw uniform buffers hold `max_draws` entries
        check_draw_capacity(self.draw_list.len(), self.config.max_draws)?;
        let resources = self
            .resources
            .as_mut()
            .ok_or_else(|| Error::InvalidResource("SceneRenderer is not initialized".to_string()))?;

        let mut pass_info = Vec::with_capacity(6);
        let mut timed = |name: &str, pass: &mut dyn FnMut() -> Result<()>| -> Result<()> {
            let start = Instant::now();
            pass()?;
            pass_info.push(PassInfo { name: name.to_string(), milliseconds: start.elapsed().as_secs_f32() * 1000.0 });
            Ok(())
        };

        let draw_list = &self.draw_list;
        let lights = &self.lights;
        let camera = &self.camera;
        let ui_callback = &mut self.ui_callback;

        timed("Shadow", &mut || shadow_pass(resources, draw_list, lights))?;
        timed("PBR", &mut || pbr_pass(resources, draw_list, &environment))?;
        timed("Skybox", &mut || skybox_pass(resources, camera, &environment))?;
        timed("Postprocess", &mut || postprocess_pass(resources))?;
        timed("UI", &mut || ui_pass(resources, ui_callback))?;
        timed("Present", &mut || present_pass(resources))?;

        self.pass_info = pass_info;
        Ok(())
    }

    fn clear(&mut self) {
        self.draw_list.clear();
    }

    // ===== RESIZE =====

    /// Change the viewport size and recreate the viewport-sized passes
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.config.viewport = UVec2::new(width, height);
        let device = self.device.clone();
        if let Some(resources) = self.resources.as_mut() {
            device.wait_idle()?;
            resources.offscreen = OffscreenPasses::create(
                device.as_ref(),
                &resources.shaders,
                self.config.viewport,
                &resources.default_sampler,
            )?;
            engine_debug!(SOURCE, "Viewport resized to {}x{}", width, height);
        }
        Ok(())
    }

    /// Resize the swapchain and the present pass to a new window size
    pub fn resize_window(&mut self, width: u32, height: u32) -> Result<()> {
        self.config.window_size = UVec2::new(width, height);
        let device = self.device.clone();
        device.resize_swapchain(width, height)?;
        if let Some(resources) = self.resources.as_mut() {
            resources.present.resize(width, height)?;
            resources.ui = create_ui_pass(device.as_ref(), &resources.present)?;
        }
        Ok(())
    }

    // ===== ACCESSORS =====

    pub fn get_pass(&self, pass: PassType) -> Result<Arc<dyn GraphicsPipeline>> {
        let resources = self.resources()?;
        Ok(match pass {
            PassType::Shadow => resources.shadow.clone(),
            PassType::PBR => resources.offscreen.pbr.clone(),
            PassType::Skybox => resources.offscreen.skybox.clone(),
            PassType::Postprocess => resources.offscreen.postprocess.clone(),
            PassType::UI => resources.ui.clone(),
            PassType::Present => resources.present.clone(),
            PassType::Picking => resources.offscreen.picking.clone(),
        })
    }

    /// Color target of the postprocess pass
    pub fn get_final_image(&self) -> Result<Arc<dyn Texture>> {
        self.resources()?
            .offscreen
            .postprocess
            .color_attachment(0)
            .ok_or_else(|| Error::InvalidResource("postprocess pass has no color attachment".to_string()))
    }

    /// Timings of the last `end_scene`
    pub fn get_pass_info(&self) -> &[PassInfo] {
        &self.pass_info
    }

    pub fn viewport(&self) -> UVec2 {
        self.config.viewport
    }

    pub fn set_ui_pass_callback(&mut self, callback: UiPassCallback) {
        self.ui_callback = Some(callback);
    }

    pub fn set_scene(&mut self, scene: Arc<dyn RenderScene>) {
        self.scene = Some(scene);
    }

    pub fn scene(&self) -> Option<&Arc<dyn RenderScene>> {
        self.scene.as_ref()
    }

    // ===== PICKING =====

    /// Pick against the scene stored by `set_scene`
    pub fn pick_current(&mut self, position: UVec2) -> Result<u32> {
        let scene = self
            .scene
            .clone()
            .ok_or_else(|| Error::InvalidResource("no scene set for picking".to_string()))?;
        self.pick(scene.as_ref(), position)
    }

    /// Id of the entity covering `position`, 0 for background
    ///
    /// # Errors
    ///
    /// - `Error::OutOfBounds` if `position` lies outside the viewport
    /// - `Error::InvalidResource` if the scene has no primary camera
    pub fn pick(&mut self, scene: &dyn RenderScene, position: UVec2) -> Result<u32> {
        let resources = self
            .resources
            .as_mut()
            .ok_or_else(|| Error::InvalidResource("SceneRenderer is not initialized".to_string()))?;
        let target = resources
            .offscreen
            .picking
            .color_attachment(0)
            .ok_or_else(|| Error::InvalidResource("picking pass has no color attachment".to_string()))?;
        let (width, height) = (target.desc().width, target.desc().height);
        if position.x >= width || position.y >= height {
            return Err(Error::OutOfBounds(format!(
                "pick position ({}, {}) outside {}x{} viewport",
                position.x, position.y, width, height
            )));
        }

        let camera = scene
            .primary_camera()
            .ok_or_else(|| Error::InvalidResource("scene has no primary camera".to_string()))?;
        let camera_data = UBCameraData::new(camera.position, camera.view, camera.projection);
        resources.uniforms.get(1)?.set_data(bytemuck::bytes_of(&camera_data), 0)?;

        let mut draws: Vec<(Mesh, Mat4, UBColorId)> = Vec::new();
        for entity in scene.pickable_entities() {
            let color = color_id_uniform(entity.color_id);
            draws.extend(entity.mesh_node.flatten().into_iter().map(|mesh| (mesh, entity.transform, color)));
        }

        check_draw_capacity(draws.len(), self.config.max_draws)?;
        picking_pass(resources, &draws)?;

        let pixels = target.data()?.read_data()?;
        let index = (width as usize * position.y as usize + position.x as usize) * 4;
        let texel = pixels
            .get(index..index + 4)
            .ok_or_else(|| Error::OutOfBounds(format!("readback too small for pixel {}", index / 4)))?;
        Ok(bgra_to_id(texel))
    }
}

// ===== PASSES =====

fn transform_stride(device: &dyn GraphicsDevice) -> u64 {
    device.aligned_gpu_data_size(std::mem::size_of::<UBTransformData>() as u64)
}

fn shadow_pass(resources: &mut SceneResources, draw_list: &[DrawCommand], lights: &UBLightData) -> Result<()> {
    let renderer = &mut resources.renderer;
    renderer.set_pipeline(resources.shadow.clone());
    renderer.begin_frame()?;

    let device = renderer.device().clone();
    let transforms = resources.uniforms.get(0)?;
    let stride = transform_stride(device.as_ref());
    let directional = lights.lights[..lights.lights_amount as usize].iter().filter(|l| l.is_directional());

    for light in directional {
        let constants = ShadowConstants::new(light.light_space);
        let constant_buffer = device.create_buffer(
            &BufferDesc::constant(std::mem::size_of::<ShadowConstants>() as u64),
            Some(bytemuck::bytes_of(&constants)),
        )?;

        let mut offset = 0;
        for draw in draw_list {
            transforms.set_data(bytemuck::bytes_of(&UBTransformData { transform: draw.transform }), offset)?;

            let mut state = RendererState::new();
            state.set_vertex_buffer(transforms.clone(), 0, offset, std::mem::size_of::<UBTransformData>() as u64);
            state.set_constant_buffer(constant_buffer.clone());
            renderer.encode_state(&mut state)?;
            renderer.draw_mesh(&draw.mesh)?;

            offset += stride;
        }
    }

    renderer.end_frame()
}

fn pbr_pass(resources: &mut SceneResources, draw_list: &[DrawCommand], environment: &EnvironmentContext) -> Result<()> {
    let renderer = &mut resources.renderer;
    renderer.set_pipeline(resources.offscreen.pbr.clone());
    renderer.begin_frame()?;

    let device = renderer.device().clone();
    let transforms = resources.uniforms.get(0)?;
    let camera = resources.uniforms.get(1)?;
    let materials = resources.uniforms.get(2)?;
    let lights = resources.uniforms.get(11)?;
    let shadow_map = resources
        .shadow
        .depth_attachment()
        .ok_or_else(|| Error::InvalidResource("shadow pass has no depth attachment".to_string()))?;
    let transform_stride = transform_stride(device.as_ref());
    let material_stride = device.aligned_gpu_data_size(std::mem::size_of::<MaterialData>() as u64);

    let mut transform_offset = 0;
    let mut material_offset = 0;
    for draw in draw_list {
        let Some(textures) = draw.material.textures.complete() else {
            engine_warn!(SOURCE, "Material '{}' is missing textures, skipping draw", draw.material.name);
            continue;
        };
        transforms.set_data(bytemuck::bytes_of(&UBTransformData { transform: draw.transform }), transform_offset)?;
        materials.set_data(bytemuck::bytes_of(&draw.material.data), material_offset)?;

        let mut state = RendererState::new();
        state.set_vertex_buffer(transforms.clone(), 0, transform_offset, std::mem::size_of::<UBTransformData>() as u64);
        state.set_vertex_buffer(camera.clone(), 1, 0, 0);
        state.set_fragment_buffer(materials.clone(), 2, material_offset, std::mem::size_of::<MaterialData>() as u64);
        state.set_fragment_buffer(lights.clone(), 11, 0, 0);
        for (slot, texture) in (3..).zip(textures) {
            state.set_texture(texture, slot);
        }
        state.set_texture(environment.irradiance_map.clone(), 8);
        state.set_texture(environment.prefilter_map.clone(), 9);
        state.set_texture(environment.brdf_lut.clone(), 10);
        state.set_texture(shadow_map.clone(), 13);

        renderer.encode_state(&mut state)?;
        renderer.draw_mesh(&draw.mesh)?;

        transform_offset += transform_stride;
        material_offset += material_stride;
    }

    renderer.end_frame()
}

fn skybox_pass(resources: &mut SceneResources, camera: &CameraData, environment: &EnvironmentContext) -> Result<()> {
    let renderer = &mut resources.renderer;
    renderer.set_pipeline(resources.offscreen.skybox.clone());
    renderer.begin_frame()?;

    let camera_buffer = resources.uniforms.get(1)?;
    camera_buffer.set_data(bytemuck::bytes_of(&UBCameraData::skybox(camera.view, camera.projection)), 0)?;

    let mut state = RendererState::new();
    state.set_vertex_buffer(camera_buffer, 1, 0, 0);
    state.set_texture(environment.env_map.clone(), 3);
    renderer.encode_state(&mut state)?;
    renderer.draw(&resources.skybox_vertices, None)?;

    renderer.end_frame()
}

fn postprocess_pass(resources: &mut SceneResources) -> Result<()> {
    let renderer = &mut resources.renderer;
    renderer.set_pipeline(resources.offscreen.postprocess.clone());
    renderer.begin_frame()?;

    let scene_color = resources
        .offscreen
        .pbr
        .color_attachment(0)
        .ok_or_else(|| Error::InvalidResource("PBR pass has no color attachment".to_string()))?;
    let mut state = RendererState::new();
    state.set_texture(scene_color, 3);
    state.set_fragment_buffer(resources.uniforms.get(12)?, 12, 0, 0);
    renderer.encode_state(&mut state)?;
    renderer.draw(&resources.quad_vertices, None)?;

    renderer.end_frame()
}

fn ui_pass(resources: &mut SceneResources, callback: &mut Option<UiPassCallback>) -> Result<()> {
    let callback = callback
        .as_mut()
        .ok_or_else(|| Error::MissingCallback("UI pass callback is not set".to_string()))?;
    let renderer = &mut resources.renderer;
    renderer.set_pipeline(resources.ui.clone());
    renderer.begin_frame()?;
    callback(renderer.command_buffer())?;
    renderer.end_frame()
}

fn present_pass(resources: &mut SceneResources) -> Result<()> {
    let renderer = &mut resources.renderer;
    renderer.set_pipeline(resources.present.clone());
    renderer.begin_frame()?;
    renderer.end_frame()
}

fn picking_pass(resources: &mut SceneResources, draws: &[(Mesh, Mat4, UBColorId)]) -> Result<()> {
    let renderer = &mut resources.renderer;
    renderer.set_pipeline(resources.offscreen.picking.clone());
    renderer.begin_frame()?;

    let device = renderer.device().clone();
    let transforms = resources.uniforms.get(0)?;
    let camera = resources.uniforms.get(1)?;
    let colors = resources.uniforms.get(13)?;
    let transform_stride = transform_stride(device.as_ref());
    let color_stride = device.aligned_gpu_data_size(std::mem::size_of::<UBColorId>() as u64);

    let mut transform_offset = 0;
    let mut color_offset = 0;
    for (mesh, transform, color) in draws {
        transforms.set_data(bytemuck::bytes_of(&UBTransformData { transform: *transform }), transform_offset)?;
        colors.set_data(bytemuck::bytes_of(color), color_offset)?;

        let mut state = RendererState::new();
        state.set_vertex_buffer(transforms.clone(), 0, transform_offset, std::mem::size_of::<UBTransformData>() as u64);
        state.set_vertex_buffer(camera.clone(), 1, 0, 0);
        state.set_fragment_buffer(colors.clone(), 13, color_offset, std::mem::size_of::<UBColorId>() as u64);
        renderer.encode_state(&mut state)?;
        renderer.draw_mesh(mesh)?;

        transform_offset += transform_stride;
        color_offset += color_stride;
    }

    renderer.end_frame()
}

#[cfg(test)]
#[path = "scene_renderer_tests.rs"]
mod tests;
