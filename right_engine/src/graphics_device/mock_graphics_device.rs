/// Mock GraphicsDevice for unit tests (no GPU required)
///
/// Resources live in host memory. The device records what the core asks of
/// it (executed frames, binding writes, presents) so tests can check pass
/// ordering, dirty-write minimality and texture identity. A test can also
/// install a frame hook standing in for the rasterizer, which is how the
/// picking readback is exercised without a GPU.

use std::any::Any;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::graphics_device::{
    check_copy_region, merge_stage_reflections, BindingSet, BindingWrite, Buffer, BufferDesc,
    BufferType, Command, CommandBuffer, DeviceLimits, GraphicsDevice, GraphicsPipeline,
    GraphicsPipelineDesc, MemoryType, Rect2D, RenderPassDesc, Sampler, SamplerDesc, Shader,
    ShaderProgramDesc, ShaderReflection, Texture, TextureCopy, TextureDesc, Viewport,
};
use crate::engine_warn;

/// Callback run at `end_frame`, before the commands are executed
pub type FrameHook = Box<dyn FnMut(&Arc<dyn GraphicsPipeline>, &[Command]) + Send>;

/// One executed frame
#[derive(Debug, Clone)]
pub struct FrameRecord {
    /// Render pass name of the pipeline
    pub pipeline: String,
    /// Command names in execution order
    pub commands: Vec<String>,
}

/// State shared by the mock device and every resource it created
pub struct MockDeviceState {
    pub limits: DeviceLimits,
    pub textures_created: AtomicUsize,
    pub buffers_created: AtomicUsize,
    pub binding_sets_created: AtomicUsize,
    pub binding_writes: AtomicUsize,
    pub presents: AtomicUsize,
    pub swapchain_resizes: AtomicUsize,
    pub frames: Mutex<Vec<FrameRecord>>,
    pub frame_hook: Mutex<Option<FrameHook>>,
}

impl MockDeviceState {
    /// Names of every executed frame, in order
    pub fn frame_names(&self) -> Vec<String> {
        self.frames.lock().unwrap().iter().map(|f| f.pipeline.clone()).collect()
    }
}

// ============================================================================
// Mock Buffer
// ============================================================================

pub struct MockBuffer {
    pub desc: BufferDesc,
    pub data: Mutex<Vec<u8>>,
}

impl MockBuffer {
    pub fn new(desc: BufferDesc, initial: Option<&[u8]>) -> Self {
        let mut data = vec![0u8; desc.size as usize];
        if let Some(initial) = initial {
            let len = initial.len().min(data.len());
            data[..len].copy_from_slice(&initial[..len]);
        }
        Self { desc, data: Mutex::new(data) }
    }

    /// Bytes regardless of memory type
    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().unwrap().clone()
    }
}

impl Buffer for MockBuffer {
    fn desc(&self) -> &BufferDesc {
        &self.desc
    }

    fn with_mapped(&self, f: &mut dyn FnMut(&mut [u8])) -> Result<()> {
        if !self.desc.memory_type.is_host_visible() {
            return Err(Error::InvalidResource("GPU-only buffer cannot be mapped".to_string()));
        }
        let mut data = self.data.lock().unwrap();
        f(&mut data);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Mock Texture
// ============================================================================

pub struct MockTexture {
    pub desc: TextureDesc,
    pub sampler: Mutex<Option<Arc<dyn Sampler>>>,
    /// Mip 0 of every layer
    pub pixels: Mutex<Vec<u8>>,
}

impl MockTexture {
    pub fn new(desc: TextureDesc, data: &[u8]) -> Self {
        let mut pixels = vec![0u8; desc.size_bytes() as usize];
        if !desc.format.is_depth() && !data.is_empty() {
            let len = data.len().min(pixels.len());
            pixels[..len].copy_from_slice(&data[..len]);
        }
        Self {
            desc,
            sampler: Mutex::new(None),
            pixels: Mutex::new(pixels),
        }
    }

    /// Overwrite a rectangle of layer 0 with one texel value
    pub fn fill_rect(&self, x: u32, y: u32, width: u32, height: u32, texel: &[u8]) {
        let bpp = self.desc.format.bytes_per_pixel() as usize;
        let mut pixels = self.pixels.lock().unwrap();
        for py in y..(y + height).min(self.desc.height) {
            for px in x..(x + width).min(self.desc.width) {
                let start = (py as usize * self.desc.width as usize + px as usize) * bpp;
                pixels[start..start + bpp].copy_from_slice(&texel[..bpp]);
            }
        }
    }
}

impl Texture for MockTexture {
    fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    fn sampler(&self) -> Option<Arc<dyn Sampler>> {
        self.sampler.lock().unwrap().clone()
    }

    fn set_sampler(&self, sampler: Option<Arc<dyn Sampler>>) {
        *self.sampler.lock().unwrap() = sampler;
    }

    fn copy_from(&self, src: &dyn Texture, src_copy: &TextureCopy, dst_copy: &TextureCopy) -> Result<()> {
        check_copy_region(src.desc(), src_copy)?;
        check_copy_region(&self.desc, dst_copy)?;
        let src = src
            .as_any()
            .downcast_ref::<MockTexture>()
            .ok_or_else(|| Error::InvalidResource("copy source is not a mock texture".to_string()))?;
        if src_copy.mip_level == 0 && dst_copy.mip_level == 0 && src.desc.width == self.desc.width
            && src.desc.height == self.desc.height
        {
            let layer_bytes = (self.desc.width * self.desc.height * self.desc.format.bytes_per_pixel()) as usize;
            let src_pixels = src.pixels.lock().unwrap().clone();
            let mut dst_pixels = self.pixels.lock().unwrap();
            let src_start = src_copy.layer as usize * layer_bytes;
            let dst_start = dst_copy.layer as usize * layer_bytes;
            dst_pixels[dst_start..dst_start + layer_bytes]
                .copy_from_slice(&src_pixels[src_start..src_start + layer_bytes]);
        }
        Ok(())
    }

    fn data(&self) -> Result<Arc<dyn Buffer>> {
        let pixels = self.pixels.lock().unwrap();
        let desc = BufferDesc {
            size: pixels.len() as u64,
            buffer_type: BufferType::TransferDst,
            memory_type: MemoryType::CpuOnly,
        };
        Ok(Arc::new(MockBuffer::new(desc, Some(&pixels))))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Mock Sampler / Shader
// ============================================================================

pub struct MockSampler {
    pub desc: SamplerDesc,
}

impl Sampler for MockSampler {
    fn desc(&self) -> &SamplerDesc {
        &self.desc
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct MockShader {
    pub name: String,
    pub reflection: ShaderReflection,
}

impl Shader for MockShader {
    fn name(&self) -> &str {
        &self.name
    }

    fn reflection(&self) -> &ShaderReflection {
        &self.reflection
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Mock Pipeline
// ============================================================================

pub struct MockPipeline {
    pub desc: GraphicsPipelineDesc,
    pub render_pass: RwLock<RenderPassDesc>,
    /// Bumped every time the framebuffer is rebuilt
    pub framebuffer_generation: AtomicU32,
    state: Arc<MockDeviceState>,
}

impl GraphicsPipeline for MockPipeline {
    fn desc(&self) -> &GraphicsPipelineDesc {
        &self.desc
    }

    fn render_pass_desc(&self) -> RenderPassDesc {
        self.render_pass.read().unwrap().clone()
    }

    fn resize(&self, width: u32, height: u32) -> Result<()> {
        let current = self.render_pass_desc();
        if current.extent.x == width && current.extent.y == height {
            engine_warn!("right::mock", "Trying to resize render pass {} to same size!", current.name);
            return Ok(());
        }
        let state = self.state.clone();
        let resized = current.resized(width, height, &mut |desc| create_texture(&state, desc, &[]))?;
        *self.render_pass.write().unwrap() = resized;
        self.framebuffer_generation.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Mock BindingSet
// ============================================================================

pub struct MockBindingSet {
    /// Slots declared by the pipeline layout
    pub layout_slots: Vec<u32>,
    /// Current content of every written slot
    pub slots: Mutex<FxHashMap<u32, BindingWrite>>,
    /// Every slot ever written, in order
    pub write_log: Mutex<Vec<u32>>,
    state: Arc<MockDeviceState>,
}

impl MockBindingSet {
    /// Buffer range bound at `slot`
    pub fn buffer_at(&self, slot: u32) -> Option<(Arc<dyn Buffer>, u64, u64)> {
        match self.slots.lock().unwrap().get(&slot) {
            Some(BindingWrite::Buffer { buffer, offset, range, .. }) => Some((buffer.clone(), *offset, *range)),
            _ => None,
        }
    }

    /// Texture bound at `slot`
    pub fn texture_at(&self, slot: u32) -> Option<Arc<dyn Texture>> {
        match self.slots.lock().unwrap().get(&slot) {
            Some(BindingWrite::Texture { texture, .. }) => Some(texture.clone()),
            _ => None,
        }
    }
}

impl BindingSet for MockBindingSet {
    fn write(&self, writes: &[BindingWrite]) -> Result<()> {
        let mut slots = self.slots.lock().unwrap();
        let mut log = self.write_log.lock().unwrap();
        for write in writes {
            if !self.layout_slots.contains(&write.slot()) {
                return Err(Error::InvalidResource(format!("slot {} is not in the layout", write.slot())));
            }
            slots.insert(write.slot(), write.clone());
            log.push(write.slot());
            self.state.binding_writes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Mock CommandBuffer
// ============================================================================

pub struct MockCommandBuffer {
    pub commands: Vec<Command>,
    pub recording: bool,
}

impl CommandBuffer for MockCommandBuffer {
    fn begin(&mut self) -> Result<()> {
        // An abandoned frame leaves its commands behind
        self.commands.clear();
        self.recording = true;
        Ok(())
    }

    fn enqueue(&mut self, command: Command) {
        self.commands.push(command);
    }

    fn pending(&self) -> &[Command] {
        &self.commands
    }

    fn execute(&mut self) -> Result<()> {
        if !self.recording {
            return Err(Error::BackendError("Command buffer not recording".to_string()));
        }
        self.commands.clear();
        self.recording = false;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ============================================================================
// Mock GraphicsDevice
// ============================================================================

pub struct MockGraphicsDevice {
    pub state: Arc<MockDeviceState>,
}

impl MockGraphicsDevice {
    pub fn new() -> Self {
        Self::with_limits(DeviceLimits::default())
    }

    pub fn with_limits(limits: DeviceLimits) -> Self {
        Self {
            state: Arc::new(MockDeviceState {
                limits,
                textures_created: AtomicUsize::new(0),
                buffers_created: AtomicUsize::new(0),
                binding_sets_created: AtomicUsize::new(0),
                binding_writes: AtomicUsize::new(0),
                presents: AtomicUsize::new(0),
                swapchain_resizes: AtomicUsize::new(0),
                frames: Mutex::new(Vec::new()),
                frame_hook: Mutex::new(None),
            }),
        }
    }

    /// Install the callback run before each frame is executed
    pub fn set_frame_hook(&self, hook: FrameHook) {
        *self.state.frame_hook.lock().unwrap() = Some(hook);
    }
}

fn create_texture(state: &Arc<MockDeviceState>, desc: &TextureDesc, data: &[u8]) -> Result<Arc<dyn Texture>> {
    if desc.width == 0 || desc.height == 0 || desc.mip_levels == 0 {
        return Err(Error::InvalidResource(format!("invalid texture size {}x{}", desc.width, desc.height)));
    }
    state.textures_created.fetch_add(1, Ordering::Relaxed);
    Ok(Arc::new(MockTexture::new(*desc, data)))
}

impl GraphicsDevice for MockGraphicsDevice {
    fn create_buffer(&self, desc: &BufferDesc, data: Option<&[u8]>) -> Result<Arc<dyn Buffer>> {
        if desc.size == 0 {
            return Err(Error::InvalidResource("buffer size is 0".to_string()));
        }
        self.state.buffers_created.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(MockBuffer::new(desc.clone(), data)))
    }

    fn create_texture(&self, desc: &TextureDesc, data: &[u8]) -> Result<Arc<dyn Texture>> {
        create_texture(&self.state, desc, data)
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<Arc<dyn Sampler>> {
        Ok(Arc::new(MockSampler { desc: *desc }))
    }

    fn create_shader(&self, desc: &ShaderProgramDesc) -> Result<Arc<dyn Shader>> {
        let stages: Vec<_> = desc.stages.iter().map(|s| (s.stage, s.reflection.clone())).collect();
        Ok(Arc::new(MockShader {
            name: desc.name.clone(),
            reflection: merge_stage_reflections(&stages)?,
        }))
    }

    fn create_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDesc,
        render_pass: &RenderPassDesc,
    ) -> Result<Arc<dyn GraphicsPipeline>> {
        render_pass.validate()?;
        Ok(Arc::new(MockPipeline {
            desc: desc.clone(),
            render_pass: RwLock::new(render_pass.clone()),
            framebuffer_generation: AtomicU32::new(0),
            state: self.state.clone(),
        }))
    }

    fn create_command_buffer(&self) -> Result<Box<dyn CommandBuffer>> {
        Ok(Box::new(MockCommandBuffer { commands: Vec::new(), recording: false }))
    }

    fn create_binding_set(&self, pipeline: &Arc<dyn GraphicsPipeline>) -> Result<Arc<dyn BindingSet>> {
        let reflection = pipeline
            .desc()
            .shader
            .as_ref()
            .map(|s| s.reflection().clone())
            .filter(|r| r.has_bindings())
            .ok_or_else(|| Error::InvalidResource(format!("pipeline '{}' has no bindings", pipeline.name())))?;
        let mut layout_slots: Vec<u32> = reflection.bound_buffers().iter().map(|(r, _)| r.slot).collect();
        layout_slots.extend(reflection.textures.iter().map(|t| t.slot));
        self.state.binding_sets_created.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(MockBindingSet {
            layout_slots,
            slots: Mutex::new(FxHashMap::default()),
            write_log: Mutex::new(Vec::new()),
            state: self.state.clone(),
        }))
    }

    fn begin_frame(&self, cmd: &mut dyn CommandBuffer, pipeline: &Arc<dyn GraphicsPipeline>) -> Result<()> {
        cmd.begin()?;
        let extent = pipeline.extent();
        cmd.enqueue(Command::BeginRenderPass { pipeline: pipeline.clone() });
        if pipeline.desc().shader.is_some() {
            cmd.enqueue(Command::BindPipeline { pipeline: pipeline.clone() });
        }
        cmd.enqueue(Command::SetViewport(Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.x as f32,
            height: extent.y as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }));
        cmd.enqueue(Command::SetScissor(Rect2D { x: 0, y: 0, width: extent.x, height: extent.y }));
        Ok(())
    }

    fn end_frame(&self, cmd: &mut dyn CommandBuffer, pipeline: &Arc<dyn GraphicsPipeline>) -> Result<()> {
        cmd.enqueue(Command::EndRenderPass);
        if let Some(hook) = self.state.frame_hook.lock().unwrap().as_mut() {
            hook(pipeline, cmd.pending());
        }
        let record = FrameRecord {
            pipeline: pipeline.name(),
            commands: cmd.pending().iter().map(|c| c.name().to_string()).collect(),
        };
        cmd.execute()?;
        self.state.frames.lock().unwrap().push(record);
        if !pipeline.is_offscreen() {
            self.state.presents.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    fn limits(&self) -> DeviceLimits {
        self.state.limits
    }

    fn wait_idle(&self) -> Result<()> {
        Ok(())
    }

    fn resize_swapchain(&self, _width: u32, _height: u32) -> Result<()> {
        self.state.swapchain_resizes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
#[path = "mock_graphics_device_tests.rs"]
mod tests;
