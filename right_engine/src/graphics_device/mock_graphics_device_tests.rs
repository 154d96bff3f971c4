//! Unit tests for MockGraphicsDevice and associated mock types.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use glam::UVec2;

use crate::error::Error;
use crate::graphics_device::mock_graphics_device::*;
use crate::graphics_device::{
    AttachmentDesc, BindingSet, BindingWrite, Buffer, BufferDesc, BufferType, CommandBuffer,
    GraphicsDevice, GraphicsPipeline, GraphicsPipelineDesc,
    LoadOp, RenderPassDesc, ShaderProgramDesc, ShaderStage, ShaderStageDesc, StageReflection,
    Texture, TextureCopy, TextureDesc, TextureFormat, TextureType,
};

fn shader_pipeline(device: &MockGraphicsDevice, offscreen: bool) -> Arc<dyn GraphicsPipeline> {
    let shader = device
        .create_shader(&ShaderProgramDesc {
            name: "flat".to_string(),
            stages: vec![ShaderStageDesc::new(
                ShaderStage::Fragment,
                Vec::new(),
                StageReflection { buffers: vec![(13, BufferType::Uniform)], ..Default::default() },
            )],
        })
        .unwrap();
    let color = device.create_texture(&TextureDesc::texture_2d(4, 4, TextureFormat::B8G8R8A8_UNORM), &[]).unwrap();
    let mut pass = RenderPassDesc::new("flat", UVec2::new(4, 4));
    pass.offscreen = offscreen;
    pass.color_attachments.push(AttachmentDesc::new(color, LoadOp::Clear));
    device
        .create_graphics_pipeline(&GraphicsPipelineDesc { shader: Some(shader), ..Default::default() }, &pass)
        .unwrap()
}

// ============================================================================
// MockTexture Tests
// ============================================================================

#[test]
fn test_mock_texture_data_returns_pixels() {
    let device = MockGraphicsDevice::new();
    let texture = device
        .create_texture(&TextureDesc::texture_2d(2, 1, TextureFormat::R8G8B8A8_UNORM), &[1, 2, 3, 4, 5, 6, 7, 8])
        .unwrap();
    let readback = texture.data().unwrap();
    assert_eq!(readback.read_data().unwrap(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
}

#[test]
fn test_mock_texture_fill_rect() {
    let texture = MockTexture::new(TextureDesc::texture_2d(4, 4, TextureFormat::B8G8R8A8_UNORM), &[]);
    texture.fill_rect(1, 1, 2, 2, &[9, 8, 7, 255]);
    let pixels = texture.pixels.lock().unwrap();
    let at = |x: usize, y: usize| pixels[(y * 4 + x) * 4];
    assert_eq!(at(0, 0), 0);
    assert_eq!(at(1, 1), 9);
    assert_eq!(at(2, 2), 9);
    assert_eq!(at(3, 3), 0);
}

#[test]
fn test_mock_texture_copy_into_cubemap_face() {
    let device = MockGraphicsDevice::new();
    let face = device.create_texture(&TextureDesc::texture_2d(1, 1, TextureFormat::R8G8B8A8_UNORM), &[1, 2, 3, 4]).unwrap();
    let cube_desc = TextureDesc { texture_type: TextureType::Cubemap, ..TextureDesc::texture_2d(1, 1, TextureFormat::R8G8B8A8_UNORM) };
    let cube = device.create_texture(&cube_desc, &[]).unwrap();

    cube.copy_from(face.as_ref(), &TextureCopy::default(), &TextureCopy { layer: 2, ..Default::default() }).unwrap();

    let bytes = cube.data().unwrap().read_data().unwrap();
    assert_eq!(&bytes[8..12], &[1, 2, 3, 4]);
    assert_eq!(&bytes[0..4], &[0, 0, 0, 0]);
}

#[test]
fn test_mock_depth_texture_ignores_data() {
    let texture = MockTexture::new(TextureDesc::texture_2d(1, 1, TextureFormat::D32_FLOAT), &[1, 1, 1, 1]);
    assert_eq!(*texture.pixels.lock().unwrap(), vec![0; 4]);
}

// ============================================================================
// MockBindingSet Tests
// ============================================================================

#[test]
fn test_binding_set_rejects_slot_outside_layout() {
    let device = MockGraphicsDevice::new();
    let pipeline = shader_pipeline(&device, true);
    let set = device.create_binding_set(&pipeline).unwrap();
    let buffer = device.create_buffer(&BufferDesc::uniform(16), None).unwrap();

    let ok = set.write(&[BindingWrite::Buffer { slot: 13, buffer: buffer.clone(), offset: 0, range: 16 }]);
    let bad = set.write(&[BindingWrite::Buffer { slot: 2, buffer, offset: 0, range: 16 }]);

    assert!(ok.is_ok());
    assert!(matches!(bad, Err(Error::InvalidResource(_))));
    assert_eq!(device.state.binding_writes.load(Ordering::Relaxed), 1);
}

#[test]
fn test_binding_set_requires_bindings() {
    let device = MockGraphicsDevice::new();
    let color = device.create_texture(&TextureDesc::texture_2d(4, 4, TextureFormat::B8G8R8A8_UNORM), &[]).unwrap();
    let mut pass = RenderPassDesc::new("present", UVec2::new(4, 4));
    pass.color_attachments.push(AttachmentDesc::new(color, LoadOp::Load));
    let pipeline = device.create_graphics_pipeline(&GraphicsPipelineDesc::default(), &pass).unwrap();

    assert!(matches!(device.create_binding_set(&pipeline), Err(Error::InvalidResource(_))));
}

// ============================================================================
// Frame Tests
// ============================================================================

#[test]
fn test_frame_records_commands_and_presents() {
    let device = MockGraphicsDevice::new();
    let offscreen = shader_pipeline(&device, true);
    let onscreen = shader_pipeline(&device, false);
    let mut cmd = device.create_command_buffer().unwrap();

    device.begin_frame(cmd.as_mut(), &offscreen).unwrap();
    device.end_frame(cmd.as_mut(), &offscreen).unwrap();
    device.begin_frame(cmd.as_mut(), &onscreen).unwrap();
    device.end_frame(cmd.as_mut(), &onscreen).unwrap();

    let frames = device.state.frames.lock().unwrap();
    assert_eq!(frames.len(), 2);
    assert_eq!(
        frames[0].commands,
        vec!["begin_render_pass", "bind_pipeline", "set_viewport", "set_scissor", "end_render_pass"]
    );
    assert_eq!(device.state.presents.load(Ordering::Relaxed), 1);
    assert!(cmd.pending().is_empty());
}

#[test]
fn test_begin_discards_abandoned_frame() {
    let device = MockGraphicsDevice::new();
    let pipeline = shader_pipeline(&device, true);
    let mut cmd = device.create_command_buffer().unwrap();

    device.begin_frame(cmd.as_mut(), &pipeline).unwrap();
    device.begin_frame(cmd.as_mut(), &pipeline).unwrap();
    device.end_frame(cmd.as_mut(), &pipeline).unwrap();

    let frames = device.state.frames.lock().unwrap();
    assert_eq!(frames[0].commands.iter().filter(|c| *c == "begin_render_pass").count(), 1);
}

#[test]
fn test_execute_without_begin_fails() {
    let device = MockGraphicsDevice::new();
    let mut cmd = device.create_command_buffer().unwrap();
    assert!(matches!(cmd.execute(), Err(Error::BackendError(_))));
}

#[test]
fn test_frame_hook_sees_pending_commands() {
    let device = MockGraphicsDevice::new();
    let pipeline = shader_pipeline(&device, true);
    let seen = Arc::new(Mutex::new(0usize));
    let seen_in_hook = seen.clone();
    device.set_frame_hook(Box::new(move |_, commands| {
        *seen_in_hook.lock().unwrap() = commands.len();
    }));
    let mut cmd = device.create_command_buffer().unwrap();

    device.begin_frame(cmd.as_mut(), &pipeline).unwrap();
    device.end_frame(cmd.as_mut(), &pipeline).unwrap();

    assert_eq!(*seen.lock().unwrap(), 5);
}
