//! Unit tests for RendererState dirty tracking

use std::sync::atomic::Ordering;
use std::sync::Arc;
use glam::UVec2;

use crate::graphics_device::mock_graphics_device::{MockBindingSet, MockGraphicsDevice};
use crate::graphics_device::{
    AttachmentDesc, BufferDesc, BufferType, GraphicsDevice, GraphicsPipeline, GraphicsPipelineDesc,
    LoadOp, RenderPassDesc, ShaderProgramDesc, ShaderStage, ShaderStageDesc, StageReflection,
    TextureDesc, TextureFormat,
};
use crate::renderer::RendererState;

fn pipeline(device: &MockGraphicsDevice) -> Arc<dyn GraphicsPipeline> {
    let shader = device
        .create_shader(&ShaderProgramDesc {
            name: "lit".to_string(),
            stages: vec![
                ShaderStageDesc::new(
                    ShaderStage::Vertex,
                    Vec::new(),
                    StageReflection {
                        buffers: vec![(0, BufferType::Uniform), (1, BufferType::Uniform)],
                        ..Default::default()
                    },
                ),
                ShaderStageDesc::new(
                    ShaderStage::Fragment,
                    Vec::new(),
                    StageReflection {
                        buffers: vec![(2, BufferType::Uniform)],
                        textures: vec![3, 4],
                        ..Default::default()
                    },
                ),
            ],
        })
        .unwrap();
    let color = device.create_texture(&TextureDesc::texture_2d(8, 8, TextureFormat::B8G8R8A8_UNORM), &[]).unwrap();
    let mut pass = RenderPassDesc::new("lit", UVec2::new(8, 8));
    pass.color_attachments.push(AttachmentDesc::new(color, LoadOp::Clear));
    device
        .create_graphics_pipeline(&GraphicsPipelineDesc { shader: Some(shader), ..Default::default() }, &pass)
        .unwrap()
}

fn writes(device: &MockGraphicsDevice) -> usize {
    device.state.binding_writes.load(Ordering::Relaxed)
}

#[test]
fn test_first_update_writes_every_binding() {
    let device = MockGraphicsDevice::new();
    let pipeline = pipeline(&device);
    let uniforms = device.create_buffer(&BufferDesc::uniform(1024), None).unwrap();
    let texture = device.create_texture(&TextureDesc::texture_2d(1, 1, TextureFormat::R8G8B8A8_UNORM), &[]).unwrap();

    let mut state = RendererState::new();
    state.set_vertex_buffer(uniforms.clone(), 0, 0, 64);
    state.set_vertex_buffer(uniforms.clone(), 1, 256, 80);
    state.set_fragment_buffer(uniforms, 2, 512, 32);
    state.set_texture(texture.clone(), 3);
    state.set_texture(texture, 4);
    state.on_update(&device, &pipeline).unwrap();

    assert_eq!(writes(&device), 5);
    assert_eq!(device.state.binding_sets_created.load(Ordering::Relaxed), 1);
    assert!(state.dirty_slots().is_empty());
}

#[test]
fn test_later_updates_write_only_dirty_slots() {
    let device = MockGraphicsDevice::new();
    let pipeline = pipeline(&device);
    let uniforms = device.create_buffer(&BufferDesc::uniform(1024), None).unwrap();
    let texture = device.create_texture(&TextureDesc::texture_2d(1, 1, TextureFormat::R8G8B8A8_UNORM), &[]).unwrap();
    let other = device.create_texture(&TextureDesc::texture_2d(1, 1, TextureFormat::R8G8B8A8_UNORM), &[]).unwrap();

    let mut state = RendererState::new();
    state.set_vertex_buffer(uniforms.clone(), 0, 0, 64);
    state.set_texture(texture.clone(), 3);
    state.on_update(&device, &pipeline).unwrap();
    let after_first = writes(&device);

    state.set_vertex_buffer(uniforms.clone(), 0, 256, 64);
    state.set_texture(other, 3);
    assert_eq!(state.dirty_slots(), vec![0, 3]);
    state.on_update(&device, &pipeline).unwrap();
    assert_eq!(writes(&device) - after_first, 2);

    // Nothing changed: nothing written
    state.on_update(&device, &pipeline).unwrap();
    assert_eq!(writes(&device) - after_first, 2);
    assert_eq!(device.state.binding_sets_created.load(Ordering::Relaxed), 1);
}

#[test]
fn test_rebinding_identical_resource_is_not_dirty() {
    let device = MockGraphicsDevice::new();
    let pipeline = pipeline(&device);
    let uniforms = device.create_buffer(&BufferDesc::uniform(1024), None).unwrap();

    let mut state = RendererState::new();
    state.set_fragment_buffer(uniforms.clone(), 2, 0, 32);
    state.on_update(&device, &pipeline).unwrap();
    state.set_fragment_buffer(uniforms, 2, 0, 32);

    assert!(state.dirty_slots().is_empty());
}

#[test]
fn test_constant_buffer_never_written() {
    let device = MockGraphicsDevice::new();
    let pipeline = pipeline(&device);
    let uniforms = device.create_buffer(&BufferDesc::uniform(256), None).unwrap();
    let constants = device.create_buffer(&BufferDesc::constant(128), None).unwrap();

    let mut state = RendererState::new();
    state.set_vertex_buffer(uniforms, 0, 0, 64);
    state.set_constant_buffer(constants);
    state.on_update(&device, &pipeline).unwrap();

    let set = state.binding_set().unwrap();
    let mock = set.as_any().downcast_ref::<MockBindingSet>().unwrap();
    assert_eq!(*mock.write_log.lock().unwrap(), vec![0]);
    assert!(state.constant_buffer().is_some());
}

#[test]
fn test_zero_stride_binds_rest_of_buffer() {
    let device = MockGraphicsDevice::new();
    let pipeline = pipeline(&device);
    let uniforms = device.create_buffer(&BufferDesc::uniform(1024), None).unwrap();

    let mut state = RendererState::new();
    state.set_vertex_buffer(uniforms, 1, 256, 0);
    state.on_update(&device, &pipeline).unwrap();

    let set = state.binding_set().unwrap();
    let mock = set.as_any().downcast_ref::<MockBindingSet>().unwrap();
    let (_, offset, range) = mock.buffer_at(1).unwrap();
    assert_eq!((offset, range), (256, 768));
}

#[test]
fn test_empty_state_creates_no_binding_set() {
    let device = MockGraphicsDevice::new();
    let pipeline = pipeline(&device);
    let constants = device.create_buffer(&BufferDesc::constant(128), None).unwrap();

    let mut state = RendererState::new();
    state.set_constant_buffer(constants);
    state.on_update(&device, &pipeline).unwrap();

    assert!(state.binding_set().is_none());
    assert_eq!(device.state.binding_sets_created.load(Ordering::Relaxed), 0);
}

#[test]
fn test_pipeline_change_reallocates_binding_set() {
    let device = MockGraphicsDevice::new();
    let first = pipeline(&device);
    let second = pipeline(&device);
    let uniforms = device.create_buffer(&BufferDesc::uniform(1024), None).unwrap();

    let mut state = RendererState::new();
    state.set_vertex_buffer(uniforms.clone(), 0, 0, 64);
    state.set_fragment_buffer(uniforms, 2, 256, 32);
    state.on_update(&device, &first).unwrap();
    let first_set = state.binding_set().unwrap().clone();

    // Same pipeline, nothing dirty: no new set, no writes
    state.on_update(&device, &first).unwrap();
    assert_eq!(device.state.binding_sets_created.load(Ordering::Relaxed), 1);
    assert_eq!(writes(&device), 2);

    state.on_update(&device, &second).unwrap();

    assert_eq!(device.state.binding_sets_created.load(Ordering::Relaxed), 2);
    assert!(!Arc::ptr_eq(&first_set, state.binding_set().unwrap()));
    // Every binding lands in the new set
    assert_eq!(writes(&device), 4);
    let set = state.binding_set().unwrap().as_any().downcast_ref::<MockBindingSet>().unwrap();
    assert_eq!(set.buffer_at(2).unwrap().1, 256);
}
