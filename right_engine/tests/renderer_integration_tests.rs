//! Integration tests driving the core Renderer and scene passes on Vulkan
//!
//! All tests require a GPU and are marked with #[ignore].
//!
//! Run with: cargo test --test renderer_integration_tests -- --ignored


use gpu_test_utils::{get_test_device, TEST_WINDOW_SIZE};
use right_engine::glam::{UVec2, Vec4};
use right_engine::right::Error;
use right_engine::right::render::{
    AttachmentDesc, Buffer, BufferDesc, ClearValue, CommandBuffer, GraphicsDevice, GraphicsPipeline,
    GraphicsPipelineDesc, LoadOp, Mesh, RenderPassDesc, Renderer, RendererState, SamplerDesc, Texture,
    TextureDesc, TextureFormat,
};
use right_engine::right::scene::{create_present_pass, create_ui_pass, SceneRenderer, SceneRendererConfig};
use serial_test::serial;
use std::sync::Arc;

fn shared_device() -> Arc<dyn GraphicsDevice> {
    get_test_device()
}

fn clear_pipeline(device: &dyn GraphicsDevice, extent: UVec2, color: Vec4) -> Arc<dyn GraphicsPipeline> {
    let target = device
        .create_texture(&TextureDesc::texture_2d(extent.x, extent.y, TextureFormat::R8G8B8A8_UNORM), &[])
        .unwrap();
    let mut pass = RenderPassDesc::new("Clear", extent);
    let mut attachment = AttachmentDesc::new(target, LoadOp::Clear);
    attachment.clear_value = ClearValue { color, ..ClearValue::default() };
    pass.color_attachments.push(attachment);
    device.create_graphics_pipeline(&GraphicsPipelineDesc::default(), &pass).unwrap()
}

fn read_attachment(pipeline: &Arc<dyn GraphicsPipeline>) -> Vec<u8> {
    pipeline.color_attachment(0).unwrap().data().unwrap().read_data().unwrap()
}

// ============================================================================
// RENDERER TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_renderer_offscreen_frames_alternate_pipelines() {
    let device = shared_device();
    let blue = clear_pipeline(device.as_ref(), UVec2::new(8, 8), Vec4::new(0.0, 0.0, 1.0, 1.0));
    let white = clear_pipeline(device.as_ref(), UVec2::new(8, 8), Vec4::ONE);
    let mut renderer = Renderer::new(device.clone()).unwrap();

    renderer.set_pipeline(blue.clone());
    renderer.begin_frame().unwrap();
    renderer.end_frame().unwrap();

    renderer.set_pipeline(white.clone());
    renderer.begin_frame().unwrap();
    renderer.end_frame().unwrap();

    assert!(read_attachment(&blue).chunks_exact(4).all(|t| t == [0, 0, 255, 255]));
    assert!(read_attachment(&white).chunks_exact(4).all(|t| t == [255, 255, 255, 255]));
    assert!(renderer.command_buffer().pending().is_empty());
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_renderer_without_pipeline_fails() {
    let device = shared_device();
    let mut renderer = Renderer::new(device).unwrap();

    assert!(matches!(renderer.begin_frame(), Err(Error::InvalidResource(_))));
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_renderer_draw_without_vertex_layout_fails() {
    let device = shared_device();
    let pipeline = clear_pipeline(device.as_ref(), UVec2::new(4, 4), Vec4::ONE);
    let vertices = device.create_buffer(&BufferDesc::vertex(48), Some(&[0u8; 48])).unwrap();
    let mut renderer = Renderer::new(device.clone()).unwrap();
    renderer.set_pipeline(pipeline);

    let result = renderer.draw_mesh(&Mesh::new(vertices, None));

    assert!(matches!(result, Err(Error::InvalidResource(_))));
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_renderer_encode_empty_state_records_nothing() {
    let device = shared_device();
    let pipeline = clear_pipeline(device.as_ref(), UVec2::new(4, 4), Vec4::ONE);
    let mut renderer = Renderer::new(device.clone()).unwrap();
    renderer.set_pipeline(pipeline);
    let mut state = RendererState::new();

    renderer.begin_frame().unwrap();
    let recorded = renderer.command_buffer().pending().len();
    renderer.encode_state(&mut state).unwrap();

    assert_eq!(renderer.command_buffer().pending().len(), recorded);
    renderer.end_frame().unwrap();
}

// ============================================================================
// SCENE PASS TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_ui_and_present_passes_share_attachment() {
    let device = shared_device();
    let window = UVec2::new(TEST_WINDOW_SIZE.0, TEST_WINDOW_SIZE.1);
    let sampler = device.create_sampler(&SamplerDesc::default()).unwrap();
    let present = create_present_pass(device.as_ref(), window, &sampler).unwrap();
    let ui = create_ui_pass(device.as_ref(), &present).unwrap();

    assert!(Arc::ptr_eq(&present.color_attachment(0).unwrap(), &ui.color_attachment(0).unwrap()));
    assert!(!present.render_pass_desc().offscreen);

    let mut renderer = Renderer::new(device.clone()).unwrap();
    renderer.set_pipeline(ui.clone());
    renderer.begin_frame().unwrap();
    renderer.end_frame().unwrap();
    renderer.set_pipeline(present);
    renderer.begin_frame().unwrap();
    renderer.end_frame().unwrap();
    device.wait_idle().unwrap();

    // UI clears to the default clear color
    assert!(read_attachment(&ui).chunks_exact(4).all(|t| t == [0, 0, 0, 255]));
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_present_pass_resize() {
    let device = shared_device();
    let sampler = device.create_sampler(&SamplerDesc::default()).unwrap();
    let present = create_present_pass(device.as_ref(), UVec2::new(64, 64), &sampler).unwrap();

    present.resize(128, 32).unwrap();

    let attachment = present.color_attachment(0).unwrap();
    assert_eq!(present.extent(), UVec2::new(128, 32));
    assert_eq!((attachment.desc().width, attachment.desc().height), (128, 32));
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_scene_renderer_init_without_shaders_fails() {
    let device = shared_device();
    let config = SceneRendererConfig {
        viewport: UVec2::new(64, 64),
        window_size: UVec2::new(TEST_WINDOW_SIZE.0, TEST_WINDOW_SIZE.1),
        ..SceneRendererConfig::default()
    };
    let mut scene_renderer = SceneRenderer::new(device, config);

    assert!(scene_renderer.init().is_err());
    assert!(!scene_renderer.is_initialized());
    assert!(scene_renderer.get_final_image().is_err());
}
