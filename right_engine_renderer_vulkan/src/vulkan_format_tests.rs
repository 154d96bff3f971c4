//! Unit tests for Vulkan format conversion functions
//!
//! Pure conversions, no GPU required.

use super::*;
use right_engine::glam::Vec4;

// ============================================================================
// TEXTURE FORMATS
// ============================================================================

#[test]
fn test_texture_format_to_vk_color_formats() {
    assert_eq!(texture_format_to_vk(TextureFormat::B8G8R8A8_UNORM), vk::Format::B8G8R8A8_UNORM);
    assert_eq!(texture_format_to_vk(TextureFormat::R8G8B8A8_SRGB), vk::Format::R8G8B8A8_SRGB);
    assert_eq!(texture_format_to_vk(TextureFormat::R16G16_SFLOAT), vk::Format::R16G16_SFLOAT);
    assert_eq!(
        texture_format_to_vk(TextureFormat::R32G32B32A32_SFLOAT),
        vk::Format::R32G32B32A32_SFLOAT
    );
}

#[test]
fn test_texture_format_to_vk_depth_formats() {
    assert_eq!(texture_format_to_vk(TextureFormat::D32_FLOAT), vk::Format::D32_SFLOAT);
    assert_eq!(
        texture_format_to_vk(TextureFormat::D32_FLOAT_S8_UINT),
        vk::Format::D32_SFLOAT_S8_UINT
    );
    assert_eq!(
        texture_format_to_vk(TextureFormat::D24_UNORM_S8_UINT),
        vk::Format::D24_UNORM_S8_UINT
    );
}

#[test]
fn test_surface_format_round_trip() {
    for format in [
        TextureFormat::B8G8R8A8_UNORM,
        TextureFormat::B8G8R8A8_SRGB,
        TextureFormat::R8G8B8A8_UNORM,
        TextureFormat::R8G8B8A8_SRGB,
    ] {
        assert_eq!(vk_to_texture_format(texture_format_to_vk(format)), Some(format));
    }
    assert_eq!(vk_to_texture_format(vk::Format::A2B10G10R10_UNORM_PACK32), None);
}

#[test]
fn test_aspects() {
    assert_eq!(sampled_aspect(TextureFormat::R8G8B8A8_UNORM), vk::ImageAspectFlags::COLOR);
    assert_eq!(sampled_aspect(TextureFormat::D32_FLOAT_S8_UINT), vk::ImageAspectFlags::DEPTH);
    assert_eq!(full_aspect(TextureFormat::D32_FLOAT), vk::ImageAspectFlags::DEPTH);
    assert_eq!(
        full_aspect(TextureFormat::D32_FLOAT_S8_UINT),
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    );
}

// ============================================================================
// BUFFER FORMATS AND USAGE
// ============================================================================

#[test]
fn test_buffer_format_to_vk() {
    assert_eq!(buffer_format_to_vk(BufferFormat::R32G32_SFLOAT), vk::Format::R32G32_SFLOAT);
    assert_eq!(buffer_format_to_vk(BufferFormat::R32G32B32_SFLOAT), vk::Format::R32G32B32_SFLOAT);
    assert_eq!(buffer_format_to_vk(BufferFormat::R32G32B32A32_SINT), vk::Format::R32G32B32A32_SINT);
    assert_eq!(buffer_format_to_vk(BufferFormat::R32_UINT), vk::Format::R32_UINT);
}

#[test]
fn test_gpu_only_buffers_accept_transfers() {
    let usage = buffer_usage_to_vk(BufferType::Vertex, MemoryType::GpuOnly);
    assert!(usage.contains(vk::BufferUsageFlags::VERTEX_BUFFER));
    assert!(usage.contains(vk::BufferUsageFlags::TRANSFER_DST));

    let usage = buffer_usage_to_vk(BufferType::Uniform, MemoryType::CpuGpu);
    assert_eq!(usage, vk::BufferUsageFlags::UNIFORM_BUFFER);
}

#[test]
fn test_memory_locations() {
    assert_eq!(memory_type_to_location(MemoryType::CpuOnly), gpu_allocator::MemoryLocation::GpuToCpu);
    assert_eq!(memory_type_to_location(MemoryType::CpuGpu), gpu_allocator::MemoryLocation::CpuToGpu);
    assert_eq!(memory_type_to_location(MemoryType::GpuOnly), gpu_allocator::MemoryLocation::GpuOnly);
}

// ============================================================================
// PIPELINE STATE
// ============================================================================

#[test]
fn test_stage_flags_to_vk() {
    assert_eq!(stage_flags_to_vk(ShaderStageFlags::VERTEX), vk::ShaderStageFlags::VERTEX);
    assert_eq!(
        stage_flags_to_vk(ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT),
        vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
    );
    assert_eq!(stage_flags_to_vk(ShaderStageFlags::empty()), vk::ShaderStageFlags::empty());
}

#[test]
fn test_load_ops_and_initial_layouts() {
    assert_eq!(load_op_to_vk(LoadOp::Load), vk::AttachmentLoadOp::LOAD);
    assert_eq!(load_op_to_vk(LoadOp::Clear), vk::AttachmentLoadOp::CLEAR);
    assert_eq!(load_op_to_vk(LoadOp::Undefined), vk::AttachmentLoadOp::DONT_CARE);

    assert_eq!(initial_layout(LoadOp::Load), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    assert_eq!(initial_layout(LoadOp::Clear), vk::ImageLayout::UNDEFINED);
    assert_eq!(initial_layout(LoadOp::Undefined), vk::ImageLayout::UNDEFINED);
}

#[test]
fn test_cull_and_compare() {
    assert_eq!(cull_mode_to_vk(CullMode::Front), vk::CullModeFlags::FRONT);
    assert_eq!(cull_mode_to_vk(CullMode::None), vk::CullModeFlags::NONE);
    assert_eq!(compare_op_to_vk(CompareOp::LessOrEqual), vk::CompareOp::LESS_OR_EQUAL);
    assert_eq!(compare_op_to_vk(CompareOp::Less), vk::CompareOp::LESS);
}

#[test]
fn test_texture_usage_layouts() {
    assert_eq!(texture_usage_to_layout(TextureUsage::ShaderReadOnly), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    assert_eq!(texture_usage_to_layout(TextureUsage::TransferSrc), vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
    assert_eq!(texture_usage_to_layout(TextureUsage::Undefined), vk::ImageLayout::UNDEFINED);
}

#[test]
fn test_clear_values() {
    let clear = ClearValue {
        color: Vec4::new(0.1, 0.2, 0.3, 1.0),
        depth: 0.5,
        stencil: 7,
    };

    let color = clear_value_to_vk(&clear, TextureFormat::B8G8R8A8_UNORM);
    assert_eq!(unsafe { color.color.float32 }, [0.1, 0.2, 0.3, 1.0]);

    let depth = clear_value_to_vk(&clear, TextureFormat::D32_FLOAT_S8_UINT);
    let depth_stencil = unsafe { depth.depth_stencil };
    assert_eq!(depth_stencil.depth, 0.5);
    assert_eq!(depth_stencil.stencil, 7);
}
