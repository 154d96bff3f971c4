//! Unit tests for shader.rs
//!
//! Tests VertexBufferLayout and the stage reflection merge rules.

use crate::error::Error;
use crate::graphics_device::{
    merge_stage_reflections, BufferFormat, BufferRef, BufferType, ShaderStage, ShaderStageFlags,
    StageReflection, VertexBufferLayout, CONSTANT_BUFFER_SLOT,
};

fn pbr_layout() -> VertexBufferLayout {
    VertexBufferLayout::new(vec![
        BufferFormat::R32G32B32_SFLOAT,
        BufferFormat::R32G32B32_SFLOAT,
        BufferFormat::R32G32_SFLOAT,
        BufferFormat::R32G32B32_SFLOAT,
        BufferFormat::R32G32B32_SFLOAT,
    ])
}

// ============================================================================
// VERTEX LAYOUT TESTS
// ============================================================================

#[test]
fn test_layout_stride_and_offsets() {
    let layout = pbr_layout();
    assert_eq!(layout.stride(), 56);
    assert_eq!(layout.offsets(), vec![0, 12, 24, 32, 44]);
}

#[test]
fn test_layout_push() {
    let mut layout = VertexBufferLayout::default();
    assert!(layout.is_empty());
    layout.push(BufferFormat::R32G32_SFLOAT).push(BufferFormat::R32G32_SFLOAT);
    assert_eq!(layout.stride(), 16);
    assert_eq!(layout.elements().len(), 2);
}

// ============================================================================
// MERGE TESTS
// ============================================================================

#[test]
fn test_merge_vertex_and_fragment() {
    let vertex = StageReflection {
        buffers: vec![(0, BufferType::Uniform), (1, BufferType::Uniform)],
        textures: vec![],
        vertex_layout: Some(pbr_layout()),
    };
    let fragment = StageReflection {
        buffers: vec![(2, BufferType::Uniform), (11, BufferType::Uniform)],
        textures: vec![4, 3, 13],
        vertex_layout: None,
    };

    let merged = merge_stage_reflections(&[(ShaderStage::Vertex, vertex), (ShaderStage::Fragment, fragment)]).unwrap();

    assert_eq!(merged.buffers.len(), 4);
    assert_eq!(merged.buffers[&BufferRef { slot: 1, stage: ShaderStage::Vertex }], BufferType::Uniform);
    assert_eq!(merged.buffer_stage(11), Some(ShaderStage::Fragment));
    let slots: Vec<u32> = merged.textures.iter().map(|t| t.slot).collect();
    assert_eq!(slots, vec![3, 4, 13]);
    assert_eq!(merged.layout.stride(), 56);
    assert_eq!(merged.binding_count(), 7);
    assert!(merged.constant_buffer().is_none());
}

#[test]
fn test_merge_rejects_shared_buffer_slot() {
    let vertex = StageReflection { buffers: vec![(1, BufferType::Uniform)], ..Default::default() };
    let fragment = StageReflection { buffers: vec![(1, BufferType::Uniform)], ..Default::default() };

    let result = merge_stage_reflections(&[(ShaderStage::Vertex, vertex), (ShaderStage::Fragment, fragment)]);

    assert!(matches!(result, Err(Error::ShaderReflection(_))));
}

#[test]
fn test_merge_rejects_two_vertex_layouts() {
    let first = StageReflection { vertex_layout: Some(pbr_layout()), ..Default::default() };
    let second = StageReflection { vertex_layout: Some(pbr_layout()), ..Default::default() };

    let result = merge_stage_reflections(&[(ShaderStage::Vertex, first), (ShaderStage::Fragment, second)]);

    assert!(matches!(result, Err(Error::ShaderReflection(_))));
}

#[test]
fn test_merge_rejects_texture_buffer_collision() {
    let vertex = StageReflection { buffers: vec![(3, BufferType::Uniform)], ..Default::default() };
    let fragment = StageReflection { textures: vec![3], ..Default::default() };

    let result = merge_stage_reflections(&[(ShaderStage::Vertex, vertex), (ShaderStage::Fragment, fragment)]);

    assert!(matches!(result, Err(Error::ShaderReflection(_))));
}

#[test]
fn test_merge_texture_visible_to_both_stages() {
    let vertex = StageReflection { textures: vec![5], ..Default::default() };
    let fragment = StageReflection { textures: vec![5], ..Default::default() };

    let merged = merge_stage_reflections(&[(ShaderStage::Vertex, vertex), (ShaderStage::Fragment, fragment)]).unwrap();

    assert_eq!(merged.textures.len(), 1);
    assert_eq!(merged.textures[0].stages, ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT);
}

#[test]
fn test_constant_buffer_is_not_a_binding() {
    let vertex = StageReflection {
        buffers: vec![(0, BufferType::Uniform), (CONSTANT_BUFFER_SLOT, BufferType::Constant)],
        ..Default::default()
    };

    let merged = merge_stage_reflections(&[(ShaderStage::Vertex, vertex)]).unwrap();

    assert_eq!(
        merged.constant_buffer(),
        Some(BufferRef { slot: CONSTANT_BUFFER_SLOT, stage: ShaderStage::Vertex })
    );
    assert_eq!(merged.bound_buffers().len(), 1);
    assert_eq!(merged.binding_count(), 1);
}

#[test]
fn test_empty_program_has_no_bindings() {
    let merged = merge_stage_reflections(&[]).unwrap();
    assert!(!merged.has_bindings());
    assert!(merged.layout.is_empty());
}
