//! Unit tests for texture.rs

use crate::error::Error;
use crate::graphics_device::{check_copy_region, TextureCopy, TextureDesc, TextureFormat, TextureType, TextureUsage};

#[test]
fn test_bytes_per_pixel() {
    assert_eq!(TextureFormat::R8_UNORM.bytes_per_pixel(), 1);
    assert_eq!(TextureFormat::B8G8R8A8_UNORM.bytes_per_pixel(), 4);
    assert_eq!(TextureFormat::R16G16B16A16_SFLOAT.bytes_per_pixel(), 8);
    assert_eq!(TextureFormat::R32G32B32A32_SFLOAT.bytes_per_pixel(), 16);
}

#[test]
fn test_depth_formats() {
    assert!(TextureFormat::D32_FLOAT.is_depth());
    assert!(!TextureFormat::D32_FLOAT.has_stencil());
    assert!(TextureFormat::D32_FLOAT_S8_UINT.has_stencil());
    assert!(TextureFormat::D24_UNORM_S8_UINT.is_depth());
    assert!(!TextureFormat::R8G8B8A8_SRGB.is_depth());
}

#[test]
fn test_cubemap_size_counts_six_faces() {
    let desc = TextureDesc {
        texture_type: TextureType::Cubemap,
        ..TextureDesc::texture_2d(16, 16, TextureFormat::R16G16B16A16_SFLOAT)
    };
    assert_eq!(desc.size_bytes(), 16 * 16 * 8 * 6);
}

#[test]
fn test_with_size_keeps_everything_else() {
    let desc = TextureDesc { mip_levels: 5, ..TextureDesc::texture_2d(64, 32, TextureFormat::D32_FLOAT) };
    let resized = desc.with_size(128, 128);
    assert_eq!((resized.width, resized.height), (128, 128));
    assert_eq!(resized.format, TextureFormat::D32_FLOAT);
    assert_eq!(resized.mip_levels, 5);
    assert_eq!(resized.component_amount, 1);
}

#[test]
fn test_mip_extent_clamps_to_one() {
    let desc = TextureDesc::texture_2d(64, 16, TextureFormat::R8G8B8A8_UNORM);
    assert_eq!(desc.mip_extent(0), (64, 16));
    assert_eq!(desc.mip_extent(3), (8, 2));
    assert_eq!(desc.mip_extent(6), (1, 1));
}

#[test]
fn test_check_copy_region() {
    let cube = TextureDesc {
        texture_type: TextureType::Cubemap,
        mip_levels: 4,
        ..TextureDesc::texture_2d(32, 32, TextureFormat::R16G16B16A16_SFLOAT)
    };
    let face = |layer, mip_level| TextureCopy { layer, mip_level, usage: TextureUsage::ShaderReadOnly };
    assert!(check_copy_region(&cube, &face(5, 3)).is_ok());
    assert!(matches!(check_copy_region(&cube, &face(6, 0)), Err(Error::OutOfBounds(_))));
    assert!(matches!(check_copy_region(&cube, &face(0, 4)), Err(Error::OutOfBounds(_))));
}
