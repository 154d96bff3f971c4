//! Unit tests for color-ID encoding

use super::*;

#[test]
fn test_id_color_round_trip_full_range() {
    for id in 0..=MAX_COLOR_ID {
        let [r, g, b] = id_to_color(id);
        assert_eq!(color_to_id(r, g, b), id);
    }
}

#[test]
fn test_id_to_color_byte_order() {
    assert_eq!(id_to_color(0x0012_3456), [0x12, 0x34, 0x56]);
    assert_eq!(id_to_color(1), [0, 0, 1]);
}

#[test]
fn test_bgra_texel_decoding() {
    let [r, g, b] = id_to_color(70_000);
    assert_eq!(bgra_to_id(&[b, g, r, 255]), 70_000);
    assert_eq!(bgra_to_id(&[0, 0, 0, 255]), BACKGROUND_ID);
}

#[test]
fn test_color_id_uniform_is_normalized() {
    let uniform = color_id_uniform(0x00FF_0001);
    assert_eq!(uniform.color.x, 1.0);
    assert_eq!(uniform.color.y, 0.0);
    assert!((uniform.color.z - 1.0 / 255.0).abs() < f32::EPSILON);
    assert_eq!(uniform.color.w, 1.0);
}
