//! Unit tests for graphics_device.rs
//!
//! Tests the alignment helper, device configuration defaults and the
//! provided `aligned_gpu_data_size` method.

use crate::graphics_device::mock_graphics_device::MockGraphicsDevice;
use crate::graphics_device::{align_up, Config, DebugOutput, DebugSeverity, DeviceLimits, GraphicsDevice, ValidationStats};

// ============================================================================
// ALIGNMENT TESTS
// ============================================================================

#[test]
fn test_align_up_identity_for_multiples() {
    for n in [0u64, 64, 256, 512, 65536] {
        assert_eq!(align_up(n, 64), n);
    }
}

#[test]
fn test_align_up_rounds_to_next_multiple() {
    assert_eq!(align_up(1, 256), 256);
    assert_eq!(align_up(64, 256), 256);
    assert_eq!(align_up(257, 256), 512);
}

#[test]
fn test_align_up_property_over_range() {
    for alignment in [1u64, 4, 16, 64, 256] {
        for n in 0..1100u64 {
            let aligned = align_up(n, alignment);
            assert_eq!(aligned % alignment, 0);
            assert!(aligned >= n);
            assert!(aligned - n < alignment);
        }
    }
}

#[test]
fn test_align_up_zero_alignment() {
    assert_eq!(align_up(13, 0), 13);
}

#[test]
fn test_aligned_gpu_data_size_uses_device_limit() {
    let device = MockGraphicsDevice::with_limits(DeviceLimits {
        min_uniform_buffer_offset_alignment: 64,
        max_push_constants_size: 128,
    });
    // UBTransformData is a single mat4
    assert_eq!(device.aligned_gpu_data_size(64), 64);
    assert_eq!(device.aligned_gpu_data_size(80), 128);
}

// ============================================================================
// CONFIG TESTS
// ============================================================================

#[test]
fn test_config_defaults() {
    let config = Config::default();
    assert_eq!(config.enable_validation, cfg!(debug_assertions));
    assert_eq!(config.app_version, (1, 0, 0));
    assert_eq!(config.debug_severity, DebugSeverity::ErrorsAndWarnings);
    assert_eq!(config.debug_output, DebugOutput::Console);
    assert!(!config.panic_on_error);
}

#[test]
fn test_validation_stats_total() {
    let stats = ValidationStats { errors: 1, warnings: 2, info: 3, verbose: 4 };
    assert_eq!(stats.total(), 10);
    assert_eq!(ValidationStats::default().total(), 0);
}
