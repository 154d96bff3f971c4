//! Error types for RightEngine
//!
//! This module defines the error taxonomy shared by the RHI, the backends
//! and the scene renderer. Every resource creation and pass encoding call
//! returns `Result<T>` so callers decide whether to propagate or recover.

use std::fmt;

/// Result type for RightEngine operations
pub type Result<T> = std::result::Result<T, Error>;

/// RightEngine errors
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Backend-specific error (Vulkan call failure, lost device, etc.)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Invalid resource (texture, buffer, shader, pipeline, etc.)
    InvalidResource(String),

    /// Initialization failed (device, swapchain, scene renderer)
    InitializationFailed(String),

    /// Shader stages disagree on their reflected bindings
    ShaderReflection(String),

    /// More lights submitted than the light uniform can hold
    LightCapExceeded {
        /// Number of lights submitted
        count: usize,
        /// Capacity of the light uniform
        max: usize,
    },

    /// Offset, pixel or range outside of a resource
    OutOfBounds(String),

    /// A required callback was never installed
    MissingCallback(String),

    /// Object initialized twice
    AlreadyInitialized(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::ShaderReflection(msg) => write!(f, "Shader reflection error: {}", msg),
            Error::LightCapExceeded { count, max } => {
                write!(f, "Light cap exceeded: {} lights submitted, maximum is {}", count, max)
            }
            Error::OutOfBounds(msg) => write!(f, "Out of bounds: {}", msg),
            Error::MissingCallback(msg) => write!(f, "Missing callback: {}", msg),
            Error::AlreadyInitialized(msg) => write!(f, "Already initialized: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
