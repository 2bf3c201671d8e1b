//! # RHI Error Types
//!
//! All recoverable errors the render hardware interface reports.
//! Programmer errors (double free, command stream overrun) are assertions,
//! not variants of this enum.

use thiserror::Error;

use crate::handle::ResourceKind;

/// Errors that can occur in the RHI.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RhiError {
    /// The backend failed to initialize.
    #[error("backend initialization failed: {0}")]
    BackendInit(String),

    /// Every handle of a resource kind is in use.
    #[error("{kind} handle pool exhausted")]
    HandleExhausted {
        /// The exhausted pool.
        kind: ResourceKind,
    },

    /// A handle does not name a live resource.
    #[error("invalid {kind} handle")]
    InvalidHandle {
        /// Kind of the offending handle.
        kind: ResourceKind,
    },

    /// A texture unit beyond the backend's capability was requested.
    #[error("texture unit {unit} out of range (max {max})")]
    TextureUnitOutOfRange {
        /// The requested unit.
        unit: u8,
        /// Number of units the backend supports.
        max: u8,
    },

    /// Not enough room left in the frame's transient arena.
    #[error("transient buffer exhausted: requested {requested}, available {available}")]
    TransientExhausted {
        /// Elements requested.
        requested: u32,
        /// Elements still available.
        available: u32,
    },

    /// Invalid configuration values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A configuration file could not be read or parsed.
    #[error("failed to read config {path}: {reason}")]
    ConfigRead {
        /// Path of the file.
        path: String,
        /// Underlying error message.
        reason: String,
    },

    /// The render thread could not be started or exited unexpectedly.
    #[error("render thread: {0}")]
    RenderThread(String),
}

/// Result type for RHI operations.
pub type RhiResult<T> = Result<T, RhiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = RhiError::HandleExhausted { kind: ResourceKind::Texture };
        assert_eq!(err.to_string(), "texture handle pool exhausted");

        let err = RhiError::TextureUnitOutOfRange { unit: 40, max: 32 };
        assert_eq!(err.to_string(), "texture unit 40 out of range (max 32)");
    }
}
