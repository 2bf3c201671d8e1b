//! # RHI Configuration
//!
//! Everything sized at startup: thread mode, handle pools, per-frame
//! limits and arena sizes. Loaded once from TOML, every field optional:
//!
//! ```toml
//! thread_mode = "single"
//! max_draw_calls = 4096
//! transient_vb_size = 1048576
//!
//! [handles]
//! textures = 512
//!
//! [resolution]
//! width = 1920
//! height = 1080
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{RhiError, RhiResult};
use crate::handle::ResourceKind;
use crate::limits::{
    MAX_BUFFERS, MAX_DRAW_CALLS, MAX_FRAMEBUFFERS, MAX_MATRIX_CACHE, MAX_PROGRAMS, MAX_SHADERS,
    MAX_TEXTURES, MAX_UNIFORMS, MAX_VERTEX_LAYOUTS,
};
use crate::types::Resolution;

/// Where frames are executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadMode {
    /// `frame()` executes the frame inline on the calling thread.
    Single,
    /// A dedicated render thread executes frame N while frame N+1 is built.
    #[default]
    Dual,
}

/// Handle pool size per resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HandleCapacities {
    /// Shader handles.
    pub shaders: u16,
    /// Program handles.
    pub programs: u16,
    /// Uniform handles.
    pub uniforms: u16,
    /// Vertex layout handles.
    pub vertex_layouts: u16,
    /// Buffer handles, including the transient buffers.
    pub buffers: u16,
    /// Texture handles.
    pub textures: u16,
    /// Framebuffer handles.
    pub framebuffers: u16,
}

impl Default for HandleCapacities {
    fn default() -> Self {
        Self {
            shaders: MAX_SHADERS,
            programs: MAX_PROGRAMS,
            uniforms: MAX_UNIFORMS,
            vertex_layouts: MAX_VERTEX_LAYOUTS,
            buffers: MAX_BUFFERS,
            textures: MAX_TEXTURES,
            framebuffers: MAX_FRAMEBUFFERS,
        }
    }
}

impl HandleCapacities {
    /// Configured capacity of `kind`.
    #[must_use]
    pub const fn get(&self, kind: ResourceKind) -> u16 {
        match kind {
            ResourceKind::Shader => self.shaders,
            ResourceKind::Program => self.programs,
            ResourceKind::Uniform => self.uniforms,
            ResourceKind::VertexLayout => self.vertex_layouts,
            ResourceKind::Buffer => self.buffers,
            ResourceKind::Texture => self.textures,
            ResourceKind::Framebuffer => self.framebuffers,
        }
    }

    /// Hard limit of `kind` imposed by the handle and key encodings.
    #[must_use]
    pub const fn limit(kind: ResourceKind) -> u16 {
        match kind {
            ResourceKind::Shader => MAX_SHADERS,
            ResourceKind::Program => MAX_PROGRAMS,
            ResourceKind::Uniform => MAX_UNIFORMS,
            ResourceKind::VertexLayout => MAX_VERTEX_LAYOUTS,
            ResourceKind::Buffer => MAX_BUFFERS,
            ResourceKind::Texture => MAX_TEXTURES,
            ResourceKind::Framebuffer => MAX_FRAMEBUFFERS,
        }
    }
}

/// RHI startup configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RhiConfig {
    /// Inline or render-thread execution.
    pub thread_mode: ThreadMode,
    /// Handle pool sizes.
    pub handles: HandleCapacities,
    /// Items recorded per frame before further submits are dropped.
    pub max_draw_calls: u32,
    /// Matrix cache slots per frame, including the identity at slot 0.
    pub max_matrices: u32,
    /// Transient vertex arena bytes per frame.
    pub transient_vb_size: u32,
    /// Transient index arena bytes per frame.
    pub transient_ib_size: u32,
    /// Bytes kept by each resource command buffer between frames.
    pub command_buffer_size: usize,
    /// Initial uniform log bytes per frame.
    pub uniform_buffer_size: usize,
    /// The uniform log grows once this many bytes or fewer remain.
    pub uniform_buffer_threshold: usize,
    /// Bytes added to the uniform log each time it grows.
    pub uniform_buffer_grow: usize,
    /// Initial backbuffer size.
    pub resolution: Resolution,
    /// How long shutdown waits for the render thread, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for RhiConfig {
    fn default() -> Self {
        Self {
            thread_mode: ThreadMode::Dual,
            handles: HandleCapacities::default(),
            max_draw_calls: MAX_DRAW_CALLS,
            max_matrices: MAX_MATRIX_CACHE,
            transient_vb_size: 6 << 20,
            transient_ib_size: 2 << 20,
            command_buffer_size: 64 << 10,
            uniform_buffer_size: 1 << 20,
            uniform_buffer_threshold: 64 << 10,
            uniform_buffer_grow: 1 << 20,
            resolution: Resolution::default(),
            shutdown_timeout_ms: 1_000,
        }
    }
}

impl RhiConfig {
    /// Default configuration executing frames on the calling thread.
    #[must_use]
    pub fn single_threaded() -> Self {
        Self { thread_mode: ThreadMode::Single, ..Self::default() }
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidConfig`] on syntax errors, unknown keys
    /// or out-of-range values.
    pub fn from_toml_str(source: &str) -> RhiResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| RhiError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ConfigRead`] if the file cannot be read, otherwise
    /// the errors of [`from_toml_str`](Self::from_toml_str).
    pub fn from_toml_file(path: impl AsRef<Path>) -> RhiResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| RhiError::ConfigRead {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        tracing::debug!(path = %path.display(), "loading rhi config");
        Self::from_toml_str(&source)
    }

    /// Checks every value against the hard limits.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidConfig`] naming the first bad value.
    pub fn validate(&self) -> RhiResult<()> {
        for kind in ResourceKind::ALL {
            let capacity = self.handles.get(kind);
            let limit = HandleCapacities::limit(kind);
            if capacity == 0 || capacity > limit {
                return Err(invalid(format!("{kind} capacity {capacity} outside 1..={limit}")));
            }
        }
        // Both frames own a transient vertex and index buffer.
        if self.handles.buffers < 5 {
            return Err(invalid("buffer capacity must leave room for the transient buffers"));
        }
        if self.max_draw_calls == 0 || self.max_draw_calls > MAX_DRAW_CALLS {
            return Err(invalid(format!(
                "max_draw_calls {} outside 1..={MAX_DRAW_CALLS}",
                self.max_draw_calls
            )));
        }
        if self.max_matrices == 0 || self.max_matrices > MAX_MATRIX_CACHE {
            return Err(invalid(format!(
                "max_matrices {} outside 1..={MAX_MATRIX_CACHE}",
                self.max_matrices
            )));
        }
        if self.transient_vb_size == 0 || self.transient_ib_size == 0 {
            return Err(invalid("transient buffer sizes must be non-zero"));
        }
        if self.command_buffer_size == 0 {
            return Err(invalid("command_buffer_size must be non-zero"));
        }
        if self.uniform_buffer_grow == 0
            || self.uniform_buffer_threshold >= self.uniform_buffer_size
        {
            return Err(invalid(
                "uniform buffer needs a non-zero grow step and a threshold below its size",
            ));
        }
        if self.resolution.width == 0 || self.resolution.height == 0 {
            return Err(invalid("resolution must be non-zero"));
        }
        Ok(())
    }

    /// Shutdown wait as a [`Duration`].
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

fn invalid(reason: impl Into<String>) -> RhiError {
    RhiError::InvalidConfig(reason.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(RhiConfig::default().validate().is_ok());
        assert_eq!(RhiConfig::single_threaded().thread_mode, ThreadMode::Single);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RhiConfig::from_toml_str(
            r#"
            thread_mode = "single"
            max_draw_calls = 128

            [handles]
            textures = 64

            [resolution]
            width = 640
            height = 480
            "#,
        )
        .unwrap();

        assert_eq!(config.thread_mode, ThreadMode::Single);
        assert_eq!(config.max_draw_calls, 128);
        assert_eq!(config.handles.textures, 64);
        assert_eq!(config.handles.shaders, MAX_SHADERS);
        assert_eq!(config.resolution, Resolution { width: 640, height: 480 });
        assert_eq!(config.transient_vb_size, RhiConfig::default().transient_vb_size);
    }

    #[test]
    fn test_rejects_program_capacity_above_key_limit() {
        let err = RhiConfig::from_toml_str("[handles]\nprograms = 512").unwrap_err();
        assert!(matches!(err, RhiError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_unknown_keys() {
        assert!(RhiConfig::from_toml_str("max_draws = 5").is_err());
    }

    #[test]
    fn test_rejects_bad_uniform_threshold() {
        let config = RhiConfig {
            uniform_buffer_size: 1024,
            uniform_buffer_threshold: 1024,
            ..RhiConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = RhiConfig::from_toml_file("/nonexistent/walrus.toml").unwrap_err();
        assert!(matches!(err, RhiError::ConfigRead { .. }));
    }
}
