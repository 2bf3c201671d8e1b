//! # Typed Resource Handles
//!
//! Every GPU resource is named by a `u16` wrapped in a per-kind newtype, so
//! a texture handle can never be passed where a buffer is expected. The
//! context owns the mapping from handle to resource; callers only ever hold
//! the integer.

use bytemuck::{Pod, Zeroable};
use walrus_core::INVALID_HANDLE;

/// The kinds of resources the RHI manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Shader stage.
    Shader,
    /// Linked program.
    Program,
    /// Named uniform.
    Uniform,
    /// Vertex layout.
    VertexLayout,
    /// Vertex, index or storage buffer.
    Buffer,
    /// Texture.
    Texture,
    /// Framebuffer.
    Framebuffer,
}

impl ResourceKind {
    /// All kinds, in registry order.
    pub const ALL: [Self; 7] = [
        Self::Shader,
        Self::Program,
        Self::Uniform,
        Self::VertexLayout,
        Self::Buffer,
        Self::Texture,
        Self::Framebuffer,
    ];

    /// Position in [`ResourceKind::ALL`].
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Lowercase name used in logs and error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Shader => "shader",
            Self::Program => "program",
            Self::Uniform => "uniform",
            Self::VertexLayout => "vertex layout",
            Self::Buffer => "buffer",
            Self::Texture => "texture",
            Self::Framebuffer => "framebuffer",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Common interface of the typed handles.
pub trait RhiHandle: Copy + Eq + std::hash::Hash + std::fmt::Debug {
    /// Kind of resource this handle names.
    const KIND: ResourceKind;

    /// Raw id.
    fn id(self) -> u16;

    /// Wraps a raw id.
    fn from_id(id: u16) -> Self;

    /// Returns false for the invalid sentinel.
    fn is_valid(self) -> bool {
        self.id() != INVALID_HANDLE
    }
}

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident => $kind:ident) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable)]
        pub struct $name(pub u16);

        impl $name {
            /// Sentinel that never names a live resource.
            pub const INVALID: Self = Self(INVALID_HANDLE);

            /// Raw id.
            #[inline]
            #[must_use]
            pub const fn id(self) -> u16 {
                self.0
            }

            /// Returns false for [`Self::INVALID`].
            #[inline]
            #[must_use]
            pub const fn is_valid(self) -> bool {
                self.0 != INVALID_HANDLE
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::INVALID
            }
        }

        impl RhiHandle for $name {
            const KIND: ResourceKind = ResourceKind::$kind;

            #[inline]
            fn id(self) -> u16 {
                self.0
            }

            #[inline]
            fn from_id(id: u16) -> Self {
                Self(id)
            }
        }
    };
}

define_handle!(
    /// Handle to a compiled shader stage.
    ShaderHandle => Shader
);
define_handle!(
    /// Handle to a linked program.
    ProgramHandle => Program
);
define_handle!(
    /// Handle to a named uniform.
    UniformHandle => Uniform
);
define_handle!(
    /// Handle to a vertex layout.
    VertexLayoutHandle => VertexLayout
);
define_handle!(
    /// Handle to a GPU buffer.
    BufferHandle => Buffer
);
define_handle!(
    /// Handle to a texture.
    TextureHandle => Texture
);
define_handle!(
    /// Handle to a framebuffer.
    FramebufferHandle => Framebuffer
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_invalid() {
        assert!(!TextureHandle::default().is_valid());
        assert_eq!(ShaderHandle::default(), ShaderHandle::INVALID);
        assert!(BufferHandle(0).is_valid());
    }

    #[test]
    fn test_trait_round_trip() {
        fn through_trait<H: RhiHandle>(id: u16) -> (ResourceKind, u16) {
            let h = H::from_id(id);
            (H::KIND, h.id())
        }
        assert_eq!(through_trait::<ProgramHandle>(9), (ResourceKind::Program, 9));
        assert_eq!(
            through_trait::<VertexLayoutHandle>(3),
            (ResourceKind::VertexLayout, 3)
        );
    }

    #[test]
    fn test_handles_are_two_bytes() {
        assert_eq!(std::mem::size_of::<FramebufferHandle>(), 2);
        assert_eq!(bytemuck::bytes_of(&UniformHandle(0x0102)), &0x0102u16.to_ne_bytes());
    }
}
