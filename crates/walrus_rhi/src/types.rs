//! Shared descriptor types and flag sets.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use serde::Deserialize;

use crate::handle::TextureHandle;

/// Pipeline stage of a shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ShaderType {
    /// Compute shader.
    Compute = 0,
    /// Vertex shader.
    Vertex = 1,
    /// Geometry shader.
    Geometry = 2,
    /// Fragment shader.
    Fragment = 3,
}

impl ShaderType {
    /// Decodes a serialized stage.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Compute),
            1 => Some(Self::Vertex),
            2 => Some(Self::Geometry),
            3 => Some(Self::Fragment),
            _ => None,
        }
    }
}

/// Value type of a uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum UniformType {
    /// Texture unit index.
    Sampler = 0,
    /// Boolean stored as 32 bits.
    Bool = 1,
    /// Signed 32-bit integer.
    Int = 2,
    /// Unsigned 32-bit integer.
    Uint = 3,
    /// 32-bit float.
    Float = 4,
    /// Two floats.
    Vec2 = 5,
    /// Three floats.
    Vec3 = 6,
    /// Four floats.
    Vec4 = 7,
    /// 3x3 float matrix.
    Mat3 = 8,
    /// 4x4 float matrix.
    Mat4 = 9,
}

impl UniformType {
    /// Decodes a serialized uniform type.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Sampler,
            1 => Self::Bool,
            2 => Self::Int,
            3 => Self::Uint,
            4 => Self::Float,
            5 => Self::Vec2,
            6 => Self::Vec3,
            7 => Self::Vec4,
            8 => Self::Mat3,
            9 => Self::Mat4,
            _ => return None,
        })
    }

    /// Size of one element in bytes.
    #[must_use]
    pub const fn size(self) -> u32 {
        match self {
            Self::Sampler | Self::Bool | Self::Int | Self::Uint | Self::Float => 4,
            Self::Vec2 => 8,
            Self::Vec3 => 12,
            Self::Vec4 => 16,
            Self::Mat3 => 36,
            Self::Mat4 => 64,
        }
    }
}

/// Texel format of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum TextureFormat {
    R8 = 0,
    Rg8,
    Rgb8,
    Rgba8,
    R16F,
    Rg16F,
    Rgba16F,
    R32F,
    Rg32F,
    Rgb32F,
    Rgba32F,
    R32Ui,
    Depth16,
    Depth24,
    Depth24Stencil8,
    Depth32F,
    Stencil8,
}

impl TextureFormat {
    const ALL: [Self; 17] = [
        Self::R8,
        Self::Rg8,
        Self::Rgb8,
        Self::Rgba8,
        Self::R16F,
        Self::Rg16F,
        Self::Rgba16F,
        Self::R32F,
        Self::Rg32F,
        Self::Rgb32F,
        Self::Rgba32F,
        Self::R32Ui,
        Self::Depth16,
        Self::Depth24,
        Self::Depth24Stencil8,
        Self::Depth32F,
        Self::Stencil8,
    ];

    /// Decodes a serialized format.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(usize::from(value)).copied()
    }

    /// Bytes per texel.
    #[must_use]
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::R8 | Self::Stencil8 => 1,
            Self::Rg8 | Self::R16F | Self::Depth16 => 2,
            Self::Rgb8 | Self::Depth24 => 3,
            Self::Rgba8
            | Self::Rg16F
            | Self::R32F
            | Self::R32Ui
            | Self::Depth24Stencil8
            | Self::Depth32F => 4,
            Self::Rgba16F | Self::Rg32F => 8,
            Self::Rgb32F => 12,
            Self::Rgba32F => 16,
        }
    }

    /// Returns true for depth and stencil formats.
    #[must_use]
    pub const fn is_depth(self) -> bool {
        matches!(
            self,
            Self::Depth16 | Self::Depth24 | Self::Depth24Stencil8 | Self::Depth32F | Self::Stencil8
        )
    }
}

/// Size of a texture or view relative to the backbuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BackbufferRatio {
    /// Same size as the backbuffer.
    Equal = 0,
    /// Half.
    Half = 1,
    /// Quarter.
    Quarter = 2,
    /// Eighth.
    Eighth = 3,
    /// Sixteenth.
    Sixteenth = 4,
    /// Double.
    Double = 5,
}

impl BackbufferRatio {
    /// Decodes a serialized ratio.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Equal,
            1 => Self::Half,
            2 => Self::Quarter,
            3 => Self::Eighth,
            4 => Self::Sixteenth,
            5 => Self::Double,
            _ => return None,
        })
    }

    /// Applies the ratio to a resolution. Never yields a zero dimension.
    #[must_use]
    pub const fn apply(self, resolution: Resolution) -> (u32, u32) {
        let (w, h) = (resolution.width, resolution.height);
        let (w, h) = match self {
            Self::Equal => (w, h),
            Self::Half => (w / 2, h / 2),
            Self::Quarter => (w / 4, h / 4),
            Self::Eighth => (w / 8, h / 8),
            Self::Sixteenth => (w / 16, h / 16),
            Self::Double => (w * 2, h * 2),
        };
        (if w == 0 { 1 } else { w }, if h == 0 { 1 } else { h })
    }
}

/// Backbuffer size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Resolution {
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self { width: 1280, height: 720 }
    }
}

/// Integer rectangle in pixels, origin at the top left.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    /// Left edge.
    pub x: u16,
    /// Top edge.
    pub y: u16,
    /// Width.
    pub width: u16,
    /// Height.
    pub height: u16,
}

impl Rect {
    /// Creates a rectangle.
    #[must_use]
    pub const fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self { x, y, width, height }
    }

    /// Returns true if the rectangle covers no pixels.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Intersection of two rectangles, zero sized if they do not overlap.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = (u32::from(self.x) + u32::from(self.width))
            .min(u32::from(other.x) + u32::from(other.width));
        let y1 = (u32::from(self.y) + u32::from(self.height))
            .min(u32::from(other.y) + u32::from(other.height));
        Self {
            x: x0,
            y: y0,
            width: x1.saturating_sub(u32::from(x0)) as u16,
            height: y1.saturating_sub(u32::from(y0)) as u16,
        }
    }
}

/// Access mode of an image or storage buffer binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// Read only.
    Read,
    /// Write only.
    Write,
    /// Read and write.
    ReadWrite,
}

bitflags! {
    /// What a view clears on first use.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ClearFlags: u16 {
        /// Clear color.
        const COLOR = 0x0001;
        /// Clear depth.
        const DEPTH = 0x0002;
        /// Clear stencil.
        const STENCIL = 0x0004;
        /// Discard framebuffer attachment 0.
        const DISCARD_COLOR_0 = 0x0008;
        /// Discard framebuffer attachment 1.
        const DISCARD_COLOR_1 = 0x0010;
        /// Discard framebuffer attachment 2.
        const DISCARD_COLOR_2 = 0x0020;
        /// Discard framebuffer attachment 3.
        const DISCARD_COLOR_3 = 0x0040;
        /// Discard framebuffer attachment 4.
        const DISCARD_COLOR_4 = 0x0080;
        /// Discard framebuffer attachment 5.
        const DISCARD_COLOR_5 = 0x0100;
        /// Discard framebuffer attachment 6.
        const DISCARD_COLOR_6 = 0x0200;
        /// Discard framebuffer attachment 7.
        const DISCARD_COLOR_7 = 0x0400;
        /// Discard the depth attachment.
        const DISCARD_DEPTH = 0x0800;
        /// Discard the stencil attachment.
        const DISCARD_STENCIL = 0x1000;
        /// Every color discard bit.
        const DISCARD_COLOR_MASK = 0x07f8;
        /// Every discard bit.
        const DISCARD_MASK = 0x1ff8;
    }
}

bitflags! {
    /// Which parts of the pending draw state `submit` clears afterwards.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DiscardFlags: u8 {
        /// Texture, image and buffer bindings.
        const BINDINGS = 0x01;
        /// Index buffer.
        const INDEX_BUFFER = 0x02;
        /// Instance data.
        const INSTANCE_DATA = 0x04;
        /// Render state, stencil, scissor and uniform range.
        const STATE = 0x08;
        /// Model transform.
        const TRANSFORM = 0x10;
        /// Vertex streams.
        const VERTEX_STREAMS = 0x20;
        /// Everything.
        const ALL = 0x3f;
    }
}

bitflags! {
    /// Buffer creation flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferFlags: u16 {
        /// Read by compute shaders.
        const COMPUTE_READ = 0x0100;
        /// Written by compute shaders.
        const COMPUTE_WRITE = 0x0200;
        /// Holds draw indirect commands.
        const DRAW_INDIRECT = 0x0400;
        /// May be resized by an update.
        const ALLOW_RESIZE = 0x0800;
        /// Index buffer.
        const INDEX = 0x1000;
        /// Uniform block buffer.
        const UNIFORM_BLOCK = 0x2000;
        /// Read back by the application.
        const CLIENT_READ = 0x4000;
        /// Read and written by compute shaders.
        const COMPUTE_READ_WRITE = 0x0300;
    }
}

bitflags! {
    /// Texture creation flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextureFlags: u64 {
        /// Sampled with MSAA.
        const MSAA_SAMPLE = 0x0000_0008_0000_0000;
        /// Render target without MSAA.
        const RT = 0x0000_0010_0000_0000;
        /// Render target, MSAA x2.
        const RT_MSAA_X2 = 0x0000_0020_0000_0000;
        /// Render target, MSAA x4.
        const RT_MSAA_X4 = 0x0000_0030_0000_0000;
        /// Render target, MSAA x8.
        const RT_MSAA_X8 = 0x0000_0040_0000_0000;
        /// Render target, MSAA x16.
        const RT_MSAA_X16 = 0x0000_0050_0000_0000;
        /// Render target is never sampled.
        const RT_WRITE_ONLY = 0x0000_0080_0000_0000;
        /// Written by compute shaders.
        const COMPUTE_WRITE = 0x0000_1000_0000_0000;
        /// Sampled as sRGB.
        const SRGB = 0x0000_2000_0000_0000;
        /// Blit destination.
        const BLIT_DST = 0x0000_4000_0000_0000;
    }
}

impl TextureFlags {
    const RT_MSAA_SHIFT: u32 = 36;
    const RT_MSAA_MASK: u64 = 0x0000_0070_0000_0000;

    /// Returns true if the texture is a render target.
    #[must_use]
    pub const fn is_render_target(self) -> bool {
        self.bits() & 0x0000_00f0_0000_0000 != 0
    }

    /// MSAA sample count of a render target (1 without MSAA).
    #[must_use]
    pub const fn msaa_samples(self) -> u32 {
        let index = (self.bits() & Self::RT_MSAA_MASK) >> Self::RT_MSAA_SHIFT;
        if index <= 1 {
            1
        } else {
            1 << (index - 1)
        }
    }
}

bitflags! {
    /// Sampler state passed with a texture binding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SamplerFlags: u32 {
        /// Wrap U: mirror.
        const U_MIRROR = 0x0000_0001;
        /// Wrap U: clamp.
        const U_CLAMP = 0x0000_0002;
        /// Wrap V: mirror.
        const V_MIRROR = 0x0000_0004;
        /// Wrap V: clamp.
        const V_CLAMP = 0x0000_0008;
        /// Wrap W: mirror.
        const W_MIRROR = 0x0000_0010;
        /// Wrap W: clamp.
        const W_CLAMP = 0x0000_0020;
        /// Minify: nearest.
        const MIN_NEAREST = 0x0000_0040;
        /// Minify: linear.
        const MIN_LINEAR = 0x0000_0080;
        /// Magnify: nearest.
        const MAG_NEAREST = 0x0000_0100;
        /// Magnify: linear.
        const MAG_LINEAR = 0x0000_0200;
        /// Mip: nearest.
        const MIP_NEAREST = 0x0000_0400;
        /// Mip: linear.
        const MIP_LINEAR = 0x0000_0800;
        /// Sample stencil instead of depth.
        const SAMPLE_STENCIL = 0x0010_0000;
        /// Nearest everywhere.
        const NEAREST = 0x0000_0540;
        /// Linear everywhere.
        const LINEAR = 0x0000_0a80;
        /// Clamp on every axis.
        const UVW_CLAMP = 0x0000_002a;
    }
}

/// Description of a texture to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureCreateInfo {
    /// Width in texels. Ignored for ratio-sized textures.
    pub width: u32,
    /// Height in texels. Ignored for ratio-sized textures.
    pub height: u32,
    /// Depth for 3D textures, 1 otherwise.
    pub depth: u32,
    /// Array layers.
    pub num_layers: u16,
    /// Mip levels.
    pub num_mipmaps: u8,
    /// Texel format.
    pub format: TextureFormat,
    /// Creation flags.
    pub flags: TextureFlags,
    /// Size relative to the backbuffer, tracked across resolution changes.
    pub ratio: Option<BackbufferRatio>,
    /// Six-faced cube map.
    pub cube_map: bool,
}

impl TextureCreateInfo {
    /// A plain 2D texture.
    #[must_use]
    pub const fn new_2d(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            width,
            height,
            depth: 1,
            num_layers: 1,
            num_mipmaps: 1,
            format,
            flags: TextureFlags::empty(),
            ratio: None,
            cube_map: false,
        }
    }

    /// A 2D texture sized relative to the backbuffer.
    #[must_use]
    pub const fn with_ratio(ratio: BackbufferRatio, format: TextureFormat) -> Self {
        let mut info = Self::new_2d(0, 0, format);
        info.ratio = Some(ratio);
        info
    }

    /// Sets the creation flags.
    #[must_use]
    pub const fn flags(mut self, flags: TextureFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Size of the top mip level in bytes.
    #[must_use]
    pub const fn level0_size(&self) -> u64 {
        let faces = if self.cube_map { 6 } else { 1 };
        self.width as u64
            * self.height as u64
            * self.depth as u64
            * self.num_layers as u64
            * faces
            * self.format.bytes_per_pixel() as u64
    }
}

/// One framebuffer attachment.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct Attachment {
    /// Attached texture.
    pub handle: TextureHandle,
    /// Mip level.
    pub mip: u16,
    /// First layer.
    pub layer: u16,
    /// Number of layers.
    pub num_layers: u16,
}

impl Attachment {
    /// Attaches mip 0, layer 0 of `handle`.
    #[must_use]
    pub const fn new(handle: TextureHandle) -> Self {
        Self { handle, mip: 0, layer: 0, num_layers: 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_never_zero() {
        let tiny = Resolution { width: 10, height: 6 };
        assert_eq!(BackbufferRatio::Sixteenth.apply(tiny), (1, 1));
        assert_eq!(BackbufferRatio::Half.apply(tiny), (5, 3));
        assert_eq!(BackbufferRatio::Double.apply(tiny), (20, 12));
    }

    #[test]
    fn test_rect_intersect() {
        let a = Rect::new(0, 0, 100, 100);
        let b = Rect::new(50, 60, 100, 100);
        assert_eq!(a.intersect(&b), Rect::new(50, 60, 50, 40));

        let c = Rect::new(200, 200, 10, 10);
        assert!(a.intersect(&c).is_zero());
    }

    #[test]
    fn test_msaa_samples() {
        assert_eq!(TextureFlags::RT.msaa_samples(), 1);
        assert_eq!(TextureFlags::RT_MSAA_X4.msaa_samples(), 4);
        assert_eq!(TextureFlags::RT_MSAA_X16.msaa_samples(), 16);
        assert!(TextureFlags::RT_MSAA_X2.is_render_target());
        assert!(!TextureFlags::SRGB.is_render_target());
    }

    #[test]
    fn test_format_round_trip() {
        for value in 0..17u8 {
            let format = TextureFormat::from_u8(value).unwrap();
            assert_eq!(format as u8, value);
        }
        assert!(TextureFormat::from_u8(17).is_none());
    }

    #[test]
    fn test_uniform_sizes() {
        assert_eq!(UniformType::Mat4.size(), 64);
        assert_eq!(UniformType::from_u8(7), Some(UniformType::Vec4));
    }
}
