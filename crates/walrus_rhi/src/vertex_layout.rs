//! # Vertex Layouts
//!
//! Describes how attributes are packed into a vertex stream. A layout is
//! built once with [`VertexLayoutBuilder`], then deduplicated by its
//! structural hash when registered with the context.
//!
//! ```rust
//! use walrus_rhi::{AttribType, VertexLayout};
//!
//! let layout = VertexLayout::begin()
//!     .add(3, AttribType::Float, false) // position
//!     .add(4, AttribType::Uint8, true) // color
//!     .end();
//! assert_eq!(layout.stride(), 16);
//! ```

use std::hash::Hasher;

use bytemuck::{Pod, Zeroable};
use siphasher::sip::SipHasher24;

use crate::limits::MAX_VERTEX_ATTRIBUTES;

/// Component type of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AttribType {
    /// Signed byte.
    Int8 = 0,
    /// Unsigned byte.
    Uint8 = 1,
    /// Signed 16-bit.
    Int16 = 2,
    /// Unsigned 16-bit.
    Uint16 = 3,
    /// Signed 32-bit.
    Int32 = 4,
    /// Unsigned 32-bit.
    Uint32 = 5,
    /// 32-bit float.
    Float = 6,
    /// Four floats aligned to 16 bytes.
    Vec4 = 7,
    /// 4x4 float matrix, added as four `Vec4` attributes.
    Mat4 = 8,
}

impl AttribType {
    const ALL: [Self; 9] = [
        Self::Int8,
        Self::Uint8,
        Self::Int16,
        Self::Uint16,
        Self::Int32,
        Self::Uint32,
        Self::Float,
        Self::Vec4,
        Self::Mat4,
    ];

    /// Decodes a type from its index.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(usize::from(value)).copied()
    }

    /// Byte size of `num` components.
    const fn stride(self, num: u8) -> u16 {
        const STRIDE: [[u16; 4]; 9] = [
            [1, 2, 4, 4],
            [1, 2, 4, 4],
            [2, 4, 6, 8],
            [2, 4, 6, 8],
            [4, 8, 12, 16],
            [4, 8, 12, 16],
            [4, 8, 12, 16],
            [16, 16, 16, 16],
            [16, 16, 16, 16],
        ];
        STRIDE[self as usize][(num - 1) as usize]
    }

    /// Required alignment in bytes.
    const fn align(self) -> u8 {
        match self {
            Self::Int8 | Self::Uint8 => 1,
            Self::Int16 | Self::Uint16 => 2,
            Self::Int32 | Self::Uint32 | Self::Float => 4,
            Self::Vec4 | Self::Mat4 => 16,
        }
    }
}

/// A decoded attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attribute {
    /// Shader attribute location.
    pub location: u8,
    /// Component count, 1 to 4.
    pub num: u8,
    /// Component type.
    pub ty: AttribType,
    /// Integer components are normalized to `[0, 1]` or `[-1, 1]`.
    pub normalized: bool,
    /// Components are passed to the shader as integers.
    pub as_int: bool,
    /// Byte offset inside the vertex.
    pub offset: u16,
}

/// Attribute packing of one vertex stream.
///
/// `Pod` so it can be copied verbatim into a command buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct VertexLayout {
    hash: u64,
    attributes: [u16; MAX_VERTEX_ATTRIBUTES],
    offsets: [u16; MAX_VERTEX_ATTRIBUTES],
    stride: u16,
    num_attributes: u8,
    instance_step: u8,
    align: u8,
    start_attr: u8,
    _pad: [u8; 2],
}

impl VertexLayout {
    /// Starts a per-vertex layout.
    #[must_use]
    pub fn begin() -> VertexLayoutBuilder {
        Self::begin_instance(0)
    }

    /// Starts a layout that advances once every `step` instances.
    /// A step of 0 advances per vertex.
    #[must_use]
    pub fn begin_instance(step: u8) -> VertexLayoutBuilder {
        let mut layout = Self::zeroed();
        layout.instance_step = step;
        layout.align = 4;
        VertexLayoutBuilder { layout }
    }

    /// Bytes per vertex.
    #[inline]
    #[must_use]
    pub const fn stride(&self) -> u16 {
        self.stride
    }

    /// Number of attributes.
    #[inline]
    #[must_use]
    pub const fn num_attributes(&self) -> u8 {
        self.num_attributes
    }

    /// Instance step, 0 for per-vertex data.
    #[inline]
    #[must_use]
    pub const fn instance_step(&self) -> u8 {
        self.instance_step
    }

    /// Structural hash used for deduplication.
    #[inline]
    #[must_use]
    pub const fn hash(&self) -> u64 {
        self.hash
    }

    /// Decodes attribute `index`.
    #[must_use]
    pub fn attribute(&self, index: usize) -> Option<Attribute> {
        if index >= usize::from(self.num_attributes) {
            return None;
        }
        let val = self.attributes[index];
        Some(Attribute {
            location: (val & 15) as u8,
            num: ((val >> 4) & 3) as u8 + 1,
            ty: AttribType::from_u8(((val >> 6) & 15) as u8)?,
            normalized: val & (1 << 10) != 0,
            as_int: val & (1 << 11) != 0,
            offset: self.offsets[index],
        })
    }

    /// Iterates the decoded attributes.
    pub fn attributes(&self) -> impl Iterator<Item = Attribute> + '_ {
        (0..usize::from(self.num_attributes)).filter_map(|i| self.attribute(i))
    }
}

/// Builder returned by [`VertexLayout::begin`].
#[derive(Debug, Clone, Copy)]
#[must_use]
pub struct VertexLayoutBuilder {
    layout: VertexLayout,
}

impl VertexLayoutBuilder {
    /// First shader location used by the following attributes.
    pub fn start_location(mut self, location: u8) -> Self {
        self.layout.start_attr = location;
        self
    }

    /// Adds an attribute of `num` components.
    pub fn add(self, num: u8, ty: AttribType, normalized: bool) -> Self {
        if ty == AttribType::Mat4 {
            (0..4).fold(self, |b, _| b.push(4, AttribType::Vec4, normalized, false))
        } else {
            self.push(num, ty, normalized, false)
        }
    }

    /// Adds an attribute passed to the shader as integers.
    pub fn add_int(self, num: u8, ty: AttribType) -> Self {
        self.push(num, ty, false, true)
    }

    fn push(mut self, num: u8, ty: AttribType, normalized: bool, as_int: bool) -> Self {
        debug_assert!((1..=4).contains(&num), "Invalid number of components: {num}");
        let num = num.clamp(1, 4);

        let layout = &mut self.layout;
        let index = usize::from(layout.num_attributes);
        if index >= MAX_VERTEX_ATTRIBUTES {
            tracing::warn!(max = MAX_VERTEX_ATTRIBUTES, "vertex layout attribute limit reached");
            return self;
        }

        let location = u16::from(layout.start_attr) + index as u16;
        layout.attributes[index] = (location & 15)
            | (u16::from(num - 1) & 3) << 4
            | (ty as u16 & 15) << 6
            | u16::from(normalized) << 10
            | u16::from(as_int) << 11;

        let align = ty.align();
        layout.align = layout.align.max(align);
        layout.offsets[index] = align_up(layout.stride, u16::from(align));
        layout.stride = layout.offsets[index] + ty.stride(num);
        layout.num_attributes += 1;
        self
    }

    /// Finishes the layout: pads the stride and computes the hash.
    #[must_use]
    pub fn end(self) -> VertexLayout {
        let mut layout = self.layout;
        layout.stride = align_up(layout.stride, u16::from(layout.align));
        layout.hash = 0;

        let mut hasher = SipHasher24::new_with_keys(0, 0);
        hasher.write(bytemuck::bytes_of(&layout));
        layout.hash = hasher.finish();
        layout
    }
}

const fn align_up(value: u16, align: u16) -> u16 {
    let rem = value % align;
    if rem == 0 {
        value
    } else {
        value + (align - rem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos_color() -> VertexLayout {
        VertexLayout::begin()
            .add(3, AttribType::Float, false)
            .add(4, AttribType::Uint8, true)
            .end()
    }

    #[test]
    fn test_stride_and_offsets() {
        let layout = pos_color();
        assert_eq!(layout.stride(), 16);
        assert_eq!(layout.num_attributes(), 2);

        let color = layout.attribute(1).unwrap();
        assert_eq!(color.offset, 12);
        assert_eq!(color.location, 1);
        assert_eq!(color.num, 4);
        assert_eq!(color.ty, AttribType::Uint8);
        assert!(color.normalized);
        assert!(!color.as_int);
    }

    #[test]
    fn test_alignment_padding() {
        // 1 byte then a float: the float starts at 4.
        let layout = VertexLayout::begin()
            .add(1, AttribType::Uint8, false)
            .add(1, AttribType::Float, false)
            .end();
        assert_eq!(layout.attribute(1).unwrap().offset, 4);
        assert_eq!(layout.stride(), 8);
    }

    #[test]
    fn test_mat4_expands_to_four_vec4() {
        let layout = VertexLayout::begin_instance(1)
            .start_location(4)
            .add(4, AttribType::Mat4, false)
            .end();
        assert_eq!(layout.num_attributes(), 4);
        assert_eq!(layout.stride(), 64);
        assert_eq!(layout.instance_step(), 1);
        let locations: Vec<u8> = layout.attributes().map(|a| a.location).collect();
        assert_eq!(locations, vec![4, 5, 6, 7]);
    }

    #[test]
    fn test_hash_is_structural() {
        assert_eq!(pos_color().hash(), pos_color().hash());

        let other = VertexLayout::begin()
            .add(3, AttribType::Float, false)
            .add(4, AttribType::Uint8, false)
            .end();
        assert_ne!(pos_color().hash(), other.hash());
    }

    #[test]
    fn test_int_attribute() {
        let layout = VertexLayout::begin().add_int(4, AttribType::Int16).end();
        let attr = layout.attribute(0).unwrap();
        assert!(attr.as_int);
        assert_eq!(layout.stride(), 8);
        assert!(layout.attribute(1).is_none());
    }
}
