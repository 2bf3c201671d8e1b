//! # Render and Stencil State Codecs
//!
//! Draw state travels through the frame as packed integers so the backend
//! can detect changes between consecutive items with a single XOR. The
//! structs here are the only code that knows the bit layout.
//!
//! ## RenderState layout (LSB first)
//!
//! ```text
//! bits  0..5   write mask (R G B A Z)
//! bits  5..9   depth test, 0 = disabled
//! bits  9..25  blend factors src_rgb, dst_rgb, src_alpha, dst_alpha, 0 = disabled
//! bits 25..28  blend equation
//! bits 28..30  cull mode
//! bits 30..33  primitive type
//! bit  33      msaa
//! bit  34      wireframe
//! ```
//!
//! ## StencilState layout (one face, LSB first)
//!
//! ```text
//! bits  0..8   reference value
//! bits  8..16  read mask
//! bits 16..20  test function, 0 = disabled
//! bits 20..24  stencil fail op
//! bits 24..28  depth fail op
//! bits 28..32  depth pass op
//! ```

use bitflags::bitflags;

bitflags! {
    /// Color and depth write mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WriteMask: u8 {
        /// Red channel.
        const R = 0x01;
        /// Green channel.
        const G = 0x02;
        /// Blue channel.
        const B = 0x04;
        /// Alpha channel.
        const A = 0x08;
        /// Depth.
        const Z = 0x10;
        /// All color channels.
        const RGB = 0x07;
        /// Everything.
        const ALL = 0x1f;
    }
}

macro_rules! indexed_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            const VARIANTS: &'static [Self] = &[$(Self::$variant),+];

            /// Decodes a variant from its index.
            #[must_use]
            pub fn from_index(index: u64) -> Option<Self> {
                usize::try_from(index).ok().and_then(|i| Self::VARIANTS.get(i).copied())
            }

            /// Index of the variant.
            #[must_use]
            pub const fn index(self) -> u64 {
                self as u64
            }
        }
    };
}

indexed_enum!(
    /// Depth and stencil comparison function.
    CompareFunc {
        /// Pass if less.
        Less,
        /// Pass if less or equal.
        LessEqual,
        /// Pass if equal.
        Equal,
        /// Pass if greater or equal.
        GreaterEqual,
        /// Pass if greater.
        Greater,
        /// Pass if not equal.
        NotEqual,
        /// Never pass.
        Never,
        /// Always pass.
        Always,
    }
);

indexed_enum!(
    /// Blend factor.
    BlendFactor {
        /// 0.
        Zero,
        /// 1.
        One,
        /// Source color.
        SrcColor,
        /// 1 - source color.
        InvSrcColor,
        /// Source alpha.
        SrcAlpha,
        /// 1 - source alpha.
        InvSrcAlpha,
        /// Destination alpha.
        DstAlpha,
        /// 1 - destination alpha.
        InvDstAlpha,
        /// Destination color.
        DstColor,
        /// 1 - destination color.
        InvDstColor,
        /// Saturated source alpha.
        SrcAlphaSat,
        /// The draw's blend factor constant.
        Factor,
        /// 1 - the draw's blend factor constant.
        InvFactor,
    }
);

impl BlendFactor {
    /// Returns true if the factor reads an alpha channel.
    #[must_use]
    pub const fn uses_alpha(self) -> bool {
        matches!(
            self,
            Self::SrcAlpha | Self::InvSrcAlpha | Self::DstAlpha | Self::InvDstAlpha | Self::SrcAlphaSat
        )
    }
}

indexed_enum!(
    /// Blend equation.
    BlendEquation {
        /// src + dst.
        Add,
        /// src - dst.
        Sub,
        /// dst - src.
        RevSub,
        /// min(src, dst).
        Min,
        /// max(src, dst).
        Max,
    }
);

indexed_enum!(
    /// Face culling.
    CullMode {
        /// No culling.
        None,
        /// Cull clockwise faces.
        Cw,
        /// Cull counter-clockwise faces.
        Ccw,
    }
);

indexed_enum!(
    /// Primitive topology.
    PrimitiveType {
        /// Triangle list.
        Triangles,
        /// Triangle strip.
        TriangleStrip,
        /// Line list.
        Lines,
        /// Line strip.
        LineStrip,
        /// Points.
        Points,
    }
);

indexed_enum!(
    /// Stencil operation.
    StencilOp {
        /// Set to zero.
        Zero,
        /// Keep the current value.
        Keep,
        /// Replace with the reference value.
        Replace,
        /// Increment and wrap.
        Incr,
        /// Increment and clamp.
        IncrSat,
        /// Decrement and wrap.
        Decr,
        /// Decrement and clamp.
        DecrSat,
        /// Bitwise invert.
        Invert,
    }
);

/// Source and destination factors for RGB and alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendFunc {
    /// Source RGB factor.
    pub src_rgb: BlendFactor,
    /// Destination RGB factor.
    pub dst_rgb: BlendFactor,
    /// Source alpha factor.
    pub src_alpha: BlendFactor,
    /// Destination alpha factor.
    pub dst_alpha: BlendFactor,
}

impl BlendFunc {
    /// Same factors for RGB and alpha.
    #[must_use]
    pub const fn new(src: BlendFactor, dst: BlendFactor) -> Self {
        Self { src_rgb: src, dst_rgb: dst, src_alpha: src, dst_alpha: dst }
    }

    /// Classic `src * a + dst * (1 - a)`.
    pub const ALPHA: Self = Self::new(BlendFactor::SrcAlpha, BlendFactor::InvSrcAlpha);

    /// Additive.
    pub const ADD: Self = Self::new(BlendFactor::One, BlendFactor::One);

    /// Multiplicative.
    pub const MULTIPLY: Self = Self::new(BlendFactor::DstColor, BlendFactor::Zero);
}

/// Fixed-function pipeline state of one draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderState {
    /// Channels written.
    pub write: WriteMask,
    /// Depth test, `None` disables it.
    pub depth_test: Option<CompareFunc>,
    /// Blending, `None` disables it.
    pub blend: Option<BlendFunc>,
    /// Blend equation.
    pub blend_equation: BlendEquation,
    /// Culling.
    pub cull: CullMode,
    /// Topology.
    pub primitive: PrimitiveType,
    /// Multisampling.
    pub msaa: bool,
    /// Wireframe rasterization.
    pub wireframe: bool,
}

impl Default for RenderState {
    /// Write everything, depth test less, cull clockwise, MSAA on.
    fn default() -> Self {
        Self {
            write: WriteMask::ALL,
            depth_test: Some(CompareFunc::Less),
            blend: None,
            blend_equation: BlendEquation::Add,
            cull: CullMode::Cw,
            primitive: PrimitiveType::Triangles,
            msaa: true,
            wireframe: false,
        }
    }
}

const WRITE_SHIFT: u32 = 0;
const DEPTH_SHIFT: u32 = 5;
const BLEND_SHIFT: u32 = 9;
const EQUATION_SHIFT: u32 = 25;
const CULL_SHIFT: u32 = 28;
const PRIMITIVE_SHIFT: u32 = 30;
const MSAA_BIT: u64 = 1 << 33;
const WIREFRAME_BIT: u64 = 1 << 34;

/// Mask of the blend factor bits in an encoded state.
pub const STATE_BLEND_MASK: u64 = 0xffff << BLEND_SHIFT;
/// Mask of the depth test bits in an encoded state.
pub const STATE_DEPTH_MASK: u64 = 0xf << DEPTH_SHIFT;
/// Mask of the cull bits in an encoded state.
pub const STATE_CULL_MASK: u64 = 0x3 << CULL_SHIFT;
/// Mask of the primitive bits in an encoded state.
pub const STATE_PRIMITIVE_MASK: u64 = 0x7 << PRIMITIVE_SHIFT;

impl RenderState {
    /// State that writes nothing and tests nothing.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            write: WriteMask::empty(),
            depth_test: None,
            blend: None,
            blend_equation: BlendEquation::Add,
            cull: CullMode::None,
            primitive: PrimitiveType::Triangles,
            msaa: false,
            wireframe: false,
        }
    }

    /// Sets the blend function.
    #[must_use]
    pub const fn with_blend(mut self, blend: BlendFunc) -> Self {
        self.blend = Some(blend);
        self
    }

    /// Sets the depth test.
    #[must_use]
    pub const fn with_depth_test(mut self, func: Option<CompareFunc>) -> Self {
        self.depth_test = func;
        self
    }

    /// Sets the primitive type.
    #[must_use]
    pub const fn with_primitive(mut self, primitive: PrimitiveType) -> Self {
        self.primitive = primitive;
        self
    }

    /// Sort class used by the default view mode: 0 opaque, 1 blended
    /// without alpha, 2 alpha blended.
    #[must_use]
    pub const fn blend_class(&self) -> u8 {
        match self.blend {
            None => 0,
            Some(f) if f.src_rgb.uses_alpha() || f.dst_rgb.uses_alpha() => 2,
            Some(_) => 1,
        }
    }

    /// Packs the state into 64 bits.
    #[must_use]
    pub fn encode(&self) -> u64 {
        let mut bits = u64::from(self.write.bits()) << WRITE_SHIFT;
        if let Some(func) = self.depth_test {
            bits |= (func.index() + 1) << DEPTH_SHIFT;
        }
        if let Some(blend) = self.blend {
            let factors = [blend.src_rgb, blend.dst_rgb, blend.src_alpha, blend.dst_alpha];
            for (i, factor) in factors.iter().enumerate() {
                bits |= (factor.index() + 1) << (BLEND_SHIFT + 4 * i as u32);
            }
        }
        bits |= self.blend_equation.index() << EQUATION_SHIFT;
        bits |= self.cull.index() << CULL_SHIFT;
        bits |= self.primitive.index() << PRIMITIVE_SHIFT;
        if self.msaa {
            bits |= MSAA_BIT;
        }
        if self.wireframe {
            bits |= WIREFRAME_BIT;
        }
        bits
    }

    /// Unpacks a state. Returns `None` if a field holds an unknown value.
    #[must_use]
    pub fn decode(bits: u64) -> Option<Self> {
        let write = WriteMask::from_bits_truncate(((bits >> WRITE_SHIFT) & 0x1f) as u8);

        let depth = (bits >> DEPTH_SHIFT) & 0xf;
        let depth_test = if depth == 0 { None } else { Some(CompareFunc::from_index(depth - 1)?) };

        let factor = |i: u32| -> u64 { (bits >> (BLEND_SHIFT + 4 * i)) & 0xf };
        let blend = if factor(0) == 0 {
            None
        } else {
            Some(BlendFunc {
                src_rgb: BlendFactor::from_index(factor(0) - 1)?,
                dst_rgb: BlendFactor::from_index(factor(1).checked_sub(1)?)?,
                src_alpha: BlendFactor::from_index(factor(2).checked_sub(1)?)?,
                dst_alpha: BlendFactor::from_index(factor(3).checked_sub(1)?)?,
            })
        };

        Some(Self {
            write,
            depth_test,
            blend,
            blend_equation: BlendEquation::from_index((bits >> EQUATION_SHIFT) & 0x7)?,
            cull: CullMode::from_index((bits >> CULL_SHIFT) & 0x3)?,
            primitive: PrimitiveType::from_index((bits >> PRIMITIVE_SHIFT) & 0x7)?,
            msaa: bits & MSAA_BIT != 0,
            wireframe: bits & WIREFRAME_BIT != 0,
        })
    }
}

/// Stencil configuration of one face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilState {
    /// Comparison function.
    pub test: CompareFunc,
    /// Reference value.
    pub reference: u8,
    /// Read mask.
    pub read_mask: u8,
    /// Operation when the stencil test fails.
    pub fail_stencil: StencilOp,
    /// Operation when the depth test fails.
    pub fail_depth: StencilOp,
    /// Operation when both tests pass.
    pub pass: StencilOp,
}

impl StencilState {
    /// Test against `reference` with a full read mask, keeping values.
    #[must_use]
    pub const fn new(test: CompareFunc, reference: u8) -> Self {
        Self {
            test,
            reference,
            read_mask: 0xff,
            fail_stencil: StencilOp::Keep,
            fail_depth: StencilOp::Keep,
            pass: StencilOp::Keep,
        }
    }

    /// Packs one face into 32 bits. `None` encodes as 0.
    #[must_use]
    pub fn encode(state: Option<Self>) -> u32 {
        let Some(s) = state else { return 0 };
        u32::from(s.reference)
            | u32::from(s.read_mask) << 8
            | ((s.test.index() + 1) as u32) << 16
            | (s.fail_stencil.index() as u32) << 20
            | (s.fail_depth.index() as u32) << 24
            | (s.pass.index() as u32) << 28
    }

    /// Unpacks one face. Returns `None` for a disabled or corrupt face.
    #[must_use]
    pub fn decode(bits: u32) -> Option<Self> {
        let test = (bits >> 16) & 0xf;
        if test == 0 {
            return None;
        }
        Some(Self {
            test: CompareFunc::from_index(u64::from(test - 1))?,
            reference: (bits & 0xff) as u8,
            read_mask: ((bits >> 8) & 0xff) as u8,
            fail_stencil: StencilOp::from_index(u64::from((bits >> 20) & 0xf))?,
            fail_depth: StencilOp::from_index(u64::from((bits >> 24) & 0xf))?,
            pass: StencilOp::from_index(u64::from((bits >> 28) & 0xf))?,
        })
    }
}

/// Front and back stencil faces packed into one `u64`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct StencilFaces {
    /// Front face, also used for the back face when `back` is `None`.
    pub front: Option<StencilState>,
    /// Back face.
    pub back: Option<StencilState>,
}

impl StencilFaces {
    /// Front in the low 32 bits, back in the high 32 bits.
    #[must_use]
    pub fn encode(&self) -> u64 {
        u64::from(StencilState::encode(self.front))
            | u64::from(StencilState::encode(self.back)) << 32
    }

    /// Unpacks both faces.
    #[must_use]
    pub fn decode(bits: u64) -> Self {
        Self {
            front: StencilState::decode(bits as u32),
            back: StencilState::decode((bits >> 32) as u32),
        }
    }

    /// Effective back face.
    #[must_use]
    pub fn back_or_front(&self) -> Option<StencilState> {
        self.back.or(self.front)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_round_trip() {
        let state = RenderState::default();
        assert_eq!(RenderState::decode(state.encode()), Some(state));
    }

    #[test]
    fn test_full_state_round_trip() {
        let state = RenderState {
            write: WriteMask::RGB,
            depth_test: Some(CompareFunc::GreaterEqual),
            blend: Some(BlendFunc {
                src_rgb: BlendFactor::Factor,
                dst_rgb: BlendFactor::InvFactor,
                src_alpha: BlendFactor::One,
                dst_alpha: BlendFactor::Zero,
            }),
            blend_equation: BlendEquation::Max,
            cull: CullMode::Ccw,
            primitive: PrimitiveType::Points,
            msaa: false,
            wireframe: true,
        };
        assert_eq!(RenderState::decode(state.encode()), Some(state));
    }

    #[test]
    fn test_none_encodes_to_zero() {
        assert_eq!(RenderState::none().encode(), 0);
        assert_eq!(RenderState::decode(0), Some(RenderState::none()));
    }

    #[test]
    fn test_corrupt_bits_rejected() {
        // Primitive index 7 does not exist.
        assert!(RenderState::decode(0x7 << PRIMITIVE_SHIFT).is_none());
    }

    #[test]
    fn test_blend_class() {
        assert_eq!(RenderState::default().blend_class(), 0);
        assert_eq!(RenderState::default().with_blend(BlendFunc::ADD).blend_class(), 1);
        assert_eq!(RenderState::default().with_blend(BlendFunc::ALPHA).blend_class(), 2);
    }

    #[test]
    fn test_delta_detects_blend_change() {
        let a = RenderState::default().encode();
        let b = RenderState::default().with_blend(BlendFunc::ALPHA).encode();
        assert_ne!((a ^ b) & STATE_BLEND_MASK, 0);
        assert_eq!((a ^ b) & STATE_DEPTH_MASK, 0);
    }

    #[test]
    fn test_stencil_round_trip() {
        let front = StencilState {
            test: CompareFunc::Equal,
            reference: 3,
            read_mask: 0x0f,
            fail_stencil: StencilOp::Replace,
            fail_depth: StencilOp::Invert,
            pass: StencilOp::IncrSat,
        };
        let faces = StencilFaces { front: Some(front), back: None };
        let decoded = StencilFaces::decode(faces.encode());
        assert_eq!(decoded, faces);
        assert_eq!(decoded.back_or_front(), Some(front));
        assert_eq!(StencilFaces::default().encode(), 0);
    }
}
