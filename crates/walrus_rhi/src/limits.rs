//! Hard limits imposed by the handle and sort key encodings.
//!
//! [`RhiConfig`](crate::RhiConfig) may lower any of these but never raise
//! them.

/// Number of views. The sort key reserves 8 bits for the view.
pub const MAX_VIEWS: usize = 32;

/// Draw and compute items per frame.
pub const MAX_DRAW_CALLS: u32 = 65_536;

/// Vertex streams bound to one draw.
pub const MAX_VERTEX_STREAMS: usize = 8;

/// Shader handles.
pub const MAX_SHADERS: u16 = 256;

/// Program handles. The sort key reserves 9 bits for the program and the
/// all-ones value for the invalid program.
pub const MAX_PROGRAMS: u16 = 511;

/// Uniform handles.
pub const MAX_UNIFORMS: u16 = 256;

/// Vertex layout handles.
pub const MAX_VERTEX_LAYOUTS: u16 = 128;

/// Buffer handles.
pub const MAX_BUFFERS: u16 = 4096;

/// Texture handles.
pub const MAX_TEXTURES: u16 = 4096;

/// Framebuffer handles.
pub const MAX_FRAMEBUFFERS: u16 = 128;

/// Texture, image and buffer binding slots per draw.
pub const MAX_TEXTURE_SAMPLERS: usize = 32;

/// Attributes in one vertex layout.
pub const MAX_VERTEX_ATTRIBUTES: usize = 16;

/// Attachments in one framebuffer.
pub const MAX_FRAMEBUFFER_ATTACHMENTS: usize = 8;

/// Shaders linked into one program.
pub const MAX_PROGRAM_SHADERS: usize = 3;

/// Model matrices cached per frame, slot 0 included.
pub const MAX_MATRIX_CACHE: u32 = MAX_DRAW_CALLS + 1;
