//! # Renderer Backends
//!
//! The contract a graphics API implementation fulfils. The core never
//! touches a graphics API itself:
//!
//! ```text
//!   RhiContext ──(RenderFrame)──▶ render side ──▶ dyn RendererBackend
//!                                   pre commands   create_* / update_*
//!                                   sorted items   submit
//!                                   post commands  destroy_*
//! ```
//!
//! Resource calls arrive in API order. `submit` reads everything else it
//! needs from the frame.

mod headless;

pub use headless::{ExecutedItem, HeadlessBackend, HeadlessJournal, HeadlessProgram};

use crate::config::ThreadMode;
use crate::error::RhiResult;
use crate::frame::RenderFrame;
use crate::handle::{
    BufferHandle, FramebufferHandle, ProgramHandle, ShaderHandle, TextureHandle, UniformHandle,
    VertexLayoutHandle,
};
use crate::limits::{MAX_DRAW_CALLS, MAX_FRAMEBUFFER_ATTACHMENTS, MAX_TEXTURE_SAMPLERS, MAX_VIEWS};
use crate::types::{
    Attachment, BufferFlags, Resolution, ShaderType, TextureCreateInfo, UniformType,
};
use crate::vertex_layout::VertexLayout;

/// Parameters handed to [`RendererBackend::init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RhiCreateInfo {
    /// Initial backbuffer size.
    pub resolution: Resolution,
    /// Whether the backend will run on a dedicated render thread.
    pub thread_mode: ThreadMode,
}

/// What a backend supports, reported by [`RendererBackend::init`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    /// Backend name for logs.
    pub renderer_name: String,
    /// Texture units usable by `set_texture`, `set_image` and
    /// `set_compute_buffer`.
    pub max_texture_units: u8,
    /// Views the backend can execute.
    pub max_views: u8,
    /// Items per frame the backend can execute.
    pub max_draw_calls: u32,
    /// Attachments per framebuffer.
    pub max_framebuffer_attachments: u8,
    /// Compute dispatch support.
    pub supports_compute: bool,
    /// 32-bit index buffer support.
    pub supports_index32: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            renderer_name: String::from("unknown"),
            max_texture_units: MAX_TEXTURE_SAMPLERS as u8,
            max_views: MAX_VIEWS as u8,
            max_draw_calls: MAX_DRAW_CALLS,
            max_framebuffer_attachments: MAX_FRAMEBUFFER_ATTACHMENTS as u8,
            supports_compute: true,
            supports_index32: true,
        }
    }
}

/// A graphics API implementation.
///
/// In [`ThreadMode::Dual`] the backend is moved to the render thread after
/// `init`, hence `Send`. Every method is called from one thread at a time.
pub trait RendererBackend: Send {
    /// Brings the device up.
    ///
    /// # Errors
    ///
    /// [`crate::RhiError::BackendInit`] if the device is unusable.
    fn init(&mut self, info: &RhiCreateInfo) -> RhiResult<Capabilities>;

    /// Releases the device. Called once, after the last frame.
    fn shutdown(&mut self);

    /// Executes a frame's items in [`RenderFrame::sorted`] order.
    ///
    /// Implementations upload the frame's transient vertex and index bytes
    /// first, apply a view's clear, viewport and scissor when execution
    /// reaches it, and change pipeline state only where consecutive items
    /// differ. No state carries over between frames.
    fn submit(&mut self, frame: &RenderFrame);

    // ------------------------------------------------------------------
    // Resources
    // ------------------------------------------------------------------

    /// Compiles a shader stage.
    fn create_shader(&mut self, handle: ShaderHandle, shader_type: ShaderType, source: &str);

    /// Destroys a shader stage.
    fn destroy_shader(&mut self, handle: ShaderHandle);

    /// Links `shaders` into a program.
    fn create_program(&mut self, handle: ProgramHandle, shaders: &[ShaderHandle]);

    /// Destroys a program.
    fn destroy_program(&mut self, handle: ProgramHandle);

    /// Declares a uniform with `num` elements.
    fn create_uniform(
        &mut self,
        handle: UniformHandle,
        name: &str,
        uniform_type: UniformType,
        num: u16,
    );

    /// Grows a uniform's storage to `num` elements.
    fn resize_uniform(&mut self, handle: UniformHandle, num: u16);

    /// Destroys a uniform.
    fn destroy_uniform(&mut self, handle: UniformHandle);

    /// Registers a vertex layout.
    fn create_vertex_layout(&mut self, handle: VertexLayoutHandle, layout: &VertexLayout);

    /// Destroys a vertex layout.
    fn destroy_vertex_layout(&mut self, handle: VertexLayoutHandle);

    /// Creates a buffer of `size` bytes, initialized from `data` if given.
    fn create_buffer(
        &mut self,
        handle: BufferHandle,
        flags: BufferFlags,
        size: u32,
        data: Option<&[u8]>,
    );

    /// Writes `data` at byte `offset`.
    fn update_buffer(&mut self, handle: BufferHandle, offset: u32, data: &[u8]);

    /// Destroys a buffer.
    fn destroy_buffer(&mut self, handle: BufferHandle);

    /// Creates a texture, initialized from `data` if given.
    fn create_texture(
        &mut self,
        handle: TextureHandle,
        info: &TextureCreateInfo,
        data: Option<&[u8]>,
    );

    /// Reallocates a texture's storage. Contents are undefined afterwards.
    fn resize_texture(
        &mut self,
        handle: TextureHandle,
        width: u32,
        height: u32,
        depth: u32,
        num_mipmaps: u8,
        num_layers: u16,
    );

    /// Destroys a texture.
    fn destroy_texture(&mut self, handle: TextureHandle);

    /// Creates a framebuffer over `attachments`.
    fn create_framebuffer(&mut self, handle: FramebufferHandle, attachments: &[Attachment]);

    /// Destroys a framebuffer.
    fn destroy_framebuffer(&mut self, handle: FramebufferHandle);
}
