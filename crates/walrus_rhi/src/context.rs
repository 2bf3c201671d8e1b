//! # RHI Context
//!
//! The application-facing object. It validates and records everything the
//! application asks for into the current submit frame and hands sealed
//! frames to the render side:
//!
//! ```text
//!  create_* / destroy_*   ──▶ registry + pre/post command buffers
//!  set_* / submit         ──▶ items, binds, sort keys, uniform log
//!  frame()                ──▶ seal ─▶ execute inline (Single)
//!                                  └▶ swap with the render thread (Dual)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use walrus_rhi::{
//!     DiscardFlags, HeadlessBackend, RhiConfig, RhiContext, ShaderType,
//! };
//!
//! let backend = HeadlessBackend::new();
//! let mut rhi = RhiContext::new(RhiConfig::single_threaded(), Box::new(backend)).unwrap();
//!
//! let vs = rhi.create_shader(ShaderType::Vertex, "void vs_main() {}").unwrap();
//! let fs = rhi.create_shader(ShaderType::Fragment, "void fs_main() {}").unwrap();
//! let program = rhi.create_program(&[vs, fs], true).unwrap();
//!
//! rhi.set_vertex_count(3);
//! rhi.submit(0, program, 0, DiscardFlags::ALL);
//! rhi.frame().unwrap();
//! rhi.shutdown().unwrap();
//! ```

use bytemuck::Pod;
use glam::{Mat4, Vec2, Vec3};
use walrus_core::{frame_channel, ArenaGrant, FrameProducer};

use crate::backend::{Capabilities, RendererBackend, RhiCreateInfo};
use crate::command::ResourceCommand;
use crate::config::{RhiConfig, ThreadMode};
use crate::error::{RhiError, RhiResult};
use crate::frame::{
    Binding, RenderBind, RenderCompute, RenderDraw, RenderFrame, RenderItem, VertexStream,
};
use crate::handle::{
    BufferHandle, FramebufferHandle, ProgramHandle, ResourceKind, ShaderHandle,
    TextureHandle, UniformHandle, VertexLayoutHandle,
};
use crate::limits::{MAX_TEXTURE_SAMPLERS, MAX_VERTEX_STREAMS, MAX_VIEWS};
use crate::registry::{Acquire, Release, ResourceRegistry};
use crate::renderer::{render_frame, RenderThread};
use crate::sortkey::{SortKey, SortKind, ViewId, ViewOrder};
use crate::state::{RenderState, StencilFaces, StencilState};
use crate::types::{
    Access, Attachment, BackbufferRatio, BufferFlags, ClearFlags, DiscardFlags, Rect,
    Resolution, SamplerFlags, ShaderType, TextureCreateInfo, TextureFormat, UniformType,
};
use crate::vertex_layout::VertexLayout;
use crate::view::{View, ViewClear, ViewMode};

/// Vertices allocated from the current frame's transient vertex arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransientVertexBuffer {
    /// Backend buffer the frame uploads into.
    pub handle: BufferHandle,
    /// Layout of the vertices.
    pub layout: VertexLayoutHandle,
    /// First vertex inside the backend buffer.
    pub start_vertex: u32,
    /// Vertices granted.
    pub size: u32,
    /// Vertex stride in bytes.
    pub stride: u16,
    offset: u32,
}

/// Indices allocated from the current frame's transient index arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransientIndexBuffer {
    /// Backend buffer the frame uploads into.
    pub handle: BufferHandle,
    /// First index inside the backend buffer.
    pub start_index: u32,
    /// Indices granted.
    pub size: u32,
    /// 32-bit indices.
    pub index32: bool,
    offset: u32,
}

/// Where sealed frames go.
enum Executor {
    Single { backend: Box<dyn RendererBackend> },
    Dual { producer: FrameProducer<RenderFrame>, thread: RenderThread },
    Stopped,
}

/// Render hardware interface context.
///
/// Not thread-safe: one application thread drives it. In
/// [`ThreadMode::Dual`] the backend runs on a render thread owned by the
/// context.
pub struct RhiContext {
    config: RhiConfig,
    caps: Capabilities,
    registry: ResourceRegistry,
    submit: RenderFrame,
    executor: Executor,
    transient_buffers: Vec<BufferHandle>,
    views: [View; MAX_VIEWS],
    view_order: ViewOrder,
    seqs: [u32; MAX_VIEWS],
    resolution: Resolution,
    draw: RenderDraw,
    bind: RenderBind,
    uniform_begin: u32,
    error: Option<RhiError>,
    frame_count: u64,
}

impl std::fmt::Debug for RhiContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self.executor {
            Executor::Single { .. } => "single",
            Executor::Dual { .. } => "dual",
            Executor::Stopped => "stopped",
        };
        f.debug_struct("RhiContext")
            .field("renderer", &self.caps.renderer_name)
            .field("mode", &mode)
            .field("frame_count", &self.frame_count)
            .field("resolution", &self.resolution)
            .finish_non_exhaustive()
    }
}

impl RhiContext {
    /// Initializes `backend` and sets up the frames.
    ///
    /// # Errors
    ///
    /// - [`RhiError::InvalidConfig`] if `config` does not validate
    /// - [`RhiError::BackendInit`] if the backend fails; the backend has
    ///   been shut down when this returns
    /// - [`RhiError::RenderThread`] if the render thread cannot start
    pub fn new(mut config: RhiConfig, mut backend: Box<dyn RendererBackend>) -> RhiResult<Self> {
        config.validate()?;

        let info = RhiCreateInfo { resolution: config.resolution, thread_mode: config.thread_mode };
        let caps = match backend.init(&info) {
            Ok(caps) => caps,
            Err(e) => {
                tracing::error!(error = %e, "backend initialization failed");
                backend.shutdown();
                return Err(e);
            }
        };
        if config.max_draw_calls > caps.max_draw_calls {
            tracing::warn!(
                configured = config.max_draw_calls,
                supported = caps.max_draw_calls,
                "max_draw_calls clamped to backend limit"
            );
            config.max_draw_calls = caps.max_draw_calls.max(1);
        }

        let frames = match config.thread_mode {
            ThreadMode::Single => 1,
            ThreadMode::Dual => 2,
        };
        let mut registry = ResourceRegistry::new(&config.handles);
        let mut pairs = Vec::with_capacity(frames);
        for _ in 0..frames {
            let pair = registry
                .create_buffer(config.transient_vb_size, BufferFlags::empty())
                .and_then(|vb| {
                    let ib = registry.create_buffer(config.transient_ib_size, BufferFlags::INDEX)?;
                    Ok((vb, ib))
                });
            match pair {
                Ok(pair) => pairs.push(pair),
                Err(e) => {
                    backend.shutdown();
                    return Err(e);
                }
            }
        }

        let mut frames = pairs.iter().map(|&(vb, ib)| RenderFrame::new(&config, vb, ib));
        let Some(mut submit) = frames.next() else {
            backend.shutdown();
            return Err(RhiError::InvalidConfig("no frames".into()));
        };
        let spare = frames.next();

        let mut transient_buffers = Vec::with_capacity(pairs.len() * 2);
        for &(vb, ib) in &pairs {
            for (handle, size, flags) in [
                (vb, config.transient_vb_size, BufferFlags::empty()),
                (ib, config.transient_ib_size, BufferFlags::INDEX),
            ] {
                ResourceCommand::CreateBuffer { handle, flags, size, data: None }
                    .encode(&mut submit.pre);
                transient_buffers.push(handle);
            }
        }

        let executor = match spare {
            None => Executor::Single { backend },
            Some(spare) => {
                let (producer, consumer) = frame_channel(spare);
                let thread = RenderThread::spawn(backend, consumer)?;
                Executor::Dual { producer, thread }
            }
        };

        tracing::info!(
            renderer = %caps.renderer_name,
            mode = ?config.thread_mode,
            width = config.resolution.width,
            height = config.resolution.height,
            "rhi initialized"
        );

        Ok(Self {
            resolution: config.resolution,
            caps,
            registry,
            submit,
            executor,
            transient_buffers,
            views: [View::default(); MAX_VIEWS],
            view_order: ViewOrder::identity(),
            seqs: [0; MAX_VIEWS],
            draw: RenderDraw::default(),
            bind: RenderBind::default(),
            uniform_begin: 0,
            error: None,
            frame_count: 0,
            config,
        })
    }

    /// Flushes the pending frame, stops the render thread and shuts the
    /// backend down. Idempotent; also run on drop.
    ///
    /// # Errors
    ///
    /// [`RhiError::RenderThread`] if the render thread did not respond
    /// within the configured timeout or panicked.
    pub fn shutdown(&mut self) -> RhiResult<()> {
        let executor = std::mem::replace(&mut self.executor, Executor::Stopped);
        if matches!(executor, Executor::Stopped) {
            return Ok(());
        }

        for handle in std::mem::take(&mut self.transient_buffers) {
            if let Err(e) = self.destroy_buffer(handle) {
                tracing::warn!(error = %e, "transient buffer already gone");
            }
        }

        let result = match executor {
            Executor::Single { mut backend } => {
                self.seal();
                render_frame(backend.as_mut(), &mut self.submit);
                backend.shutdown();
                Ok(())
            }
            Executor::Dual { mut producer, mut thread } => {
                match producer.wait_render_timeout(self.config.shutdown_timeout()) {
                    Ok(Some(next)) => {
                        self.seal();
                        let sealed = std::mem::replace(&mut self.submit, next);
                        if producer.submit(sealed).is_err() {
                            tracing::warn!("render thread exited before the final frame");
                        }
                        drop(producer);
                        thread.join()
                    }
                    Ok(None) => {
                        drop(producer);
                        thread.detach();
                        Err(RhiError::RenderThread(format!(
                            "no response within {} ms",
                            self.config.shutdown_timeout_ms
                        )))
                    }
                    Err(_) => {
                        drop(producer);
                        thread.join()
                    }
                }
            }
            Executor::Stopped => Ok(()),
        };

        tracing::info!(frames = self.frame_count, "rhi shut down");
        result
    }

    // ========================================================================
    // FRAME
    // ========================================================================

    /// Ends the current frame and starts the next one. Returns the number
    /// of frames submitted so far.
    ///
    /// In [`ThreadMode::Dual`] this first waits for the render thread to
    /// finish the previous frame, so the application is never more than
    /// one frame ahead.
    ///
    /// # Errors
    ///
    /// [`RhiError::RenderThread`] if the render thread is gone or the
    /// context was shut down.
    pub fn frame(&mut self) -> RhiResult<u64> {
        let next = match &mut self.executor {
            Executor::Stopped => return Err(RhiError::RenderThread("rhi is shut down".into())),
            Executor::Single { .. } => None,
            Executor::Dual { producer, .. } => Some(
                producer
                    .wait_render()
                    .map_err(|_| RhiError::RenderThread("render thread exited".into()))?,
            ),
        };

        self.seal();
        match (&mut self.executor, next) {
            (Executor::Single { backend }, _) => {
                render_frame(backend.as_mut(), &mut self.submit);
            }
            (Executor::Dual { producer, .. }, Some(next)) => {
                let sealed = std::mem::replace(&mut self.submit, next);
                producer
                    .submit(sealed)
                    .map_err(|_| RhiError::RenderThread("render thread exited".into()))?;
            }
            _ => return Err(RhiError::RenderThread("rhi is shut down".into())),
        }

        self.begin_frame();
        Ok(self.frame_count)
    }

    /// Snapshots context state into the submit frame and returns freed ids.
    fn seal(&mut self) {
        self.frame_count += 1;
        let frame = &mut self.submit;
        frame.frame_number = self.frame_count;
        frame.resolution = self.resolution;
        for (snapshot, view) in frame.views.iter_mut().zip(&self.views) {
            *snapshot = view.resolved(self.resolution);
        }
        for kind in ResourceKind::ALL {
            for id in frame.freed.drain(kind) {
                self.registry.free(kind, id);
            }
        }
        frame.finish();
    }

    fn begin_frame(&mut self) {
        self.submit.start();
        self.submit.view_order = self.view_order;
        self.seqs = [0; MAX_VIEWS];
        self.uniform_begin = 0;
        self.draw = RenderDraw::default();
        self.bind = RenderBind::default();
    }

    // ========================================================================
    // RESOURCES
    // ========================================================================

    fn pre(&mut self, command: &ResourceCommand<'_>) {
        command.encode(&mut self.submit.pre);
    }

    fn retire(&mut self, command: &ResourceCommand<'_>, kind: ResourceKind, id: u16) {
        tracing::debug!(%kind, id, "resource destroyed");
        command.encode(&mut self.submit.post);
        self.submit.freed.push(kind, id);
    }

    /// Creates or reuses a shader compiled from `source`.
    ///
    /// # Errors
    ///
    /// [`RhiError::HandleExhausted`] when no shader handle is free.
    pub fn create_shader(
        &mut self,
        shader_type: ShaderType,
        source: &str,
    ) -> RhiResult<ShaderHandle> {
        let acquire = self.registry.create_shader(shader_type, source)?;
        if let Acquire::Created(handle) = acquire {
            tracing::debug!(id = handle.id(), ?shader_type, "shader created");
            self.pre(&ResourceCommand::CreateShader { handle, shader_type, source });
        }
        Ok(acquire.handle())
    }

    /// Releases a reference to a shader.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidHandle`] if the shader is not live.
    pub fn destroy_shader(&mut self, handle: ShaderHandle) -> RhiResult<()> {
        if self.registry.destroy_shader(handle)?.is_destroyed() {
            self.retire(&ResourceCommand::DestroyShader(handle), ResourceKind::Shader, handle.id());
        }
        Ok(())
    }

    /// Creates or reuses a program linking `shaders`. With
    /// `destroy_shaders` the caller's shader references are released, so
    /// the shaders live exactly as long as the program.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidHandle`] if a shader is not live,
    /// [`RhiError::HandleExhausted`] when no program handle is free.
    pub fn create_program(
        &mut self,
        shaders: &[ShaderHandle],
        destroy_shaders: bool,
    ) -> RhiResult<ProgramHandle> {
        let acquire = self.registry.create_program(shaders)?;
        let handle = acquire.handle();
        if acquire.is_created() {
            tracing::debug!(id = handle.id(), shaders = shaders.len(), "program created");
            self.pre(&ResourceCommand::CreateProgram { handle, shaders: shaders.to_vec() });
        }
        if destroy_shaders {
            for &shader in shaders {
                self.destroy_shader(shader)?;
            }
        }
        Ok(handle)
    }

    /// Releases a reference to a program, and its shader references when
    /// the program goes away.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidHandle`] if the program is not live.
    pub fn destroy_program(&mut self, handle: ProgramHandle) -> RhiResult<()> {
        if let Release::Destroyed(shaders) = self.registry.destroy_program(handle)? {
            let command = ResourceCommand::DestroyProgram(handle);
            self.retire(&command, ResourceKind::Program, handle.id());
            for shader in shaders {
                self.destroy_shader(shader)?;
            }
        }
        Ok(())
    }

    /// Creates or reuses the uniform `name` with room for `num` elements.
    /// An existing uniform grows if `num` is larger.
    ///
    /// # Errors
    ///
    /// [`RhiError::HandleExhausted`] when no uniform handle is free.
    pub fn create_uniform(
        &mut self,
        name: &str,
        uniform_type: UniformType,
        num: u16,
    ) -> RhiResult<UniformHandle> {
        let (acquire, resized) = self.registry.create_uniform(name, uniform_type, num)?;
        let handle = acquire.handle();
        if acquire.is_created() {
            tracing::debug!(id = handle.id(), name, ?uniform_type, "uniform created");
            let num = num.max(1);
            self.pre(&ResourceCommand::CreateUniform { handle, uniform_type, num, name });
        } else if let Some(num) = resized {
            self.pre(&ResourceCommand::ResizeUniform { handle, num });
        }
        Ok(handle)
    }

    /// Releases a reference to a uniform.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidHandle`] if the uniform is not live.
    pub fn destroy_uniform(&mut self, handle: UniformHandle) -> RhiResult<()> {
        if self.registry.destroy_uniform(handle)?.is_destroyed() {
            let command = ResourceCommand::DestroyUniform(handle);
            self.retire(&command, ResourceKind::Uniform, handle.id());
        }
        Ok(())
    }

    /// Creates or reuses a vertex layout structurally equal to `layout`.
    ///
    /// # Errors
    ///
    /// [`RhiError::HandleExhausted`] when no layout handle is free.
    pub fn create_vertex_layout(&mut self, layout: &VertexLayout) -> RhiResult<VertexLayoutHandle> {
        let acquire = self.registry.create_vertex_layout(layout)?;
        if let Acquire::Created(handle) = acquire {
            tracing::debug!(id = handle.id(), stride = layout.stride(), "vertex layout created");
            self.pre(&ResourceCommand::CreateVertexLayout { handle, layout: *layout });
        }
        Ok(acquire.handle())
    }

    /// Releases a reference to a vertex layout.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidHandle`] if the layout is not live.
    pub fn destroy_vertex_layout(&mut self, handle: VertexLayoutHandle) -> RhiResult<()> {
        if self.registry.destroy_vertex_layout(handle)?.is_destroyed() {
            let command = ResourceCommand::DestroyVertexLayout(handle);
            self.retire(&command, ResourceKind::VertexLayout, handle.id());
        }
        Ok(())
    }

    /// Creates a buffer initialized with `data`.
    ///
    /// # Errors
    ///
    /// [`RhiError::HandleExhausted`] when no buffer handle is free.
    pub fn create_buffer(&mut self, data: &[u8], flags: BufferFlags) -> RhiResult<BufferHandle> {
        let size = u32::try_from(data.len())
            .map_err(|_| RhiError::InvalidConfig(format!("buffer of {} bytes", data.len())))?;
        let handle = self.registry.create_buffer(size, flags)?;
        tracing::debug!(id = handle.id(), size, ?flags, "buffer created");
        self.pre(&ResourceCommand::CreateBuffer { handle, flags, size, data: Some(data) });
        Ok(handle)
    }

    /// Creates an uninitialized buffer of `size` bytes for later updates.
    ///
    /// # Errors
    ///
    /// [`RhiError::HandleExhausted`] when no buffer handle is free.
    pub fn create_dynamic_buffer(
        &mut self,
        size: u32,
        flags: BufferFlags,
    ) -> RhiResult<BufferHandle> {
        let handle = self.registry.create_buffer(size, flags)?;
        tracing::debug!(id = handle.id(), size, ?flags, "dynamic buffer created");
        self.pre(&ResourceCommand::CreateBuffer { handle, flags, size, data: None });
        Ok(handle)
    }

    /// Writes `data` at byte `offset`. Writes past the end grow buffers
    /// created with [`BufferFlags::ALLOW_RESIZE`] and are truncated
    /// otherwise.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidHandle`] if the buffer is not live.
    pub fn update_buffer(
        &mut self,
        handle: BufferHandle,
        offset: u32,
        data: &[u8],
    ) -> RhiResult<()> {
        let buffer = *self
            .registry
            .buffer(handle)
            .ok_or(RhiError::InvalidHandle { kind: ResourceKind::Buffer })?;
        let end = u64::from(offset) + data.len() as u64;
        let data = if end <= u64::from(buffer.size) {
            data
        } else if buffer.flags.contains(BufferFlags::ALLOW_RESIZE) {
            self.registry.grow_buffer(handle, end.min(u64::from(u32::MAX)) as u32)?;
            data
        } else {
            tracing::warn!(
                id = handle.id(),
                offset,
                len = data.len(),
                size = buffer.size,
                "buffer update truncated"
            );
            let keep = buffer.size.saturating_sub(offset) as usize;
            &data[..keep.min(data.len())]
        };
        self.pre(&ResourceCommand::UpdateBuffer { handle, offset, data });
        Ok(())
    }

    /// Destroys a buffer.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidHandle`] if the buffer is not live.
    pub fn destroy_buffer(&mut self, handle: BufferHandle) -> RhiResult<()> {
        if self.registry.destroy_buffer(handle)?.is_destroyed() {
            self.retire(&ResourceCommand::DestroyBuffer(handle), ResourceKind::Buffer, handle.id());
        }
        Ok(())
    }

    /// Creates a texture. Ratio textures are sized from the current
    /// resolution and follow [`set_resolution`](Self::set_resolution).
    ///
    /// # Errors
    ///
    /// [`RhiError::HandleExhausted`] when no texture handle is free.
    pub fn create_texture(
        &mut self,
        info: &TextureCreateInfo,
        data: Option<&[u8]>,
    ) -> RhiResult<TextureHandle> {
        let mut info = *info;
        if let Some(ratio) = info.ratio {
            (info.width, info.height) = ratio.apply(self.resolution);
        }
        let handle = self.registry.create_texture(info)?;
        tracing::debug!(
            id = handle.id(),
            width = info.width,
            height = info.height,
            format = ?info.format,
            "texture created"
        );
        self.pre(&ResourceCommand::CreateTexture { handle, info, data });
        Ok(handle)
    }

    /// Releases a reference to a texture.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidHandle`] if the texture is not live.
    pub fn destroy_texture(&mut self, handle: TextureHandle) -> RhiResult<()> {
        if self.registry.destroy_texture(handle)?.is_destroyed() {
            let command = ResourceCommand::DestroyTexture(handle);
            self.retire(&command, ResourceKind::Texture, handle.id());
        }
        Ok(())
    }

    /// Creates a framebuffer over `attachments`. With `destroy_textures`
    /// the caller's texture references are released, so the textures live
    /// exactly as long as the framebuffer.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidHandle`] if an attachment is not live or there
    /// are more attachments than the backend supports,
    /// [`RhiError::HandleExhausted`] when no framebuffer handle is free.
    pub fn create_framebuffer(
        &mut self,
        attachments: &[Attachment],
        destroy_textures: bool,
    ) -> RhiResult<FramebufferHandle> {
        if attachments.len() > usize::from(self.caps.max_framebuffer_attachments) {
            return Err(RhiError::InvalidHandle { kind: ResourceKind::Texture });
        }
        let handle = self.registry.create_framebuffer(attachments)?;
        tracing::debug!(id = handle.id(), attachments = attachments.len(), "framebuffer created");
        self.pre(&ResourceCommand::CreateFramebuffer { handle, attachments: attachments.to_vec() });
        if destroy_textures {
            for attachment in attachments {
                self.destroy_texture(attachment.handle)?;
            }
        }
        Ok(handle)
    }

    /// [`create_framebuffer`](Self::create_framebuffer) attaching mip 0,
    /// layer 0 of each texture.
    ///
    /// # Errors
    ///
    /// As [`create_framebuffer`](Self::create_framebuffer).
    pub fn create_framebuffer_from_textures(
        &mut self,
        textures: &[TextureHandle],
        destroy_textures: bool,
    ) -> RhiResult<FramebufferHandle> {
        let attachments: Vec<Attachment> = textures.iter().map(|&t| Attachment::new(t)).collect();
        self.create_framebuffer(&attachments, destroy_textures)
    }

    /// Destroys a framebuffer and releases its texture references.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidHandle`] if the framebuffer is not live.
    pub fn destroy_framebuffer(&mut self, handle: FramebufferHandle) -> RhiResult<()> {
        if let Release::Destroyed(textures) = self.registry.destroy_framebuffer(handle)? {
            let command = ResourceCommand::DestroyFramebuffer(handle);
            self.retire(&command, ResourceKind::Framebuffer, handle.id());
            for texture in textures {
                self.destroy_texture(texture)?;
            }
        }
        Ok(())
    }

    /// Changes the backbuffer size and resizes every ratio texture.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidConfig`] for a zero-sized resolution.
    pub fn set_resolution(&mut self, width: u32, height: u32) -> RhiResult<()> {
        if width == 0 || height == 0 {
            return Err(RhiError::InvalidConfig(format!("resolution {width}x{height}")));
        }
        let resolution = Resolution { width, height };
        if resolution == self.resolution {
            return Ok(());
        }
        self.resolution = resolution;
        tracing::debug!(width, height, "resolution changed");

        for (handle, ratio) in self.registry.ratio_textures() {
            let (width, height) = ratio.apply(resolution);
            let Some(texture) = self.registry.texture(handle) else { continue };
            let info = texture.info;
            self.registry.set_texture_size(handle, width, height)?;
            self.pre(&ResourceCommand::ResizeTexture {
                handle,
                width,
                height,
                depth: info.depth,
                num_mipmaps: info.num_mipmaps,
                num_layers: info.num_layers,
            });
        }
        Ok(())
    }

    // ========================================================================
    // VIEWS
    // ========================================================================

    /// Views usable this session, the lesser of the backend's and ours.
    fn view_limit(&self) -> usize {
        MAX_VIEWS.min(usize::from(self.caps.max_views))
    }

    fn view_mut(&mut self, view: ViewId) -> Option<&mut View> {
        let max = self.view_limit();
        if usize::from(view) >= max {
            tracing::warn!(view, max, "view id out of range");
            return None;
        }
        self.views.get_mut(usize::from(view))
    }

    /// Sets a fixed viewport.
    pub fn set_view_rect(&mut self, view: ViewId, x: u16, y: u16, width: u16, height: u16) {
        if let Some(v) = self.view_mut(view) {
            v.rect = Rect::new(x, y, width, height);
            v.ratio = None;
        }
    }

    /// Sets a viewport sized relative to the backbuffer.
    pub fn set_view_rect_ratio(&mut self, view: ViewId, x: u16, y: u16, ratio: BackbufferRatio) {
        if let Some(v) = self.view_mut(view) {
            v.rect.x = x;
            v.rect.y = y;
            v.ratio = Some(ratio);
        }
    }

    /// Sets the view scissor. A zero-sized rect disables it.
    pub fn set_view_scissor(&mut self, view: ViewId, scissor: Rect) {
        if let Some(v) = self.view_mut(view) {
            v.scissor = scissor;
        }
    }

    /// Sets what the view clears before its first item.
    pub fn set_view_clear(
        &mut self,
        view: ViewId,
        flags: ClearFlags,
        rgba: u32,
        depth: f32,
        stencil: u8,
    ) {
        if let Some(v) = self.view_mut(view) {
            v.clear = ViewClear { flags, color: rgba, depth, stencil };
        }
    }

    /// Sets the view and projection matrices.
    pub fn set_view_transform(&mut self, view: ViewId, view_matrix: Mat4, projection: Mat4) {
        if let Some(v) = self.view_mut(view) {
            v.view = view_matrix;
            v.projection = projection;
        }
    }

    /// Sets how the view orders its draws.
    pub fn set_view_mode(&mut self, view: ViewId, mode: ViewMode) {
        if let Some(v) = self.view_mut(view) {
            v.mode = mode;
        }
    }

    /// Renders the view into `framebuffer`, or the backbuffer when invalid.
    pub fn set_view_framebuffer(&mut self, view: ViewId, framebuffer: FramebufferHandle) {
        if framebuffer.is_valid() && !self.registry.is_valid(framebuffer) {
            tracing::warn!(view, id = framebuffer.id(), "view bound to a dead framebuffer");
            return;
        }
        if let Some(v) = self.view_mut(view) {
            v.framebuffer = framebuffer;
        }
    }

    /// Executes the listed views first, in the given order, then the rest
    /// in id order. An empty slice restores id order.
    ///
    /// Takes effect at once if nothing was submitted this frame, otherwise
    /// from the next frame.
    pub fn set_view_order(&mut self, order: &[ViewId]) {
        self.view_order = ViewOrder::from_order(order);
        if self.submit.num_items() == 0 {
            self.submit.view_order = self.view_order;
        }
    }

    /// Restores a view's defaults.
    pub fn reset_view(&mut self, view: ViewId) {
        if let Some(v) = self.view_mut(view) {
            *v = View::default();
        }
    }

    /// Window coordinates to normalized device coordinates of `view`.
    #[must_use]
    pub fn screen_to_clip(&self, view: ViewId, x: f32, y: f32) -> Vec2 {
        self.resolved_view(view).screen_to_clip(x, y)
    }

    /// Window coordinates at NDC depth `z` to world space of `view`.
    #[must_use]
    pub fn screen_to_world(&self, view: ViewId, x: f32, y: f32, z: f32) -> Vec3 {
        self.resolved_view(view).screen_to_world(x, y, z)
    }

    /// World-space ray direction of `view` through a window position.
    #[must_use]
    pub fn screen_to_world_dir(&self, view: ViewId, x: f32, y: f32) -> Vec3 {
        self.resolved_view(view).screen_to_world_dir(x, y)
    }

    fn resolved_view(&self, view: ViewId) -> View {
        self.views
            .get(usize::from(view))
            .map(|v| v.resolved(self.resolution))
            .unwrap_or_default()
    }

    // ========================================================================
    // DRAW STATE
    // ========================================================================

    /// Sets the pipeline state and the constant blend color (`0xRRGGBBAA`).
    pub fn set_state(&mut self, state: &RenderState, blend_factor: u32) {
        self.draw.state = state.encode();
        self.draw.blend_factor = blend_factor;
    }

    /// Sets the stencil test. `back` falls back to `front` when `None`.
    pub fn set_stencil(&mut self, front: Option<StencilState>, back: Option<StencilState>) {
        self.draw.stencil = StencilFaces { front, back }.encode();
    }

    /// Sets a per-draw scissor. A zero-sized rect uses the view's.
    pub fn set_scissor(&mut self, scissor: Rect) {
        self.draw.scissor = scissor;
    }

    /// Copies `matrices` into the frame's matrix cache for the next draw.
    /// Returns the cache index of the first one.
    pub fn set_transform(&mut self, matrices: &[Mat4]) -> u32 {
        let (first, count) = self.submit.add_matrices(matrices);
        if count == 0 {
            self.draw.start_matrix = 0;
            self.draw.num_matrices = 1;
        } else {
            self.draw.start_matrix = first;
            self.draw.num_matrices = count;
        }
        first
    }

    /// Vertex count for draws without vertex streams.
    pub fn set_vertex_count(&mut self, num_vertices: u32) {
        self.draw.num_vertices = num_vertices;
    }

    /// Instance count for draws without an instance buffer.
    pub fn set_instance_count(&mut self, num_instances: u32) {
        self.draw.instance = VertexStream::default();
        self.draw.num_instances = num_instances;
    }

    /// Writes `values` to a uniform for the next draw, starting at element
    /// `offset` of the uniform's array. Values past the uniform's element
    /// count are ignored, and a write starting past the end is dropped.
    pub fn set_uniform<T: Pod>(&mut self, handle: UniformHandle, offset: u16, values: &[T]) {
        let Some(uniform) = self.registry.uniform(handle) else {
            tracing::warn!(id = handle.id(), "write to dead uniform dropped");
            return;
        };
        if offset >= uniform.num {
            tracing::warn!(
                id = handle.id(),
                offset,
                num = uniform.num,
                "uniform write past end dropped"
            );
            return;
        }
        let uniform_type = uniform.uniform_type;
        let element = uniform_type.size() as usize;
        let max = element * usize::from(uniform.num - offset);
        let bytes: &[u8] = bytemuck::cast_slice(values);
        let bytes = &bytes[..bytes.len().min(max)];
        let byte_offset = u32::from(offset) * uniform_type.size();

        let uniforms = &mut self.submit.uniforms;
        uniforms.update(self.config.uniform_buffer_threshold, self.config.uniform_buffer_grow);
        uniforms.write_uniform(uniform_type, handle, byte_offset, bytes);
    }

    // ========================================================================
    // GEOMETRY
    // ========================================================================

    fn vertex_capacity(
        &self,
        buffer: BufferHandle,
        layout: VertexLayoutHandle,
    ) -> Option<u32> {
        let size = self.registry.buffer(buffer)?.size;
        let stride = self.registry.vertex_layout(layout)?.stride;
        Some(size / u32::from(stride.max(1)))
    }

    fn bind_stream(&mut self, stream: u8, vertices: VertexStream) {
        let slot = usize::from(stream);
        if slot >= MAX_VERTEX_STREAMS {
            tracing::warn!(stream, max = MAX_VERTEX_STREAMS, "vertex stream out of range");
            return;
        }
        if vertices.buffer.is_valid() {
            self.draw.streams[slot] = vertices;
            self.draw.stream_mask |= 1 << stream;
        } else {
            self.draw.streams[slot] = VertexStream::default();
            self.draw.stream_mask &= !(1 << stream);
        }
    }

    /// Binds vertices of `buffer` to `stream`. `num` defaults to every
    /// vertex after `start_vertex`. An invalid buffer unbinds the stream.
    pub fn set_vertex_buffer(
        &mut self,
        stream: u8,
        buffer: BufferHandle,
        layout: VertexLayoutHandle,
        start_vertex: u32,
        num: Option<u32>,
    ) {
        if !buffer.is_valid() {
            self.bind_stream(stream, VertexStream::default());
            return;
        }
        let Some(capacity) = self.vertex_capacity(buffer, layout) else {
            tracing::warn!(
                stream,
                buffer = buffer.id(),
                layout = layout.id(),
                "vertex stream with dead buffer or layout"
            );
            return;
        };
        let available = capacity.saturating_sub(start_vertex);
        let num_vertices = num.map_or(available, |n| n.min(available));
        self.bind_stream(stream, VertexStream { buffer, layout, start_vertex, num_vertices });
    }

    /// Binds transient vertices to `stream`, `start_vertex` relative to the
    /// allocation.
    pub fn set_transient_vertex_buffer(
        &mut self,
        stream: u8,
        tvb: &TransientVertexBuffer,
        start_vertex: u32,
        num: Option<u32>,
    ) {
        if tvb.handle != self.submit.transient_vb.handle {
            tracing::warn!(stream, "transient vertex buffer from another frame ignored");
            return;
        }
        let available = tvb.size.saturating_sub(start_vertex);
        self.bind_stream(
            stream,
            VertexStream {
                buffer: tvb.handle,
                layout: tvb.layout,
                start_vertex: tvb.start_vertex + start_vertex,
                num_vertices: num.map_or(available, |n| n.min(available)),
            },
        );
    }

    /// Binds per-instance data. `num` defaults to every instance after
    /// `start_instance`.
    pub fn set_instance_buffer(
        &mut self,
        buffer: BufferHandle,
        layout: VertexLayoutHandle,
        start_instance: u32,
        num: Option<u32>,
    ) {
        let Some(capacity) = self.vertex_capacity(buffer, layout) else {
            tracing::warn!(buffer = buffer.id(), "instance buffer with dead buffer or layout");
            return;
        };
        let available = capacity.saturating_sub(start_instance);
        let num_instances = num.map_or(available, |n| n.min(available));
        self.draw.instance = VertexStream {
            buffer,
            layout,
            start_vertex: start_instance,
            num_vertices: num_instances,
        };
        self.draw.num_instances = num_instances;
    }

    fn bind_indices(&mut self, buffer: BufferHandle, index32: bool, first: u32, num: Option<u32>) {
        let Some(info) = self.registry.buffer(buffer) else {
            tracing::warn!(buffer = buffer.id(), "index buffer is not live");
            return;
        };
        if index32 && !self.caps.supports_index32 {
            tracing::warn!("32-bit indices not supported by the backend");
            return;
        }
        let index_size = if index32 { 4 } else { 2 };
        let available = (info.size / index_size).saturating_sub(first);
        self.draw.index_buffer = buffer;
        self.draw.index32 = index32;
        self.draw.start_index = first;
        self.draw.num_indices = num.map_or(available, |n| n.min(available));
    }

    /// Binds 16-bit indices. `num` defaults to every index after `first`.
    pub fn set_index_buffer(&mut self, buffer: BufferHandle, first: u32, num: Option<u32>) {
        self.bind_indices(buffer, false, first, num);
    }

    /// Binds 32-bit indices. `num` defaults to every index after `first`.
    pub fn set_index32_buffer(&mut self, buffer: BufferHandle, first: u32, num: Option<u32>) {
        self.bind_indices(buffer, true, first, num);
    }

    /// Binds transient indices, `first` relative to the allocation.
    pub fn set_transient_index_buffer(
        &mut self,
        tib: &TransientIndexBuffer,
        first: u32,
        num: Option<u32>,
    ) {
        if tib.handle != self.submit.transient_ib.handle {
            tracing::warn!("transient index buffer from another frame ignored");
            return;
        }
        let available = tib.size.saturating_sub(first);
        self.draw.index_buffer = tib.handle;
        self.draw.index32 = tib.index32;
        self.draw.start_index = tib.start_index + first;
        self.draw.num_indices = num.map_or(available, |n| n.min(available));
    }

    // ========================================================================
    // TRANSIENT GEOMETRY
    // ========================================================================

    /// Vertices of `layout` still available this frame, at most `num`.
    #[must_use]
    pub fn avail_transient_vertices(&self, num: u32, layout: VertexLayoutHandle) -> u32 {
        self.registry.vertex_layout(layout).map_or(0, |l| {
            num.min(self.submit.transient_vb.arena.available(u32::from(l.stride)))
        })
    }

    /// Indices still available this frame, at most `num`.
    #[must_use]
    pub fn avail_transient_indices(&self, num: u32, index32: bool) -> u32 {
        let stride = if index32 { 4 } else { 2 };
        num.min(self.submit.transient_ib.arena.available(stride))
    }

    /// Allocates `num` vertices of `layout` for this frame only.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidHandle`] if the layout is not live,
    /// [`RhiError::TransientExhausted`] if fewer than `num` vertices are
    /// left. The arena is untouched on failure.
    pub fn alloc_transient_buffer(
        &mut self,
        num: u32,
        layout: VertexLayoutHandle,
    ) -> RhiResult<TransientVertexBuffer> {
        let stride = self
            .registry
            .vertex_layout(layout)
            .ok_or(RhiError::InvalidHandle { kind: ResourceKind::VertexLayout })?
            .stride;
        let available = self.submit.transient_vb.arena.available(u32::from(stride));
        if available < num {
            return Err(RhiError::TransientExhausted { requested: num, available });
        }
        let grant = self.submit.alloc_transient_vb(num, u32::from(stride));
        debug_assert_eq!(grant.count, num);
        Ok(TransientVertexBuffer {
            handle: self.submit.transient_vb.handle,
            layout,
            start_vertex: grant.first_element(u32::from(stride)),
            size: grant.count,
            stride,
            offset: grant.offset,
        })
    }

    /// Allocates `num` indices for this frame only.
    ///
    /// # Errors
    ///
    /// [`RhiError::TransientExhausted`] if fewer than `num` indices are
    /// left. The arena is untouched on failure.
    pub fn alloc_transient_index_buffer(
        &mut self,
        num: u32,
        index32: bool,
    ) -> RhiResult<TransientIndexBuffer> {
        let stride = if index32 { 4 } else { 2 };
        let available = self.submit.transient_ib.arena.available(stride);
        if available < num {
            return Err(RhiError::TransientExhausted { requested: num, available });
        }
        let grant = self.submit.alloc_transient_ib(num, stride);
        debug_assert_eq!(grant.count, num);
        Ok(TransientIndexBuffer {
            handle: self.submit.transient_ib.handle,
            start_index: grant.first_element(stride),
            size: grant.count,
            index32,
            offset: grant.offset,
        })
    }

    /// Bytes of a transient vertex allocation. Empty if it belongs to
    /// another frame.
    pub fn transient_vertex_data_mut(&mut self, tvb: &TransientVertexBuffer) -> &mut [u8] {
        let transient = &mut self.submit.transient_vb;
        if tvb.handle != transient.handle {
            tracing::warn!("transient vertex buffer from another frame");
            return &mut [];
        }
        let grant = ArenaGrant { offset: tvb.offset, count: tvb.size };
        transient.arena.slice_mut(grant, u32::from(tvb.stride))
    }

    /// Bytes of a transient index allocation. Empty if it belongs to
    /// another frame.
    pub fn transient_index_data_mut(&mut self, tib: &TransientIndexBuffer) -> &mut [u8] {
        let transient = &mut self.submit.transient_ib;
        if tib.handle != transient.handle {
            tracing::warn!("transient index buffer from another frame");
            return &mut [];
        }
        let grant = ArenaGrant { offset: tib.offset, count: tib.size };
        transient.arena.slice_mut(grant, if tib.index32 { 4 } else { 2 })
    }

    // ========================================================================
    // BINDINGS
    // ========================================================================

    fn bind_unit(&mut self, unit: u8, binding: Binding) {
        if self.error.is_some() {
            return;
        }
        let max = self.caps.max_texture_units.min(MAX_TEXTURE_SAMPLERS as u8);
        if unit >= max {
            tracing::warn!(unit, max, "texture unit out of range");
            self.error = Some(RhiError::TextureUnitOutOfRange { unit, max });
            return;
        }
        self.bind.bindings[usize::from(unit)] = binding;
    }

    /// Samples `texture` on `unit` with `sampler` state.
    ///
    /// A unit beyond the backend's capability sets the context error
    /// (see [`take_error`](Self::take_error)); later bindings are dropped
    /// until it is taken.
    pub fn set_texture(&mut self, unit: u8, texture: TextureHandle, sampler: SamplerFlags) {
        self.bind_unit(unit, Binding::Texture { handle: texture, sampler });
    }

    /// Binds mip `mip` of `texture` as a storage image on `unit`.
    pub fn set_image(
        &mut self,
        unit: u8,
        texture: TextureHandle,
        mip: u8,
        access: Access,
        format: TextureFormat,
    ) {
        self.bind_unit(unit, Binding::Image { handle: texture, mip, access, format });
    }

    /// Binds `buffer` as a storage buffer on `unit`.
    pub fn set_compute_buffer(&mut self, unit: u8, buffer: BufferHandle, access: Access) {
        self.bind_unit(unit, Binding::Buffer { handle: buffer, access });
    }

    // ========================================================================
    // SUBMISSION
    // ========================================================================

    fn accepts(&self, view: ViewId, program: ProgramHandle) -> bool {
        if usize::from(view) >= self.view_limit() {
            tracing::warn!(view, "submit to out of range view dropped");
            return false;
        }
        if program.is_valid() && !self.registry.is_valid(program) {
            tracing::warn!(view, program = program.id(), "submit with dead program dropped");
            return false;
        }
        true
    }

    fn next_seq(&mut self, view: ViewId) -> u32 {
        let seq = &mut self.seqs[usize::from(view)];
        let current = *seq;
        *seq = seq.wrapping_add(1);
        current
    }

    fn end_item(&mut self, uniform_end: u32, discard: DiscardFlags) {
        self.uniform_begin = uniform_end;
        self.draw.clear(discard);
        self.bind.clear(discard);
    }

    /// Records a draw of the pending state into `view`.
    ///
    /// Vertex counts resolve to the smallest bound stream. Draws where a
    /// bound stream, the index buffer or the instance buffer resolves to
    /// zero elements are dropped. Pending state named by `discard` is
    /// reset afterwards either way.
    pub fn submit(
        &mut self,
        view: ViewId,
        program: ProgramHandle,
        depth: u32,
        discard: DiscardFlags,
    ) {
        let uniform_end = self.submit.uniforms.position() as u32;
        if self.accepts(view, program) {
            let mut draw = self.draw;
            draw.uniform_begin = self.uniform_begin;
            draw.uniform_end = uniform_end;
            let stream_vertices = draw.stream_vertices();
            if let Some(num) = stream_vertices {
                draw.num_vertices = num;
            }
            let empty = stream_vertices == Some(0)
                || (draw.is_indexed() && draw.num_indices == 0)
                || draw.num_instances == 0;

            if !empty {
                let blend = RenderState::decode(draw.state).unwrap_or_default().blend_class();
                let seq = self.next_seq(view);
                let order = self.views[usize::from(view)].mode.draw_order(blend, depth, seq);
                let key = SortKey { view, program, kind: SortKind::Draw(order) }
                    .encode(&self.submit.view_order);
                self.submit.push_item(key, RenderItem::Draw(draw), self.bind);
            }
        }
        self.end_item(uniform_end, discard);
    }

    /// Records a compute dispatch of `program` with the pending bindings,
    /// uniforms and transform.
    pub fn dispatch(
        &mut self,
        view: ViewId,
        program: ProgramHandle,
        num_x: u32,
        num_y: u32,
        num_z: u32,
        discard: DiscardFlags,
    ) {
        let uniform_end = self.submit.uniforms.position() as u32;
        let groups = num_x > 0 && num_y > 0 && num_z > 0;
        if !self.caps.supports_compute {
            tracing::warn!("compute not supported by the backend, dispatch dropped");
        } else if program.is_valid() && groups && self.accepts(view, program) {
            let compute = RenderCompute {
                num_x,
                num_y,
                num_z,
                uniform_begin: self.uniform_begin,
                uniform_end,
                start_matrix: self.draw.start_matrix,
                num_matrices: self.draw.num_matrices,
            };
            let seq = self.next_seq(view);
            let key = SortKey { view, program, kind: SortKind::Compute { seq } }
                .encode(&self.submit.view_order);
            self.submit.push_item(key, RenderItem::Compute(compute), self.bind);
        }
        self.end_item(uniform_end, discard);
    }

    /// Submits an empty item so `view` is cleared even with nothing drawn.
    /// Discards all pending state.
    pub fn touch(&mut self, view: ViewId) {
        self.submit(view, ProgramHandle::INVALID, 0, DiscardFlags::ALL);
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// What the backend reported at init.
    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    /// Resource bookkeeping.
    #[must_use]
    pub const fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// The configuration in use.
    #[must_use]
    pub const fn config(&self) -> &RhiConfig {
        &self.config
    }

    /// Current backbuffer size.
    #[must_use]
    pub const fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Frames submitted so far.
    #[must_use]
    pub const fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Items recorded into the current frame.
    #[must_use]
    pub fn num_items(&self) -> u32 {
        self.submit.num_items()
    }

    /// Returns and clears the sticky error flag.
    pub fn take_error(&mut self) -> Option<RhiError> {
        self.error.take()
    }
}

impl Drop for RhiContext {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::error!(error = %e, "rhi shutdown failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;
    use crate::vertex_layout::AttribType;

    type Journal = std::sync::Arc<parking_lot::Mutex<crate::backend::HeadlessJournal>>;

    fn single() -> (RhiContext, Journal) {
        let backend = HeadlessBackend::new();
        let journal = backend.journal();
        let rhi = RhiContext::new(RhiConfig::single_threaded(), Box::new(backend)).unwrap();
        (rhi, journal)
    }

    #[test]
    fn test_transient_buffers_created_on_first_frame() {
        let (mut rhi, journal) = single();
        rhi.frame().unwrap();
        assert_eq!(journal.lock().live(ResourceKind::Buffer), 2);

        rhi.shutdown().unwrap();
        let journal = journal.lock();
        assert_eq!(journal.live(ResourceKind::Buffer), 0);
        assert!(journal.shut_down);
    }

    #[test]
    fn test_zero_count_draw_dropped() {
        let (mut rhi, _journal) = single();
        let layout = VertexLayout::begin().add(3, AttribType::Float, false).end();
        let layout = rhi.create_vertex_layout(&layout).unwrap();
        let vb = rhi.create_buffer(&[0u8; 36], BufferFlags::empty()).unwrap();

        rhi.set_vertex_buffer(0, vb, layout, 0, Some(0));
        rhi.submit(0, ProgramHandle::INVALID, 0, DiscardFlags::ALL);
        assert_eq!(rhi.num_items(), 0);

        rhi.set_vertex_buffer(0, vb, layout, 0, None);
        rhi.submit(0, ProgramHandle::INVALID, 0, DiscardFlags::ALL);
        assert_eq!(rhi.num_items(), 1);
    }

    #[test]
    fn test_stream_count_clamped_to_buffer() {
        let (mut rhi, _journal) = single();
        let layout = VertexLayout::begin().add(4, AttribType::Float, false).end();
        let layout = rhi.create_vertex_layout(&layout).unwrap();
        let vb = rhi.create_buffer(&[0u8; 64], BufferFlags::empty()).unwrap();
        rhi.set_vertex_buffer(0, vb, layout, 1, Some(10));
        assert_eq!(rhi.draw.streams[0].num_vertices, 3);
    }

    #[test]
    fn test_texture_unit_error_is_sticky() {
        let (mut rhi, _journal) = single();
        let max = rhi.capabilities().max_texture_units;
        let texture = rhi
            .create_texture(&TextureCreateInfo::new_2d(4, 4, TextureFormat::Rgba8), None)
            .unwrap();

        rhi.set_texture(max, texture, SamplerFlags::empty());
        rhi.set_texture(0, texture, SamplerFlags::empty());
        assert_eq!(rhi.bind.bindings[0], Binding::None);
        assert_eq!(
            rhi.take_error(),
            Some(RhiError::TextureUnitOutOfRange { unit: max, max })
        );

        rhi.set_texture(0, texture, SamplerFlags::empty());
        assert!(matches!(rhi.bind.bindings[0], Binding::Texture { .. }));
        assert!(rhi.take_error().is_none());
    }

    #[test]
    fn test_set_transform_uses_cache_slots() {
        let (mut rhi, _journal) = single();
        let first = rhi.set_transform(&[Mat4::IDENTITY, Mat4::IDENTITY]);
        assert_eq!(first, 1);
        assert_eq!((rhi.draw.start_matrix, rhi.draw.num_matrices), (1, 2));
        rhi.touch(0);
        assert_eq!((rhi.draw.start_matrix, rhi.draw.num_matrices), (0, 1));
    }

    #[test]
    fn test_uniform_write_truncated_to_declared_size() {
        let (mut rhi, _journal) = single();
        let color = rhi.create_uniform("u_color", UniformType::Vec4, 1).unwrap();
        rhi.set_uniform(color, 0, &[[1.0f32; 4], [2.0; 4]]);
        rhi.touch(0);
        let frame = &rhi.submit;
        let (begin, end) = frame.items()[0].uniform_range();
        let updates: Vec<_> = frame.uniforms().updates(begin as usize, end as usize).collect();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].data.len(), 16);
        assert_eq!(updates[0].num, 1);
    }

    #[test]
    fn test_uniform_offset_clamps_to_remaining_elements() {
        let (mut rhi, _journal) = single();
        let lights = rhi.create_uniform("u_lights", UniformType::Vec4, 4).unwrap();
        rhi.set_uniform(lights, 3, &[[1.0f32; 4], [2.0; 4]]);
        rhi.set_uniform(lights, 4, &[[3.0f32; 4]]);
        rhi.touch(0);
        let frame = &rhi.submit;
        let (begin, end) = frame.items()[0].uniform_range();
        let updates: Vec<_> = frame.uniforms().updates(begin as usize, end as usize).collect();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].offset, 48);
        assert_eq!(updates[0].data.len(), 16);
    }

    #[test]
    fn test_ratio_texture_follows_resolution() {
        let (mut rhi, journal) = single();
        let info = TextureCreateInfo::with_ratio(BackbufferRatio::Half, TextureFormat::Rgba8);
        let texture = rhi.create_texture(&info, None).unwrap();
        assert_eq!(rhi.registry().texture(texture).unwrap().info.width, 640);

        rhi.set_resolution(1920, 1080).unwrap();
        rhi.frame().unwrap();
        let journal = journal.lock();
        let resized = journal.textures[&texture];
        assert_eq!((resized.width, resized.height), (960, 540));
    }

    #[test]
    fn test_transient_data_roundtrips_to_backend() {
        let (mut rhi, journal) = single();
        let layout = VertexLayout::begin().add(1, AttribType::Float, false).end();
        let layout = rhi.create_vertex_layout(&layout).unwrap();
        let tvb = rhi.alloc_transient_buffer(2, layout).unwrap();
        rhi.transient_vertex_data_mut(&tvb).copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        rhi.set_transient_vertex_buffer(0, &tvb, 0, None);
        rhi.touch(0);
        rhi.frame().unwrap();

        let journal = journal.lock();
        let uploaded = &journal.buffers[&tvb.handle].data[..8];
        assert_eq!(uploaded, &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(journal.stats.transient_bytes, 8);
    }
}
