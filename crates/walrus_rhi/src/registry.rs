//! # Resource Registry
//!
//! Submit-side bookkeeping for every resource kind: handle pools, reference
//! counts, deduplication tables and dependency references.
//!
//! ## Lifetime Rules
//!
//! - Shaders dedup on source text, uniforms on name, vertex layouts on
//!   their structural hash and programs on their shader list. A dedup hit
//!   bumps the reference count.
//! - Programs hold a reference on each shader. Framebuffers hold one on
//!   each attached texture.
//! - When a count reaches zero the ref is cleared, so the handle stops
//!   being valid at once, but the id stays allocated. The caller returns
//!   it with [`ResourceRegistry::free`] at the next frame boundary.
//!
//! The registry never talks to a backend. [`crate::RhiContext`] turns
//! [`Acquire::Created`] and [`Release::Destroyed`] into commands.

use std::collections::HashMap;

use walrus_core::HandleAllocator;

use crate::config::HandleCapacities;
use crate::error::{RhiError, RhiResult};
use crate::handle::{
    BufferHandle, FramebufferHandle, ProgramHandle, ResourceKind, RhiHandle, ShaderHandle,
    TextureHandle, UniformHandle, VertexLayoutHandle,
};
use crate::limits::{MAX_FRAMEBUFFER_ATTACHMENTS, MAX_PROGRAM_SHADERS};
use crate::types::{
    Attachment, BackbufferRatio, BufferFlags, ShaderType, TextureCreateInfo, UniformType,
};
use crate::vertex_layout::VertexLayout;

/// Outcome of a create call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire<H> {
    /// An identical resource already existed; its count was bumped.
    Existing(H),
    /// A new handle was allocated.
    Created(H),
}

impl<H: Copy> Acquire<H> {
    /// The handle, new or existing.
    #[inline]
    pub const fn handle(&self) -> H {
        match *self {
            Self::Existing(h) | Self::Created(h) => h,
        }
    }

    /// Returns true if a new handle was allocated.
    #[inline]
    pub const fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Outcome of a destroy call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Release<T = ()> {
    /// Other owners remain.
    Retained(u32),
    /// The last reference is gone. Carries the resource's dependencies.
    Destroyed(T),
}

impl<T> Release<T> {
    /// Returns true if the resource is gone.
    #[inline]
    pub const fn is_destroyed(&self) -> bool {
        matches!(self, Self::Destroyed(_))
    }
}

/// A live shader.
#[derive(Debug, Clone)]
pub struct ShaderRef {
    /// Stage.
    pub shader_type: ShaderType,
    /// Source text, also the dedup key.
    pub source: String,
    ref_count: u32,
}

/// A live program.
#[derive(Debug, Clone)]
pub struct ProgramRef {
    /// Attached shaders, in attach order.
    pub shaders: Vec<ShaderHandle>,
    ref_count: u32,
}

/// A live uniform.
#[derive(Debug, Clone)]
pub struct UniformRef {
    /// Name, also the dedup key.
    pub name: String,
    /// Value type.
    pub uniform_type: UniformType,
    /// Element count. Only ever grows.
    pub num: u16,
    ref_count: u32,
}

/// A live vertex layout.
#[derive(Debug, Clone, Copy)]
pub struct VertexLayoutRef {
    /// Structural hash, also the dedup key.
    pub hash: u64,
    /// Vertex stride in bytes.
    pub stride: u16,
    ref_count: u32,
}

/// A live buffer.
#[derive(Debug, Clone, Copy)]
pub struct BufferRef {
    /// Size in bytes.
    pub size: u32,
    /// Creation flags.
    pub flags: BufferFlags,
}

/// A live texture.
#[derive(Debug, Clone, Copy)]
pub struct TextureRef {
    /// Creation parameters, with the current size for ratio textures.
    pub info: TextureCreateInfo,
    ref_count: u32,
}

/// A live framebuffer.
#[derive(Debug, Clone)]
pub struct FramebufferRef {
    /// Attachments, in attach order.
    pub attachments: Vec<Attachment>,
    /// Width of the first attachment's mip.
    pub width: u32,
    /// Height of the first attachment's mip.
    pub height: u32,
}

macro_rules! impl_ref_count {
    ($($name:ident),* $(,)?) => {
        $(
            impl $name {
                /// Current reference count.
                #[inline]
                #[must_use]
                pub const fn ref_count(&self) -> u32 {
                    self.ref_count
                }
            }
        )*
    };
}

impl_ref_count!(ShaderRef, ProgramRef, UniformRef, VertexLayoutRef, TextureRef);

/// Handle pool plus per-handle data for one kind.
#[derive(Debug)]
struct Pool<R> {
    kind: ResourceKind,
    ids: HandleAllocator,
    refs: Vec<Option<R>>,
}

impl<R> Pool<R> {
    fn new(kind: ResourceKind, capacity: u16) -> Self {
        Self {
            kind,
            ids: HandleAllocator::new(capacity),
            refs: std::iter::repeat_with(|| None).take(usize::from(capacity)).collect(),
        }
    }

    fn insert(&mut self, value: R) -> RhiResult<u16> {
        let Some(id) = self.ids.alloc() else {
            tracing::warn!(kind = %self.kind, capacity = self.ids.capacity(), "handle pool exhausted");
            return Err(RhiError::HandleExhausted { kind: self.kind });
        };
        self.refs[usize::from(id)] = Some(value);
        Ok(id)
    }

    fn get(&self, id: u16) -> Option<&R> {
        if !self.ids.is_valid(id) {
            return None;
        }
        self.refs.get(usize::from(id))?.as_ref()
    }

    fn get_mut(&mut self, id: u16) -> RhiResult<&mut R> {
        let kind = self.kind;
        if !self.ids.is_valid(id) {
            return Err(RhiError::InvalidHandle { kind });
        }
        self.refs
            .get_mut(usize::from(id))
            .and_then(Option::as_mut)
            .ok_or(RhiError::InvalidHandle { kind })
    }

    /// Clears the ref. The id stays allocated until [`Pool::free`].
    fn take(&mut self, id: u16) -> Option<R> {
        self.refs.get_mut(usize::from(id))?.take()
    }

    fn free(&mut self, id: u16) {
        debug_assert!(
            self.refs.get(usize::from(id)).is_some_and(Option::is_none),
            "freeing {} {id} that still has a ref",
            self.kind
        );
        self.ids.free(id);
    }

    fn live(&self) -> usize {
        self.refs.iter().filter(|r| r.is_some()).count()
    }

    fn iter(&self) -> impl Iterator<Item = (u16, &R)> {
        self.ids
            .live()
            .iter()
            .filter_map(|&id| self.refs[usize::from(id)].as_ref().map(|r| (id, r)))
    }
}

/// Reference counts and dedup tables for every resource kind.
#[derive(Debug)]
pub struct ResourceRegistry {
    shaders: Pool<ShaderRef>,
    programs: Pool<ProgramRef>,
    uniforms: Pool<UniformRef>,
    vertex_layouts: Pool<VertexLayoutRef>,
    buffers: Pool<BufferRef>,
    textures: Pool<TextureRef>,
    framebuffers: Pool<FramebufferRef>,
    shader_by_source: HashMap<String, ShaderHandle>,
    program_by_shaders: HashMap<Vec<ShaderHandle>, ProgramHandle>,
    uniform_by_name: HashMap<String, UniformHandle>,
    layout_by_hash: HashMap<u64, VertexLayoutHandle>,
}

impl ResourceRegistry {
    /// Creates empty pools sized by `capacities`.
    #[must_use]
    pub fn new(capacities: &HandleCapacities) -> Self {
        Self {
            shaders: Pool::new(ResourceKind::Shader, capacities.shaders),
            programs: Pool::new(ResourceKind::Program, capacities.programs),
            uniforms: Pool::new(ResourceKind::Uniform, capacities.uniforms),
            vertex_layouts: Pool::new(ResourceKind::VertexLayout, capacities.vertex_layouts),
            buffers: Pool::new(ResourceKind::Buffer, capacities.buffers),
            textures: Pool::new(ResourceKind::Texture, capacities.textures),
            framebuffers: Pool::new(ResourceKind::Framebuffer, capacities.framebuffers),
            shader_by_source: HashMap::new(),
            program_by_shaders: HashMap::new(),
            uniform_by_name: HashMap::new(),
            layout_by_hash: HashMap::new(),
        }
    }

    // ------------------------------------------------------------------
    // Shaders
    // ------------------------------------------------------------------

    /// Finds or creates a shader for `source`.
    ///
    /// # Errors
    ///
    /// [`RhiError::HandleExhausted`] if no shader id is free.
    pub fn create_shader(
        &mut self,
        shader_type: ShaderType,
        source: &str,
    ) -> RhiResult<Acquire<ShaderHandle>> {
        if let Some(&handle) = self.shader_by_source.get(source) {
            let shader = self.shaders.get_mut(handle.id())?;
            if shader.shader_type != shader_type {
                tracing::warn!(
                    ?handle,
                    existing = ?shader.shader_type,
                    requested = ?shader_type,
                    "shader source reused with a different stage"
                );
            }
            shader.ref_count += 1;
            return Ok(Acquire::Existing(handle));
        }

        let id = self.shaders.insert(ShaderRef {
            shader_type,
            source: source.to_owned(),
            ref_count: 1,
        })?;
        let handle = ShaderHandle(id);
        self.shader_by_source.insert(source.to_owned(), handle);
        Ok(Acquire::Created(handle))
    }

    /// Drops one reference to `handle`.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidHandle`] if the shader is not live.
    pub fn destroy_shader(&mut self, handle: ShaderHandle) -> RhiResult<Release> {
        let shader = self.shaders.get_mut(handle.id())?;
        shader.ref_count -= 1;
        if shader.ref_count > 0 {
            return Ok(Release::Retained(shader.ref_count));
        }
        if let Some(shader) = self.shaders.take(handle.id()) {
            self.shader_by_source.remove(&shader.source);
        }
        Ok(Release::Destroyed(()))
    }

    // ------------------------------------------------------------------
    // Programs
    // ------------------------------------------------------------------

    /// Finds or creates a program linking `shaders`. A new program takes a
    /// reference on every shader.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidHandle`] if a shader is not live or the list is
    /// empty or too long, [`RhiError::HandleExhausted`] if no id is free.
    pub fn create_program(
        &mut self,
        shaders: &[ShaderHandle],
    ) -> RhiResult<Acquire<ProgramHandle>> {
        let bad_list = shaders.is_empty() || shaders.len() > MAX_PROGRAM_SHADERS;
        if bad_list || shaders.iter().any(|s| self.shaders.get(s.id()).is_none()) {
            return Err(RhiError::InvalidHandle { kind: ResourceKind::Shader });
        }

        if let Some(&handle) = self.program_by_shaders.get(shaders) {
            self.programs.get_mut(handle.id())?.ref_count += 1;
            return Ok(Acquire::Existing(handle));
        }

        let id = self.programs.insert(ProgramRef { shaders: shaders.to_vec(), ref_count: 1 })?;
        for shader in shaders {
            self.shaders.get_mut(shader.id())?.ref_count += 1;
        }
        let handle = ProgramHandle(id);
        self.program_by_shaders.insert(shaders.to_vec(), handle);
        Ok(Acquire::Created(handle))
    }

    /// Drops one reference to `handle`. When the program goes away the
    /// shaders it referenced are returned; the caller releases them.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidHandle`] if the program is not live.
    pub fn destroy_program(
        &mut self,
        handle: ProgramHandle,
    ) -> RhiResult<Release<Vec<ShaderHandle>>> {
        let program = self.programs.get_mut(handle.id())?;
        program.ref_count -= 1;
        if program.ref_count > 0 {
            return Ok(Release::Retained(program.ref_count));
        }
        let shaders = match self.programs.take(handle.id()) {
            Some(program) => {
                self.program_by_shaders.remove(&program.shaders);
                program.shaders
            }
            None => Vec::new(),
        };
        Ok(Release::Destroyed(shaders))
    }

    // ------------------------------------------------------------------
    // Uniforms
    // ------------------------------------------------------------------

    /// Finds or creates the uniform `name`.
    ///
    /// The second value is the new element count when an existing uniform
    /// had to grow to `num`.
    ///
    /// # Errors
    ///
    /// [`RhiError::HandleExhausted`] if no uniform id is free.
    pub fn create_uniform(
        &mut self,
        name: &str,
        uniform_type: UniformType,
        num: u16,
    ) -> RhiResult<(Acquire<UniformHandle>, Option<u16>)> {
        let num = num.max(1);
        if let Some(&handle) = self.uniform_by_name.get(name) {
            let uniform = self.uniforms.get_mut(handle.id())?;
            if uniform.uniform_type != uniform_type {
                tracing::warn!(
                    name,
                    existing = ?uniform.uniform_type,
                    requested = ?uniform_type,
                    "uniform redeclared with a different type"
                );
            }
            uniform.ref_count += 1;
            let resized = (num > uniform.num).then(|| {
                uniform.num = num;
                num
            });
            return Ok((Acquire::Existing(handle), resized));
        }

        let id = self.uniforms.insert(UniformRef {
            name: name.to_owned(),
            uniform_type,
            num,
            ref_count: 1,
        })?;
        let handle = UniformHandle(id);
        self.uniform_by_name.insert(name.to_owned(), handle);
        Ok((Acquire::Created(handle), None))
    }

    /// Drops one reference to `handle`.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidHandle`] if the uniform is not live.
    pub fn destroy_uniform(&mut self, handle: UniformHandle) -> RhiResult<Release> {
        let uniform = self.uniforms.get_mut(handle.id())?;
        uniform.ref_count -= 1;
        if uniform.ref_count > 0 {
            return Ok(Release::Retained(uniform.ref_count));
        }
        if let Some(uniform) = self.uniforms.take(handle.id()) {
            self.uniform_by_name.remove(&uniform.name);
        }
        Ok(Release::Destroyed(()))
    }

    // ------------------------------------------------------------------
    // Vertex layouts
    // ------------------------------------------------------------------

    /// Finds or creates a vertex layout structurally equal to `layout`.
    ///
    /// # Errors
    ///
    /// [`RhiError::HandleExhausted`] if no layout id is free.
    pub fn create_vertex_layout(
        &mut self,
        layout: &VertexLayout,
    ) -> RhiResult<Acquire<VertexLayoutHandle>> {
        let hash = layout.hash();
        if let Some(&handle) = self.layout_by_hash.get(&hash) {
            self.vertex_layouts.get_mut(handle.id())?.ref_count += 1;
            return Ok(Acquire::Existing(handle));
        }

        let id = self.vertex_layouts.insert(VertexLayoutRef {
            hash,
            stride: layout.stride(),
            ref_count: 1,
        })?;
        let handle = VertexLayoutHandle(id);
        self.layout_by_hash.insert(hash, handle);
        Ok(Acquire::Created(handle))
    }

    /// Drops one reference to `handle`.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidHandle`] if the layout is not live.
    pub fn destroy_vertex_layout(&mut self, handle: VertexLayoutHandle) -> RhiResult<Release> {
        let layout = self.vertex_layouts.get_mut(handle.id())?;
        layout.ref_count -= 1;
        if layout.ref_count > 0 {
            return Ok(Release::Retained(layout.ref_count));
        }
        if let Some(layout) = self.vertex_layouts.take(handle.id()) {
            self.layout_by_hash.remove(&layout.hash);
        }
        Ok(Release::Destroyed(()))
    }

    // ------------------------------------------------------------------
    // Buffers
    // ------------------------------------------------------------------

    /// Allocates a buffer handle. Buffers are never shared.
    ///
    /// # Errors
    ///
    /// [`RhiError::HandleExhausted`] if no buffer id is free.
    pub fn create_buffer(&mut self, size: u32, flags: BufferFlags) -> RhiResult<BufferHandle> {
        self.buffers.insert(BufferRef { size, flags }).map(BufferHandle)
    }

    /// Records a buffer's new size after a growing update.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidHandle`] if the buffer is not live.
    pub fn grow_buffer(&mut self, handle: BufferHandle, size: u32) -> RhiResult<()> {
        let buffer = self.buffers.get_mut(handle.id())?;
        buffer.size = buffer.size.max(size);
        Ok(())
    }

    /// Releases a buffer.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidHandle`] if the buffer is not live.
    pub fn destroy_buffer(&mut self, handle: BufferHandle) -> RhiResult<Release> {
        self.buffers.get_mut(handle.id())?;
        self.buffers.take(handle.id());
        Ok(Release::Destroyed(()))
    }

    // ------------------------------------------------------------------
    // Textures
    // ------------------------------------------------------------------

    /// Allocates a texture handle. `info` must already carry the resolved
    /// size of ratio textures.
    ///
    /// # Errors
    ///
    /// [`RhiError::HandleExhausted`] if no texture id is free.
    pub fn create_texture(&mut self, info: TextureCreateInfo) -> RhiResult<TextureHandle> {
        self.textures.insert(TextureRef { info, ref_count: 1 }).map(TextureHandle)
    }

    /// Records a new size for a texture and for framebuffers sized by it.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidHandle`] if the texture is not live.
    pub fn set_texture_size(
        &mut self,
        handle: TextureHandle,
        width: u32,
        height: u32,
    ) -> RhiResult<()> {
        let texture = self.textures.get_mut(handle.id())?;
        texture.info.width = width;
        texture.info.height = height;

        // Framebuffers take their size from the first attachment.
        let sized_by: Vec<u16> = self
            .framebuffers
            .iter()
            .filter(|(_, fb)| fb.attachments.first().is_some_and(|a| a.handle == handle))
            .map(|(id, _)| id)
            .collect();
        for id in sized_by {
            let fb = self.framebuffers.get_mut(id)?;
            let mip = fb.attachments.first().map_or(0, |a| a.mip);
            fb.width = (width >> mip).max(1);
            fb.height = (height >> mip).max(1);
        }
        Ok(())
    }

    /// Live textures sized relative to the backbuffer.
    #[must_use]
    pub fn ratio_textures(&self) -> Vec<(TextureHandle, BackbufferRatio)> {
        self.textures
            .iter()
            .filter_map(|(id, t)| t.info.ratio.map(|ratio| (TextureHandle(id), ratio)))
            .collect()
    }

    /// Drops one reference to `handle`.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidHandle`] if the texture is not live.
    pub fn destroy_texture(&mut self, handle: TextureHandle) -> RhiResult<Release> {
        let texture = self.textures.get_mut(handle.id())?;
        texture.ref_count -= 1;
        if texture.ref_count > 0 {
            return Ok(Release::Retained(texture.ref_count));
        }
        self.textures.take(handle.id());
        Ok(Release::Destroyed(()))
    }

    // ------------------------------------------------------------------
    // Framebuffers
    // ------------------------------------------------------------------

    /// Allocates a framebuffer over `attachments`, taking a reference on
    /// every attached texture.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidHandle`] if an attachment's texture is not live or
    /// the list is empty or too long, [`RhiError::HandleExhausted`] if no id
    /// is free.
    pub fn create_framebuffer(
        &mut self,
        attachments: &[Attachment],
    ) -> RhiResult<FramebufferHandle> {
        let invalid = RhiError::InvalidHandle { kind: ResourceKind::Texture };
        if attachments.is_empty() || attachments.len() > MAX_FRAMEBUFFER_ATTACHMENTS {
            return Err(invalid);
        }
        let mut size = None;
        for attachment in attachments {
            let texture = self
                .textures
                .get(attachment.handle.id())
                .ok_or_else(|| invalid.clone())?;
            size.get_or_insert((
                (texture.info.width >> attachment.mip).max(1),
                (texture.info.height >> attachment.mip).max(1),
            ));
        }
        let (width, height) = size.unwrap_or((1, 1));

        let id = self.framebuffers.insert(FramebufferRef {
            attachments: attachments.to_vec(),
            width,
            height,
        })?;
        for attachment in attachments {
            self.textures.get_mut(attachment.handle.id())?.ref_count += 1;
        }
        Ok(FramebufferHandle(id))
    }

    /// Releases a framebuffer. Returns the attached textures, which the
    /// caller releases.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidHandle`] if the framebuffer is not live.
    pub fn destroy_framebuffer(
        &mut self,
        handle: FramebufferHandle,
    ) -> RhiResult<Release<Vec<TextureHandle>>> {
        self.framebuffers.get_mut(handle.id())?;
        let textures = self
            .framebuffers
            .take(handle.id())
            .map(|fb| fb.attachments.iter().map(|a| a.handle).collect())
            .unwrap_or_default();
        Ok(Release::Destroyed(textures))
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Returns `id` of `kind` to its allocator. The resource must already
    /// be destroyed.
    pub fn free(&mut self, kind: ResourceKind, id: u16) {
        match kind {
            ResourceKind::Shader => self.shaders.free(id),
            ResourceKind::Program => self.programs.free(id),
            ResourceKind::Uniform => self.uniforms.free(id),
            ResourceKind::VertexLayout => self.vertex_layouts.free(id),
            ResourceKind::Buffer => self.buffers.free(id),
            ResourceKind::Texture => self.textures.free(id),
            ResourceKind::Framebuffer => self.framebuffers.free(id),
        }
    }

    /// Returns true if `handle` names a live resource.
    #[must_use]
    pub fn is_valid<H: RhiHandle>(&self, handle: H) -> bool {
        let id = handle.id();
        match H::KIND {
            ResourceKind::Shader => self.shaders.get(id).is_some(),
            ResourceKind::Program => self.programs.get(id).is_some(),
            ResourceKind::Uniform => self.uniforms.get(id).is_some(),
            ResourceKind::VertexLayout => self.vertex_layouts.get(id).is_some(),
            ResourceKind::Buffer => self.buffers.get(id).is_some(),
            ResourceKind::Texture => self.textures.get(id).is_some(),
            ResourceKind::Framebuffer => self.framebuffers.get(id).is_some(),
        }
    }

    /// Number of live resources of `kind`.
    #[must_use]
    pub fn live_count(&self, kind: ResourceKind) -> usize {
        match kind {
            ResourceKind::Shader => self.shaders.live(),
            ResourceKind::Program => self.programs.live(),
            ResourceKind::Uniform => self.uniforms.live(),
            ResourceKind::VertexLayout => self.vertex_layouts.live(),
            ResourceKind::Buffer => self.buffers.live(),
            ResourceKind::Texture => self.textures.live(),
            ResourceKind::Framebuffer => self.framebuffers.live(),
        }
    }

    /// Number of allocated ids of `kind`, including destroyed ones not yet
    /// returned by [`free`](Self::free).
    #[must_use]
    pub fn allocated_count(&self, kind: ResourceKind) -> u16 {
        match kind {
            ResourceKind::Shader => self.shaders.ids.len(),
            ResourceKind::Program => self.programs.ids.len(),
            ResourceKind::Uniform => self.uniforms.ids.len(),
            ResourceKind::VertexLayout => self.vertex_layouts.ids.len(),
            ResourceKind::Buffer => self.buffers.ids.len(),
            ResourceKind::Texture => self.textures.ids.len(),
            ResourceKind::Framebuffer => self.framebuffers.ids.len(),
        }
    }

    /// Live shader data.
    #[must_use]
    pub fn shader(&self, handle: ShaderHandle) -> Option<&ShaderRef> {
        self.shaders.get(handle.id())
    }

    /// Live program data.
    #[must_use]
    pub fn program(&self, handle: ProgramHandle) -> Option<&ProgramRef> {
        self.programs.get(handle.id())
    }

    /// Live uniform data.
    #[must_use]
    pub fn uniform(&self, handle: UniformHandle) -> Option<&UniformRef> {
        self.uniforms.get(handle.id())
    }

    /// Live vertex layout data.
    #[must_use]
    pub fn vertex_layout(&self, handle: VertexLayoutHandle) -> Option<&VertexLayoutRef> {
        self.vertex_layouts.get(handle.id())
    }

    /// Live buffer data.
    #[must_use]
    pub fn buffer(&self, handle: BufferHandle) -> Option<&BufferRef> {
        self.buffers.get(handle.id())
    }

    /// Live texture data.
    #[must_use]
    pub fn texture(&self, handle: TextureHandle) -> Option<&TextureRef> {
        self.textures.get(handle.id())
    }

    /// Live framebuffer data.
    #[must_use]
    pub fn framebuffer(&self, handle: FramebufferHandle) -> Option<&FramebufferRef> {
        self.framebuffers.get(handle.id())
    }

    /// The shader created from `source`, if live.
    #[must_use]
    pub fn shader_by_source(&self, source: &str) -> Option<ShaderHandle> {
        self.shader_by_source.get(source).copied()
    }

    /// The uniform named `name`, if live.
    #[must_use]
    pub fn uniform_by_name(&self, name: &str) -> Option<UniformHandle> {
        self.uniform_by_name.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TextureFormat;
    use crate::vertex_layout::AttribType;

    fn registry() -> ResourceRegistry {
        ResourceRegistry::new(&HandleCapacities::default())
    }

    #[test]
    fn test_shader_dedup_lifecycle() {
        let mut reg = registry();
        let a = reg.create_shader(ShaderType::Vertex, "void main() {}").unwrap();
        let b = reg.create_shader(ShaderType::Vertex, "void main() {}").unwrap();
        assert!(a.is_created());
        assert_eq!(b, Acquire::Existing(a.handle()));
        assert_eq!(reg.shader(a.handle()).unwrap().ref_count(), 2);

        assert_eq!(reg.destroy_shader(a.handle()).unwrap(), Release::Retained(1));
        assert!(reg.is_valid(a.handle()));

        assert!(reg.destroy_shader(a.handle()).unwrap().is_destroyed());
        assert!(!reg.is_valid(a.handle()));
        assert!(reg.shader_by_source("void main() {}").is_none());
    }

    #[test]
    fn test_destroyed_id_not_reused_until_freed() {
        let mut reg = registry();
        let first = reg.create_shader(ShaderType::Fragment, "a").unwrap().handle();
        reg.destroy_shader(first).unwrap();
        assert_eq!(reg.allocated_count(ResourceKind::Shader), 1);

        let second = reg.create_shader(ShaderType::Fragment, "b").unwrap().handle();
        assert_ne!(first, second);

        reg.free(ResourceKind::Shader, first.id());
        assert_eq!(reg.allocated_count(ResourceKind::Shader), 1);
    }

    #[test]
    fn test_program_holds_shader_refs() {
        let mut reg = registry();
        let vs = reg.create_shader(ShaderType::Vertex, "vs").unwrap().handle();
        let fs = reg.create_shader(ShaderType::Fragment, "fs").unwrap().handle();
        let program = reg.create_program(&[vs, fs]).unwrap();
        assert!(program.is_created());
        assert_eq!(reg.shader(vs).unwrap().ref_count(), 2);

        let again = reg.create_program(&[vs, fs]).unwrap();
        assert_eq!(again, Acquire::Existing(program.handle()));
        assert_eq!(reg.shader(vs).unwrap().ref_count(), 2);

        assert_eq!(reg.destroy_program(program.handle()).unwrap(), Release::Retained(1));
        assert_eq!(
            reg.destroy_program(program.handle()).unwrap(),
            Release::Destroyed(vec![vs, fs])
        );
    }

    #[test]
    fn test_program_rejects_dead_shader() {
        let mut reg = registry();
        let err = reg.create_program(&[ShaderHandle(3)]).unwrap_err();
        assert_eq!(err, RhiError::InvalidHandle { kind: ResourceKind::Shader });
        assert!(reg.create_program(&[]).is_err());
    }

    #[test]
    fn test_uniform_grows_on_redeclare() {
        let mut reg = registry();
        let (a, resized) = reg.create_uniform("u_color", UniformType::Vec4, 1).unwrap();
        assert!(a.is_created());
        assert!(resized.is_none());

        let (b, resized) = reg.create_uniform("u_color", UniformType::Vec4, 4).unwrap();
        assert_eq!(b.handle(), a.handle());
        assert_eq!(resized, Some(4));

        let (_, resized) = reg.create_uniform("u_color", UniformType::Vec4, 2).unwrap();
        assert!(resized.is_none());
        assert_eq!(reg.uniform(a.handle()).unwrap().num, 4);
        assert_eq!(reg.uniform(a.handle()).unwrap().ref_count(), 3);
    }

    #[test]
    fn test_vertex_layout_dedup_by_structure() {
        let mut reg = registry();
        let a = VertexLayout::begin().add(3, AttribType::Float, false).end();
        let b = VertexLayout::begin().add(3, AttribType::Float, false).end();
        let c = VertexLayout::begin().add(2, AttribType::Float, false).end();

        let ha = reg.create_vertex_layout(&a).unwrap().handle();
        assert_eq!(reg.create_vertex_layout(&b).unwrap(), Acquire::Existing(ha));
        assert!(reg.create_vertex_layout(&c).unwrap().is_created());
        assert_eq!(reg.vertex_layout(ha).unwrap().stride, a.stride());
    }

    #[test]
    fn test_framebuffer_holds_texture_refs() {
        let mut reg = registry();
        let color = reg
            .create_texture(TextureCreateInfo::new_2d(256, 128, TextureFormat::Rgba8))
            .unwrap();
        let mut attachment = Attachment::new(color);
        attachment.mip = 1;
        let fb = reg.create_framebuffer(&[attachment]).unwrap();
        let info = reg.framebuffer(fb).unwrap();
        assert_eq!((info.width, info.height), (128, 64));
        assert_eq!(reg.texture(color).unwrap().ref_count(), 2);

        assert_eq!(reg.destroy_texture(color).unwrap(), Release::Retained(1));
        assert_eq!(reg.destroy_framebuffer(fb).unwrap(), Release::Destroyed(vec![color]));
        assert!(reg.destroy_texture(color).unwrap().is_destroyed());
        assert!(!reg.is_valid(color));
    }

    #[test]
    fn test_pool_exhaustion() {
        let capacities = HandleCapacities { buffers: 2, ..HandleCapacities::default() };
        let mut reg = ResourceRegistry::new(&capacities);
        reg.create_buffer(16, BufferFlags::empty()).unwrap();
        reg.create_buffer(16, BufferFlags::empty()).unwrap();
        assert_eq!(
            reg.create_buffer(16, BufferFlags::empty()).unwrap_err(),
            RhiError::HandleExhausted { kind: ResourceKind::Buffer }
        );
    }

    #[test]
    fn test_ratio_textures_listed() {
        let mut reg = registry();
        let mut info = TextureCreateInfo::with_ratio(BackbufferRatio::Half, TextureFormat::Rgba8);
        info.width = 640;
        info.height = 360;
        let rt = reg.create_texture(info).unwrap();
        reg.create_texture(TextureCreateInfo::new_2d(4, 4, TextureFormat::R8)).unwrap();
        assert_eq!(reg.ratio_textures(), vec![(rt, BackbufferRatio::Half)]);
    }
}
