//! # Headless Backend
//!
//! A backend with no device. It keeps a journal of everything the core asks
//! for: live resources, create/destroy counts, the items of the last frame
//! in execution order, clears and state changes. Tools that only need the
//! command stream and tests run against it.
//!
//! The journal sits behind an `Arc<Mutex<_>>` so it can be inspected from
//! the application thread while the backend lives on the render thread.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{Capabilities, RendererBackend, RhiCreateInfo};
use crate::error::{RhiError, RhiResult};
use crate::frame::{Binding, RenderFrame, RenderItem};
use crate::handle::{
    BufferHandle, FramebufferHandle, ProgramHandle, ResourceKind, ShaderHandle, TextureHandle,
    UniformHandle, VertexLayoutHandle,
};
use crate::sortkey::{SortKey, ViewId};
use crate::stats::RenderStats;
use crate::types::{Attachment, BufferFlags, ShaderType, TextureCreateInfo, UniformType};
use crate::uniform::{UniformBuffer, UniformUpdate};
use crate::vertex_layout::VertexLayout;

/// A linked program.
#[derive(Debug, Clone)]
pub struct HeadlessProgram {
    /// Attached shaders.
    pub shaders: Vec<ShaderHandle>,
    /// Uniforms the shaders declare, bound to locations at link time.
    pub bindings: UniformBuffer,
}

/// A declared uniform and its current value.
#[derive(Debug, Clone)]
pub struct HeadlessUniform {
    /// Name.
    pub name: String,
    /// Value type.
    pub uniform_type: UniformType,
    /// Element count.
    pub num: u16,
    /// Last written bytes.
    pub data: Vec<u8>,
}

/// A buffer's flags and contents.
#[derive(Debug, Clone)]
pub struct HeadlessBuffer {
    /// Creation flags.
    pub flags: BufferFlags,
    /// Contents.
    pub data: Vec<u8>,
}

/// One item as the backend executed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutedItem {
    /// Decoded sort key.
    pub key: SortKey,
    /// Vertices drawn, 0 for compute.
    pub num_vertices: u32,
    /// Indices drawn, 0 when not indexed.
    pub num_indices: u32,
    /// Instances drawn.
    pub num_instances: u32,
    /// Work groups, zero for draws.
    pub groups: [u32; 3],
    /// Program uniforms whose uniform was live at execution.
    pub bound_uniforms: u8,
    /// Occupied texture units.
    pub bound_units: u8,
}

/// Everything the headless backend has been asked to do.
#[derive(Debug, Default)]
pub struct HeadlessJournal {
    /// `init` succeeded.
    pub initialized: bool,
    /// `shutdown` was called.
    pub shut_down: bool,
    /// Frames submitted.
    pub frames: u64,
    /// Live shaders.
    pub shaders: HashMap<ShaderHandle, (ShaderType, String)>,
    /// Live programs.
    pub programs: HashMap<ProgramHandle, HeadlessProgram>,
    /// Live uniforms.
    pub uniforms: HashMap<UniformHandle, HeadlessUniform>,
    /// Live vertex layouts.
    pub vertex_layouts: HashMap<VertexLayoutHandle, VertexLayout>,
    /// Live buffers.
    pub buffers: HashMap<BufferHandle, HeadlessBuffer>,
    /// Live textures, with their current size.
    pub textures: HashMap<TextureHandle, TextureCreateInfo>,
    /// Live framebuffers.
    pub framebuffers: HashMap<FramebufferHandle, Vec<Attachment>>,
    /// Items of the last frame in execution order.
    pub executed: Vec<ExecutedItem>,
    /// Views of the last frame that cleared, in execution order.
    pub cleared_views: Vec<ViewId>,
    /// Counters of the last frame.
    pub stats: RenderStats,
    /// Calls that broke the backend contract, such as creating over a live
    /// handle or destroying an unknown one.
    pub violations: Vec<String>,
    created: [u32; ResourceKind::ALL.len()],
    destroyed: [u32; ResourceKind::ALL.len()],
}

impl HeadlessJournal {
    /// Creates of `kind` received so far.
    #[must_use]
    pub fn created(&self, kind: ResourceKind) -> u32 {
        self.created[kind.index()]
    }

    /// Destroys of `kind` received so far.
    #[must_use]
    pub fn destroyed(&self, kind: ResourceKind) -> u32 {
        self.destroyed[kind.index()]
    }

    /// Live resources of `kind`.
    #[must_use]
    pub fn live(&self, kind: ResourceKind) -> usize {
        match kind {
            ResourceKind::Shader => self.shaders.len(),
            ResourceKind::Program => self.programs.len(),
            ResourceKind::Uniform => self.uniforms.len(),
            ResourceKind::VertexLayout => self.vertex_layouts.len(),
            ResourceKind::Buffer => self.buffers.len(),
            ResourceKind::Texture => self.textures.len(),
            ResourceKind::Framebuffer => self.framebuffers.len(),
        }
    }

    fn violation(&mut self, message: String) {
        tracing::error!(%message, "backend contract violation");
        self.violations.push(message);
    }

    fn on_create(&mut self, kind: ResourceKind, id: u16, replaced: bool) {
        self.created[kind.index()] += 1;
        if replaced {
            self.violation(format!("{kind} {id} created while live"));
        }
    }

    fn on_destroy(&mut self, kind: ResourceKind, id: u16, existed: bool) {
        self.destroyed[kind.index()] += 1;
        if !existed {
            self.violation(format!("{kind} {id} destroyed but never created"));
        }
    }

    fn apply_uniform(&mut self, update: &UniformUpdate<'_>) {
        let Some(uniform) = self.uniforms.get_mut(&update.handle) else {
            self.violation(format!("write to unknown uniform {}", update.handle.id()));
            return;
        };
        let start = update.offset as usize;
        let end = start + update.data.len();
        if uniform.data.len() < end {
            uniform.data.resize(end, 0);
        }
        uniform.data[start..end].copy_from_slice(update.data);
    }

    fn write_buffer(&mut self, handle: BufferHandle, offset: u32, data: &[u8]) {
        let Some(buffer) = self.buffers.get_mut(&handle) else {
            self.violation(format!("write to unknown buffer {}", handle.id()));
            return;
        };
        let start = offset as usize;
        let end = start + data.len();
        if end > buffer.data.len() {
            if !buffer.flags.contains(BufferFlags::ALLOW_RESIZE) {
                let size = buffer.data.len();
                self.violation(format!("write past end of buffer {} ({end} > {size})", handle.id()));
                return;
            }
            buffer.data.resize(end, 0);
        }
        buffer.data[start..end].copy_from_slice(data);
    }

    /// Binds every uniform a program's shaders declare to a location.
    fn link(&self, shaders: &[ShaderHandle]) -> UniformBuffer {
        let mut bindings = UniformBuffer::new(64);
        let mut location = 0u32;
        let sources = shaders.iter().filter_map(|s| self.shaders.get(s));
        for name in sources.flat_map(|(_, source)| declared_uniforms(source)) {
            let found = self.uniforms.iter().find(|(_, u)| u.name == name);
            if let Some((&handle, uniform)) = found {
                let num = uniform.num.min(u16::from(u8::MAX)) as u8;
                bindings.write_uniform_handle(uniform.uniform_type, location, handle, num);
                location += 1;
            }
        }
        bindings.finish();
        bindings
    }
}

/// Names of `uniform <type> <name>;` declarations, array suffix stripped.
fn declared_uniforms(source: &str) -> impl Iterator<Item = &str> {
    source.lines().filter_map(|line| {
        let mut tokens = line.split_whitespace();
        tokens.by_ref().find(|t| *t == "uniform")?;
        let _type = tokens.next()?;
        let name = tokens.next()?.trim_end_matches(';');
        name.split('[').next().filter(|n| !n.is_empty())
    })
}

/// Device-less [`RendererBackend`].
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    journal: Arc<Mutex<HeadlessJournal>>,
    caps: Capabilities,
    fail_init: Option<String>,
    frame_delay: Duration,
}

impl HeadlessBackend {
    /// Creates a backend reporting default capabilities.
    #[must_use]
    pub fn new() -> Self {
        Self {
            caps: Capabilities {
                renderer_name: String::from("headless"),
                ..Capabilities::default()
            },
            ..Self::default()
        }
    }

    /// Reports `caps` from `init`.
    #[must_use]
    pub fn with_capabilities(mut self, caps: Capabilities) -> Self {
        self.caps = caps;
        self
    }

    /// Makes `init` fail with `reason`.
    #[must_use]
    pub fn failing_init(mut self, reason: impl Into<String>) -> Self {
        self.fail_init = Some(reason.into());
        self
    }

    /// Sleeps for `delay` at the start of every `submit`.
    #[must_use]
    pub const fn with_frame_delay(mut self, delay: Duration) -> Self {
        self.frame_delay = delay;
        self
    }

    /// Shared handle to the journal.
    #[must_use]
    pub fn journal(&self) -> Arc<Mutex<HeadlessJournal>> {
        Arc::clone(&self.journal)
    }
}

impl RendererBackend for HeadlessBackend {
    fn init(&mut self, info: &RhiCreateInfo) -> RhiResult<Capabilities> {
        if let Some(reason) = &self.fail_init {
            return Err(RhiError::BackendInit(reason.clone()));
        }
        tracing::info!(
            width = info.resolution.width,
            height = info.resolution.height,
            mode = ?info.thread_mode,
            "headless backend initialized"
        );
        self.journal.lock().initialized = true;
        Ok(self.caps.clone())
    }

    fn shutdown(&mut self) {
        let mut journal = self.journal.lock();
        journal.shut_down = true;
        tracing::info!(frames = journal.frames, "headless backend shut down");
    }

    fn submit(&mut self, frame: &RenderFrame) {
        if !self.frame_delay.is_zero() {
            std::thread::sleep(self.frame_delay);
        }

        let mut guard = self.journal.lock();
        let journal = &mut *guard;
        let mut stats = RenderStats::default();
        let mut executed = Vec::with_capacity(frame.num_items() as usize);
        let mut cleared = Vec::new();

        for (handle, bytes) in [frame.transient_vertices(), frame.transient_indices()] {
            if !bytes.is_empty() {
                journal.write_buffer(handle, 0, bytes);
                stats.transient_bytes += bytes.len() as u64;
            }
        }

        let mut view = None;
        let mut program = ProgramHandle::INVALID;
        let mut bound_uniforms = 0u8;
        let mut state = None;

        for (key, item, bind) in frame.sorted() {
            if view != Some(key.view) {
                view = Some(key.view);
                stats.view_changes += 1;
                if frame.view(key.view).is_some_and(|v| v.clear.clears_anything()) {
                    cleared.push(key.view);
                }
                program = ProgramHandle::INVALID;
                bound_uniforms = 0;
                state = None;
            }

            let (begin, end) = item.uniform_range();
            for update in frame.uniforms().updates(begin as usize, end as usize) {
                journal.apply_uniform(&update);
                stats.uniform_updates += 1;
            }

            if key.program != program {
                program = key.program;
                stats.program_changes += 1;
                bound_uniforms = journal.programs.get(&program).map_or(0, |p| {
                    let live = p
                        .bindings
                        .bindings()
                        .filter(|b| journal.uniforms.contains_key(&b.handle));
                    live.count().min(usize::from(u8::MAX)) as u8
                });
            }

            let mut bound_units = 0u8;
            for (unit, binding) in bind.bound() {
                bound_units += 1;
                let live = match *binding {
                    Binding::Texture { handle, .. } | Binding::Image { handle, .. } => {
                        journal.textures.contains_key(&handle)
                    }
                    Binding::Buffer { handle, .. } => journal.buffers.contains_key(&handle),
                    Binding::None => true,
                };
                if !live {
                    journal.violation(format!("unit {unit} bound to a dead resource"));
                }
            }

            match item {
                RenderItem::Compute(compute) => {
                    stats.compute_calls += 1;
                    executed.push(ExecutedItem {
                        key,
                        num_vertices: 0,
                        num_indices: 0,
                        num_instances: 0,
                        groups: [compute.num_x, compute.num_y, compute.num_z],
                        bound_uniforms,
                        bound_units,
                    });
                }
                RenderItem::Draw(draw) => {
                    if state != Some((draw.state, draw.stencil)) {
                        state = Some((draw.state, draw.stencil));
                        stats.state_changes += 1;
                    }
                    // Invalid program: the item only exists to clear its view.
                    if !key.program.is_valid() {
                        continue;
                    }
                    stats.record_draw(draw.num_vertices, draw.num_indices, draw.num_instances);
                    executed.push(ExecutedItem {
                        key,
                        num_vertices: draw.num_vertices,
                        num_indices: draw.num_indices,
                        num_instances: draw.num_instances,
                        groups: [0; 3],
                        bound_uniforms,
                        bound_units,
                    });
                }
            }
        }

        journal.frames += 1;
        journal.stats = stats;
        journal.executed = executed;
        journal.cleared_views = cleared;
        stats.trace(journal.frames);
    }

    fn create_shader(&mut self, handle: ShaderHandle, shader_type: ShaderType, source: &str) {
        let mut journal = self.journal.lock();
        let replaced = journal.shaders.insert(handle, (shader_type, source.to_owned())).is_some();
        journal.on_create(ResourceKind::Shader, handle.id(), replaced);
    }

    fn destroy_shader(&mut self, handle: ShaderHandle) {
        let mut journal = self.journal.lock();
        let existed = journal.shaders.remove(&handle).is_some();
        journal.on_destroy(ResourceKind::Shader, handle.id(), existed);
    }

    fn create_program(&mut self, handle: ProgramHandle, shaders: &[ShaderHandle]) {
        let mut journal = self.journal.lock();
        if let Some(missing) = shaders.iter().find(|s| !journal.shaders.contains_key(*s)) {
            let message = format!("program {} links dead shader {}", handle.id(), missing.id());
            journal.violation(message);
        }
        let bindings = journal.link(shaders);
        let program = HeadlessProgram { shaders: shaders.to_vec(), bindings };
        let replaced = journal.programs.insert(handle, program).is_some();
        journal.on_create(ResourceKind::Program, handle.id(), replaced);
    }

    fn destroy_program(&mut self, handle: ProgramHandle) {
        let mut journal = self.journal.lock();
        let existed = journal.programs.remove(&handle).is_some();
        journal.on_destroy(ResourceKind::Program, handle.id(), existed);
    }

    fn create_uniform(
        &mut self,
        handle: UniformHandle,
        name: &str,
        uniform_type: UniformType,
        num: u16,
    ) {
        let mut journal = self.journal.lock();
        let uniform = HeadlessUniform {
            name: name.to_owned(),
            uniform_type,
            num,
            data: vec![0; (uniform_type.size() * u32::from(num)) as usize],
        };
        let replaced = journal.uniforms.insert(handle, uniform).is_some();
        journal.on_create(ResourceKind::Uniform, handle.id(), replaced);
    }

    fn resize_uniform(&mut self, handle: UniformHandle, num: u16) {
        let mut journal = self.journal.lock();
        match journal.uniforms.get_mut(&handle) {
            Some(uniform) => {
                uniform.num = num;
                let size = (uniform.uniform_type.size() * u32::from(num)) as usize;
                uniform.data.resize(size, 0);
            }
            None => journal.violation(format!("resize of unknown uniform {}", handle.id())),
        }
    }

    fn destroy_uniform(&mut self, handle: UniformHandle) {
        let mut journal = self.journal.lock();
        let existed = journal.uniforms.remove(&handle).is_some();
        journal.on_destroy(ResourceKind::Uniform, handle.id(), existed);
    }

    fn create_vertex_layout(&mut self, handle: VertexLayoutHandle, layout: &VertexLayout) {
        let mut journal = self.journal.lock();
        let replaced = journal.vertex_layouts.insert(handle, *layout).is_some();
        journal.on_create(ResourceKind::VertexLayout, handle.id(), replaced);
    }

    fn destroy_vertex_layout(&mut self, handle: VertexLayoutHandle) {
        let mut journal = self.journal.lock();
        let existed = journal.vertex_layouts.remove(&handle).is_some();
        journal.on_destroy(ResourceKind::VertexLayout, handle.id(), existed);
    }

    fn create_buffer(
        &mut self,
        handle: BufferHandle,
        flags: BufferFlags,
        size: u32,
        data: Option<&[u8]>,
    ) {
        let mut journal = self.journal.lock();
        let mut contents = vec![0; size as usize];
        if let Some(data) = data {
            let len = data.len().min(contents.len());
            contents[..len].copy_from_slice(&data[..len]);
        }
        let buffer = HeadlessBuffer { flags, data: contents };
        let replaced = journal.buffers.insert(handle, buffer).is_some();
        journal.on_create(ResourceKind::Buffer, handle.id(), replaced);
    }

    fn update_buffer(&mut self, handle: BufferHandle, offset: u32, data: &[u8]) {
        self.journal.lock().write_buffer(handle, offset, data);
    }

    fn destroy_buffer(&mut self, handle: BufferHandle) {
        let mut journal = self.journal.lock();
        let existed = journal.buffers.remove(&handle).is_some();
        journal.on_destroy(ResourceKind::Buffer, handle.id(), existed);
    }

    fn create_texture(
        &mut self,
        handle: TextureHandle,
        info: &TextureCreateInfo,
        _data: Option<&[u8]>,
    ) {
        let mut journal = self.journal.lock();
        let replaced = journal.textures.insert(handle, *info).is_some();
        journal.on_create(ResourceKind::Texture, handle.id(), replaced);
    }

    fn resize_texture(
        &mut self,
        handle: TextureHandle,
        width: u32,
        height: u32,
        depth: u32,
        num_mipmaps: u8,
        num_layers: u16,
    ) {
        let mut journal = self.journal.lock();
        match journal.textures.get_mut(&handle) {
            Some(info) => {
                info.width = width;
                info.height = height;
                info.depth = depth;
                info.num_mipmaps = num_mipmaps;
                info.num_layers = num_layers;
            }
            None => journal.violation(format!("resize of unknown texture {}", handle.id())),
        }
    }

    fn destroy_texture(&mut self, handle: TextureHandle) {
        let mut journal = self.journal.lock();
        let existed = journal.textures.remove(&handle).is_some();
        journal.on_destroy(ResourceKind::Texture, handle.id(), existed);
    }

    fn create_framebuffer(&mut self, handle: FramebufferHandle, attachments: &[Attachment]) {
        let mut journal = self.journal.lock();
        if attachments.iter().any(|a| !journal.textures.contains_key(&a.handle)) {
            journal.violation(format!("framebuffer {} attaches a dead texture", handle.id()));
        }
        let replaced = journal.framebuffers.insert(handle, attachments.to_vec()).is_some();
        journal.on_create(ResourceKind::Framebuffer, handle.id(), replaced);
    }

    fn destroy_framebuffer(&mut self, handle: FramebufferHandle) {
        let mut journal = self.journal.lock();
        let existed = journal.framebuffers.remove(&handle).is_some();
        journal.on_destroy(ResourceKind::Framebuffer, handle.id(), existed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThreadMode;
    use crate::types::Resolution;

    fn create_info() -> RhiCreateInfo {
        RhiCreateInfo { resolution: Resolution::default(), thread_mode: ThreadMode::Single }
    }

    #[test]
    fn test_declared_uniforms() {
        let source = "uniform vec4 u_color;\nuniform mat4 u_bones[32];\nvoid main() {}";
        let names: Vec<&str> = declared_uniforms(source).collect();
        assert_eq!(names, vec!["u_color", "u_bones"]);
    }

    #[test]
    fn test_init_failure() {
        let mut backend = HeadlessBackend::new().failing_init("no device");
        let err = backend.init(&create_info()).unwrap_err();
        assert_eq!(err, RhiError::BackendInit("no device".into()));
        assert!(!backend.journal().lock().initialized);
    }

    #[test]
    fn test_link_binds_declared_uniforms() {
        let mut backend = HeadlessBackend::new();
        backend.init(&create_info()).unwrap();
        backend.create_uniform(UniformHandle(0), "u_color", UniformType::Vec4, 1);
        backend.create_shader(ShaderHandle(0), ShaderType::Fragment, "uniform vec4 u_color;");
        backend.create_program(ProgramHandle(0), &[ShaderHandle(0)]);

        let journal = backend.journal();
        let journal = journal.lock();
        let bindings: Vec<_> = journal.programs[&ProgramHandle(0)].bindings.bindings().collect();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].handle, UniformHandle(0));
        assert_eq!(bindings[0].location, 0);
        assert!(journal.violations.is_empty());
    }

    #[test]
    fn test_contract_violations_recorded() {
        let mut backend = HeadlessBackend::new();
        backend.destroy_texture(TextureHandle(4));
        backend.create_buffer(BufferHandle(0), BufferFlags::empty(), 4, None);
        backend.update_buffer(BufferHandle(0), 2, &[1, 2, 3]);

        let journal = backend.journal();
        let journal = journal.lock();
        assert_eq!(journal.violations.len(), 2);
        assert_eq!(journal.destroyed(ResourceKind::Texture), 1);
        assert_eq!(journal.live(ResourceKind::Buffer), 1);
    }

    #[test]
    fn test_resizable_buffer_grows() {
        let mut backend = HeadlessBackend::new();
        backend.create_buffer(BufferHandle(1), BufferFlags::ALLOW_RESIZE, 2, Some(&[9, 9]));
        backend.update_buffer(BufferHandle(1), 1, &[1, 2, 3]);
        let journal = backend.journal();
        assert_eq!(journal.lock().buffers[&BufferHandle(1)].data, vec![9, 1, 2, 3]);
    }
}
