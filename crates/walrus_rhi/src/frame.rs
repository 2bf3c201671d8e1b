//! # Render Frames
//!
//! A [`RenderFrame`] is everything one frame needs on the render side:
//! resource command buffers, the uniform log, the matrix cache, the
//! transient vertex/index arenas, the recorded items and their sort keys,
//! and a snapshot of the views.
//!
//! ## Lifecycle
//!
//! ```text
//! start() ──▶ accumulating ──▶ finish() ──▶ executing ──▶ start() ...
//!              (submit side)    (sealed)     (render side)
//! ```
//!
//! Exactly one thread owns a frame at any time. Nothing inside is locked.

use glam::Mat4;
use walrus_core::{ArenaGrant, TransientArena};

use crate::command::CommandBuffer;
use crate::config::RhiConfig;
use crate::handle::{BufferHandle, ResourceKind, TextureHandle, VertexLayoutHandle};
use crate::limits::{MAX_TEXTURE_SAMPLERS, MAX_VERTEX_STREAMS, MAX_VIEWS};
use crate::sortkey::{radix_sort, SortKey, ViewOrder};
use crate::state::RenderState;
use crate::types::{Access, DiscardFlags, Rect, Resolution, SamplerFlags, TextureFormat};
use crate::uniform::UniformBuffer;
use crate::view::View;

/// One bound vertex stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexStream {
    /// Source buffer.
    pub buffer: BufferHandle,
    /// Layout of the buffer's vertices.
    pub layout: VertexLayoutHandle,
    /// First vertex.
    pub start_vertex: u32,
    /// Vertices available from `start_vertex`.
    pub num_vertices: u32,
}

impl Default for VertexStream {
    fn default() -> Self {
        Self {
            buffer: BufferHandle::INVALID,
            layout: VertexLayoutHandle::INVALID,
            start_vertex: 0,
            num_vertices: 0,
        }
    }
}

/// A recorded draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderDraw {
    /// Vertex streams, meaningful where `stream_mask` has a bit set.
    pub streams: [VertexStream; MAX_VERTEX_STREAMS],
    /// Bit `i` is set when stream `i` is bound.
    pub stream_mask: u8,
    /// Vertex count to draw. Resolved to the smallest bound stream at submit.
    pub num_vertices: u32,
    /// Index buffer, invalid for non-indexed draws.
    pub index_buffer: BufferHandle,
    /// 32-bit indices instead of 16-bit.
    pub index32: bool,
    /// First index.
    pub start_index: u32,
    /// Index count.
    pub num_indices: u32,
    /// Per-instance data stream.
    pub instance: VertexStream,
    /// Instance count.
    pub num_instances: u32,
    /// Packed [`RenderState`].
    pub state: u64,
    /// Packed [`crate::state::StencilFaces`].
    pub stencil: u64,
    /// Constant blend color as `0xRRGGBBAA`.
    pub blend_factor: u32,
    /// Per-draw scissor, zero sized when unused.
    pub scissor: Rect,
    /// Start of this draw's writes in the frame's uniform log.
    pub uniform_begin: u32,
    /// End of this draw's writes in the frame's uniform log.
    pub uniform_end: u32,
    /// First matrix in the frame's matrix cache.
    pub start_matrix: u32,
    /// Number of matrices.
    pub num_matrices: u32,
}

impl Default for RenderDraw {
    fn default() -> Self {
        Self {
            streams: [VertexStream::default(); MAX_VERTEX_STREAMS],
            stream_mask: 0,
            num_vertices: 0,
            index_buffer: BufferHandle::INVALID,
            index32: false,
            start_index: 0,
            num_indices: 0,
            instance: VertexStream::default(),
            num_instances: 1,
            state: RenderState::default().encode(),
            stencil: 0,
            blend_factor: 0,
            scissor: Rect::default(),
            uniform_begin: 0,
            uniform_end: 0,
            start_matrix: 0,
            num_matrices: 1,
        }
    }
}

impl RenderDraw {
    /// Returns true if an index buffer is bound.
    #[inline]
    #[must_use]
    pub const fn is_indexed(&self) -> bool {
        self.index_buffer.is_valid()
    }

    /// Returns true if stream `stream` is bound.
    #[inline]
    #[must_use]
    pub const fn has_stream(&self, stream: usize) -> bool {
        stream < MAX_VERTEX_STREAMS && self.stream_mask & (1 << stream) != 0
    }

    /// Bound streams with their slot.
    pub fn bound_streams(&self) -> impl Iterator<Item = (usize, &VertexStream)> {
        self.streams.iter().enumerate().filter(|(i, _)| self.has_stream(*i))
    }

    /// Smallest vertex count across bound streams, `None` without streams.
    #[must_use]
    pub fn stream_vertices(&self) -> Option<u32> {
        self.bound_streams().map(|(_, s)| s.num_vertices).min()
    }

    /// Resets the parts of the draw named by `flags`.
    pub fn clear(&mut self, flags: DiscardFlags) {
        let fresh = Self::default();
        if flags.contains(DiscardFlags::VERTEX_STREAMS) {
            self.streams = fresh.streams;
            self.stream_mask = 0;
            self.num_vertices = 0;
        }
        if flags.contains(DiscardFlags::INDEX_BUFFER) {
            self.index_buffer = fresh.index_buffer;
            self.index32 = false;
            self.start_index = 0;
            self.num_indices = 0;
        }
        if flags.contains(DiscardFlags::INSTANCE_DATA) {
            self.instance = fresh.instance;
            self.num_instances = 1;
        }
        if flags.contains(DiscardFlags::STATE) {
            self.state = fresh.state;
            self.stencil = 0;
            self.blend_factor = 0;
            self.scissor = Rect::default();
        }
        if flags.contains(DiscardFlags::TRANSFORM) {
            self.start_matrix = 0;
            self.num_matrices = 1;
        }
    }
}

/// A recorded compute dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderCompute {
    /// Work groups in x.
    pub num_x: u32,
    /// Work groups in y.
    pub num_y: u32,
    /// Work groups in z.
    pub num_z: u32,
    /// Start of this dispatch's writes in the frame's uniform log.
    pub uniform_begin: u32,
    /// End of this dispatch's writes in the frame's uniform log.
    pub uniform_end: u32,
    /// First matrix in the frame's matrix cache.
    pub start_matrix: u32,
    /// Number of matrices.
    pub num_matrices: u32,
}

/// A recorded item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderItem {
    /// Draw call.
    Draw(RenderDraw),
    /// Compute dispatch.
    Compute(RenderCompute),
}

impl RenderItem {
    /// Uniform log range of the item.
    #[must_use]
    pub const fn uniform_range(&self) -> (u32, u32) {
        match self {
            Self::Draw(draw) => (draw.uniform_begin, draw.uniform_end),
            Self::Compute(compute) => (compute.uniform_begin, compute.uniform_end),
        }
    }

    /// Matrix cache range of the item.
    #[must_use]
    pub const fn matrices(&self) -> (u32, u32) {
        match self {
            Self::Draw(draw) => (draw.start_matrix, draw.num_matrices),
            Self::Compute(compute) => (compute.start_matrix, compute.num_matrices),
        }
    }
}

/// One texture/image/buffer binding slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Binding {
    /// Nothing bound.
    #[default]
    None,
    /// Sampled texture.
    Texture {
        /// Texture.
        handle: TextureHandle,
        /// Sampler state.
        sampler: SamplerFlags,
    },
    /// Storage image.
    Image {
        /// Texture.
        handle: TextureHandle,
        /// Mip level.
        mip: u8,
        /// Access mode.
        access: Access,
        /// View format.
        format: TextureFormat,
    },
    /// Storage buffer.
    Buffer {
        /// Buffer.
        handle: BufferHandle,
        /// Access mode.
        access: Access,
    },
}

/// Bindings of one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderBind {
    /// Slot per texture unit.
    pub bindings: [Binding; MAX_TEXTURE_SAMPLERS],
}

impl Default for RenderBind {
    fn default() -> Self {
        Self { bindings: [Binding::None; MAX_TEXTURE_SAMPLERS] }
    }
}

impl RenderBind {
    /// Unbinds every slot if `flags` discards bindings.
    pub fn clear(&mut self, flags: DiscardFlags) {
        if flags.contains(DiscardFlags::BINDINGS) {
            self.bindings = [Binding::None; MAX_TEXTURE_SAMPLERS];
        }
    }

    /// Occupied slots with their unit.
    pub fn bound(&self) -> impl Iterator<Item = (usize, &Binding)> {
        self.bindings
            .iter()
            .enumerate()
            .filter(|(_, b)| !matches!(b, Binding::None))
    }
}

/// A frame's transient arena and the backend buffer it uploads into.
#[derive(Debug)]
pub struct TransientBuffer {
    /// CPU-side bytes.
    pub arena: TransientArena,
    /// Backend buffer receiving the used bytes before the frame's draws.
    pub handle: BufferHandle,
}

/// Ids whose resources were destroyed this frame, returned to the
/// allocators when the frame is sealed.
#[derive(Debug, Default)]
pub struct FreedHandles {
    queues: [Vec<u16>; ResourceKind::ALL.len()],
}

impl FreedHandles {
    /// Queues `id` of `kind`.
    pub fn push(&mut self, kind: ResourceKind, id: u16) {
        self.queues[kind.index()].push(id);
    }

    /// Queued ids of `kind`.
    #[must_use]
    pub fn queued(&self, kind: ResourceKind) -> &[u16] {
        &self.queues[kind.index()]
    }

    /// Removes and returns the queued ids of `kind`.
    pub fn drain(&mut self, kind: ResourceKind) -> std::vec::Drain<'_, u16> {
        self.queues[kind.index()].drain(..)
    }

    /// Total queued ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queues.iter().map(Vec::len).sum()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queues.iter().all(Vec::is_empty)
    }

    fn clear(&mut self) {
        for queue in &mut self.queues {
            queue.clear();
        }
    }
}

/// Per-frame render data.
#[derive(Debug)]
pub struct RenderFrame {
    pub(crate) pre: CommandBuffer,
    pub(crate) post: CommandBuffer,
    pub(crate) uniforms: UniformBuffer,
    pub(crate) transient_vb: TransientBuffer,
    pub(crate) transient_ib: TransientBuffer,
    pub(crate) freed: FreedHandles,
    pub(crate) views: [View; MAX_VIEWS],
    pub(crate) view_order: ViewOrder,
    pub(crate) resolution: Resolution,
    pub(crate) frame_number: u64,
    matrices: Vec<Mat4>,
    max_matrices: u32,
    items: Vec<RenderItem>,
    binds: Vec<RenderBind>,
    sort_keys: Vec<u64>,
    sort_values: Vec<u32>,
    tmp_keys: Vec<u64>,
    tmp_values: Vec<u32>,
    max_items: u32,
    sorted: bool,
}

impl RenderFrame {
    /// Creates an empty frame sized by `config`, uploading transient data
    /// into the buffers `transient_vb` and `transient_ib`.
    #[must_use]
    pub fn new(config: &RhiConfig, transient_vb: BufferHandle, transient_ib: BufferHandle) -> Self {
        let reserve = config.max_draw_calls.min(1024) as usize;
        let mut frame = Self {
            pre: CommandBuffer::new(config.command_buffer_size),
            post: CommandBuffer::new(config.command_buffer_size),
            uniforms: UniformBuffer::new(config.uniform_buffer_size),
            transient_vb: TransientBuffer {
                arena: TransientArena::new(config.transient_vb_size),
                handle: transient_vb,
            },
            transient_ib: TransientBuffer {
                arena: TransientArena::new(config.transient_ib_size),
                handle: transient_ib,
            },
            freed: FreedHandles::default(),
            views: [View::default(); MAX_VIEWS],
            view_order: ViewOrder::identity(),
            resolution: config.resolution,
            frame_number: 0,
            matrices: Vec::with_capacity(reserve),
            max_matrices: config.max_matrices,
            items: Vec::with_capacity(reserve),
            binds: Vec::with_capacity(reserve),
            sort_keys: Vec::with_capacity(reserve),
            sort_values: Vec::with_capacity(reserve),
            tmp_keys: Vec::new(),
            tmp_values: Vec::new(),
            max_items: config.max_draw_calls,
            sorted: false,
        };
        frame.start();
        frame
    }

    /// Resets the frame for accumulation. Nothing is reallocated.
    pub fn start(&mut self) {
        self.pre.start();
        self.post.start();
        self.uniforms.start();
        self.transient_vb.arena.reset();
        self.transient_ib.arena.reset();
        self.freed.clear();
        self.matrices.clear();
        self.matrices.push(Mat4::IDENTITY);
        self.items.clear();
        self.binds.clear();
        self.sort_keys.clear();
        self.sort_values.clear();
        self.sorted = false;
    }

    /// Seals the command buffers and the uniform log.
    pub fn finish(&mut self) {
        self.uniforms.finish();
        self.pre.finish();
        self.post.finish();
    }

    /// Copies `matrices` into the cache and returns `(first, count)`.
    ///
    /// A full cache clamps the count, possibly to zero.
    pub fn add_matrices(&mut self, matrices: &[Mat4]) -> (u32, u32) {
        let first = self.matrices.len() as u32;
        let room = self.max_matrices.saturating_sub(first) as usize;
        let count = matrices.len().min(room);
        if count < matrices.len() {
            tracing::warn!(
                requested = matrices.len(),
                granted = count,
                max = self.max_matrices,
                "matrix cache full, transforms clamped"
            );
        }
        self.matrices.extend_from_slice(&matrices[..count]);
        (first, count as u32)
    }

    /// Grants up to `num` vertices of `stride` bytes from the transient
    /// vertex arena.
    pub fn alloc_transient_vb(&mut self, num: u32, stride: u32) -> ArenaGrant {
        self.transient_vb.arena.alloc_strided(num, stride)
    }

    /// Grants up to `num` indices of `stride` bytes from the transient
    /// index arena.
    pub fn alloc_transient_ib(&mut self, num: u32, stride: u32) -> ArenaGrant {
        self.transient_ib.arena.alloc_strided(num, stride)
    }

    /// Records an item under `key`. Returns false if the frame is full.
    pub fn push_item(&mut self, key: u64, item: RenderItem, bind: RenderBind) -> bool {
        let index = self.items.len() as u32;
        if index >= self.max_items {
            tracing::warn!(max = self.max_items, "draw call limit reached, item dropped");
            return false;
        }
        self.items.push(item);
        self.binds.push(bind);
        self.sort_keys.push(key);
        self.sort_values.push(index);
        self.sorted = false;
        true
    }

    /// Orders the items by sort key. Idempotent until the next push.
    pub fn sort(&mut self) {
        if self.sorted {
            return;
        }
        radix_sort(
            &mut self.sort_keys,
            &mut self.sort_values,
            &mut self.tmp_keys,
            &mut self.tmp_values,
        );
        self.sorted = true;
    }

    /// Items in key order. Call [`sort`](Self::sort) first.
    #[must_use]
    pub fn sorted(&self) -> SortedItems<'_> {
        debug_assert!(self.sorted || self.items.len() < 2, "RenderFrame::sorted before sort");
        SortedItems { frame: self, index: 0 }
    }

    /// Items in submission order.
    #[must_use]
    pub fn items(&self) -> &[RenderItem] {
        &self.items
    }

    /// Number of recorded items.
    #[inline]
    #[must_use]
    pub fn num_items(&self) -> u32 {
        self.items.len() as u32
    }

    /// Matrix cache. Slot 0 is the identity.
    #[must_use]
    pub fn matrices(&self) -> &[Mat4] {
        &self.matrices
    }

    /// The uniform log.
    #[must_use]
    pub const fn uniforms(&self) -> &UniformBuffer {
        &self.uniforms
    }

    /// Resource creates and updates, executed before the items.
    #[must_use]
    pub const fn pre_commands(&self) -> &CommandBuffer {
        &self.pre
    }

    /// Resource destroys, executed after the items.
    #[must_use]
    pub const fn post_commands(&self) -> &CommandBuffer {
        &self.post
    }

    /// Transient vertex bytes written this frame and their target buffer.
    #[must_use]
    pub fn transient_vertices(&self) -> (BufferHandle, &[u8]) {
        (self.transient_vb.handle, self.transient_vb.arena.used_bytes())
    }

    /// Transient index bytes written this frame and their target buffer.
    #[must_use]
    pub fn transient_indices(&self) -> (BufferHandle, &[u8]) {
        (self.transient_ib.handle, self.transient_ib.arena.used_bytes())
    }

    /// Snapshot of view `id`, viewport resolved against the frame's
    /// resolution.
    #[must_use]
    pub fn view(&self, id: u8) -> Option<&View> {
        self.views.get(usize::from(id))
    }

    /// The view order used to encode this frame's keys.
    #[must_use]
    pub const fn view_order(&self) -> &ViewOrder {
        &self.view_order
    }

    /// Backbuffer size when the frame was sealed.
    #[must_use]
    pub const fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Sequence number assigned when the frame was sealed.
    #[must_use]
    pub const fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Ids waiting to return to the allocators.
    #[must_use]
    pub const fn freed(&self) -> &FreedHandles {
        &self.freed
    }
}

/// Iterator returned by [`RenderFrame::sorted`].
#[derive(Debug)]
pub struct SortedItems<'a> {
    frame: &'a RenderFrame,
    index: usize,
}

impl<'a> Iterator for SortedItems<'a> {
    type Item = (SortKey, &'a RenderItem, &'a RenderBind);

    fn next(&mut self) -> Option<Self::Item> {
        let key = *self.frame.sort_keys.get(self.index)?;
        let item = self.frame.sort_values[self.index] as usize;
        self.index += 1;
        let decoded = SortKey::decode(key, &self.frame.view_order);
        Some((decoded, &self.frame.items[item], &self.frame.binds[item]))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.frame.sort_keys.len() - self.index;
        (left, Some(left))
    }
}

impl ExactSizeIterator for SortedItems<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::ProgramHandle;
    use crate::sortkey::{DrawOrder, SortKind};

    fn small_config() -> RhiConfig {
        RhiConfig {
            max_draw_calls: 4,
            max_matrices: 3,
            transient_vb_size: 64,
            transient_ib_size: 32,
            ..RhiConfig::default()
        }
    }

    fn frame() -> RenderFrame {
        RenderFrame::new(&small_config(), BufferHandle(0), BufferHandle(1))
    }

    fn draw_key(view: u8, depth: u32, order: &ViewOrder) -> u64 {
        SortKey {
            view,
            program: ProgramHandle(0),
            kind: SortKind::Draw(DrawOrder::DepthAscending { depth }),
        }
        .encode(order)
    }

    #[test]
    fn test_identity_at_slot_zero() {
        let mut frame = frame();
        assert_eq!(frame.matrices(), &[Mat4::IDENTITY]);
        let (first, count) = frame.add_matrices(&[Mat4::from_scale(glam::Vec3::splat(2.0))]);
        assert_eq!((first, count), (1, 1));

        frame.start();
        assert_eq!(frame.matrices().len(), 1);
    }

    #[test]
    fn test_matrix_cache_clamps() {
        let mut frame = frame();
        let (first, count) = frame.add_matrices(&[Mat4::IDENTITY; 5]);
        assert_eq!((first, count), (1, 2));
        assert_eq!(frame.add_matrices(&[Mat4::IDENTITY]), (3, 0));
    }

    #[test]
    fn test_item_limit() {
        let mut frame = frame();
        let order = ViewOrder::identity();
        for depth in 0..4 {
            let key = draw_key(0, depth, &order);
            assert!(frame.push_item(key, RenderItem::Draw(RenderDraw::default()), RenderBind::default()));
        }
        let key = draw_key(0, 9, &order);
        assert!(!frame.push_item(key, RenderItem::Draw(RenderDraw::default()), RenderBind::default()));
        assert_eq!(frame.num_items(), 4);
    }

    #[test]
    fn test_sorted_yields_items_in_key_order() {
        let mut frame = frame();
        let order = ViewOrder::identity();
        for (view, depth) in [(1u8, 5u32), (0, 7), (1, 2)] {
            let mut draw = RenderDraw::default();
            draw.num_vertices = depth;
            frame.push_item(draw_key(view, depth, &order), RenderItem::Draw(draw), RenderBind::default());
        }
        frame.sort();

        let seen: Vec<(u8, u32)> = frame
            .sorted()
            .map(|(key, item, _)| match item {
                RenderItem::Draw(draw) => (key.view, draw.num_vertices),
                RenderItem::Compute(_) => unreachable!(),
            })
            .collect();
        assert_eq!(seen, vec![(0, 7), (1, 2), (1, 5)]);
    }

    #[test]
    fn test_transient_grants_clamp() {
        let mut frame = frame();
        let grant = frame.alloc_transient_vb(100, 16);
        assert_eq!(grant.count, 4);
        assert_eq!(frame.alloc_transient_vb(1, 16).count, 0);
        assert_eq!(frame.transient_vertices().1.len(), 64);

        frame.start();
        assert_eq!(frame.alloc_transient_ib(8, 2).count, 8);
    }

    #[test]
    fn test_draw_clear_respects_flags() {
        let mut draw = RenderDraw {
            stream_mask: 1,
            index_buffer: BufferHandle(3),
            num_indices: 6,
            start_matrix: 4,
            num_matrices: 2,
            ..RenderDraw::default()
        };
        draw.clear(DiscardFlags::INDEX_BUFFER);
        assert!(!draw.is_indexed());
        assert_eq!(draw.stream_mask, 1);
        assert_eq!(draw.start_matrix, 4);

        draw.clear(DiscardFlags::ALL);
        assert_eq!(draw, RenderDraw::default());
    }

    #[test]
    fn test_freed_handles_drain_per_kind() {
        let mut frame = frame();
        frame.freed.push(ResourceKind::Shader, 3);
        frame.freed.push(ResourceKind::Texture, 1);
        assert_eq!(frame.freed().len(), 2);
        let shaders: Vec<u16> = frame.freed.drain(ResourceKind::Shader).collect();
        assert_eq!(shaders, vec![3]);
        assert_eq!(frame.freed().queued(ResourceKind::Texture), &[1]);

        frame.start();
        assert!(frame.freed().is_empty());
    }
}
