//! # WALRUS RHI
//!
//! Command-submission core of a render hardware interface.
//!
//! ## Design Principles
//!
//! 1. **Handles, not pointers** - every resource is a typed `u16` handle,
//!    refcounted and deduplicated by the [`ResourceRegistry`]
//! 2. **Record, then replay** - resource changes are serialized into
//!    per-frame command buffers and replayed on the render side
//! 3. **Sorted submission** - draws carry a 64-bit key, the frame is radix
//!    sorted before the backend sees it
//! 4. **Ownership handoff** - in dual-threaded mode frames move between the
//!    application and render threads by value, never behind a lock
//!
//! ## Thread Safety
//!
//! [`RhiContext`] is driven from one thread. Backends run on that thread
//! ([`ThreadMode::Single`]) or on a render thread the context owns
//! ([`ThreadMode::Dual`]).
//!
//! ## Example
//!
//! ```rust
//! use walrus_rhi::{
//!     AttribType, BufferFlags, DiscardFlags, HeadlessBackend, RhiConfig, RhiContext,
//!     ShaderType, VertexLayout,
//! };
//!
//! let backend = HeadlessBackend::new();
//! let journal = backend.journal();
//! let mut rhi = RhiContext::new(RhiConfig::single_threaded(), Box::new(backend)).unwrap();
//!
//! let layout = VertexLayout::begin().add(3, AttribType::Float, false).end();
//! let layout = rhi.create_vertex_layout(&layout).unwrap();
//! let vertices = rhi.create_buffer(&[0u8; 36], BufferFlags::empty()).unwrap();
//!
//! let vs = rhi.create_shader(ShaderType::Vertex, "void vs_main() {}").unwrap();
//! let fs = rhi.create_shader(ShaderType::Fragment, "void fs_main() {}").unwrap();
//! let program = rhi.create_program(&[vs, fs], true).unwrap();
//!
//! rhi.set_vertex_buffer(0, vertices, layout, 0, None);
//! rhi.submit(0, program, 0, DiscardFlags::ALL);
//! rhi.frame().unwrap();
//!
//! assert_eq!(journal.lock().stats.draw_calls, 1);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod backend;
pub mod command;
pub mod config;
pub mod context;
mod cursor;
pub mod error;
pub mod frame;
pub mod handle;
pub mod limits;
pub mod registry;
mod renderer;
pub mod sortkey;
pub mod state;
pub mod stats;
pub mod types;
pub mod uniform;
pub mod vertex_layout;
pub mod view;

pub use backend::{
    Capabilities, ExecutedItem, HeadlessBackend, HeadlessJournal, HeadlessProgram,
    RendererBackend, RhiCreateInfo,
};
pub use command::{CommandBuffer, CommandIter, Opcode, ResourceCommand};
pub use config::{HandleCapacities, RhiConfig, ThreadMode};
pub use context::{RhiContext, TransientIndexBuffer, TransientVertexBuffer};
pub use cursor::ByteReader;
pub use error::{RhiError, RhiResult};
pub use frame::{
    Binding, FreedHandles, RenderBind, RenderCompute, RenderDraw, RenderFrame, RenderItem,
    SortedItems, TransientBuffer, VertexStream,
};
pub use handle::{
    BufferHandle, FramebufferHandle, ProgramHandle, ResourceKind, RhiHandle, ShaderHandle,
    TextureHandle, UniformHandle, VertexLayoutHandle,
};
pub use registry::{Acquire, Release, ResourceRegistry};
pub use sortkey::{radix_sort, DrawOrder, SortKey, SortKind, ViewId, ViewOrder};
pub use state::{
    BlendEquation, BlendFactor, BlendFunc, CompareFunc, CullMode, PrimitiveType, RenderState,
    StencilFaces, StencilOp, StencilState, WriteMask,
};
pub use stats::RenderStats;
pub use types::{
    Access, Attachment, BackbufferRatio, BufferFlags, ClearFlags, DiscardFlags, Rect,
    Resolution, SamplerFlags, ShaderType, TextureCreateInfo, TextureFlags, TextureFormat,
    UniformType,
};
pub use uniform::{UniformBinding, UniformBuffer, UniformOp, UniformUpdate};
pub use vertex_layout::{AttribType, Attribute, VertexLayout, VertexLayoutBuilder};
pub use view::{View, ViewClear, ViewMode};
