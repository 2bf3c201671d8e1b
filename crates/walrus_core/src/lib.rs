//! # WALRUS Core
//!
//! Allocation and synchronization primitives for the render hardware
//! interface:
//! - Fixed-capacity handle pools with O(1) alloc/free/validate
//! - Strided bump arenas for per-frame scratch memory
//! - A capacity-1 double-buffer handoff between submit and render threads
//!
//! ## Architecture Rules
//!
//! 1. **Fixed capacities** - pools and arenas are sized once at startup
//! 2. **Ownership over locks** - frames move between threads by value
//! 3. **No unsafe code**
//!
//! ## Example
//!
//! ```rust
//! use walrus_core::{HandleAllocator, TransientArena};
//!
//! let mut textures = HandleAllocator::new(4096);
//! let handle = textures.alloc().unwrap();
//! assert!(textures.is_valid(handle));
//!
//! let mut vertices = TransientArena::new(64 << 10);
//! let grant = vertices.alloc_strided(3, 16);
//! assert_eq!(grant.count, 3);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod handle;
pub mod memory;
pub mod sync;

pub use handle::{HandleAllocator, INVALID_HANDLE};
pub use memory::{stride_align, ArenaGrant, TransientArena};
pub use sync::{frame_channel, Disconnected, FrameConsumer, FrameProducer};
