//! # Memory Management
//!
//! Pre-allocated scratch memory for per-frame data.
//!
//! ## Design Philosophy
//!
//! Arenas are allocated once at startup. During a frame:
//! - Allocation is a cursor bump
//! - Nothing is freed individually
//! - The cursor is rewound at frame start

mod arena;

pub use arena::{stride_align, ArenaGrant, TransientArena};
