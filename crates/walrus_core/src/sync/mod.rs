//! # Submit/Render Thread Synchronization
//!
//! ## The Problem
//!
//! ```text
//! Thread 1 (Submit):  BUILDS frame N+1
//! Thread 2 (Render):  EXECUTES frame N
//!
//! Sharing one frame:  RACE CONDITION
//! Locking the frame:  SERIALIZED THREADS
//! ```
//!
//! ## The Solution: Double Buffering by Ownership
//!
//! ```text
//! Frame N:
//!   Submit thread owns Frame A
//!   Render thread owns Frame B
//!
//! Frame boundary:
//!   Submit waits for B to come back
//!   A goes to the render thread, B becomes the submit frame
//! ```

mod double_buffer;

pub use double_buffer::{frame_channel, Disconnected, FrameConsumer, FrameProducer};
