//! # Uniform Buffer
//!
//! Append-only log of uniform writes, replayed in order at draw time.
//!
//! ## Encoding
//!
//! Every entry starts with a 64-bit op word:
//!
//! ```text
//! bits 56..64  uniform type
//! bits 24..56  uniform handle, or shader location for bindings
//! bits 16..24  element count
//! ```
//!
//! A value write is followed by offset, size and the payload padded to 8
//! bytes. A program binding is followed by the uniform handle. The log
//! ends with [`UNIFORM_BUFFER_END`].

use crate::cursor::{align_up, ByteReader};
use crate::handle::UniformHandle;
use crate::types::UniformType;

/// End-of-stream sentinel.
pub const UNIFORM_BUFFER_END: u64 = u64::MAX;

const TYPE_SHIFT: u32 = 56;
const LOC_SHIFT: u32 = 24;
const NUM_SHIFT: u32 = 16;

/// Decoded op word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformOp {
    /// Value type.
    pub uniform_type: UniformType,
    /// Uniform handle or shader location.
    pub loc: u32,
    /// Element count.
    pub num: u8,
}

impl UniformOp {
    /// Packs the op word.
    #[must_use]
    pub fn encode(&self) -> u64 {
        (self.uniform_type as u64) << TYPE_SHIFT
            | u64::from(self.loc) << LOC_SHIFT
            | u64::from(self.num) << NUM_SHIFT
    }

    /// Unpacks an op word.
    #[must_use]
    pub fn decode(op: u64) -> Option<Self> {
        Some(Self {
            uniform_type: UniformType::from_u8((op >> TYPE_SHIFT) as u8)?,
            loc: (op >> LOC_SHIFT) as u32,
            num: (op >> NUM_SHIFT) as u8,
        })
    }
}

/// A uniform value write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformUpdate<'a> {
    /// Value type.
    pub uniform_type: UniformType,
    /// Target uniform.
    pub handle: UniformHandle,
    /// Byte offset inside the uniform's storage.
    pub offset: u32,
    /// Elements covered by the write, saturated at 255.
    pub num: u8,
    /// Raw value bytes.
    pub data: &'a [u8],
}

/// A program's link between a shader location and a uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformBinding {
    /// Value type.
    pub uniform_type: UniformType,
    /// Shader location.
    pub location: u32,
    /// Bound uniform.
    pub handle: UniformHandle,
    /// Element count.
    pub num: u8,
}

/// Growable byte log of uniform operations.
#[derive(Debug, Clone)]
pub struct UniformBuffer {
    data: Vec<u8>,
    pos: usize,
    size: usize,
}

impl UniformBuffer {
    /// Creates a log with `size` bytes of room.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self { data: vec![0; size], pos: 0, size: 0 }
    }

    /// Allocated bytes.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Current write position.
    #[inline]
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left before the log has to grow.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Rewinds for a new frame.
    pub fn start(&mut self) {
        self.pos = 0;
        self.size = 0;
    }

    /// Grows by `grow` bytes once no more than `threshold` bytes are left.
    /// Returns true if the log grew.
    pub fn update(&mut self, threshold: usize, grow: usize) -> bool {
        if threshold >= self.remaining() {
            tracing::trace!(capacity = self.data.len(), grow, "uniform buffer resize");
            self.data.resize(self.data.len() + grow, 0);
            return true;
        }
        false
    }

    /// Appends a value write. The op word carries the number of elements
    /// `data` spans, a trailing partial element counting as one.
    pub fn write_uniform(
        &mut self,
        uniform_type: UniformType,
        handle: UniformHandle,
        offset: u32,
        data: &[u8],
    ) {
        let elements = data.len().div_ceil(uniform_type.size() as usize);
        let num = u8::try_from(elements).unwrap_or(u8::MAX);
        let op = UniformOp { uniform_type, loc: u32::from(handle.id()), num };
        self.reserve(24 + align_up(data.len(), 8));
        self.write_value(op.encode());
        self.write_value(u64::from(offset));
        self.write_value(data.len() as u64);
        self.write_padded(data);
    }

    /// Appends a program binding of `handle` to shader location `loc`.
    pub fn write_uniform_handle(
        &mut self,
        uniform_type: UniformType,
        loc: u32,
        handle: UniformHandle,
        num: u8,
    ) {
        let op = UniformOp { uniform_type, loc, num };
        self.reserve(16);
        self.write_value(op.encode());
        self.write_value(u64::from(handle.id()));
    }

    /// Appends the sentinel and commits the log.
    pub fn finish(&mut self) {
        self.reserve(8);
        self.write_value(UNIFORM_BUFFER_END);
        self.size = self.pos;
        self.pos = 0;
    }

    /// Committed size, 0 before [`finish`](Self::finish).
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.size
    }

    /// Returns true if nothing is committed.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Value writes recorded between byte positions `begin` and `end`.
    #[must_use]
    pub fn updates(&self, begin: usize, end: usize) -> UniformUpdates<'_> {
        let end = end.min(self.data.len());
        let begin = begin.min(end);
        UniformUpdates { reader: ByteReader::new(&self.data[begin..end]) }
    }

    /// Program bindings, up to the sentinel.
    #[must_use]
    pub fn bindings(&self) -> UniformBindings<'_> {
        let end = self.size.max(self.pos);
        UniformBindings { reader: ByteReader::new(&self.data[..end]) }
    }

    fn reserve(&mut self, bytes: usize) {
        let needed = self.pos + bytes;
        if needed > self.data.len() {
            tracing::debug!(needed, capacity = self.data.len(), "uniform buffer grown for write");
            self.data.resize(needed, 0);
        }
    }

    fn write_value(&mut self, value: u64) {
        self.data[self.pos..self.pos + 8].copy_from_slice(&value.to_ne_bytes());
        self.pos += 8;
    }

    fn write_padded(&mut self, bytes: &[u8]) {
        let end = self.pos + bytes.len();
        self.data[self.pos..end].copy_from_slice(bytes);
        let padded = self.pos + align_up(bytes.len(), 8);
        self.data[end..padded].fill(0);
        self.pos = padded;
    }
}

/// Iterator returned by [`UniformBuffer::updates`].
#[derive(Debug)]
pub struct UniformUpdates<'a> {
    reader: ByteReader<'a>,
}

impl<'a> Iterator for UniformUpdates<'a> {
    type Item = UniformUpdate<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.reader.remaining() < 8 {
            return None;
        }
        let raw = self.reader.read::<u64>();
        if raw == UNIFORM_BUFFER_END {
            return None;
        }
        let Some(op) = UniformOp::decode(raw) else {
            tracing::error!(op = raw, "corrupt uniform op");
            return None;
        };
        let offset = self.reader.read::<u64>() as u32;
        let size = self.reader.read::<u64>() as usize;
        let data = self.reader.read_slice(size);
        self.reader.skip(align_up(size, 8) - size, 1);

        Some(UniformUpdate {
            uniform_type: op.uniform_type,
            handle: UniformHandle(op.loc as u16),
            offset,
            num: op.num,
            data,
        })
    }
}

/// Iterator returned by [`UniformBuffer::bindings`].
#[derive(Debug)]
pub struct UniformBindings<'a> {
    reader: ByteReader<'a>,
}

impl Iterator for UniformBindings<'_> {
    type Item = UniformBinding;

    fn next(&mut self) -> Option<Self::Item> {
        if self.reader.remaining() < 16 {
            return None;
        }
        let raw = self.reader.read::<u64>();
        if raw == UNIFORM_BUFFER_END {
            return None;
        }
        let Some(op) = UniformOp::decode(raw) else {
            tracing::error!(op = raw, "corrupt uniform binding");
            return None;
        };
        let handle = self.reader.read::<u64>() as u16;
        Some(UniformBinding {
            uniform_type: op.uniform_type,
            location: op.loc,
            handle: UniformHandle(handle),
            num: op.num,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_word_layout() {
        let op = UniformOp { uniform_type: UniformType::Vec4, loc: 0xdead_beef, num: 3 };
        let word = op.encode();
        assert_eq!(word >> 56, 7);
        assert_eq!((word >> 24) & 0xffff_ffff, 0xdead_beef);
        assert_eq!((word >> 16) & 0xff, 3);
        assert_eq!(UniformOp::decode(word), Some(op));
    }

    #[test]
    fn test_updates_round_trip_in_order() {
        let mut buf = UniformBuffer::new(256);
        let color = [1u8, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16];
        let scale = 2.0f32.to_ne_bytes();
        let flag = [1u8, 0, 0];

        buf.write_uniform(UniformType::Vec4, UniformHandle(0), 0, &color);
        buf.write_uniform(UniformType::Float, UniformHandle(3), 4, &scale);
        buf.write_uniform(UniformType::Bool, UniformHandle(7), 0, &flag);
        let end = buf.position();
        buf.finish();

        let updates: Vec<_> = buf.updates(0, end).collect();
        assert_eq!(updates.len(), 3);
        assert_eq!(updates[0].data, &color);
        assert_eq!(updates[0].num, 1);
        assert_eq!(updates[1].handle, UniformHandle(3));
        assert_eq!(updates[1].offset, 4);
        assert_eq!(updates[1].data, &scale);
        assert_eq!(updates[2].uniform_type, UniformType::Bool);
        assert_eq!(updates[2].data, &flag);
        assert_eq!(updates[2].num, 1);
    }

    #[test]
    fn test_value_write_records_element_count() {
        let mut buf = UniformBuffer::new(64);
        buf.write_uniform(UniformType::Vec4, UniformHandle(4), 32, &[0; 48]);
        buf.write_uniform(UniformType::Float, UniformHandle(5), 0, &[0; 4 * 300]);
        let end = buf.position();
        buf.finish();

        let nums: Vec<_> = buf.updates(0, end).map(|u| (u.offset, u.num)).collect();
        assert_eq!(nums, vec![(32, 3), (0, u8::MAX)]);
    }

    #[test]
    fn test_updates_respect_range() {
        let mut buf = UniformBuffer::new(256);
        buf.write_uniform(UniformType::Float, UniformHandle(1), 0, &[0; 4]);
        let begin = buf.position();
        buf.write_uniform(UniformType::Float, UniformHandle(2), 0, &[0; 4]);
        let end = buf.position();
        buf.write_uniform(UniformType::Float, UniformHandle(3), 0, &[0; 4]);
        buf.finish();

        let handles: Vec<_> = buf.updates(begin, end).map(|u| u.handle).collect();
        assert_eq!(handles, vec![UniformHandle(2)]);
    }

    #[test]
    fn test_bindings_stop_at_sentinel() {
        let mut buf = UniformBuffer::new(64);
        buf.write_uniform_handle(UniformType::Mat4, 2, UniformHandle(5), 1);
        buf.write_uniform_handle(UniformType::Sampler, 6, UniformHandle(1), 1);
        buf.finish();

        let bindings: Vec<_> = buf.bindings().collect();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].location, 2);
        assert_eq!(bindings[0].handle, UniformHandle(5));
        assert_eq!(bindings[1].uniform_type, UniformType::Sampler);
    }

    #[test]
    fn test_update_grows_below_threshold() {
        let mut buf = UniformBuffer::new(64);
        // Each float write takes 32 bytes.
        buf.write_uniform(UniformType::Float, UniformHandle(0), 0, &[0; 4]);
        assert!(!buf.update(16, 128));
        buf.write_uniform(UniformType::Float, UniformHandle(0), 0, &[0; 4]);
        assert_eq!(buf.remaining(), 0);
        assert!(buf.update(16, 128));
        assert_eq!(buf.capacity(), 64 + 128);
    }

    #[test]
    fn test_large_write_never_overflows() {
        let mut buf = UniformBuffer::new(16);
        let matrices = vec![0u8; 64 * 10];
        buf.write_uniform(UniformType::Mat4, UniformHandle(0), 0, &matrices);
        let end = buf.position();
        buf.finish();
        let update = buf.updates(0, end).next();
        assert_eq!(update.map(|u| (u.data.len(), u.num)), Some((640, 10)));
    }
}
