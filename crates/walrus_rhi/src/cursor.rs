//! Typed read cursor over committed command bytes.
//!
//! Mirrors the write side of [`CommandBuffer`](crate::CommandBuffer): every
//! value is aligned to its own alignment relative to the start of the
//! stream, and variable-length data is a `u32` length followed by the
//! bytes.

use std::mem::{align_of, size_of};

use bytemuck::Pod;

/// Rounds `value` up to a multiple of `align` (a power of two).
#[inline]
pub(crate) const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Bounds-checked reader over a byte stream.
///
/// Reading past the end is a programmer error: it asserts in debug builds.
/// In release builds the reader logs, jumps to the end and returns zeroed
/// values, so replay stops at the next opcode read.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    overrun: bool,
}

impl<'a> ByteReader<'a> {
    /// Creates a reader at the start of `data`.
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0, overrun: false }
    }

    /// Current read position.
    #[inline]
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Returns true once a read ran past the end.
    #[inline]
    #[must_use]
    pub const fn is_overrun(&self) -> bool {
        self.overrun
    }

    /// Reads a `T` aligned to `align_of::<T>()`.
    pub fn read<T: Pod>(&mut self) -> T {
        match self.take(size_of::<T>(), align_of::<T>()) {
            Some(bytes) => bytemuck::pod_read_unaligned(bytes),
            None => T::zeroed(),
        }
    }

    /// Skips `size` bytes after aligning to `align`.
    pub fn skip(&mut self, size: usize, align: usize) {
        let _ = self.take(size, align);
    }

    /// Reads a length-prefixed byte slice.
    pub fn read_bytes(&mut self) -> &'a [u8] {
        let len = self.read::<u32>() as usize;
        self.read_slice(len)
    }

    /// Reads `len` raw bytes.
    pub fn read_slice(&mut self, len: usize) -> &'a [u8] {
        self.take(len, 1).unwrap_or(&[])
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_str(&mut self) -> Option<&'a str> {
        let bytes = self.read_bytes();
        match std::str::from_utf8(bytes) {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::error!(error = %e, "command stream holds invalid UTF-8");
                None
            }
        }
    }

    fn take(&mut self, size: usize, align: usize) -> Option<&'a [u8]> {
        let start = align_up(self.pos, align);
        let end = start + size;
        debug_assert!(
            end <= self.data.len(),
            "ByteReader overrun: {end} > {}",
            self.data.len()
        );
        if end > self.data.len() {
            if !self.overrun {
                tracing::error!(pos = self.pos, size, len = self.data.len(), "command stream overrun");
            }
            self.overrun = true;
            self.pos = self.data.len();
            return None;
        }
        self.pos = end;
        Some(&self.data[start..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 4), 0);
        assert_eq!(align_up(1, 4), 4);
        assert_eq!(align_up(8, 8), 8);
        assert_eq!(align_up(9, 2), 10);
    }

    #[test]
    fn test_reads_aligned_values() {
        // u8 at 0, padding, u32 at 4.
        let data = [7u8, 0, 0, 0, 1, 0, 0, 0];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read::<u8>(), 7);
        assert_eq!(reader.read::<u32>(), u32::from_ne_bytes([1, 0, 0, 0]));
        assert_eq!(reader.remaining(), 0);
        assert!(!reader.is_overrun());
    }

    #[test]
    fn test_skip() {
        let data = [0u8, 0, 0, 0, 9];
        let mut reader = ByteReader::new(&data);
        reader.skip(4, 1);
        assert_eq!(reader.read::<u8>(), 9);
    }
}
