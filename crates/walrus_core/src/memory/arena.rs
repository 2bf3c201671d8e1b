//! # Transient Arena
//!
//! A byte bump allocator for per-frame scratch data that is rewound all at
//! once when the frame starts.

/// Result of a strided arena allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArenaGrant {
    /// Byte offset of the first granted element.
    pub offset: u32,
    /// Number of elements actually granted.
    pub count: u32,
}

impl ArenaGrant {
    /// Index of the first granted element in units of `stride`.
    #[inline]
    #[must_use]
    pub const fn first_element(self, stride: u32) -> u32 {
        if stride == 0 {
            0
        } else {
            self.offset / stride
        }
    }
}

/// A bump-pointer arena over a fixed byte buffer.
///
/// Allocations round the cursor up to a multiple of the element stride, so
/// every grant starts on an element boundary of its own layout. The
/// backing storage is allocated once and never resized; [`reset`] only
/// rewinds the cursor.
///
/// # Thread Safety
///
/// This arena is NOT thread-safe. It belongs to one frame, and a frame is
/// owned by exactly one thread at a time.
///
/// # Example
///
/// ```rust
/// use walrus_core::TransientArena;
///
/// let mut arena = TransientArena::new(1024);
///
/// // 10 vertices of 12 bytes
/// let grant = arena.alloc_strided(10, 12);
/// assert_eq!(grant.count, 10);
///
/// // Rewind for the next frame
/// arena.reset();
/// ```
///
/// [`reset`]: TransientArena::reset
#[derive(Debug)]
pub struct TransientArena {
    /// The backing storage.
    storage: Box<[u8]>,
    /// Current allocation offset.
    offset: u32,
}

impl TransientArena {
    /// Creates a new arena with the specified capacity in bytes.
    #[must_use]
    pub fn new(capacity: u32) -> Self {
        Self {
            storage: vec![0u8; capacity as usize].into_boxed_slice(),
            offset: 0,
        }
    }

    /// Returns the total capacity in bytes.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.storage.len() as u32
    }

    /// Returns the current used space in bytes.
    #[inline]
    #[must_use]
    pub const fn used(&self) -> u32 {
        self.offset
    }

    /// Returns the remaining free space in bytes.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.capacity() - self.offset
    }

    /// Returns how many elements of `stride` bytes could still be granted.
    #[must_use]
    pub fn available(&self, stride: u32) -> u32 {
        if stride == 0 {
            return 0;
        }
        let start = stride_align(self.offset, stride);
        self.capacity().saturating_sub(start) / stride
    }

    /// Allocates up to `count` elements of `stride` bytes.
    ///
    /// The grant is clamped to what remains, so `grant.count` may be
    /// smaller than `count` (including zero). Callers must use the granted
    /// count.
    pub fn alloc_strided(&mut self, count: u32, stride: u32) -> ArenaGrant {
        if stride == 0 {
            return ArenaGrant { offset: self.offset, count: 0 };
        }

        let start = stride_align(self.offset, stride).min(self.capacity());
        let granted = count.min((self.capacity() - start) / stride);
        if granted < count {
            tracing::warn!(
                requested = count,
                granted,
                stride,
                "transient arena exhausted, grant clamped"
            );
        }

        self.offset = start + granted * stride;
        ArenaGrant { offset: start, count: granted }
    }

    /// Returns the bytes of a previous grant for writing.
    #[must_use]
    pub fn slice_mut(&mut self, grant: ArenaGrant, stride: u32) -> &mut [u8] {
        let start = grant.offset as usize;
        let end = start + (grant.count * stride) as usize;
        &mut self.storage[start..end]
    }

    /// Returns the used prefix of the arena.
    #[inline]
    #[must_use]
    pub fn used_bytes(&self) -> &[u8] {
        &self.storage[..self.offset as usize]
    }

    /// Resets the arena, invalidating all previous grants.
    ///
    /// No memory is freed or reallocated.
    #[inline]
    pub fn reset(&mut self) {
        self.offset = 0;
    }
}

/// Rounds `offset` up to the next multiple of `stride`.
#[inline]
#[must_use]
pub const fn stride_align(offset: u32, stride: u32) -> u32 {
    let rem = offset % stride;
    if rem == 0 {
        offset
    } else {
        offset + (stride - rem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_allocation() {
        let mut arena = TransientArena::new(1024);
        let grant = arena.alloc_strided(10, 4);
        assert_eq!(grant, ArenaGrant { offset: 0, count: 10 });
        assert_eq!(arena.used(), 40);
    }

    #[test]
    fn test_arena_reset() {
        let mut arena = TransientArena::new(1024);
        let _ = arena.alloc_strided(10, 4);
        assert!(arena.used() > 0);

        arena.reset();
        assert_eq!(arena.used(), 0);
        assert_eq!(arena.capacity(), 1024);
    }

    #[test]
    fn test_stride_alignment() {
        let mut arena = TransientArena::new(1024);
        let _ = arena.alloc_strided(1, 2);
        let grant = arena.alloc_strided(3, 12);
        assert_eq!(grant.offset, 12);
        assert_eq!(grant.first_element(12), 1);
        assert_eq!(arena.used(), 48);
    }

    #[test]
    fn test_grant_clamped_to_remainder() {
        let mut arena = TransientArena::new(100);
        let _ = arena.alloc_strided(5, 16);
        assert_eq!(arena.available(16), 1);

        let grant = arena.alloc_strided(10, 16);
        assert_eq!(grant.count, 1);
        assert!(arena.used() <= arena.capacity());

        let empty = arena.alloc_strided(4, 16);
        assert_eq!(empty.count, 0);
        assert!(arena.used() <= arena.capacity());
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut arena = TransientArena::new(1000);
        for stride in [3, 7, 12, 32, 64] {
            let grant = arena.alloc_strided(1_000, stride);
            assert!(grant.offset + grant.count * stride <= arena.capacity());
        }
    }

    #[test]
    fn test_slice_mut_matches_grant() {
        let mut arena = TransientArena::new(64);
        let grant = arena.alloc_strided(4, 8);
        let bytes = arena.slice_mut(grant, 8);
        assert_eq!(bytes.len(), 32);
        bytes[0] = 7;
        assert_eq!(arena.used_bytes()[0], 7);
    }
}
