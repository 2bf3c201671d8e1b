//! # Handle Allocator
//!
//! Fixed-capacity pool of small integer identities with O(1) alloc, free
//! and validity test.

/// Sentinel id that never names a live resource.
pub const INVALID_HANDLE: u16 = u16::MAX;

/// A dense/sparse free-list allocator for `u16` handles.
///
/// `dense[..len]` holds the live handles, `dense[len..]` the free ones.
/// `sparse[h]` is the slot of handle `h` inside `dense`. A handle is live
/// iff its slot is below `len` and the dense array points back at it.
///
/// # Thread Safety
///
/// This allocator is NOT thread-safe. It is owned by the submitting thread.
///
/// # Example
///
/// ```rust
/// use walrus_core::HandleAllocator;
///
/// let mut shaders = HandleAllocator::new(256);
///
/// // Allocate - O(1)
/// let handle = shaders.alloc().unwrap();
/// assert!(shaders.is_valid(handle));
///
/// // Free - O(1)
/// shaders.free(handle);
/// assert!(!shaders.is_valid(handle));
/// ```
#[derive(Debug, Clone)]
pub struct HandleAllocator {
    /// Slot -> handle.
    dense: Vec<u16>,
    /// Handle -> slot.
    sparse: Vec<u16>,
    /// Number of live handles.
    len: u16,
}

impl HandleAllocator {
    /// Creates a new allocator with exactly `capacity` identities.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or does not leave room for
    /// [`INVALID_HANDLE`].
    #[must_use]
    pub fn new(capacity: u16) -> Self {
        assert!(capacity > 0, "Capacity must be greater than zero");
        assert!(capacity < INVALID_HANDLE, "Capacity collides with the invalid handle");

        Self {
            dense: (0..capacity).collect(),
            sparse: (0..capacity).collect(),
            len: 0,
        }
    }

    /// Returns the total capacity.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> u16 {
        self.dense.len() as u16
    }

    /// Returns the number of live handles.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> u16 {
        self.len
    }

    /// Returns true if no handle is live.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of handles still available.
    #[inline]
    #[must_use]
    pub fn free_count(&self) -> u16 {
        self.capacity() - self.len
    }

    /// Allocates the next free handle.
    ///
    /// Returns `None` when the pool is exhausted.
    pub fn alloc(&mut self) -> Option<u16> {
        if self.len == self.capacity() {
            return None;
        }

        let handle = self.dense[usize::from(self.len)];
        self.sparse[usize::from(handle)] = self.len;
        self.len += 1;

        Some(handle)
    }

    /// Returns a handle to the pool.
    ///
    /// Freeing a handle that is not live is a caller bug; the registry's
    /// reference counts make sure it never happens.
    pub fn free(&mut self, handle: u16) {
        debug_assert!(self.is_valid(handle), "Freeing handle {handle} which is not live");
        if !self.is_valid(handle) {
            return;
        }

        self.len -= 1;
        let slot = self.sparse[usize::from(handle)];
        let last = self.dense[usize::from(self.len)];

        // Swap the freed handle with the last live one.
        self.dense[usize::from(slot)] = last;
        self.sparse[usize::from(last)] = slot;
        self.dense[usize::from(self.len)] = handle;
        self.sparse[usize::from(handle)] = self.len;
    }

    /// Checks whether `handle` is currently allocated.
    #[inline]
    #[must_use]
    pub fn is_valid(&self, handle: u16) -> bool {
        match self.sparse.get(usize::from(handle)) {
            Some(&slot) => slot < self.len && self.dense[usize::from(slot)] == handle,
            None => false,
        }
    }

    /// Returns the live handles in allocation-slot order.
    #[inline]
    #[must_use]
    pub fn live(&self) -> &[u16] {
        &self.dense[..usize::from(self.len)]
    }

    /// Frees every handle.
    pub fn reset(&mut self) {
        for (i, slot) in self.dense.iter_mut().enumerate() {
            *slot = i as u16;
        }
        for (i, slot) in self.sparse.iter_mut().enumerate() {
            *slot = i as u16;
        }
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_free() {
        let mut handles = HandleAllocator::new(10);

        let h1 = handles.alloc().unwrap();
        assert!(handles.is_valid(h1));
        assert_eq!(handles.len(), 1);

        handles.free(h1);
        assert!(!handles.is_valid(h1));
        assert_eq!(handles.len(), 0);
    }

    #[test]
    fn test_exhaustion() {
        let mut handles = HandleAllocator::new(2);

        let _ = handles.alloc().unwrap();
        let _ = handles.alloc().unwrap();
        assert!(handles.alloc().is_none());
        assert_eq!(handles.free_count(), 0);
    }

    #[test]
    fn test_reuse() {
        let mut handles = HandleAllocator::new(1);

        let h1 = handles.alloc().unwrap();
        handles.free(h1);

        let h2 = handles.alloc().unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_out_of_range_is_invalid() {
        let handles = HandleAllocator::new(4);
        assert!(!handles.is_valid(4));
        assert!(!handles.is_valid(INVALID_HANDLE));
    }

    #[test]
    fn test_swap_remove_keeps_others_valid() {
        let mut handles = HandleAllocator::new(8);
        let a = handles.alloc().unwrap();
        let b = handles.alloc().unwrap();
        let c = handles.alloc().unwrap();

        handles.free(a);
        assert!(!handles.is_valid(a));
        assert!(handles.is_valid(b));
        assert!(handles.is_valid(c));
        assert_eq!(handles.live().len(), 2);
    }

    #[test]
    fn test_random_sequence_matches_model() {
        // Deterministic LCG so the sequence is reproducible.
        let mut seed: u32 = 0x1234_5678;
        let mut next = move || {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            seed >> 16
        };

        let capacity = 16;
        let mut handles = HandleAllocator::new(capacity);
        let mut model: Vec<u16> = Vec::new();

        for _ in 0..2_000 {
            if next() % 3 == 0 && !model.is_empty() {
                let idx = (next() as usize) % model.len();
                let h = model.swap_remove(idx);
                handles.free(h);
            } else {
                match handles.alloc() {
                    Some(h) => {
                        assert!(!model.contains(&h));
                        model.push(h);
                    }
                    None => assert_eq!(model.len(), usize::from(capacity)),
                }
            }

            assert!(usize::from(handles.len()) <= usize::from(capacity));
            assert_eq!(usize::from(handles.len()), model.len());
            for h in 0..capacity {
                assert_eq!(handles.is_valid(h), model.contains(&h));
            }
        }
    }

    #[test]
    fn test_reset() {
        let mut handles = HandleAllocator::new(3);
        let a = handles.alloc().unwrap();
        handles.reset();
        assert!(!handles.is_valid(a));
        assert_eq!(handles.free_count(), 3);
    }
}
