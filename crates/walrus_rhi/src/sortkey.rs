//! # Sort Keys
//!
//! Every submitted item gets a 64-bit key. Sorting the keys once per frame
//! orders execution by view, then by the view's mode.
//!
//! ## Layout (MSB first)
//!
//! ```text
//! 63..56  view rank (after set_view_order)
//! 55      draw flag (0 = compute)
//! 54..53  draw type: 0 default, 1 sequential, 2 depth asc, 3 depth desc
//!
//! default:     43..41 blend class | 40..32 program | 31..0 depth
//! sequential:  40..9  sequence    |  8..0  program
//! depth:       40..9  depth       |  8..0  program
//! compute:     40..9  sequence    |  8..0  program
//! ```
//!
//! [`SortKey::encode`] and [`SortKey::decode`] are the only code that knows
//! this layout.

use crate::handle::ProgramHandle;
use crate::limits::MAX_VIEWS;

/// View index.
pub type ViewId = u8;

const VIEW_SHIFT: u32 = 56;
const DRAW_BIT: u64 = 1 << 55;
const TYPE_SHIFT: u32 = 53;
const TYPE_MASK: u64 = 0x3;

const PROGRAM_MASK: u64 = 0x1ff;
const U32_MASK: u64 = 0xffff_ffff;

const DEFAULT_BLEND_SHIFT: u32 = 41;
const DEFAULT_PROGRAM_SHIFT: u32 = 32;
const BLEND_MASK: u64 = 0x7;

const SEQ_SHIFT: u32 = 9;

/// Ordering payload of a draw item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOrder {
    /// Opaque first, then by program, then by depth.
    Default {
        /// 0 opaque, 1 blended, 2 alpha blended.
        blend: u8,
        /// Caller supplied depth.
        depth: u32,
    },
    /// Submission order.
    Sequential {
        /// Per-view submission counter.
        seq: u32,
    },
    /// Front to back.
    DepthAscending {
        /// Caller supplied depth.
        depth: u32,
    },
    /// Back to front.
    DepthDescending {
        /// Caller supplied depth.
        depth: u32,
    },
}

/// Draw or compute payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKind {
    /// A draw.
    Draw(DrawOrder),
    /// A compute dispatch, ordered by submission.
    Compute {
        /// Per-view submission counter.
        seq: u32,
    },
}

/// Decoded sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    /// View the item belongs to.
    pub view: ViewId,
    /// Program the item runs.
    pub program: ProgramHandle,
    /// Ordering payload.
    pub kind: SortKind,
}

impl SortKey {
    /// Returns true for compute dispatches.
    #[inline]
    #[must_use]
    pub const fn is_compute(&self) -> bool {
        matches!(self.kind, SortKind::Compute { .. })
    }

    /// Packs the key, placing the view at its rank in `order`.
    #[must_use]
    pub fn encode(&self, order: &ViewOrder) -> u64 {
        let rank = u64::from(order.rank(self.view)) << VIEW_SHIFT;
        // The invalid program (used by touch) masks to 511 and sorts last.
        let program = u64::from(self.program.id()) & PROGRAM_MASK;

        let payload = match self.kind {
            SortKind::Compute { seq } => (u64::from(seq) << SEQ_SHIFT) | program,
            SortKind::Draw(order) => {
                let (ty, bits) = match order {
                    DrawOrder::Default { blend, depth } => (
                        0u64,
                        (u64::from(blend) & BLEND_MASK) << DEFAULT_BLEND_SHIFT
                            | program << DEFAULT_PROGRAM_SHIFT
                            | u64::from(depth),
                    ),
                    DrawOrder::Sequential { seq } => (1, u64::from(seq) << SEQ_SHIFT | program),
                    DrawOrder::DepthAscending { depth } => {
                        (2, u64::from(depth) << SEQ_SHIFT | program)
                    }
                    DrawOrder::DepthDescending { depth } => {
                        (3, u64::from(!depth) << SEQ_SHIFT | program)
                    }
                };
                DRAW_BIT | ty << TYPE_SHIFT | bits
            }
        };

        rank | payload
    }

    /// Unpacks a key, mapping the rank back to a view id through `order`.
    #[must_use]
    pub fn decode(key: u64, order: &ViewOrder) -> Self {
        let view = order.view((key >> VIEW_SHIFT) as u8);
        let program_of = |bits: u64| {
            let id = (bits & PROGRAM_MASK) as u16;
            if id == PROGRAM_MASK as u16 {
                ProgramHandle::INVALID
            } else {
                ProgramHandle(id)
            }
        };

        if key & DRAW_BIT == 0 {
            return Self {
                view,
                program: program_of(key),
                kind: SortKind::Compute { seq: ((key >> SEQ_SHIFT) & U32_MASK) as u32 },
            };
        }

        let (program, order) = match (key >> TYPE_SHIFT) & TYPE_MASK {
            0 => (
                program_of(key >> DEFAULT_PROGRAM_SHIFT),
                DrawOrder::Default {
                    blend: ((key >> DEFAULT_BLEND_SHIFT) & BLEND_MASK) as u8,
                    depth: (key & U32_MASK) as u32,
                },
            ),
            1 => (
                program_of(key),
                DrawOrder::Sequential { seq: ((key >> SEQ_SHIFT) & U32_MASK) as u32 },
            ),
            2 => (
                program_of(key),
                DrawOrder::DepthAscending { depth: ((key >> SEQ_SHIFT) & U32_MASK) as u32 },
            ),
            _ => (
                program_of(key),
                DrawOrder::DepthDescending { depth: !(((key >> SEQ_SHIFT) & U32_MASK) as u32) },
            ),
        };

        Self { view, program, kind: SortKind::Draw(order) }
    }
}

/// Mapping between view ids and their execution rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewOrder {
    rank: [u8; MAX_VIEWS],
    view: [u8; MAX_VIEWS],
}

impl Default for ViewOrder {
    fn default() -> Self {
        Self::identity()
    }
}

impl ViewOrder {
    /// Views execute in id order.
    #[must_use]
    pub fn identity() -> Self {
        let mut ids = [0u8; MAX_VIEWS];
        for (i, id) in ids.iter_mut().enumerate() {
            *id = i as u8;
        }
        Self { rank: ids, view: ids }
    }

    /// Views in `order` execute first, in the given order. The remaining
    /// views follow in id order. Out-of-range and repeated ids are ignored.
    #[must_use]
    pub fn from_order(order: &[ViewId]) -> Self {
        let mut placed = [false; MAX_VIEWS];
        let mut sequence = Vec::with_capacity(MAX_VIEWS);
        let listed = order.iter().map(|&v| usize::from(v));
        for v in listed.chain(0..MAX_VIEWS) {
            if v < MAX_VIEWS && !placed[v] {
                placed[v] = true;
                sequence.push(v as u8);
            }
        }

        let mut result = Self::identity();
        for (rank, &view) in sequence.iter().enumerate() {
            result.view[rank] = view;
            result.rank[usize::from(view)] = rank as u8;
        }
        result
    }

    /// Execution rank of `view`.
    #[inline]
    #[must_use]
    pub fn rank(&self, view: ViewId) -> u8 {
        self.rank.get(usize::from(view)).copied().unwrap_or(u8::MAX)
    }

    /// View executing at `rank`.
    #[inline]
    #[must_use]
    pub fn view(&self, rank: u8) -> ViewId {
        self.view.get(usize::from(rank)).copied().unwrap_or(rank)
    }
}

const RADIX_BITS: u32 = 11;
const RADIX: usize = 1 << RADIX_BITS;
const RADIX_MASK: u64 = (RADIX - 1) as u64;
const RADIX_PASSES: u32 = 64_u32.div_ceil(RADIX_BITS);

/// Stable LSD radix sort of `keys`, permuting `values` alongside.
///
/// `tmp_keys` and `tmp_values` are scratch space; they are resized as
/// needed and their contents are unspecified afterwards.
pub fn radix_sort(
    keys: &mut Vec<u64>,
    values: &mut Vec<u32>,
    tmp_keys: &mut Vec<u64>,
    tmp_values: &mut Vec<u32>,
) {
    debug_assert_eq!(keys.len(), values.len());
    let n = keys.len();
    if n < 2 {
        return;
    }
    tmp_keys.resize(n, 0);
    tmp_values.resize(n, 0);

    let mut histogram = [0u32; RADIX];
    for pass in 0..RADIX_PASSES {
        let shift = pass * RADIX_BITS;
        histogram.fill(0);
        for &key in keys.iter() {
            histogram[((key >> shift) & RADIX_MASK) as usize] += 1;
        }

        // Every key shares this digit.
        let first = ((keys[0] >> shift) & RADIX_MASK) as usize;
        if histogram[first] as usize == n {
            continue;
        }

        let mut offset = 0u32;
        for slot in &mut histogram {
            let count = *slot;
            *slot = offset;
            offset += count;
        }

        for (&key, &value) in keys.iter().zip(values.iter()) {
            let digit = ((key >> shift) & RADIX_MASK) as usize;
            let dst = histogram[digit] as usize;
            histogram[digit] += 1;
            tmp_keys[dst] = key;
            tmp_values[dst] = value;
        }

        std::mem::swap(keys, tmp_keys);
        std::mem::swap(values, tmp_values);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draw(view: ViewId, program: u16, order: DrawOrder) -> SortKey {
        SortKey { view, program: ProgramHandle(program), kind: SortKind::Draw(order) }
    }

    #[test]
    fn test_round_trip_every_mode() {
        let order = ViewOrder::identity();
        let keys = [
            draw(3, 17, DrawOrder::Default { blend: 2, depth: 0xdead_beef }),
            draw(0, 511 - 1, DrawOrder::Sequential { seq: 42 }),
            draw(31, 0, DrawOrder::DepthAscending { depth: 7 }),
            draw(5, 9, DrawOrder::DepthDescending { depth: 7 }),
            SortKey { view: 2, program: ProgramHandle(4), kind: SortKind::Compute { seq: 99 } },
            draw(1, ProgramHandle::INVALID.id(), DrawOrder::Sequential { seq: 0 }),
        ];
        for key in keys {
            assert_eq!(SortKey::decode(key.encode(&order), &order), key);
        }
    }

    #[test]
    fn test_view_dominates() {
        let order = ViewOrder::identity();
        let early = draw(0, 500, DrawOrder::Default { blend: 2, depth: u32::MAX });
        let late = draw(1, 0, DrawOrder::Default { blend: 0, depth: 0 });
        assert!(early.encode(&order) < late.encode(&order));
    }

    #[test]
    fn test_opaque_before_blended() {
        let order = ViewOrder::identity();
        let blended = draw(0, 0, DrawOrder::Default { blend: 2, depth: 0 });
        let opaque = draw(0, 200, DrawOrder::Default { blend: 0, depth: 1000 });
        assert!(opaque.encode(&order) < blended.encode(&order));
    }

    #[test]
    fn test_depth_descending_inverts() {
        let order = ViewOrder::identity();
        let near = draw(0, 0, DrawOrder::DepthDescending { depth: 1 });
        let far = draw(0, 0, DrawOrder::DepthDescending { depth: 10 });
        assert!(far.encode(&order) < near.encode(&order));
    }

    #[test]
    fn test_view_order_remap() {
        let order = ViewOrder::from_order(&[4, 1]);
        assert_eq!(order.rank(4), 0);
        assert_eq!(order.rank(1), 1);
        assert_eq!(order.rank(0), 2);
        assert_eq!(order.view(0), 4);

        let first = draw(4, 0, DrawOrder::Sequential { seq: 5 });
        let second = draw(0, 0, DrawOrder::Sequential { seq: 0 });
        assert!(first.encode(&order) < second.encode(&order));
        assert_eq!(SortKey::decode(first.encode(&order), &order).view, 4);
    }

    #[test]
    fn test_view_order_ignores_bad_ids() {
        let order = ViewOrder::from_order(&[2, 2, 200]);
        assert_eq!(order.rank(2), 0);
        assert_eq!(order.rank(0), 1);
    }

    #[test]
    fn test_radix_sort_matches_std() {
        let mut seed: u64 = 0x9e37_79b9_7f4a_7c15;
        let mut keys: Vec<u64> = (0..1000)
            .map(|_| {
                seed ^= seed << 13;
                seed ^= seed >> 7;
                seed ^= seed << 17;
                seed
            })
            .collect();
        keys.extend_from_slice(&[5, 5, 5]);
        let mut values: Vec<u32> = (0..keys.len() as u32).collect();

        let mut expected: Vec<(u64, u32)> =
            keys.iter().copied().zip(values.iter().copied()).collect();
        expected.sort_by_key(|&(k, _)| k);

        radix_sort(&mut keys, &mut values, &mut Vec::new(), &mut Vec::new());
        let sorted: Vec<(u64, u32)> = keys.into_iter().zip(values).collect();
        assert_eq!(sorted, expected);
    }

    #[test]
    fn test_radix_sort_is_stable() {
        let mut keys = vec![3, 1, 3, 1, 2];
        let mut values = vec![0, 1, 2, 3, 4];
        radix_sort(&mut keys, &mut values, &mut Vec::new(), &mut Vec::new());
        assert_eq!(keys, vec![1, 1, 2, 3, 3]);
        assert_eq!(values, vec![1, 3, 4, 0, 2]);
    }
}
