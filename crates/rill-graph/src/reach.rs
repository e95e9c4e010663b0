//! The reachability matrix: an N×N bitmap over registry slots.
//!
//! Row `n` holds the set of nodes that can reach `n` — its ancestors,
//! self included. The matrix answers [`is_reachable`](ReachMatrix::is_reachable)
//! queries (used to trap cycle-closing attaches) and merges whole
//! ancestor rows when a dynamic attach re-parents a node.
//!
//! Rows are stored in 64-bit chunks of atomics so that turn-time
//! operations (row merges under a dynamic attach) work through a shared
//! reference; growth is exclusive and zero-pads every row to the new
//! width, in lockstep with registry slot growth.

use std::sync::atomic::{AtomicU64, Ordering};

use rill_core::NodeId;

/// Bits per storage chunk.
const CHUNK_BITS: usize = u64::BITS as usize;

/// Row width, in chunks, at which row merges fan out to the rayon
/// pool instead of running inline.
const PAR_MERGE_CHUNKS: usize = 1024;

/// Chunked ancestor bitmap, one row per registry slot.
#[derive(Debug)]
pub struct ReachMatrix {
    capacity: usize,
    chunks_per_row: usize,
    chunks: Vec<AtomicU64>,
}

fn round_up(capacity: usize) -> usize {
    capacity.div_ceil(CHUNK_BITS).max(1) * CHUNK_BITS
}

impl ReachMatrix {
    /// Create a matrix covering at least `capacity` slots (rounded up
    /// to a whole number of chunks).
    pub fn new(capacity: usize) -> Self {
        let capacity = round_up(capacity);
        let chunks_per_row = capacity / CHUNK_BITS;
        let chunks = (0..capacity * chunks_per_row)
            .map(|_| AtomicU64::new(0))
            .collect();
        Self {
            capacity,
            chunks_per_row,
            chunks,
        }
    }

    /// Number of slots the matrix currently covers.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn bit(&self, row: usize, col: usize) -> (usize, u64) {
        debug_assert!(row < self.capacity && col < self.capacity);
        let chunk = row * self.chunks_per_row + col / CHUNK_BITS;
        let mask = 1u64 << (col % CHUNK_BITS);
        (chunk, mask)
    }

    /// Whether `from` can reach `to`.
    pub fn is_reachable(&self, from: NodeId, to: NodeId) -> bool {
        let (chunk, mask) = self.bit(to.index(), from.index());
        self.chunks[chunk].load(Ordering::Acquire) & mask != 0
    }

    /// Record the direct fact that `from` reaches `to`.
    pub fn set(&self, from: NodeId, to: NodeId) {
        let (chunk, mask) = self.bit(to.index(), from.index());
        self.chunks[chunk].fetch_or(mask, Ordering::AcqRel);
    }

    /// Erase the fact that `from` reaches `to`.
    pub fn clear(&self, from: NodeId, to: NodeId) {
        let (chunk, mask) = self.bit(to.index(), from.index());
        self.chunks[chunk].fetch_and(!mask, Ordering::AcqRel);
    }

    /// Merge `src`'s ancestor row into `dst`'s: everything that reaches
    /// `src` now also reaches `dst`.
    ///
    /// Rows wider than [`PAR_MERGE_CHUNKS`] are OR-ed across the rayon
    /// pool; narrower rows merge inline.
    pub fn merge_ancestors(&self, dst: NodeId, src: NodeId) {
        if self.chunks_per_row >= PAR_MERGE_CHUNKS {
            self.merge_ancestors_par(dst, src);
        } else {
            self.merge_ancestors_serial(dst, src);
        }
    }

    fn merge_ancestors_serial(&self, dst: NodeId, src: NodeId) {
        let d = dst.index() * self.chunks_per_row;
        let s = src.index() * self.chunks_per_row;
        for i in 0..self.chunks_per_row {
            let bits = self.chunks[s + i].load(Ordering::Acquire);
            if bits != 0 {
                self.chunks[d + i].fetch_or(bits, Ordering::AcqRel);
            }
        }
    }

    fn merge_ancestors_par(&self, dst: NodeId, src: NodeId) {
        use rayon::prelude::*;

        let d = dst.index() * self.chunks_per_row;
        let s = src.index() * self.chunks_per_row;
        (0..self.chunks_per_row).into_par_iter().for_each(|i| {
            let bits = self.chunks[s + i].load(Ordering::Acquire);
            if bits != 0 {
                self.chunks[d + i].fetch_or(bits, Ordering::AcqRel);
            }
        });
    }

    /// Clear everything recorded about `id`: its ancestor row and its
    /// bit in every other row. Called when a slot is freed so a reused
    /// id starts clean.
    pub fn clear_node(&mut self, id: NodeId) {
        let row = id.index() * self.chunks_per_row;
        for chunk in &mut self.chunks[row..row + self.chunks_per_row] {
            *chunk.get_mut() = 0;
        }

        let col_chunk = id.index() / CHUNK_BITS;
        let mask = !(1u64 << (id.index() % CHUNK_BITS));
        for r in 0..self.capacity {
            *self.chunks[r * self.chunks_per_row + col_chunk].get_mut() &= mask;
        }
    }

    /// Widen the matrix to cover `new_capacity` slots. Existing rows
    /// are zero-padded to the new width.
    pub fn grow(&mut self, new_capacity: usize) {
        let new_capacity = round_up(new_capacity);
        if new_capacity <= self.capacity {
            return;
        }
        let new_chunks_per_row = new_capacity / CHUNK_BITS;
        let mut new_chunks: Vec<AtomicU64> = (0..new_capacity * new_chunks_per_row)
            .map(|_| AtomicU64::new(0))
            .collect();

        for row in 0..self.capacity {
            for i in 0..self.chunks_per_row {
                let bits = *self.chunks[row * self.chunks_per_row + i].get_mut();
                *new_chunks[row * new_chunks_per_row + i].get_mut() = bits;
            }
        }

        self.capacity = new_capacity;
        self.chunks_per_row = new_chunks_per_row;
        self.chunks = new_chunks;
    }

    /// The ancestors of `id` currently recorded, in id order.
    #[cfg(test)]
    fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let row = id.index() * self.chunks_per_row;
        let mut out = Vec::new();
        for i in 0..self.chunks_per_row {
            let mut bits = self.chunks[row + i].load(Ordering::Acquire);
            while bits != 0 {
                let bit = bits.trailing_zeros() as usize;
                out.push(NodeId((i * CHUNK_BITS + bit) as u32));
                bits &= bits - 1;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_rounds_to_chunk_multiple() {
        assert_eq!(ReachMatrix::new(1).capacity(), 64);
        assert_eq!(ReachMatrix::new(64).capacity(), 64);
        assert_eq!(ReachMatrix::new(65).capacity(), 128);
    }

    #[test]
    fn set_clear_roundtrip() {
        let m = ReachMatrix::new(64);
        let (a, b) = (NodeId(3), NodeId(40));
        assert!(!m.is_reachable(a, b));
        m.set(a, b);
        assert!(m.is_reachable(a, b));
        assert!(!m.is_reachable(b, a));
        m.clear(a, b);
        assert!(!m.is_reachable(a, b));
    }

    #[test]
    fn merge_ancestors_unions_rows() {
        let m = ReachMatrix::new(64);
        // 0 and 1 reach 2; 2 reaches 3.
        m.set(NodeId(0), NodeId(2));
        m.set(NodeId(1), NodeId(2));
        m.set(NodeId(2), NodeId(3));
        m.merge_ancestors(NodeId(3), NodeId(2));
        assert!(m.is_reachable(NodeId(0), NodeId(3)));
        assert!(m.is_reachable(NodeId(1), NodeId(3)));
        assert_eq!(
            m.ancestors(NodeId(3)),
            vec![NodeId(0), NodeId(1), NodeId(2)]
        );
    }

    #[test]
    fn parallel_merge_matches_serial() {
        let a = ReachMatrix::new(256);
        let b = ReachMatrix::new(256);
        for i in (0..256).step_by(3) {
            a.set(NodeId(i), NodeId(7));
            b.set(NodeId(i), NodeId(7));
        }
        a.merge_ancestors_serial(NodeId(9), NodeId(7));
        b.merge_ancestors_par(NodeId(9), NodeId(7));
        assert_eq!(a.ancestors(NodeId(9)), b.ancestors(NodeId(9)));
    }

    #[test]
    fn clear_node_wipes_row_and_column() {
        let mut m = ReachMatrix::new(64);
        m.set(NodeId(1), NodeId(5));
        m.set(NodeId(5), NodeId(9));
        m.clear_node(NodeId(5));
        assert!(!m.is_reachable(NodeId(1), NodeId(5)));
        assert!(!m.is_reachable(NodeId(5), NodeId(9)));
        assert!(m.ancestors(NodeId(5)).is_empty());
    }

    #[test]
    fn grow_preserves_bits_and_zero_pads() {
        let mut m = ReachMatrix::new(64);
        m.set(NodeId(10), NodeId(20));
        m.grow(128);
        assert_eq!(m.capacity(), 128);
        assert!(m.is_reachable(NodeId(10), NodeId(20)));
        assert!(!m.is_reachable(NodeId(100), NodeId(20)));
        m.set(NodeId(100), NodeId(20));
        assert!(m.is_reachable(NodeId(100), NodeId(20)));
    }

    #[test]
    fn grow_is_noop_when_smaller() {
        let mut m = ReachMatrix::new(128);
        m.grow(64);
        assert_eq!(m.capacity(), 128);
    }
}
