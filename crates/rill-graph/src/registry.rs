//! The node registry: stable dense ids and slot lifetime bookkeeping.
//!
//! Ids index a slot vector. Freed slots are reused; a monotonically
//! advancing cursor walks the vector with wraparound so allocation is
//! amortized O(1), and the vector doubles when every slot is occupied.
//! The registry also owns the [`ReachMatrix`], growing it in lockstep
//! with the slot vector and clearing a node's row and column when its
//! slot is freed.

use std::sync::Arc;

use rill_core::{NodeFlags, NodeId, ReactiveNode};

use crate::cell::NodeCell;
use crate::reach::ReachMatrix;

const INITIAL_CAPACITY: usize = 64;

enum Slot {
    Free,
    Occupied(Arc<NodeCell>),
}

impl Slot {
    fn is_free(&self) -> bool {
        matches!(self, Slot::Free)
    }
}

/// Owner of all nodes in a graph.
///
/// Structural mutation (`insert`, `remove`) happens between turns under
/// exclusive access; during a turn engines share the registry read-only
/// and go through each cell's own synchronization.
pub struct Registry {
    slots: Vec<Slot>,
    next: usize,
    live: usize,
    reach: ReachMatrix,
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }
}

impl Registry {
    /// Create an empty registry with the default initial capacity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry with room for `capacity` nodes before
    /// the first growth (rounded up to the matrix chunk width).
    pub fn with_capacity(capacity: usize) -> Self {
        let reach = ReachMatrix::new(capacity.max(1));
        let capacity = reach.capacity();
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || Slot::Free);
        Self {
            slots,
            next: 0,
            live: 0,
            reach,
        }
    }

    /// Register a node, returning its stable id.
    ///
    /// Input nodes seed their own source-id set and every node is
    /// recorded as reaching itself.
    pub fn insert(&mut self, flags: NodeFlags, node: Box<dyn ReactiveNode>) -> NodeId {
        let index = self.request_index();
        let id = NodeId(index as u32);
        let cell = Arc::new(NodeCell::new(id, flags, node));
        if flags.input {
            cell.meta().sources().insert(id);
        }
        self.reach.set(id, id);
        self.slots[index] = Slot::Occupied(cell);
        self.live += 1;
        id
    }

    /// Free `id`'s slot, clearing its reachability row and column.
    ///
    /// The caller must have detached all edges first. Returns the cell
    /// so an in-flight destructor can finish with it.
    ///
    /// # Panics
    ///
    /// Panics if `id` is stale — removing a node twice is a bug in the
    /// layer above.
    pub fn remove(&mut self, id: NodeId) -> Arc<NodeCell> {
        let slot = self
            .slots
            .get_mut(id.index())
            .unwrap_or_else(|| panic!("node id {id} out of range"));
        match std::mem::replace(slot, Slot::Free) {
            Slot::Occupied(cell) => {
                self.live -= 1;
                self.reach.clear_node(id);
                cell.meta().sources().clear();
                cell
            }
            Slot::Free => panic!("node id {id} is stale (slot already free)"),
        }
    }

    /// Look up a node cell.
    ///
    /// # Panics
    ///
    /// Panics if `id` is stale; using a freed id is a programmer error.
    pub fn cell(&self, id: NodeId) -> &Arc<NodeCell> {
        match self.slots.get(id.index()) {
            Some(Slot::Occupied(cell)) => cell,
            _ => panic!("node id {id} is stale"),
        }
    }

    /// Look up a node cell without the stale-id trap.
    pub fn try_cell(&self, id: NodeId) -> Option<&Arc<NodeCell>> {
        match self.slots.get(id.index()) {
            Some(Slot::Occupied(cell)) => Some(cell),
            _ => None,
        }
    }

    /// Whether `id` names a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.try_cell(id).is_some()
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether the registry holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Current slot capacity.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// The reachability matrix.
    pub fn reach(&self) -> &ReachMatrix {
        &self.reach
    }

    /// Iterate over all live node cells.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<NodeCell>> {
        self.slots.iter().filter_map(|s| match s {
            Slot::Occupied(cell) => Some(cell),
            Slot::Free => None,
        })
    }

    /// Find a free slot, growing if the vector is saturated.
    ///
    /// Walks from the cursor with wraparound; a full cycle without a
    /// free slot doubles capacity and allocates at the old end.
    fn request_index(&mut self) -> usize {
        let capacity = self.slots.len();
        for step in 0..capacity {
            let index = (self.next + step) % capacity;
            if self.slots[index].is_free() {
                self.next = (index + 1) % capacity;
                return index;
            }
        }

        // All in use: grow and take the first fresh slot.
        let index = capacity;
        let new_capacity = capacity * 2;
        self.slots.resize_with(new_capacity, || Slot::Free);
        self.reach.grow(new_capacity);
        self.next = index + 1;
        index
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("live", &self.live)
            .field("capacity", &self.slots.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_core::{NodeError, UpdateContext, UpdateResult};

    struct Inert;

    impl ReactiveNode for Inert {
        fn update(&mut self, _ctx: &mut UpdateContext) -> Result<UpdateResult, NodeError> {
            Ok(UpdateResult::Unchanged)
        }
    }

    fn inert() -> Box<dyn ReactiveNode> {
        Box::new(Inert)
    }

    // ── Allocation ─────────────────────────────────────────────────

    #[test]
    fn insert_assigns_dense_ids() {
        let mut reg = Registry::new();
        let a = reg.insert(NodeFlags::DERIVED, inert());
        let b = reg.insert(NodeFlags::DERIVED, inert());
        assert_eq!(a, NodeId(0));
        assert_eq!(b, NodeId(1));
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut reg = Registry::new();
        let a = reg.insert(NodeFlags::DERIVED, inert());
        let b = reg.insert(NodeFlags::DERIVED, inert());
        reg.remove(a);
        let c = reg.insert(NodeFlags::DERIVED, inert());
        // The cursor passed `a`'s slot already, so it wraps to reuse it
        // only after exhausting the fresh tail; either way the id is
        // valid and the registry stays dense.
        assert!(reg.contains(b));
        assert!(reg.contains(c));
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn grows_when_saturated() {
        let mut reg = Registry::with_capacity(64);
        for _ in 0..64 {
            reg.insert(NodeFlags::DERIVED, inert());
        }
        assert_eq!(reg.capacity(), 64);
        let id = reg.insert(NodeFlags::DERIVED, inert());
        assert_eq!(id, NodeId(64));
        assert_eq!(reg.capacity(), 128);
        assert_eq!(reg.reach().capacity(), 128);
    }

    #[test]
    fn growth_preserves_reachability() {
        let mut reg = Registry::with_capacity(64);
        let ids: Vec<NodeId> = (0..64)
            .map(|_| reg.insert(NodeFlags::DERIVED, inert()))
            .collect();
        reg.reach().set(ids[0], ids[1]);
        reg.insert(NodeFlags::DERIVED, inert());
        assert!(reg.reach().is_reachable(ids[0], ids[1]));
    }

    // ── Lifetime ───────────────────────────────────────────────────

    #[test]
    fn remove_clears_reachability() {
        let mut reg = Registry::new();
        let a = reg.insert(NodeFlags::DERIVED, inert());
        let b = reg.insert(NodeFlags::DERIVED, inert());
        reg.reach().set(a, b);
        reg.remove(b);
        assert!(!reg.reach().is_reachable(a, b));
    }

    #[test]
    fn input_nodes_seed_their_source_set() {
        let mut reg = Registry::new();
        let a = reg.insert(NodeFlags::INPUT, inert());
        let d = reg.insert(NodeFlags::DERIVED, inert());
        assert!(reg.cell(a).meta().sources().contains(a));
        assert!(reg.cell(d).meta().sources().is_empty());
    }

    #[test]
    fn every_node_reaches_itself() {
        let mut reg = Registry::new();
        let a = reg.insert(NodeFlags::DERIVED, inert());
        assert!(reg.reach().is_reachable(a, a));
    }

    #[test]
    #[should_panic(expected = "stale")]
    fn stale_get_panics() {
        let mut reg = Registry::new();
        let a = reg.insert(NodeFlags::DERIVED, inert());
        reg.remove(a);
        let _ = reg.cell(a);
    }

    #[test]
    #[should_panic(expected = "stale")]
    fn double_remove_panics() {
        let mut reg = Registry::new();
        let a = reg.insert(NodeFlags::DERIVED, inert());
        reg.remove(a);
        reg.remove(a);
    }

    #[test]
    fn iter_skips_free_slots() {
        let mut reg = Registry::new();
        let a = reg.insert(NodeFlags::DERIVED, inert());
        let b = reg.insert(NodeFlags::DERIVED, inert());
        reg.remove(a);
        let ids: Vec<NodeId> = reg.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec![b]);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn insert_remove_keeps_len_consistent(ops in prop::collection::vec(any::<bool>(), 1..128)) {
                let mut reg = Registry::new();
                let mut live: Vec<NodeId> = Vec::new();
                for insert in ops {
                    if insert || live.is_empty() {
                        live.push(reg.insert(NodeFlags::DERIVED, inert()));
                    } else {
                        let id = live.swap_remove(live.len() / 2);
                        reg.remove(id);
                    }
                    prop_assert_eq!(reg.len(), live.len());
                    for &id in &live {
                        prop_assert!(reg.contains(id));
                    }
                }
            }
        }
    }
}
