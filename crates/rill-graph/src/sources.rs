//! Source-id sets: the transitive input ancestors of a node.
//!
//! Stored as a lazily-sorted id vector behind a mutex. Union and
//! intersection are the two operations that matter: a node's set is the
//! union of its predecessors' sets, and a turn skips every node whose
//! set does not intersect the turn's admitted-input set. Intersection
//! runs a classical two-pointer merge over the sorted vectors.

use std::sync::Mutex;

use rill_core::NodeId;

#[derive(Debug, Default)]
struct SortedIds {
    data: Vec<NodeId>,
    sorted: bool,
}

impl SortedIds {
    fn ensure_sorted(&mut self) {
        if !self.sorted {
            self.data.sort_unstable();
            self.data.dedup();
            self.sorted = true;
        }
    }
}

/// A set of input-node ids, kept sorted for cheap intersection.
#[derive(Debug, Default)]
pub struct SourceIdSet {
    inner: Mutex<SortedIds>,
}

impl SourceIdSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a single id.
    pub fn insert(&self, id: NodeId) {
        let mut inner = self.inner.lock().expect("source set lock poisoned");
        inner.data.push(id);
        inner.sorted = false;
    }

    /// Insert every id of `other`.
    ///
    /// `other` is snapshotted first so the two locks are never held at
    /// once — unions run between arbitrary node pairs and a fixed
    /// acquisition order is not available.
    pub fn insert_all(&self, other: &SourceIdSet) {
        let snapshot = other.snapshot();
        let mut inner = self.inner.lock().expect("source set lock poisoned");
        inner.data.extend(snapshot);
        inner.sorted = false;
    }

    /// Remove every id, leaving the set empty.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("source set lock poisoned");
        inner.data.clear();
        inner.sorted = true;
    }

    /// Whether the set contains `id`.
    pub fn contains(&self, id: NodeId) -> bool {
        let mut inner = self.inner.lock().expect("source set lock poisoned");
        inner.ensure_sorted();
        inner.data.binary_search(&id).is_ok()
    }

    /// Number of distinct ids in the set.
    pub fn len(&self) -> usize {
        let mut inner = self.inner.lock().expect("source set lock poisoned");
        inner.ensure_sorted();
        inner.data.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.inner
            .lock()
            .expect("source set lock poisoned")
            .data
            .is_empty()
    }

    /// Sorted, deduplicated copy of the ids.
    pub fn snapshot(&self) -> Vec<NodeId> {
        let mut inner = self.inner.lock().expect("source set lock poisoned");
        inner.ensure_sorted();
        inner.data.clone()
    }

    /// Whether the intersection of `self` and `other` is non-empty.
    pub fn intersects_with(&self, other: &SourceIdSet) -> bool {
        let theirs = other.snapshot();
        let mut inner = self.inner.lock().expect("source set lock poisoned");
        inner.ensure_sorted();

        let mut l = inner.data.iter().peekable();
        let mut r = theirs.iter().peekable();
        while let (Some(&a), Some(&b)) = (l.peek(), r.peek()) {
            if a < b {
                l.next();
            } else if b < a {
                r.next();
            } else {
                return true;
            }
        }
        false
    }
}
