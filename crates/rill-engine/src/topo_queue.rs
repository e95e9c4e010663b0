//! Level-ordered scheduling queue for the topological-sort engines.
//!
//! Entries carry the level they were scheduled at. [`fetch_next`]
//! extracts every entry at the minimum level present as one batch;
//! nodes pushed while a batch is being processed always carry a higher
//! level and land in a later batch.
//!
//! [`fetch_next`]: TopoQueue::fetch_next

use rill_core::{Level, NodeId};

/// Min-level batch queue.
#[derive(Debug, Default)]
pub struct TopoQueue {
    entries: Vec<(Level, NodeId)>,
}

impl TopoQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `node` at `level`.
    pub fn push(&mut self, node: NodeId, level: Level) {
        self.entries.push((level, node));
    }

    /// Extract the batch of all entries at the minimum level present,
    /// or `None` when the queue is empty.
    pub fn fetch_next(&mut self) -> Option<Vec<NodeId>> {
        let min = self.entries.iter().map(|&(level, _)| level).min()?;
        let mut batch = Vec::new();
        let mut i = 0;
        while i < self.entries.len() {
            if self.entries[i].0 == min {
                batch.push(self.entries.swap_remove(i).1);
            } else {
                i += 1;
            }
        }
        Some(batch)
    }

    /// Number of scheduled entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is scheduled.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries (error-path cleanup).
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Remove and return every scheduled node, so the caller can reset
    /// per-node scheduling flags after an aborted turn.
    pub fn drain(&mut self) -> Vec<NodeId> {
        self.entries.drain(..).map(|(_, node)| node).collect()
    }
}
