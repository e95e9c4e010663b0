//! The turn object: per-cycle state shared between the input manager
//! and the engine.
//!
//! Parallel engines append to the continuation buffer, detach queue,
//! and buffer-clear list from worker tasks, so those collections sit
//! behind mutexes. The source-id set is carried for the source-set
//! engine; other engines ignore it.

use std::sync::Mutex;

use rill_core::{InputWrite, NodeId, TurnFlags, TurnId};
use rill_graph::SourceIdSet;

use crate::metrics::TurnCounters;

/// One atomic propagation cycle.
pub struct Turn {
    id: TurnId,
    flags: TurnFlags,
    continuations: Mutex<Vec<InputWrite>>,
    detach_queue: Mutex<Vec<NodeId>>,
    buffer_clears: Mutex<Vec<NodeId>>,
    sources: SourceIdSet,
    counters: TurnCounters,
}

impl Turn {
    /// Create a fresh turn.
    pub fn new(id: TurnId, flags: TurnFlags) -> Self {
        Self {
            id,
            flags,
            continuations: Mutex::new(Vec::new()),
            detach_queue: Mutex::new(Vec::new()),
            buffer_clears: Mutex::new(Vec::new()),
            sources: SourceIdSet::new(),
            counters: TurnCounters::default(),
        }
    }

    /// The turn's id.
    pub fn id(&self) -> TurnId {
        self.id
    }

    /// The flags the opening transaction set.
    pub fn flags(&self) -> TurnFlags {
        self.flags
    }

    /// Input ids admitted into this turn (source-set engine).
    pub fn sources(&self) -> &SourceIdSet {
        &self.sources
    }

    /// Propagation counters for this turn.
    pub fn counters(&self) -> &TurnCounters {
        &self.counters
    }

    /// Append inputs recorded during this turn for the next one.
    pub fn record_continuations(&self, writes: Vec<InputWrite>) {
        if !writes.is_empty() {
            self.continuations
                .lock()
                .expect("continuation buffer poisoned")
                .extend(writes);
        }
    }

    /// Queue nodes for detachment after this turn ends.
    pub fn record_detaches(&self, nodes: Vec<NodeId>) {
        if !nodes.is_empty() {
            self.detach_queue
                .lock()
                .expect("detach queue poisoned")
                .extend(nodes);
        }
    }

    /// Record that `node` emitted into its buffer this turn and must be
    /// cleared before the next turn begins admission.
    pub fn record_buffer_clear(&self, node: NodeId) {
        self.buffer_clears
            .lock()
            .expect("buffer-clear list poisoned")
            .push(node);
    }

    /// Drain the continuation buffer.
    pub fn take_continuations(&self) -> Vec<InputWrite> {
        std::mem::take(
            &mut *self
                .continuations
                .lock()
                .expect("continuation buffer poisoned"),
        )
    }

    /// Whether any continuation inputs were recorded.
    pub fn has_continuations(&self) -> bool {
        !self
            .continuations
            .lock()
            .expect("continuation buffer poisoned")
            .is_empty()
    }

    /// Drain the detach queue.
    pub fn take_detaches(&self) -> Vec<NodeId> {
        std::mem::take(&mut *self.detach_queue.lock().expect("detach queue poisoned"))
    }

    /// Drain the buffer-clear list.
    pub fn take_buffer_clears(&self) -> Vec<NodeId> {
        std::mem::take(
            &mut *self
                .buffer_clears
                .lock()
                .expect("buffer-clear list poisoned"),
        )
    }
}

impl std::fmt::Debug for Turn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Turn")
            .field("id", &self.id)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}
