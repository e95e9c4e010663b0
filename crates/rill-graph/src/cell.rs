//! Per-node storage: the node implementation plus the scheduling
//! metadata every engine shares.
//!
//! A [`NodeCell`] is owned by the registry and handed to engines as an
//! `Arc`. The node implementation sits behind a mutex that is
//! uncontended under the engines' scheduling invariant (no two tasks
//! update the same node at once); the metadata block is atomics plus
//! two small engine-protocol locks, laid out so that the hot pulse
//! counter sits on its own cache line.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock};

use crossbeam_utils::CachePadded;
use smallvec::SmallVec;

use rill_core::{Level, NodeFlags, NodeId, ReactiveNode};

use crate::sources::SourceIdSet;

/// Successor and predecessor edge lists of one node.
///
/// Guarded by the node's shift lock: engines take it for reading while
/// walking successors, topology operations take it for writing.
#[derive(Debug, Default)]
pub struct EdgeLists {
    /// Nodes this node feeds into.
    pub successors: SmallVec<[NodeId; 4]>,
    /// Nodes this node reads from.
    pub predecessors: SmallVec<[NodeId; 4]>,
}

/// Source-set engine per-node protocol state.
///
/// The first nudge of a turn initializes the threshold under this lock;
/// later nudges decrement it until the node is released.
#[derive(Debug, Default)]
pub struct NudgeState {
    /// Whether this node has been visited (threshold initialized) this turn.
    pub visited: bool,
    /// Whether any nudge so far carried a real value change.
    pub updated: bool,
    /// Whether the node's source set must be recomputed before it runs.
    pub invalidated: bool,
    /// Remaining predecessor nudges before the node may run.
    pub threshold: i32,
}

/// Flooding engine per-node evaluation state.
///
/// If a second predecessor pulses while the node is mid-evaluation, the
/// in-flight evaluation repeats after finishing instead of racing.
#[derive(Debug, Default)]
pub struct EvalState {
    processing: bool,
    reprocess: bool,
}

/// Scheduling metadata shared by all engines.
///
/// Only one engine drives a graph instance, so a single block serves
/// them all; each engine touches its own subset of fields.
pub struct NodeMeta {
    level: AtomicI32,
    new_level: AtomicI32,
    queued: AtomicBool,
    should_update: AtomicBool,
    threshold: CachePadded<AtomicI64>,
    mark: AtomicU64,
    edges: RwLock<EdgeLists>,
    nudge: Mutex<NudgeState>,
    eval: Mutex<EvalState>,
    sources: SourceIdSet,
}

impl NodeMeta {
    fn new() -> Self {
        Self {
            level: AtomicI32::new(0),
            new_level: AtomicI32::new(0),
            queued: AtomicBool::new(false),
            should_update: AtomicBool::new(false),
            threshold: CachePadded::new(AtomicI64::new(0)),
            mark: AtomicU64::new(0),
            edges: RwLock::new(EdgeLists::default()),
            nudge: Mutex::new(NudgeState::default()),
            eval: Mutex::new(EvalState::default()),
            sources: SourceIdSet::new(),
        }
    }

    // ── Levels ─────────────────────────────────────────────────────

    /// Current topological level.
    pub fn level(&self) -> Level {
        self.level.load(Ordering::Acquire)
    }

    /// Overwrite the current level. Levels only ever increase.
    pub fn store_level(&self, level: Level) {
        self.level.store(level, Ordering::Release);
    }

    /// Pending level, raised by invalidation and adopted at dequeue.
    pub fn new_level(&self) -> Level {
        self.new_level.load(Ordering::Acquire)
    }

    /// Raise the pending level to at least `level`.
    pub fn raise_new_level(&self, level: Level) {
        self.new_level.fetch_max(level, Ordering::AcqRel);
    }

    // ── Scheduling flag ────────────────────────────────────────────

    /// Claim the scheduled flag. Returns `true` exactly once per
    /// schedule/clear cycle, deduplicating concurrent enqueues.
    pub fn try_schedule(&self) -> bool {
        !self.queued.swap(true, Ordering::AcqRel)
    }

    /// Set or clear the scheduled flag unconditionally.
    pub fn set_queued(&self, queued: bool) {
        self.queued.store(queued, Ordering::Release);
    }

    /// Whether the node is currently scheduled.
    pub fn is_queued(&self) -> bool {
        self.queued.load(Ordering::Acquire)
    }

    // ── Pulse counter ──────────────────────────────────────────────
    //
    // The original engines decremented this counter with relaxed
    // ordering, relying on the task schedule for happens-before. The
    // stricter AcqRel here is deliberate: the release of the counter is
    // what publishes the predecessor's pulse flags to the task that
    // strikes zero.

    /// Add one incoming-edge obligation for the current turn.
    pub fn add_threshold(&self, n: i64) {
        self.threshold.fetch_add(n, Ordering::AcqRel);
    }

    /// Remove one obligation; returns the value before the decrement.
    pub fn dec_threshold(&self) -> i64 {
        self.threshold.fetch_sub(1, Ordering::AcqRel)
    }

    /// Overwrite the counter (dynamic re-parent mid-turn).
    pub fn set_threshold(&self, v: i64) {
        self.threshold.store(v, Ordering::Release);
    }

    /// Current counter value.
    pub fn threshold(&self) -> i64 {
        self.threshold.load(Ordering::Acquire)
    }

    // ── Update-pending flag (counter engines) ──────────────────────

    /// Record that at least one incoming nudge was a real pulse.
    pub fn set_should_update(&self, v: bool) {
        self.should_update.store(v, Ordering::Release);
    }

    /// Consume the update-pending flag.
    pub fn take_should_update(&self) -> bool {
        self.should_update.swap(false, Ordering::AcqRel)
    }

    // ── Turn mark ──────────────────────────────────────────────────

    /// Stamp this node with `mark`. Returns `true` if the node did not
    /// already carry it — i.e. the caller won the marker race.
    pub fn mark_once(&self, mark: u64) -> bool {
        self.mark.swap(mark, Ordering::AcqRel) != mark
    }

    /// Whether the node carries `mark`.
    pub fn is_marked(&self, mark: u64) -> bool {
        self.mark.load(Ordering::Acquire) == mark
    }

    /// Drop whatever mark the node carries. Marks issued by engines
    /// start at 1, so 0 never matches.
    pub fn clear_mark(&self) {
        self.mark.store(0, Ordering::Release);
    }

    // ── Locks ──────────────────────────────────────────────────────

    /// The shift lock guarding the edge lists.
    pub fn edges(&self) -> &RwLock<EdgeLists> {
        &self.edges
    }

    /// Source-set nudge protocol state.
    pub fn nudge(&self) -> MutexGuard<'_, NudgeState> {
        self.nudge.lock().expect("nudge lock poisoned")
    }

    /// This node's transitive input ancestors.
    pub fn sources(&self) -> &SourceIdSet {
        &self.sources
    }

    // ── Flooding evaluation protocol ───────────────────────────────

    /// Try to enter evaluation. Returns `false` if another task is
    /// already evaluating this node; that task will re-run it.
    pub fn begin_eval(&self) -> bool {
        let mut eval = self.eval.lock().expect("eval lock poisoned");
        if eval.processing {
            eval.reprocess = true;
            false
        } else {
            eval.processing = true;
            true
        }
    }

    /// Leave evaluation. Returns whether a repeat pass was requested
    /// while this one was running.
    pub fn end_eval(&self) -> bool {
        let mut eval = self.eval.lock().expect("eval lock poisoned");
        eval.processing = false;
        std::mem::take(&mut eval.reprocess)
    }
}

impl std::fmt::Debug for NodeMeta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeMeta")
            .field("level", &self.level())
            .field("new_level", &self.new_level())
            .field("queued", &self.is_queued())
            .finish_non_exhaustive()
    }
}

/// A registered node: category flags, the boxed implementation, and
/// the scheduling metadata block.
pub struct NodeCell {
    id: NodeId,
    flags: NodeFlags,
    node: Mutex<Box<dyn ReactiveNode>>,
    meta: NodeMeta,
}

impl NodeCell {
    /// Wrap a node implementation for registration under `id`.
    pub fn new(id: NodeId, flags: NodeFlags, node: Box<dyn ReactiveNode>) -> Self {
        Self {
            id,
            flags,
            node: Mutex::new(node),
            meta: NodeMeta::new(),
        }
    }

    /// The node's registry id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Category flags fixed at registration.
    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    /// Lock the node implementation.
    ///
    /// Uncontended under the engines' scheduling invariant; the lock
    /// exists so that invariant is a safety property, not a prayer.
    pub fn node(&self) -> MutexGuard<'_, Box<dyn ReactiveNode>> {
        self.node.lock().expect("node lock poisoned")
    }

    /// Scheduling metadata.
    pub fn meta(&self) -> &NodeMeta {
        &self.meta
    }

    /// Snapshot of the successor list.
    pub fn successors(&self) -> SmallVec<[NodeId; 4]> {
        self.meta
            .edges()
            .read()
            .expect("shift lock poisoned")
            .successors
            .clone()
    }

    /// Snapshot of the predecessor list.
    pub fn predecessors(&self) -> SmallVec<[NodeId; 4]> {
        self.meta
            .edges()
            .read()
            .expect("shift lock poisoned")
            .predecessors
            .clone()
    }
}

impl std::fmt::Debug for NodeCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeCell")
            .field("id", &self.id)
            .field("flags", &self.flags)
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}
