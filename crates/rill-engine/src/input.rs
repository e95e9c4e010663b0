//! The input and transaction manager.
//!
//! All external writes funnel through here. A transaction body runs
//! during admission and submits [`InputWrite`]s through a
//! [`TransactionCtx`]; the manager then runs every write, applies each
//! touched source's pending input exactly once, hands the turn to the
//! engine, clears emitted buffers, applies queued detachments, and
//! releases the serializer — then drains the turn's continuation
//! buffer into fresh non-merging turns until a turn ends quiet.
//!
//! A failed turn keeps the cleanup obligations: buffers are cleared,
//! queued detachments run, and the queue successor is always
//! unblocked. Only the continuations are discarded.

use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::time::Instant;

use indexmap::IndexSet;

use rill_core::{InputWrite, NodeId, TurnError, TurnFlags, TurnIdSource};
use rill_graph::{topology, Registry};

use crate::engine::PropagationEngine;
use crate::metrics::TurnMetrics;
use crate::queue::{QueueEntry, TransactionBody, TurnQueue};
use crate::turn::Turn;

/// Context handed to a transaction body during admission.
///
/// Collects the transaction's input writes; they run after the body
/// (and any merged bodies) returns.
#[derive(Default)]
pub struct TransactionCtx {
    writes: Vec<InputWrite>,
}

impl TransactionCtx {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Submit a write to `node`'s pending input slot.
    ///
    /// Multiple writes to the same node within one transaction all
    /// run, in submission order, before the node's input is applied.
    pub fn submit(&mut self, node: NodeId, write: impl FnOnce() + Send + 'static) {
        self.writes.push(InputWrite::new(node, write));
    }

    fn take_writes(self) -> Vec<InputWrite> {
        self.writes
    }
}

impl std::fmt::Debug for TransactionCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionCtx")
            .field("writes", &self.writes.len())
            .finish()
    }
}

/// Countdown barrier for asynchronous transactions.
///
/// Each enqueued transaction increments the count; the worker
/// decrements it after the transaction's turn (and continuations)
/// finish. [`wait`](TransactionStatus::wait) blocks while any are
/// outstanding.
#[derive(Debug, Default)]
pub struct TransactionStatus {
    pending: Mutex<usize>,
    cv: Condvar,
}

impl TransactionStatus {
    /// Create a status with nothing outstanding.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&self) {
        *self.pending.lock().expect("status poisoned") += 1;
    }

    pub(crate) fn done(&self) {
        let mut pending = self.pending.lock().expect("status poisoned");
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.cv.notify_all();
        }
    }

    /// Block until every transaction tracked by this status has run.
    pub fn wait(&self) {
        let mut pending = self.pending.lock().expect("status poisoned");
        while *pending > 0 {
            pending = self.cv.wait(pending).expect("status poisoned");
        }
    }
}

/// An enqueued asynchronous transaction.
pub(crate) struct AsyncItem {
    pub flags: TurnFlags,
    pub status: Option<Arc<TransactionStatus>>,
    pub body: TransactionBody,
}

/// Serializes turns, assigns turn ids, and drives the turn protocol.
pub(crate) struct InputManager {
    queue: TurnQueue,
    turn_ids: TurnIdSource,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            queue: TurnQueue::new(),
            turn_ids: TurnIdSource::new(),
        }
    }

    /// Synchronous transaction entry point.
    pub fn do_transaction(
        &self,
        registry: &RwLock<Registry>,
        engine: &dyn PropagationEngine,
        metrics: &Mutex<TurnMetrics>,
        flags: TurnFlags,
        body: TransactionBody,
    ) -> Result<(), TurnError> {
        let body = if flags.merge_inputs {
            match self.try_merge(metrics, body) {
                Ok(()) => return Ok(()),
                Err(body) => body,
            }
        } else {
            body
        };
        self.run_transaction(registry, engine, metrics, flags, vec![body])
    }

    /// Attempt to fold `body` into the turn currently waiting at the
    /// queue tail. Blocks until that turn ends when it succeeds.
    pub fn try_merge(
        &self,
        metrics: &Mutex<TurnMetrics>,
        body: TransactionBody,
    ) -> Result<(), TransactionBody> {
        self.queue.try_merge(body)?;
        metrics.lock().expect("metrics poisoned").merged_transactions += 1;
        Ok(())
    }

    /// Run one or more bodies as a single serialized turn, then drain
    /// its continuations.
    pub fn run_transaction(
        &self,
        registry: &RwLock<Registry>,
        engine: &dyn PropagationEngine,
        metrics: &Mutex<TurnMetrics>,
        flags: TurnFlags,
        bodies: Vec<TransactionBody>,
    ) -> Result<(), TurnError> {
        let entry = Arc::new(QueueEntry::new(flags.merge_inputs));
        self.queue.start_turn(&entry);

        // Admission phase 1: collect writes from the transaction's own
        // bodies, then from transactions that merged in while this one
        // was waiting.
        let mut ctx = TransactionCtx::new();
        for body in bodies {
            body(&mut ctx);
        }
        for merged in entry.take_merged_bodies() {
            merged(&mut ctx);
        }
        let writes = ctx.take_writes();

        let mut turn = self.commit_turn(registry, engine, metrics, flags, writes, &entry, false)?;

        // Continuation loop: inputs recorded during a turn become the
        // next turn, with merging disabled, until one ends quiet.
        loop {
            let writes = turn.take_continuations();
            if writes.is_empty() {
                return Ok(());
            }
            let entry = Arc::new(QueueEntry::new(false));
            self.queue.start_turn(&entry);
            turn = self.commit_turn(
                registry,
                engine,
                metrics,
                TurnFlags::default(),
                writes,
                &entry,
                true,
            )?;
        }
    }

    /// Run one admitted turn to completion: apply inputs, propagate,
    /// clear buffers, apply detachments, release the serializer, fold
    /// metrics. The serializer is released on the error path too.
    #[allow(clippy::too_many_arguments)]
    fn commit_turn(
        &self,
        registry: &RwLock<Registry>,
        engine: &dyn PropagationEngine,
        metrics: &Mutex<TurnMetrics>,
        flags: TurnFlags,
        writes: Vec<InputWrite>,
        entry: &Arc<QueueEntry>,
        is_continuation: bool,
    ) -> Result<Turn, TurnError> {
        let start = Instant::now();
        let turn = Turn::new(self.turn_ids.next(), flags);

        let result = {
            let reg = registry.read().expect("registry lock poisoned");
            let result = admit_and_propagate(&reg, engine, &turn, writes);
            // Buffers must be empty before the queue successor can
            // begin admission, so clear them while still serialized.
            clear_buffers(&reg, &turn);
            result
        };

        apply_detaches(registry, engine, &turn);
        self.queue.end_turn(entry);

        {
            let mut m = metrics.lock().expect("metrics poisoned");
            m.absorb(turn.counters(), start.elapsed().as_micros() as u64);
            if is_continuation {
                m.continuation_turns += 1;
            }
            if result.is_err() {
                m.failed_turns += 1;
            }
        }

        result.map(|()| turn)
    }
}

/// Admission phase 2 and propagation: run the writes, apply each
/// touched source's pending input once, notify the engine, propagate.
fn admit_and_propagate(
    reg: &Registry,
    engine: &dyn PropagationEngine,
    turn: &Turn,
    writes: Vec<InputWrite>,
) -> Result<(), TurnError> {
    let mut touched: IndexSet<NodeId> = IndexSet::new();
    for write in writes {
        touched.insert(write.node);
        write.run();
    }

    for &id in &touched {
        engine.input_admitted(id, turn, reg);
    }

    for &id in &touched {
        let cell = reg.cell(id);
        debug_assert!(cell.flags().input, "submitted write targets non-input node");
        let changed = cell.node().apply_input();
        if changed {
            if cell.flags().buffered {
                turn.record_buffer_clear(id);
            }
            engine.input_changed(id, turn, reg);
        }
    }

    // Even a turn whose inputs all applied without changing goes to
    // the engine: engines with per-turn admission state drain it and
    // return immediately when nothing pulsed.
    if touched.is_empty() {
        Ok(())
    } else {
        engine.propagate(turn, reg)
    }
}

/// Clear the event buffer of every node that emitted this turn,
/// exactly once per node.
fn clear_buffers(reg: &Registry, turn: &Turn) {
    let mut seen: IndexSet<NodeId> = IndexSet::new();
    for id in turn.take_buffer_clears() {
        if seen.insert(id) {
            reg.cell(id).node().clear_buffer();
        }
    }
}

/// Apply the turn's queued detachments: observers that removed
/// themselves during their callback leave the graph here.
///
/// Removed cells are dropped after the registry lock is released;
/// dropping a node may cascade into handle drops that re-enter the
/// lock.
fn apply_detaches(
    registry: &RwLock<Registry>,
    engine: &dyn PropagationEngine,
    turn: &Turn,
) {
    let detaches = turn.take_detaches();
    if detaches.is_empty() {
        return;
    }
    let mut removed = Vec::new();
    {
        let mut reg = registry.write().expect("registry lock poisoned");
        let mut seen: IndexSet<NodeId> = IndexSet::new();
        for id in detaches {
            if !seen.insert(id) || !reg.contains(id) {
                continue;
            }
            topology::detach_all(&reg, id);
            engine.unregister_node(id, &reg);
            removed.push(reg.remove(id));
        }
    }
    drop(removed);
}
