//! Topological-sort propagation: the reference engine, in sequential
//! and parallel form.
//!
//! Both variants drain a [`TopoQueue`] level by level. A dequeued node
//! whose `new_level` has been raised past its `level` adopts the new
//! level, invalidates its successors, and goes back into the queue —
//! that requeue is what makes mid-turn re-parenting converge. The
//! parallel variant runs each level batch through the rayon pool and
//! defers dynamic edge requests to the batch boundary, so no update
//! runs concurrently with an edge splice.

use std::sync::atomic::Ordering;
use std::sync::Mutex;

use rayon::prelude::*;

use rill_core::{EdgeRequest, NodeId, TurnError, UpdateResult};
use rill_graph::{topology, Registry};

use crate::engine::{run_update, ErrorSlot, PropagationEngine};
use crate::topo_queue::TopoQueue;
use crate::turn::Turn;

/// Schedule every successor of `id` that is not already queued.
fn schedule_successors(reg: &Registry, id: NodeId, queue: &mut TopoQueue) {
    for succ in reg.cell(id).successors() {
        let meta = reg.cell(succ).meta();
        if meta.try_schedule() {
            queue.push(succ, meta.level());
        }
    }
}

/// Reset scheduling flags for everything still queued after an abort.
fn abandon(reg: &Registry, queue: &mut TopoQueue) {
    for id in queue.drain() {
        reg.cell(id).meta().set_queued(false);
    }
}

// ── Sequential variant ─────────────────────────────────────────────

/// Single-threaded topological-sort engine.
///
/// The reference against which the parallel engines are validated: one
/// thread, strict level order, at most one update per node per turn
/// unless the node shifts.
pub struct SeqTopoSortEngine {
    queue: Mutex<TopoQueue>,
}

impl SeqTopoSortEngine {
    /// Create the engine.
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(TopoQueue::new()),
        }
    }
}

impl Default for SeqTopoSortEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PropagationEngine for SeqTopoSortEngine {
    fn input_changed(&self, id: NodeId, _turn: &Turn, reg: &Registry) {
        let mut queue = self.queue.lock().expect("topo queue poisoned");
        schedule_successors(reg, id, &mut queue);
    }

    fn propagate(&self, turn: &Turn, reg: &Registry) -> Result<(), TurnError> {
        let mut queue = self.queue.lock().expect("topo queue poisoned");
        while let Some(batch) = queue.fetch_next() {
            turn.counters().level_batches.fetch_add(1, Ordering::Relaxed);
            let mut batch = batch.into_iter();
            while let Some(id) = batch.next() {
                let cell = reg.cell(id);
                let meta = cell.meta();

                // Level raised since scheduling: adopt it, re-invalidate,
                // and run the node in its corrected batch instead.
                if meta.level() < meta.new_level() {
                    meta.store_level(meta.new_level());
                    topology::invalidate_successors(reg, id);
                    queue.push(id, meta.level());
                    continue;
                }

                meta.set_queued(false);
                let (result, requests) = match run_update(cell, turn, reg) {
                    Ok(v) => v,
                    Err(e) => {
                        for rest in batch {
                            reg.cell(rest).meta().set_queued(false);
                        }
                        abandon(reg, &mut queue);
                        return Err(e);
                    }
                };

                let mut requeued = false;
                for request in requests {
                    match request {
                        EdgeRequest::Attach { parent } => {
                            topology::dynamic_attach(reg, id, parent);
                            topology::invalidate_successors(reg, id);
                            if meta.try_schedule() {
                                queue.push(id, meta.level());
                            }
                            requeued = true;
                        }
                        EdgeRequest::Detach { parent } => {
                            topology::dynamic_detach(reg, id, parent);
                        }
                    }
                }

                match result {
                    UpdateResult::Changed => schedule_successors(reg, id, &mut queue),
                    UpdateResult::Unchanged => {}
                    UpdateResult::Shifted => {
                        topology::invalidate_successors(reg, id);
                        if !requeued && meta.try_schedule() {
                            queue.push(id, meta.level());
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

// ── Parallel variant ───────────────────────────────────────────────

/// Topological-sort engine with work-stealing level batches.
///
/// Dynamic edge requests raised inside a batch are stashed and applied
/// between batches on the draining thread.
pub struct ParTopoSortEngine {
    queue: Mutex<TopoQueue>,
    requests: Mutex<Vec<(NodeId, EdgeRequest)>>,
    error: ErrorSlot,
}

impl ParTopoSortEngine {
    /// Create the engine.
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(TopoQueue::new()),
            requests: Mutex::new(Vec::new()),
            error: ErrorSlot::default(),
        }
    }

    fn push(&self, id: NodeId, level: rill_core::Level) {
        self.queue.lock().expect("topo queue poisoned").push(id, level);
    }
}

impl Default for ParTopoSortEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PropagationEngine for ParTopoSortEngine {
    fn input_changed(&self, id: NodeId, _turn: &Turn, reg: &Registry) {
        let mut queue = self.queue.lock().expect("topo queue poisoned");
        schedule_successors(reg, id, &mut queue);
    }

    fn propagate(&self, turn: &Turn, reg: &Registry) -> Result<(), TurnError> {
        loop {
            let batch = {
                let mut queue = self.queue.lock().expect("topo queue poisoned");
                match queue.fetch_next() {
                    Some(batch) => batch,
                    None => break,
                }
            };
            turn.counters().level_batches.fetch_add(1, Ordering::Relaxed);

            batch.par_iter().for_each(|&id| {
                let cell = reg.cell(id);
                let meta = cell.meta();

                if self.error.is_set() {
                    meta.set_queued(false);
                    return;
                }

                if meta.level() < meta.new_level() {
                    meta.store_level(meta.new_level());
                    topology::invalidate_successors(reg, id);
                    self.push(id, meta.level());
                    return;
                }

                meta.set_queued(false);
                match run_update(cell, turn, reg) {
                    Err(e) => self.error.post(e),
                    Ok((result, requests)) => {
                        let had_attach = requests
                            .iter()
                            .any(|r| matches!(r, EdgeRequest::Attach { .. }));
                        if !requests.is_empty() {
                            self.requests
                                .lock()
                                .expect("request stash poisoned")
                                .extend(requests.into_iter().map(|r| (id, r)));
                        }
                        match result {
                            UpdateResult::Changed => {
                                for succ in cell.successors() {
                                    let smeta = reg.cell(succ).meta();
                                    if smeta.try_schedule() {
                                        self.push(succ, smeta.level());
                                    }
                                }
                            }
                            UpdateResult::Unchanged => {}
                            UpdateResult::Shifted => {
                                // The stashed attach reschedules the node
                                // when it is applied at the batch boundary.
                                if !had_attach {
                                    topology::invalidate_successors(reg, id);
                                    if meta.try_schedule() {
                                        self.push(id, meta.level());
                                    }
                                }
                            }
                        }
                    }
                }
            });

            if self.error.is_set() {
                let mut queue = self.queue.lock().expect("topo queue poisoned");
                abandon(reg, &mut queue);
                self.requests.lock().expect("request stash poisoned").clear();
                return Err(self.error.take().expect("error just observed"));
            }

            // Apply edge splices alone on this thread, between batches.
            let stashed = std::mem::take(
                &mut *self.requests.lock().expect("request stash poisoned"),
            );
            for (id, request) in stashed {
                match request {
                    EdgeRequest::Attach { parent } => {
                        topology::dynamic_attach(reg, id, parent);
                        topology::invalidate_successors(reg, id);
                        let meta = reg.cell(id).meta();
                        if meta.try_schedule() {
                            self.push(id, meta.level());
                        }
                    }
                    EdgeRequest::Detach { parent } => {
                        topology::dynamic_detach(reg, id, parent);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_core::{NodeError, NodeFlags, ReactiveNode, TurnFlags, TurnId, UpdateContext};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    /// Counts its own updates and always reports a change.
    struct Counting {
        hits: Arc<AtomicUsize>,
    }

    impl ReactiveNode for Counting {
        fn update(&mut self, _ctx: &mut UpdateContext) -> Result<UpdateResult, NodeError> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            Ok(UpdateResult::Changed)
        }
    }

    fn counting(reg: &mut Registry, flags: NodeFlags) -> (NodeId, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let id = reg.insert(
            flags,
            Box::new(Counting {
                hits: Arc::clone(&hits),
            }),
        );
        (id, hits)
    }

    fn diamond(reg: &mut Registry) -> (NodeId, [Arc<AtomicUsize>; 3]) {
        let (a, _) = counting(reg, NodeFlags::INPUT);
        let (b, hb) = counting(reg, NodeFlags::DERIVED);
        let (c, hc) = counting(reg, NodeFlags::DERIVED);
        let (d, hd) = counting(reg, NodeFlags::DERIVED);
        topology::attach(reg, b, a);
        topology::attach(reg, c, a);
        topology::attach(reg, d, b);
        topology::attach(reg, d, c);
        (a, [hb, hc, hd])
    }

    fn drive(engine: &dyn PropagationEngine, reg: &Registry, input: NodeId) {
        let turn = Turn::new(TurnId(1), TurnFlags::default());
        engine.input_changed(input, &turn, reg);
        engine.propagate(&turn, reg).unwrap();
    }

    #[test]
    fn seq_diamond_updates_each_node_once() {
        let mut reg = Registry::new();
        let (a, hits) = diamond(&mut reg);
        let engine = SeqTopoSortEngine::new();
        drive(&engine, &reg, a);
        for h in &hits {
            assert_eq!(h.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn par_diamond_updates_each_node_once() {
        let mut reg = Registry::new();
        let (a, hits) = diamond(&mut reg);
        let engine = ParTopoSortEngine::new();
        drive(&engine, &reg, a);
        for h in &hits {
            assert_eq!(h.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn queued_flags_are_clear_after_turn() {
        let mut reg = Registry::new();
        let (a, _) = diamond(&mut reg);
        let engine = SeqTopoSortEngine::new();
        drive(&engine, &reg, a);
        for cell in reg.iter() {
            assert!(!cell.meta().is_queued());
        }
    }

    #[test]
    fn failure_aborts_and_resets_scheduling_state() {
        struct Failing;
        impl ReactiveNode for Failing {
            fn update(&mut self, _ctx: &mut UpdateContext) -> Result<UpdateResult, NodeError> {
                Err(NodeError::ExecutionFailed {
                    reason: "expected".into(),
                })
            }
        }

        let mut reg = Registry::new();
        let (a, _) = counting(&mut reg, NodeFlags::INPUT);
        let bad = reg.insert(NodeFlags::DERIVED, Box::new(Failing));
        let (c, c_hits) = counting(&mut reg, NodeFlags::DERIVED);
        topology::attach(&reg, bad, a);
        topology::attach(&reg, c, bad);

        let engine = SeqTopoSortEngine::new();
        let turn = Turn::new(TurnId(1), TurnFlags::default());
        engine.input_changed(a, &turn, &reg);
        let err = engine.propagate(&turn, &reg).unwrap_err();
        assert!(matches!(err, TurnError::NodeFailed { node, .. } if node == bad));
        assert_eq!(c_hits.load(Ordering::SeqCst), 0);
        for cell in reg.iter() {
            assert!(!cell.meta().is_queued());
        }
    }

    #[test]
    fn both_variants_count_level_batches() {
        let mut reg = Registry::new();
        let (a, _) = diamond(&mut reg);
        let engine = ParTopoSortEngine::new();
        let turn = Turn::new(TurnId(1), TurnFlags::default());
        engine.input_changed(a, &turn, &reg);
        engine.propagate(&turn, &reg).unwrap();
        // Level 1 (b, c) and level 2 (d).
        assert_eq!(turn.counters().level_batches.load(Ordering::Relaxed), 2);
    }
}
