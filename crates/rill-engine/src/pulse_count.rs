//! Pulse-count propagation: local counters instead of a level queue.
//!
//! Each turn runs two passes. The marker pass floods every node
//! reachable from the changed inputs, stamping it with the turn's mark
//! and incrementing its pulse threshold once per reachable incoming
//! edge. The nudge pass then walks the same region: a finishing node
//! decrements each successor's threshold, and a successor runs when
//! its counter strikes zero — updating if any nudge carried a real
//! pulse, forwarding an idle pulse otherwise.
//!
//! The marker pass keeps two work stacks per task and hands the larger
//! one to a fresh task when it grows, so wide fan-outs split instead
//! of serializing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use rayon::Scope;

use rill_core::{EdgeRequest, NodeId, TurnError, UpdateResult};
use rill_graph::{topology, Registry};

use crate::engine::{run_update, ErrorSlot, PropagationEngine};
use crate::turn::Turn;

/// Work-stack size at which the marker pass sheds load to a new task.
const SPLIT_THRESHOLD: usize = 4;

/// Parallel engine driven by per-node pulse counters.
pub struct PulseCountEngine {
    changed_inputs: Mutex<Vec<NodeId>>,
    marks: AtomicU64,
    error: ErrorSlot,
}

impl PulseCountEngine {
    /// Create the engine.
    pub fn new() -> Self {
        Self {
            changed_inputs: Mutex::new(Vec::new()),
            marks: AtomicU64::new(0),
            error: ErrorSlot::default(),
        }
    }

    /// Marker pass over everything reachable from `stack`.
    fn mark_reachable<'s>(
        &'s self,
        mut left: Vec<NodeId>,
        mark: u64,
        reg: &'s Registry,
        scope: &Scope<'s>,
    ) {
        let mut right: Vec<NodeId> = Vec::new();
        loop {
            let node = if left.len() > right.len() {
                left.pop()
            } else {
                right.pop()
            };
            let Some(node) = node else { break };

            for succ in reg.cell(node).successors() {
                let meta = reg.cell(succ).meta();
                meta.add_threshold(1);
                if !meta.mark_once(mark) {
                    continue;
                }
                if left.len() > right.len() {
                    right.push(succ);
                } else {
                    left.push(succ);
                }
                if left.len() > SPLIT_THRESHOLD {
                    let shed = std::mem::take(&mut left);
                    scope.spawn(move |s| self.mark_reachable(shed, mark, reg, s));
                }
            }
        }
    }

    /// Decrement successors' thresholds, releasing the ones that hit
    /// zero, then drop this node's mark: it has finished for the turn.
    fn nudge_children<'s>(
        &'s self,
        id: NodeId,
        update: bool,
        mark: u64,
        turn: &'s Turn,
        reg: &'s Registry,
        scope: &Scope<'s>,
    ) {
        let cell = reg.cell(id);
        let edges = cell.meta().edges().read().expect("shift lock poisoned");
        for &succ in &edges.successors {
            let meta = reg.cell(succ).meta();
            if update {
                meta.set_should_update(true);
            }
            if meta.dec_threshold() > 1 {
                continue;
            }
            scope.spawn(move |s| self.process_child(succ, mark, turn, reg, s));
        }
        cell.meta().clear_mark();
    }

    /// A node whose counter struck zero: update it if any nudge was a
    /// real pulse, otherwise just forward the idle pulse.
    fn process_child<'s>(
        &'s self,
        id: NodeId,
        mark: u64,
        turn: &'s Turn,
        reg: &'s Registry,
        scope: &Scope<'s>,
    ) {
        if self.error.is_set() {
            return;
        }
        if reg.cell(id).meta().take_should_update() {
            self.tick(id, mark, turn, reg, scope);
        } else {
            self.nudge_children(id, false, mark, turn, reg, scope);
        }
    }

    fn tick<'s>(
        &'s self,
        id: NodeId,
        mark: u64,
        turn: &'s Turn,
        reg: &'s Registry,
        scope: &Scope<'s>,
    ) {
        let cell = reg.cell(id);
        match run_update(cell, turn, reg) {
            Err(e) => self.error.post(e),
            Ok((result, requests)) => {
                if requests.is_empty() {
                    // A shift without edge requests has nothing to wait
                    // for; successors still need their counters drained.
                    match result {
                        UpdateResult::Changed => {
                            self.nudge_children(id, true, mark, turn, reg, scope);
                        }
                        UpdateResult::Unchanged | UpdateResult::Shifted => {
                            self.nudge_children(id, false, mark, turn, reg, scope);
                        }
                    }
                } else {
                    self.apply_shift(id, requests, mark, turn, reg, scope);
                    match result {
                        UpdateResult::Changed => {
                            self.nudge_children(id, true, mark, turn, reg, scope);
                        }
                        UpdateResult::Unchanged => {
                            self.nudge_children(id, false, mark, turn, reg, scope);
                        }
                        // apply_shift either re-ticked the node or armed
                        // it to wait for the new parent's nudge.
                        UpdateResult::Shifted => {}
                    }
                }
            }
        }
    }

    /// Mid-turn re-parent. The new edge goes in under the parent's
    /// shift lock, together with the only question that matters: has
    /// the parent already nudged its children this turn? If it still
    /// carries the turn mark it has not, so this node arms a threshold
    /// of one and waits; otherwise it re-ticks immediately to observe
    /// the parent's settled value.
    fn apply_shift<'s>(
        &'s self,
        id: NodeId,
        requests: smallvec::SmallVec<[EdgeRequest; 2]>,
        mark: u64,
        turn: &'s Turn,
        reg: &'s Registry,
        scope: &Scope<'s>,
    ) {
        let cell = reg.cell(id);
        let mut tick_now = false;

        for request in requests {
            match request {
                EdgeRequest::Detach { parent } => {
                    reg.cell(parent)
                        .meta()
                        .edges()
                        .write()
                        .expect("shift lock poisoned")
                        .successors
                        .retain(|s| *s != id);
                    cell.meta()
                        .edges()
                        .write()
                        .expect("shift lock poisoned")
                        .predecessors
                        .retain(|p| *p != parent);
                    topology::invalidate_sources(reg, id);
                }
                EdgeRequest::Attach { parent } => {
                    topology::assert_attach_legal(reg, id, parent);
                    let parent_cell = reg.cell(parent);
                    // Arm the wait inside the parent's shift lock: the
                    // parent cannot nudge the new edge before the
                    // threshold is in place.
                    let wait_for_parent = {
                        let mut edges = parent_cell
                            .meta()
                            .edges()
                            .write()
                            .expect("shift lock poisoned");
                        edges.successors.push(id);
                        let wait = parent_cell.meta().is_marked(mark);
                        if wait {
                            cell.meta().set_threshold(1);
                            cell.meta().set_should_update(true);
                        }
                        wait
                    };
                    cell.meta()
                        .edges()
                        .write()
                        .expect("shift lock poisoned")
                        .predecessors
                        .push(parent);
                    topology::record_attach(reg, id, parent);
                    topology::propagate_downstream(reg, id);

                    if !wait_for_parent {
                        tick_now = true;
                    }
                }
            }
        }

        if tick_now {
            self.tick(id, mark, turn, reg, scope);
        }
    }

    /// Scrub per-node counters after an aborted turn so the next one
    /// starts from a clean slate.
    fn scrub(&self, reg: &Registry) {
        for cell in reg.iter() {
            cell.meta().set_threshold(0);
            cell.meta().set_should_update(false);
            cell.meta().clear_mark();
        }
    }
}

impl Default for PulseCountEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PropagationEngine for PulseCountEngine {
    fn input_changed(&self, id: NodeId, _turn: &Turn, _reg: &Registry) {
        self.changed_inputs
            .lock()
            .expect("changed-input list poisoned")
            .push(id);
    }

    fn propagate(&self, turn: &Turn, reg: &Registry) -> Result<(), TurnError> {
        let changed = std::mem::take(
            &mut *self
                .changed_inputs
                .lock()
                .expect("changed-input list poisoned"),
        );
        if changed.is_empty() {
            return Ok(());
        }
        let mark = self.marks.fetch_add(1, Ordering::Relaxed) + 1;

        // Changed inputs carry the mark too: a node that re-parents
        // onto one mid-turn must wait for its nudge, exactly as for a
        // derived node that has not finished yet.
        for &input in &changed {
            reg.cell(input).meta().mark_once(mark);
        }

        rayon::scope(|s| {
            for &input in &changed {
                s.spawn(move |s| self.mark_reachable(vec![input], mark, reg, s));
            }
        });

        rayon::scope(|s| {
            for &input in &changed {
                s.spawn(move |s| self.nudge_children(input, true, mark, turn, reg, s));
            }
        });

        if let Some(err) = self.error.take() {
            self.scrub(reg);
            return Err(err);
        }
        Ok(())
    }
}
