//! Source-set propagation: prune the walk to the turn's dependencies.
//!
//! Every node carries the set of input ancestors that can ever affect
//! it; the turn carries the set of inputs its transaction admitted. A
//! node is a dependency of the turn iff the two sets intersect, and
//! only dependencies count toward a node's release threshold. Nodes
//! reached by a nudge but untouched by the turn's inputs forward the
//! nudge idly without updating, so a turn that touches a small slice
//! of a large graph does proportionally little work.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use rayon::Scope;

use rill_core::{EdgeRequest, NodeId, TurnError, UpdateResult};
use rill_graph::{topology, NodeCell, Registry};

use crate::engine::{run_update, ErrorSlot, PropagationEngine};
use crate::turn::Turn;

/// Parallel engine that skips every node outside the turn's slice.
pub struct SourceSetEngine {
    admitted_inputs: Mutex<Vec<NodeId>>,
    changed_inputs: Mutex<Vec<NodeId>>,
    marks: AtomicU64,
    error: ErrorSlot,
}

impl SourceSetEngine {
    /// Create the engine.
    pub fn new() -> Self {
        Self {
            admitted_inputs: Mutex::new(Vec::new()),
            changed_inputs: Mutex::new(Vec::new()),
            marks: AtomicU64::new(0),
            error: ErrorSlot::default(),
        }
    }

    fn is_dependency(&self, cell: &NodeCell, turn: &Turn) -> bool {
        cell.meta().sources().intersects_with(turn.sources())
    }

    /// A node has settled for this turn: stamp it processed and nudge
    /// its successors.
    fn pulse<'s>(
        &'s self,
        id: NodeId,
        updated: bool,
        mark: u64,
        turn: &'s Turn,
        reg: &'s Registry,
        scope: &Scope<'s>,
    ) {
        let cell = reg.cell(id);
        let forward_invalidation = {
            let mut nudge = cell.meta().nudge();
            let inv = nudge.invalidated;
            nudge.invalidated = false;
            nudge.updated = false;
            nudge.visited = false;
            inv
        };

        let edges = cell.meta().edges().read().expect("shift lock poisoned");
        cell.meta().mark_once(mark);
        for &succ in &edges.successors {
            scope.spawn(move |s| {
                self.nudge(succ, updated, forward_invalidation, mark, turn, reg, s);
            });
        }
    }

    /// One incoming notification. The first nudge of the turn counts
    /// how many predecessors are dependencies; the last one releases
    /// the node.
    #[allow(clippy::too_many_arguments)]
    fn nudge<'s>(
        &'s self,
        id: NodeId,
        update: bool,
        invalidate: bool,
        mark: u64,
        turn: &'s Turn,
        reg: &'s Registry,
        scope: &Scope<'s>,
    ) {
        if self.error.is_set() {
            return;
        }
        let cell = reg.cell(id);

        let released = {
            let mut nudge = cell.meta().nudge();
            if update {
                nudge.updated = true;
            }
            if invalidate {
                nudge.invalidated = true;
            }
            if !nudge.visited {
                nudge.visited = true;
                nudge.threshold = 0;
                for pred in cell.predecessors() {
                    if self.is_dependency(reg.cell(pred), turn) {
                        nudge.threshold += 1;
                    }
                }
            }
            nudge.threshold -= 1;
            nudge.threshold <= 0
        };
        if !released {
            return;
        }

        let (should_tick, recompute_sources) = {
            let mut nudge = cell.meta().nudge();
            let tick = nudge.updated;
            let inv = nudge.invalidated;
            nudge.visited = false;
            nudge.updated = false;
            // Outputs end the walk; anything else keeps the flag so its
            // own pulse forwards the invalidation downstream.
            if cell.flags().output {
                nudge.invalidated = false;
            }
            (tick, inv)
        };

        if recompute_sources {
            topology::invalidate_sources(reg, id);
        }

        if should_tick {
            self.tick(id, mark, turn, reg, scope);
        } else {
            self.pulse(id, false, mark, turn, reg, scope);
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
                    match result {
                        UpdateResult::Changed => self.pulse(id, true, mark, turn, reg, scope),
                        UpdateResult::Unchanged | UpdateResult::Shifted => {
                            self.pulse(id, false, mark, turn, reg, scope);
                        }
                    }
                } else {
                    self.apply_shift(id, requests, mark, turn, reg, scope);
                    match result {
                        UpdateResult::Changed => self.pulse(id, true, mark, turn, reg, scope),
                        UpdateResult::Unchanged => self.pulse(id, false, mark, turn, reg, scope),
                        // apply_shift either re-ticked or armed a wait.
                        UpdateResult::Shifted => {}
                    }
                }
            }
        }
    }

    /// Mid-turn re-parent. Under the new parent's shift lock, decide
    /// whether the parent's settled value is already observable: if
    /// the parent is a dependency of this turn and has not yet been
    /// stamped processed, the node arms a threshold of one and waits
    /// for the parent's nudge; otherwise it re-ticks immediately.
    #[allow(clippy::too_many_arguments)]
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
                        let wait = self.is_dependency(parent_cell, turn)
                            && !parent_cell.meta().is_marked(mark);
                        let mut nudge = cell.meta().nudge();
                        nudge.invalidated = true;
                        if wait {
                            nudge.threshold = 1;
                            nudge.visited = true;
                            nudge.updated = true;
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

    fn scrub(&self, reg: &Registry) {
        for cell in reg.iter() {
            let mut nudge = cell.meta().nudge();
            nudge.visited = false;
            nudge.updated = false;
            nudge.invalidated = false;
            nudge.threshold = 0;
            drop(nudge);
            cell.meta().clear_mark();
        }
    }
}

impl Default for SourceSetEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PropagationEngine for SourceSetEngine {
    fn input_admitted(&self, id: NodeId, turn: &Turn, _reg: &Registry) {
        turn.sources().insert(id);
        self.admitted_inputs
            .lock()
            .expect("admitted-input list poisoned")
            .push(id);
    }

    fn input_changed(&self, id: NodeId, _turn: &Turn, _reg: &Registry) {
        self.changed_inputs
            .lock()
            .expect("changed-input list poisoned")
            .push(id);
    }

    fn propagate(&self, turn: &Turn, reg: &Registry) -> Result<(), TurnError> {
        let admitted = std::mem::take(
            &mut *self
                .admitted_inputs
                .lock()
                .expect("admitted-input list poisoned"),
        );
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

        // Every admitted input is a dependency of this turn, so every
        // admitted input must pulse — idly when its value did not
        // actually change — or downstream thresholds would count a
        // nudge that never comes.
        rayon::scope(|s| {
            for &input in &admitted {
                let updated = changed.contains(&input);
                s.spawn(move |s| self.pulse(input, updated, mark, turn, reg, s));
            }
        });

        if let Some(err) = self.error.take() {
            self.scrub(reg);
            return Err(err);
        }
        Ok(())
    }
}
