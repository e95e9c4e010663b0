//! Flooding propagation: no ordering, maximal simplicity.
//!
//! Each pulsed node schedules its successors; a CAS on the scheduled
//! flag stops the same node being queued twice, and a small per-node
//! evaluation lock turns a re-trigger that lands mid-evaluation into a
//! repeat pass after the current one finishes. Output nodes are not
//! evaluated inline: they collect into a deduplicated set and run once
//! when the flood has quiesced. This is the baseline engine the others
//! are validated against, best suited to small graphs.

use std::sync::Mutex;

use indexmap::IndexSet;
use rayon::Scope;

use rill_core::{EdgeRequest, NodeId, TurnError, UpdateResult};
use rill_graph::{topology, Registry};

use crate::engine::{run_update, ErrorSlot, PropagationEngine};
use crate::turn::Turn;

/// Parallel engine that floods the graph without level ordering.
pub struct FloodingEngine {
    changed_inputs: Mutex<Vec<NodeId>>,
    outputs: Mutex<IndexSet<NodeId>>,
    error: ErrorSlot,
}

impl FloodingEngine {
    /// Create the engine.
    pub fn new() -> Self {
        Self {
            changed_inputs: Mutex::new(Vec::new()),
            outputs: Mutex::new(IndexSet::new()),
            error: ErrorSlot::default(),
        }
    }

    /// Schedule the successors of a pulsed node.
    fn pulse<'s>(&'s self, id: NodeId, turn: &'s Turn, reg: &'s Registry, scope: &Scope<'s>) {
        let cell = reg.cell(id);
        let edges = cell.meta().edges().read().expect("shift lock poisoned");
        for &succ in &edges.successors {
            let succ_cell = reg.cell(succ);
            if succ_cell.flags().output {
                self.outputs
                    .lock()
                    .expect("output set poisoned")
                    .insert(succ);
            } else if succ_cell.meta().try_schedule() {
                scope.spawn(move |s| self.process(succ, turn, reg, s));
            }
        }
    }

    /// Evaluate a scheduled node, repeating while predecessors keep
    /// re-triggering it.
    fn process<'s>(&'s self, id: NodeId, turn: &'s Turn, reg: &'s Registry, scope: &Scope<'s>) {
        let cell = reg.cell(id);
        loop {
            if self.error.is_set() {
                return;
            }
            cell.meta().set_queued(false);
            if !cell.meta().begin_eval() {
                // Another task owns the evaluation; it will repeat.
                return;
            }

            let mut rerun = false;
            match run_update(cell, turn, reg) {
                Err(e) => self.error.post(e),
                Ok((result, requests)) => {
                    for request in requests {
                        match request {
                            EdgeRequest::Attach { parent } => {
                                topology::dynamic_attach(reg, id, parent);
                                // Re-run to observe the new parent; if the
                                // parent is still in flight it re-triggers
                                // this node again on its own pulse.
                                rerun = true;
                            }
                            EdgeRequest::Detach { parent } => {
                                topology::dynamic_detach(reg, id, parent);
                            }
                        }
                    }
                    if result == UpdateResult::Changed {
                        self.pulse(id, turn, reg, scope);
                    }
                }
            }

            let repeat = cell.meta().end_eval();
            if !(repeat || rerun) {
                break;
            }
        }
    }

    fn scrub(&self, reg: &Registry) {
        for cell in reg.iter() {
            cell.meta().set_queued(false);
        }
        self.outputs.lock().expect("output set poisoned").clear();
    }
}

impl Default for FloodingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PropagationEngine for FloodingEngine {
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

        rayon::scope(|s| {
            for &input in &changed {
                s.spawn(move |s| self.pulse(input, turn, reg, s));
            }
        });

        if let Some(err) = self.error.take() {
            self.scrub(reg);
            return Err(err);
        }

        // The flood has quiesced; run the collected observers once.
        let outputs: Vec<NodeId> = self
            .outputs
            .lock()
            .expect("output set poisoned")
            .drain(..)
            .collect();
        rayon::scope(|s| {
            for &output in &outputs {
                s.spawn(move |_| {
                    if self.error.is_set() {
                        return;
                    }
                    if let Err(e) = run_update(reg.cell(output), turn, reg) {
                        self.error.post(e);
                    }
                });
            }
        });

        if let Some(err) = self.error.take() {
            self.scrub(reg);
            return Err(err);
        }
        Ok(())
    }
}
