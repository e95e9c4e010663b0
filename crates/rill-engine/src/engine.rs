//! The engine contract and the shared update-invocation path.
//!
//! One engine drives a graph instance. The trait is object-safe; the
//! graph facade holds a `Box<dyn PropagationEngine>` chosen at
//! construction via [`EngineKind`]. Turn serialization lives outside
//! the engines, so every method can assume at most one turn is in
//! flight.

use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Mutex;

use smallvec::SmallVec;

use rill_core::{
    EdgeRequest, NodeFlags, NodeId, TurnError, UpdateContext, UpdateResult,
};
use rill_graph::{topology, NodeCell, Registry};

use crate::turn::Turn;

/// Engine selection for a graph instance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EngineKind {
    /// Reference topological-sort engine, single-threaded.
    #[default]
    TopoSortSeq,
    /// Topological-sort engine with parallel level batches.
    TopoSortPar,
    /// Pulse-count engine: marker flood plus per-node counters.
    PulseCount,
    /// Source-set engine: per-node input-ancestor sets prune the walk.
    SourceSet,
    /// Flooding engine: unordered scheduling, outputs deduped at the end.
    Flooding,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TopoSortSeq => "toposort-seq",
            Self::TopoSortPar => "toposort-par",
            Self::PulseCount => "pulse-count",
            Self::SourceSet => "source-set",
            Self::Flooding => "flooding",
        };
        write!(f, "{name}")
    }
}

/// Construct the engine for `kind`.
pub fn make_engine(kind: EngineKind) -> Box<dyn PropagationEngine> {
    match kind {
        EngineKind::TopoSortSeq => Box::new(crate::toposort::SeqTopoSortEngine::new()),
        EngineKind::TopoSortPar => Box::new(crate::toposort::ParTopoSortEngine::new()),
        EngineKind::PulseCount => Box::new(crate::pulse_count::PulseCountEngine::new()),
        EngineKind::SourceSet => Box::new(crate::source_set::SourceSetEngine::new()),
        EngineKind::Flooding => Box::new(crate::flooding::FloodingEngine::new()),
    }
}

/// Order-of-evaluation policy for one graph.
///
/// Structural hooks default to the shared topology operations; engines
/// override only what their scheduling discipline needs.
pub trait PropagationEngine: Send + Sync {
    /// A node was registered.
    fn register_node(&self, _id: NodeId, _flags: NodeFlags, _reg: &Registry) {}

    /// A node is about to be unregistered (edges already detached).
    fn unregister_node(&self, _id: NodeId, _reg: &Registry) {}

    /// Static edge creation, during graph construction.
    fn attach(&self, node: NodeId, parent: NodeId, reg: &Registry) {
        topology::attach(reg, node, parent);
    }

    /// Static edge removal.
    fn detach(&self, node: NodeId, parent: NodeId, reg: &Registry) {
        topology::detach(reg, node, parent);
    }

    /// A source node was touched by the turn being admitted, whether or
    /// not its value ends up changing.
    fn input_admitted(&self, _id: NodeId, _turn: &Turn, _reg: &Registry) {}

    /// A source node's applied input actually changed its state.
    fn input_changed(&self, id: NodeId, turn: &Turn, reg: &Registry);

    /// Run the turn's propagation to quiescence.
    fn propagate(&self, turn: &Turn, reg: &Registry) -> Result<(), TurnError>;
}

/// First-error slot for parallel propagation.
///
/// Worker tasks record the first failure and check it before taking on
/// more nodes; propagation drains quickly once a failure is posted.
#[derive(Debug, Default)]
pub(crate) struct ErrorSlot {
    slot: Mutex<Option<TurnError>>,
}

impl ErrorSlot {
    pub fn post(&self, err: TurnError) {
        let mut slot = self.slot.lock().expect("error slot poisoned");
        slot.get_or_insert(err);
    }

    pub fn is_set(&self) -> bool {
        self.slot.lock().expect("error slot poisoned").is_some()
    }

    pub fn take(&self) -> Option<TurnError> {
        self.slot.lock().expect("error slot poisoned").take()
    }
}

/// Invoke one node's update under the engine scheduling invariant.
///
/// Builds the per-call context, runs the update, routes continuations
/// and detach requests onto the turn, records a buffer clear when a
/// buffered node pulses, and bumps the turn counters. Dynamic edge
/// requests are returned for the engine to apply under its own
/// discipline.
pub(crate) fn run_update(
    cell: &NodeCell,
    turn: &Turn,
    _reg: &Registry,
) -> Result<(UpdateResult, SmallVec<[EdgeRequest; 2]>), TurnError> {
    let id = cell.id();
    let mut ctx = UpdateContext::new(turn.id(), id);
    let result = cell
        .node()
        .update(&mut ctx)
        .map_err(|reason| TurnError::NodeFailed { node: id, reason })?;
    let effects = ctx.finish();
    turn.record_continuations(effects.continuations);
    turn.record_detaches(effects.detach_requests);

    let counters = turn.counters();
    counters.updates.fetch_add(1, Ordering::Relaxed);
    match result {
        UpdateResult::Changed => {
            counters.pulses.fetch_add(1, Ordering::Relaxed);
            if cell.flags().buffered {
                turn.record_buffer_clear(id);
            }
        }
        UpdateResult::Unchanged => {
            counters.idle_pulses.fetch_add(1, Ordering::Relaxed);
        }
        UpdateResult::Shifted => {
            counters.shifts.fetch_add(1, Ordering::Relaxed);
        }
    }

    Ok((result, effects.edge_requests))
}
