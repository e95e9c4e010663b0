//! The node update contract: [`ReactiveNode`], [`UpdateResult`], and
//! [`UpdateContext`].
//!
//! The core never inspects node values. A node is a black box with an
//! update procedure; signals, event streams, and observers are all
//! expressed by the layer above in terms of this trait.

use smallvec::SmallVec;

use crate::error::NodeError;
use crate::id::{NodeId, TurnId};
use crate::input::InputWrite;

/// Outcome of a node's update procedure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateResult {
    /// The node ticked but its value did not change. Counter-based
    /// engines still forward an idle pulse to successors.
    Unchanged,
    /// The node's value (or event buffer) changed; successors must run.
    Changed,
    /// The node re-parented itself during the update and must not be
    /// treated as having produced a value. The engine reschedules it;
    /// its final update this turn sees the corrected topology.
    Shifted,
}

/// A dynamic edge change requested by a node from inside its own update.
///
/// The subject of the request is always the updating node itself; only
/// the far end of the edge is named.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeRequest {
    /// Attach the updating node beneath `parent`.
    Attach {
        /// The new predecessor.
        parent: NodeId,
    },
    /// Detach the updating node from `parent`.
    Detach {
        /// The predecessor to drop.
        parent: NodeId,
    },
}

/// Context handed to [`ReactiveNode::update`] for the duration of one
/// update call.
///
/// Everything a callback may legally do besides reading its
/// predecessors goes through here: dynamic re-parenting, emitting
/// inputs for the *next* turn, and queueing self-detachment. Each
/// update call receives a fresh context; the engine absorbs the
/// collected effects when the call returns.
#[derive(Debug)]
pub struct UpdateContext {
    turn_id: TurnId,
    node: NodeId,
    edge_requests: SmallVec<[EdgeRequest; 2]>,
    continuations: Vec<InputWrite>,
    detach_requests: Vec<NodeId>,
}

impl UpdateContext {
    /// Create a context for updating `node` within turn `turn_id`.
    pub fn new(turn_id: TurnId, node: NodeId) -> Self {
        Self {
            turn_id,
            node,
            edge_requests: SmallVec::new(),
            continuations: Vec::new(),
            detach_requests: Vec::new(),
        }
    }

    /// The id of the turn driving this update.
    pub fn turn_id(&self) -> TurnId {
        self.turn_id
    }

    /// The id of the node being updated.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Request attachment of this node beneath `parent`.
    ///
    /// Only legal for nodes registered with the `dynamic` flag. The
    /// engine applies the request according to its scheduling
    /// discipline; the update should return [`UpdateResult::Shifted`]
    /// after re-parenting.
    pub fn dynamic_attach(&mut self, parent: NodeId) {
        self.edge_requests.push(EdgeRequest::Attach { parent });
    }

    /// Request detachment of this node from `parent`.
    pub fn dynamic_detach(&mut self, parent: NodeId) {
        self.edge_requests.push(EdgeRequest::Detach { parent });
    }

    /// Record an input for the turn that follows this one.
    ///
    /// Inputs submitted during a turn must not mutate the current
    /// turn's inputs; they are buffered as the continuation and become
    /// the initial inputs of the next turn.
    pub fn submit(&mut self, node: NodeId, write: impl FnOnce() + Send + 'static) {
        self.continuations.push(InputWrite::new(node, write));
    }

    /// Queue `node` for detachment after the current turn ends.
    ///
    /// Used by observers that remove themselves from inside their own
    /// callback.
    pub fn queue_detach(&mut self, node: NodeId) {
        self.detach_requests.push(node);
    }

    /// Consume the context, yielding the effects collected during the
    /// update call.
    pub fn finish(self) -> UpdateEffects {
        UpdateEffects {
            edge_requests: self.edge_requests,
            continuations: self.continuations,
            detach_requests: self.detach_requests,
        }
    }
}

/// Effects collected from one update call, consumed by the engine.
#[derive(Debug, Default)]
pub struct UpdateEffects {
    /// Dynamic edge changes requested by the node, in request order.
    /// A re-parent is a detach/attach pair, so two slots stay inline.
    pub edge_requests: SmallVec<[EdgeRequest; 2]>,
    /// Inputs recorded for the following turn.
    pub continuations: Vec<InputWrite>,
    /// Nodes queued for post-turn detachment.
    pub detach_requests: Vec<NodeId>,
}

impl UpdateEffects {
    /// Whether the update produced no effects at all.
    pub fn is_empty(&self) -> bool {
        self.edge_requests.is_empty()
            && self.continuations.is_empty()
            && self.detach_requests.is_empty()
    }
}

/// A node in the reactive graph.
///
/// Implementations live in the layer above the core (signal and event
/// combinators, observers, test fixtures). The core calls `update`
/// under its scheduling invariant: no other task reads or writes the
/// node while an update is in flight.
pub trait ReactiveNode: Send {
    /// Recompute this node from its predecessors' current state.
    ///
    /// Called at most once per turn unless the node returned
    /// [`UpdateResult::Shifted`] and was rescheduled.
    fn update(&mut self, ctx: &mut UpdateContext) -> Result<UpdateResult, NodeError>;

    /// Move the pending input slot into the node's value or buffer.
    ///
    /// Called once per touched source node during turn admission, after
    /// all of the transaction's writes have run. Returns whether the
    /// node's state actually changed (and propagation should reach its
    /// successors). Non-source nodes keep the default.
    fn apply_input(&mut self) -> bool {
        false
    }

    /// Clear the node's event buffer.
    ///
    /// Called exactly once, after any turn in which this node emitted,
    /// before the next turn begins admission. Only meaningful for nodes
    /// registered with the `buffered` flag.
    fn clear_buffer(&mut self) {}
}
