//! Error types for the Rill propagation core.
//!
//! Three families, by failure site: node update callbacks
//! ([`NodeError`]), whole turns ([`TurnError`]), and asynchronous
//! transaction submission ([`EnqueueError`]).
//!
//! Programmer errors — closing a cycle, reusing a stale node id,
//! attaching a successor to an output node — are not represented here.
//! They indicate a bug in the layer above the core and trap with a
//! panic at the call site.

use std::error::Error;
use std::fmt;

use crate::id::NodeId;

/// Failure reported by a user-supplied `update` callback.
///
/// Returned by [`ReactiveNode::update`](crate::ReactiveNode::update)
/// and wrapped in [`TurnError::NodeFailed`] by the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeError {
    /// The node's update function failed.
    ExecutionFailed {
        /// Human-readable description of the failure.
        reason: String,
    },
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExecutionFailed { reason } => write!(f, "execution failed: {reason}"),
        }
    }
}

impl Error for NodeError {}

/// Errors from committing a turn.
///
/// A failed turn leaves the graph partially updated; continuations
/// accrued before the failure are discarded, queued detachments still
/// run, and the turn serializer is always released.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnError {
    /// A node's update callback returned an error during propagation.
    NodeFailed {
        /// The failing node.
        node: NodeId,
        /// The underlying node error.
        reason: NodeError,
    },
}

impl fmt::Display for TurnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeFailed { node, reason } => {
                write!(f, "node {node} failed during propagation: {reason}")
            }
        }
    }
}

impl Error for TurnError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NodeFailed { reason, .. } => Some(reason),
        }
    }
}

/// Errors from asynchronous transaction submission.
///
/// This is the only graceful failure mode the core needs: the async
/// queue is bounded, and callers must be told when it overflows or
/// when the graph is going away.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnqueueError {
    /// The async transaction queue is at capacity.
    QueueFull,
    /// The graph is shutting down; the worker no longer accepts work.
    ShuttingDown,
}

impl fmt::Display for EnqueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull => write!(f, "async transaction queue full"),
            Self::ShuttingDown => write!(f, "graph is shutting down"),
        }
    }
}

impl Error for EnqueueError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_error_display() {
        let e = NodeError::ExecutionFailed {
            reason: "division by zero".into(),
        };
        assert_eq!(e.to_string(), "execution failed: division by zero");
    }

    #[test]
    fn turn_error_carries_source() {
        let e = TurnError::NodeFailed {
            node: NodeId(3),
            reason: NodeError::ExecutionFailed {
                reason: "boom".into(),
            },
        };
        assert!(e.to_string().contains("node 3"));
        assert!(e.source().is_some());
    }

    #[test]
    fn enqueue_error_display() {
        assert_eq!(
            EnqueueError::QueueFull.to_string(),
            "async transaction queue full"
        );
        assert_eq!(
            EnqueueError::ShuttingDown.to_string(),
            "graph is shutting down"
        );
    }
}
