//! The unit of externally submitted change: [`InputWrite`].

use std::fmt;

use crate::id::NodeId;

/// A deferred write to a source node's pending input slot.
///
/// The closure captures whatever it needs to perform the write (the
/// pending slot is owned by the source node and shared with its surface
/// handle), so the core never sees a value. The node id identifies
/// which source to admit once the write has run: the input manager
/// runs every write of a transaction, then calls
/// [`apply_input`](crate::ReactiveNode::apply_input) once per touched
/// source.
pub struct InputWrite {
    /// The source node whose pending slot this write fills.
    pub node: NodeId,
    write: Box<dyn FnOnce() + Send>,
}

impl InputWrite {
    /// Wrap a pending-slot write targeting `node`.
    pub fn new(node: NodeId, write: impl FnOnce() + Send + 'static) -> Self {
        Self {
            node,
            write: Box::new(write),
        }
    }

    /// Run the write, filling the target's pending slot.
    pub fn run(self) {
        (self.write)();
    }
}

impl fmt::Debug for InputWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputWrite")
            .field("node", &self.node)
            .finish_non_exhaustive()
    }
}
