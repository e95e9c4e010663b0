//! Node category flags and per-turn flags.

/// Category flags attached to a node at registration time.
///
/// The core is agnostic to what a node computes; these flags are all it
/// needs to schedule the node correctly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NodeFlags {
    /// The node is externally writable and has no predecessors.
    pub input: bool,
    /// The node is a sink with side effects (an observer). Attaching a
    /// successor to an output node is a programmer error.
    pub output: bool,
    /// The node's `update` may request dynamic attach/detach and may
    /// return [`UpdateResult::Shifted`](crate::UpdateResult::Shifted).
    pub dynamic: bool,
    /// The node owns an event buffer that the core must clear after any
    /// turn in which its `update` (or input admission) reported a change.
    pub buffered: bool,
}

impl NodeFlags {
    /// Flags for an externally written signal source.
    pub const INPUT: Self = Self {
        input: true,
        output: false,
        dynamic: false,
        buffered: false,
    };

    /// Flags for an externally written event source (buffered).
    pub const INPUT_BUFFERED: Self = Self {
        input: true,
        output: false,
        dynamic: false,
        buffered: true,
    };

    /// Flags for a derived signal node.
    pub const DERIVED: Self = Self {
        input: false,
        output: false,
        dynamic: false,
        buffered: false,
    };

    /// Flags for a derived event node (buffered).
    pub const DERIVED_BUFFERED: Self = Self {
        input: false,
        output: false,
        dynamic: false,
        buffered: true,
    };

    /// Flags for a dynamic node (flatten-style re-parenting).
    pub const DYNAMIC: Self = Self {
        input: false,
        output: false,
        dynamic: true,
        buffered: false,
    };

    /// Flags for an observer node.
    pub const OUTPUT: Self = Self {
        input: false,
        output: true,
        dynamic: false,
        buffered: false,
    };
}

/// Per-turn flags set by the transaction that opened the turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TurnFlags {
    /// Allow this transaction to be merged into the turn currently in
    /// its admission window (and allow later transactions to merge into
    /// this one). Continuation turns always run with merging disabled.
    pub merge_inputs: bool,
}

impl TurnFlags {
    /// Flags with input merging enabled.
    pub const MERGEABLE: Self = Self { merge_inputs: true };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_presets() {
        assert!(NodeFlags::INPUT.input);
        assert!(!NodeFlags::INPUT.buffered);
        assert!(NodeFlags::INPUT_BUFFERED.buffered);
        assert!(NodeFlags::OUTPUT.output);
        assert!(NodeFlags::DYNAMIC.dynamic);
        assert_eq!(NodeFlags::default(), NodeFlags::DERIVED);
    }

    #[test]
    fn turn_flags_default_to_no_merging() {
        assert!(!TurnFlags::default().merge_inputs);
        assert!(TurnFlags::MERGEABLE.merge_inputs);
    }
}
