//! Graph storage for the Rill reactive propagation core.
//!
//! Owns everything structural: the node registry with stable dense
//! ids, per-node scheduling metadata, the reachability matrix, source
//! id sets, and the topology operations that keep levels, ancestor
//! rows, and source sets consistent across static and dynamic edge
//! changes.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod cell;
pub mod reach;
pub mod registry;
pub mod sources;
pub mod topology;

pub use cell::{EdgeLists, NodeCell, NodeMeta, NudgeState};
pub use reach::ReachMatrix;
pub use registry::Registry;
pub use sources::SourceIdSet;
