//! Rill: a functional reactive programming core.
//!
//! Programs declare a directed acyclic dataflow graph of signals and
//! event streams; Rill keeps derived nodes consistent with their
//! inputs under arbitrary external writes. Each batch of writes
//! commits as one *turn* — an atomic, glitch-free propagation cycle —
//! scheduled by one of four pluggable engines.
//!
//! # Quick start
//!
//! ```rust
//! use rill::prelude::*;
//! use std::sync::{Arc, Mutex, RwLock};
//!
//! // A minimal source node over a shared integer slot.
//! struct Counter {
//!     pending: Arc<Mutex<Option<i64>>>,
//!     value: Arc<RwLock<i64>>,
//! }
//! impl ReactiveNode for Counter {
//!     fn update(&mut self, _ctx: &mut UpdateContext) -> Result<UpdateResult, NodeError> {
//!         Ok(UpdateResult::Unchanged)
//!     }
//!     fn apply_input(&mut self) -> bool {
//!         match self.pending.lock().unwrap().take() {
//!             Some(v) => {
//!                 *self.value.write().unwrap() = v;
//!                 true
//!             }
//!             None => false,
//!         }
//!     }
//! }
//!
//! let graph = Graph::with_engine(EngineKind::TopoSortSeq);
//! let pending = Arc::new(Mutex::new(None));
//! let value = Arc::new(RwLock::new(0));
//! let source = graph.add_node(
//!     NodeFlags::INPUT,
//!     Box::new(Counter { pending: Arc::clone(&pending), value: Arc::clone(&value) }),
//! );
//!
//! let slot = Arc::clone(&pending);
//! graph.submit(&source, move || {
//!     *slot.lock().unwrap() = Some(42);
//! }).unwrap();
//! assert_eq!(*value.read().unwrap(), 42);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `rill-core` | Ids, flags, the `ReactiveNode` trait, errors |
//! | [`graph`] | `rill-graph` | Registry, reachability matrix, topology |
//! | [`engine`] | `rill-engine` | Engines, turns, transactions, the `Graph` facade |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types and traits (`rill-core`).
///
/// Node and turn ids, category flags, the [`types::ReactiveNode`]
/// update contract, and the error taxonomy.
pub use rill_core as types;

/// Graph storage (`rill-graph`).
///
/// The node [`graph::Registry`], the [`graph::ReachMatrix`], source
/// id sets, and topology operations.
pub use rill_graph as graph;

/// Propagation machinery (`rill-engine`).
///
/// The four engines, turn serialization with input merging, the
/// transaction manager, and the [`engine::Graph`] facade.
pub use rill_engine as engine;

/// Common imports for typical Rill usage.
///
/// ```rust
/// use rill::prelude::*;
/// ```
pub mod prelude {
    // Core contract
    pub use rill_core::{
        EdgeRequest, EnqueueError, NodeError, NodeFlags, NodeId, ReactiveNode, TurnError,
        TurnFlags, TurnId, UpdateContext, UpdateResult,
    };

    // Facade and engines
    pub use rill_engine::{
        EngineKind, Graph, GraphConfig, NodeHandle, TransactionCtx, TransactionStatus,
        TurnMetrics,
    };
}
