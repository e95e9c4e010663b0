//! Propagation engines and the turn machinery for Rill.
//!
//! Everything that happens between an external write and a settled
//! graph lives here: the [`Turn`] object, the four propagation
//! engines, the serializer that gives turns a linear commit order,
//! the input manager with its continuation loop and async worker, and
//! the [`Graph`] facade.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod engine;
pub mod flooding;
pub mod graph;
pub mod input;
pub mod metrics;
pub mod pulse_count;
pub mod queue;
pub mod source_set;
pub mod topo_queue;
pub mod toposort;
pub mod turn;

pub use config::{ConfigError, GraphConfig};
pub use engine::{make_engine, EngineKind, PropagationEngine};
pub use flooding::FloodingEngine;
pub use graph::{Graph, NodeHandle};
pub use input::{TransactionCtx, TransactionStatus};
pub use metrics::TurnMetrics;
pub use pulse_count::PulseCountEngine;
pub use queue::TransactionBody;
pub use source_set::SourceSetEngine;
pub use topo_queue::TopoQueue;
pub use toposort::{ParTopoSortEngine, SeqTopoSortEngine};
pub use turn::Turn;
