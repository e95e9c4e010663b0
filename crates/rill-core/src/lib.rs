//! Core types and traits for the Rill reactive propagation core.
//!
//! This is the leaf crate with zero internal Rill dependencies. It
//! defines the contract between the propagation core and the layer
//! above it: node and turn identifiers, category flags, the
//! [`ReactiveNode`] update trait with its [`UpdateContext`], the
//! [`InputWrite`] submission unit, and the error taxonomy.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod flags;
pub mod id;
pub mod input;
pub mod node;

// Re-export core types at crate root for convenience.
pub use error::{EnqueueError, NodeError, TurnError};
pub use flags::{NodeFlags, TurnFlags};
pub use id::{Level, NodeId, TurnId, TurnIdSource};
pub use input::InputWrite;
pub use node::{EdgeRequest, ReactiveNode, UpdateContext, UpdateEffects, UpdateResult};
