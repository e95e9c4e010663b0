//! Graph configuration and validation.

use std::error::Error;
use std::fmt;

use crate::engine::EngineKind;

/// Configuration for constructing a [`Graph`](crate::Graph).
#[derive(Clone, Debug)]
pub struct GraphConfig {
    /// Which propagation engine drives the graph.
    pub engine: EngineKind,
    /// Capacity of the asynchronous transaction queue. Enqueues beyond
    /// this fail with `EnqueueError::QueueFull`. Default: 1024.
    pub async_queue_capacity: usize,
    /// Registry slot capacity before the first growth. Default: 64.
    pub initial_node_capacity: usize,
    /// Maximum number of consecutive mergeable async transactions the
    /// worker folds into one turn. Default: 100.
    pub async_merge_limit: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            engine: EngineKind::default(),
            async_queue_capacity: 1024,
            initial_node_capacity: 64,
            async_merge_limit: 100,
        }
    }
}

impl GraphConfig {
    /// Check structural invariants at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.async_queue_capacity == 0 {
            return Err(ConfigError::ZeroAsyncQueueCapacity);
        }
        if self.initial_node_capacity == 0 {
            return Err(ConfigError::ZeroNodeCapacity);
        }
        if self.async_merge_limit == 0 {
            return Err(ConfigError::ZeroMergeLimit);
        }
        Ok(())
    }
}

/// Errors from [`GraphConfig::validate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// `async_queue_capacity` must be at least 1.
    ZeroAsyncQueueCapacity,
    /// `initial_node_capacity` must be at least 1.
    ZeroNodeCapacity,
    /// `async_merge_limit` must be at least 1.
    ZeroMergeLimit,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroAsyncQueueCapacity => {
                write!(f, "async_queue_capacity must be at least 1")
            }
            Self::ZeroNodeCapacity => write!(f, "initial_node_capacity must be at least 1"),
            Self::ZeroMergeLimit => write!(f, "async_merge_limit must be at least 1"),
        }
    }
}

impl Error for ConfigError {}
