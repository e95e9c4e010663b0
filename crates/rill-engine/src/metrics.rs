//! Per-turn and cumulative propagation metrics.
//!
//! [`TurnMetrics`] is the graph's observability surface: cumulative
//! counters folded in after every turn, plus the duration of the most
//! recent one. Engines count into a [`TurnCounters`] block on the turn
//! while propagating; the input manager folds it in afterwards.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters engines increment while a turn propagates.
#[derive(Debug, Default)]
pub struct TurnCounters {
    /// Node update calls executed.
    pub updates: AtomicU64,
    /// Updates that reported a change.
    pub pulses: AtomicU64,
    /// Updates that ticked without a change.
    pub idle_pulses: AtomicU64,
    /// Re-schedules caused by level shifts or dynamic re-parenting.
    pub shifts: AtomicU64,
    /// Level batches drained (topological engines only).
    pub level_batches: AtomicU64,
}

/// Cumulative propagation metrics for one graph.
///
/// All counters are totals since the graph was created; `last_turn_us`
/// covers only the most recent committed turn.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TurnMetrics {
    /// Turns committed, continuation turns included.
    pub turns: u64,
    /// Node update calls executed.
    pub updates: u64,
    /// Updates that reported a change.
    pub pulses: u64,
    /// Updates that ticked without a change.
    pub idle_pulses: u64,
    /// Re-schedules caused by level shifts or dynamic re-parenting.
    pub shifts: u64,
    /// Level batches drained (topological engines only).
    pub level_batches: u64,
    /// Transactions merged into another turn's admission window.
    pub merged_transactions: u64,
    /// Turns started from a continuation buffer.
    pub continuation_turns: u64,
    /// Turns that ended in a node failure.
    pub failed_turns: u64,
    /// Wall-clock duration of the most recent turn, in microseconds.
    pub last_turn_us: u64,
}

impl TurnMetrics {
    /// Fold one turn's counters into the cumulative totals.
    pub fn absorb(&mut self, counters: &TurnCounters, elapsed_us: u64) {
        self.turns += 1;
        self.updates += counters.updates.load(Ordering::Relaxed);
        self.pulses += counters.pulses.load(Ordering::Relaxed);
        self.idle_pulses += counters.idle_pulses.load(Ordering::Relaxed);
        self.shifts += counters.shifts.load(Ordering::Relaxed);
        self.level_batches += counters.level_batches.load(Ordering::Relaxed);
        self.last_turn_us = elapsed_us;
    }
}
