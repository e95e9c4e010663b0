//! Feed a graph from the background worker under bursty load.
//!
//! Mergeable transactions enqueued while the worker is busy collapse
//! into a handful of turns; the metrics at the end show how many turns
//! actually ran and how many transactions were folded together.
//!
//! Run with: `cargo run -p rill-engine --example async_pipeline`

use std::sync::Arc;

use rill_core::TurnFlags;
use rill_engine::{EngineKind, Graph, TransactionStatus};
use rill_test_utils::{fold_events, event_source};

fn main() {
    let graph = Graph::with_engine(EngineKind::PulseCount);

    let samples = event_source::<f64>(&graph);
    let count = fold_events(&graph, &samples.events(), 0u64, |acc, _| acc + 1);
    let total = fold_events(&graph, &samples.events(), 0.0f64, |acc, s| acc + s);

    let status = Arc::new(TransactionStatus::new());
    for i in 0..1000 {
        let source = samples.clone();
        let sample = f64::from(i % 97) * 0.5;
        graph
            .enqueue_transaction(TurnFlags::MERGEABLE, Some(&status), move |ctx| {
                source.emit(ctx, sample);
            })
            .expect("queue overflow");
    }
    status.wait();

    let metrics = graph.metrics();
    println!(
        "ingested {} samples (sum {:.1}) in {} turns; {} transactions merged",
        count.get(),
        total.get(),
        metrics.turns,
        metrics.merged_transactions,
    );
}
