//! Build a small spreadsheet-shaped graph and commit a transaction.
//!
//! ```text
//! width ─┐
//!        ├─ area ─┐
//! height ┘        ├─ volume ── printer
//! depth ──────────┘
//! ```
//!
//! Run with: `cargo run -p rill-engine --example quickstart`

use rill_core::TurnFlags;
use rill_engine::{EngineKind, Graph};
use rill_test_utils::{map2, observe_signal, var};

fn main() {
    let graph = Graph::with_engine(EngineKind::TopoSortSeq);

    let width = var(&graph, 60i64);
    let height = var(&graph, 70i64);
    let depth = var(&graph, 8i64);

    let area = map2(&graph, &width.signal(), &height.signal(), |w, h| w * h);
    let volume = map2(&graph, &area.signal(), &depth.signal(), |a, d| a * d);

    let _printer = observe_signal(&graph, &volume.signal(), |v| {
        println!("volume is now {v}");
    });

    // Two writes, one turn, one observer firing.
    let (w, d) = (width.clone(), depth.clone());
    graph
        .with_transaction(TurnFlags::default(), move |ctx| {
            w.set(ctx, 90);
            d.set(ctx, 80);
        })
        .expect("turn failed");

    println!(
        "settled: area={} volume={} after {} turn(s), {} update(s)",
        area.get(),
        volume.get(),
        graph.metrics().turns,
        graph.metrics().updates,
    );
}
