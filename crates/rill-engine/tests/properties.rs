//! Universal propagation properties, checked for every engine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rill_engine::{EngineKind, Graph};
use rill_test_utils::{
    collect_signal, event_source, fold_events, map2, map_signal, merge_events,
    observe_signal_ctx, var,
};

const ENGINES: [EngineKind; 5] = [
    EngineKind::TopoSortSeq,
    EngineKind::TopoSortPar,
    EngineKind::PulseCount,
    EngineKind::SourceSet,
    EngineKind::Flooding,
];

/// Engines that guarantee at most one update per node per turn (the
/// flooding engine re-runs nodes by design).
const ORDERED_ENGINES: [EngineKind; 4] = [
    EngineKind::TopoSortSeq,
    EngineKind::TopoSortPar,
    EngineKind::PulseCount,
    EngineKind::SourceSet,
];

// ── Glitch freedom ─────────────────────────────────────────────────

#[test]
fn observer_sees_only_consistent_diamond_states() {
    for engine in ENGINES {
        let graph = Graph::with_engine(engine);
        let a = var(&graph, 1i64);
        let b = map_signal(&graph, &a.signal(), |v| v * 2);
        let c = map_signal(&graph, &a.signal(), |v| v * 3);
        let d = map2(&graph, &b.signal(), &c.signal(), |b, c| (b, c));

        let (_obs, seen) = collect_signal(&graph, &d.signal());

        for i in 2..=20 {
            a.set_now(&graph, i).unwrap();
        }

        for (b, c) in seen.lock().unwrap().iter() {
            assert_eq!(b % 2, 0, "engine {engine}");
            assert_eq!(
                b / 2,
                c / 3,
                "engine {engine}: observer saw a torn pair ({b}, {c})"
            );
        }
        assert_eq!(seen.lock().unwrap().len(), 19, "engine {engine}");
    }
}

#[test]
fn ordered_engines_never_tick_a_join_with_torn_inputs() {
    // Stricter than the observer check: every single update of the
    // join node must see end-of-turn values for both arms.
    for engine in ORDERED_ENGINES {
        let graph = Graph::with_engine(engine);
        let a = var(&graph, 1i64);
        let b = map_signal(&graph, &a.signal(), |v| v * 2);
        let c = map_signal(&graph, &a.signal(), |v| v * 3);

        let torn = Arc::new(AtomicUsize::new(0));
        let torn_in = Arc::clone(&torn);
        let _d = map2(&graph, &b.signal(), &c.signal(), move |b, c| {
            if b / 2 != c / 3 {
                torn_in.fetch_add(1, Ordering::SeqCst);
            }
            b + c
        });

        for i in 2..=50 {
            a.set_now(&graph, i).unwrap();
        }
        assert_eq!(torn.load(Ordering::SeqCst), 0, "engine {engine}");
    }
}

// ── At-most-once update per turn ───────────────────────────────────

#[test]
fn each_node_updates_at_most_once_per_turn() {
    for engine in ORDERED_ENGINES {
        let graph = Graph::with_engine(engine);
        let a = var(&graph, 0i64);
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_in = Arc::clone(&hits);
        let b = map_signal(&graph, &a.signal(), move |v| {
            hits_in.fetch_add(1, Ordering::SeqCst);
            v + 1
        });
        // Fan the source out and back in so the counting node's
        // successors have multiple paths to it.
        let c = map_signal(&graph, &a.signal(), |v| v * 7);
        let _join = map2(&graph, &b.signal(), &c.signal(), |x, y| x + y);

        for i in 1..=25 {
            a.set_now(&graph, i).unwrap();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 25, "engine {engine}");
    }
}

// ── Buffer clearing ────────────────────────────────────────────────

#[test]
fn event_buffers_are_empty_between_turns() {
    for engine in ENGINES {
        let graph = Graph::with_engine(engine);
        let src = event_source::<i64>(&graph);
        let merged = merge_events(&graph, &[&src.events()]);
        let sum = fold_events(&graph, &merged.events(), 0i64, |acc, e| acc + e);

        src.emit_now(&graph, 4).unwrap();
        assert!(
            src.events().take_snapshot().is_empty(),
            "engine {engine}: source buffer must be cleared"
        );
        assert!(
            merged.events().take_snapshot().is_empty(),
            "engine {engine}: derived buffer must be cleared"
        );

        // A second turn must not see stale events.
        src.emit_now(&graph, 5).unwrap();
        assert_eq!(sum.get(), 9, "engine {engine}");
    }
}

// ── Continuation termination ───────────────────────────────────────

#[test]
fn continuation_loop_drains_a_countdown() {
    for engine in ENGINES {
        let graph = Graph::with_engine(engine);
        let n = var(&graph, 0i64);

        // Observer that decrements the source until it reaches zero;
        // each decrement is a continuation turn.
        let n_in = n.clone();
        let _obs = observe_signal_ctx(&graph, &n.signal(), move |v, ctx| {
            if v > 0 {
                n_in.set_later(ctx, v - 1);
            }
        });

        n.set_now(&graph, 10).unwrap();
        assert_eq!(n.get(), 0, "engine {engine}");
        let m = graph.metrics();
        assert_eq!(m.continuation_turns, 10, "engine {engine}");
    }
}

// ── Observer self-detachment ───────────────────────────────────────

#[test]
fn observer_can_detach_itself_during_its_callback() {
    for engine in ENGINES {
        let graph = Graph::with_engine(engine);
        let a = var(&graph, 0i64);
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_in = Arc::clone(&fired);
        let obs = observe_signal_ctx(&graph, &a.signal(), move |_, ctx| {
            fired_in.fetch_add(1, Ordering::SeqCst);
            ctx.queue_detach(ctx.node());
        });
        let before = graph.node_count();

        a.set_now(&graph, 1).unwrap();
        a.set_now(&graph, 2).unwrap();
        a.set_now(&graph, 3).unwrap();

        assert_eq!(fired.load(Ordering::SeqCst), 1, "engine {engine}");
        assert_eq!(graph.node_count(), before - 1, "engine {engine}");
        drop(obs); // stale handle drop is a no-op
        a.set_now(&graph, 4).unwrap();
    }
}

// ── Error recovery ─────────────────────────────────────────────────

#[test]
fn a_failing_node_does_not_stall_the_scheduler() {
    use rill_core::{NodeError, NodeFlags, ReactiveNode, UpdateContext, UpdateResult};

    struct FailOnce {
        failed: bool,
    }
    impl ReactiveNode for FailOnce {
        fn update(&mut self, _ctx: &mut UpdateContext) -> Result<UpdateResult, NodeError> {
            if self.failed {
                Ok(UpdateResult::Unchanged)
            } else {
                self.failed = true;
                Err(NodeError::ExecutionFailed {
                    reason: "first tick fails".into(),
                })
            }
        }
    }

    for engine in ENGINES {
        let graph = Graph::with_engine(engine);
        let a = var(&graph, 0i64);
        let bad = graph.add_node(NodeFlags::DERIVED, Box::new(FailOnce { failed: false }));
        graph.attach(&bad, a.node());

        assert!(a.set_now(&graph, 1).is_err(), "engine {engine}");
        assert_eq!(graph.metrics().failed_turns, 1, "engine {engine}");

        // The queue was released; the next turn commits normally.
        a.set_now(&graph, 2).unwrap();
        assert_eq!(a.get(), 2, "engine {engine}");
        graph.assert_invariants();
    }
}

// ── Metrics visibility ─────────────────────────────────────────────

#[test]
fn metrics_track_turns_and_pulses() {
    let graph = Graph::with_engine(EngineKind::TopoSortSeq);
    let a = var(&graph, 0i64);
    let _b = map_signal(&graph, &a.signal(), |v| v + 1);

    a.set_now(&graph, 1).unwrap();
    a.set_now(&graph, 2).unwrap();

    let m = graph.metrics();
    assert_eq!(m.turns, 2);
    assert_eq!(m.updates, 2);
    assert_eq!(m.pulses, 2);
    assert_eq!(m.failed_turns, 0);
}
