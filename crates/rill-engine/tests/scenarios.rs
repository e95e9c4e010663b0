//! End-to-end scenarios, replayed against every engine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rill_core::TurnFlags;
use rill_engine::{EngineKind, Graph};
use rill_test_utils::{
    collect_events, event_source, filter_events, fold_events, map2, map_events, merge_events,
    observe_signal, var,
};

const ENGINES: [EngineKind; 5] = [
    EngineKind::TopoSortSeq,
    EngineKind::TopoSortPar,
    EngineKind::PulseCount,
    EngineKind::SourceSet,
    EngineKind::Flooding,
];

fn for_each_engine(test: impl Fn(EngineKind, Graph)) {
    for engine in ENGINES {
        test(engine, Graph::with_engine(engine));
    }
}

// ── Scenario 1: diamond fold ───────────────────────────────────────

#[test]
fn diamond_fold_fires_once_with_final_volume() {
    for_each_engine(|engine, graph| {
        let w = var(&graph, 60i64);
        let h = var(&graph, 70i64);
        let d = var(&graph, 8i64);
        let area = map2(&graph, &w.signal(), &h.signal(), |w, h| w * h);
        let volume = map2(&graph, &area.signal(), &d.signal(), |a, d| a * d);

        let fired = Arc::new(AtomicUsize::new(0));
        let last = Arc::new(Mutex::new(0i64));
        let fired_in = Arc::clone(&fired);
        let last_in = Arc::clone(&last);
        let _obs = observe_signal(&graph, &volume.signal(), move |v| {
            fired_in.fetch_add(1, Ordering::SeqCst);
            *last_in.lock().unwrap() = v;
        });

        let (wc, dc) = (w.clone(), d.clone());
        graph
            .with_transaction(TurnFlags::default(), move |ctx| {
                wc.set(ctx, 90);
                dc.set(ctx, 80);
            })
            .unwrap();

        assert_eq!(volume.get(), 504_000, "engine {engine}");
        assert_eq!(*last.lock().unwrap(), 504_000, "engine {engine}");
        assert_eq!(fired.load(Ordering::SeqCst), 1, "engine {engine}");
    });
}

// ── Scenario 2: sum fold over an event source ──────────────────────

#[test]
fn fold_sums_a_burst_in_one_turn() {
    for_each_engine(|engine, graph| {
        let events = event_source::<i64>(&graph);
        let sum = fold_events(&graph, &events.events(), 0i64, |acc, e| acc + e);

        let fired = Arc::new(AtomicUsize::new(0));
        let fired_in = Arc::clone(&fired);
        let _obs = observe_signal(&graph, &sum.signal(), move |_| {
            fired_in.fetch_add(1, Ordering::SeqCst);
        });

        let source = events.clone();
        graph
            .with_transaction(TurnFlags::default(), move |ctx| {
                for i in 1..=100 {
                    source.emit(ctx, i);
                }
            })
            .unwrap();

        assert_eq!(sum.get(), 5050, "engine {engine}");
        assert_eq!(fired.load(Ordering::SeqCst), 1, "engine {engine}");
    });
}

// ── Scenario 3: incrementer / decrementer ──────────────────────────

#[test]
fn iterate_counts_up_and_down_over_separate_turns() {
    for_each_engine(|engine, graph| {
        let ticks = event_source::<()>(&graph);
        let up = fold_events(&graph, &ticks.events(), 0i64, |acc, _| acc + 1);
        let down = fold_events(&graph, &ticks.events(), 100i64, |acc, _| acc - 1);

        for _ in 0..100 {
            ticks.emit_now(&graph, ()).unwrap();
        }

        assert_eq!(up.get(), 100, "engine {engine}");
        assert_eq!(down.get(), 0, "engine {engine}");
    });
}

// ── Scenario 4: merge preserves source order within a turn ─────────

#[test]
fn merge_orders_events_by_input_position() {
    for_each_engine(|engine, graph| {
        let a1 = event_source::<i64>(&graph);
        let a2 = event_source::<i64>(&graph);
        let a3 = event_source::<i64>(&graph);
        let merged = merge_events(&graph, &[&a1.events(), &a2.events(), &a3.events()]);
        let (_obs, seen) = collect_events(&graph, &merged.events());

        // Push out of order; the merged stream follows input position.
        let (s3, s1, s2) = (a3.clone(), a1.clone(), a2.clone());
        graph
            .with_transaction(TurnFlags::default(), move |ctx| {
                s3.emit(ctx, 30);
                s1.emit(ctx, 10);
                s2.emit(ctx, 20);
            })
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![10, 20, 30], "engine {engine}");
    });
}

// ── Scenario 5: filter + merge across separate turns ───────────────

#[test]
fn filtered_merge_sees_each_turn_in_order() {
    for_each_engine(|engine, graph| {
        let a1 = event_source::<i64>(&graph);
        let a2 = event_source::<i64>(&graph);
        let f1 = filter_events(&graph, &a1.events(), |_| true);
        let f2 = filter_events(&graph, &a2.events(), |_| true);
        let merged = merge_events(&graph, &[&f1.events(), &f2.events()]);
        let (_obs, seen) = collect_events(&graph, &merged.events());

        a1.emit_now(&graph, 10).unwrap();
        a2.emit_now(&graph, 20).unwrap();
        a1.emit_now(&graph, 30).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![10, 20, 30], "engine {engine}");
    });
}

// ── Scenario 6: transform to uppercase ─────────────────────────────

#[test]
fn transform_uppercases_each_emission() {
    for_each_engine(|engine, graph| {
        let s1 = event_source::<String>(&graph);
        let s2 = event_source::<String>(&graph);
        let merged = merge_events(&graph, &[&s1.events(), &s2.events()]);
        let upper = map_events(&graph, &merged.events(), |s: String| s.to_uppercase());
        let (_obs, seen) = collect_events(&graph, &upper.events());

        s1.emit_now(&graph, "Hello Worlt".to_string()).unwrap();
        s2.emit_now(&graph, "Hello World".to_string()).unwrap();
        s1.emit_now(&graph, "Hello Vorld".to_string()).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                "HELLO WORLT".to_string(),
                "HELLO WORLD".to_string(),
                "HELLO VORLD".to_string(),
            ],
            "engine {engine}"
        );
        assert_eq!(seen.len(), 3, "observer invoked exactly three times");
    });
}
