//! Benchmark profiles for the Rill reactive propagation core.
//!
//! Provides deterministic graph builders shared by the criterion
//! benches and the stress tests:
//!
//! - [`chain_profile`]: a single dependency chain of configurable depth.
//! - [`fanout_profile`]: one source fanning out to N leaves through a
//!   shared join.
//! - [`layered_profile`]: a seeded random layered DAG.

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use rand::{RngExt, SeedableRng};
use rand_chacha::ChaCha8Rng;

use rill_engine::{EngineKind, Graph};
use rill_test_utils::{map2, map_signal, var, SignalHandle, SignalRef, VarHandle};

/// A benchmark graph: the driving input plus the terminal signal.
pub struct Profile {
    /// The graph under test.
    pub graph: Graph,
    /// The input every benchmark iteration writes.
    pub input: VarHandle<i64>,
    /// The signal at the far end of the topology.
    pub terminal: SignalHandle<i64>,
}

/// A single chain `input → +1 → +1 → … ` of the given depth.
pub fn chain_profile(engine: EngineKind, depth: usize) -> Profile {
    let graph = Graph::with_engine(engine);
    let input = var(&graph, 0i64);
    let mut current: SignalRef<i64> = input.signal();
    let mut terminal = map_signal(&graph, &current, |v| v + 1);
    for _ in 1..depth {
        current = terminal.signal();
        terminal = map_signal(&graph, &current, |v| v + 1);
    }
    Profile {
        graph,
        input,
        terminal,
    }
}

/// One source fanning out to `width` unary nodes, all joined pairwise
/// back into a single sum.
pub fn fanout_profile(engine: EngineKind, width: usize) -> Profile {
    let graph = Graph::with_engine(engine);
    let input = var(&graph, 0i64);
    let mut layer: Vec<SignalHandle<i64>> = (0..width.max(2))
        .map(|i| map_signal(&graph, &input.signal(), move |v| v + i as i64))
        .collect();
    while layer.len() > 1 {
        let mut next = Vec::with_capacity(layer.len().div_ceil(2));
        let mut iter = layer.into_iter();
        while let Some(left) = iter.next() {
            match iter.next() {
                Some(right) => {
                    next.push(map2(&graph, &left.signal(), &right.signal(), |a, b| a + b));
                }
                None => next.push(left),
            }
        }
        layer = next;
    }
    let terminal = layer.pop().expect("at least one node");
    Profile {
        graph,
        input,
        terminal,
    }
}

/// A seeded random layered DAG: `layers` layers of `width` nodes, each
/// node reading one or two predecessors from the layer above.
pub fn layered_profile(engine: EngineKind, layers: usize, width: usize, seed: u64) -> Profile {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let graph = Graph::with_engine(engine);
    let input = var(&graph, 0i64);

    let mut previous: Vec<SignalHandle<i64>> = (0..width)
        .map(|i| map_signal(&graph, &input.signal(), move |v| v.wrapping_add(i as i64)))
        .collect();

    for _ in 1..layers.max(1) {
        let current: Vec<SignalHandle<i64>> = (0..width)
            .map(|_| {
                let a = &previous[rng.random_range(0..width)];
                if rng.random_bool(0.5) {
                    let b = &previous[rng.random_range(0..width)];
                    map2(&graph, &a.signal(), &b.signal(), |x, y| {
                        x.wrapping_add(y).wrapping_mul(31)
                    })
                } else {
                    map_signal(&graph, &a.signal(), |x| x.wrapping_mul(17))
                }
            })
            .collect();
        previous = current;
    }

    let mut iter = previous.into_iter();
    let mut terminal = iter.next().expect("width is at least 1");
    for next in iter {
        terminal = map2(&graph, &terminal.signal(), &next.signal(), |a, b| {
            a.wrapping_add(b)
        });
    }

    Profile {
        graph,
        input,
        terminal,
    }
}
