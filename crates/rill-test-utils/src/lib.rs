//! Reactive node fixtures for Rill development and testing.
//!
//! A minimal combinator layer over the propagation core: variable
//! signals, event sources, derived map/fold nodes, event
//! merge/filter/transform, flatten, and observers. Values live in
//! cells shared between the registered node and its handle; the core
//! itself never sees them.

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

pub use fixtures::{
    collect_events, collect_signal, event_source, filter_events, flatten, fold_events, map2,
    map_events, map_signal, merge_events, observe_events, observe_signal, observe_signal_ctx,
    var, EventSourceHandle, EventsHandle, EventsRef, SignalHandle, SignalRef, VarHandle,
};
