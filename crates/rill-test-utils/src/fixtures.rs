//! Reactive node fixtures built on the core's public operations.
//!
//! Each fixture registers a node whose value cells are shared with the
//! handle returned to the test. Derived nodes hold [`SignalRef`]s /
//! [`EventsRef`]s to their inputs; the refs carry the input's
//! `NodeHandle`, so a derived node keeps its inputs registered for as
//! long as it lives and handle drops cascade bottom-up.

use std::sync::{Arc, Mutex, RwLock};

use rill_core::{NodeError, NodeFlags, ReactiveNode, UpdateContext, UpdateResult};
use rill_engine::{Graph, NodeHandle, TransactionCtx};

// ── References ─────────────────────────────────────────────────────

/// A readable reference to a signal node: its value cell plus the
/// handle keeping the node alive.
pub struct SignalRef<T> {
    value: Arc<RwLock<T>>,
    node: NodeHandle,
}

impl<T> Clone for SignalRef<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            node: self.node.clone(),
        }
    }
}

impl<T> PartialEq for SignalRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.node.id() == other.node.id()
    }
}

impl<T> std::fmt::Debug for SignalRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalRef").field("node", &self.node.id()).finish()
    }
}

impl<T: Clone> SignalRef<T> {
    /// Current value of the referenced signal.
    pub fn get(&self) -> T {
        self.value.read().expect("value cell poisoned").clone()
    }

    /// The referenced node.
    pub fn node(&self) -> &NodeHandle {
        &self.node
    }
}

/// A readable reference to an event-stream node: this turn's buffer
/// plus the handle keeping the node alive.
pub struct EventsRef<E> {
    buffer: Arc<RwLock<Vec<E>>>,
    node: NodeHandle,
}

impl<E> Clone for EventsRef<E> {
    fn clone(&self) -> Self {
        Self {
            buffer: Arc::clone(&self.buffer),
            node: self.node.clone(),
        }
    }
}

impl<E: Clone> EventsRef<E> {
    /// Snapshot of the events buffered this turn.
    pub fn take_snapshot(&self) -> Vec<E> {
        self.buffer.read().expect("event buffer poisoned").clone()
    }

    /// The referenced node.
    pub fn node(&self) -> &NodeHandle {
        &self.node
    }
}

// ── Variable signals ───────────────────────────────────────────────

enum VarOp<T> {
    Set(T),
    Modify(Box<dyn FnOnce(&mut T) + Send>),
}

struct VarNode<T> {
    pending: Arc<Mutex<Vec<VarOp<T>>>>,
    value: Arc<RwLock<T>>,
}

impl<T: Clone + PartialEq + Send + Sync + 'static> ReactiveNode for VarNode<T> {
    fn update(&mut self, _ctx: &mut UpdateContext) -> Result<UpdateResult, NodeError> {
        Ok(UpdateResult::Unchanged)
    }

    fn apply_input(&mut self) -> bool {
        let ops = std::mem::take(&mut *self.pending.lock().expect("pending slot poisoned"));
        if ops.is_empty() {
            return false;
        }
        let mut value = self.value.write().expect("value cell poisoned");
        let mut next = value.clone();
        for op in ops {
            match op {
                VarOp::Set(v) => next = v,
                VarOp::Modify(f) => f(&mut next),
            }
        }
        if next != *value {
            *value = next;
            true
        } else {
            false
        }
    }
}

/// Handle to an externally writable signal.
///
/// Clones share the same node; transaction bodies typically capture a
/// clone.
pub struct VarHandle<T> {
    node: NodeHandle,
    pending: Arc<Mutex<Vec<VarOp<T>>>>,
    value: Arc<RwLock<T>>,
}

impl<T> Clone for VarHandle<T> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
            pending: Arc::clone(&self.pending),
            value: Arc::clone(&self.value),
        }
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> VarHandle<T> {
    /// Submit a replacement value within a transaction.
    pub fn set(&self, ctx: &mut TransactionCtx, v: T) {
        let pending = Arc::clone(&self.pending);
        ctx.submit(self.node.id(), move || {
            pending
                .lock()
                .expect("pending slot poisoned")
                .push(VarOp::Set(v));
        });
    }

    /// Submit an in-place modification within a transaction.
    pub fn modify(&self, ctx: &mut TransactionCtx, f: impl FnOnce(&mut T) + Send + 'static) {
        let pending = Arc::clone(&self.pending);
        ctx.submit(self.node.id(), move || {
            pending
                .lock()
                .expect("pending slot poisoned")
                .push(VarOp::Modify(Box::new(f)));
        });
    }

    /// Submit a replacement value from inside an update callback. The
    /// write lands in the turn's continuation buffer and becomes part
    /// of the following turn.
    pub fn set_later(&self, ctx: &mut UpdateContext, v: T) {
        let pending = Arc::clone(&self.pending);
        ctx.submit(self.node.id(), move || {
            pending
                .lock()
                .expect("pending slot poisoned")
                .push(VarOp::Set(v));
        });
    }

    /// Set the value as a complete single-input turn.
    pub fn set_now(&self, graph: &Graph, v: T) -> Result<(), rill_core::TurnError> {
        let pending = Arc::clone(&self.pending);
        graph.submit(&self.node, move || {
            pending
                .lock()
                .expect("pending slot poisoned")
                .push(VarOp::Set(v));
        })
    }

    /// Current value.
    pub fn get(&self) -> T {
        self.value.read().expect("value cell poisoned").clone()
    }

    /// Reference for building derived nodes.
    pub fn signal(&self) -> SignalRef<T> {
        SignalRef {
            value: Arc::clone(&self.value),
            node: self.node.clone(),
        }
    }

    /// The underlying node.
    pub fn node(&self) -> &NodeHandle {
        &self.node
    }
}

/// Create an externally writable signal with an initial value.
pub fn var<T: Clone + PartialEq + Send + Sync + 'static>(graph: &Graph, initial: T) -> VarHandle<T> {
    let pending = Arc::new(Mutex::new(Vec::new()));
    let value = Arc::new(RwLock::new(initial));
    let node = graph.add_node(
        NodeFlags::INPUT,
        Box::new(VarNode {
            pending: Arc::clone(&pending),
            value: Arc::clone(&value),
        }),
    );
    VarHandle {
        node,
        pending,
        value,
    }
}

// ── Event sources ──────────────────────────────────────────────────

struct EventSourceNode<E> {
    pending: Arc<Mutex<Vec<E>>>,
    buffer: Arc<RwLock<Vec<E>>>,
}

impl<E: Clone + Send + Sync + 'static> ReactiveNode for EventSourceNode<E> {
    fn update(&mut self, _ctx: &mut UpdateContext) -> Result<UpdateResult, NodeError> {
        Ok(UpdateResult::Unchanged)
    }

    fn apply_input(&mut self) -> bool {
        let mut pending = self.pending.lock().expect("pending slot poisoned");
        if pending.is_empty() {
            return false;
        }
        self.buffer
            .write()
            .expect("event buffer poisoned")
            .append(&mut pending);
        true
    }

    fn clear_buffer(&mut self) {
        self.buffer.write().expect("event buffer poisoned").clear();
    }
}

/// Handle to an externally writable event stream.
///
/// Clones share the same node; transaction bodies typically capture a
/// clone.
pub struct EventSourceHandle<E> {
    node: NodeHandle,
    pending: Arc<Mutex<Vec<E>>>,
    buffer: Arc<RwLock<Vec<E>>>,
}

impl<E> Clone for EventSourceHandle<E> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
            pending: Arc::clone(&self.pending),
            buffer: Arc::clone(&self.buffer),
        }
    }
}

impl<E: Clone + Send + Sync + 'static> EventSourceHandle<E> {
    /// Emit one event within a transaction.
    pub fn emit(&self, ctx: &mut TransactionCtx, event: E) {
        let pending = Arc::clone(&self.pending);
        ctx.submit(self.node.id(), move || {
            pending.lock().expect("pending slot poisoned").push(event);
        });
    }

    /// Emit one event as a complete single-input turn.
    pub fn emit_now(&self, graph: &Graph, event: E) -> Result<(), rill_core::TurnError> {
        let pending = Arc::clone(&self.pending);
        graph.submit(&self.node, move || {
            pending.lock().expect("pending slot poisoned").push(event);
        })
    }

    /// Reference for building derived nodes.
    pub fn events(&self) -> EventsRef<E> {
        EventsRef {
            buffer: Arc::clone(&self.buffer),
            node: self.node.clone(),
        }
    }

    /// The underlying node.
    pub fn node(&self) -> &NodeHandle {
        &self.node
    }
}

/// Create an externally writable event stream.
pub fn event_source<E: Clone + Send + Sync + 'static>(graph: &Graph) -> EventSourceHandle<E> {
    let pending = Arc::new(Mutex::new(Vec::new()));
    let buffer = Arc::new(RwLock::new(Vec::new()));
    let node = graph.add_node(
        NodeFlags::INPUT_BUFFERED,
        Box::new(EventSourceNode {
            pending: Arc::clone(&pending),
            buffer: Arc::clone(&buffer),
        }),
    );
    EventSourceHandle {
        node,
        pending,
        buffer,
    }
}

// ── Derived signals ────────────────────────────────────────────────

/// Handle to a derived signal.
pub struct SignalHandle<T> {
    node: NodeHandle,
    value: Arc<RwLock<T>>,
}

impl<T> Clone for SignalHandle<T> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
            value: Arc::clone(&self.value),
        }
    }
}

impl<T: Clone> SignalHandle<T> {
    /// Current value.
    pub fn get(&self) -> T {
        self.value.read().expect("value cell poisoned").clone()
    }

    /// Reference for building further derived nodes.
    pub fn signal(&self) -> SignalRef<T> {
        SignalRef {
            value: Arc::clone(&self.value),
            node: self.node.clone(),
        }
    }

    /// The underlying node.
    pub fn node(&self) -> &NodeHandle {
        &self.node
    }
}

struct MapNode<A, B, F> {
    input: SignalRef<A>,
    out: Arc<RwLock<B>>,
    f: F,
}

impl<A, B, F> ReactiveNode for MapNode<A, B, F>
where
    A: Clone + Send + Sync + 'static,
    B: Clone + PartialEq + Send + Sync + 'static,
    F: FnMut(A) -> B + Send + 'static,
{
    fn update(&mut self, _ctx: &mut UpdateContext) -> Result<UpdateResult, NodeError> {
        let next = (self.f)(self.input.get());
        let mut out = self.out.write().expect("value cell poisoned");
        if next != *out {
            *out = next;
            Ok(UpdateResult::Changed)
        } else {
            Ok(UpdateResult::Unchanged)
        }
    }
}

/// Derive a signal by applying `f` to one input signal.
pub fn map_signal<A, B, F>(graph: &Graph, input: &SignalRef<A>, mut f: F) -> SignalHandle<B>
where
    A: Clone + Send + Sync + 'static,
    B: Clone + PartialEq + Send + Sync + 'static,
    F: FnMut(A) -> B + Send + 'static,
{
    let out = Arc::new(RwLock::new(f(input.get())));
    let node = graph.add_node(
        NodeFlags::DERIVED,
        Box::new(MapNode {
            input: input.clone(),
            out: Arc::clone(&out),
            f,
        }),
    );
    graph.attach(&node, input.node());
    SignalHandle { node, value: out }
}

struct Map2Node<A, B, C, F> {
    left: SignalRef<A>,
    right: SignalRef<B>,
    out: Arc<RwLock<C>>,
    f: F,
}

impl<A, B, C, F> ReactiveNode for Map2Node<A, B, C, F>
where
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
    C: Clone + PartialEq + Send + Sync + 'static,
    F: FnMut(A, B) -> C + Send + 'static,
{
    fn update(&mut self, _ctx: &mut UpdateContext) -> Result<UpdateResult, NodeError> {
        let next = (self.f)(self.left.get(), self.right.get());
        let mut out = self.out.write().expect("value cell poisoned");
        if next != *out {
            *out = next;
            Ok(UpdateResult::Changed)
        } else {
            Ok(UpdateResult::Unchanged)
        }
    }
}

/// Derive a signal from two input signals.
pub fn map2<A, B, C, F>(
    graph: &Graph,
    left: &SignalRef<A>,
    right: &SignalRef<B>,
    mut f: F,
) -> SignalHandle<C>
where
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
    C: Clone + PartialEq + Send + Sync + 'static,
    F: FnMut(A, B) -> C + Send + 'static,
{
    let out = Arc::new(RwLock::new(f(left.get(), right.get())));
    let node = graph.add_node(
        NodeFlags::DERIVED,
        Box::new(Map2Node {
            left: left.clone(),
            right: right.clone(),
            out: Arc::clone(&out),
            f,
        }),
    );
    graph.attach(&node, left.node());
    graph.attach(&node, right.node());
    SignalHandle { node, value: out }
}

struct FoldNode<E, T, F> {
    events: EventsRef<E>,
    acc: Arc<RwLock<T>>,
    f: F,
}

impl<E, T, F> ReactiveNode for FoldNode<E, T, F>
where
    E: Clone + Send + Sync + 'static,
    T: Clone + PartialEq + Send + Sync + 'static,
    F: FnMut(T, &E) -> T + Send + 'static,
{
    fn update(&mut self, _ctx: &mut UpdateContext) -> Result<UpdateResult, NodeError> {
        let events = self.events.take_snapshot();
        if events.is_empty() {
            return Ok(UpdateResult::Unchanged);
        }
        let mut acc = self.acc.write().expect("value cell poisoned");
        let mut next = acc.clone();
        for event in &events {
            next = (self.f)(next, event);
        }
        if next != *acc {
            *acc = next;
            Ok(UpdateResult::Changed)
        } else {
            Ok(UpdateResult::Unchanged)
        }
    }
}

/// Fold an event stream into a signal.
pub fn fold_events<E, T, F>(
    graph: &Graph,
    events: &EventsRef<E>,
    initial: T,
    f: F,
) -> SignalHandle<T>
where
    E: Clone + Send + Sync + 'static,
    T: Clone + PartialEq + Send + Sync + 'static,
    F: FnMut(T, &E) -> T + Send + 'static,
{
    let acc = Arc::new(RwLock::new(initial));
    let node = graph.add_node(
        NodeFlags::DERIVED,
        Box::new(FoldNode {
            events: events.clone(),
            acc: Arc::clone(&acc),
            f,
        }),
    );
    graph.attach(&node, events.node());
    SignalHandle { node, value: acc }
}

// ── Derived event streams ──────────────────────────────────────────

/// Handle to a derived event stream.
pub struct EventsHandle<E> {
    node: NodeHandle,
    buffer: Arc<RwLock<Vec<E>>>,
}

impl<E> Clone for EventsHandle<E> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
            buffer: Arc::clone(&self.buffer),
        }
    }
}

impl<E: Clone> EventsHandle<E> {
    /// Reference for building further derived nodes.
    pub fn events(&self) -> EventsRef<E> {
        EventsRef {
            buffer: Arc::clone(&self.buffer),
            node: self.node.clone(),
        }
    }

    /// The underlying node.
    pub fn node(&self) -> &NodeHandle {
        &self.node
    }
}

struct MergeNode<E> {
    inputs: Vec<EventsRef<E>>,
    out: Arc<RwLock<Vec<E>>>,
}

impl<E: Clone + Send + Sync + 'static> ReactiveNode for MergeNode<E> {
    fn update(&mut self, _ctx: &mut UpdateContext) -> Result<UpdateResult, NodeError> {
        let mut emitted = false;
        let mut out = self.out.write().expect("event buffer poisoned");
        out.clear();
        for input in &self.inputs {
            let events = input.take_snapshot();
            if !events.is_empty() {
                out.extend(events);
                emitted = true;
            }
        }
        if emitted {
            Ok(UpdateResult::Changed)
        } else {
            Ok(UpdateResult::Unchanged)
        }
    }

    fn clear_buffer(&mut self) {
        self.out.write().expect("event buffer poisoned").clear();
    }
}

/// Merge event streams; within a turn the output carries the inputs'
/// events in argument order.
pub fn merge_events<E: Clone + Send + Sync + 'static>(
    graph: &Graph,
    inputs: &[&EventsRef<E>],
) -> EventsHandle<E> {
    let out = Arc::new(RwLock::new(Vec::new()));
    let node = graph.add_node(
        NodeFlags::DERIVED_BUFFERED,
        Box::new(MergeNode {
            inputs: inputs.iter().map(|&r| r.clone()).collect(),
            out: Arc::clone(&out),
        }),
    );
    for input in inputs {
        graph.attach(&node, input.node());
    }
    EventsHandle { node, buffer: out }
}

struct FilterNode<E, P> {
    input: EventsRef<E>,
    out: Arc<RwLock<Vec<E>>>,
    predicate: P,
}

impl<E, P> ReactiveNode for FilterNode<E, P>
where
    E: Clone + Send + Sync + 'static,
    P: FnMut(&E) -> bool + Send + 'static,
{
    fn update(&mut self, _ctx: &mut UpdateContext) -> Result<UpdateResult, NodeError> {
        let mut out = self.out.write().expect("event buffer poisoned");
        out.clear();
        for event in self.input.take_snapshot() {
            if (self.predicate)(&event) {
                out.push(event);
            }
        }
        if out.is_empty() {
            Ok(UpdateResult::Unchanged)
        } else {
            Ok(UpdateResult::Changed)
        }
    }

    fn clear_buffer(&mut self) {
        self.out.write().expect("event buffer poisoned").clear();
    }
}

/// Keep only the events matching `predicate`.
pub fn filter_events<E, P>(graph: &Graph, input: &EventsRef<E>, predicate: P) -> EventsHandle<E>
where
    E: Clone + Send + Sync + 'static,
    P: FnMut(&E) -> bool + Send + 'static,
{
    let out = Arc::new(RwLock::new(Vec::new()));
    let node = graph.add_node(
        NodeFlags::DERIVED_BUFFERED,
        Box::new(FilterNode {
            input: input.clone(),
            out: Arc::clone(&out),
            predicate,
        }),
    );
    graph.attach(&node, input.node());
    EventsHandle { node, buffer: out }
}

struct TransformNode<A, B, F> {
    input: EventsRef<A>,
    out: Arc<RwLock<Vec<B>>>,
    f: F,
}

impl<A, B, F> ReactiveNode for TransformNode<A, B, F>
where
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
    F: FnMut(A) -> B + Send + 'static,
{
    fn update(&mut self, _ctx: &mut UpdateContext) -> Result<UpdateResult, NodeError> {
        let events = self.input.take_snapshot();
        let mut out = self.out.write().expect("event buffer poisoned");
        out.clear();
        if events.is_empty() {
            return Ok(UpdateResult::Unchanged);
        }
        out.extend(events.into_iter().map(&mut self.f));
        Ok(UpdateResult::Changed)
    }

    fn clear_buffer(&mut self) {
        self.out.write().expect("event buffer poisoned").clear();
    }
}

/// Map every event through `f`.
pub fn map_events<A, B, F>(graph: &Graph, input: &EventsRef<A>, f: F) -> EventsHandle<B>
where
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
    F: FnMut(A) -> B + Send + 'static,
{
    let out = Arc::new(RwLock::new(Vec::new()));
    let node = graph.add_node(
        NodeFlags::DERIVED_BUFFERED,
        Box::new(TransformNode {
            input: input.clone(),
            out: Arc::clone(&out),
            f,
        }),
    );
    graph.attach(&node, input.node());
    EventsHandle { node, buffer: out }
}

// ── Flatten ────────────────────────────────────────────────────────

struct FlattenNode<T> {
    outer: SignalRef<SignalRef<T>>,
    inner: SignalRef<T>,
    out: Arc<RwLock<T>>,
}

impl<T: Clone + PartialEq + Send + Sync + 'static> ReactiveNode for FlattenNode<T> {
    fn update(&mut self, ctx: &mut UpdateContext) -> Result<UpdateResult, NodeError> {
        let target = self.outer.get();
        if target != self.inner {
            ctx.dynamic_detach(self.inner.node().id());
            ctx.dynamic_attach(target.node().id());
            self.inner = target;
            return Ok(UpdateResult::Shifted);
        }
        let next = self.inner.get();
        let mut out = self.out.write().expect("value cell poisoned");
        if next != *out {
            *out = next;
            Ok(UpdateResult::Changed)
        } else {
            Ok(UpdateResult::Unchanged)
        }
    }
}

/// Flatten a signal of signals: the result tracks whichever inner
/// signal the outer one currently holds, re-parenting itself when the
/// outer switches.
pub fn flatten<T: Clone + PartialEq + Send + Sync + 'static>(
    graph: &Graph,
    outer: &SignalRef<SignalRef<T>>,
) -> SignalHandle<T> {
    let inner = outer.get();
    let out = Arc::new(RwLock::new(inner.get()));
    let node = graph.add_node(
        NodeFlags::DYNAMIC,
        Box::new(FlattenNode {
            outer: outer.clone(),
            inner: inner.clone(),
            out: Arc::clone(&out),
        }),
    );
    graph.attach(&node, outer.node());
    graph.attach(&node, inner.node());
    SignalHandle { node, value: out }
}

// ── Observers ──────────────────────────────────────────────────────

struct SignalObserver<T, F> {
    input: SignalRef<T>,
    callback: F,
}

impl<T, F> ReactiveNode for SignalObserver<T, F>
where
    T: Clone + Send + Sync + 'static,
    F: FnMut(T, &mut UpdateContext) + Send + 'static,
{
    fn update(&mut self, ctx: &mut UpdateContext) -> Result<UpdateResult, NodeError> {
        (self.callback)(self.input.get(), ctx);
        Ok(UpdateResult::Unchanged)
    }
}

/// Observe a signal, receiving the settled value each turn it changes.
pub fn observe_signal<T, F>(graph: &Graph, input: &SignalRef<T>, mut callback: F) -> NodeHandle
where
    T: Clone + Send + Sync + 'static,
    F: FnMut(T) + Send + 'static,
{
    observe_signal_ctx(graph, input, move |v, _ctx| callback(v))
}

/// Observe a signal with access to the update context, for callbacks
/// that emit continuations or detach themselves.
pub fn observe_signal_ctx<T, F>(graph: &Graph, input: &SignalRef<T>, callback: F) -> NodeHandle
where
    T: Clone + Send + Sync + 'static,
    F: FnMut(T, &mut UpdateContext) + Send + 'static,
{
    let node = graph.add_node(
        NodeFlags::OUTPUT,
        Box::new(SignalObserver {
            input: input.clone(),
            callback,
        }),
    );
    graph.attach(&node, input.node());
    node
}

/// Observe a signal into a shared vector of observed values.
pub fn collect_signal<T>(
    graph: &Graph,
    input: &SignalRef<T>,
) -> (NodeHandle, Arc<Mutex<Vec<T>>>)
where
    T: Clone + Send + Sync + 'static,
{
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let node = observe_signal(graph, input, move |v| {
        sink.lock().expect("observer sink poisoned").push(v);
    });
    (node, seen)
}

struct EventsObserver<E, F> {
    input: EventsRef<E>,
    callback: F,
}

impl<E, F> ReactiveNode for EventsObserver<E, F>
where
    E: Clone + Send + Sync + 'static,
    F: FnMut(E, &mut UpdateContext) + Send + 'static,
{
    fn update(&mut self, ctx: &mut UpdateContext) -> Result<UpdateResult, NodeError> {
        for event in self.input.take_snapshot() {
            (self.callback)(event, ctx);
        }
        Ok(UpdateResult::Unchanged)
    }
}

/// Observe an event stream, receiving each event of the turn in order.
pub fn observe_events<E, F>(graph: &Graph, input: &EventsRef<E>, mut callback: F) -> NodeHandle
where
    E: Clone + Send + Sync + 'static,
    F: FnMut(E) + Send + 'static,
{
    let node = graph.add_node(
        NodeFlags::OUTPUT,
        Box::new(EventsObserver {
            input: input.clone(),
            callback: move |e, _ctx: &mut UpdateContext| callback(e),
        }),
    );
    graph.attach(&node, input.node());
    node
}

/// Observe an event stream into a shared vector of events.
pub fn collect_events<E>(
    graph: &Graph,
    input: &EventsRef<E>,
) -> (NodeHandle, Arc<Mutex<Vec<E>>>)
where
    E: Clone + Send + Sync + 'static,
{
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let node = observe_events(graph, input, move |e| {
        sink.lock().expect("observer sink poisoned").push(e);
    });
    (node, seen)
}
