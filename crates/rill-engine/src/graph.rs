//! The graph facade: one value owning all reactive state.
//!
//! A [`Graph`] bundles the registry, the chosen propagation engine,
//! the turn serializer, and the asynchronous transaction worker. There
//! are no process-wide singletons; a program may hold any number of
//! independent graphs.
//!
//! Nodes are owned by the registry. A [`NodeHandle`] is the
//! reference-counted facade the layer above holds: it carries only the
//! node id and weak back-references, so handles can never form
//! ownership cycles through the graph. When the last handle for a node
//! drops, the node's edges are detached and its slot freed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use rill_core::{EnqueueError, NodeFlags, NodeId, ReactiveNode, TurnError, TurnFlags};
use rill_graph::{topology, NodeCell, Registry};

use crate::config::{ConfigError, GraphConfig};
use crate::engine::{make_engine, EngineKind, PropagationEngine};
use crate::input::{AsyncItem, InputManager, TransactionCtx, TransactionStatus};
use crate::metrics::TurnMetrics;

pub(crate) struct GraphInner {
    registry: RwLock<Registry>,
    engine: Box<dyn PropagationEngine>,
    input: InputManager,
    metrics: Mutex<TurnMetrics>,
}

impl GraphInner {
    fn do_transaction(
        &self,
        flags: TurnFlags,
        body: Box<dyn FnOnce(&mut TransactionCtx) + Send>,
    ) -> Result<(), TurnError> {
        self.input
            .do_transaction(&self.registry, self.engine.as_ref(), &self.metrics, flags, body)
    }

    /// Destroy `id` if it is still the node the handle was created
    /// for. A slot freed by `queue_detach` (and possibly reissued) is
    /// left alone.
    ///
    /// The removed cell is dropped only after the registry lock is
    /// released: destroying a node drops the input refs its
    /// implementation held, which may cascade into further handle
    /// drops that each need the lock for themselves.
    fn destroy_node(&self, id: NodeId, expected: &Weak<NodeCell>) {
        let removed = {
            let mut reg = self.registry.write().expect("registry lock poisoned");
            let Some(current) = reg.try_cell(id) else {
                return;
            };
            let Some(expected) = expected.upgrade() else {
                return;
            };
            if !Arc::ptr_eq(current, &expected) {
                return;
            }
            topology::detach_all(&reg, id);
            self.engine.unregister_node(id, &reg);
            reg.remove(id)
        };
        drop(removed);
    }
}

struct HandleCore {
    id: NodeId,
    cell: Weak<NodeCell>,
    graph: Weak<GraphInner>,
}

impl Drop for HandleCore {
    fn drop(&mut self) {
        if let Some(graph) = self.graph.upgrade() {
            graph.destroy_node(self.id, &self.cell);
        }
    }
}

/// Reference-counted facade for a registered node.
///
/// Cloning shares the same underlying registration; the node is
/// destroyed when the last clone drops (or earlier, if the node
/// removed itself via `queue_detach` during a turn).
///
/// Do not drop the last handle from inside an update callback or a
/// transaction body — destruction needs exclusive registry access,
/// which a running turn holds. Observers that want to remove
/// themselves use [`UpdateContext::queue_detach`](rill_core::UpdateContext::queue_detach).
#[derive(Clone)]
pub struct NodeHandle {
    core: Arc<HandleCore>,
}

impl NodeHandle {
    /// The node's registry id.
    pub fn id(&self) -> NodeId {
        self.core.id
    }
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle").field("id", &self.core.id).finish()
    }
}

/// A reactive dependency graph with a pluggable propagation engine.
pub struct Graph {
    inner: Arc<GraphInner>,
    async_tx: Option<Sender<AsyncItem>>,
    worker: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl Graph {
    /// Construct a graph from a validated configuration.
    pub fn new(config: GraphConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let inner = Arc::new(GraphInner {
            registry: RwLock::new(Registry::with_capacity(config.initial_node_capacity)),
            engine: make_engine(config.engine),
            input: InputManager::new(),
            metrics: Mutex::new(TurnMetrics::default()),
        });

        let (tx, rx) = crossbeam_channel::bounded(config.async_queue_capacity);
        let shutdown = Arc::new(AtomicBool::new(false));
        let worker = {
            let inner = Arc::clone(&inner);
            let shutdown = Arc::clone(&shutdown);
            let merge_limit = config.async_merge_limit;
            std::thread::Builder::new()
                .name("rill-async-worker".into())
                .spawn(move || async_worker(&inner, &rx, &shutdown, merge_limit))
                .expect("failed to spawn async transaction worker")
        };

        Ok(Self {
            inner,
            async_tx: Some(tx),
            worker: Some(worker),
            shutdown,
        })
    }

    /// Construct a graph with the default configuration and the given
    /// engine.
    pub fn with_engine(engine: EngineKind) -> Self {
        Self::new(GraphConfig {
            engine,
            ..GraphConfig::default()
        })
        .expect("default config is valid")
    }

    /// Register a node, returning its handle.
    pub fn add_node(&self, flags: NodeFlags, node: Box<dyn ReactiveNode>) -> NodeHandle {
        let mut reg = self.inner.registry.write().expect("registry lock poisoned");
        let id = reg.insert(flags, node);
        self.inner.engine.register_node(id, flags, &reg);
        let cell = Arc::downgrade(reg.cell(id));
        NodeHandle {
            core: Arc::new(HandleCore {
                id,
                cell,
                graph: Arc::downgrade(&self.inner),
            }),
        }
    }

    /// Add the edge `parent → node`. Construction-time operation,
    /// serialized by the caller; panics on the programmer errors the
    /// topology traps (cycles, output parents, input successors).
    pub fn attach(&self, node: &NodeHandle, parent: &NodeHandle) {
        let reg = self.inner.registry.read().expect("registry lock poisoned");
        self.inner.engine.attach(node.id(), parent.id(), &reg);
    }

    /// Remove the edge `parent → node`.
    pub fn detach(&self, node: &NodeHandle, parent: &NodeHandle) {
        let reg = self.inner.registry.read().expect("registry lock poisoned");
        self.inner.engine.detach(node.id(), parent.id(), &reg);
    }

    /// Run a transaction: the body submits any number of input writes,
    /// and all of them commit as one turn.
    ///
    /// With [`TurnFlags::MERGEABLE`], the body may instead be folded
    /// into a turn already waiting for admission; the call then blocks
    /// until that turn ends.
    pub fn with_transaction(
        &self,
        flags: TurnFlags,
        body: impl FnOnce(&mut TransactionCtx) + Send + 'static,
    ) -> Result<(), TurnError> {
        self.inner.do_transaction(flags, Box::new(body))
    }

    /// Submit a single input write as its own turn.
    pub fn submit(
        &self,
        node: &NodeHandle,
        write: impl FnOnce() + Send + 'static,
    ) -> Result<(), TurnError> {
        let id = node.id();
        self.with_transaction(TurnFlags::default(), move |ctx| ctx.submit(id, write))
    }

    /// Enqueue a transaction for the background worker.
    ///
    /// Never blocks. `status` (if given) counts the transaction and is
    /// released when its turn — continuations included — has finished.
    /// The turn's own error, if any, is recorded in the metrics; an
    /// asynchronous caller has nowhere to receive it.
    pub fn enqueue_transaction(
        &self,
        flags: TurnFlags,
        status: Option<&Arc<TransactionStatus>>,
        body: impl FnOnce(&mut TransactionCtx) + Send + 'static,
    ) -> Result<(), EnqueueError> {
        if let Some(status) = status {
            status.add();
        }
        let item = AsyncItem {
            flags,
            status: status.map(Arc::clone),
            body: Box::new(body),
        };
        let tx = self.async_tx.as_ref().expect("worker alive while graph exists");
        match tx.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(item)) => {
                if let Some(status) = item.status {
                    status.done();
                }
                Err(EnqueueError::QueueFull)
            }
            Err(TrySendError::Disconnected(item)) => {
                if let Some(status) = item.status {
                    status.done();
                }
                Err(EnqueueError::ShuttingDown)
            }
        }
    }

    /// Snapshot of the cumulative propagation metrics.
    pub fn metrics(&self) -> TurnMetrics {
        self.inner.metrics.lock().expect("metrics poisoned").clone()
    }

    /// Check the between-turns structural invariants, panicking with a
    /// description of the first violation.
    ///
    /// Holds whenever no turn is in flight: every edge is recorded on
    /// both endpoints, levels strictly increase along edges, the edge
    /// relation is acyclic per the reachability matrix, and no node is
    /// left scheduled or carrying a pulse obligation.
    pub fn assert_invariants(&self) {
        let reg = self.inner.registry.read().expect("registry lock poisoned");
        for cell in reg.iter() {
            let id = cell.id();
            for succ in cell.successors() {
                let succ_cell = reg.cell(succ);
                assert!(
                    succ_cell.predecessors().contains(&id),
                    "edge {id} -> {succ} missing its predecessor record"
                );
                assert!(
                    succ_cell.meta().level() > cell.meta().level(),
                    "edge {id} -> {succ} violates level order"
                );
                assert!(
                    !reg.reach().is_reachable(succ, id),
                    "edge {id} -> {succ} closes a cycle"
                );
            }
            for pred in cell.predecessors() {
                assert!(
                    reg.cell(pred).successors().contains(&id),
                    "edge {pred} -> {id} missing its successor record"
                );
            }
            assert!(!cell.meta().is_queued(), "node {id} left scheduled");
            assert_eq!(
                cell.meta().threshold(),
                0,
                "node {id} left with a pulse obligation"
            );
        }
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.inner.registry.read().expect("registry lock poisoned").len()
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        // Disconnect the channel so a blocked recv wakes and the
        // worker drains out.
        drop(self.async_tx.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.node_count())
            .finish_non_exhaustive()
    }
}

/// Background loop for asynchronous transactions.
///
/// Pops one item, first offering it to the turn waiting at the queue
/// tail; otherwise opens a turn of its own and — when the item allows
/// merging — folds in up to `merge_limit` immediately-following
/// mergeable items, so bursty load is bounded to a handful of turns.
fn async_worker(
    inner: &Arc<GraphInner>,
    rx: &Receiver<AsyncItem>,
    shutdown: &Arc<AtomicBool>,
    merge_limit: usize,
) {
    let mut carried: Option<AsyncItem> = None;
    loop {
        let item = match carried.take() {
            Some(item) => item,
            None => match rx.recv() {
                Ok(item) => item,
                Err(_) => break,
            },
        };
        if shutdown.load(Ordering::Acquire) {
            if let Some(status) = item.status {
                status.done();
            }
            continue;
        }

        let mut item = item;
        if item.flags.merge_inputs {
            match inner.input.try_merge(&inner.metrics, item.body) {
                Ok(()) => {
                    if let Some(status) = item.status {
                        status.done();
                    }
                    continue;
                }
                Err(body) => item.body = body,
            }
        }

        let mut bodies = vec![item.body];
        let mut statuses = vec![item.status];
        if item.flags.merge_inputs {
            while bodies.len() <= merge_limit {
                match rx.try_recv() {
                    Ok(next) if next.flags.merge_inputs => {
                        bodies.push(next.body);
                        statuses.push(next.status);
                    }
                    Ok(next) => {
                        // First unmergeable item ends the range; it
                        // runs as its own turn next iteration.
                        carried = Some(next);
                        break;
                    }
                    Err(_) => break,
                }
            }
        }

        // The error, if any, is already folded into the metrics; an
        // async caller has no return channel.
        let _ = inner.input.run_transaction(
            &inner.registry,
            inner.engine.as_ref(),
            &inner.metrics,
            item.flags,
            bodies,
        );

        for status in statuses.into_iter().flatten() {
            status.done();
        }
    }
}
