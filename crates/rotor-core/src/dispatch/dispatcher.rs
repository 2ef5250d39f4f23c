//! Hierarchical event dispatch.
//!
//! A [`Dispatcher`] is one node in a tree. Dispatching an event on a node
//! delivers it along four paths, in order:
//!
//! 1. handlers registered on the node for the event's kind or any ancestor kind
//! 2. every child node, recursively
//! 3. the node's own receiver for the kind (see [`ReceiverTable`])
//! 4. the parent node
//!
//! Each instance records the nodes it has reached, so a node sees a given
//! instance at most once however the tree is wired.
//!
//! ```rust,ignore
//! let world = Dispatcher::with_name(ctx.clone(), "world", None);
//! let cube = world.new_child("cube");
//!
//! cube.add_event_handler(&tapped, HandlerTarget::callback(|evt| {
//!     info!(?evt, "cube tapped");
//! }))?;
//!
//! world.dispatch_fields(&tapped, [("object_id", json!(3))])?.finished().await;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::IntoFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, debug_span, error, trace};

use super::context::{LoopContext, NodeId};
use super::handler::{
    Callback, Handler, HandlerEntry, HandlerId, HandlerTarget, Outcome, ReceiverTable,
};
use crate::error::{EventError, EventResult};
use crate::event::{EventInstance, EventKind, EventRegistry, TypedEvent};

// ============================================================================
// Node State
// ============================================================================

pub(crate) struct NodeInner {
    id: NodeId,
    name: String,
    ctx: Arc<LoopContext>,
    parent: Mutex<Weak<NodeInner>>,
    children: Mutex<Vec<Dispatcher>>,
    handlers: Mutex<HashMap<String, Vec<Arc<HandlerEntry>>>>,
    receivers: RwLock<Arc<ReceiverTable>>,
    running: AtomicBool,
}

impl NodeInner {
    pub(crate) fn remove_handler(&self, kind: &EventKind, id: HandlerId) -> EventResult<()> {
        let mut handlers = self.handlers.lock();
        let entries = handlers.get_mut(kind.name());
        let removed = entries.and_then(|entries| {
            let index = entries.iter().position(|entry| entry.id == id)?;
            Some(entries.remove(index))
        });
        match removed {
            Some(_) => Ok(()),
            None => Err(EventError::NotFound {
                kind: kind.name().to_string(),
            }),
        }
    }

    /// Claims the instance for this node and selects the handlers to run.
    ///
    /// Oneshot handlers are removed here, before anything is invoked.
    fn prepare(self: &Arc<Self>, event: &EventInstance) -> Option<Delivery> {
        if !self.running.load(Ordering::Acquire) {
            trace!(node = %self.name, event = %event.name(), "Node stopped, skipping");
            return None;
        }
        if !event.mark_delivered(self.id) {
            trace!(node = %self.name, event = %event.name(), "Already delivered, skipping");
            return None;
        }

        let mut selected = Vec::new();
        {
            let mut handlers = self.handlers.lock();
            for kind in event.kind().ancestors() {
                let Some(entries) = handlers.get_mut(kind.name()) else {
                    continue;
                };
                entries.retain(|entry| {
                    if !entry.target.accepts(event) {
                        return true;
                    }
                    selected.push(Arc::clone(entry));
                    !entry.target.oneshot
                });
            }
        }

        Some(Delivery {
            node: Arc::clone(self),
            event: event.clone(),
            handlers: selected,
        })
    }
}

/// One node's share of a dispatch.
struct Delivery {
    node: Arc<NodeInner>,
    event: EventInstance,
    handlers: Vec<Arc<HandlerEntry>>,
}

impl Delivery {
    fn run(self) -> BoxFuture<'static, ()> {
        async move {
            let Delivery {
                node,
                event,
                handlers,
            } = self;

            for entry in &handlers {
                let outcome = match &entry.target.callback {
                    Callback::Sync(f) => f(&event),
                    Callback::Async(f) => f(event.clone()).await,
                    Callback::Slot(slot) => {
                        let sender = slot.lock().take();
                        if let Some(sender) = sender {
                            let _ = sender.send(event.clone());
                        }
                        Outcome::Continue
                    }
                };
                if outcome == Outcome::StopPropagation {
                    debug!(
                        node = %node.name,
                        event = %event.name(),
                        "Local handlers stopped propagation"
                    );
                    break;
                }
            }

            let children = node.children.lock().clone();
            for child in children {
                if let Some(delivery) = child.inner.prepare(&event) {
                    delivery.run().await;
                }
            }

            let receivers = Arc::clone(&*node.receivers.read());
            if let Some(receiver) = receivers.resolve(&event) {
                receiver(event.clone()).await;
            }

            let parent = node.parent.lock().upgrade();
            if let Some(parent) = parent
                && let Some(delivery) = parent.prepare(&event)
            {
                delivery.run().await;
            }
        }
        .boxed()
    }
}

// ============================================================================
// Dispatch Handle
// ============================================================================

/// Completion handle of one dispatch.
///
/// Awaiting it (or [`finished`](Self::finished)) resolves once every path of
/// the delivery has run. Dropping it does not cancel the delivery.
#[derive(Debug)]
pub struct DispatchHandle {
    task: Option<JoinHandle<()>>,
}

impl DispatchHandle {
    pub(crate) fn skipped() -> Self {
        Self { task: None }
    }

    pub(crate) fn spawned(task: JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    /// Returns true if nothing was delivered because the node was stopped or
    /// had already seen the instance.
    pub fn is_skipped(&self) -> bool {
        self.task.is_none()
    }

    /// Waits for the delivery to finish.
    pub async fn finished(self) {
        if let Some(task) = self.task
            && let Err(e) = task.await
            && e.is_panic()
        {
            error!(error = %e, "Event handler panicked during delivery");
        }
    }
}

impl IntoFuture for DispatchHandle {
    type Output = ();
    type IntoFuture = BoxFuture<'static, ()>;

    fn into_future(self) -> Self::IntoFuture {
        self.finished().boxed()
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Access to the dispatch node of a composite object.
pub trait AsDispatcher {
    /// Returns the node.
    fn dispatcher(&self) -> &Dispatcher;
}

/// A node in the dispatch tree.
///
/// Cloning is cheap and clones refer to the same node.
#[derive(Clone)]
pub struct Dispatcher {
    pub(super) inner: Arc<NodeInner>,
}

impl Dispatcher {
    /// Creates a node with an optional parent.
    ///
    /// The parent link is non-owning; use [`add_child`](Self::add_child) or
    /// [`new_child`](Self::new_child) to have the parent deliver downwards.
    pub fn new(ctx: Arc<LoopContext>, parent: Option<&Dispatcher>) -> Self {
        let id = ctx.next_node_id();
        Self::build(ctx, id, format!("dispatcher{id}"), parent)
    }

    /// Creates a named node with an optional parent.
    pub fn with_name(
        ctx: Arc<LoopContext>,
        name: impl Into<String>,
        parent: Option<&Dispatcher>,
    ) -> Self {
        let id = ctx.next_node_id();
        Self::build(ctx, id, name.into(), parent)
    }

    fn build(ctx: Arc<LoopContext>, id: NodeId, name: String, parent: Option<&Dispatcher>) -> Self {
        let parent = parent.map(|p| Arc::downgrade(&p.inner)).unwrap_or_default();
        Self {
            inner: Arc::new(NodeInner {
                id,
                name,
                ctx,
                parent: Mutex::new(parent),
                children: Mutex::new(Vec::new()),
                handlers: Mutex::new(HashMap::new()),
                receivers: RwLock::new(Arc::new(ReceiverTable::new())),
                running: AtomicBool::new(true),
            }),
        }
    }

    /// Creates a node that is both a child of this node and has it as parent.
    pub fn new_child(&self, name: impl Into<String>) -> Dispatcher {
        let child = Self::with_name(Arc::clone(&self.inner.ctx), name, Some(self));
        self.add_child(&child);
        child
    }

    /// Returns the node id.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Returns the node name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the loop context.
    pub fn context(&self) -> &Arc<LoopContext> {
        &self.inner.ctx
    }

    /// Returns the event registry.
    pub fn registry(&self) -> &Arc<EventRegistry> {
        self.inner.ctx.registry()
    }

    /// Looks up the kind of a typed event in this node's registry.
    pub fn kind_of<T: TypedEvent>(&self) -> EventResult<Arc<EventKind>> {
        self.registry().kind_of::<T>()
    }

    /// Returns true if both values refer to the same node.
    pub fn ptr_eq(&self, other: &Dispatcher) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ------------------------------------------------------------------------
    // Tree
    // ------------------------------------------------------------------------

    /// Adds a child that receives every event dispatched through this node.
    pub fn add_child(&self, child: &Dispatcher) {
        self.inner.children.lock().push(child.clone());
    }

    /// Returns the children, in insertion order.
    pub fn children(&self) -> Vec<Dispatcher> {
        self.inner.children.lock().clone()
    }

    /// Sets or clears the parent.
    pub fn set_parent(&self, parent: Option<&Dispatcher>) {
        *self.inner.parent.lock() = parent.map(|p| Arc::downgrade(&p.inner)).unwrap_or_default();
    }

    /// Returns the parent, if it is still alive.
    pub fn parent(&self) -> Option<Dispatcher> {
        self.inner
            .parent
            .lock()
            .upgrade()
            .map(|inner| Dispatcher { inner })
    }

    /// Replaces the receiver table.
    pub fn set_receivers(&self, receivers: ReceiverTable) {
        *self.inner.receivers.write() = Arc::new(receivers);
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Returns true until [`stop`](Self::stop) is called.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Stops the node.
    ///
    /// Further dispatches through it are skipped and new handlers are inert.
    /// Registered handlers and children are released; pending waits on this
    /// node fail with [`EventError::Stopped`].
    pub fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::AcqRel) {
            return;
        }
        let handlers = std::mem::take(&mut *self.inner.handlers.lock());
        let children = std::mem::take(&mut *self.inner.children.lock());
        debug!(
            node = %self.inner.name,
            handlers = handlers.values().map(Vec::len).sum::<usize>(),
            children = children.len(),
            "Dispatcher stopped"
        );
    }

    // ------------------------------------------------------------------------
    // Handlers
    // ------------------------------------------------------------------------

    /// Registers a handler for `kind` and all its descendant kinds.
    ///
    /// Fails with [`EventError::InvalidKind`] if `kind` does not belong to this
    /// node's registry. On a stopped node nothing is registered and an inert
    /// record is returned.
    pub fn add_event_handler(
        &self,
        kind: &Arc<EventKind>,
        target: HandlerTarget,
    ) -> EventResult<Handler> {
        if !self.registry().owns(kind) {
            return Err(EventError::invalid_kind(kind.name()));
        }
        let oneshot = target.oneshot;
        if !self.is_running() {
            debug!(
                node = %self.inner.name,
                kind = %kind.name(),
                "Node stopped, handler not registered"
            );
            return Ok(Handler::inert(Arc::clone(kind), oneshot));
        }

        let id = HandlerId::next();
        self.inner
            .handlers
            .lock()
            .entry(kind.name().to_string())
            .or_default()
            .push(Arc::new(HandlerEntry { id, target }));
        trace!(node = %self.inner.name, kind = %kind.name(), ?id, oneshot, "Handler added");

        Ok(Handler::new(Arc::downgrade(&self.inner), Arc::clone(kind), id, oneshot))
    }

    /// Removes a handler registered on this node.
    ///
    /// Fails with [`EventError::NotFound`] if no such handler is registered.
    pub fn remove_event_handler(&self, kind: &EventKind, handler: &Handler) -> EventResult<()> {
        self.inner.remove_handler(kind, handler.id())
    }

    /// Returns the number of handlers currently registered on this node.
    pub fn handler_count(&self) -> usize {
        self.inner.handlers.lock().values().map(Vec::len).sum()
    }

    // ------------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------------

    /// Dispatches an instance through this node.
    ///
    /// The delivery runs as one task on the loop. Fails with
    /// [`EventError::InvalidKind`] if the instance's kind is foreign to this
    /// node's registry.
    pub fn dispatch_event(&self, event: EventInstance) -> EventResult<DispatchHandle> {
        if !self.registry().owns(event.kind()) {
            return Err(EventError::invalid_kind(event.name()));
        }
        let Some(delivery) = self.inner.prepare(&event) else {
            return Ok(DispatchHandle::skipped());
        };

        let span = debug_span!("dispatch", event = %event.name(), node = %self.inner.name);
        let task = self.inner.ctx.handle().spawn(delivery.run().instrument(span));
        Ok(DispatchHandle::spawned(task))
    }

    /// Builds an instance of `kind` from field values and dispatches it.
    pub fn dispatch_fields<I, K>(
        &self,
        kind: &Arc<EventKind>,
        fields: I,
    ) -> EventResult<DispatchHandle>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.dispatch_event(EventInstance::new(Arc::clone(kind), fields)?)
    }

    /// Builds an instance from a typed event and dispatches it.
    pub fn dispatch_typed<T: TypedEvent>(&self, event: &T) -> EventResult<DispatchHandle> {
        self.dispatch_event(EventInstance::from_typed(self.registry(), event)?)
    }

    pub(super) fn stopped_error(&self) -> EventError {
        EventError::Stopped {
            node: self.inner.name.clone(),
        }
    }
}

impl AsDispatcher for Dispatcher {
    fn dispatcher(&self) -> &Dispatcher {
        self
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("running", &self.is_running())
            .field("children", &self.inner.children.lock().len())
            .field("handlers", &self.handler_count())
            .finish()
    }
}
