//! Handlers and receiver tables.
//!
//! A handler is registered on one node for one kind and is invoked for that
//! kind and every descendant kind. A receiver table is the per-owner set of
//! methods a node routes events to by their derived handler-method name.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::dispatcher::NodeInner;
use crate::error::{EventError, EventResult};
use crate::event::{EventInstance, EventKind, Filter, TypedEvent, handler_method_name};

/// What a handler asks of the rest of the local-handler loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Outcome {
    /// Keep delivering.
    #[default]
    Continue,
    /// Skip the remaining local handlers of this node.
    ///
    /// Children, the node's receiver and the parent still get the event.
    StopPropagation,
}

impl From<()> for Outcome {
    fn from(_: ()) -> Self {
        Self::Continue
    }
}

/// A synchronous handler callback.
pub type SyncCallback = Arc<dyn Fn(&EventInstance) -> Outcome + Send + Sync>;

/// An asynchronous handler callback.
pub type AsyncCallback = Arc<dyn Fn(EventInstance) -> BoxFuture<'static, Outcome> + Send + Sync>;

pub(crate) type Slot = Mutex<Option<oneshot::Sender<EventInstance>>>;

pub(crate) enum Callback {
    Sync(SyncCallback),
    Async(AsyncCallback),
    Slot(Slot),
}

// ============================================================================
// Handler Target
// ============================================================================

/// What to register: a callback or a result slot, plus options.
///
/// ```rust,ignore
/// let handler = node.add_event_handler(
///     &tapped,
///     HandlerTarget::callback(|evt| info!(?evt, "tapped")).oneshot(),
/// )?;
/// ```
pub struct HandlerTarget {
    pub(crate) callback: Callback,
    pub(crate) oneshot: bool,
    pub(crate) filters: Vec<Filter>,
}

impl HandlerTarget {
    /// A synchronous callback. It may return `()` or an [`Outcome`].
    pub fn callback<F, R>(f: F) -> Self
    where
        F: Fn(&EventInstance) -> R + Send + Sync + 'static,
        R: Into<Outcome>,
    {
        Self::new(Callback::Sync(Arc::new(move |evt: &EventInstance| -> Outcome {
            f(evt).into()
        })))
    }

    /// An asynchronous callback, awaited inside the delivery task.
    pub fn async_callback<F, Fut, R>(f: F) -> Self
    where
        F: Fn(EventInstance) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: Into<Outcome> + 'static,
    {
        Self::new(Callback::Async(Arc::new(
            move |evt: EventInstance| -> BoxFuture<'static, Outcome> {
                f(evt).map(Into::into).boxed()
            },
        )))
    }

    /// A result slot resolved with the first delivered instance. Always oneshot.
    pub fn slot() -> (Self, oneshot::Receiver<EventInstance>) {
        let (tx, rx) = oneshot::channel();
        let mut target = Self::new(Callback::Slot(Mutex::new(Some(tx))));
        target.oneshot = true;
        (target, rx)
    }

    fn new(callback: Callback) -> Self {
        Self {
            callback,
            oneshot: false,
            filters: Vec::new(),
        }
    }

    /// Disables the handler right before its first invocation.
    pub fn oneshot(mut self) -> Self {
        self.oneshot = true;
        self
    }

    /// Gates the handler on a filter.
    ///
    /// With several filters the handler fires when any one of them matches.
    pub fn filtered(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub(crate) fn accepts(&self, event: &EventInstance) -> bool {
        self.filters.is_empty() || self.filters.iter().any(|f| f.matches(event))
    }
}

impl fmt::Debug for HandlerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let callback = match self.callback {
            Callback::Sync(_) => "sync",
            Callback::Async(_) => "async",
            Callback::Slot(_) => "slot",
        };
        f.debug_struct("HandlerTarget")
            .field("callback", &callback)
            .field("oneshot", &self.oneshot)
            .field("filters", &self.filters.len())
            .finish()
    }
}

// ============================================================================
// Handler Record
// ============================================================================

/// Identity of a registered handler, unique per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

impl HandlerId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

pub(crate) struct HandlerEntry {
    pub(crate) id: HandlerId,
    pub(crate) target: HandlerTarget,
}

/// A disposable record of a registered handler.
#[derive(Clone)]
pub struct Handler {
    node: Weak<NodeInner>,
    kind: Arc<EventKind>,
    id: HandlerId,
    oneshot: bool,
    inert: bool,
}

impl Handler {
    pub(crate) fn new(
        node: Weak<NodeInner>,
        kind: Arc<EventKind>,
        id: HandlerId,
        oneshot: bool,
    ) -> Self {
        Self {
            node,
            kind,
            id,
            oneshot,
            inert: false,
        }
    }

    /// A record that was never registered; disabling it does nothing.
    pub(crate) fn inert(kind: Arc<EventKind>, oneshot: bool) -> Self {
        Self {
            node: Weak::new(),
            kind,
            id: HandlerId::next(),
            oneshot,
            inert: true,
        }
    }

    /// Returns the handler id.
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Returns the kind the handler was registered for.
    pub fn kind(&self) -> &Arc<EventKind> {
        &self.kind
    }

    /// Returns true if the handler only fires once.
    pub fn is_oneshot(&self) -> bool {
        self.oneshot
    }

    /// Returns true if the handler was never registered because its node was stopped.
    pub fn is_inert(&self) -> bool {
        self.inert
    }

    /// Removes the handler from the node it was registered on.
    ///
    /// Fails with [`EventError::NotFound`] if it is no longer registered.
    pub fn disable(&self) -> EventResult<()> {
        if self.inert {
            return Ok(());
        }
        match self.node.upgrade() {
            Some(node) => node.remove_handler(&self.kind, self.id),
            None => Err(EventError::NotFound {
                kind: self.kind.name().to_string(),
            }),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("kind", &self.kind.name())
            .field("id", &self.id)
            .field("oneshot", &self.oneshot)
            .field("inert", &self.inert)
            .finish()
    }
}

// ============================================================================
// Receiver Table
// ============================================================================

/// A receiver method.
pub type Receiver = Arc<dyn Fn(EventInstance) -> BoxFuture<'static, ()> + Send + Sync>;

/// Per-owner methods keyed by handler-method name.
///
/// The node looks up the event's kind name first, then each ancestor's, and
/// falls back to the default receiver (`recv_default_handler`, or
/// `_recv_default_handler` for internal kinds).
#[derive(Clone, Default)]
pub struct ReceiverTable {
    methods: HashMap<String, (Receiver, Option<Filter>)>,
}

impl ReceiverTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a synchronous receiver under an explicit method name.
    pub fn on<F>(self, method: impl Into<String>, f: F) -> Self
    where
        F: Fn(&EventInstance) + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.insert(
            method.into(),
            Arc::new(move |evt: EventInstance| {
                f(&evt);
                futures::future::ready(()).boxed()
            }),
            None,
        )
    }

    /// Adds an asynchronous receiver under an explicit method name.
    pub fn on_async<F, Fut>(self, method: impl Into<String>, f: F) -> Self
    where
        F: Fn(EventInstance) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.insert(
            method.into(),
            Arc::new(move |evt: EventInstance| f(evt).boxed()),
            None,
        )
    }

    /// Adds a synchronous receiver for the typed kind `T`.
    pub fn on_kind<T, F>(self, f: F) -> Self
    where
        T: TypedEvent,
        F: Fn(&EventInstance) + Send + Sync + 'static,
    {
        self.on(handler_method_name(T::NAME, T::INTERNAL), f)
    }

    /// Adds a receiver that only runs when `filter` matches.
    ///
    /// A filtered-out receiver is skipped as if absent.
    pub fn on_filtered<F>(mut self, method: impl Into<String>, filter: Filter, f: F) -> Self
    where
        F: Fn(&EventInstance) + Send + Sync + 'static,
    {
        let method = method.into();
        self = self.on(method.clone(), f);
        if let Some((_, slot)) = self.methods.get_mut(&method) {
            *slot = Some(filter);
        }
        self
    }

    fn insert(mut self, method: String, receiver: Receiver, filter: Option<Filter>) -> Self {
        self.methods.insert(method, (receiver, filter));
        self
    }

    /// Returns true if a receiver is registered under `method`.
    pub fn contains(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    /// Returns the number of receivers.
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Returns true if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Finds the receiver for `event`.
    pub(crate) fn resolve(&self, event: &EventInstance) -> Option<Receiver> {
        let accepts = |method: &str| {
            self.methods.get(method).and_then(|(receiver, filter)| {
                filter
                    .as_ref()
                    .is_none_or(|f| f.matches(event))
                    .then(|| Arc::clone(receiver))
            })
        };

        event
            .kind()
            .ancestors()
            .find_map(|kind| accepts(kind.handler_method_name()))
            .or_else(|| accepts(event.kind().default_handler_method_name()))
    }
}

impl fmt::Debug for ReceiverTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<&String> = self.methods.keys().collect();
        methods.sort();
        f.debug_struct("ReceiverTable")
            .field("methods", &methods)
            .finish()
    }
}
