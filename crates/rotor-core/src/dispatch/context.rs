//! The shared loop context.
//!
//! Every [`Dispatcher`](super::Dispatcher) is created with an
//! `Arc<LoopContext>`. The context carries what would otherwise be process
//! globals: the event registry, the abort signal and the node-id allocator,
//! plus the handle of the runtime that owns all dispatch state.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};

use tokio::runtime::Handle;

use super::abort::AbortSignal;
use crate::error::AbortReason;
use crate::event::EventRegistry;

/// Stable identity of a dispatch node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Wraps a raw id.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw id.
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Shared state of one event loop.
pub struct LoopContext {
    registry: Arc<EventRegistry>,
    handle: Handle,
    abort: AbortSignal,
    next_node: AtomicU64,
    loop_thread: OnceLock<ThreadId>,
}

impl LoopContext {
    /// Creates a context bound to the runtime behind `handle`.
    pub fn new(registry: Arc<EventRegistry>, handle: Handle) -> Arc<Self> {
        Arc::new(Self {
            registry,
            handle,
            abort: AbortSignal::new(),
            next_node: AtomicU64::new(1),
            loop_thread: OnceLock::new(),
        })
    }

    /// Creates a context on the runtime of the calling task.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current(registry: Arc<EventRegistry>) -> Arc<Self> {
        Self::new(registry, Handle::current())
    }

    /// Returns the event registry.
    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }

    /// Returns the runtime handle all deliveries are spawned on.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Returns the abort signal.
    pub fn abort_signal(&self) -> &AbortSignal {
        &self.abort
    }

    /// Fires the abort signal, failing every pending wait with `reason`.
    pub fn abort(&self, reason: AbortReason) -> bool {
        self.abort.trigger(reason)
    }

    pub(crate) fn next_node_id(&self) -> NodeId {
        NodeId(self.next_node.fetch_add(1, Ordering::Relaxed))
    }

    /// Binds the loop thread. Only the first call has an effect.
    pub fn bind_loop_thread(&self, thread: ThreadId) -> bool {
        self.loop_thread.set(thread).is_ok()
    }

    /// Returns the bound loop thread, if any.
    pub fn loop_thread(&self) -> Option<ThreadId> {
        self.loop_thread.get().copied()
    }

    /// Returns true on the loop thread, or anywhere when no thread is bound.
    pub fn is_loop_thread(&self) -> bool {
        self.loop_thread
            .get()
            .is_none_or(|bound| *bound == thread::current().id())
    }
}

impl fmt::Debug for LoopContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopContext")
            .field("registry", &self.registry)
            .field("aborted", &self.abort.is_triggered())
            .field("loop_thread", &self.loop_thread.get())
            .finish()
    }
}
