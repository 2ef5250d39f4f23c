//! The dispatch tree.
//!
//! - [`LoopContext`] - shared registry, runtime handle and abort signal
//! - [`Dispatcher`] - a node delivering events to handlers, children, its
//!   receiver table and its parent
//! - [`HandlerTarget`] / [`Handler`] - what gets registered and the record
//!   that removes it again
//! - [`Dispatcher::wait_for`] / [`wait_for_first`] - suspending on events

pub mod abort;
pub mod context;
pub mod dispatcher;
pub mod handler;
pub mod wait;

pub use abort::AbortSignal;
pub use context::{LoopContext, NodeId};
pub use dispatcher::{AsDispatcher, DispatchHandle, Dispatcher};
pub use handler::{
    AsyncCallback, Handler, HandlerId, HandlerTarget, Outcome, Receiver, ReceiverTable,
    SyncCallback,
};
pub use wait::{DEFAULT_WAIT_TIMEOUT, WaitTarget, wait_for_first};
