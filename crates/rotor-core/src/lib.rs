//! # Rotor Core
//!
//! Event dispatch, action lifecycle and abort signalling for the Rotor SDK.
//!
//! ## Layers
//!
//! - **Events** ([`event`]): declared kinds in a single-inheritance hierarchy,
//!   immutable instances and field filters
//! - **Dispatch** ([`dispatch`]): a tree of [`Dispatcher`] nodes with
//!   de-duplicated four-path delivery, oneshot handlers and waits
//! - **Actions** ([`action`]): correlation-id based request/response with a
//!   five-state lifecycle, exclusivity and cancellation
//! - **Transport** ([`transport`]): the seam commands leave through
//!
//! Everything here is driven by one cooperative event loop. The
//! `rotor-runtime` crate owns that loop and lets other threads call in.
//!
//! ## Example
//!
//! ```rust,ignore
//! use rotor_core::prelude::*;
//!
//! /// Triggered when an object is tapped.
//! #[derive(Debug, Clone, Default, Serialize, Deserialize, Event)]
//! struct ObjectTapped {
//!     /// The object that was tapped
//!     object_id: Option<u32>,
//! }
//!
//! let registry = Arc::new(EventRegistry::new());
//! register_core_kinds(&registry)?;
//! let tapped = registry.register::<ObjectTapped>()?;
//!
//! let ctx = LoopContext::current(registry);
//! let world = Dispatcher::with_name(ctx, "world", None);
//! world.add_event_handler(&tapped, HandlerTarget::callback(|evt| {
//!     println!("tapped: {evt:?}");
//! }))?;
//! world.dispatch_typed(&ObjectTapped { object_id: Some(3) })?.await;
//! ```

extern crate self as rotor_core;

pub mod action;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use action::{
    Action, ActionCommand, ActionCompleted, ActionDispatcher, ActionSettings, ActionStarted,
    ActionState, FailureCode, JsonCommand, MsgActionResult, ResultCode, SendOptions, TagLayout,
    TagRange, register_core_kinds,
};
pub use dispatch::{
    AbortSignal, AsDispatcher, DispatchHandle, Dispatcher, Handler, HandlerTarget, LoopContext,
    NodeId, Outcome, ReceiverTable, WaitTarget, wait_for_first,
};
pub use error::{
    AbortReason, ActionError, ActionResult, EventError, EventResult, TransportError,
    TransportResult,
};
pub use event::{EventInstance, EventKind, EventRegistry, Filter, KindSpec, TypedEvent};
pub use rotor_macros::Event;
pub use transport::{Command, Transport};

/// Re-exports for building on the core.
pub mod prelude {
    pub use std::sync::Arc;

    pub use serde::{Deserialize, Serialize};

    pub use crate::action::{
        Action, ActionCompleted, ActionDispatcher, ActionStarted, ActionState, SendOptions,
        register_core_kinds,
    };
    pub use crate::dispatch::{
        AsDispatcher, Dispatcher, HandlerTarget, LoopContext, Outcome, ReceiverTable,
        wait_for_first,
    };
    pub use crate::error::{AbortReason, ActionError, EventError};
    pub use crate::event::{EventInstance, EventRegistry, Filter, KindSpec, TypedEvent};
    pub use crate::transport::{Command, Transport};
    pub use rotor_macros::Event;
}
