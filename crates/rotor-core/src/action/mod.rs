//! Long-running remote actions.
//!
//! An [`Action`] is sent through its owner's [`ActionDispatcher`], which
//! assigns a correlation id, queues the encoded command on the transport and
//! later matches the completion notification back to the action.

#[allow(clippy::module_inception)]
pub mod action;
pub mod dispatcher;
pub mod events;
pub mod result;
pub mod tags;

pub use action::{Action, ActionCommand, JsonCommand};
pub use dispatcher::{ActionDispatcher, ActionSettings, SendOptions};
pub use events::{ActionCompleted, ActionStarted, MsgActionResult, register_core_kinds};
pub use result::{ActionState, Completion, Failure, FailureCode, ResultCategory, ResultCode};
pub use tags::{ENGINE_TAGS, GAME_TAGS, LOCAL_TAGS, TagAllocator, TagClass, TagLayout, TagRange};
