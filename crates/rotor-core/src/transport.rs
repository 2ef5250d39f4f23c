//! The outbound command seam.
//!
//! The core never encodes wire messages itself. Actions hand a [`Command`]
//! to the owner's [`Transport`], which encodes and sends it. Completion
//! notifications travel the other way as
//! [`ActionDispatcher::on_completion_notification`](crate::ActionDispatcher::on_completion_notification)
//! calls or `MsgActionResult` events.

use serde::Serialize;
use serde_json::Value;

use crate::error::TransportResult;

/// A command for the remote device.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Queue an action under a correlation id.
    QueueAction {
        /// Correlation id echoed back in the completion notification.
        id_tag: u32,
        /// How often the device may retry the action.
        num_retries: u8,
        /// Run alongside other actions instead of replacing them.
        in_parallel: bool,
        /// Action type name.
        action_type: String,
        /// Encoded action parameters.
        payload: Value,
    },

    /// Cancel the action with this correlation id.
    CancelAction {
        /// Correlation id of the action to cancel.
        id_tag: u32,
    },

    /// Cancel every action on the device.
    CancelAll,
}

impl Command {
    /// Returns the correlation id the command refers to, if any.
    pub fn id_tag(&self) -> Option<u32> {
        match self {
            Self::QueueAction { id_tag, .. } | Self::CancelAction { id_tag } => Some(*id_tag),
            Self::CancelAll => None,
        }
    }
}

/// Sends commands to the remote device.
///
/// `send` only hands the command over; it must not block on a reply.
pub trait Transport: Send + Sync {
    /// Sends one command.
    fn send(&self, command: Command) -> TransportResult<()>;
}
