//! Unified error types for the Rotor core.
//!
//! Misuse is raised synchronously to the immediate caller. Remote action
//! outcomes are never errors; they surface as the action's terminal state.

use thiserror::Error;

use crate::action::ActionState;

// =============================================================================
// Abort Reasons
// =============================================================================

/// Why the global abort signal fired.
///
/// Every pending waiter and every blocked foreign-thread caller receives this
/// reason once the signal has been triggered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbortReason {
    /// The connection to the device was unexpectedly lost.
    #[error("connection aborted: {0}")]
    ConnectionAborted(String),

    /// The SDK is shutting down.
    #[error("SDK is shutting down")]
    Shutdown,
}

// =============================================================================
// Event Errors
// =============================================================================

/// Errors raised by kind declaration, handler management and waits.
#[derive(Debug, Clone, Error)]
pub enum EventError {
    /// An event kind with this name is already declared.
    #[error("duplicate event name '{name}'")]
    DuplicateName {
        /// The duplicated kind name.
        name: String,
    },

    /// The event kind was declared without a description.
    #[error("event kind '{name}' has no documentation")]
    MissingDocumentation {
        /// The undocumented kind name.
        name: String,
    },

    /// A field is declared more than once across the ancestor chain.
    #[error("event kind '{kind}' duplicates field '{field}' defined in an ancestor")]
    DuplicateField {
        /// The kind declaring the field again.
        kind: String,
        /// The duplicated field.
        field: String,
    },

    /// The named parent kind has not been declared.
    #[error("event kind '{kind}' names unknown parent '{parent}'")]
    UnknownParent {
        /// The kind being declared.
        kind: String,
        /// The missing parent.
        parent: String,
    },

    /// The kind is not declared in this registry.
    #[error("'{name}' is not a declared event kind")]
    InvalidKind {
        /// The offending kind name.
        name: String,
    },

    /// The kind does not declare this field.
    #[error("event kind '{kind}' has no field called '{field}'")]
    UnknownField {
        /// The kind that was addressed.
        kind: String,
        /// The undeclared field.
        field: String,
    },

    /// No matching handler is registered.
    #[error("no matching handler found for '{kind}'")]
    NotFound {
        /// The kind the handler was looked up under.
        kind: String,
    },

    /// A wait did not resolve before its deadline.
    #[error("timed out waiting for '{kind}'")]
    Timeout {
        /// The kind that was waited for.
        kind: String,
    },

    /// The dispatcher has been stopped and no longer delivers events.
    #[error("dispatcher '{node}' is stopped")]
    Stopped {
        /// Name of the stopped node.
        node: String,
    },

    /// The global abort signal fired while waiting.
    #[error(transparent)]
    Aborted(#[from] AbortReason),

    /// A typed event could not be converted to or from its field map.
    #[error("event '{kind}' could not be encoded: {reason}")]
    Encode {
        /// The kind being converted.
        kind: String,
        /// The serializer message.
        reason: String,
    },
}

impl EventError {
    /// Creates an invalid kind error.
    pub fn invalid_kind(name: impl Into<String>) -> Self {
        Self::InvalidKind { name: name.into() }
    }

    /// Creates an unknown field error.
    pub fn unknown_field(kind: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UnknownField {
            kind: kind.into(),
            field: field.into(),
        }
    }

    /// Creates an encode error from a serializer error.
    pub fn encode(kind: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Encode {
            kind: kind.into(),
            reason: err.to_string(),
        }
    }
}

/// Result type for event operations.
pub type EventResult<T> = Result<T, EventError>;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors reported by the external transport when sending a command.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The command could not be sent.
    #[error("failed to send command: {0}")]
    SendFailed(String),

    /// The transport is closed.
    #[error("transport closed")]
    Closed,
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

// =============================================================================
// Action Errors
// =============================================================================

/// Errors raised synchronously by action misuse.
#[derive(Debug, Clone, Error)]
pub enum ActionError {
    /// Another non-parallel action is already in progress for this owner.
    #[error("already performing {count} action(s); first is #{first}")]
    Busy {
        /// Number of actions in progress.
        count: usize,
        /// Correlation id of the first in-progress action.
        first: u32,
    },

    /// The action has already been sent.
    #[error("action is already running")]
    AlreadyStarted,

    /// The action has already completed.
    #[error("action already ran")]
    AlreadyCompleted,

    /// The requested transition is not valid from the current state.
    #[error("cannot {operation} an action in state {state}")]
    InvalidState {
        /// The attempted transition.
        operation: &'static str,
        /// The state the action was in.
        state: ActionState,
    },

    /// The transport refused the command.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// An event operation failed.
    #[error(transparent)]
    Event(#[from] EventError),
}

impl ActionError {
    /// Creates an invalid state error.
    pub fn invalid_state(operation: &'static str, state: ActionState) -> Self {
        Self::InvalidState { operation, state }
    }
}

/// Result type for action operations.
pub type ActionResult<T> = Result<T, ActionError>;
