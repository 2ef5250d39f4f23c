//! Runtime error types.

use rotor_core::{AbortReason, ActionError, EventError};
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while starting or running the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The event registry rejected a kind.
    #[error("Failed to register event kinds: {0}")]
    Registry(#[from] EventError),

    /// The event loop thread or its runtime could not be created.
    #[error("Failed to start event loop: {0}")]
    EventLoop(#[source] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors surfaced to a caller blocked on the event loop.
#[derive(Error, Debug, Clone)]
pub enum BridgeError {
    /// The abort signal fired before the loop answered.
    #[error("Bridged call aborted: {0}")]
    Aborted(AbortReason),

    /// A suspending operation was invoked on the loop thread itself.
    #[error("Cannot block on the event loop from its own thread")]
    OnLoopThread,

    /// The loop shut down before answering.
    #[error("Event loop closed before the call completed")]
    LoopClosed,

    /// The operation failed on the loop.
    #[error(transparent)]
    Event(EventError),

    /// The action operation failed on the loop.
    #[error(transparent)]
    Action(ActionError),

    /// The task running the call on the loop panicked.
    #[error("Task on the event loop failed: {0}")]
    Spawn(String),
}

impl BridgeError {
    /// Returns the abort reason if the call was cut short by an abort.
    pub fn abort_reason(&self) -> Option<&AbortReason> {
        match self {
            Self::Aborted(reason)
            | Self::Event(EventError::Aborted(reason))
            | Self::Action(ActionError::Event(EventError::Aborted(reason))) => Some(reason),
            _ => None,
        }
    }
}

// A wait that fails because of the abort signal reports the same error as a
// blocked call cut short by it.
impl From<EventError> for BridgeError {
    fn from(err: EventError) -> Self {
        match err {
            EventError::Aborted(reason) => Self::Aborted(reason),
            other => Self::Event(other),
        }
    }
}

impl From<ActionError> for BridgeError {
    fn from(err: ActionError) -> Self {
        match err {
            ActionError::Event(err) => err.into(),
            other => Self::Action(other),
        }
    }
}

impl From<AbortReason> for BridgeError {
    fn from(reason: AbortReason) -> Self {
        Self::Aborted(reason)
    }
}

/// Result type for bridged calls.
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aborted_wait_flattens() {
        let reason = AbortReason::ConnectionAborted("reset".into());
        let err: BridgeError = EventError::Aborted(reason.clone()).into();
        assert!(matches!(err, BridgeError::Aborted(_)));
        assert_eq!(err.abort_reason(), Some(&reason));

        let err: BridgeError =
            ActionError::Event(EventError::Aborted(AbortReason::Shutdown)).into();
        assert_eq!(err.abort_reason(), Some(&AbortReason::Shutdown));
    }

    #[test]
    fn test_other_errors_kept() {
        let err: BridgeError = ActionError::AlreadyStarted.into();
        assert!(matches!(err, BridgeError::Action(ActionError::AlreadyStarted)));
        assert_eq!(err.abort_reason(), None);
    }
}
