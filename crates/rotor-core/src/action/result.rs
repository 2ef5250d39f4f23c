//! Action states and completion results.
//!
//! A completion notification carries a numeric result code laid out as
//! `category << 24 | detail`. Well-known codes map to a named failure code;
//! anything else falls back to its category.

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Action State
// ============================================================================

/// Lifecycle state of an [`Action`](super::Action).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ActionState {
    /// Created, not yet sent.
    #[default]
    #[serde(rename = "action_idle")]
    Idle,
    /// Sent and awaiting its completion notification.
    #[serde(rename = "action_running")]
    Running,
    /// Completed successfully.
    #[serde(rename = "action_succeeded")]
    Succeeded,
    /// Completed with a failure.
    #[serde(rename = "action_failed")]
    Failed,
    /// Cancellation requested, completion notification pending.
    #[serde(rename = "action_aborting")]
    Aborting,
}

impl ActionState {
    /// Returns the state name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "action_idle",
            Self::Running => "action_running",
            Self::Succeeded => "action_succeeded",
            Self::Failed => "action_failed",
            Self::Aborting => "action_aborting",
        }
    }

    /// Returns true for `Succeeded` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for ActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Result Codes
// ============================================================================

/// Coarse outcome category, the high byte of a [`ResultCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCategory {
    /// The action succeeded.
    Success,
    /// The action is still running.
    Running,
    /// The action failed but may be retried.
    Retry,
    /// The action failed and will not be retried.
    Abort,
}

/// A numeric completion result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultCode(u32);

impl ResultCode {
    pub const SUCCESS: Self = Self(0);
    pub const RUNNING: Self = Self(0x0100_0000);
    pub const RETRY: Self = Self(0x0200_0000);
    pub const INTERRUPTED: Self = Self(0x0200_0001);
    pub const ABORT: Self = Self(0x0300_0000);
    pub const CANCELLED: Self = Self(0x0300_0001);
    pub const TIMEOUT: Self = Self(0x0300_0002);

    /// Wraps a raw code.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Builds a code from its category byte and detail bits.
    pub const fn from_parts(category: u8, detail: u32) -> Self {
        Self(((category as u32) << 24) | (detail & 0x00FF_FFFF))
    }

    /// Returns the raw code.
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns the detail bits.
    pub const fn detail(self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns the category, or `None` for an unassigned high byte.
    pub fn category(self) -> Option<ResultCategory> {
        match self.0 >> 24 {
            0 => Some(ResultCategory::Success),
            1 => Some(ResultCategory::Running),
            2 => Some(ResultCategory::Retry),
            3 => Some(ResultCategory::Abort),
            _ => None,
        }
    }

    /// Maps the code to the terminal outcome of an action.
    pub fn classify(self) -> Completion {
        match self {
            Self::SUCCESS => Completion::Succeeded,
            Self::CANCELLED => Completion::Failed(FailureCode::Cancelled),
            Self::TIMEOUT => Completion::Failed(FailureCode::Timeout),
            Self::INTERRUPTED => Completion::Failed(FailureCode::Interrupted),
            _ => match self.category() {
                Some(ResultCategory::Success) => Completion::Succeeded,
                Some(ResultCategory::Retry) => Completion::Failed(FailureCode::RetryableFailure),
                Some(ResultCategory::Abort) => Completion::Failed(FailureCode::FatalFailure),
                Some(ResultCategory::Running) | None => Completion::Failed(FailureCode::Unknown),
            },
        }
    }
}

impl From<u32> for ResultCode {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

// ============================================================================
// Failure Codes
// ============================================================================

/// Why an action failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureCode {
    Cancelled,
    Timeout,
    Interrupted,
    RetryableFailure,
    FatalFailure,
    Unknown,
}

impl FailureCode {
    /// Returns the code name, e.g. `retryable-failure`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
            Self::Interrupted => "interrupted",
            Self::RetryableFailure => "retryable-failure",
            Self::FatalFailure => "fatal-failure",
            Self::Unknown => "unknown",
        }
    }

    /// Returns a human-readable reason.
    pub fn reason(self) -> &'static str {
        match self {
            Self::Cancelled => "Action was cancelled",
            Self::Timeout => "The action timed out",
            Self::Interrupted => "Action was interrupted",
            Self::RetryableFailure => "Action failed but may be retried",
            Self::FatalFailure => "Action failed and will not be retried",
            Self::Unknown => "Action failed with unknown reason",
        }
    }
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure code with its reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub code: FailureCode,
    pub reason: String,
}

/// Terminal outcome of a completion notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Succeeded,
    Failed(FailureCode),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes() {
        assert_eq!(ResultCode::SUCCESS.classify(), Completion::Succeeded);
        assert_eq!(
            ResultCode::CANCELLED.classify(),
            Completion::Failed(FailureCode::Cancelled)
        );
        assert_eq!(
            ResultCode::TIMEOUT.classify(),
            Completion::Failed(FailureCode::Timeout)
        );
        assert_eq!(
            ResultCode::INTERRUPTED.classify(),
            Completion::Failed(FailureCode::Interrupted)
        );
    }

    #[test]
    fn test_category_fallback() {
        assert_eq!(
            ResultCode::from_parts(2, 0x42).classify(),
            Completion::Failed(FailureCode::RetryableFailure)
        );
        assert_eq!(
            ResultCode::from_parts(3, 0x42).classify(),
            Completion::Failed(FailureCode::FatalFailure)
        );
        assert_eq!(ResultCode::from_parts(0, 7).classify(), Completion::Succeeded);
        assert_eq!(
            ResultCode::RUNNING.classify(),
            Completion::Failed(FailureCode::Unknown)
        );
        assert_eq!(
            ResultCode::new(0x0900_0000).classify(),
            Completion::Failed(FailureCode::Unknown)
        );
    }

    #[test]
    fn test_state_names() {
        assert_eq!(ActionState::Aborting.to_string(), "action_aborting");
        assert_eq!(
            serde_json::to_value(ActionState::Succeeded).unwrap(),
            serde_json::json!("action_succeeded")
        );
        assert_eq!(FailureCode::RetryableFailure.to_string(), "retryable-failure");
        assert_eq!(ResultCode::CANCELLED.to_string(), "0x03000001");
    }
}
