//! The global abort signal.
//!
//! One signal per [`LoopContext`](super::LoopContext). Triggering it wakes
//! every pending wait on the loop and every foreign thread blocked in the
//! bridge; all of them observe the same [`AbortReason`].

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::AbortReason;

/// A one-shot broadcast of an [`AbortReason`].
#[derive(Debug, Default)]
pub struct AbortSignal {
    token: CancellationToken,
    reason: Mutex<Option<AbortReason>>,
}

impl AbortSignal {
    /// Creates an untriggered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the signal. The first reason wins; later calls return false.
    pub fn trigger(&self, reason: AbortReason) -> bool {
        {
            let mut slot = self.reason.lock();
            if slot.is_some() {
                return false;
            }
            info!(%reason, "Abort signal triggered");
            *slot = Some(reason);
        }
        self.token.cancel();
        true
    }

    /// Returns true once the signal has fired.
    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns the reason, if the signal has fired.
    pub fn reason(&self) -> Option<AbortReason> {
        self.reason.lock().clone()
    }

    /// Completes with the reason once the signal fires.
    pub async fn aborted(&self) -> AbortReason {
        self.token.cancelled().await;
        self.reason().unwrap_or(AbortReason::Shutdown)
    }

    /// Returns a child token cancelled together with this signal.
    pub fn token(&self) -> CancellationToken {
        self.token.child_token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready_eq, task};

    #[test]
    fn test_first_reason_wins() {
        let signal = AbortSignal::new();
        assert!(signal.trigger(AbortReason::ConnectionAborted("link lost".into())));
        assert!(!signal.trigger(AbortReason::Shutdown));
        assert_eq!(
            signal.reason(),
            Some(AbortReason::ConnectionAborted("link lost".into()))
        );
    }

    #[test]
    fn test_aborted_wakes_on_trigger() {
        let signal = AbortSignal::new();
        let mut waiter = task::spawn(signal.aborted());
        assert_pending!(waiter.poll());

        signal.trigger(AbortReason::Shutdown);
        assert!(waiter.is_woken());
        assert_ready_eq!(waiter.poll(), AbortReason::Shutdown);
    }
}
