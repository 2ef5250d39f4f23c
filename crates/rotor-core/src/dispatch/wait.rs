//! Waiting for events.
//!
//! [`Dispatcher::wait_for`] suspends the calling task until the node receives
//! a matching event. The wait is backed by a oneshot result-slot handler that
//! is removed again when the wait resolves, times out, fails or is dropped.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::select_all;
use tracing::debug;

use super::dispatcher::Dispatcher;
use super::handler::{Handler, HandlerTarget};
use crate::error::{EventError, EventResult};
use crate::event::{EventInstance, EventKind, Filter};

/// Wait timeout used by the blocking clients when none is given.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// What a wait resolves on: any instance of a kind, or a filtered one.
#[derive(Debug, Clone)]
pub enum WaitTarget {
    /// Any instance of the kind or a descendant.
    Kind(Arc<EventKind>),
    /// Instances passing the filter.
    Filter(Filter),
}

impl WaitTarget {
    /// Returns the kind waited for.
    pub fn kind(&self) -> &Arc<EventKind> {
        match self {
            Self::Kind(kind) => kind,
            Self::Filter(filter) => filter.kind(),
        }
    }
}

impl From<Arc<EventKind>> for WaitTarget {
    fn from(kind: Arc<EventKind>) -> Self {
        Self::Kind(kind)
    }
}

impl From<&Arc<EventKind>> for WaitTarget {
    fn from(kind: &Arc<EventKind>) -> Self {
        Self::Kind(Arc::clone(kind))
    }
}

impl From<Filter> for WaitTarget {
    fn from(filter: Filter) -> Self {
        Self::Filter(filter)
    }
}

/// Removes the slot handler however the wait ends.
struct Registration(Handler);

impl Drop for Registration {
    fn drop(&mut self) {
        // A slot that fired has already removed itself.
        let _ = self.0.disable();
    }
}

impl Dispatcher {
    /// Waits for the next matching event delivered to this node.
    ///
    /// `None` or a zero `timeout` waits without limit.
    ///
    /// # Errors
    ///
    /// - [`EventError::Timeout`] if nothing matches within `timeout`
    /// - [`EventError::Aborted`] if the loop's abort signal fires first
    /// - [`EventError::Stopped`] if the node is or becomes stopped
    /// - [`EventError::InvalidKind`] if the kind is foreign to this node
    pub async fn wait_for(
        &self,
        target: impl Into<WaitTarget>,
        timeout: Option<Duration>,
    ) -> EventResult<EventInstance> {
        let target = target.into();
        let kind = Arc::clone(target.kind());

        let (mut slot, rx) = HandlerTarget::slot();
        if let WaitTarget::Filter(filter) = target {
            slot = slot.filtered(filter);
        }
        let _registration = Registration(self.add_event_handler(&kind, slot)?);

        let abort = self.context().abort_signal();
        let deadline = async {
            match timeout.filter(|t| !t.is_zero()) {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            reason = abort.aborted() => Err(EventError::Aborted(reason)),
            received = rx => received.map_err(|_| self.stopped_error()),
            () = deadline => {
                debug!(node = %self.name(), kind = %kind.name(), ?timeout, "Wait timed out");
                Err(EventError::Timeout {
                    kind: kind.name().to_string(),
                })
            }
        }
    }
}

/// Resolves with the output of whichever future completes first.
///
/// The remaining futures are dropped, which deregisters any waits among
/// them. Returns `None` for an empty set.
///
/// ```rust,ignore
/// let first = wait_for_first([
///     world.wait_for(&cube_seen, None).boxed(),
///     anim.wait_for(&anim_completed, None).boxed(),
/// ])
/// .await;
/// ```
pub async fn wait_for_first<I, F>(futures: I) -> Option<F::Output>
where
    I: IntoIterator<Item = F>,
    F: Future,
{
    let futures: Vec<_> = futures.into_iter().map(Box::pin).collect();
    if futures.is_empty() {
        return None;
    }
    let (output, index, rest) = select_all(futures).await;
    debug!(index, discarded = rest.len(), "First wait completed");
    Some(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AbortReason;
    use crate::testing::test_context;
    use futures::FutureExt;
    use serde_json::json;
    use tokio_test::{assert_pending, task};

    #[tokio::test]
    async fn test_child_wait_resolves_on_parent_dispatch() {
        let ctx = test_context();
        let one = ctx.registry().kind("EvtOne").unwrap();
        let a = Dispatcher::with_name(Arc::clone(&ctx), "a", None);
        let b = a.new_child("b");

        let waiter = {
            let b = b.clone();
            let one = Arc::clone(&one);
            tokio::spawn(async move { b.wait_for(&one, Some(Duration::from_secs(1))).await })
        };
        tokio::task::yield_now().await;

        a.dispatch_fields(&one, [("param1", json!(1))]).unwrap().await;

        let evt = waiter.await.unwrap().unwrap();
        assert_eq!(evt.get("param1"), Some(&json!(1)));
        assert_eq!(b.handler_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out() {
        let ctx = test_context();
        let one = ctx.registry().kind("EvtOne").unwrap();
        let node = Dispatcher::new(Arc::clone(&ctx), None);

        let err = node
            .wait_for(&one, Some(Duration::from_millis(200)))
            .await
            .unwrap_err();

        assert!(matches!(err, EventError::Timeout { kind } if kind == "EvtOne"));
        assert_eq!(node.handler_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_waits_without_limit() {
        let ctx = test_context();
        let one = ctx.registry().kind("EvtOne").unwrap();
        let node = Dispatcher::new(Arc::clone(&ctx), None);

        let waiter = {
            let node = node.clone();
            let one = Arc::clone(&one);
            tokio::spawn(async move { node.wait_for(&one, Some(Duration::ZERO)).await })
        };
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(!waiter.is_finished());

        node.dispatch_fields(&one, [("param1", json!(5))]).unwrap().await;
        let evt = waiter.await.unwrap().unwrap();
        assert_eq!(evt.get("param1"), Some(&json!(5)));
    }

    #[tokio::test]
    async fn test_filtered_wait_skips_non_matching() {
        let ctx = test_context();
        let one = ctx.registry().kind("EvtOne").unwrap();
        let node = Dispatcher::new(Arc::clone(&ctx), None);

        let filter = Filter::new(&one).equals("param1", "b").unwrap();
        let waiter = {
            let node = node.clone();
            tokio::spawn(async move { node.wait_for(filter, None).await })
        };
        tokio::task::yield_now().await;

        node.dispatch_fields(&one, [("param1", json!("a"))]).unwrap().await;
        assert!(!waiter.is_finished());
        node.dispatch_fields(&one, [("param1", json!("b"))]).unwrap().await;

        let evt = waiter.await.unwrap().unwrap();
        assert_eq!(evt.get("param1"), Some(&json!("b")));
    }

    #[tokio::test]
    async fn test_abort_fails_pending_waits() {
        let ctx = test_context();
        let one = ctx.registry().kind("EvtOne").unwrap();
        let node = Dispatcher::new(Arc::clone(&ctx), None);

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let node = node.clone();
                let one = Arc::clone(&one);
                tokio::spawn(async move { node.wait_for(&one, None).await })
            })
            .collect();
        tokio::task::yield_now().await;
        assert_eq!(node.handler_count(), 3);

        ctx.abort(AbortReason::ConnectionAborted("socket closed".into()));

        for waiter in waiters {
            let err = waiter.await.unwrap().unwrap_err();
            assert!(matches!(
                err,
                EventError::Aborted(AbortReason::ConnectionAborted(ref msg)) if msg == "socket closed"
            ));
        }
        assert_eq!(node.handler_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_wait_deregisters() {
        let ctx = test_context();
        let one = ctx.registry().kind("EvtOne").unwrap();
        let node = Dispatcher::new(Arc::clone(&ctx), None);

        let mut wait = task::spawn(node.wait_for(&one, None));
        assert_pending!(wait.poll());
        assert_eq!(node.handler_count(), 1);

        drop(wait);
        assert_eq!(node.handler_count(), 0);
    }

    #[tokio::test]
    async fn test_wait_on_stopped_node() {
        let ctx = test_context();
        let one = ctx.registry().kind("EvtOne").unwrap();
        let node = Dispatcher::new(Arc::clone(&ctx), None);

        let waiter = {
            let node = node.clone();
            let one = Arc::clone(&one);
            tokio::spawn(async move { node.wait_for(&one, None).await })
        };
        tokio::task::yield_now().await;
        node.stop();

        assert!(matches!(
            waiter.await.unwrap(),
            Err(EventError::Stopped { .. })
        ));
        assert!(matches!(
            node.wait_for(&one, None).await,
            Err(EventError::Stopped { .. })
        ));
    }

    #[tokio::test]
    async fn test_wait_for_first() {
        let ctx = test_context();
        let one = ctx.registry().kind("EvtOne").unwrap();
        let two = ctx.registry().kind("EvtTwo").unwrap();
        let node = Dispatcher::new(Arc::clone(&ctx), None);

        let waiter = {
            let node = node.clone();
            let (one, two) = (Arc::clone(&one), Arc::clone(&two));
            tokio::spawn(async move {
                wait_for_first([
                    node.wait_for(&one, None).boxed(),
                    node.wait_for(&two, None).boxed(),
                ])
                .await
            })
        };
        tokio::task::yield_now().await;
        assert_eq!(node.handler_count(), 2);

        node.dispatch_event(EventInstance::empty(two)).unwrap().await;

        let evt = waiter.await.unwrap().unwrap().unwrap();
        assert_eq!(evt.name(), "EvtTwo");
        assert_eq!(node.handler_count(), 0);
    }

    #[tokio::test]
    async fn test_wait_for_first_empty() {
        let none: Vec<futures::future::Ready<u8>> = Vec::new();
        assert_eq!(wait_for_first(none).await, None);
    }
}
