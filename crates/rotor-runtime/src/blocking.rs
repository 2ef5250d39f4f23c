//! Type-checked blocking clients for foreign threads.
//!
//! Each client pairs a loop-owned object with a [`SyncBridge`] and exposes
//! the operations a synchronous caller needs, with the loop's errors and the
//! abort signal folded into [`BridgeError`].

use std::sync::Arc;
use std::time::Duration;

use rotor_core::action::{Failure, SendOptions};
use rotor_core::dispatch::DEFAULT_WAIT_TIMEOUT;
use rotor_core::{
    Action, ActionCommand, ActionDispatcher, ActionState, DispatchHandle, Dispatcher, EventError,
    EventInstance, EventKind, EventResult, Handler, HandlerTarget, WaitTarget,
};
use serde_json::{Map, Value};

use crate::bridge::SyncBridge;
use crate::error::BridgeResult;

// =============================================================================
// Dispatcher
// =============================================================================

/// Blocking access to a [`Dispatcher`].
#[derive(Debug, Clone)]
pub struct BlockingDispatcher {
    bridge: SyncBridge,
    node: Dispatcher,
    default_timeout: Duration,
}

impl BlockingDispatcher {
    /// Wraps `node` with the default wait timeout.
    pub fn new(node: Dispatcher) -> Self {
        Self {
            bridge: SyncBridge::for_object(&node),
            node,
            default_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }

    /// Sets the timeout used by waits that do not name one.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Returns the node for use on the loop thread.
    pub fn node(&self) -> &Dispatcher {
        &self.node
    }

    /// Registers a handler on the node from any thread.
    pub fn add_event_handler(
        &self,
        kind: &Arc<EventKind>,
        target: HandlerTarget,
    ) -> BridgeResult<Handler> {
        let node = self.node.clone();
        let kind = Arc::clone(kind);
        self.bridge.try_call(move || node.add_event_handler(&kind, target))
    }

    /// Removes a handler registered on the node.
    pub fn remove_event_handler(&self, handler: &Handler) -> BridgeResult<()> {
        let node = self.node.clone();
        let handler = handler.clone();
        self.bridge
            .try_call(move || node.remove_event_handler(handler.kind(), &handler))
    }

    /// Dispatches `event` and blocks until the delivery has finished.
    pub fn dispatch_event(&self, event: EventInstance) -> BridgeResult<()> {
        let node = self.node.clone();
        self.deliver(move || node.dispatch_event(event))
    }

    /// Builds an instance of `kind` from `fields`, dispatches it and blocks
    /// until the delivery has finished.
    pub fn dispatch_fields(
        &self,
        kind: &Arc<EventKind>,
        fields: Map<String, Value>,
    ) -> BridgeResult<()> {
        let node = self.node.clone();
        let kind = Arc::clone(kind);
        self.deliver(move || node.dispatch_fields(&kind, fields))
    }

    fn deliver<F>(&self, dispatch: F) -> BridgeResult<()>
    where
        F: FnOnce() -> EventResult<DispatchHandle> + Send + 'static,
    {
        if self.bridge.is_loop_thread() {
            // The delivery cannot finish while the loop is blocked here.
            dispatch()?;
            return Ok(());
        }
        self.bridge.try_run(move || async move {
            dispatch()?.finished().await;
            Ok::<_, EventError>(())
        })
    }

    /// Blocks until a matching event reaches the node.
    ///
    /// `None` uses the client's default timeout; a zero timeout waits without
    /// limit.
    pub fn wait_for(
        &self,
        target: impl Into<WaitTarget>,
        timeout: Option<Duration>,
    ) -> BridgeResult<EventInstance> {
        let node = self.node.clone();
        let target = target.into();
        let timeout = timeout.unwrap_or(self.default_timeout);
        self.bridge
            .try_run(move || async move { node.wait_for(target, Some(timeout)).await })
    }

    /// Stops the node, failing its pending waits with `Stopped`.
    pub fn stop(&self) -> BridgeResult<()> {
        let node = self.node.clone();
        self.bridge.call(move || node.stop())
    }
}

// =============================================================================
// Actions
// =============================================================================

/// Blocking access to an [`ActionDispatcher`].
#[derive(Debug, Clone)]
pub struct BlockingActionDispatcher {
    bridge: SyncBridge,
    actions: ActionDispatcher,
}

impl BlockingActionDispatcher {
    /// Wraps an action dispatcher for use from other threads.
    pub fn new(actions: ActionDispatcher) -> Self {
        Self {
            bridge: SyncBridge::for_object(&actions),
            actions,
        }
    }

    pub fn inner(&self) -> &ActionDispatcher {
        &self.actions
    }

    /// Creates an idle action on the loop.
    pub fn create_action<C>(&self, command: C) -> BridgeResult<BlockingAction>
    where
        C: ActionCommand + 'static,
    {
        let actions = self.actions.clone();
        let action = self.bridge.call(move || actions.create_action(command))?;
        Ok(BlockingAction {
            bridge: self.bridge.clone(),
            actions: self.actions.clone(),
            action,
        })
    }

    /// Sends an idle action; see [`ActionDispatcher::send`].
    pub fn send(&self, action: &BlockingAction, options: SendOptions) -> BridgeResult<()> {
        let actions = self.actions.clone();
        let action = Arc::clone(&action.action);
        self.bridge.try_call(move || actions.send(&action, options))
    }

    /// Aborts every in-progress action, returning how many there were.
    pub fn abort_all(&self) -> BridgeResult<usize> {
        let actions = self.actions.clone();
        self.bridge.try_call(move || actions.abort_all())
    }

    /// Blocks until no action is in progress or aborting.
    pub fn wait_for_all_actions_completed(&self) -> BridgeResult<()> {
        let actions = self.actions.clone();
        self.bridge
            .try_run(move || async move { actions.wait_for_all_actions_completed().await })
    }

    pub fn has_in_progress_actions(&self) -> BridgeResult<bool> {
        let actions = self.actions.clone();
        self.bridge.call(move || actions.has_in_progress_actions())
    }

    /// Feeds a decoded completion notification in from the transport thread.
    pub fn on_completion_notification(&self, id: u32, code: u32) -> BridgeResult<()> {
        let actions = self.actions.clone();
        self.bridge.call(move || {
            actions.on_completion_notification(id, code);
        })
    }
}

/// Blocking access to one [`Action`].
#[derive(Debug, Clone)]
pub struct BlockingAction {
    bridge: SyncBridge,
    actions: ActionDispatcher,
    action: Arc<Action>,
}

impl BlockingAction {
    /// Returns the action for use on the loop thread.
    pub fn action(&self) -> &Arc<Action> {
        &self.action
    }

    pub fn id(&self) -> Option<u32> {
        self.action.id()
    }

    /// Current lifecycle state; read without a round trip to the loop.
    pub fn state(&self) -> ActionState {
        self.action.state()
    }

    pub fn failure(&self) -> Option<Failure> {
        self.action.failure()
    }

    /// Requests cancellation; see [`ActionDispatcher::abort`].
    pub fn abort(&self) -> BridgeResult<()> {
        let actions = self.actions.clone();
        let action = Arc::clone(&self.action);
        self.bridge.try_call(move || actions.abort(&action))
    }

    /// Blocks until the action reaches a terminal state.
    pub fn wait_for_completed(&self, timeout: Option<Duration>) -> BridgeResult<EventInstance> {
        let action = Arc::clone(&self.action);
        self.bridge
            .try_run(move || async move { action.wait_for_completed(timeout).await })
    }
}
