//! A single remote action.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error, info};

use super::events::{ActionCompleted, ActionStarted};
use super::result::{ActionState, Completion, Failure, FailureCode, ResultCode};
use crate::dispatch::{AsDispatcher, DispatchHandle, Dispatcher, Handler, HandlerTarget};
use crate::error::{ActionError, ActionResult, EventResult};
use crate::event::EventInstance;

/// What an action sends when it is queued.
pub trait ActionCommand: Send + Sync + fmt::Debug {
    /// Action type name, e.g. `turn_in_place`.
    fn action_type(&self) -> &str;

    /// Encodes the action parameters.
    fn encode(&self) -> Value;

    /// Whether aborting this action is logged at info level.
    ///
    /// Actions that are routinely cancelled turn this off.
    fn abort_logging(&self) -> bool {
        true
    }
}

/// An [`ActionCommand`] made of a type name and a ready JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonCommand {
    action_type: String,
    payload: Value,
    abort_logging: bool,
}

impl JsonCommand {
    /// Creates a command that logs aborts.
    pub fn new(action_type: impl Into<String>, payload: Value) -> Self {
        Self {
            action_type: action_type.into(),
            payload,
            abort_logging: true,
        }
    }

    /// Turns off abort logging for this command.
    pub fn quiet_abort(mut self) -> Self {
        self.abort_logging = false;
        self
    }
}

impl ActionCommand for JsonCommand {
    fn action_type(&self) -> &str {
        &self.action_type
    }

    fn encode(&self) -> Value {
        self.payload.clone()
    }

    fn abort_logging(&self) -> bool {
        self.abort_logging
    }
}

#[derive(Default)]
struct Slot {
    state: ActionState,
    id: Option<u32>,
    completion_pending: bool,
    failure: Option<Failure>,
    completed_event: Option<EventInstance>,
}

/// One asynchronous remote operation and its lifecycle.
///
/// An action is its own dispatch node; `ActionStarted` and `ActionCompleted`
/// are dispatched on it and bubble up to its owner.
///
/// ```text
/// Idle --send--> Running --success--> Succeeded
///                   |  \--failure---> Failed
///                   \--abort--> Aborting --completion--> Failed / Succeeded
/// ```
pub struct Action {
    node: Dispatcher,
    command: Box<dyn ActionCommand>,
    slot: Mutex<Slot>,
    abort_logging: bool,
}

impl Action {
    /// Creates an idle action on its own node.
    pub fn new(
        node: Dispatcher,
        command: Box<dyn ActionCommand>,
        abort_logging: bool,
    ) -> Arc<Self> {
        let abort_logging = abort_logging && command.abort_logging();
        Arc::new(Self {
            node,
            command,
            slot: Mutex::new(Slot::default()),
            abort_logging,
        })
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Returns the current lifecycle state.
    pub fn state(&self) -> ActionState {
        self.slot.lock().state
    }

    /// Returns the correlation id, once sent.
    pub fn id(&self) -> Option<u32> {
        self.slot.lock().id
    }

    /// Returns the command's action type name.
    pub fn action_type(&self) -> &str {
        self.command.action_type()
    }

    pub fn command(&self) -> &dyn ActionCommand {
        self.command.as_ref()
    }

    /// True while sent and neither completed nor aborting.
    pub fn is_running(&self) -> bool {
        self.state() == ActionState::Running
    }

    /// True while a cancel request is outstanding.
    pub fn is_aborting(&self) -> bool {
        self.state() == ActionState::Aborting
    }

    /// True once the action has succeeded or failed.
    pub fn is_completed(&self) -> bool {
        self.state().is_terminal()
    }

    /// True once the device reported success.
    pub fn has_succeeded(&self) -> bool {
        self.state() == ActionState::Succeeded
    }

    /// True once the action failed, including after an abort.
    pub fn has_failed(&self) -> bool {
        self.state() == ActionState::Failed
    }

    /// Returns the failure code and reason, if the action failed.
    pub fn failure(&self) -> Option<Failure> {
        self.slot.lock().failure.clone()
    }

    /// Returns the `ActionCompleted` instance, once terminal.
    pub fn completed_event(&self) -> Option<EventInstance> {
        self.slot.lock().completed_event.clone()
    }

    pub(crate) fn abort_logging(&self) -> bool {
        self.abort_logging
    }

    pub(crate) fn is_completion_pending(&self) -> bool {
        self.slot.lock().completion_pending
    }

    pub(crate) fn mark_completion_pending(&self) {
        self.slot.lock().completion_pending = true;
    }

    // ------------------------------------------------------------------------
    // Lifecycle hooks
    // ------------------------------------------------------------------------

    /// Idle to Running under correlation id `id`; dispatches `ActionStarted`.
    ///
    /// On error the action is left idle without an id.
    pub fn start(&self, id: u32) -> ActionResult<DispatchHandle> {
        let event = EventInstance::from_typed(
            self.node.registry(),
            &ActionStarted {
                action_id: Some(id),
                action_type: Some(self.action_type().to_string()),
            },
        )?;
        {
            let mut slot = self.slot.lock();
            if slot.state != ActionState::Idle {
                return Err(ActionError::invalid_state("start", slot.state));
            }
            slot.state = ActionState::Running;
            slot.id = Some(id);
        }
        self.node.dispatch_event(event).map_err(|e| {
            let mut slot = self.slot.lock();
            slot.state = ActionState::Idle;
            slot.id = None;
            ActionError::from(e)
        })
    }

    /// Running or Aborting to Succeeded; dispatches `ActionCompleted`.
    pub fn succeed(&self) -> ActionResult<DispatchHandle> {
        self.finish("succeed", None, None)
    }

    /// Running or Aborting to Failed; dispatches `ActionCompleted`.
    pub fn fail(
        &self,
        code: FailureCode,
        reason: impl Into<String>,
    ) -> ActionResult<DispatchHandle> {
        let failure = Failure {
            code,
            reason: reason.into(),
        };
        self.finish("fail", Some(failure), None)
    }

    /// Running to Aborting.
    pub fn request_abort(&self) -> ActionResult<()> {
        let mut slot = self.slot.lock();
        if slot.state != ActionState::Running {
            return Err(ActionError::invalid_state("abort", slot.state));
        }
        slot.state = ActionState::Aborting;
        drop(slot);

        if self.abort_logging {
            info!(action = ?self, "Aborting action");
        }
        Ok(())
    }

    /// Applies a completion notification.
    pub(crate) fn complete(&self, code: ResultCode) -> ActionResult<DispatchHandle> {
        match code.classify() {
            Completion::Succeeded => self.finish("succeed", None, Some(code)),
            Completion::Failed(failure) => {
                if failure == FailureCode::Unknown {
                    error!(action = ?self, result_code = %code, "Unknown action result");
                }
                let failure = Failure {
                    code: failure,
                    reason: failure.reason().to_string(),
                };
                self.finish("fail", Some(failure), Some(code))
            }
        }
    }

    fn finish(
        &self,
        operation: &'static str,
        failure: Option<Failure>,
        result_code: Option<ResultCode>,
    ) -> ActionResult<DispatchHandle> {
        let (id, state, event) = {
            let mut slot = self.slot.lock();
            if !matches!(slot.state, ActionState::Running | ActionState::Aborting) {
                return Err(ActionError::invalid_state(operation, slot.state));
            }
            let state = if failure.is_some() {
                ActionState::Failed
            } else {
                ActionState::Succeeded
            };
            let event = ActionCompleted {
                action_id: slot.id,
                action_type: Some(self.action_type().to_string()),
                state: Some(state),
                failure_code: failure.as_ref().map(|f| f.code),
                failure_reason: failure.as_ref().map(|f| f.reason.clone()),
                result_code,
            };
            let instance = EventInstance::from_typed(self.node.registry(), &event)?;
            slot.state = state;
            slot.failure = failure;
            slot.completion_pending = false;
            slot.completed_event = Some(instance.clone());
            (slot.id, state, instance)
        };
        debug!(action_id = ?id, %state, "Action completed");
        Ok(self.node.dispatch_event(event)?)
    }

    // ------------------------------------------------------------------------
    // Waiting
    // ------------------------------------------------------------------------

    /// Waits for the action to succeed or fail.
    ///
    /// Returns the stored `ActionCompleted` instance right away when the action
    /// is already terminal.
    pub async fn wait_for_completed(
        &self,
        timeout: Option<Duration>,
    ) -> EventResult<EventInstance> {
        if let Some(event) = self.completed_event() {
            return Ok(event);
        }
        let kind = self.node.kind_of::<ActionCompleted>()?;
        let wait = self.node.wait_for(&kind, timeout);
        tokio::pin!(wait);

        // The first poll registers the wait; completion may have landed just before.
        if let Poll::Ready(result) = futures::poll!(&mut wait) {
            return result;
        }
        if let Some(event) = self.completed_event() {
            return Ok(event);
        }
        wait.await
    }

    /// Registers a handler for this action's completion.
    pub fn on_completed(&self, target: HandlerTarget) -> EventResult<Handler> {
        let kind = self.node.kind_of::<ActionCompleted>()?;
        self.node.add_event_handler(&kind, target)
    }
}

impl Deref for Action {
    type Target = Dispatcher;

    fn deref(&self) -> &Self::Target {
        &self.node
    }
}

impl AsDispatcher for Action {
    fn dispatcher(&self) -> &Dispatcher {
        &self.node
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.lock();
        write!(f, "<Action type={} state={}", self.action_type(), slot.state)?;
        if let Some(id) = slot.id {
            write!(f, " id={id}")?;
        }
        if let Some(failure) = &slot.failure {
            write!(
                f,
                " failure_reason={:?} failure_code={}",
                failure.reason, failure.code
            )?;
        }
        write!(f, ">")
    }
}
