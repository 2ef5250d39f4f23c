//! Per-owner action bookkeeping.
//!
//! An [`ActionDispatcher`] sends actions for one owner, correlates completion
//! notifications with them by id and enforces that at most one non-parallel
//! action is in progress at a time.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{Instrument, debug, debug_span, error, info, trace, warn};

use super::action::{Action, ActionCommand};
use super::events::{ActionCompleted, ActionStarted, MsgActionResult};
use super::result::{ActionState, ResultCode};
use super::tags::{TagAllocator, TagClass, TagLayout};
use crate::dispatch::{AsDispatcher, DispatchHandle, Dispatcher, ReceiverTable};
use crate::error::{ActionError, ActionResult, EventResult};
use crate::event::{TypedEvent, handler_method_name};
use crate::transport::{Command, Transport};

/// Options for [`ActionDispatcher::send`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Run alongside in-progress actions instead of requiring exclusivity.
    pub in_parallel: bool,
    /// How often the device may retry the action.
    pub num_retries: u8,
}

impl SendOptions {
    /// Options for an action that runs alongside others.
    pub fn parallel() -> Self {
        Self {
            in_parallel: true,
            ..Self::default()
        }
    }

    /// Sets the number of device-side retries.
    pub fn retries(mut self, num_retries: u8) -> Self {
        self.num_retries = num_retries;
        self
    }
}

/// Action dispatcher settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSettings {
    /// Local and remote correlation id ranges.
    pub tags: TagLayout,
    /// Log aborts at info level; individual commands may still opt out.
    pub abort_logging: bool,
}

impl Default for ActionSettings {
    fn default() -> Self {
        Self {
            tags: TagLayout::default(),
            abort_logging: true,
        }
    }
}

#[derive(Default)]
struct ActionTable {
    in_progress: BTreeMap<u32, Arc<Action>>,
    aborting: BTreeMap<u32, Arc<Action>>,
}

struct Shared {
    node: Dispatcher,
    owner: Dispatcher,
    transport: Arc<dyn Transport>,
    tags: TagAllocator,
    layout: TagLayout,
    abort_logging: bool,
    table: Mutex<ActionTable>,
}

/// Sends actions for one owner and tracks them until completion.
///
/// The dispatcher is a child node of its owner, so a `MsgActionResult`
/// dispatched on the owner reaches it and is routed to
/// [`on_completion_notification`](Self::on_completion_notification).
#[derive(Clone)]
pub struct ActionDispatcher {
    shared: Arc<Shared>,
}

impl ActionDispatcher {
    /// Creates a dispatcher for `owner` with default settings.
    pub fn new(owner: &Dispatcher, transport: Arc<dyn Transport>) -> EventResult<Self> {
        Self::with_settings(owner, transport, ActionSettings::default())
    }

    /// Creates a dispatcher for `owner`.
    ///
    /// # Errors
    ///
    /// [`EventError::InvalidKind`](crate::error::EventError::InvalidKind) if
    /// the owner's registry lacks `ActionStarted`, `ActionCompleted` or
    /// `MsgActionResult`; see [`register_core_kinds`](super::register_core_kinds).
    pub fn with_settings(
        owner: &Dispatcher,
        transport: Arc<dyn Transport>,
        settings: ActionSettings,
    ) -> EventResult<Self> {
        let registry = owner.registry();
        registry.kind_of::<ActionStarted>()?;
        registry.kind_of::<ActionCompleted>()?;
        registry.kind_of::<MsgActionResult>()?;

        let node = owner.new_child(format!("{}/actions", owner.name()));
        let shared = Arc::new(Shared {
            node,
            owner: owner.clone(),
            transport,
            tags: TagAllocator::new(settings.tags.local),
            layout: settings.tags,
            abort_logging: settings.abort_logging,
            table: Mutex::new(ActionTable::default()),
        });

        let weak: Weak<Shared> = Arc::downgrade(&shared);
        shared.node.set_receivers(ReceiverTable::new().on(
            handler_method_name(MsgActionResult::NAME, MsgActionResult::INTERNAL),
            move |evt| {
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                match evt.extract::<MsgActionResult>() {
                    Some(MsgActionResult {
                        id_tag: Some(id),
                        result_code: Some(code),
                    }) => {
                        shared.on_completion_notification(id, code);
                    }
                    _ => warn!(?evt, "Malformed action result, dropping"),
                }
            },
        ));

        Ok(Self { shared })
    }

    /// Returns the owner node.
    pub fn owner(&self) -> &Dispatcher {
        &self.shared.owner
    }

    /// Creates an idle action whose events bubble up to the owner.
    pub fn create_action(&self, command: impl ActionCommand + 'static) -> Arc<Action> {
        let owner = &self.shared.owner;
        let node = Dispatcher::with_name(
            Arc::clone(owner.context()),
            format!("{}/{}", owner.name(), command.action_type()),
            Some(owner),
        );
        Action::new(node, Box::new(command), self.shared.abort_logging)
    }

    // ------------------------------------------------------------------------
    // Sending and aborting
    // ------------------------------------------------------------------------

    /// Sends an idle action.
    ///
    /// # Errors
    ///
    /// - [`ActionError::Busy`] if the action is not parallel and another
    ///   action is in progress; nothing changes and no id is consumed
    /// - [`ActionError::AlreadyStarted`] / [`ActionError::AlreadyCompleted`]
    ///   if the action has left the idle state
    /// - [`ActionError::Transport`] if the command could not be sent; the
    ///   action stays idle
    /// - [`ActionError::Event`] if the action's registry lacks the core
    ///   kinds; nothing is sent
    pub fn send(&self, action: &Arc<Action>, options: SendOptions) -> ActionResult<()> {
        let shared = &self.shared;
        action.kind_of::<ActionStarted>()?;
        let id = {
            let mut table = shared.table.lock();
            if !options.in_parallel
                && let Some(first) = table.in_progress.keys().next()
            {
                return Err(ActionError::Busy {
                    count: table.in_progress.len(),
                    first: *first,
                });
            }
            match action.state() {
                ActionState::Idle => {}
                ActionState::Running | ActionState::Aborting => {
                    return Err(ActionError::AlreadyStarted);
                }
                ActionState::Succeeded | ActionState::Failed => {
                    return Err(ActionError::AlreadyCompleted);
                }
            }
            let id = shared.tags.next_id();
            table.in_progress.insert(id, Arc::clone(action));
            id
        };

        let command = Command::QueueAction {
            id_tag: id,
            num_retries: options.num_retries,
            in_parallel: options.in_parallel,
            action_type: action.action_type().to_string(),
            payload: action.command().encode(),
        };
        if let Err(e) = shared.transport.send(command) {
            shared.table.lock().in_progress.remove(&id);
            warn!(action_id = id, error = %e, "Failed to queue action");
            return Err(e.into());
        }

        debug!(
            action_id = id,
            action_type = action.action_type(),
            ?options,
            "Action queued"
        );
        if let Err(e) = action.start(id) {
            shared.table.lock().in_progress.remove(&id);
            return Err(e);
        }
        Ok(())
    }

    /// Requests cancellation of a running action.
    ///
    /// Aborting an action that is already aborting does nothing. If the
    /// action's completion notification has already arrived and is only
    /// waiting to be delivered, nothing changes and no cancel is sent.
    pub fn abort(&self, action: &Arc<Action>) -> ActionResult<()> {
        let shared = &self.shared;
        let id = {
            let mut table = shared.table.lock();
            match action.state() {
                ActionState::Running => {}
                ActionState::Aborting => {
                    debug!(?action, "Action already aborting");
                    return Ok(());
                }
                state => return Err(ActionError::invalid_state("abort", state)),
            }
            if action.is_completion_pending() {
                debug!(?action, "Completion already received, not aborting");
                return Ok(());
            }
            let Some(id) = action.id() else {
                return Err(ActionError::invalid_state("abort", action.state()));
            };
            action.request_abort()?;
            table.in_progress.remove(&id);
            table.aborting.insert(id, Arc::clone(action));
            id
        };

        shared.transport.send(Command::CancelAction { id_tag: id })?;
        Ok(())
    }

    /// Aborts every in-progress action with a single wildcard cancel.
    ///
    /// Returns the number of actions moved to aborting.
    pub fn abort_all(&self) -> ActionResult<usize> {
        let shared = &self.shared;
        let count = {
            let mut table = shared.table.lock();
            let actions = std::mem::take(&mut table.in_progress);
            let count = actions.len();
            for (id, action) in actions {
                if let Err(e) = action.request_abort() {
                    warn!(action_id = id, error = %e, "Could not mark action aborting");
                }
                table.aborting.insert(id, action);
            }
            count
        };

        info!(count, "Sending abort request for all actions");
        shared.transport.send(Command::CancelAll)?;
        Ok(count)
    }

    // ------------------------------------------------------------------------
    // Completion
    // ------------------------------------------------------------------------

    /// Correlates a completion notification with its action.
    ///
    /// The action is removed from the tables immediately; its terminal state
    /// is applied by a task on the loop. The returned handle completes once
    /// the `ActionCompleted` event has been delivered.
    pub fn on_completion_notification(
        &self,
        id: u32,
        code: impl Into<ResultCode>,
    ) -> DispatchHandle {
        self.shared.on_completion_notification(id, code.into())
    }

    /// Waits until no action is in progress or aborting.
    pub async fn wait_for_all_actions_completed(&self) -> EventResult<()> {
        loop {
            let next = {
                let table = self.shared.table.lock();
                table
                    .in_progress
                    .values()
                    .next()
                    .or_else(|| table.aborting.values().next())
                    .cloned()
            };
            match next {
                Some(action) => {
                    action.wait_for_completed(None).await?;
                }
                None => return Ok(()),
            }
        }
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    /// Actions sent and not yet completed or aborting, in id order.
    pub fn in_progress_actions(&self) -> Vec<Arc<Action>> {
        self.shared.table.lock().in_progress.values().cloned().collect()
    }

    /// Actions with a cancel request outstanding, in id order.
    pub fn aborting_actions(&self) -> Vec<Arc<Action>> {
        self.shared.table.lock().aborting.values().cloned().collect()
    }

    /// True if any sent action has neither completed nor been aborted.
    pub fn has_in_progress_actions(&self) -> bool {
        !self.shared.table.lock().in_progress.is_empty()
    }

    /// Stops the dispatcher's node.
    pub fn stop(&self) {
        self.shared.node.stop();
    }
}

impl Shared {
    fn on_completion_notification(&self, id: u32, code: ResultCode) -> DispatchHandle {
        let class = self.layout.classify(id);
        if class == TagClass::Unknown {
            warn!(
                action_id = id,
                result_code = %code,
                "Completion for an id outside every known range, dropping"
            );
            return DispatchHandle::skipped();
        }

        let (action, was_aborting) = {
            let mut table = self.table.lock();
            let found = match table.in_progress.remove(&id) {
                Some(action) => Some((action, false)),
                None => table.aborting.remove(&id).map(|action| (action, true)),
            };
            let Some((action, was_aborting)) = found else {
                drop(table);
                if class == TagClass::Local {
                    error!(action_id = id, "Completion for unknown local action");
                } else {
                    trace!(action_id = id, "Completion for remote action");
                }
                return DispatchHandle::skipped();
            };
            action.mark_completion_pending();
            (action, was_aborting)
        };

        if class == TagClass::Remote {
            error!(
                action_id = id,
                was_aborting,
                "Completion under a remote id for a known action"
            );
        }
        if !was_aborting {
            debug!(?action, result_code = %code, "Completion for in-progress action");
        } else if action.abort_logging() {
            debug!(?action, result_code = %code, "Completion for aborted action");
        }

        let span = debug_span!("action_completed", action_id = id);
        let task = self.node.context().handle().spawn(
            async move {
                match action.complete(code) {
                    Ok(delivery) => delivery.finished().await,
                    Err(e) => error!(error = %e, "Could not apply action completion"),
                }
            }
            .instrument(span),
        );
        DispatchHandle::spawned(task)
    }
}

impl AsDispatcher for ActionDispatcher {
    fn dispatcher(&self) -> &Dispatcher {
        &self.shared.node
    }
}

impl fmt::Debug for ActionDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.shared.table.lock();
        f.debug_struct("ActionDispatcher")
            .field("owner", &self.shared.owner.name())
            .field("in_progress", &table.in_progress.keys().collect::<Vec<_>>())
            .field("aborting", &table.aborting.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{FailureCode, JsonCommand, LOCAL_TAGS};
    use crate::error::{EventError, TransportError};
    use crate::event::EventInstance;
    use crate::testing::{Recorder, RecordingTransport, test_context};
    use serde_json::json;

    struct Fixture {
        robot: Dispatcher,
        transport: Arc<RecordingTransport>,
        actions: ActionDispatcher,
    }

    fn fixture() -> Fixture {
        let robot = Dispatcher::with_name(test_context(), "robot", None);
        let transport = RecordingTransport::new();
        let actions = ActionDispatcher::new(&robot, transport.clone()).unwrap();
        Fixture {
            robot,
            transport,
            actions,
        }
    }

    fn turn(fx: &Fixture) -> Arc<Action> {
        fx.actions
            .create_action(JsonCommand::new("turn_in_place", json!({"angle": 90})))
    }

    #[tokio::test]
    async fn test_send_queues_and_starts() {
        let fx = fixture();
        let log = Recorder::new();
        let started = fx.robot.kind_of::<crate::action::ActionStarted>().unwrap();
        fx.robot.add_event_handler(&started, log.handler("started")).unwrap();

        let action = turn(&fx);
        fx.actions.send(&action, SendOptions::default().retries(2)).unwrap();

        assert!(action.is_running());
        let id = action.id().unwrap();
        assert!(LOCAL_TAGS.contains(id));
        assert_eq!(
            fx.transport.sent(),
            vec![Command::QueueAction {
                id_tag: id,
                num_retries: 2,
                in_parallel: false,
                action_type: "turn_in_place".into(),
                payload: json!({"angle": 90}),
            }]
        );

        tokio::task::yield_now().await;
        assert_eq!(log.take(), vec!["started"]);
    }

    fn bare_context() -> Arc<crate::dispatch::LoopContext> {
        let registry = crate::event::EventRegistry::new();
        registry
            .declare(crate::event::KindSpec::new("EvtOne").doc("Test event one"))
            .unwrap();
        crate::dispatch::LoopContext::current(Arc::new(registry))
    }

    #[tokio::test]
    async fn test_new_requires_core_kinds() {
        let robot = Dispatcher::with_name(bare_context(), "robot", None);
        let err = ActionDispatcher::new(&robot, RecordingTransport::new()).unwrap_err();
        assert!(matches!(err, EventError::InvalidKind { ref name } if name == "ActionStarted"));
    }

    #[tokio::test]
    async fn test_send_foreign_action_without_core_kinds_sends_nothing() {
        let fx = fixture();
        let node = Dispatcher::with_name(bare_context(), "stray", None);
        let action = Action::new(node, Box::new(JsonCommand::new("stray", json!({}))), true);

        let err = fx.actions.send(&action, SendOptions::default()).unwrap_err();
        assert!(matches!(err, ActionError::Event(EventError::InvalidKind { .. })));
        assert_eq!(action.state(), ActionState::Idle);
        assert_eq!(fx.transport.count(), 0);
        assert!(!fx.actions.has_in_progress_actions());

        // The id allocator was not advanced.
        let first = turn(&fx);
        fx.actions.send(&first, SendOptions::default()).unwrap();
        assert_eq!(first.id(), Some(LOCAL_TAGS.first));
    }

    #[tokio::test]
    async fn test_busy_until_first_completes() {
        let fx = fixture();
        let first = turn(&fx);
        let second = turn(&fx);

        fx.actions.send(&first, SendOptions::default()).unwrap();
        let err = fx.actions.send(&second, SendOptions::default()).unwrap_err();
        let first_id = first.id().unwrap();
        assert!(matches!(err, ActionError::Busy { count: 1, first } if first == first_id));
        assert_eq!(first.state(), ActionState::Running);
        assert_eq!(second.state(), ActionState::Idle);
        assert_eq!(fx.transport.count(), 1);

        fx.actions
            .on_completion_notification(first_id, ResultCode::SUCCESS)
            .await;
        assert!(first.has_succeeded());

        fx.actions.send(&second, SendOptions::default()).unwrap();
        assert_eq!(second.id(), Some(first_id + 1));
    }

    #[tokio::test]
    async fn test_parallel_send_and_reuse_rejected() {
        let fx = fixture();
        let a = turn(&fx);
        let b = turn(&fx);

        fx.actions.send(&a, SendOptions::default()).unwrap();
        fx.actions.send(&b, SendOptions::parallel()).unwrap();
        assert_eq!(fx.actions.in_progress_actions().len(), 2);

        assert!(matches!(
            fx.actions.send(&b, SendOptions::parallel()),
            Err(ActionError::AlreadyStarted)
        ));
        fx.actions
            .on_completion_notification(b.id().unwrap(), ResultCode::SUCCESS)
            .await;
        assert!(matches!(
            fx.actions.send(&b, SendOptions::parallel()),
            Err(ActionError::AlreadyCompleted)
        ));
    }

    #[tokio::test]
    async fn test_transport_failure_rolls_back() {
        let fx = fixture();
        let action = turn(&fx);
        fx.transport.fail_next(TransportError::Closed);

        let err = fx.actions.send(&action, SendOptions::default()).unwrap_err();
        assert!(matches!(err, ActionError::Transport(TransportError::Closed)));
        assert_eq!(action.state(), ActionState::Idle);
        assert!(!fx.actions.has_in_progress_actions());

        fx.actions.send(&action, SendOptions::default()).unwrap();
        assert!(action.is_running());
    }

    #[tokio::test]
    async fn test_abort_then_cancelled_completion() {
        let fx = fixture();
        let action = turn(&fx);
        fx.actions.send(&action, SendOptions::default()).unwrap();
        let id = action.id().unwrap();

        fx.actions.abort(&action).unwrap();
        assert!(action.is_aborting());
        assert_eq!(fx.actions.aborting_actions().len(), 1);
        assert!(!fx.actions.has_in_progress_actions());
        assert_eq!(fx.transport.sent().last(), Some(&Command::CancelAction { id_tag: id }));

        // Aborting twice sends nothing more.
        fx.actions.abort(&action).unwrap();
        assert_eq!(fx.transport.count(), 2);

        fx.actions
            .on_completion_notification(id, ResultCode::CANCELLED)
            .await;
        assert!(action.has_failed());
        assert_eq!(action.failure().unwrap().code, FailureCode::Cancelled);
        assert!(fx.actions.aborting_actions().is_empty());

        assert!(matches!(
            fx.actions.abort(&action),
            Err(ActionError::InvalidState { state: ActionState::Failed, .. })
        ));
    }

    #[tokio::test]
    async fn test_abort_after_completion_arrived_is_noop() {
        let fx = fixture();
        let action = turn(&fx);
        fx.actions.send(&action, SendOptions::default()).unwrap();
        let id = action.id().unwrap();

        let delivery = fx.actions.on_completion_notification(id, ResultCode::SUCCESS);
        fx.actions.abort(&action).unwrap();

        assert_eq!(action.state(), ActionState::Running);
        assert_eq!(fx.transport.count(), 1);

        delivery.await;
        assert!(action.has_succeeded());
        assert!(fx.actions.aborting_actions().is_empty());
    }

    #[tokio::test]
    async fn test_abort_idle_rejected() {
        let fx = fixture();
        let action = turn(&fx);
        assert!(matches!(
            fx.actions.abort(&action),
            Err(ActionError::InvalidState { state: ActionState::Idle, .. })
        ));
    }

    #[tokio::test]
    async fn test_abort_all_sends_one_wildcard_cancel() {
        let fx = fixture();
        let actions: Vec<_> = (0..3).map(|_| turn(&fx)).collect();
        for action in &actions {
            fx.actions.send(action, SendOptions::parallel()).unwrap();
        }

        assert_eq!(fx.actions.abort_all().unwrap(), 3);

        assert!(actions.iter().all(|a| a.is_aborting()));
        assert_eq!(fx.actions.aborting_actions().len(), 3);
        assert!(!fx.actions.has_in_progress_actions());
        let cancels = fx
            .transport
            .sent()
            .into_iter()
            .filter(|c| matches!(c, Command::CancelAll | Command::CancelAction { .. }))
            .count();
        assert_eq!(cancels, 1);
        assert_eq!(fx.transport.sent().last(), Some(&Command::CancelAll));
    }

    #[tokio::test]
    async fn test_out_of_range_notification_dropped() {
        let fx = fixture();
        let action = turn(&fx);
        fx.actions.send(&action, SendOptions::default()).unwrap();

        assert!(fx.actions.on_completion_notification(0, ResultCode::SUCCESS).is_skipped());
        assert!(fx.actions.on_completion_notification(3_500_000, 0u32).is_skipped());
        assert!(fx.actions.on_completion_notification(12, ResultCode::SUCCESS).is_skipped());
        assert!(action.is_running());
    }

    #[tokio::test]
    async fn test_message_on_owner_routes_to_action() {
        let fx = fixture();
        let action = turn(&fx);
        fx.actions.send(&action, SendOptions::default()).unwrap();

        let waiter = {
            let action = Arc::clone(&action);
            tokio::spawn(async move { action.wait_for_completed(None).await })
        };
        tokio::task::yield_now().await;

        let msg = MsgActionResult {
            id_tag: action.id(),
            result_code: Some(ResultCode::from_parts(2, 5)),
        };
        fx.robot.dispatch_typed(&msg).unwrap().await;

        let evt: EventInstance = waiter.await.unwrap().unwrap();
        assert_eq!(evt.get("failure_code"), Some(&json!("retryable-failure")));
        assert_eq!(action.failure().unwrap().code, FailureCode::RetryableFailure);
    }

    #[tokio::test]
    async fn test_wait_for_all_actions_completed() {
        let fx = fixture();
        let a = turn(&fx);
        let b = turn(&fx);
        fx.actions.send(&a, SendOptions::parallel()).unwrap();
        fx.actions.send(&b, SendOptions::parallel()).unwrap();
        fx.actions.abort(&b).unwrap();

        let waiter = {
            let actions = fx.actions.clone();
            tokio::spawn(async move { actions.wait_for_all_actions_completed().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        fx.actions
            .on_completion_notification(a.id().unwrap(), ResultCode::SUCCESS)
            .await;
        fx.actions
            .on_completion_notification(b.id().unwrap(), ResultCode::CANCELLED)
            .await;

        waiter.await.unwrap().unwrap();
        assert!(a.has_succeeded());
        assert!(b.has_failed());
    }
}
