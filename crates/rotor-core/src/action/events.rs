//! Event kinds raised by the action lifecycle.

use serde::{Deserialize, Serialize};

use super::result::{ActionState, FailureCode, ResultCode};
use crate::error::EventResult;
use crate::event::EventRegistry;
use crate::Event;

/// Triggered when an action starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Event)]
pub struct ActionStarted {
    /// Correlation id of the action that started
    pub action_id: Option<u32>,
    /// Type of the action that started
    pub action_type: Option<String>,
}

/// Triggered when an action has completed or failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Event)]
pub struct ActionCompleted {
    /// Correlation id of the action that completed
    pub action_id: Option<u32>,
    /// Type of the action that completed
    pub action_type: Option<String>,
    /// Terminal state; either succeeded or failed
    pub state: Option<ActionState>,
    /// A failure code such as "cancelled"
    pub failure_code: Option<FailureCode>,
    /// A human-readable failure reason
    pub failure_reason: Option<String>,
    /// The raw result code of the completion notification
    pub result_code: Option<ResultCode>,
}

/// A decoded completion notification for a queued action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Event)]
#[event(internal)]
pub struct MsgActionResult {
    /// Correlation id the action was queued under
    pub id_tag: Option<u32>,
    /// Raw result code
    pub result_code: Option<ResultCode>,
}

/// Declares the kinds the action lifecycle raises.
pub fn register_core_kinds(registry: &EventRegistry) -> EventResult<()> {
    registry.register::<ActionStarted>()?;
    registry.register::<ActionCompleted>()?;
    registry.register::<MsgActionResult>()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventInstance, TypedEvent};

    #[test]
    fn test_core_kind_schemas() {
        let registry = EventRegistry::new();
        register_core_kinds(&registry).unwrap();

        let completed = registry.kind_of::<ActionCompleted>().unwrap();
        assert_eq!(completed.handler_method_name(), "recv_action_completed");
        assert_eq!(
            completed.field_doc("failure_code"),
            Some("A failure code such as \"cancelled\"")
        );
        assert_eq!(completed.fields().count(), 6);

        let msg = registry.kind_of::<MsgActionResult>().unwrap();
        assert!(MsgActionResult::INTERNAL);
        assert_eq!(msg.handler_method_name(), "_recv_msg_action_result");
    }

    #[test]
    fn test_typed_round_trip_through_instance() {
        let registry = EventRegistry::new();
        register_core_kinds(&registry).unwrap();

        let event = ActionCompleted {
            action_id: Some(1_000_001),
            state: Some(ActionState::Failed),
            failure_code: Some(FailureCode::Cancelled),
            ..Default::default()
        };
        let instance = EventInstance::from_typed(&registry, &event).unwrap();

        assert_eq!(instance.get("failure_code"), Some(&serde_json::json!("cancelled")));
        assert_eq!(instance.get("action_type"), None);
        assert_eq!(instance.extract::<ActionCompleted>(), Some(event));
        assert_eq!(instance.extract::<ActionStarted>(), None);
    }
}
