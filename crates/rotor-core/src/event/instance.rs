//! Event instances.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};

use super::kind::EventKind;
use super::registry::EventRegistry;
use super::typed::TypedEvent;
use crate::dispatch::NodeId;
use crate::error::{EventError, EventResult};

static ABSENT: Value = Value::Null;

/// An immutable event value: a kind plus its field values.
///
/// Every declared field is present in the map; unset fields hold `null` and
/// read back as absent. Cloning is cheap and clones share the delivered-to
/// set, which is what lets a dispatch tree deliver the instance to each node
/// at most once even when the tree contains cycles.
#[derive(Clone)]
pub struct EventInstance {
    inner: Arc<Inner>,
}

struct Inner {
    kind: Arc<EventKind>,
    fields: Map<String, Value>,
    delivered_to: Mutex<HashSet<NodeId>>,
}

impl EventInstance {
    /// Builds an instance from field values.
    ///
    /// Returns [`EventError::UnknownField`] if a field is not declared by the
    /// kind or any of its ancestors.
    pub fn new<I, K>(kind: Arc<EventKind>, fields: I) -> EventResult<Self>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut map: Map<String, Value> = kind
            .fields()
            .map(|name| (name.to_string(), Value::Null))
            .collect();

        for (name, value) in fields {
            let name = name.into();
            if !kind.has_field(&name) {
                return Err(EventError::unknown_field(kind.name(), name));
            }
            map.insert(name, value);
        }

        Ok(Self {
            inner: Arc::new(Inner {
                kind,
                fields: map,
                delivered_to: Mutex::new(HashSet::new()),
            }),
        })
    }

    /// Builds an instance with every field unset.
    pub fn empty(kind: Arc<EventKind>) -> Self {
        let fields = kind
            .fields()
            .map(|name| (name.to_string(), Value::Null))
            .collect();
        Self {
            inner: Arc::new(Inner {
                kind,
                fields,
                delivered_to: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Builds an instance from a typed event declared in `registry`.
    pub fn from_typed<T: TypedEvent>(registry: &EventRegistry, event: &T) -> EventResult<Self> {
        let kind = registry.kind_of::<T>()?;
        let value = serde_json::to_value(event).map_err(|e| EventError::encode(T::NAME, e))?;
        let Value::Object(fields) = value else {
            return Err(EventError::encode(T::NAME, "typed event did not encode to an object"));
        };
        Self::new(kind, fields)
    }

    /// Returns the kind of this instance.
    pub fn kind(&self) -> &Arc<EventKind> {
        &self.inner.kind
    }

    /// Returns the kind name.
    pub fn name(&self) -> &str {
        self.inner.kind.name()
    }

    /// Returns a field value, or `None` if the field is unset or undeclared.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.inner.fields.get(field).filter(|v| !v.is_null())
    }

    /// Returns a field value, reading unset and undeclared fields as `null`.
    pub fn value(&self, field: &str) -> &Value {
        self.inner.fields.get(field).unwrap_or(&ABSENT)
    }

    /// Returns every field value, including unset ones.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.inner.fields
    }

    /// Returns true if this instance is of kind `T` or a descendant of it.
    pub fn is<T: TypedEvent>(&self) -> bool {
        self.inner.kind.is_named(T::NAME)
    }

    /// Returns true if this instance is of `kind` or a descendant of it.
    pub fn is_kind(&self, kind: &EventKind) -> bool {
        self.inner.kind.is_a(kind)
    }

    /// Re-parses the instance as the typed event `T`.
    ///
    /// Works at any level of the hierarchy: an instance of a child kind can be
    /// extracted as its parent. Returns `None` if the instance is not a `T`.
    pub fn extract<T: TypedEvent>(&self) -> Option<T> {
        if !self.is::<T>() {
            return None;
        }
        serde_json::from_value(Value::Object(self.inner.fields.clone())).ok()
    }

    /// Records delivery to `node`. Returns false if it was already delivered there.
    pub(crate) fn mark_delivered(&self, node: NodeId) -> bool {
        self.inner.delivered_to.lock().insert(node)
    }

    /// Returns true if the instance has been delivered to `node`.
    pub fn was_delivered_to(&self, node: NodeId) -> bool {
        self.inner.delivered_to.lock().contains(&node)
    }

    /// Returns true if both values are the same instance.
    pub fn ptr_eq(&self, other: &EventInstance) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for EventInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.name())?;
        for (name, value) in &self.inner.fields {
            write!(f, " {name}={value}")?;
        }
        write!(f, ">")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::KindSpec;
    use serde_json::json;

    fn registry() -> EventRegistry {
        let registry = EventRegistry::new();
        registry
            .declare(
                KindSpec::new("EvtOne")
                    .doc("Test event")
                    .field("param1", "Parameter one")
                    .field("param2", "Parameter two")
                    .field("param3", "Parameter three"),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_unset_fields_are_absent() {
        let registry = registry();
        let kind = registry.kind("EvtOne").unwrap();
        let evt =
            EventInstance::new(kind, [("param1", json!(123)), ("param3", json!(345))]).unwrap();

        assert_eq!(evt.get("param1"), Some(&json!(123)));
        assert_eq!(evt.get("param2"), None);
        assert_eq!(evt.value("param2"), &Value::Null);
        assert_eq!(evt.get("param3"), Some(&json!(345)));
        assert_eq!(evt.fields().len(), 3);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let registry = registry();
        let kind = registry.kind("EvtOne").unwrap();
        let err = EventInstance::new(kind, [("param9", json!(1))]).unwrap_err();
        assert!(matches!(err, EventError::UnknownField { field, .. } if field == "param9"));
    }

    #[test]
    fn test_delivered_set_is_shared_by_clones() {
        let registry = registry();
        let evt = EventInstance::empty(registry.kind("EvtOne").unwrap());
        let copy = evt.clone();
        let node = NodeId::from_raw(7);

        assert!(evt.mark_delivered(node));
        assert!(!copy.mark_delivered(node));
        assert!(copy.was_delivered_to(node));
        assert!(evt.ptr_eq(&copy));
    }

    #[test]
    fn test_debug_lists_fields() {
        let registry = registry();
        let evt = EventInstance::new(registry.kind("EvtOne").unwrap(), [("param1", json!("a"))])
            .unwrap();
        assert_eq!(
            format!("{evt:?}"),
            r#"<EvtOne param1="a" param2=null param3=null>"#
        );
    }
}
