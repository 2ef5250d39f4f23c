//! The event kind registry.
//!
//! Kinds are declared once at startup and immutable afterwards. A registry is
//! an explicit instance shared through [`LoopContext`](crate::LoopContext),
//! so independent registries can coexist (one per test, for example).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::kind::{EventKind, KindSpec};
use super::typed::TypedEvent;
use crate::error::{EventError, EventResult};

/// Registry of declared event kinds, keyed by name.
#[derive(Default)]
pub struct EventRegistry {
    kinds: RwLock<HashMap<String, Arc<EventKind>>>,
}

impl EventRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a new kind.
    ///
    /// # Errors
    ///
    /// - [`EventError::DuplicateName`] if the name is taken
    /// - [`EventError::MissingDocumentation`] if no description is supplied
    /// - [`EventError::UnknownParent`] if the parent is not declared
    /// - [`EventError::DuplicateField`] if a field repeats across the chain
    pub fn declare(&self, spec: KindSpec) -> EventResult<Arc<EventKind>> {
        let mut kinds = self.kinds.write();

        if kinds.contains_key(&spec.name) {
            return Err(EventError::DuplicateName { name: spec.name });
        }
        if spec.doc.trim().is_empty() {
            return Err(EventError::MissingDocumentation { name: spec.name });
        }

        let parent = match &spec.parent {
            Some(parent_name) => Some(kinds.get(parent_name).cloned().ok_or_else(|| {
                EventError::UnknownParent {
                    kind: spec.name.clone(),
                    parent: parent_name.clone(),
                }
            })?),
            None => None,
        };

        let mut fields: BTreeMap<String, String> = BTreeMap::new();
        if let Some(parent) = &parent {
            for name in parent.fields() {
                let doc = parent.field_doc(name).unwrap_or_default().to_string();
                fields.insert(name.to_string(), doc);
            }
        }
        for field in &spec.fields {
            if fields
                .insert(field.name.clone(), field.doc.clone())
                .is_some()
            {
                return Err(EventError::DuplicateField {
                    kind: spec.name,
                    field: field.name.clone(),
                });
            }
        }

        let kind = Arc::new(EventKind::new(
            spec.name.clone(),
            spec.doc,
            parent,
            spec.fields,
            fields,
            spec.internal,
        ));
        debug!(
            kind = %kind.name(),
            parent = kind.parent().map(|p| p.name()).unwrap_or("-"),
            receiver = %kind.handler_method_name(),
            "Declared event kind"
        );
        kinds.insert(spec.name, Arc::clone(&kind));
        Ok(kind)
    }

    /// Declares the kind described by a typed event.
    pub fn register<T: TypedEvent>(&self) -> EventResult<Arc<EventKind>> {
        self.declare(T::schema())
    }

    /// Looks up a kind by name.
    pub fn kind(&self, name: &str) -> EventResult<Arc<EventKind>> {
        self.kinds
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| EventError::invalid_kind(name))
    }

    /// Looks up the kind of a typed event.
    pub fn kind_of<T: TypedEvent>(&self) -> EventResult<Arc<EventKind>> {
        self.kind(T::NAME)
    }

    /// Returns true if `kind` is the very kind this registry declared under its name.
    pub fn owns(&self, kind: &Arc<EventKind>) -> bool {
        self.kinds
            .read()
            .get(kind.name())
            .is_some_and(|k| Arc::ptr_eq(k, kind))
    }

    /// Returns true if a kind with this name is declared.
    pub fn contains(&self, name: &str) -> bool {
        self.kinds.read().contains_key(name)
    }

    /// Returns the number of declared kinds.
    pub fn len(&self) -> usize {
        self.kinds.read().len()
    }

    /// Returns true if no kinds are declared.
    pub fn is_empty(&self) -> bool {
        self.kinds.read().is_empty()
    }

    /// Returns all declared kind names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.kinds.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry")
            .field("kinds", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evt_one() -> KindSpec {
        KindSpec::new("EvtOne")
            .doc("Test event")
            .field("param1", "Parameter one")
            .field("param2", "Parameter two")
            .field("param3", "Parameter three")
    }

    #[test]
    fn test_declare_resolves_field_union() {
        let registry = EventRegistry::new();
        registry.declare(evt_one()).unwrap();
        let child = registry
            .declare(
                KindSpec::new("EvtChild1")
                    .doc("Child event")
                    .parent("EvtOne")
                    .field("param4", "Parameter four")
                    .internal(true),
            )
            .unwrap();

        let fields: Vec<&str> = child.fields().collect();
        assert_eq!(fields, vec!["param1", "param2", "param3", "param4"]);
        assert_eq!(child.own_fields().len(), 1);
        assert_eq!(child.field_doc("param1"), Some("Parameter one"));
        assert_eq!(child.handler_method_name(), "_recv_evt_child1");
        assert!(child.is_named("EvtOne"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let registry = EventRegistry::new();
        registry.declare(evt_one()).unwrap();
        let err = registry.declare(evt_one()).unwrap_err();
        assert!(matches!(err, EventError::DuplicateName { name } if name == "EvtOne"));
    }

    #[test]
    fn test_missing_documentation_rejected() {
        let registry = EventRegistry::new();
        let err = registry
            .declare(KindSpec::new("EvtUndocumented").doc("   "))
            .unwrap_err();
        assert!(matches!(err, EventError::MissingDocumentation { .. }));
        assert!(!registry.contains("EvtUndocumented"));
    }

    #[test]
    fn test_field_redeclared_in_child_rejected() {
        let registry = EventRegistry::new();
        registry.declare(evt_one()).unwrap();
        let err = registry
            .declare(
                KindSpec::new("EvtBad")
                    .doc("Bad child")
                    .parent("EvtOne")
                    .field("param2", "Parameter two again"),
            )
            .unwrap_err();
        assert!(matches!(err, EventError::DuplicateField { field, .. } if field == "param2"));
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let registry = EventRegistry::new();
        let err = registry
            .declare(KindSpec::new("EvtOrphan").doc("Orphan").parent("EvtMissing"))
            .unwrap_err();
        assert!(matches!(err, EventError::UnknownParent { .. }));
    }

    #[test]
    fn test_registries_are_independent() {
        let a = EventRegistry::new();
        let b = EventRegistry::new();
        let kind = a.declare(evt_one()).unwrap();
        b.declare(evt_one()).unwrap();

        assert!(a.owns(&kind));
        assert!(!b.owns(&kind));
        assert!(matches!(
            a.kind("EvtTwo"),
            Err(EventError::InvalidKind { .. })
        ));
    }
}
