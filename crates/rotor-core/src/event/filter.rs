//! Field filters over an event kind.
//!
//! A [`Filter`] gates a handler or a wait on the values of an event's fields.
//! Each predicate is either a literal (exact match) or a single-argument
//! boolean function; the filter matches iff every predicate matches.
//!
//! ```rust,ignore
//! // Only taps on object 3 with at least two taps
//! let filter = Filter::new(&tapped)
//!     .equals("object_id", 3)?
//!     .matching("tap_count", |v| v.as_u64().is_some_and(|n| n >= 2))?;
//!
//! let evt = dispatcher.wait_for(filter, Some(Duration::from_secs(5))).await?;
//! ```

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::instance::EventInstance;
use super::kind::EventKind;
use crate::error::{EventError, EventResult};

/// A type-erased field predicate function.
pub type PredicateFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// One field predicate.
#[derive(Clone)]
pub enum Predicate {
    /// Exact match against a literal value.
    Equals(Value),
    /// Match when the function returns true for the field value.
    Test(PredicateFn),
}

impl Predicate {
    /// Evaluates the predicate against a field value.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::Equals(expected) => value == expected,
            Self::Test(f) => f(value),
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals(v) => write!(f, "Equals({v})"),
            Self::Test(_) => f.write_str("Test(<fn>)"),
        }
    }
}

/// A predicate gate over one event kind's fields.
#[derive(Clone)]
pub struct Filter {
    kind: Arc<EventKind>,
    predicates: Vec<(String, Predicate)>,
}

impl Filter {
    /// Creates a filter that matches every instance of `kind` (and its descendants).
    pub fn new(kind: &Arc<EventKind>) -> Self {
        Self {
            kind: Arc::clone(kind),
            predicates: Vec::new(),
        }
    }

    /// Returns the kind this filter applies to.
    pub fn kind(&self) -> &Arc<EventKind> {
        &self.kind
    }

    /// Adds a predicate, checking the field is declared by the kind.
    pub fn with(mut self, field: impl Into<String>, predicate: Predicate) -> EventResult<Self> {
        let field = field.into();
        if !self.kind.has_field(&field) {
            return Err(EventError::unknown_field(self.kind.name(), field));
        }
        self.predicates.push((field, predicate));
        Ok(self)
    }

    /// Requires `field` to equal `value` exactly.
    pub fn equals(self, field: impl Into<String>, value: impl Serialize) -> EventResult<Self> {
        let kind = self.kind.name().to_string();
        let value = serde_json::to_value(value).map_err(|e| EventError::encode(kind, e))?;
        self.with(field, Predicate::Equals(value))
    }

    /// Requires `f(value)` to hold for `field`.
    pub fn matching<F>(self, field: impl Into<String>, f: F) -> EventResult<Self>
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.with(field, Predicate::Test(Arc::new(f)))
    }

    /// Requires `f` to hold for `field` decoded as `T`.
    ///
    /// An absent field, or one that does not decode as `T`, fails the predicate.
    pub fn matching_as<T, F>(self, field: impl Into<String>, f: F) -> EventResult<Self>
    where
        T: DeserializeOwned,
        F: Fn(T) -> bool + Send + Sync + 'static,
    {
        self.matching(field, move |value| {
            serde_json::from_value::<T>(value.clone()).is_ok_and(&f)
        })
    }

    /// Returns true if `event` is of this filter's kind and every predicate holds.
    pub fn matches(&self, event: &EventInstance) -> bool {
        event.is_kind(&self.kind)
            && self
                .predicates
                .iter()
                .all(|(field, predicate)| predicate.matches(event.value(field)))
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("kind", &self.kind.name())
            .field("predicates", &self.predicates)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventRegistry, KindSpec};
    use serde_json::json;

    fn setup() -> (EventRegistry, Arc<EventKind>) {
        let registry = EventRegistry::new();
        let kind = registry
            .declare(
                KindSpec::new("ObjectTapped")
                    .doc("Triggered when an object is tapped")
                    .field("object_id", "The object")
                    .field("tap_count", "Number of taps"),
            )
            .unwrap();
        registry
            .declare(KindSpec::new("Unrelated").doc("Something else"))
            .unwrap();
        (registry, kind)
    }

    fn tapped(kind: &Arc<EventKind>, object_id: u32, tap_count: u32) -> EventInstance {
        EventInstance::new(
            Arc::clone(kind),
            [("object_id", json!(object_id)), ("tap_count", json!(tap_count))],
        )
        .unwrap()
    }

    #[test]
    fn test_literal_matches_exact_value_only() {
        let (_registry, kind) = setup();
        let filter = Filter::new(&kind).equals("object_id", 3).unwrap();

        assert!(filter.matches(&tapped(&kind, 3, 1)));
        assert!(!filter.matches(&tapped(&kind, 4, 1)));
    }

    #[test]
    fn test_predicate_function() {
        let (_registry, kind) = setup();
        let filter = Filter::new(&kind)
            .matching_as("tap_count", |n: u32| n >= 2)
            .unwrap();

        assert!(filter.matches(&tapped(&kind, 1, 2)));
        assert!(!filter.matches(&tapped(&kind, 1, 1)));
        assert!(!filter.matches(&EventInstance::empty(Arc::clone(&kind))));
    }

    #[test]
    fn test_combined_predicates_require_all() {
        let (_registry, kind) = setup();
        let filter = Filter::new(&kind)
            .equals("object_id", 3)
            .unwrap()
            .matching("tap_count", |v| v.as_u64().is_some_and(|n| n > 1))
            .unwrap();

        assert!(filter.matches(&tapped(&kind, 3, 2)));
        assert!(!filter.matches(&tapped(&kind, 3, 1)));
        assert!(!filter.matches(&tapped(&kind, 2, 2)));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let (_registry, kind) = setup();
        let err = Filter::new(&kind).equals("colour", "red").unwrap_err();
        assert!(matches!(err, EventError::UnknownField { .. }));
    }

    #[test]
    fn test_other_kind_never_matches() {
        let (registry, kind) = setup();
        let filter = Filter::new(&kind);
        let other = EventInstance::empty(registry.kind("Unrelated").unwrap());
        assert!(!filter.matches(&other));
    }
}
