//! Event kind schemas.
//!
//! A [`KindSpec`] is what a caller hands to the registry; an [`EventKind`] is
//! what the registry hands back once the spec has been validated and its
//! field set resolved against the ancestor chain.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;

/// Prefix of every receiver name.
const RECEIVER_PREFIX: &str = "recv_";

/// Receiver name used when no kind-specific receiver exists.
const DEFAULT_RECEIVER: &str = "recv_default_handler";

// ============================================================================
// Kind Specification
// ============================================================================

/// A declared field: name plus documentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field name.
    pub name: String,
    /// Human-readable description of the field.
    pub doc: String,
}

/// Declaration input for an event kind.
///
/// ```rust,ignore
/// let spec = KindSpec::new("ObjectTapped")
///     .doc("Triggered when an object is tapped.")
///     .field("object_id", "The object that was tapped")
///     .field("tap_count", "Number of taps detected");
/// registry.declare(spec)?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct KindSpec {
    pub(crate) name: String,
    pub(crate) parent: Option<String>,
    pub(crate) doc: String,
    pub(crate) fields: Vec<FieldSpec>,
    pub(crate) internal: bool,
}

impl KindSpec {
    /// Starts a declaration for the named kind.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Sets the kind documentation. Declaration fails without it.
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    /// Sets the parent kind by name.
    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Declares a field.
    pub fn field(mut self, name: impl Into<String>, doc: impl Into<String>) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            doc: doc.into(),
        });
        self
    }

    /// Marks the kind as internal.
    pub fn internal(mut self, internal: bool) -> Self {
        self.internal = internal;
        self
    }

    /// Returns the kind name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// Event Kind
// ============================================================================

/// A declared, immutable event kind.
///
/// Kinds form a single-inheritance hierarchy. The field set of a kind is the
/// union of its own fields and every ancestor's fields; each field name
/// appears exactly once across the chain.
pub struct EventKind {
    name: String,
    doc: String,
    parent: Option<Arc<EventKind>>,
    own_fields: Vec<FieldSpec>,
    /// Every field across the chain, mapped to its documentation.
    fields: BTreeMap<String, String>,
    internal: bool,
    handler_method: String,
}

impl EventKind {
    pub(crate) fn new(
        name: String,
        doc: String,
        parent: Option<Arc<EventKind>>,
        own_fields: Vec<FieldSpec>,
        fields: BTreeMap<String, String>,
        internal: bool,
    ) -> Self {
        let handler_method = handler_method_name(&name, internal);
        Self {
            name,
            doc,
            parent,
            own_fields,
            fields,
            internal,
            handler_method,
        }
    }

    /// Returns the kind name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the kind documentation.
    pub fn doc(&self) -> &str {
        &self.doc
    }

    /// Returns the parent kind, if any.
    pub fn parent(&self) -> Option<&Arc<EventKind>> {
        self.parent.as_ref()
    }

    /// Returns the fields declared by this kind itself.
    pub fn own_fields(&self) -> &[FieldSpec] {
        &self.own_fields
    }

    /// Returns every field name across the chain, sorted.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Returns the documentation of a field declared anywhere in the chain.
    pub fn field_doc(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Returns true if the field is declared anywhere in the chain.
    pub fn has_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Returns true for internal kinds.
    pub fn is_internal(&self) -> bool {
        self.internal
    }

    /// Name of the receiver that handles this kind, e.g. `recv_object_tapped`.
    pub fn handler_method_name(&self) -> &str {
        &self.handler_method
    }

    /// Name of the fallback receiver for this kind.
    pub fn default_handler_method_name(&self) -> &'static str {
        if self.internal {
            "_recv_default_handler"
        } else {
            DEFAULT_RECEIVER
        }
    }

    /// Iterates this kind and then each ancestor, most specific first.
    pub fn ancestors(&self) -> Ancestors<'_> {
        Ancestors { next: Some(self) }
    }

    /// Returns true if this kind is `other` or descends from it.
    pub fn is_a(&self, other: &EventKind) -> bool {
        self.ancestors().any(|kind| kind.name == other.name)
    }

    /// Returns true if this kind is named `name` or descends from it.
    pub fn is_named(&self, name: &str) -> bool {
        self.ancestors().any(|kind| kind.name == name)
    }
}

impl fmt::Debug for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventKind")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.name()))
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("internal", &self.internal)
            .finish()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Iterator over a kind and its ancestors.
pub struct Ancestors<'a> {
    next: Option<&'a EventKind>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a EventKind;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.parent.as_deref();
        Some(current)
    }
}

// ============================================================================
// Receiver Names
// ============================================================================

/// A character followed by a capitalised word, e.g. `xFoo`.
static WORD_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(.)([A-Z][a-z]+)").expect("constant regex pattern is valid")
});

/// A lowercase letter or digit followed by a capital.
static CAP_AFTER_LOWER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([a-z0-9])([A-Z])").expect("constant regex pattern is valid")
});

/// Derives the receiver name for a kind.
///
/// The kind name is snake-cased in two passes: an underscore goes before every
/// capitalised word that is not at the start, then between a lowercase letter
/// or digit and a following capital. Existing underscores are kept, so
/// `Foo_Bar` maps to `recv_foo__bar`. Internal kinds get a leading underscore.
pub fn handler_method_name(event_name: &str, internal: bool) -> String {
    let snake = uncamelcase(event_name);
    let mut name = String::with_capacity(snake.len() + RECEIVER_PREFIX.len() + 1);
    if internal {
        name.push('_');
    }
    name.push_str(RECEIVER_PREFIX);
    name.push_str(&snake);
    name
}

fn uncamelcase(name: &str) -> String {
    let words = WORD_START.replace_all(name, "${1}_${2}");
    CAP_AFTER_LOWER
        .replace_all(&words, "${1}_${2}")
        .to_lowercase()
}
