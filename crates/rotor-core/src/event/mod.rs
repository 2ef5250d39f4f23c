//! Event kinds, instances and filters.
//!
//! - [`EventRegistry`] declares named kinds in a single-inheritance hierarchy
//! - [`EventKind`] is the immutable, validated result of a declaration
//! - [`EventInstance`] carries one occurrence of a kind through the dispatch tree
//! - [`Filter`] gates handlers and waits on field values
//! - [`TypedEvent`] ties a `#[derive(Event)]` struct to its kind

pub mod filter;
pub mod instance;
pub mod kind;
pub mod registry;
pub mod typed;

pub use filter::{Filter, Predicate};
pub use instance::EventInstance;
pub use kind::{Ancestors, EventKind, FieldSpec, KindSpec, handler_method_name};
pub use registry::EventRegistry;
pub use typed::TypedEvent;
