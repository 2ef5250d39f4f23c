//! Typed event kinds.
//!
//! `#[derive(Event)]` implements [`TypedEvent`] for a struct whose fields are
//! all `Option<T>`. The struct can then be declared with
//! [`EventRegistry::register`](super::EventRegistry::register), dispatched with
//! [`Dispatcher::dispatch_typed`](crate::Dispatcher::dispatch_typed) and
//! re-extracted from any instance of the kind or one of its descendants with
//! [`EventInstance::extract`](super::EventInstance::extract).

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::kind::KindSpec;

/// A statically described event kind.
pub trait TypedEvent: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The kind name.
    const NAME: &'static str;

    /// Whether the kind is internal.
    const INTERNAL: bool;

    /// The declaration for this kind.
    fn schema() -> KindSpec;
}
