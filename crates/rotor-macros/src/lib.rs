//! Procedural macros for the Rotor event core.
//!
//! This crate provides:
//!
//! - `#[derive(Event)]` - Generates the `TypedEvent` schema for an event kind
//!
//! # Event Derive Macro
//!
//! Every field of an event struct is an `Option<T>`, so an unset field is
//! simply absent. The struct doc comment becomes the kind documentation and
//! each field doc comment becomes that field's documentation.
//!
//! ```rust,ignore
//! use rotor_core::Event;
//! use serde::{Deserialize, Serialize};
//!
//! /// Triggered when a cube is tapped.
//! #[derive(Debug, Clone, Default, Serialize, Deserialize, Event)]
//! pub struct ObjectTapped {
//!     /// The id of the object that was tapped
//!     pub object_id: Option<u32>,
//!     /// Number of taps detected
//!     pub tap_count: Option<u32>,
//! }
//!
//! /// Triggered when a cube is tapped twice in quick succession.
//! #[derive(Debug, Clone, Default, Serialize, Deserialize, Event)]
//! #[event(name = "ObjectDoubleTapped")]
//! pub struct DoubleTapped {
//!     #[event(parent)]
//!     #[serde(flatten)]
//!     pub base: ObjectTapped,
//!     /// Milliseconds between the two taps
//!     pub interval_ms: Option<u64>,
//! }
//! ```

mod event;

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

/// Derives `rotor_core::event::TypedEvent` for a struct with named fields.
///
/// # Attributes
///
/// - `#[event(name = "...")]` - Override the kind name (default: the struct name)
/// - `#[event(internal)]` - Mark the kind as internal (`_recv_` handler prefix)
/// - `#[event(parent)]` on a field - Embeds the parent kind; the field must
///   also carry `#[serde(flatten)]`. `Deref`/`DerefMut` to the parent are generated.
#[proc_macro_derive(Event, attributes(event))]
pub fn derive_event(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match event::derive_event(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
