//! # Rotor
//!
//! Event dispatch, action lifecycle and a synchronous bridge for SDKs that
//! drive a remote device over a message transport.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  call/run  ┌────────────────────── event loop thread ───────────────────────┐
//! │ user threads │──────────▶│ Dispatcher tree ──▶ handlers / waits / receivers                │
//! │  (blocking)  │◀──────────│ ActionDispatcher ──▶ Transport ──▶ device                        │
//! └──────────────┘   result   │        ▲ completion notifications ◀── Transport                 │
//!                             └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **Events**: kinds declared in a single-inheritance hierarchy, either at
//!   runtime or with `#[derive(Event)]`
//! - **Dispatchers**: nodes in a possibly cyclic graph; every dispatch reaches
//!   each node at most once
//! - **Actions**: remote requests correlated by id, with exclusivity and
//!   cancellation
//! - **Runtime**: the loop thread, configuration, logging and blocking access
//!   from other threads
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rotor::prelude::*;
//!
//! /// Triggered when an object is tapped.
//! #[derive(Debug, Clone, Default, Serialize, Deserialize, Event)]
//! struct ObjectTapped {
//!     /// The object that was tapped
//!     object_id: Option<u32>,
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     let runtime = Runtime::start()?;
//!     let tapped = runtime.registry().register::<ObjectTapped>()?;
//!
//!     let world = runtime.blocking(&runtime.root("world"));
//!     let event = world.wait_for(&tapped, None)?;
//!     println!("tapped {:?}", event.extract::<ObjectTapped>());
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output
//! - `testing`: recording transport and fixture registry from the core

pub use rotor_core as core;
pub use rotor_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use rotor::prelude::*;
/// ```
pub mod prelude {
    // Core - events, dispatch, actions
    pub use rotor_core::prelude::*;

    // Runtime - main entry point and blocking access
    pub use rotor_runtime::{
        BlockingAction, BlockingActionDispatcher, BlockingDispatcher, BridgeError, Bridged,
        RotorConfig, Runtime, SyncBridge,
    };
}
