//! Rotor Runtime - the threaded shell around the Rotor core.
//!
//! This crate provides:
//! - The dedicated event loop thread (`EventLoop`)
//! - Synchronous access from other threads (`SyncBridge`, `Bridged`, the
//!   blocking clients)
//! - Layered configuration (`ConfigLoader`, `RotorConfig`)
//! - Logging setup (`LoggingBuilder`)
//! - Orchestration of all of the above (`Runtime`)
//!
//! ```ignore
//! use rotor_runtime::Runtime;
//!
//! fn main() -> anyhow::Result<()> {
//!     let runtime = Runtime::start()?;
//!     let world = runtime.blocking(&runtime.root("world"));
//!
//!     let tapped = runtime.registry().kind("ObjectTapped")?;
//!     let event = world.wait_for(&tapped, None)?;
//!     println!("{event:?}");
//!
//!     runtime.shutdown();
//!     Ok(())
//! }
//! ```

pub mod blocking;
pub mod bridge;
pub mod config;
pub mod error;
pub mod event_loop;
pub mod logging;
pub mod runtime;

pub use blocking::{BlockingAction, BlockingActionDispatcher, BlockingDispatcher};
pub use bridge::{Bridged, SyncBridge};
pub use config::{ConfigError, ConfigLoader, ConfigResult, LoggingConfig, RotorConfig};
pub use error::{BridgeError, BridgeResult, RuntimeError, RuntimeResult};
pub use event_loop::EventLoop;
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{Runtime, RuntimeBuilder};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides all the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
