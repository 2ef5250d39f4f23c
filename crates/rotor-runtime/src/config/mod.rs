//! Configuration for the Rotor runtime.
//!
//! Layered loading (defaults, files, environment, code) with validation of
//! logging, dispatch, action tag and event loop settings.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, PROFILE_ENV, Profile, load_config, load_config_from_file};
pub use schema::{
    ActionsConfig, DispatchConfig, EventLoopConfig, LogFormat, LogLevel, LogOutput, LogRotation,
    LoggingConfig, RotorConfig, SpanEventConfig,
};
pub use validation::validate_config;
