//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use rotor_core::action::{ActionSettings, ENGINE_TAGS, GAME_TAGS, LOCAL_TAGS, TagLayout, TagRange};
use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RotorConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Event dispatch settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Action correlation and abort settings.
    #[serde(default)]
    pub actions: ActionsConfig,

    /// Event loop thread settings.
    #[serde(default)]
    pub event_loop: EventLoopConfig,
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to the equivalent `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Needs the `json-log` feature; falls back to compact without it.
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// How often the log file rolls over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base level when `RUST_LOG` is not set.
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Log file, required for `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    /// Include thread ids; useful when debugging the sync bridge.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include file and line of the log site.
    #[serde(default)]
    pub file_location: bool,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Per-target level overrides, e.g. `rotor_core::dispatch = "trace"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            file_path: None,
            rotation: LogRotation::Never,
            thread_ids: false,
            file_location: false,
            span_events: SpanEventConfig::default(),
            filters: HashMap::new(),
        }
    }
}

// =============================================================================
// Dispatch
// =============================================================================

/// Event dispatch settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Timeout applied to waits that do not name one, in milliseconds.
    #[serde(default = "default_wait_timeout_ms")]
    pub default_wait_timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_wait_timeout_ms: default_wait_timeout_ms(),
        }
    }
}

impl DispatchConfig {
    /// Timeout for blocking waits that do not name one.
    pub fn default_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.default_wait_timeout_ms)
    }
}

fn default_wait_timeout_ms() -> u64 {
    30_000
}

// =============================================================================
// Actions
// =============================================================================

/// Action correlation and abort settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionsConfig {
    /// Ids handed out to locally sent actions.
    #[serde(default = "default_local_tags")]
    pub local_tags: TagRange,

    /// Ids used by remote originators; notifications for them are ignored.
    #[serde(default = "default_remote_tags")]
    pub remote_tags: Vec<TagRange>,

    /// Log abort requests at info level.
    #[serde(default = "default_abort_logging")]
    pub abort_logging: bool,
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            local_tags: default_local_tags(),
            remote_tags: default_remote_tags(),
            abort_logging: default_abort_logging(),
        }
    }
}

impl ActionsConfig {
    /// Converts to the settings an `ActionDispatcher` is built with.
    pub fn to_settings(&self) -> ActionSettings {
        ActionSettings {
            tags: TagLayout::new(self.local_tags, self.remote_tags.clone()),
            abort_logging: self.abort_logging,
        }
    }
}

fn default_local_tags() -> TagRange {
    LOCAL_TAGS
}

fn default_remote_tags() -> Vec<TagRange> {
    vec![GAME_TAGS, ENGINE_TAGS]
}

fn default_abort_logging() -> bool {
    true
}

// =============================================================================
// Event Loop
// =============================================================================

/// Event loop thread settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLoopConfig {
    /// Name of the dedicated loop thread.
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
}

impl Default for EventLoopConfig {
    fn default() -> Self {
        Self {
            thread_name: default_thread_name(),
        }
    }
}

fn default_thread_name() -> String {
    "rotor-event-loop".to_string()
}
