//! Runtime orchestration.
//!
//! A [`Runtime`] loads configuration, initialises logging, starts the event
//! loop thread and owns the [`LoopContext`] every dispatch node is built on.
//!
//! ```rust,ignore
//! use rotor_runtime::Runtime;
//!
//! let runtime = Runtime::builder()
//!     .config_file("config/rotor.toml")
//!     .profile("production")
//!     .build()?;
//!
//! let robot = runtime.root("robot");
//! let actions = runtime.action_dispatcher(&robot, transport)?;
//! let blocking = runtime.blocking_actions(&actions);
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use rotor_core::action::{ActionStarted, register_core_kinds};
use rotor_core::{
    AbortReason, ActionDispatcher, Dispatcher, EventRegistry, EventResult, LoopContext, Transport,
    TypedEvent,
};
use tracing::{debug, info};

use crate::blocking::{BlockingActionDispatcher, BlockingDispatcher};
use crate::bridge::SyncBridge;
use crate::config::{ConfigLoader, RotorConfig};
use crate::error::RuntimeResult;
use crate::event_loop::EventLoop;
use crate::logging;

/// The Rotor runtime: configuration, logging and the event loop.
pub struct Runtime {
    config: RotorConfig,
    ctx: Arc<LoopContext>,
    event_loop: Mutex<Option<EventLoop>>,
}

impl Runtime {
    /// Starts a runtime with configuration from the default locations.
    pub fn start() -> RuntimeResult<Self> {
        Self::builder().build()
    }

    /// Creates a runtime builder for custom configuration.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Starts a runtime from an already loaded configuration.
    pub fn from_config(config: RotorConfig) -> RuntimeResult<Self> {
        Self::builder().config(config).build()
    }

    /// Returns the validated configuration the runtime was built with.
    pub fn config(&self) -> &RotorConfig {
        &self.config
    }

    /// Returns the shared loop context every node is built on.
    pub fn context(&self) -> &Arc<LoopContext> {
        &self.ctx
    }

    /// Returns the registry shared by every node of this runtime.
    pub fn registry(&self) -> &Arc<EventRegistry> {
        self.ctx.registry()
    }

    /// Returns a bridge onto the event loop.
    pub fn bridge(&self) -> SyncBridge {
        SyncBridge::new(Arc::clone(&self.ctx))
    }

    /// Creates a root dispatch node.
    pub fn root(&self, name: impl Into<String>) -> Dispatcher {
        Dispatcher::with_name(Arc::clone(&self.ctx), name, None)
    }

    /// Creates an action dispatcher for `owner` with the configured tags.
    ///
    /// Fails only if `owner` belongs to a registry without the core action
    /// kinds, which a node from [`root`](Self::root) never does.
    pub fn action_dispatcher(
        &self,
        owner: &Dispatcher,
        transport: Arc<dyn Transport>,
    ) -> EventResult<ActionDispatcher> {
        ActionDispatcher::with_settings(owner, transport, self.config.actions.to_settings())
    }

    /// Blocking client for `node` using the configured wait timeout.
    pub fn blocking(&self, node: &Dispatcher) -> BlockingDispatcher {
        BlockingDispatcher::new(node.clone())
            .with_default_timeout(self.config.dispatch.default_wait_timeout())
    }

    /// Blocking client for `actions`.
    pub fn blocking_actions(&self, actions: &ActionDispatcher) -> BlockingActionDispatcher {
        BlockingActionDispatcher::new(actions.clone())
    }

    /// Fires the global abort signal, releasing every waiter and blocked
    /// caller. Returns false if it had already fired.
    pub fn abort(&self, reason: AbortReason) -> bool {
        self.ctx.abort(reason)
    }

    /// True until [`shutdown`](Self::shutdown) has stopped the loop thread.
    pub fn is_running(&self) -> bool {
        self.event_loop
            .lock()
            .as_ref()
            .is_some_and(EventLoop::is_running)
    }

    /// Aborts with [`AbortReason::Shutdown`] and stops the event loop.
    pub fn shutdown(&self) {
        let Some(mut event_loop) = self.event_loop.lock().take() else {
            return;
        };
        if self.ctx.abort(AbortReason::Shutdown) {
            debug!("Released pending waits for shutdown");
        }
        event_loop.shutdown();
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("context", &self.ctx)
            .field("event_loop", &*self.event_loop.lock())
            .finish()
    }
}

/// Builder for [`Runtime`].
pub struct RuntimeBuilder {
    loader: ConfigLoader,
    config: Option<RotorConfig>,
    registry: Option<Arc<EventRegistry>>,
    init_logging: bool,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            loader: ConfigLoader::new(),
            config: None,
            registry: None,
            init_logging: true,
        }
    }

    /// Loads configuration from this file instead of searching.
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.loader = self.loader.file(path.into());
        self
    }

    /// Selects the configuration profile, overriding `ROTOR_PROFILE`.
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.loader = self.loader.profile(profile);
        self
    }

    /// Uses `config` as is, skipping file and environment loading.
    pub fn config(mut self, config: RotorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Uses a prepared registry. The core action kinds are added if missing.
    pub fn registry(mut self, registry: Arc<EventRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Leaves the global tracing subscriber alone.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    /// Loads configuration, starts logging and the loop thread.
    ///
    /// # Errors
    ///
    /// Configuration, registry and thread spawn failures.
    pub fn build(self) -> RuntimeResult<Runtime> {
        let config = match self.config {
            Some(config) => {
                crate::config::validate_config(&config)?;
                config
            }
            None => self.loader.load()?,
        };

        if self.init_logging {
            logging::init_from_config(&config.logging);
        }

        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(EventRegistry::new()));
        if !registry.contains(ActionStarted::NAME) {
            register_core_kinds(&registry)?;
        }

        let event_loop = EventLoop::start(&config.event_loop)?;
        let ctx = LoopContext::new(registry, event_loop.handle().clone());
        ctx.bind_loop_thread(event_loop.thread_id());

        info!(
            thread = %event_loop.name(),
            kinds = ctx.registry().len(),
            wait_timeout_ms = config.dispatch.default_wait_timeout_ms,
            "Runtime started"
        );

        Ok(Runtime {
            config,
            ctx,
            event_loop: Mutex::new(Some(event_loop)),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rotor_core::ActionCompleted;

    use super::*;
    use crate::config::{EventLoopConfig, LogLevel};
    use crate::error::{BridgeError, RuntimeError};

    fn config() -> RotorConfig {
        RotorConfig {
            event_loop: EventLoopConfig {
                thread_name: "rotor-test-loop".into(),
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_build_registers_core_kinds() {
        let rt = Runtime::builder()
            .config(config())
            .without_logging()
            .build()
            .unwrap();

        assert!(rt.registry().contains(ActionStarted::NAME));
        assert!(rt.registry().contains(ActionCompleted::NAME));
        assert!(rt.is_running());
        assert!(!rt.bridge().is_loop_thread());
    }

    #[test]
    fn test_prepared_registry_is_kept() {
        let registry = Arc::new(rotor_core::testing::test_registry());
        let rt = Runtime::builder()
            .config(config())
            .registry(Arc::clone(&registry))
            .without_logging()
            .build()
            .unwrap();

        assert!(Arc::ptr_eq(rt.registry(), &registry));
        assert!(rt.registry().contains("EvtOne"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = config();
        config.dispatch.default_wait_timeout_ms = 0;

        let err = Runtime::builder()
            .config(config)
            .without_logging()
            .build()
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Config(_)));
    }

    #[test]
    fn test_blocking_client_uses_configured_timeout() {
        let mut config = config();
        config.dispatch.default_wait_timeout_ms = 10;
        config.logging.level = LogLevel::Debug;
        let rt = Runtime::builder()
            .config(config)
            .registry(Arc::new(rotor_core::testing::test_registry()))
            .without_logging()
            .build()
            .unwrap();

        let node = rt.blocking(&rt.root("world"));
        let kind = rt.registry().kind("EvtTwo").unwrap();
        let started = std::time::Instant::now();
        assert!(node.wait_for(&kind, None).is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_shutdown_releases_blocked_callers() {
        let rt = Runtime::builder()
            .config(config())
            .registry(Arc::new(rotor_core::testing::test_registry()))
            .without_logging()
            .build()
            .unwrap();
        let node = rt.blocking(&rt.root("world"));
        let kind = rt.registry().kind("EvtTwo").unwrap();

        let waiter = std::thread::spawn({
            let node = node.clone();
            move || node.wait_for(&kind, Some(Duration::from_secs(30)))
        });
        while node.node().handler_count() == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }

        rt.shutdown();
        assert!(!rt.is_running());

        let err = waiter.join().unwrap().unwrap_err();
        assert!(matches!(err, BridgeError::Aborted(AbortReason::Shutdown)));

        // A second shutdown is a no-op.
        rt.shutdown();
    }
}
