//! The dedicated event loop thread.
//!
//! All dispatch and action state is driven by one current-thread tokio
//! runtime on its own OS thread. Tasks spawned through [`EventLoop::handle`]
//! run there until [`EventLoop::shutdown`].

use std::fmt;
use std::thread::{self, JoinHandle, ThreadId};

use tokio::runtime::{Builder, Handle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::EventLoopConfig;
use crate::error::{RuntimeError, RuntimeResult};

/// A running event loop thread.
pub struct EventLoop {
    name: String,
    handle: Handle,
    shutdown: CancellationToken,
    thread_id: ThreadId,
    thread: Option<JoinHandle<()>>,
}

impl EventLoop {
    /// Starts the loop thread.
    pub fn start(config: &EventLoopConfig) -> RuntimeResult<Self> {
        let runtime = Builder::new_current_thread()
            .enable_time()
            .thread_name(config.thread_name.clone())
            .build()
            .map_err(RuntimeError::EventLoop)?;
        let handle = runtime.handle().clone();
        let shutdown = CancellationToken::new();

        let token = shutdown.clone();
        let thread = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || {
                debug!("Event loop running");
                runtime.block_on(token.cancelled());
                // Dropping the runtime cancels every task still pending.
                drop(runtime);
                debug!("Event loop stopped");
            })
            .map_err(RuntimeError::EventLoop)?;

        let thread_id = thread.thread().id();
        info!(thread = %config.thread_name, ?thread_id, "Event loop started");

        Ok(Self {
            name: config.thread_name.clone(),
            handle,
            shutdown,
            thread_id,
            thread: Some(thread),
        })
    }

    /// Returns the handle tasks are spawned on.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Id of the loop thread, used to detect calls made from it.
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True until [`shutdown`](Self::shutdown) has been called.
    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    /// Stops the loop and joins its thread.
    ///
    /// From the loop thread itself the join is skipped; the thread exits once
    /// the current task yields.
    pub fn shutdown(&mut self) {
        self.shutdown.cancel();
        let Some(thread) = self.thread.take() else {
            return;
        };

        if thread::current().id() == self.thread_id {
            warn!(thread = %self.name, "Event loop shut down from its own thread, not joining");
            return;
        }
        if thread.join().is_err() {
            error!(thread = %self.name, "Event loop thread panicked");
        } else {
            info!(thread = %self.name, "Event loop shut down");
        }
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("name", &self.name)
            .field("thread_id", &self.thread_id)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    #[test]
    fn test_tasks_run_on_loop_thread() {
        let mut event_loop = EventLoop::start(&EventLoopConfig::default()).unwrap();

        let (tx, rx) = mpsc::channel();
        event_loop.handle().spawn(async move {
            let current = thread::current();
            let _ = tx.send((current.id(), current.name().map(str::to_string)));
        });

        let (id, name) = rx.recv().unwrap();
        assert_eq!(id, event_loop.thread_id());
        assert_eq!(name.as_deref(), Some("rotor-event-loop"));

        event_loop.shutdown();
        assert!(!event_loop.is_running());
    }

    #[test]
    fn test_shutdown_cancels_pending_tasks() {
        let mut event_loop = EventLoop::start(&EventLoopConfig::default()).unwrap();
        let pending = event_loop.handle().spawn(std::future::pending::<()>());

        event_loop.shutdown();

        let err = futures::executor::block_on(pending).unwrap_err();
        assert!(err.is_cancelled());
    }
}
