//! Synchronous access to loop-owned objects from other threads.
//!
//! The core is single-loop and knows nothing about threads. A [`SyncBridge`]
//! lets a foreign thread hand work to the loop and block for the result:
//!
//! - On the loop thread, [`call`](SyncBridge::call) runs the closure inline.
//! - On any other thread it is spawned on the loop and the caller blocks.
//! - [`run`](SyncBridge::run) takes a suspending operation. It can only be
//!   used from a foreign thread, since blocking the loop on itself would
//!   never finish.
//!
//! Every blocked caller also watches the loop's abort signal, so a lost
//! connection or a shutdown releases all of them at once.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use rotor_core::{AsDispatcher, LoopContext};
use tokio::task::JoinHandle;
use tracing::trace;

use crate::error::{BridgeError, BridgeResult};

/// Marshals calls onto the event loop.
#[derive(Clone)]
pub struct SyncBridge {
    ctx: Arc<LoopContext>,
}

impl SyncBridge {
    /// Creates a bridge onto the loop behind `ctx`.
    pub fn new(ctx: Arc<LoopContext>) -> Self {
        Self { ctx }
    }

    /// Creates a bridge onto the loop that owns `object`.
    pub fn for_object<T: AsDispatcher + ?Sized>(object: &T) -> Self {
        Self::new(Arc::clone(object.dispatcher().context()))
    }

    /// Returns the loop context calls are scheduled on.
    pub fn context(&self) -> &Arc<LoopContext> {
        &self.ctx
    }

    /// Returns true on the loop thread, or anywhere when no loop thread is
    /// bound.
    pub fn is_loop_thread(&self) -> bool {
        self.ctx.is_loop_thread()
    }

    /// Wraps a loop-owned object for use from other threads.
    pub fn wrap<T>(&self, object: Arc<T>) -> Bridged<T>
    where
        T: AsDispatcher + Send + Sync + 'static,
    {
        Bridged {
            bridge: self.clone(),
            inner: object,
        }
    }

    /// Runs a synchronous closure on the loop and returns its result.
    pub fn call<F, R>(&self, f: F) -> BridgeResult<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_loop_thread() {
            return Ok(f());
        }
        self.check_aborted()?;
        trace!("Marshalling call onto the event loop");
        let task = self.ctx.handle().spawn(async move { f() });
        self.block_on_task(task)
    }

    /// Like [`call`](Self::call), for closures that return a `Result`.
    /// Like [`call`](Self::call), flattening the closure's own error.
    pub fn try_call<F, R, E>(&self, f: F) -> BridgeResult<R>
    where
        F: FnOnce() -> Result<R, E> + Send + 'static,
        R: Send + 'static,
        E: Into<BridgeError> + Send + 'static,
    {
        self.call(f)?.map_err(Into::into)
    }

    /// Runs a suspending operation on the loop and blocks for its output.
    ///
    /// # Errors
    ///
    /// [`BridgeError::OnLoopThread`] when called on the loop thread.
    pub fn run<F, Fut>(&self, f: F) -> BridgeResult<Fut::Output>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        if self.is_loop_thread() {
            return Err(BridgeError::OnLoopThread);
        }
        self.check_aborted()?;
        trace!("Marshalling suspending call onto the event loop");
        let task = self.ctx.handle().spawn(async move { f().await });
        self.block_on_task(task)
    }

    /// Like [`run`](Self::run), for operations that return a `Result`.
    /// Like [`run`](Self::run), flattening the future's own error.
    pub fn try_run<F, Fut, R, E>(&self, f: F) -> BridgeResult<R>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: Send + 'static,
        E: Into<BridgeError> + Send + 'static,
    {
        self.run(f)?.map_err(Into::into)
    }

    fn check_aborted(&self) -> BridgeResult<()> {
        match self.ctx.abort_signal().reason() {
            Some(reason) => Err(BridgeError::Aborted(reason)),
            None => Ok(()),
        }
    }

    /// Blocks the current thread until `task` finishes or the abort signal
    /// fires. An aborted task keeps running on the loop.
    fn block_on_task<R>(&self, task: JoinHandle<R>) -> BridgeResult<R> {
        let abort = self.ctx.abort_signal();
        futures::executor::block_on(async {
            tokio::select! {
                biased;
                joined = task => joined.map_err(|err| {
                    if err.is_panic() {
                        BridgeError::Spawn(err.to_string())
                    } else if let Some(reason) = abort.reason() {
                        // The loop was torn down after an abort.
                        BridgeError::Aborted(reason)
                    } else {
                        BridgeError::LoopClosed
                    }
                }),
                reason = abort.aborted() => Err(BridgeError::Aborted(reason)),
            }
        })
    }
}

impl fmt::Debug for SyncBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncBridge")
            .field("loop_thread", &self.ctx.loop_thread())
            .finish()
    }
}

/// A loop-owned object paired with the bridge that reaches it.
///
/// ```rust,ignore
/// let robot = bridge.wrap(Arc::new(robot));
/// let battery = robot.peek(|r| r.battery_voltage());
/// let head = robot.call_wrapped(|r| r.head())?;
/// head.try_run(|head| async move { head.move_to(0.5).await })?;
/// ```
pub struct Bridged<T> {
    bridge: SyncBridge,
    inner: Arc<T>,
}

impl<T> Clone for Bridged<T> {
    fn clone(&self) -> Self {
        Self {
            bridge: self.bridge.clone(),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Bridged<T>
where
    T: AsDispatcher + Send + Sync + 'static,
{
    /// Wraps `object` with a bridge onto its own loop.
    pub fn new(object: Arc<T>) -> Self {
        SyncBridge::for_object(&*object).wrap(object)
    }

    /// Returns the bridge used for every call on the wrapped object.
    pub fn bridge(&self) -> &SyncBridge {
        &self.bridge
    }

    /// Returns the wrapped object for use on the loop thread.
    pub fn inner(&self) -> &Arc<T> {
        &self.inner
    }

    /// Runs `f` against the object on the loop.
    pub fn call<F, R>(&self, f: F) -> BridgeResult<R>
    where
        F: FnOnce(&T) -> R + Send + 'static,
        R: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        self.bridge.call(move || f(&inner))
    }

    pub fn try_call<F, R, E>(&self, f: F) -> BridgeResult<R>
    where
        F: FnOnce(&T) -> Result<R, E> + Send + 'static,
        R: Send + 'static,
        E: Into<BridgeError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        self.bridge.try_call(move || f(&inner))
    }

    /// Runs a suspending operation against the object on the loop.
    pub fn run<F, Fut>(&self, f: F) -> BridgeResult<Fut::Output>
    where
        F: FnOnce(Arc<T>) -> Fut + Send + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        self.bridge.run(move || f(inner))
    }

    pub fn try_run<F, Fut, R, E>(&self, f: F) -> BridgeResult<R>
    where
        F: FnOnce(Arc<T>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: Send + 'static,
        E: Into<BridgeError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        self.bridge.try_run(move || f(inner))
    }

    /// Reads from the object on the current thread, without the loop.
    ///
    /// Only for plain property reads that take no loop-owned locks across
    /// calls.
    pub fn peek<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        f(&self.inner)
    }

    /// Runs `f` on the loop and wraps the object it returns.
    pub fn call_wrapped<F, U>(&self, f: F) -> BridgeResult<Bridged<U>>
    where
        F: FnOnce(&T) -> Arc<U> + Send + 'static,
        U: AsDispatcher + Send + Sync + 'static,
    {
        let object = self.call(f)?;
        Ok(self.bridge.wrap(object))
    }
}

impl<T: fmt::Debug> fmt::Debug for Bridged<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Bridged").field(&self.inner).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use rotor_core::testing::test_registry;
    use rotor_core::{AbortReason, Dispatcher, EventError, HandlerTarget, Outcome};

    use super::*;
    use crate::config::{EventLoopConfig, RotorConfig};
    use crate::event_loop::EventLoop;
    use crate::runtime::Runtime;

    fn runtime() -> Runtime {
        Runtime::builder()
            .config(RotorConfig::default())
            .registry(Arc::new(test_registry()))
            .without_logging()
            .build()
            .unwrap()
    }

    #[derive(Debug)]
    struct Counter {
        node: Dispatcher,
        hits: AtomicUsize,
    }

    impl Counter {
        fn hit(&self) -> usize {
            self.hits.fetch_add(1, Ordering::SeqCst) + 1
        }
    }

    impl AsDispatcher for Counter {
        fn dispatcher(&self) -> &Dispatcher {
            &self.node
        }
    }

    #[test]
    fn test_foreign_call_runs_on_loop() {
        let rt = runtime();
        let bridge = rt.bridge();
        assert!(!bridge.is_loop_thread());

        let on_loop = bridge.call({
            let bridge = bridge.clone();
            move || bridge.is_loop_thread()
        });
        assert!(on_loop.unwrap());
    }

    #[test]
    fn test_loop_thread_call_matches_unwrapped() {
        let rt = runtime();
        let counter = Arc::new(Counter {
            node: rt.root("counter"),
            hits: AtomicUsize::new(0),
        });
        let bridged = rt.bridge().wrap(Arc::clone(&counter));

        // Unwrapped, then bridged from a foreign thread.
        assert_eq!(counter.hit(), 1);
        assert_eq!(bridged.call(|c| c.hit()).unwrap(), 2);

        // Bridged from the loop thread runs inline with the same effect.
        let nested = bridged.clone();
        let inline = bridged
            .call(move |c| (c.hit(), nested.call(|c| c.hit())))
            .unwrap();
        assert_eq!(inline.0, 3);
        assert_eq!(inline.1.unwrap(), 4);
        assert_eq!(bridged.peek(|c| c.hits.load(Ordering::SeqCst)), 4);
    }

    #[test]
    fn test_run_on_loop_thread_fails() {
        let rt = runtime();
        let bridge = rt.bridge();

        let nested = bridge.clone();
        let result = bridge.call(move || nested.run(|| async { 1 })).unwrap();
        assert!(matches!(result, Err(BridgeError::OnLoopThread)));
    }

    #[test]
    fn test_try_run_propagates_loop_errors() {
        let rt = runtime();
        let node = rt.root("robot");
        let kind = rt.registry().kind("EvtTwo").unwrap();

        let err = rt
            .bridge()
            .try_run(move || async move {
                node.wait_for(&kind, Some(Duration::from_millis(10))).await
            })
            .unwrap_err();
        assert!(matches!(err, BridgeError::Event(EventError::Timeout { .. })));
    }

    #[test]
    fn test_abort_unblocks_three_foreign_threads() {
        let rt = runtime();
        let node = rt.root("robot");
        let kind = rt.registry().kind("EvtTwo").unwrap();

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let node = node.clone();
                let kind = Arc::clone(&kind);
                let bridge = rt.bridge();
                thread::spawn(move || {
                    bridge.try_run(move || async move { node.wait_for(&kind, None).await })
                })
            })
            .collect();

        while node.handler_count() < 3 {
            thread::sleep(Duration::from_millis(1));
        }
        rt.abort(AbortReason::ConnectionAborted("socket reset".into()));

        for waiter in waiters {
            let err = waiter.join().unwrap().unwrap_err();
            let BridgeError::Aborted(AbortReason::ConnectionAborted(msg)) = &err else {
                panic!("unexpected error: {err:?}");
            };
            assert_eq!(msg, "socket reset");
        }
    }

    #[test]
    fn test_abort_unblocks_a_stuck_call() {
        let rt = runtime();
        let bridge = rt.bridge();

        let blocked = thread::spawn({
            let bridge = bridge.clone();
            move || bridge.run(|| std::future::pending::<()>())
        });
        thread::sleep(Duration::from_millis(20));
        rt.abort(AbortReason::Shutdown);

        let err = blocked.join().unwrap().unwrap_err();
        assert!(matches!(err, BridgeError::Aborted(AbortReason::Shutdown)));

        // Later calls fail fast.
        assert!(matches!(bridge.call(|| ()), Err(BridgeError::Aborted(_))));
    }

    #[test]
    fn test_call_after_shutdown_reports_closed_loop() {
        let mut event_loop = EventLoop::start(&EventLoopConfig::default()).unwrap();
        let ctx = LoopContext::new(Arc::new(test_registry()), event_loop.handle().clone());
        ctx.bind_loop_thread(event_loop.thread_id());
        let bridge = SyncBridge::new(ctx);

        event_loop.shutdown();
        assert!(matches!(bridge.call(|| 1), Err(BridgeError::LoopClosed)));
    }

    #[test]
    fn test_call_wrapped_composes() {
        let rt = runtime();
        let parent = Arc::new(Counter {
            node: rt.root("parent"),
            hits: AtomicUsize::new(0),
        });
        let bridged = rt.bridge().wrap(parent);

        let child = bridged
            .call_wrapped(|p| {
                Arc::new(Counter {
                    node: p.node.new_child("child"),
                    hits: AtomicUsize::new(10),
                })
            })
            .unwrap();

        assert_eq!(child.call(|c| c.hit()).unwrap(), 11);
        assert_eq!(child.peek(|c| c.node.name().to_string()), "child");

        let seen = Arc::new(AtomicUsize::new(0));
        let handler_seen = Arc::clone(&seen);
        let kind = rt.registry().kind("EvtTwo").unwrap();
        let handler_kind = Arc::clone(&kind);
        child
            .try_call(move |c| {
                c.node.add_event_handler(
                    &handler_kind,
                    HandlerTarget::callback(move |_| {
                        handler_seen.fetch_add(1, Ordering::SeqCst);
                        Outcome::Continue
                    }),
                )
            })
            .unwrap();

        bridged
            .try_run(move |p| async move {
                p.node.dispatch_fields(&kind, [("value", serde_json::json!(1))])?.await;
                Ok::<_, EventError>(())
            })
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
