//! Test doubles.
//!
//! Available to this crate's tests and, with the `testing` feature, to
//! downstream crates.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::action::register_core_kinds;
use crate::dispatch::{HandlerTarget, LoopContext};
use crate::error::{TransportError, TransportResult};
use crate::event::{EventInstance, EventRegistry, KindSpec};
use crate::transport::{Command, Transport};

/// A transport that records every command it is handed.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Command>>,
    fail_next: Mutex<Option<TransportError>>,
}

impl RecordingTransport {
    /// Creates an empty recorder.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns every command sent so far.
    pub fn sent(&self) -> Vec<Command> {
        self.sent.lock().clone()
    }

    /// Returns the number of commands sent so far.
    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }

    /// Makes the next send fail with `err`.
    pub fn fail_next(&self, err: TransportError) {
        *self.fail_next.lock() = Some(err);
    }
}

impl Transport for RecordingTransport {
    fn send(&self, command: Command) -> TransportResult<()> {
        if let Some(err) = self.fail_next.lock().take() {
            return Err(err);
        }
        self.sent.lock().push(command);
        Ok(())
    }
}

/// Collects labels from handlers and receivers in invocation order.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl Recorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a label.
    pub fn push(&self, label: &'static str) {
        self.log.lock().push(label);
    }

    /// A handler target that records `label`.
    pub fn handler(&self, label: &'static str) -> HandlerTarget {
        let this = self.clone();
        HandlerTarget::callback(move |_| this.push(label))
    }

    /// A receiver that records `label`.
    pub fn receiver(&self, label: &'static str) -> impl Fn(&EventInstance) + Send + Sync + 'static {
        let this = self.clone();
        move |_| this.push(label)
    }

    /// Drains the recorded labels.
    pub fn take(&self) -> Vec<&'static str> {
        std::mem::take(&mut *self.log.lock())
    }
}

/// A registry with the core kinds plus a small test hierarchy.
///
/// `EvtOne { param1, param2, param3 }` with children `EvtChild1 { param4 }`
/// and `EvtChild2`, an unrelated `EvtTwo`, and the internal `EvtInternal`.
pub fn test_registry() -> EventRegistry {
    let registry = EventRegistry::new();
    let specs = [
        KindSpec::new("EvtOne")
            .doc("Test event one")
            .field("param1", "Parameter one")
            .field("param2", "Parameter two")
            .field("param3", "Parameter three"),
        KindSpec::new("EvtChild1")
            .doc("Child of EvtOne")
            .parent("EvtOne")
            .field("param4", "Parameter four"),
        KindSpec::new("EvtChild2")
            .doc("Another child of EvtOne")
            .parent("EvtOne"),
        KindSpec::new("EvtTwo")
            .doc("Test event two")
            .field("value", "A value"),
        KindSpec::new("EvtInternal")
            .doc("Internal test event")
            .internal(true),
    ];
    for spec in specs {
        if let Err(e) = registry.declare(spec) {
            panic!("test kind rejected: {e}");
        }
    }
    if let Err(e) = register_core_kinds(&registry) {
        panic!("core kinds rejected: {e}");
    }
    registry
}

/// A context on the current runtime over [`test_registry`].
pub fn test_context() -> Arc<LoopContext> {
    LoopContext::current(Arc::new(test_registry()))
}
