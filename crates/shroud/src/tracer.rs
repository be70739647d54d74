//! Observation hooks for proxy lifecycle and dispatch events.
//!
//! The runtime owns one boxed [`ProxyTracer`] and calls its hooks at fixed points:
//! proxy construction, target replacement, clear (explicit or by the cycle
//! collector), binary dispatch falling through to `NotImplemented`, and the end of
//! every collection. All hooks default to no-ops.
//!
//! # Implementations
//!
//! | Tracer | Purpose |
//! |---|---|
//! | [`NoopTracer`] | Default; nothing recorded |
//! | [`LogTracer`] | Emits `tracing` events under the `shroud::proxy` target |
//! | [`RecordingTracer`] | Keeps every event for later inspection |

use std::{cell::RefCell, fmt, rc::Rc};

use crate::heap::HeapId;

/// Hooks invoked by the runtime.
pub trait ProxyTracer: fmt::Debug {
    /// A proxy was constructed and bound to its first target.
    #[inline(always)]
    fn on_proxy_create(&mut self, _proxy: HeapId) {}

    /// A live proxy's target was replaced, by re-initialisation or `set_target`.
    #[inline(always)]
    fn on_target_replace(&mut self, _proxy: HeapId) {}

    /// A proxy's clear hook released its target.
    #[inline(always)]
    fn on_proxy_clear(&mut self, _proxy: HeapId) {}

    /// Binary dispatch found no proxy operand and returned `NotImplemented`.
    #[inline(always)]
    fn on_not_implemented(&mut self, _op: &'static str) {}

    /// A cycle collection finished.
    #[inline(always)]
    fn on_collect(&mut self, _freed: usize) {}
}

/// Tracer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl ProxyTracer for NoopTracer {}

/// Forwards events to the `tracing` ecosystem.
///
/// Lifecycle events are logged at `debug`, dispatch fall-through at `trace`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTracer;

impl ProxyTracer for LogTracer {
    fn on_proxy_create(&mut self, proxy: HeapId) {
        tracing::debug!(target: "shroud::proxy", proxy = proxy.index(), "proxy created");
    }

    fn on_target_replace(&mut self, proxy: HeapId) {
        tracing::debug!(target: "shroud::proxy", proxy = proxy.index(), "proxy target replaced");
    }

    fn on_proxy_clear(&mut self, proxy: HeapId) {
        tracing::debug!(target: "shroud::proxy", proxy = proxy.index(), "proxy cleared");
    }

    fn on_not_implemented(&mut self, op: &'static str) {
        tracing::trace!(target: "shroud::proxy", op, "no proxy operand, returning NotImplemented");
    }

    fn on_collect(&mut self, freed: usize) {
        tracing::debug!(target: "shroud::gc", freed, "cycle collection finished");
    }
}

/// A single recorded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    ProxyCreated { proxy: HeapId },
    TargetReplaced { proxy: HeapId },
    ProxyCleared { proxy: HeapId },
    NotImplemented { op: &'static str },
    Collected { freed: usize },
}

/// Shared view of the events a [`RecordingTracer`] collected.
///
/// The tracer itself is moved into the runtime; keep the log handle to read events.
#[derive(Debug, Clone, Default)]
pub struct TraceLog(Rc<RefCell<Vec<TraceEvent>>>);

impl TraceLog {
    /// Snapshot of all events so far, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<TraceEvent> {
        self.0.borrow().clone()
    }

    /// Removes and returns all events so far.
    pub fn take(&self) -> Vec<TraceEvent> {
        std::mem::take(&mut *self.0.borrow_mut())
    }
}

/// Tracer that records every event.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    log: TraceLog,
}

impl RecordingTracer {
    /// Creates a tracer together with the handle used to read what it records.
    #[must_use]
    pub fn new() -> (Self, TraceLog) {
        let log = TraceLog::default();
        (Self { log: log.clone() }, log)
    }

    fn push(&self, event: TraceEvent) {
        self.log.0.borrow_mut().push(event);
    }
}

impl ProxyTracer for RecordingTracer {
    fn on_proxy_create(&mut self, proxy: HeapId) {
        self.push(TraceEvent::ProxyCreated { proxy });
    }

    fn on_target_replace(&mut self, proxy: HeapId) {
        self.push(TraceEvent::TargetReplaced { proxy });
    }

    fn on_proxy_clear(&mut self, proxy: HeapId) {
        self.push(TraceEvent::ProxyCleared { proxy });
    }

    fn on_not_implemented(&mut self, op: &'static str) {
        self.push(TraceEvent::NotImplemented { op });
    }

    fn on_collect(&mut self, freed: usize) {
        self.push(TraceEvent::Collected { freed });
    }
}
