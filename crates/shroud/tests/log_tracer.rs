//! `LogTracer` output as seen by a `tracing` subscriber.

use std::{
    io,
    sync::{Arc, Mutex},
};

use shroud::{BinaryOp, LogTracer, ResourceLimits, Runtime, Value};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl io::Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Runs `f` with a subscriber capturing everything under `filter`.
fn captured(filter: &str, f: impl FnOnce()) -> String {
    let capture = Capture::default();
    let writer = capture.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    capture.contents()
}

#[test]
fn lifecycle_events_are_logged_at_debug() {
    let output = captured("shroud=debug", || {
        let mut rt = Runtime::with_tracer(ResourceLimits::default(), Box::new(LogTracer));
        let proxy = rt.create_proxy(&Value::Int(1)).unwrap();
        rt.proxy_set_target(&proxy, &Value::Int(2)).unwrap();
        rt.proxy_clear(&proxy).unwrap();
        rt.collect_cycles();
        rt.release(proxy);
    });

    assert!(output.contains("proxy created"), "{output}");
    assert!(output.contains("proxy target replaced"), "{output}");
    assert!(output.contains("proxy cleared"), "{output}");
    assert!(output.contains("cycle collection finished"), "{output}");
    assert!(output.contains("shroud::proxy"), "{output}");
    assert!(output.contains("shroud::gc"), "{output}");
}

#[test]
fn dispatch_fall_through_is_logged_at_trace() {
    let run = || {
        let mut rt = Runtime::with_tracer(ResourceLimits::default(), Box::new(LogTracer));
        let result = rt.proxy_binary(&Value::Int(1), &Value::Int(2), BinaryOp::Sub).unwrap();
        assert!(result.is_not_implemented());
    };

    let quiet = captured("shroud=debug", run);
    assert!(!quiet.contains("NotImplemented"), "{quiet}");

    let verbose = captured("shroud=trace", run);
    assert!(verbose.contains("no proxy operand, returning NotImplemented"), "{verbose}");
    assert!(verbose.contains("op=\"-\""), "{verbose}");
}

#[test]
fn tracer_can_be_swapped_at_runtime() {
    let output = captured("shroud=debug", || {
        let mut rt = Runtime::new();
        let first = rt.create_proxy(&Value::Int(1)).unwrap();
        let previous = rt.set_tracer(Box::new(LogTracer));
        assert!(format!("{previous:?}").contains("NoopTracer"));
        let second = rt.create_proxy(&Value::Int(2)).unwrap();
        rt.release(first);
        rt.release(second);
    });

    assert_eq!(output.matches("proxy created").count(), 1, "{output}");
}
