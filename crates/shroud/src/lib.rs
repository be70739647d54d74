#![doc = include_str!("../../../README.md")]
#![expect(clippy::cast_possible_truncation, reason = "float to int conversions are range checked")]
#![expect(clippy::cast_possible_wrap, reason = "hash arithmetic mirrors CPython")]
#![expect(clippy::cast_sign_loss, reason = "hash arithmetic mirrors CPython")]
// first to include defer_drop macro
mod heap;

mod args;
mod exception;
mod object;
mod proxy;
mod py_hash;
mod resource;
mod runtime;
pub mod tracer;
mod types;
mod value;

pub use crate::{
    args::ArgValues,
    exception::{ExcType, RunError, RunResult, SimpleException},
    heap::{HeapId, HeapStats},
    object::Object,
    proxy::{PROXY_API_VERSION, ProxyApi, non_overridable},
    resource::{
        DEFAULT_GC_INTERVAL, DEFAULT_MAX_RECURSION_DEPTH, LimitedTracker, NoLimitTracker, ResourceError,
        ResourceLimits, ResourceTracker,
    },
    runtime::{BinaryOp, CmpOp, Runtime, UnaryOp},
    tracer::{LogTracer, NoopTracer, ProxyTracer, RecordingTracer, TraceEvent, TraceLog},
    types::{Accessor, ClassAttr, NativeFunction, Type},
    value::Value,
};
