use std::{fmt, rc::Rc};

use crate::{args::ArgValues, exception::RunResult, runtime::Runtime, value::Value};

/// Signature of every native callable.
///
/// Arguments are borrowed; the callee clones whatever it keeps or returns.
pub type NativeFn = dyn Fn(&mut Runtime, &ArgValues) -> RunResult<Value>;

/// A callable implemented in Rust.
///
/// Used for builtin methods, for methods declared on user classes, and for the proxy
/// module surface. Closures must not capture heap values: the collector cannot see them.
#[derive(Clone)]
pub struct NativeFunction {
    name: Rc<str>,
    func: Rc<NativeFn>,
}

impl NativeFunction {
    pub fn new(name: &str, func: impl Fn(&mut Runtime, &ArgValues) -> RunResult<Value> + 'static) -> Self {
        Self {
            name: Rc::from(name),
            func: Rc::new(func),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn call(&self, rt: &mut Runtime, args: &ArgValues) -> RunResult<Value> {
        (self.func)(rt, args)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction").field("name", &self.name).finish_non_exhaustive()
    }
}

/// A method bound to its receiver, produced by attribute lookup.
#[derive(Debug)]
pub(crate) struct BoundMethod {
    receiver: Value,
    function: NativeFunction,
}

impl BoundMethod {
    pub fn new(receiver: Value, function: NativeFunction) -> Self {
        Self { receiver, function }
    }

    pub fn receiver(&self) -> &Value {
        &self.receiver
    }

    pub fn function(&self) -> &NativeFunction {
        &self.function
    }

    /// Detaches the receiver for the cycle collector.
    pub fn take_receiver(&mut self) -> Value {
        std::mem::replace(&mut self.receiver, Value::None)
    }
}
