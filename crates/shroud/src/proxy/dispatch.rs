//! Operator forwarding.
//!
//! Every operation unwraps one proxy and repeats the operation on its target through
//! the full object protocol, so nested proxies peel off one layer per step. Results
//! are returned bare; nothing is ever re-wrapped.
//!
//! For operators with two (or three) operands the proxy may sit on either side. The
//! leftmost proxy operand is unwrapped; with none, the answer is `NotImplemented` and
//! the operand protocol moves on to the next slot.

use crate::{
    args::ArgValues,
    exception::{ExcType, RunResult},
    heap::defer_drop,
    runtime::{BinaryOp, CmpOp, Runtime, UnaryOp},
    value::Value,
};

impl Runtime {
    /// Runs `forward` one level deeper with a new reference to the proxy's target.
    fn with_target<R>(&mut self, proxy: &Value, forward: impl FnOnce(&mut Self, &Value) -> RunResult<R>) -> RunResult<R> {
        let target = self.proxy_target(proxy)?;
        let this = self;
        defer_drop!(target, this);
        this.nested(|rt| forward(rt, target))
    }

    /// Unwraps whichever of `a` and `b` is a proxy, `a` first, and calls `forward` with
    /// the operands in their original order.
    fn dispatch_pair(
        &mut self,
        a: &Value,
        b: &Value,
        op: &'static str,
        forward: impl FnOnce(&mut Self, &Value, &Value) -> RunResult<Value>,
    ) -> RunResult<Value> {
        if self.is_proxy_instance(a) {
            self.with_target(a, |rt, target| forward(rt, target, b))
        } else if self.is_proxy_instance(b) {
            self.with_target(b, |rt, target| forward(rt, a, target))
        } else {
            self.tracer.on_not_implemented(op);
            Ok(Value::NotImplemented)
        }
    }

    /// The proxy slot of a binary operator, as the operand protocol calls it.
    ///
    /// Returns `NotImplemented` when neither operand is a proxy.
    pub fn proxy_binary(&mut self, a: &Value, b: &Value, op: BinaryOp) -> RunResult<Value> {
        self.dispatch_pair(a, b, op.symbol(), |rt, a, b| rt.binary_op(a, b, op))
    }

    /// `proxy <op>= other`.
    ///
    /// When the target's in-place operation hands back the target itself, the result
    /// is the proxy, so the caller's reference keeps its proxy type.
    pub fn proxy_inplace(&mut self, proxy: &Value, other: &Value, op: BinaryOp) -> RunResult<Value> {
        if !self.is_proxy_instance(proxy) {
            return Err(ExcType::type_error(format!(
                "'{}' does not support inplace {}",
                self.type_name(proxy),
                op.symbol()
            )));
        }
        self.with_target(proxy, |rt, target| {
            let result = rt.inplace_op(target, other, op)?;
            if result.is(target) {
                rt.release(result);
                Ok(rt.clone_value(proxy))
            } else {
                Ok(result)
            }
        })
    }

    /// Ternary `pow`: the first proxy among base, exponent and modulus is unwrapped.
    pub fn proxy_power(&mut self, base: &Value, exp: &Value, modulus: Option<&Value>) -> RunResult<Value> {
        if self.is_proxy_instance(base) {
            self.with_target(base, |rt, base| rt.power(base, exp, modulus))
        } else if self.is_proxy_instance(exp) {
            self.with_target(exp, |rt, exp| rt.power(base, exp, modulus))
        } else if let Some(m) = modulus
            && self.is_proxy_instance(m)
        {
            self.with_target(m, |rt, m| rt.power(base, exp, Some(m)))
        } else {
            self.tracer.on_not_implemented(BinaryOp::Pow.symbol());
            Ok(Value::NotImplemented)
        }
    }

    pub(crate) fn proxy_unary(&mut self, proxy: &Value, op: UnaryOp) -> RunResult<Value> {
        self.with_target(proxy, |rt, target| rt.unary_op(target, op))
    }

    /// The proxy slot of a comparison; `NotImplemented` when neither operand is a proxy.
    pub fn proxy_richcompare(&mut self, a: &Value, b: &Value, op: CmpOp) -> RunResult<Value> {
        self.dispatch_pair(a, b, op.symbol(), |rt, a, b| rt.rich_compare(a, b, op))
    }

    pub(crate) fn proxy_int(&mut self, proxy: &Value) -> RunResult<i64> {
        self.with_target(proxy, Self::to_int)
    }

    pub(crate) fn proxy_float(&mut self, proxy: &Value) -> RunResult<f64> {
        self.with_target(proxy, Self::to_float)
    }

    pub(crate) fn proxy_index(&mut self, proxy: &Value) -> RunResult<i64> {
        self.with_target(proxy, Self::to_index)
    }

    pub(crate) fn proxy_hash(&mut self, proxy: &Value) -> RunResult<i64> {
        self.with_target(proxy, Self::hash)
    }

    pub(crate) fn proxy_bool(&mut self, proxy: &Value) -> RunResult<bool> {
        self.with_target(proxy, Self::is_true)
    }

    pub(crate) fn proxy_len(&mut self, proxy: &Value) -> RunResult<usize> {
        self.with_target(proxy, Self::len)
    }

    pub(crate) fn proxy_contains(&mut self, proxy: &Value, item: &Value) -> RunResult<bool> {
        self.with_target(proxy, |rt, target| rt.contains(target, item))
    }

    pub(crate) fn proxy_getitem(&mut self, proxy: &Value, key: &Value) -> RunResult<Value> {
        self.with_target(proxy, |rt, target| rt.getitem(target, key))
    }

    /// Item assignment, or deletion when `value` is `None`.
    pub(crate) fn proxy_setitem(&mut self, proxy: &Value, key: &Value, value: Option<&Value>) -> RunResult<()> {
        self.with_target(proxy, |rt, target| rt.setitem(target, key, value))
    }

    /// The target's iterator; the proxy is not an iterator of its own.
    pub(crate) fn proxy_iter(&mut self, proxy: &Value) -> RunResult<Value> {
        self.with_target(proxy, Self::get_iter)
    }

    /// Advances the target, for proxies wrapping an iterator.
    pub(crate) fn proxy_next(&mut self, proxy: &Value) -> RunResult<Option<Value>> {
        self.with_target(proxy, Self::iter_next)
    }

    pub(crate) fn proxy_call(&mut self, proxy: &Value, args: &ArgValues) -> RunResult<Value> {
        self.with_target(proxy, |rt, target| rt.call(target, args))
    }

    pub(crate) fn proxy_str(&mut self, proxy: &Value) -> RunResult<String> {
        self.with_target(proxy, Self::to_str)
    }

    pub(crate) fn proxy_repr(&mut self, proxy: &Value) -> RunResult<String> {
        self.with_target(proxy, Self::repr)
    }
}
