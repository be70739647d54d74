//! Binary, in-place and unary arithmetic.
//!
//! Binary operations follow the Python operand protocol: the left operand's slot is
//! tried first; if it returns `NotImplemented` and the right operand has a different
//! slot, that slot is tried with the reflected method. Every value has one of three
//! slots:
//! 1. `Native`: builtin numbers and sequences, handled here
//! 2. `Instance`: user classes, through `__add__`/`__radd__`/...
//! 3. `Proxy`: the proxy dispatcher, which unwraps whichever operand is a proxy
//!
//! Integers are 64-bit; results that do not fit raise `OverflowError`.

use num_integer::Integer;
use num_traits::ToPrimitive;

use super::Runtime;
use crate::{
    exception::{ExcType, RunError, RunResult},
    heap::{DropWithHeap, HeapData, HeapId},
    value::Value,
};

/// A two-operand arithmetic or bitwise operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    TrueDiv,
    FloorDiv,
    Mod,
    DivMod,
    Pow,
    LShift,
    RShift,
    And,
    Or,
    Xor,
}

impl BinaryOp {
    /// Operator as written in error messages.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::TrueDiv => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::DivMod => "divmod()",
            Self::Pow => "** or pow()",
            Self::LShift => "<<",
            Self::RShift => ">>",
            Self::And => "&",
            Self::Or => "|",
            Self::Xor => "^",
        }
    }

    fn inplace_symbol(self) -> &'static str {
        match self {
            Self::Add => "+=",
            Self::Sub => "-=",
            Self::Mul => "*=",
            Self::TrueDiv => "/=",
            Self::FloorDiv => "//=",
            Self::Mod => "%=",
            Self::DivMod => "divmod()",
            Self::Pow => "**=",
            Self::LShift => "<<=",
            Self::RShift => ">>=",
            Self::And => "&=",
            Self::Or => "|=",
            Self::Xor => "^=",
        }
    }

    #[must_use]
    pub fn dunder(self) -> &'static str {
        match self {
            Self::Add => "__add__",
            Self::Sub => "__sub__",
            Self::Mul => "__mul__",
            Self::TrueDiv => "__truediv__",
            Self::FloorDiv => "__floordiv__",
            Self::Mod => "__mod__",
            Self::DivMod => "__divmod__",
            Self::Pow => "__pow__",
            Self::LShift => "__lshift__",
            Self::RShift => "__rshift__",
            Self::And => "__and__",
            Self::Or => "__or__",
            Self::Xor => "__xor__",
        }
    }

    #[must_use]
    pub fn reflected(self) -> &'static str {
        match self {
            Self::Add => "__radd__",
            Self::Sub => "__rsub__",
            Self::Mul => "__rmul__",
            Self::TrueDiv => "__rtruediv__",
            Self::FloorDiv => "__rfloordiv__",
            Self::Mod => "__rmod__",
            Self::DivMod => "__rdivmod__",
            Self::Pow => "__rpow__",
            Self::LShift => "__rlshift__",
            Self::RShift => "__rrshift__",
            Self::And => "__rand__",
            Self::Or => "__ror__",
            Self::Xor => "__rxor__",
        }
    }

    /// The in-place method name; `divmod` has none.
    #[must_use]
    pub fn inplace(self) -> Option<&'static str> {
        Some(match self {
            Self::Add => "__iadd__",
            Self::Sub => "__isub__",
            Self::Mul => "__imul__",
            Self::TrueDiv => "__itruediv__",
            Self::FloorDiv => "__ifloordiv__",
            Self::Mod => "__imod__",
            Self::DivMod => return None,
            Self::Pow => "__ipow__",
            Self::LShift => "__ilshift__",
            Self::RShift => "__irshift__",
            Self::And => "__iand__",
            Self::Or => "__ior__",
            Self::Xor => "__ixor__",
        })
    }
}

/// A one-operand operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Pos,
    Abs,
    Invert,
}

impl UnaryOp {
    #[must_use]
    pub fn dunder(self) -> &'static str {
        match self {
            Self::Neg => "__neg__",
            Self::Pos => "__pos__",
            Self::Abs => "__abs__",
            Self::Invert => "__invert__",
        }
    }

    fn type_error(self, type_name: &str) -> RunError {
        match self {
            Self::Neg => ExcType::unary_type_error("-", type_name),
            Self::Pos => ExcType::unary_type_error("+", type_name),
            Self::Invert => ExcType::unary_type_error("~", type_name),
            Self::Abs => ExcType::type_error(format!("bad operand type for abs(): '{type_name}'")),
        }
    }
}

/// Which implementation handles operators for a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    Native,
    Instance(HeapId),
    Proxy,
}

/// A builtin number with `bool` folded into `int`.
#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

fn as_num(value: &Value) -> Option<Num> {
    match value {
        Value::Bool(b) => Some(Num::Int(i64::from(*b))),
        Value::Int(i) => Some(Num::Int(*i)),
        Value::Float(f) => Some(Num::Float(*f)),
        _ => None,
    }
}

fn as_int(value: &Value) -> Option<i64> {
    match as_num(value)? {
        Num::Int(i) => Some(i),
        Num::Float(_) => None,
    }
}

fn int_overflow() -> RunError {
    ExcType::overflow_error("integer overflow")
}

impl Runtime {
    pub(crate) fn slot_of(&self, value: &Value) -> Slot {
        match self.data_of(value) {
            Some(HeapData::Instance(instance)) => Slot::Instance(instance.class_id()),
            Some(HeapData::Proxy(_)) => Slot::Proxy,
            _ => Slot::Native,
        }
    }

    /// `a <op> b`.
    pub fn binary_op(&mut self, a: &Value, b: &Value, op: BinaryOp) -> RunResult<Value> {
        if op == BinaryOp::Pow {
            return self.power(a, b, None);
        }
        match self.try_binary(a, b, op)? {
            Some(result) => Ok(result),
            None => Err(ExcType::binary_type_error(
                op.symbol(),
                &self.type_name(a),
                &self.type_name(b),
            )),
        }
    }

    /// Runs the operand protocol, `None` when every slot declined.
    fn try_binary(&mut self, a: &Value, b: &Value, op: BinaryOp) -> RunResult<Option<Value>> {
        if op == BinaryOp::Pow {
            return self.try_power(a, b, None);
        }
        let left = self.slot_of(a);
        let right = self.slot_of(b);
        let result = self.binary_slot(left, a, b, op, false)?;
        if !result.is_not_implemented() {
            return Ok(Some(result));
        }
        if right != left {
            let result = self.binary_slot(right, a, b, op, true)?;
            if !result.is_not_implemented() {
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    fn binary_slot(&mut self, slot: Slot, a: &Value, b: &Value, op: BinaryOp, reflected: bool) -> RunResult<Value> {
        match slot {
            Slot::Native => self.native_binary(a, b, op),
            Slot::Proxy => self.proxy_binary(a, b, op),
            Slot::Instance(_) => {
                let called = if reflected {
                    self.call_dunder(b, op.reflected(), &[a])?
                } else {
                    self.call_dunder(a, op.dunder(), &[b])?
                };
                Ok(called.unwrap_or(Value::NotImplemented))
            }
        }
    }

    /// `a <op>= b`: the in-place method when the left operand has one, else the binary
    /// operation.
    pub fn inplace_op(&mut self, a: &Value, b: &Value, op: BinaryOp) -> RunResult<Value> {
        match self.slot_of(a) {
            Slot::Proxy => return self.proxy_inplace(a, b, op),
            Slot::Instance(_) => {
                if let Some(name) = op.inplace()
                    && let Some(result) = self.call_dunder(a, name, &[b])?
                {
                    if !result.is_not_implemented() {
                        return Ok(result);
                    }
                }
            }
            Slot::Native => {
                if op == BinaryOp::Add
                    && let Some(HeapData::List(_)) = self.data_of(a)
                {
                    let items = self.collect_iter(b)?;
                    if let Some(id) = a.ref_id()
                        && let HeapData::List(list) = self.heap.get_mut(id)
                    {
                        list.extend(items);
                    }
                    return Ok(self.clone_value(a));
                }
                if op == BinaryOp::Mul
                    && let Some(HeapData::List(items)) = self.data_of(a)
                    && let Some(count) = as_int(b)
                {
                    let repeated = repeat_items(self, items, repeat_count(count))?;
                    if let Some(id) = a.ref_id()
                        && let HeapData::List(list) = self.heap.get_mut(id)
                    {
                        let old = std::mem::replace(list, repeated);
                        old.drop_with_heap(&mut self.heap);
                    }
                    return Ok(self.clone_value(a));
                }
            }
        }
        match self.try_binary(a, b, op)? {
            Some(result) => Ok(result),
            None => Err(ExcType::binary_type_error(
                op.inplace_symbol(),
                &self.type_name(a),
                &self.type_name(b),
            )),
        }
    }

    /// `pow(base, exp[, modulus])`.
    pub fn power(&mut self, base: &Value, exp: &Value, modulus: Option<&Value>) -> RunResult<Value> {
        if let Some(result) = self.try_power(base, exp, modulus)? {
            return Ok(result);
        }
        match modulus {
            None => Err(ExcType::binary_type_error(
                BinaryOp::Pow.symbol(),
                &self.type_name(base),
                &self.type_name(exp),
            )),
            Some(m) => Err(ExcType::type_error(format!(
                "unsupported operand type(s) for ** or pow(): '{}', '{}', '{}'",
                self.type_name(base),
                self.type_name(exp),
                self.type_name(m)
            ))),
        }
    }

    /// Ternary operand protocol: the slots of base, exponent and modulus in turn, each
    /// tried once.
    fn try_power(&mut self, base: &Value, exp: &Value, modulus: Option<&Value>) -> RunResult<Option<Value>> {
        let mut tried: Vec<Slot> = Vec::with_capacity(3);
        let operands = [Some(base), Some(exp), modulus];
        for (position, operand) in operands.into_iter().enumerate() {
            let Some(operand) = operand else { continue };
            let slot = self.slot_of(operand);
            if tried.contains(&slot) {
                continue;
            }
            tried.push(slot);
            let result = match slot {
                Slot::Native => self.native_pow(base, exp, modulus)?,
                Slot::Proxy => self.proxy_power(base, exp, modulus)?,
                Slot::Instance(_) => {
                    let called = match (position, modulus) {
                        (0, None) => self.call_dunder(base, "__pow__", &[exp])?,
                        (0, Some(m)) => self.call_dunder(base, "__pow__", &[exp, m])?,
                        (1, None) => self.call_dunder(exp, "__rpow__", &[base])?,
                        _ => None,
                    };
                    called.unwrap_or(Value::NotImplemented)
                }
            };
            if !result.is_not_implemented() {
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    /// `-v`, `+v`, `abs(v)`, `~v`.
    pub fn unary_op(&mut self, value: &Value, op: UnaryOp) -> RunResult<Value> {
        match self.slot_of(value) {
            Slot::Proxy => self.proxy_unary(value, op),
            Slot::Instance(_) => match self.call_dunder(value, op.dunder(), &[])? {
                Some(result) => Ok(result),
                None => Err(op.type_error(&self.type_name(value))),
            },
            Slot::Native => match (as_num(value), op) {
                (Some(Num::Int(i)), UnaryOp::Neg) => i.checked_neg().map(Value::Int).ok_or_else(int_overflow),
                (Some(Num::Int(i)), UnaryOp::Pos) => Ok(Value::Int(i)),
                (Some(Num::Int(i)), UnaryOp::Abs) => i.checked_abs().map(Value::Int).ok_or_else(int_overflow),
                (Some(Num::Int(i)), UnaryOp::Invert) => Ok(Value::Int(!i)),
                (Some(Num::Float(f)), UnaryOp::Neg) => Ok(Value::Float(-f)),
                (Some(Num::Float(f)), UnaryOp::Pos) => Ok(Value::Float(f)),
                (Some(Num::Float(f)), UnaryOp::Abs) => Ok(Value::Float(f.abs())),
                _ => Err(op.type_error(&self.type_name(value))),
            },
        }
    }

    // ============================================================================
    // Numeric coercion
    // ============================================================================

    /// `int(value)`.
    pub fn to_int(&mut self, value: &Value) -> RunResult<i64> {
        if let Some(num) = as_num(value) {
            return match num {
                Num::Int(i) => Ok(i),
                Num::Float(f) => float_to_int(f),
            };
        }
        match self.slot_of(value) {
            Slot::Proxy => self.proxy_int(value),
            Slot::Instance(_) => match self.call_dunder(value, "__int__", &[])? {
                Some(result) => self.expect_int(result, "__int__"),
                None => Err(ExcType::type_error(format!(
                    "int() argument must be a string, a bytes-like object or a real number, not '{}'",
                    self.type_name(value)
                ))),
            },
            Slot::Native => {
                if let Some(s) = self.as_str(value) {
                    let trimmed = s.trim().replace('_', "");
                    return trimmed
                        .parse::<i64>()
                        .map_err(|_| ExcType::value_error(format!("invalid literal for int() with base 10: '{s}'")));
                }
                Err(ExcType::type_error(format!(
                    "int() argument must be a string, a bytes-like object or a real number, not '{}'",
                    self.type_name(value)
                )))
            }
        }
    }

    /// `float(value)`.
    pub fn to_float(&mut self, value: &Value) -> RunResult<f64> {
        if let Some(num) = as_num(value) {
            return Ok(match num {
                Num::Int(i) => i as f64,
                Num::Float(f) => f,
            });
        }
        match self.slot_of(value) {
            Slot::Proxy => self.proxy_float(value),
            Slot::Instance(_) => match self.call_dunder(value, "__float__", &[])? {
                Some(Value::Float(f)) => Ok(f),
                Some(other) => {
                    let type_name = self.type_name(&other);
                    self.release(other);
                    Err(ExcType::type_error(format!(
                        "__float__ returned non-float (type {type_name})"
                    )))
                }
                None => Err(ExcType::type_error(format!(
                    "float() argument must be a string or a real number, not '{}'",
                    self.type_name(value)
                ))),
            },
            Slot::Native => {
                if let Some(s) = self.as_str(value) {
                    return parse_float(s)
                        .ok_or_else(|| ExcType::value_error(format!("could not convert string to float: '{s}'")));
                }
                Err(ExcType::type_error(format!(
                    "float() argument must be a string or a real number, not '{}'",
                    self.type_name(value)
                )))
            }
        }
    }

    /// `operator.index(value)`: lossless integer conversion.
    pub fn to_index(&mut self, value: &Value) -> RunResult<i64> {
        if let Some(i) = as_int(value) {
            return Ok(i);
        }
        match self.slot_of(value) {
            Slot::Proxy => self.proxy_index(value),
            Slot::Instance(_) => match self.call_dunder(value, "__index__", &[])? {
                Some(result) => self.expect_int(result, "__index__"),
                None => Err(self.not_an_index(value)),
            },
            Slot::Native => Err(self.not_an_index(value)),
        }
    }

    fn not_an_index(&self, value: &Value) -> RunError {
        ExcType::type_error(format!(
            "'{}' object cannot be interpreted as an integer",
            self.type_name(value)
        ))
    }

    pub(crate) fn expect_int(&mut self, result: Value, method: &str) -> RunResult<i64> {
        if let Some(i) = as_int(&result) {
            return Ok(i);
        }
        let type_name = self.type_name(&result);
        self.release(result);
        Err(ExcType::type_error(format!("{method} returned non-int (type {type_name})")))
    }

    // ============================================================================
    // Native implementations
    // ============================================================================

    /// Builtin numbers and sequences; `NotImplemented` for anything else.
    fn native_binary(&mut self, a: &Value, b: &Value, op: BinaryOp) -> RunResult<Value> {
        if let (Some(x), Some(y)) = (as_num(a), as_num(b)) {
            if let (Value::Bool(x), Value::Bool(y)) = (a, b) {
                match op {
                    BinaryOp::And => return Ok(Value::Bool(x & y)),
                    BinaryOp::Or => return Ok(Value::Bool(x | y)),
                    BinaryOp::Xor => return Ok(Value::Bool(x ^ y)),
                    _ => {}
                }
            }
            return match (x, y) {
                (Num::Int(x), Num::Int(y)) => self.int_binary(x, y, op),
                (Num::Int(x), Num::Float(y)) => self.float_binary(x as f64, y, op),
                (Num::Float(x), Num::Int(y)) => self.float_binary(x, y as f64, op),
                (Num::Float(x), Num::Float(y)) => self.float_binary(x, y, op),
            };
        }
        self.sequence_binary(a, b, op)
    }

    fn int_binary(&mut self, x: i64, y: i64, op: BinaryOp) -> RunResult<Value> {
        let result = match op {
            BinaryOp::Add => x.checked_add(y).ok_or_else(int_overflow)?,
            BinaryOp::Sub => x.checked_sub(y).ok_or_else(int_overflow)?,
            BinaryOp::Mul => x.checked_mul(y).ok_or_else(int_overflow)?,
            BinaryOp::TrueDiv => {
                if y == 0 {
                    return Err(ExcType::zero_division("division by zero"));
                }
                return Ok(Value::Float(x as f64 / y as f64));
            }
            BinaryOp::FloorDiv => int_floor_div(x, y)?,
            BinaryOp::Mod => int_mod(x, y)?,
            BinaryOp::DivMod => {
                let quotient = int_floor_div(x, y)?;
                let remainder = int_mod(x, y)?;
                return self.alloc_tuple(vec![Value::Int(quotient), Value::Int(remainder)]);
            }
            BinaryOp::Pow => return int_pow(x, y),
            BinaryOp::LShift => {
                let shift = shift_count(y)?;
                if x == 0 {
                    0
                } else if shift >= 64 {
                    return Err(int_overflow());
                } else {
                    i64::try_from(i128::from(x) << shift).map_err(|_| int_overflow())?
                }
            }
            BinaryOp::RShift => {
                let shift = shift_count(y)?;
                if shift >= 64 { if x < 0 { -1 } else { 0 } } else { x >> shift }
            }
            BinaryOp::And => x & y,
            BinaryOp::Or => x | y,
            BinaryOp::Xor => x ^ y,
        };
        Ok(Value::Int(result))
    }

    fn float_binary(&mut self, x: f64, y: f64, op: BinaryOp) -> RunResult<Value> {
        let result = match op {
            BinaryOp::Add => x + y,
            BinaryOp::Sub => x - y,
            BinaryOp::Mul => x * y,
            BinaryOp::TrueDiv => {
                if y == 0.0 {
                    return Err(ExcType::zero_division("float division by zero"));
                }
                x / y
            }
            BinaryOp::FloorDiv => {
                if y == 0.0 {
                    return Err(ExcType::zero_division("float floor division by zero"));
                }
                float_divmod(x, y).0
            }
            BinaryOp::Mod => {
                if y == 0.0 {
                    return Err(ExcType::zero_division("float modulo by zero"));
                }
                float_divmod(x, y).1
            }
            BinaryOp::DivMod => {
                if y == 0.0 {
                    return Err(ExcType::zero_division("float divmod()"));
                }
                let (quotient, remainder) = float_divmod(x, y);
                return self.alloc_tuple(vec![Value::Float(quotient), Value::Float(remainder)]);
            }
            BinaryOp::Pow => return float_pow(x, y),
            BinaryOp::LShift | BinaryOp::RShift | BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => {
                return Ok(Value::NotImplemented);
            }
        };
        Ok(Value::Float(result))
    }

    /// Concatenation and repetition of `str`, `list` and `tuple`.
    fn sequence_binary(&mut self, a: &Value, b: &Value, op: BinaryOp) -> RunResult<Value> {
        match op {
            BinaryOp::Add => match (self.data_of(a), self.data_of(b)) {
                (Some(HeapData::Str(x)), Some(HeapData::Str(y))) => {
                    let joined = format!("{x}{y}");
                    self.alloc_str(&joined)
                }
                (Some(HeapData::List(x)), Some(HeapData::List(y))) => {
                    let items = x.iter().chain(y).map(|v| v.clone_with_heap(&self.heap)).collect();
                    self.alloc_list(items)
                }
                (Some(HeapData::Tuple(x)), Some(HeapData::Tuple(y))) => {
                    let items = x.iter().chain(y).map(|v| v.clone_with_heap(&self.heap)).collect();
                    self.alloc_tuple(items)
                }
                _ => Ok(Value::NotImplemented),
            },
            BinaryOp::Mul => {
                let (seq, count) = match (as_int(a), as_int(b)) {
                    (None, Some(count)) => (a, count),
                    (Some(count), None) => (b, count),
                    _ => return Ok(Value::NotImplemented),
                };
                let times = repeat_count(count);
                match self.data_of(seq) {
                    Some(HeapData::Str(s)) => {
                        repeated_len::<u8>(s.len(), times)?;
                        let repeated = s.repeat(times);
                        self.alloc_str(&repeated)
                    }
                    Some(HeapData::List(items)) => {
                        let items = repeat_items(self, items, times)?;
                        self.alloc_list(items)
                    }
                    Some(HeapData::Tuple(items)) => {
                        let items = repeat_items(self, items, times)?;
                        self.alloc_tuple(items)
                    }
                    _ => Ok(Value::NotImplemented),
                }
            }
            _ => Ok(Value::NotImplemented),
        }
    }

    fn native_pow(&mut self, base: &Value, exp: &Value, modulus: Option<&Value>) -> RunResult<Value> {
        let (Some(x), Some(y)) = (as_num(base), as_num(exp)) else {
            return Ok(Value::NotImplemented);
        };
        let Some(modulus) = modulus else {
            return match (x, y) {
                (Num::Int(x), Num::Int(y)) => int_pow(x, y),
                (Num::Int(x), Num::Float(y)) => float_pow(x as f64, y),
                (Num::Float(x), Num::Int(y)) => float_pow(x, y as f64),
                (Num::Float(x), Num::Float(y)) => float_pow(x, y),
            };
        };
        let Some(m) = as_num(modulus) else {
            return Ok(Value::NotImplemented);
        };
        match (x, y, m) {
            (Num::Int(x), Num::Int(y), Num::Int(m)) => int_mod_pow(x, y, m).map(Value::Int),
            _ => Err(ExcType::type_error(
                "pow() 3rd argument not allowed unless all arguments are integers",
            )),
        }
    }
}

/// Negative counts repeat zero times.
fn repeat_count(count: i64) -> usize {
    usize::try_from(count).unwrap_or(0)
}

/// Length of `len` items of `T` repeated `times` times, failing when the result
/// could not be allocated.
fn repeated_len<T>(len: usize, times: usize) -> RunResult<usize> {
    len.checked_mul(times)
        .filter(|&total| {
            total
                .checked_mul(size_of::<T>())
                .is_some_and(|bytes| isize::try_from(bytes).is_ok())
        })
        .ok_or_else(|| ExcType::overflow_error("repeated sequence is too long"))
}

fn repeat_items(rt: &Runtime, items: &[Value], times: usize) -> RunResult<Vec<Value>> {
    let mut out = Vec::with_capacity(repeated_len::<Value>(items.len(), times)?);
    for _ in 0..times {
        out.extend(items.iter().map(|v| v.clone_with_heap(&rt.heap)));
    }
    Ok(out)
}

fn int_floor_div(x: i64, y: i64) -> RunResult<i64> {
    if y == 0 {
        return Err(ExcType::zero_division("integer division or modulo by zero"));
    }
    if x == i64::MIN && y == -1 {
        return Err(int_overflow());
    }
    Ok(Integer::div_floor(&x, &y))
}

fn int_mod(x: i64, y: i64) -> RunResult<i64> {
    if y == 0 {
        return Err(ExcType::zero_division("integer modulo by zero"));
    }
    if y == -1 {
        return Ok(0);
    }
    Ok(x.mod_floor(&y))
}

fn int_pow(x: i64, y: i64) -> RunResult<Value> {
    if y < 0 {
        return float_pow(x as f64, y as f64);
    }
    let exp = usize::try_from(y).map_err(|_| int_overflow())?;
    num_traits::checked_pow(x, exp).map(Value::Int).ok_or_else(int_overflow)
}

/// `pow(x, y, m)` for integers; the result takes the sign of `m`.
fn int_mod_pow(x: i64, y: i64, m: i64) -> RunResult<i64> {
    if m == 0 {
        return Err(ExcType::value_error("pow() 3rd argument cannot be 0"));
    }
    if y < 0 {
        return Err(ExcType::value_error(
            "pow() 2nd argument cannot be negative when 3rd argument specified",
        ));
    }
    let modulus = i128::from(m).abs();
    let mut base = i128::from(x).rem_euclid(modulus);
    let mut exp = y;
    let mut acc: i128 = 1 % modulus;
    while exp > 0 {
        if exp & 1 == 1 {
            acc = acc * base % modulus;
        }
        base = base * base % modulus;
        exp >>= 1;
    }
    if m < 0 && acc != 0 {
        acc -= modulus;
    }
    i64::try_from(acc).map_err(|_| int_overflow())
}

fn float_pow(x: f64, y: f64) -> RunResult<Value> {
    if x == 0.0 && y < 0.0 {
        return Err(ExcType::zero_division("0.0 cannot be raised to a negative power"));
    }
    if x < 0.0 && y.is_finite() && y.fract() != 0.0 {
        return Err(ExcType::value_error(
            "negative number cannot be raised to a fractional power",
        ));
    }
    Ok(Value::Float(x.powf(y)))
}

/// Floor quotient and remainder with the remainder taking the divisor's sign.
fn float_divmod(x: f64, y: f64) -> (f64, f64) {
    let mut remainder = x % y;
    let mut quotient = (x - remainder) / y;
    if remainder == 0.0 {
        remainder = 0.0_f64.copysign(y);
    } else if (y < 0.0) != (remainder < 0.0) {
        remainder += y;
        quotient -= 1.0;
    }
    let floored = if quotient == 0.0 {
        0.0_f64.copysign(x / y)
    } else {
        let floor = quotient.floor();
        if quotient - floor > 0.5 { floor + 1.0 } else { floor }
    };
    (floored, remainder)
}

fn shift_count(y: i64) -> RunResult<u32> {
    if y < 0 {
        return Err(ExcType::value_error("negative shift count"));
    }
    Ok(u32::try_from(y).unwrap_or(u32::MAX))
}

fn float_to_int(f: f64) -> RunResult<i64> {
    if f.is_nan() {
        return Err(ExcType::value_error("cannot convert float NaN to integer"));
    }
    if f.is_infinite() {
        return Err(ExcType::overflow_error("cannot convert float infinity to integer"));
    }
    f.trunc().to_i64().ok_or_else(int_overflow)
}

fn parse_float(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "nan" | "+nan" | "-nan" => Some(f64::NAN),
        "inf" | "+inf" | "infinity" | "+infinity" => Some(f64::INFINITY),
        "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
        _ => trimmed.parse().ok(),
    }
}
