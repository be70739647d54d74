//! Rich comparison and hashing.

use std::cmp::Ordering;

use super::{Runtime, binary::Slot};
use crate::{
    exception::{ExcType, RunResult},
    heap::{DropWithHeap, HeapData},
    py_hash,
    value::Value,
};

/// A rich comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Lt,
    Le,
    Eq,
    Ne,
    Gt,
    Ge,
}

impl CmpOp {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    #[must_use]
    pub fn dunder(self) -> &'static str {
        match self {
            Self::Lt => "__lt__",
            Self::Le => "__le__",
            Self::Eq => "__eq__",
            Self::Ne => "__ne__",
            Self::Gt => "__gt__",
            Self::Ge => "__ge__",
        }
    }

    /// The operator to try on the right operand: `a < b` becomes `b > a`.
    #[must_use]
    pub fn swapped(self) -> Self {
        match self {
            Self::Lt => Self::Gt,
            Self::Le => Self::Ge,
            Self::Gt => Self::Lt,
            Self::Ge => Self::Le,
            Self::Eq | Self::Ne => self,
        }
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Lt => ordering.is_lt(),
            Self::Le => ordering.is_le(),
            Self::Eq => ordering.is_eq(),
            Self::Ne => ordering.is_ne(),
            Self::Gt => ordering.is_gt(),
            Self::Ge => ordering.is_ge(),
        }
    }
}

impl Runtime {
    /// `a <op> b`, returning whatever the deciding method returned.
    ///
    /// The left operand is asked first, then the right one with the swapped operator.
    /// When both decline, `==` and `!=` fall back to identity and ordering raises
    /// `TypeError`.
    pub fn rich_compare(&mut self, a: &Value, b: &Value, op: CmpOp) -> RunResult<Value> {
        let left = self.slot_of(a);
        let right = self.slot_of(b);
        let result = self.compare_slot(left, a, b, op)?;
        if !result.is_not_implemented() {
            return Ok(result);
        }
        if right != left || matches!(left, Slot::Instance(_)) {
            let result = self.compare_slot(right, b, a, op.swapped())?;
            if !result.is_not_implemented() {
                return Ok(result);
            }
        }
        match op {
            CmpOp::Eq => Ok(Value::Bool(a.is(b))),
            CmpOp::Ne => Ok(Value::Bool(!a.is(b))),
            _ => Err(ExcType::compare_type_error(
                op.symbol(),
                &self.type_name(a),
                &self.type_name(b),
            )),
        }
    }

    fn compare_slot(&mut self, slot: Slot, a: &Value, b: &Value, op: CmpOp) -> RunResult<Value> {
        match slot {
            Slot::Native => self.native_compare(a, b, op),
            Slot::Proxy => self.proxy_richcompare(a, b, op),
            Slot::Instance(_) => Ok(self.call_dunder(a, op.dunder(), &[b])?.unwrap_or(Value::NotImplemented)),
        }
    }

    /// `bool(a <op> b)`.
    pub fn compare_bool(&mut self, a: &Value, b: &Value, op: CmpOp) -> RunResult<bool> {
        let result = self.rich_compare(a, b, op)?;
        let truth = self.is_true(&result);
        self.release(result);
        truth
    }

    /// `a == b` as a bool.
    pub fn eq(&mut self, a: &Value, b: &Value) -> RunResult<bool> {
        self.compare_bool(a, b, CmpOp::Eq)
    }

    /// Identity first, then equality; how containers compare their members.
    pub(crate) fn same_or_equal(&mut self, a: &Value, b: &Value) -> RunResult<bool> {
        if a.is(b) {
            return Ok(true);
        }
        self.eq(a, b)
    }

    fn native_compare(&mut self, a: &Value, b: &Value, op: CmpOp) -> RunResult<Value> {
        if let Some(ordering) = numeric_ordering(a, b) {
            return Ok(Value::Bool(ordering.is_some_and(|ordering| op.holds(ordering))));
        }
        match (self.data_of(a), self.data_of(b)) {
            (Some(HeapData::Str(x)), Some(HeapData::Str(y))) => Ok(Value::Bool(op.holds(x.as_str().cmp(y.as_str())))),
            (Some(HeapData::List(x)), Some(HeapData::List(y))) | (Some(HeapData::Tuple(x)), Some(HeapData::Tuple(y))) => {
                let left: Vec<Value> = x.iter().map(|v| v.clone_with_heap(&self.heap)).collect();
                let right: Vec<Value> = y.iter().map(|v| v.clone_with_heap(&self.heap)).collect();
                let result = self.sequence_compare(&left, &right, op);
                left.drop_with_heap(&mut self.heap);
                right.drop_with_heap(&mut self.heap);
                result.map(Value::Bool)
            }
            (Some(HeapData::Dict(_)), Some(HeapData::Dict(_))) if matches!(op, CmpOp::Eq | CmpOp::Ne) => {
                let equal = self.dict_equal(a, b)?;
                Ok(Value::Bool(equal == (op == CmpOp::Eq)))
            }
            _ => Ok(Value::NotImplemented),
        }
    }

    /// Lexicographic comparison: the first differing pair decides, else the lengths.
    fn sequence_compare(&mut self, left: &[Value], right: &[Value], op: CmpOp) -> RunResult<bool> {
        if left.len() != right.len() && matches!(op, CmpOp::Eq | CmpOp::Ne) {
            return Ok(op == CmpOp::Ne);
        }
        for (x, y) in left.iter().zip(right) {
            if !self.same_or_equal(x, y)? {
                return match op {
                    CmpOp::Eq => Ok(false),
                    CmpOp::Ne => Ok(true),
                    _ => self.compare_bool(x, y, op),
                };
            }
        }
        Ok(op.holds(left.len().cmp(&right.len())))
    }

    fn dict_equal(&mut self, a: &Value, b: &Value) -> RunResult<bool> {
        let (Some(a_id), Some(b_id)) = (a.ref_id(), b.ref_id()) else {
            return Ok(false);
        };
        let pairs: Vec<(Value, Value)> = match (self.heap.get(a_id), self.heap.get(b_id)) {
            (HeapData::Dict(x), HeapData::Dict(y)) if x.len() == y.len() => x
                .entries()
                .iter()
                .map(|entry| (entry.key.clone_with_heap(&self.heap), entry.value.clone_with_heap(&self.heap)))
                .collect(),
            _ => return Ok(false),
        };
        let mut result = Ok(true);
        for (key, value) in &pairs {
            let other = match self.dict_lookup(b_id, key) {
                Ok(other) => other,
                Err(err) => {
                    result = Err(err);
                    break;
                }
            };
            let Some(other) = other else {
                result = Ok(false);
                break;
            };
            let equal = self.same_or_equal(value, &other);
            self.release(other);
            match equal {
                Ok(true) => {}
                mismatch => {
                    result = mismatch;
                    break;
                }
            }
        }
        for (key, value) in pairs {
            key.drop_with_heap(&mut self.heap);
            value.drop_with_heap(&mut self.heap);
        }
        result
    }

    /// `hash(value)`.
    pub fn hash(&mut self, value: &Value) -> RunResult<i64> {
        let id = match value {
            Value::None => return Ok(py_hash::NONE_HASH),
            Value::NotImplemented => return Ok(py_hash::NONE_HASH ^ 1),
            Value::Bool(b) => return Ok(py_hash::hash_int(i64::from(*b))),
            Value::Int(i) => return Ok(py_hash::hash_int(*i)),
            Value::Float(f) => return Ok(py_hash::hash_float(*f)),
            Value::Ref(id) => *id,
        };
        match self.heap.get(id) {
            HeapData::Str(s) => Ok(py_hash::hash_str(s)),
            HeapData::Tuple(items) => {
                let items: Vec<Value> = items.iter().map(|v| v.clone_with_heap(&self.heap)).collect();
                let mut hashes = Vec::with_capacity(items.len());
                let mut failure = None;
                for item in &items {
                    match self.hash(item) {
                        Ok(h) => hashes.push(h),
                        Err(err) => {
                            failure = Some(err);
                            break;
                        }
                    }
                }
                items.drop_with_heap(&mut self.heap);
                match failure {
                    Some(err) => Err(err),
                    None => Ok(py_hash::hash_tuple(&hashes)),
                }
            }
            HeapData::List(_) | HeapData::Dict(_) => Err(ExcType::unhashable(&self.type_name(value))),
            HeapData::Proxy(_) => self.proxy_hash(value),
            HeapData::Instance(instance) => {
                let cls = instance.class_id();
                if self.lookup_method(cls, "__hash__").is_some() {
                    let result = self.call_dunder(value, "__hash__", &[])?.unwrap_or(Value::None);
                    return self.expect_int(result, "__hash__");
                }
                if self.lookup_method(cls, "__eq__").is_some() {
                    return Err(ExcType::unhashable(&self.type_name(value)));
                }
                Ok(py_hash::hash_identity(id.index()))
            }
            HeapData::Class(_) | HeapData::Function(_) | HeapData::BoundMethod(_) | HeapData::Iter(_) => {
                Ok(py_hash::hash_identity(id.index()))
            }
        }
    }
}

/// Ordering of two builtin numbers; `Some(None)` when a NaN makes them unordered,
/// `None` when either operand is not a number.
fn numeric_ordering(a: &Value, b: &Value) -> Option<Option<Ordering>> {
    let as_int = |v: &Value| match v {
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Int(i) => Some(*i),
        _ => None,
    };
    let as_float = |v: &Value| match v {
        Value::Float(f) => Some(*f),
        other => as_int(other).map(|i| i as f64),
    };
    if let (Some(x), Some(y)) = (as_int(a), as_int(b)) {
        return Some(Some(x.cmp(&y)));
    }
    let (x, y) = (as_float(a)?, as_float(b)?);
    Some(x.partial_cmp(&y))
}
