//! Container, iteration, truth and string protocols.

use std::fmt::Write as _;

use super::{Runtime, binary::Slot};
use crate::{
    exception::{ExcType, RunError, RunResult},
    heap::{DropWithHeap, HeapData, HeapId},
    types::SeqIter,
    value::Value,
};

/// Resolves a possibly negative index against `len`.
fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let index = if index < 0 { index + len } else { index };
    if (0..len).contains(&index) {
        usize::try_from(index).ok()
    } else {
        None
    }
}

impl Runtime {
    /// `len(value)`.
    pub fn len(&mut self, value: &Value) -> RunResult<usize> {
        match self.data_of(value) {
            Some(HeapData::Str(s)) => return Ok(s.chars().count()),
            Some(HeapData::List(items) | HeapData::Tuple(items)) => return Ok(items.len()),
            Some(HeapData::Dict(dict)) => return Ok(dict.len()),
            _ => {}
        }
        match self.slot_of(value) {
            Slot::Proxy => self.proxy_len(value),
            Slot::Instance(_) => match self.call_dunder(value, "__len__", &[])? {
                Some(result) => {
                    let len = self.expect_int(result, "__len__")?;
                    usize::try_from(len).map_err(|_| ExcType::value_error("__len__() should return >= 0"))
                }
                None => Err(self.no_len(value)),
            },
            Slot::Native => Err(self.no_len(value)),
        }
    }

    fn no_len(&self, value: &Value) -> RunError {
        ExcType::type_error(format!("object of type '{}' has no len()", self.type_name(value)))
    }

    /// `item in container`.
    pub fn contains(&mut self, container: &Value, item: &Value) -> RunResult<bool> {
        match self.data_of(container) {
            Some(HeapData::Str(haystack)) => {
                let Some(needle) = self.as_str(item) else {
                    return Err(ExcType::type_error(format!(
                        "'in <string>' requires string as left operand, not {}",
                        self.type_name(item)
                    )));
                };
                return Ok(haystack.contains(needle));
            }
            Some(HeapData::Dict(_)) => {
                let Some(id) = container.ref_id() else {
                    return Ok(false);
                };
                let found = self.dict_lookup(id, item)?;
                let present = found.is_some();
                found.drop_with_heap(&mut self.heap);
                return Ok(present);
            }
            _ => {}
        }
        match self.slot_of(container) {
            Slot::Proxy => return self.proxy_contains(container, item),
            Slot::Instance(class_id) if self.lookup_method(class_id, "__contains__").is_some() => {
                let result = self.call_dunder(container, "__contains__", &[item])?.unwrap_or(Value::None);
                let truth = self.is_true(&result);
                self.release(result);
                return truth;
            }
            _ => {}
        }
        let iter = match self.get_iter(container) {
            Ok(iter) => iter,
            Err(err) if err.matches(ExcType::TypeError) => {
                return Err(ExcType::type_error(format!(
                    "argument of type '{}' is not iterable",
                    self.type_name(container)
                )));
            }
            Err(err) => return Err(err),
        };
        let result = self.iter_any(&iter, item);
        self.release(iter);
        result
    }

    fn iter_any(&mut self, iter: &Value, item: &Value) -> RunResult<bool> {
        while let Some(candidate) = self.iter_next(iter)? {
            let equal = self.same_or_equal(&candidate, item);
            self.release(candidate);
            if equal? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// `container[key]`.
    pub fn getitem(&mut self, container: &Value, key: &Value) -> RunResult<Value> {
        let Some(id) = container.ref_id() else {
            return Err(self.not_subscriptable(container));
        };
        match self.heap.get(id) {
            HeapData::List(_) | HeapData::Tuple(_) | HeapData::Str(_) => {
                let index = self.sequence_index(container, key)?;
                match self.heap.get(id) {
                    HeapData::List(items) | HeapData::Tuple(items) => match normalize_index(index, items.len()) {
                        Some(idx) => Ok(items[idx].clone_with_heap(&self.heap)),
                        None => Err(ExcType::index_error(&self.type_name(container))),
                    },
                    HeapData::Str(s) => {
                        let len = s.chars().count();
                        let Some(ch) = normalize_index(index, len).and_then(|idx| s.chars().nth(idx)) else {
                            return Err(ExcType::index_error("string"));
                        };
                        self.alloc_str(ch.encode_utf8(&mut [0; 4]))
                    }
                    _ => Err(self.not_subscriptable(container)),
                }
            }
            HeapData::Dict(_) => match self.dict_lookup(id, key)? {
                Some(value) => Ok(value),
                None => Err(ExcType::key_error(self.repr(key)?)),
            },
            HeapData::Proxy(_) => self.proxy_getitem(container, key),
            HeapData::Instance(_) => match self.call_dunder(container, "__getitem__", &[key])? {
                Some(value) => Ok(value),
                None => Err(self.not_subscriptable(container)),
            },
            _ => Err(self.not_subscriptable(container)),
        }
    }

    fn not_subscriptable(&self, container: &Value) -> RunError {
        ExcType::type_error(format!("'{}' object is not subscriptable", self.type_name(container)))
    }

    /// An integer index for a sequence; objects with `__index__` are accepted.
    fn sequence_index(&mut self, container: &Value, key: &Value) -> RunResult<i64> {
        match key {
            Value::Int(i) => Ok(*i),
            Value::Bool(b) => Ok(i64::from(*b)),
            _ if self.slot_of(key) != Slot::Native => self.to_index(key),
            _ => {
                let kind = match self.data_of(container) {
                    Some(HeapData::Str(_)) => "string",
                    Some(HeapData::Tuple(_)) => "tuple",
                    _ => "list",
                };
                Err(ExcType::type_error(format!(
                    "{kind} indices must be integers or slices, not {}",
                    self.type_name(key)
                )))
            }
        }
    }

    /// `container[key] = value`, or `del container[key]` when `value` is `None`.
    pub fn setitem(&mut self, container: &Value, key: &Value, value: Option<&Value>) -> RunResult<()> {
        let Some(id) = container.ref_id() else {
            return Err(self.no_item_assignment(container, value.is_some()));
        };
        match self.heap.get(id) {
            HeapData::List(_) => {
                let index = self.sequence_index(container, key)?;
                let HeapData::List(items) = self.heap.get(id) else {
                    return Err(RunError::internal("list changed kind during setitem"));
                };
                let Some(idx) = normalize_index(index, items.len()) else {
                    return Err(ExcType::IndexError.with_msg("list assignment index out of range"));
                };
                let new_value = value.map(|v| v.clone_with_heap(&self.heap));
                let HeapData::List(items) = self.heap.get_mut(id) else {
                    return Err(RunError::internal("list changed kind during setitem"));
                };
                let old = match new_value {
                    Some(v) => std::mem::replace(&mut items[idx], v),
                    None => items.remove(idx),
                };
                old.drop_with_heap(&mut self.heap);
                Ok(())
            }
            HeapData::Dict(_) => match value {
                Some(value) => self.dict_set(id, key, value),
                None => {
                    if self.dict_remove(id, key)? {
                        Ok(())
                    } else {
                        Err(ExcType::key_error(self.repr(key)?))
                    }
                }
            },
            HeapData::Proxy(_) => self.proxy_setitem(container, key, value),
            HeapData::Instance(_) => {
                let called = match value {
                    Some(value) => self.call_dunder(container, "__setitem__", &[key, value])?,
                    None => self.call_dunder(container, "__delitem__", &[key])?,
                };
                match called {
                    Some(result) => {
                        self.release(result);
                        Ok(())
                    }
                    None => Err(self.no_item_assignment(container, value.is_some())),
                }
            }
            _ => Err(self.no_item_assignment(container, value.is_some())),
        }
    }

    /// `del container[key]`.
    pub fn delitem(&mut self, container: &Value, key: &Value) -> RunResult<()> {
        self.setitem(container, key, None)
    }

    fn no_item_assignment(&self, container: &Value, assigning: bool) -> RunError {
        let type_name = self.type_name(container);
        if assigning {
            ExcType::type_error(format!("'{type_name}' object does not support item assignment"))
        } else {
            ExcType::type_error(format!("'{type_name}' object doesn't support item deletion"))
        }
    }

    // ============================================================================
    // Iteration
    // ============================================================================

    /// `iter(value)`.
    pub fn get_iter(&mut self, value: &Value) -> RunResult<Value> {
        match self.data_of(value) {
            Some(HeapData::List(_) | HeapData::Tuple(_) | HeapData::Str(_) | HeapData::Dict(_)) => {
                let source = self.clone_value(value);
                Ok(Value::Ref(self.allocate(HeapData::Iter(SeqIter::new(source)))?))
            }
            Some(HeapData::Iter(_)) => Ok(self.clone_value(value)),
            Some(HeapData::Proxy(_)) => self.proxy_iter(value),
            Some(HeapData::Instance(_)) => match self.call_dunder(value, "__iter__", &[])? {
                Some(iter) => Ok(iter),
                None => Err(self.not_iterable(value)),
            },
            _ => Err(self.not_iterable(value)),
        }
    }

    fn not_iterable(&self, value: &Value) -> RunError {
        ExcType::type_error(format!("'{}' object is not iterable", self.type_name(value)))
    }

    /// `next(iter)`, with exhaustion reported as `Ok(None)` rather than `StopIteration`.
    pub fn iter_next(&mut self, iter: &Value) -> RunResult<Option<Value>> {
        let Some(id) = iter.ref_id() else {
            return Err(self.not_an_iterator(iter));
        };
        match self.heap.get(id) {
            HeapData::Iter(seq) => {
                let index = seq.index();
                let item = match self.data_of(seq.source()) {
                    Some(HeapData::List(items) | HeapData::Tuple(items)) => {
                        items.get(index).map(|item| Ok(item.clone_with_heap(&self.heap)))
                    }
                    Some(HeapData::Dict(dict)) => dict.key_at(index).map(|key| Ok(key.clone_with_heap(&self.heap))),
                    Some(HeapData::Str(s)) => s.chars().nth(index).map(Err),
                    _ => None,
                };
                let item = match item {
                    Some(Ok(value)) => value,
                    Some(Err(ch)) => self.alloc_str(ch.encode_utf8(&mut [0; 4]))?,
                    None => {
                        if let HeapData::Iter(seq) = self.heap.get_mut(id) {
                            let source = seq.take_source();
                            source.drop_with_heap(&mut self.heap);
                        }
                        return Ok(None);
                    }
                };
                if let HeapData::Iter(seq) = self.heap.get_mut(id) {
                    seq.advance();
                }
                Ok(Some(item))
            }
            HeapData::Proxy(_) => self.proxy_next(iter),
            HeapData::Instance(_) => match self.call_dunder(iter, "__next__", &[]) {
                Ok(Some(value)) => Ok(Some(value)),
                Ok(None) => Err(self.not_an_iterator(iter)),
                Err(err) if err.matches(ExcType::StopIteration) => Ok(None),
                Err(err) => Err(err),
            },
            _ => Err(self.not_an_iterator(iter)),
        }
    }

    fn not_an_iterator(&self, value: &Value) -> RunError {
        ExcType::type_error(format!("'{}' object is not an iterator", self.type_name(value)))
    }

    /// Drains an iterable into owned values.
    pub fn collect_iter(&mut self, iterable: &Value) -> RunResult<Vec<Value>> {
        let iter = self.get_iter(iterable)?;
        let mut items = Vec::new();
        loop {
            match self.iter_next(&iter) {
                Ok(Some(item)) => items.push(item),
                Ok(None) => break,
                Err(err) => {
                    items.drop_with_heap(&mut self.heap);
                    self.release(iter);
                    return Err(err);
                }
            }
        }
        self.release(iter);
        Ok(items)
    }

    // ============================================================================
    // Truth and strings
    // ============================================================================

    /// `bool(value)`.
    pub fn is_true(&mut self, value: &Value) -> RunResult<bool> {
        let id = match value {
            Value::None => return Ok(false),
            Value::NotImplemented => return Ok(true),
            Value::Bool(b) => return Ok(*b),
            Value::Int(i) => return Ok(*i != 0),
            Value::Float(f) => return Ok(*f != 0.0),
            Value::Ref(id) => *id,
        };
        match self.heap.get(id) {
            HeapData::Str(s) => Ok(!s.is_empty()),
            HeapData::List(items) | HeapData::Tuple(items) => Ok(!items.is_empty()),
            HeapData::Dict(dict) => Ok(dict.len() > 0),
            HeapData::Proxy(_) => self.proxy_bool(value),
            HeapData::Instance(instance) => {
                let class_id = instance.class_id();
                if self.lookup_method(class_id, "__bool__").is_some() {
                    return match self.call_dunder(value, "__bool__", &[])? {
                        Some(Value::Bool(b)) => Ok(b),
                        Some(other) => {
                            let type_name = self.type_name(&other);
                            self.release(other);
                            Err(ExcType::type_error(format!(
                                "__bool__ should return bool, returned {type_name}"
                            )))
                        }
                        None => Ok(true),
                    };
                }
                if self.lookup_method(class_id, "__len__").is_some() {
                    return Ok(self.len(value)? > 0);
                }
                Ok(true)
            }
            HeapData::Class(_) | HeapData::Function(_) | HeapData::BoundMethod(_) | HeapData::Iter(_) => Ok(true),
        }
    }

    /// `str(value)`.
    pub fn to_str(&mut self, value: &Value) -> RunResult<String> {
        match self.data_of(value) {
            Some(HeapData::Str(s)) => Ok(s.clone()),
            Some(HeapData::Proxy(_)) => self.proxy_str(value),
            Some(HeapData::Instance(instance)) if self.lookup_method(instance.class_id(), "__str__").is_some() => {
                let result = self.call_dunder(value, "__str__", &[])?.unwrap_or(Value::None);
                self.expect_str(result, "__str__")
            }
            _ => self.repr(value),
        }
    }

    /// `repr(value)`.
    pub fn repr(&mut self, value: &Value) -> RunResult<String> {
        let id = match value {
            Value::None => return Ok("None".to_owned()),
            Value::NotImplemented => return Ok("NotImplemented".to_owned()),
            Value::Bool(true) => return Ok("True".to_owned()),
            Value::Bool(false) => return Ok("False".to_owned()),
            Value::Int(i) => return Ok(i.to_string()),
            Value::Float(f) => return Ok(float_repr(*f)),
            Value::Ref(id) => *id,
        };
        match self.heap.get(id) {
            HeapData::Str(s) => Ok(str_repr(s)),
            HeapData::List(_) => self.container_repr(id, "[", "]", false),
            HeapData::Tuple(items) => {
                let single = items.len() == 1;
                self.container_repr(id, "(", if single { ",)" } else { ")" }, false)
            }
            HeapData::Dict(_) => self.container_repr(id, "{", "}", true),
            HeapData::Class(cls) => Ok(format!("<class '{}'>", cls.qualified_name())),
            HeapData::Function(function) => Ok(format!("<built-in function {}>", function.name())),
            HeapData::BoundMethod(method) => Ok(format!(
                "<bound method {} of {} object>",
                method.function().name(),
                self.type_name(method.receiver())
            )),
            HeapData::Iter(_) => Ok("<iterator object>".to_owned()),
            HeapData::Proxy(_) => self.proxy_repr(value),
            HeapData::Instance(instance) => {
                let class_id = instance.class_id();
                if self.lookup_method(class_id, "__repr__").is_some() {
                    let result = self.call_dunder(value, "__repr__", &[])?.unwrap_or(Value::None);
                    return self.expect_str(result, "__repr__");
                }
                let qualified = self
                    .class_object(class_id)
                    .map_or_else(|| "object".to_owned(), |cls| cls.qualified_name());
                Ok(format!("<{qualified} object at {:#x}>", id.index()))
            }
        }
    }

    fn expect_str(&mut self, result: Value, method: &str) -> RunResult<String> {
        let s = self.as_str(&result).map(str::to_owned);
        match s {
            Some(s) => {
                self.release(result);
                Ok(s)
            }
            None => {
                let type_name = self.type_name(&result);
                self.release(result);
                Err(ExcType::type_error(format!("{method} returned non-string (type {type_name})")))
            }
        }
    }

    /// Repr of a list, tuple or dict; a container already being printed shows as `[...]`.
    fn container_repr(&mut self, id: HeapId, open: &str, close: &str, mapping: bool) -> RunResult<String> {
        if self.repr_stack.contains(&id) {
            return Ok(if mapping { "{...}" } else { "[...]" }.to_owned());
        }
        let items: Vec<Value> = match self.heap.get(id) {
            HeapData::List(items) | HeapData::Tuple(items) => {
                items.iter().map(|v| v.clone_with_heap(&self.heap)).collect()
            }
            HeapData::Dict(dict) => dict
                .entries()
                .iter()
                .flat_map(|entry| [entry.key.clone_with_heap(&self.heap), entry.value.clone_with_heap(&self.heap)])
                .collect(),
            _ => Vec::new(),
        };
        self.repr_stack.push(id);
        let mut out = String::from(open);
        let mut result = Ok(());
        let step = if mapping { 2 } else { 1 };
        for (n, chunk) in items.chunks(step).enumerate() {
            if n > 0 {
                out.push_str(", ");
            }
            match self.repr(&chunk[0]) {
                Ok(s) => out.push_str(&s),
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
            if mapping {
                match self.repr(&chunk[1]) {
                    Ok(s) => {
                        let _ = write!(out, ": {s}");
                    }
                    Err(err) => {
                        result = Err(err);
                        break;
                    }
                }
            }
        }
        self.repr_stack.pop();
        items.drop_with_heap(&mut self.heap);
        result?;
        out.push_str(close);
        Ok(out)
    }

    // ============================================================================
    // Dict storage
    // ============================================================================

    /// Index of `key` in a dict: hash match first, then identity or equality.
    fn dict_find(&mut self, dict: HeapId, key: &Value, hash: i64) -> RunResult<Option<usize>> {
        let candidates: Vec<(usize, Value)> = match self.heap.get(dict) {
            HeapData::Dict(d) => d
                .candidates(hash)
                .map(|(idx, k)| (idx, k.clone_with_heap(&self.heap)))
                .collect(),
            _ => return Ok(None),
        };
        let mut found = Ok(None);
        for (idx, candidate) in &candidates {
            match self.same_or_equal(candidate, key) {
                Ok(true) => {
                    found = Ok(Some(*idx));
                    break;
                }
                Ok(false) => {}
                Err(err) => {
                    found = Err(err);
                    break;
                }
            }
        }
        for (_, candidate) in candidates {
            candidate.drop_with_heap(&mut self.heap);
        }
        found
    }

    /// The value stored under `key`, as a new reference.
    pub(crate) fn dict_lookup(&mut self, dict: HeapId, key: &Value) -> RunResult<Option<Value>> {
        let hash = self.hash(key)?;
        let Some(idx) = self.dict_find(dict, key, hash)? else {
            return Ok(None);
        };
        match self.heap.get(dict) {
            HeapData::Dict(d) => Ok(d.value_at(idx).map(|v| v.clone_with_heap(&self.heap))),
            _ => Ok(None),
        }
    }

    fn dict_set(&mut self, dict: HeapId, key: &Value, value: &Value) -> RunResult<()> {
        let hash = self.hash(key)?;
        let found = self.dict_find(dict, key, hash)?;
        let key = key.clone_with_heap(&self.heap);
        let value = value.clone_with_heap(&self.heap);
        let mut released = Vec::new();
        match self.heap.get_mut(dict) {
            HeapData::Dict(d) => match found {
                // an existing entry keeps its original key
                Some(idx) if idx < d.len() => {
                    released.push(d.replace_value(idx, value));
                    released.push(key);
                }
                _ => d.push(hash, key, value),
            },
            _ => {
                released.push(key);
                released.push(value);
            }
        }
        released.drop_with_heap(&mut self.heap);
        Ok(())
    }

    /// Removes `key`, reporting whether it was present.
    fn dict_remove(&mut self, dict: HeapId, key: &Value) -> RunResult<bool> {
        let hash = self.hash(key)?;
        let Some(idx) = self.dict_find(dict, key, hash)? else {
            return Ok(false);
        };
        let removed = match self.heap.get_mut(dict) {
            HeapData::Dict(d) if idx < d.len() => d.remove(idx),
            _ => return Ok(false),
        };
        removed.key.drop_with_heap(&mut self.heap);
        removed.value.drop_with_heap(&mut self.heap);
        Ok(true)
    }
}

/// `repr(float)`: the shortest round-tripping digits from `ryu`, laid out the way
/// CPython does (scientific below `1e-4` and from `1e16` on, two-digit exponents).
fn float_repr(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_owned();
    }
    if f.is_infinite() {
        return if f.is_sign_negative() { "-inf" } else { "inf" }.to_owned();
    }
    let sign = if f.is_sign_negative() { "-" } else { "" };
    if f == 0.0 {
        return format!("{sign}0.0");
    }

    let mut buffer = ryu::Buffer::new();
    let (digits, point) = shortest_digits(buffer.format_finite(f.abs()));
    let exp = point - 1;
    if !(-4..16).contains(&exp) {
        let (lead, rest) = digits.split_at(1);
        let frac = if rest.is_empty() { String::new() } else { format!(".{rest}") };
        let exp_sign = if exp < 0 { '-' } else { '+' };
        return format!("{sign}{lead}{frac}e{exp_sign}{:02}", exp.unsigned_abs());
    }
    let len = digits.len() as i32;
    if point <= 0 {
        format!("{sign}0.{}{digits}", "0".repeat(point.unsigned_abs() as usize))
    } else if point >= len {
        format!("{sign}{digits}{}.0", "0".repeat((point - len) as usize))
    } else {
        let (whole, frac) = digits.split_at(point as usize);
        format!("{sign}{whole}.{frac}")
    }
}

/// Splits `ryu` output for a positive finite float into its significant digits and the
/// position of the decimal point relative to the first of them.
fn shortest_digits(formatted: &str) -> (String, i32) {
    let (mantissa, exp) = match formatted.split_once('e') {
        Some((mantissa, exp)) => (mantissa, exp.parse::<i32>().unwrap_or(0)),
        None => (formatted, 0),
    };
    let (whole, frac) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let all = format!("{whole}{frac}");
    let significant = all.trim_start_matches('0');
    let leading = (all.len() - significant.len()) as i32;
    let digits = significant.trim_end_matches('0').to_owned();
    (digits, whole.len() as i32 + exp - leading)
}

fn str_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => {
                let _ = write!(out, "\\x{:02x}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}
