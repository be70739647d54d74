//! Moving data between `Object` trees and the heap, and the binary serialization
//! built on top of that.
//!
//! `dumps` walks the value graph the way a pickler would: containers are encoded
//! structurally, instances are encoded through their `__reduce__` method, and proxies
//! are asked for their reduction, which always refuses.

use ahash::AHashSet;

use super::Runtime;
use crate::{
    exception::{ExcType, RunError, RunResult},
    heap::{DropWithHeap, HeapData, HeapId},
    object::Object,
    value::Value,
};

/// Prefix of every payload produced by `dumps`.
const DUMPS_MAGIC: &[u8] = b"SHRD\x01";

impl Runtime {
    /// Converts a value to an owned `Object` tree.
    ///
    /// Values without a structural mapping become `Object::Repr`; a container that
    /// contains itself is cut off with its recursive repr.
    pub fn to_object(&mut self, value: &Value) -> RunResult<Object> {
        let mut visiting = AHashSet::new();
        self.to_object_inner(value, &mut visiting)
    }

    fn to_object_inner(&mut self, value: &Value, visiting: &mut AHashSet<HeapId>) -> RunResult<Object> {
        let id = match value {
            Value::None => return Ok(Object::None),
            Value::NotImplemented => return Ok(Object::Repr("NotImplemented".to_owned())),
            Value::Bool(b) => return Ok(Object::Bool(*b)),
            Value::Int(i) => return Ok(Object::Int(*i)),
            Value::Float(f) => return Ok(Object::Float(*f)),
            Value::Ref(id) => *id,
        };
        match self.heap.get(id) {
            HeapData::Str(s) => Ok(Object::String(s.clone())),
            HeapData::List(_) | HeapData::Tuple(_) | HeapData::Dict(_) => {
                if !visiting.insert(id) {
                    let placeholder = if matches!(self.heap.get(id), HeapData::Dict(_)) {
                        "{...}"
                    } else {
                        "[...]"
                    };
                    return Ok(Object::Repr(placeholder.to_owned()));
                }
                let result = self.container_to_object(id, |rt, item| rt.to_object_inner(item, visiting));
                visiting.remove(&id);
                result
            }
            _ => Ok(Object::Repr(self.repr(value)?)),
        }
    }

    /// Converts a list, tuple or dict by applying `convert` to every member.
    fn container_to_object(
        &mut self,
        id: HeapId,
        mut convert: impl FnMut(&mut Self, &Value) -> RunResult<Object>,
    ) -> RunResult<Object> {
        let (kind, members): (u8, Vec<Value>) = match self.heap.get(id) {
            HeapData::List(items) => (0, items.iter().map(|v| v.clone_with_heap(&self.heap)).collect()),
            HeapData::Tuple(items) => (1, items.iter().map(|v| v.clone_with_heap(&self.heap)).collect()),
            HeapData::Dict(dict) => (
                2,
                dict.entries()
                    .iter()
                    .flat_map(|entry| [entry.key.clone_with_heap(&self.heap), entry.value.clone_with_heap(&self.heap)])
                    .collect(),
            ),
            _ => return Err(RunError::internal("container_to_object on a non-container")),
        };
        let mut converted = Vec::with_capacity(members.len());
        let mut failure = None;
        for member in &members {
            match convert(self, member) {
                Ok(object) => converted.push(object),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }
        members.drop_with_heap(&mut self.heap);
        if let Some(err) = failure {
            return Err(err);
        }
        Ok(match kind {
            0 => Object::List(converted),
            1 => Object::Tuple(converted),
            _ => {
                let mut pairs = Vec::with_capacity(converted.len() / 2);
                let mut members = converted.into_iter();
                while let (Some(key), Some(value)) = (members.next(), members.next()) {
                    pairs.push((key, value));
                }
                Object::Dict(pairs)
            }
        })
    }

    /// Allocates the heap value described by `object`.
    pub fn alloc(&mut self, object: &Object) -> RunResult<Value> {
        match object {
            Object::None => Ok(Value::None),
            Object::Bool(b) => Ok(Value::Bool(*b)),
            Object::Int(i) => Ok(Value::Int(*i)),
            Object::Float(f) => Ok(Value::Float(*f)),
            Object::String(s) => self.alloc_str(s),
            Object::List(items) => {
                let items = self.alloc_all(items)?;
                self.alloc_list(items)
            }
            Object::Tuple(items) => {
                let items = self.alloc_all(items)?;
                self.alloc_tuple(items)
            }
            Object::Dict(pairs) => {
                let mut values = Vec::with_capacity(pairs.len());
                for (key, value) in pairs {
                    let key = match self.alloc(key) {
                        Ok(key) => key,
                        Err(err) => {
                            values.drop_with_heap(&mut self.heap);
                            return Err(err);
                        }
                    };
                    match self.alloc(value) {
                        Ok(value) => values.push((key, value)),
                        Err(err) => {
                            self.release(key);
                            values.drop_with_heap(&mut self.heap);
                            return Err(err);
                        }
                    }
                }
                self.alloc_dict(values)
            }
            Object::Repr(_) => Err(ExcType::type_error("Repr objects are output-only")),
        }
    }

    fn alloc_all(&mut self, objects: &[Object]) -> RunResult<Vec<Value>> {
        let mut values = Vec::with_capacity(objects.len());
        for object in objects {
            match self.alloc(object) {
                Ok(value) => values.push(value),
                Err(err) => {
                    values.drop_with_heap(&mut self.heap);
                    return Err(err);
                }
            }
        }
        Ok(values)
    }

    // ============================================================================
    // Serialization
    // ============================================================================

    /// Serializes a value to bytes.
    ///
    /// Fails with `PicklingError` as soon as a proxy is met anywhere in the graph, and
    /// with `TypeError` for classes, functions and instances without `__reduce__`.
    pub fn dumps(&mut self, value: &Value) -> RunResult<Vec<u8>> {
        let mut visiting = AHashSet::new();
        let object = self.reduce_value(value, &mut visiting)?;
        let encoded = postcard::to_allocvec(&object)
            .map_err(|err| ExcType::PicklingError.with_msg(format!("failed to encode payload: {err}")))?;
        let mut out = Vec::with_capacity(DUMPS_MAGIC.len() + encoded.len());
        out.extend_from_slice(DUMPS_MAGIC);
        out.extend_from_slice(&encoded);
        Ok(out)
    }

    /// Rebuilds a value serialized by [`Runtime::dumps`].
    pub fn loads(&mut self, data: &[u8]) -> RunResult<Value> {
        let Some(payload) = data.strip_prefix(DUMPS_MAGIC) else {
            return Err(ExcType::UnpicklingError.with_msg("invalid load key, not a shroud payload"));
        };
        let object: Object = postcard::from_bytes(payload)
            .map_err(|err| ExcType::UnpicklingError.with_msg(format!("payload was truncated or corrupted: {err}")))?;
        self.alloc(&object)
    }

    fn reduce_value(&mut self, value: &Value, visiting: &mut AHashSet<HeapId>) -> RunResult<Object> {
        let Value::Ref(id) = value else {
            return match value {
                Value::NotImplemented => Err(ExcType::type_error("cannot pickle 'NotImplementedType' object")),
                other => self.to_object(other),
            };
        };
        let id = *id;
        match self.heap.get(id) {
            HeapData::Str(s) => Ok(Object::String(s.clone())),
            HeapData::List(_) | HeapData::Tuple(_) | HeapData::Dict(_) => {
                if !visiting.insert(id) {
                    return Err(ExcType::PicklingError.with_msg("cannot serialize a recursive structure"));
                }
                let result = self.container_to_object(id, |rt, item| rt.reduce_value(item, visiting));
                visiting.remove(&id);
                result
            }
            HeapData::Proxy(_) => {
                let reduced = self.proxy_reduce(value)?;
                self.release(reduced);
                Err(RunError::internal("proxy reduction unexpectedly succeeded"))
            }
            HeapData::Instance(instance) => {
                let class_id = instance.class_id();
                if self.lookup_method(class_id, "__reduce__").is_none() {
                    return Err(self.cannot_pickle(value));
                }
                if !visiting.insert(id) {
                    return Err(ExcType::PicklingError.with_msg("cannot serialize a recursive structure"));
                }
                let result = match self.call_dunder(value, "__reduce__", &[]) {
                    Ok(Some(state)) => {
                        let object = self.reduce_value(&state, visiting);
                        self.release(state);
                        object
                    }
                    Ok(None) => Err(self.cannot_pickle(value)),
                    Err(err) => Err(err),
                };
                visiting.remove(&id);
                result
            }
            HeapData::Class(_) | HeapData::Function(_) | HeapData::BoundMethod(_) | HeapData::Iter(_) => {
                Err(self.cannot_pickle(value))
            }
        }
    }

    fn cannot_pickle(&self, value: &Value) -> RunError {
        ExcType::type_error(format!("cannot pickle '{}' object", self.type_name(value)))
    }
}
