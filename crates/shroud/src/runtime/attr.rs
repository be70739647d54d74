//! Attribute access on instances, classes and builtins.
//!
//! Lookup order for an ordinary object: a data accessor on the class, then the
//! instance's own attributes, then whatever else the class declares (methods bind,
//! getter-only accessors compute, values are returned as-is). Proxies route to the
//! resolver in `proxy::resolve`.

use super::Runtime;
use crate::{
    exception::{ExcType, RunError, RunResult},
    heap::HeapData,
    types::ClassAttr,
    value::Value,
};

impl Runtime {
    /// `getattr(obj, name)`.
    pub fn getattr(&mut self, obj: &Value, name: &str) -> RunResult<Value> {
        match self.data_of(obj) {
            Some(HeapData::Proxy(_)) => return self.proxy_getattr(obj, name),
            Some(HeapData::Class(_)) if name != "__class__" => return self.class_getattr(obj, name),
            _ => {}
        }
        let cls = self.type_of(obj);
        match name {
            "__class__" => return Ok(self.class_value(cls)),
            "__module__" => {
                if let Some(module) = self.class_object(cls).map(|c| c.module().to_owned()) {
                    return self.alloc_str(&module);
                }
            }
            _ => {}
        }

        let attr = self.lookup_type_attr(cls, name);
        if let Some(ClassAttr::Accessor(accessor)) = &attr
            && accessor.is_data()
        {
            return accessor.get(self, obj, cls);
        }
        if let Some(HeapData::Instance(instance)) = self.data_of(obj)
            && let Some(value) = instance.attr(name)
        {
            let value = value.clone_with_heap(&self.heap);
            if let Some(attr) = attr {
                attr.drop_with_heap(&mut self.heap);
            }
            return Ok(value);
        }
        match attr {
            Some(ClassAttr::Method(function)) => self.bind_method(obj, function),
            Some(ClassAttr::Accessor(accessor)) => accessor.get(self, obj, cls),
            Some(ClassAttr::Value(value)) => Ok(value),
            None => Err(ExcType::attribute_error(self.class_name(cls), name)),
        }
    }

    /// Attribute lookup on a class object itself.
    ///
    /// Accessors are only reachable through instances.
    fn class_getattr(&mut self, class: &Value, name: &str) -> RunResult<Value> {
        let Some(class_id) = self.as_class(class) else {
            return Err(RunError::internal("class_getattr on a non-class"));
        };
        let Some(cls) = self.class_object(class_id) else {
            return Err(RunError::internal("class_getattr on a freed class"));
        };
        match name {
            "__name__" => {
                let name = cls.name().to_owned();
                return self.alloc_str(&name);
            }
            "__module__" => {
                let module = cls.module().to_owned();
                return self.alloc_str(&module);
            }
            _ => {}
        }
        match self.lookup_type_attr(class_id, name) {
            Some(ClassAttr::Value(value)) => Ok(value),
            Some(ClassAttr::Method(function)) => Ok(Value::Ref(self.allocate(HeapData::Function(function))?)),
            Some(ClassAttr::Accessor(_)) | None => Err(ExcType::class_attribute_error(self.class_name(class_id), name)),
        }
    }

    /// `setattr(obj, name, value)`.
    pub fn setattr(&mut self, obj: &Value, name: &str, value: &Value) -> RunResult<()> {
        self.store_attr(obj, name, Some(value))
    }

    /// `delattr(obj, name)`.
    pub fn delattr(&mut self, obj: &Value, name: &str) -> RunResult<()> {
        self.store_attr(obj, name, None)
    }

    /// `hasattr(obj, name)`: only `AttributeError` counts as absence.
    pub fn hasattr(&mut self, obj: &Value, name: &str) -> RunResult<bool> {
        match self.getattr(obj, name) {
            Ok(value) => {
                self.release(value);
                Ok(true)
            }
            Err(err) if err.matches(ExcType::AttributeError) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Assigns (`Some`) or deletes (`None`) an attribute.
    pub(crate) fn store_attr(&mut self, obj: &Value, name: &str, value: Option<&Value>) -> RunResult<()> {
        if let Some(HeapData::Proxy(_)) = self.data_of(obj) {
            return self.proxy_setattr(obj, name, value);
        }
        let cls = self.type_of(obj);
        if let Some(attr) = self.lookup_type_attr(cls, name) {
            if let ClassAttr::Accessor(accessor) = &attr
                && let Some(result) = accessor.set(self, obj, value)
            {
                return result;
            }
            attr.drop_with_heap(&mut self.heap);
        }

        let Some(id) = obj.ref_id() else {
            return Err(ExcType::attribute_error(self.class_name(cls), name));
        };
        let new_value = value.map(|v| v.clone_with_heap(&self.heap));
        let previous = match self.heap.get_mut(id) {
            HeapData::Instance(instance) => Ok(match new_value {
                Some(v) => instance.set_attr(name, v),
                None => instance.remove_attr(name),
            }),
            HeapData::Class(class) => {
                let removed = match new_value {
                    Some(v) => class.set_attr(name, ClassAttr::Value(v)),
                    None => class.remove_attr(name),
                };
                Ok(match removed {
                    Some(ClassAttr::Value(v)) => Some(v),
                    Some(_) => Some(Value::None),
                    None => None,
                })
            }
            _ => Err(new_value),
        };
        match previous {
            Ok(Some(old)) => {
                old.drop_with_heap(&mut self.heap);
                Ok(())
            }
            Ok(None) if value.is_none() => Err(ExcType::attribute_error(self.class_name(cls), name)),
            Ok(None) => Ok(()),
            Err(unused) => {
                if let Some(v) = unused {
                    v.drop_with_heap(&mut self.heap);
                }
                Err(ExcType::attribute_error(self.class_name(cls), name))
            }
        }
    }
}
