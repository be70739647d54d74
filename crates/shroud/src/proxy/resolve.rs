//! Attribute resolution on proxies.
//!
//! Names declared on a wrapper subtype are looked up along its MRO, leaving out
//! `ProxyBase` and `object`, so neither ever shadows the target. What is found decides
//! who answers:
//!
//! | Declared as | Who answers |
//! |---|---|
//! | data accessor | the accessor, always |
//! | getter-only accessor or method | the target; the wrapper if the target raises `AttributeError` |
//! | plain value | the wrapper, as-is |
//! | nothing | the target |
//!
//! `__class__` and `__module__` always come from the target.

use crate::{
    exception::{ExcType, RunResult},
    heap::HeapId,
    runtime::Runtime,
    types::{Accessor, ClassAttr, NativeFunction, Type},
    value::Value,
};

/// Turns a method into a data accessor, so a wrapper subtype's method wins over a
/// target attribute of the same name.
///
/// Reading the attribute yields the method bound to the proxy; assigning to it fails.
#[must_use]
pub fn non_overridable(method: NativeFunction) -> ClassAttr {
    let name = method.name().to_owned();
    let accessor = Accessor::getter(move |rt, instance, _owner| rt.bind_method(instance, method.clone()))
        .with_setter(move |_, _, _| Err(ExcType::AttributeError.with_msg(format!("can't set attribute '{name}'"))));
    ClassAttr::Accessor(accessor)
}

impl Runtime {
    /// Finds `name` on a wrapper subtype, ignoring the proxy machinery classes.
    fn wrapper_lookup(&self, kind: HeapId, name: &str) -> Option<ClassAttr> {
        let skip = [self.proxy_class(), self.builtin_class(Type::Object)];
        self.lookup_in_mro(kind, name, &skip).map(|(_, attr)| attr)
    }

    pub(crate) fn proxy_getattr(&mut self, proxy: &Value, name: &str) -> RunResult<Value> {
        let Some(record) = self.proxy_record(proxy) else {
            return Err(ExcType::expected_proxy(&self.type_name(proxy)));
        };
        let kind = record.class_id();
        let Some(target) = record.target().map(|t| t.clone_with_heap(&self.heap)) else {
            return Err(ExcType::null_target_attr("get", name));
        };
        let result = self.nested(|rt| rt.resolve_attr(proxy, kind, &target, name));
        self.release(target);
        result
    }

    fn resolve_attr(&mut self, proxy: &Value, kind: HeapId, target: &Value, name: &str) -> RunResult<Value> {
        if matches!(name, "__class__" | "__module__") {
            return self.getattr(target, name);
        }
        match self.wrapper_lookup(kind, name) {
            Some(ClassAttr::Accessor(accessor)) if accessor.is_data() => accessor.get(self, proxy, kind),
            Some(ClassAttr::Accessor(accessor)) => {
                self.target_first(target, name, |rt| accessor.get(rt, proxy, kind))
            }
            Some(ClassAttr::Method(function)) => self.target_first(target, name, |rt| rt.bind_method(proxy, function)),
            Some(ClassAttr::Value(value)) => Ok(value),
            None => self.getattr(target, name),
        }
    }

    /// Reads `name` from the target, deferring to `fallback` only when the target has
    /// no such attribute.
    fn target_first(
        &mut self,
        target: &Value,
        name: &str,
        fallback: impl FnOnce(&mut Self) -> RunResult<Value>,
    ) -> RunResult<Value> {
        match self.getattr(target, name) {
            Err(err) if err.matches(ExcType::AttributeError) => fallback(self),
            found => found,
        }
    }

    /// Assignment (`Some`) or deletion (`None`) through a proxy: a data accessor on
    /// the wrapper subtype handles it, otherwise the target does.
    pub(crate) fn proxy_setattr(&mut self, proxy: &Value, name: &str, value: Option<&Value>) -> RunResult<()> {
        let Some(record) = self.proxy_record(proxy) else {
            return Err(ExcType::expected_proxy(&self.type_name(proxy)));
        };
        let kind = record.class_id();
        if let Some(attr) = self.wrapper_lookup(kind, name) {
            if let ClassAttr::Accessor(accessor) = &attr
                && let Some(result) = accessor.set(self, proxy, value)
            {
                return result;
            }
            attr.drop_with_heap(&mut self.heap);
        }
        let Some(target) = self.proxy_record(proxy).and_then(|r| r.target()).map(|t| t.clone_with_heap(&self.heap))
        else {
            return Err(ExcType::null_target_attr("set", name));
        };
        let result = self.nested(|rt| rt.store_attr(&target, name, value));
        self.release(target);
        result
    }
}
