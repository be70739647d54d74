//! The transparent proxy: its heap record, construction and target management.
//!
//! A proxy is a heap entry holding exactly one target. Attribute access is routed
//! through [`resolve`], every other protocol operation through [`dispatch`]. The
//! free functions of [`chain`] reason about nested proxies, and [`module`] exposes
//! all of it as host functions.
//!
//! Construction is two-phase: [`Runtime::alloc_proxy`] produces a proxy with no target,
//! [`Runtime::init_proxy`] binds one. Calling a proxy class does both.

mod api;
mod chain;
mod dispatch;
mod module;
mod resolve;

use indexmap::IndexMap;

pub use self::{
    api::{PROXY_API_VERSION, ProxyApi},
    resolve::non_overridable,
};
use crate::{
    args::ArgValues,
    exception::{ExcType, RunResult},
    heap::{DropWithHeap, Heap, HeapData, HeapId},
    resource::ResourceTracker,
    runtime::{Runtime, install_class},
    types::{ClassAttr, ClassObject},
    value::Value,
};

/// Name of the base proxy class.
pub(crate) const PROXY_CLASS_NAME: &str = "ProxyBase";
/// Module the base proxy class reports.
pub(crate) const PROXY_MODULE: &str = "shroud.proxy";

/// Heap payload of a proxy.
///
/// Owns one reference to its class and, while live, one reference to its target.
#[derive(Debug)]
pub(crate) struct ProxyRecord {
    class_id: HeapId,
    target: Option<Value>,
}

impl ProxyRecord {
    pub fn new(class_id: HeapId, target: Option<Value>) -> Self {
        Self { class_id, target }
    }

    pub fn class_id(&self) -> HeapId {
        self.class_id
    }

    pub fn target(&self) -> Option<&Value> {
        self.target.as_ref()
    }

    /// Installs `target`, handing back the previous one for the caller to release.
    pub fn replace_target(&mut self, target: Value) -> Option<Value> {
        self.target.replace(target)
    }

    /// Visits the target once, if there is one.
    pub fn traverse(&self, visit: &mut impl FnMut(&Value)) {
        if let Some(target) = &self.target {
            visit(target);
        }
    }

    /// Detaches the target. Safe to call any number of times.
    pub fn clear(&mut self) -> Option<Value> {
        self.target.take()
    }
}

/// Creates `ProxyBase`, deriving from `object`.
///
/// Its namespace holds `__reduce__` only. Attribute lookup on proxies never looks at
/// this class, so the method is only reachable from the class itself.
pub(crate) fn install_proxy_class(heap: &mut Heap<impl ResourceTracker>, object_id: HeapId) -> HeapId {
    let mut namespace = IndexMap::new();
    namespace.insert(
        "__reduce__".to_owned(),
        ClassAttr::method("__reduce__", |_, _| Err(ExcType::proxy_not_picklable())),
    );
    heap.inc_ref(object_id);
    let cls = ClassObject::new(PROXY_CLASS_NAME, PROXY_MODULE, vec![object_id], namespace, true);
    install_class(heap, cls).expect("proxy base class derives from object only")
}

impl Runtime {
    /// Wraps `target` in a new `ProxyBase`.
    pub fn create_proxy(&mut self, target: &Value) -> RunResult<Value> {
        self.wrap_in(self.proxy_class(), target)
    }

    /// Wraps `target` in a new proxy of class `kind`, running the class's initialiser.
    pub fn wrap_in(&mut self, kind: HeapId, target: &Value) -> RunResult<Value> {
        let args = ArgValues::new([self.clone_value(target)]);
        let result = self.call_class(kind, &args);
        args.drop_with_heap(&mut self.heap);
        result
    }

    /// Allocation phase: a proxy of class `kind` with no target yet.
    ///
    /// Every forwarded operation on it fails until [`Runtime::init_proxy`] binds one.
    pub fn alloc_proxy(&mut self, kind: HeapId) -> RunResult<Value> {
        self.alloc_record(kind, None).map(Value::Ref)
    }

    /// The base initialiser: takes exactly one positional target and no keywords.
    ///
    /// On a live proxy this re-initialises it with the new target.
    pub fn init_proxy(&mut self, proxy: &Value, args: &ArgValues) -> RunResult<()> {
        let target = single_target(args, "__init__")?;
        self.reinitialize_proxy(proxy, Some(target))
    }

    /// Binds `target`, replacing any previous one. Binding the current target again
    /// does nothing.
    pub fn reinitialize_proxy(&mut self, proxy: &Value, target: Option<&Value>) -> RunResult<()> {
        let Some(target) = target else {
            return Err(ExcType::invalid_target());
        };
        let id = self.expect_proxy(proxy)?;
        if let HeapData::Proxy(record) = self.heap.get(id)
            && record.target().is_some_and(|current| current.is(target))
        {
            return Ok(());
        }
        let previous = self.swap_target(id, target);
        match previous {
            Some(old) => {
                self.tracer.on_target_replace(id);
                self.release(old);
            }
            None => self.tracer.on_proxy_create(id),
        }
        Ok(())
    }

    /// Calling a proxy class: `__new__` binds the target, then the first `__init__`
    /// found on the subtype runs, or the base initialiser when there is none.
    pub(crate) fn construct_proxy(&mut self, kind: HeapId, args: &ArgValues) -> RunResult<Value> {
        let target = single_target(args, "__new__")?;
        let target = self.clone_value(target);
        let id = self.alloc_record(kind, Some(target))?;
        self.tracer.on_proxy_create(id);
        let proxy = Value::Ref(id);

        let result = match self.lookup_method(kind, "__init__") {
            Some(init) => {
                let init_args = args.prepend_cloned(&proxy, &self.heap);
                let result = init.call(self, &init_args);
                init_args.drop_with_heap(&mut self.heap);
                match result {
                    Ok(Value::None) => Ok(()),
                    Ok(other) => {
                        let type_name = self.type_name(&other);
                        self.release(other);
                        Err(ExcType::type_error(format!(
                            "__init__() should return None, not '{type_name}'"
                        )))
                    }
                    Err(err) => Err(err),
                }
            }
            None => self.init_proxy(&proxy, args),
        };
        match result {
            Ok(()) => Ok(proxy),
            Err(err) => {
                self.release(proxy);
                Err(err)
            }
        }
    }

    /// A new reference to the proxy's target.
    ///
    /// Fails with `TypeError` for non-proxies and `RuntimeError` when the target is absent.
    pub fn proxy_target(&self, proxy: &Value) -> RunResult<Value> {
        match self.data_of(proxy) {
            Some(HeapData::Proxy(record)) => match record.target() {
                Some(target) => Ok(target.clone_with_heap(&self.heap)),
                None => Err(ExcType::null_target()),
            },
            _ => Err(ExcType::expected_proxy(&self.type_name(proxy))),
        }
    }

    /// Replaces the target and returns the previous one (`None` if there was none).
    pub fn proxy_set_target(&mut self, proxy: &Value, target: &Value) -> RunResult<Value> {
        let id = self.expect_proxy(proxy)?;
        let previous = self.swap_target(id, target);
        self.tracer.on_target_replace(id);
        Ok(previous.unwrap_or(Value::None))
    }

    /// Collector traversal hook: calls `visit` with the target, if present.
    pub fn proxy_traverse(&self, proxy: &Value, mut visit: impl FnMut(&Value)) -> RunResult<()> {
        match self.data_of(proxy) {
            Some(HeapData::Proxy(record)) => {
                record.traverse(&mut visit);
                Ok(())
            }
            _ => Err(ExcType::expected_proxy(&self.type_name(proxy))),
        }
    }

    /// Collector clear hook: releases the target and leaves the proxy empty.
    pub fn proxy_clear(&mut self, proxy: &Value) -> RunResult<()> {
        let id = self.expect_proxy(proxy)?;
        let released = match self.heap.get_mut(id) {
            HeapData::Proxy(record) => record.clear(),
            _ => None,
        };
        if let Some(target) = released {
            self.tracer.on_proxy_clear(id);
            self.release(target);
        }
        Ok(())
    }

    /// The reduction a serializer asks for. Always refused.
    pub(crate) fn proxy_reduce(&mut self, proxy: &Value) -> RunResult<Value> {
        self.expect_proxy(proxy)?;
        Err(ExcType::proxy_not_picklable())
    }

    /// Whether `value` is a proxy of any kind.
    #[must_use]
    pub fn is_proxy_instance(&self, value: &Value) -> bool {
        matches!(self.data_of(value), Some(HeapData::Proxy(_)))
    }

    pub(crate) fn proxy_record(&self, value: &Value) -> Option<&ProxyRecord> {
        match self.data_of(value)? {
            HeapData::Proxy(record) => Some(record),
            _ => None,
        }
    }

    fn alloc_record(&mut self, kind: HeapId, target: Option<Value>) -> RunResult<HeapId> {
        if !self.class_object(kind).is_some_and(ClassObject::is_proxy_kind) {
            let err = ExcType::type_error(format!(
                "'{}' is not a subtype of {PROXY_CLASS_NAME}",
                self.class_name(kind)
            ));
            target.drop_with_heap(&mut self.heap);
            return Err(err);
        }
        self.heap.inc_ref(kind);
        self.allocate(HeapData::Proxy(ProxyRecord::new(kind, target)))
    }

    fn expect_proxy(&self, value: &Value) -> RunResult<HeapId> {
        match value {
            Value::Ref(id) if matches!(self.heap.get(*id), HeapData::Proxy(_)) => Ok(*id),
            _ => Err(ExcType::expected_proxy(&self.type_name(value))),
        }
    }

    /// Acquires `target` before handing back the old one.
    fn swap_target(&mut self, id: HeapId, target: &Value) -> Option<Value> {
        let target = target.clone_with_heap(&self.heap);
        match self.heap.get_mut(id) {
            HeapData::Proxy(record) => record.replace_target(target),
            _ => {
                target.drop_with_heap(&mut self.heap);
                None
            }
        }
    }
}

fn single_target<'a>(args: &'a ArgValues, method: &str) -> RunResult<&'a Value> {
    let [target] = args.args() else {
        return Err(ExcType::arg_count(method, 1, args.args().len()));
    };
    if args.has_kwargs() {
        return Err(ExcType::proxy_kwargs(method));
    }
    Ok(target)
}
