//! The embedded object model: allocation, class machinery and the abstract object API
//! the proxy core forwards to.
//!
//! Every operation takes values by reference and returns an owned result. Callers
//! release owned values they no longer need with [`Runtime::release`].

mod attr;
mod binary;
mod builtins;
mod call;
mod collections;
mod compare;
mod convert;

use ahash::AHashMap;
use indexmap::IndexMap;
use strum::IntoEnumIterator;

pub use self::{
    binary::{BinaryOp, UnaryOp},
    compare::CmpOp,
};
use crate::{
    args::ArgValues,
    exception::{ExcType, RunResult},
    heap::{ContainsHeap, DropWithHeap, Heap, HeapData, HeapId, HeapStats},
    resource::{LimitedTracker, ResourceLimits, ResourceTracker},
    tracer::{NoopTracer, ProxyTracer},
    types::{BoundMethod, ClassAttr, ClassObject, Instance, NativeFunction, Type, compute_c3_mro},
    value::Value,
};

/// An isolated object space: heap, builtin classes, the proxy base class and a tracer.
#[derive(Debug)]
pub struct Runtime {
    pub(crate) heap: Heap<LimitedTracker>,
    builtin_classes: AHashMap<Type, HeapId>,
    proxy_class: HeapId,
    /// Classes created through `define_class`; the runtime keeps them alive.
    user_classes: Vec<HeapId>,
    pub(crate) tracer: Box<dyn ProxyTracer>,
    /// Current nesting of forwarded operations.
    depth: usize,
    /// Containers whose repr is being built, to print `[...]` on recursion.
    repr_stack: Vec<HeapId>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainsHeap<LimitedTracker> for Runtime {
    #[inline]
    fn heap_mut(&mut self) -> &mut Heap<LimitedTracker> {
        &mut self.heap
    }
}

impl Runtime {
    /// A runtime with default limits and no tracing.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(ResourceLimits::default())
    }

    #[must_use]
    pub fn with_limits(limits: ResourceLimits) -> Self {
        Self::with_tracer(limits, Box::new(NoopTracer))
    }

    /// Builds the builtin classes and the proxy base class, then installs `limits`.
    ///
    /// Start-up allocations are not counted against the limits.
    #[must_use]
    pub fn with_tracer(limits: ResourceLimits, tracer: Box<dyn ProxyTracer>) -> Self {
        let mut heap = Heap::new(LimitedTracker::new(ResourceLimits::default().gc_interval(None)));
        let mut builtin_classes = AHashMap::new();
        for ty in Type::iter() {
            let bases: Vec<HeapId> = ty.base().map(|base| builtin_classes[&base]).into_iter().collect();
            for &base in &bases {
                heap.inc_ref(base);
            }
            let cls = ClassObject::new(ty.name(), "builtins", bases, IndexMap::new(), false);
            let id = install_class(&mut heap, cls).expect("builtin classes form a valid hierarchy");
            builtin_classes.insert(ty, id);
        }
        let proxy_class = crate::proxy::install_proxy_class(&mut heap, builtin_classes[&Type::Object]);
        heap.set_tracker(LimitedTracker::new(limits));

        let mut rt = Self {
            heap,
            builtin_classes,
            proxy_class,
            user_classes: Vec::new(),
            tracer,
            depth: 0,
            repr_stack: Vec::new(),
        };
        builtins::install_methods(&mut rt);
        rt
    }

    /// Replaces the tracer, returning the previous one.
    pub fn set_tracer(&mut self, tracer: Box<dyn ProxyTracer>) -> Box<dyn ProxyTracer> {
        std::mem::replace(&mut self.tracer, tracer)
    }

    /// The resource tracker enforcing this runtime's limits.
    #[must_use]
    pub fn tracker(&self) -> &LimitedTracker {
        self.heap.tracker()
    }

    #[must_use]
    pub fn heap_stats(&self) -> HeapStats {
        self.heap.stats()
    }

    /// Runs the cycle collector now, returning how many entries were freed.
    pub fn collect_cycles(&mut self) -> usize {
        let outcome = self.heap.collect_cycles();
        for &proxy in &outcome.cleared_proxies {
            self.tracer.on_proxy_clear(proxy);
        }
        self.tracer.on_collect(outcome.freed);
        outcome.freed
    }

    // ============================================================================
    // Value ownership
    // ============================================================================

    /// Copies a value, taking a new reference.
    #[must_use]
    pub fn clone_value(&self, value: &Value) -> Value {
        value.clone_with_heap(&self.heap)
    }

    /// Releases an owned value.
    pub fn release(&mut self, value: Value) {
        value.drop_with_heap(&mut self.heap);
    }

    /// Releases every value held by a call's arguments.
    pub fn release_args(&mut self, args: ArgValues) {
        args.drop_with_heap(&mut self.heap);
    }

    /// Reference count of a heap value, `None` for immediates.
    #[must_use]
    pub fn refcount(&self, value: &Value) -> Option<usize> {
        value.ref_id().map(|id| self.heap.refcount(id))
    }

    /// Whether a heap value is still alive; immediates always are.
    #[must_use]
    pub fn is_alive(&self, value: &Value) -> bool {
        value.ref_id().is_none_or(|id| self.heap.get_if_live(id).is_some())
    }

    // ============================================================================
    // Allocation
    // ============================================================================

    /// Allocates a heap entry, running the cycle collector when it is due.
    pub(crate) fn allocate(&mut self, data: HeapData) -> RunResult<HeapId> {
        let id = self.heap.allocate(data)?;
        if self.heap.should_gc() {
            self.collect_cycles();
        }
        Ok(id)
    }

    pub fn alloc_str(&mut self, s: &str) -> RunResult<Value> {
        Ok(Value::Ref(self.allocate(HeapData::Str(s.to_owned()))?))
    }

    /// Allocates a list, taking ownership of `items`.
    pub fn alloc_list(&mut self, items: Vec<Value>) -> RunResult<Value> {
        Ok(Value::Ref(self.allocate(HeapData::List(items))?))
    }

    /// Allocates a tuple, taking ownership of `items`.
    pub fn alloc_tuple(&mut self, items: Vec<Value>) -> RunResult<Value> {
        Ok(Value::Ref(self.allocate(HeapData::Tuple(items))?))
    }

    /// Allocates a dict, taking ownership of the pairs. Later duplicates win.
    pub fn alloc_dict(&mut self, pairs: Vec<(Value, Value)>) -> RunResult<Value> {
        let dict = Value::Ref(self.allocate(HeapData::Dict(crate::types::Dict::default()))?);
        let mut result = Ok(());
        for (key, value) in pairs {
            if result.is_ok() {
                result = self.setitem(&dict, &key, Some(&value));
            }
            key.drop_with_heap(&mut self.heap);
            value.drop_with_heap(&mut self.heap);
        }
        match result {
            Ok(()) => Ok(dict),
            Err(err) => {
                dict.drop_with_heap(&mut self.heap);
                Err(err)
            }
        }
    }

    /// Allocates a native function value.
    pub fn alloc_function(
        &mut self,
        name: &str,
        func: impl Fn(&mut Self, &ArgValues) -> RunResult<Value> + 'static,
    ) -> RunResult<Value> {
        Ok(Value::Ref(self.allocate(HeapData::Function(NativeFunction::new(name, func)))?))
    }

    /// Borrows the contents of a `str` value.
    #[must_use]
    pub fn as_str(&self, value: &Value) -> Option<&str> {
        match self.data_of(value)? {
            HeapData::Str(s) => Some(s),
            _ => None,
        }
    }

    pub(crate) fn data_of(&self, value: &Value) -> Option<&HeapData> {
        value.ref_id().map(|id| self.heap.get(id))
    }

    // ============================================================================
    // Classes
    // ============================================================================

    #[must_use]
    pub fn builtin_class(&self, ty: Type) -> HeapId {
        self.builtin_classes[&ty]
    }

    /// The base proxy class every wrapper subtype derives from.
    #[must_use]
    pub fn proxy_class(&self) -> HeapId {
        self.proxy_class
    }

    /// A new reference to a class, as a value.
    #[must_use]
    pub fn class_value(&self, class_id: HeapId) -> Value {
        self.heap.inc_ref(class_id);
        Value::Ref(class_id)
    }

    /// The class behind a value, if it is one.
    #[must_use]
    pub fn as_class(&self, value: &Value) -> Option<HeapId> {
        match self.data_of(value)? {
            HeapData::Class(_) => value.ref_id(),
            _ => None,
        }
    }

    /// Creates a class. Without bases it derives from `object`; deriving from the proxy
    /// base class (directly or not) makes a wrapper subtype.
    ///
    /// Ownership of any `ClassAttr::Value` passes to the class. The class lives as long
    /// as the runtime.
    pub fn define_class(
        &mut self,
        name: &str,
        module: &str,
        bases: &[HeapId],
        attrs: impl IntoIterator<Item = (String, ClassAttr)>,
    ) -> RunResult<HeapId> {
        let namespace: IndexMap<String, ClassAttr> = attrs.into_iter().collect();
        let bases = if bases.is_empty() {
            vec![self.builtin_class(Type::Object)]
        } else {
            bases.to_vec()
        };
        let mut proxy_kind = false;
        for &base in &bases {
            match self.heap.get_if_live(base) {
                Some(HeapData::Class(cls)) => proxy_kind |= cls.is_proxy_kind(),
                _ => {
                    for (_, attr) in namespace {
                        attr.drop_with_heap(&mut self.heap);
                    }
                    return Err(ExcType::type_error("bases must be classes"));
                }
            }
        }
        for &base in &bases {
            self.heap.inc_ref(base);
        }
        let cls = ClassObject::new(name, module, bases, namespace, proxy_kind);
        let id = install_class(&mut self.heap, cls)?;
        self.user_classes.push(id);
        Ok(id)
    }

    pub(crate) fn class_object(&self, class_id: HeapId) -> Option<&ClassObject> {
        match self.heap.get_if_live(class_id)? {
            HeapData::Class(cls) => Some(cls),
            _ => None,
        }
    }

    /// Class name without module, e.g. `int` or `Point`.
    #[must_use]
    pub fn class_name(&self, class_id: HeapId) -> &str {
        self.class_object(class_id).map_or("?", ClassObject::name)
    }

    /// The declared type of a value. For a proxy this is the proxy's own class, not
    /// the target's (`__class__` is what reflects the target).
    #[must_use]
    pub fn type_of(&self, value: &Value) -> HeapId {
        let ty = match value {
            Value::None => Type::NoneType,
            Value::NotImplemented => Type::NotImplementedType,
            Value::Bool(_) => Type::Bool,
            Value::Int(_) => Type::Int,
            Value::Float(_) => Type::Float,
            Value::Ref(id) => match self.heap.get(*id) {
                HeapData::Str(_) => Type::Str,
                HeapData::List(_) => Type::List,
                HeapData::Tuple(_) => Type::Tuple,
                HeapData::Dict(_) => Type::Dict,
                HeapData::Class(_) => Type::Type,
                HeapData::Function(_) => Type::Function,
                HeapData::BoundMethod(_) => Type::Method,
                HeapData::Iter(_) => Type::Iterator,
                HeapData::Instance(instance) => return instance.class_id(),
                HeapData::Proxy(record) => return record.class_id(),
            },
        };
        self.builtin_class(ty)
    }

    /// Name of the declared type, as used in error messages.
    #[must_use]
    pub fn type_name(&self, value: &Value) -> String {
        self.class_name(self.type_of(value)).to_owned()
    }

    /// Whether `sub` is `sup` or derives from it.
    #[must_use]
    pub fn is_subclass(&self, sub: HeapId, sup: HeapId) -> bool {
        self.class_object(sub).is_some_and(|cls| cls.mro().contains(&sup))
    }

    /// `isinstance(value, cls)`: the declared type first, then `__class__`, so a proxy
    /// is an instance of its target's class too.
    pub fn isinstance(&mut self, value: &Value, cls: HeapId) -> RunResult<bool> {
        if self.is_subclass(self.type_of(value), cls) {
            return Ok(true);
        }
        let reported = match self.getattr(value, "__class__") {
            Ok(reported) => reported,
            Err(err) if err.matches(ExcType::AttributeError) => return Ok(false),
            Err(err) => return Err(err),
        };
        let result = self.as_class(&reported).is_some_and(|id| self.is_subclass(id, cls));
        reported.drop_with_heap(&mut self.heap);
        Ok(result)
    }

    /// Finds `name` along the MRO of `class_id`, skipping the classes in `skip`.
    ///
    /// Returns the attribute (cloned) with the class that declares it.
    pub(crate) fn lookup_in_mro(&self, class_id: HeapId, name: &str, skip: &[HeapId]) -> Option<(HeapId, ClassAttr)> {
        let cls = self.class_object(class_id)?;
        cls.mro().iter().filter(|id| !skip.contains(id)).find_map(|&owner| {
            self.class_object(owner)?
                .own_attr(name)
                .map(|attr| (owner, attr.clone_with_heap(&self.heap)))
        })
    }

    pub(crate) fn lookup_type_attr(&self, class_id: HeapId, name: &str) -> Option<ClassAttr> {
        self.lookup_in_mro(class_id, name, &[]).map(|(_, attr)| attr)
    }

    /// Finds a method (not a value or accessor) along the MRO.
    pub(crate) fn lookup_method(&self, class_id: HeapId, name: &str) -> Option<NativeFunction> {
        let cls = self.class_object(class_id)?;
        cls.mro().iter().find_map(|&owner| match self.class_object(owner)?.own_attr(name)? {
            ClassAttr::Method(function) => Some(function.clone()),
            _ => None,
        })
    }

    /// Calls the dunder `name` found on the receiver's class with `receiver` plus `args`.
    ///
    /// Returns `Ok(None)` when the class does not define it.
    pub(crate) fn call_dunder(&mut self, receiver: &Value, name: &str, args: &[&Value]) -> RunResult<Option<Value>> {
        let Some(function) = self.lookup_method(self.type_of(receiver), name) else {
            return Ok(None);
        };
        let mut values = Vec::with_capacity(args.len() + 1);
        values.push(receiver.clone_with_heap(&self.heap));
        values.extend(args.iter().map(|arg| arg.clone_with_heap(&self.heap)));
        let call_args = ArgValues::new(values);
        let result = function.call(self, &call_args);
        call_args.drop_with_heap(&mut self.heap);
        result.map(Some)
    }

    pub(crate) fn bind_method(&mut self, receiver: &Value, function: NativeFunction) -> RunResult<Value> {
        let receiver = receiver.clone_with_heap(&self.heap);
        Ok(Value::Ref(self.allocate(HeapData::BoundMethod(BoundMethod::new(receiver, function)))?))
    }

    pub(crate) fn new_instance(&mut self, class_id: HeapId) -> RunResult<Value> {
        self.heap.inc_ref(class_id);
        Ok(Value::Ref(self.allocate(HeapData::Instance(Instance::new(class_id)))?))
    }

    // ============================================================================
    // Forwarding depth
    // ============================================================================

    /// Runs `f` one forwarding level deeper, failing with `RecursionError` past the
    /// configured limit.
    pub(crate) fn nested<R>(&mut self, f: impl FnOnce(&mut Self) -> RunResult<R>) -> RunResult<R> {
        self.heap.tracker().check_recursion_depth(self.depth)?;
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }
}

/// Allocates a class and computes its MRO.
///
/// The class's bases must already carry the references it owns.
pub(crate) fn install_class(heap: &mut Heap<impl ResourceTracker>, cls: ClassObject) -> RunResult<HeapId> {
    let bases = cls.bases().to_vec();
    let id = heap.allocate(HeapData::Class(cls))?;
    let mro = if bases.is_empty() {
        Ok(vec![id])
    } else {
        compute_c3_mro(id, &bases, heap)
    };
    match mro {
        Ok(mro) => {
            if let HeapData::Class(cls) = heap.get_mut(id) {
                cls.set_mro(mro);
            }
            Ok(id)
        }
        Err(err) => {
            heap.dec_ref(id);
            Err(err)
        }
    }
}
