use std::{fmt, rc::Rc};

use indexmap::IndexMap;

use crate::{
    exception::{ExcType, RunResult},
    heap::{Heap, HeapData, HeapId, visit_ref},
    resource::ResourceTracker,
    runtime::Runtime,
    types::NativeFunction,
    value::Value,
};

/// Getter half of an accessor: `(runtime, instance, owner class) -> value`.
pub type Getter = dyn Fn(&mut Runtime, &Value, HeapId) -> RunResult<Value>;

/// Setter half of an accessor: `(runtime, instance, new value or None to delete)`.
pub type Setter = dyn Fn(&mut Runtime, &Value, Option<&Value>) -> RunResult<()>;

/// A computed attribute declared on a class.
///
/// With a setter it is a data accessor and takes precedence over anything stored on or
/// behind the instance; getter-only accessors yield to a same-named attribute found
/// elsewhere first.
#[derive(Clone)]
pub struct Accessor {
    getter: Rc<Getter>,
    setter: Option<Rc<Setter>>,
}

impl Accessor {
    /// A getter-only (non-data) accessor.
    pub fn getter(getter: impl Fn(&mut Runtime, &Value, HeapId) -> RunResult<Value> + 'static) -> Self {
        Self {
            getter: Rc::new(getter),
            setter: None,
        }
    }

    /// Adds a setter, turning this into a data accessor.
    #[must_use]
    pub fn with_setter(mut self, setter: impl Fn(&mut Runtime, &Value, Option<&Value>) -> RunResult<()> + 'static) -> Self {
        self.setter = Some(Rc::new(setter));
        self
    }

    /// Whether the accessor defines both getter and setter.
    #[must_use]
    pub fn is_data(&self) -> bool {
        self.setter.is_some()
    }

    pub(crate) fn get(&self, rt: &mut Runtime, instance: &Value, owner: HeapId) -> RunResult<Value> {
        (self.getter)(rt, instance, owner)
    }

    /// Runs the setter, `None` when there is none.
    pub(crate) fn set(&self, rt: &mut Runtime, instance: &Value, value: Option<&Value>) -> Option<RunResult<()>> {
        self.setter.as_ref().map(|setter| setter(rt, instance, value))
    }
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessor").field("data", &self.is_data()).finish_non_exhaustive()
    }
}

/// An entry in a class namespace.
#[derive(Debug)]
pub enum ClassAttr {
    /// A stored value, returned as-is by lookup.
    Value(Value),
    /// A method; binds the receiver on instance lookup (non-data descriptor).
    Method(NativeFunction),
    /// A computed attribute.
    Accessor(Accessor),
}

impl ClassAttr {
    /// Shorthand for a method entry.
    pub fn method(name: &str, func: impl Fn(&mut Runtime, &crate::ArgValues) -> RunResult<Value> + 'static) -> Self {
        Self::Method(NativeFunction::new(name, func))
    }

    pub(crate) fn clone_with_heap(&self, heap: &Heap<impl ResourceTracker>) -> Self {
        match self {
            Self::Value(value) => Self::Value(value.clone_with_heap(heap)),
            Self::Method(function) => Self::Method(function.clone()),
            Self::Accessor(accessor) => Self::Accessor(accessor.clone()),
        }
    }

    pub(crate) fn drop_with_heap(self, heap: &mut Heap<impl ResourceTracker>) {
        if let Self::Value(value) = self {
            value.drop_with_heap(heap);
        }
    }
}

/// A class: builtin, user-defined, or a proxy kind.
#[derive(Debug)]
pub(crate) struct ClassObject {
    name: String,
    module: String,
    /// Direct bases; each holds a reference.
    bases: Vec<HeapId>,
    /// Method resolution order starting with the class itself. Not owned.
    mro: Vec<HeapId>,
    namespace: IndexMap<String, ClassAttr>,
    proxy_kind: bool,
}

impl ClassObject {
    pub fn new(name: &str, module: &str, bases: Vec<HeapId>, namespace: IndexMap<String, ClassAttr>, proxy_kind: bool) -> Self {
        Self {
            name: name.to_owned(),
            module: module.to_owned(),
            bases,
            mro: Vec::new(),
            namespace,
            proxy_kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// `name` for builtins, `module.name` otherwise.
    pub fn qualified_name(&self) -> String {
        if self.module == "builtins" {
            self.name.clone()
        } else {
            format!("{}.{}", self.module, self.name)
        }
    }

    pub fn bases(&self) -> &[HeapId] {
        &self.bases
    }

    pub fn mro(&self) -> &[HeapId] {
        &self.mro
    }

    pub fn set_mro(&mut self, mro: Vec<HeapId>) {
        self.mro = mro;
    }

    /// Instances of this class are proxy records rather than plain instances.
    pub fn is_proxy_kind(&self) -> bool {
        self.proxy_kind
    }

    pub fn own_attr(&self, name: &str) -> Option<&ClassAttr> {
        self.namespace.get(name)
    }

    pub fn set_attr(&mut self, name: &str, attr: ClassAttr) -> Option<ClassAttr> {
        self.namespace.insert(name.to_owned(), attr)
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<ClassAttr> {
        self.namespace.shift_remove(name)
    }

    pub fn namespace_len(&self) -> usize {
        self.namespace.len()
    }

    pub fn traverse(&self, visit: &mut impl FnMut(HeapId)) {
        for &base in &self.bases {
            visit(base);
        }
        for attr in self.namespace.values() {
            if let ClassAttr::Value(value) = attr {
                visit_ref(value, visit);
            }
        }
    }

    pub fn clear_into(&mut self, released: &mut Vec<Value>) {
        for (_, attr) in std::mem::take(&mut self.namespace) {
            if let ClassAttr::Value(value) = attr {
                released.push(value);
            }
        }
    }
}

/// An instance of a user class.
#[derive(Debug)]
pub(crate) struct Instance {
    /// Holds a reference.
    class_id: HeapId,
    attrs: IndexMap<String, Value>,
}

impl Instance {
    pub fn new(class_id: HeapId) -> Self {
        Self {
            class_id,
            attrs: IndexMap::new(),
        }
    }

    pub fn class_id(&self) -> HeapId {
        self.class_id
    }

    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.attrs.get(name)
    }

    pub fn set_attr(&mut self, name: &str, value: Value) -> Option<Value> {
        self.attrs.insert(name.to_owned(), value)
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<Value> {
        self.attrs.shift_remove(name)
    }

    pub fn attr_count(&self) -> usize {
        self.attrs.len()
    }

    pub fn traverse(&self, visit: &mut impl FnMut(HeapId)) {
        visit(self.class_id);
        for value in self.attrs.values() {
            visit_ref(value, visit);
        }
    }

    pub fn clear_into(&mut self, released: &mut Vec<Value>) {
        released.extend(self.attrs.drain(..).map(|(_, value)| value));
    }
}

/// Computes the C3 linearization for a new class.
///
/// `bases` must be non-empty; classes without explicit bases derive from `object`.
pub(crate) fn compute_c3_mro(self_id: HeapId, bases: &[HeapId], heap: &Heap<impl ResourceTracker>) -> RunResult<Vec<HeapId>> {
    if bases.contains(&self_id) {
        return Err(ExcType::type_error("a class cannot inherit from itself"));
    }

    let mut linearizations: Vec<Vec<HeapId>> = Vec::with_capacity(bases.len() + 1);
    for &base_id in bases {
        match heap.get(base_id) {
            HeapData::Class(cls) => linearizations.push(cls.mro().to_vec()),
            _ => return Err(ExcType::type_error("bases must be classes")),
        }
    }
    linearizations.push(bases.to_vec());

    let mut result = vec![self_id];
    loop {
        linearizations.retain(|lin| !lin.is_empty());
        if linearizations.is_empty() {
            return Ok(result);
        }

        // a good head appears in no tail
        let head = linearizations
            .iter()
            .map(|lin| lin[0])
            .find(|candidate| !linearizations.iter().any(|other| other[1..].contains(candidate)));

        let Some(next) = head else {
            let names: Vec<&str> = bases
                .iter()
                .map(|&id| match heap.get(id) {
                    HeapData::Class(cls) => cls.name(),
                    _ => "?",
                })
                .collect();
            return Err(ExcType::type_error(format!(
                "Cannot create a consistent method resolution order (MRO) for bases {}",
                names.join(", ")
            )));
        };
        result.push(next);
        for lin in &mut linearizations {
            if lin.first() == Some(&next) {
                lin.remove(0);
            }
        }
    }
}
