use crate::{
    heap::{Heap, HeapId},
    resource::ResourceTracker,
};

/// Primary value type of the object model.
///
/// Small immediates are stored inline; everything else lives in the heap and is
/// referenced through `Ref`. `Value` deliberately does not implement `Clone`: a copy of
/// a `Ref` must bump the refcount, so copies go through the runtime
/// (`Runtime::clone_value`) and releases through `Runtime::release`.
#[derive(Debug)]
pub enum Value {
    None,
    /// Returned by a binary slot that does not handle its operand types.
    NotImplemented,
    Bool(bool),
    Int(i64),
    Float(f64),
    Ref(HeapId),
}

impl Value {
    /// Identity comparison, Python's `is`.
    ///
    /// References compare by heap id. Immediates compare by value, which mirrors the
    /// interning CPython applies to `None`, booleans and small integers.
    #[must_use]
    pub fn is(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) | (Self::NotImplemented, Self::NotImplemented) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Ref(a), Self::Ref(b)) => a == b,
            _ => false,
        }
    }

    /// The heap id behind a reference, `None` for immediates.
    #[must_use]
    pub fn ref_id(&self) -> Option<HeapId> {
        match self {
            Self::Ref(id) => Some(*id),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    #[must_use]
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Self::NotImplemented)
    }

    /// Copies the value, taking a new reference for heap values.
    pub(crate) fn clone_with_heap(&self, heap: &Heap<impl ResourceTracker>) -> Self {
        if let Self::Ref(id) = self {
            heap.inc_ref(*id);
        }
        self.copy_raw()
    }

    /// Releases the reference held by this value, if any.
    pub(crate) fn drop_with_heap(self, heap: &mut Heap<impl ResourceTracker>) {
        if let Self::Ref(id) = self {
            heap.dec_ref(id);
        }
    }

    /// Bitwise copy without touching refcounts.
    ///
    /// Only sound for immediates, or when the caller accounts for the extra reference.
    pub(crate) fn copy_raw(&self) -> Self {
        match self {
            Self::None => Self::None,
            Self::NotImplemented => Self::NotImplemented,
            Self::Bool(b) => Self::Bool(*b),
            Self::Int(i) => Self::Int(*i),
            Self::Float(f) => Self::Float(*f),
            Self::Ref(id) => Self::Ref(*id),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}
