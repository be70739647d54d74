use std::{cell::Cell, collections::BTreeMap, mem::ManuallyDrop};

use strum::IntoStaticStr;

use crate::{
    proxy::ProxyRecord,
    resource::{ResourceError, ResourceTracker},
    types::{BoundMethod, ClassObject, Dict, Instance, NativeFunction, SeqIter},
    value::Value,
};

/// Unique identifier for values stored inside the heap arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeapId(usize);

impl HeapId {
    /// Returns the raw index into the heap arena.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// HeapData captures every runtime value that must live in the arena.
///
/// Each variant owns the references it holds: every `Value::Ref` and every class id
/// stored inside counts towards the referenced entry's refcount and is reported by
/// [`HeapData::py_traverse`].
#[derive(Debug, IntoStaticStr)]
pub(crate) enum HeapData {
    Str(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Dict(Dict),
    Class(ClassObject),
    Instance(Instance),
    Function(NativeFunction),
    BoundMethod(BoundMethod),
    Iter(SeqIter),
    Proxy(ProxyRecord),
}

impl HeapData {
    /// Whether entries of this kind can take part in reference cycles.
    ///
    /// Strings and native functions hold no heap references, so the collector skips them.
    #[inline]
    pub fn is_gc_tracked(&self) -> bool {
        !matches!(self, Self::Str(_) | Self::Function(_))
    }

    /// Calls `visit` once for every heap reference this entry owns.
    pub fn py_traverse(&self, visit: &mut impl FnMut(HeapId)) {
        match self {
            Self::Str(_) | Self::Function(_) => {}
            Self::List(items) | Self::Tuple(items) => {
                for item in items {
                    visit_ref(item, visit);
                }
            }
            Self::Dict(dict) => dict.traverse(visit),
            Self::Class(cls) => cls.traverse(visit),
            Self::Instance(instance) => instance.traverse(visit),
            Self::BoundMethod(method) => visit_ref(method.receiver(), visit),
            Self::Iter(iter) => visit_ref(iter.source(), visit),
            Self::Proxy(record) => {
                visit(record.class_id());
                record.traverse(&mut |target| visit_ref(target, visit));
            }
        }
    }

    /// Releases the references that can form cycles, leaving the entry structurally valid.
    ///
    /// Released values are pushed to `released` so the caller can drop them once no
    /// entry is borrowed. Calling this twice releases nothing the second time.
    pub fn py_clear(&mut self, released: &mut Vec<Value>) {
        match self {
            Self::Str(_) | Self::Function(_) => {}
            Self::List(items) | Self::Tuple(items) => released.append(items),
            Self::Dict(dict) => dict.clear_into(released),
            Self::Class(cls) => cls.clear_into(released),
            Self::Instance(instance) => instance.clear_into(released),
            Self::BoundMethod(method) => released.push(method.take_receiver()),
            Self::Iter(iter) => released.push(iter.take_source()),
            Self::Proxy(record) => released.extend(record.clear()),
        }
    }

    /// Consumes the entry, pushing every heap id it owned onto `stack`.
    ///
    /// A proxy being torn down goes through its clear hook so the target is released
    /// the same way the collector would release it.
    fn py_dec_ref_ids(mut self, stack: &mut Vec<HeapId>) {
        if let Self::Proxy(record) = &mut self {
            if let Some(Value::Ref(id)) = record.clear() {
                stack.push(id);
            }
            stack.push(record.class_id());
            return;
        }
        self.py_traverse(&mut |id| stack.push(id));
    }

    /// Rough size in bytes used for memory accounting.
    fn estimate_size(&self) -> usize {
        let values = |n: usize| n * size_of::<Value>();
        size_of::<Self>()
            + match self {
                Self::Str(s) => s.len(),
                Self::List(items) | Self::Tuple(items) => values(items.len()),
                Self::Dict(dict) => dict.len() * (2 * size_of::<Value>() + size_of::<i64>()),
                Self::Class(cls) => cls.namespace_len() * 64,
                Self::Instance(instance) => instance.attr_count() * 48,
                Self::Function(_) | Self::BoundMethod(_) | Self::Iter(_) | Self::Proxy(_) => 0,
            }
    }
}

#[inline]
pub(crate) fn visit_ref(value: &Value, visit: &mut impl FnMut(HeapId)) {
    if let Value::Ref(id) = value {
        visit(*id);
    }
}

/// A single entry inside the heap arena.
#[derive(Debug)]
struct HeapValue {
    refcount: Cell<usize>,
    data: HeapData,
}

/// Reference-counting arena that backs all heap-only runtime values.
///
/// Freed slots are recycled through a free list, so a `HeapId` is only meaningful
/// while the value it names is alive.
#[derive(Debug)]
pub(crate) struct Heap<T: ResourceTracker> {
    entries: Vec<Option<HeapValue>>,
    free_list: Vec<HeapId>,
    tracker: T,
    /// Tracked allocations since the last cycle collection.
    allocations_since_gc: usize,
}

/// Outcome of one cycle collection.
#[derive(Debug, Default)]
pub(crate) struct CycleCollection {
    /// Number of entries freed.
    pub freed: usize,
    /// Proxies whose clear hook ran.
    pub cleared_proxies: Vec<HeapId>,
}

impl<T: ResourceTracker> Heap<T> {
    pub fn new(tracker: T) -> Self {
        Self {
            entries: Vec::with_capacity(64),
            free_list: Vec::new(),
            tracker,
            allocations_since_gc: 0,
        }
    }

    pub fn tracker(&self) -> &T {
        &self.tracker
    }

    /// Swaps in a new tracker; allocations made before the swap are not accounted.
    pub fn set_tracker(&mut self, tracker: T) {
        self.tracker = tracker;
    }

    /// Allocates a new heap entry with a refcount of one, owned by the caller.
    ///
    /// When the tracker refuses, the references `data` held are released.
    pub fn allocate(&mut self, data: HeapData) -> Result<HeapId, ResourceError> {
        if let Err(err) = self.tracker.on_allocate(|| data.estimate_size()) {
            let mut owned = Vec::new();
            data.py_dec_ref_ids(&mut owned);
            for id in owned {
                self.dec_ref(id);
            }
            return Err(err);
        }
        if data.is_gc_tracked() {
            self.allocations_since_gc += 1;
        }
        let entry = Some(HeapValue {
            refcount: Cell::new(1),
            data,
        });
        if let Some(id) = self.free_list.pop() {
            self.entries[id.index()] = entry;
            Ok(id)
        } else {
            let id = HeapId(self.entries.len());
            self.entries.push(entry);
            Ok(id)
        }
    }

    /// Increments the reference count for an existing heap entry.
    ///
    /// # Panics
    /// Panics if the id is out of range or names a freed entry.
    pub fn inc_ref(&self, id: HeapId) {
        let entry = self.entry(id, "inc_ref");
        entry.refcount.set(entry.refcount.get() + 1);
    }

    /// Decrements the reference count and frees the entry (and, transitively, anything
    /// it solely owned) once it reaches zero.
    ///
    /// Freeing is iterative, so arbitrarily long proxy chains cannot exhaust the stack.
    pub fn dec_ref(&mut self, id: HeapId) {
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            let slot = self
                .entries
                .get_mut(id.index())
                .expect("Heap::dec_ref: slot missing");
            let entry = slot.as_mut().expect("Heap::dec_ref: object already freed");
            let count = entry.refcount.get();
            if count > 1 {
                entry.refcount.set(count - 1);
                continue;
            }
            let Some(freed) = slot.take() else {
                continue;
            };
            self.free_list.push(id);
            self.tracker.on_free(|| freed.data.estimate_size());
            freed.data.py_dec_ref_ids(&mut pending);
        }
    }

    /// Returns an immutable reference to the heap data stored at the given id.
    ///
    /// # Panics
    /// Panics if the id is out of range or names a freed entry.
    #[must_use]
    pub fn get(&self, id: HeapId) -> &HeapData {
        &self.entry(id, "get").data
    }

    /// Returns a mutable reference to the heap data stored at the given id.
    ///
    /// # Panics
    /// Panics if the id is out of range or names a freed entry.
    pub fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        &mut self
            .entries
            .get_mut(id.index())
            .expect("Heap::get_mut: slot missing")
            .as_mut()
            .expect("Heap::get_mut: object already freed")
            .data
    }

    /// Returns the heap data if the entry is still alive.
    #[must_use]
    pub fn get_if_live(&self, id: HeapId) -> Option<&HeapData> {
        self.entries.get(id.index())?.as_ref().map(|entry| &entry.data)
    }

    /// Current reference count, zero for freed entries.
    #[must_use]
    pub fn refcount(&self, id: HeapId) -> usize {
        self.entries
            .get(id.index())
            .and_then(Option::as_ref)
            .map_or(0, |entry| entry.refcount.get())
    }

    fn entry(&self, id: HeapId, func: &str) -> &HeapValue {
        match self.entries.get(id.index()) {
            Some(Some(entry)) => entry,
            Some(None) => panic!("Heap::{func}: object already freed"),
            None => panic!("Heap::{func}: slot missing"),
        }
    }

    /// Whether enough tracked allocations happened to warrant a cycle collection.
    #[must_use]
    pub fn should_gc(&self) -> bool {
        self.tracker
            .gc_interval()
            .is_some_and(|interval| self.allocations_since_gc >= interval)
    }

    /// Number of live entries.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_some()).count()
    }

    // ============================================================================
    // Cycle collection
    // ============================================================================

    /// Frees every tracked entry that is only kept alive by references from other
    /// garbage.
    ///
    /// 1. Each tracked entry starts with its refcount; every reference reported by
    ///    another tracked entry's traverse hook is subtracted.
    /// 2. Entries left with a positive count are referenced from outside the tracked
    ///    graph (runtime roots or values held by Rust code); everything they reach
    ///    survives.
    /// 3. The remainder is garbage. Each member is pinned, its clear hook runs, the
    ///    released references are dropped, and finally the pins are removed, which
    ///    frees the now-empty entries.
    pub fn collect_cycles(&mut self) -> CycleCollection {
        self.allocations_since_gc = 0;
        let len = self.entries.len();
        let mut tracked = vec![false; len];
        let mut gc_refs = vec![0_isize; len];
        for (idx, slot) in self.entries.iter().enumerate() {
            if let Some(entry) = slot
                && entry.data.is_gc_tracked()
            {
                tracked[idx] = true;
                gc_refs[idx] = isize::try_from(entry.refcount.get()).unwrap_or(isize::MAX);
            }
        }

        for (idx, slot) in self.entries.iter().enumerate() {
            if !tracked[idx] {
                continue;
            }
            if let Some(entry) = slot {
                entry.data.py_traverse(&mut |child| {
                    if tracked[child.index()] {
                        gc_refs[child.index()] -= 1;
                    }
                });
            }
        }

        let mut reachable = vec![false; len];
        let mut work: Vec<HeapId> = (0..len).filter(|&idx| tracked[idx] && gc_refs[idx] > 0).map(HeapId).collect();
        while let Some(id) = work.pop() {
            if reachable[id.index()] {
                continue;
            }
            reachable[id.index()] = true;
            if let Some(Some(entry)) = self.entries.get(id.index()) {
                entry.data.py_traverse(&mut |child| {
                    if tracked[child.index()] && !reachable[child.index()] {
                        work.push(child);
                    }
                });
            }
        }

        let garbage: Vec<HeapId> = (0..len)
            .filter(|&idx| tracked[idx] && !reachable[idx])
            .map(HeapId)
            .collect();
        if garbage.is_empty() {
            return CycleCollection::default();
        }

        let live_before = self.live_count();
        for &id in &garbage {
            self.inc_ref(id);
        }
        let mut cleared_proxies = Vec::new();
        let mut released = Vec::new();
        for &id in &garbage {
            let data = self.get_mut(id);
            if matches!(data, HeapData::Proxy(_)) {
                cleared_proxies.push(id);
            }
            data.py_clear(&mut released);
            for value in released.drain(..) {
                value.drop_with_heap(self);
            }
        }
        for id in garbage {
            self.dec_ref(id);
        }

        CycleCollection {
            freed: live_before.saturating_sub(self.live_count()),
            cleared_proxies,
        }
    }

    /// Returns a snapshot of heap occupancy.
    #[must_use]
    pub fn stats(&self) -> HeapStats {
        let mut objects_by_type = BTreeMap::new();
        for entry in self.entries.iter().flatten() {
            let name: &'static str = (&entry.data).into();
            *objects_by_type.entry(name).or_insert(0) += 1;
        }
        let live_objects = objects_by_type.values().sum();
        HeapStats {
            live_objects,
            free_slots: self.free_list.len(),
            total_slots: self.entries.len(),
            objects_by_type,
        }
    }
}

/// Snapshot of heap state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapStats {
    /// Number of live (non-free) objects on the heap.
    pub live_objects: usize,
    /// Number of free slots available for reuse.
    pub free_slots: usize,
    /// Total number of slots (live + free).
    pub total_slots: usize,
    /// Breakdown of live objects by heap kind (`"Proxy"`, `"List"`, ...).
    pub objects_by_type: BTreeMap<&'static str, usize>,
}

impl HeapStats {
    /// Live objects of one heap kind.
    #[must_use]
    pub fn count_of(&self, kind: &str) -> usize {
        self.objects_by_type.get(kind).copied().unwrap_or(0)
    }
}

// ============================================================================
// Drop helpers
// ============================================================================

/// Implemented by anything that owns a heap: the heap itself and the runtime.
pub(crate) trait ContainsHeap<T: ResourceTracker> {
    fn heap_mut(&mut self) -> &mut Heap<T>;
}

impl<T: ResourceTracker> ContainsHeap<T> for Heap<T> {
    #[inline]
    fn heap_mut(&mut self) -> &mut Self {
        self
    }
}

/// Types that must decrement heap refcounts when they go away.
///
/// `Drop` has no access to the heap, so owners of heap references release them
/// explicitly. Every code path must release; prefer [`defer_drop!`] where there is
/// more than one exit.
pub(crate) trait DropWithHeap<T: ResourceTracker> {
    fn drop_with_heap(self, heap: &mut Heap<T>);
}

impl<T: ResourceTracker> DropWithHeap<T> for Value {
    #[inline]
    fn drop_with_heap(self, heap: &mut Heap<T>) {
        Self::drop_with_heap(self, heap);
    }
}

impl<T: ResourceTracker, U: DropWithHeap<T>> DropWithHeap<T> for Option<U> {
    #[inline]
    fn drop_with_heap(self, heap: &mut Heap<T>) {
        if let Some(value) = self {
            value.drop_with_heap(heap);
        }
    }
}

impl<T: ResourceTracker, U: DropWithHeap<T>> DropWithHeap<T> for Vec<U> {
    fn drop_with_heap(self, heap: &mut Heap<T>) {
        for value in self {
            value.drop_with_heap(heap);
        }
    }
}

impl<T: ResourceTracker> DropWithHeap<T> for (Value, Value) {
    fn drop_with_heap(self, heap: &mut Heap<T>) {
        self.0.drop_with_heap(heap);
        self.1.drop_with_heap(heap);
    }
}

/// RAII guard that releases a value with the heap when it leaves scope.
pub(crate) struct HeapGuard<'a, T: ResourceTracker, H: ContainsHeap<T>, V: DropWithHeap<T>> {
    value: ManuallyDrop<V>,
    heap: &'a mut H,
    _tracker: std::marker::PhantomData<T>,
}

impl<'a, T: ResourceTracker, H: ContainsHeap<T>, V: DropWithHeap<T>> HeapGuard<'a, T, H, V> {
    #[inline]
    pub fn new(value: V, heap: &'a mut H) -> Self {
        Self {
            value: ManuallyDrop::new(value),
            heap,
            _tracker: std::marker::PhantomData,
        }
    }

    /// Borrows the value (immutably) and heap owner (mutably) out of the guard.
    #[inline]
    pub fn as_parts(&mut self) -> (&V, &mut H) {
        (&self.value, self.heap)
    }
}

impl<T: ResourceTracker, H: ContainsHeap<T>, V: DropWithHeap<T>> Drop for HeapGuard<'_, T, H, V> {
    fn drop(&mut self) {
        // SAFETY: the value is only ever taken here, and drop runs once.
        unsafe { ManuallyDrop::take(&mut self.value) }.drop_with_heap(self.heap.heap_mut());
    }
}

/// Moves `$value` into a [`HeapGuard`] and rebinds it as `&V`, with `$heap` rebound as
/// the guard's `&mut` heap owner. The value is released on every exit from the scope.
///
/// Cannot rebind `self`; in `&mut self` methods write `let this = self;` first.
macro_rules! defer_drop {
    ($value:ident, $heap:ident) => {
        let mut _guard = $crate::heap::HeapGuard::new($value, $heap);
        #[allow(
            clippy::allow_attributes,
            reason = "either part may go unused depending on the call site"
        )]
        #[allow(unused_variables)]
        let ($value, $heap) = _guard.as_parts();
    };
}
pub(crate) use defer_drop;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::NoLimitTracker;

    fn heap() -> Heap<NoLimitTracker> {
        Heap::new(NoLimitTracker)
    }

    #[test]
    fn dec_ref_frees_children() {
        let mut heap = heap();
        let s = heap.allocate(HeapData::Str("a".into())).unwrap();
        let list = heap.allocate(HeapData::List(vec![Value::Ref(s)])).unwrap();
        assert_eq!(heap.live_count(), 2);
        heap.dec_ref(list);
        assert_eq!(heap.live_count(), 0);
        assert_eq!(heap.stats().free_slots, 2);
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut heap = heap();
        let first = heap.allocate(HeapData::Str("a".into())).unwrap();
        heap.dec_ref(first);
        let second = heap.allocate(HeapData::Str("b".into())).unwrap();
        assert_eq!(first, second);
        assert_eq!(heap.stats().total_slots, 1);
    }

    #[test]
    fn self_referencing_list_needs_collection() {
        let mut heap = heap();
        let list = heap.allocate(HeapData::List(Vec::new())).unwrap();
        heap.inc_ref(list);
        if let HeapData::List(items) = heap.get_mut(list) {
            items.push(Value::Ref(list));
        }
        heap.dec_ref(list);
        assert_eq!(heap.live_count(), 1);

        let outcome = heap.collect_cycles();
        assert_eq!(outcome.freed, 1);
        assert_eq!(heap.live_count(), 0);
    }

    #[test]
    fn externally_held_cycle_survives() {
        let mut heap = heap();
        let list = heap.allocate(HeapData::List(Vec::new())).unwrap();
        heap.inc_ref(list);
        if let HeapData::List(items) = heap.get_mut(list) {
            items.push(Value::Ref(list));
        }
        let outcome = heap.collect_cycles();
        assert_eq!(outcome.freed, 0);
        assert_eq!(heap.refcount(list), 2);
    }

    #[test]
    fn proxy_cycle_runs_clear_hook() {
        let mut heap = heap();
        let kind = heap.allocate(HeapData::Str("kind".into())).unwrap();
        let list = heap.allocate(HeapData::List(Vec::new())).unwrap();
        heap.inc_ref(list);
        // the proxy takes over our reference to `kind`
        let proxy = heap
            .allocate(HeapData::Proxy(ProxyRecord::new(kind, Some(Value::Ref(list)))))
            .unwrap();
        if let HeapData::List(items) = heap.get_mut(list) {
            items.push(Value::Ref(proxy));
        }
        heap.dec_ref(list);
        assert_eq!(heap.live_count(), 3);

        let outcome = heap.collect_cycles();
        assert_eq!(outcome.cleared_proxies, vec![proxy]);
        assert_eq!(outcome.freed, 3);
        assert_eq!(heap.live_count(), 0);
    }

    #[test]
    fn long_chains_free_without_recursion() {
        let mut heap = heap();
        let kind = heap.allocate(HeapData::Str("kind".into())).unwrap();
        let mut inner = Value::Int(0);
        for _ in 0..100_000 {
            heap.inc_ref(kind);
            let id = heap.allocate(HeapData::Proxy(ProxyRecord::new(kind, Some(inner)))).unwrap();
            inner = Value::Ref(id);
        }
        inner.drop_with_heap(&mut heap);
        assert_eq!(heap.live_count(), 1);
        assert_eq!(heap.refcount(kind), 1);
    }
}
