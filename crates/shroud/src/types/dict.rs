use crate::{
    heap::{HeapId, visit_ref},
    value::Value,
};

#[derive(Debug)]
pub(crate) struct DictEntry {
    pub hash: i64,
    pub key: Value,
    pub value: Value,
}

/// Insertion-ordered mapping.
///
/// Lookups filter by hash here and leave key equality to the runtime, because
/// comparing keys may call user `__eq__` methods or forward through proxies.
#[derive(Debug, Default)]
pub(crate) struct Dict {
    entries: Vec<DictEntry>,
}

impl Dict {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[DictEntry] {
        &self.entries
    }

    /// Indices and keys of the entries whose hash matches.
    pub fn candidates(&self, hash: i64) -> impl Iterator<Item = (usize, &Value)> {
        self.entries
            .iter()
            .enumerate()
            .filter(move |(_, entry)| entry.hash == hash)
            .map(|(idx, entry)| (idx, &entry.key))
    }

    pub fn value_at(&self, idx: usize) -> Option<&Value> {
        self.entries.get(idx).map(|entry| &entry.value)
    }

    pub fn key_at(&self, idx: usize) -> Option<&Value> {
        self.entries.get(idx).map(|entry| &entry.key)
    }

    /// Swaps the value stored at `idx`, returning the previous one.
    pub fn replace_value(&mut self, idx: usize, value: Value) -> Value {
        std::mem::replace(&mut self.entries[idx].value, value)
    }

    pub fn push(&mut self, hash: i64, key: Value, value: Value) {
        self.entries.push(DictEntry { hash, key, value });
    }

    pub fn remove(&mut self, idx: usize) -> DictEntry {
        self.entries.remove(idx)
    }

    pub fn traverse(&self, visit: &mut impl FnMut(HeapId)) {
        for entry in &self.entries {
            visit_ref(&entry.key, visit);
            visit_ref(&entry.value, visit);
        }
    }

    pub fn clear_into(&mut self, released: &mut Vec<Value>) {
        for entry in self.entries.drain(..) {
            released.push(entry.key);
            released.push(entry.value);
        }
    }
}
