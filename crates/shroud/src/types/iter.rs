use crate::value::Value;

/// Position-based iterator over a list, tuple, str or dict (keys).
///
/// Holds a reference to its source so mutation during iteration is observed, the way
/// CPython's list iterator behaves.
#[derive(Debug)]
pub(crate) struct SeqIter {
    source: Value,
    index: usize,
}

impl SeqIter {
    pub fn new(source: Value) -> Self {
        Self { source, index: 0 }
    }

    pub fn source(&self) -> &Value {
        &self.source
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn advance(&mut self) {
        self.index += 1;
    }

    /// Detaches the source; an iterator without a source is exhausted.
    pub fn take_source(&mut self) -> Value {
        std::mem::replace(&mut self.source, Value::None)
    }
}
