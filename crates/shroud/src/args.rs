use smallvec::SmallVec;

use crate::{
    exception::{ExcType, RunResult},
    heap::{DropWithHeap, Heap},
    resource::ResourceTracker,
    value::Value,
};

/// Arguments of a call: positional values plus keyword pairs.
///
/// The container owns its values. Callees receive it by reference and must not keep
/// the values without cloning them.
#[derive(Debug, Default)]
pub struct ArgValues {
    args: SmallVec<[Value; 3]>,
    kwargs: Vec<(String, Value)>,
}

impl ArgValues {
    pub fn new(args: impl IntoIterator<Item = Value>) -> Self {
        Self {
            args: args.into_iter().collect(),
            kwargs: Vec::new(),
        }
    }

    /// Adds a keyword argument.
    #[must_use]
    pub fn with_kwarg(mut self, name: impl Into<String>, value: Value) -> Self {
        self.kwargs.push((name.into(), value));
        self
    }

    #[must_use]
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    #[must_use]
    pub fn kwargs(&self) -> &[(String, Value)] {
        &self.kwargs
    }

    #[must_use]
    pub fn has_kwargs(&self) -> bool {
        !self.kwargs.is_empty()
    }

    /// Copies the arguments with `receiver` inserted in front, as a bound method call needs.
    pub(crate) fn prepend_cloned(&self, receiver: &Value, heap: &Heap<impl ResourceTracker>) -> Self {
        let mut args = SmallVec::with_capacity(self.args.len() + 1);
        args.push(receiver.clone_with_heap(heap));
        args.extend(self.args.iter().map(|arg| arg.clone_with_heap(heap)));
        let kwargs = self
            .kwargs
            .iter()
            .map(|(name, value)| (name.clone(), value.clone_with_heap(heap)))
            .collect();
        Self { args, kwargs }
    }

    /// Positional arguments, failing unless their count is within `min..=max` and no
    /// keywords were passed.
    pub(crate) fn positional(&self, func: &str, min: usize, max: usize) -> RunResult<&[Value]> {
        if self.has_kwargs() {
            return Err(ExcType::no_kwargs(func));
        }
        let got = self.args.len();
        if got < min {
            let qualifier = if min == max { "exactly" } else { "at least" };
            let plural = if min == 1 { "" } else { "s" };
            return Err(ExcType::type_error(format!(
                "{func}() takes {qualifier} {min} argument{plural} ({got} given)"
            )));
        }
        if got > max {
            let qualifier = if min == max { "exactly" } else { "at most" };
            let plural = if max == 1 { "" } else { "s" };
            return Err(ExcType::type_error(format!(
                "{func}() takes {qualifier} {max} argument{plural} ({got} given)"
            )));
        }
        Ok(&self.args)
    }
}

impl<T: ResourceTracker> DropWithHeap<T> for ArgValues {
    fn drop_with_heap(self, heap: &mut Heap<T>) {
        for arg in self.args {
            arg.drop_with_heap(heap);
        }
        for (_, value) in self.kwargs {
            value.drop_with_heap(heap);
        }
    }
}
