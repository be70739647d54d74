//! Reasoning about nested proxies.
//!
//! A value and the targets reached by unwrapping it one proxy at a time form its
//! unwrap chain. These walks only read the heap; the values they return are new
//! references.

use crate::{
    exception::RunResult,
    heap::HeapId,
    runtime::Runtime,
    value::Value,
};

impl Runtime {
    /// The proxy layers of `obj`'s chain, outermost first, each with its class.
    ///
    /// Stops at the first non-proxy or at a proxy without a target.
    fn layers<'a>(&'a self, obj: &'a Value) -> impl Iterator<Item = (&'a Value, HeapId)> + 'a {
        let mut current = Some(obj);
        std::iter::from_fn(move || {
            let value = current?;
            let record = self.proxy_record(value)?;
            current = record.target();
            Some((value, record.class_id()))
        })
    }

    /// The end of `obj`'s chain: the first non-proxy, or `None` when a proxy in the
    /// chain has no target.
    fn chain_terminus<'a>(&'a self, obj: &'a Value) -> Option<&'a Value> {
        let mut current = obj;
        while let Some(record) = self.proxy_record(current) {
            current = record.target()?;
        }
        Some(current)
    }

    /// Whether some layer of `obj` is a proxy of class `kind` (default `ProxyBase`),
    /// subclasses included.
    #[must_use]
    pub fn is_proxy(&self, obj: &Value, kind: Option<HeapId>) -> bool {
        let kind = kind.unwrap_or(self.proxy_class());
        self.layers(obj).any(|(_, class_id)| self.is_subclass(class_id, kind))
    }

    /// The outermost layer of `obj` that is a proxy of class `kind`, else `default`
    /// (else `None`).
    #[must_use]
    pub fn query_proxy(&self, obj: &Value, kind: Option<HeapId>, default: Option<&Value>) -> Value {
        let kind = kind.unwrap_or(self.proxy_class());
        let found = self.layers(obj).find(|&(_, class_id)| self.is_subclass(class_id, kind));
        self.found_or_default(found.map(|(layer, _)| layer), default)
    }

    /// The innermost layer of `obj` that is a proxy of class `kind`, else `default`
    /// (else `None`).
    #[must_use]
    pub fn query_inner_proxy(&self, obj: &Value, kind: Option<HeapId>, default: Option<&Value>) -> Value {
        let kind = kind.unwrap_or(self.proxy_class());
        let found = self.layers(obj).filter(|&(_, class_id)| self.is_subclass(class_id, kind)).last();
        self.found_or_default(found.map(|(layer, _)| layer), default)
    }

    fn found_or_default(&self, found: Option<&Value>, default: Option<&Value>) -> Value {
        found.or(default).map_or(Value::None, |value| self.clone_value(value))
    }

    /// Unwraps every layer. A proxy without a target in the chain yields `None`.
    #[must_use]
    pub fn remove_all_proxies(&self, obj: &Value) -> Value {
        self.chain_terminus(obj).map_or(Value::None, |value| self.clone_value(value))
    }

    /// Whether `a` and `b` are the same object once every proxy is removed.
    #[must_use]
    pub fn same_proxied_objects(&self, a: &Value, b: &Value) -> bool {
        match (self.chain_terminus(a), self.chain_terminus(b)) {
            (Some(x), Some(y)) => x.is(y),
            (None, None) => true,
            _ => false,
        }
    }

    /// The immediate target of a proxy, or `obj` itself when it is not one.
    #[must_use]
    pub fn get_proxied_object(&self, obj: &Value) -> Value {
        match self.proxy_record(obj) {
            Some(record) => record.target().map_or(Value::None, |target| self.clone_value(target)),
            None => self.clone_value(obj),
        }
    }

    /// Replaces the target of `proxy`, returning the old one. Any proxy class is
    /// accepted; anything else is a `TypeError`.
    pub fn set_proxied_object(&mut self, proxy: &Value, target: &Value) -> RunResult<Value> {
        self.proxy_set_target(proxy, target)
    }

    /// `obj` followed by every value reached by unwrapping it.
    ///
    /// A proxy without a target contributes a final `None`.
    #[must_use]
    pub fn proxy_chain(&self, obj: &Value) -> Vec<Value> {
        let mut chain = vec![self.clone_value(obj)];
        let mut current = obj;
        while let Some(record) = self.proxy_record(current) {
            match record.target() {
                Some(target) => {
                    chain.push(self.clone_value(target));
                    current = target;
                }
                None => {
                    chain.push(Value::None);
                    break;
                }
            }
        }
        chain
    }
}
