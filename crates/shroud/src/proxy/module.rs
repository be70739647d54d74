//! The proxy module surface as host values.
//!
//! [`Runtime::proxy_module`] builds a dict mapping the public names to native
//! functions (plus the `ProxyBase` class), so code running against the object model
//! reaches the chain utilities the same way it reaches any other callable.

use crate::{
    args::ArgValues,
    exception::{ExcType, RunResult},
    heap::{DropWithHeap, HeapId},
    runtime::Runtime,
    value::Value,
};

use super::PROXY_CLASS_NAME;

type ModuleFn = fn(&mut Runtime, &ArgValues) -> RunResult<Value>;

const FUNCTIONS: &[(&str, ModuleFn)] = &[
    ("getProxiedObject", get_proxied_object),
    ("setProxiedObject", set_proxied_object),
    ("isProxy", is_proxy),
    ("queryProxy", query_proxy),
    ("queryInnerProxy", query_inner_proxy),
    ("removeAllProxies", remove_all_proxies),
    ("sameProxiedObjects", same_proxied_objects),
    ("ProxyIterator", proxy_iterator),
];

impl Runtime {
    /// A dict of the module's public names: the functions in camelCase plus
    /// `ProxyBase`.
    pub fn proxy_module(&mut self) -> RunResult<Value> {
        let mut entries = Vec::with_capacity(FUNCTIONS.len() + 1);
        let result = self.module_entries(&mut entries);
        match result {
            Ok(()) => self.alloc_dict(entries),
            Err(err) => {
                entries.drop_with_heap(&mut self.heap);
                Err(err)
            }
        }
    }

    fn module_entries(&mut self, entries: &mut Vec<(Value, Value)>) -> RunResult<()> {
        let name = self.alloc_str(PROXY_CLASS_NAME)?;
        entries.push((name, self.class_value(self.proxy_class())));
        for &(name, func) in FUNCTIONS {
            let key = self.alloc_str(name)?;
            let function = match self.alloc_function(name, func) {
                Ok(function) => function,
                Err(err) => {
                    self.release(key);
                    return Err(err);
                }
            };
            entries.push((key, function));
        }
        Ok(())
    }
}

/// The optional proxy class argument at `position`; `ProxyBase` when absent.
fn kind_arg(rt: &Runtime, func: &str, args: &[Value], position: usize) -> RunResult<Option<HeapId>> {
    let Some(value) = args.get(position) else {
        return Ok(None);
    };
    match rt.as_class(value) {
        Some(class_id) => Ok(Some(class_id)),
        None => Err(ExcType::type_error(format!(
            "{func}() argument {} must be type, not {}",
            position + 1,
            rt.type_name(value)
        ))),
    }
}

fn get_proxied_object(rt: &mut Runtime, args: &ArgValues) -> RunResult<Value> {
    let args = args.positional("getProxiedObject", 1, 1)?;
    let obj = &args[0];
    Ok(rt.get_proxied_object(obj))
}

fn set_proxied_object(rt: &mut Runtime, args: &ArgValues) -> RunResult<Value> {
    let args = args.positional("setProxiedObject", 2, 2)?;
    let (proxy, target) = (&args[0], &args[1]);
    rt.set_proxied_object(proxy, target)
}

fn is_proxy(rt: &mut Runtime, args: &ArgValues) -> RunResult<Value> {
    let args = args.positional("isProxy", 1, 2)?;
    let kind = kind_arg(rt, "isProxy", args, 1)?;
    Ok(Value::Bool(rt.is_proxy(&args[0], kind)))
}

fn query_proxy(rt: &mut Runtime, args: &ArgValues) -> RunResult<Value> {
    let args = args.positional("queryProxy", 1, 3)?;
    let kind = kind_arg(rt, "queryProxy", args, 1)?;
    Ok(rt.query_proxy(&args[0], kind, args.get(2)))
}

fn query_inner_proxy(rt: &mut Runtime, args: &ArgValues) -> RunResult<Value> {
    let args = args.positional("queryInnerProxy", 1, 3)?;
    let kind = kind_arg(rt, "queryInnerProxy", args, 1)?;
    Ok(rt.query_inner_proxy(&args[0], kind, args.get(2)))
}

fn remove_all_proxies(rt: &mut Runtime, args: &ArgValues) -> RunResult<Value> {
    let args = args.positional("removeAllProxies", 1, 1)?;
    let obj = &args[0];
    Ok(rt.remove_all_proxies(obj))
}

fn same_proxied_objects(rt: &mut Runtime, args: &ArgValues) -> RunResult<Value> {
    let args = args.positional("sameProxiedObjects", 2, 2)?;
    let (a, b) = (&args[0], &args[1]);
    Ok(Value::Bool(rt.same_proxied_objects(a, b)))
}

/// An iterator over `obj` and every value reached by unwrapping it.
fn proxy_iterator(rt: &mut Runtime, args: &ArgValues) -> RunResult<Value> {
    let args = args.positional("ProxyIterator", 1, 1)?;
    let obj = &args[0];
    let chain = rt.proxy_chain(obj);
    let list = rt.alloc_list(chain)?;
    let iter = rt.get_iter(&list);
    rt.release(list);
    iter
}
