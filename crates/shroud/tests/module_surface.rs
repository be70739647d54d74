//! The proxy module as host values and the native capability table.

use pretty_assertions::assert_eq;
use shroud::{ArgValues, ExcType, PROXY_API_VERSION, Runtime, RunResult, Value};

/// Looks up `name` in the module dict.
fn lookup(rt: &mut Runtime, module: &Value, name: &str) -> Value {
    let key = rt.alloc_str(name).unwrap();
    let found = rt.getitem(module, &key).unwrap();
    rt.release(key);
    found
}

/// Calls module function `name` with clones of `args`.
fn call(rt: &mut Runtime, module: &Value, name: &str, args: &[&Value]) -> RunResult<Value> {
    let function = lookup(rt, module, name);
    let args = ArgValues::new(args.iter().map(|arg| rt.clone_value(arg)).collect::<Vec<_>>());
    let result = rt.call(&function, &args);
    rt.release_args(args);
    rt.release(function);
    result
}

// =============================================================================
// Module dict
// =============================================================================

#[test]
fn module_exposes_every_public_name() {
    let mut rt = Runtime::new();
    let module = rt.proxy_module().unwrap();
    assert_eq!(rt.len(&module).unwrap(), 9);

    let base = lookup(&mut rt, &module, "ProxyBase");
    assert_eq!(rt.as_class(&base), Some(rt.proxy_class()));
    assert_eq!(rt.repr(&base).unwrap(), "<class 'shroud.proxy.ProxyBase'>");

    let function = lookup(&mut rt, &module, "getProxiedObject");
    assert_eq!(rt.repr(&function).unwrap(), "<built-in function getProxiedObject>");

    for value in [function, base, module] {
        rt.release(value);
    }
}

#[test]
fn calling_the_base_class_builds_a_proxy() {
    let mut rt = Runtime::new();
    let module = rt.proxy_module().unwrap();
    let base = lookup(&mut rt, &module, "ProxyBase");

    let args = ArgValues::new([Value::Int(5)]);
    let proxy = rt.call(&base, &args).unwrap();
    rt.release_args(args);
    assert!(rt.is_proxy_instance(&proxy));
    assert_eq!(rt.to_int(&proxy).unwrap(), 5);

    for value in [proxy, base, module] {
        rt.release(value);
    }
}

#[test]
fn module_functions_mirror_the_runtime_methods() {
    let mut rt = Runtime::new();
    let module = rt.proxy_module().unwrap();
    let items = rt.alloc_list(Vec::new()).unwrap();
    let proxy = rt.create_proxy(&items).unwrap();
    let outer = rt.create_proxy(&proxy).unwrap();

    let result = call(&mut rt, &module, "isProxy", &[&outer]).unwrap();
    assert!(matches!(result, Value::Bool(true)));
    let result = call(&mut rt, &module, "isProxy", &[&items]).unwrap();
    assert!(matches!(result, Value::Bool(false)));

    let base = rt.class_value(rt.proxy_class());
    let result = call(&mut rt, &module, "isProxy", &[&outer, &base]).unwrap();
    assert!(matches!(result, Value::Bool(true)));

    let result = call(&mut rt, &module, "getProxiedObject", &[&outer]).unwrap();
    assert!(result.is(&proxy));
    rt.release(result);

    let result = call(&mut rt, &module, "removeAllProxies", &[&outer]).unwrap();
    assert!(result.is(&items));
    rt.release(result);

    let result = call(&mut rt, &module, "queryProxy", &[&outer]).unwrap();
    assert!(result.is(&outer));
    rt.release(result);

    let result = call(&mut rt, &module, "queryInnerProxy", &[&outer, &base]).unwrap();
    assert!(result.is(&proxy));
    rt.release(result);

    let result = call(&mut rt, &module, "queryProxy", &[&items, &base, &Value::Int(0)]).unwrap();
    assert!(result.is(&Value::Int(0)));

    let result = call(&mut rt, &module, "sameProxiedObjects", &[&outer, &items]).unwrap();
    assert!(matches!(result, Value::Bool(true)));

    for value in [base, outer, proxy, items, module] {
        rt.release(value);
    }
}

#[test]
fn set_proxied_object_through_the_module() {
    let mut rt = Runtime::new();
    let module = rt.proxy_module().unwrap();
    let proxy = rt.create_proxy(&Value::Int(1)).unwrap();

    let old = call(&mut rt, &module, "setProxiedObject", &[&proxy, &Value::Int(2)]).unwrap();
    assert!(old.is(&Value::Int(1)));
    assert_eq!(rt.to_int(&proxy).unwrap(), 2);

    let err = call(&mut rt, &module, "setProxiedObject", &[&Value::Int(3), &Value::Int(4)]).unwrap_err();
    assert_eq!(err.message().as_deref(), Some("expected proxy object, got int"));

    rt.release(proxy);
    rt.release(module);
}

#[test]
fn argument_errors() {
    let mut rt = Runtime::new();
    let module = rt.proxy_module().unwrap();
    let proxy = rt.create_proxy(&Value::Int(1)).unwrap();

    let err = call(&mut rt, &module, "isProxy", &[&proxy, &Value::Int(2)]).unwrap_err();
    assert_eq!(err.exc_type(), Some(ExcType::TypeError));
    assert_eq!(err.message().as_deref(), Some("isProxy() argument 2 must be type, not int"));

    let err = call(&mut rt, &module, "getProxiedObject", &[]).unwrap_err();
    assert_eq!(
        err.message().as_deref(),
        Some("getProxiedObject() takes exactly 1 argument (0 given)")
    );

    let err = call(&mut rt, &module, "sameProxiedObjects", &[&proxy]).unwrap_err();
    assert_eq!(
        err.message().as_deref(),
        Some("sameProxiedObjects() takes exactly 2 arguments (1 given)")
    );

    let function = lookup(&mut rt, &module, "removeAllProxies");
    let args = ArgValues::new([rt.clone_value(&proxy)]).with_kwarg("obj", Value::None);
    let err = rt.call(&function, &args).unwrap_err();
    rt.release_args(args);
    assert_eq!(err.message().as_deref(), Some("removeAllProxies() takes no keyword arguments"));

    for value in [function, proxy, module] {
        rt.release(value);
    }
}

#[test]
fn proxy_iterator_walks_the_chain() {
    let mut rt = Runtime::new();
    let module = rt.proxy_module().unwrap();
    let items = rt.alloc_list(Vec::new()).unwrap();
    let proxy = rt.create_proxy(&items).unwrap();
    let outer = rt.create_proxy(&proxy).unwrap();

    let iter = call(&mut rt, &module, "ProxyIterator", &[&outer]).unwrap();
    let walked = rt.collect_iter(&iter).unwrap();
    assert_eq!(walked.len(), 3);
    assert!(walked[0].is(&outer));
    assert!(walked[1].is(&proxy));
    assert!(walked[2].is(&items));

    let single = call(&mut rt, &module, "ProxyIterator", &[&Value::Int(8)]).unwrap();
    let walked_single = rt.collect_iter(&single).unwrap();
    assert_eq!(walked_single.len(), 1);
    assert!(walked_single[0].is(&Value::Int(8)));

    for value in walked.into_iter().chain([iter, single, outer, proxy, items, module]) {
        rt.release(value);
    }
}

// =============================================================================
// Capability table
// =============================================================================

#[test]
fn api_table_entry_points() {
    let mut rt = Runtime::new();
    let api = rt.proxy_api();
    assert_eq!(api.version, PROXY_API_VERSION);
    assert_eq!(api.proxy_class, rt.proxy_class());

    let word = rt.alloc_str("w").unwrap();
    let proxy = (api.create)(&mut rt, Some(&word)).unwrap();
    assert!((api.check)(&rt, Some(&proxy)));
    assert!(!(api.check)(&rt, Some(&word)));
    assert!(!(api.check)(&rt, None));

    let target = (api.get_object)(&rt, Some(&proxy)).unwrap();
    assert!(target.is(&word));
    rt.release(target);

    let err = (api.create)(&mut rt, None).unwrap_err();
    assert_eq!(err.exc_type(), Some(ExcType::ValueError));

    let err = (api.get_object)(&rt, None).unwrap_err();
    assert_eq!(err.exc_type(), Some(ExcType::RuntimeError));
    assert_eq!(err.message().as_deref(), Some("cannot pass NULL to ProxyApi.get_object()"));

    let err = (api.get_object)(&rt, Some(&word)).unwrap_err();
    assert_eq!(err.exc_type(), Some(ExcType::TypeError));

    rt.release(proxy);
    rt.release(word);
}

#[test]
fn api_version_requirements() {
    let rt = Runtime::new();
    let api = rt.proxy_api();
    api.require(1).unwrap();
    api.require(PROXY_API_VERSION).unwrap();

    let err = api.require(PROXY_API_VERSION + 1).unwrap_err();
    assert_eq!(err.exc_type(), Some(ExcType::RuntimeError));
    assert_eq!(
        err.message(),
        Some(format!(
            "proxy API version {} required, runtime provides {PROXY_API_VERSION}",
            PROXY_API_VERSION + 1
        ))
    );
}
