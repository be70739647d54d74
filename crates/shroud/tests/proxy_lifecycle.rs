//! Construction, target management and teardown of proxies.

use pretty_assertions::assert_eq;
use shroud::{ArgValues, ClassAttr, ExcType, Object, RecordingTracer, ResourceLimits, Runtime, TraceEvent, Value};

fn list_of(rt: &mut Runtime, items: &[i64]) -> Value {
    rt.alloc_list(items.iter().map(|&i| Value::Int(i)).collect()).unwrap()
}

#[test]
fn proxy_holds_one_reference_to_its_target() {
    let mut rt = Runtime::new();
    let items = list_of(&mut rt, &[1, 2]);
    assert_eq!(rt.refcount(&items), Some(1));

    let proxy = rt.create_proxy(&items).unwrap();
    assert_eq!(rt.refcount(&items), Some(2));
    assert!(rt.is_proxy_instance(&proxy));
    assert!(!rt.is_proxy_instance(&items));

    rt.release(proxy);
    assert_eq!(rt.refcount(&items), Some(1));
    rt.release(items);
}

#[test]
fn target_is_returned_unchanged() {
    let mut rt = Runtime::new();
    let items = list_of(&mut rt, &[1]);
    let proxy = rt.create_proxy(&items).unwrap();

    let target = rt.proxy_target(&proxy).unwrap();
    assert!(target.is(&items));

    for value in [target, proxy, items] {
        rt.release(value);
    }
}

#[test]
fn proxy_target_rejects_non_proxies() {
    let rt = Runtime::new();
    let err = rt.proxy_target(&Value::Int(3)).unwrap_err();
    assert_eq!(err.exc_type(), Some(ExcType::TypeError));
    assert_eq!(err.message().as_deref(), Some("expected proxy object, got int"));
}

#[test]
fn set_target_returns_the_previous_one() {
    let mut rt = Runtime::new();
    let first = list_of(&mut rt, &[1]);
    let second = list_of(&mut rt, &[2]);
    let proxy = rt.create_proxy(&first).unwrap();

    let old = rt.proxy_set_target(&proxy, &second).unwrap();
    assert!(old.is(&first));
    assert_eq!(rt.to_object(&proxy).unwrap(), Object::Repr("[2]".to_owned()));
    assert_eq!(rt.refcount(&second), Some(2));
    // the caller now owns the old reference
    assert_eq!(rt.refcount(&first), Some(2));

    for value in [old, proxy, first, second] {
        rt.release(value);
    }
}

#[test]
fn reinitialising_with_the_same_target_is_a_no_op() {
    let (tracer, log) = RecordingTracer::new();
    let mut rt = Runtime::with_tracer(ResourceLimits::default(), Box::new(tracer));
    let items = list_of(&mut rt, &[1]);
    let proxy = rt.create_proxy(&items).unwrap();
    log.take();

    rt.reinitialize_proxy(&proxy, Some(&items)).unwrap();
    assert_eq!(rt.refcount(&items), Some(2));
    assert_eq!(log.take(), vec![]);

    let other = list_of(&mut rt, &[9]);
    rt.reinitialize_proxy(&proxy, Some(&other)).unwrap();
    assert_eq!(rt.refcount(&items), Some(1));
    assert_eq!(rt.repr(&proxy).unwrap(), "[9]");
    assert_eq!(
        log.take(),
        vec![TraceEvent::TargetReplaced {
            proxy: proxy.ref_id().unwrap()
        }]
    );

    for value in [proxy, items, other] {
        rt.release(value);
    }
}

#[test]
fn reinitialising_without_a_target_fails() {
    let mut rt = Runtime::new();
    let proxy = rt.create_proxy(&Value::Int(1)).unwrap();
    let err = rt.reinitialize_proxy(&proxy, None).unwrap_err();
    assert_eq!(err.exc_type(), Some(ExcType::ValueError));
    assert_eq!(err.message().as_deref(), Some("cannot create proxy around NULL"));
    rt.release(proxy);
}

#[test]
fn two_phase_construction() {
    let mut rt = Runtime::new();
    let proxy = rt.alloc_proxy(rt.proxy_class()).unwrap();

    // nothing to forward to yet
    let err = rt.len(&proxy).unwrap_err();
    assert_eq!(err.exc_type(), Some(ExcType::RuntimeError));
    assert_eq!(err.message().as_deref(), Some("proxied object is NULL"));
    let err = rt.getattr(&proxy, "append").unwrap_err();
    assert_eq!(
        err.message().as_deref(),
        Some("object is NULL; requested to get attribute 'append'")
    );

    let items = list_of(&mut rt, &[4, 5, 6]);
    let args = ArgValues::new([rt.clone_value(&items)]);
    rt.init_proxy(&proxy, &args).unwrap();
    rt.release_args(args);
    assert_eq!(rt.len(&proxy).unwrap(), 3);

    rt.release(proxy);
    rt.release(items);
}

#[test]
fn alloc_proxy_needs_a_proxy_class() {
    let mut rt = Runtime::new();
    let plain = rt.define_class("Plain", "tests", &[], []).unwrap();
    let err = rt.alloc_proxy(plain).unwrap_err();
    assert_eq!(err.exc_type(), Some(ExcType::TypeError));
}

#[test]
fn construction_takes_exactly_one_positional_target() {
    let mut rt = Runtime::new();
    let kind = rt.proxy_class();

    let err = rt.call_class(kind, &ArgValues::default()).unwrap_err();
    assert_eq!(err.exc_type(), Some(ExcType::TypeError));
    assert_eq!(err.message().as_deref(), Some("__new__ expected 1 argument, got 0"));

    let two = ArgValues::new([Value::Int(1), Value::Int(2)]);
    let err = rt.call_class(kind, &two).unwrap_err();
    assert_eq!(err.message().as_deref(), Some("__new__ expected 1 argument, got 2"));

    let keywords = ArgValues::new([Value::Int(1)]).with_kwarg("extra", Value::Int(2));
    let err = rt.call_class(kind, &keywords).unwrap_err();
    assert_eq!(err.message().as_deref(), Some("proxy.__new__ does not accept keyword args"));

    let proxy = rt.call_class(kind, &ArgValues::new([Value::Int(1)])).unwrap();
    assert!(rt.is_proxy_instance(&proxy));
    rt.release(proxy);
}

#[test]
fn init_rejects_keywords() {
    let mut rt = Runtime::new();
    let proxy = rt.create_proxy(&Value::Int(1)).unwrap();
    let args = ArgValues::new([Value::Int(2)]).with_kwarg("x", Value::None);
    let err = rt.init_proxy(&proxy, &args).unwrap_err();
    assert_eq!(err.message().as_deref(), Some("proxy.__init__ does not accept keyword args"));
    rt.release(proxy);
}

#[test]
fn subtype_initialiser_runs_instead_of_the_base_one() {
    let mut rt = Runtime::new();
    let base = rt.proxy_class();
    // swaps whatever was passed for its double
    let init = ClassAttr::method("__init__", |rt, args| {
        let [proxy, target] = args.args() else {
            panic!("expected proxy and target");
        };
        let doubled = rt.to_int(target)? * 2;
        rt.reinitialize_proxy(proxy, Some(&Value::Int(doubled)))?;
        Ok(Value::None)
    });
    let doubling = rt
        .define_class("Doubling", "tests", &[base], [("__init__".to_owned(), init)])
        .unwrap();

    let proxy = rt.wrap_in(doubling, &Value::Int(21)).unwrap();
    assert_eq!(rt.to_int(&proxy).unwrap(), 42);
    assert!(rt.is_proxy(&proxy, Some(doubling)));
    rt.release(proxy);
}

#[test]
fn clear_is_idempotent() {
    let (tracer, log) = RecordingTracer::new();
    let mut rt = Runtime::with_tracer(ResourceLimits::default(), Box::new(tracer));
    let items = list_of(&mut rt, &[1]);
    let proxy = rt.create_proxy(&items).unwrap();
    let id = proxy.ref_id().unwrap();

    rt.proxy_clear(&proxy).unwrap();
    rt.proxy_clear(&proxy).unwrap();
    assert_eq!(rt.refcount(&items), Some(1));
    assert_eq!(
        log.take(),
        vec![TraceEvent::ProxyCreated { proxy: id }, TraceEvent::ProxyCleared { proxy: id }]
    );

    let mut visited = 0;
    rt.proxy_traverse(&proxy, |_| visited += 1).unwrap();
    assert_eq!(visited, 0);

    rt.release(proxy);
    rt.release(items);
}

#[test]
fn traverse_visits_the_target_once() {
    let mut rt = Runtime::new();
    let items = list_of(&mut rt, &[1]);
    let proxy = rt.create_proxy(&items).unwrap();

    let mut seen = Vec::new();
    rt.proxy_traverse(&proxy, |target| seen.push(target.ref_id())).unwrap();
    assert_eq!(seen, vec![items.ref_id()]);

    rt.release(proxy);
    rt.release(items);
}

#[test]
fn releasing_a_proxy_frees_it() {
    let mut rt = Runtime::new();
    let before = rt.heap_stats().count_of("Proxy");
    let proxy = rt.create_proxy(&Value::Int(1)).unwrap();
    assert_eq!(rt.heap_stats().count_of("Proxy"), before + 1);
    rt.release(proxy);
    assert_eq!(rt.heap_stats().count_of("Proxy"), before);
}
