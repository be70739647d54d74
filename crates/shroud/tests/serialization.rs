//! Proxies refuse serialization wherever they appear in a value graph.

use pretty_assertions::assert_eq;
use shroud::{ArgValues, ClassAttr, ExcType, Object, Runtime, Value};

#[test]
fn dumping_a_proxy_fails() {
    let mut rt = Runtime::new();
    let proxy = rt.create_proxy(&Value::Int(1)).unwrap();

    let err = rt.dumps(&proxy).unwrap_err();
    assert_eq!(err.exc_type(), Some(ExcType::PicklingError));
    assert!(err.matches(ExcType::PickleError));
    assert_eq!(err.message().as_deref(), Some("proxy instances cannot be pickled"));

    rt.release(proxy);
}

#[test]
fn proxy_nested_in_a_container_fails() {
    let mut rt = Runtime::new();
    let word = rt.alloc_str("inner").unwrap();
    let proxy = rt.create_proxy(&word).unwrap();
    let pair = rt.alloc_tuple(vec![Value::Int(1), rt.clone_value(&proxy)]).unwrap();
    let outer = rt.alloc_list(vec![rt.clone_value(&pair)]).unwrap();

    let err = rt.dumps(&outer).unwrap_err();
    assert_eq!(err.exc_type(), Some(ExcType::PicklingError));

    for value in [outer, pair, proxy, word] {
        rt.release(value);
    }
}

/// A `__reduce__` declared on a wrapper subtype is never consulted.
#[test]
fn wrapper_reduce_cannot_make_a_proxy_serializable() {
    let mut rt = Runtime::new();
    let base = rt.proxy_class();
    let reduce = ClassAttr::method("__reduce__", |_, _| Ok(Value::Int(0)));
    let kind = rt
        .define_class("Serializable", "tests", &[base], [("__reduce__".to_owned(), reduce)])
        .unwrap();
    let proxy = rt.wrap_in(kind, &Value::Int(3)).unwrap();

    let err = rt.dumps(&proxy).unwrap_err();
    assert_eq!(err.exc_type(), Some(ExcType::PicklingError));

    rt.release(proxy);
}

/// The base class's `__reduce__`, called explicitly, refuses too.
#[test]
fn base_class_reduce_refuses() {
    let mut rt = Runtime::new();
    let class = rt.class_value(rt.proxy_class());
    let reduce = rt.getattr(&class, "__reduce__").unwrap();
    let proxy = rt.create_proxy(&Value::Int(3)).unwrap();

    let args = ArgValues::new([rt.clone_value(&proxy)]);
    let err = rt.call(&reduce, &args).unwrap_err();
    rt.release_args(args);
    assert_eq!(err.exc_type(), Some(ExcType::PicklingError));

    for value in [proxy, reduce, class] {
        rt.release(value);
    }
}

#[test]
fn plain_values_survive_dumps_and_loads() {
    let mut rt = Runtime::new();
    let original = Object::List(vec![
        Object::Int(1),
        Object::from("two"),
        Object::Tuple(vec![Object::Float(3.5), Object::None]),
        Object::Dict(vec![(Object::from("k"), Object::Bool(true))]),
    ]);
    let value = rt.alloc(&original).unwrap();

    let bytes = rt.dumps(&value).unwrap();
    let restored = rt.loads(&bytes).unwrap();
    assert!(!restored.is(&value));
    assert_eq!(rt.to_object(&restored).unwrap(), original);

    rt.release(restored);
    rt.release(value);
}

/// Unwrapping first is the way to serialize what a proxy stands for.
#[test]
fn unwrapped_target_serializes() {
    let mut rt = Runtime::new();
    let items = rt.alloc_list(vec![Value::Int(1)]).unwrap();
    let proxy = rt.create_proxy(&items).unwrap();

    let bare = rt.remove_all_proxies(&proxy);
    let bytes = rt.dumps(&bare).unwrap();
    let restored = rt.loads(&bytes).unwrap();
    assert_eq!(rt.repr(&restored).unwrap(), "[1]");

    for value in [restored, bare, proxy, items] {
        rt.release(value);
    }
}

#[test]
fn instances_serialize_through_their_reduce() {
    let mut rt = Runtime::new();
    let reduce = ClassAttr::method("__reduce__", |rt, _| rt.alloc_str("point state"));
    let reducible = rt
        .define_class("Reducible", "tests", &[], [("__reduce__".to_owned(), reduce)])
        .unwrap();
    let opaque = rt.define_class("Opaque", "tests", &[], []).unwrap();

    let instance = rt.call_class(reducible, &ArgValues::default()).unwrap();
    let bytes = rt.dumps(&instance).unwrap();
    let restored = rt.loads(&bytes).unwrap();
    assert_eq!(rt.as_str(&restored), Some("point state"));

    let other = rt.call_class(opaque, &ArgValues::default()).unwrap();
    let err = rt.dumps(&other).unwrap_err();
    assert_eq!(err.exc_type(), Some(ExcType::TypeError));
    assert_eq!(err.message().as_deref(), Some("cannot pickle 'Opaque' object"));

    for value in [restored, instance, other] {
        rt.release(value);
    }
}

#[test]
fn loads_rejects_foreign_bytes() {
    let mut rt = Runtime::new();
    let err = rt.loads(b"not a payload").unwrap_err();
    assert_eq!(err.exc_type(), Some(ExcType::UnpicklingError));
}
