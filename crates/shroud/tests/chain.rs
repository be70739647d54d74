//! Walking and rewriting chains of nested proxies.

use pretty_assertions::assert_eq;
use shroud::{ExcType, Runtime, Value};

fn list_of(rt: &mut Runtime, items: &[i64]) -> Value {
    rt.alloc_list(items.iter().map(|&i| Value::Int(i)).collect()).unwrap()
}

/// `outer(inner(target))` with two distinct wrapper subtypes.
struct Layers {
    target: Value,
    inner: Value,
    outer: Value,
    inner_kind: shroud::HeapId,
    outer_kind: shroud::HeapId,
}

fn layered(rt: &mut Runtime) -> Layers {
    let base = rt.proxy_class();
    let inner_kind = rt.define_class("Inner", "tests", &[base], []).unwrap();
    let outer_kind = rt.define_class("Outer", "tests", &[base], []).unwrap();
    let target = list_of(rt, &[1, 2]);
    let inner = rt.wrap_in(inner_kind, &target).unwrap();
    let outer = rt.wrap_in(outer_kind, &inner).unwrap();
    Layers {
        target,
        inner,
        outer,
        inner_kind,
        outer_kind,
    }
}

fn release_layers(rt: &mut Runtime, layers: Layers) {
    for value in [layers.outer, layers.inner, layers.target] {
        rt.release(value);
    }
}

// =============================================================================
// Queries
// =============================================================================

#[test]
fn is_proxy_looks_through_every_layer() {
    let mut rt = Runtime::new();
    let layers = layered(&mut rt);

    assert!(rt.is_proxy(&layers.outer, None));
    assert!(rt.is_proxy(&layers.outer, Some(layers.inner_kind)));
    assert!(!rt.is_proxy(&layers.inner, Some(layers.outer_kind)));
    assert!(!rt.is_proxy(&layers.target, None));
    assert!(!rt.is_proxy(&Value::Int(3), None));

    release_layers(&mut rt, layers);
}

#[test]
fn query_proxy_finds_the_outermost_match() {
    let mut rt = Runtime::new();
    let layers = layered(&mut rt);

    let found = rt.query_proxy(&layers.outer, None, None);
    assert!(found.is(&layers.outer));
    rt.release(found);

    let found = rt.query_proxy(&layers.outer, Some(layers.inner_kind), None);
    assert!(found.is(&layers.inner));
    rt.release(found);

    let missing = rt.query_proxy(&layers.target, None, None);
    assert!(missing.is_none());

    let fallback = rt.query_proxy(&layers.target, None, Some(&Value::Int(7)));
    assert!(fallback.is(&Value::Int(7)));

    release_layers(&mut rt, layers);
}

#[test]
fn query_inner_proxy_finds_the_innermost_match() {
    let mut rt = Runtime::new();
    let layers = layered(&mut rt);

    let found = rt.query_inner_proxy(&layers.outer, None, None);
    assert!(found.is(&layers.inner));
    rt.release(found);

    let found = rt.query_inner_proxy(&layers.outer, Some(layers.outer_kind), None);
    assert!(found.is(&layers.outer));
    rt.release(found);

    let marker = rt.alloc_str("none").unwrap();
    let fallback = rt.query_inner_proxy(&layers.target, None, Some(&marker));
    assert!(fallback.is(&marker));
    assert_eq!(rt.refcount(&marker), Some(2));
    rt.release(fallback);
    rt.release(marker);

    release_layers(&mut rt, layers);
}

/// With three layers of one kind the innermost is the one wrapping the bare target.
#[test]
fn query_inner_proxy_over_three_layers() {
    let mut rt = Runtime::new();
    let items = list_of(&mut rt, &[]);
    let first = rt.create_proxy(&items).unwrap();
    let second = rt.create_proxy(&first).unwrap();
    let third = rt.create_proxy(&second).unwrap();

    let found = rt.query_inner_proxy(&third, None, None);
    assert!(found.is(&first));
    let found_outer = rt.query_proxy(&third, None, None);
    assert!(found_outer.is(&third));

    for value in [found, found_outer, third, second, first, items] {
        rt.release(value);
    }
}

// =============================================================================
// Unwrapping
// =============================================================================

#[test]
fn remove_all_proxies_returns_the_innermost_object() {
    let mut rt = Runtime::new();
    let layers = layered(&mut rt);

    let bare = rt.remove_all_proxies(&layers.outer);
    assert!(bare.is(&layers.target));
    rt.release(bare);

    let same = rt.remove_all_proxies(&Value::Int(4));
    assert!(same.is(&Value::Int(4)));

    release_layers(&mut rt, layers);
}

#[test]
fn get_proxied_object_peels_one_layer() {
    let mut rt = Runtime::new();
    let layers = layered(&mut rt);

    let next = rt.get_proxied_object(&layers.outer);
    assert!(next.is(&layers.inner));
    rt.release(next);

    let itself = rt.get_proxied_object(&layers.target);
    assert!(itself.is(&layers.target));
    rt.release(itself);

    release_layers(&mut rt, layers);
}

#[test]
fn same_proxied_objects_compares_identity_after_unwrapping() {
    let mut rt = Runtime::new();
    let layers = layered(&mut rt);
    let other_proxy = rt.create_proxy(&layers.target).unwrap();
    let twin = list_of(&mut rt, &[1, 2]);

    assert!(rt.same_proxied_objects(&layers.outer, &other_proxy));
    assert!(rt.same_proxied_objects(&layers.outer, &layers.target));
    // equal but not identical
    assert!(!rt.same_proxied_objects(&layers.outer, &twin));
    assert!(rt.same_proxied_objects(&Value::Int(1), &Value::Int(1)));

    rt.release(other_proxy);
    rt.release(twin);
    release_layers(&mut rt, layers);
}

/// A proxy without a target ends the chain with `None`.
#[test]
fn chain_ending_in_an_unbound_proxy() {
    let mut rt = Runtime::new();
    let empty = rt.alloc_proxy(rt.proxy_class()).unwrap();
    let outer = rt.create_proxy(&empty).unwrap();

    assert!(rt.remove_all_proxies(&outer).is_none());
    assert!(rt.get_proxied_object(&empty).is_none());
    let chain = rt.proxy_chain(&outer);
    assert_eq!(chain.len(), 3);
    assert!(chain[0].is(&outer));
    assert!(chain[1].is(&empty));
    assert!(chain[2].is_none());

    let other_empty = rt.alloc_proxy(rt.proxy_class()).unwrap();
    assert!(rt.same_proxied_objects(&outer, &other_empty));

    for value in chain.into_iter().chain([other_empty, outer, empty]) {
        rt.release(value);
    }
}

#[test]
fn proxy_chain_lists_every_layer() {
    let mut rt = Runtime::new();
    let layers = layered(&mut rt);

    let chain = rt.proxy_chain(&layers.outer);
    assert_eq!(chain.len(), 3);
    assert!(chain[0].is(&layers.outer));
    assert!(chain[1].is(&layers.inner));
    assert!(chain[2].is(&layers.target));
    for value in chain {
        rt.release(value);
    }

    let single = rt.proxy_chain(&layers.target);
    assert_eq!(single.len(), 1);
    for value in single {
        rt.release(value);
    }

    release_layers(&mut rt, layers);
}

// =============================================================================
// Rewriting
// =============================================================================

#[test]
fn set_proxied_object_swaps_the_target() {
    let mut rt = Runtime::new();
    let layers = layered(&mut rt);
    let replacement = list_of(&mut rt, &[9]);

    let old = rt.set_proxied_object(&layers.inner, &replacement).unwrap();
    assert!(old.is(&layers.target));
    rt.release(old);

    let bare = rt.remove_all_proxies(&layers.outer);
    assert!(bare.is(&replacement));
    assert_eq!(rt.repr(&layers.outer).unwrap(), "[9]");
    rt.release(bare);

    rt.release(replacement);
    release_layers(&mut rt, layers);
}

#[test]
fn set_proxied_object_rejects_non_proxies() {
    let mut rt = Runtime::new();
    let items = list_of(&mut rt, &[]);
    let err = rt.set_proxied_object(&items, &Value::Int(1)).unwrap_err();
    assert_eq!(err.exc_type(), Some(ExcType::TypeError));
    assert_eq!(err.message().as_deref(), Some("expected proxy object, got list"));
    rt.release(items);
}
