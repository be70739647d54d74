//! Reference cycles through proxies and their collection.

use pretty_assertions::assert_eq;
use shroud::{ArgValues, HeapId, RecordingTracer, ResourceLimits, Runtime, TraceEvent, Value};

/// Builds `items = [proxy]` where `proxy` wraps `items`, drops both handles and returns
/// the proxy's id.
fn orphaned_cycle(rt: &mut Runtime) -> HeapId {
    let items = rt.alloc_list(Vec::new()).unwrap();
    let proxy = rt.create_proxy(&items).unwrap();
    let append = rt.getattr(&items, "append").unwrap();
    let args = ArgValues::new([rt.clone_value(&proxy)]);
    rt.call(&append, &args).unwrap();
    rt.release_args(args);
    rt.release(append);

    let id = proxy.ref_id().unwrap();
    rt.release(proxy);
    rt.release(items);
    id
}

#[test]
fn proxy_list_cycle_is_collected() {
    let (tracer, log) = RecordingTracer::new();
    let mut rt = Runtime::with_tracer(ResourceLimits::new().gc_interval(None), Box::new(tracer));
    let before = rt.heap_stats();

    let proxy = orphaned_cycle(&mut rt);
    // refcounting alone cannot free the pair
    assert_eq!(rt.heap_stats().count_of("Proxy"), before.count_of("Proxy") + 1);
    assert_eq!(rt.heap_stats().count_of("List"), before.count_of("List") + 1);

    let freed = rt.collect_cycles();
    assert_eq!(freed, 2);
    assert_eq!(rt.heap_stats().live_objects, before.live_objects);
    assert_eq!(
        log.take(),
        vec![
            TraceEvent::ProxyCreated { proxy },
            TraceEvent::ProxyCleared { proxy },
            TraceEvent::Collected { freed: 2 },
        ]
    );
}

/// A proxy pointing at itself through its own target.
#[test]
fn self_referencing_proxy_is_collected() {
    let mut rt = Runtime::with_limits(ResourceLimits::new().gc_interval(None));
    let before = rt.heap_stats().live_objects;

    let proxy = rt.create_proxy(&Value::None).unwrap();
    let old = rt.proxy_set_target(&proxy, &proxy).unwrap();
    assert!(old.is_none());
    assert_eq!(rt.refcount(&proxy), Some(2));
    rt.release(proxy);

    assert_eq!(rt.heap_stats().live_objects, before + 1);
    assert_eq!(rt.collect_cycles(), 1);
    assert_eq!(rt.heap_stats().live_objects, before);
}

#[test]
fn reachable_proxies_survive_collection() {
    let mut rt = Runtime::with_limits(ResourceLimits::new().gc_interval(None));
    let items = rt.alloc_list(Vec::new()).unwrap();
    let proxy = rt.create_proxy(&items).unwrap();

    assert_eq!(rt.collect_cycles(), 0);
    assert!(rt.is_alive(&proxy));
    assert_eq!(rt.len(&proxy).unwrap(), 0);

    rt.release(proxy);
    rt.release(items);
}

/// Automatic collection runs on the configured allocation cadence.
#[test]
fn gc_interval_triggers_collection() {
    let (tracer, log) = RecordingTracer::new();
    let mut rt = Runtime::with_tracer(ResourceLimits::new().gc_interval(Some(5)), Box::new(tracer));
    let before = rt.heap_stats().count_of("Proxy");

    let proxy = orphaned_cycle(&mut rt);
    for _ in 0..10 {
        let scratch = rt.alloc_list(Vec::new()).unwrap();
        rt.release(scratch);
    }

    assert_eq!(rt.heap_stats().count_of("Proxy"), before);
    assert!(log.events().contains(&TraceEvent::ProxyCleared { proxy }));
}

/// Freeing is iterative, so very long chains release without recursion.
#[test]
fn long_chain_is_freed_by_refcounting() {
    let mut rt = Runtime::with_limits(ResourceLimits::new().gc_interval(None));
    let before = rt.heap_stats().live_objects;

    let items = rt.alloc_list(vec![Value::Int(1)]).unwrap();
    let mut outer = rt.clone_value(&items);
    for _ in 0..50_000 {
        let next = rt.create_proxy(&outer).unwrap();
        rt.release(outer);
        outer = next;
    }
    assert_eq!(rt.heap_stats().count_of("Proxy"), 50_000);
    rt.release(items);
    rt.release(outer);

    assert_eq!(rt.heap_stats().live_objects, before);
}

#[test]
fn traverse_reports_the_cycle_edge() {
    let mut rt = Runtime::new();
    let proxy = rt.create_proxy(&Value::None).unwrap();
    rt.proxy_set_target(&proxy, &proxy).unwrap();

    let mut visited = Vec::new();
    rt.proxy_traverse(&proxy, |target| visited.push(target.ref_id())).unwrap();
    assert_eq!(visited, vec![proxy.ref_id()]);

    rt.proxy_clear(&proxy).unwrap();
    assert_eq!(rt.refcount(&proxy), Some(1));
    rt.release(proxy);
}
