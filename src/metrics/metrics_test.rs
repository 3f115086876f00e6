use std::sync::Arc;

use prometheus::Registry;

use super::*;

fn counters() -> OperationCounters {
    OperationCounters::new("test_operations", "test operations")
}

#[test]
fn counts_start_at_zero_for_every_operation() {
    let counts = counters().counts();

    assert_eq!(counts.len(), ALL_OPS.len());
    assert!(counts.values().all(|v| *v == 0));
}

#[test]
fn add_and_zero_all() {
    let c = counters();
    c.inc(OP_LIST_TABLETS);
    c.add(OP_GET_TABLET, 3);
    c.add(OP_ADD_TABLET, 0);

    let counts = c.counts();
    assert_eq!(counts[OP_LIST_TABLETS], 1);
    assert_eq!(counts[OP_GET_TABLET], 3);
    assert_eq!(counts[OP_ADD_TABLET], 0);

    c.zero_all();
    assert!(c.counts().values().all(|v| *v == 0));
    c.inc(OP_REMOVE_TABLET);
    assert_eq!(c.get(OP_REMOVE_TABLET), 1);
}

#[test]
fn clones_share_counts() {
    let c = counters();
    let other = c.clone();
    other.inc(OP_REPLACE_TABLET);

    assert_eq!(c.get(OP_REPLACE_TABLET), 1);
}

#[test]
fn concurrent_increments_are_not_lost() {
    let c = Arc::new(counters());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let c = c.clone();
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    c.inc(OP_GET_TABLET);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(c.get(OP_GET_TABLET), 8000);
}

#[test]
fn registered_counters_are_encoded() {
    let registry = Registry::new();
    let c = counters();
    c.register(&registry).unwrap();
    c.add(OP_LIST_TABLETS, 2);

    let body = encode_metrics(&registry);
    assert!(body.contains("test_operations{operation=\"ListTablets\"} 2"));
}
