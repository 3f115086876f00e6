use std::collections::BTreeMap;
use std::collections::HashMap;

use super::*;
use crate::MapKey;
use crate::TabletAlias;
use crate::TabletRecord;

fn tablet(
    uid: u32,
    host: &str,
    port: u32,
) -> TabletRecord {
    TabletRecord::new(TabletAlias::new("aa", uid), host, "ks", "0").with_port("vt", port)
}

/// Feeds `rounds` through the diff engine one after another and returns the diff
/// of the last round.
fn run_rounds(rounds: Vec<Vec<TabletRecord>>) -> TopologyDiff {
    let mut tracked = BTreeMap::new();
    let mut by_alias = HashMap::new();
    let mut last = TopologyDiff::default();
    for candidates in rounds {
        last = diff_tablets(&tracked, &by_alias, candidates);
        tracked = last.tracked.clone();
        by_alias = last.by_alias.clone();
    }
    last
}

fn key(t: &TabletRecord) -> MapKey {
    MapKey::from(t)
}

#[test]
fn first_round_adds_everything() {
    let t1 = tablet(1, "host1", 123);
    let t2 = tablet(2, "host2", 789);

    let diff = run_rounds(vec![vec![t1.clone(), t2.clone()]]);

    assert_eq!(diff.count_adds(), 2);
    assert_eq!(diff.count_replaces(), 0);
    assert_eq!(diff.count_removes(), 0);
    assert_eq!(diff.tracked.get(&key(&t1)), Some(&t1));
    assert_eq!(diff.tracked.get(&key(&t2)), Some(&t2));
    assert_eq!(diff.by_alias.len(), 2);
}

#[test]
fn unchanged_round_is_idempotent() {
    let t1 = tablet(1, "host1", 123);

    let diff = run_rounds(vec![vec![t1.clone()], vec![t1.clone()]]);

    assert!(diff.events.is_empty());
    assert_eq!(diff.tracked.len(), 1);
}

#[test]
fn port_change_is_a_single_replace() {
    let t1 = tablet(1, "host1", 123);
    let moved = tablet(1, "host1", 456);

    let diff = run_rounds(vec![vec![t1.clone()], vec![moved.clone()]]);

    assert_eq!(
        diff.events,
        vec![TabletEvent::Replace {
            old_key: key(&t1),
            new_key: key(&moved),
            tablet: moved.clone(),
        }]
    );
    assert!(!diff.tracked.contains_key(&key(&t1)));
    assert_eq!(diff.tracked.get(&key(&moved)), Some(&moved));
}

#[test]
fn content_change_at_same_address_refreshes_record() {
    let t1 = tablet(1, "host1", 123);
    let mut retyped = t1.clone();
    retyped.tablet_type = crate::TabletType::Replica;

    let diff = run_rounds(vec![vec![t1.clone()], vec![retyped.clone()]]);

    assert_eq!(
        diff.events,
        vec![TabletEvent::Replace {
            old_key: key(&t1),
            new_key: key(&t1),
            tablet: retyped.clone(),
        }]
    );
    assert_eq!(diff.tracked.get(&key(&t1)), Some(&retyped));
}

#[test]
fn vanished_alias_is_removed() {
    let t1 = tablet(1, "host1", 123);
    let t2 = tablet(2, "host2", 789);

    let diff = run_rounds(vec![vec![t1.clone(), t2.clone()], vec![t2.clone()]]);

    assert_eq!(
        diff.events,
        vec![TabletEvent::Remove {
            key: key(&t1),
            tablet: t1.clone(),
        }]
    );
    assert!(!diff.by_alias.contains_key(&t1.alias));
}

#[test]
fn restart_onto_previous_owners_address_keeps_new_owner() {
    // tablet 1 moves to host3; tablet 2 lands on tablet 1's old address
    let t1 = tablet(1, "host1", 123);
    let t2 = tablet(2, "host2", 789);
    let t1_moved = tablet(1, "host3", 123);
    let t2_moved = tablet(2, "host1", 123);

    let diff = run_rounds(vec![vec![t1.clone(), t2.clone()], vec![t2_moved.clone(), t1_moved.clone()]]);

    assert_eq!(diff.count_replaces(), 2);
    assert_eq!(diff.tracked.get(&key(&t1)), Some(&t2_moved));
    assert_eq!(diff.tracked.get(&key(&t1_moved)), Some(&t1_moved));
    assert_eq!(diff.tracked.len(), 2);

    // vacating replace first
    assert_eq!(diff.events[0].alias(), &t1.alias);
    assert_eq!(diff.events[1].alias(), &t2.alias);
}

#[test]
fn unrelated_tablet_taking_freed_address_is_remove_then_add() {
    let old = tablet(1, "host1", 123);
    let newcomer = tablet(7, "host1", 123);

    let diff = run_rounds(vec![vec![old.clone()], vec![newcomer.clone()]]);

    assert_eq!(
        diff.events,
        vec![
            TabletEvent::Remove {
                key: key(&old),
                tablet: old.clone(),
            },
            TabletEvent::Add {
                key: key(&newcomer),
                tablet: newcomer.clone(),
            },
        ]
    );
    assert_eq!(diff.tracked.get(&key(&old)), Some(&newcomer));
}

#[test]
fn colliding_candidates_keep_smallest_alias() {
    let a = tablet(3, "host1", 123);
    let b = tablet(5, "host1", 123);

    let diff = run_rounds(vec![vec![b.clone(), a.clone()]]);

    assert_eq!(diff.tracked.len(), 1);
    assert_eq!(diff.tracked.get(&key(&a)), Some(&a));
    assert_eq!(diff.count_adds(), 1);
    // the loser is still known by alias
    assert!(diff.by_alias.contains_key(&b.alias));
}

#[test]
fn address_swap_produces_two_replaces() {
    let a = tablet(1, "host1", 123);
    let b = tablet(2, "host2", 789);
    let a_swapped = tablet(1, "host2", 789);
    let b_swapped = tablet(2, "host1", 123);

    let diff = run_rounds(vec![vec![a.clone(), b.clone()], vec![a_swapped.clone(), b_swapped.clone()]]);

    assert_eq!(diff.count_replaces(), 2);
    assert_eq!(diff.count_adds() + diff.count_removes(), 0);
    assert_eq!(diff.tracked.get(&key(&a)), Some(&b_swapped));
    assert_eq!(diff.tracked.get(&key(&b)), Some(&a_swapped));
}

#[test]
fn removes_precede_replaces_precede_adds() {
    let gone = tablet(1, "host1", 100);
    let mover = tablet(2, "host2", 200);
    let mover_moved = tablet(2, "host1", 100);
    let fresh = tablet(3, "host2", 200);

    let diff = run_rounds(vec![
        vec![gone.clone(), mover.clone()],
        vec![mover_moved.clone(), fresh.clone()],
    ]);

    let kinds: Vec<&str> = diff
        .events
        .iter()
        .map(|e| match e {
            TabletEvent::Remove { .. } => "remove",
            TabletEvent::Replace { .. } => "replace",
            TabletEvent::Add { .. } => "add",
        })
        .collect();
    assert_eq!(kinds, vec!["remove", "replace", "add"]);
    assert_eq!(diff.tracked.get(&key(&gone)), Some(&mover_moved));
    assert_eq!(diff.tracked.get(&key(&mover)), Some(&fresh));
}

#[test]
fn rolling_restart_chain_is_ordered_vacating_first() {
    // every tablet takes the port its right-hand neighbour just left
    let count = 1500u32;
    let before: Vec<_> = (0..count).map(|uid| tablet(uid, "host1", 10_000 + uid)).collect();
    let after: Vec<_> = (0..count).map(|uid| tablet(uid, "host1", 10_001 + uid)).collect();

    let started = std::time::Instant::now();
    let diff = run_rounds(vec![before, after]);
    let elapsed = started.elapsed();

    assert_eq!(diff.count_replaces(), count as usize);
    assert_eq!(diff.count_adds() + diff.count_removes(), 0);
    let position: HashMap<u32, usize> = diff
        .events
        .iter()
        .enumerate()
        .map(|(i, e)| (e.alias().uid, i))
        .collect();
    for uid in 0..count - 1 {
        assert!(
            position[&(uid + 1)] < position[&uid],
            "tablet {} moved onto port {} before it was vacated",
            uid,
            10_001 + uid
        );
    }
    assert!(elapsed < std::time::Duration::from_millis(500), "diff took {:?}", elapsed);
}

#[test]
fn three_way_rotation_is_broken_at_smallest_alias() {
    let a = tablet(1, "host1", 100);
    let b = tablet(2, "host2", 100);
    let c = tablet(3, "host3", 100);
    // a -> b's address, b -> c's, c -> a's
    let a_moved = tablet(1, "host2", 100);
    let b_moved = tablet(2, "host3", 100);
    let c_moved = tablet(3, "host1", 100);

    let diff = run_rounds(vec![
        vec![a.clone(), b.clone(), c.clone()],
        vec![a_moved.clone(), b_moved.clone(), c_moved.clone()],
    ]);

    let order: Vec<u32> = diff.events.iter().map(|e| e.alias().uid).collect();
    // c takes the address a vacates, then b takes the one c vacates
    assert_eq!(order, vec![1, 3, 2]);
    assert_eq!(diff.tracked.get(&key(&a)), Some(&c_moved));
    assert_eq!(diff.tracked.get(&key(&b)), Some(&a_moved));
    assert_eq!(diff.tracked.get(&key(&c)), Some(&b_moved));
}
