//! Tracked-set diffing.
//!
//! Compares what was last pushed to the health registry with a freshly fetched
//! (already filtered) candidate list and produces the events that move the registry
//! from one to the other.
//!
//! Tablets are matched by alias, not by address: a tablet that restarts on a new
//! host or port is one `Replace`, while an unrelated tablet landing on an address
//! that was just vacated is a `Remove` of the old owner plus an `Add` (or
//! `Replace`) of the new one. Events are ordered so that a key is always vacated
//! before it is occupied:
//!
//! ```text
//! Remove* -> Replace* (vacating before occupying) -> Add*
//! ```

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;

use tracing::warn;

use crate::MapKey;
use crate::TabletAlias;
use crate::TabletRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabletEvent {
    Add {
        key: MapKey,
        tablet: TabletRecord,
    },
    Replace {
        old_key: MapKey,
        new_key: MapKey,
        tablet: TabletRecord,
    },
    Remove {
        key: MapKey,
        tablet: TabletRecord,
    },
}

impl TabletEvent {
    pub fn alias(&self) -> &TabletAlias {
        match self {
            TabletEvent::Add { tablet, .. }
            | TabletEvent::Replace { tablet, .. }
            | TabletEvent::Remove { tablet, .. } => &tablet.alias,
        }
    }
}

/// Result of one diff round.
#[derive(Debug, Clone, Default)]
pub struct TopologyDiff {
    /// New tracked set, `MapKey -> record`
    pub tracked: BTreeMap<MapKey, TabletRecord>,
    /// Every candidate by alias, including ones that lost an address collision
    pub by_alias: HashMap<TabletAlias, TabletRecord>,
    pub events: Vec<TabletEvent>,
}

impl TopologyDiff {
    pub fn count_adds(&self) -> usize {
        self.events.iter().filter(|e| matches!(e, TabletEvent::Add { .. })).count()
    }

    pub fn count_replaces(&self) -> usize {
        self.events.iter().filter(|e| matches!(e, TabletEvent::Replace { .. })).count()
    }

    pub fn count_removes(&self) -> usize {
        self.events.iter().filter(|e| matches!(e, TabletEvent::Remove { .. })).count()
    }
}

pub fn diff_tablets(
    prev_tracked: &BTreeMap<MapKey, TabletRecord>,
    prev_by_alias: &HashMap<TabletAlias, TabletRecord>,
    candidates: Vec<TabletRecord>,
) -> TopologyDiff {
    let by_alias: HashMap<TabletAlias, TabletRecord> =
        candidates.into_iter().map(|t| (t.alias.clone(), t)).collect();

    // Assign keys in alias order so that a collision always resolves the same way.
    let mut aliases: Vec<&TabletAlias> = by_alias.keys().collect();
    aliases.sort();
    let mut tracked: BTreeMap<MapKey, TabletRecord> = BTreeMap::new();
    let mut winners: HashSet<&TabletAlias> = HashSet::new();
    for alias in aliases {
        let tablet = &by_alias[alias];
        let key = MapKey::from(tablet);
        if let Some(owner) = tracked.get(&key) {
            warn!(
                "tablet {} shares address {} with {}, not tracking it this round",
                alias, key, owner.alias
            );
            continue;
        }
        tracked.insert(key, tablet.clone());
        winners.insert(alias);
    }

    let mut removes = Vec::new();
    for (key, old) in prev_tracked {
        if !winners.contains(&old.alias) {
            removes.push(TabletEvent::Remove {
                key: key.clone(),
                tablet: old.clone(),
            });
        }
    }

    let mut replaces = Vec::new();
    let mut adds = Vec::new();
    for (new_key, tablet) in &tracked {
        match tracked_key_before(prev_tracked, prev_by_alias, &tablet.alias) {
            Some(old_key) => {
                let unchanged = old_key == *new_key && prev_tracked.get(&old_key) == Some(tablet);
                if !unchanged {
                    replaces.push(TabletEvent::Replace {
                        old_key,
                        new_key: new_key.clone(),
                        tablet: tablet.clone(),
                    });
                }
            }
            None => adds.push(TabletEvent::Add {
                key: new_key.clone(),
                tablet: tablet.clone(),
            }),
        }
    }

    let mut events = removes;
    events.extend(order_replaces(replaces));
    events.extend(adds);

    TopologyDiff {
        tracked,
        by_alias,
        events,
    }
}

/// Key under which `alias` was pushed to the registry last round, if any.
fn tracked_key_before(
    prev_tracked: &BTreeMap<MapKey, TabletRecord>,
    prev_by_alias: &HashMap<TabletAlias, TabletRecord>,
    alias: &TabletAlias,
) -> Option<MapKey> {
    let key = MapKey::from(prev_by_alias.get(alias)?);
    match prev_tracked.get(&key) {
        Some(owner) if owner.alias == *alias => Some(key),
        _ => None,
    }
}

/// A replace that moves onto key K must run after the replace that moves off K.
///
/// Every key is vacated by at most one replace and occupied by at most one, so the
/// constraints form disjoint chains and rotations. Chains are emitted head first,
/// smallest ready alias first. Rotations (A takes B's key, B takes A's) have no
/// valid order; they are broken at the smallest alias and rely on the registry's
/// alias-guarded removal.
fn order_replaces(mut pending: Vec<TabletEvent>) -> Vec<TabletEvent> {
    pending.sort_by(|a, b| a.alias().cmp(b.alias()));
    let n = pending.len();

    // successor[i]: the replace moving onto the key that replace i vacates
    let mut successor: Vec<Option<usize>> = vec![None; n];
    let mut blocked = vec![false; n];
    {
        let vacated_by: HashMap<&MapKey, usize> = pending
            .iter()
            .enumerate()
            .filter_map(|(i, e)| match e {
                TabletEvent::Replace { old_key, .. } => Some((old_key, i)),
                _ => None,
            })
            .collect();
        for (i, event) in pending.iter().enumerate() {
            if let TabletEvent::Replace { new_key, .. } = event {
                if let Some(&j) = vacated_by.get(new_key) {
                    if j != i {
                        successor[j] = Some(i);
                        blocked[i] = true;
                    }
                }
            }
        }
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| !blocked[i]).collect();
    let mut emitted = vec![false; n];
    let mut order = Vec::with_capacity(n);
    let mut smallest_left = 0;
    while order.len() < n {
        let next = match ready.pop_first() {
            Some(i) => i,
            None => {
                // only rotations are left
                while emitted[smallest_left] {
                    smallest_left += 1;
                }
                smallest_left
            }
        };
        emitted[next] = true;
        order.push(next);
        if let Some(s) = successor[next] {
            if !emitted[s] {
                ready.insert(s);
            }
        }
    }

    let mut slots: Vec<Option<TabletEvent>> = pending.into_iter().map(Some).collect();
    order.into_iter().filter_map(|i| slots[i].take()).collect()
}
