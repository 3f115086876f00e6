use std::collections::HashMap;

use dashmap::DashMap;
#[cfg(test)]
use mockall::automock;
use tracing::debug;

use crate::MapKey;
use crate::TabletRecord;

/// Downstream consumer of the watcher's events. One call per diff event, in the
/// order the diff engine emitted them.
#[cfg_attr(test, automock)]
pub trait HealthRegistry: Send + Sync + 'static {
    fn add_tablet(
        &self,
        key: &MapKey,
        tablet: &TabletRecord,
    );

    /// The tablet now lives under `new_key`; `old_key` is the address it was
    /// registered under before (possibly equal to `new_key`).
    fn replace_tablet(
        &self,
        old_key: &MapKey,
        new_key: &MapKey,
        tablet: &TabletRecord,
    );

    fn remove_tablet(
        &self,
        key: &MapKey,
        tablet: &TabletRecord,
    );

    fn get_all_tablets(&self) -> HashMap<MapKey, TabletRecord>;
}

/// In-memory registry keyed by address.
///
/// Removal is alias-guarded: an entry is only dropped when it still belongs to the
/// tablet being removed, so an address already taken over by another tablet is
/// never cleared by a stale remove.
#[derive(Debug, Default)]
pub struct TabletHealthRegistry {
    pub(crate) tablets: DashMap<MapKey, TabletRecord>,
}

impl TabletHealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tablets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tablets.is_empty()
    }

    pub fn get(
        &self,
        key: &MapKey,
    ) -> Option<TabletRecord> {
        self.tablets.get(key).map(|entry| entry.value().clone())
    }

    fn remove_owned(
        &self,
        key: &MapKey,
        tablet: &TabletRecord,
    ) -> bool {
        self.tablets
            .remove_if(key, |_, current| current.alias == tablet.alias)
            .is_some()
    }
}

impl HealthRegistry for TabletHealthRegistry {
    fn add_tablet(
        &self,
        key: &MapKey,
        tablet: &TabletRecord,
    ) {
        debug!("registry add {} at {}", tablet.alias, key);
        self.tablets.insert(key.clone(), tablet.clone());
    }

    fn replace_tablet(
        &self,
        old_key: &MapKey,
        new_key: &MapKey,
        tablet: &TabletRecord,
    ) {
        debug!("registry replace {} {} -> {}", tablet.alias, old_key, new_key);
        if old_key != new_key {
            self.remove_owned(old_key, tablet);
        }
        self.tablets.insert(new_key.clone(), tablet.clone());
    }

    fn remove_tablet(
        &self,
        key: &MapKey,
        tablet: &TabletRecord,
    ) {
        if !self.remove_owned(key, tablet) {
            debug!("registry remove {} at {}: address owned by another tablet", tablet.alias, key);
        }
    }

    fn get_all_tablets(&self) -> HashMap<MapKey, TabletRecord> {
        self.tablets
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}
