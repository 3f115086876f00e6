use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use super::TabletAlias;
use super::TabletListing;
use super::TabletRecord;
use super::TopoServer;
use crate::TopoError;

/// In-process topology backend.
///
/// Tablets are grouped per cell. `set_unavailable(true)` makes every read fail with
/// `BackendUnavailable` until it is switched back, which is how callers exercise
/// the watcher's retry path.
#[derive(Debug, Default)]
pub struct MemoryTopo {
    inner: RwLock<InnerState>,
    unavailable: AtomicBool,
}

#[derive(Debug, Default)]
pub struct InnerState {
    pub cells: HashMap<String, BTreeMap<u32, TabletRecord>>,
}

impl MemoryTopo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provides read access to the state
    pub fn blocking_read<R>(
        &self,
        f: impl FnOnce(&InnerState) -> R,
    ) -> R {
        let guard = self.inner.read();
        f(&guard)
    }

    /// Provides write access to the state
    pub fn blocking_write<R>(
        &self,
        f: impl FnOnce(&mut InnerState) -> R,
    ) -> R {
        let mut guard = self.inner.write();
        f(&mut guard)
    }

    pub fn create_tablet(
        &self,
        tablet: TabletRecord,
    ) -> Result<(), TopoError> {
        self.blocking_write(|state| {
            let cell = state.cells.entry(tablet.alias.cell.clone()).or_default();
            if cell.contains_key(&tablet.alias.uid) {
                return Err(TopoError::NodeExists(tablet.alias.to_string()));
            }
            debug!("create tablet {}", tablet.alias);
            cell.insert(tablet.alias.uid, tablet);
            Ok(())
        })
    }

    /// Applies `update` to the stored record and returns the updated copy.
    pub fn update_tablet_fields(
        &self,
        alias: &TabletAlias,
        update: impl FnOnce(&mut TabletRecord),
    ) -> Result<TabletRecord, TopoError> {
        self.blocking_write(|state| {
            let tablet = state
                .cells
                .get_mut(&alias.cell)
                .and_then(|cell| cell.get_mut(&alias.uid))
                .ok_or_else(|| TopoError::NotFound(alias.to_string()))?;
            update(tablet);
            // the alias is the storage key and must not move
            tablet.alias = alias.clone();
            Ok(tablet.clone())
        })
    }

    pub fn delete_tablet(
        &self,
        alias: &TabletAlias,
    ) -> Result<TabletRecord, TopoError> {
        self.blocking_write(|state| {
            state
                .cells
                .get_mut(&alias.cell)
                .and_then(|cell| cell.remove(&alias.uid))
                .ok_or_else(|| TopoError::NotFound(alias.to_string()))
        })
    }

    pub fn set_unavailable(
        &self,
        unavailable: bool,
    ) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), TopoError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TopoError::BackendUnavailable("memory topo is offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl TopoServer for MemoryTopo {
    async fn list_tablets(
        &self,
        cell: &str,
    ) -> Result<Vec<TabletListing>, TopoError> {
        self.check_available()?;
        Ok(self.blocking_read(|state| {
            state
                .cells
                .get(cell)
                .map(|tablets| tablets.values().map(TabletRecord::listing).collect())
                .unwrap_or_default()
        }))
    }

    async fn get_tablet(
        &self,
        alias: &TabletAlias,
    ) -> Result<TabletRecord, TopoError> {
        self.check_available()?;
        self.blocking_read(|state| {
            state
                .cells
                .get(&alias.cell)
                .and_then(|cell| cell.get(&alias.uid))
                .cloned()
                .ok_or_else(|| TopoError::NotFound(alias.to_string()))
        })
    }
}
