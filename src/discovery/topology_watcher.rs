//! Cell topology watcher.
//!
//! Polls the topology backend for the tablets of one cell and keeps the health
//! registry in sync with it:
//!
//! ```text
//! list_tablets(cell) -> filter -> get_tablet(new | all) -> diff -> registry -> checksum
//! ```
//!
//! A single background task runs the cycles; every completed cycle publishes an
//! immutable [`TopologySnapshot`], so readers never observe a half-applied round.
//! A failed cycle leaves the previous snapshot and the registry untouched and is
//! retried on the next tick.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use arc_swap::ArcSwap;
use futures::stream;
use futures::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::checksum::topo_checksum;
use super::checksum::EMPTY_TOPO_CHECKSUM;
use super::diff::diff_tablets;
use super::diff::TabletEvent;
use super::diff::TopologyDiff;
use super::filter::TabletFilter;
use super::health_registry::HealthRegistry;
use crate::config::WatcherConfig;
use crate::metrics::OperationCounters;
use crate::metrics::OP_ADD_TABLET;
use crate::metrics::OP_GET_TABLET;
use crate::metrics::OP_LIST_TABLETS;
use crate::metrics::OP_REMOVE_TABLET;
use crate::metrics::OP_REPLACE_TABLET;
use crate::metrics::TOPOLOGY_WATCHER_ERRORS;
use crate::metrics::TOPOLOGY_WATCHER_OPERATIONS;
use crate::Error;
use crate::MapKey;
use crate::Result;
use crate::TabletAlias;
use crate::TabletRecord;
use crate::TopoError;
use crate::TopoServer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Created,
    Running,
    Stopping,
    Stopped,
}

/// What the watcher knew after its last completed cycle.
#[derive(Debug, Clone)]
pub struct TopologySnapshot {
    /// Tablets pushed to the registry, by address
    pub tracked: BTreeMap<MapKey, TabletRecord>,
    /// Last fetched record of every included alias
    pub by_alias: HashMap<TabletAlias, TabletRecord>,
    pub checksum: u32,
    pub refreshed_at: Option<Instant>,
}

impl Default for TopologySnapshot {
    fn default() -> Self {
        Self {
            tracked: BTreeMap::new(),
            by_alias: HashMap::new(),
            checksum: EMPTY_TOPO_CHECKSUM,
            refreshed_at: None,
        }
    }
}

/// Counts of one completed cycle, mostly for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub listed: usize,
    pub excluded: usize,
    pub fetched: usize,
    pub added: usize,
    pub replaced: usize,
    pub removed: usize,
}

pub struct TopologyWatcherBuilder {
    topo: Arc<dyn TopoServer>,
    registry: Arc<dyn HealthRegistry>,
    cell: String,
    filter: TabletFilter,
    refresh_interval: Duration,
    refresh_known_tablets: bool,
    get_tablet_concurrency: usize,
    operations: Arc<OperationCounters>,
    errors: Arc<OperationCounters>,
}

impl TopologyWatcherBuilder {
    pub fn refresh_interval(
        mut self,
        refresh_interval: Duration,
    ) -> Self {
        self.refresh_interval = refresh_interval;
        self
    }

    pub fn refresh_known_tablets(
        mut self,
        refresh_known_tablets: bool,
    ) -> Self {
        self.refresh_known_tablets = refresh_known_tablets;
        self
    }

    pub fn filter(
        mut self,
        filter: TabletFilter,
    ) -> Self {
        self.filter = filter;
        self
    }

    pub fn get_tablet_concurrency(
        mut self,
        get_tablet_concurrency: usize,
    ) -> Self {
        self.get_tablet_concurrency = get_tablet_concurrency;
        self
    }

    /// Use dedicated counters instead of the process-wide ones.
    pub fn counters(
        mut self,
        operations: Arc<OperationCounters>,
        errors: Arc<OperationCounters>,
    ) -> Self {
        self.operations = operations;
        self.errors = errors;
        self
    }

    pub fn build(self) -> Result<TopologyWatcher> {
        if self.get_tablet_concurrency == 0 {
            return Err(Error::InvalidConfig(
                "get_tablet_concurrency must be greater than 0".into(),
            ));
        }
        if self.refresh_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "refresh_interval must be greater than 0".into(),
            ));
        }

        let (state, _) = watch::channel(WatcherState::Created);
        let (first_load, _) = watch::channel(false);
        let inner = WatcherInner {
            topo: self.topo,
            registry: self.registry,
            cell: self.cell,
            filter: self.filter,
            refresh_interval: self.refresh_interval,
            refresh_known_tablets: self.refresh_known_tablets,
            get_tablet_concurrency: self.get_tablet_concurrency,
            operations: self.operations,
            errors: self.errors,
            snapshot: ArcSwap::from_pointee(TopologySnapshot::default()),
            cycle_lock: tokio::sync::Mutex::new(()),
            first_load,
            state,
            cancel: parking_lot::Mutex::new(CancellationToken::new()),
        };
        Ok(TopologyWatcher {
            inner: Arc::new(inner),
        })
    }
}

/// Keeps the health registry in sync with the tablets of one cell.
pub struct TopologyWatcher {
    inner: Arc<WatcherInner>,
}

struct WatcherInner {
    topo: Arc<dyn TopoServer>,
    registry: Arc<dyn HealthRegistry>,
    cell: String,
    filter: TabletFilter,
    refresh_interval: Duration,
    refresh_known_tablets: bool,
    get_tablet_concurrency: usize,
    operations: Arc<OperationCounters>,
    errors: Arc<OperationCounters>,
    /// Written only by the cycle holding `cycle_lock`
    snapshot: ArcSwap<TopologySnapshot>,
    cycle_lock: tokio::sync::Mutex<()>,
    first_load: watch::Sender<bool>,
    state: watch::Sender<WatcherState>,
    /// Token of the current (or last) polling task. Also serializes start/stop.
    cancel: parking_lot::Mutex<CancellationToken>,
}

impl TopologyWatcher {
    pub fn builder(
        topo: Arc<dyn TopoServer>,
        registry: Arc<dyn HealthRegistry>,
        cell: impl Into<String>,
    ) -> TopologyWatcherBuilder {
        let defaults = WatcherConfig::default();
        TopologyWatcherBuilder {
            topo,
            registry,
            cell: cell.into(),
            filter: TabletFilter::None,
            refresh_interval: defaults.refresh_interval(),
            refresh_known_tablets: defaults.refresh_known_tablets,
            get_tablet_concurrency: defaults.get_tablet_concurrency,
            operations: TOPOLOGY_WATCHER_OPERATIONS.clone(),
            errors: TOPOLOGY_WATCHER_ERRORS.clone(),
        }
    }

    /// Builds a watcher from configuration. A malformed filter entry is reported as
    /// `Error::InvalidFilterSpec`.
    pub fn from_config(
        topo: Arc<dyn TopoServer>,
        registry: Arc<dyn HealthRegistry>,
        config: &WatcherConfig,
    ) -> Result<Self> {
        config.validate()?;
        Self::builder(topo, registry, config.cell.clone())
            .refresh_interval(config.refresh_interval())
            .refresh_known_tablets(config.refresh_known_tablets)
            .get_tablet_concurrency(config.get_tablet_concurrency)
            .filter(TabletFilter::from_config(&config.filter)?)
            .build()
    }

    pub fn cell(&self) -> &str {
        &self.inner.cell
    }

    pub fn state(&self) -> WatcherState {
        *self.inner.state.borrow()
    }

    /// Spawns the polling task. Must be called from within a Tokio runtime.
    /// Starting a watcher that is already running is a no-op.
    pub fn start(&self) {
        let mut cancel = self.inner.cancel.lock();
        let started = self.inner.state.send_if_modified(|state| match state {
            WatcherState::Created | WatcherState::Stopped => {
                *state = WatcherState::Running;
                true
            }
            _ => false,
        });
        if !started {
            warn!("topology watcher for cell {} is already running", self.inner.cell);
            return;
        }

        let token = CancellationToken::new();
        *cancel = token.clone();
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let _stopped = MarkStoppedOnDrop(inner.clone());
            inner.run(token).await;
        });
    }

    /// Asks the polling task to exit. Does not block; an in-flight cycle is either
    /// finished or abandoned before any registry mutation.
    pub fn stop(&self) {
        let cancel = self.inner.cancel.lock();
        self.inner.state.send_if_modified(|state| {
            if *state == WatcherState::Running {
                *state = WatcherState::Stopping;
                true
            } else {
                false
            }
        });
        cancel.cancel();
    }

    /// Resolves once the polling task has exited. Returns immediately for a watcher
    /// that was never started.
    pub async fn wait(&self) {
        let mut state = self.inner.state.subscribe();
        let _ = state
            .wait_for(|s| matches!(s, WatcherState::Created | WatcherState::Stopped))
            .await;
    }

    /// Resolves once the first poll cycle has completed.
    pub async fn wait_for_initial_topology(&self) {
        let mut loaded = self.inner.first_load.subscribe();
        let _ = loaded.wait_for(|done| *done).await;
    }

    /// Runs one poll cycle now, serialized with the background loop.
    pub async fn load_tablets(&self) {
        self.inner.load_tablets(&CancellationToken::new()).await;
    }

    /// Checksum of the tracked set as of the last completed cycle.
    pub fn topo_checksum(&self) -> u32 {
        self.inner.snapshot.load().checksum
    }

    pub fn snapshot(&self) -> Arc<TopologySnapshot> {
        self.inner.snapshot.load_full()
    }

    pub fn tablets(&self) -> BTreeMap<MapKey, TabletRecord> {
        self.inner.snapshot.load().tracked.clone()
    }

    pub fn last_refresh(&self) -> Option<Instant> {
        self.inner.snapshot.load().refreshed_at
    }

    /// Time since the last completed cycle, `None` before the first one.
    pub fn refresh_lag(&self) -> Option<Duration> {
        self.last_refresh().map(|at| at.elapsed())
    }
}

impl Drop for TopologyWatcher {
    fn drop(&mut self) {
        self.inner.cancel.lock().cancel();
    }
}

/// Flips the state to `Stopped` however the polling task ends.
struct MarkStoppedOnDrop(Arc<WatcherInner>);

impl Drop for MarkStoppedOnDrop {
    fn drop(&mut self) {
        self.0.state.send_replace(WatcherState::Stopped);
    }
}

impl WatcherInner {
    async fn run(
        &self,
        cancel: CancellationToken,
    ) {
        info!(
            "topology watcher for cell {} started, refresh interval {:?}",
            self.cell, self.refresh_interval
        );
        loop {
            if cancel.is_cancelled() {
                break;
            }
            self.load_tablets(&cancel).await;

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.refresh_interval) => {}
            }
        }
        info!("topology watcher for cell {} stopped", self.cell);
    }

    async fn load_tablets(
        &self,
        cancel: &CancellationToken,
    ) {
        match self.poll_cycle(cancel).await {
            Ok(Some(summary)) => debug!("cell {} cycle done: {:?}", self.cell, summary),
            Ok(None) => debug!("cell {} cycle abandoned on stop", self.cell),
            Err(e) => error!("cannot load tablets for cell {}: {}", self.cell, e),
        }
    }

    /// One fetch → filter → diff → apply → checksum round. Returns `Ok(None)` when
    /// cancelled before anything was applied.
    async fn poll_cycle(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<CycleSummary>> {
        let _cycle = self.cycle_lock.lock().await;
        if cancel.is_cancelled() {
            return Ok(None);
        }

        self.operations.inc(OP_LIST_TABLETS);
        let listing = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            listing = self.topo.list_tablets(&self.cell) => listing,
        };
        let listing = listing.inspect_err(|_| self.errors.inc(OP_LIST_TABLETS))?;

        let listed = listing.len();
        let included: Vec<_> = listing
            .into_iter()
            .filter(|row| self.filter.is_listing_included(row))
            .collect();
        let excluded = listed - included.len();

        let previous = self.snapshot.load_full();
        let mut candidates = Vec::with_capacity(included.len());
        let mut to_fetch = Vec::new();
        for row in included {
            match previous.by_alias.get(&row.alias) {
                Some(known) if !self.refresh_known_tablets => candidates.push(known.clone()),
                _ => to_fetch.push(row.alias),
            }
        }

        let fetched = to_fetch.len();
        let results = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            results = self.fetch_tablets(to_fetch) => results,
        };
        for (alias, result) in results {
            match result {
                Ok(tablet) => candidates.push(tablet),
                Err(TopoError::NotFound(_)) => {
                    debug!("tablet {} vanished between list and get", alias);
                }
                Err(e) => {
                    self.errors.inc(OP_GET_TABLET);
                    warn!("cannot get tablet {}: {}", alias, e);
                    if let Some(known) = previous.by_alias.get(&alias) {
                        candidates.push(known.clone());
                    }
                }
            }
        }
        // the listing row and the full record may disagree
        candidates.retain(|tablet| self.filter.is_included(tablet));

        let diff = diff_tablets(&previous.tracked, &previous.by_alias, candidates);
        let summary = CycleSummary {
            listed,
            excluded,
            fetched,
            added: diff.count_adds(),
            replaced: diff.count_replaces(),
            removed: diff.count_removes(),
        };
        self.apply(&diff);

        let checksum = topo_checksum(&diff.tracked);
        self.snapshot.store(Arc::new(TopologySnapshot {
            tracked: diff.tracked,
            by_alias: diff.by_alias,
            checksum,
            refreshed_at: Some(Instant::now()),
        }));
        self.first_load.send_replace(true);

        Ok(Some(summary))
    }

    /// `get_tablet` for every alias, at most `get_tablet_concurrency` at a time.
    async fn fetch_tablets(
        &self,
        aliases: Vec<TabletAlias>,
    ) -> Vec<(TabletAlias, std::result::Result<TabletRecord, TopoError>)> {
        stream::iter(aliases)
            .map(|alias| async move {
                self.operations.inc(OP_GET_TABLET);
                let result = self.topo.get_tablet(&alias).await;
                (alias, result)
            })
            .buffer_unordered(self.get_tablet_concurrency)
            .collect()
            .await
    }

    fn apply(
        &self,
        diff: &TopologyDiff,
    ) {
        for event in &diff.events {
            match event {
                TabletEvent::Add { key, tablet } => {
                    info!("adding tablet {} at {} ({}/{})", tablet.alias, key, tablet.keyspace, tablet.shard);
                    self.registry.add_tablet(key, tablet);
                }
                TabletEvent::Replace {
                    old_key,
                    new_key,
                    tablet,
                } => {
                    info!("replacing tablet {}: {} -> {}", tablet.alias, old_key, new_key);
                    self.registry.replace_tablet(old_key, new_key, tablet);
                }
                TabletEvent::Remove { key, tablet } => {
                    info!("removing tablet {} at {}", tablet.alias, key);
                    self.registry.remove_tablet(key, tablet);
                }
            }
        }

        self.operations.add(OP_ADD_TABLET, diff.count_adds() as u64);
        self.operations.add(OP_REPLACE_TABLET, diff.count_replaces() as u64);
        self.operations.add(OP_REMOVE_TABLET, diff.count_removes() as u64);
    }
}
