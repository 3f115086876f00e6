use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;
use crate::TabletFilter;

/// Polling parameters of a topology watcher
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WatcherConfig {
    /// Cell whose tablets are watched
    #[serde(default = "default_cell")]
    pub cell: String,

    /// Delay between two poll cycles (unit: milliseconds)
    #[serde(default = "default_refresh_interval_in_ms")]
    pub refresh_interval_in_ms: u64,

    /// Re-read every known tablet on each cycle. When disabled only new aliases are
    /// fetched, so an in-place host/port change of a known tablet goes unnoticed
    /// until the tablet is recreated under a new alias.
    #[serde(default = "default_refresh_known_tablets")]
    pub refresh_known_tablets: bool,

    /// Max `get_tablet` calls in flight during one cycle
    #[serde(default = "default_get_tablet_concurrency")]
    pub get_tablet_concurrency: usize,

    #[serde(default)]
    pub filter: FilterConfig,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            cell: default_cell(),
            refresh_interval_in_ms: default_refresh_interval_in_ms(),
            refresh_known_tablets: default_refresh_known_tablets(),
            get_tablet_concurrency: default_get_tablet_concurrency(),
            filter: FilterConfig::default(),
        }
    }
}

impl WatcherConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_in_ms)
    }

    /// Validates watcher configuration
    /// # Errors
    /// Returns `Error::InvalidConfig` when:
    /// - the cell is empty
    /// - the refresh interval or the fetch concurrency is zero
    /// - both filter kinds are configured or a filter entry does not parse
    pub fn validate(&self) -> Result<()> {
        if self.cell.trim().is_empty() {
            return Err(Error::InvalidConfig("watcher.cell cannot be empty".into()));
        }

        if self.refresh_interval_in_ms == 0 {
            return Err(Error::InvalidConfig(
                "watcher.refresh_interval_in_ms must be greater than 0".into(),
            ));
        }

        if self.get_tablet_concurrency == 0 {
            return Err(Error::InvalidConfig(
                "watcher.get_tablet_concurrency must be greater than 0".into(),
            ));
        }

        TabletFilter::from_config(&self.filter)?;
        Ok(())
    }
}

/// Inclusion filter settings. At most one of the two lists may be set.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct FilterConfig {
    /// `keyspace|shard` entries, shard being a name or a key range
    #[serde(default)]
    pub shards: Vec<String>,

    /// Keyspace names
    #[serde(default)]
    pub keyspaces: Vec<String>,
}

fn default_cell() -> String {
    "local".into()
}

fn default_refresh_interval_in_ms() -> u64 {
    60_000
}

fn default_refresh_known_tablets() -> bool {
    true
}

fn default_get_tablet_concurrency() -> usize {
    32
}
