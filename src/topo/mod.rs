//! Tablet records and the topology backend seam.
//!
//! The watcher only ever talks to the backend through [`TopoServer`]; two
//! implementations ship with the crate: [`MemoryTopo`] for embedding and tests, and
//! [`FileTopo`] which re-reads a JSON document on every call.

mod file_topo;
mod map_key;
mod memory_topo;
pub use file_topo::*;
pub use map_key::*;
pub use memory_topo::*;


use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;

use crate::TopoError;

/// Identity of a tablet: the cell it lives in and its numeric id within that cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TabletAlias {
    pub cell: String,
    pub uid: u32,
}

impl TabletAlias {
    pub fn new(
        cell: impl Into<String>,
        uid: u32,
    ) -> Self {
        Self {
            cell: cell.into(),
            uid,
        }
    }
}

impl fmt::Display for TabletAlias {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}-{:010}", self.cell, self.uid)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabletType {
    #[default]
    Unknown,
    Primary,
    Replica,
    Rdonly,
    Spare,
    Drained,
}

/// Full tablet record as stored in the topology backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabletRecord {
    pub alias: TabletAlias,
    pub hostname: String,
    /// Logical port name (e.g. `vt`, `grpc`) to port number
    #[serde(default)]
    pub port_map: BTreeMap<String, u32>,
    pub keyspace: String,
    pub shard: String,
    #[serde(default)]
    pub tablet_type: TabletType,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl TabletRecord {
    pub fn new(
        alias: TabletAlias,
        hostname: impl Into<String>,
        keyspace: impl Into<String>,
        shard: impl Into<String>,
    ) -> Self {
        Self {
            alias,
            hostname: hostname.into(),
            port_map: BTreeMap::new(),
            keyspace: keyspace.into(),
            shard: shard.into(),
            tablet_type: TabletType::default(),
            tags: BTreeMap::new(),
        }
    }

    pub fn with_port(
        mut self,
        name: impl Into<String>,
        port: u32,
    ) -> Self {
        self.port_map.insert(name.into(), port);
        self
    }

    pub fn with_type(
        mut self,
        tablet_type: TabletType,
    ) -> Self {
        self.tablet_type = tablet_type;
        self
    }

    pub fn listing(&self) -> TabletListing {
        TabletListing {
            alias: self.alias.clone(),
            keyspace: self.keyspace.clone(),
            shard: self.shard.clone(),
        }
    }
}

/// Lightweight row returned when listing a cell: enough to run a filter, not
/// enough to reach the tablet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabletListing {
    pub alias: TabletAlias,
    pub keyspace: String,
    pub shard: String,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait TopoServer: Send + Sync + 'static {
    /// All tablets registered in `cell`.
    async fn list_tablets(
        &self,
        cell: &str,
    ) -> Result<Vec<TabletListing>, TopoError>;

    /// The authoritative record of one tablet. Returns `TopoError::NotFound` when
    /// the alias no longer exists.
    async fn get_tablet(
        &self,
        alias: &TabletAlias,
    ) -> Result<TabletRecord, TopoError>;
}
