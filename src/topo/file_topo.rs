use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use super::TabletAlias;
use super::TabletListing;
use super::TabletRecord;
use super::TopoServer;
use crate::TopoError;

/// On-disk layout read by [`FileTopo`].
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TopologyDocument {
    #[serde(default)]
    pub tablets: Vec<TabletRecord>,
}

/// Topology backend backed by a JSON document.
///
/// The file is re-read on every call so that edits made by an operator (or a
/// provisioning tool) show up on the next poll. A missing or half-written file is
/// reported as `BackendUnavailable`, never as an empty topology.
#[derive(Debug, Clone)]
pub struct FileTopo {
    path: PathBuf,
}

impl FileTopo {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read_document(&self) -> Result<TopologyDocument, TopoError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            warn!("failed to read topology file {:?}: {}", self.path, e);
            TopoError::BackendUnavailable(format!("{}: {}", self.path.display(), e))
        })?;
        serde_json::from_slice(&bytes).map_err(|e| {
            warn!("failed to parse topology file {:?}: {}", self.path, e);
            TopoError::BackendUnavailable(format!("{}: {}", self.path.display(), e))
        })
    }
}

#[async_trait]
impl TopoServer for FileTopo {
    async fn list_tablets(
        &self,
        cell: &str,
    ) -> Result<Vec<TabletListing>, TopoError> {
        let doc = self.read_document().await?;
        Ok(doc
            .tablets
            .iter()
            .filter(|t| t.alias.cell == cell)
            .map(TabletRecord::listing)
            .collect())
    }

    async fn get_tablet(
        &self,
        alias: &TabletAlias,
    ) -> Result<TabletRecord, TopoError> {
        let doc = self.read_document().await?;
        doc.tablets
            .into_iter()
            .find(|t| &t.alias == alias)
            .ok_or_else(|| TopoError::NotFound(alias.to_string()))
    }
}
