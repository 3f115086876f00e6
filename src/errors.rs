//! Topology Watcher Error Hierarchy
//!
//! Separates backend failures (which a poll cycle tolerates and retries on the next
//! tick) from construction-time failures (which are surfaced to the caller building
//! a filter or a watcher).

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Topology backend failures
    #[error(transparent)]
    Topo(#[from] TopoError),

    /// A `keyspace|shard` filter entry could not be parsed
    #[error("Invalid filter spec: {0}")]
    InvalidFilterSpec(String),

    /// Configuration validation failures
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Configuration loading failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopoError {
    /// Transient backend failure; the caller retries on the next tick
    #[error("Topology backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The requested node does not exist (e.g. vanished between list and get)
    #[error("Node not found: {0}")]
    NotFound(String),

    /// Create of a node that already exists
    #[error("Node already exists: {0}")]
    NodeExists(String),
}

impl TopoError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TopoError::NotFound(_))
    }
}
