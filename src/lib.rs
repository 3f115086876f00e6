//! Topology watcher for the tablets of one cell.
//!
//! A [`TopologyWatcher`] periodically lists the tablets of a cell from a
//! [`TopoServer`], filters them, diffs the result against what it already tracks
//! and pushes add/replace/remove events to a [`HealthRegistry`]. A CRC32 checksum
//! of the tracked aliases lets callers compare views cheaply.
//!
//! ```ignore
//! let topo = Arc::new(FileTopo::new("./topology.json"));
//! let registry = Arc::new(TabletHealthRegistry::new());
//! let watcher = TopologyWatcher::builder(topo, registry, "zone1")
//!     .refresh_interval(Duration::from_secs(30))
//!     .filter(TabletFilter::by_keyspace(&["commerce"]))
//!     .build()?;
//! watcher.start();
//! watcher.wait_for_initial_topology().await;
//! ```

mod config;
mod discovery;
mod errors;
mod metrics;
mod topo;
pub mod utils;

pub use config::*;
pub use discovery::*;
pub use errors::*;
pub use metrics::*;
pub use topo::*;
