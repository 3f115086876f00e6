use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use topo_watcher::OperationCounters;
use topo_watcher::TabletAlias;
use topo_watcher::TabletRecord;
use topo_watcher::TopologyDocument;

pub const CELL: &str = "aa";

pub fn enable_logger() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn tablet(
    uid: u32,
    host: &str,
    port: u32,
    keyspace: &str,
) -> TabletRecord {
    TabletRecord::new(TabletAlias::new(CELL, uid), host, keyspace, "0").with_port("vt", port)
}

/// Private counters so tests do not race on the process-wide ones.
pub fn counters() -> (Arc<OperationCounters>, Arc<OperationCounters>) {
    (
        Arc::new(OperationCounters::new("it_operations", "integration test")),
        Arc::new(OperationCounters::new("it_errors", "integration test")),
    )
}

pub fn write_topology(
    path: &Path,
    tablets: &[TabletRecord],
) {
    let document = TopologyDocument {
        tablets: tablets.to_vec(),
    };
    // write then rename so the watcher never reads a half-written file
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(&document).unwrap()).unwrap();
    std::fs::rename(&tmp, path).unwrap();
}

/// Polls `check` until it holds or `deadline` elapses.
pub async fn eventually<F>(
    deadline: Duration,
    mut check: F,
) -> bool
where
    F: FnMut() -> bool,
{
    let started = tokio::time::Instant::now();
    while started.elapsed() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
