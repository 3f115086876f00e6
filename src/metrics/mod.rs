//! Topology watcher operation counters and their Prometheus exposition.

#[cfg(test)]
mod metrics_test;

use std::collections::BTreeMap;
use std::sync::Arc;

use lazy_static::lazy_static;
use prometheus::IntCounterVec;
use prometheus::Opts;
use prometheus::Registry;
use tokio::sync::watch;
use tracing::error;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

/// Operation names, shared by the operation and error counter sets.
pub const OP_LIST_TABLETS: &str = "ListTablets";
pub const OP_GET_TABLET: &str = "GetTablet";
pub const OP_ADD_TABLET: &str = "AddTablet";
pub const OP_REPLACE_TABLET: &str = "ReplaceTablet";
pub const OP_REMOVE_TABLET: &str = "RemoveTablet";

pub const ALL_OPS: [&str; 5] = [
    OP_LIST_TABLETS,
    OP_GET_TABLET,
    OP_ADD_TABLET,
    OP_REPLACE_TABLET,
    OP_REMOVE_TABLET,
];

/// A named set of monotonically increasing counters, one per operation.
///
/// Cloning is cheap and clones share the underlying atomics.
#[derive(Clone, Debug)]
pub struct OperationCounters {
    counters: IntCounterVec,
}

impl OperationCounters {
    pub fn new(
        name: &str,
        help: &str,
    ) -> Self {
        let counters = IntCounterVec::new(Opts::new(name, help), &["operation"])
            .expect("counter options are static and valid");
        Self { counters }
    }

    pub fn add(
        &self,
        op: &str,
        delta: u64,
    ) {
        if delta > 0 {
            self.counters.with_label_values(&[op]).inc_by(delta);
        }
    }

    pub fn inc(
        &self,
        op: &str,
    ) {
        self.add(op, 1);
    }

    pub fn get(
        &self,
        op: &str,
    ) -> u64 {
        self.counters.with_label_values(&[op]).get()
    }

    /// Snapshot of every known operation, zero included.
    pub fn counts(&self) -> BTreeMap<String, u64> {
        ALL_OPS.iter().map(|op| (op.to_string(), self.get(op))).collect()
    }

    /// Resets every counter to zero.
    pub fn zero_all(&self) {
        self.counters.reset();
    }

    pub fn register(
        &self,
        registry: &Registry,
    ) -> prometheus::Result<()> {
        registry.register(Box::new(self.counters.clone()))
    }
}

lazy_static! {
    /// Process-wide operation counters shared by every watcher that is not handed
    /// its own set.
    pub static ref TOPOLOGY_WATCHER_OPERATIONS: Arc<OperationCounters> = Arc::new(OperationCounters::new(
        "topology_watcher_operations",
        "Topology watcher operation counts"
    ));

    pub static ref TOPOLOGY_WATCHER_ERRORS: Arc<OperationCounters> = Arc::new(OperationCounters::new(
        "topology_watcher_errors",
        "Topology watcher errors by operation"
    ));

    pub static ref REGISTRY: Registry = Registry::new();
}

fn register_custom_metrics() {
    for counters in [&*TOPOLOGY_WATCHER_OPERATIONS, &*TOPOLOGY_WATCHER_ERRORS] {
        if let Err(e) = counters.register(&REGISTRY) {
            error!("failed to register counters: {}", e);
        }
    }
}

pub async fn start_server(
    port: u16,
    mut shutdown_signal: watch::Receiver<()>,
) {
    register_custom_metrics();

    let metrics_route = warp::path!("metrics").and_then(metrics_handler);

    let (_, server) =
        warp::serve(metrics_route).bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
            let _ = shutdown_signal.changed().await;
        });
    server.await;
}

async fn metrics_handler() -> Result<impl Reply, Rejection> {
    Ok(encode_metrics(&REGISTRY))
}

/// Renders every collector of `registry` in the Prometheus text format.
pub fn encode_metrics(registry: &Registry) -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
    };
    match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            error!("custom metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    }
}
