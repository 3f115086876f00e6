use std::sync::Arc;

use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use topo_watcher::utils::file_io;
use topo_watcher::Error;
use topo_watcher::FileTopo;
use topo_watcher::HealthRegistry;
use topo_watcher::Result;
use topo_watcher::TabletHealthRegistry;
use topo_watcher::TopoWatcherConfig;
use topo_watcher::TopologyWatcher;
use tracing::error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let settings = TopoWatcherConfig::new()?.validate()?;

    // Initializing Logs
    let _guard = init_observability(&settings)?;

    // Initializing Shutdown Signal
    let (graceful_tx, mut graceful_rx) = watch::channel(());

    if settings.monitoring.prometheus_enabled {
        let port = settings.monitoring.prometheus_port;
        let shutdown = graceful_rx.clone();
        tokio::spawn(async move {
            info!("metrics server listening on port {}", port);
            topo_watcher::start_server(port, shutdown).await;
        });
    }

    let topo = Arc::new(FileTopo::new(settings.topo.path.clone()));
    let registry = Arc::new(TabletHealthRegistry::new());
    let watcher = TopologyWatcher::from_config(topo, registry.clone(), &settings.watcher)?;
    watcher.start();

    info!(
        "Watching cell {} from {}. Waiting for CTRL+C signal...",
        watcher.cell(),
        settings.topo.path.display()
    );
    // Listen on Shutdown Signal
    tokio::spawn(async {
        if let Err(e) = graceful_shutdown(graceful_tx).await {
            error!("Failed to shutdown: {:?}", e);
        }
    });

    let _ = graceful_rx.changed().await;
    watcher.stop();
    watcher.wait().await;

    info!(
        "Exiting with {} tablets tracked, checksum {}",
        registry.get_all_tablets().len(),
        watcher.topo_checksum()
    );
    Ok(())
}

async fn graceful_shutdown(graceful_tx: watch::Sender<()>) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }

    graceful_tx.send(()).map_err(|e| {
        error!("Failed to send shutdown signal: {}", e);
        Error::Fatal(format!("Failed to send shutdown signal: {}", e))
    })?;

    info!("Shutdown signal sent");
    Ok(())
}

/// Logs go to `<log_dir>/<cell>/watcher.log` when a log directory is configured,
/// to stdout otherwise.
fn init_observability(settings: &TopoWatcherConfig) -> Result<WorkerGuard> {
    let (non_blocking, guard) = match &settings.log_dir {
        Some(log_dir) => {
            let log_file = file_io::open_file_for_append(
                &log_dir.join(&settings.watcher.cell).join("watcher.log"),
            )?;
            tracing_appender::non_blocking(log_file)
        }
        None => tracing_appender::non_blocking(std::io::stdout()),
    };

    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();

    Ok(guard)
}
