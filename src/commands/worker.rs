use anyhow::Result;
use imgharvest::{config::Config, download::WorkerPool, Backends};
use tokio::sync::broadcast;
use tracing::info;

use super::{download_worker, fetcher, warn_if_process_local};

/// Run the download pool until Ctrl-C
pub async fn worker(config: Config, workers: Option<usize>) -> Result<()> {
    let backends = Backends::open(&config.backend).await?;
    warn_if_process_local(&backends, "a worker-only process");

    let workers = workers.unwrap_or(config.download.workers).max(1);
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let pool = WorkerPool::start(
        download_worker(&config, fetcher(&config)?, &backends),
        backends.queue.clone(),
        workers,
        config.download.queue_wait(),
        &shutdown_tx,
    );

    tokio::signal::ctrl_c().await?;
    info!("Interrupted; finishing in-flight downloads");
    let _ = shutdown_tx.send(());
    let stats = pool.join().await;

    println!(
        "Saved {}, duplicates {}, rejected {}, failed {}",
        stats.saved, stats.duplicates, stats.rejected, stats.failed
    );
    Ok(())
}
