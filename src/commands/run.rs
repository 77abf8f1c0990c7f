use std::time::Duration;

use anyhow::Result;
use imgharvest::{
    config::Config,
    download::WorkerPool,
    sweep::{run_periodic, sweep_once},
    Backends, CrawlController,
};
use tokio::sync::broadcast;
use tracing::info;

use super::{download_worker, fetcher, keywords};

/// How often to check whether the workers have drained the queue
const DRAIN_POLL: Duration = Duration::from_millis(250);

/// Crawl, download and sweep in one process until the crawl is done or Ctrl-C
pub async fn run(config: Config, raw_keywords: Vec<String>, qualifier: Option<String>) -> Result<()> {
    let backends = Backends::open(&config.backend).await?;
    let fetcher = fetcher(&config)?;

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let pool = WorkerPool::start(
        download_worker(&config, fetcher.clone(), &backends),
        backends.queue.clone(),
        config.download.workers,
        config.download.queue_wait(),
        &shutdown_tx,
    );

    let sweeper = if config.sweep.enabled {
        Some(tokio::spawn(run_periodic(
            config.download.base_path.clone(),
            config.sweep.interval(),
            shutdown_tx.subscribe(),
        )))
    } else {
        None
    };

    let mut controller = CrawlController::new(
        &config.crawl,
        fetcher,
        backends.queue.clone(),
        backends.store.clone(),
    );
    controller
        .start(keywords(&raw_keywords), qualifier.as_deref())
        .await?;

    let interrupted = tokio::select! {
        _ = controller.wait() => {
            info!("Crawl finished; waiting for downloads to drain");
            false
        }
        _ = tokio::signal::ctrl_c() => true,
    };

    if !interrupted {
        let drained = async {
            loop {
                if backends.queue.len().await.unwrap_or(0) == 0 && !pool.is_busy() {
                    break;
                }
                tokio::time::sleep(DRAIN_POLL).await;
            }
        };
        tokio::select! {
            _ = drained => info!("Download queue drained"),
            _ = tokio::signal::ctrl_c() => info!("Interrupted while draining"),
        }
    } else {
        info!("Interrupted; stopping crawl");
    }

    let report = controller.stop().await?;
    let _ = shutdown_tx.send(());
    let downloads = pool.join().await;
    if let Some(sweeper) = sweeper {
        let _ = sweeper.await;
    }
    let sweep = sweep_once(config.download.base_path.clone()).await;
    let counters = backends.store.counters().await?;

    println!("\nRun Summary:");
    println!("============");
    if let Some(report) = report {
        println!("Pages visited: {} ({} failed)", report.pages_visited, report.pages_failed);
        println!("Jobs enqueued: {}", report.jobs_enqueued);
    }
    println!("Images saved: {}", downloads.saved);
    println!("Duplicates skipped: {}", downloads.duplicates);
    println!("Images rejected: {}", downloads.rejected);
    println!("Downloads failed: {}", downloads.failed);
    println!("Final sweep removed: {}", sweep.files_removed);
    println!("Crawled links (total): {}", counters.crawled_links);
    println!("Saved images (total): {}", counters.saved_images);
    println!("Output: {}", config.download.base_path.display());
    Ok(())
}
