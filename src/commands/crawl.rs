use anyhow::Result;
use imgharvest::{config::Config, Backends, CrawlController};
use tracing::info;

use super::{fetcher, keywords, warn_if_process_local};

/// Crawl only: enqueue download jobs for other processes to consume
pub async fn crawl(config: Config, raw_keywords: Vec<String>, qualifier: Option<String>) -> Result<()> {
    let backends = Backends::open(&config.backend).await?;
    warn_if_process_local(&backends, "a crawl-only process");

    let mut controller = CrawlController::new(
        &config.crawl,
        fetcher(&config)?,
        backends.queue.clone(),
        backends.store.clone(),
    );
    controller
        .start(keywords(&raw_keywords), qualifier.as_deref())
        .await?;

    tokio::select! {
        _ = controller.wait() => info!("Crawl finished"),
        _ = tokio::signal::ctrl_c() => info!("Interrupted; stopping crawl"),
    }

    // A finished crawl leaves its jobs for the workers; only an interrupted one purges
    let report = if controller.is_finished() {
        controller.wait().await
    } else {
        controller.stop().await?
    };

    if let Some(report) = report {
        println!("\nCrawl Summary:");
        println!("==============");
        println!("Pages visited: {}", report.pages_visited);
        println!("Pages failed: {}", report.pages_failed);
        println!("Jobs enqueued: {}", report.jobs_enqueued);
        println!("Links discovered: {}", report.links_discovered);
        println!("Stopped early: {}", report.stopped_early);
    }
    println!("Jobs waiting in queue: {}", backends.queue.len().await?);
    Ok(())
}
