//! Subcommand implementations for the `imgharvest` binary

pub mod archive;
pub mod crawl;
pub mod init;
pub mod run;
pub mod stats;
pub mod sweep;
pub mod worker;

use std::sync::Arc;

use anyhow::Result;
use imgharvest::{
    config::Config,
    download::DownloadWorker,
    scraping::{FetchEngine, Fetcher},
    types::KeywordSet,
    Backends,
};
use tracing::warn;

/// Network fetcher built from the `[crawl]` and `[download]` sections
pub fn fetcher(config: &Config) -> Result<Arc<dyn Fetcher>> {
    Ok(Arc::new(FetchEngine::new(config.fetch_config())?))
}

pub fn download_worker(config: &Config, fetcher: Arc<dyn Fetcher>, backends: &Backends) -> Arc<DownloadWorker> {
    Arc::new(DownloadWorker::new(
        fetcher,
        Arc::clone(&backends.store),
        config.download.validator(),
        config.download.base_path.clone(),
    ))
}

/// Keywords from the command line; empty input is rejected by the controller
pub fn keywords(raw: &[String]) -> KeywordSet {
    KeywordSet::new(raw)
}

/// Warn when a split deployment is configured with process-local state
pub fn warn_if_process_local(backends: &Backends, role: &str) {
    if backends.is_process_local() {
        warn!(
            "Running {} with the in-memory backend: jobs are not shared with other processes. \
             Set [backend] kind = \"redis\" for split deployments.",
            role
        );
    }
}
