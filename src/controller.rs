//! Crawl controller
//!
//! Owns the lifecycle of one crawl at a time:
//!
//! ```text
//! Idle --start--> Running --stop--> Stopping --(joined + queue purged)--> Idle
//! ```
//!
//! The crawl runs on its own OS thread with a single-threaded tokio runtime,
//! isolated from the caller's runtime. Stopping lowers the run flag and waits
//! up to the join timeout; past that the crawl future is dropped at its next
//! await point. Either way the task queue is purged afterwards, so no job from
//! the stopped crawl is handed out later. Jobs already held by a worker still
//! complete.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::config::CrawlConfig;
use crate::queue::{QueueError, TaskQueue};
use crate::scraping::{build_seed_urls, CrawlReport, CrawlerConfig, Fetcher, FrontierCrawler, RunFlag};
use crate::store::DedupStore;
use crate::types::KeywordSet;

/// How long to wait for the crawl thread after dropping the crawl
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Errors from starting or stopping a crawl
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Keyword set is empty")]
    EmptyKeywords,
    #[error("Invalid search URL: {0}")]
    SeedUrl(#[from] url::ParseError),
    #[error("Failed to spawn crawl thread: {0}")]
    Spawn(std::io::Error),
    #[error("Failed to purge task queue: {0}")]
    Queue(#[from] QueueError),
}

/// Lifecycle state of a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Running,
    Stopping,
}

/// Handle on the crawl thread
struct ActiveCrawl {
    run_flag: RunFlag,
    kill_tx: Option<oneshot::Sender<()>>,
    done_rx: oneshot::Receiver<Option<CrawlReport>>,
    /// Set once `done_rx` has delivered
    finished: Option<Option<CrawlReport>>,
    crawler: Arc<FrontierCrawler>,
    thread: JoinHandle<()>,
}

impl ActiveCrawl {
    async fn wait(&mut self) -> Option<CrawlReport> {
        if let Some(report) = &self.finished {
            return report.clone();
        }
        let report = (&mut self.done_rx).await.ok().flatten();
        self.finished = Some(report.clone());
        report
    }

    fn kill(&mut self) {
        if let Some(kill) = self.kill_tx.take() {
            let _ = kill.send(());
        }
    }
}

/// Starts and stops crawls; the sole owner of the crawl thread
pub struct CrawlController {
    fetcher: Arc<dyn Fetcher>,
    queue: Arc<dyn TaskQueue>,
    store: Arc<dyn DedupStore>,
    search_url: String,
    search_params: Vec<(String, String)>,
    crawler_config: CrawlerConfig,
    join_timeout: Duration,
    state: ControllerState,
    active: Option<ActiveCrawl>,
}

impl CrawlController {
    pub fn new(
        config: &CrawlConfig,
        fetcher: Arc<dyn Fetcher>,
        queue: Arc<dyn TaskQueue>,
        store: Arc<dyn DedupStore>,
    ) -> Self {
        Self {
            fetcher,
            queue,
            store,
            search_url: config.search_url.clone(),
            search_params: config.search_params(),
            crawler_config: config.crawler_config(),
            join_timeout: config.join_timeout(),
            state: ControllerState::Idle,
            active: None,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// True once the running crawl has ended on its own (or there is none)
    pub fn is_finished(&self) -> bool {
        match &self.active {
            Some(active) => active.finished.is_some() || active.thread.is_finished(),
            None => true,
        }
    }

    /// Progress of the running crawl
    pub fn progress(&self) -> Option<CrawlReport> {
        self.active.as_ref().map(|a| a.crawler.snapshot())
    }

    /// Start a crawl for `keywords`, stopping any crawl already running.
    ///
    /// Returns the number of seed URLs.
    pub async fn start(
        &mut self,
        keywords: KeywordSet,
        qualifier: Option<&str>,
    ) -> Result<usize, ControllerError> {
        if keywords.is_empty() {
            return Err(ControllerError::EmptyKeywords);
        }
        let seeds = build_seed_urls(&self.search_url, &keywords, qualifier, &self.search_params)?;

        if self.active.is_some() {
            info!("Crawl already running; stopping it before starting a new one");
            self.stop().await?;
        }

        let crawler = Arc::new(FrontierCrawler::new(
            Arc::clone(&self.fetcher),
            Arc::clone(&self.queue),
            Arc::clone(&self.store),
            keywords,
            self.crawler_config.clone(),
        ));
        let run_flag = RunFlag::new();
        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let (done_tx, done_rx) = oneshot::channel();

        let seed_count = seeds.len();
        let thread = {
            let crawler = Arc::clone(&crawler);
            let run_flag = run_flag.clone();
            std::thread::Builder::new()
                .name("imgharvest-crawl".to_string())
                .spawn(move || {
                    let runtime = match tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                    {
                        Ok(runtime) => runtime,
                        Err(e) => {
                            error!("Failed to build crawl runtime: {}", e);
                            let _ = done_tx.send(None);
                            return;
                        }
                    };
                    let report = runtime.block_on(async move {
                        tokio::select! {
                            report = crawler.run(seeds, run_flag) => Some(report),
                            Ok(()) = kill_rx => None,
                        }
                    });
                    let _ = done_tx.send(report);
                })
                .map_err(ControllerError::Spawn)?
        };

        self.active = Some(ActiveCrawl {
            run_flag,
            kill_tx: Some(kill_tx),
            done_rx,
            finished: None,
            crawler,
            thread,
        });
        self.state = ControllerState::Running;
        info!("Crawl started with {} seed URL(s)", seed_count);
        Ok(seed_count)
    }

    /// Wait for the running crawl to end on its own. `None` when idle or killed.
    pub async fn wait(&mut self) -> Option<CrawlReport> {
        match self.active.as_mut() {
            Some(active) => active.wait().await,
            None => None,
        }
    }

    /// Stop the running crawl, join it and purge the task queue.
    ///
    /// A no-op returning `Ok(None)` when idle. The controller is back to
    /// `Idle` when this returns, even on error.
    pub async fn stop(&mut self) -> Result<Option<CrawlReport>, ControllerError> {
        let Some(mut active) = self.active.take() else {
            return Ok(None);
        };
        self.state = ControllerState::Stopping;
        active.run_flag.stop();

        let report = match tokio::time::timeout(self.join_timeout, active.wait()).await {
            Ok(report) => report,
            Err(_) => {
                warn!(
                    "Crawl did not stop within {:?}; dropping it",
                    self.join_timeout
                );
                active.kill();
                if tokio::time::timeout(KILL_GRACE, active.wait()).await.is_err() {
                    error!("Crawl thread did not exit after kill; detaching it");
                }
                None
            }
        };
        let report = report.unwrap_or_else(|| active.crawler.snapshot());

        if active.thread.is_finished() && active.thread.join().is_err() {
            warn!("Crawl thread panicked");
        }

        let purged = self.queue.purge().await;
        self.state = ControllerState::Idle;
        let purged = purged?;
        info!(
            "Crawl stopped after {} pages; purged {} pending job(s)",
            report.pages_visited, purged
        );
        Ok(Some(report))
    }
}

impl Drop for CrawlController {
    fn drop(&mut self) {
        if let Some(active) = self.active.as_mut() {
            active.run_flag.stop();
            active.kill();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryQueue;
    use crate::scraping::{FetchError, FetchedPage};
    use crate::store::MemoryStore;
    use crate::types::DownloadJob;
    use async_trait::async_trait;
    use url::Url;

    /// Every page links to two fresh pages; each fetch takes `delay`
    struct EndlessWeb {
        delay: Duration,
    }

    #[async_trait]
    impl Fetcher for EndlessWeb {
        async fn fetch_page(&self, url: &Url) -> Result<FetchedPage, FetchError> {
            tokio::time::sleep(self.delay).await;
            let depth = url.path().trim_start_matches("/p").parse::<u64>().unwrap_or(0);
            let body = format!(
                r#"<a href="/p{}">a</a><a href="/p{}">b</a><img src="/dog{}.png" alt="dog">"#,
                depth * 2 + 1,
                depth * 2 + 2,
                depth
            );
            Ok(FetchedPage {
                final_url: url.clone(),
                status_code: 200,
                body,
                content_type: "text/html".to_string(),
            })
        }

        async fn fetch_bytes(&self, _url: &Url) -> Result<Vec<u8>, FetchError> {
            Err(FetchError::Status(404))
        }
    }

    /// A single search page with no links
    struct OnePage;

    #[async_trait]
    impl Fetcher for OnePage {
        async fn fetch_page(&self, url: &Url) -> Result<FetchedPage, FetchError> {
            Ok(FetchedPage {
                final_url: url.clone(),
                status_code: 200,
                body: "<p>no results</p>".to_string(),
                content_type: "text/html".to_string(),
            })
        }

        async fn fetch_bytes(&self, _url: &Url) -> Result<Vec<u8>, FetchError> {
            Err(FetchError::Status(404))
        }
    }

    fn controller(fetcher: Arc<dyn Fetcher>, join_timeout_secs: u64) -> (CrawlController, Arc<MemoryQueue>) {
        let config = CrawlConfig {
            search_url: "https://search.test/images".to_string(),
            join_timeout_secs,
            idle_wait_ms: 10,
            ..CrawlConfig::default()
        };
        let queue = Arc::new(MemoryQueue::new());
        let controller = CrawlController::new(&config, fetcher, queue.clone(), Arc::new(MemoryStore::new()));
        (controller, queue)
    }

    #[tokio::test]
    async fn test_empty_keywords_rejected() {
        let (mut controller, _queue) = controller(Arc::new(OnePage), 5);
        let err = controller.start(KeywordSet::new(["  "]), None).await.unwrap_err();
        assert!(matches!(err, ControllerError::EmptyKeywords));
        assert_eq!(controller.state(), ControllerState::Idle);
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_noop() {
        let (mut controller, _queue) = controller(Arc::new(OnePage), 5);
        assert!(controller.stop().await.unwrap().is_none());
        assert!(controller.stop().await.unwrap().is_none());
        assert_eq!(controller.state(), ControllerState::Idle);
    }

    #[tokio::test]
    async fn test_finished_crawl_stop_joins_and_purges() {
        let (mut controller, queue) = controller(Arc::new(OnePage), 5);
        let seeds = controller.start(KeywordSet::new(["cat", "dog"]), Some("toy")).await.unwrap();
        assert_eq!(seeds, 2);
        assert_eq!(controller.state(), ControllerState::Running);

        let report = controller.wait().await.unwrap();
        assert_eq!(report.pages_visited, 2);
        assert!(controller.is_finished());

        // A stale job left on the queue is dropped by stop
        let stale = DownloadJob::new(Url::parse("https://img.test/x.png").unwrap(), "cat");
        queue.push(stale).await.unwrap();

        let stopped = controller.stop().await.unwrap().unwrap();
        assert_eq!(stopped, report);
        assert_eq!(controller.state(), ControllerState::Idle);
        assert_eq!(queue.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stop_running_crawl() {
        let web = EndlessWeb {
            delay: Duration::from_millis(20),
        };
        let (mut controller, queue) = controller(Arc::new(web), 5);
        controller.start(KeywordSet::new(["dog"]), None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!controller.is_finished());

        let report = controller.stop().await.unwrap().unwrap();
        assert!(report.stopped_early);
        assert!(report.pages_visited > 0);
        assert_eq!(queue.len().await.unwrap(), 0);
        assert_eq!(controller.state(), ControllerState::Idle);
    }

    #[tokio::test]
    async fn test_start_twice_replaces_crawl() {
        let web = EndlessWeb {
            delay: Duration::from_millis(20),
        };
        let (mut controller, _queue) = controller(Arc::new(web), 5);
        controller.start(KeywordSet::new(["dog"]), None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        controller.start(KeywordSet::new(["cat"]), None).await.unwrap();
        assert_eq!(controller.state(), ControllerState::Running);
        assert!(controller.progress().is_some());

        assert!(controller.stop().await.unwrap().is_some());
        assert_eq!(controller.state(), ControllerState::Idle);
    }

    #[tokio::test]
    async fn test_hung_crawl_is_dropped_after_timeout() {
        let web = EndlessWeb {
            delay: Duration::from_secs(30),
        };
        let (mut controller, _queue) = controller(Arc::new(web), 0);
        controller.start(KeywordSet::new(["dog"]), None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let report = tokio::time::timeout(Duration::from_secs(5), controller.stop())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(report.pages_failed, 0);
        assert_eq!(controller.state(), ControllerState::Idle);
    }
}
