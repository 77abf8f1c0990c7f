//! Frontier crawler: concurrent traversals over one shared frontier
//!
//! One task per seed URL, all pulling from the same `Frontier` and observing
//! the same `RunFlag`. The flag is checked once per iteration; an in-flight
//! fetch is never interrupted and finishes or times out on its own. Each
//! fetched page yields download jobs (pushed to the task queue) and outbound
//! links (added to the frontier). Fetch failures skip the page.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::Url;

use super::extractor::scan_page;
use super::fetcher::Fetcher;
use super::frontier::{Frontier, NextUrl};
use crate::queue::TaskQueue;
use crate::store::DedupStore;
use crate::types::{CounterKind, KeywordSet};

/// Cooperative stop signal shared by the controller and a running crawl.
///
/// Starts `true`; `stop` flips it to `false` once and it never goes back.
#[derive(Debug, Clone)]
pub struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    pub fn new() -> Self {
        RunFlag(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Request a stop. Returns `true` if this call made the transition.
    pub fn stop(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Tunables for a crawl
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// Stop after this many pages have been taken from the frontier
    pub max_pages: Option<usize>,
    /// How long an idle traversal waits for others to discover links before re-checking
    pub idle_wait: Duration,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_pages: None,
            idle_wait: Duration::from_millis(200),
        }
    }
}

/// Summary of a finished (or stopped) crawl
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrawlReport {
    pub pages_visited: u64,
    pub pages_failed: u64,
    pub jobs_enqueued: u64,
    pub links_discovered: u64,
    /// True if the run flag ended the crawl before the frontier was exhausted
    pub stopped_early: bool,
}

#[derive(Debug, Default)]
struct CrawlStats {
    pages_visited: AtomicU64,
    pages_failed: AtomicU64,
    jobs_enqueued: AtomicU64,
    links_discovered: AtomicU64,
}

/// Marks a frontier fetch complete when dropped, including on cancellation
struct InFlight<'a> {
    crawler: &'a FrontierCrawler,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.crawler.frontier.lock().complete();
        self.crawler.progress.notify_waiters();
    }
}

/// Crawl over pages reachable from a set of seeds
pub struct FrontierCrawler {
    fetcher: Arc<dyn Fetcher>,
    queue: Arc<dyn TaskQueue>,
    store: Arc<dyn DedupStore>,
    keywords: KeywordSet,
    frontier: Mutex<Frontier>,
    /// Signalled whenever a fetch completes (and may have added links)
    progress: Notify,
    config: CrawlerConfig,
    stats: CrawlStats,
}

impl FrontierCrawler {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        queue: Arc<dyn TaskQueue>,
        store: Arc<dyn DedupStore>,
        keywords: KeywordSet,
        config: CrawlerConfig,
    ) -> Self {
        Self {
            fetcher,
            queue,
            store,
            keywords,
            frontier: Mutex::new(Frontier::new(config.max_pages)),
            progress: Notify::new(),
            config,
            stats: CrawlStats::default(),
        }
    }

    /// Run one traversal task per seed until the frontier is exhausted or the flag drops
    pub async fn run(self: Arc<Self>, seeds: Vec<Url>, run_flag: RunFlag) -> CrawlReport {
        info!("Start crawling: {} seed(s), {} keyword(s)", seeds.len(), self.keywords.len());
        self.frontier.lock().add_seeds(seeds.iter().cloned());

        let mut tasks = JoinSet::new();
        for seed in seeds {
            let crawler = Arc::clone(&self);
            let flag = run_flag.clone();
            tasks.spawn(async move { crawler.traverse(seed, flag).await });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!("Crawl traversal task failed: {}", e);
            }
        }

        let report = self.report(!run_flag.is_running());
        info!(
            "Finished crawling. Visited {} pages ({} failed), {} jobs enqueued",
            report.pages_visited, report.pages_failed, report.jobs_enqueued
        );
        report
    }

    async fn traverse(&self, seed: Url, run_flag: RunFlag) {
        debug!("Traversal for seed {} started", seed);
        while run_flag.is_running() {
            let next = self.frontier.lock().take_next();
            match next {
                NextUrl::Visit(url) => {
                    let _in_flight = InFlight { crawler: self };
                    self.visit(&url).await;
                }
                NextUrl::Wait => {
                    let _ = tokio::time::timeout(self.config.idle_wait, self.progress.notified()).await;
                }
                NextUrl::Exhausted => break,
            }
        }
        debug!("Traversal for seed {} finished", seed);
    }

    async fn visit(&self, url: &Url) {
        debug!("Crawling: {}", url);
        self.stats.pages_visited.fetch_add(1, Ordering::Relaxed);

        let page = match self.fetcher.fetch_page(url).await {
            Ok(page) => page,
            Err(e) => {
                info!("Error while loading page {}: {}", url, e);
                self.stats.pages_failed.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        if let Err(e) = self.store.increment(CounterKind::CrawledLinks).await {
            warn!("Failed to bump crawled links counter: {}", e);
        }

        let scan = scan_page(&page.body, &page.final_url);

        for job in scan.jobs(&self.keywords) {
            let source = job.source_url.clone();
            match self.queue.push(job).await {
                Ok(()) => {
                    self.stats.jobs_enqueued.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => warn!("Failed to enqueue download of {}: {}", source, e),
            }
        }

        let mut added = 0u64;
        {
            let mut frontier = self.frontier.lock();
            for link in scan.links {
                if frontier.discover(link) {
                    added += 1;
                }
            }
        }
        self.stats.links_discovered.fetch_add(added, Ordering::Relaxed);
    }

    fn report(&self, stopped_early: bool) -> CrawlReport {
        let stopped_early = stopped_early && !self.frontier.lock().is_exhausted();
        CrawlReport {
            pages_visited: self.stats.pages_visited.load(Ordering::Relaxed),
            pages_failed: self.stats.pages_failed.load(Ordering::Relaxed),
            jobs_enqueued: self.stats.jobs_enqueued.load(Ordering::Relaxed),
            links_discovered: self.stats.links_discovered.load(Ordering::Relaxed),
            stopped_early,
        }
    }

    /// Counters so far; `stopped_early` is set when the frontier still has work
    pub fn snapshot(&self) -> CrawlReport {
        self.report(true)
    }

    /// Snapshot of the visited set
    pub fn visited(&self) -> HashSet<Url> {
        self.frontier.lock().visited().clone()
    }

    /// Number of URLs still queued
    pub fn pending_count(&self) -> usize {
        self.frontier.lock().pending_count()
    }

    pub fn keywords(&self) -> &KeywordSet {
        &self.keywords
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryQueue;
    use crate::scraping::fetcher::{FetchError, FetchedPage};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Static link graph served from memory
    #[derive(Default)]
    struct StaticWeb {
        pages: HashMap<String, String>,
    }

    impl StaticWeb {
        fn page(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(url.to_string(), body.to_string());
            self
        }
    }

    #[async_trait]
    impl Fetcher for StaticWeb {
        async fn fetch_page(&self, url: &Url) -> Result<FetchedPage, FetchError> {
            match self.pages.get(url.as_str()) {
                Some(body) => Ok(FetchedPage {
                    final_url: url.clone(),
                    status_code: 200,
                    body: body.clone(),
                    content_type: "text/html".to_string(),
                }),
                None => Err(FetchError::Status(404)),
            }
        }

        async fn fetch_bytes(&self, _url: &Url) -> Result<Vec<u8>, FetchError> {
            Err(FetchError::Status(404))
        }
    }

    fn crawler(web: StaticWeb, keywords: &[&str]) -> (Arc<FrontierCrawler>, Arc<MemoryQueue>, Arc<MemoryStore>) {
        let queue = Arc::new(MemoryQueue::new());
        let store = Arc::new(MemoryStore::new());
        let crawler = Arc::new(FrontierCrawler::new(
            Arc::new(web),
            queue.clone(),
            store.clone(),
            KeywordSet::new(keywords.iter().copied()),
            CrawlerConfig {
                idle_wait: Duration::from_millis(20),
                ..CrawlerConfig::default()
            },
        ));
        (crawler, queue, store)
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_run_flag_transitions_once() {
        let flag = RunFlag::new();
        assert!(flag.is_running());
        assert!(flag.stop());
        assert!(!flag.stop());
        assert!(!flag.is_running());
    }

    #[tokio::test]
    async fn test_acyclic_graph_visited_once() {
        let web = StaticWeb::default()
            .page("https://a.test/", r#"<a href="https://b.test/">b</a><a href="https://c.test/">c</a>"#)
            .page("https://b.test/", r#"<a href="https://d.test/">d</a>"#)
            .page("https://c.test/", r#"<a href="https://d.test/">d</a>"#)
            .page("https://d.test/", "<p>leaf</p>");
        let (crawler, _queue, store) = crawler(web, &["cat"]);

        let report = Arc::clone(&crawler)
            .run(vec![url("https://a.test/")], RunFlag::new())
            .await;

        assert_eq!(report.pages_visited, 4);
        assert_eq!(report.pages_failed, 0);
        assert!(!report.stopped_early);
        assert_eq!(crawler.visited().len(), 4);
        assert_eq!(crawler.pending_count(), 0);
        assert_eq!(store.counters().await.unwrap().crawled_links, 4);
    }

    #[tokio::test]
    async fn test_failed_pages_are_skipped() {
        let web = StaticWeb::default()
            .page("https://a.test/", r#"<a href="https://missing.test/">gone</a>"#);
        let (crawler, _queue, _store) = crawler(web, &["cat"]);

        let report = Arc::clone(&crawler)
            .run(vec![url("https://a.test/")], RunFlag::new())
            .await;

        assert_eq!(report.pages_visited, 2);
        assert_eq!(report.pages_failed, 1);
        assert!(crawler.visited().contains(&url("https://missing.test/")));
    }

    #[tokio::test]
    async fn test_stopped_flag_visits_nothing() {
        let web = StaticWeb::default().page("https://a.test/", "<p>a</p>");
        let (crawler, queue, _store) = crawler(web, &["cat"]);

        let flag = RunFlag::new();
        flag.stop();
        let report = Arc::clone(&crawler).run(vec![url("https://a.test/")], flag).await;

        assert_eq!(report.pages_visited, 0);
        assert!(report.stopped_early);
        assert_eq!(queue.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_seeds_share_frontier() {
        let shared = r#"<a href="https://shared.test/">s</a>"#;
        let web = StaticWeb::default()
            .page("https://s1.test/", shared)
            .page("https://s2.test/", shared)
            .page("https://s3.test/", shared)
            .page("https://shared.test/", r#"<img src="/cat.png">"#);
        let (crawler, queue, _store) = crawler(web, &["cat"]);

        let seeds = vec![url("https://s1.test/"), url("https://s2.test/"), url("https://s3.test/")];
        let report = Arc::clone(&crawler).run(seeds, RunFlag::new()).await;

        assert_eq!(report.pages_visited, 4);
        assert_eq!(report.jobs_enqueued, 1);
        assert_eq!(queue.len().await.unwrap(), 1);
    }
}
