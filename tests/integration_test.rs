//! Integration tests for imgharvest
//!
//! These drive the public API end to end against an in-memory web instead of
//! the network.

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, RgbImage};
use imgharvest::{
    archive::{archive_results, ArchiveOutcome},
    config::CrawlConfig,
    download::{DownloadWorker, ImageValidator, JobOutcome, WorkerPool},
    queue::{MemoryQueue, TaskQueue},
    scraping::{
        build_seed_urls, CrawlerConfig, FetchError, FetchedPage, Fetcher, FrontierCrawler, RunFlag,
    },
    store::{DedupStore, MemoryStore},
    sweep::sweep_duplicates,
    types::{DownloadJob, KeywordSet},
    ControllerState, CrawlController,
};
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;
use url::Url;

/// Pages and images served from memory
#[derive(Default)]
struct StaticWeb {
    pages: HashMap<String, String>,
    images: HashMap<String, Vec<u8>>,
}

impl StaticWeb {
    fn page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), body.to_string());
        self
    }

    fn image(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.images.insert(url.to_string(), bytes);
        self
    }
}

#[async_trait]
impl Fetcher for StaticWeb {
    async fn fetch_page(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let body = self.pages.get(url.as_str()).ok_or(FetchError::Status(404))?;
        Ok(FetchedPage {
            final_url: url.clone(),
            status_code: 200,
            body: body.clone(),
            content_type: "text/html".to_string(),
        })
    }

    async fn fetch_bytes(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        self.images
            .get(url.as_str())
            .cloned()
            .ok_or(FetchError::Status(404))
    }
}

/// PNG of the given size; `shade` makes otherwise equal images differ
fn png(width: u32, height: u32, shade: u8) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, image::Rgb([shade, shade, shade]));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

fn files_in(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

#[tokio::test]
async fn test_seed_page_scenario() {
    let web = StaticWeb::default()
        .page(
            "https://a.test/",
            r#"<html><body>
                <a href="/b">B</a>
                <a href="/c">C</a>
                <img src="/img/toy.png" alt="dog toy">
            </body></html>"#,
        )
        .page("https://a.test/b", r#"<a href="https://a.test/">back</a>"#)
        .page("https://a.test/c", "<p>nothing here</p>");

    let queue = Arc::new(MemoryQueue::new());
    let store = Arc::new(MemoryStore::new());
    let crawler = Arc::new(FrontierCrawler::new(
        Arc::new(web),
        queue.clone(),
        store.clone(),
        KeywordSet::new(["dog"]),
        CrawlerConfig::default(),
    ));

    let report = Arc::clone(&crawler)
        .run(vec![url("https://a.test/")], RunFlag::new())
        .await;

    assert_eq!(report.jobs_enqueued, 1);
    let job = queue.pop(Duration::from_millis(10)).await.unwrap().unwrap();
    assert_eq!(job.partition, "dog");
    assert_eq!(job.source_url.as_str(), "https://a.test/img/toy.png");

    let expected: HashSet<Url> = ["https://a.test/", "https://a.test/b", "https://a.test/c"]
        .iter()
        .map(|s| url(s))
        .collect();
    assert_eq!(crawler.visited(), expected);
    assert_eq!(crawler.pending_count(), 0);
    assert_eq!(store.counters().await.unwrap().crawled_links, 3);
}

#[test]
fn test_one_seed_per_keyword() {
    let params = vec![("tbm".to_string(), "isch".to_string())];
    for (raw, qualifier) in [
        (vec!["cat"], Some("plush")),
        (vec!["cat", "dog", "hot dog"], Some("toy")),
        (vec!["Cat", "cat ", "bird"], None),
    ] {
        let keywords = KeywordSet::new(raw);
        let seeds =
            build_seed_urls("https://www.google.com/search", &keywords, qualifier, &params).unwrap();
        assert_eq!(seeds.len(), keywords.len());

        for keyword in &keywords {
            let expected = match qualifier {
                Some(q) => format!("{} {}", keyword, q),
                None => keyword.clone(),
            };
            assert!(
                seeds
                    .iter()
                    .any(|seed| seed.query_pairs().any(|(k, v)| k == "q" && v == expected)),
                "no seed for '{}'",
                expected
            );
        }
    }
}

#[tokio::test]
async fn test_identical_bytes_from_two_urls_persist_once() {
    let dir = TempDir::new().unwrap();
    let bytes = png(300, 300, 7);
    let web = StaticWeb::default()
        .image("https://one.test/a.png", bytes.clone())
        .image("https://two.test/b.png", bytes);
    let store = Arc::new(MemoryStore::new());
    let worker = DownloadWorker::new(
        Arc::new(web),
        store.clone(),
        ImageValidator::default(),
        dir.path(),
    );

    let first = DownloadJob::new(url("https://one.test/a.png"), "cat");
    let second = DownloadJob::new(url("https://two.test/b.png"), "cat");
    let (a, b) = tokio::join!(worker.handle(&first), worker.handle(&second));

    let saved = [&a, &b]
        .iter()
        .filter(|o| matches!(o, JobOutcome::Saved(_)))
        .count();
    assert_eq!(saved, 1);
    assert!([&a, &b].iter().any(|o| **o == JobOutcome::Duplicate));
    assert_eq!(files_in(&dir.path().join("cat")), 1);
    assert_eq!(store.record_count().await.unwrap(), 1);
    assert_eq!(store.counters().await.unwrap().saved_images, 1);
}

#[tokio::test]
async fn test_crawl_download_sweep_archive() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().join("images");
    let same = png(320, 320, 1);

    let web = StaticWeb::default()
        .page(
            "https://search.test/?q=dog",
            r#"<img src="https://img.test/dog1.png" alt="Dog">
               <img src="https://img.test/copy.png" title="a dog again">
               <img src="https://img.test/tiny.png" alt="dog">
               <img src="https://img.test/cat.png" alt="cat">
               <a href="https://site.test/more">more</a>"#,
        )
        .page(
            "https://site.test/more",
            r#"<img src="/photos/dog.jpeg?size=large" alt="another">"#,
        )
        .image("https://img.test/dog1.png", same.clone())
        .image("https://img.test/copy.png", same)
        .image("https://img.test/tiny.png", png(100, 100, 2))
        .image("https://img.test/cat.png", png(400, 400, 3))
        .image("https://site.test/photos/dog.jpeg?size=large", png(260, 300, 4));
    let web: Arc<dyn Fetcher> = Arc::new(web);

    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(MemoryQueue::new());

    let (shutdown_tx, _) = broadcast::channel(1);
    let worker = Arc::new(DownloadWorker::new(
        web.clone(),
        store.clone(),
        ImageValidator::default(),
        base.clone(),
    ));
    let pool = WorkerPool::start(worker, queue.clone(), 2, Duration::from_millis(20), &shutdown_tx);

    let config = CrawlConfig {
        search_url: "https://search.test/".to_string(),
        search_params: Default::default(),
        idle_wait_ms: 10,
        ..CrawlConfig::default()
    };
    let mut controller = CrawlController::new(&config, web, queue.clone(), store.clone());
    controller.start(KeywordSet::new(["dog"]), None).await.unwrap();
    let report = controller.wait().await.unwrap();
    assert_eq!(report.pages_visited, 2);
    assert_eq!(report.jobs_enqueued, 4);

    for _ in 0..300 {
        if queue.len().await.unwrap() == 0 && !pool.is_busy() && pool.stats().processed() == 4 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    controller.stop().await.unwrap();
    assert_eq!(controller.state(), ControllerState::Idle);
    shutdown_tx.send(()).unwrap();
    let stats = pool.join().await;

    // dog1 + dog.jpeg saved, copy is a duplicate, tiny is rejected
    assert_eq!(stats.saved, 2);
    assert_eq!(stats.duplicates, 1);
    assert_eq!(stats.rejected, 1);
    assert_eq!(files_in(&base.join("dog")), 2);
    assert!(!base.join("cat").exists());

    let counters = store.counters().await.unwrap();
    assert_eq!(counters.saved_images, 2);
    assert_eq!(counters.crawled_links, 2);

    let jpg_count = std::fs::read_dir(base.join("dog"))
        .unwrap()
        .filter(|e| {
            e.as_ref()
                .map(|e| e.path().extension().map(|x| x == "jpg").unwrap_or(false))
                .unwrap_or(false)
        })
        .count();
    assert_eq!(jpg_count, 1);

    // Nothing left for the sweep
    assert_eq!(sweep_duplicates(&base).files_removed, 0);

    let zip_path = dir.path().join("results.zip");
    let outcome = archive_results(&base, &zip_path, store.as_ref()).await.unwrap();
    assert_eq!(
        outcome,
        ArchiveOutcome::Archived {
            path: zip_path.clone(),
            files: 2
        }
    );
    assert!(!base.exists());
    assert_eq!(store.record_count().await.unwrap(), 0);
    assert_eq!(store.counters().await.unwrap().saved_images, 0);

    // A second archive finds nothing
    let again = archive_results(&base, &dir.path().join("again.zip"), store.as_ref())
        .await
        .unwrap();
    assert_eq!(again, ArchiveOutcome::NotFound);
}

#[tokio::test]
async fn test_controller_restart_and_idle_stop() {
    let web = StaticWeb::default()
        .page("https://search.test/?q=cat", "<p>cats</p>")
        .page("https://search.test/?q=dog", "<p>dogs</p>");
    let config = CrawlConfig {
        search_url: "https://search.test/".to_string(),
        search_params: Default::default(),
        idle_wait_ms: 10,
        ..CrawlConfig::default()
    };
    let queue = Arc::new(MemoryQueue::new());
    let mut controller =
        CrawlController::new(&config, Arc::new(web), queue.clone(), Arc::new(MemoryStore::new()));

    assert!(controller.stop().await.unwrap().is_none());

    controller.start(KeywordSet::new(["cat"]), None).await.unwrap();
    controller.start(KeywordSet::new(["dog"]), None).await.unwrap();
    assert_eq!(controller.state(), ControllerState::Running);

    let report = controller.wait().await.unwrap();
    assert_eq!(report.pages_visited, 1);

    controller.stop().await.unwrap();
    assert!(controller.stop().await.unwrap().is_none());
    assert_eq!(controller.state(), ControllerState::Idle);
}
