//! HTTP fetching for crawl pages and image bytes
//!
//! One reqwest client serves both kinds of request; each request carries its
//! own timeout (short for pages, shorter for images). Failures are reported as
//! `FetchError` and callers drop the unit of work; nothing here retries.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

/// Errors that can occur during fetching
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Timeout after {0:?}")]
    Timeout(Duration),
    #[error("Unexpected status {0}")]
    Status(u16),
    #[error("Invalid content type: {0}")]
    InvalidContentType(String),
    #[error("Content too large: {0} bytes")]
    ContentTooLarge(usize),
}

/// A fetched HTML page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// The fetched URL (may differ from request due to redirects)
    pub final_url: Url,
    /// HTTP status code
    pub status_code: u16,
    /// Response body
    pub body: String,
    /// Content type
    pub content_type: String,
}

/// Source of pages and image bytes.
///
/// `FetchEngine` is the network implementation; tests substitute an
/// in-memory link graph.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch an HTML page
    async fn fetch_page(&self, url: &Url) -> Result<FetchedPage, FetchError>;

    /// Fetch raw bytes (images)
    async fn fetch_bytes(&self, url: &Url) -> Result<Vec<u8>, FetchError>;
}

/// Configuration for the fetch engine
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string
    pub user_agent: String,
    /// Timeout for page requests
    pub page_timeout: Duration,
    /// Timeout for image requests
    pub image_timeout: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Maximum page size (bytes)
    pub max_page_size: usize,
    /// Maximum image size (bytes)
    pub max_image_size: usize,
    /// Maximum redirects to follow
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: crate::config::DEFAULT_USER_AGENT.to_string(),
            page_timeout: Duration::from_secs(3),
            image_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(3),
            max_page_size: 10 * 1024 * 1024,  // 10 MB
            max_image_size: 20 * 1024 * 1024, // 20 MB
            max_redirects: 10,
        }
    }
}

/// Fetch statistics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStats {
    pub total_fetches: u64,
    pub successes: u64,
    pub failures: u64,
}

/// Network fetcher backed by reqwest
pub struct FetchEngine {
    http_client: reqwest::Client,
    config: FetchConfig,
    total_fetches: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
}

impl FetchEngine {
    /// Create a new fetch engine
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(config.connect_timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .user_agent(&config.user_agent)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            http_client,
            config,
            total_fetches: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        })
    }

    async fn get(&self, url: &Url, timeout: Duration) -> Result<reqwest::Response, FetchError> {
        let response = self
            .http_client
            .get(url.as_str())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Self::classify(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        Ok(response)
    }

    fn classify(error: reqwest::Error, timeout: Duration) -> FetchError {
        if error.is_timeout() {
            FetchError::Timeout(timeout)
        } else {
            FetchError::Http(error)
        }
    }

    fn check_length(response: &reqwest::Response, max: usize) -> Result<(), FetchError> {
        if let Some(len) = response.content_length() {
            if len as usize > max {
                return Err(FetchError::ContentTooLarge(len as usize));
            }
        }
        Ok(())
    }

    async fn fetch_page_inner(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let timeout = self.config.page_timeout;
        let response = self.get(url, timeout).await?;
        let status_code = response.status().as_u16();
        let final_url = response.url().clone();

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_string();

        if !content_type.contains("text/html") && !content_type.contains("application/xhtml") {
            return Err(FetchError::InvalidContentType(content_type));
        }

        Self::check_length(&response, self.config.max_page_size)?;

        let body = response.text().await.map_err(|e| Self::classify(e, timeout))?;
        if body.len() > self.config.max_page_size {
            return Err(FetchError::ContentTooLarge(body.len()));
        }

        Ok(FetchedPage {
            final_url,
            status_code,
            body,
            content_type,
        })
    }

    async fn fetch_bytes_inner(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let timeout = self.config.image_timeout;
        let response = self.get(url, timeout).await?;
        Self::check_length(&response, self.config.max_image_size)?;

        let bytes = response.bytes().await.map_err(|e| Self::classify(e, timeout))?;
        if bytes.len() > self.config.max_image_size {
            return Err(FetchError::ContentTooLarge(bytes.len()));
        }
        Ok(bytes.to_vec())
    }

    fn record<T>(&self, result: &Result<T, FetchError>) {
        self.total_fetches.fetch_add(1, Ordering::Relaxed);
        match result {
            Ok(_) => self.successes.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.failures.fetch_add(1, Ordering::Relaxed),
        };
    }

    /// Get fetch statistics
    pub fn stats(&self) -> FetchStats {
        FetchStats {
            total_fetches: self.total_fetches.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    /// Get configuration
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

#[async_trait]
impl Fetcher for FetchEngine {
    async fn fetch_page(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let result = self.fetch_page_inner(url).await;
        self.record(&result);
        result
    }

    async fn fetch_bytes(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let result = self.fetch_bytes_inner(url).await;
        self.record(&result);
        result
    }
}
