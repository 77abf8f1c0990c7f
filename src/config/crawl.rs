//! Crawl configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::DEFAULT_USER_AGENT;
use crate::scraping::{CrawlerConfig, FetchConfig};

/// Crawl (page traversal) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Search endpoint used to build seed URLs
    pub search_url: String,
    /// Page request timeout (seconds)
    pub page_timeout_secs: u64,
    /// Connection timeout (seconds)
    pub connect_timeout_secs: u64,
    /// User agent string
    pub user_agent: String,
    /// Maximum redirects to follow
    pub max_redirects: usize,
    /// Maximum page body size (bytes)
    pub max_page_bytes: usize,
    /// Stop the crawl after this many pages
    pub max_pages: Option<usize>,
    /// How long `stop` waits for the crawl thread before dropping the crawl (seconds)
    pub join_timeout_secs: u64,
    /// Idle traversal re-check interval (milliseconds)
    pub idle_wait_ms: u64,
    /// Fixed query parameters appended to every seed URL
    pub search_params: BTreeMap<String, String>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        let mut search_params = BTreeMap::new();
        search_params.insert("tbm".to_string(), "isch".to_string());
        Self {
            search_url: "https://www.google.com/search".to_string(),
            page_timeout_secs: 3,
            connect_timeout_secs: 3,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_redirects: 10,
            max_page_bytes: 10 * 1024 * 1024,
            max_pages: None,
            join_timeout_secs: 10,
            idle_wait_ms: 200,
            search_params,
        }
    }
}

impl CrawlConfig {
    pub fn search_params(&self) -> Vec<(String, String)> {
        self.search_params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }

    pub fn crawler_config(&self) -> CrawlerConfig {
        CrawlerConfig {
            max_pages: self.max_pages,
            idle_wait: Duration::from_millis(self.idle_wait_ms),
        }
    }

    /// Fetch settings for page requests; image limits come from `DownloadConfig`
    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            user_agent: self.user_agent.clone(),
            page_timeout: Duration::from_secs(self.page_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            max_page_size: self.max_page_bytes,
            max_redirects: self.max_redirects,
            ..FetchConfig::default()
        }
    }
}
