//! Crawling subsystem
//!
//! Walks pages reachable from search-result seeds, picks out `<img>` elements
//! whose metadata matches a keyword, and hands them to the download workers
//! through the task queue.
//!
//! Key components:
//! - `Frontier`: visited / to-visit URL sets shared by one crawl
//! - `FetchEngine`: HTTP fetching for pages and image bytes
//! - `scan_page`: `<img>` and `<a>` extraction from HTML
//! - `match_keywords`: token-exact keyword matching on image metadata
//! - `FrontierCrawler`: concurrent traversals driving all of the above

pub mod crawler;
pub mod extractor;
pub mod fetcher;
pub mod frontier;
pub mod matcher;

pub use crawler::{CrawlReport, CrawlerConfig, FrontierCrawler, RunFlag};
pub use extractor::{scan_page, ImageCandidate, PageScan};
pub use fetcher::{FetchConfig, FetchEngine, FetchError, FetchedPage, Fetcher};
pub use frontier::{Frontier, NextUrl};
pub use matcher::{match_keywords, ImageText};

use url::Url;

/// Normalize a URL for frontier membership.
///
/// Only the fragment is dropped; `#top` and `#bottom` address the same page.
pub(crate) fn normalize_url(url: &Url) -> Url {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    normalized
}

/// Build one seed URL per keyword from a search endpoint.
///
/// The query term is the keyword, followed by `qualifier` when one is set.
/// Extra parameters (such as the image-search switch) are appended as given.
pub fn build_seed_urls(
    search_url: &str,
    keywords: &crate::types::KeywordSet,
    qualifier: Option<&str>,
    extra_params: &[(String, String)],
) -> Result<Vec<Url>, url::ParseError> {
    keywords
        .iter()
        .map(|keyword| {
            let term = match qualifier.map(str::trim).filter(|q| !q.is_empty()) {
                Some(qualifier) => format!("{} {}", keyword, qualifier),
                None => keyword.clone(),
            };
            let mut params = vec![("q".to_string(), term)];
            params.extend(extra_params.iter().cloned());
            Url::parse_with_params(search_url, &params)
        })
        .collect()
}
