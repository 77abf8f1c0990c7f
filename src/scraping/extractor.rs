//! Image and link extraction from fetched HTML

use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

use super::matcher::{file_stem_of, match_keywords, ImageText};
use crate::types::{DownloadJob, KeywordSet};

/// An `<img>` element with its source resolved against the page URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCandidate {
    pub src: Url,
    pub alt: Option<String>,
    pub title: Option<String>,
}

impl ImageCandidate {
    /// Download job for this image if any keyword matches its alt, title or file name.
    ///
    /// When several keywords match, the lexicographically first one is used as
    /// the partition.
    pub fn to_job(&self, keywords: &KeywordSet) -> Option<DownloadJob> {
        let file_stem = file_stem_of(&self.src);
        let text = ImageText {
            alt: self.alt.as_deref(),
            title: self.title.as_deref(),
            file_stem: file_stem.as_deref(),
        };
        let partition = match_keywords(&text, keywords).into_iter().next()?;
        Some(DownloadJob::new(self.src.clone(), partition))
    }
}

/// Everything the crawler needs from one page
#[derive(Debug, Clone, Default)]
pub struct PageScan {
    pub images: Vec<ImageCandidate>,
    pub links: Vec<Url>,
}

impl PageScan {
    /// Download jobs for the images matching `keywords`
    pub fn jobs(&self, keywords: &KeywordSet) -> Vec<DownloadJob> {
        self.images
            .iter()
            .filter_map(|image| image.to_job(keywords))
            .collect()
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Parse a page, collecting `<img src>` candidates and `<a href>` links.
///
/// Relative references are resolved against `base_url`; only http(s) results
/// are kept, and each distinct URL is reported once.
pub fn scan_page(body: &str, base_url: &Url) -> PageScan {
    let document = Html::parse_document(body);
    let mut scan = PageScan::default();

    if let Ok(selector) = Selector::parse("img[src]") {
        let mut seen = HashSet::new();
        for element in document.select(&selector) {
            let attrs = element.value();
            let Some(src) = non_empty(attrs.attr("src")) else {
                continue;
            };
            let Ok(src) = base_url.join(&src) else {
                continue;
            };
            if !matches!(src.scheme(), "http" | "https") || !seen.insert(src.clone()) {
                continue;
            }
            scan.images.push(ImageCandidate {
                src,
                alt: non_empty(attrs.attr("alt")),
                title: non_empty(attrs.attr("title")),
            });
        }
    }

    if let Ok(selector) = Selector::parse("a[href]") {
        let mut seen = HashSet::new();
        for element in document.select(&selector) {
            if let Some(href) = element.value().attr("href") {
                if let Ok(url) = base_url.join(href) {
                    if matches!(url.scheme(), "http" | "https") && seen.insert(url.clone()) {
                        scan.links.push(url);
                    }
                }
            }
        }
    }

    scan
}
