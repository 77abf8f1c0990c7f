//! Core types shared by the crawler, the queue and the download workers

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::btree_set;
use std::collections::BTreeSet;
use std::fmt;
use url::Url;

// ============================================================================
// Keywords
// ============================================================================

/// Immutable set of normalized (trimmed, lower-cased) keywords for one crawl
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordSet {
    keywords: BTreeSet<String>,
}

impl KeywordSet {
    /// Build a keyword set, normalizing each entry and dropping empty ones
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keywords }
    }

    pub fn contains(&self, token: &str) -> bool {
        self.keywords.contains(token)
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    pub fn iter(&self) -> btree_set::Iter<'_, String> {
        self.keywords.iter()
    }
}

impl<'a> IntoIterator for &'a KeywordSet {
    type Item = &'a String;
    type IntoIter = btree_set::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.keywords.iter()
    }
}

// ============================================================================
// Content identity
// ============================================================================

/// SHA-256 digest of raw image bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    /// Hash a byte buffer
    pub fn compute(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        ContentHash(out)
    }

    /// Lower-case hex representation (64 chars)
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Parse a 64-char hex string
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 64 || !hex.is_ascii() {
            return None;
        }
        let mut out = [0u8; 32];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(ContentHash(out))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

// ============================================================================
// Jobs and counters
// ============================================================================

/// Instruction for a download worker: fetch one image into one keyword partition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DownloadJob {
    /// Absolute image URL
    pub source_url: Url,
    /// Keyword subdirectory the image is saved under
    pub partition: String,
}

impl DownloadJob {
    pub fn new(source_url: Url, partition: impl Into<String>) -> Self {
        Self {
            source_url,
            partition: partition.into(),
        }
    }
}

/// Aggregate counters shared by crawlers and workers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub crawled_links: u64,
    pub saved_images: u64,
}

/// Which aggregate counter to bump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterKind {
    CrawledLinks,
    SavedImages,
}

impl CounterKind {
    /// Key suffix used by shared key-value backends
    pub fn key_suffix(&self) -> &'static str {
        match self {
            Self::CrawledLinks => "crawled_links_count",
            Self::SavedImages => "saved_images_count",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_set_normalizes() {
        let set = KeywordSet::new(["  Cat ", "DOG", "", "cat"]);
        assert_eq!(set.len(), 2);
        assert!(set.contains("cat"));
        assert!(set.contains("dog"));
        assert!(!set.contains("Cat"));
    }

    #[test]
    fn test_content_hash_hex() {
        let hash = ContentHash::compute(b"hello");
        let hex = hash.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(
            hex,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(ContentHash::from_hex(&hex), Some(hash));
        assert_eq!(ContentHash::from_hex("abc"), None);
    }

    #[test]
    fn test_download_job_json() {
        let job = DownloadJob::new(Url::parse("https://example.com/a.png").unwrap(), "cat");
        let json = serde_json::to_string(&job).unwrap();
        let back: DownloadJob = serde_json::from_str(&json).unwrap();
        assert_eq!(back, job);
    }
}
