//! Single-job download: fetch, deduplicate, persist, validate

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use super::validator::{ImageValidator, Rejection};
use crate::scraping::Fetcher;
use crate::store::DedupStore;
use crate::types::{ContentHash, CounterKind, DownloadJob};

/// What happened to one download job. Every variant other than `Saved`
/// means the job was abandoned; none of them is retried.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// Written and accepted by the validator
    Saved(PathBuf),
    /// Bytes already recorded in the dedup store
    Duplicate,
    /// Written, then deleted because the validator refused it
    Rejected(Rejection),
    FetchFailed(String),
    /// The dedup store could not be reached
    StoreFailed(String),
    WriteFailed(String),
}

/// Destination extension from the last path segment of `url`.
///
/// Anything after `?`, `#`, `&` or `;` is dropped, the result is lower-cased,
/// and `jpeg` becomes `jpg`. Empty when the segment has no extension.
pub fn clean_extension(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");
    let ext = match segment.rsplit_once('.') {
        Some((_, ext)) => ext,
        None => return String::new(),
    };
    let ext = ext
        .split(|c| matches!(c, '?' | '#' | '&' | ';'))
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    if ext == "jpeg" {
        "jpg".to_string()
    } else {
        ext
    }
}

/// Collision-resistant file name: microsecond local timestamp plus a random suffix
pub fn timestamp_file_name(extension: &str) -> String {
    let stamp = Local::now().format("%Y_%m_%d_%H_%M_%S_%6f");
    let suffix = Uuid::new_v4().simple().to_string();
    let name = format!("{}_{}", stamp, &suffix[..8]);
    if extension.is_empty() {
        name
    } else {
        format!("{}.{}", name, extension)
    }
}

/// Directory for one keyword partition, refusing names that would escape `base`
fn partition_dir(base: &Path, partition: &str) -> Option<PathBuf> {
    let invalid = partition.is_empty()
        || partition == "."
        || partition == ".."
        || partition.contains(['/', '\\', '\0']);
    if invalid {
        None
    } else {
        Some(base.join(partition))
    }
}

/// Processes download jobs; shared by every worker task of a pool
pub struct DownloadWorker {
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn DedupStore>,
    validator: ImageValidator,
    base_path: PathBuf,
}

impl DownloadWorker {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn DedupStore>,
        validator: ImageValidator,
        base_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fetcher,
            store,
            validator,
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Process one job and log its outcome
    pub async fn handle(&self, job: &DownloadJob) -> JobOutcome {
        let outcome = self.process(job).await;
        match &outcome {
            JobOutcome::Saved(path) => info!("Saved {} -> {}", job.source_url, path.display()),
            JobOutcome::Duplicate => debug!("Duplicate image skipped: {}", job.source_url),
            JobOutcome::Rejected(reason) => debug!("Image {} rejected: {}", job.source_url, reason),
            JobOutcome::FetchFailed(e) => debug!("Image fetch failed for {}: {}", job.source_url, e),
            JobOutcome::StoreFailed(e) => warn!("Dedup store unavailable for {}: {}", job.source_url, e),
            JobOutcome::WriteFailed(e) => warn!("Failed to persist {}: {}", job.source_url, e),
        }
        outcome
    }

    /// Fetch, deduplicate, write and validate one image
    pub async fn process(&self, job: &DownloadJob) -> JobOutcome {
        let Some(dir) = partition_dir(&self.base_path, &job.partition) else {
            return JobOutcome::WriteFailed(format!("invalid partition '{}'", job.partition));
        };

        let bytes = match self.fetcher.fetch_bytes(&job.source_url).await {
            Ok(bytes) => bytes,
            Err(e) => return JobOutcome::FetchFailed(e.to_string()),
        };

        // Registered before the write: the first insert wins, everyone else drops the job
        let hash = ContentHash::compute(&bytes);
        match self.store.insert(&hash).await {
            Ok(true) => {}
            Ok(false) => return JobOutcome::Duplicate,
            Err(e) => return JobOutcome::StoreFailed(e.to_string()),
        }

        let path = dir.join(timestamp_file_name(&clean_extension(&job.source_url)));
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            return JobOutcome::WriteFailed(format!("{}: {}", dir.display(), e));
        }
        if let Err(e) = tokio::fs::write(&path, &bytes).await {
            return JobOutcome::WriteFailed(format!("{}: {}", path.display(), e));
        }

        let validator = self.validator.clone();
        let check_path = path.clone();
        let verdict = tokio::task::spawn_blocking(move || validator.validate_file(&check_path))
            .await
            .unwrap_or_else(|e| Err(Rejection::Decode(format!("validation task failed: {}", e))));

        match verdict {
            Ok(_) => {
                if let Err(e) = self.store.increment(CounterKind::SavedImages).await {
                    warn!("Failed to bump saved images counter: {}", e);
                }
                JobOutcome::Saved(path)
            }
            Err(rejection) => {
                // The hash stays registered; identical bytes are not retried
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!("Failed to delete rejected image {}: {}", path.display(), e);
                }
                JobOutcome::Rejected(rejection)
            }
        }
    }
}
