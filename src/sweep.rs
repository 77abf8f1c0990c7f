//! Duplicate sweep over the output tree
//!
//! Live deduplication can let a few identical images through when workers
//! race. The sweep catches them afterwards: within each keyword partition,
//! files with equal content hashes are reduced to one, keeping the file
//! whose name sorts first (names are timestamps, so the oldest). Partitions
//! are independent; identical images under different keywords are kept.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::types::ContentHash;

/// Result of one sweep pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub partitions: usize,
    pub files_scanned: usize,
    pub files_removed: usize,
}

impl SweepReport {
    fn merge(&mut self, other: SweepReport) {
        self.partitions += other.partitions;
        self.files_scanned += other.files_scanned;
        self.files_removed += other.files_removed;
    }
}

/// Immediate subdirectories of `base`, sorted by name
fn partitions(base: &Path) -> Vec<PathBuf> {
    WalkDir::new(base)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.into_path())
        .collect()
}

/// Remove byte-identical files within one partition directory
pub fn sweep_partition(dir: &Path) -> SweepReport {
    let mut report = SweepReport {
        partitions: 1,
        ..SweepReport::default()
    };
    let mut seen: HashSet<ContentHash> = HashSet::new();

    let files = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file());

    for entry in files {
        // Files can disappear under us (archive, concurrent sweep)
        let bytes = match std::fs::read(entry.path()) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("Skipping {}: {}", entry.path().display(), e);
                continue;
            }
        };
        report.files_scanned += 1;

        if seen.insert(ContentHash::compute(&bytes)) {
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(()) => {
                debug!("Removed duplicate {}", entry.path().display());
                report.files_removed += 1;
            }
            Err(e) => warn!("Failed to remove duplicate {}: {}", entry.path().display(), e),
        }
    }

    report
}

/// One pass over every partition under `base`. A missing base is an empty report.
pub fn sweep_duplicates(base: &Path) -> SweepReport {
    let mut report = SweepReport::default();
    if !base.is_dir() {
        return report;
    }
    for partition in partitions(base) {
        report.merge(sweep_partition(&partition));
    }
    report
}

/// Run one pass on the blocking pool
pub async fn sweep_once(base: PathBuf) -> SweepReport {
    let shown = base.display().to_string();
    match tokio::task::spawn_blocking(move || sweep_duplicates(&base)).await {
        Ok(report) => {
            if report.files_removed > 0 {
                info!(
                    "Duplicate sweep of {}: removed {} of {} files in {} partitions",
                    shown, report.files_removed, report.files_scanned, report.partitions
                );
            } else {
                debug!("Duplicate sweep of {}: nothing to remove", shown);
            }
            report
        }
        Err(e) => {
            warn!("Duplicate sweep task failed: {}", e);
            SweepReport::default()
        }
    }
}

/// Sweep `base` every `interval` until `shutdown` fires. Returns the accumulated report.
pub async fn run_periodic(
    base: PathBuf,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> SweepReport {
    info!("Duplicate sweep started (every {:?}, base: {})", interval, base.display());
    let mut total = SweepReport::default();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = ticker.tick() => {
                total.merge(sweep_once(base.clone()).await);
            }
        }
    }

    info!("Duplicate sweep stopped ({} files removed)", total.files_removed);
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, partition: &str, name: &str, bytes: &[u8]) -> PathBuf {
        let part = dir.join(partition);
        std::fs::create_dir_all(&part).unwrap();
        let path = part.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_missing_base_is_empty() {
        let dir = TempDir::new().unwrap();
        assert_eq!(sweep_duplicates(&dir.path().join("nope")), SweepReport::default());
    }

    #[test]
    fn test_duplicates_in_one_partition_removed() {
        let dir = TempDir::new().unwrap();
        let oldest = write(dir.path(), "cat", "2024_01_01_00_00_00_000001.png", b"same");
        let newer = write(dir.path(), "cat", "2024_01_01_00_00_00_000002.png", b"same");
        let other = write(dir.path(), "cat", "2024_01_01_00_00_00_000003.png", b"different");

        let report = sweep_duplicates(dir.path());
        assert_eq!(
            report,
            SweepReport {
                partitions: 1,
                files_scanned: 3,
                files_removed: 1
            }
        );
        assert!(oldest.exists());
        assert!(!newer.exists());
        assert!(other.exists());
    }

    #[test]
    fn test_partitions_are_independent() {
        let dir = TempDir::new().unwrap();
        let cat = write(dir.path(), "cat", "a.png", b"same");
        let dog = write(dir.path(), "dog", "a.png", b"same");

        let report = sweep_duplicates(dir.path());
        assert_eq!(report.partitions, 2);
        assert_eq!(report.files_removed, 0);
        assert!(cat.exists() && dog.exists());
    }

    #[test]
    fn test_second_pass_removes_nothing() {
        let dir = TempDir::new().unwrap();
        for i in 0..4 {
            write(dir.path(), "cat", &format!("{}.png", i), b"same");
        }

        assert_eq!(sweep_duplicates(dir.path()).files_removed, 3);
        let again = sweep_duplicates(dir.path());
        assert_eq!(again.files_removed, 0);
        assert_eq!(again.files_scanned, 1);
    }

    #[test]
    fn test_stray_files_in_base_ignored() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("loose.png"), b"x").unwrap();
        write(dir.path(), "cat", "a.png", b"x");

        let report = sweep_duplicates(dir.path());
        assert_eq!(report.partitions, 1);
        assert_eq!(report.files_scanned, 1);
        assert!(dir.path().join("loose.png").exists());
    }

    #[tokio::test]
    async fn test_sweep_once_on_blocking_pool() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "cat", "1.png", b"same");
        write(dir.path(), "cat", "2.png", b"same");

        let report = sweep_once(dir.path().to_path_buf()).await;
        assert_eq!(report.files_removed, 1);

        let again = sweep_once(dir.path().to_path_buf()).await;
        assert_eq!(again.files_removed, 0);
        assert_eq!(again.files_scanned, 1);
    }

    #[tokio::test]
    async fn test_periodic_sweep_stops_on_shutdown() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "cat", "1.png", b"same");
        write(dir.path(), "cat", "2.png", b"same");

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(run_periodic(
            dir.path().to_path_buf(),
            Duration::from_millis(10),
            rx,
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(()).unwrap();
        let total = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(total.files_removed, 1);
        assert!(total.partitions >= 1);
    }
}
