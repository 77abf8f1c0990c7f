//! Archive consumer: package the output tree and reset shared state
//!
//! The zip is written first; only once it is complete is the output tree
//! deleted and the dedup store cleared. A missing or empty output tree is a
//! `NotFound` outcome, not an error.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;
use walkdir::WalkDir;

use crate::store::{DedupStore, StoreError};

/// Errors that can occur while archiving
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Archive path {0} is inside the output tree")]
    InsideBase(PathBuf),
    #[error("Archive task failed: {0}")]
    Task(String),
}

/// What `archive_results` did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOutcome {
    /// Nothing to archive
    NotFound,
    Archived { path: PathBuf, files: usize },
}

/// Absolute form of `path` with symlinks, `.` and `..` resolved.
///
/// The longest existing ancestor is canonicalized and the missing tail is
/// appended as is. A `..` below a missing directory cannot be resolved and
/// is reported as an error.
fn resolve(path: &Path) -> std::io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut existing = absolute.as_path();
    let mut tail = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                existing = parent;
            }
            _ => break,
        }
    }

    let mut resolved = existing.canonicalize()?;
    for name in tail.into_iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}

/// True when `archive_path` would land inside `base` once both are resolved
fn is_inside(base: &Path, archive_path: &Path) -> std::io::Result<bool> {
    if archive_path.starts_with(base) {
        return Ok(true);
    }
    Ok(resolve(archive_path)?.starts_with(resolve(base)?))
}

/// Every regular file below `base`, in a stable order
fn collect_files(base: &Path) -> Vec<PathBuf> {
    if !base.is_dir() {
        return Vec::new();
    }
    WalkDir::new(base)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect()
}

/// Zip entry name: path relative to `base`, `/`-separated
fn entry_name(base: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

fn write_zip(base: &Path, files: &[PathBuf], archive_path: &Path) -> Result<(), ArchiveError> {
    if let Some(parent) = archive_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(archive_path)?;
    let mut zip = zip::ZipWriter::new(BufWriter::new(file));
    let options = zip::write::FileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    for path in files {
        let Some(name) = entry_name(base, path) else {
            continue;
        };
        zip.start_file(name, options)?;
        let mut source = File::open(path)?;
        std::io::copy(&mut source, &mut zip)?;
    }

    let mut writer = zip.finish()?;
    writer.flush()?;
    Ok(())
}

/// Package `base` into a zip at `archive_path`, then delete `base` and clear `store`
pub async fn archive_results(
    base: &Path,
    archive_path: &Path,
    store: &dyn DedupStore,
) -> Result<ArchiveOutcome, ArchiveError> {
    if is_inside(base, archive_path)? {
        return Err(ArchiveError::InsideBase(archive_path.to_path_buf()));
    }

    let base_owned = base.to_path_buf();
    let target = archive_path.to_path_buf();
    let files = tokio::task::spawn_blocking(move || -> Result<Option<usize>, ArchiveError> {
        let files = collect_files(&base_owned);
        if files.is_empty() {
            return Ok(None);
        }
        write_zip(&base_owned, &files, &target)?;
        Ok(Some(files.len()))
    })
    .await
    .map_err(|e| ArchiveError::Task(e.to_string()))??;

    let Some(files) = files else {
        info!("Nothing to archive under {}", base.display());
        return Ok(ArchiveOutcome::NotFound);
    };

    // Never reset shared state unless the zip survived the tree removal
    tokio::fs::remove_dir_all(base).await?;
    if !archive_path.is_file() {
        return Err(ArchiveError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("archive {} missing after removing the output tree", archive_path.display()),
        )));
    }
    store.clear().await?;
    info!(
        "Archived {} files from {} into {}",
        files,
        base.display(),
        archive_path.display()
    );

    Ok(ArchiveOutcome::Archived {
        path: archive_path.to_path_buf(),
        files,
    })
}
