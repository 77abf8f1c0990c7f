use std::path::PathBuf;

use anyhow::Result;
use chrono::Local;
use imgharvest::{
    archive::{archive_results, ArchiveOutcome},
    config::Config,
    Backends,
};

/// Zip the output tree, then delete it and reset the dedup store
pub async fn archive(config: Config, output: Option<PathBuf>) -> Result<()> {
    let backends = Backends::open(&config.backend).await?;
    let output = output.unwrap_or_else(|| {
        PathBuf::from(format!("imgharvest_{}.zip", Local::now().format("%Y%m%d_%H%M%S")))
    });

    match archive_results(&config.download.base_path, &output, backends.store.as_ref()).await? {
        ArchiveOutcome::NotFound => {
            println!("No images found under {}", config.download.base_path.display());
        }
        ArchiveOutcome::Archived { path, files } => {
            println!("Archived {} images to {}", files, path.display());
        }
    }
    Ok(())
}
