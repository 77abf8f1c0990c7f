use std::collections::BTreeMap;

use anyhow::Result;
use imgharvest::{config::Config, Backends};

/// Files per keyword partition on disk
fn partition_counts(config: &Config) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for entry in walkdir::WalkDir::new(&config.download.base_path)
        .min_depth(2)
        .max_depth(2)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let partition = entry
            .path()
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        *counts.entry(partition).or_insert(0) += 1;
    }
    counts
}

pub async fn show_stats(config: Config) -> Result<()> {
    let backends = Backends::open(&config.backend).await?;
    let counters = backends.store.counters().await?;

    println!("\nimgharvest Statistics:");
    println!("======================");
    println!("Backend: {}", backends.store.name());
    println!("Crawled links: {}", counters.crawled_links);
    println!("Saved images: {}", counters.saved_images);
    println!("Known image hashes: {}", backends.store.record_count().await?);
    println!("Pending download jobs: {}", backends.queue.len().await?);
    println!("Output directory: {}", config.download.base_path.display());

    let counts = partition_counts(&config);
    if counts.is_empty() {
        println!("No images on disk");
    } else {
        for (partition, files) in counts {
            println!("  {}: {} files", partition, files);
        }
    }
    Ok(())
}
