use std::path::PathBuf;

use anyhow::{Context, Result};
use imgharvest::config::Config;

/// Write a default configuration file
pub async fn init_config(path: PathBuf, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let content = format!("# imgharvest configuration\n\n{}", Config::default().to_toml()?);
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Created configuration at {}", path.display());
    println!("\nNext steps:");
    println!("  imgharvest run -k cat -k dog");
    println!("  imgharvest stats");
    Ok(())
}
