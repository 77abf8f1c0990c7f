//! Configuration for imgharvest

mod backend;
mod crawl;
mod download;
mod logging;
mod sweep;

pub use backend::{BackendConfig, BackendKind};
pub use crawl::CrawlConfig;
pub use download::DownloadConfig;
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use sweep::SweepConfig;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default user agent for page and image requests (a desktop browser)
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Default config file name
pub const DEFAULT_CONFIG_FILE: &str = "imgharvest.toml";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Crawl configuration
    #[serde(default)]
    pub crawl: CrawlConfig,
    /// Download worker configuration
    #[serde(default)]
    pub download: DownloadConfig,
    /// Dedup store and task queue backend
    #[serde(default)]
    pub backend: BackendConfig,
    /// Duplicate sweep configuration
    #[serde(default)]
    pub sweep: SweepConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("Invalid config file '{}'", path.display()))?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Fetch settings: page limits from `[crawl]`, image limits from `[download]`
    pub fn fetch_config(&self) -> crate::scraping::FetchConfig {
        crate::scraping::FetchConfig {
            image_timeout: self.download.image_timeout(),
            max_image_size: self.download.max_image_bytes,
            ..self.crawl.fetch_config()
        }
    }

    /// Serialize to TOML (used by `init`)
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Validate all configuration fields.
    ///
    /// Collects all validation errors and reports them together.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        // Crawl validation
        match url::Url::parse(&self.crawl.search_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => errors.push(format!(
                "search_url must be http or https, got scheme '{}'",
                url.scheme()
            )),
            Err(e) => errors.push(format!("search_url is not a valid URL: {}", e)),
        }
        if self.crawl.search_params.contains_key("q") {
            errors.push("search_params must not set 'q' (it carries the keyword)".to_string());
        }
        if self.crawl.page_timeout_secs == 0 {
            errors.push("page_timeout_secs must be positive".to_string());
        }
        if self.crawl.connect_timeout_secs == 0 {
            errors.push("connect_timeout_secs must be positive".to_string());
        }
        if self.crawl.user_agent.trim().is_empty() {
            errors.push("user_agent must not be empty".to_string());
        }
        if self.crawl.max_page_bytes == 0 {
            errors.push("max_page_bytes must be positive".to_string());
        }
        if self.crawl.max_pages == Some(0) {
            errors.push("max_pages must be positive when set".to_string());
        }
        if self.crawl.idle_wait_ms == 0 {
            errors.push("idle_wait_ms must be positive".to_string());
        }

        // Download validation
        if self.download.base_path.as_os_str().is_empty() {
            errors.push("base_path must not be empty".to_string());
        }
        if self.download.timeout_secs == 0 {
            errors.push("download timeout_secs must be positive".to_string());
        }
        if self.download.workers == 0 {
            errors.push("workers must be positive".to_string());
        }
        if self.download.workers > 256 {
            errors.push("workers must be <= 256".to_string());
        }
        if !self.download.svg_dpi.is_finite() || self.download.svg_dpi <= 0.0 {
            errors.push("svg_dpi must be positive".to_string());
        }
        if self.download.max_image_bytes == 0 {
            errors.push("max_image_bytes must be positive".to_string());
        }
        if self.download.queue_wait_secs == 0 {
            errors.push("queue_wait_secs must be positive".to_string());
        }

        // Backend validation
        if self.backend.kind == BackendKind::Redis {
            if !self.backend.redis_url.starts_with("redis://")
                && !self.backend.redis_url.starts_with("rediss://")
            {
                errors.push(format!(
                    "redis_url must start with redis:// or rediss://, got '{}'",
                    self.backend.redis_url
                ));
            }
            if self.backend.key_prefix.is_empty() {
                errors.push("key_prefix must not be empty".to_string());
            }
        }

        // Sweep validation
        if self.sweep.enabled && self.sweep.interval_secs == 0 {
            errors.push("sweep interval_secs must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }
}
