//! Download worker and output tree configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::download::ImageValidator;

/// Download worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Root of the keyword-partitioned output tree
    pub base_path: PathBuf,
    /// Image request timeout (seconds)
    pub timeout_secs: u64,
    /// Number of concurrent workers
    pub workers: usize,
    /// Width and height must both exceed this (pixels)
    pub min_dimension: u32,
    /// Resolution used to convert SVG lengths to pixels
    pub svg_dpi: f64,
    /// Maximum image size (bytes)
    pub max_image_bytes: usize,
    /// How long a worker blocks on an empty queue before re-checking shutdown (seconds)
    pub queue_wait_secs: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("parsed_images"),
            timeout_secs: 5,
            workers: 4,
            min_dimension: 240,
            svg_dpi: 96.0,
            max_image_bytes: 20 * 1024 * 1024,
            queue_wait_secs: 1,
        }
    }
}

impl DownloadConfig {
    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn queue_wait(&self) -> Duration {
        Duration::from_secs(self.queue_wait_secs)
    }

    pub fn validator(&self) -> ImageValidator {
        ImageValidator::new(self.min_dimension, self.svg_dpi)
    }
}
