//! Shared-state backend configuration

use serde::{Deserialize, Serialize};

/// Where the dedup store and task queue live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process; crawl and workers must share one process
    Memory,
    /// Redis; crawl and worker processes may run anywhere
    Redis,
}

/// Backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// Redis connection URL
    pub redis_url: String,
    /// Prefix for every Redis key
    pub key_prefix: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "imgharvest".to_string(),
        }
    }
}
