//! imgharvest: keyword-driven image crawler
//!
//! Crawls pages reachable from search-engine seed URLs, picks out images
//! whose alt text, title or file name contains one of the requested
//! keywords, and downloads them into one directory per keyword:
//! - Frontier crawl on an isolated thread, stopped cooperatively
//! - Download workers fed by a task queue (in-process or Redis)
//! - Content-hash deduplication shared by every worker and process
//! - Size and format validation of every saved image
//! - Periodic duplicate sweep and zip archiving of the output tree

pub mod archive;
pub mod backend;
pub mod config;
pub mod controller;
pub mod download;
pub mod queue;
pub mod scraping;
pub mod store;
pub mod sweep;
pub mod types;

pub use backend::Backends;
pub use config::Config;
pub use controller::{ControllerError, ControllerState, CrawlController};
pub use types::*;
