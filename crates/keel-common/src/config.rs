//! Configuration structures for KeelDB.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a paged file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagerConfig {
    /// Maximum number of pages held in the LRU cache.
    pub max_cache_pages: usize,
    /// Interval between periodic background flushes.
    pub sync_period: Duration,
}

impl Default for PagerConfig {
    fn default() -> Self {
        Self {
            max_cache_pages: 128,
            sync_period: Duration::from_secs(10),
        }
    }
}

/// Configuration for a store instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding `data.db`, `index.db`, and the clean-shutdown marker.
    pub data_dir: PathBuf,
    /// Pager settings shared by the log and index files.
    pub pager: PagerConfig,
}

impl StoreConfig {
    /// Creates a config rooted at the given data directory with default
    /// pager settings.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            pager: PagerConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new("./keel_data")
    }
}
