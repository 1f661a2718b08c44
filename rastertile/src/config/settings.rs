//! Configuration values and their defaults.

use std::thread;

use crate::cache::{Cache, CacheError, DEFAULT_CACHE_SIZE};
use crate::geom::BlockSize;

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RasterConfig {
    pub cache: CacheSettings,
    pub raster: RasterSettings,
}

/// `[cache]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// Resident budget in bytes
    pub max_size: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_CACHE_SIZE,
        }
    }
}

/// `[raster]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterSettings {
    /// Block width in pixels; 0 picks a default from the image shape
    pub block_cols: i32,
    /// Block height in pixels; 0 picks a default from the image shape
    pub block_rows: i32,
    /// Worker threads; 0 or 1 rasterizes on the calling thread
    pub threads: usize,
}

impl Default for RasterSettings {
    fn default() -> Self {
        Self {
            block_cols: 0,
            block_rows: 0,
            threads: default_threads(),
        }
    }
}

impl RasterSettings {
    pub fn block_size(&self) -> BlockSize {
        BlockSize::new(self.block_cols, self.block_rows)
    }
}

/// Number of hardware threads, or 1 when it cannot be determined.
pub fn default_threads() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl RasterConfig {
    /// Build the shared block cache described by `[cache]`.
    pub fn build_cache(&self) -> Result<Cache, CacheError> {
        Cache::new(self.cache.max_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RasterConfig::default();
        assert_eq!(config.cache.max_size, 1024 * 1024 * 1024);
        assert!(config.raster.block_size().is_auto());
        assert!(config.raster.threads >= 1);
    }

    #[test]
    fn test_build_cache() {
        let mut config = RasterConfig::default();
        config.cache.max_size = 4096;
        let cache = config.build_cache().unwrap();
        assert_eq!(cache.max_size(), 4096);

        config.cache.max_size = 0;
        assert!(config.build_cache().is_err());
    }
}
