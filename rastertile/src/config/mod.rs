//! Engine configuration.
//!
//! Settings come from `~/.rastertile/config.ini` layered over built-in
//! defaults. Nothing here is global: callers load a [`RasterConfig`] and
//! build the shared cache from it explicitly.
//!
//! ```
//! use rastertile::config::RasterConfig;
//!
//! let config = RasterConfig::default();
//! let cache = config.build_cache().unwrap();
//! assert_eq!(cache.max_size(), config.cache.max_size);
//! ```

mod file;
mod parser;
mod settings;
mod size;

pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{default_threads, CacheSettings, RasterConfig, RasterSettings};
pub use size::{format_size, parse_size, SizeParseError};

/// Parse a block size written as `WxH` or a single side length.
pub fn parse_block_size(value: &str) -> Option<crate::geom::BlockSize> {
    parser::parse_block_size(value).map(|(w, h)| crate::geom::BlockSize::new(w, h))
}
