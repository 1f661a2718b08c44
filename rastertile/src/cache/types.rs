//! Cache configuration and error types.

use thiserror::Error;

/// Default resident budget when none is configured (1 GiB).
pub const DEFAULT_CACHE_SIZE: usize = 1024 * 1024 * 1024;

/// Cache-related errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    /// Invalid cache configuration
    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),
}

/// Validate a resident budget in bytes.
pub(crate) fn check_max_size(max_size: usize) -> Result<usize, CacheError> {
    if max_size == 0 {
        return Err(CacheError::InvalidConfig(
            "maximum cache size must be positive".to_string(),
        ));
    }
    Ok(max_size)
}
