//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::process;

use rastertile::config::ConfigFileError;
use rastertile::{CacheError, RasterError};

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration file could not be loaded
    Config(ConfigFileError),
    /// Invalid command-line value
    InvalidArgument(String),
    /// Cache could not be created
    Cache(CacheError),
    /// Rasterization failed
    Raster(RasterError),
    /// Rasterized output differs from direct evaluation
    Verification { mismatches: usize },
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        if let CliError::Config(ConfigFileError::InvalidValue { .. }) = self {
            eprintln!();
            eprintln!(
                "Check {} or pass --config with a different file.",
                rastertile::config::config_file_path().display()
            );
        }

        process::exit(match self {
            CliError::InvalidArgument(_) => 2,
            _ => 1,
        })
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            CliError::Cache(e) => write!(f, "Failed to create cache: {}", e),
            CliError::Raster(e) => write!(f, "Rasterization failed: {}", e),
            CliError::Verification { mismatches } => {
                write!(f, "Verification failed: {} pixels differ", mismatches)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Cache(e) => Some(e),
            CliError::Raster(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e)
    }
}

impl From<CacheError> for CliError {
    fn from(e: CacheError) -> Self {
        CliError::Cache(e)
    }
}

impl From<RasterError> for CliError {
    fn from(e: RasterError) -> Self {
        CliError::Raster(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = CliError::Verification { mismatches: 3 };
        assert_eq!(err.to_string(), "Verification failed: 3 pixels differ");

        let err: CliError = CacheError::InvalidConfig("zero".to_string()).into();
        assert_eq!(
            err.to_string(),
            "Failed to create cache: Invalid cache configuration: zero"
        );
    }

    #[test]
    fn test_source_chain() {
        use std::error::Error;
        let err: CliError = RasterError::InvalidArgument("bad".to_string()).into();
        assert!(err.source().is_some());
        assert!(CliError::LoggingInit("x".to_string()).source().is_none());
    }
}
