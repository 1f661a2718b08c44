//! rastertile CLI - exercise the block-cached rasterizer.
//!
//! Builds a synthetic source image, wraps it in a block view and rasterizes
//! it a number of times, reporting timings and cache statistics.

mod error;
mod run;

use std::path::PathBuf;

use clap::Parser;
use rastertile::config::{self, RasterConfig};
use rastertile::logging::init_logging;
use rastertile::BlockSize;
use tracing::info;

use crate::error::CliError;

#[derive(Parser, Debug)]
#[command(name = "rastertile")]
#[command(version = rastertile::VERSION)]
#[command(about = "Rasterize a synthetic image through the block cache", long_about = None)]
struct Args {
    /// Image width in pixels
    #[arg(long, default_value = "4096")]
    width: i32,

    /// Image height in pixels
    #[arg(long, default_value = "4096")]
    height: i32,

    /// Number of planes (channels)
    #[arg(long, default_value = "1")]
    planes: i32,

    /// Block size as WIDTHxHEIGHT (0x0 picks one automatically)
    #[arg(long, value_parser = parse_block_size)]
    block_size: Option<BlockSize>,

    /// Worker threads (0 or 1 runs on the calling thread)
    #[arg(long)]
    threads: Option<usize>,

    /// Cache budget, e.g. 256MB or 2GB
    #[arg(long, value_parser = parse_cache_size)]
    cache_size: Option<usize>,

    /// Rasterize without a cache
    #[arg(long)]
    no_cache: bool,

    /// Number of full-image passes
    #[arg(long, default_value = "2")]
    passes: usize,

    /// Configuration file (default: ~/.rastertile/config.ini)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_block_size(value: &str) -> Result<BlockSize, String> {
    config::parse_block_size(value)
        .ok_or_else(|| format!("expected WIDTHxHEIGHT like 256x256, got '{}'", value))
}

fn parse_cache_size(value: &str) -> Result<usize, String> {
    match config::parse_size(value) {
        Ok(0) => Err("cache size must be greater than zero".to_string()),
        Ok(size) => Ok(size),
        Err(e) => Err(e.to_string()),
    }
}

/// Overlay command-line options on the loaded configuration.
fn apply_overrides(config: &mut RasterConfig, args: &Args) {
    if let Some(size) = args.block_size {
        config.raster.block_cols = size.width;
        config.raster.block_rows = size.height;
    }
    if let Some(threads) = args.threads {
        config.raster.threads = threads;
    }
    if let Some(size) = args.cache_size {
        config.cache.max_size = size;
    }
}

fn main() {
    let args = Args::parse();
    if let Err(e) = execute(args) {
        e.exit();
    }
}

fn execute(args: Args) -> Result<(), CliError> {
    let level = if args.verbose { "debug" } else { "info" };
    let _logging_guard = init_logging(level, args.log_file.as_deref())
        .map_err(|e| CliError::LoggingInit(e.to_string()))?;

    info!("rastertile v{}", rastertile::VERSION);

    let mut config = match &args.config {
        Some(path) => RasterConfig::load_from(path)?,
        None => RasterConfig::load()?,
    };
    apply_overrides(&mut config, &args);

    if args.width <= 0 || args.height <= 0 || args.planes <= 0 {
        return Err(CliError::InvalidArgument(format!(
            "image extents must be positive, got {}x{}x{}",
            args.width, args.height, args.planes
        )));
    }

    let options = run::RunOptions {
        cols: args.width,
        rows: args.height,
        planes: args.planes,
        passes: args.passes,
        cached: !args.no_cache,
    };
    let report = run::run(&config, &options)?;
    println!("{}", report);
    Ok(())
}
