//! The rasterization run behind the CLI.

use std::fmt;
use std::time::{Duration, Instant};

use rastertile::config::{format_size, RasterConfig};
use rastertile::{
    for_each_pixel2, rasterize_full, BlockRasterizeView, CacheStats, ImageBuffer, ProceduralView,
    View,
};
use tracing::{debug, info};

use crate::error::CliError;

/// What to rasterize.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub cols: i32,
    pub rows: i32,
    pub planes: i32,
    pub passes: usize,
    pub cached: bool,
}

/// Outcome of a run.
#[derive(Debug)]
pub struct RunReport {
    pub cols: i32,
    pub rows: i32,
    pub planes: i32,
    pub block_cols: i32,
    pub block_rows: i32,
    pub threads: usize,
    pub pass_times: Vec<Duration>,
    pub samples_checked: usize,
    pub stats: Option<CacheStats>,
}

/// Synthetic test pattern; cheap to evaluate and different in every plane.
pub fn pattern(x: i32, y: i32, plane: i32) -> u32 {
    let mut h = (x as u32).wrapping_mul(0x9E37_79B9) ^ (y as u32).wrapping_mul(0x85EB_CA6B);
    h ^= (plane as u32).wrapping_mul(0xC2B2_AE35);
    h ^ (h >> 15)
}

pub fn run(config: &RasterConfig, options: &RunOptions) -> Result<RunReport, CliError> {
    let source = ProceduralView::from_fn(options.cols, options.rows, options.planes, pattern);
    let cache = if options.cached {
        Some(config.build_cache()?)
    } else {
        None
    };
    let threads = config.raster.threads;
    let view = BlockRasterizeView::new(source, config.raster.block_size(), threads, cache.clone());
    let block_size = view.block_size();
    info!(
        cols = options.cols,
        rows = options.rows,
        planes = options.planes,
        block_size = %block_size,
        threads,
        cache = %cache.as_ref().map_or("disabled".to_string(), |c| format_size(c.max_size())),
        "starting rasterization"
    );

    let mut out = ImageBuffer::<u32>::new(0, 0, 0);
    let mut pass_times = Vec::with_capacity(options.passes);
    for pass in 0..options.passes {
        let start = Instant::now();
        rasterize_full(&view, &mut out)?;
        let elapsed = start.elapsed();
        info!(pass = pass + 1, elapsed_ms = elapsed.as_millis() as u64, "pass complete");
        pass_times.push(elapsed);
    }

    let samples_checked = check_samples(&view)?;
    if options.passes > 0 {
        let mismatches = count_mismatches(&out, view.child())?;
        if mismatches > 0 {
            return Err(CliError::Verification { mismatches });
        }
    }

    Ok(RunReport {
        cols: options.cols,
        rows: options.rows,
        planes: options.planes,
        block_cols: block_size.width,
        block_rows: block_size.height,
        threads,
        pass_times,
        samples_checked,
        stats: cache.map(|c| c.stats()),
    })
}

/// Compare single-pixel reads through the block view with direct evaluation.
fn check_samples<V>(view: &V) -> Result<usize, CliError>
where
    V: View<Pixel = u32>,
{
    let (cols, rows, planes) = (view.cols(), view.rows(), view.planes());
    let points = [
        (0, 0),
        (cols - 1, 0),
        (0, rows - 1),
        (cols - 1, rows - 1),
        (cols / 2, rows / 2),
        (cols / 3, (rows * 2) / 3),
    ];
    let mut mismatches = 0;
    for plane in 0..planes {
        for &(x, y) in &points {
            let got = view.pixel(x, y, plane)?;
            if got != pattern(x, y, plane) {
                debug!(x, y, plane, got, "sample mismatch");
                mismatches += 1;
            }
        }
    }
    if mismatches > 0 {
        return Err(CliError::Verification { mismatches });
    }
    Ok(points.len() * planes as usize)
}

/// Number of pixels where two equally sized views disagree.
fn count_mismatches<A, B>(a: &A, b: &B) -> Result<usize, CliError>
where
    A: View,
    B: View,
    A::Pixel: PartialEq<B::Pixel>,
{
    let mut mismatches = 0;
    for_each_pixel2(a, b, |pa, pb| {
        if pa != pb {
            mismatches += 1;
        }
    })?;
    Ok(mismatches)
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Image:        {}x{}x{}",
            self.cols, self.rows, self.planes
        )?;
        writeln!(f, "Block size:   {}x{}", self.block_cols, self.block_rows)?;
        writeln!(f, "Threads:      {}", self.threads)?;
        for (i, t) in self.pass_times.iter().enumerate() {
            writeln!(f, "Pass {}:       {:.1} ms", i + 1, t.as_secs_f64() * 1000.0)?;
        }
        write!(f, "Samples:      {} verified", self.samples_checked)?;
        if let Some(stats) = &self.stats {
            write!(f, "\n\n{}", stats)?;
        }
        Ok(())
    }
}
