//! Error types for lazy rasterization.
//!
//! Every fallible engine operation returns [`RasterError`]. Failures raised by
//! a wrapped source view travel through [`RasterError::Source`] untouched, so
//! a failed block surfaces to the caller of the region or pixel request that
//! needed it.

use thiserror::Error;

use crate::geom::BoundingBox;

/// Boxed error produced by a source view outside this crate.
pub type SourceError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while rasterizing a view.
#[derive(Debug, Error)]
pub enum RasterError {
    /// Block indices fell outside the block table.
    #[error("Block indices out of bounds: ({ix},{iy}) of ({table_width},{table_height})")]
    BlockOutOfRange {
        ix: i32,
        iy: i32,
        table_width: i32,
        table_height: i32,
    },

    /// A pixel coordinate fell outside the view.
    #[error("Pixel ({x},{y},{plane}) is outside a {cols}x{rows}x{planes} view")]
    PixelOutOfRange {
        x: i32,
        y: i32,
        plane: i32,
        cols: i32,
        rows: i32,
        planes: i32,
    },

    /// Source and destination extents disagree.
    #[error("Source and destination must have same dimensions: expected {expected_cols}x{expected_rows}x{expected_planes}, destination is {cols}x{rows}x{planes}")]
    DimensionMismatch {
        expected_cols: i32,
        expected_rows: i32,
        expected_planes: i32,
        cols: i32,
        rows: i32,
        planes: i32,
    },

    /// Any other invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A dispatched sub-task covered more than one cache block.
    #[error("Region {0:?} spans more than one cache block")]
    SpansMultipleBlocks(BoundingBox),

    /// A worker thread panicked while processing a block.
    #[error("Worker panicked while processing block {bbox:?}: {message}")]
    WorkerPanicked { bbox: BoundingBox, message: String },

    /// Generation panicked inside the cache.
    #[error("Block generation panicked: {0}")]
    GenerationPanicked(String),

    /// Failure reported by the wrapped source view.
    #[error("Source view failed: {0}")]
    Source(#[source] SourceError),
}

impl RasterError {
    /// Wrap an arbitrary source-view failure.
    pub fn source<E>(err: E) -> Self
    where
        E: Into<SourceError>,
    {
        RasterError::Source(err.into())
    }

    /// Returns true for errors caused by bad arguments rather than failures.
    pub fn is_argument_error(&self) -> bool {
        matches!(
            self,
            RasterError::BlockOutOfRange { .. }
                | RasterError::PixelOutOfRange { .. }
                | RasterError::DimensionMismatch { .. }
                | RasterError::InvalidArgument(_)
        )
    }

    /// Returns true for programming-invariant violations.
    pub fn is_logic_error(&self) -> bool {
        matches!(self, RasterError::SpansMultipleBlocks(_))
    }
}

/// Render a panic payload as text.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
