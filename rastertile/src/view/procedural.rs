//! Closure-backed views.

use std::fmt;
use std::marker::PhantomData;

use crate::error::RasterError;
use crate::geom::BoundingBox;
use crate::view::{Pixel, View};

/// A view whose pixels are computed by a closure on every access.
///
/// Useful as a synthetic source and as a stand-in for external producers
/// (decoders, filters) that only need to answer `f(x, y, plane)`.
pub struct ProceduralView<P, F> {
    cols: i32,
    rows: i32,
    planes: i32,
    func: F,
    _pixel: PhantomData<fn() -> P>,
}

impl<P, F> ProceduralView<P, F>
where
    P: Pixel,
    F: Fn(i32, i32, i32) -> Result<P, RasterError>,
{
    /// Create a view from a fallible pixel function.
    pub fn try_from_fn(cols: i32, rows: i32, planes: i32, func: F) -> Self {
        Self {
            cols: cols.max(0),
            rows: rows.max(0),
            planes: planes.max(0),
            func,
            _pixel: PhantomData,
        }
    }
}

impl<P: Pixel> ProceduralView<P, ()> {
    /// Create a view from an infallible pixel function.
    pub fn from_fn<G>(
        cols: i32,
        rows: i32,
        planes: i32,
        func: G,
    ) -> ProceduralView<P, impl Fn(i32, i32, i32) -> Result<P, RasterError> + Send + Sync>
    where
        G: Fn(i32, i32, i32) -> P + Send + Sync,
    {
        ProceduralView::try_from_fn(cols, rows, planes, move |x, y, p| Ok(func(x, y, p)))
    }
}

impl<P, F> View for ProceduralView<P, F>
where
    P: Pixel,
    F: Fn(i32, i32, i32) -> Result<P, RasterError>,
{
    type Pixel = P;
    type Prerasterized<'a>
        = &'a Self
    where
        Self: 'a;

    fn cols(&self) -> i32 {
        self.cols
    }

    fn rows(&self) -> i32 {
        self.rows
    }

    fn planes(&self) -> i32 {
        self.planes
    }

    fn pixel(&self, x: i32, y: i32, plane: i32) -> Result<P, RasterError> {
        if x < 0 || y < 0 || plane < 0 || x >= self.cols || y >= self.rows || plane >= self.planes
        {
            return Err(RasterError::PixelOutOfRange {
                x,
                y,
                plane,
                cols: self.cols,
                rows: self.rows,
                planes: self.planes,
            });
        }
        (self.func)(x, y, plane)
    }

    fn prerasterize(&self, _bbox: BoundingBox) -> Result<&Self, RasterError> {
        Ok(self)
    }
}

impl<P, F> fmt::Debug for ProceduralView<P, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProceduralView")
            .field("cols", &self.cols)
            .field("rows", &self.rows)
            .field("planes", &self.planes)
            .finish_non_exhaustive()
    }
}
