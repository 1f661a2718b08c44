//! The lazy view protocol and the default rasterization loop.
//!
//! A [`View`] is a pull-based image: it reports its extents and produces pixel
//! values on demand. Nothing is computed until a consumer asks for a pixel or
//! rasterizes a region into a [`ViewMut`] destination.
//!
//! # Referential transparency
//!
//! For every region, `rasterize(dest, bbox)` must write exactly the values
//! that per-pixel evaluation of the same view returns. Block caching relies on
//! this: a cached block is only a faster route to the same answer.
//!
//! # Prerasterize
//!
//! [`View::prerasterize`] lets a view substitute a cheaper representation of
//! a region (a cached buffer, a precomputed crop) without the caller knowing.
//! The returned view keeps the original coordinate system: asking it for
//! pixels inside the requested bbox gives the same answers as the original.
//!
//! ```text
//!   consumer ──► BlockRasterizeView ──► Cache ──► BlockGenerator ──► child view
//!                 (block grid)          (LRU)      (one per block)
//! ```

mod accessor;
mod block;
mod procedural;

pub use accessor::PixelAccessor;
pub use block::{
    block_cache, block_rasterize, default_block_size, BlockGenerator, BlockRasterizeView,
    DEFAULT_BLOCK_BYTES,
};
pub use procedural::ProceduralView;

use std::sync::Arc;

use crate::error::RasterError;
use crate::geom::BoundingBox;
use crate::image::TileMut;

/// Value type stored in a view.
///
/// Channel semantics are owned by the caller; the engine only moves values.
pub trait Pixel: Copy + Default + Send + Sync + 'static {}

impl<T: Copy + Default + Send + Sync + 'static> Pixel for T {}

/// A lazy, pull-based image.
pub trait View {
    /// Pixel type produced by this view.
    type Pixel: Pixel;

    /// View returned by [`View::prerasterize`].
    type Prerasterized<'a>: View<Pixel = Self::Pixel>
    where
        Self: 'a;

    fn cols(&self) -> i32;

    fn rows(&self) -> i32;

    fn planes(&self) -> i32;

    /// Evaluate a single pixel.
    fn pixel(&self, x: i32, y: i32, plane: i32) -> Result<Self::Pixel, RasterError>;

    /// Return a view that evaluates identically to `self` over `bbox`.
    fn prerasterize(&self, bbox: BoundingBox) -> Result<Self::Prerasterized<'_>, RasterError>;

    /// Full extent of the view.
    fn bounds(&self) -> BoundingBox {
        BoundingBox::from_extent(self.cols(), self.rows())
    }

    /// Accessor positioned at `(0, 0, 0)`.
    fn origin(&self) -> PixelAccessor<'_, Self>
    where
        Self: Sized,
    {
        PixelAccessor::new(self)
    }

    /// Write the pixels of `bbox` into `dest`.
    ///
    /// The default prerasterizes the region and runs the pixel loop over the
    /// result.
    fn rasterize<D>(&self, dest: &mut D, bbox: BoundingBox) -> Result<(), RasterError>
    where
        Self: Sized,
        D: ViewMut + ?Sized,
        D::Pixel: From<Self::Pixel>,
    {
        let src = self.prerasterize(bbox)?;
        rasterize(&src, dest, bbox)
    }
}

/// A writable rasterization destination.
pub trait ViewMut {
    type Pixel: Pixel;

    fn cols(&self) -> i32;

    fn rows(&self) -> i32;

    fn planes(&self) -> i32;

    /// Store a pixel. Coordinates are local to the destination.
    fn set_pixel(&mut self, x: i32, y: i32, plane: i32, value: Self::Pixel);

    /// Resize to the given extents if this destination supports it.
    ///
    /// Returns `false` for fixed-size destinations, which must already match.
    fn try_resize(&mut self, _cols: i32, _rows: i32, _planes: i32) -> bool {
        false
    }

    /// Split into disjoint writable tiles along the given local spans.
    ///
    /// Returns `None` when the destination cannot be split, in which case
    /// block views rasterize through an intermediate buffer.
    fn split_tiles(
        &mut self,
        _col_spans: &[(i32, i32)],
        _row_spans: &[(i32, i32)],
    ) -> Option<Vec<TileMut<'_, Self::Pixel>>> {
        None
    }
}

/// Copy `bbox` of `src` into `dest` one pixel at a time.
///
/// Walks planes, then rows, then columns, converting each source pixel into
/// the destination pixel type. Resizable destinations are resized to the bbox
/// first; fixed-size destinations must match it exactly.
pub fn rasterize<S, D>(src: &S, dest: &mut D, bbox: BoundingBox) -> Result<(), RasterError>
where
    S: View,
    D: ViewMut + ?Sized,
    D::Pixel: From<S::Pixel>,
{
    let planes = src.planes();
    let resized = dest.try_resize(bbox.width(), bbox.height(), planes);
    if !resized
        && (dest.cols() != bbox.width() || dest.rows() != bbox.height() || dest.planes() != planes)
    {
        return Err(RasterError::DimensionMismatch {
            expected_cols: bbox.width(),
            expected_rows: bbox.height(),
            expected_planes: planes,
            cols: dest.cols(),
            rows: dest.rows(),
            planes: dest.planes(),
        });
    }

    let mut splane = src.origin().advance(bbox.min.x, bbox.min.y);
    for plane in 0..planes {
        let mut srow = splane;
        for row in 0..bbox.height() {
            let mut scol = srow;
            for col in 0..bbox.width() {
                dest.set_pixel(col, row, plane, D::Pixel::from(scol.get()?));
                scol.next_col();
            }
            srow.next_row();
        }
        splane.next_plane();
    }
    Ok(())
}

/// Rasterize the whole of `src` into `dest`.
pub fn rasterize_full<S, D>(src: &S, dest: &mut D) -> Result<(), RasterError>
where
    S: View,
    D: ViewMut + ?Sized,
    D::Pixel: From<S::Pixel>,
{
    src.rasterize(dest, src.bounds())
}

/// Apply `f` to every pixel in plane, row, column order.
pub fn for_each_pixel<V, F>(view: &V, mut f: F) -> Result<(), RasterError>
where
    V: View,
    F: FnMut(V::Pixel),
{
    let mut plane_acc = view.origin();
    for _ in 0..view.planes() {
        let mut row_acc = plane_acc;
        for _ in 0..view.rows() {
            let mut col_acc = row_acc;
            for _ in 0..view.cols() {
                f(col_acc.get()?);
                col_acc.next_col();
            }
            row_acc.next_row();
        }
        plane_acc.next_plane();
    }
    Ok(())
}

/// Apply `f` to corresponding pixels of two views in plane, row, column order.
///
/// Both views must have the same extents.
pub fn for_each_pixel2<A, B, F>(a: &A, b: &B, mut f: F) -> Result<(), RasterError>
where
    A: View,
    B: View,
    F: FnMut(A::Pixel, B::Pixel),
{
    check_same_extents(a, b)?;
    let (mut a_plane, mut b_plane) = (a.origin(), b.origin());
    for _ in 0..a.planes() {
        let (mut a_row, mut b_row) = (a_plane, b_plane);
        for _ in 0..a.rows() {
            let (mut a_col, mut b_col) = (a_row, b_row);
            for _ in 0..a.cols() {
                f(a_col.get()?, b_col.get()?);
                a_col.next_col();
                b_col.next_col();
            }
            a_row.next_row();
            b_row.next_row();
        }
        a_plane.next_plane();
        b_plane.next_plane();
    }
    Ok(())
}

/// Compare two views pixel by pixel.
///
/// Views with different extents are never equal.
pub fn views_equal<A, B>(a: &A, b: &B) -> Result<bool, RasterError>
where
    A: View,
    B: View,
    A::Pixel: PartialEq<B::Pixel>,
{
    views_equal_by(a, b, |pa, pb| pa == pb)
}

/// Compare two views with `pred`, stopping at the first pair it rejects.
///
/// Views with different extents are never equal.
pub fn views_equal_by<A, B, F>(a: &A, b: &B, mut pred: F) -> Result<bool, RasterError>
where
    A: View,
    B: View,
    F: FnMut(&A::Pixel, &B::Pixel) -> bool,
{
    if check_same_extents(a, b).is_err() {
        return Ok(false);
    }
    for plane in 0..a.planes() {
        for y in 0..a.rows() {
            for x in 0..a.cols() {
                if !pred(&a.pixel(x, y, plane)?, &b.pixel(x, y, plane)?) {
                    return Ok(false);
                }
            }
        }
    }
    Ok(true)
}

fn check_same_extents<A: View, B: View>(a: &A, b: &B) -> Result<(), RasterError> {
    if a.cols() == b.cols() && a.rows() == b.rows() && a.planes() == b.planes() {
        return Ok(());
    }
    Err(RasterError::DimensionMismatch {
        expected_cols: a.cols(),
        expected_rows: a.rows(),
        expected_planes: a.planes(),
        cols: b.cols(),
        rows: b.rows(),
        planes: b.planes(),
    })
}

impl<V: View> View for &V {
    type Pixel = V::Pixel;
    type Prerasterized<'a>
        = V::Prerasterized<'a>
    where
        Self: 'a;

    fn cols(&self) -> i32 {
        (**self).cols()
    }

    fn rows(&self) -> i32 {
        (**self).rows()
    }

    fn planes(&self) -> i32 {
        (**self).planes()
    }

    fn pixel(&self, x: i32, y: i32, plane: i32) -> Result<Self::Pixel, RasterError> {
        (**self).pixel(x, y, plane)
    }

    fn prerasterize(&self, bbox: BoundingBox) -> Result<Self::Prerasterized<'_>, RasterError> {
        (**self).prerasterize(bbox)
    }

    fn rasterize<D>(&self, dest: &mut D, bbox: BoundingBox) -> Result<(), RasterError>
    where
        D: ViewMut + ?Sized,
        D::Pixel: From<Self::Pixel>,
    {
        (**self).rasterize(dest, bbox)
    }
}

impl<V: View> View for Arc<V> {
    type Pixel = V::Pixel;
    type Prerasterized<'a>
        = V::Prerasterized<'a>
    where
        Self: 'a;

    fn cols(&self) -> i32 {
        (**self).cols()
    }

    fn rows(&self) -> i32 {
        (**self).rows()
    }

    fn planes(&self) -> i32 {
        (**self).planes()
    }

    fn pixel(&self, x: i32, y: i32, plane: i32) -> Result<Self::Pixel, RasterError> {
        (**self).pixel(x, y, plane)
    }

    fn prerasterize(&self, bbox: BoundingBox) -> Result<Self::Prerasterized<'_>, RasterError> {
        (**self).prerasterize(bbox)
    }

    fn rasterize<D>(&self, dest: &mut D, bbox: BoundingBox) -> Result<(), RasterError>
    where
        D: ViewMut + ?Sized,
        D::Pixel: From<Self::Pixel>,
    {
        (**self).rasterize(dest, bbox)
    }
}
