//! Owned pixel storage and region views.
//!
//! - [`ImageBuffer`]: dense plane-major buffer; the value type of every cached
//!   block.
//! - [`ImageRegion`]: a buffer placed at an offset inside a larger image; the
//!   result of prerasterizing a block view.
//! - [`CropView`]: a lazy window into any view.
//! - [`TileMut`]: a writable rectangle of an `ImageBuffer`. A buffer can be
//!   split into disjoint tiles so that worker threads fill it concurrently
//!   without locking.

use crate::error::RasterError;
use crate::geom::{BoundingBox, Point};
use crate::view::{Pixel, View, ViewMut};

/// Dense image storage, plane-major then row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBuffer<P> {
    cols: i32,
    rows: i32,
    planes: i32,
    data: Vec<P>,
}

impl<P: Pixel> ImageBuffer<P> {
    /// Allocate a buffer filled with `P::default()`.
    pub fn new(cols: i32, rows: i32, planes: i32) -> Self {
        let (cols, rows, planes) = (cols.max(0), rows.max(0), planes.max(0));
        Self {
            cols,
            rows,
            planes,
            data: vec![P::default(); cols as usize * rows as usize * planes as usize],
        }
    }

    /// Allocate a buffer and fill it from `f(x, y, plane)`.
    pub fn from_fn<F>(cols: i32, rows: i32, planes: i32, mut f: F) -> Self
    where
        F: FnMut(i32, i32, i32) -> P,
    {
        let mut buf = Self::new(cols, rows, planes);
        for p in 0..buf.planes {
            for y in 0..buf.rows {
                for x in 0..buf.cols {
                    let i = buf.index(x, y, p);
                    buf.data[i] = f(x, y, p);
                }
            }
        }
        buf
    }

    /// Wrap existing plane-major data.
    pub fn from_vec(cols: i32, rows: i32, planes: i32, data: Vec<P>) -> Result<Self, RasterError> {
        if cols < 0 || rows < 0 || planes < 0 {
            return Err(RasterError::InvalidArgument(format!(
                "negative image extent {}x{}x{}",
                cols, rows, planes
            )));
        }
        let expected = cols as usize * rows as usize * planes as usize;
        if data.len() != expected {
            return Err(RasterError::InvalidArgument(format!(
                "buffer holds {} pixels, {}x{}x{} needs {}",
                data.len(),
                cols,
                rows,
                planes,
                expected
            )));
        }
        Ok(Self {
            cols,
            rows,
            planes,
            data,
        })
    }

    pub fn cols(&self) -> i32 {
        self.cols
    }

    pub fn rows(&self) -> i32 {
        self.rows
    }

    pub fn planes(&self) -> i32 {
        self.planes
    }

    /// Bytes occupied by the pixel data.
    pub fn size_bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<P>()
    }

    pub fn as_slice(&self) -> &[P] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<P> {
        self.data
    }

    /// Bounds-checked read.
    pub fn get(&self, x: i32, y: i32, plane: i32) -> Option<P> {
        if self.in_bounds(x, y, plane) {
            Some(self.data[self.index(x, y, plane)])
        } else {
            None
        }
    }

    /// Write a pixel. Out-of-range writes panic.
    pub fn set(&mut self, x: i32, y: i32, plane: i32, value: P) {
        assert!(
            self.in_bounds(x, y, plane),
            "pixel ({},{},{}) outside {}x{}x{} buffer",
            x,
            y,
            plane,
            self.cols,
            self.rows,
            self.planes
        );
        let i = self.index(x, y, plane);
        self.data[i] = value;
    }

    /// Reallocate to new extents, discarding contents when they change.
    pub fn set_size(&mut self, cols: i32, rows: i32, planes: i32) {
        if cols == self.cols && rows == self.rows && planes == self.planes {
            return;
        }
        *self = Self::new(cols, rows, planes);
    }

    /// Split the buffer into disjoint writable tiles.
    ///
    /// `col_spans` and `row_spans` are half-open ranges in buffer coordinates
    /// that must tile `[0, cols)` and `[0, rows)` contiguously. Tiles are
    /// returned in row-major grid order.
    pub fn tiles_mut(
        &mut self,
        col_spans: &[(i32, i32)],
        row_spans: &[(i32, i32)],
    ) -> Result<Vec<TileMut<'_, P>>, RasterError> {
        check_spans("column", col_spans, self.cols)?;
        check_spans("row", row_spans, self.rows)?;

        let planes = self.planes;
        let mut tiles: Vec<TileMut<'_, P>> = row_spans
            .iter()
            .flat_map(|&(y0, y1)| {
                col_spans.iter().map(move |&(x0, x1)| TileMut {
                    cols: x1 - x0,
                    rows: y1 - y0,
                    planes,
                    lines: Vec::with_capacity(((y1 - y0) * planes) as usize),
                })
            })
            .collect();

        if self.cols == 0 || self.rows == 0 {
            return Ok(tiles);
        }

        let grid_cols = col_spans.len();
        let mut band = 0;
        for (line_index, line) in self.data.chunks_mut(self.cols as usize).enumerate() {
            let y = (line_index % self.rows as usize) as i32;
            if y == 0 {
                band = 0;
            }
            while y >= row_spans[band].1 {
                band += 1;
            }
            let mut rest = line;
            for (bx, &(x0, x1)) in col_spans.iter().enumerate() {
                let (segment, tail) = std::mem::take(&mut rest).split_at_mut((x1 - x0) as usize);
                rest = tail;
                tiles[band * grid_cols + bx].lines.push(segment);
            }
        }
        Ok(tiles)
    }

    fn in_bounds(&self, x: i32, y: i32, plane: i32) -> bool {
        x >= 0 && y >= 0 && plane >= 0 && x < self.cols && y < self.rows && plane < self.planes
    }

    fn index(&self, x: i32, y: i32, plane: i32) -> usize {
        (plane as usize * self.rows as usize + y as usize) * self.cols as usize + x as usize
    }
}

fn check_spans(kind: &str, spans: &[(i32, i32)], extent: i32) -> Result<(), RasterError> {
    let mut expected = 0;
    for &(lo, hi) in spans {
        if lo != expected || hi <= lo {
            return Err(RasterError::InvalidArgument(format!(
                "{} spans must tile [0, {}) contiguously, found ({}, {})",
                kind, extent, lo, hi
            )));
        }
        expected = hi;
    }
    if expected != extent && !(spans.is_empty() && extent == 0) {
        return Err(RasterError::InvalidArgument(format!(
            "{} spans cover [0, {}) but the buffer is {} wide",
            kind, expected, extent
        )));
    }
    Ok(())
}

impl<P: Pixel> View for ImageBuffer<P> {
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
        self.get(x, y, plane).ok_or(RasterError::PixelOutOfRange {
            x,
            y,
            plane,
            cols: self.cols,
            rows: self.rows,
            planes: self.planes,
        })
    }

    fn prerasterize(&self, _bbox: BoundingBox) -> Result<&Self, RasterError> {
        Ok(self)
    }
}

impl<P: Pixel> ViewMut for ImageBuffer<P> {
    type Pixel = P;

    fn cols(&self) -> i32 {
        self.cols
    }

    fn rows(&self) -> i32 {
        self.rows
    }

    fn planes(&self) -> i32 {
        self.planes
    }

    fn set_pixel(&mut self, x: i32, y: i32, plane: i32, value: P) {
        self.set(x, y, plane, value);
    }

    fn try_resize(&mut self, cols: i32, rows: i32, planes: i32) -> bool {
        self.set_size(cols, rows, planes);
        true
    }

    fn split_tiles(
        &mut self,
        col_spans: &[(i32, i32)],
        row_spans: &[(i32, i32)],
    ) -> Option<Vec<TileMut<'_, P>>> {
        self.tiles_mut(col_spans, row_spans).ok()
    }
}

/// A writable rectangle borrowed from an [`ImageBuffer`].
#[derive(Debug)]
pub struct TileMut<'a, P> {
    cols: i32,
    rows: i32,
    planes: i32,
    /// One slice per (plane, row), plane-major.
    lines: Vec<&'a mut [P]>,
}

impl<P: Pixel> ViewMut for TileMut<'_, P> {
    type Pixel = P;

    fn cols(&self) -> i32 {
        self.cols
    }

    fn rows(&self) -> i32 {
        self.rows
    }

    fn planes(&self) -> i32 {
        self.planes
    }

    fn set_pixel(&mut self, x: i32, y: i32, plane: i32, value: P) {
        self.lines[(plane * self.rows + y) as usize][x as usize] = value;
    }
}

/// An owned buffer positioned at `origin` inside a larger image.
///
/// Reports the extents of the enclosing image and answers pixel requests in
/// its coordinates, so it can stand in for the view it was rasterized from
/// over the covered region.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRegion<P> {
    buffer: ImageBuffer<P>,
    origin: Point,
    cols: i32,
    rows: i32,
}

impl<P: Pixel> ImageRegion<P> {
    pub fn new(buffer: ImageBuffer<P>, origin: Point, cols: i32, rows: i32) -> Self {
        Self {
            buffer,
            origin,
            cols,
            rows,
        }
    }

    /// Region covered by the buffer, in image coordinates.
    pub fn region(&self) -> BoundingBox {
        BoundingBox::new(
            self.origin.x,
            self.origin.y,
            self.buffer.cols(),
            self.buffer.rows(),
        )
    }

    pub fn buffer(&self) -> &ImageBuffer<P> {
        &self.buffer
    }

    pub fn into_buffer(self) -> ImageBuffer<P> {
        self.buffer
    }
}

impl<P: Pixel> View for ImageRegion<P> {
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
        self.buffer.planes()
    }

    fn pixel(&self, x: i32, y: i32, plane: i32) -> Result<P, RasterError> {
        self.buffer
            .get(x - self.origin.x, y - self.origin.y, plane)
            .ok_or(RasterError::PixelOutOfRange {
                x,
                y,
                plane,
                cols: self.cols,
                rows: self.rows,
                planes: self.buffer.planes(),
            })
    }

    fn prerasterize(&self, _bbox: BoundingBox) -> Result<&Self, RasterError> {
        Ok(self)
    }
}

/// A lazy rectangular window into another view.
///
/// Pixel `(0, 0)` of the crop is pixel `bbox.min` of the child.
#[derive(Debug, Clone)]
pub struct CropView<V> {
    child: V,
    bbox: BoundingBox,
}

impl<V: View> CropView<V> {
    pub fn new(child: V, bbox: BoundingBox) -> Self {
        Self { child, bbox }
    }

    pub fn child(&self) -> &V {
        &self.child
    }

    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }
}

/// Crop `view` to `bbox`.
pub fn crop<V: View>(view: V, bbox: BoundingBox) -> CropView<V> {
    CropView::new(view, bbox)
}

impl<V: View> View for CropView<V> {
    type Pixel = V::Pixel;
    type Prerasterized<'a>
        = CropView<V::Prerasterized<'a>>
    where
        Self: 'a;

    fn cols(&self) -> i32 {
        self.bbox.width()
    }

    fn rows(&self) -> i32 {
        self.bbox.height()
    }

    fn planes(&self) -> i32 {
        self.child.planes()
    }

    fn pixel(&self, x: i32, y: i32, plane: i32) -> Result<V::Pixel, RasterError> {
        self.child
            .pixel(x + self.bbox.min.x, y + self.bbox.min.y, plane)
    }

    fn prerasterize(&self, bbox: BoundingBox) -> Result<Self::Prerasterized<'_>, RasterError> {
        let inner = self.child.prerasterize(bbox + self.bbox.min)?;
        Ok(CropView::new(inner, self.bbox))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::{rasterize, rasterize_full, views_equal, ProceduralView};

    fn numbered(cols: i32, rows: i32, planes: i32) -> ImageBuffer<u32> {
        ImageBuffer::from_fn(cols, rows, planes, |x, y, p| (p * 10_000 + y * 100 + x) as u32)
    }

    #[test]
    fn test_new_is_default_filled() {
        let buf = ImageBuffer::<u16>::new(3, 2, 2);
        assert_eq!(buf.as_slice().len(), 12);
        assert!(buf.as_slice().iter().all(|&v| v == 0));
        assert_eq!(buf.size_bytes(), 24);
    }

    #[test]
    fn test_layout_is_plane_major() {
        let buf = numbered(2, 2, 2);
        assert_eq!(buf.as_slice(), &[0, 1, 100, 101, 10_000, 10_001, 10_100, 10_101]);
    }

    #[test]
    fn test_from_vec_validates_length() {
        assert!(ImageBuffer::from_vec(2, 2, 1, vec![0u8; 4]).is_ok());
        let err = ImageBuffer::from_vec(2, 2, 1, vec![0u8; 3]).unwrap_err();
        assert!(err.is_argument_error());
        assert!(ImageBuffer::from_vec(-1, 2, 1, Vec::<u8>::new()).is_err());
    }

    #[test]
    fn test_get_out_of_bounds() {
        let buf = numbered(2, 2, 1);
        assert_eq!(buf.get(1, 1, 0), Some(101));
        assert_eq!(buf.get(2, 0, 0), None);
        assert_eq!(buf.get(0, 0, 1), None);
        assert!(View::pixel(&buf, -1, 0, 0).is_err());
    }

    #[test]
    fn test_set_size_keeps_matching_buffer() {
        let mut buf = numbered(2, 2, 1);
        buf.set_size(2, 2, 1);
        assert_eq!(buf.get(1, 1, 0), Some(101));
        buf.set_size(3, 1, 1);
        assert_eq!(buf.as_slice(), &[0, 0, 0]);
    }

    #[test]
    fn test_tiles_mut_cover_buffer_disjointly() {
        let mut buf = ImageBuffer::<u32>::new(5, 4, 2);
        {
            let mut tiles = buf
                .tiles_mut(&[(0, 2), (2, 5)], &[(0, 3), (3, 4)])
                .unwrap();
            assert_eq!(tiles.len(), 4);
            assert_eq!((tiles[1].cols(), tiles[1].rows()), (3, 3));
            assert_eq!((tiles[2].cols(), tiles[2].rows()), (2, 1));
            for (i, tile) in tiles.iter_mut().enumerate() {
                for p in 0..tile.planes() {
                    for y in 0..tile.rows() {
                        for x in 0..tile.cols() {
                            tile.set_pixel(x, y, p, i as u32 + 1);
                        }
                    }
                }
            }
        }
        assert_eq!(buf.get(0, 0, 0), Some(1));
        assert_eq!(buf.get(4, 2, 1), Some(2));
        assert_eq!(buf.get(1, 3, 0), Some(3));
        assert_eq!(buf.get(2, 3, 1), Some(4));
        assert!(buf.as_slice().iter().all(|&v| v != 0));
    }

    #[test]
    fn test_tiles_mut_rejects_gaps() {
        let mut buf = ImageBuffer::<u8>::new(4, 4, 1);
        assert!(buf.tiles_mut(&[(0, 2), (3, 4)], &[(0, 4)]).is_err());
        assert!(buf.tiles_mut(&[(0, 3)], &[(0, 4)]).is_err());
        assert!(buf.tiles_mut(&[(0, 4)], &[(0, 2), (2, 2), (2, 4)]).is_err());
    }

    #[test]
    fn test_tiles_mut_empty_buffer() {
        let mut buf = ImageBuffer::<u8>::new(0, 0, 1);
        let tiles = buf.tiles_mut(&[], &[]).unwrap();
        assert!(tiles.is_empty());
    }

    #[test]
    fn test_split_tiles_only_for_buffers() {
        let mut buf = ImageBuffer::<u8>::new(4, 4, 1);
        {
            let tiles = buf.split_tiles(&[(0, 1), (1, 4)], &[(0, 4)]).unwrap();
            assert_eq!(tiles.len(), 2);
        }
        assert!(buf.split_tiles(&[(0, 3)], &[(0, 4)]).is_none());

        let mut tiles = buf.tiles_mut(&[(0, 4)], &[(0, 4)]).unwrap();
        assert!(tiles[0].split_tiles(&[(0, 4)], &[(0, 4)]).is_none());
    }

    #[test]
    fn test_rasterize_into_tile() {
        let src = numbered(6, 6, 1);
        let mut dest = ImageBuffer::<u32>::new(4, 2, 1);
        {
            let mut tiles = dest.tiles_mut(&[(0, 1), (1, 4)], &[(0, 2)]).unwrap();
            rasterize(&src, &mut tiles[1], BoundingBox::new(2, 3, 3, 2)).unwrap();
        }
        assert_eq!(dest.get(0, 0, 0), Some(0));
        assert_eq!(dest.get(1, 0, 0), Some(302));
        assert_eq!(dest.get(3, 1, 0), Some(404));
    }

    #[test]
    fn test_region_answers_in_image_coordinates() {
        let region = ImageRegion::new(numbered(2, 2, 1), Point::new(10, 20), 100, 100);
        assert_eq!(region.cols(), 100);
        assert_eq!(region.region(), BoundingBox::new(10, 20, 2, 2));
        assert_eq!(region.pixel(11, 21, 0).unwrap(), 101);
        assert!(region.pixel(0, 0, 0).is_err());

        let mut out = ImageBuffer::<u32>::new(0, 0, 0);
        rasterize(&region, &mut out, BoundingBox::new(10, 20, 2, 1)).unwrap();
        assert_eq!(out.as_slice(), &[0, 1]);
    }

    #[test]
    fn test_crop_view_matches_child() {
        let src = ProceduralView::from_fn(10, 10, 1, |x, y, _| (x * y) as u32);
        let window = crop(&src, BoundingBox::new(3, 4, 5, 2));
        assert_eq!(window.cols(), 5);
        assert_eq!(window.rows(), 2);
        assert_eq!(window.pixel(0, 0, 0).unwrap(), 12);

        let mut out = ImageBuffer::<u32>::new(0, 0, 0);
        rasterize_full(&window, &mut out).unwrap();
        let expected = ImageBuffer::from_fn(5, 2, 1, |x, y, _| ((x + 3) * (y + 4)) as u32);
        assert!(views_equal(&out, &expected).unwrap());
    }
}
