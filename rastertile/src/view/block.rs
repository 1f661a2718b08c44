//! Block-cached rasterization.
//!
//! [`BlockRasterizeView`] wraps a child view and evaluates it one block at a
//! time. With a [`Cache`] each block of the grid becomes a cache entry backed
//! by a [`BlockGenerator`], so a block is rasterized from the child at most
//! once while it stays resident. Without a cache the view still splits work
//! into blocks for the worker pool but always pulls from the child.

use std::fmt;
use std::mem::size_of;
use std::sync::Arc;

use tracing::debug;

use crate::cache::{Cache, Generator, Handle};
use crate::error::RasterError;
use crate::geom::{BlockSize, BoundingBox, Point};
use crate::image::{ImageBuffer, ImageRegion};
use crate::processor::BlockProcessor;
use crate::view::{rasterize, View, ViewMut};

/// Target footprint of an automatically sized block (2 MiB).
pub const DEFAULT_BLOCK_BYTES: usize = 2 * 1024 * 1024;

/// Block size used when none is requested.
///
/// Blocks span full image rows and take as many rows as fit in
/// [`DEFAULT_BLOCK_BYTES`], at least one and at most the image height.
pub fn default_block_size(cols: i32, rows: i32, planes: i32, pixel_bytes: usize) -> BlockSize {
    let width = cols.max(1);
    let max_rows = rows.max(1);
    let row_bytes = planes.max(0) as usize * cols.max(0) as usize * pixel_bytes;
    let height = if row_bytes == 0 {
        max_rows
    } else {
        (DEFAULT_BLOCK_BYTES / row_bytes).clamp(1, max_rows as usize) as i32
    };
    BlockSize::new(width, height)
}

/// Rasterizes one block of a child view into an owned buffer.
pub struct BlockGenerator<V> {
    child: Arc<V>,
    bbox: BoundingBox,
}

impl<V: View> BlockGenerator<V> {
    pub fn new(child: Arc<V>, bbox: BoundingBox) -> Self {
        Self { child, bbox }
    }

    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }
}

impl<V> Generator for BlockGenerator<V>
where
    V: View + Send + Sync + 'static,
{
    type Value = ImageBuffer<V::Pixel>;

    fn size(&self) -> usize {
        self.bbox.area() * self.child.planes().max(0) as usize * size_of::<V::Pixel>()
    }

    fn generate(&self) -> Result<Self::Value, RasterError> {
        debug!(bbox = %self.bbox, "rasterizing block");
        let mut buffer =
            ImageBuffer::new(self.bbox.width(), self.bbox.height(), self.child.planes());
        self.child.rasterize(&mut buffer, self.bbox)?;
        Ok(buffer)
    }
}

impl<V> fmt::Debug for BlockGenerator<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockGenerator")
            .field("bbox", &self.bbox)
            .finish_non_exhaustive()
    }
}

/// A view that evaluates its child block by block, optionally caching blocks.
///
/// Pixel values are identical to the child's; only the cost of producing
/// them changes.
pub struct BlockRasterizeView<V: View + Send + Sync + 'static> {
    child: Arc<V>,
    block_size: BlockSize,
    threads: usize,
    cache: Option<Cache>,
    table_width: i32,
    table_height: i32,
    /// Row-major, `ix + iy * table_width`. Empty without a cache.
    blocks: Vec<Handle<BlockGenerator<V>>>,
}

impl<V> BlockRasterizeView<V>
where
    V: View + Send + Sync + 'static,
{
    /// Wrap `child`. An auto block size is replaced by
    /// [`default_block_size`]; `threads <= 1` evaluates on the calling thread.
    pub fn new(child: V, block_size: BlockSize, threads: usize, cache: Option<Cache>) -> Self {
        Self::from_shared(Arc::new(child), block_size, threads, cache)
    }

    /// Like [`BlockRasterizeView::new`] for a child that is already shared.
    pub fn from_shared(
        child: Arc<V>,
        block_size: BlockSize,
        threads: usize,
        cache: Option<Cache>,
    ) -> Self {
        let block_size = if block_size.is_auto() {
            default_block_size(
                child.cols(),
                child.rows(),
                child.planes(),
                size_of::<V::Pixel>(),
            )
        } else {
            block_size
        };
        let table_width = div_ceil(child.cols(), block_size.width);
        let table_height = div_ceil(child.rows(), block_size.height);

        let blocks = match &cache {
            Some(cache) => {
                let bounds = child.bounds();
                let mut blocks = Vec::with_capacity((table_width * table_height) as usize);
                for iy in 0..table_height {
                    for ix in 0..table_width {
                        let bbox = block_size.block_bbox(ix, iy).intersect(&bounds);
                        blocks.push(cache.insert(BlockGenerator::new(Arc::clone(&child), bbox)));
                    }
                }
                blocks
            }
            None => Vec::new(),
        };

        debug!(
            cols = child.cols(),
            rows = child.rows(),
            planes = child.planes(),
            block_size = %block_size,
            table_width,
            table_height,
            threads,
            cached = cache.is_some(),
            "created block rasterize view"
        );

        Self {
            child,
            block_size,
            threads,
            cache,
            table_width,
            table_height,
            blocks,
        }
    }

    pub fn child(&self) -> &V {
        &self.child
    }

    pub fn shared_child(&self) -> &Arc<V> {
        &self.child
    }

    pub fn block_size(&self) -> BlockSize {
        self.block_size
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn cache(&self) -> Option<&Cache> {
        self.cache.as_ref()
    }

    /// Block table dimensions as `(width, height)`.
    pub fn table_size(&self) -> (i32, i32) {
        (self.table_width, self.table_height)
    }

    /// Image region covered by block `(ix, iy)`, cropped to the image.
    pub fn block_bbox(&self, ix: i32, iy: i32) -> BoundingBox {
        self.block_size.block_bbox(ix, iy).intersect(&self.child.bounds())
    }

    /// Cache handle of block `(ix, iy)`.
    ///
    /// Fails for indices outside the table, and for every index when the
    /// view has no cache.
    pub fn block(&self, ix: i32, iy: i32) -> Result<&Handle<BlockGenerator<V>>, RasterError> {
        let out_of_range = RasterError::BlockOutOfRange {
            ix,
            iy,
            table_width: self.table_width,
            table_height: self.table_height,
        };
        if ix < 0 || iy < 0 || ix >= self.table_width || iy >= self.table_height {
            return Err(out_of_range);
        }
        self.blocks
            .get((ix + iy * self.table_width) as usize)
            .ok_or(out_of_range)
    }

    /// Rasterize `sub`, which must lie inside a single block, into `dest`.
    fn rasterize_block<D>(&self, dest: &mut D, sub: BoundingBox) -> Result<(), RasterError>
    where
        D: ViewMut + ?Sized,
        D::Pixel: From<V::Pixel>,
    {
        if self.cache.is_none() {
            return self.child.rasterize(dest, sub);
        }
        if let Some(p) = first_outside(sub, self.bounds()) {
            return Err(self.pixel_out_of_range(p.x, p.y, 0));
        }
        let ix = sub.min.x.div_euclid(self.block_size.width);
        let iy = sub.min.y.div_euclid(self.block_size.height);
        if cfg!(debug_assertions) && !self.block_size.block_bbox(ix, iy).contains_box(&sub) {
            return Err(RasterError::SpansMultipleBlocks(sub));
        }
        let handle = self.block(ix, iy)?;
        let block = handle.value()?;
        let origin = handle.generator().bbox().min;
        block.rasterize(dest, sub - origin)
    }

    fn pixel_out_of_range(&self, x: i32, y: i32, plane: i32) -> RasterError {
        RasterError::PixelOutOfRange {
            x,
            y,
            plane,
            cols: self.cols(),
            rows: self.rows(),
            planes: self.planes(),
        }
    }
}

/// First pixel of `sub` in row, column order that lies outside `bounds`.
fn first_outside(sub: BoundingBox, bounds: BoundingBox) -> Option<Point> {
    if sub.is_empty() || bounds.contains_box(&sub) {
        return None;
    }
    let (x0, y0) = (sub.min.x, sub.min.y);
    if y0 < bounds.min.y || y0 >= bounds.max.y || x0 < bounds.min.x || x0 >= bounds.max.x {
        return Some(Point::new(x0, y0));
    }
    if sub.max.x > bounds.max.x {
        return Some(Point::new(bounds.max.x, y0));
    }
    Some(Point::new(x0, bounds.max.y))
}

impl<V> View for BlockRasterizeView<V>
where
    V: View + Send + Sync + 'static,
{
    type Pixel = V::Pixel;
    type Prerasterized<'a>
        = ImageRegion<V::Pixel>
    where
        Self: 'a;

    fn cols(&self) -> i32 {
        self.child.cols()
    }

    fn rows(&self) -> i32 {
        self.child.rows()
    }

    fn planes(&self) -> i32 {
        self.child.planes()
    }

    fn pixel(&self, x: i32, y: i32, plane: i32) -> Result<V::Pixel, RasterError> {
        if self.cache.is_none() {
            return self.child.pixel(x, y, plane);
        }
        if let [only] = self.blocks.as_slice() {
            return only.value()?.pixel(x, y, plane);
        }
        let ix = x.div_euclid(self.block_size.width);
        let iy = y.div_euclid(self.block_size.height);
        let handle = self.block(ix, iy)?;
        if x >= self.cols() || y >= self.rows() || plane < 0 || plane >= self.planes() {
            return Err(self.pixel_out_of_range(x, y, plane));
        }
        let block = handle.value()?;
        block.pixel(
            x - ix * self.block_size.width,
            y - iy * self.block_size.height,
            plane,
        )
    }

    /// Rasterize `bbox` block by block into an owned buffer.
    fn prerasterize(&self, bbox: BoundingBox) -> Result<ImageRegion<V::Pixel>, RasterError> {
        let mut buffer = ImageBuffer::new(bbox.width(), bbox.height(), self.planes());
        if !bbox.is_empty() {
            let processor = BlockProcessor::new(self.block_size, self.threads);
            let grid = processor.grid(bbox);
            let tiles = buffer.tiles_mut(&grid.local_col_spans(), &grid.local_row_spans())?;
            let tasks = grid.boxes().into_iter().zip(tiles).collect();
            processor.process_tasks(tasks, |sub, mut tile| self.rasterize_block(&mut tile, sub))?;
        }
        Ok(ImageRegion::new(buffer, bbox.min, self.cols(), self.rows()))
    }

    /// Rasterize `bbox` straight into `dest` when it can be split into
    /// block tiles, otherwise through [`View::prerasterize`].
    fn rasterize<D>(&self, dest: &mut D, bbox: BoundingBox) -> Result<(), RasterError>
    where
        D: ViewMut + ?Sized,
        D::Pixel: From<V::Pixel>,
    {
        if !bbox.is_empty() && dest.try_resize(bbox.width(), bbox.height(), self.planes()) {
            let processor = BlockProcessor::new(self.block_size, self.threads);
            let grid = processor.grid(bbox);
            if let Some(tiles) = dest.split_tiles(&grid.local_col_spans(), &grid.local_row_spans())
            {
                let tasks = grid.boxes().into_iter().zip(tiles).collect();
                return processor
                    .process_tasks(tasks, |sub, mut tile| self.rasterize_block(&mut tile, sub));
            }
        }
        let src = self.prerasterize(bbox)?;
        rasterize(&src, dest, bbox)
    }
}

impl<V: View + Send + Sync + 'static> Clone for BlockRasterizeView<V> {
    fn clone(&self) -> Self {
        Self {
            child: Arc::clone(&self.child),
            block_size: self.block_size,
            threads: self.threads,
            cache: self.cache.clone(),
            table_width: self.table_width,
            table_height: self.table_height,
            blocks: self.blocks.clone(),
        }
    }
}

impl<V: View + Send + Sync + 'static> fmt::Debug for BlockRasterizeView<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockRasterizeView")
            .field("block_size", &self.block_size)
            .field("threads", &self.threads)
            .field("table_width", &self.table_width)
            .field("table_height", &self.table_height)
            .field("cached", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

fn div_ceil(extent: i32, step: i32) -> i32 {
    if extent <= 0 || step <= 0 {
        0
    } else {
        (extent + step - 1) / step
    }
}

/// Evaluate `view` in blocks on `threads` workers without caching.
pub fn block_rasterize<V>(view: V, block_size: BlockSize, threads: usize) -> BlockRasterizeView<V>
where
    V: View + Send + Sync + 'static,
{
    BlockRasterizeView::new(view, block_size, threads, None)
}

/// Evaluate `view` in blocks on `threads` workers, keeping blocks in `cache`.
pub fn block_cache<V>(
    view: V,
    block_size: BlockSize,
    threads: usize,
    cache: &Cache,
) -> BlockRasterizeView<V>
where
    V: View + Send + Sync + 'static,
{
    BlockRasterizeView::new(view, block_size, threads, Some(cache.clone()))
}
