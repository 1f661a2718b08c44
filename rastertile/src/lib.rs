//! rastertile - lazy, block-cached image rasterization.
//!
//! Images are [`View`]s: values that know their extents and produce pixels
//! on demand. Wrapping a view in a [`BlockRasterizeView`] splits it into a
//! grid of blocks that are rasterized in parallel and, when a [`Cache`] is
//! supplied, memoized under a byte budget with LRU eviction.
//!
//! ```
//! use rastertile::{block_cache, rasterize_full, BlockSize, Cache, ImageBuffer, ProceduralView};
//!
//! let source = ProceduralView::from_fn(640, 480, 1, |x, y, _| (x ^ y) as u8);
//! let cache = Cache::new(16 * 1024 * 1024).unwrap();
//! let view = block_cache(source, BlockSize::square(128), 4, &cache);
//!
//! let mut out = ImageBuffer::<u8>::new(0, 0, 0);
//! rasterize_full(&view, &mut out).unwrap();
//! assert_eq!(out.get(3, 5, 0), Some(3 ^ 5));
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod geom;
pub mod image;
pub mod logging;
pub mod processor;
pub mod queue;
pub mod view;

pub use cache::{Cache, CacheError, CacheGuard, CacheStats, FnGenerator, Generator, Handle};
pub use error::RasterError;
pub use geom::{BlockSize, BoundingBox, Point};
pub use image::{crop, CropView, ImageBuffer, ImageRegion, TileMut};
pub use processor::{BlockProcessor, RegionGrid};
pub use queue::ThreadQueue;
pub use view::{
    block_cache, block_rasterize, for_each_pixel, for_each_pixel2, rasterize, rasterize_full,
    views_equal, views_equal_by, BlockRasterizeView, Pixel, PixelAccessor, ProceduralView, View, ViewMut,
};

/// Version of the rastertile library and CLI.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
