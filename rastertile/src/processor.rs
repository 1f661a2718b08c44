//! Block partitioning and pooled execution.
//!
//! [`BlockProcessor`] cuts a bounding box along the absolute block grid and
//! runs a functor on every piece, either on the calling thread in row-major
//! order or on a scoped worker pool fed from a [`ThreadQueue`].
//!
//! Worker failures never cross threads as panics. Each worker pushes its
//! errors (and converted panics) onto a result queue; the calling thread
//! drains it after every worker has joined and reports the first failure in
//! block order.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;

use tracing::{debug, trace, warn};

use crate::error::{panic_message, RasterError};
use crate::geom::{BlockSize, BoundingBox};
use crate::queue::ThreadQueue;

/// Block-aligned partition of a bounding box.
///
/// Column and row spans are in absolute coordinates. Interior boundaries
/// fall on multiples of the block size, so every cell lies inside exactly one
/// block of the grid anchored at the origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionGrid {
    bbox: BoundingBox,
    col_spans: Vec<(i32, i32)>,
    row_spans: Vec<(i32, i32)>,
}

impl RegionGrid {
    pub fn new(bbox: BoundingBox, block_size: BlockSize) -> Self {
        Self {
            bbox,
            col_spans: aligned_spans(bbox.min.x, bbox.max.x, block_size.width),
            row_spans: aligned_spans(bbox.min.y, bbox.max.y, block_size.height),
        }
    }

    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    /// Grid dimensions as `(columns, rows)` of cells.
    pub fn dimensions(&self) -> (usize, usize) {
        (self.col_spans.len(), self.row_spans.len())
    }

    pub fn len(&self) -> usize {
        self.col_spans.len() * self.row_spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cells in row-major order.
    pub fn boxes(&self) -> Vec<BoundingBox> {
        self.row_spans
            .iter()
            .flat_map(|&(y0, y1)| {
                self.col_spans
                    .iter()
                    .map(move |&(x0, x1)| BoundingBox::new(x0, y0, x1 - x0, y1 - y0))
            })
            .collect()
    }

    /// Column spans relative to `bbox.min`.
    pub fn local_col_spans(&self) -> Vec<(i32, i32)> {
        let x = self.bbox.min.x;
        self.col_spans.iter().map(|&(a, b)| (a - x, b - x)).collect()
    }

    /// Row spans relative to `bbox.min`.
    pub fn local_row_spans(&self) -> Vec<(i32, i32)> {
        let y = self.bbox.min.y;
        self.row_spans.iter().map(|&(a, b)| (a - y, b - y)).collect()
    }
}

/// Split `[lo, hi)` at every multiple of `step`.
fn aligned_spans(lo: i32, hi: i32, step: i32) -> Vec<(i32, i32)> {
    let mut spans = Vec::new();
    if hi <= lo {
        return spans;
    }
    if step <= 0 {
        spans.push((lo, hi));
        return spans;
    }
    let mut start = lo;
    while start < hi {
        let end = ((start.div_euclid(step) + 1) * step).min(hi);
        spans.push((start, end));
        start = end;
    }
    spans
}

/// Runs a per-block functor over a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockProcessor {
    block_size: BlockSize,
    threads: usize,
}

impl BlockProcessor {
    /// `threads <= 1` processes blocks sequentially on the calling thread.
    pub fn new(block_size: BlockSize, threads: usize) -> Self {
        Self {
            block_size,
            threads,
        }
    }

    pub fn block_size(&self) -> BlockSize {
        self.block_size
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Partition `bbox` along the block grid.
    pub fn grid(&self, bbox: BoundingBox) -> RegionGrid {
        RegionGrid::new(bbox, self.block_size)
    }

    /// Apply `func` to every block-aligned piece of `bbox`.
    pub fn process<F>(&self, bbox: BoundingBox, func: F) -> Result<(), RasterError>
    where
        F: Fn(BoundingBox) -> Result<(), RasterError> + Sync,
    {
        let tasks = self.grid(bbox).boxes().into_iter().map(|b| (b, ())).collect();
        self.process_tasks(tasks, |b, ()| func(b))
    }

    /// Apply `func` to each `(bbox, payload)` pair.
    ///
    /// Payloads move to whichever thread runs the task, which is how callers
    /// hand each worker its own slice of a destination buffer.
    pub fn process_tasks<T, F>(
        &self,
        tasks: Vec<(BoundingBox, T)>,
        func: F,
    ) -> Result<(), RasterError>
    where
        T: Send,
        F: Fn(BoundingBox, T) -> Result<(), RasterError> + Sync,
    {
        if tasks.is_empty() {
            return Ok(());
        }
        if self.threads <= 1 || tasks.len() == 1 {
            for (bbox, payload) in tasks {
                trace!(%bbox, "processing block");
                func(bbox, payload)?;
            }
            return Ok(());
        }
        self.process_pooled(tasks, &func)
    }

    fn process_pooled<T, F>(&self, tasks: Vec<(BoundingBox, T)>, func: &F) -> Result<(), RasterError>
    where
        T: Send,
        F: Fn(BoundingBox, T) -> Result<(), RasterError> + Sync,
    {
        let workers = self.threads.min(tasks.len());
        debug!(blocks = tasks.len(), workers, "dispatching blocks to worker pool");

        let queue = ThreadQueue::new();
        for (index, (bbox, payload)) in tasks.into_iter().enumerate() {
            queue.push((index, bbox, payload));
        }
        let failures: ThreadQueue<(usize, RasterError)> = ThreadQueue::new();

        let run = |index: usize, bbox: BoundingBox, payload: T| {
            trace!(%bbox, "processing block");
            let outcome = catch_unwind(AssertUnwindSafe(|| func(bbox, payload)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => failures.push((index, err)),
                Err(panic) => failures.push((
                    index,
                    RasterError::WorkerPanicked {
                        bbox,
                        message: panic_message(panic.as_ref()),
                    },
                )),
            }
        };

        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(workers);
            for i in 0..workers {
                let spawned = thread::Builder::new()
                    .name(format!("raster-worker-{}", i))
                    .spawn_scoped(scope, || {
                        while let Some((index, bbox, payload)) = queue.try_pop() {
                            run(index, bbox, payload);
                        }
                    });
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => warn!(error = %e, "failed to spawn raster worker"),
                }
            }
            for handle in handles {
                // Workers catch their own panics; join cannot fail.
                let _ = handle.join();
            }
        });

        // Anything left over means workers could not be spawned.
        while let Some((index, bbox, payload)) = queue.try_pop() {
            run(index, bbox, payload);
        }

        let mut reported = Vec::new();
        while let Some(failure) = failures.try_pop() {
            reported.push(failure);
        }
        if reported.is_empty() {
            return Ok(());
        }
        reported.sort_by_key(|(index, _)| *index);
        for (index, err) in &reported {
            warn!(block = index, error = %err, "block failed");
        }
        let (_, first) = reported.swap_remove(0);
        Err(first)
    }
}
