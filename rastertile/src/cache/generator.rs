//! Producers of cacheable values.

use std::fmt;
use std::marker::PhantomData;

use crate::error::RasterError;

/// Produces a value on demand and reports its size up front.
///
/// `size` must be cheap and must match the footprint of what `generate`
/// returns; the cache charges it against its budget without generating.
pub trait Generator: Send + Sync + 'static {
    type Value: Send + Sync + 'static;

    /// Resident size of the generated value, in bytes.
    fn size(&self) -> usize;

    fn generate(&self) -> Result<Self::Value, RasterError>;
}

/// Generator backed by a closure.
pub struct FnGenerator<T, F> {
    size: usize,
    func: F,
    _value: PhantomData<fn() -> T>,
}

impl<T, F> FnGenerator<T, F>
where
    T: Send + Sync + 'static,
    F: Fn() -> Result<T, RasterError> + Send + Sync + 'static,
{
    pub fn new(size: usize, func: F) -> Self {
        Self {
            size,
            func,
            _value: PhantomData,
        }
    }
}

impl<T, F> Generator for FnGenerator<T, F>
where
    T: Send + Sync + 'static,
    F: Fn() -> Result<T, RasterError> + Send + Sync + 'static,
{
    type Value = T;

    fn size(&self) -> usize {
        self.size
    }

    fn generate(&self) -> Result<T, RasterError> {
        (self.func)()
    }
}

impl<T, F> fmt::Debug for FnGenerator<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnGenerator")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}
