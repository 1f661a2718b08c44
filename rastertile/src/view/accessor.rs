//! Scanline-order cursor over a view.

use crate::error::RasterError;
use crate::view::View;

/// A cheap, copyable cursor into a view.
///
/// Movement never evaluates anything; only [`PixelAccessor::get`] pulls a
/// value from the underlying view.
pub struct PixelAccessor<'a, V> {
    view: &'a V,
    x: i32,
    y: i32,
    plane: i32,
}

impl<V> Clone for PixelAccessor<'_, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for PixelAccessor<'_, V> {}

impl<'a, V: View> PixelAccessor<'a, V> {
    /// Accessor at the view origin.
    pub fn new(view: &'a V) -> Self {
        Self::at(view, 0, 0, 0)
    }

    /// Accessor at an arbitrary position.
    pub fn at(view: &'a V, x: i32, y: i32, plane: i32) -> Self {
        Self { view, x, y, plane }
    }

    pub fn position(&self) -> (i32, i32, i32) {
        (self.x, self.y, self.plane)
    }

    pub fn next_col(&mut self) {
        self.x += 1;
    }

    pub fn prev_col(&mut self) {
        self.x -= 1;
    }

    pub fn next_row(&mut self) {
        self.y += 1;
    }

    pub fn prev_row(&mut self) {
        self.y -= 1;
    }

    pub fn next_plane(&mut self) {
        self.plane += 1;
    }

    pub fn prev_plane(&mut self) {
        self.plane -= 1;
    }

    /// Offset the cursor by `(dx, dy)`.
    pub fn advance(mut self, dx: i32, dy: i32) -> Self {
        self.x += dx;
        self.y += dy;
        self
    }

    /// Evaluate the pixel under the cursor.
    pub fn get(&self) -> Result<V::Pixel, RasterError> {
        self.view.pixel(self.x, self.y, self.plane)
    }
}

#[cfg(test)]
mod tests {
    use crate::image::ImageBuffer;
    use crate::view::View;

    #[test]
    fn test_accessor_walk() {
        let image = ImageBuffer::from_fn(3, 2, 2, |x, y, p| (p * 100 + y * 10 + x) as i32);
        let mut acc = image.origin();
        assert_eq!(acc.get().unwrap(), 0);

        acc.next_col();
        acc.next_col();
        assert_eq!(acc.get().unwrap(), 2);

        acc.next_row();
        assert_eq!(acc.get().unwrap(), 12);

        acc.next_plane();
        assert_eq!(acc.get().unwrap(), 112);

        acc.prev_col();
        acc.prev_row();
        acc.prev_plane();
        assert_eq!(acc.position(), (1, 0, 0));
    }

    #[test]
    fn test_accessor_copy_is_independent() {
        let image = ImageBuffer::from_fn(4, 1, 1, |x, _, _| x as u8);
        let start = image.origin().advance(1, 0);
        let mut moved = start;
        moved.next_col();
        assert_eq!(start.get().unwrap(), 1);
        assert_eq!(moved.get().unwrap(), 2);
    }

    #[test]
    fn test_accessor_out_of_range() {
        let image = ImageBuffer::<u8>::new(2, 2, 1);
        let acc = image.origin().advance(2, 0);
        assert!(acc.get().is_err());
    }
}
