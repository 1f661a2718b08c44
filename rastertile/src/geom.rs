//! Integer geometry for image regions.

use std::fmt;
use std::ops::{Add, Sub};

/// Integer 2D point or offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Half-open integer rectangle `[min, max)`.
///
/// `min <= max` holds componentwise for every box this type hands out;
/// operations that would invert a box collapse it to zero area at `min`
/// instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BoundingBox {
    pub min: Point,
    pub max: Point,
}

impl BoundingBox {
    /// Create a box from its origin and extent.
    ///
    /// Negative extents are treated as zero.
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            min: Point::new(x, y),
            max: Point::new(x + width.max(0), y + height.max(0)),
        }
    }

    /// Create a box from two corners, normalizing an inverted pair.
    pub fn from_corners(min: Point, max: Point) -> Self {
        Self {
            min,
            max: Point::new(max.x.max(min.x), max.y.max(min.y)),
        }
    }

    /// Box covering a whole `cols x rows` image.
    pub fn from_extent(cols: i32, rows: i32) -> Self {
        Self::new(0, 0, cols, rows)
    }

    pub fn width(&self) -> i32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> i32 {
        self.max.y - self.min.y
    }

    /// Number of pixels covered per plane.
    pub fn area(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min.x && p.x < self.max.x && p.y >= self.min.y && p.y < self.max.y
    }

    /// True when `other` lies entirely inside this box.
    pub fn contains_box(&self, other: &BoundingBox) -> bool {
        other.min.x >= self.min.x
            && other.min.y >= self.min.y
            && other.max.x <= self.max.x
            && other.max.y <= self.max.y
    }

    /// True when the two boxes share at least one pixel.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        !self.intersect(other).is_empty()
    }

    /// Overlap of two boxes. Disjoint boxes yield an empty box.
    pub fn intersect(&self, other: &BoundingBox) -> BoundingBox {
        let min = Point::new(self.min.x.max(other.min.x), self.min.y.max(other.min.y));
        let max = Point::new(self.max.x.min(other.max.x), self.max.y.min(other.max.y));
        BoundingBox::from_corners(min, max)
    }

    /// Crop this box in place to `bounds`.
    pub fn crop(&mut self, bounds: &BoundingBox) {
        *self = self.intersect(bounds);
    }

    /// Grow this box to also cover `other`. Empty boxes contribute nothing.
    pub fn expand(&mut self, other: &BoundingBox) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            *self = *other;
            return;
        }
        self.min = Point::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y));
        self.max = Point::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y));
    }

    /// Grow this box by `amount` pixels on every side.
    pub fn grow(&mut self, amount: i32) {
        self.min = Point::new(self.min.x - amount, self.min.y - amount);
        self.max = Point::new(
            (self.max.x + amount).max(self.min.x),
            (self.max.y + amount).max(self.min.y),
        );
    }

    /// Shift the box by `offset`.
    pub fn translate(&self, offset: Point) -> BoundingBox {
        BoundingBox {
            min: self.min + offset,
            max: self.max + offset,
        }
    }
}

impl Sub<Point> for BoundingBox {
    type Output = BoundingBox;

    fn sub(self, rhs: Point) -> BoundingBox {
        self.translate(Point::new(-rhs.x, -rhs.y))
    }
}

impl Add<Point> for BoundingBox {
    type Output = BoundingBox;

    fn add(self, rhs: Point) -> BoundingBox {
        self.translate(rhs)
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({},{})-({},{})",
            self.min.x, self.min.y, self.max.x, self.max.y
        )
    }
}

/// Width and height of one block, in pixels.
///
/// A non-positive dimension means "unset": the block view picks a default
/// from the image shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlockSize {
    pub width: i32,
    pub height: i32,
}

impl BlockSize {
    /// Ask for an automatically computed block size.
    pub const AUTO: BlockSize = BlockSize {
        width: 0,
        height: 0,
    };

    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub const fn square(side: i32) -> Self {
        Self::new(side, side)
    }

    pub fn is_auto(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Bounding box of block `(ix, iy)` before cropping to the image.
    pub fn block_bbox(&self, ix: i32, iy: i32) -> BoundingBox {
        BoundingBox::new(ix * self.width, iy * self.height, self.width, self.height)
    }
}

impl fmt::Display for BlockSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
