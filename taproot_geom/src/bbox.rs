// Copyright 2025 the Taproot Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Integer axis-aligned bounding boxes.

use crate::point::Point;

/// An axis-aligned bounding box over scaled-integer coordinates.
///
/// An empty box has `min > max`; merging with an empty box is the identity.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    /// Minimum corner.
    pub min: Point,
    /// Maximum corner.
    pub max: Point,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}

impl BoundingBox {
    /// The empty box.
    pub const fn empty() -> Self {
        Self {
            min: Point::new(i64::MAX, i64::MAX),
            max: Point::new(i64::MIN, i64::MIN),
        }
    }

    /// A box covering a single point.
    pub const fn from_point(p: Point) -> Self {
        Self { min: p, max: p }
    }

    /// The bounding box of a set of points.
    pub fn from_points(points: &[Point]) -> Self {
        let mut bbox = Self::empty();
        for &p in points {
            bbox.merge_point(p);
        }
        bbox
    }

    /// Whether no point was merged yet.
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y
    }

    /// Extend to cover `p`.
    pub fn merge_point(&mut self, p: Point) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
    }

    /// Extend to cover `other`.
    pub fn merge(&mut self, other: Self) {
        if !other.is_empty() {
            self.merge_point(other.min);
            self.merge_point(other.max);
        }
    }

    /// This box grown by `delta` on every side.
    pub fn inflated(self, delta: i64) -> Self {
        if self.is_empty() {
            self
        } else {
            Self {
                min: self.min - Point::new(delta, delta),
                max: self.max + Point::new(delta, delta),
            }
        }
    }

    /// Whether the closed boxes intersect.
    pub fn overlaps(&self, other: &Self) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
    }

    /// Whether `p` lies inside the closed box.
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// Centre of the box.
    pub fn center(&self) -> Point {
        Point::new((self.min.x + self.max.x) / 2, (self.min.y + self.max.y) / 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_and_overlap() {
        let mut a = BoundingBox::empty();
        assert!(a.is_empty());
        a.merge_point(Point::new(0, 0));
        a.merge_point(Point::new(10, 5));
        assert_eq!(a.min, Point::new(0, 0));
        assert_eq!(a.max, Point::new(10, 5));

        let b = BoundingBox::from_points(&[Point::new(9, 4), Point::new(20, 20)]);
        assert!(a.overlaps(&b));
        let c = BoundingBox::from_points(&[Point::new(11, 6), Point::new(20, 20)]);
        assert!(!a.overlaps(&c));
        assert!(a.inflated(1).overlaps(&c));
    }

    #[test]
    fn empty_merge_is_identity() {
        let mut a = BoundingBox::from_point(Point::new(1, 2));
        a.merge(BoundingBox::empty());
        assert_eq!(a, BoundingBox::from_point(Point::new(1, 2)));
    }
}
