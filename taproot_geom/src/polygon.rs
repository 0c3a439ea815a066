// Copyright 2025 the Taproot Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Closed contours and polygon sets.

use crate::bbox::BoundingBox;
use crate::point::Point;
use crate::polyline::{Polyline, Polylines};

/// A closed contour. The closing edge from the last vertex back to the first
/// is implicit.
///
/// Orientation is not enforced; containment tests use the even-odd rule so a
/// set of contours may freely mix outer boundaries and holes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Polygon {
    /// Contour vertices.
    pub points: Vec<Point>,
}

/// A set of contours interpreted with the even-odd rule.
pub type Polygons = Vec<Polygon>;

impl Polygon {
    /// Construct from vertices.
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Number of vertices.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the contour has no vertices.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Twice the signed area, exact. Positive for counter-clockwise contours.
    pub fn signed_area_x2(&self) -> i128 {
        let n = self.points.len();
        if n < 3 {
            return 0;
        }
        let mut acc: i128 = 0;
        for i in 0..n {
            let a = self.points[i];
            let b = self.points[(i + 1) % n];
            acc += a.cross(b);
        }
        acc
    }

    /// Signed area in scaled units squared.
    pub fn signed_area(&self) -> f64 {
        self.signed_area_x2() as f64 * 0.5
    }

    /// Perimeter length in scaled units.
    pub fn perimeter(&self) -> f64 {
        let n = self.points.len();
        if n < 2 {
            return 0.0;
        }
        let mut acc = 0.0;
        for i in 0..n {
            acc += self.points[i].distance_to(self.points[(i + 1) % n]);
        }
        acc
    }

    /// Bounding box of the contour.
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_points(&self.points)
    }

    /// Translate all vertices by `delta`.
    pub fn translate(&mut self, delta: Point) {
        for p in &mut self.points {
            *p += delta;
        }
    }

    /// Whether `p` lies inside or on the contour (even-odd rule; points on an
    /// edge count as inside).
    pub fn contains(&self, p: Point) -> bool {
        contour_winding(&self.points, p) != Winding::Outside
    }

    /// The contour as an open polyline, with the closing vertex repeated so
    /// that the full boundary is traced.
    pub fn to_polyline(&self) -> Polyline {
        let mut points = self.points.clone();
        if let Some(&first) = points.first() {
            points.push(first);
        }
        Polyline { points }
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum Winding {
    Outside,
    Inside,
    OnEdge,
}

/// Even-odd crossing test for a single contour.
fn contour_winding(points: &[Point], p: Point) -> Winding {
    let n = points.len();
    if n < 3 {
        return Winding::Outside;
    }
    let mut inside = false;
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        // On-edge check: p collinear with (a, b) and within the segment span.
        let ab = b - a;
        let ap = p - a;
        if ab.cross(ap) == 0 {
            let t = ab.dot(ap);
            if t >= 0 && t <= ab.norm2() {
                return Winding::OnEdge;
            }
        }
        if (a.y > p.y) != (b.y > p.y) {
            // Exact side test of p against the supporting line of (a, b),
            // oriented so upward and downward edges agree.
            let cross = ab.cross(ap);
            if (b.y > a.y && cross > 0) || (b.y < a.y && cross < 0) {
                inside = !inside;
            }
        }
    }
    if inside { Winding::Inside } else { Winding::Outside }
}

/// Sum of the signed areas of all contours, in scaled units squared.
///
/// With even-odd semantics holes carry opposite orientation, so this is the
/// enclosed area for well-formed sets.
pub fn area(polygons: &Polygons) -> f64 {
    polygons.iter().map(Polygon::signed_area).sum::<f64>().abs()
}

/// Whether `p` lies inside the polygon set under the even-odd rule.
pub fn contains(polygons: &Polygons, p: Point) -> bool {
    let mut crossings = 0_usize;
    for poly in polygons {
        match contour_winding(&poly.points, p) {
            Winding::OnEdge => return true,
            Winding::Inside => crossings += 1,
            Winding::Outside => {}
        }
    }
    crossings % 2 == 1
}

/// Total boundary length of the polygon set in scaled units.
pub fn total_length(polygons: &Polygons) -> f64 {
    polygons.iter().map(Polygon::perimeter).sum()
}

/// Bounding box of a polygon set.
pub fn get_extents(polygons: &Polygons) -> BoundingBox {
    let mut bbox = BoundingBox::empty();
    for poly in polygons {
        bbox.merge(poly.bounding_box());
    }
    bbox
}

/// All contours of `polygons` as closed polylines.
pub fn to_polylines(polygons: &Polygons) -> Polylines {
    polygons.iter().map(Polygon::to_polyline).collect()
}

/// A regular polygon approximating a circle of `radius` around the origin.
///
/// `steps` is clamped to at least 3.
pub fn make_circle(radius: i64, steps: usize) -> Polygon {
    let steps = steps.max(3);
    let mut points = Vec::with_capacity(steps);
    for i in 0..steps {
        let a = core::f64::consts::TAU * (i as f64) / (steps as f64);
        points.push(Point::new(
            (radius as f64 * a.cos()).round() as i64,
            (radius as f64 * a.sin()).round() as i64,
        ));
    }
    Polygon::new(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::scaled;

    fn square(side_mm: f64) -> Polygon {
        let s = scaled(side_mm);
        Polygon::new(vec![
            Point::new(0, 0),
            Point::new(s, 0),
            Point::new(s, s),
            Point::new(0, s),
        ])
    }

    #[test]
    fn area_of_square() {
        let sq = square(2.0);
        let expect = (scaled(2.0) as f64) * (scaled(2.0) as f64);
        assert_eq!(sq.signed_area(), expect);
        assert_eq!(area(&vec![sq]), expect);
    }

    #[test]
    fn containment_with_hole() {
        let outer = square(4.0);
        let mut inner = square(2.0);
        inner.translate(Point::new(scaled(1.0), scaled(1.0)));
        let set = vec![outer, inner];
        // Inside outer only.
        assert!(contains(&set, Point::new(scaled(0.5), scaled(0.5))));
        // Inside both contours: a hole under the even-odd rule.
        assert!(!contains(&set, Point::new(scaled(2.0), scaled(2.0))));
        // Outside everything.
        assert!(!contains(&set, Point::new(scaled(5.0), scaled(5.0))));
    }

    #[test]
    fn point_on_edge_is_inside() {
        let sq = square(1.0);
        assert!(sq.contains(Point::new(scaled(0.5), 0)));
        assert!(sq.contains(Point::new(0, 0)));
    }

    #[test]
    fn circle_has_expected_radius() {
        let c = make_circle(scaled(1.0), 32);
        for p in &c.points {
            let r = p.norm();
            assert!((r - scaled(1.0) as f64).abs() < scaled(0.01) as f64);
        }
    }
}
