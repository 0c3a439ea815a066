// Copyright 2025 the Taproot Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Projection of points onto polygon boundaries.

use crate::point::Point;
use crate::polygon::{Polygons, contains};

fn closest_point_on_segment(a: Point, b: Point, p: Point) -> Point {
    let ab = b - a;
    let l2 = ab.norm2();
    if l2 == 0 {
        return a;
    }
    let t = (ab.dot(p - a) as f64 / l2 as f64).clamp(0.0, 1.0);
    Point::new(
        a.x + (ab.x as f64 * t).round() as i64,
        a.y + (ab.y as f64 * t).round() as i64,
    )
}

/// The closest point on the boundary of `polygons` to `from`, or `None` for
/// an empty set.
pub fn move_inside(polygons: &Polygons, from: Point) -> Option<Point> {
    let mut best: Option<(i128, Point)> = None;
    for poly in polygons {
        let n = poly.points.len();
        if n < 2 {
            continue;
        }
        for i in 0..n {
            let a = poly.points[i];
            let b = poly.points[(i + 1) % n];
            let candidate = closest_point_on_segment(a, b, from);
            let d2 = (candidate - from).norm2();
            if best.is_none_or(|(bd2, _)| d2 < bd2) {
                best = Some((d2, candidate));
            }
        }
    }
    best.map(|(_, p)| p)
}

/// `from` if it already lies inside `polygons`, otherwise the closest point
/// on the boundary.
///
/// Idempotent: boundary points count as inside, so applying this twice gives
/// the same result as applying it once.
pub fn move_inside_if_outside(polygons: &Polygons, from: Point) -> Point {
    if polygons.is_empty() || contains(polygons, from) {
        return from;
    }
    move_inside(polygons, from).unwrap_or(from)
}

/// Signed distance from `p` to the nearest contour edge, in scaled units.
/// Negative inside, positive outside; `None` for an empty set.
pub fn signed_distance_to_edges(polygons: &Polygons, p: Point) -> Option<f64> {
    let nearest = move_inside(polygons, p)?;
    let d = (nearest - p).norm();
    Some(if contains(polygons, p) { -d } else { d })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::scaled;
    use crate::polygon::Polygon;

    fn unit_square() -> Polygons {
        let s = scaled(1.0);
        vec![Polygon::new(vec![
            Point::new(0, 0),
            Point::new(s, 0),
            Point::new(s, s),
            Point::new(0, s),
        ])]
    }

    #[test]
    fn inside_points_stay_put() {
        let sq = unit_square();
        let p = Point::from_mm(0.5, 0.5);
        assert_eq!(move_inside_if_outside(&sq, p), p);
    }

    #[test]
    fn outside_points_project_to_boundary() {
        let sq = unit_square();
        let p = Point::from_mm(2.0, 0.5);
        let moved = move_inside_if_outside(&sq, p);
        assert_eq!(moved, Point::from_mm(1.0, 0.5));
    }

    #[test]
    fn projection_is_idempotent() {
        let sq = unit_square();
        let p = Point::from_mm(3.0, -1.0);
        let once = move_inside_if_outside(&sq, p);
        let twice = move_inside_if_outside(&sq, once);
        assert_eq!(once, twice);
    }

    #[test]
    fn signed_distance_signs() {
        let sq = unit_square();
        let inside = signed_distance_to_edges(&sq, Point::from_mm(0.5, 0.5)).unwrap();
        let outside = signed_distance_to_edges(&sq, Point::from_mm(1.5, 0.5)).unwrap();
        assert!(inside < 0.0);
        assert!((inside + scaled(0.5) as f64).abs() < 2.0);
        assert!((outside - scaled(0.5) as f64).abs() < 2.0);
    }
}
