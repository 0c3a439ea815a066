// Copyright 2025 the Taproot Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Polygon-set Boolean operations, delegated to [`geo`].
//!
//! Contours follow the usual winding convention: outer boundaries are
//! counter-clockwise (positive signed area), holes are clockwise. All results
//! produced by this module restore that convention, so chained operations
//! stay consistent. Inputs are snapped back to the integer grid afterwards;
//! contours that collapse below three vertices or to zero area are dropped.

use geo::{BooleanOps, Coord, LineString, MultiLineString, MultiPolygon, Simplify};

use crate::point::Point;
use crate::polygon::{Polygon, Polygons};
use crate::polyline::{Polyline, Polylines};

fn ring_to_geo(points: &[Point]) -> LineString<f64> {
    let mut coords: Vec<Coord<f64>> = points
        .iter()
        .map(|p| Coord {
            x: p.x as f64,
            y: p.y as f64,
        })
        .collect();
    if let Some(&first) = coords.first() {
        coords.push(first);
    }
    LineString::new(coords)
}

fn ring_from_geo(ring: &LineString<f64>) -> Polygon {
    let mut points: Vec<Point> = ring
        .0
        .iter()
        .map(|c| Point::new(c.x.round() as i64, c.y.round() as i64))
        .collect();
    // Geo rings repeat the first coordinate at the end.
    if points.len() >= 2 && points.first() == points.last() {
        points.pop();
    }
    points.dedup();
    Polygon::new(points)
}

/// Union a list of multipolygons pairwise, keeping intermediates small.
pub(crate) fn union_tree(mut pieces: Vec<MultiPolygon<f64>>) -> MultiPolygon<f64> {
    if pieces.is_empty() {
        return MultiPolygon::new(Vec::new());
    }
    while pieces.len() > 1 {
        let mut next = Vec::with_capacity(pieces.len().div_ceil(2));
        let mut iter = pieces.into_iter();
        while let Some(a) = iter.next() {
            match iter.next() {
                Some(b) => next.push(a.union(&b)),
                None => next.push(a),
            }
        }
        pieces = next;
    }
    pieces.pop().unwrap_or_else(|| MultiPolygon::new(Vec::new()))
}

/// Convert a contour soup into a structured [`MultiPolygon`].
///
/// Counter-clockwise contours become exteriors; clockwise contours become
/// holes of the smallest exterior containing them. A clockwise contour
/// contained in no exterior is treated as an exterior of its own.
/// Overlapping exteriors are legal in accumulated inputs (several branch
/// slices appended to one layer); they are resolved by unioning the parts,
/// so the result covers the union of everything drawn.
pub(crate) fn to_geo(polygons: &Polygons) -> MultiPolygon<f64> {
    let parts = to_geo_structured(polygons);
    if parts.0.len() <= 1 {
        return parts;
    }
    union_tree(parts.0.into_iter().map(|p| MultiPolygon::new(vec![p])).collect())
}

fn to_geo_structured(polygons: &Polygons) -> MultiPolygon<f64> {
    let mut exteriors: Vec<(&Polygon, i128)> = Vec::new();
    let mut holes: Vec<&Polygon> = Vec::new();
    for poly in polygons {
        if poly.points.len() < 3 {
            continue;
        }
        let a2 = poly.signed_area_x2();
        if a2 == 0 {
            continue;
        }
        if a2 > 0 {
            exteriors.push((poly, a2));
        } else {
            holes.push(poly);
        }
    }
    let mut parts: Vec<(LineString<f64>, Vec<LineString<f64>>)> = exteriors
        .iter()
        .map(|(poly, _)| (ring_to_geo(&poly.points), Vec::new()))
        .collect();
    for hole in holes {
        let probe = hole.points[0];
        let mut best: Option<(usize, i128)> = None;
        for (i, (poly, a2)) in exteriors.iter().enumerate() {
            if poly.contains(probe) && best.is_none_or(|(_, ba2)| *a2 < ba2) {
                best = Some((i, *a2));
            }
        }
        match best {
            Some((i, _)) => parts[i].1.push(ring_to_geo(&hole.points)),
            // Orphan hole: keep its area by treating it as an exterior.
            None => parts.push((ring_to_geo(&hole.points), Vec::new())),
        }
    }
    MultiPolygon::new(
        parts
            .into_iter()
            .map(|(ext, ints)| geo::Polygon::new(ext, ints))
            .collect(),
    )
}

fn push_ring(out: &mut Polygons, ring: &LineString<f64>, want_ccw: bool) {
    let mut poly = ring_from_geo(ring);
    if poly.points.len() < 3 {
        return;
    }
    let a2 = poly.signed_area_x2();
    if a2 == 0 {
        return;
    }
    if (a2 > 0) != want_ccw {
        poly.points.reverse();
    }
    out.push(poly);
}

pub(crate) fn from_geo(mp: &MultiPolygon<f64>) -> Polygons {
    let mut out = Polygons::new();
    for poly in &mp.0 {
        push_ring(&mut out, poly.exterior(), true);
        for interior in poly.interiors() {
            push_ring(&mut out, interior, false);
        }
    }
    out
}

/// Union of two polygon sets.
pub fn union_(a: &Polygons, b: &Polygons) -> Polygons {
    if a.is_empty() && b.is_empty() {
        return Polygons::new();
    }
    from_geo(&to_geo(a).union(&to_geo(b)))
}

/// Intersection of two polygon sets.
pub fn intersection(a: &Polygons, b: &Polygons) -> Polygons {
    if a.is_empty() || b.is_empty() {
        return Polygons::new();
    }
    from_geo(&to_geo(a).intersection(&to_geo(b)))
}

/// `a` minus `b`.
pub fn difference(a: &Polygons, b: &Polygons) -> Polygons {
    if a.is_empty() {
        return Polygons::new();
    }
    if b.is_empty() {
        return union_(a, &Polygons::new());
    }
    from_geo(&to_geo(a).difference(&to_geo(b)))
}

/// Union of a polygon set, split into connected parts.
///
/// Each returned element is one outer contour followed by its holes.
pub fn union_parts(polygons: &Polygons) -> Vec<Polygons> {
    let merged = to_geo(polygons);
    merged
        .0
        .iter()
        .map(|poly| {
            let mut part = Polygons::new();
            push_ring(&mut part, poly.exterior(), true);
            for interior in poly.interiors() {
                push_ring(&mut part, interior, false);
            }
            part
        })
        .filter(|part| !part.is_empty())
        .collect()
}

/// Douglas-Peucker simplification of every contour with the given tolerance
/// (scaled units). Contours that collapse are dropped.
pub fn simplify(polygons: &Polygons, tolerance: i64) -> Polygons {
    let eps = tolerance.max(1) as f64;
    let mut out = Polygons::new();
    for poly in polygons {
        if poly.points.len() < 3 {
            continue;
        }
        let ring = ring_to_geo(&poly.points).simplify(&eps);
        let mut simplified = ring_from_geo(&ring);
        if simplified.points.len() < 3 || simplified.signed_area_x2() == 0 {
            continue;
        }
        // Simplification must not flip orientation.
        if (simplified.signed_area_x2() > 0) != (poly.signed_area_x2() > 0) {
            simplified.points.reverse();
        }
        out.push(simplified);
    }
    out
}

/// Clip polylines against a polygon set, keeping the parts inside.
pub fn clip_polylines(lines: &Polylines, clip: &Polygons) -> Polylines {
    if lines.is_empty() || clip.is_empty() {
        return Polylines::new();
    }
    let mls = MultiLineString::new(
        lines
            .iter()
            .filter(|l| l.points.len() >= 2)
            .map(|l| {
                LineString::new(
                    l.points
                        .iter()
                        .map(|p| Coord {
                            x: p.x as f64,
                            y: p.y as f64,
                        })
                        .collect(),
                )
            })
            .collect(),
    );
    let clipped = to_geo(clip).clip(&mls, false);
    clipped
        .0
        .iter()
        .filter_map(|ls| {
            let points: Vec<Point> = ls
                .0
                .iter()
                .map(|c| Point::new(c.x.round() as i64, c.y.round() as i64))
                .collect();
            (points.len() >= 2).then(|| Polyline::new(points))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::scaled;
    use crate::polygon::{area, contains};

    fn square(x0: f64, y0: f64, side: f64) -> Polygon {
        let (x0, y0, s) = (scaled(x0), scaled(y0), scaled(side));
        Polygon::new(vec![
            Point::new(x0, y0),
            Point::new(x0 + s, y0),
            Point::new(x0 + s, y0 + s),
            Point::new(x0, y0 + s),
        ])
    }

    #[test]
    fn union_of_overlapping_squares() {
        let merged = union_(&vec![square(0.0, 0.0, 2.0)], &vec![square(1.0, 0.0, 2.0)]);
        let expect = scaled(1.0) as f64 * scaled(1.0) as f64 * 6.0;
        let got = area(&merged);
        assert!((got - expect).abs() / expect < 1e-6, "area {got} != {expect}");
    }

    #[test]
    fn difference_produces_hole() {
        let diff = difference(&vec![square(0.0, 0.0, 4.0)], &vec![square(1.0, 1.0, 2.0)]);
        assert!(contains(&diff, Point::from_mm(0.5, 0.5)));
        assert!(!contains(&diff, Point::from_mm(2.0, 2.0)));
        let expect = scaled(1.0) as f64 * scaled(1.0) as f64 * 12.0;
        let got = area(&diff);
        assert!((got - expect).abs() / expect < 1e-6);
    }

    #[test]
    fn intersection_of_disjoint_is_empty() {
        let isect = intersection(&vec![square(0.0, 0.0, 1.0)], &vec![square(5.0, 5.0, 1.0)]);
        assert!(area(&isect) < 1.0);
    }

    #[test]
    fn union_parts_separates_islands() {
        let parts = union_parts(&vec![square(0.0, 0.0, 1.0), square(5.0, 0.0, 1.0)]);
        assert_eq!(parts.len(), 2);
    }

    #[test]
    fn clip_keeps_inside_portions() {
        let lines = vec![Polyline::new(vec![
            Point::from_mm(-1.0, 0.5),
            Point::from_mm(3.0, 0.5),
        ])];
        let clipped = clip_polylines(&lines, &vec![square(0.0, 0.0, 1.0)]);
        assert_eq!(clipped.len(), 1);
        let len: f64 = clipped[0].length();
        assert!((len - scaled(1.0) as f64).abs() < scaled(0.01) as f64);
    }

    #[test]
    fn simplify_removes_collinear_vertices() {
        let mut poly = square(0.0, 0.0, 2.0);
        // Insert a redundant midpoint on the bottom edge.
        poly.points.insert(1, Point::from_mm(1.0, 0.0));
        let simplified = simplify(&vec![poly], scaled(0.01));
        assert_eq!(simplified[0].points.len(), 4);
    }
}
