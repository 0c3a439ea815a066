// Copyright 2025 the Taproot Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Morphological offsets with round joins.
//!
//! Growing and shrinking are expressed through the Boolean kernel: the
//! contour (or polyline) is thickened into a band (one quad per segment plus
//! one disc per vertex, a Minkowski sum with a disc) and the band is unioned
//! with or subtracted from the input. This mirrors what a round join
//! offsetter produces while staying on the single Boolean backend.

use geo::{BooleanOps, Coord, LineString, MultiPolygon};

use crate::boolean::{from_geo, to_geo, union_tree};
use crate::point::{Point, scaled};
use crate::polygon::Polygons;
use crate::polyline::Polylines;

/// Maximum deviation of a disc approximation from the true circle.
const ARC_EPS_MM: f64 = 0.01;

fn disc_steps(radius: f64) -> usize {
    let eps = scaled(ARC_EPS_MM) as f64;
    if radius <= eps {
        return 8;
    }
    let angle_step = 2.0 * (1.0 - eps / radius).acos();
    ((core::f64::consts::TAU / angle_step).ceil() as usize).clamp(8, 64)
}

fn disc(center: Coord<f64>, radius: f64) -> geo::Polygon<f64> {
    let steps = disc_steps(radius);
    let mut coords = Vec::with_capacity(steps + 1);
    for i in 0..steps {
        let a = core::f64::consts::TAU * (i as f64) / (steps as f64);
        coords.push(Coord {
            x: center.x + radius * a.cos(),
            y: center.y + radius * a.sin(),
        });
    }
    coords.push(coords[0]);
    geo::Polygon::new(LineString::new(coords), Vec::new())
}

fn segment_quad(a: Coord<f64>, b: Coord<f64>, radius: f64) -> Option<geo::Polygon<f64>> {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len = (dx * dx + dy * dy).sqrt();
    if len <= 0.0 {
        return None;
    }
    let nx = -dy / len * radius;
    let ny = dx / len * radius;
    let coords = vec![
        Coord { x: a.x + nx, y: a.y + ny },
        Coord { x: b.x + nx, y: b.y + ny },
        Coord { x: b.x - nx, y: b.y - ny },
        Coord { x: a.x - nx, y: a.y - ny },
        Coord { x: a.x + nx, y: a.y + ny },
    ];
    Some(geo::Polygon::new(LineString::new(coords), Vec::new()))
}

/// The band of all points within `radius` of the given chain.
///
/// `closed` adds the closing segment from the last vertex to the first.
fn chain_band(points: &[Point], closed: bool, radius: f64) -> Vec<MultiPolygon<f64>> {
    let mut pieces = Vec::new();
    let coords: Vec<Coord<f64>> = points
        .iter()
        .map(|p| Coord {
            x: p.x as f64,
            y: p.y as f64,
        })
        .collect();
    for c in &coords {
        pieces.push(MultiPolygon::new(vec![disc(*c, radius)]));
    }
    let n = coords.len();
    let last = if closed { n } else { n.saturating_sub(1) };
    for i in 0..last {
        if let Some(quad) = segment_quad(coords[i], coords[(i + 1) % n], radius) {
            pieces.push(MultiPolygon::new(vec![quad]));
        }
    }
    pieces
}

fn boundary_band(polygons: &Polygons, radius: f64) -> MultiPolygon<f64> {
    let mut pieces = Vec::new();
    for poly in polygons {
        if poly.points.len() < 2 {
            continue;
        }
        pieces.extend(chain_band(&poly.points, true, radius));
    }
    union_tree(pieces)
}

/// Grow a polygon set by `delta` (round joins). Non-positive deltas only
/// normalise the input.
pub fn inflate(polygons: &Polygons, delta: i64) -> Polygons {
    if polygons.is_empty() {
        return Polygons::new();
    }
    let base = to_geo(polygons);
    if delta <= 0 {
        return from_geo(&base.union(&MultiPolygon::new(Vec::new())));
    }
    let band = boundary_band(polygons, delta as f64);
    from_geo(&base.union(&band))
}

/// Shrink a polygon set by `delta` (round joins). Non-positive deltas only
/// normalise the input.
pub fn deflate(polygons: &Polygons, delta: i64) -> Polygons {
    if polygons.is_empty() {
        return Polygons::new();
    }
    let base = to_geo(polygons);
    if delta <= 0 {
        return from_geo(&base.union(&MultiPolygon::new(Vec::new())));
    }
    let band = boundary_band(polygons, delta as f64);
    from_geo(&base.difference(&band))
}

/// Signed offset: grows for positive `delta`, shrinks for negative.
pub fn offset(polygons: &Polygons, delta: i64) -> Polygons {
    if delta >= 0 {
        inflate(polygons, delta)
    } else {
        deflate(polygons, -delta)
    }
}

/// Morphological closing: grow then shrink by `delta`, filling concave
/// features narrower than `2 * delta`.
pub fn closing(polygons: &Polygons, delta: i64) -> Polygons {
    deflate(&inflate(polygons, delta), delta)
}

/// Thicken open polylines into polygons of width `2 * radius` with round
/// caps.
pub fn thicken_polylines(lines: &Polylines, radius: i64) -> Polygons {
    if radius <= 0 {
        return Polygons::new();
    }
    let mut pieces = Vec::new();
    for line in lines {
        if line.points.is_empty() {
            continue;
        }
        pieces.extend(chain_band(&line.points, false, radius as f64));
    }
    from_geo(&union_tree(pieces))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::scaled;
    use crate::polygon::{Polygon, area, contains, make_circle};
    use crate::polyline::Polyline;

    fn square(side_mm: f64) -> Polygons {
        let s = scaled(side_mm);
        vec![Polygon::new(vec![
            Point::new(0, 0),
            Point::new(s, 0),
            Point::new(s, s),
            Point::new(0, s),
        ])]
    }

    #[test]
    fn inflate_grows_area() {
        let grown = inflate(&square(2.0), scaled(0.5));
        // Square + four edge bands + four quarter-round corners.
        let s = scaled(2.0) as f64;
        let d = scaled(0.5) as f64;
        let expect = s * s + 4.0 * s * d + core::f64::consts::PI * d * d;
        let got = area(&grown);
        assert!((got - expect).abs() / expect < 0.01, "area {got} != {expect}");
        assert!(contains(&grown, Point::from_mm(-0.4, 1.0)));
        assert!(!contains(&grown, Point::from_mm(-0.6, 1.0)));
    }

    #[test]
    fn deflate_shrinks_area() {
        let shrunk = deflate(&square(2.0), scaled(0.5));
        let expect = scaled(1.0) as f64 * scaled(1.0) as f64;
        let got = area(&shrunk);
        assert!((got - expect).abs() / expect < 0.01, "area {got} != {expect}");
        assert!(contains(&shrunk, Point::from_mm(1.0, 1.0)));
        assert!(!contains(&shrunk, Point::from_mm(0.4, 1.0)));
    }

    #[test]
    fn deflate_can_annihilate() {
        let shrunk = deflate(&square(1.0), scaled(0.6));
        assert!(area(&shrunk) < (scaled(0.01) as f64).powi(2));
    }

    #[test]
    fn closing_fills_narrow_notch() {
        // A square with a 0.2 mm wide notch cut into the top edge.
        let notch = Polygon::new(vec![
            Point::from_mm(0.9, 1.0),
            Point::from_mm(1.1, 1.0),
            Point::from_mm(1.1, 2.1),
            Point::from_mm(0.9, 2.1),
        ]);
        let notched = crate::boolean::difference(&square(2.0), &vec![notch]);
        assert!(!contains(&notched, Point::from_mm(1.0, 1.9)));
        let closed = closing(&notched, scaled(0.3));
        assert!(contains(&closed, Point::from_mm(1.0, 1.9)));
    }

    #[test]
    fn thicken_polyline_is_a_capsule() {
        let lines = vec![Polyline::new(vec![
            Point::from_mm(0.0, 0.0),
            Point::from_mm(2.0, 0.0),
        ])];
        let band = thicken_polylines(&lines, scaled(0.25));
        let l = scaled(2.0) as f64;
        let r = scaled(0.25) as f64;
        let expect = 2.0 * r * l + core::f64::consts::PI * r * r;
        let got = area(&band);
        assert!((got - expect).abs() / expect < 0.01, "area {got} != {expect}");
    }

    #[test]
    fn inflate_deflate_circle_round_trip() {
        let c = vec![make_circle(scaled(1.0), 64)];
        let round = deflate(&inflate(&c, scaled(0.3)), scaled(0.3));
        let expect = area(&c);
        let got = area(&round);
        assert!((got - expect).abs() / expect < 0.02);
    }
}
