// Copyright 2025 the Taproot Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Rectilinear line-infill generation.
//!
//! Produces straight parallel lines at a given spacing and angle, clipped to
//! a polygon set. This is the single pattern the tip sampler consumes; the
//! zig-zag connection of neighbouring lines is irrelevant for sampling and is
//! not performed here.

use crate::boolean::clip_polylines;
use crate::point::Point;
use crate::polygon::{Polygons, get_extents};
use crate::polyline::{Polyline, Polylines};

/// Generate parallel infill lines inside `polygons`.
///
/// - `spacing`: distance between neighbouring lines, scaled units. Must be
///   positive; an empty result is returned otherwise.
/// - `angle`: direction of the lines in radians (0 = along +X).
/// - `shift`: lateral phase shift of the line raster, scaled units.
pub fn fill_lines(polygons: &Polygons, spacing: i64, angle: f64, shift: i64) -> Polylines {
    if polygons.is_empty() || spacing <= 0 {
        return Polylines::new();
    }
    let bbox = get_extents(polygons);
    if bbox.is_empty() {
        return Polylines::new();
    }

    let dir = (angle.cos(), angle.sin());
    let normal = (-angle.sin(), angle.cos());
    let center = bbox.center();
    let cx = center.x as f64;
    let cy = center.y as f64;

    // Half-diagonal of the bounding box bounds both the line length and the
    // raster extent in the normal direction.
    let ex = (bbox.max.x - bbox.min.x) as f64 * 0.5;
    let ey = (bbox.max.y - bbox.min.y) as f64 * 0.5;
    let reach = (ex * ex + ey * ey).sqrt() + spacing as f64;

    let spacing_f = spacing as f64;
    let shift_f = shift as f64;
    let k_max = (reach / spacing_f).ceil() as i64;

    let mut raster = Polylines::new();
    for k in -k_max..=k_max {
        let offset = shift_f + k as f64 * spacing_f;
        let ox = cx + normal.0 * offset;
        let oy = cy + normal.1 * offset;
        let a = Point::new(
            (ox - dir.0 * reach).round() as i64,
            (oy - dir.1 * reach).round() as i64,
        );
        let b = Point::new(
            (ox + dir.0 * reach).round() as i64,
            (oy + dir.1 * reach).round() as i64,
        );
        raster.push(Polyline::new(vec![a, b]));
    }

    clip_polylines(&raster, polygons)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::scaled;
    use crate::polygon::Polygon;

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
    fn horizontal_lines_cover_square() {
        let lines = fill_lines(&square(2.0), scaled(0.5), 0.0, 0);
        assert!(!lines.is_empty());
        // Every clipped line stays within the square width.
        for line in &lines {
            let len = line.length();
            assert!(len <= scaled(2.0) as f64 + scaled(0.01) as f64);
            assert!(len > 0.0);
        }
        // Spacing 0.5 over a 2 mm square gives on the order of 4-5 lines.
        assert!((3..=6).contains(&lines.len()), "got {} lines", lines.len());
    }

    #[test]
    fn angled_lines_are_angled() {
        let lines = fill_lines(&square(2.0), scaled(0.5), core::f64::consts::FRAC_PI_2, 0);
        assert!(!lines.is_empty());
        for line in &lines {
            let d = *line.points.last().unwrap() - line.points[0];
            // Vertical direction: |dx| << |dy|.
            assert!(d.x.abs() < d.y.abs() / 100 + scaled(0.01));
        }
    }

    #[test]
    fn empty_input_yields_no_lines() {
        assert!(fill_lines(&Polygons::new(), scaled(0.5), 0.0, 0).is_empty());
        assert!(fill_lines(&square(1.0), 0, 0.0, 0).is_empty());
    }
}
