// Copyright 2025 the Taproot Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Re-slicing of a triangle soup at given Z planes.

use glam::Vec3;
use hashbrown::HashMap;

use taproot_geom::{Point, Polygon, Polygons, scaled, union_};

use crate::soup::TriangleSoup;

/// Quantisation used to match up segment endpoints while chaining loops.
const CHAIN_EPS_MM: f64 = 0.001;

#[derive(Copy, Clone)]
struct SliceSegment {
    a: [f64; 2],
    b: [f64; 2],
}

fn key(p: [f64; 2]) -> (i64, i64) {
    (
        (p[0] / CHAIN_EPS_MM).round() as i64,
        (p[1] / CHAIN_EPS_MM).round() as i64,
    )
}

/// Intersect one triangle with the plane `z`, if it crosses it.
///
/// Vertices exactly on the plane count as above, so degenerate zero-length
/// segments are not produced.
fn triangle_plane_segment(v: [Vec3; 3], z: f32) -> Option<SliceSegment> {
    let above = [v[0].z >= z, v[1].z >= z, v[2].z >= z];
    let num_above = above.iter().filter(|&&a| a).count();
    if num_above == 0 || num_above == 3 {
        return None;
    }
    // The vertex alone on its side of the plane.
    let lone = (0..3).find(|&i| {
        let alone_above = above[i] && num_above == 1;
        let alone_below = !above[i] && num_above == 2;
        alone_above || alone_below
    })?;
    let p = v[lone];
    let q = v[(lone + 1) % 3];
    let r = v[(lone + 2) % 3];
    let cut = |a: Vec3, b: Vec3| -> [f64; 2] {
        let t = f64::from(z - a.z) / f64::from(b.z - a.z);
        [
            f64::from(a.x) + (f64::from(b.x) - f64::from(a.x)) * t,
            f64::from(a.y) + (f64::from(b.y) - f64::from(a.y)) * t,
        ]
    };
    let s1 = cut(p, q);
    let s2 = cut(p, r);
    // Orient the segment so that loop chaining produces consistent windings:
    // with the triangle (p, q, r) counter-clockwise seen from outside, the
    // interior of the slice lies left of (s1 -> s2) when the lone vertex is
    // above the plane.
    if above[lone] {
        Some(SliceSegment { a: s2, b: s1 })
    } else {
        Some(SliceSegment { a: s1, b: s2 })
    }
}

fn chain_loops(segments: Vec<SliceSegment>) -> Vec<Vec<[f64; 2]>> {
    let mut start_of: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
    for (i, seg) in segments.iter().enumerate() {
        start_of.entry(key(seg.a)).or_default().push(i);
    }
    let mut used = vec![false; segments.len()];
    let mut loops = Vec::new();
    for first in 0..segments.len() {
        if used[first] {
            continue;
        }
        let mut chain = Vec::new();
        let mut current = first;
        used[first] = true;
        chain.push(segments[first].a);
        loop {
            chain.push(segments[current].b);
            let k = key(segments[current].b);
            let next = start_of
                .get(&k)
                .and_then(|cands| cands.iter().copied().find(|&c| !used[c]));
            match next {
                Some(n) => {
                    used[n] = true;
                    current = n;
                }
                None => break,
            }
        }
        // Closed if the walk came back to the start.
        if chain.len() >= 4 && key(chain[0]) == key(*chain.last().unwrap()) {
            chain.pop();
            loops.push(chain);
        }
    }
    loops
}

/// Slice the soup at each plane in `zs` (millimetres).
///
/// Returns one polygon set per plane, in "positive" mode: the region covered
/// by the mesh. Open chains caused by non-watertight input are dropped.
pub fn slice_mesh(soup: &TriangleSoup, zs: &[f32]) -> Vec<Polygons> {
    let mut out = Vec::with_capacity(zs.len());
    for &z in zs {
        let mut segments = Vec::new();
        for tri in &soup.indices {
            let v = [
                soup.vertices[tri[0] as usize],
                soup.vertices[tri[1] as usize],
                soup.vertices[tri[2] as usize],
            ];
            if let Some(seg) = triangle_plane_segment(v, z) {
                segments.push(seg);
            }
        }
        if segments.is_empty() {
            out.push(Polygons::new());
            continue;
        }
        let loops = chain_loops(segments);
        let mut polygons = Polygons::new();
        for chain in loops {
            let mut poly = Polygon::new(
                chain
                    .iter()
                    .map(|p| Point::new(scaled(p[0]), scaled(p[1])))
                    .collect(),
            );
            poly.points.dedup();
            if poly.points.len() < 3 || poly.signed_area_x2() == 0 {
                continue;
            }
            polygons.push(poly);
        }
        // Resolve nesting and overlaps of the raw loops.
        out.push(union_(&polygons, &Polygons::new()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soup::{discretize_circle, triangulate_fan, triangulate_strip};
    use taproot_geom::{area, contains};

    /// A closed vertical cylinder from z=0 to z=2 with radius 1.
    fn cylinder() -> TriangleSoup {
        let mut soup = TriangleSoup::new();
        let (b0, e0) = discretize_circle(&mut soup, Vec3::ZERO, Vec3::Z, 1.0, 0.001);
        let (b1, e1) = discretize_circle(&mut soup, Vec3::new(0.0, 0.0, 2.0), Vec3::Z, 1.0, 0.001);
        triangulate_strip(&mut soup, b0, e0, b1, e1);
        let bottom = soup.vertices.len() as u32;
        soup.vertices.push(Vec3::new(0.0, 0.0, 0.0));
        triangulate_fan(&mut soup, false, bottom, b0, e0);
        let top = soup.vertices.len() as u32;
        soup.vertices.push(Vec3::new(0.0, 0.0, 2.0));
        triangulate_fan(&mut soup, true, top, b1, e1);
        soup
    }

    #[test]
    fn cylinder_slices_are_discs() {
        let soup = cylinder();
        let slices = slice_mesh(&soup, &[0.5, 1.0, 1.5]);
        assert_eq!(slices.len(), 3);
        let expect = core::f64::consts::PI * (scaled(1.0) as f64).powi(2);
        for polygons in &slices {
            assert!(!polygons.is_empty(), "slice must not be empty");
            let got = area(polygons);
            assert!((got - expect).abs() / expect < 0.01, "area {got} != {expect}");
            assert!(contains(polygons, Point::new(0, 0)));
        }
    }

    #[test]
    fn planes_outside_mesh_are_empty() {
        let soup = cylinder();
        let slices = slice_mesh(&soup, &[-0.5, 2.5]);
        assert!(slices[0].is_empty());
        assert!(slices[1].is_empty());
    }
}
