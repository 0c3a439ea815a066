// Copyright 2025 the Taproot Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Triangle soup and the ring/strip/fan triangulation primitives.

use glam::Vec3;

/// An indexed triangle soup in millimetre coordinates.
#[derive(Clone, Debug, Default)]
pub struct TriangleSoup {
    /// Vertex positions.
    pub vertices: Vec<Vec3>,
    /// Triangles as vertex index triples.
    pub indices: Vec<[u32; 3]>,
}

impl TriangleSoup {
    /// An empty soup.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove all vertices and triangles, keeping allocations.
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
    }

    /// Whether the soup holds no triangles.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Cap the vertex ring `[ibegin, iend)` with a fan around vertex `ifan`.
///
/// `flip_normals` swaps the winding for the closing pole.
pub fn triangulate_fan(soup: &mut TriangleSoup, flip_normals: bool, ifan: u32, ibegin: u32, iend: u32) {
    debug_assert!(ibegin + 3 <= iend, "a fan needs at least three rim vertices");
    soup.indices.reserve((iend - ibegin) as usize);
    let mut u = iend - 1;
    for v in ibegin..iend {
        if flip_normals {
            soup.indices.push([ifan, u, v]);
        } else {
            soup.indices.push([ifan, v, u]);
        }
        u = v;
    }
}

/// Connect two vertex rings with a zig-zag triangle strip.
///
/// Starts at the vertex of the second ring closest to the first ring's start
/// and at every step takes the shorter of the two possible diagonals.
pub fn triangulate_strip(soup: &mut TriangleSoup, ibegin1: u32, iend1: u32, ibegin2: u32, iend2: u32) {
    debug_assert!(ibegin1 + 3 <= iend1, "rings need at least three vertices");
    debug_assert!(ibegin2 + 3 <= iend2, "rings need at least three vertices");
    let mut n1 = iend1 - ibegin1;
    let mut n2 = iend2 - ibegin2;
    soup.indices.reserve((n1 + n2) as usize);

    // For the first vertex of the 1st ring, find the closest vertex on the 2nd.
    let mut istart2 = ibegin2;
    {
        let p1 = soup.vertices[ibegin1 as usize];
        let mut d2min = f32::MAX;
        for i in ibegin2..iend2 {
            let d2 = (soup.vertices[i as usize] - p1).length_squared();
            if d2 < d2min {
                d2min = d2;
                istart2 = i;
            }
        }
    }

    let mut u = ibegin1;
    let mut v = istart2;
    while n1 > 0 || n2 > 0 {
        let mut u2 = u + 1;
        if u2 == iend1 {
            u2 = ibegin1;
        }
        let mut v2 = v + 1;
        if v2 == iend2 {
            v2 = ibegin2;
        }
        let take_first = if n1 == 0 {
            false
        } else if n2 == 0 {
            true
        } else {
            let l1 = (soup.vertices[u2 as usize] - soup.vertices[v as usize]).length_squared();
            let l2 = (soup.vertices[v2 as usize] - soup.vertices[u as usize]).length_squared();
            l1 < l2
        };
        if take_first {
            soup.indices.push([u, u2, v]);
            n1 -= 1;
            u = u2;
        } else {
            soup.indices.push([u, v2, v]);
            n2 -= 1;
            v = v2;
        }
    }
}

/// Discretise a 3-D circle and append its vertices to the soup.
///
/// `eps` is the maximum sag of a chord from the true circle. Returns the
/// `[begin, end)` vertex range of the new ring.
pub fn discretize_circle(
    soup: &mut TriangleSoup,
    center: Vec3,
    normal: Vec3,
    radius: f32,
    eps: f32,
) -> (u32, u32) {
    let angle_step = 2.0 * (1.0 - (eps / radius).min(1.0)).acos();
    let nsteps = if angle_step > 0.0 {
        ((core::f32::consts::TAU / angle_step).ceil() as usize).max(3)
    } else {
        3
    };
    let angle_step = core::f32::consts::TAU / nsteps as f32;

    // Coordinate frame of the circle plane.
    let mut x = normal.cross(Vec3::new(0.0, -1.0, 0.0));
    if x.length_squared() < 1e-12 {
        x = normal.cross(Vec3::new(1.0, 0.0, 0.0));
    }
    let x = x.normalize() * radius;
    let y = normal.cross(x.normalize()).normalize() * radius;

    let begin = soup.vertices.len() as u32;
    soup.vertices.reserve(nsteps);
    let mut angle = 0.0_f32;
    for _ in 0..nsteps {
        soup.vertices.push(center + x * angle.cos() + y * angle.sin());
        angle += angle_step;
    }
    (begin, soup.vertices.len() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circle_lies_on_plane_with_radius() {
        let mut soup = TriangleSoup::new();
        let (b, e) = discretize_circle(
            &mut soup,
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::Z,
            0.5,
            0.01,
        );
        assert!(e - b >= 3);
        for v in &soup.vertices[b as usize..e as usize] {
            assert!((v.z - 3.0).abs() < 1e-6);
            let r = ((v.x - 1.0).powi(2) + (v.y - 2.0).powi(2)).sqrt();
            assert!((r - 0.5).abs() < 1e-5);
        }
    }

    #[test]
    fn vertical_normal_does_not_degenerate() {
        let mut soup = TriangleSoup::new();
        let (b, e) = discretize_circle(&mut soup, Vec3::ZERO, Vec3::new(0.0, -1.0, 0.0), 1.0, 0.01);
        for v in &soup.vertices[b as usize..e as usize] {
            assert!(v.is_finite());
            assert!((v.length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn strip_consumes_both_rings() {
        let mut soup = TriangleSoup::new();
        let (b1, e1) = discretize_circle(&mut soup, Vec3::ZERO, Vec3::Z, 1.0, 0.05);
        let (b2, e2) = discretize_circle(&mut soup, Vec3::new(0.0, 0.0, 1.0), Vec3::Z, 1.0, 0.05);
        triangulate_strip(&mut soup, b1, e1, b2, e2);
        assert_eq!(soup.indices.len() as u32, (e1 - b1) + (e2 - b2));
        for tri in &soup.indices {
            for &i in tri {
                assert!((i as usize) < soup.vertices.len());
            }
        }
    }

    #[test]
    fn fan_caps_a_ring() {
        let mut soup = TriangleSoup::new();
        let (b, e) = discretize_circle(&mut soup, Vec3::ZERO, Vec3::Z, 1.0, 0.05);
        let pole = soup.vertices.len() as u32;
        soup.vertices.push(Vec3::new(0.0, 0.0, -1.0));
        triangulate_fan(&mut soup, false, pole, b, e);
        assert_eq!(soup.indices.len() as u32, e - b);
    }
}
