// Copyright 2025 the Taproot Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Taproot Mesh: triangle-soup helpers for branch meshing.
//!
//! Branches are extruded as capsules: rings of a discretised circle
//! triangulated into zig-zag strips, with fan-capped hemisphere poles. The
//! resulting soup is re-sliced at layer heights into
//! [`taproot_geom::Polygons`].
//!
//! Coordinates are millimetres (`f32`, matching the precision the soup
//! needs); slicing converts back into the scaled-integer plane.

mod slice;
mod soup;

pub use slice::slice_mesh;
pub use soup::{TriangleSoup, discretize_circle, triangulate_fan, triangulate_strip};
