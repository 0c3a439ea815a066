// Copyright 2025 the Taproot Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Taproot Geom: the planar geometry kernel consumed by the support core.
//!
//! All coordinates are scaled integers: one millimetre is `1_000_000` units
//! (see [`scaled`] / [`unscaled`]). Working on integers keeps the layer
//! pipeline deterministic; the Boolean operations are delegated to [`geo`]
//! and results are snapped back onto the integer grid.
//!
//! What this crate provides:
//!
//! - [`Point`], [`Polygon`], [`Polygons`], [`Polyline`], [`Polylines`] and
//!   [`BoundingBox`] value types.
//! - Polygon-set Booleans ([`union_`], [`intersection`], [`difference`]) and
//!   [`simplify`] with a tolerance.
//! - Morphological offsets with round joins ([`inflate`], [`deflate`],
//!   [`offset`], [`closing`]) and polyline thickening
//!   ([`thicken_polylines`]).
//! - A rectilinear line-infill generator ([`fill::fill_lines`]).
//! - Projection of a point onto a polygon set ([`move_inside`],
//!   [`move_inside_if_outside`]) and a signed contour distance
//!   ([`signed_distance_to_edges`]).
//!
//! This crate is not a general CSG engine: it implements exactly the
//! primitive semantics the support core consumes.

mod bbox;
mod boolean;
mod offset;
mod point;
mod polygon;
mod polyline;
mod project;

pub mod fill;

pub use bbox::BoundingBox;
pub use boolean::{clip_polylines, difference, intersection, simplify, union_, union_parts};
pub use offset::{closing, deflate, inflate, offset, thicken_polylines};
pub use point::{Point, SCALING_FACTOR, scaled, unscaled};
pub use polygon::{
    Polygon, Polygons, area, contains, get_extents, make_circle, to_polylines, total_length,
};
pub use polyline::{Polyline, Polylines};
pub use project::{move_inside, move_inside_if_outside, signed_distance_to_edges};
