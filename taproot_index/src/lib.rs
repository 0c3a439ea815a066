// Copyright 2025 the Taproot Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Taproot Index: small spatial acceleration utilities.
//!
//! Three pieces, all geared towards the support-generation pipeline:
//!
//! - [`Aabb2D`]: a plain 2-D axis-aligned box over a numeric scalar.
//! - [`LineTree`]: a static AABB tree over line segments answering pruned
//!   squared-distance queries, used to nudge branch spheres away from layer
//!   contours.
//! - [`partition_by_centroid`]: in-place recursive median ordering of items
//!   by their box centroids, used to form deterministic, spatially coherent
//!   buckets before influence-area merging.
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod aabb;
mod linetree;
mod partition;

pub use aabb::Aabb2D;
pub use linetree::{LineTree, Segment};
pub use partition::partition_by_centroid;
