// Copyright 2025 the Taproot Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The model-volume oracle: cached collision, placeable, wall-restriction
//! and avoidance areas.
//!
//! Every query is keyed by a radius bucket and a layer. Radii are rounded up
//! to a multiple of the sample resolution so the caches stay finite.
//! Avoidances are built bottom-up: the avoidance of a layer is the collision
//! of that layer unioned with the avoidance of the layer below shrunk by the
//! per-layer movement limit, so entering an avoidance area anywhere means a
//! branch can no longer escape to its anchor while honouring the branch
//! angle.
//!
//! Caches are concurrent and insert-only; readers that miss a key compute
//! the value (and all intermediate layers of an avoidance chain, so chains
//! never recurse unboundedly).

use std::sync::Arc;

use dashmap::DashMap;
use rayon::prelude::*;

use taproot_geom::{
    Polygons, closing, deflate, difference, inflate, intersection, simplify, union_,
};

use crate::config::{LayerIndex, Settings};
use crate::element::AvoidanceKind;
use crate::{CancelToken, Error};

/// Key of the collision-style caches.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
struct RadiusLayerKey {
    radius: i64,
    layer: LayerIndex,
    min_xy: bool,
}

/// Key of the avoidance cache. Unlike the original's recursion counter this
/// key is exact: every computed layer is materialised.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
struct AvoidanceKey {
    radius: i64,
    layer: LayerIndex,
    kind: AvoidanceKind,
    to_model: bool,
    min_xy: bool,
}

/// Cached polygon volumes derived from the sliced model.
pub struct TreeModelVolumes {
    /// Model outline per layer, raft layers included as leading empties.
    layer_outlines: Vec<Polygons>,
    /// Printable area of the machine bed.
    bed_area: Polygons,
    radius_sample_resolution: i64,
    xy_distance: i64,
    xy_min_distance: i64,
    min_feature_size: i64,
    z_distance_top_layers: usize,
    z_distance_bottom_layers: usize,
    max_move: i64,
    max_move_slow: i64,
    resolution: i64,
    support_rests_on_model: bool,

    collision: DashMap<RadiusLayerKey, Arc<Polygons>>,
    collision_holefree: DashMap<RadiusLayerKey, Arc<Polygons>>,
    placeable: DashMap<RadiusLayerKey, Arc<Polygons>>,
    wall_restriction: DashMap<RadiusLayerKey, Arc<Polygons>>,
    avoidance: DashMap<AvoidanceKey, Arc<Polygons>>,
}

impl core::fmt::Debug for TreeModelVolumes {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TreeModelVolumes")
            .field("layers", &self.layer_outlines.len())
            .field("collision_entries", &self.collision.len())
            .field("avoidance_entries", &self.avoidance.len())
            .finish_non_exhaustive()
    }
}

impl TreeModelVolumes {
    /// Build the oracle over per-layer model outlines.
    ///
    /// `outlines` is indexed by object layer; raft layers are prepended as
    /// empty layers so oracle layers match support layer indices.
    pub fn new(outlines: &[Polygons], bed_area: Polygons, settings: &Settings) -> Self {
        let raft = settings.raft_layers.len();
        let mut layer_outlines = Vec::with_capacity(raft + outlines.len());
        layer_outlines.resize(raft, Polygons::new());
        layer_outlines.extend(outlines.iter().cloned());
        Self {
            layer_outlines,
            bed_area,
            radius_sample_resolution: taproot_geom::scaled(0.1),
            xy_distance: settings.xy_distance,
            xy_min_distance: settings.xy_min_distance,
            min_feature_size: settings.min_feature_size,
            z_distance_top_layers: settings.z_distance_top_layers,
            z_distance_bottom_layers: settings.z_distance_bottom_layers,
            max_move: settings.maximum_move_distance,
            max_move_slow: settings.maximum_move_distance_slow,
            resolution: settings.resolution,
            support_rests_on_model: settings.support_rests_on_model,
            collision: DashMap::new(),
            collision_holefree: DashMap::new(),
            placeable: DashMap::new(),
            wall_restriction: DashMap::new(),
            avoidance: DashMap::new(),
        }
    }

    /// The printable bed area.
    pub fn bed_area(&self) -> &Polygons {
        &self.bed_area
    }

    /// Number of layers known to the oracle.
    pub fn layer_count(&self) -> usize {
        self.layer_outlines.len()
    }

    /// Round a radius up to the cache sample resolution. Zero is its own
    /// bucket.
    pub fn ceil_radius(&self, radius: i64) -> i64 {
        if radius <= 0 {
            0
        } else {
            let res = self.radius_sample_resolution;
            ((radius + res - 1) / res) * res
        }
    }

    /// The bucketed radius a query for `radius` will actually use.
    pub fn get_radius_next_ceil(&self, radius: i64) -> i64 {
        self.ceil_radius(radius)
    }

    fn outline(&self, layer: LayerIndex) -> &Polygons {
        static EMPTY: Polygons = Polygons::new();
        if layer < 0 || layer as usize >= self.layer_outlines.len() {
            &EMPTY
        } else {
            &self.layer_outlines[layer as usize]
        }
    }

    /// The model outline in the Z clearance span around `layer`.
    fn outline_in_z_span(&self, layer: LayerIndex) -> Polygons {
        let lo = layer - self.z_distance_bottom_layers as LayerIndex;
        let hi = layer + self.z_distance_top_layers as LayerIndex;
        let mut acc = self.outline(layer).clone();
        for l in lo..=hi {
            if l != layer {
                acc = union_(&acc, self.outline(l));
            }
        }
        acc
    }

    /// Layer outline expanded by `radius` plus the X/Y clearance: everywhere
    /// a branch centre of that radius must not be.
    pub fn get_collision(&self, radius: i64, layer: LayerIndex, min_xy: bool) -> Arc<Polygons> {
        let radius = self.ceil_radius(radius);
        let key = RadiusLayerKey {
            radius,
            layer,
            min_xy,
        };
        if let Some(hit) = self.collision.get(&key) {
            return hit.clone();
        }
        let xy = if min_xy {
            self.xy_min_distance
        } else {
            self.xy_distance
        };
        let value = Arc::new(simplify(
            &inflate(&self.outline_in_z_span(layer), radius + xy),
            self.resolution / 2,
        ));
        self.collision.entry(key).or_insert(value).clone()
    }

    /// Collision with hole passages narrower than the branch closed off.
    /// Used by the "safe" avoidances.
    pub fn get_collision_holefree(
        &self,
        radius: i64,
        layer: LayerIndex,
        min_xy: bool,
    ) -> Arc<Polygons> {
        let radius = self.ceil_radius(radius);
        let key = RadiusLayerKey {
            radius,
            layer,
            min_xy,
        };
        if let Some(hit) = self.collision_holefree.get(&key) {
            return hit.clone();
        }
        let base = self.get_collision(radius, layer, min_xy);
        let close_by = radius.max(self.min_feature_size);
        let value = Arc::new(simplify(&closing(&base, close_by), self.resolution / 2));
        self.collision_holefree.entry(key).or_insert(value).clone()
    }

    /// Model top surfaces at `layer` on which a branch of `radius` can rest
    /// whole.
    pub fn get_placeable_areas(&self, radius: i64, layer: LayerIndex) -> Arc<Polygons> {
        let radius = self.ceil_radius(radius);
        let key = RadiusLayerKey {
            radius,
            layer,
            min_xy: false,
        };
        if let Some(hit) = self.placeable.get(&key) {
            return hit.clone();
        }
        let value = if layer <= 0 {
            Arc::new(Polygons::new())
        } else {
            // Surfaces of the layer below not covered by this layer.
            let top = difference(self.outline(layer - 1), self.outline(layer));
            Arc::new(deflate(&top, radius))
        };
        self.placeable.entry(key).or_insert(value).clone()
    }

    /// Region in which moving a centre between `layer` and the layer below
    /// would cross an inward model wall.
    pub fn get_wall_restriction(
        &self,
        radius: i64,
        layer: LayerIndex,
        min_xy: bool,
    ) -> Arc<Polygons> {
        let radius = self.ceil_radius(radius);
        let key = RadiusLayerKey {
            radius,
            layer,
            min_xy,
        };
        if let Some(hit) = self.wall_restriction.get(&key) {
            return hit.clone();
        }
        let value = if layer <= 0 {
            Arc::new(Polygons::new())
        } else {
            Arc::new(intersection(
                &self.get_collision(0, layer - 1, min_xy),
                &self.get_collision(radius, layer, min_xy),
            ))
        };
        self.wall_restriction.entry(key).or_insert(value).clone()
    }

    /// The avoidance area for a branch of `radius` at `layer`.
    ///
    /// A centre outside the avoidance can still reach its anchor (the build
    /// plate, or a placeable model area for `to_model`) without exceeding
    /// the allowed per-layer movement.
    pub fn get_avoidance(
        &self,
        radius: i64,
        layer: LayerIndex,
        kind: AvoidanceKind,
        to_model: bool,
        min_xy: bool,
    ) -> Arc<Polygons> {
        let radius = self.ceil_radius(radius);
        let key = AvoidanceKey {
            radius,
            layer,
            kind,
            to_model,
            min_xy,
        };
        if let Some(hit) = self.avoidance.get(&key) {
            return hit.clone();
        }

        // Find the highest already-computed layer below.
        let mut start = 0;
        let mut latest: Option<Arc<Polygons>> = None;
        for l in (0..layer).rev() {
            let probe = AvoidanceKey { layer: l, ..key };
            if let Some(hit) = self.avoidance.get(&probe) {
                start = l + 1;
                latest = Some(hit.clone());
                break;
            }
        }

        let max_move = if kind == AvoidanceKind::Slow {
            self.max_move_slow
        } else {
            self.max_move
        };

        let mut current = latest;
        for l in start..=layer {
            let coll = if kind == AvoidanceKind::FastSafe {
                self.get_collision_holefree(radius, l, min_xy)
            } else {
                self.get_collision(radius, l, min_xy)
            };
            // The shrunk part is simplified before the union so the result
            // always covers the collision exactly.
            let mut avoid = match &current {
                None => coll.as_ref().clone(),
                Some(prev) => union_(
                    &coll,
                    &simplify(&deflate(prev, max_move), self.resolution / 2),
                ),
            };
            if to_model {
                avoid = difference(&avoid, &self.get_placeable_areas(radius, l));
            }
            let avoid = Arc::new(avoid);
            let stored = self
                .avoidance
                .entry(AvoidanceKey { layer: l, ..key })
                .or_insert(avoid)
                .clone();
            current = Some(stored);
        }
        current.unwrap_or_default()
    }

    /// The largest cached collision with a bucket no larger than `radius`
    /// at `layer`, together with the bucket used. Falls back to radius zero.
    pub fn get_collision_lower_bound_area(
        &self,
        layer: LayerIndex,
        radius: i64,
    ) -> (i64, Arc<Polygons>) {
        let ceil = self.ceil_radius(radius);
        let mut bucket = ceil;
        while bucket > 0 {
            let key = RadiusLayerKey {
                radius: bucket,
                layer,
                min_xy: true,
            };
            if let Some(hit) = self.collision.get(&key) {
                return (bucket, hit.clone());
            }
            bucket -= self.radius_sample_resolution;
        }
        (0, self.get_collision(0, layer, true))
    }

    /// Warm the caches for every radius a tip could grow to below
    /// `max_layer`.
    pub fn precalculate(
        &self,
        settings: &Settings,
        max_layer: LayerIndex,
        cancel: CancelToken<'_>,
    ) -> Result<(), Error> {
        let min_xy_variants: &[bool] = if settings.min_xy_dist_enabled() {
            &[false, true]
        } else {
            &[false]
        };

        // Radii any element could use, bucketed and deduplicated.
        let mut radii: Vec<i64> = (0..=max_layer.max(0) as usize)
            .map(|dtt| self.ceil_radius(settings.get_radius(dtt, 0.0)))
            .collect();
        radii.push(0);
        radii.sort_unstable();
        radii.dedup();

        // Collisions first; the avoidances build on them.
        radii.par_iter().try_for_each(|&radius| {
            for &min_xy in min_xy_variants {
                for layer in 0..=max_layer {
                    cancel.check()?;
                    self.get_collision(radius, layer, min_xy);
                }
            }
            Ok(())
        })?;

        let kinds = [
            AvoidanceKind::Slow,
            AvoidanceKind::FastSafe,
            AvoidanceKind::Fast,
        ];
        radii.par_iter().try_for_each(|&radius| {
            for &min_xy in min_xy_variants {
                for kind in kinds {
                    cancel.check()?;
                    self.get_avoidance(radius, max_layer, kind, false, min_xy);
                    if self.support_rests_on_model {
                        cancel.check()?;
                        self.get_avoidance(radius, max_layer, kind, true, min_xy);
                    }
                }
            }
            Ok(())
        })
    }

    /// Drop everything except the zero-radius collision used by the final
    /// re-slicing stage.
    pub fn clear_all_but_object_collision(&self) {
        self.collision.retain(|key, _| key.radius == 0);
        self.collision_holefree.clear();
        self.placeable.clear();
        self.wall_restriction.clear();
        self.avoidance.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MeshGroupSettings;
    use taproot_geom::{Point, Polygon, area, contains, scaled};

    fn square_outlines(layers: usize, side_mm: f64) -> Vec<Polygons> {
        let s = scaled(side_mm);
        let square = Polygon::new(vec![
            Point::new(0, 0),
            Point::new(s, 0),
            Point::new(s, s),
            Point::new(0, s),
        ]);
        vec![vec![square]; layers]
    }

    fn bed() -> Polygons {
        let s = scaled(200.0);
        vec![Polygon::new(vec![
            Point::new(-s, -s),
            Point::new(s, -s),
            Point::new(s, s),
            Point::new(-s, s),
        ])]
    }

    #[test]
    fn collision_grows_with_radius() {
        let settings = Settings::new(&MeshGroupSettings::default());
        let volumes = TreeModelVolumes::new(&square_outlines(10, 5.0), bed(), &settings);
        let small = volumes.get_collision(scaled(0.5), 4, false);
        let large = volumes.get_collision(scaled(2.0), 4, false);
        assert!(area(&large) > area(&small));
        // The collision must cover the outline expanded by at least the
        // radius + xy distance on the outside.
        assert!(contains(&large, Point::from_mm(-2.0, 2.5)));
    }

    #[test]
    fn avoidance_contains_collision() {
        let settings = Settings::new(&MeshGroupSettings::default());
        let volumes = TreeModelVolumes::new(&square_outlines(12, 5.0), bed(), &settings);
        for layer in [0, 3, 9] {
            let collision = volumes.get_collision(scaled(0.5), layer, false);
            let avoidance =
                volumes.get_avoidance(scaled(0.5), layer, AvoidanceKind::Fast, false, false);
            let excess = difference(&collision, &avoidance);
            assert!(
                area(&excess) < crate::config::tiny_area_threshold(),
                "avoidance must cover collision on layer {layer}"
            );
        }
    }

    #[test]
    fn avoidance_contains_shrunk_avoidance_below() {
        let settings = Settings::new(&MeshGroupSettings::default());
        let volumes = TreeModelVolumes::new(&square_outlines(12, 5.0), bed(), &settings);
        let r = scaled(0.5);
        let below = volumes.get_avoidance(r, 5, AvoidanceKind::Fast, false, false);
        let here = volumes.get_avoidance(r, 6, AvoidanceKind::Fast, false, false);
        let shrunk = deflate(&below, settings.maximum_move_distance);
        let excess = difference(&shrunk, &here);
        // Simplification may nibble slivers up to the resolution off the
        // boundary; anything beyond that is a real violation.
        let tolerance =
            settings.resolution as f64 * taproot_geom::total_length(&shrunk).max(1.0);
        assert!(excess.is_empty() || area(&excess) < tolerance.max(crate::config::tiny_area_threshold()));
    }

    #[test]
    fn radius_bucketing_rounds_up() {
        let settings = Settings::new(&MeshGroupSettings::default());
        let volumes = TreeModelVolumes::new(&square_outlines(2, 1.0), bed(), &settings);
        assert_eq!(volumes.ceil_radius(0), 0);
        let res = scaled(0.1);
        assert_eq!(volumes.ceil_radius(1), res);
        assert_eq!(volumes.ceil_radius(res), res);
        assert_eq!(volumes.ceil_radius(res + 1), 2 * res);
    }

    #[test]
    fn placeable_areas_appear_below_steps() {
        let settings = Settings::new(&MeshGroupSettings::default());
        // A pyramid step: wide below, narrow above; the step is placeable.
        let mut outlines = square_outlines(4, 10.0);
        outlines[2] = square_outlines(1, 4.0).pop().unwrap();
        outlines[3] = square_outlines(1, 4.0).pop().unwrap();
        let volumes = TreeModelVolumes::new(&outlines, bed(), &settings);
        let placeable = volumes.get_placeable_areas(scaled(0.4), 2);
        assert!(area(&placeable) > 0.0);
        assert!(contains(&placeable, Point::from_mm(8.0, 8.0)));
        // Radius larger than the ledge kills it.
        let too_big = volumes.get_placeable_areas(scaled(4.0), 2);
        assert!(area(&too_big) < area(&placeable));
    }

    #[test]
    fn clear_keeps_zero_radius_collision() {
        let settings = Settings::new(&MeshGroupSettings::default());
        let volumes = TreeModelVolumes::new(&square_outlines(4, 5.0), bed(), &settings);
        volumes.get_collision(0, 1, true);
        volumes.get_collision(scaled(1.0), 1, true);
        volumes.get_avoidance(scaled(1.0), 2, AvoidanceKind::Fast, false, false);
        volumes.clear_all_but_object_collision();
        assert!(volumes.collision.iter().all(|e| e.key().radius == 0));
        assert_eq!(volumes.avoidance.len(), 0);
    }

    #[test]
    fn extents_of_collision_cover_model() {
        let settings = Settings::new(&MeshGroupSettings::default());
        let volumes = TreeModelVolumes::new(&square_outlines(3, 5.0), bed(), &settings);
        let coll = volumes.get_collision(0, 0, false);
        let bbox = taproot_geom::get_extents(&coll);
        assert!(bbox.min.x < 0 && bbox.max.x > scaled(5.0));
    }
}
