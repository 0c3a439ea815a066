// Copyright 2025 the Taproot Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Support elements: the nodes of the influence-area DAG.
//!
//! Elements live in per-layer arenas (`Vec<SupportElement>`); the DAG is
//! layered, so `parents` holds indices into the arena of the layer directly
//! above. Deletions mark elements and a compaction pass remaps the indices.

use smallvec::SmallVec;
use taproot_geom::{Point, Polygons};

use crate::config::{LayerIndex, Settings};

/// Avoidance flavour. The order matters: merging picks the minimum, and
/// `Slow` is the most conservative.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AvoidanceKind {
    /// Avoidance built with the slow movement speed.
    Slow,
    /// Fast avoidance that additionally excludes hole passages.
    FastSafe,
    /// Fast avoidance.
    Fast,
}

/// One entry of the ordered area-increase policy: how an influence area may
/// be grown onto the next layer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AreaIncreaseSettings {
    /// Avoidance flavour to subtract.
    pub avoidance: AvoidanceKind,
    /// Offset distance for this attempt, scaled units.
    pub increase_speed: i64,
    /// Attempt to increase the branch radius.
    pub increase_radius: bool,
    /// Regular attempt; `false` marks the last-resort error case.
    pub no_error: bool,
    /// Evaluate with the reduced X/Y distance.
    pub use_min_distance: bool,
    /// Move the area (an offset of zero keeps it in place).
    pub moving: bool,
}

impl Default for AreaIncreaseSettings {
    fn default() -> Self {
        Self {
            avoidance: AvoidanceKind::Fast,
            increase_speed: 0,
            increase_radius: false,
            no_error: false,
            use_min_distance: false,
            moving: false,
        }
    }
}

/// State of a node of the propagation DAG.
#[derive(Clone, Debug)]
pub struct SupportElementState {
    /// The layer this element wants to reach (the tip's layer).
    pub target_height: LayerIndex,
    /// The position to support at `target_height`.
    pub target_position: Point,
    /// Suggested placement direction inside the influence area.
    pub next_position: Point,
    /// The layer this element sits on.
    pub layer_idx: LayerIndex,
    /// Effective distance to top driving radius and collision lookups.
    pub effective_radius_height: usize,
    /// Layers below the topmost layer of this branch.
    pub distance_to_top: usize,
    /// Chosen centre point, set during extraction.
    pub result_on_layer: Option<Point>,
    /// Extra radius gained by merging a to-build-plate branch into a
    /// to-model branch.
    pub increased_to_model_radius: i64,
    /// Elephant-foot widening counter. Fractional due to merges.
    pub elephant_foot_increases: f64,
    /// The element tries not to move until this distance-to-top is reached.
    pub dont_move_until: usize,
    /// Settings used for the last successful area increase.
    pub last_area_increase: AreaIncreaseSettings,
    /// Roof layers that could not be stacked and are still owed.
    pub missing_roof_layers: usize,
    /// The element tries to reach the build plate.
    pub to_buildplate: bool,
    /// The branch can rest on a flat surface (build plate or placeable
    /// model area). Once cleared it never reverts.
    pub to_model_gracious: bool,
    /// Avoidance queries may use the reduced X/Y distance.
    pub use_min_xy_dist: bool,
    /// This element or one above supports a roof.
    pub supports_roof: bool,
    /// The hole-free avoidance is usable: no hole passages below.
    pub can_use_safe_radius: bool,
    /// Skip ovalisation towards parents/children when drawing.
    pub skip_ovalisation: bool,
    /// The area-increase had to fall back to the error case.
    pub lost: bool,
    /// No area-increase succeeded at all; placement is unreliable.
    pub verylost: bool,
    /// Not valid anymore, to be removed by compaction.
    pub deleted: bool,
    /// General purpose visit flag.
    pub marked: bool,
}

impl SupportElementState {
    /// A fresh tip at `layer_idx` placed at `position`.
    pub fn new_tip(layer_idx: LayerIndex, position: Point) -> Self {
        Self {
            target_height: layer_idx,
            target_position: position,
            next_position: position,
            layer_idx,
            effective_radius_height: 0,
            distance_to_top: 0,
            result_on_layer: Some(position),
            increased_to_model_radius: 0,
            elephant_foot_increases: 0.0,
            dont_move_until: 0,
            last_area_increase: AreaIncreaseSettings::default(),
            missing_roof_layers: 0,
            to_buildplate: false,
            to_model_gracious: false,
            use_min_xy_dist: false,
            supports_roof: false,
            can_use_safe_radius: false,
            skip_ovalisation: false,
            lost: false,
            verylost: false,
            deleted: false,
            marked: false,
        }
    }

    /// The state one layer further down, before any area increase.
    pub fn propagate_down(&self) -> Self {
        let mut dst = self.clone();
        dst.distance_to_top += 1;
        dst.layer_idx -= 1;
        // A new node on a new layer: placement is unknown again.
        dst.result_on_layer = None;
        dst.skip_ovalisation = false;
        dst
    }

    /// Whether the element is still in its "do not move" phase.
    pub fn locked(&self) -> bool {
        self.distance_to_top < self.dont_move_until
    }
}

/// The effective distance-to-top that the real radius of the part follows.
pub fn effective_dtt(settings: &Settings, state: &SupportElementState) -> usize {
    if state.effective_radius_height < settings.increase_radius_until_layer {
        state
            .distance_to_top
            .min(settings.increase_radius_until_layer)
    } else {
        state.effective_radius_height
    }
}

/// The radius this element will be drawn with.
pub fn support_element_radius(settings: &Settings, state: &SupportElementState) -> i64 {
    settings.get_radius(effective_dtt(settings, state), state.elephant_foot_increases)
}

/// The radius used for collision and avoidance queries. Can be smaller than
/// the drawn radius; drawing trims areas that would collide.
pub fn support_element_collision_radius(settings: &Settings, state: &SupportElementState) -> i64 {
    settings.get_radius(state.effective_radius_height, state.elephant_foot_increases)
}

/// Indices into the element arena of the layer above.
pub type ParentIndices = SmallVec<[i32; 4]>;

/// A node of the propagation DAG together with its influence area.
#[derive(Clone, Debug)]
pub struct SupportElement {
    /// Mutable node state.
    pub state: SupportElementState,
    /// Elements on the layer above supported by this element.
    pub parents: ParentIndices,
    /// Region in which the branch centre may lie on this layer.
    pub influence_area: Polygons,
}

impl SupportElement {
    /// Construct from state and influence area, without parents.
    pub fn new(state: SupportElementState, influence_area: Polygons) -> Self {
        Self {
            state,
            parents: ParentIndices::new(),
            influence_area,
        }
    }

    /// Construct from state, parents and influence area.
    pub fn with_parents(
        state: SupportElementState,
        parents: ParentIndices,
        influence_area: Polygons,
    ) -> Self {
        Self {
            state,
            parents,
            influence_area,
        }
    }
}

/// The per-layer arenas of the whole DAG. Index 0 is the first layer.
pub type MoveBounds = Vec<Vec<SupportElement>>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MeshGroupSettings;

    #[test]
    fn propagate_down_resets_placement() {
        let mut state = SupportElementState::new_tip(10, Point::new(5, 5));
        state.skip_ovalisation = true;
        let below = state.propagate_down();
        assert_eq!(below.layer_idx, 9);
        assert_eq!(below.distance_to_top, 1);
        assert!(below.result_on_layer.is_none());
        assert!(!below.skip_ovalisation);
    }

    #[test]
    fn collision_radius_is_bounded_by_real_radius() {
        let settings = Settings::new(&MeshGroupSettings::default());
        let mut state = SupportElementState::new_tip(50, Point::new(0, 0));
        state.distance_to_top = 30;
        state.effective_radius_height = 10;
        assert!(
            support_element_collision_radius(&settings, &state)
                <= support_element_radius(&settings, &state)
        );
    }

    #[test]
    fn avoidance_order_is_slow_first() {
        assert!(AvoidanceKind::Slow < AvoidanceKind::FastSafe);
        assert!(AvoidanceKind::FastSafe < AvoidanceKind::Fast);
    }
}
