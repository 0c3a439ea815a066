// Copyright 2025 the Taproot Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Influence-area propagation: the top-down per-layer fixpoint that grows,
//! constrains and merges influence areas.

use log::{debug, info, warn};
use rayon::prelude::*;

use taproot_geom::{
    BoundingBox, Point, Polygons, area, difference, get_extents, inflate, intersection,
    move_inside_if_outside, simplify, thicken_polylines, to_polylines, union_,
};
use taproot_index::partition_by_centroid;

use crate::config::{LayerIndex, SCALED_EPSILON, Settings, tiny_area_threshold};
use crate::element::{
    AreaIncreaseSettings, AvoidanceKind, MoveBounds, ParentIndices, SupportElement,
    SupportElementState, support_element_collision_radius, support_element_radius,
};
use crate::volumes::TreeModelVolumes;
use crate::{CancelToken, Error};

/// Union that keeps degenerate, sliver-thin areas alive.
///
/// Influence areas can be so thin that an exact union collapses them; when
/// that happens the contours are thickened a little instead of vanishing.
pub(crate) fn safe_union(first: &Polygons, second: &Polygons) -> Polygons {
    if first.is_empty() && second.is_empty() {
        return Polygons::new();
    }
    let result = union_(first, second);
    if result.is_empty() {
        debug!("caught an area destroying union, enlarging areas a bit");
        let widen = |p: &Polygons| thicken_polylines(&to_polylines(p), taproot_geom::scaled(0.002));
        return union_(&widen(first), &widen(second));
    }
    result
}

/// Offset outwards in bounded steps, subtracting `collision` after each
/// step, so the area cannot lag through an obstacle thinner than a step.
///
/// `last_step_offset_without_check` is the final distance that may be
/// offset in one go; `min_amount_offset` forces a minimum number of round
/// steps so small features gain enough vertices to survive rounding.
pub(crate) fn safe_offset_inc(
    me: &Polygons,
    distance: i64,
    collision: &Polygons,
    safe_step_size: i64,
    last_step_offset_without_check: i64,
    min_amount_offset: usize,
) -> Polygons {
    let mut do_final_difference = last_step_offset_without_check == 0;
    let mut ret = safe_union(me, &Polygons::new());
    if distance == 0 {
        return if do_final_difference {
            difference(&ret, collision)
        } else {
            union_(&ret, &Polygons::new())
        };
    }
    if safe_step_size < 0 || last_step_offset_without_check < 0 {
        warn!("offset increase got an invalid parameter");
        return if do_final_difference {
            difference(&ret, collision)
        } else {
            union_(&ret, &Polygons::new())
        };
    }

    let mut step_size = safe_step_size.max(1);
    let mut steps = if distance > last_step_offset_without_check {
        (distance - last_step_offset_without_check) / step_size
    } else {
        0
    };
    if distance - steps * step_size > last_step_offset_without_check {
        if (steps + 1) * step_size <= distance {
            // Happens when last_step_offset_without_check >= safe_step_size.
            steps += 1;
        } else {
            do_final_difference = true;
        }
    }
    let partial_step = i64::from(distance < last_step_offset_without_check || distance % step_size != 0);
    if steps + partial_step < min_amount_offset as i64 && min_amount_offset > 1 {
        // Reduce the step size to get the required number of steps.
        step_size = distance / min_amount_offset as i64;
        if step_size >= safe_step_size {
            step_size = safe_step_size;
            steps = min_amount_offset as i64;
        } else {
            steps = distance / step_size.max(1);
        }
    }

    for i in 0..steps {
        ret = difference(&inflate(&ret, step_size), collision);
        // Round offsets accumulate vertices fast; trim them periodically.
        if i % 10 == 7 {
            ret = simplify(&ret, taproot_geom::scaled(0.015));
        }
    }
    let last_offset = distance - steps * step_size;
    if last_offset > SCALED_EPSILON {
        ret = inflate(&ret, last_offset);
    }
    ret = simplify(&ret, taproot_geom::scaled(0.015));

    if do_final_difference {
        ret = difference(&ret, collision);
    }
    union_(&ret, &Polygons::new())
}

/// An influence area being grown onto the next layer, with the data the
/// merge stage needs.
#[derive(Clone, Debug)]
pub(crate) struct SupportElementMerging {
    pub state: SupportElementState,
    pub parents: ParentIndices,
    /// All influence areas, to build plate and to model.
    pub influence_areas: Polygons,
    /// Influence areas that can reach the build plate.
    pub to_bp_areas: Polygons,
    /// Influence areas that may rest on the model.
    pub to_model_areas: Polygons,
    pub bbox: BoundingBox,
}

impl SupportElementMerging {
    fn new(state: SupportElementState, parents: ParentIndices) -> Self {
        Self {
            state,
            parents,
            influence_areas: Polygons::new(),
            to_bp_areas: Polygons::new(),
            to_model_areas: Polygons::new(),
            bbox: BoundingBox::empty(),
        }
    }

    fn set_bbox(&mut self, bbox: BoundingBox) {
        self.bbox = bbox.inflated(SCALED_EPSILON);
    }
}

/// Grow one influence area by one attempt of the increase policy.
///
/// Returns the resulting element state when the area survives with more
/// than the tiny-area threshold; the out-parameters receive the grown areas.
fn increase_single_area(
    volumes: &TreeModelVolumes,
    config: &Settings,
    settings: &AreaIncreaseSettings,
    layer_idx: LayerIndex,
    parent: &SupportElement,
    relevant_offset: &Polygons,
    to_bp_data: &mut Polygons,
    to_model_data: &mut Polygons,
    increased: &mut Polygons,
    overspeed: i64,
    mergelayer: bool,
) -> Option<SupportElementState> {
    let mut current_elem = parent.state.propagate_down();
    if settings.increase_radius {
        current_elem.effective_radius_height += 1;
    }
    let mut radius = support_element_collision_radius(config, &current_elem);

    if settings.moving {
        *increased = relevant_offset.clone();
        if overspeed > 0 {
            let safe_movement_distance = if current_elem.use_min_xy_dist {
                config.xy_min_distance
            } else {
                config.xy_distance
            } + if config.z_distance_top_layers.min(config.z_distance_bottom_layers) > 0 {
                config.min_feature_size
            } else {
                0
            };
            // Only the wall restriction is held here; collision and
            // avoidance are subtracted later.
            *increased = safe_offset_inc(
                increased,
                overspeed,
                &volumes.get_wall_restriction(
                    support_element_collision_radius(config, &parent.state),
                    layer_idx,
                    parent.state.use_min_xy_dist,
                ),
                safe_movement_distance,
                safe_movement_distance + radius,
                1,
            );
        }
        if settings.no_error {
            // Round joins accumulate vertices; this simplify carries most of
            // the stage's performance.
            *increased = simplify(increased, taproot_geom::scaled(0.025));
        }
    } else {
        // No movement: the area stays the parent area.
        *increased = parent.influence_area.clone();
    }

    if mergelayer || current_elem.to_buildplate {
        *to_bp_data = safe_union(
            &difference(
                increased,
                &volumes.get_avoidance(
                    radius,
                    layer_idx - 1,
                    settings.avoidance,
                    false,
                    settings.use_min_distance,
                ),
            ),
            &Polygons::new(),
        );
        if !current_elem.to_buildplate && area(to_bp_data) > tiny_area_threshold() {
            // A subtree was tainted to-model even though the build plate is
            // reachable; correct it.
            current_elem.to_buildplate = true;
            debug!(
                "corrected taint leading to a wrong to-model value on layer {} targeting {} with radius {}",
                layer_idx - 1,
                current_elem.target_height,
                radius
            );
        }
    }
    if config.support_rests_on_model {
        if mergelayer || current_elem.to_model_gracious {
            *to_model_data = safe_union(
                &difference(
                    increased,
                    &volumes.get_avoidance(
                        radius,
                        layer_idx - 1,
                        settings.avoidance,
                        true,
                        settings.use_min_distance,
                    ),
                ),
                &Polygons::new(),
            );
        }
        if !current_elem.to_model_gracious {
            if mergelayer && area(to_model_data) >= tiny_area_threshold() {
                current_elem.to_model_gracious = true;
                debug!(
                    "corrected taint leading to a wrong non-gracious value on layer {} targeting {} with radius {}",
                    layer_idx - 1,
                    current_elem.target_height,
                    radius
                );
            } else {
                // No gracious anchor in reach; route down against the raw
                // collision instead.
                *to_model_data = safe_union(
                    &difference(
                        increased,
                        &volumes.get_collision(radius, layer_idx - 1, settings.use_min_distance),
                    ),
                    &Polygons::new(),
                );
            }
        }
    }

    let mut check_layer_data = if current_elem.to_buildplate {
        to_bp_data.clone()
    } else {
        to_model_data.clone()
    };

    if settings.increase_radius && area(&check_layer_data) > tiny_area_threshold() {
        let valid_with_radius = |next_radius: i64, elem: &SupportElementState, radius_now: i64| -> bool {
            if volumes.ceil_radius(next_radius) <= volumes.ceil_radius(radius_now) {
                return true;
            }
            let mut to_bp_data_2 = Polygons::new();
            if elem.to_buildplate {
                to_bp_data_2 = difference(
                    increased,
                    &volumes.get_avoidance(
                        next_radius,
                        layer_idx - 1,
                        settings.avoidance,
                        false,
                        settings.use_min_distance,
                    ),
                );
            }
            let mut to_model_data_2 = Polygons::new();
            if config.support_rests_on_model && !elem.to_buildplate {
                to_model_data_2 = difference(
                    increased,
                    if elem.to_model_gracious {
                        volumes.get_avoidance(
                            next_radius,
                            layer_idx - 1,
                            settings.avoidance,
                            true,
                            settings.use_min_distance,
                        )
                    } else {
                        volumes.get_collision(next_radius, layer_idx - 1, settings.use_min_distance)
                    }
                    .as_ref(),
                );
            }
            let check_layer_data_2 = if elem.to_buildplate {
                to_bp_data_2
            } else {
                to_model_data_2
            };
            area(&check_layer_data_2) > tiny_area_threshold()
        };
        let ceil_radius_before = volumes.ceil_radius(radius);

        if support_element_collision_radius(config, &current_elem) < config.increase_radius_until_radius
            && support_element_collision_radius(config, &current_elem)
                < support_element_radius(config, &current_elem)
        {
            let target_radius = support_element_radius(config, &current_elem)
                .min(config.increase_radius_until_radius);
            let mut current_ceil_radius = volumes.get_radius_next_ceil(radius);
            while current_ceil_radius < target_radius
                && valid_with_radius(
                    volumes.get_radius_next_ceil(current_ceil_radius + 1),
                    &current_elem,
                    radius,
                )
            {
                current_ceil_radius = volumes.get_radius_next_ceil(current_ceil_radius + 1);
            }
            let mut resulting_eff_dtt = current_elem.effective_radius_height;
            while resulting_eff_dtt + 1 < current_elem.distance_to_top
                && config.get_radius(resulting_eff_dtt + 1, current_elem.elephant_foot_increases)
                    <= current_ceil_radius
                && config.get_radius(resulting_eff_dtt + 1, current_elem.elephant_foot_increases)
                    <= support_element_radius(config, &current_elem)
            {
                resulting_eff_dtt += 1;
            }
            current_elem.effective_radius_height = resulting_eff_dtt;
        }
        radius = support_element_collision_radius(config, &current_elem);

        let foot_radius_increase =
            (config.bp_radius_increase_per_layer - config.branch_radius_increase_per_layer).max(0.0);
        // Nearly always 1, but a full increase could overshoot the
        // precalculated recommended radius.
        let planned_foot_increase = if foot_radius_increase > 0.0 {
            ((config.recommended_min_radius(layer_idx - 1)
                - support_element_radius(config, &current_elem)) as f64
                / foot_radius_increase)
                .min(1.0)
        } else {
            0.0
        };
        let increase_bp_foot = planned_foot_increase > 0.0 && current_elem.to_buildplate;

        if increase_bp_foot
            && support_element_radius(config, &current_elem) >= config.branch_radius
            && support_element_radius(config, &current_elem) >= config.increase_radius_until_radius
            && valid_with_radius(
                config.get_radius(
                    current_elem.effective_radius_height,
                    current_elem.elephant_foot_increases + planned_foot_increase,
                ),
                &current_elem,
                radius,
            )
        {
            current_elem.elephant_foot_increases += planned_foot_increase;
            radius = support_element_collision_radius(config, &current_elem);
        }

        if ceil_radius_before != volumes.ceil_radius(radius) {
            if current_elem.to_buildplate {
                *to_bp_data = safe_union(
                    &difference(
                        increased,
                        &volumes.get_avoidance(
                            radius,
                            layer_idx - 1,
                            settings.avoidance,
                            false,
                            settings.use_min_distance,
                        ),
                    ),
                    &Polygons::new(),
                );
            }
            if config.support_rests_on_model && (!current_elem.to_buildplate || mergelayer) {
                *to_model_data = safe_union(
                    &difference(
                        increased,
                        if current_elem.to_model_gracious {
                            volumes.get_avoidance(
                                radius,
                                layer_idx - 1,
                                settings.avoidance,
                                true,
                                settings.use_min_distance,
                            )
                        } else {
                            volumes.get_collision(
                                radius,
                                layer_idx - 1,
                                settings.use_min_distance,
                            )
                        }
                        .as_ref(),
                    ),
                    &Polygons::new(),
                );
            }
            check_layer_data = if current_elem.to_buildplate {
                to_bp_data.clone()
            } else {
                to_model_data.clone()
            };
            if area(&check_layer_data) < tiny_area_threshold() {
                warn!(
                    "lost area by doing catch up from {} to radius {}",
                    ceil_radius_before,
                    volumes.ceil_radius(support_element_collision_radius(config, &current_elem))
                );
            }
        }
    }

    (area(&check_layer_data) > tiny_area_threshold()).then_some(current_elem)
}

/// Grow all influence areas of one layer onto the layer below.
///
/// `merging_areas[i]` corresponds to `prev_layer[i]`; on total failure the
/// parent element is marked and its placement is reset.
fn increase_areas_one_layer(
    volumes: &TreeModelVolumes,
    config: &Settings,
    merging_areas: &mut [SupportElementMerging],
    layer_idx: LayerIndex,
    prev_layer: &mut [SupportElement],
    mergelayer: bool,
    cancel: CancelToken<'_>,
) -> Result<(), Error> {
    merging_areas
        .par_iter_mut()
        .zip(prev_layer.par_iter_mut())
        .try_for_each(|(merging_area, parent)| -> Result<(), Error> {
            let mut elem = parent.state.propagate_down();
            let wall_restriction = volumes.get_wall_restriction(
                support_element_collision_radius(config, &parent.state),
                layer_idx,
                parent.state.use_min_xy_dist,
            );

            let mut to_bp_data = Polygons::new();
            let mut to_model_data = Polygons::new();
            let radius = support_element_collision_radius(config, &elem);

            // A radius increase pushes the branch wall outwards; the wall
            // that limits the branch angle is the outer one, so the radius
            // delta adds to the allowed movement.
            let mut extra_speed: i64 = 5;
            let mut extra_slow_speed: i64 = 0;
            let ceiled_parent_radius =
                volumes.ceil_radius(support_element_collision_radius(config, &parent.state));
            let projected_radius_increased = config.get_radius(
                parent.state.effective_radius_height + 1,
                parent.state.elephant_foot_increases,
            );
            let projected_radius_delta =
                projected_radius_increased - support_element_collision_radius(config, &parent.state);

            let safe_movement_distance = if elem.use_min_xy_dist {
                config.xy_min_distance
            } else {
                config.xy_distance
            } + if config.z_distance_top_layers.min(config.z_distance_bottom_layers) > 0 {
                config.min_feature_size
            } else {
                0
            };

            if ceiled_parent_radius == volumes.ceil_radius(projected_radius_increased)
                || projected_radius_increased < config.increase_radius_until_radius
            {
                // The radius increase is guaranteed; the full speed may grow.
                extra_speed += projected_radius_delta;
            } else {
                // Only the slow speed grows; it must not pass the fast one.
                extra_slow_speed += projected_radius_delta.min(
                    (config.maximum_move_distance + extra_speed)
                        - (config.maximum_move_distance_slow + extra_slow_speed),
                );
            }

            if config.layer_start_bp_radius > layer_idx
                && config.recommended_min_radius(layer_idx - 1)
                    < config.get_radius(
                        elem.effective_radius_height + 1,
                        elem.elephant_foot_increases,
                    )
            {
                // Equivalent to the radius increase above, for the elephant
                // foot widening.
                if ceiled_parent_radius
                    == volumes.ceil_radius(config.get_radius(
                        parent.state.effective_radius_height + 1,
                        parent.state.elephant_foot_increases + 1.0,
                    ))
                {
                    extra_speed += config.bp_radius_increase_per_layer as i64;
                } else {
                    extra_slow_speed += (config.bp_radius_increase_per_layer as i64).min(
                        config.maximum_move_distance
                            - (config.maximum_move_distance_slow + extra_slow_speed),
                    );
                }
            }

            let fast_speed = config.maximum_move_distance + extra_speed;
            let slow_speed = config.maximum_move_distance_slow + extra_speed + extra_slow_speed;

            let mut offset_slow = Polygons::new();
            let mut offset_fast = Polygons::new();
            let mut offset_slow_computed = false;
            let mut offset_fast_computed = false;

            let mut add = false;
            let mut bypass_merge = false;

            // Ordered policy: the first setting that yields a valid area
            // wins.
            let mut order: Vec<AreaIncreaseSettings> = Vec::new();
            let insert_setting = |order: &mut Vec<AreaIncreaseSettings>,
                                  setting: AreaIncreaseSettings,
                                  back: bool| {
                if !order.contains(&setting) {
                    if back {
                        order.push(setting);
                    } else {
                        order.insert(0, setting);
                    }
                }
            };

            let parent_moved_slow = elem.last_area_increase.increase_speed < config.maximum_move_distance;
            let avoidance_speed_mismatch =
                parent_moved_slow && elem.last_area_increase.avoidance != AvoidanceKind::Slow;
            if elem.last_area_increase.moving
                && elem.last_area_increase.no_error
                && elem.can_use_safe_radius
                && !mergelayer
                && !avoidance_speed_mismatch
                && (elem.distance_to_top >= config.tip_layers || parent_moved_slow)
            {
                // Assume the avoidance that worked for the parent works here.
                let speed = if parent_moved_slow { slow_speed } else { fast_speed };
                insert_setting(
                    &mut order,
                    AreaIncreaseSettings {
                        avoidance: elem.last_area_increase.avoidance,
                        increase_speed: speed,
                        increase_radius: true,
                        no_error: true,
                        use_min_distance: false,
                        moving: elem.last_area_increase.moving,
                    },
                    true,
                );
                insert_setting(
                    &mut order,
                    AreaIncreaseSettings {
                        avoidance: elem.last_area_increase.avoidance,
                        increase_speed: speed,
                        increase_radius: false,
                        no_error: true,
                        use_min_distance: false,
                        moving: elem.last_area_increase.moving,
                    },
                    true,
                );
            }
            if !elem.can_use_safe_radius {
                // The branch may still be inside a hole passage; move fast to
                // get out, and check whether the hole has been passed.
                insert_setting(
                    &mut order,
                    AreaIncreaseSettings {
                        avoidance: AvoidanceKind::Slow,
                        increase_speed: slow_speed,
                        increase_radius: true,
                        no_error: true,
                        use_min_distance: false,
                        moving: false,
                    },
                    true,
                );
                if elem.distance_to_top < config.tip_layers.div_ceil(2) {
                    insert_setting(
                        &mut order,
                        AreaIncreaseSettings {
                            avoidance: AvoidanceKind::Fast,
                            increase_speed: slow_speed,
                            increase_radius: true,
                            no_error: true,
                            use_min_distance: false,
                            moving: false,
                        },
                        true,
                    );
                }
                insert_setting(
                    &mut order,
                    AreaIncreaseSettings {
                        avoidance: AvoidanceKind::FastSafe,
                        increase_speed: fast_speed,
                        increase_radius: true,
                        no_error: true,
                        use_min_distance: false,
                        moving: false,
                    },
                    true,
                );
                insert_setting(
                    &mut order,
                    AreaIncreaseSettings {
                        avoidance: AvoidanceKind::FastSafe,
                        increase_speed: fast_speed,
                        increase_radius: false,
                        no_error: true,
                        use_min_distance: false,
                        moving: true,
                    },
                    true,
                );
                insert_setting(
                    &mut order,
                    AreaIncreaseSettings {
                        avoidance: AvoidanceKind::Fast,
                        increase_speed: fast_speed,
                        increase_radius: false,
                        no_error: true,
                        use_min_distance: false,
                        moving: true,
                    },
                    true,
                );
            } else {
                insert_setting(
                    &mut order,
                    AreaIncreaseSettings {
                        avoidance: AvoidanceKind::Slow,
                        increase_speed: slow_speed,
                        increase_radius: true,
                        no_error: true,
                        use_min_distance: false,
                        moving: true,
                    },
                    true,
                );
                // Fast movement to gain radius can cause a visible jump in
                // the branch; prefer slow movement without the increase.
                insert_setting(
                    &mut order,
                    AreaIncreaseSettings {
                        avoidance: AvoidanceKind::Slow,
                        increase_speed: slow_speed,
                        increase_radius: false,
                        no_error: true,
                        use_min_distance: false,
                        moving: true,
                    },
                    true,
                );
                if elem.distance_to_top < config.tip_layers {
                    insert_setting(
                        &mut order,
                        AreaIncreaseSettings {
                            avoidance: AvoidanceKind::FastSafe,
                            increase_speed: slow_speed,
                            increase_radius: true,
                            no_error: true,
                            use_min_distance: false,
                            moving: true,
                        },
                        true,
                    );
                }
                insert_setting(
                    &mut order,
                    AreaIncreaseSettings {
                        avoidance: AvoidanceKind::FastSafe,
                        increase_speed: fast_speed,
                        increase_radius: true,
                        no_error: true,
                        use_min_distance: false,
                        moving: true,
                    },
                    true,
                );
                insert_setting(
                    &mut order,
                    AreaIncreaseSettings {
                        avoidance: AvoidanceKind::FastSafe,
                        increase_speed: fast_speed,
                        increase_radius: false,
                        no_error: true,
                        use_min_distance: false,
                        moving: true,
                    },
                    true,
                );
            }

            if elem.use_min_xy_dist {
                // Try each configuration with the regular distance before
                // falling back to the reduced one.
                let mut new_order = Vec::with_capacity(order.len() * 2);
                for setting in &order {
                    new_order.push(*setting);
                    new_order.push(AreaIncreaseSettings {
                        use_min_distance: true,
                        ..*setting
                    });
                }
                order = new_order;
            }
            if elem.to_buildplate
                || (elem.to_model_gracious
                    && intersection(
                        &parent.influence_area,
                        &volumes.get_placeable_areas(radius, layer_idx),
                    )
                    .is_empty())
            {
                // Error case: the branch simply has to connect somewhere.
                insert_setting(
                    &mut order,
                    AreaIncreaseSettings {
                        avoidance: AvoidanceKind::Fast,
                        increase_speed: fast_speed,
                        increase_radius: false,
                        no_error: false,
                        use_min_distance: elem.use_min_xy_dist,
                        moving: true,
                    },
                    true,
                );
            }
            if elem.distance_to_top < elem.dont_move_until && elem.can_use_safe_radius {
                // Not moving is preferred, if holes are avoided either way.
                insert_setting(
                    &mut order,
                    AreaIncreaseSettings {
                        avoidance: AvoidanceKind::Slow,
                        increase_speed: 0,
                        increase_radius: true,
                        no_error: true,
                        use_min_distance: false,
                        moving: false,
                    },
                    false,
                );
            }

            // Whether computing the fast offset directly is cheaper than
            // extending the slow offset.
            let offset_independent_faster = radius / safe_movement_distance.max(1)
                - i64::from(
                    config.maximum_move_distance + extra_speed < radius + safe_movement_distance,
                )
                > {
                    let num = extra_speed + extra_slow_speed + config.maximum_move_distance_slow;
                    let denom = safe_movement_distance.max(1);
                    (num + denom - 1) / denom
                };

            let mut inc_wo_collision = Polygons::new();
            for setting in &order {
                if setting.moving {
                    if !offset_slow_computed
                        && (setting.increase_speed == slow_speed || !offset_independent_faster)
                    {
                        // Two steps keep the offset round, avoiding errors
                        // from pointy areas.
                        offset_slow = safe_offset_inc(
                            &parent.influence_area,
                            extra_speed + extra_slow_speed + config.maximum_move_distance_slow,
                            &wall_restriction,
                            safe_movement_distance,
                            if offset_independent_faster {
                                safe_movement_distance + radius
                            } else {
                                0
                            },
                            2,
                        );
                        offset_slow_computed = true;
                    }
                    if !offset_fast_computed && setting.increase_speed != slow_speed {
                        if offset_independent_faster {
                            offset_fast = safe_offset_inc(
                                &parent.influence_area,
                                extra_speed + config.maximum_move_distance,
                                &wall_restriction,
                                safe_movement_distance,
                                safe_movement_distance + radius,
                                1,
                            );
                        } else {
                            let delta_slow_fast = config.maximum_move_distance
                                - (config.maximum_move_distance_slow + extra_slow_speed);
                            offset_fast = safe_offset_inc(
                                &offset_slow,
                                delta_slow_fast,
                                &wall_restriction,
                                safe_movement_distance,
                                safe_movement_distance + radius,
                                2,
                            );
                        }
                        offset_fast_computed = true;
                    }
                }
                let result;
                inc_wo_collision.clear();
                if !setting.no_error {
                    // Error case: if rounding ever turned the area into a
                    // line, thicken it so there is something to offset.
                    let lines_offset = thicken_polylines(
                        &to_polylines(&parent.influence_area),
                        taproot_geom::scaled(0.005),
                    );
                    let base_error_area = union_(&parent.influence_area, &lines_offset);
                    result = increase_single_area(
                        volumes,
                        config,
                        setting,
                        layer_idx,
                        parent,
                        &base_error_area,
                        &mut to_bp_data,
                        &mut to_model_data,
                        &mut inc_wo_collision,
                        ((config.maximum_move_distance + extra_speed) as f64 * 1.5) as i64,
                        mergelayer,
                    );
                    warn!(
                        "influence area could not be increased; radius {} at layer {} with distance to top {}; the branch may be lost",
                        radius,
                        layer_idx - 1,
                        elem.distance_to_top
                    );
                } else {
                    result = increase_single_area(
                        volumes,
                        config,
                        setting,
                        layer_idx,
                        parent,
                        if setting.increase_speed == slow_speed {
                            &offset_slow
                        } else {
                            &offset_fast
                        },
                        &mut to_bp_data,
                        &mut to_model_data,
                        &mut inc_wo_collision,
                        0,
                        mergelayer,
                    );
                }

                if let Some(mut new_elem) = result {
                    if !setting.no_error {
                        new_elem.lost = true;
                        info!("trying to keep area by moving faster than intended: success");
                    }
                    elem = new_elem;
                    elem.last_area_increase = *setting;
                    add = true;
                    // Merging is skipped for areas that must not move or
                    // that must first get away from the model.
                    bypass_merge = !setting.moving
                        || (setting.use_min_distance && elem.distance_to_top < config.tip_layers);
                    if setting.moving {
                        elem.dont_move_until = 0;
                    } else {
                        elem.result_on_layer = parent.state.result_on_layer;
                    }
                    elem.can_use_safe_radius = setting.avoidance != AvoidanceKind::Fast;
                    if !setting.use_min_distance {
                        elem.use_min_xy_dist = false;
                    }
                    break;
                } else if !setting.no_error {
                    warn!("trying to keep area by moving faster than intended: failure");
                }
            }

            if add {
                // The union looks redundant, but rounding can make
                // to_bp_data slightly exceed the influence area.
                let max_influence_area = safe_union(
                    &difference(
                        &inc_wo_collision,
                        &volumes.get_collision(
                            support_element_collision_radius(config, &elem),
                            layer_idx - 1,
                            elem.use_min_xy_dist,
                        ),
                    ),
                    &safe_union(&to_bp_data, &to_model_data),
                );
                merging_area.state = elem;
                merging_area.set_bbox(get_extents(&max_influence_area));
                merging_area.influence_areas = max_influence_area;
                if !bypass_merge {
                    if merging_area.state.to_buildplate {
                        merging_area.to_bp_areas = core::mem::take(&mut to_bp_data);
                    }
                    if config.support_rests_on_model {
                        merging_area.to_model_areas = core::mem::take(&mut to_model_data);
                    }
                }
            } else {
                // An unplaceable parent taints the whole subtree; culling
                // happens during extraction.
                parent.state.result_on_layer = None;
                parent.state.to_model_gracious = false;
                parent.state.verylost = true;
            }

            cancel.check()
        })
}

/// Field-by-field combination of two merged element states.
fn merge_support_element_states(
    first: &SupportElementState,
    second: &SupportElementState,
    next_position: Point,
    layer_idx: LayerIndex,
    config: &Settings,
) -> SupportElementState {
    let mut out = first.clone();
    out.next_position = next_position;
    out.layer_idx = layer_idx;
    out.use_min_xy_dist = first.use_min_xy_dist || second.use_min_xy_dist;
    out.supports_roof = first.supports_roof || second.supports_roof;
    out.dont_move_until = first.dont_move_until.max(second.dont_move_until);
    out.can_use_safe_radius = first.can_use_safe_radius || second.can_use_safe_radius;
    out.missing_roof_layers = first.missing_roof_layers.min(second.missing_roof_layers);
    out.skip_ovalisation = false;
    if first.target_height > second.target_height {
        out.target_height = first.target_height;
        out.target_position = first.target_position;
    } else {
        out.target_height = second.target_height;
        out.target_position = second.target_position;
    }
    out.effective_radius_height = first
        .effective_radius_height
        .max(second.effective_radius_height);
    out.distance_to_top = first.distance_to_top.max(second.distance_to_top);
    out.to_buildplate = first.to_buildplate && second.to_buildplate;
    // Valid because gracious never merges with non-gracious.
    out.to_model_gracious = first.to_model_gracious && second.to_model_gracious;
    out.lost = first.lost || second.lost;
    out.verylost = first.verylost || second.verylost;

    out.elephant_foot_increases = 0.0;
    if config.bp_radius_increase_per_layer > 0.0 {
        // Recalculated so a merge with a wider elephant foot cannot make the
        // radius jump.
        let foot_increase_radius = (support_element_collision_radius(config, second)
            .max(support_element_collision_radius(config, first))
            - support_element_collision_radius(config, &out))
        .abs();
        out.elephant_foot_increases = foot_increase_radius as f64
            / (config.bp_radius_increase_per_layer - config.branch_radius_increase_per_layer)
                .max(1.0);
    }

    // The best last settings of both parents; wrong guesses only cost a bit
    // of performance.
    out.last_area_increase = AreaIncreaseSettings {
        avoidance: first
            .last_area_increase
            .avoidance
            .min(second.last_area_increase.avoidance),
        increase_speed: first
            .last_area_increase
            .increase_speed
            .min(second.last_area_increase.increase_speed),
        increase_radius: first.last_area_increase.increase_radius
            || second.last_area_increase.increase_radius,
        no_error: first.last_area_increase.no_error || second.last_area_increase.no_error,
        use_min_distance: first.last_area_increase.use_min_distance
            && second.last_area_increase.use_min_distance,
        moving: first.last_area_increase.moving || second.last_area_increase.moving,
    };

    out
}

/// Try to merge `src` into `dst`. On success `dst` holds the merged area and
/// `src` is cleared.
fn merge_influence_areas_two_elements(
    volumes: &TreeModelVolumes,
    config: &Settings,
    layer_idx: LayerIndex,
    dst: &mut SupportElementMerging,
    src: &mut SupportElementMerging,
) -> bool {
    // Merging gracious with non-gracious could drag a reliable subtree onto
    // unreliable ground.
    if dst.state.to_model_gracious != src.state.to_model_gracious {
        return false;
    }
    // Different collision distances make the engulfing assumption below
    // invalid.
    if dst.state.use_min_xy_dist != src.state.use_min_xy_dist {
        return false;
    }

    let dst_radius_bigger = support_element_collision_radius(config, &dst.state)
        > support_element_collision_radius(config, &src.state);
    let (smaller_rad, bigger_rad) = if dst_radius_bigger {
        (&*src, &*dst)
    } else {
        (&*dst, &*src)
    };
    let real_radius_delta = (support_element_radius(config, &bigger_rad.state)
        - support_element_radius(config, &smaller_rad.state))
    .abs();

    // The smaller area grows by the radius delta below; a snug bbox test
    // suffices because the offset uses round joins.
    if !smaller_rad
        .bbox
        .inflated(real_radius_delta)
        .overlaps(&bigger_rad.bbox)
    {
        return false;
    }

    let merging_to_bp = dst.state.to_buildplate && src.state.to_buildplate;
    let mut increased_to_model_radius = 0;
    if !merging_to_bp {
        if dst.state.to_buildplate != src.state.to_buildplate {
            // Thick to-build-plate branches must not be absorbed into
            // thinner to-model ones.
            let rdst = support_element_radius(config, &dst.state);
            let rsrc = support_element_radius(config, &src.state);
            if dst.state.to_buildplate {
                if rsrc < rdst {
                    increased_to_model_radius = src.state.increased_to_model_radius + rdst - rsrc;
                }
            } else if rsrc > rdst {
                increased_to_model_radius = dst.state.increased_to_model_radius + rsrc - rdst;
            }
            if increased_to_model_radius > config.max_to_model_radius_increase {
                return false;
            }
        }
        // A merge that could place a stable branch on unstable ground is
        // skipped until the branch is tall enough.
        if !dst.state.supports_roof
            && !src.state.supports_roof
            && dst.state.distance_to_top.max(src.state.distance_to_top) < config.min_dtt_to_model
        {
            return false;
        }
    }

    // The bigger radius validates the merged placement; if safety differs
    // the merged area could become invalid.
    if !bigger_rad.state.can_use_safe_radius && smaller_rad.state.can_use_safe_radius {
        return false;
    }

    let use_min_radius = bigger_rad.state.use_min_xy_dist && smaller_rad.state.use_min_xy_dist;

    // Growing the smaller-radius area by the radius delta: any intersection
    // with the bigger area then means a branch placed there already engulfs
    // the smaller branch.
    let smaller_collision_radius = support_element_collision_radius(config, &smaller_rad.state);
    let collision = volumes.get_collision(smaller_collision_radius, layer_idx - 1, use_min_radius);
    let intersect_small_with_bigger = |small: &Polygons, bigger: &Polygons| -> Polygons {
        intersection(
            &safe_offset_inc(
                small,
                real_radius_delta,
                &collision,
                // -3 absorbs rounding errors.
                2 * (config.xy_distance + smaller_collision_radius - 3),
                0,
                0,
            ),
            bigger,
        )
    };
    let intersect = intersect_small_with_bigger(
        if merging_to_bp {
            &smaller_rad.to_bp_areas
        } else {
            &smaller_rad.to_model_areas
        },
        if merging_to_bp {
            &bigger_rad.to_bp_areas
        } else {
            &bigger_rad.to_model_areas
        },
    );

    // A lone line counts as empty one layer down; also, tiny overlaps only
    // attract rounding errors.
    if area(&intersect) <= tiny_area_threshold() {
        return false;
    }
    if area(&taproot_geom::deflate(&intersect, taproot_geom::scaled(0.025)))
        <= tiny_area_threshold()
    {
        return false;
    }

    // The merge is confirmed. Estimate the placement bias point from the
    // last merge above.
    let new_pos = move_inside_if_outside(&intersect, dst.state.next_position);
    let mut new_state =
        merge_support_element_states(&dst.state, &src.state, new_pos, layer_idx - 1, config);
    new_state.increased_to_model_radius = if increased_to_model_radius == 0 {
        dst.state
            .increased_to_model_radius
            .max(src.state.increased_to_model_radius)
    } else {
        increased_to_model_radius
    };

    // Union with the intersection to offset rounding losses.
    let influence_areas = safe_union(
        &intersect_small_with_bigger(&smaller_rad.influence_areas, &bigger_rad.influence_areas),
        &intersect,
    );

    let to_model_areas = if merging_to_bp && config.support_rests_on_model {
        if new_state.to_model_gracious {
            safe_union(
                &intersect_small_with_bigger(
                    &smaller_rad.to_model_areas,
                    &bigger_rad.to_model_areas,
                ),
                &intersect,
            )
        } else {
            influence_areas.clone()
        }
    } else {
        Polygons::new()
    };

    let mut parents = core::mem::take(&mut dst.parents);
    parents.extend(src.parents.drain(..));
    dst.parents = parents;
    dst.state = new_state;
    dst.influence_areas = influence_areas;
    dst.to_bp_areas.clear();
    dst.to_model_areas.clear();
    if merging_to_bp {
        dst.to_bp_areas = intersect;
        if config.support_rests_on_model {
            dst.to_model_areas = to_model_areas;
        }
    } else {
        dst.to_model_areas = intersect;
    }
    let mut bbox = get_extents(&dst.influence_areas);
    bbox.merge(get_extents(&dst.to_bp_areas));
    bbox.merge(get_extents(&dst.to_model_areas));
    dst.set_bbox(bbox);
    // Clear the source.
    src.influence_areas.clear();
    src.to_bp_areas.clear();
    src.to_model_areas.clear();
    true
}

/// Merge every pair inside one bucket, O(n²).
fn merge_influence_areas_leaves(
    volumes: &TreeModelVolumes,
    config: &Settings,
    layer_idx: LayerIndex,
    bucket: &mut Vec<SupportElementMerging>,
) {
    let mut i = 0;
    while i + 1 < bucket.len() {
        let mut merged_any = false;
        let mut j = i + 1;
        while j < bucket.len() {
            let (a, b) = pair_mut(bucket, i, j);
            if merge_influence_areas_two_elements(volumes, config, layer_idx, a, b) {
                bucket.swap_remove(j);
                merged_any = true;
                break;
            }
            j += 1;
        }
        if !merged_any {
            i += 1;
        }
    }
}

/// Merge the elements of `src` into `dst`. Elements within each input are
/// already mutually unmergeable.
fn merge_influence_areas_two_sets(
    volumes: &TreeModelVolumes,
    config: &Settings,
    layer_idx: LayerIndex,
    dst: &mut Vec<SupportElementMerging>,
    mut src: Vec<SupportElementMerging>,
) {
    let mut i = 0;
    while i < src.len() {
        let mut merged_idx = None;
        for d in 0..dst.len() {
            if merge_influence_areas_two_elements(volumes, config, layer_idx, &mut dst[d], &mut src[i])
            {
                merged_idx = Some(d);
                break;
            }
        }
        match merged_idx {
            Some(m) => {
                src.swap_remove(i);
                // The grown area may now overlap other dst elements.
                let mut d = m + 1;
                while d < dst.len() {
                    let (a, b) = pair_mut(dst, m, d);
                    if merge_influence_areas_two_elements(volumes, config, layer_idx, a, b) {
                        dst.swap_remove(d);
                    } else {
                        d += 1;
                    }
                }
            }
            None => i += 1,
        }
    }
    dst.append(&mut src);
}

fn pair_mut<T>(slice: &mut [T], i: usize, j: usize) -> (&mut T, &mut T) {
    debug_assert!(i < j, "pair_mut requires i < j");
    let (lo, hi) = slice.split_at_mut(j);
    (&mut lo[i], &mut hi[0])
}

/// Merge overlapping influence areas of one layer.
///
/// The elements are spatially ordered and cut into buckets following the
/// branching of an AABB tree; buckets merge internally first, then pairwise
/// in a reduction, keeping most Boolean work in the early, parallel rounds.
fn merge_influence_areas(
    volumes: &TreeModelVolumes,
    config: &Settings,
    layer_idx: LayerIndex,
    influence_areas: Vec<SupportElementMerging>,
    cancel: CancelToken<'_>,
) -> Result<Vec<SupportElementMerging>, Error> {
    let input_size = influence_areas.len();
    if input_size < 2 {
        return Ok(influence_areas);
    }

    // Deterministic spatial order: centroid median split with the original
    // position as the tie break.
    let mut indexed: Vec<(u64, SupportElementMerging)> = influence_areas
        .into_iter()
        .enumerate()
        .map(|(i, a)| (i as u64, a))
        .collect();
    partition_by_centroid(&mut indexed, &|(tie, a)| {
        let c = a.bbox.center();
        (c.x, c.y, *tie)
    });

    // 4 elements per bucket when that still feeds every thread, 2 otherwise.
    let num_threads = rayon::current_num_threads();
    let bucket_size = if (input_size + 2) / 4 >= num_threads { 4 } else { 2 };

    let mut buckets: Vec<Vec<SupportElementMerging>> = Vec::new();
    let mut iter = indexed.into_iter().map(|(_, a)| a).peekable();
    while iter.peek().is_some() {
        buckets.push(iter.by_ref().take(bucket_size).collect());
    }

    // First round: merge within each bucket.
    buckets
        .par_iter_mut()
        .try_for_each(|bucket| -> Result<(), Error> {
            merge_influence_areas_leaves(volumes, config, layer_idx, bucket);
            cancel.check()
        })?;

    // Reduction rounds: merge pairs of adjacent buckets.
    while buckets.len() > 1 {
        let mut next: Vec<Vec<SupportElementMerging>> = Vec::with_capacity(buckets.len().div_ceil(2));
        let mut iter = buckets.into_iter();
        let mut pairs: Vec<(Vec<SupportElementMerging>, Option<Vec<SupportElementMerging>>)> =
            Vec::new();
        while let Some(a) = iter.next() {
            pairs.push((a, iter.next()));
        }
        pairs
            .par_iter_mut()
            .try_for_each(|(dst, src)| -> Result<(), Error> {
                if let Some(src) = src.take() {
                    merge_influence_areas_two_sets(volumes, config, layer_idx, dst, src);
                }
                cancel.check()
            })?;
        for (dst, _) in pairs {
            next.push(dst);
        }
        buckets = next;
    }

    Ok(buckets.pop().unwrap_or_default())
}

/// Propagate influence areas downwards through all layers, merging
/// overlapping ones.
pub(crate) fn create_layer_pathing(
    volumes: &TreeModelVolumes,
    config: &Settings,
    move_bounds: &mut MoveBounds,
    cancel: CancelToken<'_>,
) -> Result<(), Error> {
    let mut last_merge_layer_idx = move_bounds.len() as LayerIndex;
    let mut new_element = false;

    // At least one merge per 3 mm of height, 1 mm of slow movement or 5 mm
    // of fast movement, whichever is lowest.
    let max_merge_every_x_layers: usize = (taproot_geom::scaled(5.0)
        / config.maximum_move_distance.max(taproot_geom::scaled(0.1)))
    .min(taproot_geom::scaled(1.0) / config.maximum_move_distance_slow.max(taproot_geom::scaled(0.02)))
    .min(taproot_geom::scaled(3.0) / config.layer_height)
    .max(1) as usize;
    let mut merge_every_x_layers = 1_usize;

    for layer_idx in (1..move_bounds.len() as LayerIndex).rev() {
        if move_bounds[layer_idx as usize].is_empty() {
            continue;
        }
        // Merging is expensive; with few changes it may be skipped for a
        // couple of layers.
        let had_new_element = new_element;
        let merge_this_layer =
            had_new_element || (last_merge_layer_idx - layer_idx) as usize >= merge_every_x_layers;
        if had_new_element {
            merge_every_x_layers = 1;
        }

        // Grow every area onto the layer below.
        let mut influence_areas: Vec<SupportElementMerging> = {
            let prev_layer = &move_bounds[layer_idx as usize];
            prev_layer
                .iter()
                .enumerate()
                .map(|(element_idx, el)| {
                    let mut parents = ParentIndices::new();
                    parents.push(element_idx as i32);
                    SupportElementMerging::new(el.state.clone(), parents)
                })
                .collect()
        };
        {
            let (below, above) = move_bounds.split_at_mut(layer_idx as usize);
            let _ = below;
            increase_areas_one_layer(
                volumes,
                config,
                &mut influence_areas,
                layer_idx,
                &mut above[0],
                merge_this_layer,
                cancel,
            )?;
        }

        // Elements that are already final bypass the merge.
        let mut this_layer: Vec<SupportElement> = Vec::new();
        influence_areas.retain_mut(|elem| {
            if elem.influence_areas.is_empty() {
                // Removed entirely by collisions.
                return false;
            }
            if elem.to_bp_areas.is_empty() && elem.to_model_areas.is_empty() {
                if area(&elem.influence_areas) < tiny_area_threshold() {
                    warn!(
                        "insert error of influence area bypass on layer {}",
                        layer_idx - 1
                    );
                }
                this_layer.push(SupportElement::with_parents(
                    elem.state.clone(),
                    core::mem::take(&mut elem.parents),
                    core::mem::take(&mut elem.influence_areas),
                ));
                return false;
            }
            true
        });

        new_element = !this_layer.is_empty();

        if merge_this_layer {
            let count_before_merge = influence_areas.len();
            if count_before_merge > 1 {
                influence_areas =
                    merge_influence_areas(volumes, config, layer_idx, influence_areas, cancel)?;
            }
            let reduced_by_merging = count_before_merge > influence_areas.len();
            last_merge_layer_idx = layer_idx;
            if !reduced_by_merging && !had_new_element {
                merge_every_x_layers = max_merge_every_x_layers.min(merge_every_x_layers + 1);
            }
        }

        for mut elem in influence_areas {
            if !elem.influence_areas.is_empty() {
                let new_area = safe_union(&elem.influence_areas, &Polygons::new());
                if area(&new_area) < tiny_area_threshold() {
                    warn!(
                        "insert error of influence area on layer {}; origin of {} areas; was to bp {}",
                        layer_idx - 1,
                        elem.parents.len(),
                        elem.state.to_buildplate
                    );
                }
                this_layer.push(SupportElement::with_parents(
                    elem.state.clone(),
                    core::mem::take(&mut elem.parents),
                    new_area,
                ));
            }
        }
        move_bounds[layer_idx as usize - 1] = this_layer;

        cancel.check()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use taproot_geom::{Polygon, contains, make_circle, scaled};

    fn disc(center: Point, radius_mm: f64) -> Polygons {
        let mut c = make_circle(scaled(radius_mm), 32);
        c.translate(center);
        vec![c]
    }

    #[test]
    fn safe_union_preserves_degenerate_input() {
        // A zero-area sliver of collinear points would vanish in a plain
        // union.
        let sliver = vec![Polygon::new(vec![
            Point::new(0, 0),
            Point::new(scaled(1.0), 0),
            Point::new(scaled(0.5), 0),
        ])];
        let merged = safe_union(&sliver, &Polygons::new());
        assert!(!merged.is_empty(), "safe_union must not destroy areas");
    }

    #[test]
    fn safe_offset_inc_does_not_jump_obstacles() {
        // A thin wall right of the disc: growing towards it must not leak
        // across.
        let start = disc(Point::new(0, 0), 0.4);
        let wall = vec![Polygon::new(vec![
            Point::from_mm(1.0, -5.0),
            Point::from_mm(1.2, -5.0),
            Point::from_mm(1.2, 5.0),
            Point::from_mm(1.0, 5.0),
        ])];
        let grown = safe_offset_inc(&start, scaled(3.0), &wall, scaled(0.2), 0, 1);
        assert!(contains(&grown, Point::from_mm(0.9, 0.0)));
        assert!(
            !contains(&grown, Point::from_mm(1.5, 0.0)),
            "the offset leaked through the wall"
        );
    }

    #[test]
    fn safe_offset_inc_zero_distance_is_identity_minus_collision() {
        let start = disc(Point::new(0, 0), 1.0);
        let out = safe_offset_inc(&start, 0, &Polygons::new(), scaled(0.2), 0, 1);
        let a0 = area(&start);
        let a1 = area(&out);
        assert!((a0 - a1).abs() / a0 < 0.01);
    }

    #[test]
    fn pair_mut_returns_disjoint_references() {
        let mut v = vec![1, 2, 3, 4];
        let (a, b) = pair_mut(&mut v, 1, 3);
        *a = 10;
        *b = 40;
        assert_eq!(v, vec![1, 10, 3, 40]);
    }

    #[test]
    fn increase_without_movement_keeps_the_parent_area() {
        use crate::config::MeshGroupSettings;
        use crate::element::{AreaIncreaseSettings, SupportElement, SupportElementState};

        let config = crate::config::Settings::new(&MeshGroupSettings::default());
        let volumes = TreeModelVolumes::new(
            &vec![Polygons::new(); 8],
            disc(Point::new(0, 0), 100.0),
            &config,
        );
        let mut state = SupportElementState::new_tip(6, Point::new(0, 0));
        state.layer_idx = 5;
        state.distance_to_top = 1;
        let parent = SupportElement::new(state, disc(Point::new(0, 0), 1.0));
        let settings = AreaIncreaseSettings {
            avoidance: AvoidanceKind::Fast,
            increase_speed: 0,
            increase_radius: false,
            no_error: true,
            use_min_distance: false,
            moving: false,
        };
        let mut to_bp = Polygons::new();
        let mut to_model = Polygons::new();
        let mut increased = Polygons::new();
        let result = increase_single_area(
            &volumes, &config, &settings, 5, &parent, &Polygons::new(), &mut to_bp, &mut to_model,
            &mut increased, 0, false,
        );
        assert!(result.is_some(), "an unobstructed area must survive");
        assert_eq!(
            increased, parent.influence_area,
            "no movement and no radius growth must keep the area unchanged"
        );
    }
}
