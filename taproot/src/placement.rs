// Copyright 2025 the Taproot Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Centreline extraction: choosing a concrete point in every influence area
//! and turning the DAG into a well-anchored forest.

use log::{debug, warn};

use taproot_geom::{intersection, move_inside_if_outside};

use crate::config::{LayerIndex, Settings};
use crate::element::{MoveBounds, support_element_collision_radius};
use crate::volumes::TreeModelVolumes;
use crate::{CancelToken, Error};

/// Project `elem`'s placement into the influence areas of its parents.
fn set_points_on_areas(move_bounds: &mut MoveBounds, layer_idx: LayerIndex, elem_idx: usize) {
    let (result, parents) = {
        let elem = &move_bounds[layer_idx as usize][elem_idx];
        debug_assert!(!elem.state.deleted, "deleted elements have no placement");
        (elem.state.result_on_layer, elem.parents.clone())
    };
    let Some(result) = result else {
        warn!("uninitialized support element; a branch may be missing");
        return;
    };
    if layer_idx as usize + 1 >= move_bounds.len() {
        return;
    }
    let layer_above = &mut move_bounds[layer_idx as usize + 1];
    for parent_idx in parents {
        let next_elem = &mut layer_above[parent_idx as usize];
        debug_assert!(!next_elem.state.deleted, "parents of live elements are live");
        // A placement set earlier (a tip that was not allowed to move) is
        // kept.
        if next_elem.state.result_on_layer.is_none() {
            next_elem.state.result_on_layer =
                Some(move_inside_if_outside(&next_elem.influence_area, result));
        }
        next_elem.state.marked = true;
    }
}

/// Drop the element onto the model wherever its influence area is, without a
/// gracious anchor.
fn set_to_model_contact_simple(move_bounds: &mut MoveBounds, layer_idx: LayerIndex, elem_idx: usize) {
    let elem = &mut move_bounds[layer_idx as usize][elem_idx];
    let best = move_inside_if_outside(&elem.influence_area, elem.state.next_position);
    elem.state.result_on_layer = Some(best);
    debug!(
        "added non-gracious support on model point ({}, {}) on layer {}",
        best.x, best.y, elem.state.layer_idx
    );
}

/// Walk up the single-parent chain to the highest layer where the branch can
/// rest on a placeable area; everything below becomes the trunk is removed.
fn set_to_model_contact_gracious(
    volumes: &TreeModelVolumes,
    config: &Settings,
    move_bounds: &mut MoveBounds,
    layer_idx: LayerIndex,
    elem_idx: usize,
    cancel: CancelToken<'_>,
) -> Result<(), Error> {
    let mut last_successful: Option<(LayerIndex, usize)> = None;
    {
        let mut check_layer = layer_idx;
        let mut check_idx = elem_idx;
        loop {
            cancel.check()?;
            let elem = &move_bounds[check_layer as usize][check_idx];
            debug_assert!(elem.state.to_model_gracious, "only gracious chains are walked");
            let placeable = volumes.get_placeable_areas(
                support_element_collision_radius(config, &elem.state),
                check_layer,
            );
            if intersection(&elem.influence_area, &placeable).is_empty() {
                break;
            }
            last_successful = Some((check_layer, check_idx));
            if elem.parents.len() != 1 {
                // A merge point ends the chain.
                break;
            }
            let parent = elem.parents[0] as usize;
            check_layer += 1;
            check_idx = parent;
            if check_layer as usize >= move_bounds.len() {
                break;
            }
        }
    }

    match last_successful {
        None => {
            // Should not happen for gracious elements; place it anyway and
            // expect a possibly floating branch.
            warn!(
                "no valid placement found for to-model-gracious element on layer {layer_idx}; placing anyway, this may cause a floating branch"
            );
            move_bounds[layer_idx as usize][elem_idx]
                .state
                .to_model_gracious = false;
            set_to_model_contact_simple(move_bounds, layer_idx, elem_idx);
        }
        Some((best_layer, best_idx)) => {
            // Delete everything below the effective root.
            let mut l = layer_idx;
            let mut i = elem_idx;
            while (l, i) != (best_layer, best_idx) {
                let elem = &mut move_bounds[l as usize][i];
                elem.state.deleted = true;
                let parent = elem.parents[0] as usize;
                l += 1;
                i = parent;
            }
            let elem = &mut move_bounds[best_layer as usize][best_idx];
            let best = move_inside_if_outside(&elem.influence_area, elem.state.next_position);
            elem.state.result_on_layer = Some(best);
            debug!(
                "added gracious support on model point ({}, {}) on layer {}",
                best.x, best.y, best_layer
            );
        }
    }
    Ok(())
}

/// Remove elements marked as deleted, remapping parent indices.
fn remove_deleted_elements(move_bounds: &mut MoveBounds) {
    // Old-index -> new-index table of the layer above the one being
    // processed.
    let mut map_parents: Vec<i32> = Vec::new();
    for layer_idx in (0..move_bounds.len()).rev() {
        let layer = &mut move_bounds[layer_idx];
        let original_len = layer.len();
        // Track which original index occupies each slot while compacting.
        let mut old_at: Vec<i32> = (0..original_len as i32).collect();
        let mut i = 0;
        while i < layer.len() {
            if layer[i].state.deleted {
                layer.swap_remove(i);
                old_at.swap_remove(i);
            } else {
                i += 1;
            }
        }
        let mut map_current: Vec<i32> = vec![-1; original_len];
        for (slot, &old) in old_at.iter().enumerate() {
            map_current[old as usize] = slot as i32;
        }
        for element in layer.iter_mut() {
            if !map_parents.is_empty() {
                for parent_idx in element.parents.iter_mut() {
                    let mapped = map_parents[*parent_idx as usize];
                    debug_assert!(mapped >= 0, "live elements must not point at deleted parents");
                    *parent_idx = mapped;
                }
            }
        }
        map_parents = map_current;
    }
}

/// Set `result_on_layer` for every element, bottom-up, and cull elements
/// that cannot be anchored.
pub(crate) fn create_nodes_from_area(
    volumes: &TreeModelVolumes,
    config: &Settings,
    move_bounds: &mut MoveBounds,
    cancel: CancelToken<'_>,
) -> Result<(), Error> {
    // Layer 0: any point inside the influence area is valid; bias towards
    // the accumulated next_position.
    {
        if move_bounds.len() > 1 {
            let layer_above = &mut move_bounds[1];
            for elem in layer_above.iter_mut() {
                elem.state.marked = false;
            }
        }
        for i in 0..move_bounds.first().map_or(0, Vec::len) {
            let elem = &mut move_bounds[0][i];
            elem.state.result_on_layer = Some(move_inside_if_outside(
                &elem.influence_area,
                elem.state.next_position,
            ));
            set_points_on_areas(move_bounds, 0, i);
        }
    }

    cancel.check()?;

    for layer_idx in 1..move_bounds.len() as LayerIndex {
        if (layer_idx as usize + 1) < move_bounds.len() {
            for elem in move_bounds[layer_idx as usize + 1].iter_mut() {
                elem.state.marked = false;
            }
        }
        for elem_idx in 0..move_bounds[layer_idx as usize].len() {
            let (has_result, to_buildplate, distance_to_top, supports_roof, gracious) = {
                let state = &move_bounds[layer_idx as usize][elem_idx].state;
                debug_assert!(!state.deleted, "compaction has not run yet");
                debug_assert_eq!(state.layer_idx, layer_idx, "elements live on their layer");
                (
                    state.result_on_layer.is_some(),
                    state.to_buildplate,
                    state.distance_to_top,
                    state.supports_roof,
                    state.to_model_gracious,
                )
            };
            if !has_result {
                if to_buildplate || (distance_to_top < config.min_dtt_to_model && !supports_roof) {
                    if to_buildplate {
                        warn!(
                            "uninitialized influence area on layer {layer_idx}; a branch could be missing or exist only partially"
                        );
                    }
                    // Parents have a lower dtt and no placement either; they
                    // are culled by the same rule on later layers.
                    move_bounds[layer_idx as usize][elem_idx].state.deleted = true;
                } else if gracious {
                    set_to_model_contact_gracious(
                        volumes,
                        config,
                        move_bounds,
                        layer_idx,
                        elem_idx,
                        cancel,
                    )?;
                } else {
                    set_to_model_contact_simple(move_bounds, layer_idx, elem_idx);
                }
            }

            let (deleted, marked, target_height) = {
                let state = &move_bounds[layer_idx as usize][elem_idx].state;
                (state.deleted, state.marked, state.target_height)
            };
            if !deleted && !marked && target_height == layer_idx {
                // A tip that supports nothing.
                move_bounds[layer_idx as usize][elem_idx].state.deleted = true;
            }
            let deleted = move_bounds[layer_idx as usize][elem_idx].state.deleted;
            if deleted {
                // The subtree above was counting on this branch; invalidate
                // its placements so it gets re-anchored or culled.
                let parents = move_bounds[layer_idx as usize][elem_idx].parents.clone();
                if (layer_idx as usize + 1) < move_bounds.len() {
                    for parent_idx in parents {
                        move_bounds[layer_idx as usize + 1][parent_idx as usize]
                            .state
                            .result_on_layer = None;
                    }
                }
            } else {
                set_points_on_areas(move_bounds, layer_idx, elem_idx);
            }
        }
        cancel.check()?;
    }

    validate_slopes(config, move_bounds);
    remove_deleted_elements(move_bounds);
    validate_slopes(config, move_bounds);
    Ok(())
}

/// Soft check of the branch slope across every surviving edge. Exceeding the
/// bound happens after merges and is logged, not enforced.
fn validate_slopes(config: &Settings, move_bounds: &MoveBounds) {
    if !cfg!(debug_assertions) {
        return;
    }
    for layer_idx in 0..move_bounds.len().saturating_sub(1) {
        let layer = &move_bounds[layer_idx];
        let above = &move_bounds[layer_idx + 1];
        for elem in layer {
            if elem.state.deleted {
                continue;
            }
            for &iparent in &elem.parents {
                let parent = &above[iparent as usize];
                if let (Some(res), Some(parent_res)) =
                    (elem.state.result_on_layer, parent.state.result_on_layer)
                {
                    let radius_increase = crate::element::support_element_radius(config, &elem.state)
                        - crate::element::support_element_radius(config, &parent.state);
                    let shift = (res - parent_res).norm();
                    if shift > (radius_increase + 2 * config.maximum_move_distance_slow) as f64 {
                        debug!(
                            "branch slope exceeds the expected bound on layer {layer_idx}: shift {shift}"
                        );
                    }
                }
            }
        }
    }
}

/// `true` when two polygon sets overlap with non-zero area. Test helper.
#[cfg(test)]
fn influence_overlaps(a: &taproot_geom::Polygons, b: &taproot_geom::Polygons) -> bool {
    taproot_geom::area(&intersection(a, b)) > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MeshGroupSettings;
    use crate::element::{ParentIndices, SupportElement, SupportElementState};
    use taproot_geom::{Point, Polygon, Polygons, scaled};

    fn square_at(x0: f64, y0: f64, side: f64) -> Polygons {
        let (x0, y0, s) = (scaled(x0), scaled(y0), scaled(side));
        vec![Polygon::new(vec![
            Point::new(x0, y0),
            Point::new(x0 + s, y0),
            Point::new(x0 + s, y0 + s),
            Point::new(x0, y0 + s),
        ])]
    }

    fn element(
        layer: i32,
        target: i32,
        area_polys: Polygons,
        parents: &[i32],
    ) -> SupportElement {
        let mut state = SupportElementState::new_tip(target, Point::new(0, 0));
        state.layer_idx = layer;
        state.distance_to_top = (target - layer) as usize;
        state.result_on_layer = None;
        state.to_buildplate = true;
        let mut p = ParentIndices::new();
        p.extend(parents.iter().copied());
        SupportElement::with_parents(state, p, area_polys)
    }

    fn simple_volumes(settings: &Settings) -> TreeModelVolumes {
        TreeModelVolumes::new(
            &vec![Polygons::new(); 8],
            square_at(-100.0, -100.0, 200.0),
            settings,
        )
    }

    #[test]
    fn results_propagate_into_parent_areas() {
        let settings = Settings::new(&MeshGroupSettings::default());
        let volumes = simple_volumes(&settings);
        let mut move_bounds: MoveBounds = vec![Vec::new(); 4];
        // A three-element chain with offset influence areas.
        move_bounds[0].push(element(0, 2, square_at(0.0, 0.0, 2.0), &[0]));
        move_bounds[1].push(element(1, 2, square_at(3.0, 0.0, 2.0), &[0]));
        move_bounds[2].push(element(2, 2, square_at(6.0, 0.0, 2.0), &[]));

        create_nodes_from_area(&volumes, &settings, &mut move_bounds, crate::CancelToken::never())
            .unwrap();

        for layer in 0..3 {
            assert_eq!(move_bounds[layer].len(), 1, "chain survives on layer {layer}");
            let elem = &move_bounds[layer][0];
            let result = elem.state.result_on_layer.expect("placement must be set");
            assert!(
                taproot_geom::contains(&elem.influence_area, result),
                "placement must stay inside the influence area"
            );
        }
    }

    #[test]
    fn orphan_tips_are_culled() {
        let settings = Settings::new(&MeshGroupSettings::default());
        let volumes = simple_volumes(&settings);
        let mut move_bounds: MoveBounds = vec![Vec::new(); 3];
        // A tip on layer 1 with no child below it and no way to anchor.
        let mut orphan = element(1, 1, square_at(0.0, 0.0, 1.0), &[]);
        orphan.state.result_on_layer = None;
        orphan.state.to_buildplate = true;
        move_bounds[1].push(orphan);

        create_nodes_from_area(&volumes, &settings, &mut move_bounds, crate::CancelToken::never())
            .unwrap();
        assert!(move_bounds[1].is_empty(), "unanchored tip must be removed");
    }

    #[test]
    fn compaction_remaps_parent_indices() {
        let settings = Settings::new(&MeshGroupSettings::default());
        let mut move_bounds: MoveBounds = vec![Vec::new(); 2];
        // Layer 1 has three elements; the middle one is deleted.
        move_bounds[1].push(element(1, 1, square_at(0.0, 0.0, 1.0), &[]));
        move_bounds[1].push(element(1, 1, square_at(2.0, 0.0, 1.0), &[]));
        move_bounds[1].push(element(1, 1, square_at(4.0, 0.0, 1.0), &[]));
        move_bounds[1][1].state.deleted = true;
        for elem in move_bounds[1].iter_mut() {
            elem.state.result_on_layer = Some(Point::new(0, 0));
        }
        // Layer 0 element pointing at index 2 of layer 1.
        move_bounds[0].push(element(0, 1, square_at(4.0, 0.0, 1.0), &[2]));
        move_bounds[0][0].state.result_on_layer = Some(Point::new(0, 0));

        remove_deleted_elements(&mut move_bounds);
        assert_eq!(move_bounds[1].len(), 2);
        let parent_idx = move_bounds[0][0].parents[0];
        assert!(parent_idx >= 0 && (parent_idx as usize) < move_bounds[1].len());
        // The surviving parent is the one whose influence area sits at x=4.
        let parent = &move_bounds[1][parent_idx as usize];
        assert!(influence_overlaps(
            &parent.influence_area,
            &square_at(4.0, 0.0, 1.0)
        ));
        let _ = settings;
    }
}
