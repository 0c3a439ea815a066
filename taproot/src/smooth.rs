// Copyright 2025 the Taproot Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Organic smoothing: nudging branch spheres out of collisions and
//! Laplacian-smoothing the centrelines.

use glam::Vec3;
use rayon::prelude::*;

use taproot_geom::{Point, scaled, unscaled};
use taproot_index::{LineTree, Segment};

use crate::config::{LayerIndex, Settings};
use crate::element::{MoveBounds, support_element_radius};
use crate::volumes::TreeModelVolumes;
use crate::{CancelToken, Error};

/// One element of the linearised forest: its location in `move_bounds` and
/// the index (within the layer below) of the child linking down to it.
#[derive(Copy, Clone, Debug)]
pub(crate) struct LinearElement {
    pub layer_idx: u32,
    pub elem_idx: u32,
    pub link_down: i32,
}

/// All surviving elements in layer order, plus the start offset of every
/// layer in the linear array.
pub(crate) fn linearize_forest(move_bounds: &MoveBounds) -> (Vec<LinearElement>, Vec<usize>) {
    let mut linear = Vec::new();
    let mut offsets = vec![0_usize];
    let mut child_of_current: Vec<i32> = Vec::new();
    for layer_idx in 0..move_bounds.len() {
        let layer = &move_bounds[layer_idx];
        let next_len = move_bounds.get(layer_idx + 1).map_or(0, Vec::len);
        let mut child_of_next = vec![-1_i32; next_len];
        for (elem_idx, elem) in layer.iter().enumerate() {
            let link_down = if layer_idx == 0 {
                -1
            } else {
                child_of_current.get(elem_idx).copied().unwrap_or(-1)
            };
            for &parent in &elem.parents {
                let slot = &mut child_of_next[parent as usize];
                // Only one link points down from a node.
                if *slot == -1 {
                    *slot = elem_idx as i32;
                }
            }
            linear.push(LinearElement {
                layer_idx: layer_idx as u32,
                elem_idx: elem_idx as u32,
                link_down,
            });
        }
        offsets.push(linear.len());
        child_of_current = child_of_next;
    }
    (linear, offsets)
}

struct CollisionSphere {
    layer_idx: LayerIndex,
    parents_linear: Vec<usize>,
    below_linear: Option<usize>,
    locked: bool,
    /// Radius in millimetres.
    radius: f64,
    position: Vec3,
    layer_begin: LayerIndex,
    layer_end: LayerIndex,
}

const COLLISION_EXTRA_GAP: f64 = 0.1;
const MAX_NUDGE_COLLISION_AVOIDANCE: f64 = 0.5;
const MAX_NUDGE_SMOOTHING: f64 = 0.2;
const SMOOTHING_FACTOR: f64 = 0.5;
const NUM_ITER: usize = 100;
const EPSILON: f64 = 1e-4;

/// Iteratively nudge branch spheres away from the per-layer collision
/// contours and Laplacian-smooth the centrelines, then write the final
/// positions back into `result_on_layer`.
pub(crate) fn organic_smooth_branches_avoid_collisions(
    volumes: &TreeModelVolumes,
    config: &Settings,
    move_bounds: &mut MoveBounds,
    linear: &[LinearElement],
    offsets: &[usize],
    cancel: CancelToken<'_>,
) -> Result<(), Error> {
    if linear.is_empty() {
        return Ok(());
    }

    // Per-layer line trees over the collision contours, in millimetres.
    let num_layers = linear
        .iter()
        .map(|e| e.layer_idx as usize + 1)
        .max()
        .unwrap_or(0);
    let mut layer_trees: Vec<LineTree> = Vec::with_capacity(num_layers);
    for layer_idx in 0..num_layers as LayerIndex {
        cancel.check()?;
        let (_, collision) = volumes.get_collision_lower_bound_area(layer_idx, 0);
        let mut segments = Vec::new();
        for contour in collision.iter() {
            let n = contour.points.len();
            if n < 2 {
                continue;
            }
            for i in 0..n {
                let a = contour.points[i];
                let b = contour.points[(i + 1) % n];
                segments.push(Segment::new(
                    [unscaled(a.x), unscaled(a.y)],
                    [unscaled(b.x), unscaled(b.y)],
                ));
            }
        }
        layer_trees.push(LineTree::build(segments));
    }

    // Build the spheres in linear order.
    let mut spheres: Vec<CollisionSphere> = Vec::with_capacity(linear.len());
    for le in linear {
        let elem = &move_bounds[le.layer_idx as usize][le.elem_idx as usize];
        let result = elem
            .state
            .result_on_layer
            .expect("surviving elements are placed");
        let radius = unscaled(support_element_radius(config, &elem.state));
        let z = config.layer_z(le.layer_idx as LayerIndex);
        let below_linear = (le.link_down >= 0).then(|| {
            offsets[le.layer_idx as usize - 1] + le.link_down as usize
        });
        let parents_linear: Vec<usize> = elem
            .parents
            .iter()
            .map(|&p| offsets[le.layer_idx as usize + 1] + p as usize)
            .collect();
        let locked =
            elem.parents.is_empty() || (le.link_down == -1 && le.layer_idx > 0);
        spheres.push(CollisionSphere {
            layer_idx: le.layer_idx as LayerIndex,
            parents_linear,
            below_linear,
            locked,
            radius,
            position: Vec3::new(
                unscaled(result.x) as f32,
                unscaled(result.y) as f32,
                z as f32,
            ),
            layer_begin: 0,
            layer_end: 0,
        });
    }

    // min_z propagates up from the bottom of each tree, max_z down from the
    // tips; both bound the Z span each sphere is collision-checked against.
    let mut min_z = vec![f64::MIN; spheres.len()];
    for i in 0..spheres.len() {
        min_z[i] = match spheres[i].below_linear {
            Some(below) => min_z[below],
            None => f64::from(spheres[i].position.z),
        };
    }
    let mut max_z = vec![f64::MAX; spheres.len()];
    for i in (0..spheres.len()).rev() {
        if spheres[i].parents_linear.is_empty() {
            max_z[i] = f64::from(spheres[i].position.z);
        } else {
            for parent in spheres[i].parents_linear.clone() {
                max_z[i] = max_z[i].min(max_z[parent]);
            }
        }
    }
    for (i, sphere) in spheres.iter_mut().enumerate() {
        let zmin = min_z[i].max(f64::from(sphere.position.z) - sphere.radius);
        let zmax = max_z[i].min(f64::from(sphere.position.z) + sphere.radius);
        sphere.layer_begin = sphere.layer_idx.min(config.layer_idx_ceil(zmin));
        sphere.layer_end = (num_layers as LayerIndex)
            .min(sphere.layer_idx.max(config.layer_idx_floor(zmax)) + 1);
    }

    cancel.check()?;

    let layer_height = unscaled(config.layer_height);
    let mut prev_positions: Vec<Vec3> = Vec::with_capacity(spheres.len());
    for _ in 0..NUM_ITER {
        // Snapshot before smoothing, so neighbour reads are race-free.
        prev_positions.clear();
        prev_positions.extend(spheres.iter().map(|s| s.position));
        let prev = &prev_positions;

        let num_moved = std::sync::atomic::AtomicUsize::new(0);
        spheres
            .par_iter_mut()
            .try_for_each(|sphere| -> Result<(), Error> {
                if sphere.locked {
                    return Ok(());
                }
                // Deepest collision of the sphere across its layer span.
                let mut last_collision: Option<([f64; 2], f64)> = None;
                let mut last_collision_depth = f64::MIN;
                for layer_id in sphere.layer_begin..sphere.layer_end {
                    let dz = f64::from(layer_id - sphere.layer_idx) * layer_height;
                    let r2 = sphere.radius * sphere.radius - dz * dz;
                    if r2 <= 0.0 {
                        continue;
                    }
                    let tree = &layer_trees[layer_id as usize];
                    if tree.is_empty() {
                        continue;
                    }
                    let p = [f64::from(sphere.position.x), f64::from(sphere.position.y)];
                    if let Some((d2, hit)) = tree.squared_distance_to_lines(p, r2) {
                        let collision_depth = r2.sqrt() - d2.sqrt();
                        if collision_depth > last_collision_depth {
                            last_collision_depth = collision_depth;
                            last_collision = Some((hit, collision_depth));
                        }
                    }
                }
                if let Some((hit, depth)) = last_collision
                    && depth > 0.0
                {
                    if depth > EPSILON {
                        // Hysteresis to detect convergence.
                        num_moved.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    }
                    let nudge_dist = (depth + COLLISION_EXTRA_GAP)
                        .max(0.0)
                        .min(MAX_NUDGE_COLLISION_AVOIDANCE);
                    let away = [
                        f64::from(sphere.position.x) - hit[0],
                        f64::from(sphere.position.y) - hit[1],
                    ];
                    let len = (away[0] * away[0] + away[1] * away[1]).sqrt();
                    if len > 0.0 {
                        sphere.position.x += ((away[0] / len) * nudge_dist) as f32;
                        sphere.position.y += ((away[1] / len) * nudge_dist) as f32;
                    }
                }

                // Laplacian smoothing against the snapshot positions.
                let mut avg = [0.0_f64; 2];
                let mut weight = 0.0_f64;
                for &parent in &sphere.parents_linear {
                    let w = sphere.radius;
                    avg[0] += w * f64::from(prev[parent].x);
                    avg[1] += w * f64::from(prev[parent].y);
                    weight += w;
                }
                if let Some(below) = sphere.below_linear {
                    let w = weight;
                    avg[0] += w * f64::from(prev[below].x);
                    avg[1] += w * f64::from(prev[below].y);
                    weight += w;
                }
                if weight > 0.0 {
                    avg[0] /= weight;
                    avg[1] /= weight;
                    let old = [f64::from(sphere.position.x), f64::from(sphere.position.y)];
                    let new = [
                        (1.0 - SMOOTHING_FACTOR) * old[0] + SMOOTHING_FACTOR * avg[0],
                        (1.0 - SMOOTHING_FACTOR) * old[1] + SMOOTHING_FACTOR * avg[1],
                    ];
                    let shift = [new[0] - old[0], new[1] - old[1]];
                    let shift_len = (shift[0] * shift[0] + shift[1] * shift[1]).sqrt();
                    let nudge_dist = shift_len.max(0.0).min(MAX_NUDGE_SMOOTHING);
                    if shift_len > 0.0 {
                        sphere.position.x += ((shift[0] / shift_len) * nudge_dist) as f32;
                        sphere.position.y += ((shift[1] / shift_len) * nudge_dist) as f32;
                    }
                }
                cancel.check()
            })?;

        if num_moved.load(std::sync::atomic::Ordering::Relaxed) == 0 {
            break;
        }
    }

    // Write the smoothed positions back into the elements.
    for (le, sphere) in linear.iter().zip(&spheres) {
        let elem = &mut move_bounds[le.layer_idx as usize][le.elem_idx as usize];
        elem.state.result_on_layer = Some(Point::new(
            scaled(f64::from(sphere.position.x)),
            scaled(f64::from(sphere.position.y)),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MeshGroupSettings;
    use crate::element::{ParentIndices, SupportElement, SupportElementState};
    use taproot_geom::{Polygon, Polygons};

    fn chain_move_bounds(layers: usize) -> MoveBounds {
        // A vertical chain: each element's parent is index 0 on the layer
        // above.
        let mut move_bounds: MoveBounds = vec![Vec::new(); layers];
        for (layer_idx, layer) in move_bounds.iter_mut().enumerate() {
            let mut state = SupportElementState::new_tip(layers as i32 - 1, Point::new(0, 0));
            state.layer_idx = layer_idx as i32;
            state.distance_to_top = layers - 1 - layer_idx;
            state.result_on_layer = Some(Point::new(0, 0));
            let mut parents = ParentIndices::new();
            if layer_idx + 1 < layers {
                parents.push(0);
            }
            let area = vec![taproot_geom::make_circle(scaled(5.0), 16)];
            layer.push(SupportElement::with_parents(state, parents, area));
        }
        move_bounds
    }

    #[test]
    fn linearization_links_down_the_chain() {
        let move_bounds = chain_move_bounds(4);
        let (linear, offsets) = linearize_forest(&move_bounds);
        assert_eq!(linear.len(), 4);
        assert_eq!(offsets, vec![0, 1, 2, 3, 4]);
        assert_eq!(linear[0].link_down, -1);
        for le in &linear[1..] {
            assert_eq!(le.link_down, 0, "each element links to its child below");
        }
    }

    #[test]
    fn smoothing_is_stable_without_collisions() {
        let m = MeshGroupSettings::default();
        let settings = Settings::new(&m);
        let bed: Polygons = vec![Polygon::new(vec![
            Point::from_mm(-100.0, -100.0),
            Point::from_mm(100.0, -100.0),
            Point::from_mm(100.0, 100.0),
            Point::from_mm(-100.0, 100.0),
        ])];
        let volumes = TreeModelVolumes::new(&vec![Polygons::new(); 4], bed, &settings);
        let mut move_bounds = chain_move_bounds(4);
        let (linear, offsets) = linearize_forest(&move_bounds);
        organic_smooth_branches_avoid_collisions(
            &volumes,
            &settings,
            &mut move_bounds,
            &linear,
            &offsets,
            crate::CancelToken::never(),
        )
        .unwrap();
        // A straight vertical chain with no collisions must not move.
        for layer in &move_bounds {
            let p = layer[0].state.result_on_layer.unwrap();
            assert!(p.norm() < scaled(0.01) as f64, "chain moved by {}", p.norm());
        }
    }
}
