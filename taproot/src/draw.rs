// Copyright 2025 the Taproot Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tree realisation: extracting branches from the DAG, extruding them into
//! capsule meshes, re-slicing and assembling the final per-layer areas.

use glam::{DVec3, Vec3};
use rayon::prelude::*;

use taproot_geom::{
    Polygons, area, closing, difference, intersection, simplify, union_, unscaled,
};
use taproot_mesh::{TriangleSoup, discretize_circle, slice_mesh, triangulate_fan, triangulate_strip};

use crate::config::{LayerIndex, Settings};
use crate::element::{MoveBounds, support_element_radius};
use crate::interface::{InterfacePlacer, SupportLayer};
use crate::smooth::{linearize_forest, organic_smooth_branches_avoid_collisions};
use crate::volumes::TreeModelVolumes;
use crate::{CancelToken, Error};

/// Chord tolerance of the branch discretisation, millimetres.
const BRANCH_MESH_EPS: f32 = 0.015;

/// A chain of elements with no interior bifurcation, as (layer, index)
/// pairs into the element arenas, bottom-up.
#[derive(Clone, Debug)]
struct Branch {
    path: Vec<(u32, u32)>,
    has_root: bool,
    has_tip: bool,
}

#[derive(Clone, Debug, Default)]
struct Slice {
    polygons: Polygons,
    bottom_contacts: Polygons,
    num_branches: usize,
}

#[derive(Clone, Debug, Default)]
struct Tree {
    branches: Vec<Branch>,
    slices: Vec<Slice>,
    /// Layer of `slices[0]`; -1 while no slice was produced.
    first_layer_id: LayerIndex,
}

/// The per-layer areas the re-slicer produces.
#[derive(Clone, Debug, Default)]
pub(crate) struct DrawnAreas {
    /// Dense floor contact layers.
    pub bottom_contacts: Vec<Option<SupportLayer>>,
    /// Regular support base layers.
    pub base_layers: Vec<Option<SupportLayer>>,
}

/// Collect the branches of the tree rooted at `start`, walking parents until
/// each chain bifurcates.
fn visit_recursive(move_bounds: &mut MoveBounds, start: (u32, u32), out: &mut Tree) {
    let root = out.branches.is_empty();
    move_bounds[start.0 as usize][start.1 as usize].state.marked = true;
    let parents = move_bounds[start.0 as usize][start.1 as usize]
        .parents
        .clone();
    debug_assert!(!parents.is_empty(), "visited elements support something");
    for &parent_idx in &parents {
        let mut branch = Branch {
            path: vec![start],
            has_root: root,
            has_tip: false,
        };
        let first_parent = (start.0 + 1, parent_idx as u32);
        branch.path.push(first_parent);
        let first_parent_parents = move_bounds[first_parent.0 as usize][first_parent.1 as usize]
            .parents
            .clone();
        if first_parent_parents.len() < 2 {
            move_bounds[first_parent.0 as usize][first_parent.1 as usize]
                .state
                .marked = true;
        }
        let mut next_branch: Option<(u32, u32)> = None;
        if first_parent_parents.len() == 1 {
            let mut current = first_parent;
            let mut current_parents = first_parent_parents;
            loop {
                let next_parent = (current.0 + 1, current_parents[0] as u32);
                branch.path.push(next_parent);
                let next_parents = move_bounds[next_parent.0 as usize][next_parent.1 as usize]
                    .parents
                    .clone();
                if next_parents.len() > 1 {
                    // A bifurcation starts a new set of branches.
                    next_branch = Some(next_parent);
                    break;
                }
                move_bounds[next_parent.0 as usize][next_parent.1 as usize]
                    .state
                    .marked = true;
                if next_parents.is_empty() {
                    // Tip reached.
                    break;
                }
                current = next_parent;
                current_parents = next_parents;
            }
        } else if first_parent_parents.len() > 1 {
            next_branch = Some(first_parent);
        }
        debug_assert!(branch.path.len() >= 2, "a branch spans at least two layers");
        branch.has_tip = next_branch.is_none();
        out.branches.push(branch);
        if let Some(next) = next_branch {
            visit_recursive(move_bounds, next, out);
        }
    }
}

/// Extrude one branch path into a capsule mesh. Returns the Z span covered.
fn extrude_branch(
    path: &[(u32, u32)],
    config: &Settings,
    move_bounds: &MoveBounds,
    result: &mut TriangleSoup,
) -> (f32, f32) {
    debug_assert!(path.len() >= 2, "a branch spans at least two layers");
    let pos = |node: (u32, u32)| -> DVec3 {
        let elem = &move_bounds[node.0 as usize][node.1 as usize];
        let p = elem.state.result_on_layer.expect("branch elements are placed");
        DVec3::new(
            unscaled(p.x),
            unscaled(p.y),
            config.layer_z(node.0 as LayerIndex),
        )
    };
    let radius_of = |node: (u32, u32)| -> f32 {
        let elem = &move_bounds[node.0 as usize][node.1 as usize];
        unscaled(support_element_radius(config, &elem.state)) as f32
    };

    let mut zmin = 0.0_f32;
    let mut zmax = 0.0_f32;
    let mut prev_strip = (0_u32, 0_u32);
    let mut nprev = DVec3::ZERO;
    for ipath in 1..path.len() {
        let prev = path[ipath - 1];
        let current = path[ipath];
        let p1 = pos(prev);
        let p2 = pos(current);
        let v1 = (p2 - p1).normalize_or_zero();
        if ipath == 1 {
            nprev = v1;
            // Bottom half sphere.
            let radius = radius_of(prev);
            let angle_step = 2.0 * (1.0 - f64::from(BRANCH_MESH_EPS / radius).min(1.0)).acos();
            // At least one full ring besides the pole, or the cap collapses.
            let nsteps = ((core::f64::consts::PI / (2.0 * angle_step)).ceil() as i32).max(2);
            let angle_step = core::f64::consts::FRAC_PI_2 / f64::from(nsteps);
            let ifan = result.vertices.len() as u32;
            let pole = p1 - nprev * f64::from(radius);
            result.vertices.push(Vec3::new(pole.x as f32, pole.y as f32, pole.z as f32));
            zmin = result.vertices[ifan as usize].z;
            let mut angle = angle_step;
            for i in 1..nsteps {
                let center = p1 - nprev * f64::from(radius) * angle.cos();
                let strip = discretize_circle(
                    result,
                    Vec3::new(center.x as f32, center.y as f32, center.z as f32),
                    Vec3::new(nprev.x as f32, nprev.y as f32, nprev.z as f32),
                    radius * angle.sin() as f32,
                    BRANCH_MESH_EPS,
                );
                if i == 1 {
                    triangulate_fan(result, false, ifan, strip.0, strip.1);
                } else {
                    triangulate_strip(result, prev_strip.0, prev_strip.1, strip.0, strip.1);
                }
                prev_strip = strip;
                angle += angle_step;
            }
        }
        if ipath + 1 == path.len() {
            // Top half sphere.
            let ncurrent = v1;
            let radius = radius_of(current);
            let angle_step = 2.0 * (1.0 - f64::from(BRANCH_MESH_EPS / radius).min(1.0)).acos();
            let nsteps = ((core::f64::consts::PI / (2.0 * angle_step)).ceil() as i32).max(1);
            let angle_step = core::f64::consts::FRAC_PI_2 / f64::from(nsteps);
            let mut angle = core::f64::consts::FRAC_PI_2;
            for _ in 0..nsteps {
                let center = p2 + ncurrent * f64::from(radius) * angle.cos();
                let strip = discretize_circle(
                    result,
                    Vec3::new(center.x as f32, center.y as f32, center.z as f32),
                    Vec3::new(ncurrent.x as f32, ncurrent.y as f32, ncurrent.z as f32),
                    (radius * angle.sin() as f32).max(radius * 1e-3),
                    BRANCH_MESH_EPS,
                );
                triangulate_strip(result, prev_strip.0, prev_strip.1, strip.0, strip.1);
                prev_strip = strip;
                angle -= angle_step;
            }
            let ifan = result.vertices.len() as u32;
            let pole = p2 + ncurrent * f64::from(radius);
            result.vertices.push(Vec3::new(pole.x as f32, pole.y as f32, pole.z as f32));
            zmax = result.vertices[ifan as usize].z;
            triangulate_fan(result, true, ifan, prev_strip.0, prev_strip.1);
        } else {
            // Interior ring, perpendicular to the averaged tangent.
            let next = path[ipath + 1];
            let p3 = pos(next);
            let v2 = (p3 - p2).normalize_or_zero();
            let ncurrent = (v1 + v2).normalize_or_zero();
            let radius = radius_of(current);
            let strip = discretize_circle(
                result,
                Vec3::new(p2.x as f32, p2.y as f32, p2.z as f32),
                Vec3::new(ncurrent.x as f32, ncurrent.y as f32, ncurrent.z as f32),
                radius,
                BRANCH_MESH_EPS,
            );
            triangulate_strip(result, prev_strip.0, prev_strip.1, strip.0, strip.1);
            prev_strip = strip;
        }
    }
    (zmin, zmax)
}

/// Merge `src` into `dst`, tracking how many branches contributed.
fn merge_slice(dst: &mut Slice, polygons: Polygons, bottom_contacts: Polygons) {
    dst.num_branches += 1;
    if dst.num_branches > 1 {
        dst.polygons.extend(polygons);
        dst.bottom_contacts.extend(bottom_contacts);
    } else {
        dst.polygons = polygons;
        dst.bottom_contacts = bottom_contacts;
    }
}

/// Smooth branches, extrude every branch into a mesh, re-slice and emit the
/// final per-layer support areas.
pub(crate) fn organic_draw_branches(
    volumes: &TreeModelVolumes,
    config: &Settings,
    move_bounds: &mut MoveBounds,
    interface_placer: &InterfacePlacer<'_>,
    cancel: CancelToken<'_>,
) -> Result<DrawnAreas, Error> {
    // Rewrite the branch centrelines under collision constraints.
    let (linear, offsets) = linearize_forest(move_bounds);
    organic_smooth_branches_avoid_collisions(
        volumes,
        config,
        move_bounds,
        &linear,
        &offsets,
        cancel,
    )?;

    // Only zero-radius collisions are needed from here on.
    volumes.clear_all_but_object_collision();

    for layer in move_bounds.iter_mut() {
        for element in layer.iter_mut() {
            element.state.marked = false;
        }
    }

    // Extract the forest.
    let mut trees: Vec<Tree> = Vec::new();
    for layer_idx in 0..move_bounds.len().saturating_sub(1) {
        for elem_idx in 0..move_bounds[layer_idx].len() {
            let start = &move_bounds[layer_idx][elem_idx];
            if !start.state.marked && !start.parents.is_empty() {
                let mut tree = Tree {
                    first_layer_id: -1,
                    ..Tree::default()
                };
                visit_recursive(move_bounds, (layer_idx as u32, elem_idx as u32), &mut tree);
                debug_assert!(!tree.branches.is_empty(), "a visited tree has branches");
                trees.push(tree);
            }
        }
    }

    cancel.check()?;

    let num_layers = move_bounds.len();
    let floor_enabled =
        config.settings.support_floor_enable && config.settings.support_floor_layers > 0;
    let move_bounds: &MoveBounds = move_bounds;

    // Slice every branch of every tree.
    trees.par_iter_mut().try_for_each(|tree| -> Result<(), Error> {
        let mut partial_mesh = TriangleSoup::new();
        let branches = core::mem::take(&mut tree.branches);
        for branch in &branches {
            partial_mesh.clear();
            let (z_low, z_high) = extrude_branch(&branch.path, config, move_bounds, &mut partial_mesh);
            let mut layer_begin = if branch.has_root {
                branch.path[0].0 as LayerIndex
            } else {
                (branch.path[0].0 as LayerIndex).min(config.layer_idx_ceil(f64::from(z_low)))
            };
            let mut layer_end = if branch.has_tip {
                branch.path.last().unwrap().0 as LayerIndex
            } else {
                (branch.path.last().unwrap().0 as LayerIndex)
                    .max(config.layer_idx_floor(f64::from(z_high)))
            } + 1;
            layer_end = layer_end.min(num_layers as LayerIndex);
            if layer_begin >= layer_end {
                continue;
            }
            // Slice at mid-layer heights.
            let slice_z: Vec<f32> = (layer_begin..layer_end)
                .map(|layer_idx| {
                    let print_z = config.layer_z(layer_idx);
                    let bottom_z = if layer_idx > 0 {
                        config.layer_z(layer_idx - 1)
                    } else {
                        0.0
                    };
                    (0.5 * (bottom_z + print_z)) as f32
                })
                .collect();
            let mut slices = slice_mesh(&partial_mesh, &slice_z);
            for (i, polygons) in slices.iter_mut().enumerate() {
                if !polygons.is_empty() {
                    *polygons = difference(
                        polygons,
                        &volumes.get_collision(0, layer_begin + i as LayerIndex, true),
                    );
                    *polygons = intersection(polygons, volumes.bed_area());
                }
            }

            let mut bottom_contacts: Vec<Polygons> = Vec::new();
            let num_empty = if slices.first().is_some_and(Polygons::is_empty) {
                slices.iter().take_while(|s| s.is_empty()).count()
            } else {
                if branch.has_root {
                    let root_state =
                        &move_bounds[branch.path[0].0 as usize][branch.path[0].1 as usize].state;
                    if root_state.to_model_gracious {
                        if floor_enabled {
                            bottom_contacts.push(intersection(
                                &slices[0],
                                &volumes.get_placeable_areas(0, layer_begin),
                            ));
                        }
                    } else if layer_begin > 0 {
                        // Rest the non-gracious bottom on whatever is below.
                        let bottom_radius = support_element_radius(config, root_state);
                        let layers_propagate_max =
                            (5 * bottom_radius / config.layer_height).max(1) as LayerIndex;
                        let layer_bottommost = if root_state.verylost {
                            // Bring a floating bottom all the way down.
                            0
                        } else {
                            (layer_begin - layers_propagate_max).max(0)
                        };
                        let support_area_min_radius = core::f64::consts::PI
                            * (config.branch_radius as f64)
                            * (config.branch_radius as f64);
                        let support_area_stop = (0.2
                            * core::f64::consts::PI
                            * (bottom_radius as f64)
                            * (bottom_radius as f64))
                            .max(0.5 * support_area_min_radius);
                        let mut rest_support: Polygons = Polygons::new();
                        let mut extra_slices: Vec<Polygons> = Vec::new();
                        for layer_idx in (layer_bottommost..layer_begin).rev() {
                            rest_support = difference(
                                if rest_support.is_empty() {
                                    &slices[0]
                                } else {
                                    &rest_support
                                },
                                &volumes.get_collision(0, layer_idx, false),
                            );
                            if area(&rest_support) < support_area_stop {
                                break;
                            }
                            extra_slices.push(rest_support.clone());
                        }
                        // extra_slices[k] covers layer_begin - 1 - k; insert
                        // them below the first slice, bottom-most first.
                        if floor_enabled {
                            for (k, extra) in extra_slices.iter().enumerate() {
                                bottom_contacts.push(intersection(
                                    extra,
                                    &volumes
                                        .get_placeable_areas(0, layer_begin - 1 - k as LayerIndex),
                                ));
                            }
                            bottom_contacts.reverse();
                        }
                        layer_begin -= extra_slices.len() as LayerIndex;
                        extra_slices.reverse();
                        extra_slices.extend(core::mem::take(&mut slices));
                        slices = extra_slices;
                    }
                }
                0
            };

            let layer_begin = layer_begin + num_empty as LayerIndex;
            let slices_tail_trim = slices.iter().rev().take_while(|s| s.is_empty()).count();
            slices.truncate(slices.len() - slices_tail_trim);
            let slices: Vec<Polygons> = slices.into_iter().skip(num_empty).collect();
            let layer_end = layer_begin + slices.len() as LayerIndex;
            if layer_begin >= layer_end {
                continue;
            }

            // Grow the tree's slice array to cover [layer_begin, layer_end).
            let (new_begin, new_end) = if tree.first_layer_id < 0 {
                (layer_begin, layer_end)
            } else {
                (
                    tree.first_layer_id.min(layer_begin),
                    (tree.first_layer_id + tree.slices.len() as LayerIndex).max(layer_end),
                )
            };
            let mut new_slices: Vec<Slice> = Vec::with_capacity((new_end - new_begin) as usize);
            if tree.first_layer_id >= 0 {
                for _ in new_begin..tree.first_layer_id {
                    new_slices.push(Slice::default());
                }
                new_slices.append(&mut tree.slices);
            }
            new_slices.resize((new_end - new_begin) as usize, Slice::default());
            tree.slices = new_slices;
            tree.first_layer_id = new_begin;

            // Align bottom contacts to slice indices: the contacts cover the
            // bottom-most slices in order.
            for (j, polygons) in slices.into_iter().enumerate() {
                if polygons.is_empty() {
                    continue;
                }
                let contacts = bottom_contacts.get(j).cloned().unwrap_or_default();
                let dst =
                    &mut tree.slices[(layer_begin - new_begin) as usize + j];
                merge_slice(dst, polygons, contacts);
            }
        }
        cancel.check()
    })?;

    // Union the slices that collected more than one branch.
    trees.par_iter_mut().try_for_each(|tree| -> Result<(), Error> {
        for slice in tree.slices.iter_mut() {
            if slice.num_branches > 1 {
                slice.polygons = union_(&slice.polygons, &Polygons::new());
                slice.bottom_contacts = union_(&slice.bottom_contacts, &Polygons::new());
                slice.num_branches = 1;
            }
        }
        cancel.check()
    })?;

    // Merge all trees into one global per-layer slice array.
    let mut slices: Vec<Slice> = vec![Slice::default(); num_layers];
    for tree in trees {
        if tree.first_layer_id < 0 {
            continue;
        }
        for (i, src) in tree.slices.into_iter().enumerate() {
            let layer = tree.first_layer_id as usize + i;
            if layer < num_layers && !src.polygons.is_empty() {
                merge_slice(&mut slices[layer], src.polygons, src.bottom_contacts);
            }
        }
    }

    // Final assembly: smooth, simplify, and carve out contacts.
    let mut out = DrawnAreas {
        bottom_contacts: vec![None; num_layers],
        base_layers: vec![None; num_layers],
    };
    let results: Vec<(usize, Option<SupportLayer>, Option<SupportLayer>)> = slices
        .into_par_iter()
        .enumerate()
        .map(|(layer_idx, slice)| -> Result<_, Error> {
            cancel.check()?;
            let mut base_layer_polygons = if slice.num_branches > 1 {
                union_(&slice.polygons, &Polygons::new())
            } else {
                slice.polygons
            };
            let mut bottom_contact_polygons = if slice.num_branches > 1 {
                union_(&slice.bottom_contacts, &Polygons::new())
            } else {
                slice.bottom_contacts
            };

            if !base_layer_polygons.is_empty() {
                // Round outward and keep the vertex count in check.
                base_layer_polygons = closing(
                    &union_(&base_layer_polygons, &Polygons::new()),
                    config.support_line_width / 2,
                );
                base_layer_polygons = simplify(
                    &base_layer_polygons,
                    taproot_geom::scaled(0.03).min(config.resolution),
                );
            }

            // Top contacts win over the support base.
            if let Some(top_contact) = interface_placer.top_contact_at(layer_idx as LayerIndex)
                && !top_contact.is_empty()
                && !base_layer_polygons.is_empty()
            {
                base_layer_polygons = difference(&base_layer_polygons, &top_contact);
                if !bottom_contact_polygons.is_empty() {
                    bottom_contact_polygons = difference(&bottom_contact_polygons, &top_contact);
                }
            }
            let mut bottom_layer = None;
            if !bottom_contact_polygons.is_empty() {
                base_layer_polygons = difference(&base_layer_polygons, &bottom_contact_polygons);
                let mut layer = layer_at(config, layer_idx as LayerIndex);
                layer.polygons = bottom_contact_polygons;
                bottom_layer = Some(layer);
            }
            let mut base = None;
            if !base_layer_polygons.is_empty() {
                let mut layer = layer_at(config, layer_idx as LayerIndex);
                layer.polygons = union_(&base_layer_polygons, &Polygons::new());
                base = Some(layer);
            }
            Ok((layer_idx, bottom_layer, base))
        })
        .collect::<Result<_, Error>>()?;
    for (layer_idx, bottom, base) in results {
        out.bottom_contacts[layer_idx] = bottom;
        out.base_layers[layer_idx] = base;
    }
    Ok(out)
}

fn layer_at(config: &Settings, layer_idx: LayerIndex) -> SupportLayer {
    let print_z = config.layer_z(layer_idx);
    let bottom_z = if layer_idx > 0 {
        config.layer_z(layer_idx - 1)
    } else {
        0.0
    };
    SupportLayer {
        print_z,
        bottom_z,
        height: print_z - bottom_z,
        polygons: Polygons::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MeshGroupSettings;
    use crate::element::{ParentIndices, SupportElement, SupportElementState};
    use taproot_geom::{Point, scaled};

    fn chain(layers: usize) -> MoveBounds {
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
            layer.push(SupportElement::with_parents(
                state,
                parents,
                vec![taproot_geom::make_circle(scaled(3.0), 16)],
            ));
        }
        move_bounds
    }

    #[test]
    fn single_chain_extracts_one_branch() {
        let mut move_bounds = chain(6);
        let mut tree = Tree {
            first_layer_id: -1,
            ..Tree::default()
        };
        visit_recursive(&mut move_bounds, (0, 0), &mut tree);
        assert_eq!(tree.branches.len(), 1);
        let branch = &tree.branches[0];
        assert_eq!(branch.path.len(), 6);
        assert!(branch.has_root);
        assert!(branch.has_tip);
    }

    #[test]
    fn bifurcation_extracts_three_branches() {
        // Layers: 0 has the root, 1 the bifurcation node, 2 has two tips.
        let mut move_bounds: MoveBounds = vec![Vec::new(); 3];
        let mk = |layer: i32, parents: &[i32]| {
            let mut state = SupportElementState::new_tip(2, Point::new(0, 0));
            state.layer_idx = layer;
            state.result_on_layer = Some(Point::new(0, 0));
            let mut p = ParentIndices::new();
            p.extend(parents.iter().copied());
            SupportElement::with_parents(state, p, vec![taproot_geom::make_circle(scaled(3.0), 8)])
        };
        move_bounds[0].push(mk(0, &[0]));
        move_bounds[1].push(mk(1, &[0, 1]));
        move_bounds[2].push(mk(2, &[]));
        move_bounds[2].push(mk(2, &[]));

        let mut tree = Tree {
            first_layer_id: -1,
            ..Tree::default()
        };
        visit_recursive(&mut move_bounds, (0, 0), &mut tree);
        assert_eq!(tree.branches.len(), 3);
        let roots = tree.branches.iter().filter(|b| b.has_root).count();
        let tips = tree.branches.iter().filter(|b| b.has_tip).count();
        assert_eq!(roots, 1);
        assert_eq!(tips, 2);
    }

    #[test]
    fn verylost_root_rests_down_to_the_plate() {
        // A branch whose bottom floats at layer 5 with nothing below: the
        // rest propagation must extend its slices towards the plate.
        let m = MeshGroupSettings::default();
        let settings = Settings::new(&m);
        let num_layers = 12;
        let mut move_bounds: MoveBounds = vec![Vec::new(); num_layers];
        for layer_idx in 5..num_layers {
            let mut state = SupportElementState::new_tip(num_layers as i32 - 1, Point::new(0, 0));
            state.layer_idx = layer_idx as i32;
            state.distance_to_top = num_layers - 1 - layer_idx;
            state.result_on_layer = Some(Point::new(0, 0));
            state.to_buildplate = false;
            state.to_model_gracious = false;
            state.verylost = layer_idx == 5;
            let mut parents = ParentIndices::new();
            if layer_idx + 1 < num_layers {
                parents.push(0);
            }
            move_bounds[layer_idx].push(SupportElement::with_parents(
                state,
                parents,
                vec![taproot_geom::make_circle(scaled(3.0), 16)],
            ));
        }
        let bed = vec![taproot_geom::make_circle(scaled(100.0), 16)];
        let volumes = crate::volumes::TreeModelVolumes::new(
            &vec![taproot_geom::Polygons::new(); num_layers],
            bed,
            &settings,
        );
        let params = settings.support_parameters();
        let placer = InterfacePlacer::new(&settings, params, num_layers);
        let drawn = organic_draw_branches(
            &volumes,
            &settings,
            &mut move_bounds,
            &placer,
            crate::CancelToken::never(),
        )
        .unwrap();
        for layer in 0..5 {
            assert!(
                drawn.base_layers[layer].is_some(),
                "rest propagation must fill layer {layer}"
            );
        }
    }

    #[test]
    fn extruded_branch_covers_its_z_span() {
        let m = MeshGroupSettings::default();
        let settings = Settings::new(&m);
        let move_bounds = chain(5);
        let path: Vec<(u32, u32)> = (0..5).map(|l| (l, 0)).collect();
        let mut soup = TriangleSoup::new();
        let (zmin, zmax) = extrude_branch(&path, &settings, &move_bounds, &mut soup);
        assert!(!soup.is_empty());
        assert!(zmin < zmax);
        // The capsule must cover all layer heights of the path.
        assert!(f64::from(zmin) <= settings.layer_z(0));
        assert!(f64::from(zmax) >= settings.layer_z(4));
        // Slicing in the middle must produce a disc of roughly the branch
        // radius of the middle element.
        let z_mid = settings.layer_z(2) as f32;
        let slices = slice_mesh(&soup, &[z_mid]);
        assert!(!slices[0].is_empty());
        let r = unscaled(support_element_radius(&settings, &move_bounds[2][0].state));
        let expect = core::f64::consts::PI * (scaled(r) as f64).powi(2);
        let got = area(&slices[0]);
        assert!(
            (got - expect).abs() / expect < 0.2,
            "slice area {got} vs {expect}"
        );
    }
}
