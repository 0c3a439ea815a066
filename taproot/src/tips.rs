// Copyright 2025 the Taproot Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tip seeding: sampling overhangs into initial influence areas and roof
//! (interface) layers.

use std::sync::Mutex;

use hashbrown::HashSet;
use log::warn;
use rayon::prelude::*;

use taproot_geom::{
    Point, Polygon, Polygons, Polyline, Polylines, area, contains, difference, fill, inflate,
    intersection, make_circle, scaled, to_polylines, total_length, union_, union_parts,
};

use crate::config::{LayerIndex, Settings, SupportParameters, tiny_area_threshold};
use crate::element::{MoveBounds, SupportElement, SupportElementState};
use crate::interface::InterfacePlacer;
use crate::pathing::safe_offset_inc;
use crate::volumes::TreeModelVolumes;
use crate::{AvoidanceKind, CancelToken, Error};

/// Number of vertices used for tip circles.
const TIP_CIRCLE_RESOLUTION: usize = 25;

/// Anchoring class of a sampled support point.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum LineStatus {
    /// Reaches the build plate avoiding hole passages.
    ToBpSafe,
    /// Reaches the build plate.
    ToBp,
    /// Rests graciously on the model avoiding hole passages.
    ToModelGraciousSafe,
    /// Rests graciously on the model.
    ToModelGracious,
    /// Rests on the model, not necessarily on a flat area.
    ToModel,
    /// Cannot be supported at all.
    Invalid,
}

/// A polyline whose points carry their anchoring class.
pub(crate) type LineInformation = Vec<(Point, LineStatus)>;
/// A set of classified polylines.
pub(crate) type LineInformations = Vec<LineInformation>;

/// Classify the points of `polylines` on `layer_idx`; invalid points split
/// the lines.
fn convert_lines_to_internal(
    volumes: &TreeModelVolumes,
    settings: &Settings,
    polylines: &Polylines,
    layer_idx: LayerIndex,
) -> LineInformations {
    let min_xy_dist = settings.min_xy_dist_enabled();
    let r0 = settings.get_radius(0, 0.0);

    let mut result = LineInformations::new();
    for line in polylines {
        let mut res_line = LineInformation::new();
        for &p in &line.points {
            let status = if !contains(
                &volumes.get_avoidance(r0, layer_idx, AvoidanceKind::FastSafe, false, min_xy_dist),
                p,
            ) {
                Some(LineStatus::ToBpSafe)
            } else if !contains(
                &volumes.get_avoidance(r0, layer_idx, AvoidanceKind::Fast, false, min_xy_dist),
                p,
            ) {
                Some(LineStatus::ToBp)
            } else if settings.support_rests_on_model
                && !contains(
                    &volumes.get_avoidance(
                        r0,
                        layer_idx,
                        AvoidanceKind::FastSafe,
                        true,
                        min_xy_dist,
                    ),
                    p,
                )
            {
                Some(LineStatus::ToModelGraciousSafe)
            } else if settings.support_rests_on_model
                && !contains(
                    &volumes.get_avoidance(r0, layer_idx, AvoidanceKind::Fast, true, min_xy_dist),
                    p,
                )
            {
                Some(LineStatus::ToModelGracious)
            } else if settings.support_rests_on_model
                && !contains(&volumes.get_collision(r0, layer_idx, min_xy_dist), p)
            {
                Some(LineStatus::ToModel)
            } else {
                None
            };
            match status {
                Some(status) => res_line.push((p, status)),
                None => {
                    if !res_line.is_empty() {
                        result.push(core::mem::take(&mut res_line));
                    }
                }
            }
        }
        if !res_line.is_empty() {
            result.push(res_line);
        }
    }
    result
}

/// Whether a point stays valid one layer below `current_layer`.
fn evaluate_point_for_next_layer(
    volumes: &TreeModelVolumes,
    settings: &Settings,
    current_layer: LayerIndex,
    p: &(Point, LineStatus),
) -> bool {
    let min_xy_dist = settings.min_xy_dist_enabled();
    let r0 = settings.get_radius(0, 0.0);
    let kind = if p.1 == LineStatus::ToBpSafe {
        AvoidanceKind::FastSafe
    } else {
        AvoidanceKind::Fast
    };
    if !contains(
        &volumes.get_avoidance(r0, current_layer - 1, kind, false, min_xy_dist),
        p.0,
    ) {
        return true;
    }
    if settings.support_rests_on_model && p.1 != LineStatus::ToBp && p.1 != LineStatus::ToBpSafe {
        let forbidden = if p.1 == LineStatus::ToModelGracious
            || p.1 == LineStatus::ToModelGraciousSafe
        {
            let kind = if p.1 == LineStatus::ToModelGraciousSafe {
                AvoidanceKind::FastSafe
            } else {
                AvoidanceKind::Fast
            };
            volumes.get_avoidance(r0, current_layer - 1, kind, true, min_xy_dist)
        } else {
            volumes.get_collision(r0, current_layer - 1, min_xy_dist)
        };
        return !contains(&forbidden, p.0);
    }
    false
}

/// Split lines into the parts whose points satisfy `evaluate` and the parts
/// whose points do not. Consecutive runs stay connected.
fn split_lines(
    lines: &LineInformations,
    mut evaluate: impl FnMut(&(Point, LineStatus)) -> bool,
) -> (LineInformations, LineInformations) {
    let mut keep = LineInformations::new();
    let mut set_free = LineInformations::new();
    for line in lines {
        let mut current_keep = true;
        let mut resulting_line = LineInformation::new();
        for me in line {
            if evaluate(me) != current_keep {
                if !resulting_line.is_empty() {
                    if current_keep {
                        keep.push(core::mem::take(&mut resulting_line));
                    } else {
                        set_free.push(core::mem::take(&mut resulting_line));
                    }
                }
                current_keep = !current_keep;
            }
            resulting_line.push(*me);
        }
        if !resulting_line.is_empty() {
            if current_keep {
                keep.push(resulting_line);
            } else {
                set_free.push(resulting_line);
            }
        }
    }
    (keep, set_free)
}

/// Sample the next point at `dist` from `start_pt` along the polyline,
/// starting on segment `start_idx`.
fn polyline_sample_next_point_at_distance(
    polyline: &[Point],
    start_pt: Point,
    start_idx: usize,
    dist: f64,
) -> Option<(Point, usize)> {
    let dist2 = dist * dist;
    let eps = scaled(0.01) as f64;

    for i in (start_idx + 1)..polyline.len() {
        let p1 = polyline[i];
        if (p1 - start_pt).norm2() as f64 >= dist2 {
            // The segment end leaves the circle around start_pt.
            let p0 = polyline[i - 1];
            let v = p1 - p0;
            let l2v = v.norm2() as f64;
            if l2v < eps * eps {
                // Degenerate segment; accept its midpoint when it happens to
                // lie on the circle.
                let c = Point::new((p0.x + p1.x) / 2, (p0.y + p1.y) / 2);
                if ((c - start_pt).norm() - dist).abs() < eps {
                    return Some((c, i - 1));
                }
                continue;
            }
            let p0f = start_pt - p0;
            // Foot point of start_pt on the segment's supporting line.
            let t = p0f.dot(v) as f64 / l2v;
            let foot = (v.x as f64 * t, v.y as f64 * t);
            let xf = (p0f.x as f64 - foot.0, p0f.y as f64 - foot.1);
            let l2_from_line = xf.0 * xf.0 + xf.1 * xf.1;
            let l2_intersection = dist2 - l2_from_line;
            if l2_intersection > -(eps * eps) {
                let l2_intersection = l2_intersection.max(0.0);
                let rest = (v.x as f64 - foot.0, v.y as f64 - foot.1);
                if rest.0 * rest.0 + rest.1 * rest.1 >= l2_intersection {
                    // The circle cuts the segment on the far side of the foot
                    // point.
                    let scale = (l2_intersection / l2v).sqrt();
                    let p = Point::new(
                        p0.x + (foot.0 + v.x as f64 * scale).round() as i64,
                        p0.y + (foot.1 + v.y as f64 * scale).round() as i64,
                    );
                    return Some((p, i - 1));
                }
            }
        }
    }
    None
}

/// Resample polylines so neighbouring points are about `distance` apart,
/// placing at least `min_points` points per part.
fn ensure_maximum_distance_polyline(
    input: &Polylines,
    distance: f64,
    min_points: usize,
) -> Polylines {
    let mut result = Polylines::new();
    for part in input {
        if part.is_empty() {
            continue;
        }
        let len = part.length();
        let mut line = Vec::<Point>::new();
        let mut current_distance = distance.max(scaled(0.1) as f64);
        if len < 2.0 * distance && min_points <= 1 {
            // Mid-point only.
            if let Some(p) = part.point_at(len / 2.0) {
                line.push(p);
            }
        } else {
            let mut part = part.clone();
            let mut optimal_end_index = part.len() - 1;

            if part.points.first() == part.points.last() && part.len() > 2 {
                // Closed overhang outlines tend to be thin areas; anchor the
                // two vertices furthest apart from each other so both ends of
                // the area get a support point.
                let n = part.len() - 1;
                let mut optimal_start_index = 0;
                let mut max_dist2 = 0_i128;
                for idx in 0..n {
                    for inner_idx in 0..n {
                        let d2 = (part.points[idx] - part.points[inner_idx]).norm2();
                        if d2 > max_dist2 {
                            optimal_start_index = idx;
                            optimal_end_index = inner_idx;
                            max_dist2 = d2;
                        }
                    }
                }
                part.points.truncate(n);
                part.points.rotate_left(optimal_start_index);
                let first = part.points[0];
                part.points.push(first);
                optimal_end_index = (n + optimal_end_index - optimal_start_index) % n;
            }

            while line.len() < min_points && current_distance >= scaled(0.1) as f64 {
                line.clear();
                let mut current_point = part.points[0];
                line.push(part.points[0]);
                if min_points > 1
                    || (part.points[0] - part.points[optimal_end_index]).norm() > current_distance
                {
                    line.push(part.points[optimal_end_index]);
                }
                let mut current_index = 0;
                let mut next_distance = current_distance;
                while let Some((next_point, next_index)) = polyline_sample_next_point_at_distance(
                    &part.points,
                    current_point,
                    current_index,
                    next_distance,
                ) {
                    // A point at sampling distance may still be close to an
                    // already placed point on a thin, folded outline.
                    let min_distance_to_existing = line
                        .iter()
                        .map(|p| (*p - next_point).norm())
                        .fold(f64::MAX, f64::min);
                    if min_distance_to_existing >= current_distance {
                        line.push(next_point);
                        current_point = next_point;
                        current_index = next_index;
                        next_distance = current_distance;
                    } else {
                        if current_point == next_point {
                            // Fixpoint: overcompensate rather than loop.
                            warn!(
                                "tip sampling hit a fixpoint at distance {next_distance}; some tips may be missing"
                            );
                            if next_distance > 2.0 * current_distance {
                                break;
                            }
                            next_distance += current_distance;
                            continue;
                        }
                        next_distance =
                            (current_distance - min_distance_to_existing).max(scaled(0.1) as f64);
                        current_point = next_point;
                        current_index = next_index;
                    }
                }
                current_distance *= 0.9;
            }
        }
        result.push(Polyline::new(line));
    }
    result
}

/// Infill lines whose sampling produces the support points for `polygons`.
fn generate_support_infill_lines(
    polygons: &Polygons,
    settings: &Settings,
    support_params: &SupportParameters,
    roof: bool,
    layer_idx: LayerIndex,
    support_infill_distance: i64,
) -> Polylines {
    let angle = if roof {
        if settings.support_roof_angles.is_empty() {
            support_params.interface_angle
                + if layer_idx & 1 == 1 {
                    -core::f64::consts::FRAC_PI_4
                } else {
                    core::f64::consts::FRAC_PI_4
                }
        } else {
            settings.support_roof_angles[layer_idx.max(0) as usize % settings.support_roof_angles.len()]
        }
    } else {
        support_params.base_angle
    };
    let shift = if roof { 0 } else { support_infill_distance / 2 };
    let mut out = Polylines::new();
    for part in union_parts(polygons) {
        out.extend(fill::fill_lines(&part, support_infill_distance, angle, shift));
    }
    out
}

/// Drop contours smaller than `min_area` (scaled units squared).
fn remove_small(polygons: &mut Polygons, min_area: f64) {
    polygons.retain(|poly| poly.signed_area().abs() >= min_area);
}

/// Shared state while seeding tips for all layers in parallel.
struct TipGenerator<'a, 'b> {
    volumes: &'a TreeModelVolumes,
    settings: &'a Settings,
    interface_placer: &'a InterfacePlacer<'a>,
    force_tip_to_roof: bool,
    min_xy_dist: bool,
    base_circle: Polygon,
    move_bounds: Mutex<&'b mut MoveBounds>,
    already_inserted: Vec<Mutex<HashSet<(i64, i64)>>>,
}

impl<'a, 'b> TipGenerator<'a, 'b> {
    fn new(
        volumes: &'a TreeModelVolumes,
        settings: &'a Settings,
        interface_placer: &'a InterfacePlacer<'a>,
        force_tip_to_roof: bool,
        num_support_layers: usize,
        move_bounds: &'b mut MoveBounds,
    ) -> Self {
        let mut already_inserted = Vec::with_capacity(num_support_layers);
        already_inserted.resize_with(num_support_layers, || Mutex::new(HashSet::new()));
        Self {
            volumes,
            settings,
            interface_placer,
            force_tip_to_roof,
            min_xy_dist: settings.min_xy_dist_enabled(),
            base_circle: make_circle(scaled(0.01), TIP_CIRCLE_RESOLUTION),
            move_bounds: Mutex::new(move_bounds),
            already_inserted,
        }
    }

    /// Insert tips (and roof-tip strata) along the classified lines.
    fn add_points_along_lines(
        &self,
        mut lines: LineInformations,
        insert_layer_idx: LayerIndex,
        roof_tip_layers: usize,
        supports_roof_layers: usize,
        dont_move_until: usize,
    ) {
        // Turn tip areas into small roofs while the points are still valid
        // on the layer below.
        let mut dtt_roof_tip = 0;
        while dtt_roof_tip < roof_tip_layers && insert_layer_idx - (dtt_roof_tip as LayerIndex) >= 1
        {
            let this_layer_idx = insert_layer_idx - dtt_roof_tip as LayerIndex;
            let (keep, set_free) = split_lines(&lines, |p| {
                evaluate_point_for_next_layer(self.volumes, self.settings, this_layer_idx, p)
            });
            lines = keep;
            for line in &set_free {
                for point_data in line {
                    self.add_point_as_influence_area(
                        *point_data,
                        this_layer_idx,
                        roof_tip_layers - dtt_roof_tip,
                        dtt_roof_tip + supports_roof_layers > 0,
                        false,
                    );
                }
            }

            let mut new_roofs = Polygons::new();
            for line in &lines {
                for (p, _) in line {
                    let mut roof_circle =
                        make_circle(self.settings.min_radius.max(scaled(0.01)), TIP_CIRCLE_RESOLUTION);
                    roof_circle.translate(*p);
                    new_roofs.push(roof_circle);
                }
            }
            if !new_roofs.is_empty() {
                self.interface_placer.add_roof(
                    new_roofs,
                    this_layer_idx,
                    dtt_roof_tip + supports_roof_layers,
                );
            }
            dtt_roof_tip += 1;
        }

        for line in &lines {
            // Dense tip lines simulate a support pattern; ovalisation would
            // degrade them.
            let disable_ovalisation = self.settings.min_radius < 3 * self.settings.support_line_width
                && roof_tip_layers == 0
                && dtt_roof_tip == 0
                && line.len() > 5;
            for point_data in line {
                self.add_point_as_influence_area(
                    *point_data,
                    insert_layer_idx - dtt_roof_tip as LayerIndex,
                    dont_move_until.saturating_sub(dtt_roof_tip),
                    dtt_roof_tip + supports_roof_layers > 0,
                    disable_ovalisation,
                );
            }
        }
    }

    fn add_point_as_influence_area(
        &self,
        p: (Point, LineStatus),
        insert_layer: LayerIndex,
        dont_move_until: usize,
        roof: bool,
        skip_ovalisation: bool,
    ) {
        let (position, status) = p;
        let to_bp = status == LineStatus::ToBp || status == LineStatus::ToBpSafe;
        let gracious = to_bp
            || status == LineStatus::ToModelGracious
            || status == LineStatus::ToModelGraciousSafe;
        let safe_radius =
            status == LineStatus::ToBpSafe || status == LineStatus::ToModelGraciousSafe;
        if !self.settings.support_rests_on_model && !to_bp {
            warn!("tried to add an invalid support point; some overhang may not be supported");
            return;
        }
        if insert_layer < 0 || insert_layer as usize >= self.already_inserted.len() {
            return;
        }
        // Quantise to also catch points so close that adding them would
        // achieve nothing.
        let q = ((self.settings.min_radius + 1) / 10).max(1);
        let hash_pos = (position.x / q, position.y / q);
        {
            let mut inserted = self.already_inserted[insert_layer as usize].lock().unwrap();
            if !inserted.insert(hash_pos) {
                return;
            }
        }

        let mut circle = self.base_circle.clone();
        circle.translate(position);

        let mut state = SupportElementState::new_tip(insert_layer, position);
        state.to_buildplate = to_bp;
        state.to_model_gracious = gracious;
        state.use_min_xy_dist = self.min_xy_dist;
        state.supports_roof = roof;
        state.dont_move_until = dont_move_until;
        state.can_use_safe_radius = safe_radius;
        state.missing_roof_layers = if self.force_tip_to_roof {
            dont_move_until
        } else {
            0
        };
        state.skip_ovalisation = skip_ovalisation;

        let mut move_bounds = self.move_bounds.lock().unwrap();
        move_bounds[insert_layer as usize].push(SupportElement::new(state, vec![circle]));
    }
}

/// Sample one overhang area: stack roofs where possible, then drop tips.
fn sample_overhang_area(
    mut overhang_area: Polygons,
    large_horizontal_roof: bool,
    layer_idx: LayerIndex,
    num_support_roof_layers: usize,
    connect_length: f64,
    settings: &Settings,
    tip_gen: &TipGenerator<'_, '_>,
) {
    let volumes = tip_gen.volumes;
    let support_params = &tip_gen.interface_placer.support_params;
    let min_xy_dist = settings.min_xy_dist_enabled();
    let r0 = settings.get_radius(0, 0.0);

    let generate_roof_lines = |area_polys: &Polygons, layer: LayerIndex| -> Polylines {
        generate_support_infill_lines(
            area_polys,
            settings,
            support_params,
            true,
            layer,
            settings.support_roof_line_distance,
        )
    };

    let mut overhang_lines = LineInformations::new();
    let mut dtt_roof = 0_usize;
    let mut layer_generation_dtt = 0_usize;

    if large_horizontal_roof {
        debug_assert!(
            num_support_roof_layers > 0,
            "caller gates large roofs on roof layers"
        );
        // Each stratum is trimmed by the forbidden region of the next layer
        // down; stop when the remainder is too small for a roof.
        let mut added_roofs: Vec<Polygons> = Vec::new();
        let mut last_overhang = overhang_area.clone();
        while dtt_roof < num_support_roof_layers && layer_idx - (dtt_roof as LayerIndex) >= 1 {
            let forbidden_next = {
                let raw = if settings.support_rests_on_model {
                    volumes.get_collision(r0, layer_idx - dtt_roof as LayerIndex - 1, min_xy_dist)
                } else {
                    volumes.get_avoidance(
                        r0,
                        layer_idx - dtt_roof as LayerIndex - 1,
                        AvoidanceKind::Fast,
                        false,
                        min_xy_dist,
                    )
                };
                // Absorb rounding errors down the line.
                inflate(&raw, scaled(0.005))
            };
            let overhang_area_next = difference(&overhang_area, &forbidden_next);
            if area(&overhang_area_next) < settings.settings.minimum_roof_area {
                // The roof ends here; sample the last stratum into tips.
                if dtt_roof > 0 {
                    let dtt_before = dtt_roof - 1;
                    let lines = ensure_maximum_distance_polyline(
                        &generate_roof_lines(&last_overhang, layer_idx - dtt_before as LayerIndex),
                        connect_length,
                        1,
                    );
                    let internal = convert_lines_to_internal(
                        volumes,
                        settings,
                        &lines,
                        layer_idx - dtt_before as LayerIndex,
                    );
                    overhang_lines = split_lines(&internal, |p| {
                        evaluate_point_for_next_layer(
                            volumes,
                            settings,
                            layer_idx - dtt_before as LayerIndex,
                            p,
                        )
                    })
                    .0;
                }
                break;
            }
            added_roofs.push(overhang_area.clone());
            last_overhang = core::mem::replace(&mut overhang_area, overhang_area_next);
            dtt_roof += 1;
        }

        layer_generation_dtt = dtt_roof.max(1) - 1;
        // Patterns are not guaranteed to generate lines for every area;
        // truncate the roof at the first stratum that generates none.
        if overhang_lines.is_empty()
            && dtt_roof != 0
            && generate_roof_lines(&overhang_area, layer_idx - layer_generation_dtt as LayerIndex)
                .is_empty()
        {
            for idx in 0..dtt_roof {
                if generate_roof_lines(&added_roofs[idx], layer_idx - idx as LayerIndex).is_empty()
                {
                    dtt_roof = idx;
                    layer_generation_dtt = dtt_roof.max(1) - 1;
                    break;
                }
            }
        }
        added_roofs.truncate(dtt_roof);
        tip_gen.interface_placer.add_roofs(added_roofs, layer_idx);
    }

    if overhang_lines.is_empty() {
        // When supporting a roof the tree only needs to carry the roof, not
        // the model; the denser roof spacing is used then.
        let supports_roof = dtt_roof > 0;
        let continuous_tips = !supports_roof && large_horizontal_roof;
        let polylines = ensure_maximum_distance_polyline(
            &generate_support_infill_lines(
                &overhang_area,
                settings,
                support_params,
                supports_roof,
                layer_idx - layer_generation_dtt as LayerIndex,
                if supports_roof {
                    settings.support_roof_line_distance
                } else {
                    settings.settings.support_tree_branch_distance
                },
            ),
            if continuous_tips {
                settings.min_radius as f64 / 2.0
            } else {
                connect_length
            },
            1,
        );
        let point_count: usize = polylines.iter().map(Polyline::len).sum();
        let min_support_points =
            ((total_length(&overhang_area) / connect_length) as i64).clamp(1, 3) as usize;
        let polylines = if point_count <= min_support_points {
            // Too few points: support the outline itself, pulled inward so
            // the printed support line covers the overhang edge.
            let reduced = taproot_geom::deflate(
                &overhang_area,
                (settings.support_line_width as f64 / 2.2) as i64,
            );
            let source = if !reduced.is_empty()
                && area(&inflate(
                    &difference(&overhang_area, &reduced),
                    settings.support_line_width.max(connect_length as i64),
                )) < tiny_area_threshold()
            {
                &reduced
            } else {
                &overhang_area
            };
            ensure_maximum_distance_polyline(
                &to_polylines(source),
                connect_length,
                min_support_points,
            )
        } else {
            polylines
        };
        overhang_lines = convert_lines_to_internal(
            volumes,
            settings,
            &polylines,
            layer_idx - dtt_roof as LayerIndex,
        );
    }

    if dtt_roof as LayerIndex >= layer_idx && large_horizontal_roof {
        // The roof stack reached the build plate.
        tip_gen
            .interface_placer
            .add_roof_build_plate(overhang_area, dtt_roof);
    } else {
        let roof_enabled = num_support_roof_layers > 0;
        tip_gen.add_points_along_lines(
            overhang_lines,
            layer_idx - dtt_roof as LayerIndex,
            if tip_gen.force_tip_to_roof {
                num_support_roof_layers - dtt_roof
            } else {
                0
            },
            dtt_roof,
            if roof_enabled {
                num_support_roof_layers - dtt_roof
            } else {
                0
            },
        );
    }
}

/// Create the initial influence areas by sampling all overhangs.
///
/// `overhangs` is indexed by support layer (raft included) and already
/// carries the per-kind outsets.
pub(crate) fn generate_initial_areas(
    volumes: &TreeModelVolumes,
    settings: &Settings,
    overhangs: &[Polygons],
    move_bounds: &mut MoveBounds,
    interface_placer: &InterfacePlacer<'_>,
    cancel: CancelToken<'_>,
) -> Result<(), Error> {
    let support_params = interface_placer.support_params.clone();
    let min_xy_dist = settings.min_xy_dist_enabled();
    let mesh = &settings.settings;

    // Tips are placed z_distance_top_layers + 1 below the overhang so the
    // configured top gap stays clear.
    let z_distance_delta = settings.z_distance_top_layers as LayerIndex + 1;

    let connect_length = (settings.support_line_width as f64 * 100.0
        / mesh.support_tree_top_rate)
        + (2.0 * settings.min_radius as f64 - settings.support_line_width as f64).max(0.0);
    // How far to move on the X axis from the circle top to be half a line
    // width below it; bounds the widening step so the tip stays supported.
    let circle_length_to_half_linewidth_change = if settings.min_radius < settings.support_line_width
    {
        settings.min_radius / 2
    } else {
        let r = taproot_geom::unscaled(settings.min_radius);
        let inner = taproot_geom::unscaled(settings.min_radius - settings.support_line_width / 2);
        scaled((r * r - inner * inner).sqrt())
    };
    // Extra outset to compensate for tips larger than the line width.
    let extra_outset = (settings.min_radius - settings.support_line_width / 2).max(0)
        + if min_xy_dist {
            settings.support_line_width / 2
        } else {
            0
        };
    let num_support_roof_layers = if mesh.support_roof_enable {
        mesh.support_roof_layers
    } else {
        0
    };
    let roof_enabled = num_support_roof_layers > 0;
    let force_tip_to_roof = roof_enabled
        && (support_params.soluble_interface
            || (settings.min_radius as f64).powi(2) * core::f64::consts::PI
                > mesh.minimum_roof_area);

    let num_raft_layers = settings.raft_layers.len() as LayerIndex;
    let first_support_layer = (num_raft_layers - z_distance_delta).max(1);
    let num_support_layers = move_bounds.len() as LayerIndex;

    // Layers with overhangs above them.
    let mut raw_overhangs: Vec<(LayerIndex, &Polygons)> = Vec::new();
    for layer_idx in first_support_layer..num_support_layers {
        let overhang_idx = (layer_idx + z_distance_delta) as usize;
        if let Some(overhang) = overhangs.get(overhang_idx)
            && !overhang.is_empty()
        {
            raw_overhangs.push((layer_idx, overhang));
        }
    }

    let tip_gen = TipGenerator::new(
        volumes,
        settings,
        interface_placer,
        force_tip_to_roof,
        move_bounds.len(),
        move_bounds,
    );

    raw_overhangs
        .par_iter()
        .try_for_each(|&(layer_idx, overhang_raw)| -> Result<(), Error> {
            let r0 = settings.get_radius(0, 0.0);
            // The least restrictive forbidden region, slightly inflated so
            // points directly on its border still count as forbidden.
            let relevant_forbidden = {
                let raw = if settings.support_rests_on_model {
                    volumes.get_collision(r0, layer_idx, min_xy_dist)
                } else {
                    volumes.get_avoidance(r0, layer_idx, AvoidanceKind::Fast, false, min_xy_dist)
                };
                inflate(&raw, scaled(0.005))
            };

            let mut overhang_regular = safe_offset_inc(
                overhang_raw,
                mesh.support_offset,
                &relevant_forbidden,
                (settings.min_radius as f64 * 1.75) as i64 + settings.xy_min_distance,
                0,
                1,
            );
            // Overhang parts that would be supported by a piece of a support
            // line are not unsupported.
            let mut remaining_overhang = intersection(
                &difference(
                    &if mesh.support_offset == 0 {
                        overhang_raw.clone()
                    } else {
                        inflate(overhang_raw, mesh.support_offset)
                    },
                    &inflate(&overhang_regular, settings.support_line_width / 2),
                ),
                &relevant_forbidden,
            );

            // Widen the supportable region towards the trimmed overhang in
            // small steps, so the tip stays as close to the overhang as the
            // collision allows.
            let mut extra_total_offset_acc = 0_i64;
            while !remaining_overhang.is_empty()
                && extra_total_offset_acc + settings.support_line_width / 8 < extra_outset
            {
                let offset_current_step = if extra_total_offset_acc + 2 * settings.support_line_width
                    > settings.min_radius
                {
                    settings.support_line_width / 8
                } else {
                    circle_length_to_half_linewidth_change
                }
                .min(extra_outset - extra_total_offset_acc);
                extra_total_offset_acc += offset_current_step;
                let raw_collision = volumes.get_collision(0, layer_idx, true);
                let offset_step = settings.xy_min_distance + settings.support_line_width;
                remaining_overhang = difference(
                    &remaining_overhang,
                    &safe_offset_inc(
                        &overhang_regular,
                        (extra_total_offset_acc as f64 * 1.5) as i64,
                        &raw_collision,
                        offset_step,
                        0,
                        1,
                    ),
                );
                overhang_regular = union_(
                    &overhang_regular,
                    &difference(
                        &safe_offset_inc(
                            &remaining_overhang,
                            extra_total_offset_acc,
                            &raw_collision,
                            offset_step,
                            0,
                            1,
                        ),
                        &relevant_forbidden,
                    ),
                );
            }

            cancel.check()?;

            if roof_enabled {
                // Cover large horizontal overhangs with dense interfaces,
                // carried by tree tips only at the bottom stratum.
                let mut overhang_roofs = safe_offset_inc(
                    overhang_raw,
                    0,
                    &relevant_forbidden,
                    settings.min_radius * 2 + settings.xy_min_distance,
                    0,
                    1,
                );
                if mesh.minimum_support_area > 0.0 {
                    remove_small(&mut overhang_roofs, mesh.minimum_roof_area);
                }
                overhang_regular = difference(&overhang_regular, &overhang_roofs);
                for roof_part in union_parts(&overhang_roofs) {
                    sample_overhang_area(
                        roof_part,
                        true,
                        layer_idx,
                        num_support_roof_layers,
                        connect_length,
                        settings,
                        &tip_gen,
                    );
                    cancel.check()?;
                }
            }
            if mesh.minimum_support_area > 0.0 {
                remove_small(&mut overhang_regular, mesh.minimum_support_area);
            }
            for support_part in union_parts(&overhang_regular) {
                sample_overhang_area(
                    support_part,
                    false,
                    layer_idx,
                    num_support_roof_layers,
                    connect_length,
                    settings,
                    &tip_gen,
                );
                cancel.check()?;
            }
            Ok(())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_lines_partitions_runs() {
        let lines: LineInformations = vec![vec![
            (Point::new(0, 0), LineStatus::ToBp),
            (Point::new(1, 0), LineStatus::ToBp),
            (Point::new(2, 0), LineStatus::ToBp),
            (Point::new(3, 0), LineStatus::ToBp),
        ]];
        let (keep, free) = split_lines(&lines, |p| p.0.x < 2);
        assert_eq!(keep.len(), 1);
        assert_eq!(free.len(), 1);
        assert_eq!(keep[0].len(), 2);
        assert_eq!(free[0].len(), 2);
    }

    #[test]
    fn resampling_respects_spacing() {
        let line = Polyline::new(vec![Point::new(0, 0), Point::new(scaled(10.0), 0)]);
        let spacing = scaled(1.0) as f64;
        let resampled = ensure_maximum_distance_polyline(&vec![line], spacing, 1);
        assert_eq!(resampled.len(), 1);
        let pts = &resampled[0].points;
        assert!(pts.len() >= 9, "expected about ten samples, got {}", pts.len());
        // All samples lie on the input line and no two are closer than the
        // spacing (up to rounding).
        let mut xs: Vec<i64> = pts.iter().map(|p| p.x).collect();
        xs.sort_unstable();
        for p in pts {
            assert_eq!(p.y, 0);
        }
        for w in xs.windows(2) {
            let d = (w[1] - w[0]) as f64;
            assert!(d >= spacing - 2.0, "samples closer than the spacing: {d}");
            assert!(d <= 2.0 * spacing + 2.0, "gap in the sampling: {d}");
        }
    }

    #[test]
    fn short_lines_get_midpoint() {
        let line = Polyline::new(vec![Point::new(0, 0), Point::new(scaled(0.5), 0)]);
        let resampled = ensure_maximum_distance_polyline(&vec![line], scaled(1.0) as f64, 1);
        assert_eq!(resampled[0].points.len(), 1);
        assert_eq!(resampled[0].points[0], Point::new(scaled(0.25), 0));
    }

    #[test]
    fn sample_next_point_walks_the_polyline() {
        let pts = vec![Point::new(0, 0), Point::new(1000, 0), Point::new(1000, 1000)];
        let sample = polyline_sample_next_point_at_distance(&pts, Point::new(0, 0), 0, 1200.0);
        let (p, idx) = sample.unwrap();
        assert_eq!(idx, 1);
        assert!(((p - Point::new(0, 0)).norm() - 1200.0).abs() < 2.0);
        // No point on the polyline is 3000 away from the start.
        assert!(
            polyline_sample_next_point_at_distance(&pts, Point::new(0, 0), 0, 3000.0).is_none()
        );
    }
}
