// Copyright 2025 the Taproot Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! User-facing settings and the derived configuration the pipeline consumes.

use taproot_geom::scaled;

/// Index of a printed layer. Zero is the first layer above the build plate
/// (or the first raft layer when a raft is present).
pub type LayerIndex = i32;

/// Threshold below which a polygon set is treated as empty, in scaled units
/// squared. Clipper-style integer Booleans attract rounding debris below
/// this size.
pub fn tiny_area_threshold() -> f64 {
    let d = scaled(0.001) as f64;
    d * d
}

/// Scaled counterpart of the usual geometric epsilon.
pub const SCALED_EPSILON: i64 = 100;

/// Extrusion geometry for one support role.
#[derive(Copy, Clone, Debug)]
pub struct Flow {
    /// Extrusion width, scaled units.
    pub width: i64,
    /// Centre-to-centre spacing of adjacent lines, scaled units.
    pub spacing: i64,
}

/// Interface-related parameters shared with the interface placer.
#[derive(Clone, Debug)]
pub struct SupportParameters {
    /// Flow of regular support lines.
    pub support_flow: Flow,
    /// Flow of dense interface lines.
    pub interface_flow: Flow,
    /// Total number of dense layers between support top and the object.
    pub num_top_interface_layers: usize,
    /// How many of those are base-interface (transition) layers.
    pub num_top_base_interface_layers: usize,
    /// Whether top contact layers are generated at all.
    pub has_top_contacts: bool,
    /// Whether the interface material is soluble.
    pub soluble_interface: bool,
    /// Infill direction of regular support, radians.
    pub base_angle: f64,
    /// Infill direction of interfaces, radians.
    pub interface_angle: f64,
}

impl SupportParameters {
    /// Interface layers that are not base-interface layers.
    pub fn num_top_interface_layers_only(&self) -> usize {
        self.num_top_interface_layers
            .saturating_sub(self.num_top_base_interface_layers)
    }
}

/// The user-level knobs of the tree-support generator.
///
/// Distances are scaled units, angles radians, areas scaled units squared.
/// The defaults correspond to a 0.4 mm nozzle profile.
#[derive(Clone, Debug)]
pub struct MeshGroupSettings {
    /// Height of a single layer.
    pub layer_height: i64,
    /// Maximum allowed simplification deviation.
    pub resolution: i64,
    /// Minimum thickness of model features.
    pub min_feature_size: i64,
    /// Width of a single support line.
    pub support_line_width: i64,
    /// Width of a single roof (interface) line.
    pub support_roof_line_width: i64,
    /// Generate dense floors below the support.
    pub support_bottom_enable: bool,
    /// Total height of the dense floor slab.
    pub support_bottom_height: i64,
    /// Support may only rest on the build plate.
    pub support_material_buildplate_only: bool,
    /// X/Y clearance between support and model.
    pub support_xy_distance: i64,
    /// Reduced X/Y clearance where Z overrides X/Y.
    pub support_xy_distance_overhang: i64,
    /// Z clearance above the support top.
    pub support_top_distance: i64,
    /// Z clearance below the support bottom.
    pub support_bottom_distance: i64,
    /// Generate dense roofs on top of the support.
    pub support_roof_enable: bool,
    /// Number of roof (interface) layers.
    pub support_roof_layers: usize,
    /// Generate dense floors (alias of `support_bottom_enable` semantics).
    pub support_floor_enable: bool,
    /// Number of floor layers.
    pub support_floor_layers: usize,
    /// Minimum area for a roof region, scaled units squared.
    pub minimum_roof_area: f64,
    /// Minimum area for any support region, scaled units squared.
    pub minimum_support_area: f64,
    /// Infill directions for roofs, radians. Cycled per layer; empty means
    /// the default alternating pattern.
    pub support_roof_angles: Vec<f64>,
    /// Distance between support infill lines.
    pub support_line_spacing: i64,
    /// Horizontal expansion of floors.
    pub support_bottom_offset: i64,
    /// Number of walls around support infill.
    pub support_wall_count: usize,
    /// Distance between roof infill lines.
    pub support_roof_line_distance: i64,
    /// Horizontal expansion applied to all support areas.
    pub support_offset: i64,
    /// Extra outset applied to painted enforcer overhangs.
    pub enforcer_extra_offset: i64,
    /// Maximum branch angle when avoiding the model.
    pub support_tree_angle: f64,
    /// Preferred branch angle when not avoiding anything.
    pub support_tree_angle_slow: f64,
    /// Widening angle of branches towards the bottom.
    pub support_tree_branch_diameter_angle: f64,
    /// Spacing of branch tips on the model surface.
    pub support_tree_branch_distance: i64,
    /// Diameter of a branch that has left the tip.
    pub support_tree_branch_diameter: i64,
    /// Cap on diameter growth from merging with to-build-plate branches when
    /// the result rests on the model.
    pub support_tree_max_diameter_increase_by_merges_when_support_to_model: i64,
    /// Minimum height of a branch resting on the model.
    pub support_tree_min_height_to_model: i64,
    /// Trunk diameter every branch aims for at the build plate.
    pub support_tree_bp_diameter: i64,
    /// Tip density as a percentage of line-width spacing.
    pub support_tree_top_rate: f64,
    /// Diameter of the branch tips.
    pub support_tree_tip_diameter: i64,
    /// Whether the support interface is soluble.
    pub soluble: bool,
    /// Raft outset at the contact layer, millimetres.
    pub raft_expansion: f64,
    /// Print Z of each raft layer, bottom-up. Empty when no raft.
    pub raft_layers: Vec<f64>,
    /// Z of the bottom of the object.
    pub object_z_min: f64,
    /// Height of the first object layer, millimetres.
    pub first_layer_height: f64,
}

impl Default for MeshGroupSettings {
    fn default() -> Self {
        Self {
            layer_height: scaled(0.15),
            resolution: scaled(0.025),
            min_feature_size: scaled(0.1),
            support_line_width: scaled(0.4),
            support_roof_line_width: scaled(0.4),
            support_bottom_enable: false,
            support_bottom_height: scaled(1.0),
            support_material_buildplate_only: false,
            support_xy_distance: scaled(0.7),
            support_xy_distance_overhang: scaled(0.2),
            support_top_distance: scaled(0.1),
            support_bottom_distance: scaled(0.1),
            support_roof_enable: false,
            support_roof_layers: 2,
            support_floor_enable: false,
            support_floor_layers: 2,
            minimum_roof_area: scaled(1.0) as f64 * scaled(1.0) as f64,
            minimum_support_area: 0.0,
            support_roof_angles: Vec::new(),
            support_line_spacing: scaled(2.26),
            support_bottom_offset: 0,
            support_wall_count: 1,
            support_roof_line_distance: scaled(0.4),
            support_offset: 0,
            enforcer_extra_offset: 0,
            support_tree_angle: 60.0_f64.to_radians(),
            support_tree_angle_slow: 50.0_f64.to_radians(),
            support_tree_branch_diameter_angle: 5.0_f64.to_radians(),
            support_tree_branch_distance: scaled(1.0),
            support_tree_branch_diameter: scaled(2.0),
            support_tree_max_diameter_increase_by_merges_when_support_to_model: scaled(1.0),
            support_tree_min_height_to_model: scaled(1.0),
            support_tree_bp_diameter: scaled(7.5),
            support_tree_top_rate: 15.0,
            support_tree_tip_diameter: scaled(0.4),
            soluble: false,
            raft_expansion: 0.0,
            raft_layers: Vec::new(),
            object_z_min: 0.0,
            first_layer_height: 0.2,
        }
    }
}

/// Derived configuration, precomputed once so the pipeline stages need no
/// knowledge of the raw settings.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Width of a single support line.
    pub support_line_width: i64,
    /// Height of a single layer.
    pub layer_height: i64,
    /// Radius of a branch that has left the tip.
    pub branch_radius: i64,
    /// Smallest allowed radius.
    pub min_radius: i64,
    /// Maximum outward movement of an influence area per layer.
    pub maximum_move_distance: i64,
    /// Preferred outward movement of an influence area per layer.
    pub maximum_move_distance_slow: i64,
    /// Number of dense floor layers.
    pub support_bottom_layers: usize,
    /// Distance-to-top at which the tip ramp reaches `branch_radius`.
    pub tip_layers: usize,
    /// Radius gain per layer below the tip.
    pub branch_radius_increase_per_layer: f64,
    /// Merge-growth cap for branches resting on the model.
    pub max_to_model_radius_increase: i64,
    /// Branches to the model shorter than this many layers are culled.
    pub min_dtt_to_model: usize,
    /// Keep increasing the radius until it reaches this value even against
    /// the avoidance.
    pub increase_radius_until_radius: i64,
    /// The distance-to-top corresponding to `increase_radius_until_radius`.
    pub increase_radius_until_layer: usize,
    /// Branches may rest on the model.
    pub support_rests_on_model: bool,
    /// X/Y clearance between support and model.
    pub xy_distance: i64,
    /// Trunk radius aimed for at the build plate.
    pub bp_radius: i64,
    /// First layer (from the top) at which elephant-foot widening may start.
    pub layer_start_bp_radius: LayerIndex,
    /// Widening per layer towards `bp_radius`.
    pub bp_radius_increase_per_layer: f64,
    /// Reduced X/Y clearance.
    pub xy_min_distance: i64,
    /// Layers of Z clearance above the support.
    pub z_distance_top_layers: usize,
    /// Layers of Z clearance below the support.
    pub z_distance_bottom_layers: usize,
    /// Roof infill directions.
    pub support_roof_angles: Vec<f64>,
    /// Width of a roof line.
    pub support_roof_line_width: i64,
    /// Distance between support infill lines.
    pub support_line_spacing: i64,
    /// Horizontal expansion of floors.
    pub support_bottom_offset: i64,
    /// Number of walls around support infill.
    pub support_wall_count: usize,
    /// Maximum simplification deviation.
    pub resolution: i64,
    /// Distance between roof lines.
    pub support_roof_line_distance: i64,
    /// Minimum thickness of model features.
    pub min_feature_size: i64,
    /// Print Z of raft layers, bottom-up.
    pub raft_layers: Vec<f64>,
    /// Z of the bottom of the object.
    pub object_z_min: f64,
    /// Height of the first object layer.
    pub first_layer_height: f64,
    /// The raw settings, for knobs only some stages need.
    pub settings: MeshGroupSettings,
}

impl Settings {
    /// Derive the pipeline configuration from user settings.
    pub fn new(m: &MeshGroupSettings) -> Self {
        let branch_radius = m.support_tree_branch_diameter / 2;
        let min_radius = m.support_tree_tip_diameter / 2;
        let layer_height = m.layer_height;
        let maximum_move_distance = move_distance(m.support_tree_angle, layer_height);
        let maximum_move_distance_slow = move_distance(m.support_tree_angle_slow, layer_height);
        let tip_layers = ((branch_radius - min_radius) / (m.support_line_width / 3).max(1))
            .max(branch_radius / layer_height)
            .max(1) as usize;
        let branch_radius_increase_per_layer =
            m.support_tree_branch_diameter_angle.tan() * layer_height as f64;
        let increase_radius_until_radius = m.support_tree_branch_diameter / 2;
        let increase_radius_until_layer = if increase_radius_until_radius <= branch_radius {
            (tip_layers as f64 * increase_radius_until_radius as f64 / branch_radius as f64) as usize
        } else {
            ((increase_radius_until_radius - branch_radius) as f64
                / branch_radius_increase_per_layer) as usize
        };
        let bp_radius = m.support_tree_bp_diameter / 2;
        // Widen by half a line overlap per layer, but never faster than a 40
        // degree slope.
        let bp_radius_increase_per_layer = (0.7_f64.tan() * layer_height as f64)
            .min(0.5 * m.support_line_width as f64);
        let layer_start_bp_radius =
            ((bp_radius - branch_radius) as f64 / bp_radius_increase_per_layer).max(0.0) as LayerIndex;
        let mut xy_min_distance = m.support_xy_distance.min(m.support_xy_distance_overhang);
        let mut xy_distance = m.support_xy_distance;
        if m.soluble {
            xy_min_distance = xy_min_distance.max(scaled(0.1));
            xy_distance = xy_distance.max(xy_min_distance);
        }

        Self {
            support_line_width: m.support_line_width,
            layer_height,
            branch_radius,
            min_radius,
            maximum_move_distance,
            maximum_move_distance_slow,
            support_bottom_layers: if m.support_bottom_enable {
                ((m.support_bottom_height + layer_height / 2) / layer_height).max(0) as usize
            } else {
                0
            },
            tip_layers,
            branch_radius_increase_per_layer,
            max_to_model_radius_increase:
                m.support_tree_max_diameter_increase_by_merges_when_support_to_model / 2,
            min_dtt_to_model: (m.support_tree_min_height_to_model as f64 / layer_height as f64)
                .ceil() as usize,
            increase_radius_until_radius,
            increase_radius_until_layer,
            support_rests_on_model: !m.support_material_buildplate_only,
            xy_distance,
            bp_radius,
            layer_start_bp_radius,
            bp_radius_increase_per_layer,
            xy_min_distance,
            z_distance_top_layers: (m.support_top_distance as f64 / layer_height as f64).round()
                as usize,
            z_distance_bottom_layers: (m.support_bottom_distance as f64 / layer_height as f64)
                .round() as usize,
            support_roof_angles: m.support_roof_angles.clone(),
            support_roof_line_width: m.support_roof_line_width,
            support_line_spacing: m.support_line_spacing,
            support_bottom_offset: m.support_bottom_offset,
            support_wall_count: m.support_wall_count,
            resolution: m.resolution,
            support_roof_line_distance: m.support_roof_line_distance,
            min_feature_size: m.min_feature_size,
            raft_layers: m.raft_layers.clone(),
            object_z_min: m.object_z_min,
            first_layer_height: m.first_layer_height,
            settings: m.clone(),
        }
    }

    /// Whether the regular X/Y distance exceeds the reduced one, making the
    /// reduced variant worth tracking.
    pub fn min_xy_dist_enabled(&self) -> bool {
        self.xy_distance > self.xy_min_distance
    }

    /// The radius an element with the given effective distance-to-top and
    /// elephant-foot counter would have.
    pub fn get_radius(&self, distance_to_top: usize, elephant_foot_increases: f64) -> i64 {
        let base = if distance_to_top <= self.tip_layers {
            // Tip ramp.
            self.min_radius
                + ((self.branch_radius - self.min_radius) as f64 * distance_to_top as f64
                    / self.tip_layers as f64) as i64
        } else {
            // Gradual widening below the tip.
            self.branch_radius
                + ((distance_to_top - self.tip_layers) as f64
                    * self.branch_radius_increase_per_layer) as i64
        };
        base + (elephant_foot_increases
            * (self.bp_radius_increase_per_layer - self.branch_radius_increase_per_layer).max(0.0))
            as i64
    }

    /// The radius every element should aim for at the given layer to reach
    /// the trunk radius at the build plate.
    pub fn recommended_min_radius(&self, layer_idx: LayerIndex) -> i64 {
        let num_layers_widened = self.layer_start_bp_radius - layer_idx;
        if num_layers_widened > 0 {
            self.branch_radius
                + (num_layers_widened as f64 * self.bp_radius_increase_per_layer) as i64
        } else {
            0
        }
    }

    /// Print Z of the given layer in millimetres.
    pub fn layer_z(&self, layer_idx: LayerIndex) -> f64 {
        let raft = self.raft_layers.len() as LayerIndex;
        if layer_idx >= raft {
            self.object_z_min
                + self.first_layer_height
                + (layer_idx - raft) as f64 * taproot_geom::unscaled(self.layer_height)
        } else {
            self.raft_layers[layer_idx.max(0) as usize]
        }
    }

    /// Lowest layer whose plane is at or above `z` (lowest collision layer).
    pub fn layer_idx_ceil(&self, z: f64) -> LayerIndex {
        let raft = self.raft_layers.len() as LayerIndex;
        let lh = taproot_geom::unscaled(self.layer_height);
        raft + (((z - self.object_z_min - self.first_layer_height) / lh).ceil() as LayerIndex).max(0)
    }

    /// Highest layer whose plane is at or below `z` (highest collision layer).
    pub fn layer_idx_floor(&self, z: f64) -> LayerIndex {
        let raft = self.raft_layers.len() as LayerIndex;
        let lh = taproot_geom::unscaled(self.layer_height);
        raft + (((z - self.object_z_min - self.first_layer_height) / lh).floor() as LayerIndex)
            .max(0)
    }

    /// Interface parameters derived from these settings.
    pub fn support_parameters(&self) -> SupportParameters {
        let m = &self.settings;
        SupportParameters {
            support_flow: Flow {
                width: m.support_line_width,
                spacing: m.support_line_spacing,
            },
            interface_flow: Flow {
                width: m.support_roof_line_width,
                spacing: m.support_roof_line_distance,
            },
            num_top_interface_layers: if m.support_roof_enable {
                m.support_roof_layers
            } else {
                0
            },
            num_top_base_interface_layers: if m.soluble { 0 } else { usize::from(m.support_roof_enable && m.support_roof_layers > 1) },
            has_top_contacts: m.support_roof_enable,
            soluble_interface: m.soluble,
            base_angle: 0.0,
            interface_angle: core::f64::consts::FRAC_PI_2,
        }
    }
}

/// Horizontal speed corresponding to a slope angle over one layer.
fn move_distance(angle: f64, layer_height: i64) -> i64 {
    if angle < core::f64::consts::FRAC_PI_2 {
        (angle.tan() * layer_height as f64) as i64
    } else {
        i64::MAX / 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radius_model_is_monotonic() {
        let s = Settings::new(&MeshGroupSettings::default());
        let mut last = 0;
        for dtt in 0..200 {
            let r = s.get_radius(dtt, 0.0);
            assert!(r >= last, "radius must not shrink towards the bottom");
            last = r;
        }
        assert_eq!(s.get_radius(0, 0.0), s.min_radius);
        assert!(s.get_radius(s.tip_layers, 0.0) >= s.branch_radius - 1);
    }

    #[test]
    fn elephant_foot_widens() {
        let s = Settings::new(&MeshGroupSettings::default());
        assert!(s.get_radius(50, 2.0) > s.get_radius(50, 0.0));
    }

    #[test]
    fn move_distances_follow_angles() {
        let s = Settings::new(&MeshGroupSettings::default());
        assert!(s.maximum_move_distance > s.maximum_move_distance_slow);
        let expect = (60.0_f64.to_radians().tan() * s.layer_height as f64) as i64;
        assert_eq!(s.maximum_move_distance, expect);
    }

    #[test]
    fn layer_z_without_raft() {
        let mut m = MeshGroupSettings::default();
        m.first_layer_height = 0.2;
        let s = Settings::new(&m);
        assert!((s.layer_z(0) - 0.2).abs() < 1e-9);
        let lh = taproot_geom::unscaled(s.layer_height);
        assert!((s.layer_z(3) - (0.2 + 3.0 * lh)).abs() < 1e-9);
    }

    #[test]
    fn layer_z_with_raft() {
        let mut m = MeshGroupSettings::default();
        m.raft_layers = vec![0.3, 0.5, 0.7];
        m.object_z_min = 0.7;
        let s = Settings::new(&m);
        assert!((s.layer_z(1) - 0.5).abs() < 1e-9);
        assert!((s.layer_z(3) - (0.7 + s.first_layer_height)).abs() < 1e-9);
    }

    #[test]
    fn recommended_min_radius_grows_towards_plate() {
        let s = Settings::new(&MeshGroupSettings::default());
        assert!(s.layer_start_bp_radius > 0);
        let low = s.recommended_min_radius(0);
        let high = s.recommended_min_radius(s.layer_start_bp_radius);
        assert!(low > s.branch_radius);
        assert_eq!(high, 0);
    }
}
