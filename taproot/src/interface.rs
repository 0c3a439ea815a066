// Copyright 2025 the Taproot Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The interface placer: a thread-safe accumulator for contact and
//! interface layers, plus the raft coupling.

use std::sync::Mutex;

use taproot_geom::{Polygons, inflate, scaled, signed_distance_to_edges, union_};

use crate::config::{LayerIndex, Settings, SupportParameters};
use crate::element::MoveBounds;

/// One output support layer.
#[derive(Clone, Debug, Default)]
pub struct SupportLayer {
    /// Z of the top of the layer.
    pub print_z: f64,
    /// Z of the bottom of the layer.
    pub bottom_z: f64,
    /// Layer height.
    pub height: f64,
    /// The support region of this layer.
    pub polygons: Polygons,
}

impl SupportLayer {
    fn at(settings: &Settings, layer_idx: LayerIndex) -> Self {
        let print_z = settings.layer_z(layer_idx);
        let bottom_z = if layer_idx > 0 {
            settings.layer_z(layer_idx - 1)
        } else {
            0.0
        };
        Self {
            print_z,
            bottom_z,
            height: print_z - bottom_z,
            polygons: Polygons::new(),
        }
    }
}

/// The accumulated interface output: one optional layer per support layer.
#[derive(Clone, Debug, Default)]
pub struct InterfaceStorage {
    /// Contact (skin) polygons at the top of the support.
    pub top_contacts: Vec<Option<SupportLayer>>,
    /// Dense interface layers between contact and base.
    pub top_interfaces: Vec<Option<SupportLayer>>,
    /// Transition interface layers towards the base.
    pub top_base_interfaces: Vec<Option<SupportLayer>>,
}

/// Mutex-guarded accumulator shared between the tip seeder and the branch
/// re-slicer.
pub struct InterfacePlacer<'a> {
    /// Derived pipeline settings.
    pub settings: &'a Settings,
    /// Interface parameters.
    pub support_params: SupportParameters,
    storage: Mutex<InterfaceStorage>,
}

impl core::fmt::Debug for InterfacePlacer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InterfacePlacer").finish_non_exhaustive()
    }
}

impl<'a> InterfacePlacer<'a> {
    /// A placer with `num_layers` empty slots per storage.
    pub fn new(
        settings: &'a Settings,
        support_params: SupportParameters,
        num_layers: usize,
    ) -> Self {
        Self {
            settings,
            support_params,
            storage: Mutex::new(InterfaceStorage {
                top_contacts: vec![None; num_layers],
                top_interfaces: vec![None; num_layers],
                top_base_interfaces: vec![None; num_layers],
            }),
        }
    }

    /// Insert a contact layer and the interface layers below it.
    ///
    /// `new_roofs[idx]` lands on `insert_layer_idx - idx` with a
    /// distance-to-roof of `idx`.
    pub fn add_roofs(&self, new_roofs: Vec<Polygons>, insert_layer_idx: LayerIndex) {
        if new_roofs.iter().all(Polygons::is_empty) {
            return;
        }
        let mut storage = self.storage.lock().unwrap();
        for (idx, roof) in new_roofs.into_iter().enumerate() {
            if !roof.is_empty() {
                self.add_roof_unguarded(&mut storage, roof, insert_layer_idx - idx as LayerIndex, idx);
            }
        }
    }

    /// Insert one roof stratum.
    pub fn add_roof(&self, new_roof: Polygons, insert_layer_idx: LayerIndex, dtt_roof: usize) {
        let mut storage = self.storage.lock().unwrap();
        self.add_roof_unguarded(&mut storage, new_roof, insert_layer_idx, dtt_roof);
    }

    /// Insert a roof whose whole overhang reached the build plate.
    pub fn add_roof_build_plate(&self, overhang_areas: Polygons, dtt_roof: usize) {
        let mut storage = self.storage.lock().unwrap();
        let dtt = dtt_roof.min(self.support_params.num_top_interface_layers);
        self.add_roof_unguarded(&mut storage, overhang_areas, 0, dtt);
    }

    fn add_roof_unguarded(
        &self,
        storage: &mut InterfaceStorage,
        new_roof: Polygons,
        insert_layer_idx: LayerIndex,
        dtt_roof: usize,
    ) {
        debug_assert!(
            self.support_params.has_top_contacts || !self.settings.raft_layers.is_empty(),
            "roofs require contact layers (or a raft) to be enabled"
        );
        if insert_layer_idx < 0 {
            return;
        }
        let layers = if dtt_roof == 0 {
            &mut storage.top_contacts
        } else if dtt_roof <= self.support_params.num_top_interface_layers_only() {
            &mut storage.top_interfaces
        } else {
            &mut storage.top_base_interfaces
        };
        let idx = insert_layer_idx as usize;
        if idx >= layers.len() {
            return;
        }
        let slot = layers[idx].get_or_insert_with(|| SupportLayer::at(self.settings, insert_layer_idx));
        // Unioned during the final assembly.
        slot.polygons.extend(new_roof);
    }

    /// The contact polygons currently stored at `layer_idx`.
    pub fn top_contact_at(&self, layer_idx: LayerIndex) -> Option<Polygons> {
        let storage = self.storage.lock().unwrap();
        storage
            .top_contacts
            .get(layer_idx.max(0) as usize)
            .and_then(|slot| slot.as_ref().map(|l| l.polygons.clone()))
    }

    /// Clear all interface layers below `layer_idx` (used below a raft).
    pub fn clear_below(&self, layer_idx: LayerIndex) {
        let mut storage = self.storage.lock().unwrap();
        for i in 0..layer_idx.max(0) as usize {
            storage.top_contacts[i] = None;
            storage.top_interfaces[i] = None;
            storage.top_base_interfaces[i] = None;
        }
    }

    /// Take the accumulated storage.
    pub fn into_storage(self) -> InterfaceStorage {
        self.storage.into_inner().unwrap()
    }
}

/// Inject the raft contact layer so no trees are seeded for it. Returns the
/// contact layer index when a raft exists.
pub fn generate_raft_contact(
    object_first_layer: &Polygons,
    settings: &Settings,
    interface_placer: &InterfacePlacer<'_>,
) -> Option<LayerIndex> {
    if settings.raft_layers.is_empty() || object_first_layer.is_empty() {
        return None;
    }
    let raft_contact_layer_idx = settings.raft_layers.len() as LayerIndex - 1;
    let expansion = settings.settings.raft_expansion;
    let polygons = if expansion > 0.0 {
        inflate(object_first_layer, scaled(expansion))
    } else {
        union_(object_first_layer, &Polygons::new())
    };
    interface_placer.add_roof(polygons, raft_contact_layer_idx, 0);
    Some(raft_contact_layer_idx)
}

/// Remove interface layers and tree tips below the raft contact, and trim
/// tips that fell inside the expanded raft.
pub fn finalize_raft_contact(
    settings: &Settings,
    raft_contact_layer_idx: Option<LayerIndex>,
    interface_placer: &InterfacePlacer<'_>,
    move_bounds: &mut MoveBounds,
) {
    let Some(contact_idx) = raft_contact_layer_idx else {
        return;
    };
    let first_tree_layer = settings.raft_layers.len() as LayerIndex - 1;
    for i in 0..first_tree_layer.max(0) as usize {
        move_bounds[i].clear();
    }
    interface_placer.clear_below(first_tree_layer);

    if settings.settings.raft_expansion > 0.0 {
        let Some(raft_polygons) = interface_placer.top_contact_at(contact_idx) else {
            return;
        };
        let layer = &mut move_bounds[first_tree_layer.max(0) as usize];
        layer.retain(|el| {
            let Some(result) = el.state.result_on_layer else {
                return true;
            };
            // Tips inside the expanded raft are carried by the raft itself.
            signed_distance_to_edges(&raft_polygons, result).is_none_or(|d| d >= 0.0)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MeshGroupSettings;
    use crate::element::{SupportElement, SupportElementState};
    use taproot_geom::{Point, Polygon};

    fn roof_settings() -> MeshGroupSettings {
        MeshGroupSettings {
            support_roof_enable: true,
            support_roof_layers: 3,
            ..MeshGroupSettings::default()
        }
    }

    fn square(side_mm: f64) -> Polygons {
        let s = scaled(side_mm);
        vec![Polygon::new(vec![
            Point::new(0, 0),
            Point::new(s, 0),
            Point::new(s, s),
            Point::new(0, s),
        ])]
    }

    #[test]
    fn roofs_route_by_distance() {
        let settings = Settings::new(&roof_settings());
        let params = settings.support_parameters();
        let placer = InterfacePlacer::new(&settings, params, 10);
        placer.add_roof(square(1.0), 5, 0);
        placer.add_roof(square(1.0), 4, 1);
        placer.add_roof(square(1.0), 3, 2);
        let storage = placer.into_storage();
        assert!(storage.top_contacts[5].is_some());
        assert!(storage.top_interfaces[4].is_some());
        assert!(storage.top_base_interfaces[3].is_some());
    }

    #[test]
    fn raft_contact_trims_inner_tips() {
        let mut m = roof_settings();
        m.raft_layers = vec![0.2, 0.4, 0.6];
        m.raft_expansion = 2.0;
        m.object_z_min = 0.6;
        let settings = Settings::new(&m);
        let params = settings.support_parameters();
        let placer = InterfacePlacer::new(&settings, params, 20);

        let contact = generate_raft_contact(&square(10.0), &settings, &placer);
        assert_eq!(contact, Some(2));

        let mut move_bounds: MoveBounds = vec![Vec::new(); 20];
        // A tip inside the expanded raft and one safely outside.
        let inside = SupportElementState::new_tip(2, Point::from_mm(1.5, 5.0));
        let outside = SupportElementState::new_tip(2, Point::from_mm(13.0, 5.0));
        move_bounds[2].push(SupportElement::new(inside, square(1.0)));
        move_bounds[2].push(SupportElement::new(outside, square(1.0)));

        finalize_raft_contact(&settings, contact, &placer, &mut move_bounds);
        assert_eq!(move_bounds[2].len(), 1);
        assert_eq!(
            move_bounds[2][0].state.result_on_layer,
            Some(Point::from_mm(13.0, 5.0))
        );
    }
}
