// Copyright 2025 the Taproot Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Taproot: the core of an FDM tree-support generator.
//!
//! Given per-layer overhang polygons and the sliced model outlines, the core
//! synthesises a network of branching tree supports that reach either the
//! build plate or the model, and realises the branches as per-layer support
//! polygons:
//!
//! 1. **Tip seeding** ([`generate_support_areas`] stage 1): overhangs are
//!    sampled into support tips, with optional stacked roof (interface)
//!    layers.
//! 2. **Influence-area propagation**: a top-down per-layer fixpoint grows,
//!    constrains and merges the areas in which each branch centre may lie,
//!    driven by the cached collision/avoidance oracle
//!    ([`TreeModelVolumes`]).
//! 3. **Tree realisation**: each surviving area receives a concrete centre
//!    point and the DAG becomes a forest of branches.
//! 4. **Organic smoothing and meshing**: centrelines are smoothed under
//!    collision constraints, extruded into capsule meshes, re-sliced, and
//!    assembled into the final layers.
//!
//! The geometry primitives live in [`taproot_geom`]; this crate holds the
//! pipeline. There is no I/O and no persisted state; cancellation is
//! cooperative through [`CancelToken`] and surfaces as
//! [`Error::Cancelled`] without publishing partial output.

use log::info;

use taproot_geom::{Polygons, inflate, scaled, union_};

pub mod config;
pub mod element;
pub mod interface;
pub mod volumes;

mod draw;
mod pathing;
mod placement;
mod smooth;
mod tips;

pub use config::{LayerIndex, MeshGroupSettings, Settings, SupportParameters};
pub use element::AvoidanceKind;
pub use interface::{InterfaceStorage, SupportLayer};
pub use volumes::TreeModelVolumes;

use interface::InterfacePlacer;

/// Errors surfaced by the support generator.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The cancellation callable fired; no output was produced.
    #[error("support generation was cancelled")]
    Cancelled,
}

/// A cooperative cancellation check, polled at loop heads and after every
/// coarse-grained operation.
#[derive(Copy, Clone)]
pub struct CancelToken<'a> {
    cancelled: &'a (dyn Fn() -> bool + Sync),
}

impl core::fmt::Debug for CancelToken<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CancelToken").finish_non_exhaustive()
    }
}

fn never_cancelled() -> bool {
    false
}

impl<'a> CancelToken<'a> {
    /// Wrap a cancellation callable.
    pub fn new(cancelled: &'a (dyn Fn() -> bool + Sync)) -> Self {
        Self { cancelled }
    }

    /// A token that never cancels.
    pub fn never() -> CancelToken<'static> {
        CancelToken {
            cancelled: &never_cancelled,
        }
    }

    /// Return [`Error::Cancelled`] when cancellation was requested.
    pub fn check(&self) -> Result<(), Error> {
        if (self.cancelled)() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Classification of an overhang region delivered by the overhang producer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OverhangKind {
    /// A regular detected overhang.
    Detected,
    /// A user-painted support enforcer.
    Enforced,
    /// A sharp tail that needs a wider support head.
    SharpTail,
    /// A cantilever overhang.
    Cantilever,
}

/// One overhang region of a layer, with its classification.
#[derive(Clone, Debug)]
pub struct ClassifiedOverhang {
    /// What produced this overhang.
    pub kind: OverhangKind,
    /// The overhang region.
    pub polygons: Polygons,
}

/// The sliced model as consumed by the oracle.
#[derive(Clone, Debug)]
pub struct ModelSlices {
    /// Model outline per object layer, bottom-up.
    pub outlines: Vec<Polygons>,
    /// Printable area of the machine bed.
    pub machine_border: Polygons,
}

/// The per-layer support areas produced by the generator, each indexed by
/// support layer (raft layers included).
#[derive(Clone, Debug, Default)]
pub struct SupportOutput {
    /// Regular support base areas.
    pub base_layers: Vec<Option<SupportLayer>>,
    /// Dense floor contact areas.
    pub bottom_contacts: Vec<Option<SupportLayer>>,
    /// Contact (skin) areas at the top of the support.
    pub top_contacts: Vec<Option<SupportLayer>>,
    /// Dense interface areas between contact and base.
    pub top_interfaces: Vec<Option<SupportLayer>>,
    /// Transition interface areas towards the base.
    pub top_base_interfaces: Vec<Option<SupportLayer>>,
}

/// Merge classified overhangs into one polygon set per support layer,
/// applying the per-kind outsets and the raft shift.
fn assemble_overhangs(
    overhangs: &[Vec<ClassifiedOverhang>],
    settings: &Settings,
) -> Vec<Polygons> {
    let raft = settings.raft_layers.len();
    let mut out = vec![Polygons::new(); raft + overhangs.len()];
    for (i, layer) in overhangs.iter().enumerate() {
        let dst = &mut out[raft + i];
        for overhang in layer {
            match overhang.kind {
                OverhangKind::Detected | OverhangKind::Cantilever => {
                    dst.extend(overhang.polygons.iter().cloned());
                }
                OverhangKind::SharpTail => {
                    // Sharp tails are thin; widen them so the tips can carry
                    // them.
                    dst.extend(inflate(&overhang.polygons, scaled(0.2)));
                }
                OverhangKind::Enforced => {
                    dst.extend(inflate(
                        &overhang.polygons,
                        settings.settings.enforcer_extra_offset,
                    ));
                }
            }
        }
        if !dst.is_empty() {
            *dst = union_(dst, &Polygons::new());
        }
    }
    out
}

fn finalize_layers(mut layers: Vec<Option<SupportLayer>>) -> Vec<Option<SupportLayer>> {
    for slot in layers.iter_mut() {
        if let Some(layer) = slot {
            layer.polygons = union_(&layer.polygons, &Polygons::new());
            if layer.polygons.is_empty() {
                *slot = None;
            }
        }
    }
    layers
}

/// Generate tree supports for one model.
///
/// `overhangs` is indexed by object layer and must align with
/// `model.outlines`. The result is empty (but not an error) when nothing
/// needs support; cancellation aborts with [`Error::Cancelled`] and no
/// output.
pub fn generate_support_areas(
    model: &ModelSlices,
    overhangs: &[Vec<ClassifiedOverhang>],
    mesh_settings: &MeshGroupSettings,
    cancel: CancelToken<'_>,
) -> Result<SupportOutput, Error> {
    let settings = Settings::new(mesh_settings);
    let support_params = settings.support_parameters();
    let overhangs = assemble_overhangs(overhangs, &settings);

    let volumes = TreeModelVolumes::new(&model.outlines, model.machine_border.clone(), &settings);

    // The topmost layer that can carry support.
    let mut max_support_layer_id: LayerIndex = 0;
    let first_overhang_layer = (settings.raft_layers.len() as LayerIndex).max(1);
    for layer_id in first_overhang_layer..overhangs.len() as LayerIndex {
        if !overhangs[layer_id as usize].is_empty() {
            max_support_layer_id = layer_id;
        }
    }
    let max_layer =
        (max_support_layer_id - settings.z_distance_top_layers as LayerIndex).max(0);
    let has_support = max_layer > 0;
    let has_raft = !settings.raft_layers.is_empty();
    let num_support_layers = (max_layer as usize).max(settings.raft_layers.len());

    if num_support_layers == 0 {
        return Ok(SupportOutput::default());
    }

    let interface_placer = InterfacePlacer::new(&settings, support_params, num_support_layers);
    let mut output = SupportOutput::default();

    if has_support {
        volumes.precalculate(&settings, max_layer, cancel)?;

        let mut move_bounds: element::MoveBounds = vec![Vec::new(); num_support_layers];

        // Raft contact first, so no trees are seeded for it.
        let raft_contact_layer_idx = if has_raft {
            interface::generate_raft_contact(
                model.outlines.first().unwrap_or(&Polygons::new()),
                &settings,
                &interface_placer,
            )
        } else {
            None
        };

        // Place the tips of the support trees.
        tips::generate_initial_areas(
            &volumes,
            &settings,
            &overhangs,
            &mut move_bounds,
            &interface_placer,
            cancel,
        )?;
        interface::finalize_raft_contact(
            &settings,
            raft_contact_layer_idx,
            &interface_placer,
            &mut move_bounds,
        );

        // Propagate the influence areas downwards; inherently serial across
        // layers.
        pathing::create_layer_pathing(&volumes, &settings, &mut move_bounds, cancel)?;

        // Choose a concrete point in every influence area.
        placement::create_nodes_from_area(&volumes, &settings, &mut move_bounds, cancel)?;

        // Smooth, mesh and re-slice the branches.
        let drawn =
            draw::organic_draw_branches(&volumes, &settings, &mut move_bounds, &interface_placer, cancel)?;

        let num_elements: usize = move_bounds.iter().map(Vec::len).sum();
        info!(
            "generated {num_elements} support elements over {num_support_layers} layers"
        );

        output.base_layers = finalize_layers(drawn.base_layers);
        output.bottom_contacts = finalize_layers(drawn.bottom_contacts);
    } else if has_raft {
        if interface::generate_raft_contact(
            model.outlines.first().unwrap_or(&Polygons::new()),
            &settings,
            &interface_placer,
        )
        .is_none()
        {
            return Ok(SupportOutput::default());
        }
    } else {
        return Ok(SupportOutput::default());
    }

    let storage = interface_placer.into_storage();
    output.top_contacts = finalize_layers(storage.top_contacts);
    output.top_interfaces = finalize_layers(storage.top_interfaces);
    output.top_base_interfaces = finalize_layers(storage.top_base_interfaces);
    if output.base_layers.is_empty() {
        output.base_layers = vec![None; num_support_layers];
        output.bottom_contacts = vec![None; num_support_layers];
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_never_does_not_cancel() {
        assert!(CancelToken::never().check().is_ok());
    }

    #[test]
    fn cancel_token_reports_cancellation() {
        let flag = std::sync::atomic::AtomicBool::new(true);
        let cancelled = move || flag.load(std::sync::atomic::Ordering::Relaxed);
        let token = CancelToken::new(&cancelled);
        assert!(matches!(token.check(), Err(Error::Cancelled)));
    }

    #[test]
    fn empty_input_produces_empty_output() {
        let model = ModelSlices {
            outlines: Vec::new(),
            machine_border: Polygons::new(),
        };
        let out =
            generate_support_areas(&model, &[], &MeshGroupSettings::default(), CancelToken::never())
                .unwrap();
        assert!(out.base_layers.iter().all(Option::is_none));
    }
}
