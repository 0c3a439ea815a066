// Copyright 2025 the Taproot Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end scenarios: seeded geometry through the whole pipeline.

use taproot::{
    CancelToken, ClassifiedOverhang, Error, MeshGroupSettings, ModelSlices, OverhangKind,
    SupportOutput, generate_support_areas,
};
use taproot_geom::{
    Point, Polygon, Polygons, area, intersection, make_circle, scaled, union_parts,
};

fn machine_border() -> Polygons {
    let s = scaled(100.0);
    vec![Polygon::new(vec![
        Point::new(-s, -s),
        Point::new(s, -s),
        Point::new(s, s),
        Point::new(-s, s),
    ])]
}

fn disc(x_mm: f64, y_mm: f64, radius_mm: f64) -> Polygons {
    let mut c = make_circle(scaled(radius_mm), 48);
    c.translate(Point::from_mm(x_mm, y_mm));
    vec![c]
}

fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Polygons {
    vec![Polygon::new(vec![
        Point::from_mm(x0, y0),
        Point::from_mm(x1, y0),
        Point::from_mm(x1, y1),
        Point::from_mm(x0, y1),
    ])]
}

fn overhang_layers(
    num_layers: usize,
    at_layer: usize,
    polygons: Polygons,
) -> Vec<Vec<ClassifiedOverhang>> {
    let mut overhangs: Vec<Vec<ClassifiedOverhang>> = vec![Vec::new(); num_layers];
    overhangs[at_layer].push(ClassifiedOverhang {
        kind: OverhangKind::Detected,
        polygons,
    });
    overhangs
}

fn generate(
    outlines: Vec<Polygons>,
    overhangs: Vec<Vec<ClassifiedOverhang>>,
    settings: &MeshGroupSettings,
) -> SupportOutput {
    let model = ModelSlices {
        outlines,
        machine_border: machine_border(),
    };
    generate_support_areas(&model, &overhangs, settings, CancelToken::never())
        .expect("generation must succeed")
}

/// A single floating disc overhang produces one column of support from the
/// build plate up to the tip layer.
#[test]
fn single_vertical_column() {
    let num_layers = 12;
    let settings = MeshGroupSettings::default();
    let out = generate(
        vec![Polygons::new(); num_layers],
        overhang_layers(num_layers, 10, disc(0.0, 0.0, 2.0)),
        &settings,
    );

    let filled: Vec<usize> = out
        .base_layers
        .iter()
        .enumerate()
        .filter_map(|(i, l)| l.as_ref().map(|_| i))
        .collect();
    assert!(
        filled.contains(&0),
        "support must reach the build plate, got layers {filled:?}"
    );
    // The column must be continuous from the plate to (nearly) the tips.
    let top = *filled.iter().max().unwrap();
    assert!(top >= 6, "column too short, top filled layer {top}");
    for layer in 0..=top {
        assert!(
            out.base_layers[layer].is_some(),
            "column must be continuous, layer {layer} empty"
        );
    }
    // The trunk stays near the overhang centre and within the border.
    for layer in &out.base_layers {
        if let Some(layer) = layer {
            let bbox = taproot_geom::get_extents(&layer.polygons);
            assert!(bbox.center().norm() < scaled(4.0) as f64);
            assert!(
                area(&intersection(&layer.polygons, &machine_border()))
                    > 0.99 * area(&layer.polygons),
                "support must stay within the machine border"
            );
        }
    }
}

/// Two separated overhangs merge into a single trunk on the way down.
#[test]
fn bifurcation_merges_two_tips() {
    let num_layers = 32;
    let settings = MeshGroupSettings::default();
    let mut overhangs: Vec<Vec<ClassifiedOverhang>> = vec![Vec::new(); num_layers];
    overhangs[30].push(ClassifiedOverhang {
        kind: OverhangKind::Detected,
        polygons: disc(-5.0, 0.0, 1.0),
    });
    overhangs[30].push(ClassifiedOverhang {
        kind: OverhangKind::Detected,
        polygons: disc(5.0, 0.0, 1.0),
    });
    let out = generate(vec![Polygons::new(); num_layers], overhangs, &settings);

    // Near the top the two branches are separate.
    let top_layer = out.base_layers[26]
        .as_ref()
        .or(out.base_layers[25].as_ref())
        .expect("support exists near the tips");
    let top_parts = union_parts(&top_layer.polygons).len();
    assert!(top_parts >= 2, "expected two branches near the top, got {top_parts}");

    // At the build plate everything has merged into one trunk.
    let bottom = out.base_layers[0].as_ref().expect("support reaches the plate");
    let bottom_parts = union_parts(&bottom.polygons).len();
    assert_eq!(bottom_parts, 1, "expected one merged trunk at the plate");
}

/// A cube in the model blocks the straight path down; the branch must go
/// around it and never overlap the cube outline.
#[test]
fn branch_avoids_blocking_cube() {
    let num_layers = 16;
    // Cube from layer 5 to 8 right under the overhang centre.
    let mut outlines = vec![Polygons::new(); num_layers];
    for outline in outlines.iter_mut().take(9).skip(5) {
        *outline = square(-1.0, -1.0, 1.0, 1.0);
    }
    // Plate-only support so the branches cannot simply rest on the cube.
    let settings = MeshGroupSettings {
        support_material_buildplate_only: true,
        ..MeshGroupSettings::default()
    };
    let out = generate(
        outlines,
        overhang_layers(num_layers, 14, disc(0.0, 0.0, 3.0)),
        &settings,
    );

    let cube = square(-1.0, -1.0, 1.0, 1.0);
    let mut support_layers = 0;
    for layer in out.base_layers.iter().flatten() {
        support_layers += 1;
        let overlap = area(&intersection(&layer.polygons, &cube));
        assert!(
            overlap < (scaled(0.05) as f64).powi(2),
            "support must not overlap the blocking cube (overlap {overlap})"
        );
    }
    assert!(support_layers >= 6, "the branch must still reach down");
    assert!(
        out.base_layers[0].is_some() || out.base_layers[1].is_some(),
        "the branch must anchor near the build plate"
    );
}

/// A branch whose bottom hangs in the air is propagated further down so it
/// rests on something.
#[test]
fn verylost_roots_are_dropped_to_the_plate() {
    // Nothing blocks below; the overhang is high up and the support chain is
    // healthy, so this mainly pins the continuity of the bottom layers.
    let num_layers = 20;
    let settings = MeshGroupSettings::default();
    let out = generate(
        vec![Polygons::new(); num_layers],
        overhang_layers(num_layers, 18, disc(0.0, 0.0, 1.0)),
        &settings,
    );
    assert!(out.base_layers[0].is_some(), "trunk must reach layer 0");
}

/// Roof generation produces contact layers above the tree tips.
#[test]
fn roofs_generate_top_contacts() {
    let num_layers = 14;
    let settings = MeshGroupSettings {
        support_roof_enable: true,
        support_roof_layers: 2,
        ..MeshGroupSettings::default()
    };
    let out = generate(
        vec![Polygons::new(); num_layers],
        overhang_layers(num_layers, 12, disc(0.0, 0.0, 3.0)),
        &settings,
    );
    let num_contacts = out.top_contacts.iter().flatten().count();
    let num_interfaces = out.top_interfaces.iter().flatten().count();
    assert!(
        num_contacts > 0,
        "roofed overhang must produce top contacts ({num_contacts} contacts, {num_interfaces} interfaces)"
    );
}

/// Cancellation aborts the run without producing output.
#[test]
fn cancellation_terminates_generation() {
    let num_layers = 12;
    let calls = std::sync::atomic::AtomicUsize::new(0);
    let cancelled = move || calls.fetch_add(1, std::sync::atomic::Ordering::Relaxed) > 5;
    let model = ModelSlices {
        outlines: vec![Polygons::new(); num_layers],
        machine_border: machine_border(),
    };
    let result = generate_support_areas(
        &model,
        &overhang_layers(num_layers, 10, disc(0.0, 0.0, 2.0)),
        &MeshGroupSettings::default(),
        CancelToken::new(&cancelled),
    );
    assert!(matches!(result, Err(Error::Cancelled)));
}

/// A raft trims tips that fall inside its expanded contact area.
#[test]
fn raft_contact_is_emitted() {
    let num_layers = 14;
    let settings = MeshGroupSettings {
        support_roof_enable: true,
        support_roof_layers: 2,
        raft_layers: vec![0.2, 0.4, 0.6],
        raft_expansion: 2.0,
        object_z_min: 0.6,
        ..MeshGroupSettings::default()
    };
    let mut outlines = vec![Polygons::new(); num_layers];
    outlines[0] = square(-5.0, -5.0, 5.0, 5.0);
    let out = generate(
        outlines,
        overhang_layers(num_layers, 10, disc(20.0, 0.0, 2.0)),
        &settings,
    );
    // The raft contact layer sits at the top raft layer and covers the
    // expanded first object layer.
    let contact = out.top_contacts[2]
        .as_ref()
        .expect("raft contact layer must exist");
    assert!(taproot_geom::contains(&contact.polygons, Point::from_mm(6.5, 0.0)));
    assert!(!taproot_geom::contains(&contact.polygons, Point::from_mm(8.5, 0.0)));
}
