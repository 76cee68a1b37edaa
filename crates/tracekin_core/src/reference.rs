//! Reference adult subject.
//!
//! A complete 19-compartment parameter table for an 80 kg adult male,
//! suitable for end-to-end runs and as a template for caller-supplied
//! subjects. Units: volume L, time min, amount nmol. Organ volumes scale
//! with body weight against a 71 kg baseline; vascular volumes are
//! fractions of total body serum.

use crate::compartment::{param::*, BodySpec, OrganSpec};

/// Builds the reference subject.
pub fn reference_subject() -> BodySpec {
    let hematocrit = 0.1;
    let body_weight = 80.0; // kg; 1 kg of tissue is taken as 1 L
    let body_surface = 1.94; // m^2
    let plasma_fraction = 1.0 - hematocrit;

    // total body serum (male) and total serum flow
    let plasma_volume = 2.8 * plasma_fraction * body_surface;
    let serum_flow = 1.23 * plasma_volume;

    let decay = 7.23e-5; // physical decay of the label, 1/min
    let binding = 0.04 / 0.5; // 1/min/nmol
    let unbinding = 0.04; // 1/min
    let internalization_tumor = 1e-3; // 1/min
    let internalization_tissue = 1.7 * internalization_tumor;
    let release_tumor = 1.5e-4; // 1/min
    let release_tissue = 0.7e-4; // 1/min

    let k_muscle = 0.02; // permeability-surface product per organ volume, L/min/kg
    let kidney_receptor_density = 6.5; // nmol/L

    let scale = body_weight / 71.0;

    // running whole-body totals, closed by the remainder organ
    let mut flow_sum = 0.0;
    let mut volume_sum = 0.0;
    let mut vascular_sum = 0.0;

    let mut track = |flow: f64, total: f64, vascular: f64| {
        flow_sum += flow;
        volume_sum += total;
        vascular_sum += vascular;
    };

    // --- receptor-positive organs ---

    // neuroendocrine tumor
    let tumor_volume = 0.087;
    let tumor_flow = 0.1 * plasma_fraction * tumor_volume;
    let tumor_vascular = 0.1 * plasma_fraction * tumor_volume;
    track(tumor_flow, tumor_volume, tumor_vascular);
    let tumor = OrganSpec::new("tumor")
        .with(FLOW, tumor_flow)
        .with(PS, 0.2 * tumor_volume)
        .with(VASCULAR_VOLUME, tumor_vascular)
        .with(INTERSTITIAL_VOLUME, 0.3 * tumor_volume)
        .with(BINDING_RATE, binding)
        .with(UNBINDING_RATE, unbinding)
        .with(INTERNALIZATION_RATE, internalization_tumor)
        .with(RELEASE_RATE, release_tumor)
        .with(DECAY_RATE, decay)
        .with(RECEPTOR_CAPACITY, 15.0 * tumor_volume);

    let liver_volume = 1.811;
    let liver_flow = 0.065 * serum_flow;
    let liver_vascular = 0.085 * liver_volume;
    track(liver_flow, liver_volume, liver_vascular);
    let liver = OrganSpec::new("liver")
        .with(FLOW, liver_flow)
        .with(PS, 100.0 * k_muscle * liver_volume)
        .with(VASCULAR_VOLUME, liver_vascular)
        .with(INTERSTITIAL_VOLUME, 0.2 * liver_volume)
        .with(BINDING_RATE, binding)
        .with(UNBINDING_RATE, unbinding)
        .with(INTERNALIZATION_RATE, internalization_tissue)
        .with(RELEASE_RATE, release_tissue)
        .with(DECAY_RATE, decay)
        .with(RECEPTOR_CAPACITY, 1.4 * liver_volume);

    let spleen_volume = 0.198;
    let spleen_flow = 0.03 * serum_flow;
    let spleen_vascular = 0.12 * spleen_volume;
    track(spleen_flow, spleen_volume, spleen_vascular);
    let spleen = OrganSpec::new("spleen")
        .draining_into("liver")
        .with(FLOW, spleen_flow)
        .with(PS, 100.0 * k_muscle * spleen_volume)
        .with(VASCULAR_VOLUME, spleen_vascular)
        .with(INTERSTITIAL_VOLUME, 0.2 * spleen_volume)
        .with(BINDING_RATE, binding)
        .with(UNBINDING_RATE, unbinding)
        .with(INTERNALIZATION_RATE, internalization_tissue)
        .with(RELEASE_RATE, release_tissue)
        .with(DECAY_RATE, decay)
        .with(RECEPTOR_CAPACITY, 8.7 * spleen_volume);

    let marrow_volume = 1.1 * scale;
    let marrow_flow = 0.03 * serum_flow;
    let marrow_vascular = 0.04 * plasma_volume;
    track(marrow_flow, marrow_volume, marrow_vascular);
    let red_marrow = OrganSpec::new("red_marrow")
        .with(FLOW, marrow_flow)
        .with(PS, 100.0 * k_muscle * marrow_volume)
        .with(VASCULAR_VOLUME, marrow_vascular)
        .with(INTERSTITIAL_VOLUME, 3.7 * marrow_vascular)
        .with(BINDING_RATE, binding)
        .with(UNBINDING_RATE, unbinding)
        .with(INTERNALIZATION_RATE, internalization_tissue)
        .with(RELEASE_RATE, release_tissue)
        .with(DECAY_RATE, decay)
        .with(RECEPTOR_CAPACITY, kidney_receptor_density * 0.028 * marrow_volume);

    let gi_volume = (0.385 + 0.548 + 0.104 + 0.15) * scale;
    let gi_flow = 0.16 * serum_flow;
    let gi_vascular = 0.076 * plasma_volume;
    track(gi_flow, gi_volume, gi_vascular);
    let gi_tract = OrganSpec::new("gi_tract")
        .draining_into("liver")
        .with(FLOW, gi_flow)
        .with(PS, k_muscle * gi_volume)
        .with(VASCULAR_VOLUME, gi_vascular)
        .with(INTERSTITIAL_VOLUME, 8.8 * gi_vascular)
        .with(BINDING_RATE, binding)
        .with(UNBINDING_RATE, unbinding)
        .with(INTERNALIZATION_RATE, internalization_tissue)
        .with(RELEASE_RATE, release_tissue)
        .with(DECAY_RATE, decay)
        .with(RECEPTOR_CAPACITY, kidney_receptor_density * 0.16 * gi_volume);

    let muscle_volume = 30.078 * scale;
    let muscle_flow = 0.17 * serum_flow;
    let muscle_vascular = 0.14 * plasma_volume;
    track(muscle_flow, muscle_volume, muscle_vascular);
    let muscle = OrganSpec::new("muscle")
        .with(FLOW, muscle_flow)
        .with(PS, k_muscle * muscle_volume)
        .with(VASCULAR_VOLUME, muscle_vascular)
        .with(INTERSTITIAL_VOLUME, 5.9 * muscle_vascular)
        .with(BINDING_RATE, binding)
        .with(UNBINDING_RATE, unbinding)
        .with(INTERNALIZATION_RATE, internalization_tissue)
        .with(RELEASE_RATE, release_tissue)
        .with(DECAY_RATE, decay)
        .with(RECEPTOR_CAPACITY, kidney_receptor_density * 0.0056 * muscle_volume);

    let prostate_volume = 0.016 * scale;
    let prostate_flow = 0.18 * plasma_fraction * prostate_volume;
    let prostate_vascular = 0.04 * plasma_fraction * prostate_volume;
    track(prostate_flow, prostate_volume, prostate_vascular);
    let prostate = OrganSpec::new("prostate")
        .with(FLOW, prostate_flow)
        .with(PS, 0.1 * prostate_volume)
        .with(VASCULAR_VOLUME, prostate_vascular)
        .with(INTERSTITIAL_VOLUME, 0.25 * prostate_volume)
        .with(BINDING_RATE, binding)
        .with(UNBINDING_RATE, unbinding)
        .with(INTERNALIZATION_RATE, internalization_tissue)
        .with(RELEASE_RATE, release_tissue)
        .with(DECAY_RATE, decay)
        .with(RECEPTOR_CAPACITY, kidney_receptor_density * 0.26 * prostate_volume);

    let adrenal_volume = 0.014 * scale;
    let adrenal_flow = 6.0 * plasma_fraction * adrenal_volume;
    let adrenal_vascular = 0.03 * plasma_fraction * adrenal_volume;
    track(adrenal_flow, adrenal_volume, adrenal_vascular);
    let adrenals = OrganSpec::new("adrenals")
        .with(FLOW, adrenal_flow)
        .with(PS, 100.0 * k_muscle * adrenal_volume)
        .with(VASCULAR_VOLUME, adrenal_vascular)
        .with(INTERSTITIAL_VOLUME, 0.24 * adrenal_volume)
        .with(BINDING_RATE, binding)
        .with(UNBINDING_RATE, unbinding)
        .with(INTERNALIZATION_RATE, internalization_tissue)
        .with(RELEASE_RATE, release_tissue)
        .with(DECAY_RATE, decay)
        .with(RECEPTOR_CAPACITY, kidney_receptor_density * 1.65 * adrenal_volume);

    // --- receptor-negative organs ---

    let skin_volume = 3.408 * scale;
    let skin_flow = 0.05 * serum_flow;
    let skin_vascular = 0.03 * plasma_volume;
    track(skin_flow, skin_volume, skin_vascular);
    let skin = OrganSpec::new("skin")
        .with(FLOW, skin_flow)
        .with(PS, k_muscle * skin_volume)
        .with(VASCULAR_VOLUME, skin_vascular)
        .with(INTERSTITIAL_VOLUME, 8.9 * skin_vascular)
        .with(DECAY_RATE, decay);

    let adipose_volume = 13.465 * scale;
    let adipose_flow = 0.05 * serum_flow;
    let adipose_vascular = 0.05 * plasma_volume;
    track(adipose_flow, adipose_volume, adipose_vascular);
    let adipose = OrganSpec::new("adipose")
        .with(FLOW, adipose_flow)
        .with(PS, k_muscle * adipose_volume)
        .with(VASCULAR_VOLUME, adipose_vascular)
        .with(INTERSTITIAL_VOLUME, 15.5 * adipose_vascular)
        .with(DECAY_RATE, decay);

    // impermeable capillary bed: PS is zero, interstitium kept nonzero
    // so the volume map stays well defined
    let brain_volume = 1.45 * scale;
    let brain_flow = 0.04 * serum_flow;
    let brain_vascular = 0.012 * plasma_volume;
    track(brain_flow, brain_volume, brain_vascular);
    let brain = OrganSpec::new("brain")
        .with(FLOW, brain_flow)
        .with(PS, 0.0)
        .with(VASCULAR_VOLUME, brain_vascular)
        .with(INTERSTITIAL_VOLUME, brain_vascular)
        .with(DECAY_RATE, decay);

    let heart_volume = 0.341 * scale;
    let heart_flow = 0.04 * serum_flow;
    let heart_vascular = 0.01 * plasma_volume;
    track(heart_flow, heart_volume, heart_vascular);
    let heart = OrganSpec::new("heart")
        .with(FLOW, heart_flow)
        .with(PS, k_muscle * heart_volume)
        .with(VASCULAR_VOLUME, heart_vascular)
        .with(INTERSTITIAL_VOLUME, 3.7 * heart_vascular)
        .with(DECAY_RATE, decay);

    // red marrow is carved out of the skeletal totals
    let bone_volume = 10.165 * scale - marrow_volume;
    let bone_flow = 0.05 * serum_flow;
    let bone_vascular = 0.07 * plasma_volume - marrow_vascular;
    track(bone_flow, bone_volume, bone_vascular);
    let bone = OrganSpec::new("bone")
        .with(FLOW, bone_flow)
        .with(PS, k_muscle * bone_volume)
        .with(VASCULAR_VOLUME, bone_vascular)
        .with(INTERSTITIAL_VOLUME, 9.3 * bone_vascular)
        .with(DECAY_RATE, decay);

    // --- kidney ---

    let kidney_volume = 0.193;
    let kidney_flow = 0.19 * serum_flow;
    let kidney_vascular = 0.055 * kidney_volume;
    let kidney_interstitial = 0.15 * kidney_volume;
    let kidney_intracellular =
        (kidney_volume - (kidney_interstitial + kidney_vascular)) * 2.0 / 3.0;
    let filtration = 0.11 * 1.1; // GFR times the filtration fraction constant
    let excreted_fraction = 0.98;
    track(kidney_flow, kidney_volume, kidney_vascular);
    let kidneys = OrganSpec::new("kidneys")
        .with(FLOW, kidney_flow)
        .with(FILTRATION_FLOW, filtration)
        .with(RETURN_FLOW, filtration * (1.0 - excreted_fraction))
        .with(VASCULAR_VOLUME, kidney_vascular)
        .with(INTRACELLULAR_VOLUME, kidney_intracellular)
        .with(INTERSTITIAL_VOLUME, kidney_interstitial)
        .with(BINDING_RATE, binding)
        .with(UNBINDING_RATE, unbinding)
        .with(INTERNALIZATION_RATE, internalization_tissue)
        .with(RELEASE_RATE, release_tissue)
        .with(DECAY_RATE, decay)
        .with(RECEPTOR_CAPACITY, kidney_receptor_density * kidney_volume);

    // --- remainder organ closing the whole-body balance ---

    let rest_volume = body_weight - volume_sum;
    let rest_flow = serum_flow - flow_sum;
    let rest_vascular = plasma_volume - vascular_sum;
    let rest = OrganSpec::new("rest")
        .with(FLOW, rest_flow)
        .with(PS, k_muscle * rest_volume)
        .with(VASCULAR_VOLUME, rest_vascular)
        .with(INTERSTITIAL_VOLUME, 3.7 * rest_vascular)
        .with(BINDING_RATE, binding)
        .with(UNBINDING_RATE, unbinding)
        .with(INTERNALIZATION_RATE, internalization_tissue)
        .with(RELEASE_RATE, release_tissue)
        .with(DECAY_RATE, decay)
        .with(RECEPTOR_CAPACITY, 0.5 * rest_volume);

    // --- central circulation ---

    let artery = OrganSpec::new("artery")
        .with(FLOW, serum_flow)
        .with(VASCULAR_VOLUME, (0.06 + 0.045) * plasma_volume)
        .with(DECAY_RATE, decay);
    let vein = OrganSpec::new("vein")
        .with(FLOW, serum_flow)
        .with(VASCULAR_VOLUME, (0.18 + 0.045) * plasma_volume)
        .with(DECAY_RATE, decay);

    let lung_volume = scale;
    let lung_vascular = 0.105 * plasma_volume;
    let lungs = OrganSpec::new("lungs")
        .with(FLOW, serum_flow)
        .with(PS, 100.0 * k_muscle * lung_volume)
        .with(VASCULAR_VOLUME, lung_vascular)
        .with(INTERSTITIAL_VOLUME, 5.5 * lung_vascular)
        .with(DECAY_RATE, decay);

    let plasma_protein = OrganSpec::new("plasma_protein")
        .with(COMPLEXATION_RATE, 5e-4)
        .with(DECAY_RATE, decay);

    BodySpec {
        vessels: vec![artery, vein],
        lungs: vec![lungs],
        receptor_negative: vec![skin, adipose, brain, heart, bone],
        receptor_positive: vec![
            tumor, liver, spleen, red_marrow, gi_tract, muscle, prostate, adrenals, rest,
        ],
        kidneys: vec![kidneys],
        plasma_proteins: vec![plasma_protein],
    }
}
