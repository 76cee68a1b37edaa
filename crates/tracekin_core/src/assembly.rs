//! System-matrix assembly and initial-state encoding.
//!
//! Assembly is pure: given the same body description it produces the same
//! matrix, bit for bit. Per-class stencil rules are summed into each
//! compartment's local block (volume-scaled parameters divide by the column
//! compartment's volume), then the global coupling terms are placed: organ
//! outflow into the vein (or a drain target's vascular rows), arterial
//! return into each organ, the lung loop against the vein, and first-order
//! complexation from the vein into the plasma-protein pool.

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::compartment::{param, BodySpec, CompartmentClass};
use crate::error::{ModelError, Result};
use crate::registry::Registry;

/// Initial per-organ quantities, keyed by organ name and named offset.
/// Anything not listed starts at zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InitialLoad(pub BTreeMap<String, BTreeMap<String, f64>>);

impl InitialLoad {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn set(mut self, organ: &str, offset: &str, value: f64) -> Self {
        self.0
            .entry(organ.to_string())
            .or_default()
            .insert(offset.to_string(), value);
        self
    }
}

/// A fully built model: the index table, the initial state vector, and the
/// static system matrix. Each simulation run owns an independent copy of
/// the mutable pieces.
#[derive(Debug, Clone)]
pub struct Model {
    pub registry: Registry,
    pub state0: DVector<f64>,
    pub matrix0: DMatrix<f64>,
}

impl Model {
    pub fn build(spec: &BodySpec, initial: &InitialLoad) -> Result<Model> {
        let registry = Registry::new(spec)?;
        let state0 = encode_state(&registry, initial)?;
        let matrix0 = assemble_matrix(&registry)?;
        Ok(Model {
            registry,
            state0,
            matrix0,
        })
    }
}

/// Builds the initial state vector from named per-organ loads.
pub fn encode_state(registry: &Registry, initial: &InitialLoad) -> Result<DVector<f64>> {
    let mut state = DVector::zeros(registry.state_len());
    for (organ, loads) in &initial.0 {
        let comp = registry
            .get(organ)
            .ok_or_else(|| ModelError::UnknownLoadOrgan(organ.clone()))?;
        for (offset, value) in loads {
            let idx = comp
                .state_index(offset)
                .ok_or_else(|| ModelError::UnknownLoadOffset {
                    organ: organ.clone(),
                    offset: offset.clone(),
                })?;
            state[idx] = *value;
        }
    }
    Ok(state)
}

/// Builds the dense linear transition matrix from the registry.
pub fn assemble_matrix(registry: &Registry) -> Result<DMatrix<f64>> {
    let n = registry.state_len();
    let mut matrix = DMatrix::zeros(n, n);

    for comp in registry.compartments() {
        let base = comp.stencil.base;
        let volumes = comp.class.volume_keys();
        for rule in comp.class.stencil_rules() {
            let value = comp.require(rule.param)?;
            for &(row, col, sign) in rule.cells {
                let entry = if rule.volume_scaled {
                    sign * value / comp.require(volumes[col])?
                } else {
                    sign * value
                };
                matrix[(base + row, base + col)] += entry;
            }
        }
    }

    let artery = registry.artery();
    let vein = registry.vein();
    let artery_volume = artery.require(param::VASCULAR_VOLUME)?;

    for comp in registry.compartments() {
        let base = comp.stencil.base;
        match comp.class {
            CompartmentClass::ReceptorNegative
            | CompartmentClass::ReceptorPositive
            | CompartmentClass::Kidney => {
                let flow = comp.require(param::FLOW)?;
                let vascular = comp.require(param::VASCULAR_VOLUME)?;
                // Outflow lands on the vein unless re-routed through a
                // drain target's vascular rows (portal circulation).
                let out = comp
                    .drains_into
                    .map(|t| registry.compartments()[t].stencil.base)
                    .unwrap_or(vein.stencil.base);
                matrix[(out, base)] = flow / vascular;
                matrix[(out + 1, base + 1)] = flow / vascular;
                matrix[(base, artery.stencil.base)] = flow / artery_volume;
                matrix[(base + 1, artery.stencil.base + 1)] = flow / artery_volume;
            }
            CompartmentClass::Lung => {
                let flow = comp.require(param::FLOW)?;
                let vascular = comp.require(param::VASCULAR_VOLUME)?;
                let vein_volume = vein.require(param::VASCULAR_VOLUME)?;
                matrix[(base, vein.stencil.base)] = flow / vein_volume;
                matrix[(base + 1, vein.stencil.base + 1)] = flow / vein_volume;
                matrix[(artery.stencil.base, base)] = flow / vascular;
                matrix[(artery.stencil.base + 1, base + 1)] = flow / vascular;
            }
            CompartmentClass::PlasmaProtein => {
                let rate = comp.require(param::COMPLEXATION_RATE)?;
                matrix[(base, vein.stencil.base)] = rate;
                matrix[(base + 1, vein.stencil.base + 1)] = rate;
            }
            CompartmentClass::Vessel => {}
        }
    }

    Ok(matrix)
}
