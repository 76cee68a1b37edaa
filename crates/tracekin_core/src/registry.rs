//! Compartment registry: assigns every organ instance a contiguous block of
//! state-vector indices and precomputes the lookup tables the assembler,
//! the binding corrector, and the dosing model need.

use std::collections::BTreeMap;

use crate::compartment::{param, BodySpec, CompartmentClass};
use crate::error::{ModelError, Result};

/// Contiguous index range assigned to one compartment in the state vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stencil {
    pub base: usize,
    pub len: usize,
}

impl Stencil {
    pub fn range(&self) -> std::ops::Range<usize> {
        self.base..self.base + self.len
    }
}

/// A registered compartment instance.
#[derive(Debug, Clone)]
pub struct Compartment {
    pub name: String,
    pub class: CompartmentClass,
    pub stencil: Stencil,
    /// Registry index of the organ receiving this organ's outflow, when it
    /// is routed through another organ instead of the vein.
    pub drains_into: Option<usize>,
    params: BTreeMap<String, f64>,
}

impl Compartment {
    pub fn param(&self, key: &str) -> Option<f64> {
        self.params.get(key).copied()
    }

    pub(crate) fn require(&self, key: &'static str) -> Result<f64> {
        self.params
            .get(key)
            .copied()
            .ok_or_else(|| ModelError::MissingParameter {
                organ: self.name.clone(),
                class: self.class.label(),
                param: key,
            })
    }

    /// Global state index of a named variable of this compartment.
    pub fn state_index(&self, offset: &str) -> Option<usize> {
        self.class.offset_of(offset).map(|o| self.stencil.base + o)
    }
}

/// Precomputed description of one saturable binding site, in global
/// state-vector coordinates.
#[derive(Debug, Clone)]
pub struct BindingSite {
    /// Registry index of the owning compartment.
    pub compartment: usize,
    /// Matrix cells carrying the effective on-rate, as (row, col, sign).
    pub cells: [(usize, usize, f64); 4],
    /// Receptor-bound pair (unlabeled, labeled).
    pub bound: [usize; 2],
    /// Free interstitial pair feeding the binding term (unlabeled, labeled).
    pub free: [usize; 2],
    pub capacity: f64,
    pub on_rate: f64,
    pub interstitial_volume: f64,
}

impl BindingSite {
    /// Total receptor-bound mass, labeled plus unlabeled.
    pub fn occupancy(&self, state: &nalgebra::DVector<f64>) -> f64 {
        state[self.bound[0]] + state[self.bound[1]]
    }

    /// Effective on-rate at the given state: `k_on * (capacity - occupancy)`.
    pub fn effective_rate(&self, state: &nalgebra::DVector<f64>) -> f64 {
        self.on_rate * (self.capacity - self.occupancy(state))
    }
}

/// Index table over all compartments of one body.
///
/// Built once per model; both integrators and the assembler borrow it.
#[derive(Debug, Clone)]
pub struct Registry {
    compartments: Vec<Compartment>,
    by_name: BTreeMap<String, usize>,
    state_len: usize,
    artery: usize,
    vein: usize,
    sites: Vec<BindingSite>,
}

impl Registry {
    pub fn new(spec: &BodySpec) -> Result<Self> {
        if spec.vessels.len() != 2 {
            return Err(ModelError::VesselCount {
                found: spec.vessels.len(),
            });
        }

        let mut compartments = Vec::new();
        let mut by_name = BTreeMap::new();
        let mut drains = Vec::new();
        let mut base = 0usize;

        for (class, organs) in spec.classes() {
            for organ in organs {
                for key in class.required_params() {
                    if !organ.params.contains_key(*key) {
                        return Err(ModelError::MissingParameter {
                            organ: organ.name.clone(),
                            class: class.label(),
                            param: key,
                        });
                    }
                }
                if by_name
                    .insert(organ.name.clone(), compartments.len())
                    .is_some()
                {
                    return Err(ModelError::DuplicateOrgan(organ.name.clone()));
                }
                drains.push(organ.drains_into.clone());
                compartments.push(Compartment {
                    name: organ.name.clone(),
                    class,
                    stencil: Stencil {
                        base,
                        len: class.block_len(),
                    },
                    drains_into: None,
                    params: organ.params.clone(),
                });
                base += class.block_len();
            }
        }

        for (idx, target) in drains.iter().enumerate() {
            if let Some(target) = target {
                let resolved =
                    by_name
                        .get(target)
                        .copied()
                        .ok_or_else(|| ModelError::UnknownDrainTarget {
                            organ: compartments[idx].name.clone(),
                            target: target.clone(),
                        })?;
                compartments[idx].drains_into = Some(resolved);
            }
        }

        let mut sites = Vec::new();
        for (idx, comp) in compartments.iter().enumerate() {
            if let Some(layout) = comp.class.binding_layout() {
                let b = comp.stencil.base;
                sites.push(BindingSite {
                    compartment: idx,
                    cells: layout.cells.map(|(r, c, s)| (b + r, b + c, s)),
                    bound: layout.bound.map(|o| b + o),
                    free: layout.free.map(|o| b + o),
                    capacity: comp.require(param::RECEPTOR_CAPACITY)?,
                    on_rate: comp.require(param::BINDING_RATE)?,
                    interstitial_volume: comp.require(param::INTERSTITIAL_VOLUME)?,
                });
            }
        }

        log::debug!(
            "registered {} compartments, state length {}, {} binding sites",
            compartments.len(),
            base,
            sites.len()
        );

        Ok(Self {
            compartments,
            by_name,
            state_len: base,
            artery: 0,
            vein: 1,
            sites,
        })
    }

    /// Total state-vector length N.
    pub fn state_len(&self) -> usize {
        self.state_len
    }

    pub fn compartments(&self) -> &[Compartment] {
        &self.compartments
    }

    pub fn get(&self, name: &str) -> Option<&Compartment> {
        self.by_name.get(name).map(|&i| &self.compartments[i])
    }

    pub fn artery(&self) -> &Compartment {
        &self.compartments[self.artery]
    }

    pub fn vein(&self) -> &Compartment {
        &self.compartments[self.vein]
    }

    pub fn binding_sites(&self) -> &[BindingSite] {
        &self.sites
    }

    /// Named-offset lookup: global index of `(organ, offset)`.
    pub fn state_index(&self, organ: &str, offset: &str) -> Option<usize> {
        self.get(organ).and_then(|c| c.state_index(offset))
    }
}
