//! Compartment classes and the structural description of a body.
//!
//! Each physiological compartment belongs to one class, which fixes the
//! number of state variables the compartment contributes, the named offsets
//! of those variables inside its block, and the assembly rule that maps its
//! physical parameters into the system matrix.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Canonical parameter keys consumed by the assembly rules.
pub mod param {
    pub const FLOW: &str = "flow";
    pub const PS: &str = "ps";
    pub const VASCULAR_VOLUME: &str = "vascular_volume";
    pub const INTERSTITIAL_VOLUME: &str = "interstitial_volume";
    pub const INTRACELLULAR_VOLUME: &str = "intracellular_volume";
    pub const BINDING_RATE: &str = "binding_rate";
    pub const UNBINDING_RATE: &str = "unbinding_rate";
    pub const INTERNALIZATION_RATE: &str = "internalization_rate";
    pub const RELEASE_RATE: &str = "release_rate";
    pub const DECAY_RATE: &str = "decay_rate";
    pub const FILTRATION_FLOW: &str = "filtration_flow";
    pub const RETURN_FLOW: &str = "return_flow";
    pub const COMPLEXATION_RATE: &str = "complexation_rate";
    pub const RECEPTOR_CAPACITY: &str = "receptor_capacity";
}

use param::*;

/// One (row, col, sign) contribution of a parameter inside a local block.
pub(crate) type Cell = (usize, usize, f64);

/// Assembly rule for one physical parameter of a class.
pub(crate) struct StencilRule {
    pub param: &'static str,
    /// Volume-scaled entries divide by the column compartment's volume,
    /// looked up through the class's volume-offset map.
    pub volume_scaled: bool,
    pub cells: &'static [Cell],
}

/// Binding-term layout for receptor-bearing classes. These cells never enter
/// the static matrix; the corrector owns them at run time.
pub(crate) struct BindingLayout {
    pub cells: [Cell; 4],
    /// Offsets of the receptor-bound pair (unlabeled, labeled).
    pub bound: [usize; 2],
    /// Offsets of the free interstitial pair feeding the binding term.
    pub free: [usize; 2],
}

/// Physiological compartment classes.
///
/// The class determines the block length in the state vector:
/// vessel 2, lung 4, receptor-negative 4, receptor-positive 8, kidney 10,
/// plasma-protein 2. Unlabeled quantities sit at even offsets, labeled at
/// odd offsets throughout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompartmentClass {
    Vessel,
    Lung,
    ReceptorNegative,
    ReceptorPositive,
    Kidney,
    PlasmaProtein,
}

const VESSEL_OFFSETS: &[&str] = &["vascular_unlabeled", "vascular_labeled"];

const TISSUE_OFFSETS: &[&str] = &[
    "vascular_unlabeled",
    "vascular_labeled",
    "interstitial_unlabeled",
    "interstitial_labeled",
];

const RECEPTOR_OFFSETS: &[&str] = &[
    "vascular_unlabeled",
    "vascular_labeled",
    "interstitial_unlabeled",
    "interstitial_labeled",
    "bound_unlabeled",
    "bound_labeled",
    "internalized_unlabeled",
    "internalized_labeled",
];

const KIDNEY_OFFSETS: &[&str] = &[
    "vascular_unlabeled",
    "vascular_labeled",
    "intracellular_unlabeled",
    "intracellular_labeled",
    "interstitial_unlabeled",
    "interstitial_labeled",
    "bound_unlabeled",
    "bound_labeled",
    "internalized_unlabeled",
    "internalized_labeled",
];

const PROTEIN_OFFSETS: &[&str] = &["complex_unlabeled", "complex_labeled"];

const VESSEL_RULES: &[StencilRule] = &[
    StencilRule {
        param: FLOW,
        volume_scaled: true,
        cells: &[(0, 0, -1.0), (1, 1, -1.0)],
    },
    StencilRule {
        param: DECAY_RATE,
        volume_scaled: false,
        cells: &[(0, 1, 1.0), (1, 1, -1.0)],
    },
];

const TISSUE_RULES: &[StencilRule] = &[
    StencilRule {
        param: FLOW,
        volume_scaled: true,
        cells: &[(0, 0, -1.0), (1, 1, -1.0)],
    },
    StencilRule {
        param: PS,
        volume_scaled: true,
        cells: &[
            (0, 0, -1.0),
            (0, 2, 1.0),
            (1, 1, -1.0),
            (1, 3, 1.0),
            (2, 0, 1.0),
            (2, 2, -1.0),
            (3, 1, 1.0),
            (3, 3, -1.0),
        ],
    },
    StencilRule {
        param: DECAY_RATE,
        volume_scaled: false,
        cells: &[(0, 1, 1.0), (1, 1, -1.0), (2, 3, 1.0), (3, 3, -1.0)],
    },
];

const RECEPTOR_RULES: &[StencilRule] = &[
    StencilRule {
        param: FLOW,
        volume_scaled: true,
        cells: &[(0, 0, -1.0), (1, 1, -1.0)],
    },
    StencilRule {
        param: PS,
        volume_scaled: true,
        cells: &[
            (0, 0, -1.0),
            (0, 2, 1.0),
            (1, 1, -1.0),
            (1, 3, 1.0),
            (2, 0, 1.0),
            (2, 2, -1.0),
            (3, 1, 1.0),
            (3, 3, -1.0),
        ],
    },
    StencilRule {
        param: UNBINDING_RATE,
        volume_scaled: false,
        cells: &[(2, 4, 1.0), (3, 5, 1.0), (4, 4, -1.0), (5, 5, -1.0)],
    },
    StencilRule {
        param: INTERNALIZATION_RATE,
        volume_scaled: false,
        cells: &[(4, 4, -1.0), (5, 5, -1.0), (6, 4, 1.0), (7, 5, 1.0)],
    },
    StencilRule {
        param: RELEASE_RATE,
        volume_scaled: false,
        cells: &[(6, 6, -1.0), (7, 7, -1.0)],
    },
    StencilRule {
        param: DECAY_RATE,
        volume_scaled: false,
        cells: &[
            (0, 1, 1.0),
            (1, 1, -1.0),
            (2, 3, 1.0),
            (3, 3, -1.0),
            (4, 5, 1.0),
            (5, 5, -1.0),
            (6, 7, 1.0),
            (7, 7, -1.0),
        ],
    },
];

const KIDNEY_RULES: &[StencilRule] = &[
    StencilRule {
        param: FLOW,
        volume_scaled: true,
        cells: &[(0, 0, -1.0), (1, 1, -1.0)],
    },
    StencilRule {
        param: FILTRATION_FLOW,
        volume_scaled: true,
        cells: &[
            (0, 0, -1.0),
            (1, 1, -1.0),
            (4, 0, 1.0),
            (4, 4, -1.0),
            (5, 1, 1.0),
            (5, 5, -1.0),
        ],
    },
    StencilRule {
        param: RETURN_FLOW,
        volume_scaled: true,
        cells: &[
            (0, 2, 1.0),
            (1, 3, 1.0),
            (2, 2, -1.0),
            (2, 4, 1.0),
            (3, 3, -1.0),
            (3, 5, 1.0),
        ],
    },
    StencilRule {
        param: UNBINDING_RATE,
        volume_scaled: false,
        cells: &[(4, 6, 1.0), (5, 7, 1.0), (6, 6, -1.0), (7, 7, -1.0)],
    },
    StencilRule {
        param: INTERNALIZATION_RATE,
        volume_scaled: false,
        cells: &[(6, 6, -1.0), (7, 7, -1.0), (8, 6, 1.0), (9, 7, 1.0)],
    },
    StencilRule {
        param: RELEASE_RATE,
        volume_scaled: false,
        cells: &[(8, 8, -1.0), (9, 9, -1.0)],
    },
    StencilRule {
        param: DECAY_RATE,
        volume_scaled: false,
        cells: &[
            (0, 1, 1.0),
            (1, 1, -1.0),
            (2, 3, 1.0),
            (3, 3, -1.0),
            (4, 5, 1.0),
            (5, 5, -1.0),
            (6, 7, 1.0),
            (7, 7, -1.0),
            (8, 9, 1.0),
            (9, 9, -1.0),
        ],
    },
];

const PROTEIN_RULES: &[StencilRule] = &[StencilRule {
    param: DECAY_RATE,
    volume_scaled: false,
    cells: &[(0, 1, 1.0), (1, 1, -1.0)],
}];

const RECEPTOR_BINDING: BindingLayout = BindingLayout {
    cells: [(2, 2, -1.0), (3, 3, -1.0), (4, 2, 1.0), (5, 3, 1.0)],
    bound: [4, 5],
    free: [2, 3],
};

const KIDNEY_BINDING: BindingLayout = BindingLayout {
    cells: [(4, 4, -1.0), (5, 5, -1.0), (6, 4, 1.0), (7, 5, 1.0)],
    bound: [6, 7],
    free: [4, 5],
};

impl CompartmentClass {
    /// Number of state variables one instance of this class occupies.
    pub fn block_len(&self) -> usize {
        match self {
            CompartmentClass::Vessel => 2,
            CompartmentClass::Lung => 4,
            CompartmentClass::ReceptorNegative => 4,
            CompartmentClass::ReceptorPositive => 8,
            CompartmentClass::Kidney => 10,
            CompartmentClass::PlasmaProtein => 2,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CompartmentClass::Vessel => "vessel",
            CompartmentClass::Lung => "lung",
            CompartmentClass::ReceptorNegative => "receptor-negative",
            CompartmentClass::ReceptorPositive => "receptor-positive",
            CompartmentClass::Kidney => "kidney",
            CompartmentClass::PlasmaProtein => "plasma-protein",
        }
    }

    /// Named offsets of the state variables inside one block, in order.
    pub fn offsets(&self) -> &'static [&'static str] {
        match self {
            CompartmentClass::Vessel => VESSEL_OFFSETS,
            CompartmentClass::Lung | CompartmentClass::ReceptorNegative => TISSUE_OFFSETS,
            CompartmentClass::ReceptorPositive => RECEPTOR_OFFSETS,
            CompartmentClass::Kidney => KIDNEY_OFFSETS,
            CompartmentClass::PlasmaProtein => PROTEIN_OFFSETS,
        }
    }

    pub fn offset_of(&self, name: &str) -> Option<usize> {
        self.offsets().iter().position(|o| *o == name)
    }

    pub(crate) fn stencil_rules(&self) -> &'static [StencilRule] {
        match self {
            CompartmentClass::Vessel => VESSEL_RULES,
            CompartmentClass::Lung | CompartmentClass::ReceptorNegative => TISSUE_RULES,
            CompartmentClass::ReceptorPositive => RECEPTOR_RULES,
            CompartmentClass::Kidney => KIDNEY_RULES,
            CompartmentClass::PlasmaProtein => PROTEIN_RULES,
        }
    }

    /// Volume-offset map: which volume parameter normalizes each column of
    /// the local block. Only the columns reachable by volume-scaled rules
    /// are listed.
    pub(crate) fn volume_keys(&self) -> &'static [&'static str] {
        match self {
            CompartmentClass::Vessel => &[VASCULAR_VOLUME, VASCULAR_VOLUME],
            CompartmentClass::Lung
            | CompartmentClass::ReceptorNegative
            | CompartmentClass::ReceptorPositive => &[
                VASCULAR_VOLUME,
                VASCULAR_VOLUME,
                INTERSTITIAL_VOLUME,
                INTERSTITIAL_VOLUME,
            ],
            CompartmentClass::Kidney => &[
                VASCULAR_VOLUME,
                VASCULAR_VOLUME,
                INTRACELLULAR_VOLUME,
                INTRACELLULAR_VOLUME,
                INTERSTITIAL_VOLUME,
                INTERSTITIAL_VOLUME,
            ],
            CompartmentClass::PlasmaProtein => &[],
        }
    }

    pub(crate) fn binding_layout(&self) -> Option<&'static BindingLayout> {
        match self {
            CompartmentClass::ReceptorPositive => Some(&RECEPTOR_BINDING),
            CompartmentClass::Kidney => Some(&KIDNEY_BINDING),
            _ => None,
        }
    }

    /// Parameters the assembly rule (and, for receptor-bearing classes, the
    /// binding corrector) consumes. Missing entries fail registration.
    pub(crate) fn required_params(&self) -> &'static [&'static str] {
        match self {
            CompartmentClass::Vessel => &[FLOW, VASCULAR_VOLUME, DECAY_RATE],
            CompartmentClass::Lung | CompartmentClass::ReceptorNegative => {
                &[FLOW, PS, VASCULAR_VOLUME, INTERSTITIAL_VOLUME, DECAY_RATE]
            }
            CompartmentClass::ReceptorPositive => &[
                FLOW,
                PS,
                VASCULAR_VOLUME,
                INTERSTITIAL_VOLUME,
                UNBINDING_RATE,
                INTERNALIZATION_RATE,
                RELEASE_RATE,
                DECAY_RATE,
                BINDING_RATE,
                RECEPTOR_CAPACITY,
            ],
            CompartmentClass::Kidney => &[
                FLOW,
                FILTRATION_FLOW,
                RETURN_FLOW,
                VASCULAR_VOLUME,
                INTRACELLULAR_VOLUME,
                INTERSTITIAL_VOLUME,
                UNBINDING_RATE,
                INTERNALIZATION_RATE,
                RELEASE_RATE,
                DECAY_RATE,
                BINDING_RATE,
                RECEPTOR_CAPACITY,
            ],
            CompartmentClass::PlasmaProtein => &[COMPLEXATION_RATE, DECAY_RATE],
        }
    }
}

/// One organ record: a name, its physical parameters, and an optional
/// outflow re-route through another organ's vascular coupling point
/// (portal drainage).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganSpec {
    pub name: String,
    #[serde(default)]
    pub drains_into: Option<String>,
    pub params: BTreeMap<String, f64>,
}

impl OrganSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            drains_into: None,
            params: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: f64) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }

    pub fn draining_into(mut self, target: impl Into<String>) -> Self {
        self.drains_into = Some(target.into());
        self
    }
}

/// Structural description of a body: ordered organ lists per class.
///
/// Registration order is fixed: vessels (artery then vein), lungs,
/// receptor-negative organs, receptor-positive organs, kidneys, plasma
/// proteins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BodySpec {
    pub vessels: Vec<OrganSpec>,
    #[serde(default)]
    pub lungs: Vec<OrganSpec>,
    #[serde(default)]
    pub receptor_negative: Vec<OrganSpec>,
    #[serde(default)]
    pub receptor_positive: Vec<OrganSpec>,
    #[serde(default)]
    pub kidneys: Vec<OrganSpec>,
    #[serde(default)]
    pub plasma_proteins: Vec<OrganSpec>,
}

impl BodySpec {
    /// Classes in registration order, paired with their organ lists.
    pub(crate) fn classes(&self) -> [(CompartmentClass, &[OrganSpec]); 6] {
        [
            (CompartmentClass::Vessel, self.vessels.as_slice()),
            (CompartmentClass::Lung, self.lungs.as_slice()),
            (
                CompartmentClass::ReceptorNegative,
                self.receptor_negative.as_slice(),
            ),
            (
                CompartmentClass::ReceptorPositive,
                self.receptor_positive.as_slice(),
            ),
            (CompartmentClass::Kidney, self.kidneys.as_slice()),
            (
                CompartmentClass::PlasmaProtein,
                self.plasma_proteins.as_slice(),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_lengths_match_offset_tables() {
        for class in [
            CompartmentClass::Vessel,
            CompartmentClass::Lung,
            CompartmentClass::ReceptorNegative,
            CompartmentClass::ReceptorPositive,
            CompartmentClass::Kidney,
            CompartmentClass::PlasmaProtein,
        ] {
            assert_eq!(class.block_len(), class.offsets().len());
        }
    }

    #[test]
    fn stencil_cells_stay_inside_the_block() {
        for class in [
            CompartmentClass::Vessel,
            CompartmentClass::Lung,
            CompartmentClass::ReceptorNegative,
            CompartmentClass::ReceptorPositive,
            CompartmentClass::Kidney,
            CompartmentClass::PlasmaProtein,
        ] {
            let len = class.block_len();
            for rule in class.stencil_rules() {
                for &(row, col, sign) in rule.cells {
                    assert!(row < len && col < len, "{}/{}", class.label(), rule.param);
                    assert!(sign == 1.0 || sign == -1.0);
                    if rule.volume_scaled {
                        assert!(
                            col < class.volume_keys().len(),
                            "column {col} of {}/{} has no volume entry",
                            class.label(),
                            rule.param
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn binding_layout_points_at_bound_and_free_pairs() {
        for class in [CompartmentClass::ReceptorPositive, CompartmentClass::Kidney] {
            let layout = class.binding_layout().unwrap();
            let offsets = class.offsets();
            assert_eq!(offsets[layout.bound[0]], "bound_unlabeled");
            assert_eq!(offsets[layout.bound[1]], "bound_labeled");
            assert_eq!(offsets[layout.free[0]], "interstitial_unlabeled");
            assert_eq!(offsets[layout.free[1]], "interstitial_labeled");
        }
    }

    #[test]
    fn labeled_variables_sit_at_odd_offsets() {
        for class in [
            CompartmentClass::Vessel,
            CompartmentClass::ReceptorPositive,
            CompartmentClass::Kidney,
            CompartmentClass::PlasmaProtein,
        ] {
            for (i, name) in class.offsets().iter().enumerate() {
                if i % 2 == 1 {
                    assert!(name.ends_with("_labeled"));
                } else {
                    assert!(name.ends_with("_unlabeled"));
                }
            }
        }
    }
}
