//! Dosing profiles and the injection state machine.
//!
//! A [`DoseProfile`] is plain configuration (serde-tagged by `type`); a
//! [`DoseSchedule`] binds one profile to a model's vein indices and tracks
//! the event state: the bolus latch, the train counter, and the running
//! delivered totals. Totals are monotone non-decreasing for the lifetime of
//! a run.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::registry::Registry;

/// Recognized dosing disciplines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DoseProfile {
    /// Total dose spread over `[start, stop)`, infused as a fixed increment
    /// per call sized from the nominal step. Callers stepping with a
    /// variable step size under- or over-deliver proportionally to the
    /// steps actually taken.
    Constant {
        start: f64,
        stop: f64,
        labeled: f64,
        unlabeled: f64,
    },
    /// One lump dose, delivered on the first call at or after `start`.
    Bolus {
        start: f64,
        labeled: f64,
        unlabeled: f64,
    },
    /// Equal lump doses delivered at the scheduled times, in order, each at
    /// most once. Calls past the last scheduled shot are silent no-ops.
    BolusTrain {
        times: Vec<f64>,
        labeled: f64,
        unlabeled: f64,
    },
}

impl DoseProfile {
    fn validate(&self) -> Result<()> {
        match self {
            DoseProfile::Constant { start, stop, .. } => {
                if stop <= start {
                    return Err(ModelError::InvalidDoseProfile(format!(
                        "constant infusion interval [{start}, {stop}) is empty"
                    )));
                }
            }
            DoseProfile::Bolus { .. } => {}
            DoseProfile::BolusTrain { times, .. } => {
                if times.is_empty() {
                    return Err(ModelError::InvalidDoseProfile(
                        "bolus train has no scheduled times".into(),
                    ));
                }
                if times.windows(2).any(|w| w[1] < w[0]) {
                    return Err(ModelError::InvalidDoseProfile(
                        "bolus train times must be non-decreasing".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Stateful dose-event generator bound to one simulation run.
#[derive(Debug, Clone)]
pub struct DoseSchedule {
    profile: DoseProfile,
    vein_unlabeled: usize,
    vein_labeled: usize,
    /// Per-call increments for the constant discipline, sized once from the
    /// nominal step.
    step_unlabeled: f64,
    step_labeled: f64,
    fired: bool,
    next_shot: usize,
    delivered_labeled: f64,
    delivered_unlabeled: f64,
}

impl DoseSchedule {
    pub fn new(profile: DoseProfile, registry: &Registry, nominal_step: f64) -> Result<Self> {
        profile.validate()?;
        let vein = registry.vein();
        let (step_unlabeled, step_labeled) = match &profile {
            DoseProfile::Constant {
                start,
                stop,
                labeled,
                unlabeled,
            } => (
                unlabeled * nominal_step / (stop - start),
                labeled * nominal_step / (stop - start),
            ),
            _ => (0.0, 0.0),
        };
        Ok(Self {
            profile,
            vein_unlabeled: vein.stencil.base,
            vein_labeled: vein.stencil.base + 1,
            step_unlabeled,
            step_labeled,
            fired: false,
            next_shot: 0,
            delivered_labeled: 0.0,
            delivered_unlabeled: 0.0,
        })
    }

    /// Applies any dose event due at time `t` to the vein compartment and
    /// advances the event state.
    pub fn apply(&mut self, t: f64, state: &mut DVector<f64>) {
        let event = match &self.profile {
            DoseProfile::Constant { start, stop, .. } => (t >= *start && t < *stop)
                .then_some((self.step_unlabeled, self.step_labeled)),
            DoseProfile::Bolus {
                start,
                labeled,
                unlabeled,
            } => {
                if t >= *start && !self.fired {
                    self.fired = true;
                    Some((*unlabeled, *labeled))
                } else {
                    None
                }
            }
            DoseProfile::BolusTrain {
                times,
                labeled,
                unlabeled,
            } => {
                if self.next_shot < times.len() && t >= times[self.next_shot] {
                    self.next_shot += 1;
                    let shots = times.len() as f64;
                    Some((unlabeled / shots, labeled / shots))
                } else {
                    None
                }
            }
        };
        if let Some((unlabeled, labeled)) = event {
            state[self.vein_unlabeled] += unlabeled;
            state[self.vein_labeled] += labeled;
            self.delivered_unlabeled += unlabeled;
            self.delivered_labeled += labeled;
        }
    }

    /// Cumulative delivered mass as (labeled, unlabeled).
    pub fn delivered(&self) -> (f64, f64) {
        (self.delivered_labeled, self.delivered_unlabeled)
    }
}
