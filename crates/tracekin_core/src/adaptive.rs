//! Adaptive explicit integrator: embedded 4th/5th-order
//! Runge-Kutta-Fehlberg with local error control.
//!
//! The run is bounded by a fixed budget of accepted points, not by a target
//! time. Each outer iteration applies the dose schedule to the canonical
//! state, then retries the step until the error controller accepts: the
//! proposal is `0.9 h (h tol / err)^(1/4)`; a rejected attempt shrinks the
//! step (never below half) and does not advance time; an accepted step
//! advances by the size actually used and carries the (growth-capped)
//! proposal into the next iteration. Stage evaluations see the binding term
//! linearized about the last accepted state; the linearization is committed
//! once per accepted step.

use anyhow::{bail, Context, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::assembly::Model;
use crate::binding::BindingModel;
use crate::dosing::{DoseProfile, DoseSchedule};
use crate::rhs::LaggedLinearRhs;
use crate::traits::RightHandSide;
use crate::trajectory::SimulationResult;

/// Settings controlling the adaptive run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AdaptiveSettings {
    pub initial_step: f64,
    pub tolerance: f64,
    /// Accepted points recorded, including the initial state.
    pub points: usize,
    /// Cap on step growth per accepted step.
    pub max_growth: f64,
}

impl Default for AdaptiveSettings {
    fn default() -> Self {
        Self {
            initial_step: 0.01,
            tolerance: 1e-7,
            points: 5000,
            max_growth: 4.0,
        }
    }
}

/// Fehlberg 4(5) stage buffers.
struct Rkf45 {
    k1: DVector<f64>,
    k2: DVector<f64>,
    k3: DVector<f64>,
    k4: DVector<f64>,
    k5: DVector<f64>,
    k6: DVector<f64>,
    tmp: DVector<f64>,
}

impl Rkf45 {
    fn new(dim: usize) -> Self {
        Self {
            k1: DVector::zeros(dim),
            k2: DVector::zeros(dim),
            k3: DVector::zeros(dim),
            k4: DVector::zeros(dim),
            k5: DVector::zeros(dim),
            k6: DVector::zeros(dim),
            tmp: DVector::zeros(dim),
        }
    }

    fn compute(&mut self, rhs: &mut impl RightHandSide, t: f64, y: &DVector<f64>, h: f64) {
        let a21 = 1.0 / 4.0;

        let a31 = 3.0 / 32.0;
        let a32 = 9.0 / 32.0;

        let a41 = 1932.0 / 2197.0;
        let a42 = -7200.0 / 2197.0;
        let a43 = 7296.0 / 2197.0;

        let a51 = 439.0 / 216.0;
        let a52 = -8.0;
        let a53 = 3680.0 / 513.0;
        let a54 = -845.0 / 4104.0;

        let a61 = -8.0 / 27.0;
        let a62 = 2.0;
        let a63 = -3544.0 / 2565.0;
        let a64 = 1859.0 / 4104.0;
        let a65 = -11.0 / 40.0;

        let n = y.len();

        rhs.eval(t, y, &mut self.k1);

        for i in 0..n {
            self.tmp[i] = y[i] + h * (a21 * self.k1[i]);
        }
        rhs.eval(t + h / 4.0, &self.tmp, &mut self.k2);

        for i in 0..n {
            self.tmp[i] = y[i] + h * (a31 * self.k1[i] + a32 * self.k2[i]);
        }
        rhs.eval(t + 3.0 * h / 8.0, &self.tmp, &mut self.k3);

        for i in 0..n {
            self.tmp[i] = y[i] + h * (a41 * self.k1[i] + a42 * self.k2[i] + a43 * self.k3[i]);
        }
        rhs.eval(t + 12.0 * h / 13.0, &self.tmp, &mut self.k4);

        for i in 0..n {
            self.tmp[i] = y[i]
                + h * (a51 * self.k1[i] + a52 * self.k2[i] + a53 * self.k3[i] + a54 * self.k4[i]);
        }
        rhs.eval(t + h, &self.tmp, &mut self.k5);

        for i in 0..n {
            self.tmp[i] = y[i]
                + h * (a61 * self.k1[i]
                    + a62 * self.k2[i]
                    + a63 * self.k3[i]
                    + a64 * self.k4[i]
                    + a65 * self.k5[i]);
        }
        rhs.eval(t + h / 2.0, &self.tmp, &mut self.k6);
    }

    /// Local error estimate: the max-norm of the difference between the
    /// embedded 4th- and 5th-order combinations, scaled by h.
    fn error(&self, h: f64) -> f64 {
        let e1 = 1.0 / 360.0;
        let e3 = -128.0 / 4275.0;
        let e4 = -2197.0 / 75240.0;
        let e5 = 1.0 / 50.0;
        let e6 = 2.0 / 55.0;

        let mut worst = 0.0f64;
        for i in 0..self.k1.len() {
            let component = h
                * (e1 * self.k1[i]
                    + e3 * self.k3[i]
                    + e4 * self.k4[i]
                    + e5 * self.k5[i]
                    + e6 * self.k6[i]);
            worst = worst.max(component.abs());
        }
        worst
    }

    /// 5th-order update.
    fn advance(&self, y: &mut DVector<f64>, h: f64) {
        let b1 = 16.0 / 135.0;
        let b3 = 6656.0 / 12825.0;
        let b4 = 28561.0 / 56430.0;
        let b5 = -9.0 / 50.0;
        let b6 = 2.0 / 55.0;

        for i in 0..y.len() {
            y[i] += h
                * (b1 * self.k1[i]
                    + b3 * self.k3[i]
                    + b4 * self.k4[i]
                    + b5 * self.k5[i]
                    + b6 * self.k6[i]);
        }
    }
}

struct StepOutcome {
    h_used: f64,
    h_next: f64,
    rejections: usize,
}

/// Retries from step size `h` until accepted; the state is only written on
/// acceptance, so a rejected attempt never advances the trajectory.
fn step(
    rhs: &mut impl RightHandSide,
    stages: &mut Rkf45,
    t: f64,
    y: &mut DVector<f64>,
    h: f64,
    settings: &AdaptiveSettings,
) -> StepOutcome {
    let mut h = h;
    let mut rejections = 0;
    loop {
        stages.compute(rhs, t, y, h);
        let error = stages.error(h);

        // A vanishing estimate (pure injection, zero kinetics) accepts the
        // step unchanged rather than dividing by zero.
        if error == 0.0 {
            stages.advance(y, h);
            return StepOutcome {
                h_used: h,
                h_next: h,
                rejections,
            };
        }

        let target = (h * settings.tolerance).abs();
        let proposal = 0.9 * h * (target / error).powf(0.25);
        if proposal < h {
            // rejected: shrink, never below half, and retry at the same t
            h = proposal.max(0.5 * h);
            rejections += 1;
        } else {
            stages.advance(y, h);
            return StepOutcome {
                h_used: h,
                h_next: proposal.min(settings.max_growth * h),
                rejections,
            };
        }
    }
}

/// Runs the explicit adaptive simulation to its accepted-point budget.
pub fn simulate(
    model: &Model,
    profile: DoseProfile,
    settings: AdaptiveSettings,
) -> Result<SimulationResult> {
    if settings.points < 2 {
        bail!("points must cover at least the initial state and one step");
    }
    if settings.initial_step <= 0.0 {
        bail!("initial_step must be positive");
    }
    if settings.tolerance <= 0.0 {
        bail!("tolerance must be positive");
    }
    if settings.max_growth < 1.0 {
        bail!("max_growth must be at least 1");
    }

    let registry = &model.registry;
    let mut schedule = DoseSchedule::new(profile, registry, settings.initial_step)
        .context("Failed to bind the dose profile to the model.")?;
    let binding = BindingModel::from_registry(registry);
    let mut rhs = LaggedLinearRhs::new(model.matrix0.clone(), binding, &model.state0);
    let n = registry.state_len();

    let mut stages = Rkf45::new(n);
    let mut state = model.state0.clone();
    let mut times = Vec::with_capacity(settings.points);
    let mut states = DMatrix::zeros(n, settings.points);

    let mut t = 0.0;
    schedule.apply(t, &mut state);
    states.set_column(0, &state);
    times.push(t);

    let mut h = settings.initial_step;
    for i in 1..settings.points {
        schedule.apply(t, &mut state);
        let outcome = step(&mut rhs, &mut stages, t, &mut state, h, &settings);
        t += outcome.h_used;
        h = outcome.h_next;
        rhs.commit(&state);
        states.set_column(i, &state);
        times.push(t);
        if i % 1024 == 0 {
            log::debug!("accepted {i} points, t = {t:.4}, h = {h:.3e}");
        }
    }

    let (delivered_labeled, delivered_unlabeled) = schedule.delivered();
    Ok(SimulationResult {
        times,
        states,
        matrix: rhs.into_matrix(),
        delivered_labeled,
        delivered_unlabeled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::InitialLoad;
    use crate::compartment::{param::*, BodySpec, OrganSpec};
    use approx::assert_relative_eq;

    /// dx/dt = rate * x, dimension 1.
    struct LinearSystem {
        rate: f64,
    }

    impl RightHandSide for LinearSystem {
        fn dimension(&self) -> usize {
            1
        }

        fn eval(&mut self, _t: f64, state: &DVector<f64>, out: &mut DVector<f64>) {
            out[0] = self.rate * state[0];
        }
    }

    struct Still;

    impl RightHandSide for Still {
        fn dimension(&self) -> usize {
            1
        }

        fn eval(&mut self, _t: f64, _state: &DVector<f64>, out: &mut DVector<f64>) {
            out[0] = 0.0;
        }
    }

    fn inert_vessel(name: &str) -> OrganSpec {
        OrganSpec::new(name)
            .with(FLOW, 0.0)
            .with(VASCULAR_VOLUME, 1.0)
            .with(DECAY_RATE, 0.0)
    }

    fn inert_tissue(name: &str) -> OrganSpec {
        OrganSpec::new(name)
            .with(FLOW, 0.0)
            .with(PS, 0.0)
            .with(VASCULAR_VOLUME, 1.0)
            .with(INTERSTITIAL_VOLUME, 1.0)
            .with(DECAY_RATE, 0.0)
    }

    /// A body with every kinetic pathway zeroed: only dosing moves mass.
    fn inert_body() -> BodySpec {
        BodySpec {
            vessels: vec![inert_vessel("artery"), inert_vessel("vein")],
            receptor_negative: vec![inert_tissue("skin")],
            ..Default::default()
        }
    }

    #[test]
    fn zero_dynamics_accepts_and_keeps_the_step() {
        let settings = AdaptiveSettings::default();
        let mut stages = Rkf45::new(1);
        let mut y = DVector::from_element(1, 1.0);
        let outcome = step(&mut Still, &mut stages, 0.0, &mut y, 0.01, &settings);
        assert_eq!(outcome.h_used, 0.01);
        assert_eq!(outcome.h_next, 0.01);
        assert_eq!(outcome.rejections, 0);
        assert_eq!(y[0], 1.0);
    }

    #[test]
    fn rejections_shrink_by_at_most_half_each() {
        let settings = AdaptiveSettings {
            tolerance: 1e-12,
            ..AdaptiveSettings::default()
        };
        let mut stages = Rkf45::new(1);
        let mut y = DVector::from_element(1, 1.0);
        let h0 = 1.0;
        let outcome = step(
            &mut LinearSystem { rate: -4.0 },
            &mut stages,
            0.0,
            &mut y,
            h0,
            &settings,
        );
        assert!(outcome.rejections > 0);
        // each rejection halves at most, so the accepted size is bounded
        // below by h0 / 2^rejections
        assert!(outcome.h_used >= h0 / 2f64.powi(outcome.rejections as i32) - 1e-15);
        assert!(outcome.h_used < h0);

        // rejected attempts left the state untouched: the result matches a
        // single advance at the accepted size
        let mut check = Rkf45::new(1);
        let mut y2 = DVector::from_element(1, 1.0);
        check.compute(&mut LinearSystem { rate: -4.0 }, 0.0, &y2, outcome.h_used);
        check.advance(&mut y2, outcome.h_used);
        assert_relative_eq!(y[0], y2[0]);
    }

    #[test]
    fn accepted_growth_is_capped() {
        let settings = AdaptiveSettings {
            tolerance: 1e-2,
            max_growth: 4.0,
            ..AdaptiveSettings::default()
        };
        let mut stages = Rkf45::new(1);
        let mut y = DVector::from_element(1, 1.0);
        let outcome = step(
            &mut LinearSystem { rate: -0.01 },
            &mut stages,
            0.0,
            &mut y,
            0.01,
            &settings,
        );
        assert_eq!(outcome.rejections, 0);
        assert!(outcome.h_next <= 4.0 * 0.01 + 1e-15);
    }

    #[test]
    fn tracks_exponential_decay_of_the_labeled_pool() {
        let mut spec = inert_body();
        for vessel in &mut spec.vessels {
            vessel.params.insert(DECAY_RATE.into(), 0.1);
        }
        let model = Model::build(&spec, &InitialLoad::empty()).unwrap();
        let profile = DoseProfile::Bolus {
            start: 0.0,
            labeled: 1.0,
            unlabeled: 0.0,
        };
        let settings = AdaptiveSettings {
            points: 400,
            ..AdaptiveSettings::default()
        };
        let result = simulate(&model, profile, settings).unwrap();

        let labeled = model
            .registry
            .state_index("vein", "vascular_labeled")
            .unwrap();
        let unlabeled = model
            .registry
            .state_index("vein", "vascular_unlabeled")
            .unwrap();

        for (i, &t) in result.times.iter().enumerate() {
            if t > 20.0 {
                break;
            }
            assert_relative_eq!(
                result.states[(labeled, i)],
                (-0.1 * t).exp(),
                epsilon = 1e-5
            );
            // decay converts labeled to unlabeled, total is conserved
            assert_relative_eq!(
                result.states[(labeled, i)] + result.states[(unlabeled, i)],
                1.0,
                epsilon = 1e-10
            );
        }
        assert!(result.times.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn constant_infusion_ramps_linearly_then_plateaus() {
        let model = Model::build(&inert_body(), &InitialLoad::empty()).unwrap();
        let profile = DoseProfile::Constant {
            start: 0.0,
            stop: 60.0,
            labeled: 10.0,
            unlabeled: 0.0,
        };
        let settings = AdaptiveSettings {
            points: 7001, // h stays at 0.01, so the run covers [0, 70]
            ..AdaptiveSettings::default()
        };
        let result = simulate(&model, profile, settings).unwrap();
        let vein = model
            .registry
            .state_index("vein", "vascular_labeled")
            .unwrap();
        let series = result.series(vein);

        for (i, &t) in result.times.iter().enumerate() {
            let expected = 10.0 * t.min(60.0) / 60.0;
            assert!(
                (series[i] - expected).abs() < 0.01,
                "t = {t}: {} vs {expected}",
                series[i]
            );
            if i > 0 && t < 60.0 {
                assert!(series[i] > series[i - 1]);
            }
        }

        // plateau: no further delivery after the window closes
        let after: Vec<usize> = result
            .times
            .iter()
            .enumerate()
            .filter(|(_, &t)| t > 60.01)
            .map(|(i, _)| i)
            .collect();
        let last = *after.last().unwrap();
        assert!((series[after[0]] - series[last]).abs() < 1e-12);
        assert_relative_eq!(series[last], 10.0, epsilon = 0.02);
    }

    #[test]
    fn dosing_mass_is_conserved_without_kinetics() {
        let model = Model::build(&inert_body(), &InitialLoad::empty()).unwrap();
        let profile = DoseProfile::Bolus {
            start: 0.0,
            labeled: 10.0,
            unlabeled: 90.0,
        };
        let settings = AdaptiveSettings {
            points: 500,
            ..AdaptiveSettings::default()
        };
        let result = simulate(&model, profile, settings).unwrap();
        let total: f64 = result.states.column(result.times.len() - 1).iter().sum();
        assert_relative_eq!(total, 100.0, epsilon = 1e-9);
        assert_eq!(
            (result.delivered_labeled, result.delivered_unlabeled),
            (10.0, 90.0)
        );
    }
}
