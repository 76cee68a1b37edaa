//! Saturable receptor-binding corrector.
//!
//! The effective on-rate `k_on * (capacity - occupancy)` depends on the
//! receptor-bound mass and therefore cannot live in the static matrix. Two
//! strategies consume the same site table:
//!
//! * the explicit scheme patches matrix cells by the *change* in effective
//!   rate between the evaluation state and an anchor state (the last
//!   accepted point), keeping the matrix affine in the state;
//! * the implicit scheme evaluates an additive source vector directly at the
//!   instantaneous state, together with its analytic Jacobian action for the
//!   delegate solver's Newton iteration.

use nalgebra::{DMatrix, DVector};

use crate::registry::{BindingSite, Registry};

/// Site table shared by both right-hand-side strategies.
#[derive(Debug, Clone)]
pub struct BindingModel {
    sites: Vec<BindingSite>,
}

impl BindingModel {
    pub fn from_registry(registry: &Registry) -> Self {
        Self {
            sites: registry.binding_sites().to_vec(),
        }
    }

    pub fn sites(&self) -> &[BindingSite] {
        &self.sites
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Explicit strategy: increment the binding cells by the difference of
    /// effective on-rates between `state` and `anchor`.
    pub fn patch(&self, matrix: &mut DMatrix<f64>, state: &DVector<f64>, anchor: &DVector<f64>) {
        for site in &self.sites {
            let delta = site.effective_rate(state) - site.effective_rate(anchor);
            if delta == 0.0 {
                continue;
            }
            for &(row, col, sign) in &site.cells {
                matrix[(row, col)] += sign * delta;
            }
        }
    }

    /// Implicit strategy: add the binding flux evaluated at `state` into
    /// `out`. Free interstitial ligand moves onto the receptor pool at
    /// `k_on * free * (capacity - occupancy) / interstitial volume`; the
    /// flux is conservative by construction.
    pub fn add_source(&self, state: &DVector<f64>, out: &mut DVector<f64>) {
        for site in &self.sites {
            let available = site.capacity - site.occupancy(state);
            let gain = site.on_rate * available / site.interstitial_volume;
            for side in 0..2 {
                let flux = gain * state[site.free[side]];
                out[site.bound[side]] += flux;
                out[site.free[side]] -= flux;
            }
        }
    }

    /// Jacobian action of [`BindingModel::add_source`] at `state`, applied
    /// to `v` and accumulated into `out`.
    pub fn add_jacobian_mul(&self, state: &DVector<f64>, v: &DVector<f64>, out: &mut DVector<f64>) {
        for site in &self.sites {
            let available = site.capacity - site.occupancy(state);
            let gain = site.on_rate / site.interstitial_volume;
            let occupancy_dot = v[site.bound[0]] + v[site.bound[1]];
            for side in 0..2 {
                let flux_dot = gain * available * v[site.free[side]]
                    - gain * state[site.free[side]] * occupancy_dot;
                out[site.bound[side]] += flux_dot;
                out[site.free[side]] -= flux_dot;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compartment::{param::*, BodySpec, OrganSpec};
    use approx::assert_relative_eq;

    fn receptor_body() -> BodySpec {
        let vessel = |name: &str| {
            OrganSpec::new(name)
                .with(FLOW, 1.0)
                .with(VASCULAR_VOLUME, 0.5)
                .with(DECAY_RATE, 0.0)
        };
        let tumor = OrganSpec::new("tumor")
            .with(FLOW, 0.01)
            .with(PS, 0.02)
            .with(VASCULAR_VOLUME, 0.008)
            .with(INTERSTITIAL_VOLUME, 0.026)
            .with(UNBINDING_RATE, 0.04)
            .with(INTERNALIZATION_RATE, 1e-3)
            .with(RELEASE_RATE, 1.5e-4)
            .with(DECAY_RATE, 0.0)
            .with(BINDING_RATE, 0.08)
            .with(RECEPTOR_CAPACITY, 1.305);
        BodySpec {
            vessels: vec![vessel("artery"), vessel("vein")],
            receptor_positive: vec![tumor],
            ..Default::default()
        }
    }

    fn registry() -> Registry {
        Registry::new(&receptor_body()).unwrap()
    }

    #[test]
    fn patch_applies_rate_delta_at_binding_cells() {
        let registry = registry();
        let binding = BindingModel::from_registry(&registry);
        let site = &binding.sites()[0];
        let n = registry.state_len();

        let anchor = DVector::zeros(n);
        let mut state = DVector::zeros(n);
        state[site.bound[0]] = 0.2;
        state[site.bound[1]] = 0.3;

        let mut matrix = DMatrix::zeros(n, n);
        binding.patch(&mut matrix, &state, &anchor);

        // rate(state) - rate(anchor) = k_on * (-occupancy)
        let delta = 0.08 * (-0.5);
        let (row, col, sign) = site.cells[0];
        assert_relative_eq!(matrix[(row, col)], sign * delta);
        assert_eq!(matrix.iter().filter(|v| **v != 0.0).count(), 4);

        // patching back against the same state is a no-op
        binding.patch(&mut matrix, &state, &state);
        assert_relative_eq!(matrix[(row, col)], sign * delta);
    }

    #[test]
    fn source_moves_mass_from_free_to_bound_conservatively() {
        let registry = registry();
        let binding = BindingModel::from_registry(&registry);
        let site = binding.sites()[0].clone();
        let n = registry.state_len();

        let mut state = DVector::zeros(n);
        state[site.free[0]] = 0.4;
        state[site.free[1]] = 0.1;
        state[site.bound[0]] = 0.05;
        state[site.bound[1]] = 0.05;

        let mut out = DVector::zeros(n);
        binding.add_source(&state, &mut out);

        let expected = 0.08 * 0.4 * (1.305 - 0.1) / 0.026;
        assert_relative_eq!(out[site.bound[0]], expected);
        assert_relative_eq!(out[site.free[0]], -expected);
        assert_relative_eq!(out.iter().sum::<f64>(), 0.0, epsilon = 1e-14);
    }

    #[test]
    fn jacobian_action_matches_finite_differences() {
        let registry = registry();
        let binding = BindingModel::from_registry(&registry);
        let site = binding.sites()[0].clone();
        let n = registry.state_len();

        let mut state = DVector::zeros(n);
        state[site.free[0]] = 0.4;
        state[site.free[1]] = 0.1;
        state[site.bound[0]] = 0.3;
        state[site.bound[1]] = 0.2;

        let mut direction = DVector::zeros(n);
        direction[site.free[0]] = 0.7;
        direction[site.bound[1]] = -0.4;

        let mut analytic = DVector::zeros(n);
        binding.add_jacobian_mul(&state, &direction, &mut analytic);

        let eps = 1e-7;
        let mut plus = DVector::zeros(n);
        let mut minus = DVector::zeros(n);
        binding.add_source(&(state.clone() + direction.clone() * eps), &mut plus);
        binding.add_source(&(state.clone() - direction.clone() * eps), &mut minus);
        let numeric = (plus - minus) / (2.0 * eps);

        for i in 0..n {
            assert_relative_eq!(analytic[i], numeric[i], epsilon = 1e-6);
        }
    }
}
