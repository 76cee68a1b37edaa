//! The two right-hand-side strategies.
//!
//! [`LaggedLinearRhs`] serves the explicit integrator: the binding term is
//! linearized about the last accepted state, so each evaluation patches a
//! copy of the running matrix by the rate change relative to that anchor
//! and multiplies. After a step is accepted the patch is committed and the
//! anchor moves forward. The lag is a local-error source the adaptive step
//! control absorbs.
//!
//! [`InstantaneousRhs`] serves the stiff delegate: the binding flux is an
//! additive source evaluated at the state passed in, with no stored
//! anchor, so the solver may re-evaluate freely at stage states.

use nalgebra::{DMatrix, DVector};

use crate::binding::BindingModel;
use crate::traits::RightHandSide;

/// Explicit-scheme right-hand side with binding linearized about the last
/// accepted state.
pub struct LaggedLinearRhs {
    matrix: DMatrix<f64>,
    binding: BindingModel,
    anchor: DVector<f64>,
    scratch: DMatrix<f64>,
}

impl LaggedLinearRhs {
    pub fn new(matrix0: DMatrix<f64>, binding: BindingModel, state0: &DVector<f64>) -> Self {
        let scratch = matrix0.clone();
        Self {
            matrix: matrix0,
            binding,
            anchor: state0.clone(),
            scratch,
        }
    }

    /// Folds the rate change at `accepted` into the running matrix and
    /// re-anchors the linearization there. Call once per accepted step.
    pub fn commit(&mut self, accepted: &DVector<f64>) {
        let (matrix, anchor) = (&mut self.matrix, &self.anchor);
        self.binding.patch(matrix, accepted, anchor);
        self.anchor.copy_from(accepted);
    }

    /// The running matrix, reflecting the linearization at the current
    /// anchor. After a run this is the final system matrix output.
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    pub fn into_matrix(self) -> DMatrix<f64> {
        self.matrix
    }
}

impl RightHandSide for LaggedLinearRhs {
    fn dimension(&self) -> usize {
        self.anchor.len()
    }

    fn eval(&mut self, _t: f64, state: &DVector<f64>, out: &mut DVector<f64>) {
        if self.binding.is_empty() {
            out.gemv(1.0, &self.matrix, state, 0.0);
            return;
        }
        self.scratch.copy_from(&self.matrix);
        self.binding.patch(&mut self.scratch, state, &self.anchor);
        out.gemv(1.0, &self.scratch, state, 0.0);
    }
}

/// Implicit-scheme right-hand side: static matrix plus the instantaneous
/// binding source.
pub struct InstantaneousRhs {
    matrix: DMatrix<f64>,
    binding: BindingModel,
}

impl InstantaneousRhs {
    pub fn new(matrix0: DMatrix<f64>, binding: BindingModel) -> Self {
        Self {
            matrix: matrix0,
            binding,
        }
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// `out = M x + B(x)`.
    pub fn eval_into(&self, state: &DVector<f64>, out: &mut DVector<f64>) {
        out.gemv(1.0, &self.matrix, state, 0.0);
        self.binding.add_source(state, out);
    }

    /// Jacobian action `out = M v + B'(x) v`, for the delegate solver's
    /// Newton iteration.
    pub fn jacobian_mul(&self, state: &DVector<f64>, v: &DVector<f64>, out: &mut DVector<f64>) {
        out.gemv(1.0, &self.matrix, v, 0.0);
        self.binding.add_jacobian_mul(state, v, out);
    }
}

impl RightHandSide for InstantaneousRhs {
    fn dimension(&self) -> usize {
        self.matrix.nrows()
    }

    fn eval(&mut self, _t: f64, state: &DVector<f64>, out: &mut DVector<f64>) {
        self.eval_into(state, out);
    }
}
