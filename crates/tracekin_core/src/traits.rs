use nalgebra::DVector;

/// Right-hand side of the compartmental system.
///
/// Both integration disciplines consume this contract; the two
/// implementations in [`crate::rhs`] differ only in how the saturable
/// binding term enters the evaluation.
pub trait RightHandSide {
    /// State-space dimension N.
    fn dimension(&self) -> usize;

    /// Evaluates dX/dt at `(t, state)` into `out`.
    ///
    /// Implementations may use internal scratch storage (hence `&mut self`)
    /// but must be pure functions of the arguments: repeated evaluation at
    /// the same point yields the same derivative.
    fn eval(&mut self, t: f64, state: &DVector<f64>, out: &mut DVector<f64>);
}
