//! Simulation outputs: the state-by-time trajectory, the time grid, the
//! final system matrix, and the cumulative delivered dose.

use nalgebra::DMatrix;

use crate::registry::Compartment;

/// Result of one simulation run.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    /// Accepted time points, one per trajectory column.
    pub times: Vec<f64>,
    /// N x T state trajectory.
    pub states: DMatrix<f64>,
    /// System matrix as of the end of the run, for downstream connectivity
    /// analysis.
    pub matrix: DMatrix<f64>,
    pub delivered_labeled: f64,
    pub delivered_unlabeled: f64,
}

impl SimulationResult {
    /// Time series of a single state variable.
    pub fn series(&self, index: usize) -> Vec<f64> {
        self.states.row(index).iter().copied().collect()
    }

    /// Total labeled mass of one compartment over time (labeled variables
    /// sit at the odd offsets of each block).
    pub fn labeled_sum(&self, compartment: &Compartment) -> Vec<f64> {
        let mut sum = vec![0.0; self.times.len()];
        for idx in compartment.stencil.range().skip(1).step_by(2) {
            for (acc, v) in sum.iter_mut().zip(self.states.row(idx).iter()) {
                *acc += v;
            }
        }
        sum
    }

    /// 0/1 coupling structure of the final system matrix.
    pub fn connectivity(&self) -> DMatrix<f64> {
        self.matrix.map(|v| if v != 0.0 { 1.0 } else { 0.0 })
    }
}
