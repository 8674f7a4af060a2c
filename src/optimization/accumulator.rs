//! Accumulation of residual blocks into a scalar cost and the normal
//! equations `JᵀWJ δ = JᵀWr`.

use crate::optimization::robust_loss::RobustLoss;
use nalgebra::{SMatrix, SVector};

/// Sink for the residual blocks produced by a [`Refiner`](crate::optimization::Refiner)
/// with `N` parameters.
///
/// A residual block and its Jacobian share the row count `R`, so a block can
/// never be paired with a Jacobian of a different height.
pub trait Accumulator<const N: usize> {
    fn reset_residual(&mut self);

    /// Adds one residual block to the cost. `weight` must be non-negative.
    fn add_residual<const R: usize>(&mut self, residual: &SVector<f64, R>, weight: f64);

    /// Cost accumulated since the last reset.
    fn residual(&self) -> f64;

    fn reset_jacobian(&mut self);

    /// Adds one residual block together with the Jacobian of the prediction
    /// with respect to the `N` parameters. `weight` must be non-negative.
    fn add_jacobian<const R: usize>(
        &mut self,
        residual: &SVector<f64, R>,
        jacobian: &SMatrix<f64, R, N>,
        weight: f64,
    );
}

/// Robustified normal-equations accumulator.
///
/// Each block contributes `weight·ρ(‖r‖²)` to the cost and is scaled by
/// `weight·w(‖r‖²)` in the Hessian approximation and the gradient.
#[derive(Debug, Clone)]
pub struct NormalAccumulator<const N: usize> {
    loss: RobustLoss,
    cost: f64,
    jtj: SMatrix<f64, N, N>,
    jtr: SVector<f64, N>,
}

impl<const N: usize> NormalAccumulator<N> {
    pub fn new(loss: RobustLoss) -> Self {
        NormalAccumulator {
            loss,
            cost: 0.0,
            jtj: SMatrix::zeros(),
            jtr: SVector::zeros(),
        }
    }

    /// `JᵀWJ`
    pub fn hessian(&self) -> &SMatrix<f64, N, N> {
        &self.jtj
    }

    /// `JᵀWr`
    pub fn gradient(&self) -> &SVector<f64, N> {
        &self.jtr
    }

    /// Solves `(JᵀWJ + λD) δ = JᵀWr` with `D = diag(max(JᵀWJ_kk, 1e-12))`.
    ///
    /// Returns `None` if the damped system is not positive definite or the
    /// step is not finite.
    pub fn solve_damped(&self, lambda: f64) -> Option<SVector<f64, N>> {
        let mut system = self.jtj;
        for k in 0..N {
            system[(k, k)] += lambda * self.jtj[(k, k)].max(1e-12);
        }
        let delta = system.cholesky()?.solve(&self.jtr);
        delta.iter().all(|v| v.is_finite()).then_some(delta)
    }
}

impl<const N: usize> Accumulator<N> for NormalAccumulator<N> {
    fn reset_residual(&mut self) {
        self.cost = 0.0;
    }

    fn add_residual<const R: usize>(&mut self, residual: &SVector<f64, R>, weight: f64) {
        debug_assert!(weight >= 0.0, "negative residual weight {}", weight);
        self.cost += weight * self.loss.loss(residual.norm_squared());
    }

    fn residual(&self) -> f64 {
        self.cost
    }

    fn reset_jacobian(&mut self) {
        self.cost = 0.0;
        self.jtj.fill(0.0);
        self.jtr.fill(0.0);
    }

    fn add_jacobian<const R: usize>(
        &mut self,
        residual: &SVector<f64, R>,
        jacobian: &SMatrix<f64, R, N>,
        weight: f64,
    ) {
        debug_assert!(weight >= 0.0, "negative residual weight {}", weight);
        let (rho, w) = self.loss.rho_and_weight(residual.norm_squared());
        self.cost += weight * rho;

        let scale = weight * w;
        if scale == 0.0 {
            return;
        }
        self.jtj += jacobian.tr_mul(jacobian) * scale;
        self.jtr += jacobian.tr_mul(residual) * scale;
    }
}
