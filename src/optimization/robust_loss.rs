//! Robust loss functions for iteratively re-weighted least squares.
//!
//! A loss maps the squared norm `r²` of a residual block to its cost `ρ(r²)`
//! and to the weight `w(r²) = ρ'(r²)` that scales the block in the normal
//! equations. Every loss has `w(0) = 1` and a weight that never increases
//! with `r²`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LossType {
    /// Plain least squares.
    #[default]
    Trivial,
    /// Residuals beyond the scale are ignored.
    Truncated,
    Huber,
    Cauchy,
}

/// A [`LossType`] together with its scale `s`, in residual units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobustLoss {
    pub loss_type: LossType,
    pub scale: f64,
}

impl Default for RobustLoss {
    fn default() -> Self {
        RobustLoss::trivial()
    }
}

impl RobustLoss {
    /// `scale` must be positive; it is the residual norm where the robust
    /// losses start to down-weight. It is unused by [`LossType::Trivial`].
    pub fn new(loss_type: LossType, scale: f64) -> Self {
        RobustLoss { loss_type, scale }
    }

    pub fn trivial() -> Self {
        RobustLoss::new(LossType::Trivial, 1.0)
    }

    /// Returns `(ρ(r²), w(r²))`.
    pub fn rho_and_weight(&self, r2: f64) -> (f64, f64) {
        let s = self.scale;
        let s2 = s * s;
        match self.loss_type {
            LossType::Trivial => (r2, 1.0),
            LossType::Truncated => {
                if r2 <= s2 {
                    (r2, 1.0)
                } else {
                    (s2, 0.0)
                }
            }
            LossType::Huber => {
                let r = r2.sqrt();
                if r <= s {
                    (r2, 1.0)
                } else {
                    (2.0 * s * r - s2, s / r)
                }
            }
            LossType::Cauchy => {
                let t = r2 / s2;
                (s2 * t.ln_1p(), 1.0 / (1.0 + t))
            }
        }
    }

    /// `ρ(r²)`
    pub fn loss(&self, r2: f64) -> f64 {
        self.rho_and_weight(r2).0
    }

    /// `w(r²) = ρ'(r²)`, equal to 1 at `r² = 0`.
    pub fn weight(&self, r2: f64) -> f64 {
        self.rho_and_weight(r2).1
    }
}
