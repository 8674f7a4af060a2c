//! The `optimization` module refines geometric models by robust non-linear
//! least squares.
//!
//! A [`Refiner`] knows one problem (for example the pose of a camera given
//! 2D-3D correspondences). It evaluates residual blocks and their Jacobians
//! at a model estimate and pushes them into an [`Accumulator`], and it knows
//! how to apply a parameter update to the model. The damped Gauss-Newton
//! loop in [`lm`] is written once against these two traits and reports its
//! progress through [`BundleStats`].
//!
//! The public entry points are [`refine_absolute_pose`] and
//! [`refine_generalized_absolute_pose`].

use nalgebra::SVector;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Write;

pub mod absolute;
pub mod accumulator;
pub mod bundle;
pub mod lm;
pub mod robust_loss;

pub use absolute::{AbsolutePoseRefiner, GeneralizedAbsolutePoseRefiner};
pub use accumulator::{Accumulator, NormalAccumulator};
pub use bundle::{
    refine_absolute_pose, refine_absolute_pose_weighted, refine_generalized_absolute_pose,
};
pub use robust_loss::{LossType, RobustLoss};

use crate::camera::Camera;
use crate::geometry::CameraPose;
use nalgebra::{Vector2, Vector3};

#[derive(thiserror::Error, Debug)]
pub enum OptimizationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Failed to load YAML: {0}")]
    YamlError(String),
    #[error("IO Error: {0}")]
    IOError(String),
}

impl From<std::io::Error> for OptimizationError {
    fn from(err: std::io::Error) -> Self {
        OptimizationError::IOError(err.to_string())
    }
}

impl From<serde_yaml::Error> for OptimizationError {
    fn from(err: serde_yaml::Error) -> Self {
        OptimizationError::YamlError(err.to_string())
    }
}

/// A least-squares problem over a model with `N` local degrees of freedom.
pub trait Refiner<const N: usize> {
    type Model: Clone;

    /// Pushes every residual block at `model` into `accumulator`.
    fn compute_residual<A: Accumulator<N>>(&self, accumulator: &mut A, model: &Self::Model);

    /// Pushes every residual block at `model` together with the Jacobian of
    /// its prediction with respect to the local parameters.
    ///
    /// Must visit the same blocks as [`Refiner::compute_residual`].
    fn compute_jacobian<A: Accumulator<N>>(&self, accumulator: &mut A, model: &Self::Model);

    /// Applies the local update `delta` to `model`.
    fn step(&self, delta: &SVector<f64, N>, model: &Self::Model) -> Self::Model;
}

/// Options of the Levenberg-Marquardt loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleOptions {
    pub max_iterations: usize,
    pub loss_type: LossType,
    pub loss_scale: f64,
    /// Converged once the gradient norm `‖JᵀWr‖` drops below this.
    pub gradient_tol: f64,
    /// Converged once the step norm drops below this.
    pub step_tol: f64,
    /// Converged once an accepted step decreases the cost by less than this
    /// fraction.
    pub cost_tol: f64,
    pub initial_lambda: f64,
    pub min_lambda: f64,
    pub max_lambda: f64,
    /// Consecutive rejected steps tolerated before giving up.
    pub max_rejections: usize,
    /// Logs a summary at `info` level when the refinement ends.
    pub verbose: bool,
}

impl Default for BundleOptions {
    fn default() -> Self {
        BundleOptions {
            max_iterations: 100,
            loss_type: LossType::Trivial,
            loss_scale: 1.0,
            gradient_tol: 1e-10,
            step_tol: 1e-8,
            cost_tol: 1e-12,
            initial_lambda: 1e-3,
            min_lambda: 1e-10,
            max_lambda: 1e10,
            max_rejections: 30,
            verbose: false,
        }
    }
}

impl BundleOptions {
    /// Robust loss built from `loss_type` and `loss_scale`.
    pub fn loss(&self) -> RobustLoss {
        RobustLoss::new(self.loss_type, self.loss_scale)
    }

    /// Checks that the loss scale and the damping schedule are usable.
    ///
    /// # Errors
    ///
    /// [`OptimizationError::InvalidInput`] if `loss_scale` or
    /// `initial_lambda` is not a positive finite number, if `min_lambda` is
    /// negative or not finite, or if `min_lambda > max_lambda`.
    pub fn validate(&self) -> Result<(), OptimizationError> {
        let positive = |name: &str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(OptimizationError::InvalidInput(format!(
                    "{} must be positive and finite, found {}",
                    name, value
                )))
            }
        };
        positive("loss_scale", self.loss_scale)?;
        positive("initial_lambda", self.initial_lambda)?;
        if !(self.min_lambda.is_finite() && self.min_lambda >= 0.0) {
            return Err(OptimizationError::InvalidInput(format!(
                "min_lambda must be non-negative and finite, found {}",
                self.min_lambda
            )));
        }
        if self.min_lambda > self.max_lambda {
            return Err(OptimizationError::InvalidInput(format!(
                "min_lambda {} exceeds max_lambda {}",
                self.min_lambda, self.max_lambda
            )));
        }
        Ok(())
    }

    /// Loads options from a YAML file. Missing keys take their default.
    ///
    /// # Errors
    ///
    /// IO and YAML errors, and anything rejected by [`BundleOptions::validate`].
    pub fn load_from_yaml(path: &str) -> Result<Self, OptimizationError> {
        let contents = fs::read_to_string(path)?;
        let options: BundleOptions = serde_yaml::from_str(&contents)?;
        options.validate()?;
        Ok(options)
    }

    /// Writes every option, defaults included, to a YAML file.
    pub fn save_to_yaml(&self, path: &str) -> Result<(), OptimizationError> {
        let yaml_string = serde_yaml::to_string(self)?;
        let mut file = fs::File::create(path)?;
        file.write_all(yaml_string.as_bytes())?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// The damped normal equations could not be solved.
    SingularSystem,
    /// λ grew past `max_lambda`.
    DampingSaturated,
    /// More than `max_rejections` consecutive steps were rejected.
    TooManyRejections,
    /// The cost at the initial estimate is NaN or infinite.
    NonFiniteCost,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerState {
    #[default]
    Running,
    Converged,
    MaxIterationsReached,
    Failed(FailureReason),
}

/// Snapshot of a refinement, updated after every accepted step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleStats {
    /// Accepted steps.
    pub iterations: usize,
    pub initial_cost: f64,
    pub cost: f64,
    pub lambda: f64,
    /// Rejected steps over the whole run.
    pub invalid_steps: usize,
    pub step_norm: f64,
    pub grad_norm: f64,
    pub state: OptimizerState,
}

impl BundleStats {
    pub fn is_converged(&self) -> bool {
        self.state == OptimizerState::Converged
    }

    /// True for every [`OptimizerState::Failed`] reason.
    pub fn is_failed(&self) -> bool {
        matches!(self.state, OptimizerState::Failed(_))
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProjectionError {
    pub rmse: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stddev: f64,
    pub median: f64,
}

impl fmt::Debug for ProjectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Projection Error [ rmse: {}, min: {}, max: {}, mean: {}, stddev: {}, median: {} ]",
            self.rmse, self.min, self.max, self.mean, self.stddev, self.median
        )
    }
}

impl ProjectionError {
    /// Reprojection error statistics of `points3d` seen by `camera` at
    /// `pose` against the observed `points2d`, in pixels. Points behind the
    /// camera are left out.
    ///
    /// # Errors
    ///
    /// [`OptimizationError::InvalidInput`] if the point counts differ or no
    /// point lies in front of the camera.
    pub fn compute(
        camera: &Camera,
        pose: &CameraPose,
        points2d: &[Vector2<f64>],
        points3d: &[Vector3<f64>],
    ) -> Result<Self, OptimizationError> {
        if points2d.len() != points3d.len() {
            return Err(OptimizationError::InvalidInput(
                "Number of 2D and 3D points must match".to_string(),
            ));
        }

        let mut errors: Vec<f64> = points2d
            .iter()
            .zip(points3d)
            .filter_map(|(xp, x)| {
                let z = pose.apply(x);
                (z.z >= 0.0).then(|| (camera.project(&z) - xp).norm())
            })
            .collect();

        if errors.is_empty() {
            return Err(OptimizationError::InvalidInput(
                "No point projects in front of the camera".to_string(),
            ));
        }

        let n = errors.len() as f64;
        let mean = errors.iter().sum::<f64>() / n;
        let variance = errors.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / n;
        let rmse = (errors.iter().map(|e| e * e).sum::<f64>() / n).sqrt();
        let min = errors.iter().fold(f64::INFINITY, |a, &b| a.min(b));
        let max = errors.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));

        errors.sort_by(|a, b| a.total_cmp(b));
        let mid = errors.len() / 2;
        let median = if errors.len() % 2 == 0 {
            (errors[mid - 1] + errors[mid]) / 2.0
        } else {
            errors[mid]
        };

        Ok(ProjectionError {
            rmse,
            min,
            max,
            mean,
            stddev: variance.sqrt(),
            median,
        })
    }
}
