//! Levenberg-Marquardt loop shared by every [`Refiner`].
//!
//! Each iteration linearizes the problem at the current estimate, solves the
//! damped normal equations `(JᵀWJ + λD) δ = JᵀWr` and evaluates the cost at
//! `step(δ)`. A step that lowers the cost is accepted and λ shrinks by ten;
//! otherwise λ grows by ten and the same linearization is solved again.

use crate::optimization::{
    Accumulator, BundleOptions, BundleStats, FailureReason, NormalAccumulator, OptimizerState,
    Refiner,
};
use log::{debug, info, trace, warn};

const LAMBDA_FACTOR: f64 = 10.0;

/// Minimizes the robust cost of `refiner` starting from `model`.
///
/// `model` always holds the best accepted estimate, including after a
/// failure. `callback` is invoked with the current statistics after every
/// accepted step.
pub fn levenberg_marquardt<const N: usize, R: Refiner<N>>(
    refiner: &R,
    model: &mut R::Model,
    options: &BundleOptions,
    mut callback: Option<&mut dyn FnMut(&BundleStats)>,
) -> BundleStats {
    let mut accumulator = NormalAccumulator::<N>::new(options.loss());

    accumulator.reset_residual();
    refiner.compute_residual(&mut accumulator, model);
    let initial_cost = accumulator.residual();

    let mut stats = BundleStats {
        initial_cost,
        cost: initial_cost,
        lambda: options.initial_lambda,
        ..Default::default()
    };

    if !initial_cost.is_finite() {
        stats.state = OptimizerState::Failed(FailureReason::NonFiniteCost);
        warn!("Refinement failed: initial cost is {}", initial_cost);
        return stats;
    }

    let mut relinearize = true;
    let mut rejections = 0;

    while stats.iterations < options.max_iterations {
        if relinearize {
            accumulator.reset_jacobian();
            refiner.compute_jacobian(&mut accumulator, model);
            stats.grad_norm = accumulator.gradient().norm();
            if stats.grad_norm < options.gradient_tol {
                stats.state = OptimizerState::Converged;
                break;
            }
            relinearize = false;
        }

        let Some(delta) = accumulator.solve_damped(stats.lambda) else {
            stats.state = OptimizerState::Failed(FailureReason::SingularSystem);
            break;
        };
        stats.step_norm = delta.norm();
        if stats.step_norm < options.step_tol {
            // After rejections the step is only small because λ is large.
            stats.state = if rejections == 0 {
                OptimizerState::Converged
            } else {
                OptimizerState::Failed(FailureReason::DampingSaturated)
            };
            break;
        }

        let candidate = refiner.step(&delta, model);
        accumulator.reset_residual();
        refiner.compute_residual(&mut accumulator, &candidate);
        let cost = accumulator.residual();

        if cost.is_finite() && cost < stats.cost {
            let relative_decrease = if stats.cost > 0.0 {
                (stats.cost - cost) / stats.cost
            } else {
                0.0
            };

            *model = candidate;
            stats.cost = cost;
            stats.lambda = (stats.lambda / LAMBDA_FACTOR).max(options.min_lambda);
            stats.iterations += 1;
            rejections = 0;
            relinearize = true;

            debug!(
                "iter {:3}: cost {:.6e}, step {:.3e}, grad {:.3e}, lambda {:.1e}",
                stats.iterations, stats.cost, stats.step_norm, stats.grad_norm, stats.lambda
            );
            if let Some(callback) = callback.as_deref_mut() {
                callback(&stats);
            }

            if relative_decrease < options.cost_tol {
                stats.state = OptimizerState::Converged;
                break;
            }
        } else {
            stats.invalid_steps += 1;
            rejections += 1;
            stats.lambda *= LAMBDA_FACTOR;
            trace!(
                "rejected step: cost {:.6e} >= {:.6e}, lambda {:.1e}",
                cost,
                stats.cost,
                stats.lambda
            );

            if stats.lambda > options.max_lambda {
                stats.state = OptimizerState::Failed(FailureReason::DampingSaturated);
                break;
            }
            if rejections > options.max_rejections {
                stats.state = OptimizerState::Failed(FailureReason::TooManyRejections);
                break;
            }
        }
    }

    if stats.state == OptimizerState::Running {
        stats.state = OptimizerState::MaxIterationsReached;
        if relinearize {
            accumulator.reset_jacobian();
            refiner.compute_jacobian(&mut accumulator, model);
            stats.grad_norm = accumulator.gradient().norm();
            if stats.grad_norm < options.gradient_tol {
                stats.state = OptimizerState::Converged;
            }
        }
    }

    if let OptimizerState::Failed(reason) = stats.state {
        warn!(
            "Refinement failed ({:?}) after {} iterations, cost {:.6e}",
            reason, stats.iterations, stats.cost
        );
    }
    if options.verbose {
        info!(
            "Refinement finished: {:?}, {} iterations ({} rejected steps), cost {:.6e} -> {:.6e}",
            stats.state, stats.iterations, stats.invalid_steps, stats.initial_cost, stats.cost
        );
    }

    stats
}
