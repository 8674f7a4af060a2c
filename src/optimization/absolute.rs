//! Pose refiners for 2D-3D correspondences.
//!
//! Both refiners estimate a world-to-camera (or world-to-rig) [`CameraPose`]
//! with six local parameters `δ = [ω, δt]`. The update is
//!
//! ```text
//! R' = exp([ω]×)·R
//! t' = t + δt
//! ```
//!
//! so the derivative of `Z = R·X + t` with respect to `δ` at zero is
//! `[-[R·X]× | I]`. Residuals are `observed − projected`, in pixels.
//! Correspondences whose point lies behind the camera are skipped in both
//! the residual and the Jacobian pass.

use crate::camera::Camera;
use crate::geometry::{skew_symmetric, CameraPose};
use crate::optimization::{Accumulator, Refiner};
use nalgebra::{Matrix3, Matrix3x6, SVector, UnitQuaternion, Vector2, Vector3};

fn pose_step(delta: &SVector<f64, 6>, pose: &CameraPose) -> CameraPose {
    let omega = Vector3::new(delta[0], delta[1], delta[2]);
    let dt = Vector3::new(delta[3], delta[4], delta[5]);
    CameraPose {
        q: UnitQuaternion::from_scaled_axis(omega) * pose.q,
        t: pose.t + dt,
    }
}

/// `dZ/dδ` for `Z = R_k·(R·X + t) + t_k`, given `R·X` and `R_k`.
fn point_jacobian(rotated: &Vector3<f64>, rig_rotation: &Matrix3<f64>) -> Matrix3x6<f64> {
    let mut dz = Matrix3x6::zeros();
    dz.fixed_view_mut::<3, 3>(0, 0)
        .copy_from(&(rig_rotation * -skew_symmetric(rotated)));
    dz.fixed_view_mut::<3, 3>(0, 3).copy_from(rig_rotation);
    dz
}

/// Single-camera pose from 2D-3D correspondences.
#[derive(Debug, Clone, Copy)]
pub struct AbsolutePoseRefiner<'a> {
    points2d: &'a [Vector2<f64>],
    points3d: &'a [Vector3<f64>],
    camera: &'a Camera,
    weights: Option<&'a [f64]>,
}

impl<'a> AbsolutePoseRefiner<'a> {
    /// `points2d` and `points3d` must have the same length.
    pub fn new(
        points2d: &'a [Vector2<f64>],
        points3d: &'a [Vector3<f64>],
        camera: &'a Camera,
    ) -> Self {
        debug_assert_eq!(points2d.len(), points3d.len());
        AbsolutePoseRefiner {
            points2d,
            points3d,
            camera,
            weights: None,
        }
    }

    /// Per-correspondence non-negative weights.
    pub fn with_weights(mut self, weights: &'a [f64]) -> Self {
        debug_assert_eq!(weights.len(), self.points2d.len());
        self.weights = Some(weights);
        self
    }

    fn weight(&self, i: usize) -> f64 {
        self.weights.map_or(1.0, |w| w[i])
    }
}

impl Refiner<6> for AbsolutePoseRefiner<'_> {
    type Model = CameraPose;

    fn compute_residual<A: Accumulator<6>>(&self, accumulator: &mut A, pose: &CameraPose) {
        for (i, (xp, x)) in self.points2d.iter().zip(self.points3d).enumerate() {
            let z = pose.apply(x);
            if z.z < 0.0 {
                continue;
            }
            let residual = xp - self.camera.project(&z);
            accumulator.add_residual(&residual, self.weight(i));
        }
    }

    fn compute_jacobian<A: Accumulator<6>>(&self, accumulator: &mut A, pose: &CameraPose) {
        let identity = Matrix3::identity();
        for (i, (xp, x)) in self.points2d.iter().zip(self.points3d).enumerate() {
            let rotated = pose.rotate(x);
            let z = rotated + pose.t;
            if z.z < 0.0 {
                continue;
            }
            let (projected, jac_point) = self.camera.project_with_jac(&z);
            let residual = xp - projected;
            let jacobian = jac_point * point_jacobian(&rotated, &identity);
            accumulator.add_jacobian(&residual, &jacobian, self.weight(i));
        }
    }

    fn step(&self, delta: &SVector<f64, 6>, pose: &CameraPose) -> CameraPose {
        pose_step(delta, pose)
    }
}

/// Pose of a rigid multi-camera rig.
///
/// Camera `k` sees the world through `rig_to_camera[k] ∘ pose`; its
/// correspondences are `points2d[k]` and `points3d[k]`.
#[derive(Debug, Clone, Copy)]
pub struct GeneralizedAbsolutePoseRefiner<'a> {
    points2d: &'a [Vec<Vector2<f64>>],
    points3d: &'a [Vec<Vector3<f64>>],
    rig_to_camera: &'a [CameraPose],
    cameras: &'a [Camera],
    weights: Option<&'a [Vec<f64>]>,
}

impl<'a> GeneralizedAbsolutePoseRefiner<'a> {
    /// Every slice is indexed by camera and must have `cameras.len()`
    /// entries; `points2d[k]` and `points3d[k]` must have equal lengths.
    pub fn new(
        points2d: &'a [Vec<Vector2<f64>>],
        points3d: &'a [Vec<Vector3<f64>>],
        rig_to_camera: &'a [CameraPose],
        cameras: &'a [Camera],
    ) -> Self {
        debug_assert_eq!(points2d.len(), cameras.len());
        debug_assert_eq!(points3d.len(), cameras.len());
        debug_assert_eq!(rig_to_camera.len(), cameras.len());
        GeneralizedAbsolutePoseRefiner {
            points2d,
            points3d,
            rig_to_camera,
            cameras,
            weights: None,
        }
    }

    /// Per-observation weights, laid out like `points2d`.
    pub fn with_weights(mut self, weights: &'a [Vec<f64>]) -> Self {
        debug_assert_eq!(weights.len(), self.cameras.len());
        self.weights = Some(weights);
        self
    }

    fn weight(&self, k: usize, i: usize) -> f64 {
        self.weights.map_or(1.0, |w| w[k][i])
    }
}

impl Refiner<6> for GeneralizedAbsolutePoseRefiner<'_> {
    type Model = CameraPose;

    fn compute_residual<A: Accumulator<6>>(&self, accumulator: &mut A, pose: &CameraPose) {
        for (k, camera) in self.cameras.iter().enumerate() {
            let rig = &self.rig_to_camera[k];
            for (i, (xp, x)) in self.points2d[k].iter().zip(&self.points3d[k]).enumerate() {
                let z = rig.apply(&pose.apply(x));
                if z.z < 0.0 {
                    continue;
                }
                let residual = xp - camera.project(&z);
                accumulator.add_residual(&residual, self.weight(k, i));
            }
        }
    }

    fn compute_jacobian<A: Accumulator<6>>(&self, accumulator: &mut A, pose: &CameraPose) {
        for (k, camera) in self.cameras.iter().enumerate() {
            let rig = &self.rig_to_camera[k];
            let rig_rotation = rig.q.to_rotation_matrix().into_inner();
            for (i, (xp, x)) in self.points2d[k].iter().zip(&self.points3d[k]).enumerate() {
                let rotated = pose.rotate(x);
                let z = rig.apply(&(rotated + pose.t));
                if z.z < 0.0 {
                    continue;
                }
                let (projected, jac_point) = camera.project_with_jac(&z);
                let residual = xp - projected;
                let jacobian = jac_point * point_jacobian(&rotated, &rig_rotation);
                accumulator.add_jacobian(&residual, &jacobian, self.weight(k, i));
            }
        }
    }

    fn step(&self, delta: &SVector<f64, 6>, pose: &CameraPose) -> CameraPose {
        pose_step(delta, pose)
    }
}
