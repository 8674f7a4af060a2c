//! Implements the field-of-view (FOV) camera model.
//!
//! Parameters are `[fx, fy, cx, cy, omega]`. The distortion scales the
//! normalized coordinates radially:
//!
//! ```text
//! r      = sqrt(x'² + y'²)
//! factor = atan(2·r·tan(ω/2)) / (ω·r)
//! ```
//!
//! The radial map `r -> atan(2·r·tan(ω/2)) / ω` has a closed-form inverse, so
//! unlike the other perspective models the undistortion needs no iteration.

use crate::camera::distortion::{
    project_distorted, project_distorted_with_jac, unproject_distorted, Distortion,
};
use crate::camera::{CameraModel, CameraModelId, Intrinsics};
use nalgebra::{Matrix2, Matrix2x3, Vector2, Vector3};

/// Below this `|ω|` the model is treated as distortion-free.
const MIN_OMEGA: f64 = 1e-8;
/// Below this radius the Taylor expansion around `r = 0` is used.
const MIN_RADIUS: f64 = 1e-5;

/// `[fx, fy, cx, cy, omega]`
#[derive(Debug, Clone, Copy)]
pub struct FovModel;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FovDistortion {
    pub omega: f64,
}

impl FovDistortion {
    fn half_tan(&self) -> f64 {
        (self.omega * 0.5).tan()
    }
}

impl Distortion for FovDistortion {
    fn distort_with_jac(&self, xn: &Vector2<f64>) -> (Vector2<f64>, Matrix2<f64>) {
        if self.omega.abs() < MIN_OMEGA {
            return (*xn, Matrix2::identity());
        }

        let t = self.half_tan();
        let r2 = xn.norm_squared();
        let r = r2.sqrt();

        // `factor` and `d(factor)/dr / r`
        let (factor, d_factor_over_r) = if r < MIN_RADIUS {
            let c = 2.0 * t / self.omega;
            (
                c * (1.0 - 4.0 * t * t * r2 / 3.0),
                -8.0 * c * t * t / 3.0,
            )
        } else {
            let factor = (2.0 * r * t).atan() / (self.omega * r);
            let d_atan = 2.0 * t / (1.0 + 4.0 * r2 * t * t);
            (factor, (d_atan / self.omega - factor) / r2)
        };

        let jac = Matrix2::identity() * factor + xn * xn.transpose() * d_factor_over_r;
        (xn * factor, jac)
    }

    fn undistort(&self, xd: &Vector2<f64>) -> Vector2<f64> {
        if self.omega.abs() < MIN_OMEGA {
            return *xd;
        }

        let t = self.half_tan();
        let rd = xd.norm();
        if rd < MIN_RADIUS {
            return xd * (self.omega / (2.0 * t));
        }

        let ru = (rd * self.omega).tan() / (2.0 * t);
        xd * (ru / rd)
    }
}

impl FovModel {
    fn split(params: &[f64]) -> (Intrinsics, FovDistortion) {
        (
            Intrinsics::from_focal_pair(params),
            FovDistortion { omega: params[4] },
        )
    }
}

impl CameraModel for FovModel {
    const ID: CameraModelId = CameraModelId::Fov;
    const NUM_PARAMS: usize = 5;
    const FOCAL_IDX: &'static [usize] = &[0, 1];
    const PRINCIPAL_POINT_IDX: &'static [usize] = &[2, 3];

    fn project(params: &[f64], point_3d: &Vector3<f64>) -> Vector2<f64> {
        let (intrinsics, distortion) = Self::split(params);
        project_distorted(&intrinsics, &distortion, point_3d)
    }

    fn project_with_jac(params: &[f64], point_3d: &Vector3<f64>) -> (Vector2<f64>, Matrix2x3<f64>) {
        let (intrinsics, distortion) = Self::split(params);
        project_distorted_with_jac(&intrinsics, &distortion, point_3d)
    }

    fn unproject(params: &[f64], point_2d: &Vector2<f64>) -> Vector3<f64> {
        let (intrinsics, distortion) = Self::split(params);
        unproject_distorted(&intrinsics, &distortion, point_2d)
    }
}
