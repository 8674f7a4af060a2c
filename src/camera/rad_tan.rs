//! Implements the radial and radial-tangential (RadTan) camera models.
//!
//! All four models distort the normalized coordinates `(x', y') = (x/z, y/z)`
//! with
//!
//! ```text
//! r² = x'² + y'²
//! d  = (1 + k1·r² + k2·r⁴ + k3·r⁶) / (1 + k4·r² + k5·r⁴ + k6·r⁶)
//! x_dist = d·x' + 2p1·x'y' + p2·(r² + 2x'²)
//! y_dist = d·y' + p1·(r² + 2y'²) + 2p2·x'y'
//! ```
//!
//! and differ only in which coefficients they expose:
//!
//! | model           | params                                          |
//! |-----------------|-------------------------------------------------|
//! | `SIMPLE_RADIAL` | `f, cx, cy, k`                                  |
//! | `RADIAL`        | `f, cx, cy, k1, k2`                             |
//! | `OPENCV`        | `fx, fy, cx, cy, k1, k2, p1, p2`                |
//! | `FULL_OPENCV`   | `fx, fy, cx, cy, k1, k2, p1, p2, k3, k4, k5, k6`|
//!
//! Unprojection inverts the distortion with Newton's method.

use crate::camera::distortion::{
    project_distorted, project_distorted_with_jac, unproject_distorted, Distortion,
};
use crate::camera::{CameraModel, CameraModelId, Intrinsics};
use nalgebra::{Matrix2, Matrix2x3, Vector2, Vector3};

/// Rational radial plus tangential distortion coefficients.
///
/// Unused coefficients of the simpler models stay zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RadTanDistortion {
    pub k1: f64,
    pub k2: f64,
    pub k3: f64,
    pub k4: f64,
    pub k5: f64,
    pub k6: f64,
    pub p1: f64,
    pub p2: f64,
}

impl Distortion for RadTanDistortion {
    fn distort_with_jac(&self, xn: &Vector2<f64>) -> (Vector2<f64>, Matrix2<f64>) {
        let x = xn.x;
        let y = xn.y;
        let (k1, k2, k3) = (self.k1, self.k2, self.k3);
        let (k4, k5, k6) = (self.k4, self.k5, self.k6);
        let (p1, p2) = (self.p1, self.p2);

        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;

        let num = 1.0 + k1 * r2 + k2 * r4 + k3 * r6;
        let den = 1.0 + k4 * r2 + k5 * r4 + k6 * r6;
        let radial = num / den;

        // d(radial)/d(r²)
        let d_num = k1 + 2.0 * k2 * r2 + 3.0 * k3 * r4;
        let d_den = k4 + 2.0 * k5 * r2 + 3.0 * k6 * r4;
        let d_radial = (d_num * den - num * d_den) / (den * den);

        let x_distorted = radial * x + 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
        let y_distorted = radial * y + p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;

        let j00 = radial + 2.0 * x * x * d_radial + 2.0 * p1 * y + 6.0 * p2 * x;
        let j01 = 2.0 * x * y * d_radial + 2.0 * p1 * x + 2.0 * p2 * y;
        let j10 = j01;
        let j11 = radial + 2.0 * y * y * d_radial + 6.0 * p1 * y + 2.0 * p2 * x;

        (
            Vector2::new(x_distorted, y_distorted),
            Matrix2::new(j00, j01, j10, j11),
        )
    }
}

/// `[f, cx, cy, k]`
#[derive(Debug, Clone, Copy)]
pub struct SimpleRadialModel;

/// `[f, cx, cy, k1, k2]`
#[derive(Debug, Clone, Copy)]
pub struct RadialModel;

/// `[fx, fy, cx, cy, k1, k2, p1, p2]`
#[derive(Debug, Clone, Copy)]
pub struct OpenCvModel;

/// `[fx, fy, cx, cy, k1, k2, p1, p2, k3, k4, k5, k6]`
#[derive(Debug, Clone, Copy)]
pub struct FullOpenCvModel;

impl SimpleRadialModel {
    fn split(params: &[f64]) -> (Intrinsics, RadTanDistortion) {
        let distortion = RadTanDistortion {
            k1: params[3],
            ..Default::default()
        };
        (Intrinsics::from_single_focal(params), distortion)
    }
}

impl RadialModel {
    fn split(params: &[f64]) -> (Intrinsics, RadTanDistortion) {
        let distortion = RadTanDistortion {
            k1: params[3],
            k2: params[4],
            ..Default::default()
        };
        (Intrinsics::from_single_focal(params), distortion)
    }
}

impl OpenCvModel {
    fn split(params: &[f64]) -> (Intrinsics, RadTanDistortion) {
        let distortion = RadTanDistortion {
            k1: params[4],
            k2: params[5],
            p1: params[6],
            p2: params[7],
            ..Default::default()
        };
        (Intrinsics::from_focal_pair(params), distortion)
    }
}

impl FullOpenCvModel {
    fn split(params: &[f64]) -> (Intrinsics, RadTanDistortion) {
        let distortion = RadTanDistortion {
            k1: params[4],
            k2: params[5],
            p1: params[6],
            p2: params[7],
            k3: params[8],
            k4: params[9],
            k5: params[10],
            k6: params[11],
        };
        (Intrinsics::from_focal_pair(params), distortion)
    }
}

macro_rules! impl_rad_tan_model {
    ($model:ty, $id:expr, $num_params:expr, $focal:expr, $pp:expr) => {
        impl CameraModel for $model {
            const ID: CameraModelId = $id;
            const NUM_PARAMS: usize = $num_params;
            const FOCAL_IDX: &'static [usize] = $focal;
            const PRINCIPAL_POINT_IDX: &'static [usize] = $pp;

            fn project(params: &[f64], point_3d: &Vector3<f64>) -> Vector2<f64> {
                let (intrinsics, distortion) = Self::split(params);
                project_distorted(&intrinsics, &distortion, point_3d)
            }

            fn project_with_jac(
                params: &[f64],
                point_3d: &Vector3<f64>,
            ) -> (Vector2<f64>, Matrix2x3<f64>) {
                let (intrinsics, distortion) = Self::split(params);
                project_distorted_with_jac(&intrinsics, &distortion, point_3d)
            }

            fn unproject(params: &[f64], point_2d: &Vector2<f64>) -> Vector3<f64> {
                let (intrinsics, distortion) = Self::split(params);
                unproject_distorted(&intrinsics, &distortion, point_2d)
            }
        }
    };
}

impl_rad_tan_model!(SimpleRadialModel, CameraModelId::SimpleRadial, 4, &[0], &[1, 2]);
impl_rad_tan_model!(RadialModel, CameraModelId::Radial, 5, &[0], &[1, 2]);
impl_rad_tan_model!(OpenCvModel, CameraModelId::OpenCv, 8, &[0, 1], &[2, 3]);
impl_rad_tan_model!(FullOpenCvModel, CameraModelId::FullOpenCv, 12, &[0, 1], &[2, 3]);
