//! Shared machinery for perspective models with a distortion function.
//!
//! A perspective model maps a point to normalized coordinates `(x/z, y/z)`,
//! distorts them, and applies the focal lengths and principal point. Models
//! only supply the distortion and its 2x2 Jacobian through [`Distortion`];
//! projection, the chain-ruled point Jacobian and the Newton inverse live
//! here.

use crate::camera::Intrinsics;
use nalgebra::{Matrix2, Matrix2x3, Vector2, Vector3};

/// Iteration cap of the Newton undistortion.
pub const UNDISTORT_MAX_ITERATIONS: usize = 100;
/// Residual and step tolerance of the Newton undistortion, in normalized units.
pub const UNDISTORT_TOLERANCE: f64 = 1e-13;

/// Distortion of normalized image coordinates.
pub trait Distortion {
    fn distort(&self, xn: &Vector2<f64>) -> Vector2<f64> {
        self.distort_with_jac(xn).0
    }

    /// Distorted coordinates and the Jacobian `d(distorted)/d(normalized)`.
    fn distort_with_jac(&self, xn: &Vector2<f64>) -> (Vector2<f64>, Matrix2<f64>);

    /// Inverts the distortion with Newton's method, starting from the
    /// distorted point. Stops early on a singular Jacobian and returns the
    /// last iterate.
    fn undistort(&self, xd: &Vector2<f64>) -> Vector2<f64> {
        let mut point = *xd;
        for _ in 0..UNDISTORT_MAX_ITERATIONS {
            let (estimate, jacobian) = self.distort_with_jac(&point);
            let error = estimate - xd;
            if error.norm() < UNDISTORT_TOLERANCE {
                break;
            }
            let Some(inv_jacobian) = jacobian.try_inverse() else {
                break;
            };
            let delta = inv_jacobian * error;
            point -= delta;
            if delta.norm() < UNDISTORT_TOLERANCE {
                break;
            }
        }
        point
    }
}

impl Intrinsics {
    /// `[f, cx, cy, ...]` parameter layout.
    pub(crate) fn from_single_focal(params: &[f64]) -> Self {
        Intrinsics {
            fx: params[0],
            fy: params[0],
            cx: params[1],
            cy: params[2],
        }
    }

    /// `[fx, fy, cx, cy, ...]` parameter layout.
    pub(crate) fn from_focal_pair(params: &[f64]) -> Self {
        Intrinsics {
            fx: params[0],
            fy: params[1],
            cx: params[2],
            cy: params[3],
        }
    }

    pub(crate) fn to_pixel(&self, xd: &Vector2<f64>) -> Vector2<f64> {
        Vector2::new(self.fx * xd.x + self.cx, self.fy * xd.y + self.cy)
    }

    pub(crate) fn from_pixel(&self, xp: &Vector2<f64>) -> Vector2<f64> {
        Vector2::new((xp.x - self.cx) / self.fx, (xp.y - self.cy) / self.fy)
    }

    pub(crate) fn focal_matrix(&self) -> Matrix2<f64> {
        Matrix2::new(self.fx, 0.0, 0.0, self.fy)
    }
}

/// Jacobian of `(x/z, y/z)` with respect to `(x, y, z)`.
pub(crate) fn normalize_jacobian(point_3d: &Vector3<f64>) -> Matrix2x3<f64> {
    let z_inv = 1.0 / point_3d.z;
    let xn = point_3d.x * z_inv;
    let yn = point_3d.y * z_inv;
    Matrix2x3::new(z_inv, 0.0, -xn * z_inv, 0.0, z_inv, -yn * z_inv)
}

pub(crate) fn project_distorted<D: Distortion>(
    intrinsics: &Intrinsics,
    distortion: &D,
    point_3d: &Vector3<f64>,
) -> Vector2<f64> {
    let xn = Vector2::new(point_3d.x / point_3d.z, point_3d.y / point_3d.z);
    intrinsics.to_pixel(&distortion.distort(&xn))
}

pub(crate) fn project_distorted_with_jac<D: Distortion>(
    intrinsics: &Intrinsics,
    distortion: &D,
    point_3d: &Vector3<f64>,
) -> (Vector2<f64>, Matrix2x3<f64>) {
    let xn = Vector2::new(point_3d.x / point_3d.z, point_3d.y / point_3d.z);
    let (xd, jac_distortion) = distortion.distort_with_jac(&xn);
    let jac = intrinsics.focal_matrix() * jac_distortion * normalize_jacobian(point_3d);
    (intrinsics.to_pixel(&xd), jac)
}

pub(crate) fn unproject_distorted<D: Distortion>(
    intrinsics: &Intrinsics,
    distortion: &D,
    point_2d: &Vector2<f64>,
) -> Vector3<f64> {
    let xn = distortion.undistort(&intrinsics.from_pixel(point_2d));
    Vector3::new(xn.x, xn.y, 1.0)
}
