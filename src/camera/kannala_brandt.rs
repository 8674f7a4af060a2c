//! Implements the equidistant fisheye (Kannala-Brandt) camera models.
//!
//! The models work on the angle between the incoming ray and the optical
//! axis, so they stay well defined for fields of view beyond what a
//! perspective division can represent:
//!
//! ```text
//! ρ  = sqrt(x² + y²)
//! θ  = atan2(ρ, z)
//! θd = θ (1 + k1·θ² + k2·θ⁴ + k3·θ⁶ + k4·θ⁸)
//! u  = fx · θd · x / ρ + cx
//! v  = fy · θd · y / ρ + cy
//! ```
//!
//! `OPENCV_FISHEYE` uses all four coefficients, `RADIAL_FISHEYE` the first
//! two and `SIMPLE_RADIAL_FISHEYE` only `k1`.
//!
//! Unprojection solves the scalar polynomial for `θ` with Newton's method and
//! returns the ray `(x_d·tanθ/θd, y_d·tanθ/θd, 1)`, which is only meaningful
//! for `θ < π/2`.

use crate::camera::distortion::{UNDISTORT_MAX_ITERATIONS, UNDISTORT_TOLERANCE};
use crate::camera::{CameraModel, CameraModelId, Intrinsics};
use nalgebra::{Matrix2x3, Vector2, Vector3};

/// Below this radius the projection uses its first-order expansion around
/// the optical axis.
const MIN_RADIUS: f64 = 1e-10;

/// `[fx, fy, cx, cy, k1, k2, k3, k4]`
#[derive(Debug, Clone, Copy)]
pub struct OpenCvFisheyeModel;

/// `[f, cx, cy, k]`
#[derive(Debug, Clone, Copy)]
pub struct SimpleRadialFisheyeModel;

/// `[f, cx, cy, k1, k2]`
#[derive(Debug, Clone, Copy)]
pub struct RadialFisheyeModel;

/// Returns `θd` and `dθd/dθ` for the odd polynomial
/// `θ + k1·θ³ + k2·θ⁵ + ...`.
fn distort_theta(coefficients: &[f64], theta: f64) -> (f64, f64) {
    let theta2 = theta * theta;
    let mut theta_pow = 1.0; // θ^(2i)
    let mut theta_d = theta;
    let mut d_theta_d = 1.0;
    for (i, k) in coefficients.iter().enumerate() {
        theta_pow *= theta2;
        theta_d += k * theta_pow * theta;
        d_theta_d += k * (2 * i + 3) as f64 * theta_pow;
    }
    (theta_d, d_theta_d)
}

/// Newton solve of `distort_theta(θ) = θd`, starting from `θ = θd`.
fn undistort_theta(coefficients: &[f64], theta_d: f64) -> f64 {
    let mut theta = theta_d;
    for _ in 0..UNDISTORT_MAX_ITERATIONS {
        let (estimate, derivative) = distort_theta(coefficients, theta);
        let error = estimate - theta_d;
        if error.abs() < UNDISTORT_TOLERANCE || derivative == 0.0 {
            break;
        }
        let delta = error / derivative;
        theta -= delta;
        if delta.abs() < UNDISTORT_TOLERANCE {
            break;
        }
    }
    theta
}

fn project(intrinsics: &Intrinsics, coefficients: &[f64], point_3d: &Vector3<f64>) -> Vector2<f64> {
    let rho = point_3d.x.hypot(point_3d.y);
    if rho < MIN_RADIUS {
        let xn = Vector2::new(point_3d.x / point_3d.z, point_3d.y / point_3d.z);
        return intrinsics.to_pixel(&xn);
    }
    let theta = rho.atan2(point_3d.z);
    let (theta_d, _) = distort_theta(coefficients, theta);
    let scale = theta_d / rho;
    intrinsics.to_pixel(&Vector2::new(point_3d.x * scale, point_3d.y * scale))
}

fn project_with_jac(
    intrinsics: &Intrinsics,
    coefficients: &[f64],
    point_3d: &Vector3<f64>,
) -> (Vector2<f64>, Matrix2x3<f64>) {
    let (x, y, z) = (point_3d.x, point_3d.y, point_3d.z);
    let rho = x.hypot(y);

    if rho < MIN_RADIUS {
        let z_inv = 1.0 / z;
        let xn = Vector2::new(x * z_inv, y * z_inv);
        let jac = Matrix2x3::new(z_inv, 0.0, -xn.x * z_inv, 0.0, z_inv, -xn.y * z_inv);
        return (intrinsics.to_pixel(&xn), intrinsics.focal_matrix() * jac);
    }

    let theta = rho.atan2(z);
    let (theta_d, d_theta_d) = distort_theta(coefficients, theta);
    let scale = theta_d / rho;

    let r2 = rho * rho + z * z;
    let d_theta = Vector3::new(z * x / (rho * r2), z * y / (rho * r2), -rho / r2);
    let d_rho = Vector3::new(x / rho, y / rho, 0.0);
    // d(θd/ρ)/d(x, y, z)
    let d_scale = (d_theta * (d_theta_d * rho) - d_rho * theta_d) / (rho * rho);

    let jac = Matrix2x3::new(scale, 0.0, 0.0, 0.0, scale, 0.0)
        + Vector2::new(x, y) * d_scale.transpose();

    let xd = Vector2::new(x * scale, y * scale);
    (intrinsics.to_pixel(&xd), intrinsics.focal_matrix() * jac)
}

fn unproject(
    intrinsics: &Intrinsics,
    coefficients: &[f64],
    point_2d: &Vector2<f64>,
) -> Vector3<f64> {
    let xd = intrinsics.from_pixel(point_2d);
    let theta_d = xd.norm();
    if theta_d < MIN_RADIUS {
        return Vector3::new(xd.x, xd.y, 1.0);
    }
    let theta = undistort_theta(coefficients, theta_d);
    let scale = theta.tan() / theta_d;
    Vector3::new(xd.x * scale, xd.y * scale, 1.0)
}

impl CameraModel for OpenCvFisheyeModel {
    const ID: CameraModelId = CameraModelId::OpenCvFisheye;
    const NUM_PARAMS: usize = 8;
    const FOCAL_IDX: &'static [usize] = &[0, 1];
    const PRINCIPAL_POINT_IDX: &'static [usize] = &[2, 3];

    fn project(params: &[f64], point_3d: &Vector3<f64>) -> Vector2<f64> {
        project(&Intrinsics::from_focal_pair(params), &params[4..8], point_3d)
    }

    fn project_with_jac(params: &[f64], point_3d: &Vector3<f64>) -> (Vector2<f64>, Matrix2x3<f64>) {
        project_with_jac(&Intrinsics::from_focal_pair(params), &params[4..8], point_3d)
    }

    fn unproject(params: &[f64], point_2d: &Vector2<f64>) -> Vector3<f64> {
        unproject(&Intrinsics::from_focal_pair(params), &params[4..8], point_2d)
    }
}

impl CameraModel for SimpleRadialFisheyeModel {
    const ID: CameraModelId = CameraModelId::SimpleRadialFisheye;
    const NUM_PARAMS: usize = 4;
    const FOCAL_IDX: &'static [usize] = &[0];
    const PRINCIPAL_POINT_IDX: &'static [usize] = &[1, 2];

    fn project(params: &[f64], point_3d: &Vector3<f64>) -> Vector2<f64> {
        project(&Intrinsics::from_single_focal(params), &params[3..4], point_3d)
    }

    fn project_with_jac(params: &[f64], point_3d: &Vector3<f64>) -> (Vector2<f64>, Matrix2x3<f64>) {
        project_with_jac(&Intrinsics::from_single_focal(params), &params[3..4], point_3d)
    }

    fn unproject(params: &[f64], point_2d: &Vector2<f64>) -> Vector3<f64> {
        unproject(&Intrinsics::from_single_focal(params), &params[3..4], point_2d)
    }
}

impl CameraModel for RadialFisheyeModel {
    const ID: CameraModelId = CameraModelId::RadialFisheye;
    const NUM_PARAMS: usize = 5;
    const FOCAL_IDX: &'static [usize] = &[0];
    const PRINCIPAL_POINT_IDX: &'static [usize] = &[1, 2];

    fn project(params: &[f64], point_3d: &Vector3<f64>) -> Vector2<f64> {
        project(&Intrinsics::from_single_focal(params), &params[3..5], point_3d)
    }

    fn project_with_jac(params: &[f64], point_3d: &Vector3<f64>) -> (Vector2<f64>, Matrix2x3<f64>) {
        project_with_jac(&Intrinsics::from_single_focal(params), &params[3..5], point_3d)
    }

    fn unproject(params: &[f64], point_2d: &Vector2<f64>) -> Vector3<f64> {
        unproject(&Intrinsics::from_single_focal(params), &params[3..5], point_2d)
    }
}
