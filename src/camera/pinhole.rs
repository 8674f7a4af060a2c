//! Implements the pinhole camera models.
//!
//! [`SimplePinholeModel`] shares one focal length between both axes
//! (`[f, cx, cy]`); [`PinholeModel`] has one per axis (`[fx, fy, cx, cy]`).
//! Neither model has lens distortion:
//!
//! `u = fx * X / Z + cx`, `v = fy * Y / Z + cy`

use crate::camera::distortion::normalize_jacobian;
use crate::camera::{CameraModel, CameraModelId, Intrinsics};
use nalgebra::{Matrix2x3, Vector2, Vector3};

/// Pinhole model with a single focal length: `[f, cx, cy]`.
#[derive(Debug, Clone, Copy)]
pub struct SimplePinholeModel;

/// Pinhole model with per-axis focal lengths: `[fx, fy, cx, cy]`.
#[derive(Debug, Clone, Copy)]
pub struct PinholeModel;

fn project(intrinsics: &Intrinsics, point_3d: &Vector3<f64>) -> Vector2<f64> {
    let xn = Vector2::new(point_3d.x / point_3d.z, point_3d.y / point_3d.z);
    intrinsics.to_pixel(&xn)
}

fn project_with_jac(
    intrinsics: &Intrinsics,
    point_3d: &Vector3<f64>,
) -> (Vector2<f64>, Matrix2x3<f64>) {
    let jac = intrinsics.focal_matrix() * normalize_jacobian(point_3d);
    (project(intrinsics, point_3d), jac)
}

fn unproject(intrinsics: &Intrinsics, point_2d: &Vector2<f64>) -> Vector3<f64> {
    let xn = intrinsics.from_pixel(point_2d);
    Vector3::new(xn.x, xn.y, 1.0)
}

impl CameraModel for SimplePinholeModel {
    const ID: CameraModelId = CameraModelId::SimplePinhole;
    const NUM_PARAMS: usize = 3;
    const FOCAL_IDX: &'static [usize] = &[0];
    const PRINCIPAL_POINT_IDX: &'static [usize] = &[1, 2];

    fn project(params: &[f64], point_3d: &Vector3<f64>) -> Vector2<f64> {
        project(&Intrinsics::from_single_focal(params), point_3d)
    }

    fn project_with_jac(params: &[f64], point_3d: &Vector3<f64>) -> (Vector2<f64>, Matrix2x3<f64>) {
        project_with_jac(&Intrinsics::from_single_focal(params), point_3d)
    }

    fn unproject(params: &[f64], point_2d: &Vector2<f64>) -> Vector3<f64> {
        unproject(&Intrinsics::from_single_focal(params), point_2d)
    }
}

impl CameraModel for PinholeModel {
    const ID: CameraModelId = CameraModelId::Pinhole;
    const NUM_PARAMS: usize = 4;
    const FOCAL_IDX: &'static [usize] = &[0, 1];
    const PRINCIPAL_POINT_IDX: &'static [usize] = &[2, 3];

    fn project(params: &[f64], point_3d: &Vector3<f64>) -> Vector2<f64> {
        project(&Intrinsics::from_focal_pair(params), point_3d)
    }

    fn project_with_jac(params: &[f64], point_3d: &Vector3<f64>) -> (Vector2<f64>, Matrix2x3<f64>) {
        project_with_jac(&Intrinsics::from_focal_pair(params), point_3d)
    }

    fn unproject(params: &[f64], point_2d: &Vector2<f64>) -> Vector3<f64> {
        unproject(&Intrinsics::from_focal_pair(params), point_2d)
    }
}
