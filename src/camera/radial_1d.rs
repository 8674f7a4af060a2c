//! Implements the 1D radial camera model.
//!
//! The model only constrains the radial direction of a point around the
//! principal point, so its parameters are just `[cx, cy]`. Projection returns
//! the principal point offset by the unit direction of `(x, y)`; depth and
//! distance from the axis are lost. Unprojection returns a ray in the `z = 0`
//! plane pointing along that direction.

use crate::camera::{CameraModel, CameraModelId};
use nalgebra::{Matrix2, Matrix2x3, Vector2, Vector3};

const MIN_NORM: f64 = 1e-12;

/// `[cx, cy]`
#[derive(Debug, Clone, Copy)]
pub struct Radial1DModel;

impl CameraModel for Radial1DModel {
    const ID: CameraModelId = CameraModelId::Radial1D;
    const NUM_PARAMS: usize = 2;
    const FOCAL_IDX: &'static [usize] = &[];
    const PRINCIPAL_POINT_IDX: &'static [usize] = &[0, 1];

    fn project(params: &[f64], point_3d: &Vector3<f64>) -> Vector2<f64> {
        Self::project_with_jac(params, point_3d).0
    }

    fn project_with_jac(params: &[f64], point_3d: &Vector3<f64>) -> (Vector2<f64>, Matrix2x3<f64>) {
        let principal_point = Vector2::new(params[0], params[1]);
        let v = point_3d.xy();
        let norm = v.norm();
        if norm < MIN_NORM {
            return (principal_point, Matrix2x3::zeros());
        }

        let direction = v / norm;
        let jac_xy = (Matrix2::identity() - direction * direction.transpose()) / norm;
        let mut jac = Matrix2x3::zeros();
        jac.fixed_view_mut::<2, 2>(0, 0).copy_from(&jac_xy);
        (principal_point + direction, jac)
    }

    fn unproject(params: &[f64], point_2d: &Vector2<f64>) -> Vector3<f64> {
        let offset = Vector3::new(point_2d.x - params[0], point_2d.y - params[1], 0.0);
        let norm = offset.norm();
        if norm == 0.0 {
            return Vector3::zeros();
        }
        offset / norm
    }
}
