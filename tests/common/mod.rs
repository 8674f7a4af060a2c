#![allow(dead_code)]

use camera_refine::camera::Camera;
use camera_refine::geometry::{sample_points, CameraPose};
use camera_refine::optimization::{Accumulator, Refiner};
use nalgebra::{DMatrix, DVector, SMatrix, SVector, UnitQuaternion, Vector2, Vector3};

/// Camera records in text form; the leading id equals the index.
pub const EXAMPLE_CAMERAS: [&str; 10] = [
    "0 SIMPLE_RADIAL 1936 1296 2425.85 932.383 628.265 -0.0397695",
    "1 PINHOLE 6214 4138 3425.62 3426.29 3118.41 2069.07",
    "2 SIMPLE_PINHOLE 640 480 500 320.5 240.5",
    "3 RADIAL 1920 1080 1600 960 540 -0.05 0.01",
    "4 OPENCV 752 480 461.629 460.152 362.68 246.049 -0.28340811 0.07395907 0.00019359 0.0000176187114",
    "5 OPENCV_FISHEYE 1280 720 600 600 640 360 0.05 -0.01 0.002 -0.0005",
    "6 FULL_OPENCV 1280 960 800 805 640.5 480.5 -0.1 0.02 0.001 -0.0005 0.001 0.05 0.01 0.002",
    "7 FOV 1024 768 400 400 512 384 0.8",
    "8 SIMPLE_RADIAL_FISHEYE 1024 768 500 512 384 0.02",
    "9 RADIAL_FISHEYE 1024 768 500 512 384 0.02 -0.005",
];

pub const RADIAL_1D_CAMERA: &str = "0 1D_RADIAL 1920 1080 1920 1080";

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn example_cameras() -> Vec<Camera> {
    EXAMPLE_CAMERAS
        .iter()
        .map(|txt| txt.parse().unwrap())
        .collect()
}

/// Grid pixels inside `[lo·w, hi·w] x [lo·h, hi·h]`.
pub fn sample_pixels(camera: &Camera, n: usize, lo: f64, hi: f64) -> Vec<Vector2<f64>> {
    let width = camera.width() as f64;
    let height = camera.height() as f64;
    sample_points((hi - lo) * width, (hi - lo) * height, n)
        .into_iter()
        .map(|xp| xp + Vector2::new(lo * width, lo * height))
        .collect()
}

pub fn ground_truth_pose() -> CameraPose {
    CameraPose::new(
        UnitQuaternion::from_euler_angles(0.3, -0.2, 0.8),
        Vector3::new(0.4, -0.2, 1.5),
    )
}

pub fn perturb(pose: &CameraPose, angle: f64, offset: f64) -> CameraPose {
    CameraPose::new(
        UnitQuaternion::from_scaled_axis(Vector3::new(angle, -0.5 * angle, 0.7 * angle)) * pose.q,
        pose.t + Vector3::new(offset, -offset, 0.5 * offset),
    )
}

/// Exact 2D-3D correspondences for `camera` at `pose`, with depths between
/// 2 and 5 along the rays of a pixel grid.
pub fn setup_scene(
    camera: &Camera,
    pose: &CameraPose,
    n: usize,
) -> (Vec<Vector2<f64>>, Vec<Vector3<f64>>) {
    let world_from_camera = pose.inverse();
    let mut points2d = Vec::new();
    let mut points3d = Vec::new();
    for (i, xp) in sample_pixels(camera, n, 0.1, 0.9).iter().enumerate() {
        let ray = camera.unproject(xp);
        let depth = 2.0 + (i % 7) as f64 * 0.5;
        let x_cam = ray * (depth / ray.z);
        points2d.push(camera.project(&x_cam));
        points3d.push(world_from_camera.apply(&x_cam));
    }
    (points2d, points3d)
}

pub fn rotation_error(a: &CameraPose, b: &CameraPose) -> f64 {
    (a.q.to_rotation_matrix().matrix() - b.q.to_rotation_matrix().matrix()).norm()
}

pub fn translation_error(a: &CameraPose, b: &CameraPose) -> f64 {
    (a.t - b.t).norm()
}

/// Records every residual block and Jacobian instead of reducing them.
#[derive(Default)]
pub struct TestAccumulator {
    pub cost: f64,
    pub residuals: Vec<DVector<f64>>,
    pub jacobians: Vec<DMatrix<f64>>,
    pub weights: Vec<f64>,
}

impl<const N: usize> Accumulator<N> for TestAccumulator {
    fn reset_residual(&mut self) {
        self.cost = 0.0;
    }

    fn add_residual<const R: usize>(&mut self, residual: &SVector<f64, R>, weight: f64) {
        self.cost += weight * residual.norm_squared();
    }

    fn residual(&self) -> f64 {
        self.cost
    }

    fn reset_jacobian(&mut self) {
        self.cost = 0.0;
        self.residuals.clear();
        self.jacobians.clear();
        self.weights.clear();
    }

    fn add_jacobian<const R: usize>(
        &mut self,
        residual: &SVector<f64, R>,
        jacobian: &SMatrix<f64, R, N>,
        weight: f64,
    ) {
        self.cost += weight * residual.norm_squared();
        self.residuals
            .push(DVector::from_column_slice(residual.as_slice()));
        self.jacobians
            .push(DMatrix::from_column_slice(R, N, jacobian.as_slice()));
        self.weights.push(weight);
    }
}

/// Largest relative difference between the Jacobians pushed by `refiner` at
/// `model` and central differences of its residuals through `step`.
///
/// Residuals are `observed − predicted` while the Jacobians are those of the
/// prediction, hence the sign flip.
pub fn verify_jacobian<const N: usize, R: Refiner<N>>(
    refiner: &R,
    model: &R::Model,
    delta: f64,
) -> f64 {
    let mut acc = TestAccumulator::default();
    Accumulator::<N>::reset_jacobian(&mut acc);
    refiner.compute_jacobian(&mut acc, model);
    assert!(!acc.residuals.is_empty());

    let mut numeric: Vec<DMatrix<f64>> = acc
        .jacobians
        .iter()
        .map(|j| DMatrix::zeros(j.nrows(), N))
        .collect();

    for i in 0..N {
        let mut dp = SVector::<f64, N>::zeros();
        dp[i] = delta;

        let mut forward = TestAccumulator::default();
        let mut backward = TestAccumulator::default();
        refiner.compute_jacobian(&mut forward, &refiner.step(&dp, model));
        refiner.compute_jacobian(&mut backward, &refiner.step(&(-dp), model));
        assert_eq!(forward.residuals.len(), acc.residuals.len());
        assert_eq!(backward.residuals.len(), acc.residuals.len());

        for (k, jac) in numeric.iter_mut().enumerate() {
            let column = -(&forward.residuals[k] - &backward.residuals[k]) / (2.0 * delta);
            jac.set_column(i, &column);
        }
    }

    acc.jacobians
        .iter()
        .zip(&numeric)
        .map(|(analytic, numeric)| (analytic - numeric).norm() / analytic.norm().max(1e-12))
        .fold(0.0, f64::max)
}
