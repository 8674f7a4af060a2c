mod common;

use camera_refine::camera::Camera;
use camera_refine::geometry::CameraPose;
use camera_refine::optimization::lm::levenberg_marquardt;
use camera_refine::optimization::{
    refine_absolute_pose, refine_absolute_pose_weighted, refine_generalized_absolute_pose,
    AbsolutePoseRefiner, Accumulator, BundleOptions, BundleStats, FailureReason,
    GeneralizedAbsolutePoseRefiner, LossType, OptimizationError, OptimizerState, ProjectionError,
    Refiner,
};
use common::{
    example_cameras, ground_truth_pose, init_logger, perturb, rotation_error, setup_scene,
    translation_error, verify_jacobian,
};
use nalgebra::{SMatrix, SVector, UnitQuaternion, Vector2, Vector3};

fn rig() -> (Vec<Camera>, Vec<CameraPose>) {
    let cameras = example_cameras();
    let cameras = vec![cameras[2].clone(), cameras[5].clone(), cameras[4].clone()];
    let rig_to_camera = vec![
        CameraPose::identity(),
        CameraPose::new(
            UnitQuaternion::from_euler_angles(0.0, 0.4, 0.0),
            Vector3::new(-0.3, 0.0, 0.05),
        ),
        CameraPose::new(
            UnitQuaternion::from_euler_angles(0.1, -0.3, 0.05),
            Vector3::new(0.25, 0.02, -0.1),
        ),
    ];
    (cameras, rig_to_camera)
}

fn rig_scene(
    cameras: &[Camera],
    rig_to_camera: &[CameraPose],
    pose: &CameraPose,
) -> (Vec<Vec<Vector2<f64>>>, Vec<Vec<Vector3<f64>>>) {
    cameras
        .iter()
        .zip(rig_to_camera)
        .map(|(camera, rig)| setup_scene(camera, &rig.compose(pose), 30))
        .unzip()
}

#[test]
fn test_absolute_pose_jacobian() {
    let pose = perturb(&ground_truth_pose(), 0.02, 0.05);
    for camera in example_cameras() {
        let (points2d, points3d) = setup_scene(&camera, &ground_truth_pose(), 20);
        let refiner = AbsolutePoseRefiner::new(&points2d, &points3d, &camera);
        let err = verify_jacobian(&refiner, &pose, 1e-6);
        assert!(err < 1e-5, "{}: relative error {}", camera.model_name(), err);
    }
}

#[test]
fn test_generalized_absolute_pose_jacobian() {
    let (cameras, rig_to_camera) = rig();
    let (points2d, points3d) = rig_scene(&cameras, &rig_to_camera, &ground_truth_pose());
    let refiner =
        GeneralizedAbsolutePoseRefiner::new(&points2d, &points3d, &rig_to_camera, &cameras);
    let pose = perturb(&ground_truth_pose(), -0.01, 0.03);
    let err = verify_jacobian(&refiner, &pose, 1e-6);
    assert!(err < 1e-5, "relative error {}", err);
}

#[test]
fn test_points_behind_camera_are_skipped() {
    let camera = example_cameras()[2].clone();
    let pose = CameraPose::identity();
    let points2d = vec![Vector2::new(320.5, 240.5), Vector2::new(100.0, 100.0)];
    let points3d = vec![Vector3::new(0.0, 0.0, 2.0), Vector3::new(0.1, 0.1, -2.0)];

    let refiner = AbsolutePoseRefiner::new(&points2d, &points3d, &camera);
    let mut acc = common::TestAccumulator::default();
    Accumulator::<6>::reset_jacobian(&mut acc);
    refiner.compute_jacobian(&mut acc, &pose);
    assert_eq!(acc.residuals.len(), 1);

    Accumulator::<6>::reset_residual(&mut acc);
    refiner.compute_residual(&mut acc, &pose);
    assert!(Accumulator::<6>::residual(&acc) < 1e-20);
}

#[test]
fn test_refine_absolute_pose() {
    init_logger();
    let truth = ground_truth_pose();
    for camera in example_cameras() {
        let (points2d, points3d) = setup_scene(&camera, &truth, 50);
        let mut pose = perturb(&truth, 0.02, 0.05);

        let stats = refine_absolute_pose(
            &points2d,
            &points3d,
            &camera,
            &mut pose,
            &BundleOptions::default(),
            None,
        )
        .unwrap();

        assert!(stats.is_converged(), "{}: {:?}", camera.model_name(), stats);
        assert!(stats.cost < stats.initial_cost);
        assert!(rotation_error(&pose, &truth) < 1e-6, "{}", camera.model_name());
        assert!(translation_error(&pose, &truth) < 1e-6, "{}", camera.model_name());

        let error = ProjectionError::compute(&camera, &pose, &points2d, &points3d).unwrap();
        assert!(error.max < 1e-4, "{}: {:?}", camera.model_name(), error);
    }
}

#[test]
fn test_refine_reports_progress() {
    let truth = ground_truth_pose();
    let camera = example_cameras()[4].clone();
    let (points2d, points3d) = setup_scene(&camera, &truth, 50);
    let mut pose = perturb(&truth, 0.05, 0.1);
    let options = BundleOptions {
        verbose: true,
        ..Default::default()
    };

    let mut history: Vec<BundleStats> = Vec::new();
    let mut record = |stats: &BundleStats| history.push(stats.clone());
    let stats = refine_absolute_pose(
        &points2d,
        &points3d,
        &camera,
        &mut pose,
        &options,
        Some(&mut record),
    )
    .unwrap();

    assert!(stats.is_converged());
    assert!(!history.is_empty());
    assert_eq!(history.len(), stats.iterations);

    let mut previous_cost = stats.initial_cost;
    for (i, snapshot) in history.iter().enumerate() {
        assert_eq!(snapshot.iterations, i + 1);
        assert!(snapshot.cost < previous_cost);
        assert_eq!(snapshot.state, OptimizerState::Running);
        previous_cost = snapshot.cost;
    }
    assert_eq!(previous_cost, stats.cost);
}

#[test]
fn test_robust_loss_rejects_outliers() {
    let truth = ground_truth_pose();
    let camera = example_cameras()[2].clone();
    let (mut points2d, points3d) = setup_scene(&camera, &truth, 60);
    for xp in points2d.iter_mut().step_by(10) {
        *xp += Vector2::new(50.0, -40.0);
    }
    let start = perturb(&truth, 0.005, 0.01);

    let run = |loss_type: LossType, loss_scale: f64| {
        let mut pose = start;
        let options = BundleOptions {
            loss_type,
            loss_scale,
            ..Default::default()
        };
        let stats =
            refine_absolute_pose(&points2d, &points3d, &camera, &mut pose, &options, None).unwrap();
        assert!(!stats.is_failed(), "{:?}: {:?}", loss_type, stats);
        pose
    };

    let truncated = run(LossType::Truncated, 10.0);
    assert!(rotation_error(&truncated, &truth) < 1e-6);
    assert!(translation_error(&truncated, &truth) < 1e-6);

    let trivial = run(LossType::Trivial, 1.0);
    for loss_type in [LossType::Huber, LossType::Cauchy] {
        let robust = run(loss_type, 2.0);
        assert!(
            translation_error(&robust, &truth) < translation_error(&trivial, &truth),
            "{:?}",
            loss_type
        );
    }
}

#[test]
fn test_zero_weights_ignore_outliers() {
    let truth = ground_truth_pose();
    let camera = example_cameras()[5].clone();
    let (mut points2d, points3d) = setup_scene(&camera, &truth, 40);
    let mut weights = vec![1.0; points2d.len()];
    for i in (0..points2d.len()).step_by(7) {
        points2d[i] += Vector2::new(-30.0, 25.0);
        weights[i] = 0.0;
    }

    let mut pose = perturb(&truth, 0.02, 0.05);
    let stats = refine_absolute_pose_weighted(
        &points2d,
        &points3d,
        &weights,
        &camera,
        &mut pose,
        &BundleOptions::default(),
        None,
    )
    .unwrap();
    assert!(stats.is_converged(), "{:?}", stats);
    assert!(rotation_error(&pose, &truth) < 1e-6);
    assert!(translation_error(&pose, &truth) < 1e-6);
}

#[test]
fn test_refine_generalized_absolute_pose() {
    init_logger();
    let truth = ground_truth_pose();
    let (cameras, rig_to_camera) = rig();
    let (points2d, points3d) = rig_scene(&cameras, &rig_to_camera, &truth);

    let mut pose = perturb(&truth, 0.03, -0.05);
    let stats = refine_generalized_absolute_pose(
        &points2d,
        &points3d,
        &rig_to_camera,
        &cameras,
        &mut pose,
        &BundleOptions::default(),
        None,
    )
    .unwrap();

    assert!(stats.is_converged(), "{:?}", stats);
    assert!(rotation_error(&pose, &truth) < 1e-6);
    assert!(translation_error(&pose, &truth) < 1e-6);
}

#[test]
fn test_invalid_input() {
    let camera = example_cameras()[2].clone();
    let (points2d, points3d) = setup_scene(&camera, &ground_truth_pose(), 10);
    let mut pose = ground_truth_pose();
    let options = BundleOptions::default();

    let result =
        refine_absolute_pose(&points2d[1..], &points3d, &camera, &mut pose, &options, None);
    assert!(matches!(result, Err(OptimizationError::InvalidInput(_))));

    let result = refine_absolute_pose(&[], &[], &camera, &mut pose, &options, None);
    assert!(matches!(result, Err(OptimizationError::InvalidInput(_))));

    let mut weights = vec![1.0; points2d.len()];
    weights[3] = -1.0;
    let result = refine_absolute_pose_weighted(
        &points2d, &points3d, &weights, &camera, &mut pose, &options, None,
    );
    assert!(matches!(result, Err(OptimizationError::InvalidInput(_))));

    let (cameras, rig_to_camera) = rig();
    let result = refine_generalized_absolute_pose(
        &[points2d.clone()],
        &[points3d.clone()],
        &rig_to_camera,
        &cameras,
        &mut pose,
        &options,
        None,
    );
    assert!(matches!(result, Err(OptimizationError::InvalidInput(_))));

    assert_eq!(pose, ground_truth_pose());
}

#[test]
fn test_invalid_options_are_rejected() {
    let camera = example_cameras()[2].clone();
    let (points2d, points3d) = setup_scene(&camera, &ground_truth_pose(), 10);
    let weights = vec![1.0; points2d.len()];
    let mut pose = perturb(&ground_truth_pose(), 0.02, 0.05);
    let start = pose;

    let invalid = [
        BundleOptions {
            loss_type: LossType::Cauchy,
            loss_scale: 0.0,
            ..Default::default()
        },
        BundleOptions {
            initial_lambda: 0.0,
            ..Default::default()
        },
        BundleOptions {
            min_lambda: 1.0,
            max_lambda: 0.1,
            ..Default::default()
        },
    ];
    for options in &invalid {
        let result =
            refine_absolute_pose(&points2d, &points3d, &camera, &mut pose, options, None);
        assert!(matches!(result, Err(OptimizationError::InvalidInput(_))), "{:?}", options);

        let result = refine_absolute_pose_weighted(
            &points2d, &points3d, &weights, &camera, &mut pose, options, None,
        );
        assert!(matches!(result, Err(OptimizationError::InvalidInput(_))), "{:?}", options);

        let result = refine_generalized_absolute_pose(
            &[points2d.clone()],
            &[points3d.clone()],
            &[CameraPose::identity()],
            &[camera.clone()],
            &mut pose,
            options,
            None,
        );
        assert!(matches!(result, Err(OptimizationError::InvalidInput(_))), "{:?}", options);
    }
    assert_eq!(pose, start);
}

#[test]
fn test_max_iterations_reached() {
    let truth = ground_truth_pose();
    let camera = example_cameras()[0].clone();
    let (points2d, points3d) = setup_scene(&camera, &truth, 50);
    let mut pose = perturb(&truth, 0.02, 0.05);
    let options = BundleOptions {
        max_iterations: 1,
        ..Default::default()
    };

    let stats =
        refine_absolute_pose(&points2d, &points3d, &camera, &mut pose, &options, None).unwrap();
    assert_eq!(stats.state, OptimizerState::MaxIterationsReached);
    assert!(!stats.is_converged());
    assert_eq!(stats.iterations, 1);
    assert!(stats.cost < stats.initial_cost);
}

/// Absolute pose problem whose Jacobian points the wrong way, so every
/// proposed step increases the cost.
struct FlippedJacobian<'a>(AbsolutePoseRefiner<'a>);

struct Negated<'a, A>(&'a mut A);

impl<const N: usize, A: Accumulator<N>> Accumulator<N> for Negated<'_, A> {
    fn reset_residual(&mut self) {
        self.0.reset_residual();
    }

    fn add_residual<const R: usize>(&mut self, residual: &SVector<f64, R>, weight: f64) {
        self.0.add_residual(residual, weight);
    }

    fn residual(&self) -> f64 {
        self.0.residual()
    }

    fn reset_jacobian(&mut self) {
        self.0.reset_jacobian();
    }

    fn add_jacobian<const R: usize>(
        &mut self,
        residual: &SVector<f64, R>,
        jacobian: &SMatrix<f64, R, N>,
        weight: f64,
    ) {
        self.0.add_jacobian(residual, &(-jacobian), weight);
    }
}

impl Refiner<6> for FlippedJacobian<'_> {
    type Model = CameraPose;

    fn compute_residual<A: Accumulator<6>>(&self, accumulator: &mut A, pose: &CameraPose) {
        self.0.compute_residual(accumulator, pose);
    }

    fn compute_jacobian<A: Accumulator<6>>(&self, accumulator: &mut A, pose: &CameraPose) {
        self.0.compute_jacobian(&mut Negated(accumulator), pose);
    }

    fn step(&self, delta: &SVector<f64, 6>, pose: &CameraPose) -> CameraPose {
        self.0.step(delta, pose)
    }
}

#[test]
fn test_failure_keeps_initial_pose() {
    let truth = ground_truth_pose();
    let camera = example_cameras()[2].clone();
    let (points2d, points3d) = setup_scene(&camera, &truth, 50);
    let start = perturb(&truth, 0.02, 0.05);
    let refiner = FlippedJacobian(AbsolutePoseRefiner::new(&points2d, &points3d, &camera));

    // Steps shrink below the step tolerance only because λ grows.
    let mut pose = start;
    let options = BundleOptions::default();
    let stats = levenberg_marquardt::<6, _>(&refiner, &mut pose, &options, None);
    assert_eq!(
        stats.state,
        OptimizerState::Failed(FailureReason::DampingSaturated)
    );
    assert!(stats.is_failed());
    assert_eq!(stats.iterations, 0);
    assert!(stats.invalid_steps > 0);
    assert_eq!(stats.cost, stats.initial_cost);
    assert_eq!(pose, start);

    let options = BundleOptions {
        step_tol: 0.0,
        gradient_tol: 0.0,
        ..Default::default()
    };
    let mut pose = start;
    let stats = levenberg_marquardt::<6, _>(&refiner, &mut pose, &options, None);
    assert_eq!(
        stats.state,
        OptimizerState::Failed(FailureReason::DampingSaturated)
    );
    assert_eq!(stats.iterations, 0);
    assert!(stats.invalid_steps >= 13);
    assert_eq!(stats.cost, stats.initial_cost);
    assert_eq!(pose, start);

    let options = BundleOptions {
        max_rejections: 3,
        ..options
    };
    let mut pose = start;
    let stats = levenberg_marquardt::<6, _>(&refiner, &mut pose, &options, None);
    assert_eq!(
        stats.state,
        OptimizerState::Failed(FailureReason::TooManyRejections)
    );
    assert_eq!(stats.invalid_steps, 4);
    assert_eq!(pose, start);
}
