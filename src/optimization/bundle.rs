//! Public pose refinement entry points.
//!
//! These validate the observation arrays, build the matching refiner and
//! run [`levenberg_marquardt`] on the pose in place.

use crate::camera::Camera;
use crate::geometry::CameraPose;
use crate::optimization::lm::levenberg_marquardt;
use crate::optimization::{
    AbsolutePoseRefiner, BundleOptions, BundleStats, GeneralizedAbsolutePoseRefiner,
    OptimizationError,
};
use log::debug;
use nalgebra::{Vector2, Vector3};

fn check_correspondences(num_2d: usize, num_3d: usize) -> Result<(), OptimizationError> {
    if num_2d != num_3d {
        return Err(OptimizationError::InvalidInput(format!(
            "Number of 2D and 3D points must match ({} vs {})",
            num_2d, num_3d
        )));
    }
    Ok(())
}

fn check_weights(weights: &[f64], expected: usize) -> Result<(), OptimizationError> {
    if weights.len() != expected {
        return Err(OptimizationError::InvalidInput(format!(
            "Expected {} weights, found {}",
            expected,
            weights.len()
        )));
    }
    if let Some(w) = weights.iter().find(|w| !(w.is_finite() && **w >= 0.0)) {
        return Err(OptimizationError::InvalidInput(format!(
            "Weights must be finite and non-negative, found {}",
            w
        )));
    }
    Ok(())
}

/// Refines the world-to-camera `pose` of `camera` so that `points3d`
/// reproject onto `points2d`.
///
/// On return `pose` holds the best accepted estimate, whatever the final
/// [`BundleStats::state`].
///
/// # Errors
///
/// [`OptimizationError::InvalidInput`] if the point arrays are empty or of
/// different lengths, or if `options` fail [`BundleOptions::validate`].
pub fn refine_absolute_pose(
    points2d: &[Vector2<f64>],
    points3d: &[Vector3<f64>],
    camera: &Camera,
    pose: &mut CameraPose,
    options: &BundleOptions,
    callback: Option<&mut dyn FnMut(&BundleStats)>,
) -> Result<BundleStats, OptimizationError> {
    options.validate()?;
    check_correspondences(points2d.len(), points3d.len())?;
    if points2d.is_empty() {
        return Err(OptimizationError::InvalidInput(
            "Points arrays cannot be empty".to_string(),
        ));
    }

    debug!(
        "Refining absolute pose from {} correspondences with {} camera",
        points2d.len(),
        camera.model_name()
    );
    let refiner = AbsolutePoseRefiner::new(points2d, points3d, camera);
    Ok(levenberg_marquardt::<6, _>(&refiner, pose, options, callback))
}

/// [`refine_absolute_pose`] with a non-negative weight per correspondence.
///
/// # Errors
///
/// As [`refine_absolute_pose`], and [`OptimizationError::InvalidInput`] if
/// `weights` does not hold one finite, non-negative value per point.
pub fn refine_absolute_pose_weighted(
    points2d: &[Vector2<f64>],
    points3d: &[Vector3<f64>],
    weights: &[f64],
    camera: &Camera,
    pose: &mut CameraPose,
    options: &BundleOptions,
    callback: Option<&mut dyn FnMut(&BundleStats)>,
) -> Result<BundleStats, OptimizationError> {
    options.validate()?;
    check_correspondences(points2d.len(), points3d.len())?;
    check_weights(weights, points2d.len())?;
    if points2d.is_empty() {
        return Err(OptimizationError::InvalidInput(
            "Points arrays cannot be empty".to_string(),
        ));
    }

    let refiner = AbsolutePoseRefiner::new(points2d, points3d, camera).with_weights(weights);
    Ok(levenberg_marquardt::<6, _>(&refiner, pose, options, callback))
}

/// Refines the world-to-rig `pose` of a multi-camera rig.
///
/// Camera `k` is `cameras[k]`, mounted at `rig_to_camera[k]`, and observes
/// `points3d[k]` at `points2d[k]`. Cameras without observations are
/// allowed as long as the rig has at least one.
///
/// # Errors
///
/// [`OptimizationError::InvalidInput`] if the per-camera arrays disagree in
/// length, the rig has no observations, or `options` are invalid.
pub fn refine_generalized_absolute_pose(
    points2d: &[Vec<Vector2<f64>>],
    points3d: &[Vec<Vector3<f64>>],
    rig_to_camera: &[CameraPose],
    cameras: &[Camera],
    pose: &mut CameraPose,
    options: &BundleOptions,
    callback: Option<&mut dyn FnMut(&BundleStats)>,
) -> Result<BundleStats, OptimizationError> {
    options.validate()?;
    let num_cameras = cameras.len();
    if points2d.len() != num_cameras
        || points3d.len() != num_cameras
        || rig_to_camera.len() != num_cameras
    {
        return Err(OptimizationError::InvalidInput(format!(
            "Expected observations and rig poses for {} cameras",
            num_cameras
        )));
    }
    for (xs, xw) in points2d.iter().zip(points3d) {
        check_correspondences(xs.len(), xw.len())?;
    }
    let total: usize = points2d.iter().map(Vec::len).sum();
    if total == 0 {
        return Err(OptimizationError::InvalidInput(
            "Points arrays cannot be empty".to_string(),
        ));
    }

    debug!(
        "Refining rig pose from {} correspondences over {} cameras",
        total, num_cameras
    );
    let refiner = GeneralizedAbsolutePoseRefiner::new(points2d, points3d, rig_to_camera, cameras);
    Ok(levenberg_marquardt::<6, _>(&refiner, pose, options, callback))
}
