//! Camera Refine Library
//!
//! Camera projection models and robust pose refinement for computer vision.
//! This library provides:
//! - A closed set of camera models (pinhole, radial, OpenCV, fisheye, FOV and
//!   1D radial) with analytic projection Jacobians and iterative unprojection
//! - One-line text records and YAML files for storing cameras
//! - A generic robust Levenberg-Marquardt engine with absolute and
//!   generalized (multi-camera) absolute pose refiners

pub mod camera;
pub mod geometry;
pub mod optimization;

// Re-export commonly used types
pub use camera::{Camera, CameraModel, CameraModelError, CameraModelId, Intrinsics, Resolution};

pub use geometry::CameraPose;

pub use optimization::{
    refine_absolute_pose, refine_absolute_pose_weighted, refine_generalized_absolute_pose,
    BundleOptions, BundleStats, FailureReason, LossType, OptimizationError, OptimizerState,
    ProjectionError, RobustLoss,
};
