// Pose estimation backends
// Provides the estimator bridge trait and the bundled backends

pub mod estimator;
pub mod synthetic;

pub use estimator::{NullPoseEstimator, PoseEstimator};
pub use synthetic::{SyntheticPoseEstimator, SyntheticPoseSettings};
