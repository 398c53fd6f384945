// Pose estimator bridge
// Abstraction over black-box body landmark detectors

use crate::models::capture::RawFrame;
use crate::models::pose::{PoseConfig, PoseFrame, PoseResult};

/// Pose estimator trait.
///
/// `detect` takes `&mut self`, so a single estimator can never have two
/// detections in flight; the render loop owns it exclusively.
pub trait PoseEstimator: Send {
    /// Load the model. May be slow and may hit the network, so callers run
    /// it off the scheduling thread.
    fn initialize(config: &PoseConfig) -> PoseResult<Self>
    where
        Self: Sized;

    /// Run detection on a frame. `Ok(None)` means no body was found.
    fn detect(&mut self, frame: &RawFrame, timestamp_ms: u64) -> PoseResult<Option<PoseFrame>>;

    /// Release model resources. Idempotent.
    fn dispose(&mut self) -> PoseResult<()>;

    /// Check if the model is loaded and not yet disposed
    fn is_initialized(&self) -> bool;

    /// Get model info
    fn get_model_info(&self) -> String;
}

// ==============================================================================
// Null Implementation (no inference)
// ==============================================================================

/// Estimator that never finds a body
pub struct NullPoseEstimator {
    disposed: bool,
}

impl PoseEstimator for NullPoseEstimator {
    fn initialize(config: &PoseConfig) -> PoseResult<Self> {
        config.validate()?;
        Ok(Self { disposed: false })
    }

    fn detect(&mut self, _frame: &RawFrame, _timestamp_ms: u64) -> PoseResult<Option<PoseFrame>> {
        if self.disposed {
            return Err(crate::models::pose::PoseError::Disposed);
        }
        Ok(None)
    }

    fn dispose(&mut self) -> PoseResult<()> {
        self.disposed = true;
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        !self.disposed
    }

    fn get_model_info(&self) -> String {
        "Null pose estimator (no inference)".to_string()
    }
}
