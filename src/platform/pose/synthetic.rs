// Synthetic pose estimator
// Produces a standing skeleton that squats on a fixed cycle, keyed off the
// detection timestamp. Lets the whole pipeline run without a model.

use super::estimator::PoseEstimator;
use crate::models::capture::RawFrame;
use crate::models::pose::{
    Keypoint, PoseConfig, PoseError, PoseFrame, PoseLandmark, PoseResult, POSE_LANDMARK_COUNT,
};
use std::f32::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Neutral standing pose, (x, y) per landmark index
const STANDING_POSE: [(f32, f32); POSE_LANDMARK_COUNT] = [
    (0.500, 0.200), // nose
    (0.510, 0.185), (0.520, 0.185), (0.530, 0.185),
    (0.490, 0.185), (0.480, 0.185), (0.470, 0.185),
    (0.540, 0.190), (0.460, 0.190),
    (0.510, 0.220), (0.490, 0.220),
    (0.580, 0.300), (0.420, 0.300), // shoulders
    (0.610, 0.420), (0.390, 0.420), // elbows
    (0.620, 0.530), (0.380, 0.530), // wrists
    (0.625, 0.560), (0.375, 0.560),
    (0.620, 0.565), (0.380, 0.565),
    (0.610, 0.550), (0.390, 0.550),
    (0.555, 0.550), (0.445, 0.550), // hips
    (0.560, 0.700), (0.440, 0.700), // knees
    (0.560, 0.860), (0.440, 0.860), // ankles
    (0.555, 0.880), (0.445, 0.880),
    (0.580, 0.890), (0.420, 0.890),
];

#[derive(Debug, Clone)]
pub struct SyntheticPoseSettings {
    /// Duration of one full squat cycle
    pub cycle: Duration,
    /// When false every detection reports "no body"
    pub body_present: bool,
    /// Visibility reported for every keypoint
    pub visibility: f32,
    /// Make `initialize` fail with this message
    pub fail_init: Option<String>,
    /// Make `dispose` report an error after releasing
    pub fail_dispose: bool,
}

impl Default for SyntheticPoseSettings {
    fn default() -> Self {
        Self {
            cycle: Duration::from_secs(3),
            body_present: true,
            visibility: 0.95,
            fail_init: None,
            fail_dispose: false,
        }
    }
}

pub struct SyntheticPoseEstimator {
    settings: SyntheticPoseSettings,
    initialized: bool,
    detections: Arc<AtomicUsize>,
    disposals: Arc<AtomicUsize>,
}

impl SyntheticPoseEstimator {
    pub fn with_settings(settings: SyntheticPoseSettings, config: &PoseConfig) -> PoseResult<Self> {
        config.validate()?;
        if let Some(reason) = &settings.fail_init {
            return Err(PoseError::ModelLoadFailed(reason.clone()));
        }
        Ok(Self {
            settings,
            initialized: true,
            detections: Arc::new(AtomicUsize::new(0)),
            disposals: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Shared detection counter
    pub fn detections(&self) -> Arc<AtomicUsize> {
        self.detections.clone()
    }

    /// Shared dispose counter
    pub fn disposals(&self) -> Arc<AtomicUsize> {
        self.disposals.clone()
    }

    /// Squat depth in [0, 1] at the given time
    fn depth_at(&self, timestamp_ms: u64) -> f32 {
        let cycle_ms = self.settings.cycle.as_millis().max(1) as u64;
        let phase = (timestamp_ms % cycle_ms) as f32 / cycle_ms as f32;
        (1.0 - (2.0 * PI * phase).cos()) / 2.0
    }

    fn skeleton_at(&self, timestamp_ms: u64) -> Vec<Keypoint> {
        let depth = self.depth_at(timestamp_ms);
        let visibility = self.settings.visibility;

        STANDING_POSE
            .iter()
            .enumerate()
            .map(|(idx, &(x, y))| {
                let (dx, dy) = if idx <= PoseLandmark::RightHip as usize {
                    (0.0, 0.15 * depth)
                } else if idx == PoseLandmark::LeftKnee as usize {
                    (0.03 * depth, 0.05 * depth)
                } else if idx == PoseLandmark::RightKnee as usize {
                    (-0.03 * depth, 0.05 * depth)
                } else {
                    (0.0, 0.0)
                };
                Keypoint::new(x + dx, y + dy, 0.0, visibility)
            })
            .collect()
    }
}

impl PoseEstimator for SyntheticPoseEstimator {
    fn initialize(config: &PoseConfig) -> PoseResult<Self> {
        Self::with_settings(SyntheticPoseSettings::default(), config)
    }

    fn detect(&mut self, _frame: &RawFrame, timestamp_ms: u64) -> PoseResult<Option<PoseFrame>> {
        if !self.initialized {
            return Err(PoseError::Disposed);
        }
        self.detections.fetch_add(1, Ordering::SeqCst);

        if !self.settings.body_present {
            return Ok(None);
        }
        PoseFrame::new(self.skeleton_at(timestamp_ms), timestamp_ms).map(Some)
    }

    fn dispose(&mut self) -> PoseResult<()> {
        if !self.initialized {
            return Ok(());
        }
        self.initialized = false;
        self.disposals.fetch_add(1, Ordering::SeqCst);

        if self.settings.fail_dispose {
            return Err(PoseError::InferenceFailed(
                "model session did not shut down cleanly".to_string(),
            ));
        }
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn get_model_info(&self) -> String {
        format!(
            "Synthetic pose estimator ({}ms squat cycle)",
            self.settings.cycle.as_millis()
        )
    }
}
