// Data models for body pose estimation

use serde::{Deserialize, Serialize};

/// Number of body landmarks produced by the pose landmarker topology
pub const POSE_LANDMARK_COUNT: usize = 33;

/// Keypoints at or below this visibility are treated as unreliable.
/// Exposed through `Config::visibility_threshold` as well.
pub const DEFAULT_VISIBILITY_THRESHOLD: f32 = 0.5;

// ==============================================================================
// Keypoints
// ==============================================================================

/// One estimated body-joint location
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f32,          // Normalized [0, 1] relative to frame width
    pub y: f32,          // Normalized [0, 1] relative to frame height
    pub z: f32,          // Depth relative to the hip midpoint
    pub visibility: f32, // Detection confidence [0, 1]
}

impl Keypoint {
    pub fn new(x: f32, y: f32, z: f32, visibility: f32) -> Self {
        Self { x, y, z, visibility }
    }

    /// Strictly above the threshold; a point sitting exactly on it is not drawn.
    pub fn is_visible(&self, threshold: f32) -> bool {
        self.visibility > threshold
    }
}

/// Clamp a normalized coordinate into [0, 1]. NaN collapses to 0.
pub fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

// ==============================================================================
// Pose Frame
// ==============================================================================

/// Full skeleton estimate from a single captured frame.
///
/// A `PoseFrame` always carries exactly [`POSE_LANDMARK_COUNT`] keypoints;
/// "no body detected" is represented by the absence of a frame
/// (`Option<PoseFrame>`), never by a short one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseFrame {
    keypoints: Vec<Keypoint>,
    pub timestamp_ms: u64,
}

impl PoseFrame {
    /// Build a frame from detector output. Extra keypoints past the topology
    /// size are dropped; too few is an inference failure.
    pub fn new(mut keypoints: Vec<Keypoint>, timestamp_ms: u64) -> PoseResult<Self> {
        if keypoints.len() < POSE_LANDMARK_COUNT {
            return Err(PoseError::InferenceFailed(format!(
                "expected {} keypoints, detector returned {}",
                POSE_LANDMARK_COUNT,
                keypoints.len()
            )));
        }
        keypoints.truncate(POSE_LANDMARK_COUNT);
        Ok(Self {
            keypoints,
            timestamp_ms,
        })
    }

    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    pub fn keypoint(&self, landmark: PoseLandmark) -> &Keypoint {
        &self.keypoints[landmark as usize]
    }
}

// ==============================================================================
// Skeleton Topology
// ==============================================================================

/// Pose landmark indices (33 total)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PoseLandmark {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

/// Skeleton edges drawn between landmark indices
pub const POSE_CONNECTIONS: [(usize, usize); 33] = [
    // Face
    (0, 1), (1, 2), (2, 3), (3, 7),
    (0, 4), (4, 5), (5, 6), (6, 8),
    // Mouth
    (9, 10),
    // Shoulders
    (11, 12),
    // Arms
    (11, 13), (13, 15),
    (12, 14), (14, 16),
    // Torso
    (11, 23), (12, 24), (23, 24),
    // Legs
    (23, 25), (25, 27), (27, 29), (29, 31),
    (24, 26), (26, 28), (28, 30), (30, 32),
    // Hands
    (15, 17), (15, 19), (15, 21), (17, 19),
    (16, 18), (16, 20), (16, 22), (18, 20),
];

// ==============================================================================
// Configuration
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseConfig {
    pub model_complexity: ModelComplexity,
    pub num_poses: u32,                   // Bodies to track; the pipeline only consumes the first
    pub min_detection_confidence: f32,    // Default: 0.5
    pub min_presence_confidence: f32,     // Default: 0.5
    pub min_tracking_confidence: f32,     // Default: 0.5
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelComplexity {
    Lite = 0,
    Full = 1,
    Heavy = 2,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            model_complexity: ModelComplexity::Lite,
            num_poses: 1,
            min_detection_confidence: 0.5,
            min_presence_confidence: 0.5,
            min_tracking_confidence: 0.5,
        }
    }
}

impl PoseConfig {
    pub fn validate(&self) -> PoseResult<()> {
        if self.num_poses == 0 {
            return Err(PoseError::InvalidConfig("num_poses must be at least 1".to_string()));
        }
        for (name, value) in [
            ("min_detection_confidence", self.min_detection_confidence),
            ("min_presence_confidence", self.min_presence_confidence),
            ("min_tracking_confidence", self.min_tracking_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(PoseError::InvalidConfig(format!(
                    "{} must be between 0.0 and 1.0, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

// ==============================================================================
// Error Types
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PoseError {
    #[error("Pose estimator not initialized")]
    NotInitialized,

    #[error("Pose estimator already disposed")]
    Disposed,

    #[error("Model loading failed: {0}")]
    ModelLoadFailed(String),

    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type PoseResult<T> = Result<T, PoseError>;
