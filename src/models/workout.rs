// Workout session aggregate, activity catalogue and the error taxonomy

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::capture::{CaptureError, CameraPermission};
use super::pose::PoseError;
use super::remote::ServiceError;
use super::dispatch_throttle::DispatchThrottle;

/// Label shown when no exercise is known
pub const NO_EXERCISE_LABEL: &str = "—";

// ==============================================================================
// Activities
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Activity {
    #[serde(rename = "pushups")]
    PushUps,
    #[serde(rename = "squats")]
    Squats,
    #[serde(rename = "lunges")]
    Lunges,
    #[serde(rename = "bicep_curls")]
    BicepCurls,
}

impl Activity {
    pub fn all() -> [Activity; 4] {
        [
            Activity::PushUps,
            Activity::Squats,
            Activity::Lunges,
            Activity::BicepCurls,
        ]
    }

    /// Identifier sent to the analysis service
    pub fn as_str(&self) -> &'static str {
        match self {
            Activity::PushUps => "pushups",
            Activity::Squats => "squats",
            Activity::Lunges => "lunges",
            Activity::BicepCurls => "bicep_curls",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Activity::PushUps => "Push-ups",
            Activity::Squats => "Squats",
            Activity::Lunges => "Lunges",
            Activity::BicepCurls => "Bicep Curls",
        }
    }
}

impl FromStr for Activity {
    type Err = WorkoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Activity::all()
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| WorkoutError::UnsupportedActivity(s.to_string()))
    }
}

// ==============================================================================
// Status & Feedback
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkoutStatus {
    #[default]
    Idle,
    Initializing,
    Detecting,
    Paused,
    Error,
}

impl WorkoutStatus {
    pub fn to_string(&self) -> &'static str {
        match self {
            WorkoutStatus::Idle => "idle",
            WorkoutStatus::Initializing => "initializing",
            WorkoutStatus::Detecting => "detecting",
            WorkoutStatus::Paused => "paused",
            WorkoutStatus::Error => "error",
        }
    }
}

/// User-facing label derived from workout status and analysis confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Feedback {
    #[default]
    #[serde(rename = "Waiting...")]
    Waiting,
    #[serde(rename = "Detecting...")]
    Detecting,
    #[serde(rename = "Hold steady")]
    HoldSteady,
    #[serde(rename = "Good form")]
    GoodForm,
    #[serde(rename = "Adjust position")]
    AdjustPosition,
}

impl Feedback {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence > 0.8 {
            Feedback::GoodForm
        } else if confidence > 0.5 {
            Feedback::HoldSteady
        } else {
            Feedback::AdjustPosition
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Feedback::Waiting => "Waiting...",
            Feedback::Detecting => "Detecting...",
            Feedback::HoldSteady => "Hold steady",
            Feedback::GoodForm => "Good form",
            Feedback::AdjustPosition => "Adjust position",
        }
    }
}

// ==============================================================================
// Workout Session
// ==============================================================================

/// The single mutable aggregate behind a mounted workout view.
/// Only `SessionController` mutates it; everyone else gets clones.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkoutSession {
    pub status: WorkoutStatus,
    pub feedback: Feedback,
    pub error_message: Option<String>,
    pub selected_activity: Option<Activity>,
    pub last_known_exercise: String,
    pub rep_count: u32,
    pub confidence: u32, // Percent, rounded
    pub camera_permission: CameraPermission,
    pub backend_reachable: bool,
    #[serde(skip)]
    pub throttle: DispatchThrottle,
}

impl WorkoutSession {
    pub fn new(dispatch_interval_ms: u64) -> Self {
        Self {
            status: WorkoutStatus::Idle,
            feedback: Feedback::Waiting,
            error_message: None,
            selected_activity: None,
            last_known_exercise: NO_EXERCISE_LABEL.to_string(),
            rep_count: 0,
            confidence: 0,
            camera_permission: CameraPermission::Pending,
            backend_reachable: false,
            throttle: DispatchThrottle::new(dispatch_interval_ms),
        }
    }

    pub fn last_dispatch_ms(&self) -> Option<u64> {
        self.throttle.last_dispatch_ms()
    }

    pub fn dispatch_interval_ms(&self) -> u64 {
        self.throttle.interval_ms()
    }

    /// Which user controls are currently actionable
    pub fn controls(&self) -> ControlAvailability {
        let usable =
            self.camera_permission == CameraPermission::Granted && self.status != WorkoutStatus::Error;
        let selected = self.selected_activity.is_some();

        ControlAvailability {
            can_start: usable && selected && self.status == WorkoutStatus::Idle,
            can_pause: usable && self.status == WorkoutStatus::Detecting,
            can_resume: usable && selected && self.status == WorkoutStatus::Paused,
            can_reset: usable,
            can_select_activity: self.status != WorkoutStatus::Error,
        }
    }
}

impl Default for WorkoutSession {
    fn default() -> Self {
        Self::new(DispatchThrottle::DEFAULT_INTERVAL_MS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControlAvailability {
    pub can_start: bool,
    pub can_pause: bool,
    pub can_resume: bool,
    pub can_reset: bool,
    pub can_select_activity: bool,
}

// ==============================================================================
// Error Types
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum WorkoutError {
    #[error("Camera access denied: {0}")]
    PermissionDenied(String),

    #[error("Initialization failed: {0}")]
    InitializationFailure(String),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("Invalid value: {0}")]
    Validation(String),

    #[error("Unsupported activity: {0}")]
    UnsupportedActivity(String),

    #[error("No activity selected")]
    NoActivitySelected,

    #[error("Camera permission not granted")]
    CameraNotGranted,

    #[error("Cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        from: WorkoutStatus,
        to: WorkoutStatus,
    },
}

impl From<CaptureError> for WorkoutError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::PermissionDenied(msg) => WorkoutError::PermissionDenied(msg),
            other => WorkoutError::InitializationFailure(other.to_string()),
        }
    }
}

impl From<PoseError> for WorkoutError {
    fn from(err: PoseError) -> Self {
        match err {
            PoseError::InvalidConfig(msg) => WorkoutError::Validation(msg),
            other => WorkoutError::InitializationFailure(other.to_string()),
        }
    }
}

pub type WorkoutResult<T> = Result<T, WorkoutError>;
