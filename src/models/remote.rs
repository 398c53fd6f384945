// Wire types for the remote pose-classification / rep-counting service

use serde::{Deserialize, Serialize};

use super::pose::{clamp_unit, PoseFrame, POSE_LANDMARK_COUNT};

// ==============================================================================
// Requests
// ==============================================================================

/// Landmark as transmitted: depth is dropped, every field clamped into [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WireLandmark {
    pub x: f32,
    pub y: f32,
    pub visibility: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub landmarks: Vec<WireLandmark>,
    pub session_id: String,
    pub exercise: Option<String>,
}

impl AnalyzeRequest {
    pub fn new(pose: &PoseFrame, exercise: Option<&str>, session_id: &str) -> Self {
        let landmarks = pose
            .keypoints()
            .iter()
            .take(POSE_LANDMARK_COUNT)
            .map(|kp| WireLandmark {
                x: clamp_unit(kp.x),
                y: clamp_unit(kp.y),
                visibility: clamp_unit(kp.visibility),
            })
            .collect();

        Self {
            landmarks,
            session_id: session_id.to_string(),
            exercise: exercise.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetRequest {
    pub session_id: String,
}

// ==============================================================================
// Responses
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
struct RawAnalyzeResponse {
    exercise: String,
    confidence: f64,
    rep_count: i64,
}

/// Validated analysis result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyzeResult {
    pub exercise: String,
    pub confidence: f64, // [0, 1]
    pub rep_count: u32,
}

impl AnalyzeResult {
    /// Parse a response body into a strict result; anything out of range is
    /// rejected rather than passed downstream.
    pub fn parse(body: &[u8]) -> Result<Self, ServiceError> {
        let raw: RawAnalyzeResponse = serde_json::from_slice(body)
            .map_err(|e| ServiceError::InvalidResponse(format!("analyze: {}", e)))?;

        if !raw.confidence.is_finite() || !(0.0..=1.0).contains(&raw.confidence) {
            return Err(ServiceError::InvalidResponse(format!(
                "analyze: confidence {} outside [0, 1]",
                raw.confidence
            )));
        }

        let rep_count = u32::try_from(raw.rep_count).map_err(|_| {
            ServiceError::InvalidResponse(format!("analyze: invalid rep_count {}", raw.rep_count))
        })?;

        Ok(Self {
            exercise: raw.exercise,
            confidence: raw.confidence,
            rep_count,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetAck {
    pub session_id: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub model_loaded: bool,
}

// ==============================================================================
// Error Types
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum ServiceError {
    #[error("Analysis service error ({status}): {message}")]
    Http { status: u16, message: String },

    #[error("Failed to reach analysis service: {0}")]
    Transport(String),

    #[error("Invalid response from analysis service: {0}")]
    InvalidResponse(String),
}

impl ServiceError {
    /// HTTP status attached to the failure, if the service answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            ServiceError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
