// Session Controller - owns the workout state machine and the aggregate.
//
//   idle -> initializing -> idle -> detecting <-> paused
//   any state -> error (initialization or permission failure)
//
// All mutation goes through here. The aggregate sits behind a std mutex that
// is never held across an await; every change is published on a watch channel.

use crate::core::remote_client::AnalysisService;
use crate::models::capture::CameraPermission;
use crate::models::pose::PoseFrame;
use crate::models::remote::{AnalyzeResult, ServiceError, ServiceResult};
use crate::models::workout::{
    Activity, Feedback, WorkoutError, WorkoutResult, WorkoutSession, WorkoutStatus,
    NO_EXERCISE_LABEL,
};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const PERMISSION_DENIED_MESSAGE: &str =
    "Camera access denied. Please enable camera permissions.";

#[derive(Clone)]
pub struct SessionController {
    session: Arc<Mutex<WorkoutSession>>,
    updates: Arc<watch::Sender<WorkoutSession>>,
    service: Arc<dyn AnalysisService>,
}

impl SessionController {
    pub fn new(service: Arc<dyn AnalysisService>, dispatch_interval_ms: u64) -> Self {
        let session = WorkoutSession::new(dispatch_interval_ms);
        let (updates, _) = watch::channel(session.clone());
        Self {
            session: Arc::new(Mutex::new(session)),
            updates: Arc::new(updates),
            service,
        }
    }

    /// Current state of the aggregate
    pub fn snapshot(&self) -> WorkoutSession {
        self.lock().clone()
    }

    /// Feed of every published change
    pub fn subscribe(&self) -> watch::Receiver<WorkoutSession> {
        self.updates.subscribe()
    }

    pub fn session_id(&self) -> &str {
        self.service.session_id()
    }

    fn lock(&self) -> MutexGuard<'_, WorkoutSession> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply a mutation and publish the result
    fn update<R>(&self, f: impl FnOnce(&mut WorkoutSession) -> R) -> R {
        let mut session = self.lock();
        let result = f(&mut session);
        self.updates.send_replace(session.clone());
        result
    }

    // ==========================================================================
    // Lifecycle
    // ==========================================================================

    pub fn begin_initialization(&self) {
        self.update(|s| {
            s.status = WorkoutStatus::Initializing;
            s.error_message = None;
        });
    }

    pub fn camera_granted(&self) {
        self.update(|s| s.camera_permission = CameraPermission::Granted);
    }

    /// Initialization finished; the user still has to press start
    pub fn initialization_complete(&self) {
        self.update(|s| {
            if s.status == WorkoutStatus::Initializing {
                s.status = WorkoutStatus::Idle;
            }
        });
        info!("workout pipeline ready");
    }

    pub fn permission_denied(&self, detail: &str) {
        warn!("camera permission denied: {}", detail);
        self.update(|s| {
            s.camera_permission = CameraPermission::Denied;
            Self::enter_error(s, PERMISSION_DENIED_MESSAGE.to_string());
        });
    }

    pub fn initialization_failed(&self, detail: &str) {
        warn!("initialization failed: {}", detail);
        self.update(|s| Self::enter_error(s, format!("Failed to initialize: {}", detail)));
    }

    /// Route a fatal error into the error state
    pub fn fail(&self, err: &WorkoutError) {
        match err {
            WorkoutError::PermissionDenied(detail) => self.permission_denied(detail),
            WorkoutError::InitializationFailure(detail) => self.initialization_failed(detail),
            other => self.initialization_failed(&other.to_string()),
        }
    }

    fn enter_error(session: &mut WorkoutSession, message: String) {
        session.status = WorkoutStatus::Error;
        session.error_message = Some(message);
        session.feedback = Feedback::Waiting;
    }

    // ==========================================================================
    // User Controls
    // ==========================================================================

    /// Begin detecting. Allowed from idle and paused.
    pub fn start(&self) -> WorkoutResult<()> {
        self.update(|s| {
            if !matches!(s.status, WorkoutStatus::Idle | WorkoutStatus::Paused) {
                return Err(WorkoutError::InvalidTransition {
                    from: s.status,
                    to: WorkoutStatus::Detecting,
                });
            }
            if s.camera_permission != CameraPermission::Granted {
                return Err(WorkoutError::CameraNotGranted);
            }
            let Some(activity) = s.selected_activity else {
                return Err(WorkoutError::NoActivitySelected);
            };
            s.status = WorkoutStatus::Detecting;
            s.feedback = Feedback::Detecting;
            info!("detecting {}", activity.as_str());
            Ok(())
        })
    }

    pub fn resume(&self) -> WorkoutResult<()> {
        let status = self.lock().status;
        if status != WorkoutStatus::Paused {
            return Err(WorkoutError::InvalidTransition {
                from: status,
                to: WorkoutStatus::Detecting,
            });
        }
        self.start()
    }

    pub fn pause(&self) -> WorkoutResult<()> {
        self.update(|s| {
            if s.status != WorkoutStatus::Detecting {
                return Err(WorkoutError::InvalidTransition {
                    from: s.status,
                    to: WorkoutStatus::Paused,
                });
            }
            s.status = WorkoutStatus::Paused;
            s.feedback = Feedback::Waiting;
            Ok(())
        })
    }

    /// Change the activity (or clear it). Local counters are zeroed
    /// immediately; the remote reset that follows is best-effort.
    pub async fn select_activity(&self, activity: Option<Activity>) -> WorkoutResult<()> {
        self.update(|s| {
            if s.status == WorkoutStatus::Error {
                return Err(WorkoutError::InvalidTransition {
                    from: s.status,
                    to: s.status,
                });
            }
            s.selected_activity = activity;
            s.rep_count = 0;
            s.confidence = 0;
            s.feedback = Feedback::Waiting;
            s.last_known_exercise = activity
                .map(|a| a.label())
                .unwrap_or(NO_EXERCISE_LABEL)
                .to_string();
            Ok(())
        })?;

        debug!(
            "activity set to {}",
            activity.map(|a| a.as_str()).unwrap_or("none")
        );
        self.reset_remote().await;
        Ok(())
    }

    /// Select by wire identifier, e.g. "bicep_curls"
    pub async fn select_activity_by_name(&self, name: &str) -> WorkoutResult<()> {
        let activity: Activity = name.parse()?;
        self.select_activity(Some(activity)).await
    }

    /// Zero the counters. The remote reset is attempted first, but local state
    /// is cleared whatever it returns. Status is left alone.
    pub async fn reset(&self) {
        self.reset_remote().await;
        self.update(|s| {
            s.rep_count = 0;
            s.confidence = 0;
            s.feedback = Feedback::Waiting;
        });
    }

    async fn reset_remote(&self) {
        if let Err(e) = self.service.reset().await {
            warn!("remote reset failed: {}", e);
            self.update(|s| s.backend_reachable = false);
        }
    }

    // ==========================================================================
    // Analysis Dispatch
    // ==========================================================================

    /// Claim a dispatch slot at `now_ms`. Returns the activity to send when
    /// the session is detecting, an activity is set and the throttle allows it.
    fn claim_dispatch(&self, now_ms: u64) -> Option<Activity> {
        let mut session = self.lock();
        if session.status != WorkoutStatus::Detecting {
            return None;
        }
        let activity = session.selected_activity?;
        if !session.throttle.try_acquire(now_ms) {
            return None;
        }
        Some(activity)
    }

    /// Offer a pose from the render loop. Fire-and-forget: the analysis call
    /// runs on its own task so rendering never waits on the network.
    pub fn offer_pose(&self, pose: PoseFrame, now_ms: u64) -> Option<JoinHandle<()>> {
        let activity = self.claim_dispatch(now_ms)?;
        let controller = self.clone();
        Some(tokio::spawn(async move {
            controller.dispatch(pose, activity).await;
        }))
    }

    /// Awaitable form of `offer_pose`. `None` when the pose was not sent.
    pub async fn submit_pose(
        &self,
        pose: PoseFrame,
        now_ms: u64,
    ) -> Option<ServiceResult<AnalyzeResult>> {
        let activity = self.claim_dispatch(now_ms)?;
        Some(self.dispatch(pose, activity).await)
    }

    async fn dispatch(&self, pose: PoseFrame, activity: Activity) -> ServiceResult<AnalyzeResult> {
        let result = self.service.analyze(&pose, Some(activity)).await;
        match &result {
            Ok(analysis) => self.apply_analysis(analysis),
            Err(e) => self.apply_analysis_failure(e),
        }
        result
    }

    /// Fold a successful analysis into the aggregate. Responses can land out
    /// of order; each one simply overwrites.
    pub fn apply_analysis(&self, result: &AnalyzeResult) {
        self.update(|s| {
            if s.status == WorkoutStatus::Error {
                debug!("dropping analysis result in error state");
                return;
            }
            s.rep_count = result.rep_count;
            s.last_known_exercise = if result.exercise.is_empty() {
                NO_EXERCISE_LABEL.to_string()
            } else {
                result.exercise.clone()
            };
            s.confidence = (result.confidence * 100.0).round() as u32;
            s.feedback = Feedback::from_confidence(result.confidence);
            s.backend_reachable = true;
        });
    }

    /// Analysis failed: counters keep their last values
    pub fn apply_analysis_failure(&self, err: &ServiceError) {
        warn!("analysis failed: {}", err);
        self.update(|s| {
            s.backend_reachable = false;
            if s.status != WorkoutStatus::Error {
                s.feedback = Feedback::HoldSteady;
            }
        });
    }

    /// Probe the service and record reachability
    pub async fn check_backend_health(&self) -> bool {
        let reachable = self
            .service
            .health()
            .await
            .map(|h| h.model_loaded)
            .unwrap_or(false);

        let changed = self.update(|s| {
            let changed = s.backend_reachable != reachable;
            s.backend_reachable = reachable;
            changed
        });
        if changed {
            info!("analysis service reachable: {}", reachable);
        }
        reachable
    }
}
