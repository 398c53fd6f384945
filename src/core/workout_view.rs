// Workout view - ties the pipeline together for one mounted session
//
// mount:   create session -> initializing -> camera -> estimator -> render loop -> idle
// unmount: cancel polling, stop the render loop, release camera and estimator, join polling

use crate::core::config::Config;
use crate::core::frame_source::FrameSource;
use crate::core::health_monitor::HealthMonitor;
use crate::core::remote_client::AnalysisService;
use crate::core::render_loop::{
    RenderLoop, RenderLoopHandle, RenderStats, RenderedFrame, TeardownReport,
};
use crate::core::session_controller::SessionController;
use crate::models::pose::PoseResult;
use crate::models::workout::{WorkoutError, WorkoutSession};
use crate::platform::pose::PoseEstimator;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct WorkoutView {
    controller: SessionController,
    render: Option<RenderLoopHandle>,
    health_token: CancellationToken,
    health_task: JoinHandle<()>,
}

impl WorkoutView {
    /// Mount a fresh session. Initialization failures never escape as errors;
    /// they leave the session in the error state with a user-facing message.
    pub async fn mount<F>(
        config: &Config,
        mut camera: Box<dyn FrameSource>,
        estimator_factory: F,
        service: Arc<dyn AnalysisService>,
    ) -> Self
    where
        F: FnOnce() -> PoseResult<Box<dyn PoseEstimator>> + Send + 'static,
    {
        let controller = SessionController::new(service, config.dispatch_interval_ms);
        controller.begin_initialization();
        info!(
            "mounting workout view ({}, session {})",
            camera.describe(),
            controller.session_id()
        );

        let health_token = CancellationToken::new();
        let health_task = HealthMonitor::spawn(
            controller.clone(),
            config.health_poll_interval(),
            health_token.clone(),
        );

        let initialized =
            Self::initialize(config, &mut camera, estimator_factory, &controller).await;
        let render = match initialized {
            Ok(estimator) => {
                let handle = RenderLoop::spawn(
                    config.render_loop_config(),
                    camera,
                    estimator,
                    controller.clone(),
                );
                controller.initialization_complete();
                Some(handle)
            }
            Err(err) => {
                if let Err(e) = camera.release() {
                    warn!("camera release after failed init: {}", e);
                }
                controller.fail(&err);
                None
            }
        };

        Self {
            controller,
            render,
            health_token,
            health_task,
        }
    }

    async fn initialize<F>(
        config: &Config,
        camera: &mut Box<dyn FrameSource>,
        estimator_factory: F,
        controller: &SessionController,
    ) -> Result<Box<dyn PoseEstimator>, WorkoutError>
    where
        F: FnOnce() -> PoseResult<Box<dyn PoseEstimator>> + Send + 'static,
    {
        config.pose.validate()?;

        camera.acquire().await.map_err(WorkoutError::from)?;
        controller.camera_granted();

        // Model loading can block on disk and network
        let estimator = tokio::task::spawn_blocking(estimator_factory)
            .await
            .map_err(|e| WorkoutError::InitializationFailure(e.to_string()))??;
        info!("pose estimator ready: {}", estimator.get_model_info());
        Ok(estimator)
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    pub fn session(&self) -> WorkoutSession {
        self.controller.snapshot()
    }

    pub fn updates(&self) -> watch::Receiver<WorkoutSession> {
        self.controller.subscribe()
    }

    /// Composited frames; `None` if initialization failed
    pub fn frames(&self) -> Option<watch::Receiver<Option<Arc<RenderedFrame>>>> {
        self.render.as_ref().map(|r| r.frames())
    }

    pub fn render_stats(&self) -> Option<Arc<RenderStats>> {
        self.render.as_ref().map(|r| r.stats())
    }

    /// Tear everything down. The session is discarded with the view.
    pub async fn unmount(self) -> TeardownReport {
        self.health_token.cancel();

        // Release devices before joining the health task
        let report = match self.render {
            Some(render) => render.shutdown().await,
            None => TeardownReport::default(),
        };

        if let Err(e) = self.health_task.await {
            warn!("health monitor ended abnormally: {}", e);
        }
        info!("workout view unmounted");
        report
    }
}
