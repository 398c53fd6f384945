//! Workout pose runner
//!
//! Mounts a workout view on the synthetic camera and pose estimator, starts
//! the selected activity and logs the session once per second.
//!
//! ## Usage
//!
//! ```bash
//! # Analysis service location (default http://127.0.0.1:8000)
//! export WORKOUT_POSE_SERVICE_URL=http://localhost:8000
//!
//! # Activity and run length
//! WORKOUT_POSE_ACTIVITY=lunges WORKOUT_POSE_RUN_SECS=30 workout-pose
//! ```

use anyhow::{anyhow, bail, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use workout_pose::platform::camera::{SyntheticCamera, SyntheticCameraConfig};
use workout_pose::platform::pose::SyntheticPoseEstimator;
use workout_pose::{Activity, Config, HttpAnalysisClient, PoseEstimator, WorkoutView, WorkoutStatus};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("workout_pose=info".parse()?),
        )
        .init();

    let config = Config::load().map_err(|e| anyhow!("failed to load config: {}", e))?;

    let activity: Activity = std::env::var("WORKOUT_POSE_ACTIVITY")
        .unwrap_or_else(|_| "squats".to_string())
        .parse()
        .context("WORKOUT_POSE_ACTIVITY")?;

    let run_secs: u64 = std::env::var("WORKOUT_POSE_RUN_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(10);

    let client = HttpAnalysisClient::new(config.service_base_url.clone(), config.request_timeout())
        .context("failed to create analysis client")?;
    info!("analysis service at {}", client.base_url());

    let camera = SyntheticCamera::new(SyntheticCameraConfig {
        width: config.camera_width,
        height: config.camera_height,
        ..Default::default()
    });
    let pose_config = config.pose.clone();

    let view = WorkoutView::mount(
        &config,
        Box::new(camera),
        move || {
            let estimator = SyntheticPoseEstimator::initialize(&pose_config)?;
            Ok(Box::new(estimator) as Box<dyn PoseEstimator>)
        },
        Arc::new(client),
    )
    .await;

    let session = view.session();
    if session.status == WorkoutStatus::Error {
        let message = session.error_message.unwrap_or_default();
        error!("{}", message);
        view.unmount().await;
        bail!(message);
    }

    view.controller().select_activity(Some(activity)).await?;
    view.controller().start()?;
    info!("started {} for {}s (Ctrl-C to stop)", activity.label(), run_secs);

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let deadline = tokio::time::sleep(Duration::from_secs(run_secs));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            _ = &mut deadline => break,
            _ = ticker.tick() => {
                let s = view.session();
                info!(
                    "{} | {} | reps {} | {} {}% | service {}",
                    s.status.to_string(),
                    s.feedback.label(),
                    s.rep_count,
                    s.last_known_exercise,
                    s.confidence,
                    if s.backend_reachable { "up" } else { "down" }
                );
            }
        }
    }

    let report = view.unmount().await;
    if !report.is_clean() {
        warn!("teardown incomplete: {:?}", report);
    }
    Ok(())
}
