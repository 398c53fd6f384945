// Render Loop - frame-rate-capped detect-and-draw scheduler
//
// Ticks at the display refresh rate, but only runs a detection cycle when the
// frame gate lets it through. Keeps running while paused; only dispatch is
// gated on workout status.

use crate::core::frame_source::FrameSource;
use crate::core::overlay::{draw_skeleton, mirror_frame, OverlayStyle};
use crate::core::session_controller::SessionController;
use crate::models::pose::PoseFrame;
use crate::platform::pose::PoseEstimator;
use image::RgbaImage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Upper bound on detect-and-draw cycles per second
pub const DEFAULT_FPS_LIMIT: u32 = 15;

/// How long teardown waits for the loop task and the devices before giving up
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

const DEVICE_LOCK_RETRY: Duration = Duration::from_millis(10);

// ==============================================================================
// Frame Gate
// ==============================================================================

/// Accepts at most `fps_limit` ticks per second. The accepted marker advances
/// by whole intervals, carrying the remainder, so the rate does not drift.
#[derive(Debug, Clone)]
pub struct FrameGate {
    interval_ms: f64,
    last_accepted_ms: Option<f64>,
}

impl FrameGate {
    pub fn new(fps_limit: u32) -> Self {
        Self {
            interval_ms: 1000.0 / fps_limit.max(1) as f64,
            last_accepted_ms: None,
        }
    }

    pub fn interval_ms(&self) -> f64 {
        self.interval_ms
    }

    pub fn accept(&mut self, now_ms: f64) -> bool {
        let Some(last) = self.last_accepted_ms else {
            self.last_accepted_ms = Some(now_ms);
            return true;
        };

        let elapsed = now_ms - last;
        if elapsed < self.interval_ms {
            return false;
        }
        self.last_accepted_ms = Some(now_ms - elapsed % self.interval_ms);
        true
    }
}

// ==============================================================================
// Loop Configuration & Outputs
// ==============================================================================

#[derive(Debug, Clone)]
pub struct RenderLoopConfig {
    pub fps_limit: u32,
    pub display_refresh_hz: u32,
    pub visibility_threshold: f32,
    pub mirror: bool,
    pub style: OverlayStyle,
}

impl Default for RenderLoopConfig {
    fn default() -> Self {
        Self {
            fps_limit: DEFAULT_FPS_LIMIT,
            display_refresh_hz: 60,
            visibility_threshold: crate::models::pose::DEFAULT_VISIBILITY_THRESHOLD,
            mirror: true,
            style: OverlayStyle::default(),
        }
    }
}

/// Latest composited frame for presentation
#[derive(Debug, Clone)]
pub struct RenderedFrame {
    pub image: RgbaImage,
    pub pose: Option<PoseFrame>,
    pub timestamp_ms: u64,
}

/// Loop counters
#[derive(Debug, Default)]
pub struct RenderStats {
    ticks: AtomicU64,
    not_ready: AtomicU64,
    cycles: AtomicU64,
    detections: AtomicU64,
    detect_errors: AtomicU64,
}

impl RenderStats {
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Ticks skipped because the camera had nothing yet
    pub fn not_ready(&self) -> u64 {
        self.not_ready.load(Ordering::Relaxed)
    }

    /// Detect-and-draw cycles that ran
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Cycles where a body was found
    pub fn detections(&self) -> u64 {
        self.detections.load(Ordering::Relaxed)
    }

    pub fn detect_errors(&self) -> u64 {
        self.detect_errors.load(Ordering::Relaxed)
    }
}

/// Outcome of tearing the pipeline down. `None` means that release succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub scheduling_error: Option<String>,
    pub camera_error: Option<String>,
    pub estimator_error: Option<String>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.scheduling_error.is_none()
            && self.camera_error.is_none()
            && self.estimator_error.is_none()
    }
}

// ==============================================================================
// Render Loop
// ==============================================================================

// Camera and estimator are locked separately, so a detection that never
// returns cannot keep the camera from being released.
type SharedCamera = Arc<Mutex<Box<dyn FrameSource>>>;
type SharedEstimator = Arc<Mutex<Box<dyn PoseEstimator>>>;

fn lock_device<T: ?Sized>(device: &Mutex<T>) -> MutexGuard<'_, T> {
    device.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Retry `try_lock` until `deadline`. `None` if the holder never lets go.
async fn lock_device_by<T: ?Sized>(
    device: &Mutex<T>,
    deadline: Instant,
) -> Option<MutexGuard<'_, T>> {
    loop {
        match device.try_lock() {
            Ok(guard) => return Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => return Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => {}
        }
        if Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(DEVICE_LOCK_RETRY).await;
    }
}

pub struct RenderLoop {
    config: RenderLoopConfig,
    camera: SharedCamera,
    estimator: SharedEstimator,
    controller: SessionController,
    frames: watch::Sender<Option<Arc<RenderedFrame>>>,
    stats: Arc<RenderStats>,
    gate: FrameGate,
}

/// Handle to a running loop
pub struct RenderLoopHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
    camera: SharedCamera,
    estimator: SharedEstimator,
    frames: watch::Receiver<Option<Arc<RenderedFrame>>>,
    stats: Arc<RenderStats>,
}

impl RenderLoop {
    /// Spawn the loop on the current runtime. The camera must already be
    /// acquired and the estimator initialized.
    pub fn spawn(
        config: RenderLoopConfig,
        camera: Box<dyn FrameSource>,
        estimator: Box<dyn PoseEstimator>,
        controller: SessionController,
    ) -> RenderLoopHandle {
        let token = CancellationToken::new();
        let camera: SharedCamera = Arc::new(Mutex::new(camera));
        let estimator: SharedEstimator = Arc::new(Mutex::new(estimator));
        let stats = Arc::new(RenderStats::default());
        let (frames_tx, frames_rx) = watch::channel(None);

        let render_loop = RenderLoop {
            gate: FrameGate::new(config.fps_limit),
            config,
            camera: camera.clone(),
            estimator: estimator.clone(),
            controller,
            frames: frames_tx,
            stats: stats.clone(),
        };

        let task = tokio::spawn(render_loop.run(token.clone()));

        RenderLoopHandle {
            token,
            task,
            camera,
            estimator,
            frames: frames_rx,
            stats,
        }
    }

    async fn run(mut self, token: CancellationToken) {
        let tick = Duration::from_secs_f64(1.0 / self.config.display_refresh_hz.max(1) as f64);
        let mut ticker = tokio::time::interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let epoch = Instant::now();

        info!(
            "render loop started ({} fps cap, {} Hz ticks)",
            self.config.fps_limit, self.config.display_refresh_hz
        );

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let now_ms = epoch.elapsed().as_secs_f64() * 1000.0;
                    self.tick(now_ms);
                }
            }
        }

        debug!("render loop stopped after {} ticks", self.stats.ticks());
    }

    fn tick(&mut self, now_ms: f64) {
        self.stats.ticks.fetch_add(1, Ordering::Relaxed);
        let timestamp_ms = now_ms as u64;

        let frame = {
            let mut camera = lock_device(&self.camera);
            if !camera.is_ready() {
                self.stats.not_ready.fetch_add(1, Ordering::Relaxed);
                return;
            }
            if !self.gate.accept(now_ms) {
                return;
            }

            match camera.current_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    self.stats.not_ready.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(e) => {
                    warn!("frame read failed: {}", e);
                    return;
                }
            }
        };

        self.stats.cycles.fetch_add(1, Ordering::Relaxed);
        let detected = lock_device(&self.estimator).detect(&frame, timestamp_ms);
        let pose = match detected {
            Ok(pose) => pose,
            Err(e) => {
                self.stats.detect_errors.fetch_add(1, Ordering::Relaxed);
                warn!("pose detection failed: {}", e);
                None
            }
        };

        match frame.into_rgba_image() {
            Ok(mut image) => {
                if self.config.mirror {
                    mirror_frame(&mut image);
                }
                if let Some(pose) = &pose {
                    draw_skeleton(
                        &mut image,
                        pose,
                        self.config.visibility_threshold,
                        self.config.mirror,
                        &self.config.style,
                    );
                }
                self.frames.send_replace(Some(Arc::new(RenderedFrame {
                    image,
                    pose: pose.clone(),
                    timestamp_ms,
                })));
            }
            Err(e) => warn!("frame conversion failed: {}", e),
        }

        if let Some(pose) = pose {
            self.stats.detections.fetch_add(1, Ordering::Relaxed);
            self.controller.offer_pose(pose, timestamp_ms);
        }
    }
}

impl RenderLoopHandle {
    /// Latest composited frame
    pub fn frames(&self) -> watch::Receiver<Option<Arc<RenderedFrame>>> {
        self.frames.clone()
    }

    pub fn stats(&self) -> Arc<RenderStats> {
        self.stats.clone()
    }

    /// Stop scheduling, stop the camera and dispose the estimator. Every step
    /// is attempted regardless of earlier failures, and the whole teardown is
    /// bounded by the shutdown grace period.
    pub async fn shutdown(self) -> TeardownReport {
        let mut report = TeardownReport::default();
        let deadline = Instant::now() + SHUTDOWN_GRACE;

        self.token.cancel();
        let mut task = self.task;
        match tokio::time::timeout_at(deadline, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => report.scheduling_error = Some(format!("render task failed: {}", e)),
            Err(_) => {
                task.abort();
                report.scheduling_error = Some("render task did not stop in time".to_string());
            }
        }

        // A lock still held here means the task timed out above
        match lock_device_by(&self.camera, deadline).await {
            Some(mut camera) => {
                if let Err(e) = camera.release() {
                    report.camera_error = Some(e.to_string());
                }
            }
            None => report.camera_error = Some("camera still held by the render task".to_string()),
        }
        match lock_device_by(&self.estimator, deadline).await {
            Some(mut estimator) => {
                if let Err(e) = estimator.dispose() {
                    report.estimator_error = Some(e.to_string());
                }
            }
            None => {
                report.estimator_error =
                    Some("estimator still held by a detection that did not return".to_string())
            }
        }

        if report.is_clean() {
            info!("render loop torn down");
        } else {
            warn!("render loop teardown incomplete: {:?}", report);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::session_controller::tests::{analysis, ScriptedService};
    use crate::models::workout::{Activity, WorkoutStatus};
    use crate::platform::camera::{SyntheticCamera, SyntheticCameraConfig};
    use crate::platform::pose::{SyntheticPoseEstimator, SyntheticPoseSettings};
    use crate::models::capture::RawFrame;
    use crate::models::pose::{PoseConfig, PoseError, PoseResult};

    #[test]
    fn test_first_tick_is_accepted() {
        let mut gate = FrameGate::new(15);
        assert!(gate.accept(1234.0));
        assert!(!gate.accept(1240.0));
    }

    #[test]
    fn test_rate_is_capped_at_60hz_ticks() {
        let mut gate = FrameGate::new(15);
        let accepted = (0..600).filter(|i| gate.accept(*i as f64 * 1000.0 / 60.0)).count();
        // 10 s of ticks
        assert!((149..=151).contains(&accepted), "accepted {}", accepted);
    }

    #[test]
    fn test_irregular_ticks_do_not_drift() {
        let mut gate = FrameGate::new(15);
        let accepted = (0..10_000 / 17)
            .filter(|i| gate.accept(*i as f64 * 17.0))
            .count();
        assert!((147..=151).contains(&accepted), "accepted {}", accepted);
    }

    #[test]
    fn test_never_exceeds_limit_with_fast_source() {
        let mut gate = FrameGate::new(15);
        let mut last = None;
        for i in 0..5_000 {
            let now = i as f64;
            if gate.accept(now) {
                if let Some(prev) = last {
                    assert!(now - prev >= gate.interval_ms() - 1.0);
                }
                last = Some(now);
            }
        }
    }

    #[test]
    fn test_report_is_clean() {
        assert!(TeardownReport::default().is_clean());
        let report = TeardownReport {
            camera_error: Some("busy".into()),
            ..Default::default()
        };
        assert!(!report.is_clean());
    }

    async fn running_loop(
        camera: SyntheticCamera,
        pose: SyntheticPoseSettings,
        controller: SessionController,
    ) -> RenderLoopHandle {
        let mut camera = camera;
        camera.acquire().await.unwrap();
        let estimator = SyntheticPoseEstimator::with_settings(pose, &PoseConfig::default()).unwrap();
        RenderLoop::spawn(
            RenderLoopConfig::default(),
            Box::new(camera),
            Box::new(estimator),
            controller,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_draws_and_dispatches_only_when_detecting() {
        let service = Arc::new(ScriptedService::with_results(
            (0..100).map(|i| analysis(0.9, i)).collect(),
        ));
        let controller = SessionController::new(service.clone(), 100);
        controller.camera_granted();
        controller.select_activity(Some(Activity::Squats)).await.unwrap();

        let camera = SyntheticCamera::new(SyntheticCameraConfig {
            width: 32,
            height: 18,
            ..Default::default()
        });
        let counters = camera.counters();
        let handle = running_loop(camera, SyntheticPoseSettings::default(), controller.clone()).await;
        let stats = handle.stats();

        // Idle: frames render but nothing is sent
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(stats.not_ready() > 0);
        assert!(stats.cycles() > 0);
        assert_eq!(service.analyze_calls(), 0);
        assert!(handle.frames().borrow().is_some());

        controller.start().unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        let sent = service.analyze_calls();
        assert!(sent > 0 && sent <= 11, "sent {}", sent);
        assert_eq!(controller.snapshot().status, WorkoutStatus::Detecting);

        // Paused: rendering continues, dispatch stops
        controller.pause().unwrap();
        let cycles = stats.cycles();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(stats.cycles() > cycles);
        assert_eq!(service.analyze_calls(), sent);

        let report = handle.shutdown().await;
        assert!(report.is_clean());
        assert_eq!(counters.releases(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detection_rate_is_capped() {
        let service = Arc::new(ScriptedService::default());
        let controller = SessionController::new(service, 100);
        let camera = SyntheticCamera::new(SyntheticCameraConfig {
            width: 8,
            height: 8,
            warmup: Duration::ZERO,
            ..Default::default()
        });
        let handle = running_loop(camera, SyntheticPoseSettings::default(), controller).await;
        let stats = handle.stats();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(stats.ticks() >= 590);
        assert!(stats.cycles() <= 152, "cycles {}", stats.cycles());
        assert!(stats.cycles() >= 140, "cycles {}", stats.cycles());
        assert_eq!(stats.detections(), stats.cycles());

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_attempts_every_release() {
        let controller = SessionController::new(Arc::new(ScriptedService::default()), 100);
        let camera = SyntheticCamera::new(SyntheticCameraConfig {
            width: 8,
            height: 8,
            fail_release: true,
            ..Default::default()
        });
        let counters = camera.counters();
        let settings = SyntheticPoseSettings {
            fail_dispose: true,
            ..Default::default()
        };

        let mut camera = camera;
        camera.acquire().await.unwrap();
        let estimator =
            SyntheticPoseEstimator::with_settings(settings, &PoseConfig::default()).unwrap();
        let disposals = estimator.disposals();
        let handle = RenderLoop::spawn(
            RenderLoopConfig::default(),
            Box::new(camera),
            Box::new(estimator),
            controller,
        );

        tokio::time::sleep(Duration::from_millis(500)).await;
        let report = handle.shutdown().await;

        assert!(report.scheduling_error.is_none());
        assert!(report.camera_error.is_some());
        assert!(report.estimator_error.is_some());
        assert_eq!(counters.releases(), 1);
        assert_eq!(disposals.load(Ordering::SeqCst), 1);
    }

    /// Blocks inside `detect` until the test lets it go
    struct StuckEstimator {
        entered: std::sync::mpsc::Sender<()>,
        release: std::sync::mpsc::Receiver<()>,
    }

    impl PoseEstimator for StuckEstimator {
        fn initialize(_config: &PoseConfig) -> PoseResult<Self> {
            Err(PoseError::ModelLoadFailed("built directly in tests".into()))
        }

        fn detect(&mut self, _frame: &RawFrame, _timestamp_ms: u64) -> PoseResult<Option<PoseFrame>> {
            let _ = self.entered.send(());
            let _ = self.release.recv();
            Ok(None)
        }

        fn dispose(&mut self) -> PoseResult<()> {
            Ok(())
        }

        fn is_initialized(&self) -> bool {
            true
        }

        fn get_model_info(&self) -> String {
            "stuck".to_string()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_teardown_is_bounded_when_detection_hangs() {
        let controller = SessionController::new(Arc::new(ScriptedService::default()), 100);
        let mut camera = SyntheticCamera::new(SyntheticCameraConfig {
            width: 8,
            height: 8,
            warmup: Duration::ZERO,
            ..Default::default()
        });
        let counters = camera.counters();
        camera.acquire().await.unwrap();

        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let handle = RenderLoop::spawn(
            RenderLoopConfig::default(),
            Box::new(camera),
            Box::new(StuckEstimator {
                entered: entered_tx,
                release: release_rx,
            }),
            controller,
        );
        tokio::task::spawn_blocking(move || entered_rx.recv_timeout(Duration::from_secs(5)))
            .await
            .unwrap()
            .unwrap();

        let started = std::time::Instant::now();
        let report = handle.shutdown().await;
        let elapsed = started.elapsed();
        release_tx.send(()).unwrap();

        assert!(elapsed < Duration::from_secs(4), "teardown took {:?}", elapsed);
        assert!(report.scheduling_error.is_some());
        assert!(report.camera_error.is_none());
        assert!(report.estimator_error.is_some());
        assert_eq!(counters.releases(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_body_renders_without_dispatch() {
        let service = Arc::new(ScriptedService::default());
        let controller = SessionController::new(service.clone(), 100);
        controller.camera_granted();
        controller.select_activity(Some(Activity::Squats)).await.unwrap();
        controller.start().unwrap();

        let camera = SyntheticCamera::new(SyntheticCameraConfig {
            width: 8,
            height: 8,
            ..Default::default()
        });
        let settings = SyntheticPoseSettings {
            body_present: false,
            ..Default::default()
        };
        let handle = running_loop(camera, settings, controller).await;
        let stats = handle.stats();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(stats.cycles() > 0);
        assert_eq!(stats.detections(), 0);
        assert_eq!(service.analyze_calls(), 0);
        let frame = handle.frames().borrow().clone().unwrap();
        assert!(frame.pose.is_none());

        handle.shutdown().await;
    }
}
