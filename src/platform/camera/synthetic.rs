// Synthetic camera: deterministic gradient test pattern with a warm-up period.
// Used as the default device when no native capture backend is linked in.

use crate::core::frame_source::FrameSource;
use crate::models::capture::{CaptureError, CaptureResult, RawFrame};
use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// How the synthetic device answers `acquire`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionBehavior {
    Grant,
    Deny,
    Fail(String),
}

#[derive(Debug, Clone)]
pub struct SyntheticCameraConfig {
    pub width: u32,
    pub height: u32,
    pub warmup: Duration,
    pub permission: PermissionBehavior,
    /// Make `release` report an error after stopping (teardown testing)
    pub fail_release: bool,
}

impl Default for SyntheticCameraConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 360,
            warmup: Duration::from_millis(200),
            permission: PermissionBehavior::Grant,
            fail_release: false,
        }
    }
}

/// Call counters shared with whoever created the camera
#[derive(Debug, Default)]
pub struct CameraCounters {
    pub acquires: AtomicUsize,
    pub releases: AtomicUsize,
    pub frames: AtomicUsize,
}

impl CameraCounters {
    pub fn acquires(&self) -> usize {
        self.acquires.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn frames(&self) -> usize {
        self.frames.load(Ordering::SeqCst)
    }
}

pub struct SyntheticCamera {
    config: SyntheticCameraConfig,
    started_at: Option<Instant>,
    frame_index: u32,
    counters: Arc<CameraCounters>,
}

impl SyntheticCamera {
    pub fn new(config: SyntheticCameraConfig) -> Self {
        Self {
            config,
            started_at: None,
            frame_index: 0,
            counters: Arc::new(CameraCounters::default()),
        }
    }

    pub fn counters(&self) -> Arc<CameraCounters> {
        self.counters.clone()
    }

    fn render_pattern(&self) -> RgbaImage {
        let (w, h) = (self.config.width.max(1), self.config.height.max(1));
        let shift = self.frame_index.wrapping_mul(3) % 256;
        RgbaImage::from_fn(w, h, |x, y| {
            let r = ((x * 255 / w) + shift) % 256;
            let g = (y * 255 / h) % 256;
            let b = (shift * 2) % 256;
            Rgba([r as u8, g as u8, b as u8, 255])
        })
    }
}

#[async_trait]
impl FrameSource for SyntheticCamera {
    async fn acquire(&mut self) -> CaptureResult<()> {
        self.counters.acquires.fetch_add(1, Ordering::SeqCst);

        match &self.config.permission {
            PermissionBehavior::Grant => {}
            PermissionBehavior::Deny => {
                return Err(CaptureError::PermissionDenied(
                    "user declined camera access".to_string(),
                ))
            }
            PermissionBehavior::Fail(reason) => {
                return Err(CaptureError::DeviceUnavailable(reason.clone()))
            }
        }

        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
            self.frame_index = 0;
        }
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.started_at
            .map(|started| started.elapsed() >= self.config.warmup)
            .unwrap_or(false)
    }

    fn current_frame(&mut self) -> CaptureResult<Option<RawFrame>> {
        if self.started_at.is_none() {
            return Err(CaptureError::NotCapturing);
        }
        if !self.is_ready() {
            return Ok(None);
        }

        let image = self.render_pattern();
        self.frame_index = self.frame_index.wrapping_add(1);
        self.counters.frames.fetch_add(1, Ordering::SeqCst);

        let timestamp = chrono::Utc::now().timestamp_millis();
        Ok(Some(RawFrame::from_rgba(image, timestamp)))
    }

    fn release(&mut self) -> CaptureResult<()> {
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
        self.started_at = None;

        if self.config.fail_release {
            return Err(CaptureError::CaptureFailed(
                "camera track refused to stop".to_string(),
            ));
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.started_at.is_some()
    }

    fn describe(&self) -> String {
        format!(
            "synthetic camera {}x{}",
            self.config.width, self.config.height
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config() -> SyntheticCameraConfig {
        SyntheticCameraConfig {
            width: 8,
            height: 4,
            warmup: Duration::from_millis(50),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_only_after_warmup() {
        let mut camera = SyntheticCamera::new(quick_config());
        assert!(matches!(camera.current_frame(), Err(CaptureError::NotCapturing)));

        camera.acquire().await.unwrap();
        assert!(camera.is_capturing());
        assert!(!camera.is_ready());
        assert!(camera.current_frame().unwrap().is_none());

        tokio::time::advance(Duration::from_millis(60)).await;
        assert!(camera.is_ready());
        let frame = camera.current_frame().unwrap().unwrap();
        assert_eq!((frame.width, frame.height), (8, 4));
        assert_eq!(camera.counters().frames(), 1);
    }

    #[tokio::test]
    async fn test_permission_denied() {
        let mut camera = SyntheticCamera::new(SyntheticCameraConfig {
            permission: PermissionBehavior::Deny,
            ..quick_config()
        });
        let err = camera.acquire().await.unwrap_err();
        assert!(matches!(err, CaptureError::PermissionDenied(_)));
        assert!(!camera.is_capturing());
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let mut camera = SyntheticCamera::new(quick_config());
        // Before acquire
        assert!(camera.release().is_ok());

        camera.acquire().await.unwrap();
        assert!(camera.release().is_ok());
        assert!(camera.release().is_ok());
        assert!(!camera.is_capturing());
        assert_eq!(camera.counters().releases(), 3);
    }

    #[test]
    fn test_pattern_changes_between_frames() {
        let mut camera = SyntheticCamera::new(quick_config());
        let first = camera.render_pattern();
        camera.frame_index += 1;
        let second = camera.render_pattern();
        assert_ne!(first, second);
    }
}
