// Frame source abstraction layer - unified interface over live video feeds

use crate::models::capture::{CaptureResult, RawFrame};
use async_trait::async_trait;

/// Permission-gated live video feed.
///
/// `acquire` asks for camera access and starts streaming. A denial surfaces as
/// `CaptureError::PermissionDenied` and must not be retried automatically.
/// Once granted, frames can be polled; the source may take a while to deliver
/// its first frame, which `is_ready` reports.
#[async_trait]
pub trait FrameSource: Send {
    /// Request camera access and start the stream
    async fn acquire(&mut self) -> CaptureResult<()>;

    /// Whether the stream has a frame available
    fn is_ready(&self) -> bool;

    /// Latest frame, or `None` while the stream is still warming up
    fn current_frame(&mut self) -> CaptureResult<Option<RawFrame>>;

    /// Stop all underlying capture.
    /// Idempotent, and safe to call when `acquire` never completed.
    fn release(&mut self) -> CaptureResult<()>;

    /// Check if currently capturing
    fn is_capturing(&self) -> bool;

    /// Human-readable device description for logs
    fn describe(&self) -> String;
}
