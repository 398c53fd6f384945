// Camera device implementations
// Each device implements the `FrameSource` interface defined in core/frame_source.rs

pub mod synthetic;

pub use synthetic::{CameraCounters, PermissionBehavior, SyntheticCamera, SyntheticCameraConfig};
