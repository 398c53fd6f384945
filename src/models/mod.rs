// Data models for camera capture, pose estimation, remote analysis and workout sessions

pub mod capture;
pub mod dispatch_throttle;
pub mod pose;
pub mod remote;
pub mod workout;
