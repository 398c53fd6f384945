// Device backends: camera frame sources and pose estimators

pub mod camera;
pub mod pose;
