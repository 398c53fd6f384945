pub mod config;
pub mod frame_source;
pub mod remote_client;
pub mod session_controller;

// Rendering pipeline
pub mod overlay;
pub mod render_loop;

// Lifecycle and background tasks
pub mod health_monitor;
pub mod workout_view;
