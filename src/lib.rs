pub mod core;
pub mod models;
pub mod platform;

pub use crate::core::config::Config;
pub use crate::core::frame_source::FrameSource;
pub use crate::core::remote_client::{AnalysisService, HttpAnalysisClient};
pub use crate::core::render_loop::{RenderedFrame, TeardownReport};
pub use crate::core::session_controller::SessionController;
pub use crate::core::workout_view::WorkoutView;
pub use crate::models::workout::{Activity, Feedback, WorkoutError, WorkoutSession, WorkoutStatus};
pub use crate::platform::pose::PoseEstimator;
