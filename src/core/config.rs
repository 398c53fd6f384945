use crate::models::dispatch_throttle::DispatchThrottle;
use crate::core::render_loop::{RenderLoopConfig, DEFAULT_FPS_LIMIT};
use crate::models::pose::{PoseConfig, DEFAULT_VISIBILITY_THRESHOLD};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Base URL of the analysis service (analyze / reset / health)
    pub service_base_url: String,
    /// Maximum detect-and-draw cycles per second
    pub fps_limit: u32,
    /// Native scheduling tick rate
    pub display_refresh_hz: u32,
    /// Minimum spacing between analysis requests
    pub dispatch_interval_ms: u64,
    /// Keypoints at or below this visibility are not drawn (0.0-1.0)
    pub visibility_threshold: f32,
    /// Per-request timeout for the analysis service
    pub request_timeout_ms: u64,
    /// How often to poll service health
    pub health_poll_interval_secs: u64,
    /// Mirror the camera image and overlay
    pub mirror_overlay: bool,
    pub camera_width: u32,
    pub camera_height: u32,
    /// Pose model parameters
    pub pose: PoseConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_base_url: "http://127.0.0.1:8000".to_string(),
            fps_limit: DEFAULT_FPS_LIMIT,
            display_refresh_hz: 60,
            dispatch_interval_ms: DispatchThrottle::DEFAULT_INTERVAL_MS,
            visibility_threshold: DEFAULT_VISIBILITY_THRESHOLD,
            request_timeout_ms: 5000,
            health_poll_interval_secs: 30,
            mirror_overlay: true,
            camera_width: 1280,
            camera_height: 720,
            pose: PoseConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file, creating with defaults if it doesn't exist.
    /// Environment overrides are applied on top.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = Self::load_from(&Self::get_config_path()?)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, writing defaults there if it is missing
    pub fn load_from(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&contents)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;

        Ok(())
    }

    /// Apply `WORKOUT_POSE_*` environment overrides
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup. Values that don't parse are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("WORKOUT_POSE_SERVICE_URL") {
            if !url.trim().is_empty() {
                self.service_base_url = url.trim().to_string();
            }
        }
        if let Some(fps) = lookup("WORKOUT_POSE_FPS_LIMIT").and_then(|v| v.trim().parse().ok()) {
            self.fps_limit = fps;
        }
        if let Some(ms) =
            lookup("WORKOUT_POSE_DISPATCH_INTERVAL_MS").and_then(|v| v.trim().parse().ok())
        {
            self.dispatch_interval_ms = ms;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.service_base_url.trim().is_empty() {
            return Err("Service base URL cannot be empty".into());
        }

        if self.fps_limit == 0 || self.fps_limit > 60 {
            return Err(format!(
                "Invalid FPS limit: {}. Must be between 1 and 60",
                self.fps_limit
            )
            .into());
        }

        if self.display_refresh_hz == 0 || self.display_refresh_hz > 240 {
            return Err(format!(
                "Invalid display refresh rate: {}. Must be between 1 and 240",
                self.display_refresh_hz
            )
            .into());
        }

        if !(10..=10_000).contains(&self.dispatch_interval_ms) {
            return Err(format!(
                "Invalid dispatch interval: {}ms. Must be between 10 and 10000",
                self.dispatch_interval_ms
            )
            .into());
        }

        if !(0.0..=1.0).contains(&self.visibility_threshold) {
            return Err(format!(
                "Invalid visibility threshold: {}. Must be between 0.0 and 1.0",
                self.visibility_threshold
            )
            .into());
        }

        if self.request_timeout_ms == 0 {
            return Err("Request timeout must be greater than zero".into());
        }

        if self.health_poll_interval_secs == 0 {
            return Err("Health poll interval must be greater than zero".into());
        }

        if self.camera_width == 0 || self.camera_height == 0 {
            return Err(format!(
                "Invalid camera resolution: {}x{}",
                self.camera_width, self.camera_height
            )
            .into());
        }

        self.pose.validate()?;

        Ok(())
    }

    /// Reset to default configuration
    pub fn reset() -> Result<Self, Box<dyn std::error::Error>> {
        let config = Self::default();
        config.save()?;
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn health_poll_interval(&self) -> Duration {
        Duration::from_secs(self.health_poll_interval_secs)
    }

    pub fn render_loop_config(&self) -> RenderLoopConfig {
        RenderLoopConfig {
            fps_limit: self.fps_limit,
            display_refresh_hz: self.display_refresh_hz,
            visibility_threshold: self.visibility_threshold,
            mirror: self.mirror_overlay,
            ..Default::default()
        }
    }

    /// Get the configuration file path
    fn get_config_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .map_err(|_| "Could not determine home directory")?;

        let mut path = PathBuf::from(home);
        path.push(".workout_pose");
        path.push("config");
        path.push("settings.json");

        Ok(path)
    }
}
