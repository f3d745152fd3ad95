use crate::error::{Error, Result};
use std::env;
use std::time::Duration;

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Tunables for the decision pipeline, sourced from environment keys.
/// Every field has a documented default, so a deployment with no
/// environment overrides still produces the reference behavior.
#[derive(Debug, Clone)]
pub struct VigilConfig {
    pub camera_fps: f64,
    pub object_threshold: u8,
    pub activity_threshold: u8,
    pub undirected_immediate_threshold: u8,
    pub summary_collect_threshold: u8,
    pub summary_interval_seconds: u64,
    pub baseline_stability_frames: u32,
    pub history_window: usize,
    pub alert_ring_capacity: usize,
    pub frame_store_root: String,
    pub http_addr: String,
}

impl Default for VigilConfig {
    fn default() -> Self {
        Self {
            camera_fps: 0.033,
            object_threshold: 60,
            activity_threshold: 40,
            undirected_immediate_threshold: 60,
            summary_collect_threshold: 50,
            summary_interval_seconds: 120,
            baseline_stability_frames: 3,
            history_window: 8,
            alert_ring_capacity: 200,
            frame_store_root: "./event_frames".to_string(),
            http_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

impl VigilConfig {
    /// Builds a config from the process environment, overlaying defaults
    /// with any of the recognized `VIGIL_*`/documented keys that are set.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            camera_fps: env_parse("CAMERA_FPS", defaults.camera_fps),
            object_threshold: env_parse("OBJECT_THRESHOLD", defaults.object_threshold),
            activity_threshold: env_parse("ACTIVITY_THRESHOLD", defaults.activity_threshold),
            undirected_immediate_threshold: env_parse(
                "UNDIRECTED_IMMEDIATE_THRESHOLD",
                defaults.undirected_immediate_threshold,
            ),
            summary_collect_threshold: env_parse(
                "SUMMARY_COLLECT_THRESHOLD",
                defaults.summary_collect_threshold,
            ),
            summary_interval_seconds: env_parse(
                "SUMMARY_INTERVAL_SECONDS",
                defaults.summary_interval_seconds,
            ),
            baseline_stability_frames: env_parse(
                "BASELINE_STABILITY_FRAMES",
                defaults.baseline_stability_frames,
            ),
            history_window: env_parse("HISTORY_WINDOW", defaults.history_window),
            alert_ring_capacity: env_parse("ALERT_RING_CAPACITY", defaults.alert_ring_capacity),
            frame_store_root: env_string("FRAME_STORE_ROOT", &defaults.frame_store_root),
            http_addr: env_string("VIGIL_HTTP_ADDR", &defaults.http_addr),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.camera_fps > 0.0 && self.camera_fps <= 30.0) {
            return Err(Error::Configuration(format!(
                "camera_fps must be in (0, 30], got {}",
                self.camera_fps
            )));
        }
        if self.object_threshold > 100 {
            return Err(Error::Configuration(
                "object_threshold must be <= 100".to_string(),
            ));
        }
        if self.activity_threshold > 100 {
            return Err(Error::Configuration(
                "activity_threshold must be <= 100".to_string(),
            ));
        }
        if self.undirected_immediate_threshold > 100 {
            return Err(Error::Configuration(
                "undirected_immediate_threshold must be <= 100".to_string(),
            ));
        }
        if self.summary_collect_threshold > 100 {
            return Err(Error::Configuration(
                "summary_collect_threshold must be <= 100".to_string(),
            ));
        }
        if self.summary_interval_seconds == 0 {
            return Err(Error::Configuration(
                "summary_interval_seconds must be > 0".to_string(),
            ));
        }
        if self.baseline_stability_frames == 0 {
            return Err(Error::Configuration(
                "baseline_stability_frames must be > 0".to_string(),
            ));
        }
        if self.history_window == 0 {
            return Err(Error::Configuration(
                "history_window must be > 0".to_string(),
            ));
        }
        if self.alert_ring_capacity == 0 {
            return Err(Error::Configuration(
                "alert_ring_capacity must be > 0".to_string(),
            ));
        }
        if self.frame_store_root.trim().is_empty() {
            return Err(Error::Configuration(
                "frame_store_root must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.camera_fps)
    }

    pub fn summary_interval(&self) -> Duration {
        Duration::from_secs(self.summary_interval_seconds)
    }
}
