use vigil_llm::Provider;

/// Tunables for frame acquisition and the vision model call, mirroring the
/// `Config` + `Default` + `validate()` shape used throughout this codebase.
#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub camera_fps: f64,
    pub retry_base_delay_secs: u64,
    pub retry_cap_secs: u64,
    pub retry_max_attempts: u32,
    pub frame_store_root: String,
    pub provider: Provider,
    pub model: String,
    pub call_deadline_secs: u64,
    pub rate_limit_per_minute: u32,
    pub enable_caching: bool,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            camera_fps: 0.033,
            retry_base_delay_secs: 1,
            retry_cap_secs: 30,
            retry_max_attempts: 6,
            frame_store_root: "./event_frames".to_string(),
            provider: Provider::Anthropic,
            model: "claude-3-haiku-20240307".to_string(),
            call_deadline_secs: 20,
            rate_limit_per_minute: 60,
            enable_caching: false,
        }
    }
}

impl VisionConfig {
    /// Overlays `VISION_MODEL`/`VISION_PROVIDER`/`CAMERA_FPS`/`FRAME_STORE_ROOT`
    /// on top of the defaults, same pattern as `VigilConfig::from_env`. An
    /// unrecognized `VISION_PROVIDER` value is ignored rather than rejected
    /// here; `validate()` is the place a bad config gets refused.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            camera_fps: std::env::var("CAMERA_FPS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.camera_fps),
            frame_store_root: std::env::var("FRAME_STORE_ROOT").unwrap_or(defaults.frame_store_root),
            provider: std::env::var("VISION_PROVIDER")
                .ok()
                .and_then(|v| Provider::from_str(&v))
                .unwrap_or(defaults.provider),
            model: std::env::var("VISION_MODEL").unwrap_or(defaults.model),
            ..defaults
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.camera_fps > 0.0 && self.camera_fps <= 30.0) {
            return Err(format!("camera_fps must be in (0, 30], got {}", self.camera_fps));
        }
        if self.retry_max_attempts == 0 {
            return Err("retry_max_attempts must be > 0".to_string());
        }
        if self.retry_cap_secs < self.retry_base_delay_secs {
            return Err("retry_cap_secs must be >= retry_base_delay_secs".to_string());
        }
        if self.frame_store_root.trim().is_empty() {
            return Err("frame_store_root must not be empty".to_string());
        }
        if self.rate_limit_per_minute == 0 {
            return Err("rate_limit_per_minute must be > 0".to_string());
        }
        Ok(())
    }
}
