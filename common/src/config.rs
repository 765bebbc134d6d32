use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Distinct frames admitted beyond the declared total before further
    /// frames are dropped. Bounds accumulator growth when a corrupt probe
    /// result or stray admitted frames would otherwise let it run away.
    #[serde(default = "default_accumulator_margin")]
    pub accumulator_margin: usize,
    /// Upper bound on a declared sequence total; anything above is treated
    /// as a corrupt probe result and the frame is ignored.
    #[serde(default = "default_max_declared_total")]
    pub max_declared_total: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    /// Detections buffered between the camera callback and the session
    /// worker. When full, new detections are dropped — the camera
    /// re-detects the same code several times per second.
    #[serde(default = "default_detection_buffer")]
    pub detection_buffer: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayConfig {
    /// Milliseconds between replayed detections (simulated camera rate).
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            accumulator_margin: default_accumulator_margin(),
            max_declared_total: default_max_declared_total(),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            detection_buffer: default_detection_buffer(),
        }
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: default_frame_interval_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
}

// Default value functions
fn default_accumulator_margin() -> usize {
    8
}
fn default_max_declared_total() -> usize {
    2048
}
fn default_detection_buffer() -> usize {
    16
}
fn default_frame_interval_ms() -> u64 {
    120
}
fn default_log_level() -> String {
    "info".into()
}
