//! Configuration for camera sessions and the simulated camera

use crate::camera::ColorMode;
use crate::capture::{CaptureSettings, ErrorPolicy};
use crate::session::SessionConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,

    #[serde(default)]
    pub simulator: SimulatorConfig,
}

/// Session and capture worker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// "rgb" or "black-and-white"
    #[serde(default)]
    pub color_mode: ColorMode,

    /// Wait after resetting the counters (milliseconds)
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Bound on each capture lock attempt (milliseconds)
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Bound on acquiring the capture lock during setup (milliseconds)
    #[serde(default = "default_setup_lock_timeout_ms")]
    pub setup_lock_timeout_ms: u64,

    /// "halt" or "continue"
    #[serde(default)]
    pub on_capture_error: ErrorPolicy,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            color_mode: ColorMode::default(),
            settle_delay_ms: default_settle_delay_ms(),
            lock_timeout_ms: default_lock_timeout_ms(),
            setup_lock_timeout_ms: default_setup_lock_timeout_ms(),
            on_capture_error: ErrorPolicy::default(),
        }
    }
}

impl CameraConfig {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            color_mode: self.color_mode,
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            setup_lock_timeout: Duration::from_millis(self.setup_lock_timeout_ms),
            capture: CaptureSettings {
                lock_timeout: Duration::from_millis(self.lock_timeout_ms),
                on_error: self.on_capture_error,
            },
        }
    }
}

/// Simulated camera used when no hardware is attached
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Frame width in pixels
    #[serde(default = "default_width")]
    pub width: u32,

    /// Frame height in rows
    #[serde(default = "default_height")]
    pub height: u32,

    /// Sensor frame rate
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Fail image reads after this many frames (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_after: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            fail_after: None,
        }
    }
}

impl SimulatorConfig {
    pub fn readout(&self) -> Duration {
        Duration::from_secs(1) / self.fps.max(1)
    }
}

/// Largest simulated frame edge, in pixels
const MAX_SIMULATOR_DIMENSION: u32 = 8192;

// Default value functions
fn default_settle_delay_ms() -> u64 {
    500
}
fn default_lock_timeout_ms() -> u64 {
    100
}
fn default_setup_lock_timeout_ms() -> u64 {
    1000
}
fn default_width() -> u32 {
    640
}
fn default_height() -> u32 {
    480
}
fn default_fps() -> u32 {
    30
}

impl Config {
    /// Loads configuration from TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Loads configuration from TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates configuration
    fn validate(&self) -> Result<(), ConfigError> {
        let cam = &self.camera;

        if cam.lock_timeout_ms == 0 || cam.lock_timeout_ms > 10_000 {
            return Err(ConfigError::Invalid(format!(
                "lock_timeout_ms must be between 1 and 10000, got {}",
                cam.lock_timeout_ms
            )));
        }

        if cam.setup_lock_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "setup_lock_timeout_ms must be > 0".to_string(),
            ));
        }

        if cam.settle_delay_ms > 60_000 {
            return Err(ConfigError::Invalid(format!(
                "settle_delay_ms must be at most 60000, got {}",
                cam.settle_delay_ms
            )));
        }

        let sim = &self.simulator;
        if sim.width == 0 || sim.height == 0 {
            return Err(ConfigError::Invalid(
                "simulator: width and height must be > 0".to_string(),
            ));
        }

        if sim.width > MAX_SIMULATOR_DIMENSION || sim.height > MAX_SIMULATOR_DIMENSION {
            return Err(ConfigError::Invalid(format!(
                "simulator: width and height must be at most {}, got {}x{}",
                MAX_SIMULATOR_DIMENSION, sim.width, sim.height
            )));
        }

        if sim.fps == 0 || sim.fps > 240 {
            return Err(ConfigError::Invalid(format!(
                "simulator: FPS must be between 1 and 240, got {}",
                sim.fps
            )));
        }

        Ok(())
    }

    /// Saves configuration to TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
