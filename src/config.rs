// SPDX-License-Identifier: GPL-3.0-only

//! User configuration
//!
//! Read from `config.toml` in the user config directory. Every field is
//! optional; missing fields take the values from [`crate::constants`].

use crate::constants::{self, APP_DIR_NAME};
use crate::errors::{AppError, AppResult};
use crate::pipelines::keyboard::KeyLayout;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Which depth source feeds the pipeline
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Live Kinect via freedepth
    #[default]
    Kinect,
    /// Raw frame dump written by `keyboard-anywhere record`
    Replay,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Config {
    pub sensor: SensorConfig,
    pub keyboard: KeyboardConfig,
    pub detection: DetectionConfig,
    pub audio: AudioConfig,
    pub calibration: CalibrationConfig,
    pub viewer: ViewerConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Depth source backend
    pub source: SourceKind,
    /// freedepth device index
    pub device_index: usize,
    /// Replay file (required when `source = "replay"`)
    pub replay_path: Option<PathBuf>,
    /// Divide depth map resolution by this amount
    pub stride: usize,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::default(),
            device_index: constants::sensor::DEFAULT_DEVICE_INDEX,
            replay_path: None,
            stride: constants::sensor::DEFAULT_STRIDE,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct KeyboardConfig {
    /// Number of white keys
    pub num_keys: usize,
    /// Offset into the white note table (0 = C2)
    pub start_key: usize,
    /// Keyboard width as a fraction of its length
    pub width_factor: f32,
    /// Keyboard height as a fraction of its length
    pub height_factor: f32,
    /// Gap between keys as a fraction of the keyboard length
    pub gap_factor: f32,
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        use constants::keyboard::*;
        Self {
            num_keys: DEFAULT_NUM_KEYS,
            start_key: DEFAULT_START_KEY,
            width_factor: DEFAULT_WIDTH_FACTOR,
            height_factor: DEFAULT_HEIGHT_FACTOR,
            gap_factor: DEFAULT_GAP_FACTOR,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// A key is pressed when strictly more points than this are inside it
    pub min_points: usize,
    pub press_debounce_ms: u64,
    pub release_debounce_ms: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        use constants::detection::*;
        Self {
            min_points: DEFAULT_MIN_POINTS,
            press_debounce_ms: DEFAULT_PRESS_DEBOUNCE.as_millis() as u64,
            release_debounce_ms: DEFAULT_RELEASE_DEBOUNCE.as_millis() as u64,
        }
    }
}

impl DetectionConfig {
    pub fn press_debounce(&self) -> Duration {
        Duration::from_millis(self.press_debounce_ms)
    }

    pub fn release_debounce(&self) -> Duration {
        Duration::from_millis(self.release_debounce_ms)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Send notes to MIDI (false = log only)
    pub enabled: bool,
    /// Substring of the MIDI output port name; first port when unset
    pub port: Option<String>,
    /// Create a virtual output port instead of connecting (unix only)
    pub virtual_port: bool,
    /// MIDI channel, 0-based
    pub channel: u8,
    pub velocity: u8,
    /// General MIDI program selected on connect
    pub program: u8,
}

impl Default for AudioConfig {
    fn default() -> Self {
        use constants::audio::*;
        Self {
            enabled: true,
            port: None,
            virtual_port: false,
            channel: DEFAULT_CHANNEL,
            velocity: DEFAULT_VELOCITY,
            program: DEFAULT_PROGRAM,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Transform file; defaults to the user data directory
    pub transform_path: Option<PathBuf>,
    pub roll_step_rad: f64,
    pub z_step_fraction: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        use constants::calibration::*;
        Self {
            transform_path: None,
            roll_step_rad: DEFAULT_ROLL_STEP_RAD,
            z_step_fraction: DEFAULT_Z_STEP_FRACTION,
        }
    }
}

impl CalibrationConfig {
    /// Resolved transform file location
    pub fn transform_path(&self) -> PathBuf {
        self.transform_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR_NAME)
                .join(constants::calibration::TRANSFORM_FILE_NAME)
        })
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Frame loop period in milliseconds
    pub frame_period_ms: u64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            frame_period_ms: constants::FRAME_PERIOD.as_millis() as u64,
        }
    }
}

impl ViewerConfig {
    pub fn frame_period(&self) -> Duration {
        Duration::from_millis(self.frame_period_ms.max(1))
    }
}

impl Config {
    /// Default config file location (`~/.config/keyboard-anywhere/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join("config.toml"))
    }

    /// Load and validate a config file
    pub fn load<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Load an explicit path, or the default file if it exists
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> AppResult<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => {
                info!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> AppResult<()> {
        if self.sensor.stride == 0 {
            return Err(AppError::Config("sensor.stride must be at least 1".into()));
        }
        if self.sensor.source == SourceKind::Replay && self.sensor.replay_path.is_none() {
            return Err(AppError::Config(
                "sensor.replay_path is required for the replay source".into(),
            ));
        }
        KeyLayout::from_config(&self.keyboard)?;
        if self.audio.channel > 15 {
            return Err(AppError::Config("audio.channel must be 0-15".into()));
        }
        if self.audio.velocity > 127 || self.audio.program > 127 {
            return Err(AppError::Config(
                "audio.velocity and audio.program must be 0-127".into(),
            ));
        }

        Ok(())
    }
}
