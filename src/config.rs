// src/config.rs
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Environment variable that points at an explicit config file.
pub const CONFIG_ENV_VAR: &str = "OKTRIX_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub environment: EnvironmentConfig,
    pub dispatch: DispatchConfig,
    pub media: MediaConfig,
    pub tracking_loop: LoopConfig,
}

/// Thresholds and timings of the per-frame gesture pipeline.
///
/// Distances are in normalized image units, times in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub motion_buffer_size: usize,
    pub min_stable_frames: usize,
    pub hold_duration: f64,
    pub hold_grace: f64,
    pub gesture_cooldown: f64,
    pub warmup_delay: f64,
    pub swipe_threshold: f64,
    pub play_pause_threshold: f64,
    pub classifier: ClassifierConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub open_hand_distance: f64,
    pub ok_pinch_distance: f64,
    pub ok_extension_distance: f64,
    pub play_pause_distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub dark_below: u8,
    pub bright_above: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Upper bound on a single executor call before it is abandoned.
    pub timeout_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub detection_cooldown_secs: f64,
    pub window_focus_delay_ms: u64,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Stop the worker after this many failed frames in a row. `None` keeps
    /// it running through any number of failures.
    pub max_consecutive_failures: Option<u32>,
    pub metrics_log_interval: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            motion_buffer_size: 5,
            min_stable_frames: 3,
            hold_duration: 3.0,
            hold_grace: 0.3,
            gesture_cooldown: 0.7,
            warmup_delay: 0.6,
            swipe_threshold: 0.12,
            play_pause_threshold: 0.05,
            classifier: ClassifierConfig::default(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            open_hand_distance: 0.3,
            ok_pinch_distance: 0.06,
            ok_extension_distance: 0.38,
            play_pause_distance: 0.06,
        }
    }
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            dark_below: 50,
            bright_above: 200,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { timeout_secs: 2.0 }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            detection_cooldown_secs: 2.0,
            window_focus_delay_ms: 150,
            dry_run: true,
        }
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: None,
            metrics_log_interval: 300,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.motion_buffer_size == 0 {
            return Err(Error::Config("motion_buffer_size must be at least 1".into()));
        }
        if self.min_stable_frames > self.motion_buffer_size {
            return Err(Error::Config(format!(
                "min_stable_frames ({}) exceeds motion_buffer_size ({})",
                self.min_stable_frames, self.motion_buffer_size
            )));
        }
        let timings = [
            ("hold_duration", self.hold_duration),
            ("gesture_cooldown", self.gesture_cooldown),
        ];
        for (name, value) in timings {
            if !(value > 0.0) {
                return Err(Error::Config(format!("{} must be positive, got {}", name, value)));
            }
        }
        let non_negative = [
            ("hold_grace", self.hold_grace),
            ("warmup_delay", self.warmup_delay),
            ("swipe_threshold", self.swipe_threshold),
            ("play_pause_threshold", self.play_pause_threshold),
        ];
        for (name, value) in non_negative {
            if !(value >= 0.0) {
                return Err(Error::Config(format!("{} must not be negative, got {}", name, value)));
            }
        }
        Ok(())
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        if self.environment.dark_below > self.environment.bright_above {
            return Err(Error::Config(
                "environment.dark_below must not exceed bright_above".into(),
            ));
        }
        check_seconds("dispatch.timeout_secs", self.dispatch.timeout_secs, false)?;
        check_seconds(
            "media.detection_cooldown_secs",
            self.media.detection_cooldown_secs,
            true,
        )?;
        Ok(())
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Resolves the config file: explicit path, then `$OKTRIX_CONFIG`, then
    /// the platform config directory. A missing default file yields defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            return Self::from_file(PathBuf::from(path));
        }
        match default_config_path() {
            Some(path) if path.exists() => Self::from_file(path),
            other => {
                debug!(candidate = ?other, "No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }
}

/// Longest duration a config value may ask for.
pub const MAX_SECONDS: f64 = 3600.0;

fn check_seconds(name: &str, value: f64, zero_ok: bool) -> Result<()> {
    let lower_ok = if zero_ok { value >= 0.0 } else { value > 0.0 };
    if lower_ok && value <= MAX_SECONDS {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "{} must be between 0 and {} seconds, got {}",
            name, MAX_SECONDS, value
        )))
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("com", "oktrix", "oktrix")
        .map(|dirs| dirs.config_dir().join("config.json"))
}
