use crate::animation::blend::BlendCurve;
use crate::defaults;
use crate::error::{AvatarStreamError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
#[cfg(feature = "config-path")]
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub runtime: RuntimeConfig,
    pub audio: AudioConfig,
    pub estimator: EstimatorConfig,
}

/// Animation blend runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub intrinsic_frame_rate: f64,
    pub time_scale: f64,
    pub blend_in_time: f64,
    pub blend_out_time: f64,
    pub blend_curve: BlendCurve,
}

/// PCM playback configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub playback_rate: f64,
}

/// Buffer-size estimator configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EstimatorConfig {
    pub weight: f64,
    pub max_samples: usize,
    pub safe_rate: f64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            intrinsic_frame_rate: defaults::INTRINSIC_FRAME_RATE,
            time_scale: defaults::TIME_SCALE,
            blend_in_time: defaults::BLEND_IN_TIME,
            blend_out_time: defaults::BLEND_OUT_TIME,
            blend_curve: BlendCurve::Linear,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            channels: defaults::CHANNELS,
            playback_rate: defaults::PLAYBACK_RATE,
        }
    }
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            weight: defaults::ESTIMATOR_WEIGHT,
            max_samples: defaults::ESTIMATOR_MAX_SAMPLES,
            safe_rate: defaults::ESTIMATOR_SAFE_RATE,
        }
    }
}

fn invalid(key: &str, message: &str) -> AvatarStreamError {
    AvatarStreamError::ConfigInvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

impl RuntimeConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.intrinsic_frame_rate > 0.0) {
            return Err(invalid("runtime.intrinsic_frame_rate", "must be positive"));
        }
        if !(self.time_scale > 0.0) {
            return Err(invalid("runtime.time_scale", "must be positive"));
        }
        if !(self.blend_in_time > 0.0) {
            return Err(invalid("runtime.blend_in_time", "must be positive"));
        }
        if !(self.blend_out_time > 0.0) {
            return Err(invalid("runtime.blend_out_time", "must be positive"));
        }
        Ok(())
    }
}

impl AudioConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(invalid("audio.sample_rate", "must be positive"));
        }
        if self.channels == 0 {
            return Err(invalid("audio.channels", "must be positive"));
        }
        if !(self.playback_rate > 0.0) {
            return Err(invalid("audio.playback_rate", "must be positive"));
        }
        Ok(())
    }
}

impl EstimatorConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.weight > 0.0 && self.weight <= 1.0) {
            return Err(invalid("estimator.weight", "must be in (0, 1]"));
        }
        if self.max_samples == 0 {
            return Err(invalid("estimator.max_samples", "must be positive"));
        }
        if !(self.safe_rate > 0.0 && self.safe_rate <= 1.0) {
            return Err(invalid("estimator.safe_rate", "must be in (0, 1]"));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if the file doesn't exist
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => Ok(toml::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - AVATAR_STREAM_TIME_SCALE → runtime.time_scale
    /// - AVATAR_STREAM_SAMPLE_RATE → audio.sample_rate
    /// - AVATAR_STREAM_CHANNELS → audio.channels
    ///
    /// Values that fail to parse are ignored.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(scale) = std::env::var("AVATAR_STREAM_TIME_SCALE")
            && let Ok(scale) = scale.trim().parse::<f64>()
        {
            self.runtime.time_scale = scale;
        }

        if let Ok(rate) = std::env::var("AVATAR_STREAM_SAMPLE_RATE")
            && let Ok(rate) = rate.trim().parse::<u32>()
        {
            self.audio.sample_rate = rate;
        }

        if let Ok(channels) = std::env::var("AVATAR_STREAM_CHANNELS")
            && let Ok(channels) = channels.trim().parse::<u16>()
        {
            self.audio.channels = channels;
        }

        self
    }

    /// Check every section for out-of-range values.
    pub fn validate(&self) -> Result<()> {
        self.runtime.validate()?;
        self.audio.validate()?;
        self.estimator.validate()
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/avatar-stream/config.toml on Linux, or `None` when the
    /// platform has no config directory.
    #[cfg(feature = "config-path")]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("avatar-stream").join("config.toml"))
    }
}
