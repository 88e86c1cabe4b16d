//! Default configuration constants for avatar-stream.
//!
//! Shared by the config sections and the runtime components so both agree on
//! the same values when no configuration file is present.

/// Intrinsic animation frame rate in frames per second.
///
/// All frame-time cursors and durations are measured in frames at this rate.
pub const INTRINSIC_FRAME_RATE: f64 = 30.0;

/// Blend-in duration in seconds.
pub const BLEND_IN_TIME: f64 = 0.3;

/// Blend-out duration in seconds.
///
/// Longer than blend-in so the avatar settles back into idle gently.
pub const BLEND_OUT_TIME: f64 = 0.8;

/// Default animation time scale.
pub const TIME_SCALE: f64 = 1.0;

/// Default PCM sample rate in Hz.
///
/// The remote TTS service produces 16kHz mono speech unless told otherwise.
pub const SAMPLE_RATE: u32 = 16000;

/// Default PCM channel count.
pub const CHANNELS: u16 = 1;

/// Default audio playback rate.
pub const PLAYBACK_RATE: f64 = 1.0;

/// Exponential smoothing weight applied to new buffer-size percentiles.
pub const ESTIMATOR_WEIGHT: f64 = 0.5;

/// Maximum number of buffer-size samples kept in history.
pub const ESTIMATOR_MAX_SAMPLES: usize = 100;

/// Fraction of history samples considered trustworthy.
///
/// The most pessimistic `1 - safe_rate` share of samples is trimmed as outliers.
pub const ESTIMATOR_SAFE_RATE: f64 = 0.9;

/// Initial buffer-size estimate in seconds.
///
/// Any estimate below [`COLD_START_THRESHOLD`] means nothing has been learned yet.
pub const INITIAL_BUFFER_SIZE: f64 = 1e-6;

/// Estimates below this value are treated as a cold start.
pub const COLD_START_THRESHOLD: f64 = 1e-4;

/// Tolerance used when comparing accumulated floating-point timers.
pub const TIME_EPSILON: f64 = 1e-9;
