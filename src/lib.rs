//! avatar-stream - Streaming animation and audio sync for a talking avatar
//!
//! Blends a looping idle animation against local or live-streamed clips,
//! sizes the network pre-buffer from arrival telemetry, and plays PCM audio
//! that arrives in arbitrary chunks without gaps.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod animation;
pub mod audio;
pub mod config;
pub mod defaults;
pub mod error;
pub mod runtime;
pub mod stream;

// Runtime (command queue → tick → conditions)
pub use runtime::{
    AnimationBlendRuntime, CollectorSink, CommandSender, Condition, ConditionSink,
    ConditionedMessage, DelayScheduler, RuntimeCommand, ThreadScheduler,
};

// Animation data
pub use animation::{AnimationClip, BlendCurve, BlendMode, BlendedPose, Evaluation};

// Audio
#[cfg(feature = "cpal-audio")]
pub use audio::CpalAudioOutput;
pub use audio::{AudioOutput, ContinuousPcmEngine, MockAudioOutput, PlaybackState};

// Stream telemetry
pub use stream::{AdaptiveBufferSizeEstimator, NetworkStream, StreamHealth};

// Error handling
pub use error::{AvatarStreamError, Result};

// Config
pub use config::Config;
