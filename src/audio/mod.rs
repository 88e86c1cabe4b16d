//! PCM decoding, output devices and the continuous playback engine.

#[cfg(feature = "cpal-audio")]
pub mod cpal_output;
pub mod engine;
pub mod output;
pub mod pcm;

#[cfg(feature = "cpal-audio")]
pub use cpal_output::CpalAudioOutput;
pub use engine::{ContinuousPcmEngine, PlaybackState};
pub use output::{AudioOutput, CompletionCallback, MockAudioOutput, PlaybackSegment};
