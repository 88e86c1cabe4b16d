//! Error types for avatar-stream.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AvatarStreamError {
    // Configuration errors
    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio output errors
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio output failed: {message}")]
    AudioOutput { message: String },

    #[error("Unsupported audio format: {message}")]
    AudioFormat { message: String },

    // Stream telemetry errors
    #[error("No safe start index for stream: {details}")]
    UnexpectedStreamPlay { details: String },

    #[error("Out-of-order stream chunk: expected index {expected}, got {actual}")]
    OutOfOrderChunk { expected: u32, actual: u32 },

    // Runtime command errors
    #[error("Unknown runtime event code: {code}")]
    UnknownCommand { code: i64 },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, AvatarStreamError>;
