//! Network arrival telemetry, buffer-size estimation and stream health.

pub mod estimator;
pub mod health;
pub mod network;

pub use estimator::AdaptiveBufferSizeEstimator;
pub use health::StreamHealth;
pub use network::{NetworkStream, NetworkStreamChunk};
