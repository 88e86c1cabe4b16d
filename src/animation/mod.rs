//! Animation buffers, blend curves, clips and pose blending.

pub mod blend;
pub mod clip;
pub mod control;
pub mod pose;

pub use blend::{BlendCurve, BlendMode, BlendPhase, ChannelBlend};
pub use clip::{AnimationClip, ClipLibrary, JointFrame, MorphFrame};
pub use control::{AnimationControl, BufferKind, Channel, ChannelClock, ChannelPhase, LoopRange};
pub use pose::{BlendedPose, Evaluation, Quat};
