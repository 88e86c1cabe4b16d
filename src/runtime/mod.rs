//! Blend runtime, its command queue and lifecycle conditions.

pub mod blend_runtime;
pub mod command;
pub mod condition;
pub mod timer;

pub use blend_runtime::AnimationBlendRuntime;
pub use command::{CommandSender, PlayChannel, RuntimeCommand, TargetBuffer};
pub use condition::{CollectorSink, Condition, ConditionSink, ConditionedMessage, LogSink};
pub use timer::{DelayScheduler, ManualScheduler, ThreadScheduler};
