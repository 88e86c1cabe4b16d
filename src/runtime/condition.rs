//! Lifecycle conditions raised back to the dialogue state machine.

use crossbeam_channel::Sender;
use serde::Serialize;
use std::fmt;
use std::sync::Mutex;

/// Lifecycle signal, numbered the way the dialogue state machine expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Condition {
    /// Both channels of the target buffer finished.
    AnimationFinished,
    JointAnimationFinished,
    MorphAnimationFinished,
    /// Streamed joint data ran out before the stream ended. Recoverable.
    JointStreamBroken,
    /// Streamed morph data ran out before the stream ended. Recoverable.
    MorphStreamBroken,
}

impl Condition {
    pub fn code(self) -> u32 {
        match self {
            Condition::AnimationFinished => 17,
            Condition::JointAnimationFinished => 20,
            Condition::MorphAnimationFinished => 21,
            Condition::JointStreamBroken => 22,
            Condition::MorphStreamBroken => 23,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Condition::AnimationFinished => "ANIMATION_FINISHED",
            Condition::JointAnimationFinished => "JOINT_ANIMATION_FINISHED",
            Condition::MorphAnimationFinished => "MORPH_ANIMATION_FINISHED",
            Condition::JointStreamBroken => "JOINT_STREAM_BROKEN",
            Condition::MorphStreamBroken => "MORPH_STREAM_BROKEN",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A condition plus a human-readable note.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionedMessage {
    pub condition: Condition,
    pub message: String,
}

impl ConditionedMessage {
    pub fn new(condition: Condition, message: impl Into<String>) -> Self {
        Self {
            condition,
            message: message.into(),
        }
    }

    /// JSON form used in the dialogue state machine's log.
    pub fn to_json(&self) -> String {
        serde_json::json!({
            "condition": self.condition.code(),
            "condition_name": self.condition.name(),
            "data": { "message": self.message },
        })
        .to_string()
    }
}

/// Trait for receiving lifecycle conditions from the runtime.
pub trait ConditionSink: Send + Sync {
    fn raise(&self, message: ConditionedMessage);
}

impl ConditionSink for Sender<ConditionedMessage> {
    fn raise(&self, message: ConditionedMessage) {
        if let Err(e) = self.send(message) {
            tracing::debug!(condition = %e.0.condition, "Condition receiver dropped");
        }
    }
}

/// Sink that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl ConditionSink for LogSink {
    fn raise(&self, message: ConditionedMessage) {
        tracing::info!(
            condition = %message.condition,
            code = message.condition.code(),
            "{}",
            message.message
        );
    }
}

/// Sink that collects messages in memory (useful for testing).
#[derive(Debug, Default)]
pub struct CollectorSink {
    messages: Mutex<Vec<ConditionedMessage>>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<ConditionedMessage> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    /// How many times `condition` has been raised.
    pub fn count(&self, condition: Condition) -> usize {
        self.messages()
            .iter()
            .filter(|m| m.condition == condition)
            .count()
    }

    pub fn clear(&self) {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl ConditionSink for CollectorSink {
    fn raise(&self, message: ConditionedMessage) {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message);
    }
}
