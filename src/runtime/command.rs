//! Commands the dialogue state machine sends to the blend runtime.

use crate::animation::blend::{BlendCurve, BlendMode};
use crate::animation::control::BufferKind;
use crate::error::{AvatarStreamError, Result};
use crossbeam_channel::Sender;
use std::time::Duration;

/// Buffer that can be switched onto the right-hand side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetBuffer {
    Local,
    Streamed,
}

impl From<TargetBuffer> for BufferKind {
    fn from(target: TargetBuffer) -> Self {
        match target {
            TargetBuffer::Local => BufferKind::Local,
            TargetBuffer::Streamed => BufferKind::Streamed,
        }
    }
}

/// Channel addressed by a delayed or explicit resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayChannel {
    Joint,
    Morph,
    Audio,
}

/// State transitions applied at the start of the next tick, in send order.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeCommand {
    /// Put `target` on the right-hand side from frame zero and blend it in.
    SwitchTarget {
        target: TargetBuffer,
        blend_in: BlendMode,
        blend_out: BlendMode,
    },
    /// Blend the current target out now. `Hard` drops it on the next evaluation.
    Interrupt(BlendMode),
    SetLoopable(bool),
    SetBlendCurve(BlendCurve),
    /// No more streamed data will arrive; running out now means finished.
    MarkStreamEnded,
    /// Pause audio now (audio only) and resume `channel` after `delay`.
    DelayedPlay {
        channel: PlayChannel,
        delay: Duration,
    },
    /// Resume one channel. Sent by delayed-play timers; idempotent.
    ResumeChannel(PlayChannel),
    /// Pause both target channels and audio together.
    PauseAll,
    /// Resume both target channels and audio together.
    ResumeAll,
}

impl RuntimeCommand {
    /// Map a numeric event code from the dialogue state machine.
    ///
    /// Codes 13 to 15 are delayed plays and take `delay_ms` (zero when absent).
    /// Any other unknown code is a programming error on the sending side.
    pub fn from_event_code(code: i64, delay_ms: Option<u64>) -> Result<Self> {
        use BlendMode::{Hard, Soft};

        let switch = |target, blend_in, blend_out| RuntimeCommand::SwitchTarget {
            target,
            blend_in,
            blend_out,
        };
        let delayed = |channel| RuntimeCommand::DelayedPlay {
            channel,
            delay: Duration::from_millis(delay_ms.unwrap_or(0)),
        };

        let command = match code {
            0 => switch(TargetBuffer::Local, Soft, Soft),
            1 => switch(TargetBuffer::Local, Soft, Hard),
            2 => switch(TargetBuffer::Local, Hard, Soft),
            3 => switch(TargetBuffer::Streamed, Soft, Soft),
            4 => switch(TargetBuffer::Streamed, Soft, Hard),
            5 => switch(TargetBuffer::Streamed, Hard, Soft),
            6 => RuntimeCommand::Interrupt(Soft),
            7 => RuntimeCommand::Interrupt(Hard),
            8 => RuntimeCommand::SetLoopable(true),
            9 => RuntimeCommand::SetLoopable(false),
            10 => RuntimeCommand::SetBlendCurve(BlendCurve::Linear),
            11 => RuntimeCommand::SetBlendCurve(BlendCurve::Cubic),
            12 => RuntimeCommand::MarkStreamEnded,
            13 => delayed(PlayChannel::Joint),
            14 => delayed(PlayChannel::Morph),
            15 => delayed(PlayChannel::Audio),
            16 => RuntimeCommand::PauseAll,
            17 => RuntimeCommand::ResumeAll,
            _ => return Err(AvatarStreamError::UnknownCommand { code }),
        };
        Ok(command)
    }
}

/// Cloneable handle for enqueueing commands from any thread.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: Sender<RuntimeCommand>,
}

impl CommandSender {
    pub(crate) fn new(tx: Sender<RuntimeCommand>) -> Self {
        Self { tx }
    }

    /// Enqueue a command. Fails only when the runtime has been dropped.
    pub fn send(&self, command: RuntimeCommand) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| AvatarStreamError::Other("blend runtime has shut down".to_string()))
    }

    /// Decode and enqueue a numeric event.
    pub fn send_event_code(&self, code: i64, delay_ms: Option<u64>) -> Result<()> {
        self.send(RuntimeCommand::from_event_code(code, delay_ms)?)
    }
}
