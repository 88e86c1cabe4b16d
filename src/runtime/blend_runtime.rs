//! Dual-buffer blend state machine.
//!
//! The left-hand side is always the looping idle buffer. The right-hand side is
//! the local or streamed buffer, switched by commands. Each tick drains the
//! command queue, advances the clocks of both sides and computes one blend
//! weight per channel. Lifecycle conditions go out through a [`ConditionSink`].

use crate::animation::blend::{BlendCurve, BlendMode, BlendPhase, ChannelBlend};
use crate::animation::clip::{AnimationClip, ClipLibrary, JointFrame, MorphFrame};
use crate::animation::control::{AnimationControl, BufferKind, Channel, ChannelPhase, LoopRange};
use crate::animation::pose::{self, BlendedPose, Evaluation};
use crate::audio::engine::ContinuousPcmEngine;
use crate::audio::output::AudioOutput;
use crate::config::{Config, RuntimeConfig};
use crate::defaults;
use crate::error::{AvatarStreamError, Result};
use crate::runtime::command::{CommandSender, PlayChannel, RuntimeCommand, TargetBuffer};
use crate::runtime::condition::{Condition, ConditionSink, ConditionedMessage};
use crate::runtime::timer::{DelayScheduler, ThreadScheduler};
use crate::stream::health::StreamHealth;
use crossbeam_channel::{Receiver, unbounded};
use std::collections::HashMap;
use std::sync::Arc;

const CHANNELS: [Channel; 2] = [Channel::Joint, Channel::Morph];

/// Snap `timer` onto `target` when float accumulation lands just short of it.
fn snap(timer: f64, target: f64) -> f64 {
    if (target - timer).abs() <= defaults::TIME_EPSILON {
        target
    } else {
        timer
    }
}

/// Animation blend runtime driving one avatar.
pub struct AnimationBlendRuntime<O: AudioOutput> {
    idle: AnimationControl,
    local: AnimationControl,
    streamed: AnimationControl,
    idle_clip: AnimationClip,
    local_clip: AnimationClip,
    streamed_clip: AnimationClip,
    idle_duration_override: Option<f64>,
    library: ClipLibrary,
    local_audio: HashMap<String, Vec<u8>>,

    rhs: TargetBuffer,
    joint_blend: ChannelBlend,
    morph_blend: ChannelBlend,
    hard_in: bool,
    hard_out: bool,
    curve: BlendCurve,
    stream_ended: bool,
    global_paused: bool,

    frame_rate: f64,
    time_scale: f64,
    blend_in_time: f64,
    blend_out_time: f64,

    commands: Receiver<RuntimeCommand>,
    sender: CommandSender,
    sink: Arc<dyn ConditionSink>,
    scheduler: Box<dyn DelayScheduler>,
    audio: ContinuousPcmEngine<O>,
}

impl<O: AudioOutput> AnimationBlendRuntime<O> {
    /// Create a runtime. Local and streamed buffers start paused, with the
    /// streamed buffer on the right-hand side at weight zero.
    pub fn new(
        config: &RuntimeConfig,
        audio: ContinuousPcmEngine<O>,
        sink: Arc<dyn ConditionSink>,
    ) -> Result<Self> {
        config.validate()?;
        audio.set_playback_rate(config.time_scale)?;

        let (tx, rx) = unbounded();
        let mut local = AnimationControl::new(BufferKind::Local);
        let mut streamed = AnimationControl::new(BufferKind::Streamed);
        for control in [&mut local, &mut streamed] {
            control.joint.paused = true;
            control.morph.paused = true;
        }
        let mut idle = AnimationControl::new(BufferKind::Idle);
        idle.loopable = true;

        Ok(Self {
            idle,
            local,
            streamed,
            idle_clip: AnimationClip::default(),
            local_clip: AnimationClip::default(),
            streamed_clip: AnimationClip::default(),
            idle_duration_override: None,
            library: ClipLibrary::new(),
            local_audio: HashMap::new(),
            rhs: TargetBuffer::Streamed,
            joint_blend: ChannelBlend::default(),
            morph_blend: ChannelBlend::default(),
            hard_in: false,
            hard_out: false,
            curve: config.blend_curve,
            stream_ended: false,
            global_paused: false,
            frame_rate: config.intrinsic_frame_rate,
            time_scale: config.time_scale,
            blend_in_time: config.blend_in_time,
            blend_out_time: config.blend_out_time,
            commands: rx,
            sender: CommandSender::new(tx),
            sink,
            scheduler: Box::new(ThreadScheduler),
            audio,
        })
    }

    /// Build the audio engine and runtime from a full configuration.
    pub fn from_config(config: &Config, output: O, sink: Arc<dyn ConditionSink>) -> Result<Self> {
        let audio = ContinuousPcmEngine::from_config(output, &config.audio)?;
        Self::new(&config.runtime, audio, sink)
    }

    /// Replace the delayed-play scheduler.
    pub fn with_scheduler(mut self, scheduler: impl DelayScheduler + 'static) -> Self {
        self.scheduler = Box::new(scheduler);
        self
    }

    /// Handle for enqueueing commands, cloneable across threads.
    pub fn sender(&self) -> CommandSender {
        self.sender.clone()
    }

    pub fn audio(&self) -> &ContinuousPcmEngine<O> {
        &self.audio
    }

    pub fn library_mut(&mut self) -> &mut ClipLibrary {
        &mut self.library
    }

    /// Advance the runtime by `delta_ms` milliseconds of wall time.
    ///
    /// Queued commands are applied first, in send order. While globally paused
    /// nothing advances and the returned evaluation repeats the last one.
    pub fn tick(&mut self, delta_ms: f64) -> Evaluation {
        let pending: Vec<RuntimeCommand> = self.commands.try_iter().collect();
        for command in pending {
            self.apply(command);
        }

        if self.global_paused {
            return self.evaluation();
        }

        let seconds = delta_ms.max(0.0) / 1000.0;
        let step = seconds * self.frame_rate * self.time_scale;
        let blend_dt = seconds * self.time_scale;

        self.idle.joint.advance_looping(step);
        self.idle.morph.advance_looping(step);

        for channel in CHANNELS {
            self.advance_channel(channel, step, blend_dt);
        }

        let kind = self.rhs;
        let target = self.target_mut(kind);
        if target.both_finished() && !target.finished_notified {
            target.finished_notified = true;
            self.raise(
                Condition::AnimationFinished,
                format!("Animation of type {} finished", BufferKind::from(kind)),
            );
        }

        self.evaluation()
    }

    fn advance_channel(&mut self, channel: Channel, step: f64, blend_dt: f64) {
        let kind = self.rhs;
        let target = self.target(kind);
        let loopable = target.loopable;
        let loop_start = target.loop_start(channel);
        let mut clock = *target.clock(channel);
        let mut blend = *self.blend(channel);

        if !clock.paused {
            if !clock.at_end() {
                clock.frame_time = (clock.frame_time + step).min(clock.duration);
                if self.hard_in {
                    blend.phase = BlendPhase::Steady;
                    blend.weight = 1.0;
                } else if blend.is_blending_in() {
                    if blend.timer >= self.blend_in_time {
                        blend.phase = BlendPhase::Steady;
                    } else {
                        blend.timer = snap(blend.timer + blend_dt, self.blend_in_time);
                    }
                    blend.weight = self.curve.in_weight(blend.timer, self.blend_in_time);
                }
            } else if loopable {
                clock.frame_time = loop_start;
            } else if kind == TargetBuffer::Streamed && !self.stream_ended {
                let (condition, label) = match channel {
                    Channel::Joint => (Condition::JointStreamBroken, "Joint"),
                    Channel::Morph => (Condition::MorphStreamBroken, "Face"),
                };
                tracing::debug!(%channel, frame = clock.frame_time, "Stream underrun");
                self.raise(condition, format!("{label} stream interrupted"));
            } else {
                clock.paused = true;
                clock.phase = ChannelPhase::Finishing;
                let elapsed = if self.hard_out { self.blend_out_time } else { 0.0 };
                blend.begin_out(elapsed);
                tracing::debug!(%channel, kind = %BufferKind::from(kind), "Reached end of data");
            }
        } else if blend.is_blending_out() {
            if blend.timer >= self.blend_out_time {
                blend.phase = BlendPhase::Steady;
                clock.phase = ChannelPhase::Finished;
                let condition = match channel {
                    Channel::Joint => Condition::JointAnimationFinished,
                    Channel::Morph => Condition::MorphAnimationFinished,
                };
                self.raise(
                    condition,
                    format!("{channel} animation of type {} finished", BufferKind::from(kind)),
                );
            } else {
                blend.timer = snap(blend.timer + blend_dt, self.blend_out_time);
            }
            blend.weight = self.curve.out_weight(blend.timer, self.blend_out_time);
        }

        *self.target_mut(kind).clock_mut(channel) = clock;
        *self.blend_mut(channel) = blend;
    }

    fn apply(&mut self, command: RuntimeCommand) {
        match command {
            RuntimeCommand::SwitchTarget {
                target,
                blend_in,
                blend_out,
            } => {
                tracing::debug!(
                    buffer = %BufferKind::from(target),
                    ?blend_in,
                    ?blend_out,
                    "Switching right-hand buffer"
                );
                self.rhs = target;
                self.hard_in = blend_in == BlendMode::Hard;
                self.hard_out = blend_out == BlendMode::Hard;
                self.target_mut(target).restart();
                for channel in CHANNELS {
                    let blend = self.blend_mut(channel);
                    *blend = ChannelBlend::default();
                    if blend_in == BlendMode::Soft {
                        blend.begin_in();
                    }
                }
                if target == TargetBuffer::Streamed {
                    self.stream_ended = false;
                }
            }
            RuntimeCommand::Interrupt(mode) => {
                tracing::debug!(?mode, "Interrupting right-hand buffer");
                let elapsed = match mode {
                    BlendMode::Soft => 0.0,
                    BlendMode::Hard => self.blend_out_time,
                };
                let target = self.target_mut(self.rhs);
                target.finished_notified = false;
                for channel in CHANNELS {
                    let clock = target.clock_mut(channel);
                    clock.paused = true;
                    clock.phase = ChannelPhase::Interrupted;
                }
                self.joint_blend.begin_out(elapsed);
                self.morph_blend.begin_out(elapsed);
            }
            RuntimeCommand::SetLoopable(loopable) => {
                self.target_mut(self.rhs).loopable = loopable;
            }
            RuntimeCommand::SetBlendCurve(curve) => self.curve = curve,
            RuntimeCommand::MarkStreamEnded => {
                tracing::debug!("Stream ended");
                self.stream_ended = true;
            }
            RuntimeCommand::DelayedPlay { channel, delay } => {
                tracing::debug!(?channel, delay_ms = delay.as_millis() as u64, "Delayed play");
                if channel == PlayChannel::Audio {
                    self.audio.pause();
                }
                if delay.is_zero() {
                    self.resume_channel(channel);
                } else {
                    self.scheduler.schedule(
                        delay,
                        self.sender.clone(),
                        RuntimeCommand::ResumeChannel(channel),
                    );
                }
            }
            RuntimeCommand::ResumeChannel(channel) => self.resume_channel(channel),
            RuntimeCommand::PauseAll => {
                let target = self.target_mut(self.rhs);
                target.joint.paused = true;
                target.morph.paused = true;
                self.audio.pause();
            }
            RuntimeCommand::ResumeAll => {
                for channel in [PlayChannel::Joint, PlayChannel::Morph, PlayChannel::Audio] {
                    self.resume_channel(channel);
                }
            }
        }
    }

    /// Unpause one channel. A channel that is finishing or was interrupted
    /// stays paused so its blend-out and one-shot notification are not replayed.
    fn resume_channel(&mut self, channel: PlayChannel) {
        let channel = match channel {
            PlayChannel::Joint => Channel::Joint,
            PlayChannel::Morph => Channel::Morph,
            PlayChannel::Audio => {
                if self.audio.is_paused() {
                    self.audio.play();
                }
                return;
            }
        };
        let clock = self.target_mut(self.rhs).clock_mut(channel);
        if clock.phase == ChannelPhase::Playing {
            clock.paused = false;
        }
    }

    fn raise(&self, condition: Condition, message: String) {
        self.sink.raise(ConditionedMessage::new(condition, message));
    }

    fn target(&self, target: TargetBuffer) -> &AnimationControl {
        match target {
            TargetBuffer::Local => &self.local,
            TargetBuffer::Streamed => &self.streamed,
        }
    }

    fn target_mut(&mut self, target: TargetBuffer) -> &mut AnimationControl {
        match target {
            TargetBuffer::Local => &mut self.local,
            TargetBuffer::Streamed => &mut self.streamed,
        }
    }

    fn blend(&self, channel: Channel) -> &ChannelBlend {
        match channel {
            Channel::Joint => &self.joint_blend,
            Channel::Morph => &self.morph_blend,
        }
    }

    fn blend_mut(&mut self, channel: Channel) -> &mut ChannelBlend {
        match channel {
            Channel::Joint => &mut self.joint_blend,
            Channel::Morph => &mut self.morph_blend,
        }
    }

    fn control_mut(&mut self, kind: BufferKind) -> &mut AnimationControl {
        match kind {
            BufferKind::Idle => &mut self.idle,
            BufferKind::Local => &mut self.local,
            BufferKind::Streamed => &mut self.streamed,
        }
    }

    /// Current cursors and weights without advancing anything.
    ///
    /// Cursors are the values after the last tick's advance: the RHS times
    /// already include that tick's step (clamped at the end of the data) and
    /// the idle times are past any wrap. Render this frame with them.
    pub fn evaluation(&self) -> Evaluation {
        let rhs = self.target(self.rhs);
        Evaluation {
            lhs_joint_time: self.idle.joint.frame_time,
            rhs_joint_time: rhs.joint.frame_time,
            joint_weight: self.joint_blend.weight,
            lhs_morph_time: self.idle.morph.frame_time,
            rhs_morph_time: rhs.morph.frame_time,
            morph_weight: self.morph_blend.weight,
        }
    }

    /// Sample and blend the loaded clips at `eval`.
    pub fn sample_pose(&self, eval: &Evaluation) -> BlendedPose {
        pose::sample_pose(&self.idle_clip, self.clip(self.rhs.into()), eval)
    }

    pub fn control(&self, kind: BufferKind) -> &AnimationControl {
        match kind {
            BufferKind::Idle => &self.idle,
            BufferKind::Local => &self.local,
            BufferKind::Streamed => &self.streamed,
        }
    }

    pub fn clip(&self, kind: BufferKind) -> &AnimationClip {
        match kind {
            BufferKind::Idle => &self.idle_clip,
            BufferKind::Local => &self.local_clip,
            BufferKind::Streamed => &self.streamed_clip,
        }
    }

    /// Buffer currently on the right-hand side.
    pub fn rhs_kind(&self) -> BufferKind {
        self.rhs.into()
    }

    pub fn joint_blend(&self) -> &ChannelBlend {
        &self.joint_blend
    }

    pub fn morph_blend(&self) -> &ChannelBlend {
        &self.morph_blend
    }

    pub fn blend_curve(&self) -> BlendCurve {
        self.curve
    }

    pub fn stream_ended(&self) -> bool {
        self.stream_ended
    }

    /// Replace the clip of one buffer and take its durations and loop range.
    pub fn load_clip(&mut self, kind: BufferKind, clip: AnimationClip) {
        let joint_duration = match (kind, self.idle_duration_override) {
            (BufferKind::Idle, Some(manual)) => manual,
            _ => clip.joint_duration(),
        };
        let morph_duration = clip.morph_duration();
        let loop_range = clip.loop_range;

        let control = self.control_mut(kind);
        if let Some(range) = loop_range {
            control.loop_range = range;
        }
        // Idle always loops; other buffers loop when the clip carries a range.
        if kind != BufferKind::Idle {
            control.loopable = loop_range.is_some();
        }
        control.joint.duration = joint_duration;
        control.morph.duration = morph_duration;

        match kind {
            BufferKind::Idle => self.idle_clip = clip,
            BufferKind::Local => self.local_clip = clip,
            BufferKind::Streamed => self.streamed_clip = clip,
        }
    }

    /// Load the next variant registered under `label` into the local buffer,
    /// and queue its audio when some was registered.
    ///
    /// Returns false for an unknown label; the audio buffer is cleared either way.
    pub fn switch_local(&mut self, label: &str) -> bool {
        self.audio.clear();
        if let Some(bytes) = self.local_audio.get(label) {
            self.audio.append(bytes);
        }
        match self.library.next_clip(label) {
            Some(clip) => {
                self.load_clip(BufferKind::Local, clip);
                true
            }
            None => false,
        }
    }

    /// Register PCM audio to play with the local clip for `label`.
    pub fn set_local_audio(&mut self, label: &str, pcm: Vec<u8>) {
        self.local_audio.insert(label.to_string(), pcm);
    }

    /// Grow the streamed clip with newly decoded frames.
    pub fn append_streamed(&mut self, joints: Vec<JointFrame>, morphs: Vec<MorphFrame>) {
        self.streamed_clip.append(joints, morphs);
        self.streamed.joint.duration = self.streamed_clip.joint_duration();
        self.streamed.morph.duration = self.streamed_clip.morph_duration();
    }

    /// Drop all streamed frames and rewind the streamed clocks.
    pub fn clear_streamed(&mut self) {
        self.streamed_clip.clear();
        for channel in CHANNELS {
            let clock = self.streamed.clock_mut(channel);
            clock.frame_time = 0.0;
            clock.duration = 0.0;
            self.blend_mut(channel).timer = 0.0;
        }
    }

    /// Set a channel duration in frames directly.
    pub fn set_duration(&mut self, kind: BufferKind, channel: Channel, frames: f64) {
        self.control_mut(kind).clock_mut(channel).duration = frames.max(0.0);
    }

    /// Override the idle joint duration. `None` restores the loaded clip's duration.
    pub fn set_idle_joint_duration(&mut self, frames: Option<f64>) {
        self.idle_duration_override = frames;
        self.idle.joint.duration = frames.unwrap_or_else(|| self.idle_clip.joint_duration());
    }

    /// Set the loop range of a buffer. The range end becomes its joint duration.
    pub fn set_loop_range(&mut self, kind: BufferKind, range: LoopRange) {
        self.control_mut(kind).set_loop_range(range);
    }

    pub fn pause_animation(&mut self) {
        self.global_paused = true;
    }

    pub fn play_animation(&mut self) {
        self.global_paused = false;
    }

    pub fn is_animation_playing(&self) -> bool {
        !self.global_paused
    }

    pub fn time_scale(&self) -> f64 {
        self.time_scale
    }

    /// Scale animation speed. The audio playback rate follows.
    pub fn set_time_scale(&mut self, scale: f64) -> Result<()> {
        if !(scale > 0.0) {
            return Err(AvatarStreamError::ConfigInvalidValue {
                key: "runtime.time_scale".to_string(),
                message: format!("must be positive, got {scale}"),
            });
        }
        self.audio.set_playback_rate(scale)?;
        self.time_scale = scale;
        Ok(())
    }

    /// Data left ahead of the streamed cursors and the audio position.
    pub fn stream_health(&self) -> StreamHealth {
        StreamHealth {
            motion_health_seconds: self.streamed.joint.remaining() / self.frame_rate,
            face_health_frames: self.streamed.morph.remaining(),
            audio_health_seconds: (self.audio.duration() - self.audio.playback_position()).max(0.0),
        }
    }

    /// Both streamed channels and the audio are paused.
    pub fn stream_paused(&self) -> bool {
        self.streamed.joint.paused && self.streamed.morph.paused && self.audio.is_paused()
    }

    /// Either streamed channel still has data ahead and has not finished.
    pub fn streamed_animation_playing(&self) -> bool {
        CHANNELS.iter().any(|&channel| {
            let clock = self.streamed.clock(channel);
            !clock.is_finished() && clock.duration != 0.0 && clock.frame_time <= clock.duration
        })
    }

    /// Buffered audio in seconds.
    pub fn audio_stream_length(&self) -> f64 {
        self.audio.duration()
    }

    /// Streamed joint data in frames.
    pub fn motion_stream_length(&self) -> f64 {
        self.streamed.joint.duration
    }

    /// Streamed morph data in frames.
    pub fn morph_stream_length(&self) -> f64 {
        self.streamed.morph.duration
    }
}
