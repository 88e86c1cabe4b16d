//! Playback clocks for the idle, local and streamed animation buffers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which animation buffer a control drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferKind {
    /// Perpetually looping idle animation, always on the left-hand side.
    Idle,
    /// Pre-fetched clip played from local storage.
    Local,
    /// Live clip that grows as frames arrive.
    Streamed,
}

impl fmt::Display for BufferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferKind::Idle => write!(f, "idle"),
            BufferKind::Local => write!(f, "local"),
            BufferKind::Streamed => write!(f, "streamed"),
        }
    }
}

/// One of the two independently timed animation tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Joint,
    Morph,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Joint => write!(f, "joint"),
            Channel::Morph => write!(f, "morph"),
        }
    }
}

/// Lifecycle of one channel of the right-hand-side buffer.
///
/// The channel-finished notification is raised only on the transition into
/// `Finished`, so it cannot fire twice for the same finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelPhase {
    #[default]
    Playing,
    /// Reached the end of its data and is blending out.
    Finishing,
    /// Cut off by an interrupt and is blending out.
    Interrupted,
    /// Blend-out complete.
    Finished,
}

/// Inclusive-start frame range a loopable clip wraps within.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LoopRange {
    pub start: f64,
    pub end: f64,
}

impl LoopRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }
}

/// Frame cursor for one channel, measured in frames at the intrinsic rate.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChannelClock {
    pub frame_time: f64,
    pub duration: f64,
    pub paused: bool,
    pub phase: ChannelPhase,
}

impl ChannelClock {
    /// Advance and wrap to zero at the duration. Used by the idle buffer.
    pub fn advance_looping(&mut self, step: f64) {
        self.frame_time += step;
        if self.frame_time >= self.duration {
            self.frame_time = 0.0;
        }
    }

    /// Whether the cursor has reached the end of the available data.
    pub fn at_end(&self) -> bool {
        self.frame_time >= self.duration
    }

    /// Finished for the purpose of the whole-buffer notification.
    pub fn is_finished(&self) -> bool {
        matches!(self.phase, ChannelPhase::Finishing | ChannelPhase::Finished)
    }

    /// Frames of data left ahead of the cursor.
    pub fn remaining(&self) -> f64 {
        (self.duration - self.frame_time).max(0.0)
    }

    /// Rewind to the start and resume playing.
    pub fn restart(&mut self) {
        self.frame_time = 0.0;
        self.paused = false;
        self.phase = ChannelPhase::Playing;
    }
}

/// Playback state of one animation buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationControl {
    pub kind: BufferKind,
    pub joint: ChannelClock,
    pub morph: ChannelClock,
    pub loopable: bool,
    pub loop_range: LoopRange,
    /// Set once the whole-buffer finish has been reported; cleared on restart.
    pub finished_notified: bool,
}

impl AnimationControl {
    pub fn new(kind: BufferKind) -> Self {
        Self {
            kind,
            joint: ChannelClock::default(),
            morph: ChannelClock::default(),
            loopable: false,
            loop_range: LoopRange::default(),
            finished_notified: false,
        }
    }

    pub fn clock(&self, channel: Channel) -> &ChannelClock {
        match channel {
            Channel::Joint => &self.joint,
            Channel::Morph => &self.morph,
        }
    }

    pub fn clock_mut(&mut self, channel: Channel) -> &mut ChannelClock {
        match channel {
            Channel::Joint => &mut self.joint,
            Channel::Morph => &mut self.morph,
        }
    }

    /// Frame a loopable channel wraps back to.
    ///
    /// Only joint clips carry a loop range; morph tracks loop from zero.
    pub fn loop_start(&self, channel: Channel) -> f64 {
        match channel {
            Channel::Joint => self.loop_range.start,
            Channel::Morph => 0.0,
        }
    }

    /// Rewind both channels for a fresh play-through.
    pub fn restart(&mut self) {
        self.joint.restart();
        self.morph.restart();
        self.finished_notified = false;
    }

    pub fn both_finished(&self) -> bool {
        self.joint.is_finished() && self.morph.is_finished()
    }

    /// Set a loop range. For joint clips the range end becomes the duration.
    pub fn set_loop_range(&mut self, range: LoopRange) {
        self.loop_range = range;
        self.joint.duration = range.end;
    }
}
