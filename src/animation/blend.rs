//! Blend curves and per-channel blend state.

use serde::{Deserialize, Serialize};

/// Shape of the cross-fade between the idle and target buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendCurve {
    #[default]
    Linear,
    Cubic,
}

/// Whether a blend transition is animated or instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendMode {
    #[default]
    Soft,
    Hard,
}

/// Cubic ease-in-out over `[0, 1]`.
pub fn ease_in_out_cubic(t: f64) -> f64 {
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

impl BlendCurve {
    /// Map a linear progress ratio through the curve. Input is clamped to `[0, 1]`.
    pub fn apply(self, ratio: f64) -> f64 {
        let ratio = ratio.clamp(0.0, 1.0);
        match self {
            BlendCurve::Linear => ratio,
            BlendCurve::Cubic => ease_in_out_cubic(ratio),
        }
    }

    /// Weight of the target buffer `progress` seconds into a blend-in.
    pub fn in_weight(self, progress: f64, blend_in_time: f64) -> f64 {
        self.apply(progress / blend_in_time).min(1.0)
    }

    /// Weight of the target buffer `progress` seconds into a blend-out.
    pub fn out_weight(self, progress: f64, blend_out_time: f64) -> f64 {
        (1.0 - self.apply(progress / blend_out_time)).max(0.0)
    }
}

/// Which way a channel is currently fading. A channel is never fading both ways.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendPhase {
    #[default]
    Steady,
    In,
    Out,
}

/// Blend timer and weight for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChannelBlend {
    pub phase: BlendPhase,
    /// Seconds elapsed in the current phase.
    pub timer: f64,
    /// Weight of the target buffer, always in `[0, 1]`.
    pub weight: f64,
}

impl ChannelBlend {
    /// Restart from an invisible target, fading in.
    pub fn begin_in(&mut self) {
        self.phase = BlendPhase::In;
        self.timer = 0.0;
        self.weight = 0.0;
    }

    /// Start fading out. `elapsed` pre-advances the timer; a full blend-out
    /// duration makes the fade instant.
    pub fn begin_out(&mut self, elapsed: f64) {
        self.phase = BlendPhase::Out;
        self.timer = elapsed;
    }

    pub fn is_blending_in(&self) -> bool {
        self.phase == BlendPhase::In
    }

    pub fn is_blending_out(&self) -> bool {
        self.phase == BlendPhase::Out
    }
}
