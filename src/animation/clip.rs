//! Decoded animation frames and the local clip library.

use crate::animation::control::LoopRange;
use crate::animation::pose::Quat;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Joint rotations plus root translation for one frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JointFrame {
    pub rotations: Vec<Quat>,
    pub root_translation: [f32; 3],
}

/// Morph-target (blendshape) weights for one frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MorphFrame {
    pub weights: Vec<f32>,
}

/// Joint and morph tracks, each one frame per intrinsic frame period.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnimationClip {
    pub joint_frames: Vec<JointFrame>,
    pub morph_frames: Vec<MorphFrame>,
    #[serde(default)]
    pub loop_range: Option<LoopRange>,
}

fn frame_index(time: f64, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    let index = if time > 0.0 { time.floor() as usize } else { 0 };
    Some(index.min(len - 1))
}

impl AnimationClip {
    pub fn from_frames(joint_frames: Vec<JointFrame>, morph_frames: Vec<MorphFrame>) -> Self {
        Self {
            joint_frames,
            morph_frames,
            loop_range: None,
        }
    }

    pub fn with_loop_range(mut self, range: LoopRange) -> Self {
        self.loop_range = Some(range);
        self
    }

    pub fn is_loopable(&self) -> bool {
        self.loop_range.is_some()
    }

    /// Joint duration in frames. A loop range's end overrides the frame count.
    pub fn joint_duration(&self) -> f64 {
        match self.loop_range {
            Some(range) => range.end,
            None => self.joint_frames.len() as f64,
        }
    }

    pub fn morph_duration(&self) -> f64 {
        self.morph_frames.len() as f64
    }

    pub fn joint_frame_at(&self, time: f64) -> Option<&JointFrame> {
        frame_index(time, self.joint_frames.len()).map(|i| &self.joint_frames[i])
    }

    pub fn morph_frame_at(&self, time: f64) -> Option<&MorphFrame> {
        frame_index(time, self.morph_frames.len()).map(|i| &self.morph_frames[i])
    }

    pub fn append(&mut self, joints: Vec<JointFrame>, morphs: Vec<MorphFrame>) {
        self.joint_frames.extend(joints);
        self.morph_frames.extend(morphs);
    }

    pub fn clear(&mut self) {
        self.joint_frames.clear();
        self.morph_frames.clear();
        self.loop_range = None;
    }
}

/// Local clips keyed by motion label.
///
/// A label may carry several joint variants; they are handed out round-robin
/// so repeated gestures do not look identical. Each label has at most one
/// morph track.
#[derive(Debug, Default)]
pub struct ClipLibrary {
    joint_variants: HashMap<String, Vec<AnimationClip>>,
    morph_tracks: HashMap<String, Vec<MorphFrame>>,
    cursors: HashMap<String, usize>,
}

impl ClipLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register another joint variant under `label`.
    pub fn add_joint_clip(&mut self, label: &str, clip: AnimationClip) {
        self.joint_variants
            .entry(label.to_string())
            .or_default()
            .push(clip);
    }

    /// Set the morph track for `label`, replacing any previous one.
    pub fn set_morph_track(&mut self, label: &str, frames: Vec<MorphFrame>) {
        self.morph_tracks.insert(label.to_string(), frames);
    }

    pub fn contains(&self, label: &str) -> bool {
        self.joint_variants.contains_key(label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.joint_variants.keys().map(String::as_str)
    }

    /// Next clip for `label`: the next joint variant combined with the label's
    /// morph track. Returns `None` for an unknown label.
    pub fn next_clip(&mut self, label: &str) -> Option<AnimationClip> {
        let variants = self.joint_variants.get(label)?;
        if variants.is_empty() {
            return None;
        }
        let cursor = self.cursors.entry(label.to_string()).or_insert(0);
        let mut clip = variants[*cursor % variants.len()].clone();
        *cursor = (*cursor + 1) % variants.len();

        clip.morph_frames = self.morph_tracks.get(label).cloned().unwrap_or_default();
        Some(clip)
    }
}
