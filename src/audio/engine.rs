//! Gapless playback of PCM that arrives in arbitrary chunks.
//!
//! The engine keeps one growing sample buffer and plays its unplayed tail as a
//! segment. Data appended while a segment plays is queued on the output right
//! behind it, so chunk boundaries never produce gaps. Consecutive segments form
//! one run that shares a single clock anchor.
//!
//! Muting keeps the run going at zero gain, so media time stays locked to the
//! device clock and unmuting picks up wherever playback has reached.
//!
//! Completion callbacks arrive on the device's thread. Every segment carries a
//! generation number; stopping, seeking or clearing bumps the generation so a
//! late callback from a stopped segment is ignored instead of restarting playback.

use crate::audio::output::{AudioOutput, PlaybackSegment};
use crate::audio::pcm::PcmDecoder;
use crate::config::AudioConfig;
use crate::defaults;
use crate::error::{AvatarStreamError, Result};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Transport state seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Nothing to play; resumes automatically on the next append.
    Idle,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy)]
struct ActiveSegment {
    generation: u64,
    /// Buffer index of the segment's first sample.
    start_position: usize,
    /// Interleaved samples handed to the output in this run, queued ones included.
    len: usize,
    /// Media time at `start_position`.
    origin_time: f64,
    /// Media time and device clock at the last re-anchor.
    anchor_time: f64,
    anchor_clock: f64,
}

struct EngineState<O> {
    output: O,
    samples: Vec<f32>,
    decoder: PcmDecoder,
    sample_rate: u32,
    channels: u16,
    playback_rate: f64,
    /// Index of the next unplayed interleaved sample.
    position: usize,
    /// Media time while no segment is active.
    accumulated_time: f64,
    paused: bool,
    volume: f32,
    muted: bool,
    active: Option<ActiveSegment>,
    generation: u64,
}

impl<O: AudioOutput> EngineState<O> {
    fn samples_per_second(&self) -> f64 {
        self.sample_rate as f64 * self.channels as f64
    }

    fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.samples_per_second()
    }

    fn current_time(&self) -> f64 {
        match &self.active {
            Some(seg) => {
                let elapsed = (self.output.clock() - seg.anchor_clock).max(0.0);
                let end = seg.origin_time + seg.len as f64 / self.samples_per_second();
                (seg.anchor_time + elapsed * self.playback_rate).min(end)
            }
            None => self.accumulated_time,
        }
    }

    /// Stop the active segment and fold the elapsed time into the position.
    fn halt(&mut self) {
        let now = self.current_time();
        self.generation += 1;
        if let Some(seg) = self.active.take() {
            self.output.stop();
            let channels = self.channels as usize;
            let frames = ((now - seg.origin_time) * self.sample_rate as f64 + defaults::TIME_EPSILON)
                .floor()
                .max(0.0) as usize;
            let played = (frames * channels).min(seg.len);
            self.position = seg.start_position + played;
            self.accumulated_time = now;
        }
    }

    fn apply_gain(&mut self) {
        let gain = if self.muted { 0.0 } else { self.volume };
        self.output.set_gain(gain);
    }

    fn tail_segment(&self, from: usize) -> PlaybackSegment {
        PlaybackSegment {
            samples: self.samples[from..].to_vec(),
            sample_rate: self.sample_rate,
            channels: self.channels,
            playback_rate: self.playback_rate,
        }
    }

    /// Queue samples appended after the active run behind it.
    ///
    /// A failed enqueue is logged; the data then starts once the run completes.
    fn extend_run(&mut self, handle: &Weak<Mutex<EngineState<O>>>) {
        let Some(seg) = self.active else {
            return;
        };
        let from = seg.start_position + seg.len;
        if from >= self.samples.len() {
            return;
        }

        let segment = self.tail_segment(from);
        let len = segment.samples.len();
        let end = from + len;
        let weak = handle.clone();
        let generation = seg.generation;
        let on_complete = Box::new(move || on_segment_complete(&weak, generation, end));

        if let Err(e) = self.output.enqueue(segment, on_complete) {
            tracing::warn!(error = %e, "Failed to queue audio segment");
            return;
        }
        if let Some(active) = self.active.as_mut() {
            active.len += len;
        }
    }

    /// Start the unplayed tail if there is one. Output failures are logged and
    /// leave the engine idle so the next append or play retries.
    fn start_tail(&mut self, handle: &Weak<Mutex<EngineState<O>>>) {
        if self.active.is_some() || self.position >= self.samples.len() {
            return;
        }
        if let Err(e) = self.output.ensure_running() {
            tracing::warn!(error = %e, "Audio output unavailable, will retry");
            return;
        }

        self.generation += 1;
        let generation = self.generation;
        let segment = self.tail_segment(self.position);
        let len = segment.samples.len();
        let end = self.position + len;
        let weak = handle.clone();
        let on_complete = Box::new(move || on_segment_complete(&weak, generation, end));

        if let Err(e) = self.output.start(segment, on_complete) {
            tracing::warn!(error = %e, "Failed to start audio segment, will retry");
            return;
        }

        let origin_time = self.position as f64 / self.samples_per_second();
        self.active = Some(ActiveSegment {
            generation,
            start_position: self.position,
            len,
            origin_time,
            anchor_time: origin_time,
            anchor_clock: self.output.clock(),
        });
    }
}

fn lock_state<O>(state: &Mutex<EngineState<O>>) -> MutexGuard<'_, EngineState<O>> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// `end` is the buffer index right after the finished segment's last sample.
fn on_segment_complete<O: AudioOutput>(
    handle: &Weak<Mutex<EngineState<O>>>,
    generation: u64,
    end: usize,
) {
    let Some(state) = handle.upgrade() else {
        return;
    };
    let mut guard = lock_state(&state);
    let Some(seg) = guard.active else {
        return;
    };
    if seg.generation != generation {
        return;
    }
    // A queued segment takes over on the device; the run goes on.
    if end < seg.start_position + seg.len {
        guard.position = end;
        return;
    }

    guard.active = None;
    guard.position = seg.start_position + seg.len;
    guard.accumulated_time = guard.position as f64 / guard.samples_per_second();

    if !guard.paused {
        guard.start_tail(handle);
    }
}

/// Continuous PCM playback over an [`AudioOutput`].
pub struct ContinuousPcmEngine<O: AudioOutput> {
    state: Arc<Mutex<EngineState<O>>>,
}

impl<O: AudioOutput> ContinuousPcmEngine<O> {
    /// Create an engine with the default format (16kHz mono).
    pub fn new(output: O) -> Self {
        Self::build(output, defaults::SAMPLE_RATE, defaults::CHANNELS, defaults::PLAYBACK_RATE)
    }

    pub fn from_config(output: O, config: &AudioConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(
            output,
            config.sample_rate,
            config.channels,
            config.playback_rate,
        ))
    }

    fn build(output: O, sample_rate: u32, channels: u16, playback_rate: f64) -> Self {
        Self {
            state: Arc::new(Mutex::new(EngineState {
                output,
                samples: Vec::new(),
                decoder: PcmDecoder::new(),
                sample_rate,
                channels,
                playback_rate,
                position: 0,
                accumulated_time: 0.0,
                paused: false,
                volume: 1.0,
                muted: false,
                active: None,
                generation: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EngineState<O>> {
        lock_state(&self.state)
    }

    /// Decode and buffer a chunk of little-endian i16 PCM.
    ///
    /// Starts playback right away when the engine is idle, and queues the
    /// data behind the current segment while playing.
    pub fn append(&self, bytes: &[u8]) {
        let handle = Arc::downgrade(&self.state);
        let mut state = self.lock();
        let EngineState {
            decoder, samples, ..
        } = &mut *state;
        decoder.decode_into(bytes, samples);
        if state.paused {
            return;
        }
        if state.active.is_some() {
            state.extend_run(&handle);
        } else {
            state.start_tail(&handle);
        }
    }

    /// Resume playback. Also retries a start that failed earlier.
    pub fn play(&self) {
        let handle = Arc::downgrade(&self.state);
        let mut state = self.lock();
        state.paused = false;
        state.start_tail(&handle);
    }

    /// Pause playback, keeping the buffer and position.
    ///
    /// Pausing while idle still marks the engine paused, so data appended
    /// afterwards waits for `play`.
    pub fn pause(&self) {
        let mut state = self.lock();
        if state.paused {
            return;
        }
        state.paused = true;
        state.halt();
    }

    /// Current media time in seconds.
    pub fn current_time(&self) -> f64 {
        self.lock().current_time()
    }

    /// Alias of [`current_time`](Self::current_time) used for health reporting.
    pub fn playback_position(&self) -> f64 {
        self.current_time()
    }

    /// Jump to `time_seconds`, clamped to the buffered range.
    ///
    /// Non-finite targets are ignored.
    pub fn seek(&self, time_seconds: f64) {
        if !time_seconds.is_finite() {
            tracing::warn!(target_time = time_seconds, "Ignoring seek to non-finite time");
            return;
        }
        let handle = Arc::downgrade(&self.state);
        let mut state = self.lock();
        let was_playing = state.active.is_some();
        state.halt();

        let target = time_seconds.clamp(0.0, state.duration());
        let channels = state.channels as usize;
        let frames = (target * state.sample_rate as f64 + defaults::TIME_EPSILON).floor() as usize;
        state.position = (frames * channels).min(state.samples.len());
        state.accumulated_time = target;

        if was_playing && !state.paused {
            state.start_tail(&handle);
        }
    }

    /// Change the playback rate without a jump in [`current_time`](Self::current_time).
    pub fn set_playback_rate(&self, rate: f64) -> Result<()> {
        if !(rate > 0.0) {
            return Err(AvatarStreamError::AudioFormat {
                message: format!("playback rate must be positive, got {rate}"),
            });
        }
        let mut state = self.lock();
        let now_time = state.current_time();
        let now_clock = state.output.clock();
        if let Some(seg) = state.active.as_mut() {
            seg.anchor_time = now_time;
            seg.anchor_clock = now_clock;
        }
        state.playback_rate = rate;
        state.output.set_playback_rate(rate);
        Ok(())
    }

    pub fn playback_rate(&self) -> f64 {
        self.lock().playback_rate
    }

    /// Set the output volume, from 0.0 (silent) to 1.0.
    pub fn set_volume(&self, volume: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(AvatarStreamError::AudioFormat {
                message: format!("volume must be within 0.0..=1.0, got {volume}"),
            });
        }
        let mut state = self.lock();
        state.volume = volume;
        state.apply_gain();
        Ok(())
    }

    pub fn volume(&self) -> f32 {
        self.lock().volume
    }

    /// Silence the output without stopping playback.
    ///
    /// Segments keep being consumed, so [`current_time`](Self::current_time)
    /// advances with the device clock while muted.
    pub fn mute(&self) {
        let mut state = self.lock();
        if state.muted {
            return;
        }
        state.muted = true;
        state.apply_gain();
        tracing::debug!("Audio muted");
    }

    /// Restore the volume. Returns false when the engine was not muted.
    pub fn unmute(&self) -> bool {
        let mut state = self.lock();
        if !state.muted {
            return false;
        }
        state.muted = false;
        state.apply_gain();
        tracing::debug!("Audio unmuted");
        true
    }

    pub fn is_muted(&self) -> bool {
        self.lock().muted
    }

    /// Change the PCM format for data appended from now on.
    ///
    /// Intended to be called between utterances, after [`clear`](Self::clear).
    pub fn set_pcm_parameters(&self, sample_rate: u32, channels: u16) -> Result<()> {
        if sample_rate == 0 || channels == 0 {
            return Err(AvatarStreamError::AudioFormat {
                message: format!("{sample_rate}Hz with {channels} channels"),
            });
        }
        let mut state = self.lock();
        state.sample_rate = sample_rate;
        state.channels = channels;
        Ok(())
    }

    /// Stop playback and drop all buffered audio, keeping the allocation.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.generation += 1;
        if state.active.take().is_some() {
            state.output.stop();
        }
        state.samples.clear();
        state.decoder.reset();
        state.position = 0;
        state.accumulated_time = 0.0;
        state.paused = false;
    }

    pub fn state(&self) -> PlaybackState {
        let state = self.lock();
        if state.paused {
            PlaybackState::Paused
        } else if state.active.is_some() {
            PlaybackState::Playing
        } else {
            PlaybackState::Idle
        }
    }

    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    /// Buffered duration in seconds.
    pub fn duration(&self) -> f64 {
        self.lock().duration()
    }

    /// Buffered audio not yet played, in seconds.
    pub fn remaining_seconds(&self) -> f64 {
        let state = self.lock();
        (state.duration() - state.current_time()).max(0.0)
    }

    /// Index of the next unplayed interleaved sample.
    ///
    /// While playing this is the start of the segment the device is on; it
    /// advances when a segment completes or playback is paused.
    pub fn playback_position_samples(&self) -> usize {
        self.lock().position
    }

    pub fn buffered_samples(&self) -> usize {
        self.lock().samples.len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.lock().sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.lock().channels
    }
}
