use crate::error::{AvatarStreamError, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Called once when a started segment has played to its end.
pub type CompletionCallback = Box<dyn FnOnce() + Send + 'static>;

/// A run of interleaved samples handed to the output in one go.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSegment {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
    pub playback_rate: f64,
}

impl PlaybackSegment {
    /// Media duration in seconds, ignoring playback rate.
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64 / self.channels as f64
    }
}

/// Trait for audio output devices.
///
/// This trait allows swapping implementations (real audio device vs mock).
/// Segments play one after another from a queue. `start` replaces the queue,
/// `enqueue` appends to it.
pub trait AudioOutput: Send + 'static {
    /// Bring a suspended or lost device back before use.
    fn ensure_running(&mut self) -> Result<()> {
        Ok(())
    }

    /// Start playing `segment`. `on_complete` fires from the device's own
    /// thread once the last sample is consumed, and must never be invoked
    /// from inside `start` itself.
    fn start(&mut self, segment: PlaybackSegment, on_complete: CompletionCallback) -> Result<()>;

    /// Queue `segment` to begin on the device frame after the current one
    /// ends. Starts right away when nothing is playing. Same callback rules
    /// as [`start`](Self::start).
    fn enqueue(&mut self, segment: PlaybackSegment, on_complete: CompletionCallback)
    -> Result<()>;

    /// Stop the current and queued segments. Their callbacks are dropped, not called.
    fn stop(&mut self);

    /// Monotonic device clock in seconds.
    fn clock(&self) -> f64;

    /// Change how fast the current and future segments are consumed.
    fn set_playback_rate(&mut self, rate: f64);

    /// Scale rendered samples. At 0 segments are still consumed on time, in silence.
    fn set_gain(&mut self, gain: f32);
}

#[derive(Default)]
struct MockState {
    clock: f64,
    rate: f64,
    gain: f32,
    segments: Vec<PlaybackSegment>,
    pending: VecDeque<CompletionCallback>,
    stop_count: usize,
    fail_start: bool,
    resume_failures: usize,
}

/// Mock audio output for testing
///
/// Clones share state, so a test can keep one handle while the engine owns
/// another. The clock only moves through [`MockAudioOutput::advance`] and a
/// segment only completes through [`MockAudioOutput::finish_current`].
#[derive(Clone)]
pub struct MockAudioOutput {
    state: Arc<Mutex<MockState>>,
}

impl MockAudioOutput {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                rate: 1.0,
                gain: 1.0,
                ..MockState::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Configure the mock to fail on start
    pub fn with_start_failure(self) -> Self {
        self.lock().fail_start = true;
        self
    }

    /// Configure the mock to fail the next `count` resume attempts
    pub fn with_resume_failures(self, count: usize) -> Self {
        self.lock().resume_failures = count;
        self
    }

    /// Move the device clock forward.
    pub fn advance(&self, seconds: f64) {
        self.lock().clock += seconds;
    }

    /// Complete the front segment as if its last sample was consumed.
    ///
    /// Returns false when nothing was playing.
    pub fn finish_current(&self) -> bool {
        let callback = self.lock().pending.pop_front();
        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    /// Every segment started so far, in order.
    pub fn segments(&self) -> Vec<PlaybackSegment> {
        self.lock().segments.clone()
    }

    pub fn stop_count(&self) -> usize {
        self.lock().stop_count
    }

    pub fn is_active(&self) -> bool {
        !self.lock().pending.is_empty()
    }

    /// Segments started or queued and not yet finished.
    pub fn queued(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn rate(&self) -> f64 {
        self.lock().rate
    }

    pub fn gain(&self) -> f32 {
        self.lock().gain
    }
}

impl Default for MockAudioOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for MockAudioOutput {
    fn ensure_running(&mut self) -> Result<()> {
        let mut state = self.lock();
        if state.resume_failures > 0 {
            state.resume_failures -= 1;
            return Err(AvatarStreamError::AudioOutput {
                message: "mock device suspended".to_string(),
            });
        }
        Ok(())
    }

    fn start(&mut self, segment: PlaybackSegment, on_complete: CompletionCallback) -> Result<()> {
        let mut state = self.lock();
        if state.fail_start {
            return Err(AvatarStreamError::AudioOutput {
                message: "mock start failure".to_string(),
            });
        }
        state.rate = segment.playback_rate;
        state.segments.push(segment);
        state.pending.clear();
        state.pending.push_back(on_complete);
        Ok(())
    }

    fn enqueue(
        &mut self,
        segment: PlaybackSegment,
        on_complete: CompletionCallback,
    ) -> Result<()> {
        let mut state = self.lock();
        if state.fail_start {
            return Err(AvatarStreamError::AudioOutput {
                message: "mock enqueue failure".to_string(),
            });
        }
        state.segments.push(segment);
        state.pending.push_back(on_complete);
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = self.lock();
        state.pending.clear();
        state.stop_count += 1;
    }

    fn clock(&self) -> f64 {
        self.lock().clock
    }

    fn set_playback_rate(&mut self, rate: f64) {
        self.lock().rate = rate;
    }

    fn set_gain(&mut self, gain: f32) {
        self.lock().gain = gain;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn segment(len: usize) -> PlaybackSegment {
        PlaybackSegment {
            samples: vec![0.0; len],
            sample_rate: 16000,
            channels: 1,
            playback_rate: 1.0,
        }
    }

    #[test]
    fn test_segment_duration() {
        let mut seg = segment(32000);
        assert_eq!(seg.duration(), 2.0);
        seg.channels = 2;
        assert_eq!(seg.duration(), 1.0);
    }

    #[test]
    fn test_mock_finish_runs_callback_once() {
        let mut output = MockAudioOutput::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        output
            .start(
                segment(10),
                Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        assert!(output.is_active());
        assert!(output.finish_current());
        assert!(!output.finish_current());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_mock_stop_drops_callback() {
        let mut output = MockAudioOutput::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        output
            .start(
                segment(10),
                Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        output.stop();

        assert!(!output.finish_current());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(output.stop_count(), 1);
    }

    #[test]
    fn test_mock_enqueue_finishes_in_order() {
        let mut output = MockAudioOutput::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for id in 0..2 {
            let order = Arc::clone(&order);
            output
                .enqueue(
                    segment(10),
                    Box::new(move || order.lock().unwrap().push(id)),
                )
                .unwrap();
        }

        assert_eq!(output.queued(), 2);
        assert!(output.finish_current());
        assert!(output.finish_current());
        assert!(!output.is_active());
        assert_eq!(*order.lock().unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_mock_start_replaces_queue() {
        let mut output = MockAudioOutput::new();
        output.enqueue(segment(10), Box::new(|| {})).unwrap();
        output.enqueue(segment(10), Box::new(|| {})).unwrap();
        output.start(segment(5), Box::new(|| {})).unwrap();
        assert_eq!(output.queued(), 1);
    }

    #[test]
    fn test_mock_failures() {
        let mut output = MockAudioOutput::new().with_start_failure();
        assert!(output.start(segment(1), Box::new(|| {})).is_err());

        let mut output = MockAudioOutput::new().with_resume_failures(1);
        assert!(output.ensure_running().is_err());
        assert!(output.ensure_running().is_ok());
    }

    #[test]
    fn test_mock_clock_is_shared_between_clones() {
        let output = MockAudioOutput::new();
        let handle = output.clone();
        handle.advance(0.25);
        assert_eq!(output.clock(), 0.25);
    }
}
