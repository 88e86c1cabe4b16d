//! Hardware playback through the default cpal output device.

use crate::audio::output::{AudioOutput, CompletionCallback, PlaybackSegment};
use crate::error::{AvatarStreamError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Wrapper to make cpal::Stream Send.
///
/// cpal::Stream is !Send on some platforms. It is only touched while holding
/// `&mut CpalAudioOutput`, never from the audio callback.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

struct RenderSegment {
    samples: Vec<f32>,
    channels: usize,
    /// Source frames per device frame at rate 1.0.
    step: f64,
    /// Fractional read head, in source frames.
    head: f64,
    on_complete: Option<CompletionCallback>,
}

impl RenderSegment {
    fn frame_count(&self) -> usize {
        self.samples.len() / self.channels.max(1)
    }

    fn is_exhausted(&self) -> bool {
        self.head as usize >= self.frame_count()
    }
}

struct RenderState {
    /// Front is playing, the rest follow without a gap.
    queue: VecDeque<RenderSegment>,
    rate: f64,
    gain: f32,
    frames_rendered: u64,
}

impl RenderState {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            rate: 1.0,
            gain: 1.0,
            frames_rendered: 0,
        }
    }

    /// Pop finished segments off the front, carrying the read head's
    /// overshoot into the next one.
    fn retire_exhausted(&mut self, completed: &mut Vec<CompletionCallback>) {
        while let Some(front) = self.queue.front() {
            if !front.is_exhausted() {
                break;
            }
            let overshoot = front.head - front.frame_count() as f64;
            if let Some(mut done) = self.queue.pop_front()
                && let Some(on_complete) = done.on_complete.take()
            {
                completed.push(on_complete);
            }
            if let Some(next) = self.queue.front_mut() {
                next.head += overshoot;
            }
        }
    }
}

fn lock_render(state: &Mutex<RenderState>) -> MutexGuard<'_, RenderState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Fill one device buffer, moving into queued segments as each one runs out.
///
/// Returns the completion callbacks of every segment that finished, to be run
/// after the render lock is released.
fn render(
    state: &Mutex<RenderState>,
    data: &mut [f32],
    device_channels: usize,
) -> Vec<CompletionCallback> {
    let mut guard = lock_render(state);
    let rate = guard.rate;
    let gain = guard.gain;
    guard.frames_rendered += (data.len() / device_channels) as u64;

    let mut completed = Vec::new();
    for frame in data.chunks_mut(device_channels) {
        guard.retire_exhausted(&mut completed);
        let Some(seg) = guard.queue.front_mut() else {
            frame.fill(0.0);
            continue;
        };
        let index = seg.head as usize;
        for (c, out) in frame.iter_mut().enumerate() {
            let source_channel = c.min(seg.channels - 1);
            *out = seg.samples[index * seg.channels + source_channel] * gain;
        }
        seg.head += seg.step * rate;
    }
    // A segment ending exactly on the buffer edge completes now, not a buffer later.
    guard.retire_exhausted(&mut completed);
    completed
}

/// Real audio output implementation using CPAL.
///
/// The device stream runs continuously once opened and renders silence when no
/// segment is active. Its clock counts rendered device frames. A stream error
/// marks the output for rebuilding on the next `ensure_running`.
pub struct CpalAudioOutput {
    device: cpal::Device,
    config: cpal::StreamConfig,
    stream: Option<SendableStream>,
    state: Arc<Mutex<RenderState>>,
    failed: Arc<AtomicBool>,
}

impl CpalAudioOutput {
    /// Open the default output device.
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| AvatarStreamError::AudioDeviceNotFound {
                device: "default".to_string(),
            })?;
        let supported = device
            .default_output_config()
            .map_err(|e| AvatarStreamError::AudioOutput {
                message: format!("Failed to query output config: {}", e),
            })?;
        if supported.sample_format() != cpal::SampleFormat::F32 {
            return Err(AvatarStreamError::AudioFormat {
                message: format!("device sample format {:?} is not f32", supported.sample_format()),
            });
        }

        Ok(Self {
            device,
            config: supported.config(),
            stream: None,
            state: Arc::new(Mutex::new(RenderState::new())),
            failed: Arc::new(AtomicBool::new(false)),
        })
    }

    fn device_rate(&self) -> f64 {
        self.config.sample_rate as f64
    }

    fn render_segment(
        &self,
        segment: PlaybackSegment,
        on_complete: CompletionCallback,
    ) -> Result<RenderSegment> {
        if segment.channels == 0 || segment.sample_rate == 0 {
            return Err(AvatarStreamError::AudioFormat {
                message: format!(
                    "{}Hz with {} channels",
                    segment.sample_rate, segment.channels
                ),
            });
        }
        {
            let mut state = lock_render(&self.state);
            state.rate = segment.playback_rate;
        }
        Ok(RenderSegment {
            samples: segment.samples,
            channels: segment.channels as usize,
            step: segment.sample_rate as f64 / self.device_rate(),
            head: 0.0,
            on_complete: Some(on_complete),
        })
    }

    fn open_stream(&mut self) -> Result<()> {
        let state = Arc::clone(&self.state);
        let failed = Arc::clone(&self.failed);
        let device_channels = self.config.channels.max(1) as usize;

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for on_complete in render(&state, data, device_channels) {
                        on_complete();
                    }
                },
                move |err| {
                    tracing::warn!(error = %err, "Audio output stream error");
                    failed.store(true, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| AvatarStreamError::AudioOutput {
                message: format!("Failed to build output stream: {}", e),
            })?;

        stream.play().map_err(|e| AvatarStreamError::AudioOutput {
            message: format!("Failed to start output stream: {}", e),
        })?;

        self.stream = Some(SendableStream(stream));
        self.failed.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl AudioOutput for CpalAudioOutput {
    fn ensure_running(&mut self) -> Result<()> {
        if self.stream.is_some() && !self.failed.load(Ordering::SeqCst) {
            return Ok(());
        }
        if self.stream.take().is_some() {
            tracing::info!("Recreating audio output stream");
        }
        self.open_stream()
    }

    fn start(&mut self, segment: PlaybackSegment, on_complete: CompletionCallback) -> Result<()> {
        let segment = self.render_segment(segment, on_complete)?;
        let mut state = lock_render(&self.state);
        state.queue.clear();
        state.queue.push_back(segment);
        Ok(())
    }

    fn enqueue(
        &mut self,
        segment: PlaybackSegment,
        on_complete: CompletionCallback,
    ) -> Result<()> {
        let segment = self.render_segment(segment, on_complete)?;
        lock_render(&self.state).queue.push_back(segment);
        Ok(())
    }

    fn stop(&mut self) {
        lock_render(&self.state).queue.clear();
    }

    fn clock(&self) -> f64 {
        lock_render(&self.state).frames_rendered as f64 / self.device_rate()
    }

    fn set_playback_rate(&mut self, rate: f64) {
        lock_render(&self.state).rate = rate;
    }

    fn set_gain(&mut self, gain: f32) {
        lock_render(&self.state).gain = gain;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn segment(samples: Vec<f32>, channels: usize, fired: &Arc<AtomicUsize>) -> RenderSegment {
        let counter = Arc::clone(fired);
        RenderSegment {
            samples,
            channels,
            step: 1.0,
            head: 0.0,
            on_complete: Some(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        }
    }

    fn state_with(segments: Vec<RenderSegment>) -> Mutex<RenderState> {
        let mut state = RenderState::new();
        state.queue.extend(segments);
        Mutex::new(state)
    }

    fn run_all(callbacks: Vec<CompletionCallback>) -> usize {
        let count = callbacks.len();
        for cb in callbacks {
            cb();
        }
        count
    }

    #[test]
    fn test_render_mono_to_stereo() {
        let fired = Arc::new(AtomicUsize::new(0));
        let state = state_with(vec![segment(vec![0.1, 0.2, 0.3], 1, &fired)]);
        let mut data = vec![9.0; 8];

        let done = render(&state, &mut data, 2);
        // Nothing queued behind it: the rest of the buffer is silence
        assert_eq!(data, vec![0.1, 0.1, 0.2, 0.2, 0.3, 0.3, 0.0, 0.0]);
        assert_eq!(run_all(done), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(lock_render(&state).queue.is_empty());
        assert_eq!(lock_render(&state).frames_rendered, 4);
    }

    #[test]
    fn test_render_crosses_segment_boundary_without_silence() {
        let fired = Arc::new(AtomicUsize::new(0));
        let state = state_with(vec![
            segment(vec![0.1, 0.2, 0.3], 1, &fired),
            segment(vec![0.4, 0.5, 0.6, 0.7], 1, &fired),
        ]);
        let mut data = vec![9.0; 5];

        let done = render(&state, &mut data, 1);
        assert_eq!(data, vec![0.1, 0.2, 0.3, 0.4, 0.5]);
        assert_eq!(run_all(done), 1);
        assert_eq!(lock_render(&state).queue.len(), 1);

        let mut data = vec![9.0; 3];
        let done = render(&state, &mut data, 1);
        assert_eq!(data, vec![0.6, 0.7, 0.0]);
        assert_eq!(run_all(done), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_render_segment_ending_on_buffer_edge_completes() {
        let fired = Arc::new(AtomicUsize::new(0));
        let state = state_with(vec![segment(vec![0.5; 4], 1, &fired)]);
        let mut data = vec![0.0; 4];
        assert_eq!(run_all(render(&state, &mut data, 1)), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_render_partial_buffer_keeps_segment() {
        let fired = Arc::new(AtomicUsize::new(0));
        let state = state_with(vec![segment(vec![0.5; 10], 1, &fired)]);
        let mut data = vec![0.0; 4];
        assert!(render(&state, &mut data, 1).is_empty());
        assert_eq!(lock_render(&state).queue.len(), 1);
    }

    #[test]
    fn test_render_rate_skips_frames() {
        let fired = Arc::new(AtomicUsize::new(0));
        let state = state_with(vec![segment(vec![0.0, 0.1, 0.2, 0.3], 1, &fired)]);
        lock_render(&state).rate = 2.0;
        let mut data = vec![1.0; 2];
        let done = render(&state, &mut data, 1);
        assert_eq!(data, vec![0.0, 0.2]);
        assert_eq!(done.len(), 1);
    }

    #[test]
    fn test_render_applies_gain() {
        let fired = Arc::new(AtomicUsize::new(0));
        let state = state_with(vec![segment(vec![0.5; 4], 1, &fired)]);
        lock_render(&state).gain = 0.5;
        let mut data = vec![0.0; 2];
        render(&state, &mut data, 1);
        assert_eq!(data, vec![0.25, 0.25]);

        // Muted output still consumes the segment
        lock_render(&state).gain = 0.0;
        let done = render(&state, &mut data, 1);
        assert_eq!(data, vec![0.0, 0.0]);
        assert_eq!(done.len(), 1);
    }

    #[test]
    fn test_render_silence_without_segment() {
        let state = Mutex::new(RenderState::new());
        let mut data = vec![1.0; 6];
        assert!(render(&state, &mut data, 2).is_empty());
        assert!(data.iter().all(|&s| s == 0.0));
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn test_open_default_device() {
        let mut output = CpalAudioOutput::new().expect("Failed to open output device");
        output.ensure_running().expect("Failed to start stream");
        assert!(output.clock() >= 0.0);
    }
}
