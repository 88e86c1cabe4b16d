//! Adaptive pre-buffer sizing learned from chunk arrival telemetry.
//!
//! Each fully received stream is replayed against its own arrival times to find
//! the earliest chunk at which playback could have started without running dry.
//! The buffered duration at that point is one sample; the estimate is a trimmed
//! high percentile of recent samples, smoothed exponentially.

use crate::config::EstimatorConfig;
use crate::defaults;
use crate::error::{AvatarStreamError, Result};
use crate::stream::network::NetworkStream;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

/// Total ordering over sample values so they can live in a `BinaryHeap`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Sample(f64);

impl Eq for Sample {}

impl PartialOrd for Sample {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Sample {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Estimates how many seconds of stream data to hold before starting playback.
#[derive(Debug, Clone)]
pub struct AdaptiveBufferSizeEstimator {
    name: String,
    weight: f64,
    max_samples: usize,
    safe_rate: f64,
    samples: VecDeque<f64>,
    buffer_size: f64,
}

impl AdaptiveBufferSizeEstimator {
    /// Create an estimator with default tuning.
    ///
    /// `name` only labels log lines (e.g. "audio", "motion").
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            weight: defaults::ESTIMATOR_WEIGHT,
            max_samples: defaults::ESTIMATOR_MAX_SAMPLES,
            safe_rate: defaults::ESTIMATOR_SAFE_RATE,
            samples: VecDeque::with_capacity(defaults::ESTIMATOR_MAX_SAMPLES),
            buffer_size: defaults::INITIAL_BUFFER_SIZE,
        }
    }

    /// Create an estimator from validated configuration.
    pub fn from_config(name: &str, config: &EstimatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            name: name.to_string(),
            weight: config.weight,
            max_samples: config.max_samples,
            safe_rate: config.safe_rate,
            samples: VecDeque::with_capacity(config.max_samples),
            buffer_size: defaults::INITIAL_BUFFER_SIZE,
        })
    }

    /// Current estimate in seconds.
    pub fn buffer_size(&self) -> f64 {
        self.buffer_size
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Recorded samples, oldest first.
    pub fn samples(&self) -> &VecDeque<f64> {
        &self.samples
    }

    /// Earliest chunk index at which playback could start and never underflow.
    ///
    /// Chunks `0..=k` are buffered before playback. Every later chunk first
    /// drains the buffer by its real inter-arrival gap, then refills it by its
    /// duration. A candidate fails when the buffer runs dry before a refill.
    pub fn compute_safe_start_index(&self, stream: &NetworkStream) -> Result<usize> {
        let chunks = stream.chunks();

        for start in 0..chunks.len() {
            let mut buffered = 0.0;
            let mut safe = true;

            for (i, chunk) in chunks.iter().enumerate() {
                if i <= start {
                    buffered += chunk.duration_seconds;
                    continue;
                }
                buffered -= chunk.receive_time_seconds - chunks[i - 1].receive_time_seconds;
                // Exact drain-to-zero counts as on time
                if buffered <= -defaults::TIME_EPSILON {
                    safe = false;
                    break;
                }
                buffered += chunk.duration_seconds;
            }

            if safe {
                return Ok(start);
            }
        }

        let details = serde_json::to_string(stream)
            .unwrap_or_else(|_| format!("{} chunks", stream.len()));
        tracing::error!(
            estimator = %self.name,
            stream = %details,
            "Stream is unsafe to play regardless of start index"
        );
        Err(AvatarStreamError::UnexpectedStreamPlay { details })
    }

    /// Buffered duration needed to start this stream safely.
    fn sample_from_stream(&self, stream: &NetworkStream) -> Result<f64> {
        let start = self.compute_safe_start_index(stream)?;
        Ok(stream.chunks()[..=start]
            .iter()
            .map(|c| c.duration_seconds)
            .sum())
    }

    fn record_sample(&mut self, sample: f64) {
        self.samples.push_back(sample);
        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
    }

    /// Replace the estimate with the buffer this stream needed.
    pub fn set_buffer_size_by_stream(
        &mut self,
        stream: &NetworkStream,
        record_as_sample: bool,
    ) -> Result<()> {
        let sample = self.sample_from_stream(stream)?;
        self.buffer_size = sample;
        if record_as_sample {
            self.record_sample(sample);
        }
        tracing::debug!(
            estimator = %self.name,
            buffer_size = self.buffer_size,
            "Buffer size estimate set"
        );
        Ok(())
    }

    /// Fold this stream into the history and move the estimate toward the
    /// trimmed percentile.
    pub fn update_buffer_size_by_stream(&mut self, stream: &NetworkStream) -> Result<()> {
        if self.buffer_size < defaults::COLD_START_THRESHOLD {
            return self.set_buffer_size_by_stream(stream, true);
        }

        let sample = self.sample_from_stream(stream)?;
        self.record_sample(sample);

        let target = self.trimmed_percentile();
        self.buffer_size = self.weight * target + (1.0 - self.weight) * self.buffer_size;
        tracing::debug!(
            estimator = %self.name,
            sample,
            target,
            buffer_size = self.buffer_size,
            "Buffer size estimate updated"
        );
        Ok(())
    }

    /// Largest sample left after discarding the most pessimistic
    /// `floor(N * (1 - safe_rate))` samples.
    fn trimmed_percentile(&self) -> f64 {
        let n = self.samples.len();
        let trim = ((n as f64 * (1.0 - self.safe_rate)) + defaults::TIME_EPSILON).floor() as usize;
        let trim = trim.min(n.saturating_sub(1));

        let mut heap: BinaryHeap<Sample> = self.samples.iter().copied().map(Sample).collect();
        for _ in 0..trim {
            heap.pop();
        }
        heap.peek().map(|s| s.0).unwrap_or(self.buffer_size)
    }

    /// Forget all history. The next update is a cold start.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.buffer_size = 0.0;
    }
}
