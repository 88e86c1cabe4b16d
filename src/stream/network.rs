//! Arrival telemetry for one received stream.

use crate::error::{AvatarStreamError, Result};
use serde::Serialize;
use std::fmt;

/// One chunk of a received stream: its playable duration and when it arrived.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NetworkStreamChunk {
    pub index: u32,
    pub duration_seconds: f64,
    pub receive_time_seconds: f64,
}

impl NetworkStreamChunk {
    pub fn new(index: u32, duration_seconds: f64, receive_time_seconds: f64) -> Self {
        Self {
            index,
            duration_seconds,
            receive_time_seconds,
        }
    }
}

impl fmt::Display for NetworkStreamChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Index: {}, Duration: {:.3}, Receive Time: {:.3}",
            self.index, self.duration_seconds, self.receive_time_seconds
        )
    }
}

/// Append-only record of chunk arrivals for a single stream.
///
/// Chunks must arrive in index order; insertion order, arrival order and
/// index order are the same thing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkStream {
    start_recv_time: f64,
    end_recv_time: Option<f64>,
    chunks: Vec<NetworkStreamChunk>,
}

impl NetworkStream {
    pub fn new(start_recv_time: f64) -> Self {
        Self {
            start_recv_time,
            end_recv_time: None,
            chunks: Vec::new(),
        }
    }

    /// Append the next chunk. Its index must equal the current length.
    pub fn append_chunk(&mut self, chunk: NetworkStreamChunk) -> Result<()> {
        let expected = self.chunks.len() as u32;
        if chunk.index != expected {
            return Err(AvatarStreamError::OutOfOrderChunk {
                expected,
                actual: chunk.index,
            });
        }
        self.chunks.push(chunk);
        Ok(())
    }

    /// Convenience for the transport layer: append with the next index.
    pub fn push(&mut self, duration_seconds: f64, receive_time_seconds: f64) {
        let index = self.chunks.len() as u32;
        self.chunks.push(NetworkStreamChunk::new(
            index,
            duration_seconds,
            receive_time_seconds,
        ));
    }

    pub fn set_end_recv_time(&mut self, end_recv_time: f64) {
        self.end_recv_time = Some(end_recv_time);
    }

    pub fn start_recv_time(&self) -> f64 {
        self.start_recv_time
    }

    pub fn end_recv_time(&self) -> Option<f64> {
        self.end_recv_time
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&NetworkStreamChunk> {
        self.chunks.get(index)
    }

    pub fn chunks(&self) -> &[NetworkStreamChunk] {
        &self.chunks
    }

    /// Total playable duration of all received chunks.
    pub fn total_duration(&self) -> f64 {
        self.chunks.iter().map(|c| c.duration_seconds).sum()
    }
}

impl fmt::Display for NetworkStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end_recv_time {
            Some(end) => writeln!(
                f,
                "Start Receive Time: {}, End Receive Time: {}",
                self.start_recv_time, end
            )?,
            None => writeln!(
                f,
                "Start Receive Time: {}, End Receive Time: pending",
                self.start_recv_time
            )?,
        }
        for chunk in &self.chunks {
            writeln!(f, "{}", chunk)?;
        }
        Ok(())
    }
}
