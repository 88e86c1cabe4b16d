use serde::Serialize;

/// Remaining buffered data per streamed channel.
///
/// Each field is `max(0, duration - position)` in its own unit. Orchestration
/// reads this to decide when to ask for more data or call an utterance done.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct StreamHealth {
    pub motion_health_seconds: f64,
    pub face_health_frames: f64,
    pub audio_health_seconds: f64,
}

impl StreamHealth {
    /// True when every channel has data left to play.
    pub fn all_healthy(&self) -> bool {
        self.motion_health_seconds > 0.0
            && self.face_health_frames > 0.0
            && self.audio_health_seconds > 0.0
    }
}
