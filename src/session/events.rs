use serde::Serialize;
use tokio::sync::broadcast;

use super::state::ConnectionState;
use super::stats::TranscriptLine;

const EVENT_CAPACITY: usize = 256;

/// Outbound notifications from a session
///
/// These are the status, error, transcript and audio-level callbacks,
/// delivered over a broadcast channel so any number of observers (CLI,
/// NATS forwarder, host UI) can listen.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Every negotiator state transition
    Status { state: ConnectionState },

    /// Unrecoverable failure, as a human-readable message
    Error { message: String },

    /// Session-ready observed
    Ready { conversation_id: Option<String> },

    Transcript(TranscriptLine),

    MuteChanged { muted: bool },

    /// Normalized inbound playback energy in [0, 1]
    AudioLevel { level: f32 },
}

impl SessionEvent {
    /// Short name, used in NATS subjects
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Error { .. } => "error",
            Self::Ready { .. } => "ready",
            Self::Transcript(_) => "transcript",
            Self::MuteChanged { .. } => "mute_changed",
            Self::AudioLevel { .. } => "audio_level",
        }
    }
}

/// Broadcast sender for session events
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Emit to all current subscribers. Having none is fine.
    pub fn emit(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Speaker;

    #[test]
    fn test_event_json_shape() {
        let status = SessionEvent::Status { state: ConnectionState::Connected };
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            serde_json::json!({"kind": "status", "state": "connected"})
        );

        let line = TranscriptLine::new(Speaker::Agent, "Curator", "Welcome".to_string());
        let value = serde_json::to_value(SessionEvent::Transcript(line)).unwrap();
        assert_eq!(value["kind"], "transcript");
        assert_eq!(value["speaker"], "agent");
        assert_eq!(value["label"], "Curator");
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new();
        bus.emit(SessionEvent::AudioLevel { level: 0.0 });
    }
}
