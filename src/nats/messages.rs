use serde::Serialize;

use crate::session::SessionEvent;

/// Session event published to NATS
#[derive(Debug, Clone, Serialize)]
pub struct SessionEventMessage {
    pub session_id: String,
    pub timestamp: String, // RFC3339 timestamp
    #[serde(flatten)]
    pub event: SessionEvent,
}

impl SessionEventMessage {
    pub fn new(session_id: impl Into<String>, event: SessionEvent) -> Self {
        Self {
            session_id: session_id.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            event,
        }
    }
}

/// `<prefix>.<session>.<kind>`
pub fn event_subject(prefix: &str, session_id: &str, kind: &str) -> String {
    format!("{}.{}.{}", prefix.trim_end_matches('.'), session_id, kind)
}
