use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Who said a transcript line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Agent,
}

/// One line of the conversation transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptLine {
    pub speaker: Speaker,

    /// Display label ("You" or the agent's name)
    pub label: String,

    pub text: String,

    /// When the line was interpreted
    pub timestamp: DateTime<Utc>,
}

impl TranscriptLine {
    pub fn new(speaker: Speaker, label: impl Into<String>, text: String) -> Self {
        Self { speaker, label: label.into(), text, timestamp: Utc::now() }
    }
}

/// Live counters shared by the pump, the player and the reactor
#[derive(Debug, Default)]
pub struct SessionCounters {
    pub frames_sent: AtomicU64,
    pub frames_not_ready: AtomicU64,
    pub frames_muted: AtomicU64,
    pub frames_silent: AtomicU64,
    pub frames_backpressure: AtomicU64,
    pub send_failures: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub chunks_scheduled: AtomicU64,
    pub decode_failures: AtomicU64,
    pub pings_sent: AtomicU64,
    pub pongs_sent: AtomicU64,
}

impl SessionCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Statistics about a voice session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStats {
    /// When the current attempt connected
    pub connected_at: Option<DateTime<Utc>>,

    /// Connected time in seconds
    pub duration_secs: f64,

    /// Outbound blocks handed to the transport
    pub frames_sent: u64,

    /// Outbound blocks dropped before session-ready
    pub frames_not_ready: u64,

    /// Outbound blocks dropped while muted
    pub frames_muted: u64,

    /// Outbound blocks skipped as silence
    pub frames_silent: u64,

    /// Outbound blocks dropped because the send backlog was over the ceiling
    pub frames_backpressure: u64,

    pub send_failures: u64,
    pub bytes_sent: u64,

    /// Inbound chunks placed on the playback clock
    pub chunks_scheduled: u64,

    /// Inbound chunks that could not be decoded
    pub decode_failures: u64,

    pub pings_sent: u64,
    pub pongs_sent: u64,
    pub transcript_lines: usize,
}

impl SessionStats {
    pub fn from_counters(
        counters: &SessionCounters,
        connected_at: Option<DateTime<Utc>>,
        transcript_lines: usize,
    ) -> Self {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        let duration_secs = connected_at
            .map(|at| Utc::now().signed_duration_since(at).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);

        Self {
            connected_at,
            duration_secs,
            frames_sent: load(&counters.frames_sent),
            frames_not_ready: load(&counters.frames_not_ready),
            frames_muted: load(&counters.frames_muted),
            frames_silent: load(&counters.frames_silent),
            frames_backpressure: load(&counters.frames_backpressure),
            send_failures: load(&counters.send_failures),
            bytes_sent: load(&counters.bytes_sent),
            chunks_scheduled: load(&counters.chunks_scheduled),
            decode_failures: load(&counters.decode_failures),
            pings_sent: load(&counters.pings_sent),
            pongs_sent: load(&counters.pongs_sent),
            transcript_lines,
        }
    }

    /// All outbound blocks dropped for any reason
    pub fn frames_dropped(&self) -> u64 {
        self.frames_not_ready
            + self.frames_muted
            + self.frames_silent
            + self.frames_backpressure
            + self.send_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_of_counters() {
        let counters = SessionCounters::default();
        SessionCounters::bump(&counters.frames_sent);
        SessionCounters::bump(&counters.frames_muted);
        SessionCounters::bump(&counters.frames_backpressure);
        SessionCounters::bump(&counters.send_failures);

        let stats = SessionStats::from_counters(&counters, None, 3);
        assert_eq!(stats.frames_sent, 1);
        assert_eq!(stats.frames_dropped(), 3);
        assert_eq!(stats.transcript_lines, 3);
        assert_eq!(stats.duration_secs, 0.0);
    }

    #[test]
    fn test_speaker_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Speaker::User).unwrap(), "\"user\"");
    }
}
