use base64::Engine;
use serde::{Deserialize, Serialize};

/// Which framing an integration speaks on the socket.
///
/// Fixed per credential: the provider that issued the signed URL decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireStyle {
    /// Every message is JSON; audio travels base64-encoded inside envelopes.
    #[default]
    Json,
    /// Audio travels as unframed binary messages; control stays JSON text.
    RawBinary,
}

impl std::fmt::Display for WireStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::RawBinary => write!(f, "raw_binary"),
        }
    }
}

// ============================================================================
// Server → client
// ============================================================================

/// JSON message received from the conversational endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    #[serde(alias = "session_ready")]
    ConversationInitiationMetadata {
        #[serde(default)]
        conversation_initiation_metadata_event: Option<InitiationMetadataEvent>,
    },
    Ping {
        #[serde(default)]
        ping_event: Option<PingEvent>,
    },
    Pong {
        #[serde(default)]
        event_id: Option<serde_json::Value>,
    },
    Audio {
        audio_event: AudioEvent,
    },
    UserTranscript {
        #[serde(default)]
        user_transcript_event: Option<UserTranscriptEvent>,
        #[serde(default)]
        text: Option<String>,
    },
    AgentResponse {
        #[serde(default)]
        agent_response_event: Option<AgentResponseEvent>,
        #[serde(default)]
        text: Option<String>,
    },
    /// Untagged transcript line, no speaker attached.
    Transcript {
        #[serde(default)]
        text: Option<String>,
    },
    Interruption {
        #[serde(default)]
        interruption_event: Option<InterruptionEvent>,
    },
    Error {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        error_event: Option<ErrorEvent>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InitiationMetadataEvent {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub agent_output_audio_format: Option<String>,
    #[serde(default)]
    pub user_input_audio_format: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingEvent {
    /// Echoed back verbatim; servers are free to use strings.
    #[serde(default)]
    pub event_id: Option<serde_json::Value>,
    #[serde(default)]
    pub ping_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioEvent {
    pub audio_base_64: String,
    #[serde(default)]
    pub event_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserTranscriptEvent {
    pub user_transcript: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponseEvent {
    pub agent_response: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterruptionEvent {
    #[serde(default)]
    pub event_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEvent {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<serde_json::Value>,
}

impl InitiationMetadataEvent {
    /// Sample rate of a `pcm_<rate>` output format, if that is what was negotiated.
    pub fn output_pcm_rate(&self) -> Option<u32> {
        self.agent_output_audio_format
            .as_deref()
            .and_then(|f| f.strip_prefix("pcm_"))
            .and_then(|rate| rate.parse().ok())
    }
}

// ============================================================================
// Client → server
// ============================================================================

/// JSON message sent to the conversational endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ClientMessage {
    /// `{ "user_audio_chunk": "<base64 PCM>" }`
    UserAudioChunk { user_audio_chunk: String },
    /// `{ "type": "pong", "event_id": <id> }`
    Pong {
        r#type: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<serde_json::Value>,
    },
    /// `{ "type": "ping", "ping_event": { "event_id": N } }`
    Ping {
        r#type: &'static str,
        ping_event: OutboundPingEvent,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundPingEvent {
    pub event_id: u64,
}

impl ClientMessage {
    pub fn audio_chunk(pcm_bytes: &[u8]) -> Self {
        Self::UserAudioChunk {
            user_audio_chunk: base64::engine::general_purpose::STANDARD.encode(pcm_bytes),
        }
    }

    pub fn pong(event_id: Option<serde_json::Value>) -> Self {
        Self::Pong { r#type: "pong", event_id }
    }

    pub fn ping(event_id: u64) -> Self {
        Self::Ping { r#type: "ping", ping_event: OutboundPingEvent { event_id } }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
