use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Agent configuration as shown to the visitor
///
/// Only used for transcript labels and user-facing copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Label for agent transcript lines
    pub display_name: String,

    /// What the agent opens with
    #[serde(default)]
    pub first_message: Option<String>,

    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for AgentProfile {
    fn default() -> Self {
        Self { display_name: "Agent".to_string(), first_message: None, system_prompt: None }
    }
}

impl AgentProfile {
    pub fn named(display_name: impl Into<String>) -> Self {
        Self { display_name: display_name.into(), ..Default::default() }
    }
}

/// Configuration for a voice session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Local identifier, used in logs and event subjects
    pub session_id: String,

    /// Target agent; required before any network call
    pub agent_id: String,

    pub profile: AgentProfile,

    /// Self-initiated liveness ping period
    /// Default: 15 seconds
    pub ping_interval: Duration,

    /// Transport backlog above which captured blocks are dropped
    /// Default: 1 MiB
    pub max_buffered_bytes: usize,

    /// Skip blocks whose samples are all below `silence_threshold`
    pub skip_silence: bool,
    pub silence_threshold: f32,

    /// Mute state at the start of each attempt
    pub start_muted: bool,

    /// Audio-level sampling period; zero disables level events
    pub level_interval: Duration,

    /// Treat transport open as session-ready (servers that never send
    /// initiation metadata)
    pub assume_ready_on_open: bool,

    /// Wire sample rate; inbound PCM uses it until renegotiated
    pub sample_rate: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("session-{}", uuid::Uuid::new_v4()),
            agent_id: String::new(),
            profile: AgentProfile::default(),
            ping_interval: Duration::from_secs(15),
            max_buffered_bytes: 1024 * 1024,
            skip_silence: false,
            silence_threshold: 0.01,
            start_muted: false,
            level_interval: Duration::from_millis(100),
            assume_ready_on_open: false,
            sample_rate: 16000, // 16kHz wire format
        }
    }
}

impl SessionConfig {
    pub fn for_agent(agent_id: impl Into<String>) -> Self {
        Self { agent_id: agent_id.into(), ..Default::default() }
    }

    pub(crate) fn silence_gate(&self) -> Option<f32> {
        self.skip_silence.then_some(self.silence_threshold)
    }
}
