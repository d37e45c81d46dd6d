//! Streaming voice session
//!
//! This module provides the `VoiceSession` abstraction that manages:
//! - Credential fetch and transport lifecycle (the negotiator)
//! - Outbound microphone audio, gated by ready/mute/backpressure
//! - Gap-free inbound playback
//! - Control-channel dispatch, keepalive pings and transcript collection
//! - Status/error/transcript/level events and session statistics

mod config;
mod events;
mod session;
mod state;
mod stats;

pub use config::{AgentProfile, SessionConfig};
pub use events::{EventBus, SessionEvent};
pub use session::{SinkFactory, TeardownReport, VoiceSession};
pub use state::{ConnectionState, SessionSnapshot, SharedState};
pub use stats::{SessionCounters, SessionStats, Speaker, TranscriptLine};
