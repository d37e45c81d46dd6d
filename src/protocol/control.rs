//! Control-channel interpreter
//!
//! Classifies every non-audio message from the endpoint and turns it into a
//! `Directive` for the session reactor. The interpreter holds no I/O; it only
//! tracks the ready flag and the outbound ping counter so the reactor stays
//! a thin dispatcher.

use super::messages::{ClientMessage, ServerMessage};
use crate::session::{Speaker, TranscriptLine};
use tracing::{debug, info, warn};

/// What the reactor must do after a control message.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// Send this message immediately (pong).
    Reply(ClientMessage),
    /// First session-ready: open the outbound gate.
    MarkReady {
        conversation_id: Option<String>,
        output_pcm_rate: Option<u32>,
    },
    /// Metadata arriving after an assumed ready: apply it, the gate is already open.
    ApplyMetadata {
        conversation_id: Option<String>,
        output_pcm_rate: Option<u32>,
    },
    /// Append to the transcript log.
    Transcript(TranscriptLine),
    /// Base64 PCM audio carried in a JSON envelope.
    PlayPcm(String),
    /// Nothing to do.
    Ignore,
}

/// Stateful classifier for control messages.
#[derive(Debug)]
pub struct Interpreter {
    agent_label: String,
    ready: bool,
    metadata_seen: bool,
    next_ping_id: u64,
}

impl Interpreter {
    pub fn new(agent_label: impl Into<String>) -> Self {
        Self { agent_label: agent_label.into(), ready: false, metadata_seen: false, next_ping_id: 1 }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Parse and interpret one JSON text message.
    ///
    /// Malformed JSON is logged and ignored; it never fails the session.
    pub fn interpret_text(&mut self, raw: &str) -> Directive {
        match serde_json::from_str::<ServerMessage>(raw) {
            Ok(msg) => self.interpret(msg),
            Err(e) => {
                warn!("Ignoring malformed control message: {}", e);
                Directive::Ignore
            }
        }
    }

    pub fn interpret(&mut self, msg: ServerMessage) -> Directive {
        match msg {
            ServerMessage::ConversationInitiationMetadata {
                conversation_initiation_metadata_event,
            } => {
                if self.metadata_seen {
                    warn!("Duplicate session-ready ignored");
                    return Directive::Ignore;
                }
                self.metadata_seen = true;
                let event = conversation_initiation_metadata_event.unwrap_or_default();
                let output_pcm_rate = event.output_pcm_rate();
                let conversation_id = event.conversation_id;
                if self.ready {
                    info!(
                        ?conversation_id,
                        output_format = ?event.agent_output_audio_format,
                        "Session metadata after assumed ready"
                    );
                    return Directive::ApplyMetadata { conversation_id, output_pcm_rate };
                }
                self.ready = true;
                info!(
                    ?conversation_id,
                    output_format = ?event.agent_output_audio_format,
                    "Session ready"
                );
                Directive::MarkReady { conversation_id, output_pcm_rate }
            }
            ServerMessage::Ping { ping_event } => {
                let event_id = ping_event.and_then(|p| p.event_id);
                debug!(?event_id, "Liveness ping received");
                Directive::Reply(ClientMessage::pong(event_id))
            }
            ServerMessage::Pong { event_id } => {
                debug!(?event_id, "Liveness pong received");
                Directive::Ignore
            }
            ServerMessage::Audio { audio_event } => Directive::PlayPcm(audio_event.audio_base_64),
            ServerMessage::UserTranscript { user_transcript_event, text } => {
                match user_transcript_event.map(|e| e.user_transcript).or(text) {
                    Some(text) => Directive::Transcript(TranscriptLine::new(
                        Speaker::User,
                        "You",
                        text,
                    )),
                    None => Directive::Ignore,
                }
            }
            ServerMessage::AgentResponse { agent_response_event, text } => {
                match agent_response_event.map(|e| e.agent_response).or(text) {
                    Some(text) => Directive::Transcript(TranscriptLine::new(
                        Speaker::Agent,
                        self.agent_label.clone(),
                        text,
                    )),
                    None => Directive::Ignore,
                }
            }
            ServerMessage::Transcript { text } => match text {
                Some(text) => Directive::Transcript(TranscriptLine::new(
                    Speaker::Agent,
                    self.agent_label.clone(),
                    text,
                )),
                None => Directive::Ignore,
            },
            ServerMessage::Interruption { interruption_event } => {
                info!(
                    event_id = ?interruption_event.and_then(|e| e.event_id),
                    "Agent speech interrupted"
                );
                Directive::Ignore
            }
            ServerMessage::Error { message, error_event } => {
                let detail = message
                    .or_else(|| error_event.and_then(|e| e.message))
                    .unwrap_or_else(|| "unspecified".to_string());
                warn!("Endpoint reported error: {}", detail);
                Directive::Ignore
            }
            ServerMessage::Unknown => {
                debug!("Ignoring unrecognized message kind");
                Directive::Ignore
            }
        }
    }

    /// Build the next self-initiated liveness ping.
    pub fn next_ping(&mut self) -> ClientMessage {
        let id = self.next_ping_id;
        self.next_ping_id += 1;
        ClientMessage::ping(id)
    }

    /// Treat the transport open as the ready signal (raw-binary servers
    /// that never send metadata). Metadata that still arrives later is
    /// applied once through `Directive::ApplyMetadata`.
    pub fn assume_ready(&mut self) -> bool {
        let first = !self.ready;
        self.ready = true;
        first
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interpreter() -> Interpreter {
        Interpreter::new("Curator")
    }

    #[test]
    fn test_ping_produces_matching_pong() {
        let mut interp = interpreter();
        let directive =
            interp.interpret_text(r#"{"type":"ping","ping_event":{"event_id":42,"ping_ms":80}}"#);
        assert_eq!(directive, Directive::Reply(ClientMessage::pong(Some(42.into()))));
    }

    #[test]
    fn test_string_ping_id_is_echoed() {
        let mut interp = interpreter();
        let directive = interp.interpret_text(r#"{"type":"ping","ping_event":{"event_id":"abc-1"}}"#);
        assert_eq!(directive, Directive::Reply(ClientMessage::pong(Some("abc-1".into()))));
        match directive {
            Directive::Reply(pong) => {
                assert_eq!(pong.to_json().unwrap(), r#"{"type":"pong","event_id":"abc-1"}"#)
            }
            other => panic!("unexpected directive: {:?}", other),
        }
    }

    #[test]
    fn test_ping_without_id_gets_bare_pong() {
        let mut interp = interpreter();
        let directive = interp.interpret_text(r#"{"type":"ping","ping_event":{"ping_ms":80}}"#);
        assert_eq!(directive, Directive::Reply(ClientMessage::pong(None)));
    }

    #[test]
    fn test_bare_ping_gets_bare_pong() {
        let mut interp = interpreter();
        let directive = interp.interpret_text(r#"{"type":"ping"}"#);
        assert_eq!(directive, Directive::Reply(ClientMessage::pong(None)));
    }

    #[test]
    fn test_ready_only_once() {
        let mut interp = interpreter();
        assert!(!interp.is_ready());

        let raw = r#"{
            "type": "conversation_initiation_metadata",
            "conversation_initiation_metadata_event": {
                "conversation_id": "conv_123",
                "agent_output_audio_format": "pcm_16000"
            }
        }"#;
        assert_eq!(
            interp.interpret_text(raw),
            Directive::MarkReady {
                conversation_id: Some("conv_123".to_string()),
                output_pcm_rate: Some(16000),
            }
        );
        assert!(interp.is_ready());
        assert_eq!(interp.interpret_text(raw), Directive::Ignore);
    }

    #[test]
    fn test_metadata_after_assumed_ready_is_applied() {
        let mut interp = interpreter();
        assert!(interp.assume_ready());
        assert!(!interp.assume_ready());

        let raw = r#"{
            "type": "conversation_initiation_metadata",
            "conversation_initiation_metadata_event": {
                "conversation_id": "conv_late",
                "agent_output_audio_format": "pcm_22050"
            }
        }"#;
        assert_eq!(
            interp.interpret_text(raw),
            Directive::ApplyMetadata {
                conversation_id: Some("conv_late".to_string()),
                output_pcm_rate: Some(22050),
            }
        );
        assert!(interp.is_ready());
        // Only the first copy counts
        assert_eq!(interp.interpret_text(raw), Directive::Ignore);
    }

    #[test]
    fn test_transcripts_are_tagged() {
        let mut interp = interpreter();

        let user = interp.interpret_text(
            r#"{"type":"user_transcript","user_transcript_event":{"user_transcript":"Who painted this?"}}"#,
        );
        match user {
            Directive::Transcript(line) => {
                assert_eq!(line.speaker, Speaker::User);
                assert_eq!(line.label, "You");
                assert_eq!(line.text, "Who painted this?");
            }
            other => panic!("unexpected directive: {:?}", other),
        }

        let agent = interp.interpret_text(
            r#"{"type":"agent_response","agent_response_event":{"agent_response":"Monet did."}}"#,
        );
        match agent {
            Directive::Transcript(line) => {
                assert_eq!(line.speaker, Speaker::Agent);
                assert_eq!(line.label, "Curator");
                assert_eq!(line.text, "Monet did.");
            }
            other => panic!("unexpected directive: {:?}", other),
        }
    }

    #[test]
    fn test_flat_transcript_form() {
        let mut interp = interpreter();
        let directive = interp.interpret_text(r#"{"type":"user_transcript","text":"hello"}"#);
        assert!(matches!(directive, Directive::Transcript(line) if line.text == "hello"));
    }

    #[test]
    fn test_untagged_transcript_is_attributed_to_agent() {
        let mut interp = interpreter();
        match interp.interpret_text(r#"{"type":"transcript","text":"The east wing closes at five."}"#) {
            Directive::Transcript(line) => {
                assert_eq!(line.speaker, Speaker::Agent);
                assert_eq!(line.label, "Curator");
                assert_eq!(line.text, "The east wing closes at five.");
            }
            other => panic!("unexpected directive: {:?}", other),
        }
        assert_eq!(interp.interpret_text(r#"{"type":"transcript"}"#), Directive::Ignore);
    }

    #[test]
    fn test_audio_envelope() {
        let mut interp = interpreter();
        let directive = interp
            .interpret_text(r#"{"type":"audio","audio_event":{"audio_base_64":"AAA=","event_id":1}}"#);
        assert_eq!(directive, Directive::PlayPcm("AAA=".to_string()));
    }

    #[test]
    fn test_unknown_and_malformed_are_ignored() {
        let mut interp = interpreter();
        assert_eq!(interp.interpret_text(r#"{"type":"brand_new_kind"}"#), Directive::Ignore);
        assert_eq!(interp.interpret_text("not json"), Directive::Ignore);
        assert_eq!(interp.interpret_text(r#"{"no_type":true}"#), Directive::Ignore);
        assert_eq!(interp.interpret_text(r#"{"type":"interruption"}"#), Directive::Ignore);
        assert_eq!(
            interp.interpret_text(r#"{"type":"error","message":"quota"}"#),
            Directive::Ignore
        );
    }

    #[test]
    fn test_ping_ids_increment() {
        let mut interp = interpreter();
        assert_eq!(interp.next_ping(), ClientMessage::ping(1));
        assert_eq!(interp.next_ping(), ClientMessage::ping(2));
    }
}
