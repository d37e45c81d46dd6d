//! Outbound audio pump
//!
//! Every captured block passes a fixed series of gates before it reaches the
//! socket: session ready, not muted, not silent (when silence skipping is
//! on), and transport backlog under the ceiling. A block failing any gate is
//! dropped, never queued.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, warn};

use super::backend::AudioFrame;
use super::pcm;
use crate::protocol::{ClientMessage, WireStyle};
use crate::session::{SessionCounters, SessionSnapshot};
use crate::transport::{OutboundMessage, Transport};

/// What happened to one captured block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome {
    Sent,
    NotReady,
    Muted,
    Silent,
    Backpressure,
    SendFailed,
}

/// Encodes capture blocks for the wire and applies the send gates
pub struct OutboundPump {
    style: WireStyle,
    max_buffered_bytes: usize,
    silence_threshold: Option<f32>,
    counters: Arc<SessionCounters>,
}

impl OutboundPump {
    /// `silence_threshold` of `None` forwards silent blocks too.
    pub fn new(
        style: WireStyle,
        max_buffered_bytes: usize,
        silence_threshold: Option<f32>,
        counters: Arc<SessionCounters>,
    ) -> Self {
        Self { style, max_buffered_bytes, silence_threshold, counters }
    }

    pub fn style(&self) -> WireStyle {
        self.style
    }

    /// Encode one block in the session's wire style.
    pub fn encode(&self, frame: &AudioFrame) -> Option<OutboundMessage> {
        let pcm = pcm::encode_pcm16(&frame.samples);
        match self.style {
            WireStyle::Json => match ClientMessage::audio_chunk(&pcm).to_json() {
                Ok(text) => Some(OutboundMessage::Text(text)),
                Err(e) => {
                    warn!("Failed to encode audio chunk: {}", e);
                    None
                }
            },
            WireStyle::RawBinary => Some(OutboundMessage::Binary(pcm)),
        }
    }

    pub fn process(
        &self,
        frame: &AudioFrame,
        snapshot: &SessionSnapshot,
        transport: &dyn Transport,
    ) -> PumpOutcome {
        let outcome = self.gate(frame, snapshot, transport);
        let counter = match outcome {
            PumpOutcome::Sent => &self.counters.frames_sent,
            PumpOutcome::NotReady => &self.counters.frames_not_ready,
            PumpOutcome::Muted => &self.counters.frames_muted,
            PumpOutcome::Silent => &self.counters.frames_silent,
            PumpOutcome::Backpressure => &self.counters.frames_backpressure,
            PumpOutcome::SendFailed => &self.counters.send_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        outcome
    }

    fn gate(
        &self,
        frame: &AudioFrame,
        snapshot: &SessionSnapshot,
        transport: &dyn Transport,
    ) -> PumpOutcome {
        if !snapshot.ready || !transport.is_open() {
            return PumpOutcome::NotReady;
        }
        if snapshot.muted {
            return PumpOutcome::Muted;
        }
        if let Some(threshold) = self.silence_threshold {
            if pcm::is_silent(&frame.samples, threshold) {
                return PumpOutcome::Silent;
            }
        }

        let buffered = transport.buffered_amount();
        if buffered >= self.max_buffered_bytes {
            debug!(
                "Dropping block {}: {} bytes already buffered",
                frame.sequence, buffered
            );
            return PumpOutcome::Backpressure;
        }

        let Some(message) = self.encode(frame) else {
            return PumpOutcome::SendFailed;
        };
        let len = message.len() as u64;

        match transport.send(message) {
            Ok(()) => {
                self.counters.bytes_sent.fetch_add(len, Ordering::Relaxed);
                PumpOutcome::Sent
            }
            Err(e) => {
                warn!("Failed to send audio block {}: {}", frame.sequence, e);
                PumpOutcome::SendFailed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ConnectionState;
    use crate::transport::memory::MemoryConnector;
    use crate::transport::Connector;

    fn ready() -> SessionSnapshot {
        SessionSnapshot { state: ConnectionState::Connected, muted: false, ready: true }
    }

    fn pump(style: WireStyle, silence: Option<f32>) -> OutboundPump {
        OutboundPump::new(style, 1024, silence, Arc::new(SessionCounters::default()))
    }

    fn loud_frame() -> AudioFrame {
        AudioFrame::new(vec![0.25; 8], 16000, 0)
    }

    #[tokio::test]
    async fn test_gates_in_order() {
        let (connector, _peers) = MemoryConnector::new();
        let conn = connector.connect("ws://test").await.unwrap();
        let pump = pump(WireStyle::Json, Some(0.01));

        let not_ready = SessionSnapshot { ready: false, ..ready() };
        assert_eq!(pump.process(&loud_frame(), &not_ready, conn.transport.as_ref()), PumpOutcome::NotReady);

        let muted = SessionSnapshot { muted: true, ..ready() };
        assert_eq!(pump.process(&loud_frame(), &muted, conn.transport.as_ref()), PumpOutcome::Muted);

        let quiet = AudioFrame::new(vec![0.001; 8], 16000, 1);
        assert_eq!(pump.process(&quiet, &ready(), conn.transport.as_ref()), PumpOutcome::Silent);

        assert_eq!(pump.process(&loud_frame(), &ready(), conn.transport.as_ref()), PumpOutcome::Sent);
    }

    #[tokio::test]
    async fn test_backpressure_drops_block() {
        let (connector, mut peers) = MemoryConnector::new();
        let conn = connector.connect("ws://test").await.unwrap();
        let peer = peers.recv().await.unwrap();
        let pump = pump(WireStyle::Json, None);

        peer.set_buffered(1024);
        assert_eq!(pump.process(&loud_frame(), &ready(), conn.transport.as_ref()), PumpOutcome::Backpressure);

        peer.set_buffered(1023);
        assert_eq!(pump.process(&loud_frame(), &ready(), conn.transport.as_ref()), PumpOutcome::Sent);
        assert_eq!(pump.counters.frames_backpressure.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_encode_styles() {
        let frame = AudioFrame::new(vec![0.0, 1.0], 16000, 0);

        match pump(WireStyle::Json, None).encode(&frame) {
            Some(OutboundMessage::Text(text)) => {
                assert_eq!(text, r#"{"user_audio_chunk":"AAD/fw=="}"#)
            }
            other => panic!("unexpected {:?}", other),
        }

        match pump(WireStyle::RawBinary, None).encode(&frame) {
            Some(OutboundMessage::Binary(bytes)) => assert_eq!(bytes, vec![0x00, 0x00, 0xff, 0x7f]),
            other => panic!("unexpected {:?}", other),
        }
    }
}
