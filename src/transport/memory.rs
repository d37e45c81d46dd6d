// In-process transport
//
// Every `connect` creates a loopback pair: the session gets a `Transport`
// and event receiver, and a `MemoryPeer` is handed out on the connector's
// peer channel so a host or test can play the remote endpoint.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;

use super::{Connection, Connector, OutboundMessage, Transport, TransportEvent};
use crate::error::TransportError;
use crate::protocol::CloseInfo;

#[derive(Debug, Default)]
struct PeerState {
    buffered: AtomicUsize,
    open: AtomicBool,
    fail_close: AtomicBool,
    close_calls: AtomicUsize,
    closed_with: Mutex<Option<(u16, String)>>,
}

/// Connector producing in-memory loopback connections
pub struct MemoryConnector {
    peers: mpsc::UnboundedSender<MemoryPeer>,
    connects: AtomicUsize,
    refuse: Option<String>,
}

impl MemoryConnector {
    /// Returns the connector and the stream of peers, one per `connect`.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        (Self { peers, connects: AtomicUsize::new(0), refuse: None }, rx)
    }

    /// A connector whose every `connect` fails with `reason`.
    pub fn refusing(reason: impl Into<String>) -> Self {
        let (peers, _) = mpsc::unbounded_channel();
        Self { peers, connects: AtomicUsize::new(0), refuse: Some(reason.into()) }
    }

    /// Number of `connect` calls so far
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &str) -> Result<Connection, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = &self.refuse {
            return Err(TransportError::Connect(reason.clone()));
        }

        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(256);
        let state = Arc::new(PeerState { open: AtomicBool::new(true), ..Default::default() });

        let transport = MemoryTransport {
            sent: sent_tx,
            events: event_tx.clone(),
            state: Arc::clone(&state),
        };
        let peer = MemoryPeer { url: url.to_string(), sent: sent_rx, events: event_tx, state };

        if self.peers.send(peer).is_err() {
            debug!("No listener for memory peer");
        }

        Ok(Connection { transport: Arc::new(transport), events: event_rx })
    }

    fn name(&self) -> &str {
        "memory"
    }
}

struct MemoryTransport {
    sent: mpsc::UnboundedSender<OutboundMessage>,
    events: mpsc::Sender<TransportEvent>,
    state: Arc<PeerState>,
}

impl Transport for MemoryTransport {
    fn send(&self, message: OutboundMessage) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        self.sent
            .send(message)
            .map_err(|_| TransportError::Send("peer dropped".to_string()))
    }

    fn buffered_amount(&self) -> usize {
        self.state.buffered.load(Ordering::SeqCst)
    }

    fn close(&self, code: u16, reason: &str) -> Result<(), TransportError> {
        self.state.close_calls.fetch_add(1, Ordering::SeqCst);
        if !self.state.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        if let Ok(mut closed_with) = self.state.closed_with.lock() {
            *closed_with = Some((code, reason.to_string()));
        }
        let _ = self.events.try_send(TransportEvent::Closed(CloseInfo::new(code, reason, true)));

        if self.state.fail_close.load(Ordering::SeqCst) {
            return Err(TransportError::Close("simulated close failure".to_string()));
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.open.load(Ordering::SeqCst)
    }
}

/// Remote end of an in-memory connection
pub struct MemoryPeer {
    url: String,
    sent: mpsc::UnboundedReceiver<OutboundMessage>,
    events: mpsc::Sender<TransportEvent>,
    state: Arc<PeerState>,
}

impl MemoryPeer {
    /// URL the session connected to
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Next message the session sent
    pub async fn recv(&mut self) -> Option<OutboundMessage> {
        self.sent.recv().await
    }

    /// Next sent message, if one is already queued
    pub fn try_recv(&mut self) -> Option<OutboundMessage> {
        self.sent.try_recv().ok()
    }

    /// Everything sent so far
    pub fn drain(&mut self) -> Vec<OutboundMessage> {
        let mut out = Vec::new();
        while let Ok(message) = self.sent.try_recv() {
            out.push(message);
        }
        out
    }

    pub async fn send_text(&self, text: impl Into<String>) {
        let _ = self.events.send(TransportEvent::Text(text.into())).await;
    }

    pub async fn send_json(&self, value: &serde_json::Value) {
        self.send_text(value.to_string()).await;
    }

    pub async fn send_binary(&self, bytes: Vec<u8>) {
        let _ = self.events.send(TransportEvent::Binary(bytes)).await;
    }

    /// Socket-level error, as a real transport reports before closing
    pub async fn send_error(&self, message: impl Into<String>) {
        let _ = self.events.send(TransportEvent::Error(message.into())).await;
    }

    /// Remote-initiated close
    pub async fn close(&self, code: u16, reason: &str, clean: bool) {
        self.state.open.store(false, Ordering::SeqCst);
        let _ = self.events.send(TransportEvent::Closed(CloseInfo::new(code, reason, clean))).await;
    }

    /// Pretend this many bytes are waiting to be written.
    pub fn set_buffered(&self, bytes: usize) {
        self.state.buffered.store(bytes, Ordering::SeqCst);
    }

    /// Make the session's `close` report an error (after closing).
    pub fn fail_close(&self, fail: bool) {
        self.state.fail_close.store(fail, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        self.state.open.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.state.close_calls.load(Ordering::SeqCst)
    }

    /// Code and reason of the session's close, if it closed
    pub fn closed_with(&self) -> Option<(u16, String)> {
        self.state.closed_with.lock().ok().and_then(|c| c.clone())
    }
}
