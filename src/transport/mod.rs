//! Message-oriented, full-duplex transport
//!
//! The session talks to the endpoint through two halves:
//! - a `Transport` handle for sending, closing and reading the send backlog
//! - a receiver of `TransportEvent`s in arrival order, ending with `Closed`
//!
//! Implementations:
//! - `ws`: WebSocket over `tokio-tungstenite`
//! - `memory`: in-process loopback driven by a test peer

pub mod memory;
pub mod ws;

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::protocol::CloseInfo;

pub use memory::{MemoryConnector, MemoryPeer};
pub use ws::WsConnector;

/// Message handed to the transport
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Text(String),
    Binary(Vec<u8>),
}

impl OutboundMessage {
    /// Bytes this message adds to the send backlog
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Something that happened on the transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Text message (JSON control or JSON-enveloped audio)
    Text(String),
    /// Binary message (raw audio)
    Binary(Vec<u8>),
    /// Socket-level error; a `Closed` event follows
    Error(String),
    /// Terminal
    Closed(CloseInfo),
}

/// Sending half of an open connection
pub trait Transport: Send + Sync {
    /// Queue a message. Never blocks; the backlog shows up in
    /// `buffered_amount` until written.
    fn send(&self, message: OutboundMessage) -> Result<(), TransportError>;

    /// Bytes queued but not yet written to the socket
    fn buffered_amount(&self) -> usize;

    /// Start a close handshake. Closing an already-closed transport is a
    /// no-op.
    fn close(&self, code: u16, reason: &str) -> Result<(), TransportError>;

    fn is_open(&self) -> bool;
}

/// An opened transport and its event stream
pub struct Connection {
    pub transport: Arc<dyn Transport>,
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Opens transports against a signed URL
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Connection, TransportError>;

    /// Get connector name for logging
    fn name(&self) -> &str;
}
